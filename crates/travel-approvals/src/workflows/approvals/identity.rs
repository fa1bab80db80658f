use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::domain::ActorId;

/// Display attributes for an actor. The engine only ever stores and compares `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorProfile {
    pub id: ActorId,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Resolves the caller's presented handle into an actor identity.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, handle: &str) -> Result<ActorProfile, IdentityError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("unknown actor '{0}'")]
    UnknownActor(String),
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Fixed directory of known actors keyed by handle.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    profiles: HashMap<String, ActorProfile>,
}

impl StaticDirectory {
    pub fn with_profiles(profiles: impl IntoIterator<Item = ActorProfile>) -> Self {
        let mut directory = Self::default();
        for profile in profiles {
            directory.insert(profile);
        }
        directory
    }

    pub fn insert(&mut self, profile: ActorProfile) {
        self.profiles.insert(profile.id.0.clone(), profile);
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl IdentityProvider for StaticDirectory {
    fn resolve(&self, handle: &str) -> Result<ActorProfile, IdentityError> {
        self.profiles
            .get(handle.trim())
            .cloned()
            .ok_or_else(|| IdentityError::UnknownActor(handle.to_string()))
    }
}
