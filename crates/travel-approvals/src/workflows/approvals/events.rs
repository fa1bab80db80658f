use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ActorId, SubjectId, TenantId, WorkflowKind};

/// What happened to a subject's approval chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ApprovalEventKind {
    StepAdvanced {
        next_step: u32,
        next_approver: ActorId,
    },
    SubjectApproved,
    SubjectRejected {
        reason: String,
    },
}

impl ApprovalEventKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StepAdvanced { .. } => "step_advanced",
            Self::SubjectApproved => "subject_approved",
            Self::SubjectRejected { .. } => "subject_rejected",
        }
    }
}

/// Payload handed to the messaging collaborator after a transition commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalEvent {
    pub workflow_kind: WorkflowKind,
    pub tenant: TenantId,
    pub subject_id: SubjectId,
    pub actor: ActorId,
    pub step_order: u32,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ApprovalEventKind,
}

/// Outbound notification hook (e-mail, push, chat adapters).
///
/// Delivery guarantees belong to the implementation; the engine treats publishing as
/// fire-and-forget and never rolls a committed transition back because of it.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, event: ApprovalEvent) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
