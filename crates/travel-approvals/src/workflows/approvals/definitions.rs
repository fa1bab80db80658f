use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::domain::{
    next_definition_id, StepTemplate, TenantId, WorkflowDefinition, WorkflowDefinitionId,
    WorkflowKind,
};
use super::store::RepositoryError;

/// Read side consumed by the engine.
pub trait DefinitionStore: Send + Sync {
    /// The active definition for `(tenant, kind)`, if one is configured.
    fn lookup(
        &self,
        tenant: &TenantId,
        kind: WorkflowKind,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError>;
}

/// Administrative input for registering a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDefinition {
    pub tenant: TenantId,
    pub kind: WorkflowKind,
    pub name: String,
    pub steps: Vec<StepTemplate>,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("workflow definition {0} not found")]
    NotFound(WorkflowDefinitionId),
    #[error("definition {existing} is already active for {kind} in tenant {tenant}")]
    ActiveConflict {
        tenant: TenantId,
        kind: WorkflowKind,
        existing: WorkflowDefinitionId,
    },
    #[error("invalid step configuration: {0}")]
    InvalidSteps(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Checks that orders run 1..=n without gaps or duplicates and every step names an approver.
/// Returns the steps sorted by order.
pub fn validate_steps(mut steps: Vec<StepTemplate>) -> Result<Vec<StepTemplate>, DefinitionError> {
    steps.sort_by_key(|step| step.step_order);

    for (index, step) in steps.iter().enumerate() {
        let expected = index as u32 + 1;
        if step.step_order != expected {
            return Err(DefinitionError::InvalidSteps(format!(
                "expected step_order {expected}, found {}",
                step.step_order
            )));
        }
        if step.approver.0.trim().is_empty() {
            return Err(DefinitionError::InvalidSteps(format!(
                "step {expected} has no approver"
            )));
        }
    }

    Ok(steps)
}

/// In-process definition store enforcing one active definition per `(tenant, kind)`.
#[derive(Default)]
pub struct InMemoryDefinitionStore {
    definitions: Mutex<Vec<WorkflowDefinition>>,
}

fn poisoned() -> RepositoryError {
    RepositoryError::Unavailable("definition store lock poisoned".to_string())
}

fn active_conflict(
    definitions: &[WorkflowDefinition],
    tenant: &TenantId,
    kind: WorkflowKind,
    except: Option<&WorkflowDefinitionId>,
) -> Option<DefinitionError> {
    definitions
        .iter()
        .find(|definition| {
            definition.active
                && &definition.tenant == tenant
                && definition.kind == kind
                && Some(&definition.id) != except
        })
        .map(|existing| DefinitionError::ActiveConflict {
            tenant: tenant.clone(),
            kind,
            existing: existing.id.clone(),
        })
}

impl InMemoryDefinitionStore {
    pub fn register(&self, input: NewDefinition) -> Result<WorkflowDefinition, DefinitionError> {
        let mut registered = self.register_all(vec![input])?;
        registered
            .pop()
            .ok_or_else(|| DefinitionError::InvalidSteps("nothing to register".to_string()))
    }

    /// Registers a batch under one lock. Either every definition is stored or none is.
    pub fn register_all(
        &self,
        inputs: Vec<NewDefinition>,
    ) -> Result<Vec<WorkflowDefinition>, DefinitionError> {
        let mut guard = self.definitions.lock().map_err(|_| poisoned())?;
        let mut staged: Vec<WorkflowDefinition> = Vec::with_capacity(inputs.len());

        for input in inputs {
            let steps = validate_steps(input.steps)?;
            if input.active {
                let conflict = active_conflict(&guard, &input.tenant, input.kind, None)
                    .or_else(|| active_conflict(&staged, &input.tenant, input.kind, None));
                if let Some(conflict) = conflict {
                    return Err(conflict);
                }
            }
            staged.push(WorkflowDefinition {
                id: next_definition_id(),
                tenant: input.tenant,
                kind: input.kind,
                name: input.name,
                active: input.active,
                steps,
                created_at: Utc::now(),
            });
        }

        for definition in &staged {
            info!(
                definition = %definition.id,
                tenant = %definition.tenant,
                kind = %definition.kind,
                steps = definition.steps.len(),
                active = definition.active,
                "workflow definition registered"
            );
        }
        guard.extend(staged.iter().cloned());
        Ok(staged)
    }

    pub fn activate(&self, id: &WorkflowDefinitionId) -> Result<(), DefinitionError> {
        let mut guard = self.definitions.lock().map_err(|_| poisoned())?;
        let index = guard
            .iter()
            .position(|definition| &definition.id == id)
            .ok_or_else(|| DefinitionError::NotFound(id.clone()))?;

        if guard[index].active {
            return Ok(());
        }

        let (tenant, kind) = (guard[index].tenant.clone(), guard[index].kind);
        if let Some(conflict) = active_conflict(&guard, &tenant, kind, Some(id)) {
            return Err(conflict);
        }

        guard[index].active = true;
        info!(definition = %id, tenant = %tenant, kind = %kind, "workflow definition activated");
        Ok(())
    }

    pub fn deactivate(&self, id: &WorkflowDefinitionId) -> Result<(), DefinitionError> {
        let mut guard = self.definitions.lock().map_err(|_| poisoned())?;
        let definition = guard
            .iter_mut()
            .find(|definition| &definition.id == id)
            .ok_or_else(|| DefinitionError::NotFound(id.clone()))?;
        definition.active = false;
        info!(definition = %id, "workflow definition deactivated");
        Ok(())
    }

    /// Replaces the step templates; running instances keep their copied records.
    pub fn replace_steps(
        &self,
        id: &WorkflowDefinitionId,
        steps: Vec<StepTemplate>,
    ) -> Result<(), DefinitionError> {
        let steps = validate_steps(steps)?;
        let mut guard = self.definitions.lock().map_err(|_| poisoned())?;
        let definition = guard
            .iter_mut()
            .find(|definition| &definition.id == id)
            .ok_or_else(|| DefinitionError::NotFound(id.clone()))?;
        definition.steps = steps;
        Ok(())
    }

    pub fn definitions(
        &self,
        tenant: &TenantId,
    ) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let guard = self.definitions.lock().map_err(|_| poisoned())?;
        Ok(guard
            .iter()
            .filter(|definition| &definition.tenant == tenant)
            .cloned()
            .collect())
    }
}

impl DefinitionStore for InMemoryDefinitionStore {
    fn lookup(
        &self,
        tenant: &TenantId,
        kind: WorkflowKind,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        let guard = self.definitions.lock().map_err(|_| poisoned())?;
        let found = guard
            .iter()
            .find(|definition| {
                definition.active && &definition.tenant == tenant && definition.kind == kind
            })
            .cloned();
        debug!(tenant = %tenant, kind = %kind, found = found.is_some(), "definition lookup");
        Ok(found)
    }
}
