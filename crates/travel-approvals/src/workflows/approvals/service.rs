use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::definitions::DefinitionStore;
use super::domain::{
    next_instance_id, ActorId, ApprovalRecord, ApprovalStatus, SubjectApproval, SubjectId,
    SubjectStatus, TenantId, WorkflowBinding, WorkflowDefinitionId, WorkflowKind,
};
use super::events::{ApprovalEvent, ApprovalEventKind, NotificationPublisher};
use super::store::{ApprovalStore, RepositoryError, SubjectLedger};
use super::subjects::ApprovalSubject;
use super::sync;
use super::views::{ApprovalStatusView, TransitionOutcome, TransitionReport};

/// Generic approval engine for one subject type.
///
/// Every mutating operation runs inside a single [`ApprovalStore::transact`] call: the subject's
/// ledger is locked, checked, mutated and committed as one unit, so two racing calls for the same
/// subject are serialized and the loser observes the winner's result. Notifications are published
/// only after the commit.
pub struct ApprovalWorkflowService<S, R, D, N> {
    store: Arc<R>,
    definitions: Arc<D>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
    subject: PhantomData<fn() -> S>,
}

impl<S, R, D, N> ApprovalWorkflowService<S, R, D, N>
where
    S: ApprovalSubject,
    R: ApprovalStore<S> + 'static,
    D: DefinitionStore + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(store: Arc<R>, definitions: Arc<D>, notifier: Arc<N>) -> Self {
        Self::with_clock(store, definitions, notifier, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<R>,
        definitions: Arc<D>,
        notifier: Arc<N>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            definitions,
            notifier,
            clock,
            subject: PhantomData,
        }
    }

    pub fn store(&self) -> &Arc<R> {
        &self.store
    }

    /// Add a subject to the store as a fresh draft; any approval data it carries is discarded.
    pub fn register(&self, mut subject: S) -> Result<ApprovalStatusView, ApprovalError> {
        *subject.approval_mut() = SubjectApproval::default();
        let view = ApprovalStatusView::from_ledger(&SubjectLedger::new(subject.clone()));
        self.store.insert_subject(subject)?;
        info!(subject = %view.subject_id, kind = %S::KIND, "subject registered");
        Ok(view)
    }

    /// Materialize the approval chain for a draft or previously rejected subject.
    pub fn initialize(&self, id: &SubjectId) -> Result<ApprovalStatusView, ApprovalError> {
        let now = self.clock.now();
        let view = self.store.transact(id, |ledger| {
            let status = ledger.subject.status();
            if !status.is_initializable() {
                return Err(ApprovalError::InvalidSubjectState {
                    subject: id.clone(),
                    status,
                    operation: "initialize",
                });
            }
            self.rebuild(ledger, now)?;
            Ok(ApprovalStatusView::from_ledger(ledger))
        });

        let view =
            view.inspect_err(|err| debug!(subject = %id, error = %err, "initialize refused"))?;
        info!(
            subject = %id,
            kind = %S::KIND,
            steps = view.steps.len(),
            "approval chain initialized"
        );
        Ok(view)
    }

    /// Approve the actor's open step, advancing the cursor or finishing the chain.
    pub fn approve(
        &self,
        id: &SubjectId,
        actor: &ActorId,
    ) -> Result<TransitionReport, ApprovalError> {
        let now = self.clock.now();
        let committed = self.store.transact(id, |ledger| {
            let index = open_record_index(ledger, id, actor)?;
            let step_order = ledger.records[index].step_order;

            let next_index = ledger
                .records
                .iter()
                .enumerate()
                .filter(|(_, record)| record.step_order > step_order)
                .min_by_key(|(_, record)| record.step_order)
                .map(|(position, _)| position);

            if next_index.is_none() {
                let missing = ledger.subject.missing_final_approval_fields();
                if !missing.is_empty() {
                    return Err(ApprovalError::Validation {
                        subject: id.clone(),
                        message: format!(
                            "final approval requires: {}",
                            missing.join(", ")
                        ),
                        fields: missing,
                    });
                }
            }

            ledger.records[index].approve(now);

            let outcome = match next_index {
                Some(next) => {
                    ledger.records[next].open();
                    TransitionOutcome::Advanced {
                        step_order,
                        next_step: ledger.records[next].step_order,
                        next_approver: ledger.records[next].approver.clone(),
                    }
                }
                None => {
                    sync::final_step_approved(&mut ledger.subject, &ledger.records[index], now);
                    TransitionOutcome::Approved { step_order }
                }
            };

            Ok(TransitionReport {
                outcome,
                approvals: ApprovalStatusView::from_ledger(ledger),
            })
        });

        let report = committed.inspect_err(|err| {
            debug!(subject = %id, actor = %actor, error = %err, "approve refused")
        })?;
        info!(
            subject = %id,
            kind = %S::KIND,
            actor = %actor,
            step = report.outcome.step_order(),
            subject_status = %report.approvals.status,
            "approval step committed"
        );
        self.dispatch(&report, actor, now);
        Ok(report)
    }

    /// Reject the actor's open step; the subject is rejected immediately and every other record
    /// keeps its state for audit.
    pub fn reject(
        &self,
        id: &SubjectId,
        actor: &ActorId,
        reason: &str,
    ) -> Result<TransitionReport, ApprovalError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ApprovalError::Validation {
                subject: id.clone(),
                message: "a rejection reason is required".to_string(),
                fields: vec!["reason"],
            });
        }

        let now = self.clock.now();
        let committed: Result<_, ApprovalError> = self.store.transact(id, |ledger| {
            let index = open_record_index(ledger, id, actor)?;
            let step_order = ledger.records[index].step_order;

            ledger.records[index].reject(now, reason);
            sync::step_rejected(&mut ledger.subject, &ledger.records[index], now);

            Ok(TransitionReport {
                outcome: TransitionOutcome::Rejected {
                    step_order,
                    reason: reason.to_string(),
                },
                approvals: ApprovalStatusView::from_ledger(ledger),
            })
        });

        let report = committed.inspect_err(|err| {
            debug!(subject = %id, actor = %actor, error = %err, "reject refused")
        })?;
        info!(
            subject = %id,
            kind = %S::KIND,
            actor = %actor,
            step = report.outcome.step_order(),
            "approval chain rejected"
        );
        self.dispatch(&report, actor, now);
        Ok(report)
    }

    /// Discard the current chain and rebuild it from the tenant's active definition.
    ///
    /// The active definition may have changed since the previous round; the new chain follows
    /// whatever is active now. Approved subjects cannot be reset.
    pub fn reset(&self, id: &SubjectId) -> Result<ApprovalStatusView, ApprovalError> {
        let now = self.clock.now();
        let view = self.store.transact(id, |ledger| {
            let status = ledger.subject.status();
            if status == SubjectStatus::Approved {
                return Err(ApprovalError::InvalidSubjectState {
                    subject: id.clone(),
                    status,
                    operation: "reset",
                });
            }
            self.rebuild(ledger, now)?;
            Ok(ApprovalStatusView::from_ledger(ledger))
        });

        let view = view.inspect_err(|err| debug!(subject = %id, error = %err, "reset refused"))?;
        info!(subject = %id, kind = %S::KIND, steps = view.steps.len(), "approval chain reset");
        Ok(view)
    }

    pub fn get_status(&self, id: &SubjectId) -> Result<ApprovalStatusView, ApprovalError> {
        let ledger = self
            .store
            .load(id)?
            .ok_or_else(|| ApprovalError::NotFound(id.clone()))?;
        Ok(ApprovalStatusView::from_ledger(&ledger))
    }

    /// Subjects currently waiting on `actor`.
    pub fn pending_for(&self, actor: &ActorId) -> Result<Vec<SubjectId>, ApprovalError> {
        Ok(self.store.open_for(actor)?)
    }

    /// Hard-delete the existing records and stamps, then write a fresh chain.
    fn rebuild(
        &self,
        ledger: &mut SubjectLedger<S>,
        now: DateTime<Utc>,
    ) -> Result<(), ApprovalError> {
        ledger.records.clear();
        sync::unbind_instance(&mut ledger.subject);

        let tenant = ledger.subject.tenant().clone();
        let definition = self
            .definitions
            .lookup(&tenant, S::KIND)?
            .ok_or_else(|| ApprovalError::NoActiveWorkflow {
                tenant: tenant.clone(),
                kind: S::KIND,
            })?;

        if definition.steps.is_empty() {
            return Err(ApprovalError::NoStepsConfigured {
                definition: definition.id,
            });
        }

        let mut steps = definition.steps;
        steps.sort_by_key(|step| step.step_order);

        let subject_id = ledger.subject.id().clone();
        ledger.records = steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let status = if index == 0 {
                    ApprovalStatus::Open
                } else {
                    ApprovalStatus::Pending
                };
                ApprovalRecord::from_template(&subject_id, step, status)
            })
            .collect();

        sync::bind_instance(
            &mut ledger.subject,
            WorkflowBinding {
                definition_id: definition.id,
                definition_name: definition.name,
                instance_id: next_instance_id(),
                bound_at: now,
            },
        );
        Ok(())
    }

    fn dispatch(&self, report: &TransitionReport, actor: &ActorId, now: DateTime<Utc>) {
        let kind = match &report.outcome {
            TransitionOutcome::Advanced {
                next_step,
                next_approver,
                ..
            } => ApprovalEventKind::StepAdvanced {
                next_step: *next_step,
                next_approver: next_approver.clone(),
            },
            TransitionOutcome::Approved { .. } => ApprovalEventKind::SubjectApproved,
            TransitionOutcome::Rejected { reason, .. } => ApprovalEventKind::SubjectRejected {
                reason: reason.clone(),
            },
        };

        let event = ApprovalEvent {
            workflow_kind: S::KIND,
            tenant: report.approvals.tenant.clone(),
            subject_id: report.approvals.subject_id.clone(),
            actor: actor.clone(),
            step_order: report.outcome.step_order(),
            occurred_at: now,
            kind,
        };
        let name = event.kind.name();

        if let Err(err) = self.notifier.publish(event) {
            warn!(
                subject = %report.approvals.subject_id,
                event = name,
                error = %err,
                "notification dispatch failed; transition stays committed"
            );
        }
    }
}

/// Position of the actor's OPEN record, or the reason there is none.
fn open_record_index<S>(
    ledger: &SubjectLedger<S>,
    subject: &SubjectId,
    actor: &ActorId,
) -> Result<usize, ApprovalError> {
    if let Some(index) = ledger
        .records
        .iter()
        .position(|record| &record.approver == actor && record.status == ApprovalStatus::Open)
    {
        return Ok(index);
    }

    let acted = ledger
        .records
        .iter()
        .any(|record| &record.approver == actor && record.status.is_terminal());
    if acted {
        Err(ApprovalError::AlreadyActed {
            subject: subject.clone(),
            actor: actor.clone(),
        })
    } else {
        Err(ApprovalError::NotYourTurn {
            subject: subject.clone(),
            actor: actor.clone(),
        })
    }
}

/// Error raised by the approval service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApprovalError {
    #[error("subject {0} not found")]
    NotFound(SubjectId),
    #[error("no active {kind} workflow configured for tenant {tenant}")]
    NoActiveWorkflow { tenant: TenantId, kind: WorkflowKind },
    #[error("workflow definition {definition} has no steps configured")]
    NoStepsConfigured { definition: WorkflowDefinitionId },
    #[error("{actor} has no open approval step on {subject}")]
    NotYourTurn { subject: SubjectId, actor: ActorId },
    #[error("{actor} has already acted on {subject}")]
    AlreadyActed { subject: SubjectId, actor: ActorId },
    #[error("{message}")]
    Validation {
        subject: SubjectId,
        message: String,
        fields: Vec<&'static str>,
    },
    #[error("cannot {operation} {subject} while it is {status}")]
    InvalidSubjectState {
        subject: SubjectId,
        status: SubjectStatus,
        operation: &'static str,
    },
    #[error(transparent)]
    Storage(RepositoryError),
}

impl ApprovalError {
    /// Stable machine-readable code for API payloads.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::NoActiveWorkflow { .. } => "no_active_workflow",
            Self::NoStepsConfigured { .. } => "no_steps_configured",
            Self::NotYourTurn { .. } => "not_your_turn",
            Self::AlreadyActed { .. } => "already_acted",
            Self::Validation { .. } => "validation_error",
            Self::InvalidSubjectState { .. } => "invalid_subject_state",
            Self::Storage(_) => "storage_failure",
        }
    }
}

impl From<RepositoryError> for ApprovalError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::SubjectNotFound(id) => Self::NotFound(id),
            other => Self::Storage(other),
        }
    }
}
