use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    ActorId, ApprovalRecord, ApprovalStatus, SubjectId, SubjectStatus, TenantId, WorkflowBinding,
    WorkflowKind,
};
use super::store::SubjectLedger;
use super::subjects::ApprovalSubject;

/// One row of the ordered approval chain as exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalStepView {
    pub step_order: u32,
    pub approver: ActorId,
    pub status: ApprovalStatus,
    pub status_label: &'static str,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

impl From<&ApprovalRecord> for ApprovalStepView {
    fn from(record: &ApprovalRecord) -> Self {
        Self {
            step_order: record.step_order,
            approver: record.approver.clone(),
            status: record.status,
            status_label: record.status.label(),
            approved_at: record.approved_at,
            rejected_at: record.rejected_at,
            rejection_reason: record.rejection_reason.clone(),
        }
    }
}

/// Subject status plus its approval chain ordered by step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalStatusView {
    pub subject_id: SubjectId,
    pub workflow_kind: WorkflowKind,
    pub tenant: TenantId,
    pub status: SubjectStatus,
    pub status_label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<WorkflowBinding>,
    pub current_step: Option<u32>,
    pub approved_by: Option<ActorId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<ActorId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub steps: Vec<ApprovalStepView>,
}

impl ApprovalStatusView {
    pub fn from_ledger<S: ApprovalSubject>(ledger: &SubjectLedger<S>) -> Self {
        let approval = ledger.subject.approval();
        let mut steps: Vec<ApprovalStepView> =
            ledger.records.iter().map(ApprovalStepView::from).collect();
        steps.sort_by_key(|step| step.step_order);

        Self {
            subject_id: ledger.subject.id().clone(),
            workflow_kind: S::KIND,
            tenant: ledger.subject.tenant().clone(),
            status: approval.status,
            status_label: approval.status.label(),
            binding: approval.binding.clone(),
            current_step: ledger.cursor().map(|record| record.step_order),
            approved_by: approval.approved_by.clone(),
            approved_at: approval.approved_at,
            rejected_by: approval.rejected_by.clone(),
            rejected_at: approval.rejected_at,
            rejection_reason: approval.rejection_reason.clone(),
            steps,
        }
    }

    pub fn step(&self, step_order: u32) -> Option<&ApprovalStepView> {
        self.steps.iter().find(|step| step.step_order == step_order)
    }

    pub fn statuses(&self) -> Vec<ApprovalStatus> {
        self.steps.iter().map(|step| step.status).collect()
    }
}

/// Result of a single approve/reject call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
    Advanced {
        step_order: u32,
        next_step: u32,
        next_approver: ActorId,
    },
    Approved {
        step_order: u32,
    },
    Rejected {
        step_order: u32,
        reason: String,
    },
}

impl TransitionOutcome {
    pub const fn step_order(&self) -> u32 {
        match self {
            Self::Advanced { step_order, .. }
            | Self::Approved { step_order }
            | Self::Rejected { step_order, .. } => *step_order,
        }
    }
}

/// Outcome together with the committed chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionReport {
    #[serde(flatten)]
    pub outcome: TransitionOutcome,
    pub approvals: ApprovalStatusView,
}
