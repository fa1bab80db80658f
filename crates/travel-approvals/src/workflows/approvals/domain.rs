use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Organizational scope isolating workflow definitions from one another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub String);

/// Opaque identifier issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub String);

/// Identifier of a gated business entity (travel request, claim, per-diem request).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowDefinitionId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalRecordId(pub String);

/// Identifies one materialized approval chain; minted again on every resubmission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for WorkflowDefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static DEFINITION_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static RECORD_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static INSTANCE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_definition_id() -> WorkflowDefinitionId {
    let id = DEFINITION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    WorkflowDefinitionId(format!("wf-{id:06}"))
}

pub(crate) fn next_record_id() -> ApprovalRecordId {
    let id = RECORD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApprovalRecordId(format!("apr-{id:08}"))
}

pub(crate) fn next_instance_id() -> InstanceId {
    let id = INSTANCE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    InstanceId(format!("wfi-{id:08}"))
}

/// Business process a definition gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowKind {
    TravelRequest,
    ExpenseClaim,
    PerDiem,
}

impl WorkflowKind {
    pub const fn ordered() -> [Self; 3] {
        [Self::TravelRequest, Self::ExpenseClaim, Self::PerDiem]
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TravelRequest => "TRAVEL_REQUEST",
            Self::ExpenseClaim => "EXPENSE_CLAIM",
            Self::PerDiem => "PER_DIEM",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::TravelRequest => "Travel Request",
            Self::ExpenseClaim => "Expense Claim",
            Self::PerDiem => "Per-Diem Request",
        }
    }

    /// URL segment under which the subject type is exposed.
    pub const fn path_segment(self) -> &'static str {
        match self {
            Self::TravelRequest => "travel-requests",
            Self::ExpenseClaim => "expense-claims",
            Self::PerDiem => "perdiem-requests",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown workflow kind '{0}'")]
pub struct UnknownWorkflowKind(pub String);

impl FromStr for WorkflowKind {
    type Err = UnknownWorkflowKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "TRAVEL_REQUEST" | "TRAVEL" => Ok(Self::TravelRequest),
            "EXPENSE_CLAIM" | "CLAIM" => Ok(Self::ExpenseClaim),
            "PER_DIEM" | "PERDIEM" | "PERDIEM_REQUEST" => Ok(Self::PerDiem),
            _ => Err(UnknownWorkflowKind(value.to_string())),
        }
    }
}

/// One approver slot of a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTemplate {
    pub step_order: u32,
    pub approver: ActorId,
}

impl StepTemplate {
    pub fn new(step_order: u32, approver: impl Into<String>) -> Self {
        Self {
            step_order,
            approver: ActorId(approver.into()),
        }
    }
}

/// Tenant-scoped template for an ordered approver chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowDefinitionId,
    pub tenant: TenantId,
    pub kind: WorkflowKind,
    pub name: String,
    pub active: bool,
    /// Sorted by `step_order`, contiguous from 1.
    pub steps: Vec<StepTemplate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Open,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Open => "Open",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }
}

/// Runtime slot of one approver within a subject's chain.
///
/// `step_order` and `approver` are copies taken at instantiation, so later template edits never
/// reach an instance that is already running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: ApprovalRecordId,
    pub subject_id: SubjectId,
    pub step_order: u32,
    pub approver: ActorId,
    pub status: ApprovalStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

impl ApprovalRecord {
    pub(crate) fn from_template(
        subject_id: &SubjectId,
        template: &StepTemplate,
        status: ApprovalStatus,
    ) -> Self {
        Self {
            id: next_record_id(),
            subject_id: subject_id.clone(),
            step_order: template.step_order,
            approver: template.approver.clone(),
            status,
            approved_at: None,
            rejected_at: None,
            rejection_reason: None,
        }
    }

    pub(crate) fn open(&mut self) {
        debug_assert_eq!(self.status, ApprovalStatus::Pending);
        self.status = ApprovalStatus::Open;
    }

    pub(crate) fn approve(&mut self, at: DateTime<Utc>) {
        debug_assert_eq!(self.status, ApprovalStatus::Open);
        self.status = ApprovalStatus::Approved;
        self.approved_at = Some(at);
    }

    pub(crate) fn reject(&mut self, at: DateTime<Utc>, reason: &str) {
        debug_assert_eq!(self.status, ApprovalStatus::Open);
        self.status = ApprovalStatus::Rejected;
        self.rejected_at = Some(at);
        self.rejection_reason = Some(reason.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubjectStatus {
    #[default]
    Draft,
    InReview,
    Approved,
    Rejected,
}

impl SubjectStatus {
    /// Draft subjects and rejected ones awaiting resubmission may start a new chain.
    pub const fn is_initializable(self) -> bool {
        matches!(self, Self::Draft | Self::Rejected)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::InReview => "In Review",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for SubjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which definition and instance a subject is currently bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowBinding {
    pub definition_id: WorkflowDefinitionId,
    pub definition_name: String,
    pub instance_id: InstanceId,
    pub bound_at: DateTime<Utc>,
}

/// Approval block carried by every subject; written only by the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubjectApproval {
    pub status: SubjectStatus,
    pub binding: Option<WorkflowBinding>,
    pub approved_by: Option<ActorId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<ActorId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}
