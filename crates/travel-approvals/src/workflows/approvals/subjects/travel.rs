use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{is_blank, ApprovalSubject};
use crate::workflows::approvals::domain::{
    ActorId, SubjectApproval, SubjectId, TenantId, WorkflowKind,
};

/// Trip request raised before booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelRequest {
    pub id: SubjectId,
    pub tenant: TenantId,
    pub requester: ActorId,
    pub destination: String,
    pub departure: NaiveDate,
    pub return_date: NaiveDate,
    /// Estimated total in minor currency units.
    pub estimated_cost: u64,
    #[serde(default)]
    pub budget_code: Option<String>,
    #[serde(default)]
    pub approval: SubjectApproval,
}

impl ApprovalSubject for TravelRequest {
    const KIND: WorkflowKind = WorkflowKind::TravelRequest;

    fn id(&self) -> &SubjectId {
        &self.id
    }

    fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    fn approval(&self) -> &SubjectApproval {
        &self.approval
    }

    fn approval_mut(&mut self) -> &mut SubjectApproval {
        &mut self.approval
    }

    fn missing_final_approval_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.budget_code) {
            missing.push("budget_code");
        }
        missing
    }
}
