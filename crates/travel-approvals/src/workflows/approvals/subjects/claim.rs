use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{is_blank, ApprovalSubject};
use crate::workflows::approvals::domain::{
    ActorId, SubjectApproval, SubjectId, TenantId, WorkflowKind,
};

/// Reimbursement claim for money already spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseClaim {
    pub id: SubjectId,
    pub tenant: TenantId,
    pub claimant: ActorId,
    pub description: String,
    pub incurred_on: NaiveDate,
    /// Claimed amount in minor currency units.
    pub amount: u64,
    #[serde(default)]
    pub budget_code: Option<String>,
    #[serde(default)]
    pub cost_center: Option<String>,
    #[serde(default)]
    pub approval: SubjectApproval,
}

impl ApprovalSubject for ExpenseClaim {
    const KIND: WorkflowKind = WorkflowKind::ExpenseClaim;

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
        if is_blank(&self.cost_center) {
            missing.push("cost_center");
        }
        missing
    }
}
