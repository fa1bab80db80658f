use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{is_blank, ApprovalSubject};
use crate::workflows::approvals::domain::{
    ActorId, SubjectApproval, SubjectId, TenantId, WorkflowKind,
};

/// Daily allowance request covering a stay away from the home office.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerdiemRequest {
    pub id: SubjectId,
    pub tenant: TenantId,
    pub requester: ActorId,
    pub location: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Daily rate in minor currency units.
    pub daily_rate: u64,
    #[serde(default)]
    pub budget_code: Option<String>,
    #[serde(default)]
    pub approval: SubjectApproval,
}

impl PerdiemRequest {
    /// Inclusive number of days covered; zero when the range is inverted.
    pub fn days(&self) -> u64 {
        let span = (self.end_date - self.start_date).num_days();
        if span < 0 {
            0
        } else {
            span as u64 + 1
        }
    }

    /// Days times the daily rate, clamped at `u64::MAX`.
    pub fn total(&self) -> u64 {
        self.days().saturating_mul(self.daily_rate)
    }
}

impl ApprovalSubject for PerdiemRequest {
    const KIND: WorkflowKind = WorkflowKind::PerDiem;

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
        if self.daily_rate == 0 {
            missing.push("daily_rate");
        }
        missing
    }
}
