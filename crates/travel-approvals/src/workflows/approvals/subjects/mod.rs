//! Business entities gated by an approval chain.
//!
//! Each subject type plugs into the generic engine through [`ApprovalSubject`]. The trait exposes
//! the approval block the synchronizer writes and the domain guard checked before the final
//! approver signs off; everything else about the entity stays private to its own module.

mod claim;
mod perdiem;
mod travel;

use chrono::{DateTime, Utc};

use super::domain::{
    ActorId, SubjectApproval, SubjectId, SubjectStatus, TenantId, WorkflowBinding, WorkflowKind,
};

pub use claim::ExpenseClaim;
pub use perdiem::PerdiemRequest;
pub use travel::TravelRequest;

/// Capability interface implemented once per subject type.
pub trait ApprovalSubject: Clone + Send + Sync + 'static {
    const KIND: WorkflowKind;

    fn id(&self) -> &SubjectId;
    fn tenant(&self) -> &TenantId;
    fn approval(&self) -> &SubjectApproval;
    fn approval_mut(&mut self) -> &mut SubjectApproval;

    /// Names of fields that must be filled in before the last step may approve.
    fn missing_final_approval_fields(&self) -> Vec<&'static str>;

    fn status(&self) -> SubjectStatus {
        self.approval().status
    }

    fn set_in_review(&mut self, binding: WorkflowBinding) {
        let approval = self.approval_mut();
        approval.status = SubjectStatus::InReview;
        approval.binding = Some(binding);
    }

    fn set_approved(&mut self, actor: &ActorId, at: DateTime<Utc>) {
        let approval = self.approval_mut();
        approval.status = SubjectStatus::Approved;
        approval.approved_by = Some(actor.clone());
        approval.approved_at = Some(at);
    }

    fn set_rejected(&mut self, actor: &ActorId, at: DateTime<Utc>, reason: &str) {
        let approval = self.approval_mut();
        approval.status = SubjectStatus::Rejected;
        approval.rejected_by = Some(actor.clone());
        approval.rejected_at = Some(at);
        approval.rejection_reason = Some(reason.to_string());
    }

    /// Drops stamps and binding while keeping the status, so the caller decides what comes next.
    fn clear_approval(&mut self) {
        let status = self.status();
        *self.approval_mut() = SubjectApproval {
            status,
            ..SubjectApproval::default()
        };
    }
}

pub(crate) fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |value| value.trim().is_empty())
}
