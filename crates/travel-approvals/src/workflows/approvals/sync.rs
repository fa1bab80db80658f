//! Mirrors workflow outcomes onto the gated subject.
//!
//! Called only from the engine. Nothing here decides whether a transition is allowed; each
//! function translates an outcome the engine already committed to into subject field writes.

use chrono::{DateTime, Utc};

use super::domain::{ApprovalRecord, SubjectStatus, WorkflowBinding};
use super::subjects::ApprovalSubject;

pub(crate) fn bind_instance<S: ApprovalSubject>(subject: &mut S, binding: WorkflowBinding) {
    subject.clear_approval();
    subject.set_in_review(binding);
}

/// Drops stamps and binding, returning the subject to draft.
pub(crate) fn unbind_instance<S: ApprovalSubject>(subject: &mut S) {
    subject.clear_approval();
    subject.approval_mut().status = SubjectStatus::Draft;
}

pub(crate) fn final_step_approved<S: ApprovalSubject>(
    subject: &mut S,
    record: &ApprovalRecord,
    at: DateTime<Utc>,
) {
    subject.set_approved(&record.approver, at);
}

pub(crate) fn step_rejected<S: ApprovalSubject>(
    subject: &mut S,
    record: &ApprovalRecord,
    at: DateTime<Utc>,
) {
    let reason = record.rejection_reason.as_deref().unwrap_or_default();
    subject.set_rejected(&record.approver, at, reason);
}
