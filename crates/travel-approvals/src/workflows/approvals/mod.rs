//! Sequential approval chains for travel requests, expense claims, and per-diem requests.
//!
//! A tenant configures one active [`WorkflowDefinition`] per [`WorkflowKind`]. Submitting a
//! subject copies the definition's steps into per-subject approval records; approvers then act
//! one at a time in step order until the chain is approved in full or rejected at any step.

pub mod clock;
pub mod definitions;
pub mod domain;
pub mod events;
pub mod identity;
pub mod router;
pub mod seed;
pub mod service;
pub mod store;
pub mod subjects;
mod sync;
pub mod views;

#[cfg(test)]
mod tests;

pub use clock::{Clock, FixedClock, SystemClock};
pub use definitions::{
    validate_steps, DefinitionError, DefinitionStore, InMemoryDefinitionStore, NewDefinition,
};
pub use domain::{
    ActorId, ApprovalRecord, ApprovalRecordId, ApprovalStatus, InstanceId, StepTemplate,
    SubjectApproval, SubjectId, SubjectStatus, TenantId, UnknownWorkflowKind, WorkflowBinding,
    WorkflowDefinition, WorkflowDefinitionId, WorkflowKind,
};
pub use events::{ApprovalEvent, ApprovalEventKind, NotificationError, NotificationPublisher};
pub use identity::{ActorProfile, IdentityError, IdentityProvider, StaticDirectory};
pub use router::{approval_router, definition_router, status_for, ACTOR_HEADER};
pub use seed::{standard_definitions, DefinitionSeedImporter, SeedImportError};
pub use service::{ApprovalError, ApprovalWorkflowService};
pub use store::{ApprovalStore, MemoryApprovalStore, RepositoryError, SubjectLedger};
pub use subjects::{ApprovalSubject, ExpenseClaim, PerdiemRequest, TravelRequest};
pub use views::{ApprovalStatusView, ApprovalStepView, TransitionOutcome, TransitionReport};
