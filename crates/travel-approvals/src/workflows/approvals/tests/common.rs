use std::sync::{Arc, Mutex};

use axum::response::Response;
use axum::Router;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::approvals::{
    approval_router, ActorId, ActorProfile, ApprovalEvent, ApprovalStore, ApprovalSubject,
    ApprovalWorkflowService, ExpenseClaim, FixedClock, InMemoryDefinitionStore, MemoryApprovalStore,
    NewDefinition, NotificationError, NotificationPublisher, PerdiemRequest, RepositoryError,
    StaticDirectory, StepTemplate, SubjectApproval, SubjectId, SubjectLedger, TenantId,
    TravelRequest, WorkflowDefinition, WorkflowKind,
};

pub(super) type TravelService = ApprovalWorkflowService<
    TravelRequest,
    MemoryApprovalStore<TravelRequest>,
    InMemoryDefinitionStore,
    MemoryNotifier,
>;

pub(super) fn tenant() -> TenantId {
    TenantId("acme".to_string())
}

pub(super) fn actor(handle: &str) -> ActorId {
    ActorId(handle.to_string())
}

pub(super) fn subject(id: &str) -> SubjectId {
    SubjectId(id.to_string())
}

pub(super) fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 20, 14, 5, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn travel_request(id: &str, budget_code: Option<&str>) -> TravelRequest {
    TravelRequest {
        id: subject(id),
        tenant: tenant(),
        requester: actor("requester"),
        destination: "Berlin".to_string(),
        departure: NaiveDate::from_ymd_opt(2026, 5, 4).expect("valid date"),
        return_date: NaiveDate::from_ymd_opt(2026, 5, 7).expect("valid date"),
        estimated_cost: 145_000,
        budget_code: budget_code.map(str::to_string),
        approval: SubjectApproval::default(),
    }
}

pub(super) fn expense_claim(id: &str, cost_center: Option<&str>) -> ExpenseClaim {
    ExpenseClaim {
        id: subject(id),
        tenant: tenant(),
        claimant: actor("requester"),
        description: "Conference registration".to_string(),
        incurred_on: NaiveDate::from_ymd_opt(2026, 4, 2).expect("valid date"),
        amount: 48_500,
        budget_code: Some("BC-210".to_string()),
        cost_center: cost_center.map(str::to_string),
        approval: SubjectApproval::default(),
    }
}

pub(super) fn perdiem_request(id: &str, daily_rate: u64) -> PerdiemRequest {
    PerdiemRequest {
        id: subject(id),
        tenant: tenant(),
        requester: actor("requester"),
        location: "Rotterdam".to_string(),
        start_date: NaiveDate::from_ymd_opt(2026, 6, 1).expect("valid date"),
        end_date: NaiveDate::from_ymd_opt(2026, 6, 3).expect("valid date"),
        daily_rate,
        budget_code: Some("BC-330".to_string()),
        approval: SubjectApproval::default(),
    }
}

pub(super) fn steps(approvers: &[&str]) -> Vec<StepTemplate> {
    approvers
        .iter()
        .enumerate()
        .map(|(index, approver)| StepTemplate::new(index as u32 + 1, *approver))
        .collect()
}

pub(super) fn register_active(
    definitions: &InMemoryDefinitionStore,
    kind: WorkflowKind,
    name: &str,
    approvers: &[&str],
) -> WorkflowDefinition {
    definitions
        .register(NewDefinition {
            tenant: tenant(),
            kind,
            name: name.to_string(),
            steps: steps(approvers),
            active: true,
        })
        .expect("definition registers")
}

pub(super) fn service_with<S: ApprovalSubject>(
    definitions: Arc<InMemoryDefinitionStore>,
    notifier: Arc<MemoryNotifier>,
) -> ApprovalWorkflowService<S, MemoryApprovalStore<S>, InMemoryDefinitionStore, MemoryNotifier> {
    ApprovalWorkflowService::with_clock(
        Arc::new(MemoryApprovalStore::default()),
        definitions,
        notifier,
        Arc::new(FixedClock(fixed_time())),
    )
}

/// Travel service whose tenant has one active chain with the given approvers.
pub(super) fn build_travel_service(
    approvers: &[&str],
) -> (TravelService, Arc<InMemoryDefinitionStore>, Arc<MemoryNotifier>) {
    let definitions = Arc::new(InMemoryDefinitionStore::default());
    register_active(
        &definitions,
        WorkflowKind::TravelRequest,
        "Travel approval",
        approvers,
    );
    let notifier = Arc::new(MemoryNotifier::default());
    let service = service_with::<TravelRequest>(definitions.clone(), notifier.clone());
    (service, definitions, notifier)
}

/// Registers and submits a travel request, leaving step 1 open.
pub(super) fn submitted(service: &TravelService, id: &str, budget_code: Option<&str>) -> SubjectId {
    service
        .register(travel_request(id, budget_code))
        .expect("subject registers");
    service.initialize(&subject(id)).expect("chain initializes");
    subject(id)
}

pub(super) fn ledger(service: &TravelService, id: &SubjectId) -> SubjectLedger<TravelRequest> {
    service
        .store()
        .load(id)
        .expect("load succeeds")
        .expect("subject present")
}

#[derive(Default)]
pub(super) struct MemoryNotifier {
    events: Mutex<Vec<ApprovalEvent>>,
}

impl MemoryNotifier {
    pub(super) fn events(&self) -> Vec<ApprovalEvent> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationPublisher for MemoryNotifier {
    fn publish(&self, event: ApprovalEvent) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(event);
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl NotificationPublisher for FailingNotifier {
    fn publish(&self, _event: ApprovalEvent) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp relay offline".to_string()))
    }
}

pub(super) struct UnavailableStore;

impl<S: ApprovalSubject> ApprovalStore<S> for UnavailableStore {
    fn transact<T, E, F>(&self, _id: &SubjectId, _work: F) -> Result<T, E>
    where
        F: FnOnce(&mut SubjectLedger<S>) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        Err(E::from(RepositoryError::Unavailable(
            "database offline".to_string(),
        )))
    }

    fn load(&self, _id: &SubjectId) -> Result<Option<SubjectLedger<S>>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn insert_subject(&self, _subject: S) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn open_for(&self, _actor: &ActorId) -> Result<Vec<SubjectId>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) fn directory() -> Arc<StaticDirectory> {
    let profile = |handle: &str, name: &str| ActorProfile {
        id: actor(handle),
        display_name: name.to_string(),
        email: Some(format!("{handle}@acme.test")),
    };
    Arc::new(StaticDirectory::with_profiles([
        profile("requester", "Robin Requester"),
        profile("manager", "Morgan Manager"),
        profile("finance", "Fran Finance"),
        profile("treasury", "Taylor Treasury"),
    ]))
}

pub(super) fn travel_router(service: TravelService) -> Router {
    approval_router(Arc::new(service), directory())
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
