use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;
use travel_approvals::config::ApprovalsConfig;
use travel_approvals::error::AppError;
use travel_approvals::workflows::approvals::{
    standard_definitions, ActorId, ActorProfile, ApprovalEvent, ApprovalWorkflowService,
    DefinitionSeedImporter, ExpenseClaim, InMemoryDefinitionStore, MemoryApprovalStore,
    NotificationError, NotificationPublisher, PerdiemRequest, StaticDirectory, TenantId,
    TravelRequest, WorkflowDefinition,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type TravelService = ApprovalWorkflowService<
    TravelRequest,
    MemoryApprovalStore<TravelRequest>,
    InMemoryDefinitionStore,
    LoggingNotifier,
>;
pub(crate) type ClaimService = ApprovalWorkflowService<
    ExpenseClaim,
    MemoryApprovalStore<ExpenseClaim>,
    InMemoryDefinitionStore,
    LoggingNotifier,
>;
pub(crate) type PerdiemService = ApprovalWorkflowService<
    PerdiemRequest,
    MemoryApprovalStore<PerdiemRequest>,
    InMemoryDefinitionStore,
    LoggingNotifier,
>;

/// One engine per subject type, all reading the same definition store.
#[derive(Clone)]
pub(crate) struct ApprovalServices {
    pub(crate) travel: Arc<TravelService>,
    pub(crate) claims: Arc<ClaimService>,
    pub(crate) perdiem: Arc<PerdiemService>,
    pub(crate) definitions: Arc<InMemoryDefinitionStore>,
    pub(crate) notifier: Arc<LoggingNotifier>,
}

impl ApprovalServices {
    pub(crate) fn new(
        definitions: Arc<InMemoryDefinitionStore>,
        notifier: LoggingNotifier,
    ) -> Self {
        let notifier = Arc::new(notifier);
        Self {
            travel: Arc::new(ApprovalWorkflowService::new(
                Arc::new(MemoryApprovalStore::default()),
                definitions.clone(),
                notifier.clone(),
            )),
            claims: Arc::new(ApprovalWorkflowService::new(
                Arc::new(MemoryApprovalStore::default()),
                definitions.clone(),
                notifier.clone(),
            )),
            perdiem: Arc::new(ApprovalWorkflowService::new(
                Arc::new(MemoryApprovalStore::default()),
                definitions.clone(),
                notifier.clone(),
            )),
            definitions,
            notifier,
        }
    }
}

/// Stands in for the mail relay by logging every event. The demo variant also keeps the most
/// recent events for display; the serving variant keeps nothing.
#[derive(Default)]
pub(crate) struct LoggingNotifier {
    recorded: Option<Recorded>,
}

struct Recorded {
    capacity: usize,
    events: Mutex<VecDeque<ApprovalEvent>>,
}

impl LoggingNotifier {
    /// Logs and keeps up to `capacity` events, dropping the oldest first.
    pub(crate) fn recording(capacity: usize) -> Self {
        Self {
            recorded: Some(Recorded {
                capacity,
                events: Mutex::new(VecDeque::with_capacity(capacity)),
            }),
        }
    }

    pub(crate) fn events(&self) -> Vec<ApprovalEvent> {
        self.recorded
            .as_ref()
            .and_then(|recorded| recorded.events.lock().ok())
            .map(|guard| guard.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl NotificationPublisher for LoggingNotifier {
    fn publish(&self, event: ApprovalEvent) -> Result<(), NotificationError> {
        info!(
            event = event.kind.name(),
            kind = %event.workflow_kind,
            tenant = %event.tenant,
            subject = %event.subject_id,
            actor = %event.actor,
            step = event.step_order,
            "approval notification"
        );
        let Some(recorded) = &self.recorded else {
            return Ok(());
        };
        let mut guard = recorded
            .events
            .lock()
            .map_err(|_| NotificationError::Transport("notification log poisoned".to_string()))?;
        if recorded.capacity == 0 {
            return Ok(());
        }
        while guard.len() >= recorded.capacity {
            guard.pop_front();
        }
        guard.push_back(event);
        Ok(())
    }
}

/// Seeds the definition store from the configured CSV, or the standard chains otherwise.
pub(crate) fn load_definitions(
    config: &ApprovalsConfig,
) -> Result<(Arc<InMemoryDefinitionStore>, Vec<WorkflowDefinition>), AppError> {
    let store = Arc::new(InMemoryDefinitionStore::default());
    let registered = match &config.definitions_csv {
        Some(path) => {
            let registered = DefinitionSeedImporter::from_path(path, &store)?;
            info!(
                path = %path.display(),
                definitions = registered.len(),
                "definitions seeded from CSV"
            );
            registered
        }
        None => {
            let tenant = TenantId(config.default_tenant.clone());
            let registered = standard_definitions(&tenant)
                .into_iter()
                .map(|definition| store.register(definition))
                .collect::<Result<Vec<_>, _>>()?;
            info!(tenant = %tenant, definitions = registered.len(), "standard definitions loaded");
            registered
        }
    };
    Ok((store, registered))
}

/// Every approver named by a definition, plus the generic `requester` handle.
pub(crate) fn directory_for(definitions: &[WorkflowDefinition]) -> StaticDirectory {
    let handles: BTreeSet<&str> = definitions
        .iter()
        .flat_map(|definition| definition.steps.iter())
        .map(|step| step.approver.0.as_str())
        .chain(std::iter::once("requester"))
        .collect();

    StaticDirectory::with_profiles(handles.into_iter().map(|handle| ActorProfile {
        id: ActorId(handle.to_string()),
        display_name: display_name(handle),
        email: None,
    }))
}

fn display_name(handle: &str) -> String {
    handle
        .split(['-', '_', '.'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
