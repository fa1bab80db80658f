use crate::cli::ServeArgs;
use crate::infra::{
    directory_for, load_definitions, AppState, ApprovalServices, LoggingNotifier,
};
use crate::routes::with_approval_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use travel_approvals::config::AppConfig;
use travel_approvals::error::AppError;
use travel_approvals::telemetry;
use travel_approvals::workflows::approvals::IdentityProvider;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(path) = args.definitions_csv.take() {
        config.approvals.definitions_csv = Some(path);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let (definitions, registered) = load_definitions(&config.approvals)?;
    let identity: Arc<dyn IdentityProvider> = Arc::new(directory_for(&registered));
    let services = ApprovalServices::new(definitions, LoggingNotifier::default());

    let app = with_approval_routes(&services, identity)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        definitions = registered.len(),
        "travel approval service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
