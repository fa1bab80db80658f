use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::definitions::{DefinitionStore, InMemoryDefinitionStore};
use super::domain::{SubjectId, TenantId};
use super::events::NotificationPublisher;
use super::identity::{ActorProfile, IdentityError, IdentityProvider};
use super::service::{ApprovalError, ApprovalWorkflowService};
use super::store::{ApprovalStore, RepositoryError};
use super::subjects::ApprovalSubject;

/// Header carrying the caller's handle, resolved through the identity provider.
pub const ACTOR_HEADER: &str = "x-actor";

/// Shared state for the per-subject-type routes.
pub struct ApprovalRouteState<S, R, D, N> {
    pub service: Arc<ApprovalWorkflowService<S, R, D, N>>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl<S, R, D, N> Clone for ApprovalRouteState<S, R, D, N> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            identity: Arc::clone(&self.identity),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

/// Router builder exposing approval endpoints for one subject type under
/// `/api/v1/{segment}`.
pub fn approval_router<S, R, D, N>(
    service: Arc<ApprovalWorkflowService<S, R, D, N>>,
    identity: Arc<dyn IdentityProvider>,
) -> Router
where
    S: ApprovalSubject + DeserializeOwned,
    R: ApprovalStore<S> + 'static,
    D: DefinitionStore + 'static,
    N: NotificationPublisher + 'static,
{
    let base = format!("/api/v1/{}", S::KIND.path_segment());
    let state = ApprovalRouteState { service, identity };

    Router::new()
        .route(&base, post(register_handler::<S, R, D, N>))
        .route(&format!("{base}/inbox"), get(inbox_handler::<S, R, D, N>))
        .route(
            &format!("{base}/:subject_id/submit"),
            post(submit_handler::<S, R, D, N>),
        )
        .route(
            &format!("{base}/:subject_id/approve"),
            post(approve_handler::<S, R, D, N>),
        )
        .route(
            &format!("{base}/:subject_id/reject"),
            post(reject_handler::<S, R, D, N>),
        )
        .route(
            &format!("{base}/:subject_id/reset"),
            post(reset_handler::<S, R, D, N>),
        )
        .route(
            &format!("{base}/:subject_id/approvals"),
            get(status_handler::<S, R, D, N>),
        )
        .with_state(state)
}

/// Read-only listing of a tenant's workflow definitions.
pub fn definition_router(store: Arc<InMemoryDefinitionStore>) -> Router {
    Router::new()
        .route(
            "/api/v1/tenants/:tenant/definitions",
            get(definitions_handler),
        )
        .with_state(store)
}

/// HTTP status for each engine failure.
pub fn status_for(error: &ApprovalError) -> StatusCode {
    match error {
        ApprovalError::NotFound(_) => StatusCode::NOT_FOUND,
        ApprovalError::NotYourTurn { .. } => StatusCode::FORBIDDEN,
        ApprovalError::AlreadyActed { .. }
        | ApprovalError::NoActiveWorkflow { .. }
        | ApprovalError::NoStepsConfigured { .. }
        | ApprovalError::InvalidSubjectState { .. }
        | ApprovalError::Storage(RepositoryError::Conflict) => StatusCode::CONFLICT,
        ApprovalError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ApprovalError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(error: ApprovalError) -> Response {
    let status = status_for(&error);
    let mut payload = json!({
        "error": error.to_string(),
        "code": error.code(),
    });
    if let ApprovalError::Validation { fields, .. } = &error {
        payload["fields"] = json!(fields);
    }
    (status, Json(payload)).into_response()
}

fn actor_error(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

pub(crate) fn resolve_actor(
    identity: &dyn IdentityProvider,
    headers: &HeaderMap,
) -> Result<ActorProfile, Response> {
    let handle = headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            actor_error(
                StatusCode::UNAUTHORIZED,
                format!("{ACTOR_HEADER} header is required"),
            )
        })?;

    identity.resolve(handle).map_err(|error| match error {
        IdentityError::UnknownActor(_) => actor_error(StatusCode::UNAUTHORIZED, error.to_string()),
        IdentityError::Unavailable(_) => {
            actor_error(StatusCode::SERVICE_UNAVAILABLE, error.to_string())
        }
    })
}

pub(crate) async fn register_handler<S, R, D, N>(
    State(state): State<ApprovalRouteState<S, R, D, N>>,
    headers: HeaderMap,
    Json(subject): Json<S>,
) -> Response
where
    S: ApprovalSubject + DeserializeOwned,
    R: ApprovalStore<S> + 'static,
    D: DefinitionStore + 'static,
    N: NotificationPublisher + 'static,
{
    if let Err(response) = resolve_actor(state.identity.as_ref(), &headers) {
        return response;
    }
    match state.service.register(subject) {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler<S, R, D, N>(
    State(state): State<ApprovalRouteState<S, R, D, N>>,
    Path(subject_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: ApprovalSubject,
    R: ApprovalStore<S> + 'static,
    D: DefinitionStore + 'static,
    N: NotificationPublisher + 'static,
{
    let actor = match resolve_actor(state.identity.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    debug!(subject = %subject_id, actor = %actor.id, "submit requested");
    match state.service.initialize(&SubjectId(subject_id)) {
        Ok(view) => (StatusCode::ACCEPTED, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn approve_handler<S, R, D, N>(
    State(state): State<ApprovalRouteState<S, R, D, N>>,
    Path(subject_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: ApprovalSubject,
    R: ApprovalStore<S> + 'static,
    D: DefinitionStore + 'static,
    N: NotificationPublisher + 'static,
{
    let actor = match resolve_actor(state.identity.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match state.service.approve(&SubjectId(subject_id), &actor.id) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn reject_handler<S, R, D, N>(
    State(state): State<ApprovalRouteState<S, R, D, N>>,
    Path(subject_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<RejectRequest>,
) -> Response
where
    S: ApprovalSubject,
    R: ApprovalStore<S> + 'static,
    D: DefinitionStore + 'static,
    N: NotificationPublisher + 'static,
{
    let actor = match resolve_actor(state.identity.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match state
        .service
        .reject(&SubjectId(subject_id), &actor.id, &request.reason)
    {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn reset_handler<S, R, D, N>(
    State(state): State<ApprovalRouteState<S, R, D, N>>,
    Path(subject_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: ApprovalSubject,
    R: ApprovalStore<S> + 'static,
    D: DefinitionStore + 'static,
    N: NotificationPublisher + 'static,
{
    let actor = match resolve_actor(state.identity.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    debug!(subject = %subject_id, actor = %actor.id, "reset requested");
    match state.service.reset(&SubjectId(subject_id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<S, R, D, N>(
    State(state): State<ApprovalRouteState<S, R, D, N>>,
    Path(subject_id): Path<String>,
) -> Response
where
    S: ApprovalSubject,
    R: ApprovalStore<S> + 'static,
    D: DefinitionStore + 'static,
    N: NotificationPublisher + 'static,
{
    match state.service.get_status(&SubjectId(subject_id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn inbox_handler<S, R, D, N>(
    State(state): State<ApprovalRouteState<S, R, D, N>>,
    headers: HeaderMap,
) -> Response
where
    S: ApprovalSubject,
    R: ApprovalStore<S> + 'static,
    D: DefinitionStore + 'static,
    N: NotificationPublisher + 'static,
{
    let actor = match resolve_actor(state.identity.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match state.service.pending_for(&actor.id) {
        Ok(subjects) => {
            let payload = json!({
                "actor": actor.id,
                "display_name": actor.display_name,
                "workflow_kind": S::KIND,
                "pending": subjects,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn definitions_handler(
    State(store): State<Arc<InMemoryDefinitionStore>>,
    Path(tenant): Path<String>,
) -> Response {
    match store.definitions(&TenantId(tenant)) {
        Ok(definitions) => (StatusCode::OK, Json(definitions)).into_response(),
        Err(error) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}
