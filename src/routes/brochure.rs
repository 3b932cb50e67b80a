/**
 * Brochure Routes
 * Public brochure requests, delivered by mail in the background, and the
 * admin views over them.
 */
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use uuid::Uuid;

use super::form::SubmittedForm;
use super::resource::MessageResponse;
use crate::auth::middleware::require_auth;
use crate::error::AppError;
use crate::mailer::BrochureMailer;
use crate::models::{
    brochure::NewBrochureRequest, BrochureRequest, BrochureStatus, Principal,
};
use crate::store::{Filter, Record, ResourceStore};
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/api/brochure/requests", get(list_requests))
        .route("/api/brochure/request/{id}/send", put(mark_sent))
        .route("/api/brochure/request/{id}", delete(delete_request))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/api/brochure/request", post(create_request))
        .merge(admin)
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(BrochureRequest::NAME))
}

/// POST /api/brochure/request
/// Responds with the pending record; delivery runs afterwards.
pub async fn create_request(
    State(state): State<AppState>,
    form: SubmittedForm,
) -> Result<impl IntoResponse, AppError> {
    let draft = NewBrochureRequest::from_fields(&form.fields)?;
    let store = state.store::<BrochureRequest>();
    let request = store.create(&draft).await?;
    tracing::info!(id = %request.id, "Brochure requested");

    match state.mailer.clone() {
        Some(mailer) => {
            tokio::spawn(deliver(store, mailer, request.clone()));
        }
        None => tracing::warn!(id = %request.id, "No mailer configured; brochure request left pending"),
    }

    Ok((StatusCode::CREATED, Json(request)))
}

/// Send the brochure and record the outcome as `sent` or `failed`.
pub(crate) async fn deliver(
    store: ResourceStore<BrochureRequest>,
    mailer: Arc<dyn BrochureMailer>,
    request: BrochureRequest,
) {
    let next = match mailer.send_brochure(&request).await {
        Ok(()) => BrochureStatus::Sent,
        Err(e) => {
            tracing::error!(id = %request.id, error = %e, "Brochure delivery failed");
            BrochureStatus::Failed
        }
    };

    let patch = match request.transition(next) {
        Ok(patch) => patch,
        Err(e) => {
            tracing::warn!(id = %request.id, error = %e, "Brochure status not updated");
            return;
        }
    };
    match store
        .update_if(request.id, &BrochureRequest::while_pending(), &patch)
        .await
    {
        Ok(Some(_)) => tracing::info!(id = %request.id, status = %next, "Brochure request updated"),
        Ok(None) => tracing::warn!(
            id = %request.id,
            status = %next,
            "Brochure request no longer pending; delivery outcome not recorded"
        ),
        Err(e) => tracing::error!(id = %request.id, error = %e, "Failed to record brochure status"),
    }
}

/// GET /api/brochure/requests
pub async fn list_requests(
    State(state): State<AppState>,
) -> Result<Json<Vec<BrochureRequest>>, AppError> {
    let requests = state
        .store::<BrochureRequest>()
        .list(&Filter::new(), &BrochureRequest::default_sort())
        .await?;
    Ok(Json(requests))
}

/// PUT /api/brochure/request/{id}/send
/// Manual pending -> sent, for brochures delivered outside the mail API.
pub async fn mark_sent(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<BrochureRequest>, AppError> {
    let id = parse_id(&id)?;
    let store = state.store::<BrochureRequest>();
    let request = store.get(id).await?;
    let patch = request.transition(BrochureStatus::Sent)?;
    let Some(updated) = store
        .update_if(id, &BrochureRequest::while_pending(), &patch)
        .await?
    else {
        // Delivery settled the request between the read and the write.
        let current = store.get(id).await?;
        return Err(AppError::InvalidTransition {
            from: current.status.to_string(),
            to: BrochureStatus::Sent.to_string(),
        });
    };
    tracing::info!(id = %id, by = %principal.username, "Brochure request marked as sent");
    Ok(Json(updated))
}

/// DELETE /api/brochure/request/{id}
pub async fn delete_request(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = parse_id(&id)?;
    state.store::<BrochureRequest>().delete(id).await?;
    tracing::info!(id = %id, by = %principal.username, "Brochure request deleted");
    Ok(Json(MessageResponse {
        message: format!("{} deleted successfully", BrochureRequest::NAME),
    }))
}
