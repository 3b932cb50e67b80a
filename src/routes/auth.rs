/**
 * Authentication Routes
 * Login, one-time admin bootstrap and token verification.
 */
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::LoginResponse;
use crate::error::AppError;
use crate::models::PrincipalSummary;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateAdminResponse {
    pub message: String,
    pub user: PrincipalSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub user: Option<PrincipalSummary>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/create-admin", post(create_admin))
        .route("/api/auth/verify", post(verify_token))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(credentials) = payload?;
    let response = state
        .auth
        .login(&credentials.username, &credentials.password)
        .await?;
    Ok(Json(response))
}

/// POST /api/auth/create-admin
/// Only succeeds while no principal exists.
pub async fn create_admin(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(credentials) = payload?;
    let user = state
        .auth
        .create_admin(&credentials.username, &credentials.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateAdminResponse {
            message: "Admin user created successfully".to_string(),
            user,
        }),
    ))
}

/// POST /api/auth/verify
/// Always 200; `valid` says whether the bearer token still resolves to a principal.
pub async fn verify_token(State(state): State<AppState>, headers: HeaderMap) -> Json<VerifyResponse> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match state.auth.authenticate(header).await {
        Ok(principal) => Json(VerifyResponse {
            valid: true,
            user: Some(principal.summary()),
        }),
        Err(e) => {
            tracing::debug!("Token verification failed: {}", e);
            Json(VerifyResponse {
                valid: false,
                user: None,
            })
        }
    }
}
