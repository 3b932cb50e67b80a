use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::models::Principal;
use crate::state::AppState;

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Bearer-token stage for write routes. The resolved [`Principal`] is made
/// available to handlers as a request extension.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = state
        .auth
        .authenticate(authorization(request.headers()))
        .await?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// The caller on a public route: an admin if a valid token came along,
/// anonymous otherwise. A bad token is not an error here.
#[derive(Debug, Clone)]
pub struct Viewer(pub Option<Principal>);

impl Viewer {
    pub fn is_admin(&self) -> bool {
        self.0.as_ref().is_some_and(|p| p.is_admin)
    }
}

impl FromRequestParts<AppState> for Viewer {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(header) = authorization(&parts.headers) else {
            return Ok(Viewer(None));
        };
        Ok(Viewer(state.auth.authenticate(Some(header)).await.ok()))
    }
}
