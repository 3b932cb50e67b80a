use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tracing::Instrument;

/// Log one line when a request arrives and one when it completes. Everything
/// the handler logs is attached to a span carrying the request id.
pub async fn log_request(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    // Path only; query strings can carry filter values nobody needs in the logs.
    let path = request.uri().path().to_string();

    let req_id: String = request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let span = tracing::info_span!("request", request_id = %req_id, method = %method, path = %path);

    async move {
        tracing::debug!("incoming request");

        let response = next.run(request).await;

        let duration_ms = start.elapsed().as_millis();
        let status = response.status();

        if status.is_server_error() {
            tracing::error!(status = %status, duration_ms = %duration_ms, "request completed with error");
        } else if status.is_client_error() {
            tracing::warn!(status = %status, duration_ms = %duration_ms, "request completed with client error");
        } else {
            tracing::info!(status = %status, duration_ms = %duration_ms, "request completed successfully");
        }

        response
    }
    .instrument(span)
    .await
}

pub fn request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}
