use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::Instrument;

/// Permissive CORS: any origin, `GET`/`POST`/`OPTIONS`, `Content-Type`.
///
/// Preflight (`OPTIONS`) requests are answered here and never reach a handler.
pub async fn cors(req: Request, next: Next) -> Response {
    let mut res = if req.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(req).await
    };

    let headers = res.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Content-Type"));
    res
}

/// One span per request; logs the status and latency on completion.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let span = tracing::info_span!("http_request", method = %req.method(), path = %req.uri().path());
    let started = Instant::now();

    async move {
        let res = next.run(req).await;
        let status = res.status();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), elapsed_ms, "request failed");
        } else {
            tracing::info!(status = status.as_u16(), elapsed_ms, "request handled");
        }
        res
    }
    .instrument(span)
    .await
}
