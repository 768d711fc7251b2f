use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::access::redact_credentials;
use crate::application::error::ErrorReport;

pub const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// Logging stage: assigns the request id and reports every outcome.
pub async fn log_requests(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let method = request.method().clone();
    let uri = request.uri().clone();
    let query = uri.query().map(redact_credentials).unwrap_or_default();
    let start = Instant::now();

    info!(
        target = "feedgate::http::request",
        method = %method,
        path = %uri.path(),
        query = %query,
        request_id = %request_id,
        "request received",
    );

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed = start.elapsed();
    let elapsed_ms = elapsed.as_millis();
    metrics::histogram!("feedgate_request_duration_ms").record(elapsed.as_secs_f64() * 1000.0);

    if status.is_client_error() || status.is_server_error() {
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "feedgate::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = %query,
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = %request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "feedgate::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = %query,
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                request_id = %request_id,
                "client request error",
            );
        }
    } else {
        info!(
            target = "feedgate::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            elapsed_ms = elapsed_ms,
            request_id = %request_id,
            "request completed",
        );
    }

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID, value);
    }
    response.extensions_mut().insert(ctx);
    response
}
