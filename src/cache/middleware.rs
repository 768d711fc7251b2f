//! Cache stage.
//!
//! Serves stored feeds, collapses concurrent misses for the same fingerprint
//! into one run of the inner stages and hands cacheable results to the
//! background writer.

use axum::{
    body::{Body, Bytes, to_bytes},
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument, warn};

use super::{CacheState, CoalesceError, Fingerprint};
use crate::application::{
    error::{ErrorReport, HttpError},
    transform::FeedQuery,
};

/// Marks a response whose body is a rendered feed that may be stored.
#[derive(Debug, Clone, Copy)]
pub struct CacheableResponse;

pub const CACHE_STATUS: HeaderName = HeaderName::from_static("cache-status");

const MAX_CAPTURE_BYTES: usize = 16 * 1024 * 1024;

/// A fully buffered response that can be handed to every coalesced caller.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    cacheable: bool,
    report: Option<ErrorReport>,
}

impl CapturedResponse {
    async fn capture(response: Response) -> Result<Self, String> {
        let (mut parts, body) = response.into_parts();
        let body = to_bytes(body, MAX_CAPTURE_BYTES)
            .await
            .map_err(|err| format!("failed to buffer response body: {err}"))?;

        let cacheable = parts.status == StatusCode::OK
            && parts.extensions.get::<CacheableResponse>().is_some();

        Ok(Self {
            status: parts.status,
            headers: parts.headers,
            body,
            cacheable,
            report: parts.extensions.remove::<ErrorReport>(),
        })
    }

    /// Body to store, if this response may be cached at all.
    fn payload(&self) -> Option<String> {
        if !self.cacheable {
            return None;
        }
        std::str::from_utf8(&self.body).ok().map(str::to_owned)
    }

    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
            .headers_mut()
            .insert(CACHE_STATUS, HeaderValue::from_static("MISS"));
        if let Some(report) = self.report {
            report.attach(&mut response);
        }
        response
    }
}

/// Cache and coalescing stage.
///
/// Only GET requests are considered. A store error is logged and treated as a
/// miss. Followers of a coalesced miss receive the leader's response, error
/// responses included; only a 200 marked [`CacheableResponse`] is stored.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let query = request
        .extensions()
        .get::<FeedQuery>()
        .cloned()
        .unwrap_or_else(|| FeedQuery::from_raw(request.uri().query()));
    let path = request.uri().path().to_string();
    let key = Fingerprint::derive(&path, query.format.as_str(), &query.pairs);

    if let Some(store) = &cache.store {
        match store.get(key.as_str()).await {
            Ok(payload) => {
                metrics::counter!("feedgate_cache_hit_total").increment(1);
                debug!(cache = "response", outcome = "hit", backend = store.backend(), "serving cached feed");
                return hit_response(query.format.content_type(), payload);
            }
            Err(err) if err.is_miss() => {}
            Err(err) => {
                metrics::counter!("feedgate_cache_error_total").increment(1);
                warn!(
                    target = "cache::middleware",
                    backend = store.backend(),
                    key = %key,
                    error = %err,
                    "cache lookup failed, treating as miss"
                );
            }
        }
    }

    metrics::counter!("feedgate_cache_miss_total").increment(1);
    debug!(cache = "response", outcome = "miss", "running feed pipeline");

    let writer = cache.writer.clone();
    let ttl = cache.ttl;
    let slot = key.to_string();
    let (outcome, shared) = cache
        .coalescer
        .run(key.as_str(), move || async move {
            let captured = CapturedResponse::capture(next.run(request).await).await?;
            if let (Some(writer), Some(payload)) = (writer, captured.payload()) {
                writer.submit(slot, payload, ttl);
            }
            Ok::<_, String>(captured)
        })
        .await;

    match outcome {
        Ok(captured) => {
            debug!(cache = "response", shared, status = captured.status.as_u16(), "feed pipeline finished");
            captured.into_response()
        }
        Err(err) => {
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            let source = match err {
                CoalesceError::Failed(_) => "cache::capture",
                CoalesceError::Aborted(_) => "cache::coalesce",
            };
            HttpError::from_error(source, status, "Internal server error", &err).into_response()
        }
    }
}

fn hit_response(content_type: &'static str, payload: String) -> Response {
    let mut response = Response::new(Body::from(payload));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(CACHE_STATUS, HeaderValue::from_static("HIT"));
    response
}
