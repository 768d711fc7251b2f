//! CORS, ETag and Cache-Control stage.

use std::time::Duration;

use axum::{
    body::{Body, to_bytes},
    extract::State,
    http::{
        HeaderMap, HeaderValue, Method, Request, StatusCode,
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_LENGTH, ETAG, IF_NONE_MATCH,
        },
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};

use crate::{application::error::HttpError, infra::error::InfraError};

const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type";
const MAX_BUFFERED_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    allow_origin: HeaderValue,
    cache_control: HeaderValue,
}

impl HeaderPolicy {
    pub fn new(allow_origin: &str, max_age: Duration) -> Result<Self, InfraError> {
        let allow_origin = HeaderValue::from_str(allow_origin).map_err(|err| {
            InfraError::configuration(format!("invalid access.allow_origin `{allow_origin}`: {err}"))
        })?;
        let cache_control = HeaderValue::from_str(&format!("public, max-age={}", max_age.as_secs()))
            .map_err(|err| InfraError::configuration(err.to_string()))?;

        Ok(Self {
            allow_origin,
            cache_control,
        })
    }

    fn apply_cors(&self, headers: &mut HeaderMap) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
    }
}

/// Sets CORS headers on every response and answers preflight requests.
///
/// A 200 response is buffered to derive its ETag; a matching `If-None-Match`
/// turns it into an empty 304.
pub async fn response_headers(
    State(policy): State<HeaderPolicy>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        policy.apply_cors(response.headers_mut());
        return response;
    }

    let if_none_match = request.headers().get(IF_NONE_MATCH).cloned();
    let response = next.run(request).await;

    let mut response = if response.status() == StatusCode::OK {
        with_validators(response, if_none_match.as_ref(), &policy).await
    } else {
        response
    };
    policy.apply_cors(response.headers_mut());
    response
}

async fn with_validators(
    response: Response,
    if_none_match: Option<&HeaderValue>,
    policy: &HeaderPolicy,
) -> Response {
    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_BUFFERED_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return HttpError::new(
                "infra::http::headers",
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                format!("failed to buffer response body: {err}"),
            )
            .into_response();
        }
    };

    let etag = entity_tag(&bytes);
    let Ok(etag_value) = HeaderValue::from_str(&etag) else {
        return Response::from_parts(parts, Body::from(bytes));
    };

    if if_none_match.is_some_and(|candidates| etag_matches(candidates, &etag)) {
        let mut not_modified = StatusCode::NOT_MODIFIED.into_response();
        let headers = not_modified.headers_mut();
        headers.insert(ETAG, etag_value);
        headers.insert(CACHE_CONTROL, policy.cache_control.clone());
        return not_modified;
    }

    parts.headers.insert(ETAG, etag_value);
    parts
        .headers
        .insert(CACHE_CONTROL, policy.cache_control.clone());
    parts.headers.remove(CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(bytes))
}

/// Strong entity tag: quoted hex SHA-256 of the body.
pub fn entity_tag(body: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Sha256::digest(body).to_vec()))
}

fn etag_matches(candidates: &HeaderValue, etag: &str) -> bool {
    let Ok(candidates) = candidates.to_str() else {
        return false;
    };
    candidates.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate == etag || candidate.strip_prefix("W/") == Some(etag)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_tag_is_quoted_sha256() {
        let tag = entity_tag(b"hello");
        assert_eq!(
            tag,
            "\"2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824\""
        );
    }

    #[test]
    fn if_none_match_lists_and_wildcards() {
        let tag = entity_tag(b"feed");
        let list = HeaderValue::from_str(&format!("\"other\", W/{tag}")).unwrap();

        assert!(etag_matches(&list, &tag));
        assert!(etag_matches(&HeaderValue::from_static("*"), &tag));
        assert!(!etag_matches(&HeaderValue::from_static("\"other\""), &tag));
    }

    #[test]
    fn invalid_origin_is_a_configuration_error() {
        let err = HeaderPolicy::new("bad\norigin", Duration::from_secs(300)).unwrap_err();
        assert!(matches!(err, InfraError::Configuration { .. }));
    }
}
