//! Access control stage.

use std::fmt;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use url::form_urlencoded;

use crate::application::error::HttpError;

/// Paths served without credentials.
pub const BYPASS_PATHS: [&str; 4] = ["/", "/robots.txt", "/favicon.ico", "/healthz"];

/// Gate for feed routes.
///
/// With a key configured, a request must carry either `key=<access key>` or
/// `code=<hex sha256 of path + access key>`. The code is bound to the path, so
/// it can be shared for one feed without disclosing the key.
#[derive(Clone, Default)]
pub struct AccessPolicy {
    key: Option<Arc<str>>,
}

impl fmt::Debug for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPolicy")
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AccessPolicy {
    pub fn new(key: Option<String>) -> Self {
        Self {
            key: key.map(Arc::from),
        }
    }

    /// Code accepted for `path`, when a key is configured.
    pub fn code_for(&self, path: &str) -> Option<String> {
        let key = self.key.as_deref()?;
        let mut hasher = Sha256::new();
        hasher.update(path.as_bytes());
        hasher.update(key.as_bytes());
        Some(hex::encode(hasher.finalize().to_vec()))
    }

    pub fn permits(&self, path: &str, query: Option<&str>) -> bool {
        let Some(key) = self.key.as_deref() else {
            return true;
        };
        if BYPASS_PATHS.contains(&path) {
            return true;
        }

        let mut supplied_key = None;
        let mut supplied_code = None;
        for (name, value) in form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
            match name.as_ref() {
                "key" if supplied_key.is_none() => supplied_key = Some(value),
                "code" if supplied_code.is_none() => supplied_code = Some(value),
                _ => {}
            }
        }

        if supplied_key.is_some_and(|supplied| constant_time_eq(&supplied, key)) {
            return true;
        }

        match (supplied_code, self.code_for(path)) {
            (Some(supplied), Some(expected)) => constant_time_eq(&supplied, &expected),
            _ => false,
        }
    }
}

/// Query parameters that carry credentials.
pub const CREDENTIAL_PARAMS: [&str; 2] = ["key", "code"];

fn is_credential(segment: &str) -> bool {
    form_urlencoded::parse(segment.as_bytes())
        .next()
        .is_some_and(|(name, _)| CREDENTIAL_PARAMS.contains(&name.as_ref()))
}

/// Raw query with credential parameters removed; other segments keep their
/// original encoding.
pub fn strip_credentials(query: &str) -> String {
    query
        .split('&')
        .filter(|segment| !segment.is_empty() && !is_credential(segment))
        .collect::<Vec<_>>()
        .join("&")
}

/// Raw query with credential values masked, for logging.
pub fn redact_credentials(query: &str) -> String {
    query
        .split('&')
        .map(|segment| {
            if !is_credential(segment) {
                return segment.to_string();
            }
            let name = segment.split('=').next().unwrap_or(segment);
            format!("{name}=<redacted>")
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn constant_time_eq(left: &str, right: &str) -> bool {
    left.as_bytes().ct_eq(right.as_bytes()).into()
}

pub async fn access_control(
    State(policy): State<AccessPolicy>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if policy.permits(request.uri().path(), request.uri().query()) {
        return next.run(request).await;
    }

    HttpError::new(
        "infra::http::access",
        StatusCode::FORBIDDEN,
        "Access denied",
        "missing or invalid access key or code",
    )
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_are_stripped_from_query() {
        assert_eq!(
            strip_credentials("key=secret&format=atom&filter=%28%3Fi%29bug&code=abc"),
            "format=atom&filter=%28%3Fi%29bug"
        );
        assert_eq!(strip_credentials("k%65y=secret"), "");
        assert_eq!(strip_credentials("keys=1&limit=2"), "keys=1&limit=2");
    }

    #[test]
    fn credentials_are_redacted_for_logs() {
        assert_eq!(
            redact_credentials("limit=2&key=secret&code=abc"),
            "limit=2&key=<redacted>&code=<redacted>"
        );
        assert_eq!(redact_credentials("format=json"), "format=json");
    }

    #[test]
    fn open_without_key() {
        let policy = AccessPolicy::new(None);
        assert!(policy.permits("/example/hello", None));
        assert_eq!(policy.code_for("/example/hello"), None);
    }

    #[test]
    fn key_or_code_grants_access() {
        let policy = AccessPolicy::new(Some("secret".to_string()));
        let code = policy.code_for("/example/hello").unwrap();

        assert!(!policy.permits("/example/hello", None));
        assert!(!policy.permits("/example/hello", Some("key=wrong")));
        assert!(policy.permits("/example/hello", Some("key=secret")));
        assert!(policy.permits("/example/hello", Some(&format!("limit=2&code={code}"))));
    }

    #[test]
    fn code_is_bound_to_path() {
        let policy = AccessPolicy::new(Some("secret".to_string()));
        let code = policy.code_for("/example/hello").unwrap();

        assert!(!policy.permits("/example/other", Some(&format!("code={code}"))));
    }

    #[test]
    fn code_is_sha256_of_path_and_key() {
        let policy = AccessPolicy::new(Some("secret".to_string()));
        let expected = hex::encode(Sha256::digest(b"/example/hellosecret").to_vec());
        assert_eq!(policy.code_for("/example/hello").as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn bypass_paths_stay_open() {
        let policy = AccessPolicy::new(Some("secret".to_string()));
        for path in BYPASS_PATHS {
            assert!(policy.permits(path, None), "{path}");
        }
    }

    #[test]
    fn debug_redacts_key() {
        let policy = AccessPolicy::new(Some("secret".to_string()));
        assert!(!format!("{policy:?}").contains("secret"));
    }
}
