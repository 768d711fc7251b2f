//! Cache key derivation.
//!
//! A [`Fingerprint`] names both a cache slot and a coalescing group, so two
//! requests share one only when they would render the same bytes.

use std::fmt;

use sha2::{Digest, Sha256};

pub const KEY_PREFIX: &str = "feedgate:cache:";

/// Query parameters that change the rendered entry list beyond `limit`.
pub const TRANSFORM_PARAMS: [&str; 6] = [
    "filter",
    "filterout",
    "filter_title",
    "filter_description",
    "filter_time",
    "sorted",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Digest of `path:format:limit`, extended with the transform parameters
    /// that are present.
    ///
    /// `format` is the resolved format name, so `?format=rss` and a bare
    /// request land on the same slot. When a parameter repeats, the first
    /// value wins, matching how the query is parsed for rendering.
    pub fn derive(path: &str, format: &str, query: &[(String, String)]) -> Self {
        let limit = first_value(query, "limit").unwrap_or_default();
        let mut material = format!("{path}:{format}:{limit}");

        for name in TRANSFORM_PARAMS {
            if let Some(value) = first_value(query, name) {
                material.push('&');
                material.push_str(name);
                material.push('=');
                material.push_str(value);
            }
        }

        let mut hasher = Sha256::new();
        hasher.update(material.as_bytes());
        let digest = hex::encode(hasher.finalize().to_vec());
        Self(format!("{KEY_PREFIX}{digest}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn first_value<'a>(query: &'a [(String, String)], name: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}
