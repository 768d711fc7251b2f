//! Route table built once at startup.
//!
//! Namespaces group routes under a common path prefix. The table is plain
//! data: the HTTP layer mounts it, the probe command resolves paths against
//! it, and the index page lists it.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use thiserror::Error;

use super::handler::FeedHandler;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("route pattern `{pattern}` is invalid: {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },
    #[error("namespace key `{0}` is invalid")]
    InvalidNamespace(String),
    #[error("route `{0}` is registered twice")]
    DuplicateRoute(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    /// Captures the rest of the path; always last.
    Rest(String),
}

/// Path pattern relative to its namespace, e.g. `/issue/{user}/{repo}`.
///
/// Uses the same `{name}` / `{*name}` syntax as the router, so the full path
/// can be mounted as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Result<Self, RegistryError> {
        let invalid = |reason| RegistryError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        let Some(body) = pattern.strip_prefix('/') else {
            return Err(invalid("must start with `/`"));
        };

        let parts: Vec<&str> = body.split('/').collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (index, part) in parts.iter().enumerate() {
            let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(inner) => match inner.strip_prefix('*') {
                    Some(_) if index + 1 != parts.len() => {
                        return Err(invalid("wildcard must be the last segment"));
                    }
                    Some("") => return Err(invalid("wildcard needs a name")),
                    Some(name) => Segment::Rest(name.to_string()),
                    None if inner.is_empty() => return Err(invalid("parameter needs a name")),
                    None => Segment::Param(inner.to_string()),
                },
                None if part.is_empty() => return Err(invalid("empty path segment")),
                None if part.contains(['{', '}']) => {
                    return Err(invalid("braces must wrap a whole segment"));
                }
                None => Segment::Literal((*part).to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match a path relative to the namespace and capture parameters.
    ///
    /// Captured values are percent-decoded. Empty segments never match a
    /// parameter.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let body = path.strip_prefix('/')?;
        let mut parts = body.split('/');
        let mut params = HashMap::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => {
                    if parts.next()? != literal {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let part = parts.next().filter(|part| !part.is_empty())?;
                    params.insert(name.clone(), decode(part));
                }
                Segment::Rest(name) => {
                    let rest: Vec<&str> = parts.by_ref().collect();
                    let rest = rest.join("/");
                    if rest.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), decode(&rest));
                }
            }
        }

        if parts.next().is_some() {
            return None;
        }
        Some(params)
    }
}

fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Clone)]
pub struct RouteDescriptor {
    pub pattern: RoutePattern,
    pub name: String,
    pub description: String,
    /// Example request path including the namespace prefix.
    pub example: String,
    pub handler: Arc<dyn FeedHandler>,
}

impl RouteDescriptor {
    pub fn new(
        pattern: &str,
        name: impl Into<String>,
        handler: Arc<dyn FeedHandler>,
    ) -> Result<Self, RegistryError> {
        Ok(Self {
            pattern: RoutePattern::parse(pattern)?,
            name: name.into(),
            description: String::new(),
            example: String::new(),
            handler,
        })
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn example(mut self, example: impl Into<String>) -> Self {
        self.example = example.into();
        self
    }
}

impl fmt::Debug for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDescriptor")
            .field("pattern", &self.pattern)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A group of routes mounted under `/{key}`.
#[derive(Debug, Clone)]
pub struct Namespace {
    pub key: String,
    pub name: String,
    pub url: String,
    pub description: String,
    pub language: String,
    pub categories: Vec<String>,
    pub routes: Vec<RouteDescriptor>,
}

impl Namespace {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            url: String::new(),
            description: String::new(),
            language: "en".to_string(),
            categories: Vec::new(),
            routes: Vec::new(),
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    pub fn route(mut self, route: RouteDescriptor) -> Self {
        self.routes.push(route);
        self
    }

    fn full_path(&self, route: &RouteDescriptor) -> String {
        format!("/{}{}", self.key, route.pattern)
    }
}

/// A route as seen from outside its namespace.
pub struct MountedRoute<'a> {
    pub path: String,
    pub namespace: &'a Namespace,
    pub route: &'a RouteDescriptor,
}

/// A request path matched to a route.
pub struct ResolvedRoute<'a> {
    pub namespace: &'a Namespace,
    pub route: &'a RouteDescriptor,
    pub params: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct RouteRegistry {
    namespaces: Vec<Namespace>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a namespace. Rejects keys that are not a single path segment and
    /// routes whose full path is already taken.
    pub fn register(&mut self, namespace: Namespace) -> Result<(), RegistryError> {
        if namespace.key.is_empty() || namespace.key.contains(['/', '{', '}']) {
            return Err(RegistryError::InvalidNamespace(namespace.key));
        }

        let mut taken: HashSet<String> = self.routes().map(|mounted| mounted.path).collect();
        for route in &namespace.routes {
            let path = namespace.full_path(route);
            if !taken.insert(path.clone()) {
                return Err(RegistryError::DuplicateRoute(path));
            }
        }

        self.namespaces.push(namespace);
        Ok(())
    }

    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    /// Every route in registration order.
    pub fn routes(&self) -> impl Iterator<Item = MountedRoute<'_>> {
        self.namespaces.iter().flat_map(|namespace| {
            namespace.routes.iter().map(move |route| MountedRoute {
                path: namespace.full_path(route),
                namespace,
                route,
            })
        })
    }

    /// First route whose pattern matches `path`.
    pub fn resolve(&self, path: &str) -> Option<ResolvedRoute<'_>> {
        self.namespaces.iter().find_map(|namespace| {
            let rest = path
                .strip_prefix('/')?
                .strip_prefix(namespace.key.as_str())?;
            namespace.routes.iter().find_map(|route| {
                route.pattern.matches(rest).map(|params| ResolvedRoute {
                    namespace,
                    route,
                    params,
                })
            })
        })
    }
}
