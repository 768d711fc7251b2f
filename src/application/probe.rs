//! Run a single route's handler outside the HTTP pipeline.

use std::fmt;

use time::format_description::well_known::Rfc3339;
use url::form_urlencoded;

use super::{error::AppError, handler::FeedRequest, registry::RouteRegistry};
use crate::domain::FeedDocument;

/// What a handler produced for one path.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub path: String,
    pub namespace: String,
    pub route: String,
    pub document: FeedDocument,
    /// Number of entries shown by `Display`.
    pub limit: usize,
}

/// Resolve `target` (path with optional query) and run its handler. No
/// cache, transform or rendering is involved.
pub async fn probe(
    registry: &RouteRegistry,
    target: &str,
    limit: usize,
) -> Result<ProbeReport, AppError> {
    let target = if target.starts_with('/') {
        target.to_string()
    } else {
        format!("/{target}")
    };
    let (path, raw_query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), query),
        None => (target.clone(), ""),
    };

    let resolved = registry
        .resolve(&path)
        .ok_or_else(|| AppError::UnknownRoute(path.clone()))?;

    let mut query = std::collections::HashMap::new();
    for (name, value) in form_urlencoded::parse(raw_query.as_bytes()).into_owned() {
        query.entry(name).or_insert(value);
    }

    let request = FeedRequest {
        url: format!("http://localhost{target}"),
        path: path.clone(),
        params: resolved.params,
        query,
    };
    let document = resolved.route.handler.fetch(&request).await?;

    Ok(ProbeReport {
        path,
        namespace: resolved.namespace.name.clone(),
        route: resolved.route.name.clone(),
        document,
        limit,
    })
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let document = &self.document;
        writeln!(f, "Route:       {} ({} / {})", self.path, self.namespace, self.route)?;
        writeln!(f, "Title:       {}", document.title)?;
        writeln!(f, "Link:        {}", document.link)?;
        if !document.description.is_empty() {
            writeln!(f, "Description: {}", document.description)?;
        }
        writeln!(f, "Entries:     {}", document.entries.len())?;

        let shown = document.entries.iter().take(self.limit);
        for (index, entry) in shown.enumerate() {
            let published = entry
                .published
                .and_then(|at| at.format(&Rfc3339).ok())
                .unwrap_or_else(|| "-".to_string());
            writeln!(f)?;
            writeln!(f, "[{}] {}", index + 1, entry.title)?;
            writeln!(f, "    link:      {}", entry.link)?;
            writeln!(f, "    published: {published}")?;
            if let Some(author) = entry.author.as_deref() {
                writeln!(f, "    author:    {author}")?;
            }
        }

        let hidden = document.entries.len().saturating_sub(self.limit);
        if hidden > 0 {
            writeln!(f, "\n... {hidden} more")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::application::{
        handler::{HandlerError, handler_fn},
        registry::{Namespace, RouteDescriptor},
    };
    use crate::domain::FeedEntry;

    fn registry() -> RouteRegistry {
        let echo = handler_fn(|request: FeedRequest| async move {
            let user = request.param("user").ok_or(HandlerError::MissingParam("user"))?;
            let entries = (1..=3)
                .map(|n| FeedEntry::new(format!("{user} #{n}"), format!("https://x/{user}/{n}")))
                .collect();
            let mut document = FeedDocument::new(format!("Posts by {user}"), "https://x")
                .with_entries(entries);
            document.description = request.query("tag").unwrap_or("all").to_string();
            Ok::<_, HandlerError>(document)
        });
        let broken = handler_fn(|_| async { Err(HandlerError::Upstream("503".into())) });

        let mut registry = RouteRegistry::new();
        registry
            .register(
                Namespace::new("demo", "Demo")
                    .route(RouteDescriptor::new("/posts/{user}", "Posts", echo).unwrap())
                    .route(RouteDescriptor::new("/broken", "Broken", Arc::clone(&broken)).unwrap()),
            )
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn probe_runs_handler_with_params_and_query() {
        let report = probe(&registry(), "demo/posts/ana?tag=rust", 2).await.unwrap();

        assert_eq!(report.path, "/demo/posts/ana");
        assert_eq!(report.document.title, "Posts by ana");
        assert_eq!(report.document.description, "rust");

        let printed = report.to_string();
        assert!(printed.contains("[1] ana #1"));
        assert!(printed.contains("[2] ana #2"));
        assert!(!printed.contains("[3]"));
        assert!(printed.contains("... 1 more"));
    }

    #[tokio::test]
    async fn unknown_route_and_handler_failure_are_errors() {
        let registry = registry();

        let err = probe(&registry, "/demo/missing", 5).await.unwrap_err();
        assert!(matches!(err, AppError::UnknownRoute(path) if path == "/demo/missing"));

        let err = probe(&registry, "/demo/broken", 5).await.unwrap_err();
        assert!(matches!(err, AppError::Handler(HandlerError::Upstream(_))));
    }
}
