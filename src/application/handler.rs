//! Contract between the pipeline and the code that fetches feed content.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::FeedDocument;

/// Everything a handler may know about the request it serves.
#[derive(Debug, Clone, Default)]
pub struct FeedRequest {
    /// Request path, e.g. `/github/issue/rust-lang/rust`.
    pub path: String,
    /// Values captured by the route pattern.
    pub params: HashMap<String, String>,
    /// Decoded query parameters; the first value wins on repeats.
    pub query: HashMap<String, String>,
    /// Absolute URL of the request, used for self links.
    pub url: String,
}

impl FeedRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("missing route parameter `{0}`")]
    MissingParam(&'static str),
    #[error("upstream request failed: {0}")]
    Upstream(String),
    #[error("could not parse upstream content: {0}")]
    Parse(String),
}

/// Produces a [`FeedDocument`] for one route.
///
/// Handlers must not touch the response cache; the pipeline owns it.
#[async_trait]
pub trait FeedHandler: Send + Sync {
    async fn fetch(&self, request: &FeedRequest) -> Result<FeedDocument, HandlerError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> FeedHandler for FnHandler<F>
where
    F: Fn(FeedRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<FeedDocument, HandlerError>> + Send,
{
    async fn fetch(&self, request: &FeedRequest) -> Result<FeedDocument, HandlerError> {
        (self.0)(request.clone()).await
    }
}

/// Wrap an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn FeedHandler>
where
    F: Fn(FeedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<FeedDocument, HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
