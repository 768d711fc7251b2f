//! HTTP surface: route mounting and the request pipeline.

mod access;
mod endpoints;
mod headers;
mod middleware;
mod params;
mod pipeline;
mod render;

use std::sync::Arc;

use axum::{Router, routing::get};

pub use access::{AccessPolicy, BYPASS_PATHS};
pub use headers::{HeaderPolicy, entity_tag};
pub use middleware::{REQUEST_ID, RequestContext};
pub use pipeline::{PIPELINE, Stage};
pub use render::{FeedPayload, request_url};

use crate::{
    application::registry::RouteRegistry, cache::CacheState, config::AccessSettings,
    infra::error::InfraError,
};

#[derive(Clone)]
pub struct HttpState {
    pub registry: Arc<RouteRegistry>,
    pub cache: CacheState,
    pub access: AccessPolicy,
    pub headers: HeaderPolicy,
    pub disallow_robots: bool,
}

impl HttpState {
    pub fn new(
        registry: Arc<RouteRegistry>,
        cache: CacheState,
        access: &AccessSettings,
    ) -> Result<Self, InfraError> {
        let headers = HeaderPolicy::new(&access.allow_origin, cache.ttl)?;
        Ok(Self {
            registry,
            cache,
            access: AccessPolicy::new(access.key.clone()),
            headers,
            disallow_robots: access.disallow_robots,
        })
    }
}

/// Mount the built-in endpoints and the registered feed routes behind the
/// full pipeline.
pub fn build_router(state: HttpState) -> Router {
    let routes = Router::new()
        .route("/", get(endpoints::index))
        .route("/healthz", get(endpoints::healthz))
        .route("/robots.txt", get(endpoints::robots))
        .route("/favicon.ico", get(endpoints::favicon))
        .fallback(endpoints::feed)
        .with_state(state.clone());

    pipeline::compose(routes, &state)
}
