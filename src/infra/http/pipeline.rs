//! Fixed stage order of the request pipeline.

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
};

use super::{
    HttpState, access::access_control, headers::response_headers, middleware::log_requests,
    params::parse_parameters, render::render_feed,
};
use crate::cache::response_cache_layer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Logging,
    AccessControl,
    ResponseHeaders,
    ParameterTransform,
    CacheAndDedup,
    Render,
}

/// Stages from outermost to innermost. Each wraps everything after it; the
/// terminal endpoint sits inside `Render`.
pub const PIPELINE: [Stage; 6] = [
    Stage::Logging,
    Stage::AccessControl,
    Stage::ResponseHeaders,
    Stage::ParameterTransform,
    Stage::CacheAndDedup,
    Stage::Render,
];

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Logging => "logging",
            Stage::AccessControl => "access_control",
            Stage::ResponseHeaders => "response_headers",
            Stage::ParameterTransform => "parameter_transform",
            Stage::CacheAndDedup => "cache_and_dedup",
            Stage::Render => "render",
        }
    }

    fn wrap(self, router: Router, state: &HttpState) -> Router {
        match self {
            Stage::Logging => router.layer(from_fn(log_requests)),
            Stage::AccessControl => {
                router.layer(from_fn_with_state(state.access.clone(), access_control))
            }
            Stage::ResponseHeaders => {
                router.layer(from_fn_with_state(state.headers.clone(), response_headers))
            }
            Stage::ParameterTransform => router.layer(from_fn(parse_parameters)),
            Stage::CacheAndDedup => {
                router.layer(from_fn_with_state(state.cache.clone(), response_cache_layer))
            }
            Stage::Render => router.layer(from_fn(render_feed)),
        }
    }
}

/// Wrap `router` in every stage. A layer added later runs first, so the
/// innermost stage is applied first.
pub fn compose(router: Router, state: &HttpState) -> Router {
    PIPELINE
        .iter()
        .rev()
        .fold(router, |router, stage| stage.wrap(router, state))
}
