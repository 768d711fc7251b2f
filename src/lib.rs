//! feedgate: serves handler-produced feeds as RSS, Atom and JSON Feed behind
//! a caching, request-coalescing pipeline.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod routes;
