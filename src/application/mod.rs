//! Feed handling: handler contract, route table, transforms and renderers.

pub mod error;
pub mod handler;
pub mod probe;
pub mod registry;
pub mod syndication;
pub mod transform;
