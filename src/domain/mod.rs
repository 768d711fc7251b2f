//! Domain types shared across the pipeline.

pub mod feed;

pub use feed::{Enclosure, FeedDocument, FeedEntry};
