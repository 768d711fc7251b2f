//! Demo namespace with a static two-entry feed.

use time::{Duration, OffsetDateTime};

use crate::application::{
    handler::{FeedRequest, HandlerError, handler_fn},
    registry::{Namespace, RegistryError, RouteDescriptor},
};
use crate::domain::{FeedDocument, FeedEntry};

pub(super) fn namespace() -> Result<Namespace, RegistryError> {
    let hello = RouteDescriptor::new("/hello", "Hello World", handler_fn(hello))?
        .description("A simple hello world feed")
        .example("/example/hello");

    Ok(Namespace::new("example", "Example")
        .url("https://example.com")
        .description("Example routes demonstrating the route system")
        .category("demo")
        .route(hello))
}

async fn hello(_request: FeedRequest) -> Result<FeedDocument, HandlerError> {
    Ok(hello_document(OffsetDateTime::now_utc()))
}

fn hello_document(now: OffsetDateTime) -> FeedDocument {
    let mut first = FeedEntry::new("Hello, feedgate!", "https://example.com/hello");
    first.description = "Welcome to the feedgate feed gateway".to_string();
    first.published = Some(now);
    first.author = Some("feedgate Team".to_string());
    first.categories = vec!["demo".to_string(), "example".to_string()];

    let mut second = FeedEntry::new("Second Item", "https://example.com/second");
    second.description = "This demonstrates multiple items in a feed".to_string();
    second.published = Some(now - Duration::hours(1));
    second.author = Some("feedgate Team".to_string());

    let mut document = FeedDocument::new("Hello World Feed", "https://example.com")
        .with_entries(vec![first, second]);
    document.description = "This is an example feed".to_string();
    document.language = Some("en".to_string());
    document.published = Some(now);
    document
}
