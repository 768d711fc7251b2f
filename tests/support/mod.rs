#![allow(dead_code)]

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, StatusCode},
};
use feedgate::{
    application::{
        handler::{FeedRequest, HandlerError, handler_fn},
        registry::{Namespace, RouteDescriptor, RouteRegistry},
    },
    cache::{CacheConfig, CacheState, CacheStore, MemoryStore},
    config::AccessSettings,
    domain::{FeedDocument, FeedEntry},
    infra::http::{self, HttpState},
};
use time::macros::datetime;
use tower::ServiceExt;

/// Latency of the counting handler, long enough for concurrent requests to
/// meet in the coalescer.
pub const HANDLER_DELAY: Duration = Duration::from_millis(100);

pub struct Harness {
    pub router: Router,
    pub calls: Arc<AtomicUsize>,
    pub memory: Arc<MemoryStore>,
}

impl Harness {
    pub fn new(access_key: Option<&str>) -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let memory = Arc::new(MemoryStore::new(NonZeroUsize::new(64).unwrap()));
        let store: Arc<dyn CacheStore> = memory.clone();
        let (cache, _writer) = CacheState::with_store(Some(store), &CacheConfig::default());

        let access = AccessSettings {
            key: access_key.map(str::to_string),
            allow_origin: "*".to_string(),
            disallow_robots: false,
        };
        let state = HttpState::new(Arc::new(registry(Arc::clone(&calls))), cache, &access)
            .expect("valid http state");

        Self {
            router: http::build_router(state),
            calls,
            memory,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn get(&self, uri: &str) -> Reply {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn send(&self, request: Request<Body>) -> Reply {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        Reply {
            status,
            headers,
            body: String::from_utf8(body.to_vec()).unwrap(),
        }
    }

    /// Wait for the background writer to store `expected` entries.
    pub async fn stored(&self, expected: usize) {
        for _ in 0..1000 {
            if self.memory.len() == expected {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!(
            "store holds {} entries, expected {expected}",
            self.memory.len()
        );
    }
}

#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl Reply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

fn registry(calls: Arc<AtomicUsize>) -> RouteRegistry {
    let counting = handler_fn(move |_request: FeedRequest| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(HANDLER_DELAY).await;
            Ok::<_, HandlerError>(issues())
        }
    });
    let broken = handler_fn(|_request: FeedRequest| async {
        Err::<FeedDocument, _>(HandlerError::Upstream("upstream returned 502".into()))
    });
    let empty = handler_fn(|_request: FeedRequest| async {
        Ok::<_, HandlerError>(FeedDocument::new("Nothing", "https://x"))
    });
    let user = handler_fn(|request: FeedRequest| async move {
        let Some(name) = request.param("name") else {
            return Err(HandlerError::MissingParam("name"));
        };
        let entry = FeedEntry::new(format!("hello {name}"), format!("https://x/{name}"));
        Ok(FeedDocument::new(format!("User {name}"), "https://x").with_entries(vec![entry]))
    });

    let namespace = Namespace::new("ns", "Test namespace")
        .url("https://x")
        .route(RouteDescriptor::new("/route", "Issues", counting).unwrap())
        .route(RouteDescriptor::new("/broken", "Broken", broken).unwrap())
        .route(RouteDescriptor::new("/empty", "Empty", empty).unwrap())
        .route(RouteDescriptor::new("/user/{name}", "User", user).unwrap());

    let mut registry = RouteRegistry::new();
    registry.register(namespace).unwrap();
    registry
}

/// Three entries: "Bug A" at T, "Feature B" at T+1h, "Bug C" at T-1h.
pub fn issues() -> FeedDocument {
    let t = datetime!(2024-05-01 12:00 UTC);
    let entries = [
        ("Bug A", t),
        ("Feature B", t + time::Duration::hours(1)),
        ("Bug C", t - time::Duration::hours(1)),
    ]
    .into_iter()
    .enumerate()
    .map(|(index, (title, published))| {
        let mut entry = FeedEntry::new(title, format!("https://x/{index}"));
        entry.description = format!("<p>{title}</p>");
        entry.published = Some(published);
        entry
    })
    .collect();

    let mut document = FeedDocument::new("Issues", "https://x").with_entries(entries);
    document.description = "Issue tracker".to_string();
    document
}
