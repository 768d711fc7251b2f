//! Terminal endpoints: registered feed routes and the built-in pages.

use std::collections::HashMap;
use std::fmt::Write as _;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::debug;

use super::{
    HttpState,
    access::CREDENTIAL_PARAMS,
    render::{FeedPayload, request_url},
};
use crate::application::{
    error::HttpError,
    handler::FeedRequest,
    transform::FeedQuery,
};

/// Resolves the path in the registry and runs the route's handler.
pub async fn feed(State(state): State<HttpState>, request: Request<Body>) -> Response {
    if !matches!(*request.method(), Method::GET | Method::HEAD) {
        return HttpError::new(
            "infra::http::endpoints",
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
            format!("{} is not served", request.method()),
        )
        .into_response();
    }

    let path = request.uri().path().to_string();
    let Some(resolved) = state.registry.resolve(&path) else {
        return HttpError::new(
            "infra::http::endpoints",
            StatusCode::NOT_FOUND,
            "Route not found",
            format!("no route matches `{path}`"),
        )
        .into_response();
    };

    let pairs = match request.extensions().get::<FeedQuery>() {
        Some(query) => query.pairs.clone(),
        None => FeedQuery::from_raw(request.uri().query()).pairs,
    };
    let feed_request = FeedRequest {
        url: request_url(&request),
        path,
        params: resolved.params,
        query: first_values(pairs),
    };

    debug!(
        target = "feedgate::http::endpoints",
        namespace = %resolved.namespace.key,
        route = %resolved.route.name,
        "running feed handler"
    );

    match resolved.route.handler.fetch(&feed_request).await {
        Ok(document) => FeedPayload::respond(document),
        Err(err) => HttpError::from(err).into_response(),
    }
}

/// First value per parameter; credentials are never handed to handlers.
fn first_values(pairs: Vec<(String, String)>) -> HashMap<String, String> {
    let mut query = HashMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        if CREDENTIAL_PARAMS.contains(&name.as_str()) {
            continue;
        }
        query.entry(name).or_insert(value);
    }
    query
}

/// Plain-text index of mounted routes and supported query parameters.
pub async fn index(State(state): State<HttpState>) -> Response {
    let mut body = String::from("feedgate\n\nRoutes:\n");
    for mounted in state.registry.routes() {
        let _ = write!(body, "  {}  {}", mounted.path, mounted.route.name);
        if !mounted.route.example.is_empty() {
            let _ = write!(body, "  (e.g. {})", mounted.route.example);
        }
        body.push('\n');
    }
    body.push_str(
        "\nQuery parameters:\n  format=rss|atom|json\n  limit=N\n  filter, filterout, filter_title, filter_description=REGEX\n  filter_time=SECONDS\n  sorted=asc|desc\n",
    );

    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

pub async fn healthz() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

pub async fn robots(State(state): State<HttpState>) -> Response {
    let rule = if state.disallow_robots {
        "Disallow: /"
    } else {
        "Allow: /"
    };
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("User-agent: *\n{rule}\n"),
    )
        .into_response()
}

pub async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_value_wins() {
        let query = first_values(vec![
            ("limit".to_string(), "2".to_string()),
            ("limit".to_string(), "9".to_string()),
        ]);
        assert_eq!(query["limit"], "2");
    }

    #[test]
    fn credentials_are_not_passed_to_handlers() {
        let query = first_values(vec![
            ("key".to_string(), "secret".to_string()),
            ("code".to_string(), "abc".to_string()),
            ("user".to_string(), "ana".to_string()),
        ]);
        assert_eq!(query.len(), 1);
        assert_eq!(query["user"], "ana");
    }
}
