//! Render stage.

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::access::strip_credentials;
use crate::{
    application::{error::HttpError, transform::FeedQuery},
    cache::CacheableResponse,
    domain::FeedDocument,
};

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Document produced by the terminal endpoint, awaiting serialization.
#[derive(Debug, Clone)]
pub struct FeedPayload(pub FeedDocument);

impl FeedPayload {
    pub fn respond(document: FeedDocument) -> Response {
        let mut response = StatusCode::OK.into_response();
        response.extensions_mut().insert(Self(document));
        response
    }
}

/// Serializes the handler's document in the requested format.
///
/// Responses without a [`FeedPayload`] (errors, built-in endpoints) pass
/// through untouched.
pub async fn render_feed(request: Request<Body>, next: Next) -> Response {
    let query = request
        .extensions()
        .get::<FeedQuery>()
        .cloned()
        .unwrap_or_else(|| FeedQuery::from_raw(request.uri().query()));
    let self_url = request_url(&request);

    let mut response = next.run(request).await;
    let Some(FeedPayload(mut document)) = response.extensions_mut().remove::<FeedPayload>() else {
        return response;
    };

    if !document.is_renderable() {
        return HttpError::new(
            "infra::http::render",
            StatusCode::INTERNAL_SERVER_ERROR,
            "feed has no entries",
            format!("`{}` returned no entries", document.title),
        )
        .into_response();
    }

    query.transform.apply(&mut document);

    match query.format.render(&document, &self_url) {
        Ok(body) => {
            let mut response =
                ([(header::CONTENT_TYPE, query.format.content_type())], body).into_response();
            response.extensions_mut().insert(CacheableResponse);
            response
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

/// Absolute URL of the request as the client addressed it, without the
/// access credentials. The result ends up in rendered and cached feeds.
pub fn request_url<B>(request: &Request<B>) -> String {
    let headers = request.headers();
    let scheme = headers
        .get(X_FORWARDED_PROTO)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().authority().map(|authority| authority.as_str()))
        .unwrap_or("localhost");
    let path = request.uri().path();
    let query = request
        .uri()
        .query()
        .map(strip_credentials)
        .filter(|query| !query.is_empty());

    match query {
        Some(query) => format!("{scheme}://{host}{path}?{query}"),
        None => format!("{scheme}://{host}{path}"),
    }
}
