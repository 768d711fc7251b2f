use axum::{body::Body, http::Request, middleware::Next, response::Response};

use crate::application::transform::FeedQuery;

/// Parameter stage: parses format and entry transforms once, ahead of the
/// cache and render stages that consume them.
pub async fn parse_parameters(mut request: Request<Body>, next: Next) -> Response {
    let query = FeedQuery::from_raw(request.uri().query());
    request.extensions_mut().insert(query);
    next.run(request).await
}
