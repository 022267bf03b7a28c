//! Response type produced by applications.
//!
//! Bodies are fully buffered: every stage of the dispatch pipeline runs to
//! completion before the first byte goes back to the client.

use axum::http::header::{HeaderValue, CONTENT_TYPE};
use axum::http::StatusCode;
use bytes::Bytes;

pub type Response = axum::http::Response<Bytes>;

/// Build a `200 OK` JSON response.
pub fn json(value: &serde_json::Value) -> Response {
    with_content_type(StatusCode::OK, "application/json", value.to_string())
}

/// Build a response with the given status, content type and body.
pub fn with_content_type(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Convert into the body type the HTTP server writes out.
pub fn into_axum(response: Response) -> axum::response::Response {
    response.map(axum::body::Body::from)
}
