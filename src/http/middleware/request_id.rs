//! Request ID assignment.
//!
//! Keeps a client-supplied `x-request-id`, otherwise generates a UUID v4.
//! The ID is written back to the request headers and stored in the request
//! extensions, so handlers and log lines can correlate.

use std::sync::Arc;

use axum::http::header::HeaderValue;
use uuid::Uuid;

use crate::http::middleware::Middleware;
use crate::http::request::{Request, X_REQUEST_ID};
use crate::http::response::Response;

/// The ID assigned to the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedRequestId(pub Arc<str>);

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestId;

impl Middleware for RequestId {
    fn process_request(&self, request: &mut Request) -> Option<Response> {
        let id = match request.request_id() {
            Some(existing) if !existing.is_empty() => existing.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        if let Ok(value) = HeaderValue::from_str(&id) {
            request.headers_mut().insert(X_REQUEST_ID, value);
        }
        request.extensions_mut().insert(AssignedRequestId(id.into()));
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::error::HttpError;
    use crate::http::middleware::wrap;
    use bytes::Bytes;

    fn echo_id(req: Request) -> Result<Response, HttpError> {
        let assigned = req
            .extensions()
            .get::<AssignedRequestId>()
            .map(|id| id.0.to_string())
            .unwrap_or_default();
        assert_eq!(req.request_id(), Some(assigned.as_str()));
        Ok(Response::new(Bytes::from(assigned)))
    }

    fn request(id: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(id) = id {
            builder = builder.header(X_REQUEST_ID, id);
        }
        Request::from(builder.body(Bytes::new()).unwrap())
    }

    #[test]
    fn generates_uuid_when_missing() {
        let app = wrap(RequestId, Arc::new(echo_id));
        let response = app.call(request(None)).unwrap();

        let id = std::str::from_utf8(response.body()).unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn keeps_client_supplied_id() {
        let app = wrap(RequestId, Arc::new(echo_id));
        let response = app.call(request(Some("abc-123"))).unwrap();
        assert_eq!(response.body().as_ref(), b"abc-123");
    }
}
