//! The application seam between the HTTP server and request handling.

use crate::http::error::HttpError;
use crate::http::request::Request;
use crate::http::response::Response;

/// Something that turns a request into a response.
///
/// Routers, resources and middleware wrappers all implement this, so they
/// nest freely. An `Err` is rendered by whoever sits outside.
pub trait Application: Send + Sync {
    fn call(&self, request: Request) -> Result<Response, HttpError>;
}

impl<F> Application for F
where
    F: Fn(Request) -> Result<Response, HttpError> + Send + Sync,
{
    fn call(&self, request: Request) -> Result<Response, HttpError> {
        self(request)
    }
}
