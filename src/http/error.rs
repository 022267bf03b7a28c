//! Request-level HTTP errors.
//!
//! Anything that goes wrong while handling one request ends up as an
//! [`HttpError`], which renders itself into a well-formed response. These
//! never escape a worker's serving loop.

use axum::http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;

use crate::http::response::Response;

/// An HTTP-level failure carrying a human-readable explanation and optional
/// detail, both of which may be translated before rendering.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{status}: {explanation}")]
pub struct HttpError {
    status: StatusCode,
    explanation: String,
    detail: Option<String>,
    headers: HeaderMap,
}

impl HttpError {
    /// Error with the stock explanation for `status`.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            explanation: default_explanation(status).to_string(),
            detail: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn bad_request(explanation: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST).with_explanation(explanation)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    pub fn not_implemented() -> Self {
        Self::new(StatusCode::NOT_IMPLEMENTED)
    }

    /// 405 with an `Allow` header listing `allowed`.
    pub fn method_not_allowed(allowed: &[Method]) -> Self {
        let allow = allowed
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let mut err = Self::new(StatusCode::METHOD_NOT_ALLOWED);
        if let Ok(value) = HeaderValue::from_str(&allow) {
            err.headers.insert(axum::http::header::ALLOW, value);
        }
        err
    }

    pub fn unsupported_media_type(content_type: Option<&str>) -> Self {
        Self::new(StatusCode::UNSUPPORTED_MEDIA_TYPE).with_explanation(format!(
            "Invalid content type {}",
            content_type.unwrap_or("None")
        ))
    }

    pub fn payload_too_large() -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE)
    }

    pub fn internal_server_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn set_explanation(&mut self, explanation: String) {
        self.explanation = explanation;
    }

    pub fn set_detail(&mut self, detail: Option<String>) {
        self.detail = detail;
    }

    /// Render as a plain-text response:
    ///
    /// ```text
    /// 404 Not Found
    ///
    /// The resource could not be found.
    /// ```
    pub fn into_response(self) -> Response {
        let mut body = format!(
            "{} {}\n\n{}\n",
            self.status.as_u16(),
            self.status.canonical_reason().unwrap_or(""),
            self.explanation
        );
        if let Some(detail) = &self.detail {
            body.push('\n');
            body.push_str(detail);
            body.push('\n');
        }

        let mut response = Response::new(Bytes::from(body));
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=UTF-8"),
        );
        response.headers_mut().extend(self.headers);
        response
    }
}

fn default_explanation(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => {
            "The server could not comply with the request since it is either malformed or otherwise incorrect."
        }
        StatusCode::UNAUTHORIZED => "This server could not verify that you are authorized to access the document you requested.",
        StatusCode::FORBIDDEN => "Access was denied to this resource.",
        StatusCode::NOT_FOUND => "The resource could not be found.",
        StatusCode::METHOD_NOT_ALLOWED => "The method is not allowed for this resource.",
        StatusCode::CONFLICT => "There was a conflict when trying to complete your request.",
        StatusCode::PAYLOAD_TOO_LARGE => {
            "The request is larger than the server is willing or able to process."
        }
        StatusCode::UNSUPPORTED_MEDIA_TYPE => "The request media type is not supported by this server.",
        StatusCode::INTERNAL_SERVER_ERROR | StatusCode::NOT_IMPLEMENTED => {
            "The server has either erred or is incapable of performing the requested operation."
        }
        StatusCode::SERVICE_UNAVAILABLE => {
            "The server is currently unavailable. Please try again at a later time."
        }
        other => other.canonical_reason().unwrap_or("Unknown error."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_status_line_and_explanation() {
        let response = HttpError::not_found().into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = std::str::from_utf8(response.body()).unwrap();
        assert!(body.starts_with("404 Not Found\n\nThe resource could not be found."));
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/plain; charset=UTF-8"
        );
    }

    #[test]
    fn detail_is_appended() {
        let response = HttpError::bad_request("Malformed JSON in request body.")
            .with_detail("line 1 column 2")
            .into_response();

        let body = std::str::from_utf8(response.body()).unwrap();
        assert!(body.contains("Malformed JSON in request body."));
        assert!(body.ends_with("line 1 column 2\n"));
    }

    #[test]
    fn method_not_allowed_lists_methods() {
        let err = HttpError::method_not_allowed(&[Method::GET, Method::POST]);
        assert_eq!(err.headers()[axum::http::header::ALLOW], "GET, POST");

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[axum::http::header::ALLOW], "GET, POST");
    }

    #[test]
    fn invalid_content_type_names_the_type() {
        let err = HttpError::unsupported_media_type(Some("text/xml"));
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(err.explanation(), "Invalid content type text/xml");
        assert_eq!(
            HttpError::unsupported_media_type(None).explanation(),
            "Invalid content type None"
        );
    }
}
