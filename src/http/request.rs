//! Request type handed to applications, with content negotiation helpers.
//!
//! # Responsibilities
//! - Hold the request head and fully buffered body
//! - Negotiate response content type and language
//! - Validate `Content-Type` and `Content-Range` headers
//!
//! # Design Decisions
//! - Malformed client input is reported as a 4xx [`HttpError`], never a panic
//! - Routing results travel in the request extensions

use axum::http::header::{
    ACCEPT, ACCEPT_LANGUAGE, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, TRANSFER_ENCODING,
};
use axum::http::request::Parts;
use axum::http::{Extensions, Method, Uri};
use bytes::Bytes;

use crate::http::error::HttpError;
use crate::routing::RouteMatch;

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// An HTTP request with its body already read.
#[derive(Debug)]
pub struct Request {
    parts: Parts,
    body: Bytes,
}

impl Request {
    pub fn new(parts: Parts, body: Bytes) -> Self {
        Self { parts, body }
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.parts.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn extensions(&self) -> &Extensions {
        &self.parts.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.parts.extensions
    }

    /// Route attached by the router, if any.
    pub fn route_match(&self) -> Option<&RouteMatch> {
        self.parts.extensions.get::<RouteMatch>()
    }

    fn header_str(&self, name: impl axum::http::header::AsHeaderName) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn request_id(&self) -> Option<&str> {
        self.header_str(X_REQUEST_ID)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header_str(CONTENT_LENGTH)
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn transfer_encoding(&self) -> Option<String> {
        self.header_str(TRANSFER_ENCODING)
            .map(|v| v.trim().to_ascii_lowercase())
    }

    /// Media type of the body, without parameters.
    pub fn content_type(&self) -> Option<&str> {
        self.header_str(CONTENT_TYPE)
            .map(|v| v.split(';').next().unwrap_or("").trim())
    }

    /// Determine the requested response content type.
    pub fn best_match_content_type(&self) -> &'static str {
        const SUPPORTED: &[&str] = &["application/json"];
        self.best_match_accept(SUPPORTED).unwrap_or("application/json")
    }

    /// Pick the offer from `supported` the `Accept` header ranks highest.
    pub fn best_match_accept(&self, supported: &[&'static str]) -> Option<&'static str> {
        let accept = self.header_str(ACCEPT)?;
        for (range, _) in weighted_values(accept) {
            let found = supported.iter().find(|offer| media_range_matches(&range, offer));
            if let Some(offer) = found {
                return Some(*offer);
            }
        }
        None
    }

    /// Determine content type of the request body.
    pub fn get_content_type(&self, allowed: &[&str]) -> Result<&str, HttpError> {
        if !self.parts.headers.contains_key(CONTENT_TYPE) {
            return Err(HttpError::unsupported_media_type(None));
        }

        let content_type = self.content_type().unwrap_or("");
        if allowed.contains(&content_type) {
            Ok(content_type)
        } else {
            Err(HttpError::unsupported_media_type(Some(content_type)))
        }
    }

    /// Best available locale from the `Accept-Language` header, or `None`
    /// if the header was not sent or nothing matched.
    pub fn best_match_language(&self, available: &[String]) -> Option<String> {
        let header = self.header_str(ACCEPT_LANGUAGE)?;
        for (tag, _) in weighted_values(header) {
            if tag == "*" {
                return available.first().cloned();
            }
            let found = available.iter().find(|offer| language_matches(&tag, offer));
            if let Some(offer) = found {
                return Some(offer.clone());
            }
        }
        None
    }

    /// Parse the `Content-Range` header, if present.
    pub fn get_content_range(&self) -> Result<Option<ContentRange>, HttpError> {
        let Some(raw) = self.parts.headers.get(axum::http::header::CONTENT_RANGE) else {
            return Ok(None);
        };
        let raw = raw.to_str().unwrap_or("");
        ContentRange::parse(raw).map(Some).ok_or_else(|| {
            HttpError::bad_request(format!("Malformed Content-Range header: {raw}"))
        })
    }
}

impl From<axum::http::Request<Bytes>> for Request {
    fn from(request: axum::http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self::new(parts, body)
    }
}

/// A parsed `Content-Range: bytes start-end/length` header.
///
/// `stop` is exclusive. `start`/`stop` are `None` for the unsatisfied form
/// `bytes */length`; `length` is `None` when the sender wrote `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: Option<u64>,
    pub stop: Option<u64>,
    pub length: Option<u64>,
}

impl ContentRange {
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix("bytes")?;
        let rest = rest.trim_start();
        let (range, length) = rest.split_once('/')?;

        let length = match length.trim() {
            "*" => None,
            n => Some(n.parse::<u64>().ok()?),
        };

        if range.trim() == "*" {
            return length.map(|_| Self {
                start: None,
                stop: None,
                length,
            });
        }

        let (start, end) = range.trim().split_once('-')?;
        let start: u64 = start.parse().ok()?;
        let end: u64 = end.parse().ok()?;
        if end < start || length.is_some_and(|len| end >= len) {
            return None;
        }

        Some(Self {
            start: Some(start),
            stop: Some(end + 1),
            length,
        })
    }
}

/// Split a comma-separated header into values ordered by descending `q`,
/// dropping values with `q=0`. Ties keep header order.
fn weighted_values(header: &str) -> Vec<(String, f32)> {
    let mut values: Vec<(String, f32)> = header
        .split(',')
        .filter_map(|item| {
            let mut pieces = item.split(';');
            let value = pieces.next()?.trim().to_ascii_lowercase();
            if value.is_empty() {
                return None;
            }
            let q = pieces
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            (q > 0.0).then_some((value, q))
        })
        .collect();

    values.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    values
}

fn media_range_matches(range: &str, offer: &str) -> bool {
    if range == "*/*" || range == offer {
        return true;
    }
    match (range.split_once('/'), offer.split_once('/')) {
        (Some((range_type, "*")), Some((offer_type, _))) => range_type == offer_type,
        _ => false,
    }
}

fn language_matches(tag: &str, offer: &str) -> bool {
    let offer = offer.to_ascii_lowercase().replace('_', "-");
    tag == offer
        || offer.starts_with(&format!("{tag}-"))
        || tag.starts_with(&format!("{offer}-"))
}
