//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Hold the routes frozen at construction
//! - Attach the matched [`RouteMatch`] to the request
//! - Call the matched target, or answer 404/501
//!
//! # Design Decisions
//! - Immutable after construction (shared between connections without locks)
//! - First match wins, in connection order
//! - Explicit no-match error rather than a silent default

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::Method;

use crate::http::app::Application;
use crate::http::error::HttpError;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::routing::mapper::{Mapper, Route};

/// Methods the server implements; anything else that fails to route is 501.
pub const IMPLEMENTED_METHODS: [Method; 6] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
];

/// The outcome of routing: which application handles the request and with
/// which parameters.
#[derive(Clone)]
pub struct RouteMatch {
    pub target: Arc<dyn Application>,
    pub params: BTreeMap<String, String>,
}

impl RouteMatch {
    pub fn action(&self) -> Option<&str> {
        self.params.get("action").map(String::as_str)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

impl std::fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteMatch")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Error for a request no route accepted.
pub fn no_match(method: &Method) -> HttpError {
    if IMPLEMENTED_METHODS.contains(method) {
        HttpError::not_found()
    } else {
        HttpError::not_implemented()
    }
}

/// Maps incoming requests to applications.
pub struct Router {
    routes: Arc<[Route]>,
}

impl Router {
    pub fn new(mapper: Mapper) -> Self {
        let routes: Vec<Route> = mapper.into_routes();
        tracing::debug!(routes = routes.len(), "Router built");
        Self {
            routes: routes.into(),
        }
    }

    /// Find the first route accepting `method` and `path`.
    pub fn route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.routes.iter().find_map(|route| {
            route
                .matches(method, path)
                .map(|(target, params)| RouteMatch { target, params })
        })
    }
}

impl Application for Router {
    fn call(&self, mut request: Request) -> Result<Response, HttpError> {
        let Some(matched) = self.route(request.method(), request.path()) else {
            tracing::debug!(
                method = %request.method(),
                path = %request.path(),
                "No route matched"
            );
            return Err(no_match(request.method()));
        };

        let target = Arc::clone(&matched.target);
        request.extensions_mut().insert(matched);
        target.call(request)
    }
}

/// Answers 405 with an `Allow` header. Connect it after a resource's real
/// routes to turn "wrong method" into 405 instead of 404.
#[derive(Debug, Clone)]
pub struct RejectMethod {
    allowed: Vec<Method>,
}

impl RejectMethod {
    pub fn new(allowed: &[Method]) -> Self {
        Self {
            allowed: allowed.to_vec(),
        }
    }
}

impl Application for RejectMethod {
    fn call(&self, request: Request) -> Result<Response, HttpError> {
        tracing::debug!(
            method = %request.method(),
            "The method is not allowed for this resource"
        );
        Err(HttpError::method_not_allowed(&self.allowed))
    }
}

/// Shorthand for an `Arc`ed [`RejectMethod`].
pub fn reject_method(allowed: &[Method]) -> Arc<dyn Application> {
    Arc::new(RejectMethod::new(allowed))
}
