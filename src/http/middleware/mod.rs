//! Pre/post hooks around an inner application.
//!
//! # Data Flow
//! ```text
//! Request
//!     → outer.process_request  (may short-circuit)
//!     → inner.process_request
//!     → application
//!     → inner.process_response
//!     → outer.process_response
//! ```
//!
//! # Design Decisions
//! - An `HttpError` escaping the inner application is rendered before
//!   `process_response` sees it, so every middleware works on a response
//! - Composition is plain nesting of [`Wrapped`] values

pub mod debug;
pub mod request_id;

use std::sync::Arc;

use crate::http::app::Application;
use crate::http::error::HttpError;
use crate::http::request::Request;
use crate::http::response::Response;

pub use debug::DebugLog;
pub use request_id::RequestId;

/// Hooks run around an inner application.
pub trait Middleware: Send + Sync {
    /// Called on each request. Returning a response stops the chain here.
    fn process_request(&self, _request: &mut Request) -> Option<Response> {
        None
    }

    /// Called with the inner application's response.
    fn process_response(&self, response: Response) -> Result<Response, HttpError> {
        Ok(response)
    }
}

/// A middleware bound to the application it wraps.
pub struct Wrapped<M> {
    middleware: M,
    inner: Arc<dyn Application>,
}

impl<M: Middleware> Wrapped<M> {
    pub fn new(middleware: M, inner: Arc<dyn Application>) -> Self {
        Self { middleware, inner }
    }
}

impl<M: Middleware> Application for Wrapped<M> {
    fn call(&self, mut request: Request) -> Result<Response, HttpError> {
        if let Some(response) = self.middleware.process_request(&mut request) {
            return Ok(response);
        }

        let response = self
            .inner
            .call(request)
            .unwrap_or_else(HttpError::into_response);

        Ok(self
            .middleware
            .process_response(response)
            .unwrap_or_else(HttpError::into_response))
    }
}

/// Wrap `inner` in `middleware`, ready to be wrapped again.
pub fn wrap<M: Middleware + 'static>(middleware: M, inner: Arc<dyn Application>) -> Arc<dyn Application> {
    Arc::new(Wrapped::new(middleware, inner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::{HeaderName, HeaderValue};
    use axum::http::StatusCode;
    use bytes::Bytes;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        short_circuit: bool,
    }

    impl Middleware for Recorder {
        fn process_request(&self, _request: &mut Request) -> Option<Response> {
            self.log.lock().unwrap().push(format!("{} request", self.name));
            self.short_circuit
                .then(|| Response::new(Bytes::from_static(b"blocked")))
        }

        fn process_response(&self, mut response: Response) -> Result<Response, HttpError> {
            self.log.lock().unwrap().push(format!("{} response", self.name));
            response.headers_mut().append(
                HeaderName::from_static("x-seen-by"),
                HeaderValue::from_static(self.name),
            );
            Ok(response)
        }
    }

    fn request() -> Request {
        Request::from(axum::http::Request::builder().uri("/").body(Bytes::new()).unwrap())
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<String>>>, short_circuit: bool) -> Recorder {
        Recorder {
            name,
            log: Arc::clone(log),
            short_circuit,
        }
    }

    #[test]
    fn nested_middleware_runs_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let app_log = Arc::clone(&log);
        let app: Arc<dyn Application> = Arc::new(move |_req: Request| -> Result<Response, HttpError> {
            app_log.lock().unwrap().push("app".to_string());
            Ok(Response::new(Bytes::from_static(b"ok")))
        });

        let app = wrap(recorder("inner", &log, false), app);
        let app = wrap(recorder("outer", &log, false), app);

        let response = app.call(request()).unwrap();
        assert_eq!(response.body().as_ref(), b"ok");
        assert_eq!(
            *log.lock().unwrap(),
            ["outer request", "inner request", "app", "inner response", "outer response"]
        );

        let seen: Vec<_> = response.headers().get_all("x-seen-by").iter().collect();
        assert_eq!(seen, ["inner", "outer"]);
    }

    #[test]
    fn process_request_can_short_circuit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let app: Arc<dyn Application> =
            Arc::new(|_req: Request| -> Result<Response, HttpError> { panic!("inner app must not run") });

        let app = wrap(recorder("gate", &log, true), app);
        let response = app.call(request()).unwrap();

        assert_eq!(response.body().as_ref(), b"blocked");
        assert_eq!(*log.lock().unwrap(), ["gate request"]);
    }

    #[test]
    fn inner_http_error_becomes_response() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let app: Arc<dyn Application> = Arc::new(|_req: Request| -> Result<Response, HttpError> { Err(HttpError::not_found()) });

        let app = wrap(recorder("outer", &log, false), app);
        let response = app.call(request()).unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-seen-by"], "outer");
    }

    struct Refuse;

    impl Middleware for Refuse {
        fn process_response(&self, _response: Response) -> Result<Response, HttpError> {
            Err(HttpError::new(StatusCode::FORBIDDEN))
        }
    }

    #[test]
    fn process_response_error_becomes_response() {
        let app: Arc<dyn Application> =
            Arc::new(|_req: Request| -> Result<Response, HttpError> {
                Ok(Response::new(Bytes::from_static(b"secret")))
            });
        let response = wrap(Refuse, app).call(request()).unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
