//! Logs request and response headers at debug level.

use tracing::debug;

use crate::http::error::HttpError;
use crate::http::middleware::Middleware;
use crate::http::request::Request;
use crate::http::response::Response;

#[derive(Debug, Clone, Copy, Default)]
pub struct DebugLog;

impl Middleware for DebugLog {
    fn process_request(&self, request: &mut Request) -> Option<Response> {
        debug!(
            method = %request.method(),
            uri = %request.uri(),
            headers = ?request.headers(),
            body_len = request.body().len(),
            "Request"
        );
        None
    }

    fn process_response(&self, response: Response) -> Result<Response, HttpError> {
        debug!(
            status = %response.status(),
            headers = ?response.headers(),
            body_len = response.body().len(),
            "Response"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::app::Application;
    use crate::http::middleware::wrap;
    use bytes::Bytes;
    use std::sync::Arc;

    #[test]
    fn passes_traffic_through_unchanged() {
        let app: Arc<dyn Application> =
            Arc::new(|req: Request| -> Result<Response, HttpError> {
                Ok(Response::new(req.body().clone()))
            });
        let app = wrap(DebugLog, app);

        let request = axum::http::Request::builder()
            .uri("/echo")
            .body(Bytes::from_static(b"payload"))
            .unwrap();
        let response = app.call(Request::from(request)).unwrap();
        assert_eq!(response.body().as_ref(), b"payload");
    }
}
