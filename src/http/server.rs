//! HTTP server setup for a worker.
//!
//! # Responsibilities
//! - Wrap the application in an Axum router with request tracing
//! - Buffer each request body up to the configured limit
//! - Serve the inherited listening socket, plain or TLS
//! - Apply HTTP/1.1 keepalive, header buffer and idle timeout settings
//! - Cap the connections served at once by this worker
//!
//! # Design Decisions
//! - The application is synchronous and runs to completion on the worker's
//!   event loop; other connections make progress between requests
//! - Draining is driven from outside through an `axum_server::Handle`

use std::net::TcpListener;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::header::{HeaderValue, CONNECTION},
    Router,
};
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use axum_server::Handle;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::http::app::Application;
use crate::http::error::HttpError;
use crate::http::request::Request;
use crate::http::response::into_axum;
use crate::net::{ConnectionLimitAcceptor, IdleTimeoutAcceptor};

/// State injected into the fallback handler.
#[derive(Clone)]
pub struct DispatchState {
    pub app: Arc<dyn Application>,
    pub max_body: usize,
    pub keepalive: bool,
}

/// HTTP server for one worker generation.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
}

impl HttpServer {
    pub fn new(app: Arc<dyn Application>, config: ServerConfig) -> Self {
        let state = DispatchState {
            app,
            max_body: config.max_request_body_bytes,
            keepalive: config.http_keepalive,
        };
        Self {
            router: Self::build_router(state),
            config,
        }
    }

    fn build_router(state: DispatchState) -> Router {
        Router::new()
            .fallback(serve_request)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Serve `listener` until `handle` finishes a graceful shutdown.
    pub async fn run(
        self,
        listener: TcpListener,
        tls: Option<RustlsConfig>,
        handle: Handle,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            tls = tls.is_some(),
            max_connections = self.config.max_connections_per_worker,
            "HTTP server starting"
        );

        let idle = IdleTimeoutAcceptor::new(self.config.client_socket_timeout());
        let slots = ConnectionLimitAcceptor::new(self.config.max_connections_per_worker, idle);
        let app = self.router.into_make_service();

        match tls {
            Some(tls) => {
                let mut server = axum_server::from_tcp(listener)
                    .acceptor(RustlsAcceptor::new(tls).acceptor(slots))
                    .handle(handle);
                server
                    .http_builder()
                    .http1()
                    .keep_alive(self.config.http_keepalive)
                    .max_buf_size(self.config.max_header_line);
                server.serve(app).await?;
            }
            None => {
                let mut server = axum_server::from_tcp(listener).acceptor(slots).handle(handle);
                server
                    .http_builder()
                    .http1()
                    .keep_alive(self.config.http_keepalive)
                    .max_buf_size(self.config.max_header_line);
                server.serve(app).await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Buffer the request and hand it to the application.
async fn serve_request(
    State(state): State<DispatchState>,
    request: axum::extract::Request,
) -> axum::response::Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, limit = state.max_body, "Request body rejected");
            return finish(HttpError::payload_too_large().into_response(), state.keepalive);
        }
    };

    let response = state
        .app
        .call(Request::new(parts, body))
        .unwrap_or_else(HttpError::into_response);
    finish(response, state.keepalive)
}

fn finish(response: crate::http::response::Response, keepalive: bool) -> axum::response::Response {
    let mut response = into_axum(response);
    if !keepalive {
        response
            .headers_mut()
            .insert(CONNECTION, HeaderValue::from_static("close"));
    }
    response
}

/// Handle a single in-memory request the same way the server does.
///
/// Used by tests and by anything embedding an application without a socket.
pub async fn dispatch_once(
    state: &DispatchState,
    request: axum::http::Request<Body>,
) -> axum::response::Response {
    serve_request(State(state.clone()), request).await
}
