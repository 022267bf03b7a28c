//! A worker's serving loop.
//!
//! # Responsibilities
//! - Build the worker's single-threaded runtime
//! - Serve the inherited listening socket until told to drain
//! - Drain gracefully: stop accepting, finish in-flight requests, return
//!
//! # Design Decisions
//! - In a forked worker SIGHUP is the drain trigger; it stays blocked until
//!   the listener for it is registered, so an early HUP is never lost
//! - Draining has no deadline

use std::future::Future;
use std::net::TcpListener;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use nix::sys::signal::Signal;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::http::app::Application;
use crate::http::server::HttpServer;
use crate::lifecycle::signals;
use crate::net::ListeningSocket;

/// Exit code of a worker that drained cleanly.
pub const EXIT_DRAINED: i32 = 0;
/// Exit code of a worker whose serving loop failed.
pub const EXIT_FAILED: i32 = 1;

pub struct Worker {
    server: HttpServer,
    listener: TcpListener,
    tls: Option<RustlsConfig>,
}

impl Worker {
    /// Prepare to serve `socket` with `app` under `config`.
    pub fn new(
        app: Arc<dyn Application>,
        config: ServerConfig,
        socket: &ListeningSocket,
    ) -> std::io::Result<Self> {
        Ok(Self {
            listener: socket.try_clone_listener()?,
            tls: socket.tls().map(|tls| tls.rustls_config()),
            server: HttpServer::new(app, config),
        })
    }

    /// Serve until `shutdown` resolves, then drain.
    pub async fn serve_until(self, shutdown: impl Future<Output = ()>) -> std::io::Result<()> {
        let handle = Handle::new();
        let serving = self.server.run(self.listener, self.tls, handle.clone());
        tokio::pin!(serving);
        tokio::pin!(shutdown);

        tokio::select! {
            result = &mut serving => return result,
            () = &mut shutdown => {
                info!(
                    connections = handle.connection_count(),
                    "Draining connections"
                );
                handle.graceful_shutdown(None);
            }
        }

        serving.await
    }

    /// Entry point of a forked worker. Returns the process exit code.
    pub fn run(self) -> i32 {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(error = %e, "Worker could not start its runtime");
                return EXIT_FAILED;
            }
        };

        runtime.block_on(async move {
            let mut hangup = match signal(SignalKind::hangup()) {
                Ok(stream) => stream,
                Err(e) => {
                    error!(error = %e, "Worker could not listen for hangup");
                    return EXIT_FAILED;
                }
            };
            if let Err(e) = signals::unblock(&[Signal::SIGHUP]) {
                error!(error = %e, "Worker could not unblock hangup");
                return EXIT_FAILED;
            }

            let drain = async move {
                hangup.recv().await;
                info!(pid = std::process::id(), "Worker caught hangup");
            };
            match self.serve_until(drain).await {
                Ok(()) => {
                    info!(pid = std::process::id(), "Worker drained");
                    EXIT_DRAINED
                }
                Err(e) => {
                    error!(error = %e, "Worker serving loop failed");
                    EXIT_FAILED
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::error::HttpError;
    use crate::http::request::Request;
    use crate::http::response::Response;
    use crate::net::SocketManager;
    use bytes::Bytes;
    use std::io::{Read, Write};
    use std::time::Duration;

    fn local_config() -> ServerConfig {
        ServerConfig {
            bind_host: "127.0.0.1".to_string(),
            bind_port: 0,
            workers: 0,
            ..ServerConfig::default()
        }
    }

    fn hello() -> Arc<dyn Application> {
        Arc::new(|_req: Request| -> Result<Response, HttpError> {
            Ok(Response::new(Bytes::from_static(b"hello")))
        })
    }

    #[test]
    fn serves_then_drains_on_shutdown() {
        let config = local_config();
        let mut sockets = SocketManager::new();
        sockets.ensure_socket(&config, None).unwrap();
        let socket = sockets.socket().unwrap();
        let addr = socket.local_addr();
        let worker = Worker::new(hello(), config, socket).unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let serving = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(worker.serve_until(async {
                let _ = rx.await;
            }))
        });

        let mut stream = std::net::TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .unwrap();
        let mut reply = String::new();
        stream.read_to_string(&mut reply).unwrap();
        assert!(reply.starts_with("HTTP/1.1 200 OK"));
        assert!(reply.ends_with("hello"));

        tx.send(()).unwrap();
        serving.join().unwrap().unwrap();
    }
}
