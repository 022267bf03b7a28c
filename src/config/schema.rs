//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration document.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Socket, TLS and worker pool settings.
    pub server: ServerConfig,

    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Immutable snapshot of everything the supervisor and its workers need.
///
/// A reload never mutates a snapshot in place; it produces a new one which is
/// compared field by field against the previous one.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the server. Useful when selecting a particular
    /// network interface.
    pub bind_host: String,

    /// The port on which the server will listen (0 picks an ephemeral port).
    pub bind_port: u16,

    /// Backlog passed to `listen(2)`.
    pub backlog: i32,

    /// Seconds a connection must be idle before TCP starts sending
    /// keepalive probes (`TCP_KEEPIDLE`).
    pub tcp_keepidle_secs: u64,

    /// CA certificate used to verify connecting clients.
    pub ca_file: Option<PathBuf>,

    /// Certificate chain (PEM) to serve TLS with.
    pub cert_file: Option<PathBuf>,

    /// Private key (PEM) matching `cert_file`.
    pub key_file: Option<PathBuf>,

    /// Number of worker processes. 0 serves in-process without forking.
    pub workers: usize,

    /// Maximum size of the request head buffer accepted from a client.
    pub max_header_line: usize,

    /// When false every response carries `Connection: close`.
    pub http_keepalive: bool,

    /// Idle seconds after which a client connection is closed (0 = never).
    pub client_socket_timeout_secs: u64,

    /// How long to keep retrying a bind that fails with "address in use".
    pub bind_timeout_secs: u64,

    /// Upper bound on a buffered request body.
    pub max_request_body_bytes: usize,

    /// Connections one worker serves at a time; further accepted
    /// connections wait for a slot.
    pub max_connections_per_worker: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            bind_port: 9292,
            backlog: 4096,
            tcp_keepidle_secs: 600,
            ca_file: None,
            cert_file: None,
            key_file: None,
            workers: num_cpus::get(),
            max_header_line: 16384,
            http_keepalive: true,
            client_socket_timeout_secs: 900,
            bind_timeout_secs: 30,
            max_request_body_bytes: 10 * 1024 * 1024, // 10MB
            max_connections_per_worker: 1000,
        }
    }
}

impl ServerConfig {
    /// TLS is in use only when both a certificate and a key are configured.
    pub fn use_tls(&self) -> bool {
        self.cert_file.is_some() && self.key_file.is_some()
    }

    /// `host:port` as configured, for logs and address resolution.
    pub fn bind_target(&self) -> (&str, u16) {
        (self.bind_host.as_str(), self.bind_port)
    }

    pub fn tcp_keepidle(&self) -> Duration {
        Duration::from_secs(self.tcp_keepidle_secs)
    }

    /// `None` when client connections may idle forever.
    pub fn client_socket_timeout(&self) -> Option<Duration> {
        match self.client_socket_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn bind_timeout(&self) -> Duration {
        Duration::from_secs(self.bind_timeout_secs)
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (trace, debug, info, warn, error or a full
    /// `EnvFilter` expression).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
