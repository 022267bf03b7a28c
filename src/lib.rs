//! Prefork HTTP API server core.
//!
//! A supervisor process owns one listening socket (plain or TLS) and a pool
//! of forked workers, each serving the socket on its own single-threaded
//! runtime. SIGHUP swaps in a new worker generation built from a reloaded
//! configuration while the old one drains. Requests flow through optional
//! middleware into a router and a resource that deserializes, handles and
//! serializes them.

// Core subsystems
pub mod config;
pub mod dispatch;
pub mod http;
pub mod net;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::{Config, ServerConfig};
pub use http::{Application, HttpServer};
pub use lifecycle::{ForkHost, Supervisor};
