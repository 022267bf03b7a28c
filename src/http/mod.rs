//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (accepted by the worker)
//!     → server.rs (Axum setup, body buffering, keepalive)
//!     → request.rs (buffered request, negotiation helpers)
//!     → middleware/ (pre/post hooks)
//!     → app.rs (Application: router, resource, ...)
//!     → error.rs (HttpError rendered on the way out)
//!     → response.rs
//!     → Send to client
//! ```

pub mod app;
pub mod error;
pub mod i18n;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use app::Application;
pub use error::HttpError;
pub use i18n::{translate_exception, Catalog, Translator};
pub use request::{ContentRange, Request, X_REQUEST_ID};
pub use response::Response;
pub use server::{DispatchState, HttpServer};
