//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (route lookup, first match wins)
//!     → mapper.rs (evaluate template segments)
//!     → RouteMatch attached to request extensions
//!     → matched Application, or 404 / 501
//!
//! Route Compilation (at startup):
//!     Mapper::connect(template, methods, target, action)
//!     → Parse templates
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Deterministic: same input always matches same route

pub mod mapper;
pub mod router;

pub use mapper::{Mapper, RouteError};
pub use router::{no_match, reject_method, RejectMethod, RouteMatch, Router, IMPLEMENTED_METHODS};
