//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Socket bind at startup / on reload:
//!     → backoff.rs (retry "address in use" with capped exponential backoff)
//!     → give up once the configured bind window has elapsed
//! ```
//!
//! # Design Decisions
//! - Every retry loop has a wall-clock deadline
//! - Only transient errors are retried; everything else fails fast

pub mod backoff;
