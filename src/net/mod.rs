//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ServerConfig snapshot
//!     → socket.rs (bind / rebind, tunables, TLS wrap state)
//!     → tls.rs (certificate loading, hot swap)
//!     → fd inherited by every worker of the generation
//!
//! Inside a worker, per accepted connection:
//!     → limit.rs (wait for one of the worker's connection slots)
//!     → idle.rs (idle timeout wrapper)
//!     → optional TLS handshake
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Only the supervisor creates or closes the listening socket
//! - Rebinding happens only when the address moves; everything else is
//!   applied to the live socket so queued connections are never dropped
//! - TLS is optional and handled transparently

pub mod idle;
pub mod limit;
pub mod socket;
pub mod tls;

pub use idle::IdleTimeoutAcceptor;
pub use limit::ConnectionLimitAcceptor;
pub use socket::{ListeningSocket, SocketChanges, SocketError, SocketId, SocketManager};
pub use tls::{TlsContext, TlsError};
