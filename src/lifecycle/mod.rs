//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Supervisor (supervisor.rs), single-threaded, no async runtime:
//!     Load config → ensure socket → fork workers → control loop
//!
//! Control loop (signals.rs, host.rs):
//!     SIGHUP         → reload: HUP to group, retire generation, new generation
//!     SIGTERM/SIGINT → TERM to group, stop
//!     SIGCHLD        → reap exited workers, respawn when needed
//!
//! Worker (worker.rs), one per process:
//!     Own runtime → serve inherited socket → SIGHUP → drain → exit
//! ```
//!
//! # Design Decisions
//! - Signals are consumed synchronously from a queue, never in handlers
//! - Bookkeeping (workers.rs) is plain data so it can be tested directly
//! - Shutdown of a worker is a drain: stop accepting, finish in-flight work

pub mod host;
pub mod signals;
pub mod supervisor;
pub mod worker;
pub mod workers;

pub use host::{ForkHost, ProcessHost};
pub use signals::{ChildExit, ControlEvent};
pub use supervisor::{Supervisor, SupervisorError};
pub use worker::Worker;
pub use workers::{Generation, WorkerRecord, WorkerSet};
