//! OS signal handling.
//!
//! # Responsibilities
//! - Block the control signals (HUP, TERM, INT, CHLD) in the supervisor
//! - Turn each delivered signal into a [`ControlEvent`]
//! - Collect exited children without blocking
//!
//! # Design Decisions
//! - The supervisor never runs code in a signal handler; signals stay
//!   blocked and are taken one at a time with `sigwait`
//! - Workers use Tokio's signal handling for their drain trigger

use nix::errno::Errno;
use nix::sys::signal::{pthread_sigmask, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tokio::signal::unix::{signal, SignalKind};

/// Signals the supervisor consumes from its control loop.
pub const CONTROL_SIGNALS: [Signal; 4] = [
    Signal::SIGHUP,
    Signal::SIGTERM,
    Signal::SIGINT,
    Signal::SIGCHLD,
];

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    Code(i32),
    Signaled(Signal),
}

impl ChildExit {
    /// A non-zero exit status. Death by signal is not a failure.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Code(code) if code != 0)
    }
}

/// Work item for the supervisor's control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Reload,
    Terminate,
    Interrupt,
    ChildExited { pid: Pid, exit: ChildExit },
}

impl ControlEvent {
    /// Event for a non-CHLD control signal.
    pub fn from_signal(signal: Signal) -> Option<Self> {
        match signal {
            Signal::SIGHUP => Some(Self::Reload),
            Signal::SIGTERM => Some(Self::Terminate),
            Signal::SIGINT => Some(Self::Interrupt),
            _ => None,
        }
    }
}

pub fn signal_set(signals: &[Signal]) -> SigSet {
    let mut set = SigSet::empty();
    for signal in signals {
        set.add(*signal);
    }
    set
}

pub fn block(signals: &[Signal]) -> nix::Result<()> {
    pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&signal_set(signals)), None)
}

pub fn unblock(signals: &[Signal]) -> nix::Result<()> {
    pthread_sigmask(SigmaskHow::SIG_UNBLOCK, Some(&signal_set(signals)), None)
}

/// Install `handler` as the disposition of `signal`.
pub fn set_disposition(signal: Signal, handler: SigHandler) -> nix::Result<()> {
    // SAFETY: only SigIgn and SigDfl are installed; neither runs user code.
    unsafe { nix::sys::signal::signal(signal, handler) }.map(|_| ())
}

/// Reap every child that has exited, without blocking.
pub fn reap_children() -> nix::Result<Vec<(Pid, ChildExit)>> {
    let mut exited = Vec::new();
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(pid, code)) => exited.push((pid, ChildExit::Code(code))),
            Ok(WaitStatus::Signaled(pid, signal, _)) => {
                exited.push((pid, ChildExit::Signaled(signal)))
            }
            Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(exited)
}

/// Resolves on SIGINT or SIGTERM. Used when serving in-process.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for interrupt");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for terminate");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
