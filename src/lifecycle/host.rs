//! Process creation and signalling seam.
//!
//! # Design Decisions
//! - The supervisor only talks to the OS through [`ProcessHost`], so the
//!   control loop can be driven by a scripted host in tests
//! - [`ForkHost`] forks from a single-threaded process with no async runtime;
//!   each child builds its own runtime after the fork

use nix::errno::Errno;
use nix::sys::signal::{killpg, SigHandler, SigSet, Signal};
use nix::unistd::{fork, getpgrp, setpgid, ForkResult, Pid};
use tracing::{debug, error};

use crate::lifecycle::signals::{self, ControlEvent, CONTROL_SIGNALS};
use crate::lifecycle::supervisor::SupervisorError;

/// What the supervisor needs from the operating system.
pub trait ProcessHost {
    /// Become process-group leader and start queueing control signals.
    fn prepare(&mut self) -> Result<(), SupervisorError>;

    /// Start a worker process running `worker`, whose return value is the
    /// process exit code.
    fn spawn(&mut self, worker: &dyn Fn() -> i32) -> Result<Pid, SupervisorError>;

    /// Send `signal` to every process in the group, except this one.
    fn signal_group(&mut self, signal: Signal) -> Result<(), SupervisorError>;

    /// Block until at least one control event is available.
    fn next_events(&mut self) -> Result<Vec<ControlEvent>, SupervisorError>;
}

/// [`ProcessHost`] backed by `fork(2)` and `sigwait(3)`.
#[derive(Debug)]
pub struct ForkHost {
    pgid: Pid,
    control: SigSet,
}

impl ForkHost {
    pub fn new() -> Self {
        Self {
            pgid: Pid::from_raw(0),
            control: signals::signal_set(&CONTROL_SIGNALS),
        }
    }
}

impl Default for ForkHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessHost for ForkHost {
    fn prepare(&mut self) -> Result<(), SupervisorError> {
        self.pgid = match setpgid(Pid::from_raw(0), Pid::from_raw(0)) {
            Ok(()) => getpgrp(),
            // Already a session leader (e.g. started by systemd).
            Err(Errno::EPERM) => Pid::from_raw(0),
            Err(e) => return Err(e.into()),
        };
        debug!(pgid = %self.pgid, "Process group ready");

        signals::block(&CONTROL_SIGNALS)?;
        Ok(())
    }

    fn spawn(&mut self, worker: &dyn Fn() -> i32) -> Result<Pid, SupervisorError> {
        // SAFETY: the supervisor is single-threaded, so the child starts with
        // consistent allocator and lock state.
        let forked = unsafe { fork() }?;
        match forked {
            ForkResult::Parent { child } => Ok(child),
            ForkResult::Child => std::process::exit(run_child(worker)),
        }
    }

    fn signal_group(&mut self, signal: Signal) -> Result<(), SupervisorError> {
        signals::set_disposition(signal, SigHandler::SigIgn)?;
        if signal == Signal::SIGTERM {
            signals::set_disposition(Signal::SIGINT, SigHandler::SigIgn)?;
        }

        killpg(self.pgid, signal)?;

        // A blocked signal stays pending even while ignored. Installing
        // SIG_IGN again discards our own copy before sigwait can see it.
        signals::set_disposition(signal, SigHandler::SigIgn)?;
        if signal == Signal::SIGHUP {
            signals::set_disposition(Signal::SIGHUP, SigHandler::SigDfl)?;
        }
        Ok(())
    }

    fn next_events(&mut self) -> Result<Vec<ControlEvent>, SupervisorError> {
        loop {
            let signal = self.control.wait()?;
            let events: Vec<ControlEvent> = if signal == Signal::SIGCHLD {
                signals::reap_children()?
                    .into_iter()
                    .map(|(pid, exit)| ControlEvent::ChildExited { pid, exit })
                    .collect()
            } else {
                ControlEvent::from_signal(signal).into_iter().collect()
            };

            if !events.is_empty() {
                return Ok(events);
            }
        }
    }
}

/// Child side of a fork: restore signal handling, then run the worker.
fn run_child(worker: &dyn Fn() -> i32) -> i32 {
    let restored = signals::set_disposition(Signal::SIGINT, SigHandler::SigIgn)
        .and_then(|()| signals::set_disposition(Signal::SIGTERM, SigHandler::SigDfl))
        .and_then(|()| signals::unblock(&[Signal::SIGTERM, Signal::SIGINT, Signal::SIGCHLD]));

    if let Err(e) = restored {
        error!(error = %e, "Worker could not restore signal handling");
        return 1;
    }
    worker()
}
