//! Worker pool supervision and configuration reload.
//!
//! # Responsibilities
//! - Own the listening socket and the worker bookkeeping
//! - Keep the current generation at the configured size
//! - Reload: retire the current generation, reconcile the socket, start a
//!   new generation with the new configuration
//! - Terminate the whole process group on TERM/INT
//!
//! # Data Flow
//! ```text
//! ProcessHost::next_events
//!     → Reload          → reload()   (HUP group, retire, ensure_socket, spawn)
//!     → Terminate/Int   → terminate() (TERM group, stop)
//!     → ChildExited     → reap()     (forget pid, maybe respawn one)
//! ```
//!
//! # Design Decisions
//! - One event at a time: reload and reap never interleave
//! - Stale workers are never killed by a reload; they exit once drained
//! - A worker exiting non-zero is not replaced, so a broken configuration
//!   cannot turn into a fork loop
//! - With `workers = 0` the supervisor serves in-process and never forks

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tracing::{error, info, warn};

use crate::config::{Config, ConfigError, ConfigSource, ServerConfig};
use crate::http::app::Application;
use crate::lifecycle::host::ProcessHost;
use crate::lifecycle::signals::{self, ChildExit, ControlEvent};
use crate::lifecycle::worker::{Worker, EXIT_FAILED};
use crate::lifecycle::workers::{Generation, WorkerSet};
use crate::net::{ListeningSocket, SocketError, SocketManager};
use crate::observability::LogHandle;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error("process control failed: {0}")]
    Os(#[from] nix::errno::Errno),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no listening socket")]
    NoSocket,
}

/// The long-lived parent process.
pub struct Supervisor<S, H> {
    source: S,
    host: H,
    app: Arc<dyn Application>,
    config: Config,
    sockets: SocketManager,
    workers: WorkerSet,
    log: Option<LogHandle>,
    started: bool,
    running: bool,
}

impl<S: ConfigSource, H: ProcessHost> Supervisor<S, H> {
    /// Load the initial configuration from `source`.
    pub fn new(source: S, host: H, app: Arc<dyn Application>) -> Result<Self, SupervisorError> {
        let config = source.load()?;
        Ok(Self {
            source,
            host,
            app,
            config,
            sockets: SocketManager::new(),
            workers: WorkerSet::new(),
            log: None,
            started: false,
            running: false,
        })
    }

    /// Re-apply the configured log level on every reload.
    pub fn with_log_handle(mut self, log: LogHandle) -> Self {
        self.log = Some(log);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn workers(&self) -> &WorkerSet {
        &self.workers
    }

    pub fn socket(&self) -> Option<&ListeningSocket> {
        self.sockets.socket()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.sockets.socket().map(ListeningSocket::local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Bind the socket and, when forking, start the first generation.
    pub fn start(&mut self) -> Result<(), SupervisorError> {
        if self.started {
            return Ok(());
        }

        self.sockets.ensure_socket(&self.config.server, None)?;
        info!(
            address = ?self.local_addr(),
            workers = self.config.server.workers,
            tls = self.config.server.use_tls(),
            "Supervisor starting"
        );

        if self.config.server.workers > 0 {
            self.host.prepare()?;
            self.spawn_missing()?;
        }

        self.started = true;
        self.running = true;
        Ok(())
    }

    /// Run until terminated. Closes the listening socket before returning.
    pub fn run(mut self) -> Result<(), SupervisorError> {
        self.start()?;
        if self.config.server.workers == 0 {
            return self.serve_in_process(signals::shutdown_signal());
        }

        let result = self.control_loop();
        if result.is_err() && self.running {
            self.running = false;
            if let Err(e) = self.host.signal_group(Signal::SIGTERM) {
                error!(error = %e, "Failed to stop workers");
            }
        }

        self.sockets.close();
        info!("Supervisor stopped");
        result
    }

    fn control_loop(&mut self) -> Result<(), SupervisorError> {
        while self.running {
            for event in self.host.next_events()? {
                self.handle_event(event)?;
            }
        }
        Ok(())
    }

    pub fn handle_event(&mut self, event: ControlEvent) -> Result<(), SupervisorError> {
        match event {
            ControlEvent::Reload => self.reload(),
            ControlEvent::Terminate | ControlEvent::Interrupt => self.terminate(),
            ControlEvent::ChildExited { pid, exit } => self.reap(pid, exit),
        }
    }

    /// Serve on this process until `shutdown` resolves, without forking.
    pub fn serve_in_process(
        &mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), SupervisorError> {
        self.start()?;
        let socket = self.sockets.socket().ok_or(SupervisorError::NoSocket)?;
        let worker = Worker::new(Arc::clone(&self.app), self.config.server.clone(), socket)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        info!("Serving in-process");
        let served = runtime.block_on(worker.serve_until(shutdown));

        self.running = false;
        self.sockets.close();
        served.map_err(SupervisorError::from)
    }

    /// Replace the running generation with one built from a freshly loaded
    /// configuration.
    pub fn reload(&mut self) -> Result<(), SupervisorError> {
        info!("Caught hangup, reloading configuration");
        let config = match self.source.load() {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "Reload abandoned, keeping the running configuration");
                return Ok(());
            }
        };

        self.host.signal_group(Signal::SIGHUP)?;
        let retired = self.workers.retire_current();

        let previous = std::mem::replace(&mut self.config, config);
        let changes = self
            .sockets
            .ensure_socket(&self.config.server, Some(&previous.server))?;

        if let Some(log) = &self.log {
            if let Err(e) = log.set_level(&self.config.logging.level) {
                warn!(error = %e, "Keeping previous log level");
            }
        }

        info!(retired, ?changes, workers = self.config.server.workers, "Starting new generation");
        self.spawn_missing()
    }

    fn terminate(&mut self) -> Result<(), SupervisorError> {
        info!("Caught terminate/interrupt, stopping children");
        self.running = false;
        self.host.signal_group(Signal::SIGTERM)
    }

    fn reap(&mut self, pid: Pid, exit: ChildExit) -> Result<(), SupervisorError> {
        match self.workers.remove(pid) {
            Some(Generation::Current) => info!(%pid, ?exit, "Removed dead child"),
            Some(Generation::Stale) => info!(%pid, ?exit, "Removed stale child"),
            None => warn!(%pid, ?exit, "Unrecognised child"),
        }

        if exit.is_failure() {
            error!(%pid, ?exit, "Not respawning child because of error");
            if self.workers.is_empty() {
                info!("All workers have terminated. Exiting");
                self.running = false;
            }
            return Ok(());
        }

        if self.running && self.workers.current_len() < self.config.server.workers {
            self.spawn_one()?;
        }
        Ok(())
    }

    fn spawn_missing(&mut self) -> Result<(), SupervisorError> {
        while self.workers.current_len() < self.config.server.workers {
            self.spawn_one()?;
        }
        Ok(())
    }

    fn spawn_one(&mut self) -> Result<(), SupervisorError> {
        let socket = self.sockets.socket().ok_or(SupervisorError::NoSocket)?;
        let app = &self.app;
        let server = &self.config.server;

        let pid = self.host.spawn(&|| worker_main(app, server, socket))?;
        self.workers.add_current(pid);
        info!(%pid, "Started child");
        Ok(())
    }
}

fn worker_main(app: &Arc<dyn Application>, server: &ServerConfig, socket: &ListeningSocket) -> i32 {
    match Worker::new(Arc::clone(app), server.clone(), socket) {
        Ok(worker) => worker.run(),
        Err(e) => {
            error!(error = %e, "Worker could not take the listening socket");
            EXIT_FAILED
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationError;
    use crate::http::error::HttpError;
    use crate::http::request::Request;
    use crate::http::response::Response;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct HostLog {
        prepared: bool,
        spawned: Vec<Pid>,
        signals: Vec<Signal>,
        events: VecDeque<Vec<ControlEvent>>,
    }

    /// Hands out fake pids and replays scripted events.
    struct ScriptedHost {
        next_pid: i32,
        log: Arc<Mutex<HostLog>>,
    }

    impl ScriptedHost {
        fn new(events: Vec<Vec<ControlEvent>>) -> (Self, Arc<Mutex<HostLog>>) {
            let log = Arc::new(Mutex::new(HostLog {
                events: events.into(),
                ..HostLog::default()
            }));
            let host = Self {
                next_pid: 100,
                log: Arc::clone(&log),
            };
            (host, log)
        }
    }

    impl ProcessHost for ScriptedHost {
        fn prepare(&mut self) -> Result<(), SupervisorError> {
            self.log.lock().unwrap().prepared = true;
            Ok(())
        }

        fn spawn(&mut self, _worker: &dyn Fn() -> i32) -> Result<Pid, SupervisorError> {
            let pid = Pid::from_raw(self.next_pid);
            self.next_pid += 1;
            self.log.lock().unwrap().spawned.push(pid);
            Ok(pid)
        }

        fn signal_group(&mut self, signal: Signal) -> Result<(), SupervisorError> {
            self.log.lock().unwrap().signals.push(signal);
            Ok(())
        }

        fn next_events(&mut self) -> Result<Vec<ControlEvent>, SupervisorError> {
            let next = self.log.lock().unwrap().events.pop_front();
            Ok(next.unwrap_or_else(|| vec![ControlEvent::Terminate]))
        }
    }

    /// Returns queued configurations in order, then keeps returning the last.
    struct Sequence(Mutex<VecDeque<Result<Config, ()>>>, Mutex<Config>);

    impl Sequence {
        fn new(configs: Vec<Result<Config, ()>>) -> Self {
            Self(Mutex::new(configs.into()), Mutex::new(Config::default()))
        }
    }

    impl ConfigSource for Sequence {
        fn load(&self) -> Result<Config, ConfigError> {
            match self.0.lock().unwrap().pop_front() {
                Some(Ok(config)) => {
                    *self.1.lock().unwrap() = config.clone();
                    Ok(config)
                }
                Some(Err(())) => Err(ConfigError::Validation(vec![ValidationError::EmptyBindHost])),
                None => Ok(self.1.lock().unwrap().clone()),
            }
        }
    }

    fn config(workers: usize) -> Config {
        let mut config = Config::default();
        config.server.bind_host = "127.0.0.1".to_string();
        config.server.bind_port = 0;
        config.server.workers = workers;
        config
    }

    fn app() -> Arc<dyn Application> {
        Arc::new(|_req: Request| -> Result<Response, HttpError> { Ok(Response::default()) })
    }

    fn pid(raw: i32) -> Pid {
        Pid::from_raw(raw)
    }

    fn exited(raw: i32, code: i32) -> ControlEvent {
        ControlEvent::ChildExited {
            pid: pid(raw),
            exit: ChildExit::Code(code),
        }
    }

    fn started(
        configs: Vec<Result<Config, ()>>,
    ) -> (Supervisor<Sequence, ScriptedHost>, Arc<Mutex<HostLog>>) {
        let (host, log) = ScriptedHost::new(vec![]);
        let mut supervisor = Supervisor::new(Sequence::new(configs), host, app()).unwrap();
        supervisor.start().unwrap();
        (supervisor, log)
    }

    #[test]
    fn start_spawns_a_full_generation() {
        let (supervisor, log) = started(vec![Ok(config(3))]);

        let log = log.lock().unwrap();
        assert!(log.prepared);
        assert_eq!(log.spawned.len(), 3);
        assert_eq!(supervisor.workers().current_len(), 3);
        assert!(supervisor.local_addr().is_some());
        assert!(supervisor.is_running());
    }

    #[test]
    fn reload_retires_every_current_worker() {
        let (mut supervisor, log) = started(vec![Ok(config(2)), Ok(config(3))]);
        let socket_before = supervisor.socket().unwrap().id();

        supervisor.handle_event(ControlEvent::Reload).unwrap();

        assert_eq!(supervisor.workers().stale_len(), 2);
        assert_eq!(supervisor.workers().current_len(), 3);
        assert_eq!(supervisor.workers().generation_of(pid(100)), Some(Generation::Stale));
        assert_eq!(supervisor.workers().generation_of(pid(102)), Some(Generation::Current));
        assert_eq!(supervisor.socket().unwrap().id(), socket_before);
        assert_eq!(log.lock().unwrap().signals, vec![Signal::SIGHUP]);
    }

    #[test]
    fn failed_reload_changes_nothing() {
        let (mut supervisor, log) = started(vec![Ok(config(2)), Err(())]);

        supervisor.handle_event(ControlEvent::Reload).unwrap();

        assert_eq!(supervisor.workers().current_len(), 2);
        assert_eq!(supervisor.workers().stale_len(), 0);
        assert!(log.lock().unwrap().signals.is_empty());
    }

    #[test]
    fn clean_exit_is_replaced() {
        let (mut supervisor, log) = started(vec![Ok(config(2))]);

        supervisor.handle_event(exited(100, 0)).unwrap();
        supervisor
            .handle_event(ControlEvent::ChildExited {
                pid: pid(101),
                exit: ChildExit::Signaled(Signal::SIGKILL),
            })
            .unwrap();

        assert_eq!(log.lock().unwrap().spawned, vec![pid(100), pid(101), pid(102), pid(103)]);
        assert_eq!(supervisor.workers().current_len(), 2);
    }

    #[test]
    fn stale_exit_does_not_grow_the_pool() {
        let (mut supervisor, log) = started(vec![Ok(config(1)), Ok(config(1))]);
        supervisor.handle_event(ControlEvent::Reload).unwrap();

        supervisor.handle_event(exited(100, 0)).unwrap();

        assert_eq!(log.lock().unwrap().spawned.len(), 2);
        assert!(supervisor.workers().generation_of(pid(100)).is_none());
        assert_eq!(supervisor.workers().current_len(), 1);
    }

    #[test]
    fn unrecognised_child_is_harmless() {
        let (mut supervisor, log) = started(vec![Ok(config(2))]);
        let before = supervisor.workers().clone();

        supervisor.handle_event(exited(4242, 0)).unwrap();

        assert_eq!(supervisor.workers(), &before);
        assert_eq!(log.lock().unwrap().spawned.len(), 2);
        assert!(supervisor.is_running());
    }

    #[test]
    fn failing_workers_are_not_respawned() {
        let (mut supervisor, log) = started(vec![Ok(config(2))]);

        supervisor.handle_event(exited(100, 1)).unwrap();
        assert!(supervisor.is_running());
        supervisor.handle_event(exited(101, 1)).unwrap();

        assert_eq!(log.lock().unwrap().spawned.len(), 2);
        assert!(supervisor.workers().is_empty());
        assert!(!supervisor.is_running());
    }

    #[test]
    fn run_processes_events_until_terminated() {
        let (host, log) = ScriptedHost::new(vec![
            vec![exited(100, 0)],
            vec![ControlEvent::Reload],
            vec![ControlEvent::Interrupt, exited(101, 0)],
        ]);
        let source = Sequence::new(vec![Ok(config(2)), Ok(config(1))]);
        let supervisor = Supervisor::new(source, host, app()).unwrap();

        supervisor.run().unwrap();

        let log = log.lock().unwrap();
        // 2 initial, 1 replacement, 1 new generation, none after interrupt.
        assert_eq!(log.spawned.len(), 4);
        assert_eq!(log.signals, vec![Signal::SIGHUP, Signal::SIGTERM]);
        assert!(log.events.is_empty());
    }

    /// Fails the test if the supervisor tries to fork.
    struct NoForkHost;

    impl ProcessHost for NoForkHost {
        fn prepare(&mut self) -> Result<(), SupervisorError> {
            panic!("in-process serving must not prepare process control");
        }

        fn spawn(&mut self, _worker: &dyn Fn() -> i32) -> Result<Pid, SupervisorError> {
            panic!("in-process serving must not fork");
        }

        fn signal_group(&mut self, _signal: Signal) -> Result<(), SupervisorError> {
            panic!("in-process serving must not signal a group");
        }

        fn next_events(&mut self) -> Result<Vec<ControlEvent>, SupervisorError> {
            panic!("in-process serving has no control loop");
        }
    }

    #[test]
    fn zero_workers_serves_without_forking() {
        let source = Sequence::new(vec![Ok(config(0))]);
        let mut supervisor = Supervisor::new(source, NoForkHost, app()).unwrap();

        supervisor.serve_in_process(async {}).unwrap();

        assert!(supervisor.workers().is_empty());
        assert!(supervisor.socket().is_none());
    }
}
