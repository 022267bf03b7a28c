//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use axum::http::Method;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use api_server::config::validation::validate_config;
use api_server::config::{Config, ConfigError, ConfigSource};
use api_server::dispatch::{Controller, Resource};
use api_server::http::Application;
use api_server::lifecycle::{ControlEvent, ProcessHost, Supervisor, SupervisorError};
use api_server::routing::{reject_method, Mapper, Router};

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Loopback, ephemeral port, in-process serving.
pub fn local_config() -> Config {
    let mut config = Config::default();
    config.server.bind_host = "127.0.0.1".to_string();
    config.server.bind_port = 0;
    config.server.workers = 0;
    config
}

/// A configuration source whose next answer the test controls.
#[derive(Clone)]
pub struct SharedSource(Arc<Mutex<Config>>);

impl SharedSource {
    pub fn new(config: Config) -> Self {
        Self(Arc::new(Mutex::new(config)))
    }

    pub fn set(&self, config: Config) {
        *self.0.lock().unwrap() = config;
    }
}

impl ConfigSource for SharedSource {
    fn load(&self) -> Result<Config, ConfigError> {
        let config = self.0.lock().unwrap().clone();
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

/// Host for in-process tests: never forks and never signals anything.
pub struct InertHost;

impl ProcessHost for InertHost {
    fn prepare(&mut self) -> Result<(), SupervisorError> {
        Ok(())
    }

    fn spawn(&mut self, _worker: &dyn Fn() -> i32) -> Result<Pid, SupervisorError> {
        panic!("integration tests serve in-process");
    }

    fn signal_group(&mut self, _signal: Signal) -> Result<(), SupervisorError> {
        Ok(())
    }

    fn next_events(&mut self) -> Result<Vec<ControlEvent>, SupervisorError> {
        Ok(vec![ControlEvent::Terminate])
    }
}

/// Images API used by the end-to-end tests.
pub fn images_app() -> Arc<dyn Application> {
    let controller = Controller::new()
        .on("index", |_req, _args| {
            Ok(json!({ "images": [], "pid": std::process::id() }).into())
        })
        .on("show", |_req, args| Ok(json!({ "image": args }).into()))
        .on("create", |_req, args| Ok(Value::Object(args).into()));
    let images: Arc<dyn Application> = Arc::new(Resource::new(controller));

    let mut mapper = Mapper::new();
    mapper
        .connect("/images", &[Method::GET], Arc::clone(&images), Some("index"))
        .unwrap()
        .connect("/images", &[Method::POST], Arc::clone(&images), Some("create"))
        .unwrap()
        .connect("/images", &[], reject_method(&[Method::GET, Method::POST]), None)
        .unwrap()
        .connect("/images/{id}{.format}", &[Method::GET], images, Some("show"))
        .unwrap();
    Arc::new(Router::new(mapper))
}

/// A supervisor serving in-process on a background thread.
pub struct RunningServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<Result<(), SupervisorError>>>,
}

impl RunningServer {
    /// Start serving `supervisor`, which must already be started.
    pub fn spawn(mut supervisor: Supervisor<SharedSource, InertHost>) -> Self {
        supervisor.start().unwrap();
        let addr = supervisor.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let thread = std::thread::spawn(move || {
            supervisor.serve_in_process(async {
                let _ = rx.await;
            })
        });

        Self {
            addr,
            shutdown: Some(tx),
            thread: Some(thread),
        }
    }

    pub fn start(config: Config, app: Arc<dyn Application>) -> Self {
        let supervisor = Supervisor::new(SharedSource::new(config), InertHost, app).unwrap();
        Self::spawn(supervisor)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Drain and wait for the serving thread.
    pub fn stop(mut self) {
        self.shutdown.take().map(|tx| tx.send(()));
        if let Some(thread) = self.thread.take() {
            thread.join().unwrap().unwrap();
        }
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
