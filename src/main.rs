//! API server
//!
//! Prefork HTTP API server built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!   api-server (supervisor, no runtime)
//!   ├── config      load / validate / reload on SIGHUP
//!   ├── net         listening socket, TLS wrap, bind retry
//!   └── lifecycle   fork workers, reap, retire generations
//!         │
//!         ├── worker 1 ─┐
//!         ├── worker 2 ─┼─ tokio current-thread runtime
//!         └── worker N ─┘    → http (axum) → middleware → routing → dispatch
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::Method;
use clap::Parser;
use serde_json::{json, Value};

use api_server::config::{ConfigSource, FileSource};
use api_server::dispatch::{Controller, Resource};
use api_server::http::middleware::{wrap, DebugLog, RequestId};
use api_server::http::Application;
use api_server::lifecycle::{ForkHost, Supervisor};
use api_server::observability;
use api_server::routing::{reject_method, Mapper, RouteError, Router};

#[derive(Debug, Parser)]
#[command(name = "api-server", version, about = "Prefork HTTP API server")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "api-server.toml")]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

/// Small built-in API: server status and a JSON echo.
fn build_app() -> Result<Arc<dyn Application>, RouteError> {
    let controller = Controller::new()
        .on("show", |_req, _args| {
            Ok(json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
                "pid": std::process::id(),
            })
            .into())
        })
        .on("echo", |_req, args| Ok(Value::Object(args).into()));
    let status: Arc<dyn Application> = Arc::new(Resource::new(controller));

    let mut mapper = Mapper::new();
    mapper
        .connect("/", &[Method::GET, Method::HEAD], Arc::clone(&status), Some("show"))?
        .connect("/", &[], reject_method(&[Method::GET, Method::HEAD]), None)?
        .connect("/echo{.format}", &[Method::POST], status, Some("echo"))?
        .connect("/echo{.format}", &[], reject_method(&[Method::POST]), None)?;

    let app: Arc<dyn Application> = Arc::new(Router::new(mapper));
    let app = wrap(DebugLog, app);
    Ok(wrap(RequestId, app))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let source = FileSource::new(&cli.config);
    let config = source.load()?;

    if cli.check {
        println!("{}: configuration OK", cli.config.display());
        return Ok(());
    }

    let log = observability::init(&config.logging.level)?;
    tracing::info!(
        config = %cli.config.display(),
        "api-server v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let supervisor = Supervisor::new(source, ForkHost::new(), build_app()?)?.with_log_handle(log);
    supervisor.run()?;

    tracing::info!("Shutdown complete");
    Ok(())
}
