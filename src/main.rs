use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dronegate::banner::{print_banner, print_session_summary};
use dronegate::config::GatewayConfig;
use dronegate::consts::{
    DEFAULT_BIND, DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_INPUT_BYTES, DEFAULT_MAX_REQUEST_BYTES,
    DEFAULT_SOLVER_TIMEOUT_SECS, default_solver_path,
};
use dronegate::handler::Gateway;
use dronegate::server;

#[derive(Parser)]
#[command(
    name = "dronegate",
    version,
    about = "Validates drone-delivery grid problems and runs the solver."
)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, env = "DRONEGATE_BIND", default_value = DEFAULT_BIND)]
    bind: SocketAddr,

    /// Path to the solver executable
    #[arg(short, long, env = "DRONEGATE_SOLVER", default_value_os_t = default_solver_path())]
    solver: PathBuf,

    /// Largest accepted problem, in bytes
    #[arg(long, env = "DRONEGATE_MAX_INPUT_BYTES", default_value_t = DEFAULT_MAX_INPUT_BYTES)]
    max_input_bytes: usize,

    /// Largest request body the HTTP layer will buffer, in bytes
    #[arg(long, env = "DRONEGATE_MAX_REQUEST_BYTES", default_value_t = DEFAULT_MAX_REQUEST_BYTES)]
    max_request_bytes: usize,

    /// Solver wall-clock timeout in seconds
    #[arg(short, long, env = "DRONEGATE_TIMEOUT_SECS", default_value_t = DEFAULT_SOLVER_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Solver processes allowed to run at once
    #[arg(short = 'j', long, env = "DRONEGATE_MAX_CONCURRENT", default_value_t = DEFAULT_MAX_CONCURRENT)]
    max_concurrent: usize,
}

impl Cli {
    fn into_config(self) -> GatewayConfig {
        GatewayConfig {
            solver_path: self.solver,
            max_input_bytes: self.max_input_bytes,
            max_request_bytes: self.max_request_bytes,
            solver_timeout: Duration::from_secs(self.timeout_secs),
            max_concurrent: self.max_concurrent,
            bind: self.bind,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dronegate=info,tower_http=info".into()),
        )
        .init();

    let config = Cli::parse().into_config();
    config.validate().context("invalid configuration")?;

    print_banner(&config);
    if !config.solver_present() {
        warn!(
            solver = %config.solver_path.display(),
            "solver binary not found; requests will fail until it is built"
        );
    }
    info!(
        max_input_bytes = config.max_input_bytes,
        max_request_bytes = config.max_request_bytes,
        timeout_secs = config.solver_timeout.as_secs(),
        max_concurrent = config.max_concurrent,
        "server config loaded"
    );

    let gateway = Arc::new(Gateway::from_config(&config));
    let app = server::router(Arc::clone(&gateway), config.max_request_bytes);

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    let limiter = gateway.limiter().clone();
    server::serve(listener, app, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        println!();
        // Requests still queued for a slot are turned away; running ones finish.
        limiter.close();
    })
    .await?;

    print_session_summary(gateway.stats());
    Ok(())
}
