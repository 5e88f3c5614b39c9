//! Synthetic streaming LLM workload server.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: 0.0.0.0:8083, cooperative binding
//! synthetic-llm-server
//!
//! # With config file
//! synthetic-llm-server config/server.toml
//!
//! # Thread-per-request binding with remote fan-out
//! SYN_FANOUT=3 SYN_FANOUT_HTTP=1 synthetic-llm-server --binding threaded
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use nix::sys::resource::{getrlimit, setrlimit, Resource};
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use synthetic_llm_server::{
    binding::Binding,
    config::{Config, LoggingConfig},
    metrics::{init_metrics, peak_streams, start_metrics_server},
    server::{build_router, AppState, HttpListener},
    shutdown::ShutdownCoordinator,
    simulation::HttpToolCaller,
};

/// Synthetic streaming LLM server for load-testing baselines.
#[derive(Parser, Debug)]
#[command(name = "synthetic-llm-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML).
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Override listen port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override concurrency binding.
    #[arg(short, long, value_enum)]
    binding: Option<Binding>,

    /// Number of Tokio worker threads (0 = num_cpus).
    #[arg(short = 'w', long, default_value = "0")]
    workers: usize,

    /// Enable debug logging.
    #[arg(short, long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(args.config.as_ref())?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(binding) = args.binding {
        config.server.binding = binding;
    }
    if args.debug {
        config.logging.level = "debug".to_string();
    }

    init_logging(&config.logging)?;

    // Many concurrent streams need many sockets
    increase_fd_limit();

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    if args.workers > 0 {
        runtime.worker_threads(args.workers);
    }
    let runtime = runtime.enable_all().build()?;

    runtime.block_on(run_server(config))
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        binding = config.server.binding.as_str(),
        frames = config.simulation.frames,
        delay_ms = config.simulation.delay_ms,
        bytes_per_frame = config.simulation.bytes_per_frame,
        cpu_spin_ms = config.simulation.cpu_spin_ms,
        fanout = config.simulation.fanout,
        fanout_http = config.simulation.fanout_http,
        gzip = config.server.gzip,
        "Starting synthetic server"
    );

    init_metrics();
    if config.metrics.enabled {
        let addr = config.metrics.listen_addr.parse()?;
        start_metrics_server(addr)?;
    }

    let tool = HttpToolCaller::new(&config.fanout)?;
    tracing::info!(tool_url = tool.url(), "Fan-out target configured");

    let shutdown = ShutdownCoordinator::new();
    let state = Arc::new(AppState {
        defaults: config.simulation.clone(),
        binding: config.server.binding,
        tool: Arc::new(tool),
        shutdown: shutdown.clone(),
        stream_buffer: config.server.stream_buffer,
    });
    let app = build_router(state, config.server.gzip);

    let listener = HttpListener::bind(config.server.listen_addr()?, shutdown.clone()).await?;
    tracing::info!(addr = %listener.local_addr(), "Server listening");

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = handle_signals(signal_shutdown).await {
            tracing::error!(error = %e, "Failed to install signal handlers");
        }
    });

    listener.serve(app).await;

    // Wait for streams to drain
    tracing::info!(
        active = shutdown.active_streams(),
        timeout_secs = config.server.shutdown_timeout_secs,
        "Waiting for streams to drain"
    );

    let drain_result =
        tokio::time::timeout(config.server.shutdown_timeout(), shutdown.wait_for_drain()).await;

    match drain_result {
        Ok(()) => {
            tracing::info!("All streams drained");
        }
        Err(_) => {
            tracing::warn!(
                active = shutdown.active_streams(),
                "Shutdown timeout reached, forcing exit"
            );
        }
    }

    tracing::info!(peak_streams = peak_streams(), "Server stopped");
    Ok(())
}

/// Initialize logging with tracing.
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    match config.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }

    Ok(())
}

/// Raise the soft file descriptor limit up to the hard limit.
fn increase_fd_limit() {
    const DESIRED_LIMIT: u64 = 100_000;

    match getrlimit(Resource::RLIMIT_NOFILE) {
        Ok((soft, hard)) if soft < DESIRED_LIMIT => {
            let target = DESIRED_LIMIT.min(hard);
            match setrlimit(Resource::RLIMIT_NOFILE, target, hard) {
                Ok(()) => tracing::info!(limit = target, "Increased fd limit"),
                Err(e) => tracing::warn!(error = %e, "Could not increase fd limit"),
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Could not read fd limit"),
    }
}

/// Handle Unix signals.
async fn handle_signals(shutdown: ShutdownCoordinator) -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, initiating shutdown");
                shutdown.shutdown();
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating shutdown");
                shutdown.shutdown();
                break;
            }
            _ = sighup.recv() => {
                tracing::info!(
                    active_streams = shutdown.active_streams(),
                    "Received SIGHUP, status report"
                );
            }
        }
    }

    Ok(())
}
