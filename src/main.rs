use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use flameprof::config::Config;
use flameprof::export::health::HealthMetrics;
use flameprof::server::{self, AppState};
use flameprof::service::FlameGraphService;
use flameprof::snapshot::procfs::ProcfsSnapshotProvider;

/// Embedded continuous sampling profiler with a flame-graph HTTP API.
#[derive(Parser)]
#[command(name = "flameprof", about)]
struct Cli {
    /// Path to the YAML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

/// Build-time version info.
mod version {
    /// Release version string (set at build time).
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle version subcommand before anything else.
    if let Some(Command::Version) = &cli.command {
        println!("flameprof {}", version::full());
        return Ok(());
    }

    // Initialize tracing.
    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;

    fmt().with_env_filter(filter).with_target(true).init();

    let cfg = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    tracing::info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        "starting flameprof",
    );

    // Build and run the tokio runtime.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(async { run(cfg).await })
}

async fn run(cfg: Config) -> Result<()> {
    // Set up signal handling.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
            }
        }

        let _ = shutdown_tx.send(());
    });

    let cancel = CancellationToken::new();

    let health = Arc::new(HealthMetrics::new().context("creating health metrics")?);
    let provider = Arc::new(ProcfsSnapshotProvider::new());
    let service = Arc::new(FlameGraphService::new(
        cfg.profiler.clone(),
        provider,
        Arc::clone(&health),
    ));

    // The sampler cadence starts once here, gated by `profiler.enabled`.
    // The HTTP start/stop endpoints only flip the sampling flag.
    service
        .spawn_sampler(cancel.child_token())
        .context("starting sampler")?;

    let state = AppState {
        service: Arc::clone(&service),
        health,
    };

    let server_task = tokio::spawn(server::serve(
        cfg.server.addr.clone(),
        state,
        cancel.child_token(),
    ));

    // Wait for shutdown signal.
    let _ = shutdown_rx.await;
    cancel.cancel();

    server_task
        .await
        .context("joining http server task")?
        .context("http server failed")?;

    service.shutdown();

    tracing::info!("flameprof stopped");

    Ok(())
}
