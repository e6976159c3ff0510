use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use signage_agent::{
    cache::CacheIndex,
    config::{Config, SharedConfig},
    offline,
    player::{PlayerController, PlayerHandle},
    playlist::PlaylistStore,
    poller::run_poller,
    scheduler::Scheduler,
    status::{StatusRegistry, run_status_writer},
    watchdog::run_watchdog,
};

/// Exit status when the agent has neither API credentials nor offline
/// media to show.
const EXIT_UNUSABLE: u8 = 2;
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const FORCED_EXIT_DELAY: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "signage-agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resilient digital-signage kiosk agent")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log level
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("signage_agent={}", cli.log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = match Config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load config {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Starting signage agent v{} (state dir {})",
        env!("CARGO_PKG_VERSION"),
        cfg.state_dir.display()
    );

    let playlist = Arc::new(PlaylistStore::new());
    let status = Arc::new(StatusRegistry::new());
    let index = Arc::new(CacheIndex::load(&cfg.state_dir).await);

    // Put something on screen before the network is proven.
    let mut offline_loaded = false;
    if let Some(restored) = offline::load_offline_playlist(&cfg, &index).await {
        info!(
            "Starting with offline playlist ({}, {} items)",
            restored.source,
            restored.items.len()
        );
        status.update(|s| s.playlist_size = Some(restored.items.len()));
        playlist.update(restored.items, &restored.fingerprint);
        offline_loaded = true;
    }

    if !cfg.has_api_credentials() && !offline_loaded {
        error!("api_key and environment_id are not set and no offline media is usable");
        return ExitCode::from(EXIT_UNUSABLE);
    }
    if !cfg.has_api_credentials() {
        warn!("No API credentials; running from offline media only");
    }

    let has_credentials = cfg.has_api_credentials();
    let config = SharedConfig::new(cfg);
    let cancel = CancellationToken::new();
    let poll_now = Arc::new(Notify::new());

    let player = Arc::new(PlayerController::new(config.clone()));
    if !player.start().await {
        // The watchdog keeps retrying; boot continues regardless.
        warn!("Player did not start cleanly at boot");
    }

    tokio::spawn(handle_signals(cancel.clone()));

    let mut workers = Vec::new();
    if has_credentials {
        workers.push(tokio::spawn(run_poller(
            config.clone(),
            playlist.clone(),
            status.clone(),
            index.clone(),
            poll_now.clone(),
            cancel.clone(),
        )));
    }
    workers.push(tokio::spawn(run_watchdog(
        config.clone(),
        player.clone() as Arc<dyn PlayerHandle>,
        status.clone(),
        cancel.clone(),
    )));
    workers.push(tokio::spawn(signage_agent::cache::run_cleanup(
        config.clone(),
        playlist.clone(),
        status.clone(),
        index.clone(),
        cancel.clone(),
    )));
    workers.push(tokio::spawn(run_status_writer(
        config.clone(),
        status.clone(),
        cancel.clone(),
    )));

    // The scheduler owns the foreground; it returns on cancellation.
    Scheduler::new(
        config,
        playlist,
        status,
        player.clone() as Arc<dyn PlayerHandle>,
        cancel.clone(),
    )
    .run()
    .await;

    cancel.cancel();
    for worker in workers {
        if tokio::time::timeout(WORKER_JOIN_TIMEOUT, worker).await.is_err() {
            warn!("Worker did not stop within {WORKER_JOIN_TIMEOUT:?}");
        }
    }
    if let Err(e) = index.persist(true).await {
        warn!("Final cache index persist failed: {e}");
    }
    player.stop().await;
    info!("Shutdown complete");
    ExitCode::SUCCESS
}

/// First signal requests a graceful stop and arms a forced exit; any
/// further signal is logged while the forced-exit timer runs.
async fn handle_signals(cancel: CancellationToken) {
    wait_for_signal().await;
    info!("Signal received, stopping...");
    cancel.cancel();
    tokio::spawn(async {
        tokio::time::sleep(FORCED_EXIT_DELAY).await;
        error!("Graceful shutdown timed out, forcing exit");
        std::process::exit(1);
    });
    loop {
        wait_for_signal().await;
        warn!("Shutdown already in progress");
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!("Cannot install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
