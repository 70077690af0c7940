// Rooko entry point.
//
// Startup sequence:
// 1. Locate config/data directories, initialize tracing (log to file)
// 2. Load config (bootstrapping defaults on first run)
// 3. Load the playtime ledger
// 4. Spawn the page bridge
// 5. Build the stats aggregator and the overlay refresh loop
// 6. Spawn the session observer and the playtime accumulator
// 7. Serve host callbacks until Ctrl+C

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use rooko::bridge;
use rooko::config::{self, AppDirs, Config};
use rooko::overlay::{navigation_script, HOME_CALLBACK};
use rooko::playtime::{format_playtime, PlaytimeAccumulator, PlaytimeLedger};
use rooko::refresh::RefreshLoop;
use rooko::session::{ContextRules, SessionObserver};
use rooko::stats::{HttpFetcher, StatsAggregator};
use rooko::surface::Surface;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Directories + tracing
    let dirs = AppDirs::discover().context("failed to locate application directories")?;
    init_tracing(&dirs)?;
    info!("Rooko starting up");

    // 2. Config
    let config = config::load_config(&dirs).context("failed to load configuration")?;
    info!("Config loaded from {}", dirs.config_path().display());
    if config.player.username.trim().is_empty() {
        warn!(
            "no chess.com username set in {}; the overlay will show N/A",
            dirs.config_path().display()
        );
    }

    // 3. Ledger
    let ledger = PlaytimeLedger::load(config.playtime_path(&dirs.data_dir));
    info!(
        "Playtime ledger {} holds {}",
        ledger.path().display(),
        format_playtime(ledger.total_seconds())
    );

    // 4. Page bridge
    let (bridge_surface, bridge_handles) = bridge::channel();
    let surface: Arc<dyn Surface> = Arc::new(bridge_surface);
    let (callback_tx, mut callback_rx) = mpsc::channel(16);
    let port = config.bridge.port;
    let bridge_handle = tokio::spawn(async move {
        if let Err(e) = bridge::run(port, bridge_handles, callback_tx).await {
            error!("Page bridge error on port {port}: {e:#}");
        }
    });

    // 5. Stats + refresh loop (started later by the observer)
    let fetcher = HttpFetcher::from_config(&config)?;
    let aggregator = Arc::new(StatsAggregator::new(
        Arc::new(fetcher),
        config.api.base_url.clone(),
    ));
    let rules = ContextRules::from_config(&config.context);
    let refresh = RefreshLoop::new(
        surface.clone(),
        aggregator,
        rules.clone(),
        config.player.username.clone(),
        config.overlay.show_graph,
        Duration::from_secs(config.overlay.refresh_interval_secs),
    );

    // 6. Long-running loops
    let observer = SessionObserver::new(surface.clone(), rules.clone(), refresh);
    let accumulator = PlaytimeAccumulator::new(surface.clone(), rules, ledger);
    let observer_handle = tokio::spawn(observer.run());
    let accumulator_handle = tokio::spawn(accumulator.run());

    // 7. Host callbacks
    info!("Rooko ready. Waiting for the page on ws://127.0.0.1:{port}");
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            Some(name) = callback_rx.recv() => {
                handle_callback(&name, surface.as_ref(), &config).await;
            }
            _ = &mut ctrl_c => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    // The loops never finish on their own; the ledger flush is best-effort.
    observer_handle.abort();
    accumulator_handle.abort();
    bridge_handle.abort();

    info!("Rooko shut down");
    Ok(())
}

/// React to a callback the overlay invoked in the page.
async fn handle_callback(name: &str, surface: &dyn Surface, config: &Config) {
    match name {
        HOME_CALLBACK => {
            info!("Home requested from overlay");
            if let Err(e) = surface.run_script(&navigation_script(&config.bridge.home_url)).await {
                warn!("failed to navigate home: {e}");
            }
        }
        other => warn!("ignoring unknown host callback `{other}`"),
    }
}

/// Initialize tracing to log to `<data_dir>/logs/rooko.log`.
fn init_tracing(dirs: &AppDirs) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = dirs.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let log_file = std::fs::File::create(log_dir.join("rooko.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rooko=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
