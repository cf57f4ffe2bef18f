//! Pulseboard Presence — in-process presence simulation
//!
//! Wires the presence engine to an in-memory hub, drives a handful of
//! simulated peers, and reports what one observer sees.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use pulseboard_core::config::AppConfig;
use pulseboard_core::error::AppError;
use pulseboard_core::types::{Activity, PresenceStatus, Scope};
use pulseboard_realtime::{InteractionSignal, LocalIdentity, MemoryHub, PresenceTracker};

#[derive(Parser, Debug)]
#[command(name = "pulseboard-presence", version, about = "Pulseboard presence simulation")]
struct Cli {
    /// Configuration environment overlay (config/<env>.toml)
    #[arg(long, default_value = "development")]
    env: String,

    /// Scope to join, overriding the configured one
    #[arg(long)]
    scope: Option<String>,

    /// Number of simulated peers, overriding the configured count
    #[arg(long)]
    peers: Option<usize>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match AppConfig::load(&cli.env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(scope) = cli.scope {
        config.simulation.scope = scope;
    }
    if let Some(peers) = cli.peers {
        config.simulation.peers = peers;
    }

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Simulation error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(config.logging.with_target)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(config.logging.with_target)
                .init();
        }
    }
}

/// Start the peers, drive them until Ctrl+C, then tear every scope down
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Pulseboard presence v{}", env!("CARGO_PKG_VERSION"));

    let scope = Scope::parse(&config.simulation.scope)?;
    let hub = MemoryHub::new();

    let mut trackers = Vec::with_capacity(config.simulation.peers);
    for n in 1..=config.simulation.peers.max(1) {
        let identity = LocalIdentity::new(
            format!("user-{n}"),
            format!("User {n}"),
            if n == 1 { "owner" } else { "member" },
        );
        let channel = Arc::new(hub.channel(&scope, identity.user_id.clone()));
        let tracker =
            PresenceTracker::start(identity, scope.clone(), channel, config.presence.clone())?;
        trackers.push(tracker);
    }
    tracing::info!(
        scope = %scope,
        peers = trackers.len(),
        "Simulated peers started"
    );

    let mut actions = tokio::time::interval(Duration::from_secs(
        config.simulation.action_interval_seconds.max(1),
    ));
    let mut reports = tokio::time::interval(Duration::from_secs(
        config.simulation.report_interval_seconds.max(1),
    ));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut step: usize = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = actions.tick() => {
                step += 1;
                simulate_step(&trackers, step);
            }
            _ = reports.tick() => report(&trackers[0]),
        }
    }

    tracing::info!("Shutdown signal received, tearing down scopes...");
    for tracker in &trackers {
        tracker.shutdown().await;
    }
    tracing::info!("Pulseboard presence shut down gracefully");
    Ok(())
}

/// Make one peer (never the observer) do something
fn simulate_step(trackers: &[PresenceTracker], step: usize) {
    if trackers.len() < 2 {
        return;
    }
    let tracker = &trackers[1 + step % (trackers.len() - 1)];
    match step % 5 {
        0 => tracker.set_status(PresenceStatus::Busy),
        1 => tracker.set_status(PresenceStatus::Online),
        2 => tracker.set_activity(Activity::Editing, Some(format!("/documents/{step}"))),
        3 => tracker.record_signal(InteractionSignal::Hidden),
        _ => tracker.record_signal(InteractionSignal::Visible),
    }
}

/// Log what the observer sees
fn report(observer: &PresenceTracker) {
    let view = observer.view();
    let counts = view.counts_by_status;
    tracing::info!(
        connection = %observer.connection_state(),
        total = view.total_count,
        online = counts.online,
        away = counts.away,
        busy = counts.busy,
        "Presence view"
    );
    for peer in &view.peers {
        tracing::debug!(
            user_id = %peer.user_id,
            status = %peer.status,
            activity = %peer.activity,
            location = peer.location.as_deref().unwrap_or("-"),
            "Peer"
        );
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
