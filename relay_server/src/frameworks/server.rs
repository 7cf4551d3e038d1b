// Framework bootstrap for the relay server runtime.

use crate::frameworks::config::{self, RelaySettings};
use crate::interface_adapters::http::status_handler;
use crate::interface_adapters::net::ws_handler;
use crate::interface_adapters::state::{AppState, ConnectionSettings};
use crate::use_cases::RelayHub;

use axum::{Router, routing::get};
use std::future::Future;
use std::net::SocketAddr;
use std::{
    io::Result,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

/// Serves the relay on an already-bound listener with default settings.
pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    run_with_settings(listener, RelaySettings::default(), std::future::pending()).await
}

/// Serves the relay until `shutdown` resolves.
pub async fn run_with_settings(
    listener: tokio::net::TcpListener,
    settings: RelaySettings,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let address = listener.local_addr()?;
    let state = build_state(&settings);

    // The reaper is the only writer besides connection tasks; it shares the hub lock.
    let reaper = spawn_heartbeat_reaper(
        Arc::clone(&state.hub),
        settings.heartbeat_grace,
        settings.reap_interval,
    );

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/status", get(status_handler))
        .with_state(state);

    tracing::info!(
        %address,
        heartbeat_grace_ms = settings.heartbeat_grace.as_millis(),
        "listening"
    );

    // Serve app and report errors rather than panicking
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .inspect_err(|e| {
            tracing::error!(error = %e, "server error");
        });
    reaper.abort();
    served
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::new(config::bind_addr(), config::http_port());

    // Bind TCP listener with error handling
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run_with_settings(listener, RelaySettings::from_env(), shutdown_signal()).await
}

fn build_state(settings: &RelaySettings) -> Arc<AppState> {
    let mut hub = RelayHub::new();
    hub.on_presence_change(Box::new(|snapshot: crate::domain::PresenceSnapshot| {
        tracing::info!(consumer_count = snapshot.consumer_count, "presence changed");
    }));

    Arc::new(AppState {
        hub: Arc::new(Mutex::new(hub)),
        connection: ConnectionSettings {
            role_announce_timeout: settings.role_announce_timeout,
            outbound_capacity: settings.outbound_capacity,
        },
        started_at: Instant::now(),
    })
}

fn spawn_heartbeat_reaper(
    hub: Arc<Mutex<RelayHub>>,
    grace: Duration,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let reaped = hub.lock().await.reap_expired(Instant::now(), grace);
            if !reaped.is_empty() {
                tracing::debug!(count = reaped.len(), "reaped silent sessions");
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        // Without a signal handler, keep serving until the process is killed.
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
