// Framework bootstrap for the scan client process.

use crate::domain::{CaptureError, Role, ScanEvent, TransportError};
use crate::frameworks::config::ClientConfig;
use crate::interface_adapters::capture::LineCaptureSource;
use crate::interface_adapters::protocol::{ServerEventKind, ServerMessage};
use crate::interface_adapters::sink::LineSink;
use crate::interface_adapters::status::{attach_status_logging, spawn_state_watcher};
use crate::interface_adapters::transport::{ConnectionState, TransportSession};
use crate::use_cases::{ConsumerAdapter, ProducerAdapter, RunOutcome};

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug)]
pub enum ClientError {
    Transport(TransportError),
    Capture(CaptureError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transport(err) => write!(f, "{err}"),
            ClientError::Capture(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        ClientError::Transport(err)
    }
}

impl From<CaptureError> for ClientError {
    fn from(err: CaptureError) -> Self {
        ClientError::Capture(err)
    }
}

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // Consumers print scans on stdout, so logs go to stderr.
    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub async fn run_with_config() -> Result<(), ClientError> {
    init_runtime();
    let config = ClientConfig::from_env();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_tx.send_replace(true);
    });

    run(config, shutdown_rx).await
}

/// Runs one client until stdin ends (producer), `shutdown` flips to true,
/// or the relay becomes unreachable.
pub async fn run(
    config: ClientConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ClientError> {
    let role = config.transport.role;
    let session = Arc::new(TransportSession::new(config.transport.clone()));
    attach_status_logging(&session);
    if role == Role::Consumer {
        attach_consumer(&session);
    }
    let watcher = spawn_state_watcher(session.subscribe_state());

    tracing::info!(%role, url = %config.transport.url, mode = ?config.mode, "starting scan client");

    let connected = tokio::select! {
        result = session.connect() => result,
        _ = shutdown.wait_for(|stop| *stop) => Err(TransportError::Closed),
    };
    if let Err(e) = connected {
        session.close().await;
        let _ = watcher.await;
        return match e {
            TransportError::Closed => Ok(()),
            other => Err(other.into()),
        };
    }

    // Retry exhaustion ends the run just like Ctrl-C does.
    let mut halt = halt_on_terminal_state(&session, shutdown);
    let result = match role {
        Role::Producer => run_producer(Arc::clone(&session), &config, &mut halt).await,
        Role::Consumer => {
            let _ = halt.wait_for(|stop| *stop).await;
            Ok(())
        }
    };

    let final_state = session.state();
    session.close().await;
    let _ = watcher.await;

    if final_state == ConnectionState::Disconnected {
        return Err(TransportError::RetriesExhausted {
            attempts: config.transport.reconnect_attempts,
        }
        .into());
    }
    result
}

async fn run_producer(
    session: Arc<TransportSession>,
    config: &ClientConfig,
    halt: &mut watch::Receiver<bool>,
) -> Result<(), ClientError> {
    let mut adapter = ProducerAdapter::new(session, config.mode);
    let mut source = LineCaptureSource::stdin(config.default_symbology.clone());

    match adapter.run(&mut source, halt).await? {
        RunOutcome::SourceEnded => tracing::info!("capture input ended"),
        RunOutcome::ScanCompleted(outcome) => tracing::info!(?outcome, "single scan complete"),
        RunOutcome::Shutdown => {}
    }
    Ok(())
}

fn attach_consumer(session: &TransportSession) {
    let adapter = Arc::new(ConsumerAdapter::new(LineSink::stdout()));
    session.on_event(ServerEventKind::ScanEvent, move |message| {
        if let ServerMessage::ScanEvent(dto) = message {
            adapter.on_scan(&ScanEvent::from(dto.clone()));
        }
    });
}

// Merges the external shutdown signal with the session reaching a terminal state.
fn halt_on_terminal_state(
    session: &TransportSession,
    mut shutdown: watch::Receiver<bool>,
) -> watch::Receiver<bool> {
    let (halt_tx, halt_rx) = watch::channel(false);
    let mut states = session.subscribe_state();
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => {}
            _ = states.wait_for(|state| state.is_terminal()) => {}
        }
        halt_tx.send_replace(true);
    });
    halt_rx
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
