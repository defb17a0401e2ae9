// tallyd - leaderboard server over an append-only event ledger
//
// One process, one writer:
// - Axum HTTP ingestion (webhook transport boundary)
// - Counter store guarded by a readiness gate
// - Write buffer flushed to the ledger on a timer
// - Startup reconciliation replaying the full ledger
// - Scheduled leaderboard publication through the notify sink

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono_tz::Tz;
use serde_json::json;
use tokio::signal;
use tracing::{debug, error, info, warn};

use tally_buffer::{FlushOutcome, WriteBuffer};
use tally_config::RuntimeConfig;
use tally_core::{CounterStore, EventLog, Notifier, SnapshotStore};

mod gate;
mod handlers;
mod init;
mod notify;
mod reconcile;
mod scheduler;

pub use gate::{Readiness, ReadinessGate};
pub use init::init_tracing;

use handlers::{
    handle_event, handle_leaderboard, handle_publish, handle_rebuild, health_check, ready_check,
};

/// Application state shared across all requests
#[derive(Clone)]
pub(crate) struct AppState {
    pub config: Arc<RuntimeConfig>,
    pub tz: Tz,
    pub store: Arc<CounterStore>,
    pub gate: Arc<ReadinessGate>,
    pub buffer: Arc<WriteBuffer>,
    pub ledger: Option<Arc<dyn EventLog>>,
    pub snapshots: Option<Arc<dyn SnapshotStore>>,
    pub notifier: Arc<dyn Notifier>,
    pub rebuild_in_flight: Arc<AtomicBool>,
}

/// Error type that implements IntoResponse
pub(crate) struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Request error: {:?}", self.error);
        (
            self.status,
            Json(json!({
                "error": self.error.to_string(),
            })),
        )
            .into_response()
    }
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn bad_request<E>(error: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
        }
    }

    pub fn internal<E>(error: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: error.into(),
        }
    }
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

/// Entry point with pre-loaded configuration (for CLI usage)
pub async fn run_with_config(config: RuntimeConfig) -> Result<()> {
    init_tracing(&config);

    info!("tallyd - time-windowed leaderboard server");

    let tz = config.tz();
    let addr = config.server.listen_addr.clone();

    let (ledger, snapshots) = init::build_sinks(&config);
    let notifier = init::build_notifier(&config)?;

    // Prime the store from the local snapshot; it is only a pre-rebuild
    // fallback and will be replaced wholesale by the reconciler.
    let store = Arc::new(match &snapshots {
        Some(snapshot_store) => match snapshot_store.load().await {
            Ok(Some(cached)) => {
                info!("Loaded local state snapshot as pre-rebuild fallback");
                CounterStore::with_state(cached)
            }
            Ok(None) => CounterStore::new(),
            Err(e) => {
                warn!(error = %e, "Failed to load local state snapshot; starting empty");
                CounterStore::new()
            }
        },
        None => CounterStore::new(),
    });

    let state = AppState {
        tz,
        store,
        gate: Arc::new(ReadinessGate::new()),
        buffer: Arc::new(WriteBuffer::new(config.buffer.max_batch)),
        ledger,
        snapshots,
        notifier,
        rebuild_in_flight: Arc::new(AtomicBool::new(false)),
        config: Arc::new(config),
    };

    // First reconciliation runs in the background so the listener binds
    // immediately; the readiness gate keeps mutations out until it lands.
    tokio::spawn(reconcile::startup_rebuild(state.clone()));

    let app = Router::new()
        .route("/v1/events", post(handle_event))
        .route("/v1/publish", post(handle_publish))
        .route("/v1/rebuild", post(handle_rebuild))
        .route("/v1/leaderboard/:kind", get(handle_leaderboard))
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind to {}", addr))?;

    info!("Leaderboard HTTP endpoint listening on http://{}", addr);
    info!("Routes:");
    info!("  POST http://{}/v1/events             - event ingestion", addr);
    info!("  POST http://{}/v1/publish            - publish leaderboards", addr);
    info!("  POST http://{}/v1/rebuild            - rebuild from the ledger", addr);
    info!("  GET  http://{}/v1/leaderboard/:kind  - ranking query", addr);
    info!("  GET  http://{}/health                - health check", addr);
    info!("  GET  http://{}/ready                 - readiness check", addr);
    info!("Press Ctrl+C or send SIGTERM to stop");

    // Background tasks: ledger flush, periodic snapshot, scheduled publish.
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let mut task_handles = Vec::new();

    if state.ledger.is_some() {
        let flush_state = state.clone();
        let flush_shutdown = Arc::clone(&shutdown_flag);
        let flush_interval = state.config.buffer.flush_interval();
        task_handles.push(tokio::spawn(async move {
            run_background_flush(flush_state, flush_shutdown, flush_interval).await;
        }));
    } else {
        warn!("Event ledger disabled; running log-less (no durability, no rebuild)");
    }

    if state.snapshots.is_some() {
        let snapshot_state = state.clone();
        let snapshot_shutdown = Arc::clone(&shutdown_flag);
        task_handles.push(tokio::spawn(async move {
            run_background_snapshot(snapshot_state, snapshot_shutdown).await;
        }));
    }

    {
        let publish_state = state.clone();
        let publish_shutdown = Arc::clone(&shutdown_flag);
        task_handles.push(tokio::spawn(async move {
            scheduler::run_publish_scheduler(publish_state, publish_shutdown).await;
        }));
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shutdown_flag.store(true, Ordering::SeqCst);
    for handle in task_handles {
        let _ = handle.await;
    }

    drain_pending_events(&state).await;

    if let Some(snapshots) = &state.snapshots {
        if state.gate.is_ready() {
            if let Err(e) = snapshots.save(&state.store.snapshot()).await {
                warn!(error = %e, "Failed to write final state snapshot");
            }
        }
    }

    info!("Server shutdown complete");

    Ok(())
}

/// Flush whatever the buffer still holds before exit. A failing ledger
/// ends the drain; at-least-once delivery resumes after restart via the
/// reconciler.
async fn drain_pending_events(state: &AppState) {
    let Some(ledger) = &state.ledger else {
        return;
    };

    if state.buffer.is_empty() {
        return;
    }

    info!(
        pending = state.buffer.len(),
        "Flushing buffered events before shutdown"
    );

    loop {
        match state.buffer.flush(ledger.as_ref()).await {
            FlushOutcome::Flushed { requeued: 0, .. } => {
                if state.buffer.is_empty() {
                    break;
                }
            }
            FlushOutcome::Flushed { requeued, .. } => {
                warn!(
                    requeued,
                    "Event log unreachable during shutdown; events remain unflushed"
                );
                break;
            }
            FlushOutcome::Idle | FlushOutcome::Busy => break,
        }
    }
}

/// Background task that periodically flushes the write buffer
async fn run_background_flush(
    state: AppState,
    shutdown: Arc<AtomicBool>,
    interval: std::time::Duration,
) {
    debug!(
        "Background flush task started (interval={}s)",
        interval.as_secs()
    );

    let Some(ledger) = state.ledger.clone() else {
        return;
    };

    while !shutdown.load(Ordering::SeqCst) {
        tokio::time::sleep(interval).await;

        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        match state.buffer.flush(ledger.as_ref()).await {
            FlushOutcome::Flushed { appended, requeued } => {
                metrics::counter!("tally.flush.appended", appended as u64);
                if requeued > 0 {
                    metrics::counter!("tally.flush.requeued", requeued as u64);
                }
            }
            FlushOutcome::Idle | FlushOutcome::Busy => {}
        }
    }

    debug!("Background flush task stopped");
}

/// Background task that periodically snapshots the counter store
async fn run_background_snapshot(state: AppState, shutdown: Arc<AtomicBool>) {
    let interval = state.config.snapshot.interval();
    debug!(
        "Background snapshot task started (interval={}s)",
        interval.as_secs()
    );

    let Some(snapshots) = state.snapshots.clone() else {
        return;
    };

    while !shutdown.load(Ordering::SeqCst) {
        tokio::time::sleep(interval).await;

        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        // Nothing worth caching until the first rebuild has landed.
        if !state.gate.is_ready() {
            continue;
        }

        if let Err(e) = snapshots.save(&state.store.snapshot()).await {
            warn!(error = %e, "Failed to write state snapshot");
        }
    }

    debug!("Background snapshot task stopped");
}
