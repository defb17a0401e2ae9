// HTTP request handlers: event ingestion, leaderboard queries,
// publication and manual rebuild triggers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use tally_core::{bucket_keys, render_leaderboard, BucketKind, Event};

use crate::reconcile::{self, RebuildError};
use crate::{AppError, AppState};

/// Inbound event shape delivered by the webhook transport.
#[derive(Debug, Deserialize)]
pub(crate) struct EventPayload {
    pub actor: String,
    #[serde(default)]
    pub context: Option<String>,
    /// ISO-8601; defaults to the arrival instant.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PublishPayload {
    #[serde(default)]
    pub reset_daily: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RankingParams {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// POST /v1/events - one counted occurrence
pub(crate) async fn handle_event(
    State(state): State<AppState>,
    Json(payload): Json<EventPayload>,
) -> Result<Response, AppError> {
    counter!("tally.ingest.requests", 1);

    // Accepted-but-ignored while the first rebuild has not landed: the
    // state is about to be replaced wholesale, so recording now would
    // only create divergence.
    if !state.gate.is_ready() {
        counter!("tally.ingest.not_ready", 1);
        debug!(
            gate = state.gate.state().as_str(),
            "dropping event while gate is closed"
        );
        return Ok(not_ready_response(&state));
    }

    if payload.actor.is_empty() {
        return Err(AppError::bad_request(anyhow::anyhow!(
            "event actor must not be empty"
        )));
    }

    let timestamp = match payload.timestamp.as_deref() {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| {
                AppError::bad_request(anyhow::anyhow!("invalid event timestamp {:?}: {}", raw, e))
            })?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let event = Event::new(
        timestamp,
        payload.actor,
        payload.context.unwrap_or_default(),
        payload
            .tag
            .unwrap_or_else(|| state.config.ledger.tag.clone()),
    );

    let now_keys = bucket_keys(Utc::now(), state.tz);
    let event_keys = bucket_keys(event.timestamp, state.tz);
    state.store.increment(&event.actor, event_keys, now_keys);

    if state.ledger.is_some() {
        state.buffer.enqueue(event);
    } else {
        debug!("event ledger disabled; occurrence counted in memory only");
    }

    counter!("tally.ingest.events", 1);

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "pending_appends": state.buffer.len(),
        })),
    )
        .into_response())
}

/// POST /v1/publish - render and deliver the leaderboards now
pub(crate) async fn handle_publish(
    State(state): State<AppState>,
    payload: Option<Json<PublishPayload>>,
) -> Result<Response, AppError> {
    if !state.gate.is_ready() {
        return Ok(not_ready_response(&state));
    }

    let reset_daily = payload
        .and_then(|Json(p)| p.reset_daily)
        .unwrap_or(state.config.publish.reset_daily);

    let message = publish_leaderboards(&state, reset_daily)
        .await
        .map_err(AppError::internal)?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "reset_daily": reset_daily,
            "message": message,
        })),
    )
        .into_response())
}

/// POST /v1/rebuild - replay the full ledger into fresh counters
pub(crate) async fn handle_rebuild(State(state): State<AppState>) -> Result<Response, AppError> {
    let report = reconcile::run_rebuild(&state).await.map_err(|e| match e {
        RebuildError::InFlight => {
            AppError::with_status(StatusCode::CONFLICT, anyhow::anyhow!("{e}"))
        }
        RebuildError::LedgerDisabled => {
            AppError::with_status(StatusCode::SERVICE_UNAVAILABLE, anyhow::anyhow!("{e}"))
        }
        RebuildError::Failed(inner) => {
            AppError::with_status(StatusCode::BAD_GATEWAY, inner)
        }
    })?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "rows": report.total_rows,
            "counted": report.counted,
            "skipped_malformed": report.skipped_malformed,
            "skipped_duplicate": report.skipped_duplicate,
        })),
    )
        .into_response())
}

/// GET /v1/leaderboard/{kind}?limit=N - ranking query (read-only, never gated)
pub(crate) async fn handle_leaderboard(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<RankingParams>,
) -> Result<Response, AppError> {
    let kind: BucketKind = kind.parse().map_err(AppError::bad_request)?;

    let entries = match params.limit {
        Some(limit) => state.store.top_n(kind, limit),
        None => state.store.full_ranking(kind),
    };

    let entries: Vec<_> = entries
        .into_iter()
        .enumerate()
        .map(|(idx, (user, count))| {
            json!({
                "rank": idx + 1,
                "user": user,
                "count": count,
            })
        })
        .collect();

    Ok((
        StatusCode::OK,
        Json(json!({
            "kind": kind.as_str(),
            "entries": entries,
        })),
    )
        .into_response())
}

/// GET /health - Basic health check
pub(crate) async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "healthy"})))
}

/// GET /ready - gate state (mutations are rejected until ready)
pub(crate) async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    let readiness = state.gate.state();
    let body = Json(json!({
        "status": readiness.as_str(),
        "pending_appends": state.buffer.len(),
    }));

    if state.gate.is_ready() {
        (StatusCode::OK, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, body)
    }
}

/// Render the configured buckets and deliver through the notify sink.
///
/// Delivery failure is transient: it is logged and the next scheduled
/// publication retries. The optional daily reset still runs so the
/// reset cadence stays aligned with the publication cadence.
pub(crate) async fn publish_leaderboards(
    state: &AppState,
    reset_daily: bool,
) -> anyhow::Result<String> {
    let snapshot = state.store.snapshot();

    let sections: Vec<(BucketKind, Vec<(String, u64)>)> = state
        .config
        .publish_kinds()
        .into_iter()
        .map(|kind| {
            let mut rows = snapshot.ranking(kind);
            if let Some(limit) = state.config.publish.top_n {
                rows.truncate(limit);
            }
            (kind, rows)
        })
        .collect();

    let message = render_leaderboard(&state.config.publish.header, &sections);

    if let Err(e) = state.notifier.send(&message).await {
        warn!(error = %e, "Failed to deliver leaderboard publication");
        counter!("tally.publish.failed", 1);
    } else {
        counter!("tally.publish.sent", 1);
    }

    if reset_daily {
        state.store.reset_bucket(BucketKind::Daily);
        info!("Daily counters reset after publication");
    }

    Ok(message)
}

fn not_ready_response(state: &AppState) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "not ready",
            "gate": state.gate.state().as_str(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::memory_state;
    use tally_config::RuntimeConfig;

    fn ready_state() -> (AppState, std::sync::Arc<crate::testing::RecordingNotifier>) {
        let (state, notifier) = memory_state(RuntimeConfig::default());
        state.gate.begin_rebuild();
        state.gate.open();
        (state, notifier)
    }

    fn live_increment(state: &AppState, actor: &str) {
        let now = bucket_keys(Utc::now(), state.tz);
        state.store.increment(actor, now, now);
    }

    #[tokio::test]
    async fn publish_renders_all_configured_sections() {
        let (state, notifier) = ready_state();
        live_increment(&state, "alice");
        live_increment(&state, "alice");
        live_increment(&state, "bob");

        let message = publish_leaderboards(&state, false).await.unwrap();

        assert!(message.starts_with("Leaderboard"));
        for title in ["Daily:", "Weekly:", "Monthly:", "All-time:"] {
            assert!(message.contains(title), "missing section {title}");
        }
        assert!(message.contains("1. alice - 2"));
        assert!(message.contains("2. bob - 1"));

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], message);
    }

    #[tokio::test]
    async fn publish_with_reset_clears_only_daily() {
        let (state, _notifier) = ready_state();
        live_increment(&state, "alice");

        publish_leaderboards(&state, true).await.unwrap();

        assert!(state.store.full_ranking(BucketKind::Daily).is_empty());
        assert_eq!(state.store.full_ranking(BucketKind::Weekly).len(), 1);
        assert_eq!(state.store.full_ranking(BucketKind::AllTime).len(), 1);
    }

    #[tokio::test]
    async fn publish_renders_no_entries_for_empty_tables() {
        let (state, _notifier) = ready_state();
        let message = publish_leaderboards(&state, false).await.unwrap();
        assert!(message.contains("Daily:\nno entries"));
    }

    #[tokio::test]
    async fn publish_honors_top_n_limit() {
        let mut config = RuntimeConfig::default();
        config.publish.top_n = Some(1);
        let (state, _notifier) = memory_state(config);
        state.gate.begin_rebuild();
        state.gate.open();

        live_increment(&state, "alice");
        live_increment(&state, "bob");

        let message = publish_leaderboards(&state, false).await.unwrap();
        assert!(message.contains("1. alice - 1"));
        assert!(!message.contains("2. bob"));
    }
}
