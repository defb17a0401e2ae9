// Reconciliation fold: recompute the full aggregate state from the raw
// event log, relative to a single "now" fixed at rebuild start.
//
// Aggregation is commutative, so row order is irrelevant. Malformed rows
// are skipped, not fatal. Rows sharing a non-empty id are counted once,
// which makes at-least-once appends safe against duplication.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::clock::bucket_keys;
use crate::counter::AggregateState;
use crate::event::RawEventRow;

/// Outcome summary of one rebuild pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub total_rows: usize,
    pub counted: usize,
    pub skipped_malformed: usize,
    pub skipped_duplicate: usize,
}

/// Fold the entire event log into a fresh [`AggregateState`].
///
/// `now` is determined once by the caller; every window membership test
/// is made against it, so re-running with the same log and the same
/// `now` is idempotent.
pub fn rebuild(rows: &[RawEventRow], now: DateTime<Utc>, tz: Tz) -> (AggregateState, RebuildReport) {
    let now_keys = bucket_keys(now, tz);
    let mut state = AggregateState::default();
    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut report = RebuildReport {
        total_rows: rows.len(),
        ..RebuildReport::default()
    };

    for row in rows {
        let actor = match row.actor.as_deref() {
            Some(actor) if !actor.is_empty() => actor,
            _ => {
                report.skipped_malformed += 1;
                continue;
            }
        };

        let timestamp = match row
            .timestamp
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        {
            Some(parsed) => parsed.with_timezone(&Utc),
            None => {
                warn!(actor, "skipping log row with unparseable timestamp");
                report.skipped_malformed += 1;
                continue;
            }
        };

        if let Some(id) = row.id.as_deref() {
            if !id.is_empty() && !seen_ids.insert(id) {
                report.skipped_duplicate += 1;
                continue;
            }
        }

        state.record(actor, bucket_keys(timestamp, tz), now_keys);
        report.counted += 1;
    }

    debug!(
        total = report.total_rows,
        counted = report.counted,
        malformed = report.skipped_malformed,
        duplicates = report.skipped_duplicate,
        "rebuild fold complete"
    );

    (state, report)
}
