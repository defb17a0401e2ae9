// Civil-time publication scheduler.
//
// Fires the scheduled publish at most once per civil day, at the
// configured local wall-clock time. Weekly and monthly buckets need no
// reset trigger of their own: window membership is evaluated against
// "now" at increment and rebuild time, so old events age out on their
// own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Timelike, Utc};
use tracing::{debug, info, warn};

use tally_core::bucket_keys;

use crate::{handlers, AppState};

const TICK: Duration = Duration::from_secs(30);

pub(crate) async fn run_publish_scheduler(state: AppState, shutdown: Arc<AtomicBool>) {
    let (hour, minute) = match tally_config::parse_publish_time(&state.config.publish.time) {
        Ok(parsed) => parsed,
        Err(e) => {
            // Validation happens before startup; this is a belt check.
            warn!(error = %e, "Invalid publish time; publication scheduler disabled");
            return;
        }
    };

    debug!(
        "Publication scheduler started ({:02}:{:02} {})",
        hour, minute, state.config.timezone
    );

    // A process started after today's publish time must not fire
    // immediately on boot.
    let mut last_fired_day = if is_due(&state, hour, minute) {
        Some(bucket_keys(Utc::now(), state.tz).day_ordinal)
    } else {
        None
    };

    while !shutdown.load(Ordering::SeqCst) {
        tokio::time::sleep(TICK).await;

        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let today = bucket_keys(Utc::now(), state.tz).day_ordinal;
        if !is_due(&state, hour, minute) || last_fired_day == Some(today) {
            continue;
        }

        // Hold the trigger (without marking it fired) until the first
        // rebuild lands, so a slow startup still publishes today.
        if !state.gate.is_ready() {
            debug!(
                gate = state.gate.state().as_str(),
                "publication due but gate is closed; deferring"
            );
            continue;
        }

        let reset_daily = state.config.publish.reset_daily;
        match handlers::publish_leaderboards(&state, reset_daily).await {
            Ok(_) => info!("Scheduled leaderboard publication delivered"),
            Err(e) => warn!(error = %e, "Scheduled leaderboard publication failed"),
        }
        last_fired_day = Some(today);
    }

    debug!("Publication scheduler stopped");
}

fn is_due(state: &AppState, hour: u32, minute: u32) -> bool {
    let local = Utc::now().with_timezone(&state.tz);
    (local.hour(), local.minute()) >= (hour, minute)
}
