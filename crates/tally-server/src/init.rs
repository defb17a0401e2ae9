// Initialization utilities: logging/tracing setup and wiring of the
// storage-backed sinks and the notifier.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use tally_config::{LogFormat, RuntimeConfig};
use tally_core::{EventLog, Notifier, SnapshotStore};
use tally_storage::{build_operator, JsonEventLedger, JsonSnapshotStore};

use crate::notify::{LogNotifier, WebhookNotifier};

/// Initialize tracing/logging from RuntimeConfig
pub fn init_tracing(config: &RuntimeConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.server.log_format {
        LogFormat::Json => {
            registry.with(fmt::layer().json()).init();
        }
        LogFormat::Text => {
            registry.with(fmt::layer()).init();
        }
    }
}

/// Build the ledger and snapshot sinks from the storage configuration.
///
/// A broken storage backend is fatal to the log integration only: the
/// process degrades to log-less mode (counters unavailable until a
/// permissive gate opens, no durability) instead of crashing.
pub(crate) fn build_sinks(
    config: &RuntimeConfig,
) -> (Option<Arc<dyn EventLog>>, Option<Arc<dyn SnapshotStore>>) {
    let operator = match build_operator(&config.storage) {
        Ok(operator) => operator,
        Err(e) => {
            error!(error = %e, "Failed to initialize storage backend; running without ledger or snapshot");
            return (None, None);
        }
    };

    let snapshots: Arc<dyn SnapshotStore> = Arc::new(JsonSnapshotStore::new(
        operator.clone(),
        config.snapshot.path.clone(),
    ));

    let ledger: Option<Arc<dyn EventLog>> = if config.ledger.enabled {
        Some(Arc::new(JsonEventLedger::new(
            operator,
            config.ledger.prefix.clone(),
        )))
    } else {
        info!("Event ledger disabled by configuration");
        None
    };

    (ledger, Some(snapshots))
}

/// Build the notification sink. No configured URL means publications go
/// to the process log.
pub(crate) fn build_notifier(config: &RuntimeConfig) -> Result<Arc<dyn Notifier>> {
    match &config.notify.url {
        Some(url) => {
            info!(url = %url, "Notifications via outbound webhook");
            Ok(Arc::new(WebhookNotifier::new(
                url,
                &config.notify.headers,
                config.notify.timeout(),
            )?))
        }
        None => Ok(Arc::new(LogNotifier)),
    }
}
