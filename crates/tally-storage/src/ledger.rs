// Append-only event ledger: one JSON object per row.
//
// Row paths embed the event timestamp and content id, so a retried
// append of the same event overwrites the same object instead of
// producing a second row. Listing the prefix yields rows in
// chronological order.

use anyhow::{Context, Result};
use async_trait::async_trait;
use opendal::{ErrorKind, Operator};
use tracing::{debug, warn};

use tally_core::{Event, EventLog, RawEventRow};

pub struct JsonEventLedger {
    operator: Operator,
    prefix: String,
}

impl JsonEventLedger {
    pub fn new(operator: Operator, prefix: impl Into<String>) -> Self {
        Self {
            operator,
            prefix: prefix.into(),
        }
    }

    fn row_path(&self, event: &Event) -> String {
        let millis = event.timestamp.timestamp_millis();
        let short_id = &event.id[..event.id.len().min(16)];
        format!("{}/{:015}-{}.json", self.prefix, millis, short_id)
    }
}

#[async_trait]
impl EventLog for JsonEventLedger {
    async fn append(&self, event: &Event) -> Result<()> {
        let payload = serde_json::to_vec(event).context("failed to serialize event row")?;
        let path = self.row_path(event);
        self.operator
            .write(&path, payload)
            .await
            .with_context(|| format!("failed to append event row {}", path))?;
        debug!(path, actor = %event.actor, "appended event row");
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<RawEventRow>> {
        let dir = format!("{}/", self.prefix);
        let mut entries = match self.operator.list_with(&dir).recursive(true).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context("failed to list event ledger"),
        };
        entries.sort_by(|a, b| a.path().cmp(b.path()));

        let mut rows = Vec::new();
        for entry in entries {
            if !entry.metadata().mode().is_file() {
                continue;
            }
            let bytes = self
                .operator
                .read(entry.path())
                .await
                .with_context(|| format!("failed to read event row {}", entry.path()))?;
            match serde_json::from_slice::<RawEventRow>(&bytes.to_vec()) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    // A corrupt row must not abort reconciliation.
                    warn!(path = entry.path(), error = %e, "skipping unparseable ledger row");
                }
            }
        }

        Ok(rows)
    }
}
