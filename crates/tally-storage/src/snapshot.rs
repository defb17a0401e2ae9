// Local crash-recovery snapshot: the whole aggregate state as one JSON
// document. Best effort; never authoritative.

use anyhow::{Context, Result};
use async_trait::async_trait;
use opendal::{ErrorKind, Operator};
use tracing::warn;

use tally_core::{AggregateState, SnapshotStore};

pub struct JsonSnapshotStore {
    operator: Operator,
    path: String,
}

impl JsonSnapshotStore {
    pub fn new(operator: Operator, path: impl Into<String>) -> Self {
        Self {
            operator,
            path: path.into(),
        }
    }
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn save(&self, state: &AggregateState) -> Result<()> {
        let payload = serde_json::to_vec(state).context("failed to serialize state snapshot")?;
        self.operator
            .write(&self.path, payload)
            .await
            .with_context(|| format!("failed to write state snapshot {}", self.path))?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<AggregateState>> {
        let bytes = match self.operator.read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read state snapshot {}", self.path))
            }
        };

        match serde_json::from_slice::<AggregateState>(&bytes.to_vec()) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                // A corrupt cache is the same as no cache.
                warn!(path = %self.path, error = %e, "discarding unparseable state snapshot");
                Ok(None)
            }
        }
    }
}
