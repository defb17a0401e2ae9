// Trait seams for the external collaborators: the append-only event
// log, the local crash-recovery snapshot, and the outbound notifier.
//
// Implementations:
// - tally-storage: OpenDAL-backed ledger and snapshot store
// - tally-server: webhook notifier

use anyhow::Result;
use async_trait::async_trait;

use crate::counter::AggregateState;
use crate::event::{Event, RawEventRow};

/// Append-only ledger of raw events; the single source of truth across
/// restarts. The in-memory aggregate is a derived, rebuildable cache.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Durably append one event row.
    async fn append(&self, event: &Event) -> Result<()>;

    /// Read every row in the ledger, in append order.
    async fn read_all(&self) -> Result<Vec<RawEventRow>>;
}

/// Best-effort local persistence of the aggregate state. Not
/// authoritative: only a pre-rebuild fallback.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, state: &AggregateState) -> Result<()>;

    async fn load(&self) -> Result<Option<AggregateState>>;
}

/// Outbound delivery of rendered leaderboard text.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}
