//! tally-core - time-windowed counter aggregation and reconciliation
//!
//! Pure domain logic: no async runtime, no network, no filesystem. The
//! only async surface is the trait seams in [`sink`], which the storage
//! and server crates implement.

pub mod clock;
pub mod counter;
pub mod error;
pub mod event;
pub mod rebuild;
pub mod render;
pub mod sink;

pub use clock::{bucket_keys, BucketKeys, YearMonth};
pub use counter::{AggregateState, BucketKind, CounterStore, CounterTable};
pub use error::Error;
pub use event::{Event, RawEventRow};
pub use rebuild::{rebuild, RebuildReport};
pub use render::render_leaderboard;
pub use sink::{EventLog, Notifier, SnapshotStore};
