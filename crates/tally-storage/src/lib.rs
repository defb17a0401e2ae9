//! OpenDAL-backed implementations of the event log and snapshot seams.
//!
//! The ledger stores one JSON object per event row; the snapshot is a
//! single JSON document. Both run against any configured backend
//! (filesystem in production, in-memory for tests).

mod ledger;
mod operator;
mod snapshot;

pub use ledger::JsonEventLedger;
pub use operator::build_operator;
pub use snapshot::JsonSnapshotStore;
