use thiserror::Error;

/// Domain error classification for the aggregation engine
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown bucket kind: {0:?} (expected daily, weekly, monthly or alltime)")]
    UnknownBucketKind(String),

    #[error("invalid event timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("event actor must not be empty")]
    EmptyActor,
}
