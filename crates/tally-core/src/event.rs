// Event model: the immutable record appended to the event log, and the
// lenient row shape read back from it during reconciliation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One counted occurrence. Created at ingestion time, appended to the
/// event log, never mutated or deleted.
///
/// `id` is a stable content hash so that at-least-once delivery to the
/// log stays idempotent: a retried append produces a row the rebuild
/// deduplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub context: String,
    pub tag: String,
}

impl Event {
    pub fn new(
        timestamp: DateTime<Utc>,
        actor: impl Into<String>,
        context: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        let actor = actor.into();
        let context = context.into();
        let tag = tag.into();
        let id = content_id(&timestamp, &actor, &context, &tag);

        Self {
            id,
            timestamp,
            actor,
            context,
            tag,
        }
    }
}

fn content_id(timestamp: &DateTime<Utc>, actor: &str, context: &str, tag: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(timestamp.to_rfc3339().as_bytes());
    hasher.update(b"\x1f");
    hasher.update(actor.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(context.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(tag.as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

/// Raw row shape as read back from the event log.
///
/// Every column is optional: reconciliation skips rows missing `actor`
/// or a parseable `timestamp` instead of aborting the rebuild.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEventRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

impl From<&Event> for RawEventRow {
    fn from(event: &Event) -> Self {
        Self {
            id: Some(event.id.clone()),
            timestamp: Some(event.timestamp.to_rfc3339()),
            actor: Some(event.actor.clone()),
            context: Some(event.context.clone()),
            tag: Some(event.tag.clone()),
        }
    }
}
