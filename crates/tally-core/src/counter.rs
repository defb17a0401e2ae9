// Counter store: four per-bucket user->count tables behind one lock.
//
// Every operation is a single synchronous critical section; the lock is
// never held across an await point.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::clock::BucketKeys;
use crate::error::Error;

/// The four aggregation windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketKind {
    Daily,
    Weekly,
    Monthly,
    AllTime,
}

impl BucketKind {
    pub const ALL: [BucketKind; 4] = [
        BucketKind::Daily,
        BucketKind::Weekly,
        BucketKind::Monthly,
        BucketKind::AllTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BucketKind::Daily => "daily",
            BucketKind::Weekly => "weekly",
            BucketKind::Monthly => "monthly",
            BucketKind::AllTime => "alltime",
        }
    }

    /// Section heading used in rendered leaderboards.
    pub fn title(&self) -> &'static str {
        match self {
            BucketKind::Daily => "Daily",
            BucketKind::Weekly => "Weekly",
            BucketKind::Monthly => "Monthly",
            BucketKind::AllTime => "All-time",
        }
    }
}

impl fmt::Display for BucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BucketKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_lowercase().as_str() {
            "daily" | "day" => Ok(BucketKind::Daily),
            "weekly" | "week" => Ok(BucketKind::Weekly),
            "monthly" | "month" => Ok(BucketKind::Monthly),
            "alltime" | "all-time" | "all_time" | "all" => Ok(BucketKind::AllTime),
            _ => Err(Error::UnknownBucketKind(s.to_string())),
        }
    }
}

/// Per-bucket mapping from user identifier to count.
///
/// Insertion order is significant: it is the tiebreak for equal counts
/// in rankings.
pub type CounterTable = IndexMap<String, u64>;

/// The four counter tables plus an informational reset timestamp.
///
/// Owned exclusively by [`CounterStore`]; replaced wholesale by the
/// reconciler during rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateState {
    #[serde(default)]
    pub daily: CounterTable,
    #[serde(default)]
    pub weekly: CounterTable,
    #[serde(default)]
    pub monthly: CounterTable,
    #[serde(default)]
    pub all_time: CounterTable,
    #[serde(default = "Utc::now")]
    pub last_reset: DateTime<Utc>,
}

impl Default for AggregateState {
    fn default() -> Self {
        Self {
            daily: CounterTable::new(),
            weekly: CounterTable::new(),
            monthly: CounterTable::new(),
            all_time: CounterTable::new(),
            last_reset: Utc::now(),
        }
    }
}

impl AggregateState {
    pub fn table(&self, kind: BucketKind) -> &CounterTable {
        match kind {
            BucketKind::Daily => &self.daily,
            BucketKind::Weekly => &self.weekly,
            BucketKind::Monthly => &self.monthly,
            BucketKind::AllTime => &self.all_time,
        }
    }

    fn table_mut(&mut self, kind: BucketKind) -> &mut CounterTable {
        match kind {
            BucketKind::Daily => &mut self.daily,
            BucketKind::Weekly => &mut self.weekly,
            BucketKind::Monthly => &mut self.monthly,
            BucketKind::AllTime => &mut self.all_time,
        }
    }

    /// Record one occurrence for `actor`, incrementing every bucket whose
    /// current window (relative to `now`) contains the event.
    ///
    /// On the live path the event's keys equal `now`, so all four tables
    /// increment. During rebuild, historical events land only in the
    /// windows they still belong to.
    pub fn record(&mut self, actor: &str, event: BucketKeys, now: BucketKeys) {
        bump(&mut self.all_time, actor);
        if event.year_month == now.year_month {
            bump(&mut self.monthly, actor);
        }
        if event.day_ordinal >= now.week_start_ordinal {
            bump(&mut self.weekly, actor);
        }
        if event.day_ordinal == now.day_ordinal {
            bump(&mut self.daily, actor);
        }
    }

    /// Ranking for one bucket: count descending, insertion order on ties.
    pub fn ranking(&self, kind: BucketKind) -> Vec<(String, u64)> {
        let mut rows: Vec<(String, u64)> = self
            .table(kind)
            .iter()
            .map(|(user, count)| (user.clone(), *count))
            .collect();
        // Stable sort: equal counts keep their insertion order.
        rows.sort_by(|a, b| b.1.cmp(&a.1));
        rows
    }
}

fn bump(table: &mut CounterTable, actor: &str) {
    if let Some(count) = table.get_mut(actor) {
        *count += 1;
    } else {
        table.insert(actor.to_string(), 1);
    }
}

/// Thread-safe owner of [`AggregateState`], shared across handlers.
pub struct CounterStore {
    state: RwLock<AggregateState>,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::with_state(AggregateState::default())
    }

    pub fn with_state(state: AggregateState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Increment every bucket whose window contains the event. Monotonic,
    /// not idempotent: duplicate suppression is the caller's concern.
    pub fn increment(&self, actor: &str, event: BucketKeys, now: BucketKeys) {
        self.state.write().record(actor, event, now);
    }

    /// Up to `n` (user, count) pairs, count descending, insertion order
    /// on ties. An empty table yields an empty vec.
    pub fn top_n(&self, kind: BucketKind, n: usize) -> Vec<(String, u64)> {
        let mut rows = self.state.read().ranking(kind);
        rows.truncate(n);
        rows
    }

    /// Unbounded ranking, same ordering as [`CounterStore::top_n`].
    pub fn full_ranking(&self, kind: BucketKind) -> Vec<(String, u64)> {
        self.state.read().ranking(kind)
    }

    /// Clear one table; the other buckets are untouched.
    pub fn reset_bucket(&self, kind: BucketKind) {
        let mut state = self.state.write();
        state.table_mut(kind).clear();
        state.last_reset = Utc::now();
    }

    /// Atomic wholesale swap, used exclusively by the reconciler.
    pub fn replace_all(&self, new_state: AggregateState) {
        *self.state.write() = new_state;
    }

    /// Clone of the current state, for snapshots and publication.
    pub fn snapshot(&self) -> AggregateState {
        self.state.read().clone()
    }
}

impl Default for CounterStore {
    fn default() -> Self {
        Self::new()
    }
}
