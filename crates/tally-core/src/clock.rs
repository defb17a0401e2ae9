// Civil-calendar clock: instant -> bucket keys in a fixed IANA timezone
//
// All bucket boundaries are derived from the timezone's local wall-clock
// fields, never from a fixed UTC offset, so daylight-saving transitions
// shift boundaries the way a wall calendar does.

use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Civil year and month as a sortable, equatable token.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Bucket identifiers for one instant, evaluated in a fixed timezone.
///
/// `day_ordinal` counts civil days since the common era; `week_start_ordinal`
/// is the ordinal of the most recent Sunday at or before the instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketKeys {
    pub day_ordinal: i64,
    pub week_start_ordinal: i64,
    pub year_month: YearMonth,
}

/// Compute the bucket keys for `instant` in `tz`.
pub fn bucket_keys(instant: DateTime<Utc>, tz: Tz) -> BucketKeys {
    let local = instant.with_timezone(&tz);
    let date = local.date_naive();

    let day_ordinal = i64::from(date.num_days_from_ce());
    let week_start_ordinal = day_ordinal - i64::from(date.weekday().num_days_from_sunday());

    BucketKeys {
        day_ordinal,
        week_start_ordinal,
        year_month: YearMonth {
            year: date.year(),
            month: date.month(),
        },
    }
}
