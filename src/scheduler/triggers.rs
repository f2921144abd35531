//! Trigger schedules for the job scheduler.
//!
//! Three independent triggers drive the scheduler: a fixed-interval channel
//! check, a daily cleanup and a weekly maintenance pass. Each is described by a
//! [`TriggerSchedule`] whose [`next_after`](TriggerSchedule::next_after) is pure,
//! so the trigger loops only sleep until the computed instant.
//!
//! # Example
//!
//! ```rust
//! use channel_tracker::scheduler::{TriggerSchedule, Weekday};
//! use chrono::{NaiveTime, TimeZone, Utc};
//!
//! let weekly = TriggerSchedule::Weekly {
//!     day: Weekday::Sunday,
//!     at: NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
//! };
//! // Wednesday 2024-05-01 10:00 -> Sunday 2024-05-05 02:00
//! let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
//! let next = weekly.next_after(&now);
//! assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 5, 2, 0, 0).unwrap());
//! ```

use chrono::{DateTime, Datelike, Days, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Names of the registered triggers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Fixed-interval channel sweep
    ChannelCheck,
    /// One-shot sweep shortly after start
    InitialCheck,
    /// Daily cleanup
    Cleanup,
    /// Weekly maintenance
    Maintenance,
}

impl TriggerKind {
    /// Stable name used in logs and stats
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::ChannelCheck => "channel_check",
            TriggerKind::InitialCheck => "initial_check",
            TriggerKind::Cleanup => "cleanup",
            TriggerKind::Maintenance => "maintenance",
        }
    }
}

/// Days of the week for weekly triggers
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Weekday {
    /// Monday
    Monday,
    /// Tuesday
    Tuesday,
    /// Wednesday
    Wednesday,
    /// Thursday
    Thursday,
    /// Friday
    Friday,
    /// Saturday
    Saturday,
    /// Sunday
    Sunday,
}

impl Weekday {
    /// Convert from chrono::Weekday to our Weekday
    pub fn from_chrono(wd: chrono::Weekday) -> Self {
        use chrono::Weekday as ChronoWd;
        match wd {
            ChronoWd::Mon => Weekday::Monday,
            ChronoWd::Tue => Weekday::Tuesday,
            ChronoWd::Wed => Weekday::Wednesday,
            ChronoWd::Thu => Weekday::Thursday,
            ChronoWd::Fri => Weekday::Friday,
            ChronoWd::Sat => Weekday::Saturday,
            ChronoWd::Sun => Weekday::Sunday,
        }
    }

    /// Convert to chrono::Weekday
    pub fn to_chrono(self) -> chrono::Weekday {
        use chrono::Weekday as ChronoWd;
        match self {
            Weekday::Monday => ChronoWd::Mon,
            Weekday::Tuesday => ChronoWd::Tue,
            Weekday::Wednesday => ChronoWd::Wed,
            Weekday::Thursday => ChronoWd::Thu,
            Weekday::Friday => ChronoWd::Fri,
            Weekday::Saturday => ChronoWd::Sat,
            Weekday::Sunday => ChronoWd::Sun,
        }
    }
}

/// When a trigger fires
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TriggerSchedule {
    /// Every fixed interval, measured from the previous firing
    Every(Duration),
    /// Once a day at a local time
    Daily {
        /// Time of day
        at: NaiveTime,
    },
    /// Once a week on a given day at a local time
    Weekly {
        /// Day of week
        day: Weekday,
        /// Time of day
        at: NaiveTime,
    },
}

impl TriggerSchedule {
    /// The first firing strictly after `now`
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        match self {
            TriggerSchedule::Every(interval) => {
                let step = chrono::Duration::from_std(*interval)
                    .unwrap_or_else(|_| chrono::Duration::days(1));
                now.clone() + step
            }
            TriggerSchedule::Daily { at } => {
                let today = at_local(now, 0, *at);
                if today > *now {
                    today
                } else {
                    at_local(now, 1, *at)
                }
            }
            TriggerSchedule::Weekly { day, at } => {
                let target = day.to_chrono().num_days_from_monday();
                let current = now.weekday().num_days_from_monday();
                let ahead = (target + 7 - current) % 7;
                let candidate = at_local(now, u64::from(ahead), *at);
                if candidate > *now {
                    candidate
                } else {
                    at_local(now, u64::from(ahead) + 7, *at)
                }
            }
        }
    }

    /// How long to sleep from `now` until the next firing
    pub fn delay_from<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Duration {
        let next = self.next_after(now);
        (next - now.clone()).to_std().unwrap_or(Duration::ZERO)
    }
}

/// `now`'s calendar date plus `days_ahead`, at `at` in `now`'s timezone.
///
/// Times that fall into a DST gap are pushed forward one hour.
fn at_local<Tz: TimeZone>(now: &DateTime<Tz>, days_ahead: u64, at: NaiveTime) -> DateTime<Tz> {
    let date = now
        .date_naive()
        .checked_add_days(Days::new(days_ahead))
        .unwrap_or_else(|| now.date_naive());
    let naive = date.and_time(at);
    let tz = now.timezone();
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(naive + chrono::Duration::hours(1)))
                .earliest()
        })
        .unwrap_or_else(|| now.clone() + chrono::Duration::days(1))
}

/// Serde module for serializing/deserializing NaiveTime as HH:MM:SS strings
pub(crate) mod time_format {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = time.format("%H:%M:%S").to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, "%H:%M:%S").map_err(serde::de::Error::custom)
    }
}
