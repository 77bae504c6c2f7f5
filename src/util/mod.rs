//! Small helpers shared by the backup workflow and the dump backends.

pub mod retention;
pub mod runlog;

use chrono::{DateTime, TimeZone};

/// Timestamp embedded in backup names.
///
/// Sorting names lexicographically sorts them chronologically.
pub const NAME_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Formats `time` with [NAME_TIMESTAMP_FORMAT].
pub fn name_timestamp<Tz>(time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    time.format(NAME_TIMESTAMP_FORMAT).to_string()
}
