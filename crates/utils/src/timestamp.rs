use chrono::{Local, NaiveDateTime};

/// `strftime` format used in backup file names, e.g. `20250131-235959`.
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Where "now" comes from. Backups are named after it, so tests
/// substitute a [`FixedClock`].
pub trait TimestampSource: std::fmt::Debug {
    /// The current local wall-clock time.
    fn now(&self) -> NaiveDateTime;

    /// The current time rendered with [`BACKUP_TIMESTAMP_FORMAT`].
    fn backup_stamp(&self) -> String {
        self.now().format(BACKUP_TIMESTAMP_FORMAT).to_string()
    }
}

/// The host's local clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimestampSource for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock stopped at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl TimestampSource for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
