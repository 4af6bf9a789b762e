//! File timestamps stored in RAR archives.
//!
//! RAR 5.0 stores modification times either as 32-bit Unix seconds in the
//! file header or, through the time extra record, as Unix seconds (optionally
//! with nanoseconds) or Windows FILETIME values. [`Timestamp`] normalizes all
//! of them to FILETIME, the 100-nanosecond representation used by the
//! extended header record.
//!
//! # Example
//!
//! ```rust
//! use rarkit::Timestamp;
//!
//! let ts = Timestamp::from_unix_secs(1_609_677_296);
//! assert_eq!(ts.as_unix_secs(), 1_609_677_296);
//! assert_eq!(ts.to_dos_time(), 0x5223_645C);
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// FILETIME value of the Unix epoch (100-ns intervals since 1601-01-01).
const FILETIME_UNIX_DIFF: u64 = 116_444_736_000_000_000;

/// Number of 100-nanosecond intervals per second.
const INTERVALS_PER_SECOND: u64 = 10_000_000;

/// Smallest representable DOS date: 1980-01-01 00:00:00.
const DOS_TIME_MIN: u32 = (1 << 21) | (1 << 16);

/// A file timestamp with FILETIME precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    filetime: u64,
}

impl Timestamp {
    /// Creates a timestamp from a raw Windows FILETIME value.
    #[inline]
    pub const fn from_filetime(filetime: u64) -> Self {
        Self { filetime }
    }

    /// Creates a timestamp from Unix seconds.
    ///
    /// Values before 1601 saturate to FILETIME zero.
    pub fn from_unix_secs(secs: i64) -> Self {
        Self::from_unix_nanos(secs, 0)
    }

    /// Creates a timestamp from Unix seconds plus nanoseconds.
    ///
    /// Nanoseconds are truncated to 100-ns precision.
    pub fn from_unix_nanos(secs: i64, nanos: u32) -> Self {
        let intervals = i128::from(secs) * i128::from(INTERVALS_PER_SECOND)
            + i128::from(nanos / 100)
            + i128::from(FILETIME_UNIX_DIFF);
        Self {
            filetime: intervals.clamp(0, i128::from(u64::MAX)) as u64,
        }
    }

    /// Reassembles a timestamp from the high/low halves used by the
    /// extended header record.
    pub fn from_parts(high: u32, low: u32) -> Self {
        Self::from_filetime((u64::from(high) << 32) | u64::from(low))
    }

    /// Returns the raw FILETIME value.
    #[inline]
    pub const fn as_filetime(&self) -> u64 {
        self.filetime
    }

    /// Splits the FILETIME into `(high, low)` 32-bit halves.
    pub fn to_parts(&self) -> (u32, u32) {
        ((self.filetime >> 32) as u32, self.filetime as u32)
    }

    /// Returns `true` if the timestamp is the FILETIME zero value.
    ///
    /// Archives written without a time carry zero; consumers should treat
    /// it as "unknown".
    pub fn is_zero(&self) -> bool {
        self.filetime == 0
    }

    /// Returns whole Unix seconds, rounding towards negative infinity.
    pub fn as_unix_secs(&self) -> i64 {
        let rel = i128::from(self.filetime) - i128::from(FILETIME_UNIX_DIFF);
        rel.div_euclid(i128::from(INTERVALS_PER_SECOND)) as i64
    }

    /// Returns the sub-second part in nanoseconds.
    pub fn subsec_nanos(&self) -> u32 {
        let rel = i128::from(self.filetime) - i128::from(FILETIME_UNIX_DIFF);
        (rel.rem_euclid(i128::from(INTERVALS_PER_SECOND)) * 100) as u32
    }

    /// Converts to [`SystemTime`].
    pub fn as_system_time(&self) -> SystemTime {
        let secs = self.as_unix_secs();
        let nanos = self.subsec_nanos();
        if secs >= 0 {
            UNIX_EPOCH + Duration::new(secs as u64, nanos)
        } else {
            UNIX_EPOCH
                .checked_sub(Duration::from_secs(secs.unsigned_abs()))
                .and_then(|t| t.checked_add(Duration::from_nanos(u64::from(nanos))))
                .unwrap_or(UNIX_EPOCH)
        }
    }

    /// Converts to the representation used by the `filetime` crate.
    pub(crate) fn to_file_time(self) -> filetime::FileTime {
        filetime::FileTime::from_unix_time(self.as_unix_secs(), self.subsec_nanos())
    }

    /// Returns the MS-DOS date/time word (UTC, 2-second resolution).
    ///
    /// Dates outside 1980..=2107 saturate to the nearest representable value.
    pub fn to_dos_time(&self) -> u32 {
        let secs = self.as_unix_secs();
        let days = secs.div_euclid(86_400);
        let sod = secs.rem_euclid(86_400) as u32;
        let (year, month, day) = civil_from_days(days);
        if year < 1980 {
            return DOS_TIME_MIN;
        }
        if year > 2107 {
            return (127 << 25) | (12 << 21) | (31 << 16) | (23 << 11) | (59 << 5) | 29;
        }
        (((year - 1980) as u32) << 25)
            | (month << 21)
            | (day << 16)
            | ((sod / 3600) << 11)
            | (((sod / 60) % 60) << 5)
            | ((sod % 60) / 2)
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => Self::from_unix_nanos(d.as_secs() as i64, d.subsec_nanos()),
            Err(e) => {
                let d = e.duration();
                let mut ts = Self::from_unix_secs(-(d.as_secs() as i64));
                ts.filetime = ts.filetime.saturating_sub(u64::from(d.subsec_nanos() / 100));
                ts
            }
        }
    }
}

/// Converts days since 1970-01-01 into a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
