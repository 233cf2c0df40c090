//! DOS timestamp conversion
//!
//! Zip stores local wall-clock time with two-second resolution. Timestamps
//! are interpreted as UTC; zip carries no zone information.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// DOS date for 1980-01-01, the earliest representable day
pub const DOS_EPOCH_DATE: u16 = (1 << 5) | 1;

/// Packed DOS date and time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DosDateTime {
    /// Packed date: bits 9-15 year since 1980, 5-8 month, 0-4 day
    pub date: u16,
    /// Packed time: bits 11-15 hour, 5-10 minute, 0-4 seconds / 2
    pub time: u16,
}

impl DosDateTime {
    /// Wrap raw header fields
    pub const fn new(date: u16, time: u16) -> Self {
        Self { date, time }
    }

    /// Build from calendar fields; out-of-range values yield `None`
    pub fn from_parts(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Option<Self> {
        if !(1980..=2107).contains(&year)
            || !(1..=12).contains(&month)
            || !(1..=31).contains(&day)
            || hour > 23
            || minute > 59
            || second > 59
        {
            return None;
        }
        let date = ((year - 1980) << 9) | (u16::from(month) << 5) | u16::from(day);
        let time = (u16::from(hour) << 11) | (u16::from(minute) << 5) | u16::from(second / 2);
        Some(Self { date, time })
    }

    /// Convert to a system time, `None` for invalid packed values
    pub fn to_system_time(self) -> Option<SystemTime> {
        let year = i64::from(self.date >> 9) + 1980;
        let month = i64::from((self.date >> 5) & 0x0F);
        let day = i64::from(self.date & 0x1F);
        let hour = u64::from(self.time >> 11);
        let minute = u64::from((self.time >> 5) & 0x3F);
        let second = u64::from(self.time & 0x1F) * 2;

        if !(1..=12).contains(&month) || day == 0 || hour > 23 || minute > 59 || second > 59 {
            return None;
        }

        let days = days_from_civil(year, month, day);
        let seconds = u64::try_from(days).ok()? * 86_400 + hour * 3600 + minute * 60 + second;
        UNIX_EPOCH.checked_add(Duration::from_secs(seconds))
    }
}

// Howard Hinnant's days-from-civil
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_dos_epoch() {
        let t = DosDateTime::new(DOS_EPOCH_DATE, 0).to_system_time().unwrap();
        assert_eq!(
            t.duration_since(UNIX_EPOCH).unwrap().as_secs(),
            315_532_800
        );
    }

    #[test]
    fn test_known_timestamp() {
        // 2024-02-29 13:45:30 UTC
        let dt = DosDateTime::from_parts(2024, 2, 29, 13, 45, 30).unwrap();
        let secs = dt
            .to_system_time()
            .unwrap()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert_eq!(secs, 1_709_214_330);
    }

    #[test]
    fn test_invalid_fields() {
        assert!(DosDateTime::new(0, 0).to_system_time().is_none());
        assert!(DosDateTime::from_parts(1979, 1, 1, 0, 0, 0).is_none());
        assert!(DosDateTime::from_parts(2000, 13, 1, 0, 0, 0).is_none());
    }
}
