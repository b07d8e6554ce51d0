//! Calendar time and the packed RTC register decoding.

use core::fmt::Write;

use heapless::String;

pub const DATE_BYTES: usize = 10;
pub const TIME_BYTES: usize = 8;

/// Number of timekeeping registers read in one burst from a DS3231-style RTC.
pub const RTC_REGISTER_COUNT: usize = 7;

const HOUR_12H_FLAG: u8 = 0x40;
const HOUR_PM_FLAG: u8 = 0x20;
const MONTH_CENTURY_FLAG: u8 = 0x80;

/// Wall-clock time as seven integer fields.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    /// 1..=7, as counted by the RTC. Not used for anything but carried through.
    pub weekday: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClockError {
    InvalidBcd { register: u8 },
    OutOfRange { register: u8 },
}

/// Source of calendar timestamps plus a monotonic millisecond counter.
///
/// The calendar is only consulted when a record is written; window and pause
/// timing run on `uptime_ms`.
pub trait ClockSource {
    type Error: core::fmt::Debug;

    fn now(&mut self) -> Result<DateTime, Self::Error>;
    fn uptime_ms(&self) -> u64;
}

impl DateTime {
    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            weekday: 1,
            hour,
            minute,
            second,
        }
    }

    /// `YYYY-MM-DD`
    pub fn date_string(&self) -> String<DATE_BYTES> {
        let mut out = String::new();
        let _ = write!(out, "{:04}-{:02}-{:02}", self.year, self.month, self.day);
        out
    }

    /// `HH:MM:SS`
    pub fn time_string(&self) -> String<TIME_BYTES> {
        let mut out = String::new();
        let _ = write!(out, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second);
        out
    }

    pub fn year_in_century(&self) -> u8 {
        (self.year % 100) as u8
    }
}

/// Decodes the seven packed BCD timekeeping registers (seconds first).
pub fn decode_registers(raw: [u8; RTC_REGISTER_COUNT]) -> Result<DateTime, ClockError> {
    let second = bcd_field(raw[0] & 0x7F, 0, 0, 59)?;
    let minute = bcd_field(raw[1] & 0x7F, 1, 0, 59)?;

    let hour = if raw[2] & HOUR_12H_FLAG != 0 {
        let hour12 = bcd_field(raw[2] & 0x1F, 2, 1, 12)?;
        let pm = raw[2] & HOUR_PM_FLAG != 0;
        match (hour12, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, false) => h,
            (h, true) => h + 12,
        }
    } else {
        bcd_field(raw[2] & 0x3F, 2, 0, 23)?
    };

    let weekday = bcd_field(raw[3] & 0x07, 3, 1, 7)?;
    let month = bcd_field(raw[5] & 0x1F, 5, 1, 12)?;
    let year_in_century = bcd_field(raw[6], 6, 0, 99)?;
    let century = if raw[5] & MONTH_CENTURY_FLAG != 0 { 100 } else { 0 };
    let year = 2000 + century + u16::from(year_in_century);

    let day = bcd_field(raw[4] & 0x3F, 4, 1, days_in_month(year, month))?;

    Ok(DateTime {
        year,
        month,
        day,
        weekday,
        hour,
        minute,
        second,
    })
}

fn bcd_field(value: u8, register: u8, min: u8, max: u8) -> Result<u8, ClockError> {
    let tens = value >> 4;
    let units = value & 0x0F;
    if tens > 9 || units > 9 {
        return Err(ClockError::InvalidBcd { register });
    }

    let decoded = tens * 10 + units;
    if decoded < min || decoded > max {
        return Err(ClockError::OutOfRange { register });
    }
    Ok(decoded)
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

fn is_leap_year(year: u16) -> bool {
    (year.is_multiple_of(4) && !year.is_multiple_of(100)) || year.is_multiple_of(400)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_24h_registers() {
        // 2026-10-19 13:04:05, Monday
        let raw = [0x05, 0x04, 0x13, 0x01, 0x19, 0x10, 0x26];
        let now = decode_registers(raw).unwrap();

        assert_eq!(now.year, 2026);
        assert_eq!(now.month, 10);
        assert_eq!(now.day, 19);
        assert_eq!(now.weekday, 1);
        assert_eq!(now.date_string().as_str(), "2026-10-19");
        assert_eq!(now.time_string().as_str(), "13:04:05");
    }

    #[test]
    fn decodes_12h_mode_and_century_flag() {
        // 12:30:00 AM, century bit set
        let midnight = decode_registers([0x00, 0x30, 0x52, 0x03, 0x01, 0x81, 0x00]).unwrap();
        assert_eq!(midnight.hour, 0);
        assert_eq!(midnight.year, 2100);

        // 07:15:00 PM
        let evening = decode_registers([0x00, 0x15, 0x67, 0x03, 0x01, 0x01, 0x25]).unwrap();
        assert_eq!(evening.hour, 19);
    }

    #[test]
    fn rejects_invalid_bcd_and_impossible_dates() {
        assert_eq!(
            decode_registers([0x0A, 0x00, 0x00, 0x01, 0x01, 0x01, 0x26]),
            Err(ClockError::InvalidBcd { register: 0 })
        );
        assert_eq!(
            decode_registers([0x00, 0x00, 0x00, 0x01, 0x30, 0x02, 0x26]),
            Err(ClockError::OutOfRange { register: 4 })
        );
        // 2028 is a leap year.
        assert!(decode_registers([0x00, 0x00, 0x00, 0x01, 0x29, 0x02, 0x28]).is_ok());
    }
}
