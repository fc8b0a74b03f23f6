//! Calendar arithmetic in the organization's local time zone.

use chrono::{DateTime, Datelike, FixedOffset, Months, NaiveDate, Offset, Utc, Weekday};

/// Africa/Maseru: UTC+2 all year, no daylight saving.
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusinessCalendar {
    offset: FixedOffset,
}

impl Default for BusinessCalendar {
    fn default() -> Self {
        Self::with_offset_hours(DEFAULT_UTC_OFFSET_HOURS)
    }
}

impl BusinessCalendar {
    /// Offsets outside +/-23 hours fall back to UTC.
    pub fn with_offset_hours(hours: i32) -> Self {
        let offset = FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix());
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    /// Weekdays in the inclusive local-date range `[start, end]`; zero when `end` precedes `start`.
    pub fn business_days_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
        let first = self.local_date(start);
        let last = self.local_date(end);
        if last < first {
            return 0;
        }
        first
            .iter_days()
            .take_while(|day| *day <= last)
            .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun))
            .count() as i64
    }

    /// Whole calendar months elapsed from `start` to `end`, never negative.
    pub fn months_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
        let from = self.local_date(start);
        let to = self.local_date(end);
        if to <= from {
            return 0;
        }
        let mut months = (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32;
        if to.day() < from.day() {
            months -= 1;
        }
        months.max(0) as u32
    }
}

pub fn add_months(at: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    at.checked_add_months(Months::new(months)).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{add_months, BusinessCalendar};

    #[test]
    fn monday_to_friday_counts_five_business_days() {
        let calendar = BusinessCalendar::default();
        let monday = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let friday = Utc.with_ymd_and_hms(2026, 3, 6, 17, 0, 0).unwrap();
        assert_eq!(calendar.business_days_between(monday, friday), 5);
    }

    #[test]
    fn weekends_are_skipped_and_reversed_ranges_are_zero() {
        let calendar = BusinessCalendar::default();
        let friday = Utc.with_ymd_and_hms(2026, 3, 6, 8, 0, 0).unwrap();
        let next_monday = Utc.with_ymd_and_hms(2026, 3, 9, 8, 0, 0).unwrap();
        assert_eq!(calendar.business_days_between(friday, next_monday), 2);
        assert_eq!(calendar.business_days_between(next_monday, friday), 0);
    }

    #[test]
    fn local_date_uses_the_fixed_offset() {
        let calendar = BusinessCalendar::default();
        // 23:00 UTC Friday is already Saturday in UTC+2.
        let late_friday = Utc.with_ymd_and_hms(2026, 3, 6, 23, 0, 0).unwrap();
        assert_eq!(calendar.business_days_between(late_friday, late_friday), 0);
    }

    #[test]
    fn months_between_counts_whole_months() {
        let calendar = BusinessCalendar::default();
        let start = Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap();
        assert_eq!(calendar.months_between(start, Utc.with_ymd_and_hms(2025, 7, 14, 10, 0, 0).unwrap()), 5);
        assert_eq!(calendar.months_between(start, Utc.with_ymd_and_hms(2025, 7, 15, 10, 0, 0).unwrap()), 6);
        assert_eq!(add_months(start, 12), Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap());
    }
}
