//! Named sweep jobs and their daily cron triggers.
//!
//! Only the daily form `M H * * *` is accepted (minute and hour may be
//! comma lists), evaluated in a fixed local offset. A schedule fires at most
//! once per minute slot.

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobName {
    DailyReminders,
    UrgentReminders,
    DeliveryDelayCheck,
    VendorExpiryCheck,
    QuoteConflictReminder,
}

impl JobName {
    pub const ALL: [JobName; 5] = [
        JobName::DailyReminders,
        JobName::UrgentReminders,
        JobName::DeliveryDelayCheck,
        JobName::VendorExpiryCheck,
        JobName::QuoteConflictReminder,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DailyReminders => "daily-reminders",
            Self::UrgentReminders => "urgent-reminders",
            Self::DeliveryDelayCheck => "delivery-delay-check",
            Self::VendorExpiryCheck => "vendor-expiry-check",
            Self::QuoteConflictReminder => "quote-conflict-reminder",
        }
    }

    pub fn config_key(self) -> &'static str {
        match self {
            Self::DailyReminders => "daily_reminders",
            Self::UrgentReminders => "urgent_reminders",
            Self::DeliveryDelayCheck => "delivery_delay_check",
            Self::VendorExpiryCheck => "vendor_expiry_check",
            Self::QuoteConflictReminder => "quote_conflict_reminder",
        }
    }
}

impl std::fmt::Display for JobName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobName {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        JobName::ALL
            .into_iter()
            .find(|job| job.as_str() == normalized)
            .ok_or_else(|| format!("unknown job `{value}`"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CronSchedule {
    pub minutes: Vec<u32>,
    pub hours: Vec<u32>,
    pub last_fired: Option<DateTime<Utc>>,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let [minute, hour, day, month, weekday] = fields.as_slice() else {
            return Err(format!("expected 5 fields, found {}", fields.len()));
        };
        if [day, month, weekday].iter().any(|field| **field != "*") {
            return Err("only daily schedules (`M H * * *`) are supported".to_string());
        }
        let minutes = parse_field(minute, 59, "minute")?;
        let hours = parse_field(hour, 23, "hour")?;
        Ok(Self { minutes, hours, last_fired: None })
    }

    /// True when the local wall clock sits on the scheduled minute and this
    /// minute slot has not fired yet.
    pub fn should_fire(&self, now: DateTime<Utc>, offset: FixedOffset) -> bool {
        let local = now.with_timezone(&offset);
        if !self.hours.contains(&local.hour()) || !self.minutes.contains(&local.minute()) {
            return false;
        }
        match self.last_fired {
            None => true,
            Some(last) => minute_slot(last) != minute_slot(now),
        }
    }

    pub fn mark_fired(&mut self, at: DateTime<Utc>) {
        self.last_fired = Some(at);
    }
}

fn minute_slot(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(60)
}

/// A single value or a comma-separated list such as `0,30`.
fn parse_field(raw: &str, max: u32, name: &str) -> Result<Vec<u32>, String> {
    let mut values = Vec::new();
    for part in raw.split(',') {
        let value: u32 = part.parse().map_err(|_| format!("{name} `{part}` is not a number"))?;
        if value > max {
            return Err(format!("{name} {value} is out of range 0..={max}"));
        }
        if !values.contains(&value) {
            values.push(value);
        }
    }
    values.sort_unstable();
    Ok(values)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, FixedOffset, TimeZone, Utc};

    use super::{CronSchedule, JobName};

    fn maseru() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).expect("offset")
    }

    #[test]
    fn fires_at_local_wall_clock_time() {
        let schedule = CronSchedule::parse("0 8 * * *").expect("parse");
        let six_utc = Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap();
        let eight_utc = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();

        assert!(schedule.should_fire(six_utc, maseru()));
        assert!(!schedule.should_fire(eight_utc, maseru()));
    }

    #[test]
    fn does_not_fire_twice_in_the_same_minute() {
        let mut schedule = CronSchedule::parse("0 15 * * *").expect("parse");
        let tick = Utc.with_ymd_and_hms(2026, 3, 2, 13, 0, 5).unwrap();
        assert!(schedule.should_fire(tick, maseru()));

        schedule.mark_fired(tick);
        assert!(!schedule.should_fire(tick + Duration::seconds(30), maseru()));
        assert!(schedule.should_fire(tick + Duration::days(1), maseru()));
    }

    #[test]
    fn hour_lists_fire_at_each_listed_hour() {
        let schedule = CronSchedule::parse("30 9,15 * * *").expect("parse");
        assert_eq!(schedule.hours, vec![9, 15]);
        let morning = Utc.with_ymd_and_hms(2026, 3, 2, 7, 30, 0).unwrap();
        let afternoon = Utc.with_ymd_and_hms(2026, 3, 2, 13, 30, 0).unwrap();
        let noon = Utc.with_ymd_and_hms(2026, 3, 2, 10, 30, 0).unwrap();

        assert!(schedule.should_fire(morning, maseru()));
        assert!(schedule.should_fire(afternoon, maseru()));
        assert!(!schedule.should_fire(noon, maseru()));
        assert!(CronSchedule::parse("0 9,,15 * * *").is_err());
    }

    #[test]
    fn rejects_non_daily_or_out_of_range_expressions() {
        assert!(CronSchedule::parse("0 8 * * 1").is_err());
        assert!(CronSchedule::parse("60 8 * * *").is_err());
        assert!(CronSchedule::parse("0 8 *").is_err());
    }

    #[test]
    fn job_names_parse_from_either_separator() {
        assert_eq!("vendor_expiry_check".parse::<JobName>(), Ok(JobName::VendorExpiryCheck));
        assert_eq!("daily-reminders".parse::<JobName>(), Ok(JobName::DailyReminders));
        assert!("weekly-digest".parse::<JobName>().is_err());
    }
}
