use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;

use crate::error::SchedulerError;

/// Accepts both standard 5-field unix cron (`min hour dom month dow`) and
/// the `cron` crate's native 6-field form with seconds; 5-field
/// expressions are normalised to second-precision by prefixing `"0 "`.
fn parse(expression: &str) -> Result<CronSchedule, SchedulerError> {
    let field_count = expression.split_whitespace().count();
    let normalised = if field_count == 5 { format!("0 {expression}") } else { expression.to_string() };
    CronSchedule::from_str(&normalised).map_err(|e| SchedulerError::InvalidCron(expression.to_string(), e.to_string()))
}

fn parse_timezone(tz: &str) -> Result<Tz, SchedulerError> {
    Tz::from_str(tz).map_err(|_| SchedulerError::InvalidTimezone(tz.to_string()))
}

/// Smallest instant strictly after `after` matching `expression` in
/// `timezone`, converted back to UTC. Second precision, DST-aware via
/// `chrono_tz`.
pub fn next_fire_after(expression: &str, timezone: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, SchedulerError> {
    let schedule = parse(expression)?;
    let tz = parse_timezone(timezone)?;
    let after_in_tz = after.with_timezone(&tz);
    schedule
        .after(&after_in_tz)
        .next()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| SchedulerError::InvalidCron(expression.to_string(), "no upcoming occurrence".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn five_field_expression_is_normalised() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 3, 0).unwrap();
        let next = next_fire_after("*/5 * * * *", "UTC", at).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 12, 5, 0).unwrap());
    }

    #[test]
    fn invalid_expression_is_rejected() {
        assert!(next_fire_after("not a cron", "UTC", Utc::now()).is_err());
    }

    #[test]
    fn invalid_timezone_is_rejected() {
        assert!(next_fire_after("*/5 * * * *", "Not/A_Zone", Utc::now()).is_err());
    }
}
