//! Automatic scan scheduling
//!
//! Computes when the next periodic scan should start. Hourly scans fire at
//! minute 0 of every hour; daily scans at the configured start time; weekly
//! scans on Monday and monthly scans on the 1st, both at the configured
//! start time.

use chrono::{DateTime, Datelike, Duration, Local, NaiveTime, TimeZone, Timelike};
use mezzo_common::config::{StartTime, UpdatePeriod};

/// Next scan time strictly after `now`, or `None` when automatic scans are
/// disabled
pub fn next_scan_time(
    period: UpdatePeriod,
    start_time: StartTime,
    now: DateTime<Local>,
) -> Option<DateTime<Local>> {
    match period {
        UpdatePeriod::Never => None,
        UpdatePeriod::Hourly => {
            let truncated = now
                .with_minute(0)
                .and_then(|t| t.with_second(0))
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(now);
            Some(truncated + Duration::hours(1))
        }
        UpdatePeriod::Daily => {
            let at = at_start_time(now.date_naive(), start_time)?;
            Some(if at > now { at } else { at + Duration::days(1) })
        }
        UpdatePeriod::Weekly => {
            let days_until_monday = (7 - now.weekday().num_days_from_monday()) % 7;
            let monday = now.date_naive() + Duration::days(days_until_monday as i64);
            let at = at_start_time(monday, start_time)?;
            Some(if at > now { at } else { at + Duration::weeks(1) })
        }
        UpdatePeriod::Monthly => {
            let first = now.date_naive().with_day(1)?;
            let at = at_start_time(first, start_time)?;
            if at > now {
                Some(at)
            } else {
                let next_month = if first.month() == 12 {
                    first.with_year(first.year() + 1)?.with_month(1)?
                } else {
                    first.with_month(first.month() + 1)?
                };
                at_start_time(next_month, start_time)
            }
        }
    }
}

fn at_start_time(date: chrono::NaiveDate, start_time: StartTime) -> Option<DateTime<Local>> {
    let time = NaiveTime::from_hms_opt(start_time.hour as u32, start_time.minute as u32, 0)?;
    Local.from_local_datetime(&date.and_time(time)).earliest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn start(hour: u8, minute: u8) -> StartTime {
        StartTime { hour, minute }
    }

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .earliest()
            .unwrap()
    }

    #[test]
    fn test_never_yields_no_schedule() {
        assert_eq!(
            next_scan_time(UpdatePeriod::Never, start(3, 0), Local::now()),
            None
        );
    }

    #[test]
    fn test_hourly_fires_at_next_minute_zero() {
        let now = local(2025, 6, 15, 10, 42);
        let next = next_scan_time(UpdatePeriod::Hourly, start(9, 30), now).unwrap();
        assert_eq!(next, local(2025, 6, 15, 11, 0));
    }

    #[test]
    fn test_daily_before_and_after_start_time() {
        let start_time = start(6, 30);

        let before = local(2025, 6, 15, 4, 0);
        assert_eq!(
            next_scan_time(UpdatePeriod::Daily, start_time, before).unwrap(),
            local(2025, 6, 15, 6, 30)
        );

        let after = local(2025, 6, 15, 7, 0);
        assert_eq!(
            next_scan_time(UpdatePeriod::Daily, start_time, after).unwrap(),
            local(2025, 6, 16, 6, 30)
        );
    }

    #[test]
    fn test_weekly_fires_on_monday() {
        // 2025-06-15 is a Sunday
        let now = local(2025, 6, 15, 12, 0);
        let next = next_scan_time(UpdatePeriod::Weekly, start(2, 0), now).unwrap();
        assert_eq!(next, local(2025, 6, 16, 2, 0));
        assert_eq!(next.weekday(), Weekday::Mon);

        // Monday after the start time rolls over a full week
        let monday_noon = local(2025, 6, 16, 12, 0);
        let next = next_scan_time(UpdatePeriod::Weekly, start(2, 0), monday_noon).unwrap();
        assert_eq!(next, local(2025, 6, 23, 2, 0));
    }

    #[test]
    fn test_monthly_fires_on_the_first() {
        let now = local(2025, 12, 10, 8, 0);
        let next = next_scan_time(UpdatePeriod::Monthly, start(1, 15), now).unwrap();
        assert_eq!(next, local(2026, 1, 1, 1, 15));
    }
}
