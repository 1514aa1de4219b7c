//! Datetime macro evaluation.

use crate::record::Value;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use rulebase_lang::DateMacro;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3fZ";

/// Format a timestamp the way datetime fields are stored.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Evaluate a datetime macro relative to `now`.
///
/// Point-in-time macros produce stored-format strings, component macros
/// (`@hour`, `@year`...) produce integers.
pub fn evaluate_date_macro(m: DateMacro, now: DateTime<Utc>) -> Value {
    let text = |dt: DateTime<Utc>| Value::Text(format_datetime(dt));
    let date = now.date_naive();

    match m {
        DateMacro::Now => text(now),
        DateMacro::Second => Value::Int(i64::from(now.second())),
        DateMacro::Minute => Value::Int(i64::from(now.minute())),
        DateMacro::Hour => Value::Int(i64::from(now.hour())),
        DateMacro::Weekday => Value::Int(i64::from(now.weekday().num_days_from_sunday())),
        DateMacro::Day => Value::Int(i64::from(now.day())),
        DateMacro::Month => Value::Int(i64::from(now.month())),
        DateMacro::Year => Value::Int(i64::from(now.year())),
        DateMacro::Yesterday => text(now - Duration::days(1)),
        DateMacro::Tomorrow => text(now + Duration::days(1)),
        DateMacro::TodayStart => text(start_of(date, now)),
        DateMacro::TodayEnd => text(end_of(date, now)),
        DateMacro::MonthStart => text(start_of(date.with_day(1).unwrap_or(date), now)),
        DateMacro::MonthEnd => text(end_of(last_day_of_month(date), now)),
        DateMacro::YearStart => {
            let first = NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date);
            text(start_of(first, now))
        }
        DateMacro::YearEnd => {
            let last = NaiveDate::from_ymd_opt(date.year(), 12, 31).unwrap_or(date);
            text(end_of(last, now))
        }
    }
}

fn start_of(date: NaiveDate, fallback: DateTime<Utc>) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .map_or(fallback, |dt: NaiveDateTime| dt.and_utc())
}

fn end_of(date: NaiveDate, fallback: DateTime<Utc>) -> DateTime<Utc> {
    date.and_hms_milli_opt(23, 59, 59, 999)
        .map_or(fallback, |dt: NaiveDateTime| dt.and_utc())
}

fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 14, 9, 30, 15).unwrap()
    }

    #[test]
    fn test_point_in_time_macros() {
        let now = fixed();
        assert_eq!(
            evaluate_date_macro(DateMacro::Now, now),
            Value::Text("2024-02-14 09:30:15.000Z".into())
        );
        assert_eq!(
            evaluate_date_macro(DateMacro::TodayStart, now),
            Value::Text("2024-02-14 00:00:00.000Z".into())
        );
        assert_eq!(
            evaluate_date_macro(DateMacro::TodayEnd, now),
            Value::Text("2024-02-14 23:59:59.999Z".into())
        );
        assert_eq!(
            evaluate_date_macro(DateMacro::Yesterday, now),
            Value::Text("2024-02-13 09:30:15.000Z".into())
        );
    }

    #[test]
    fn test_month_and_year_bounds() {
        let now = fixed();
        assert_eq!(
            evaluate_date_macro(DateMacro::MonthStart, now),
            Value::Text("2024-02-01 00:00:00.000Z".into())
        );
        // leap year
        assert_eq!(
            evaluate_date_macro(DateMacro::MonthEnd, now),
            Value::Text("2024-02-29 23:59:59.999Z".into())
        );
        assert_eq!(
            evaluate_date_macro(DateMacro::YearEnd, now),
            Value::Text("2024-12-31 23:59:59.999Z".into())
        );

        let december = Utc.with_ymd_and_hms(2023, 12, 5, 0, 0, 0).unwrap();
        assert_eq!(
            evaluate_date_macro(DateMacro::MonthEnd, december),
            Value::Text("2023-12-31 23:59:59.999Z".into())
        );
    }

    #[test]
    fn test_component_macros() {
        let now = fixed();
        assert_eq!(evaluate_date_macro(DateMacro::Hour, now), Value::Int(9));
        assert_eq!(evaluate_date_macro(DateMacro::Year, now), Value::Int(2024));
        // 2024-02-14 was a Wednesday
        assert_eq!(evaluate_date_macro(DateMacro::Weekday, now), Value::Int(3));
    }
}
