//! Pure recurrence-rule calculation. No I/O, no `sqlx`/`tokio` imports —
//! kept a plain function over plain data the way `services/notifications.rs`
//! keeps message rendering free of service-layer state.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};

const CRON_SEARCH_BOUND_MINUTES: u32 = 525_600; // one year

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecurrenceError {
    #[error("unrecognized recurrence rule: {0}")]
    InvalidRule(String),
}

/// Validate a recurrence rule string without computing an occurrence.
/// Used by `TaskRepository::create`/`update` to enforce invariant I3 at write time.
pub fn validate_rule(rule: &str) -> Result<(), RecurrenceError> {
    parse_rule(rule).map(|_| ())
}

/// Compute the next occurrence after `current` for `rule`. Returns `None` when
/// the series has terminated: either the computed date exceeds `end`, or (for
/// `cron:` rules) no match was found within the one-year search bound.
pub fn next_occurrence(
    current: NaiveDateTime,
    rule: &str,
    end: Option<NaiveDateTime>,
) -> Result<Option<NaiveDateTime>, RecurrenceError> {
    let parsed = parse_rule(rule)?;

    let next = match parsed {
        Rule::Daily => current + Duration::days(1),
        Rule::Weekly => current + Duration::days(7),
        Rule::Monthly => add_months(current, 1),
        Rule::Weekdays => next_weekday(current),
        Rule::Cron(fields) => match next_cron_occurrence(current, &fields) {
            Some(d) => d,
            None => return Ok(None),
        },
    };

    if let Some(end) = end {
        if next > end {
            return Ok(None);
        }
    }

    Ok(Some(next))
}

enum Rule {
    Daily,
    Weekly,
    Monthly,
    Weekdays,
    Cron(CronFields),
}

struct CronFields {
    minute: String,
    hour: String,
    day_of_month: String,
    month: String,
    day_of_week: String,
}

fn parse_rule(rule: &str) -> Result<Rule, RecurrenceError> {
    match rule {
        "daily" => Ok(Rule::Daily),
        "weekly" => Ok(Rule::Weekly),
        "monthly" => Ok(Rule::Monthly),
        "weekdays" => Ok(Rule::Weekdays),
        _ => {
            if let Some(spec) = rule.strip_prefix("cron:") {
                let fields: Vec<&str> = spec.split_whitespace().collect();
                if fields.len() != 5 {
                    return Err(RecurrenceError::InvalidRule(rule.to_string()));
                }
                for f in &fields {
                    if !is_valid_cron_field(f) {
                        return Err(RecurrenceError::InvalidRule(rule.to_string()));
                    }
                }
                Ok(Rule::Cron(CronFields {
                    minute: fields[0].to_string(),
                    hour: fields[1].to_string(),
                    day_of_month: fields[2].to_string(),
                    month: fields[3].to_string(),
                    day_of_week: fields[4].to_string(),
                }))
            } else {
                Err(RecurrenceError::InvalidRule(rule.to_string()))
            }
        }
    }
}

fn is_valid_cron_field(field: &str) -> bool {
    if field == "*" {
        return true;
    }
    if let Some(n) = field.strip_prefix("*/") {
        return n.parse::<u32>().is_ok();
    }
    if field.contains(',') {
        return field.split(',').all(is_valid_cron_field);
    }
    if let Some((a, b)) = field.split_once('-') {
        return a.parse::<u32>().is_ok() && b.parse::<u32>().is_ok();
    }
    field.parse::<u32>().is_ok()
}

fn matches_field(value: u32, field: &str) -> bool {
    if field == "*" {
        return true;
    }
    if let Some(n) = field.strip_prefix("*/") {
        return n.parse::<u32>().map(|n| n != 0 && value % n == 0).unwrap_or(false);
    }
    if field.contains(',') {
        return field.split(',').any(|f| matches_field(value, f));
    }
    if let Some((a, b)) = field.split_once('-') {
        if let (Ok(a), Ok(b)) = (a.parse::<u32>(), b.parse::<u32>()) {
            return value >= a && value <= b;
        }
        return false;
    }
    field.parse::<u32>().map(|v| v == value).unwrap_or(false)
}

fn matches_cron(dt: NaiveDateTime, fields: &CronFields) -> bool {
    let dow = dt.weekday().num_days_from_sunday();
    matches_field(dt.minute(), &fields.minute)
        && matches_field(dt.hour(), &fields.hour)
        && matches_field(dt.day(), &fields.day_of_month)
        && matches_field(dt.month(), &fields.month)
        && matches_field(dow, &fields.day_of_week)
}

fn next_cron_occurrence(current: NaiveDateTime, fields: &CronFields) -> Option<NaiveDateTime> {
    let mut candidate = current
        .date()
        .and_hms_opt(current.hour(), current.minute(), 0)
        .unwrap()
        + Duration::minutes(1);

    for _ in 0..CRON_SEARCH_BOUND_MINUTES {
        if matches_cron(candidate, fields) {
            return Some(candidate);
        }
        candidate += Duration::minutes(1);
    }
    None
}

fn is_weekend(dt: NaiveDateTime) -> bool {
    matches!(dt.weekday(), Weekday::Sat | Weekday::Sun)
}

fn next_weekday(current: NaiveDateTime) -> NaiveDateTime {
    let mut next = current + Duration::days(1);
    while is_weekend(next) {
        next += Duration::days(1);
    }
    next
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => unreachable!("month out of range"),
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn add_months(dt: NaiveDateTime, months: i32) -> NaiveDateTime {
    let total = dt.month() as i32 - 1 + months;
    let year = dt.year() + total.div_euclid(12);
    let month = (total.rem_euclid(12)) as u32 + 1;
    let day = dt.day().min(days_in_month(year, month));
    let date = NaiveDate::from_ymd_opt(year, month, day).expect("valid calendar date");
    NaiveDateTime::new(date, dt.time())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn daily_adds_one_day() {
        let next = next_occurrence(dt(2024, 1, 1, 9, 0), "daily", None).unwrap();
        assert_eq!(next, Some(dt(2024, 1, 2, 9, 0)));
    }

    #[test]
    fn weekly_adds_seven_days() {
        let next = next_occurrence(dt(2024, 1, 1, 9, 0), "weekly", None).unwrap();
        assert_eq!(next, Some(dt(2024, 1, 8, 9, 0)));
    }

    #[test]
    fn monthly_clamps_on_leap_year() {
        let next = next_occurrence(dt(2024, 1, 31, 9, 0), "monthly", None).unwrap();
        assert_eq!(next, Some(dt(2024, 2, 29, 9, 0)));
    }

    #[test]
    fn monthly_clamps_on_non_leap_year() {
        let next = next_occurrence(dt(2023, 1, 31, 9, 0), "monthly", None).unwrap();
        assert_eq!(next, Some(dt(2023, 2, 28, 9, 0)));
    }

    #[test]
    fn weekdays_skips_saturday_and_sunday() {
        // 2024-01-05 is a Friday.
        let next = next_occurrence(dt(2024, 1, 5, 9, 0), "weekdays", None).unwrap();
        assert_eq!(next, Some(dt(2024, 1, 8, 9, 0)));

        // 2024-01-06 is a Saturday.
        let next = next_occurrence(dt(2024, 1, 6, 9, 0), "weekdays", None).unwrap();
        assert_eq!(next, Some(dt(2024, 1, 8, 9, 0)));
    }

    #[test]
    fn cron_finds_next_monday_nine_am() {
        // 2024-01-01 is a Monday, so starting right at 00:00 the next match is
        // that same day at 09:00.
        let next = next_occurrence(dt(2024, 1, 1, 0, 0), "cron:0 9 * * 1", None).unwrap();
        assert_eq!(next, Some(dt(2024, 1, 1, 9, 0)));
    }

    #[test]
    fn cron_skips_to_following_week_once_past_the_time() {
        let next = next_occurrence(dt(2024, 1, 1, 10, 0), "cron:0 9 * * 1", None).unwrap();
        assert_eq!(next, Some(dt(2024, 1, 8, 9, 0)));
    }

    #[test]
    fn series_terminates_past_recurrence_end() {
        let end = dt(2024, 1, 1, 23, 59);
        let next = next_occurrence(dt(2024, 1, 1, 9, 0), "weekdays", Some(end)).unwrap();
        assert_eq!(next, None);
    }

    #[test]
    fn invalid_rule_is_rejected() {
        assert!(validate_rule("fortnightly").is_err());
        assert!(validate_rule("cron:0 9 * *").is_err());
        assert!(validate_rule("cron:0 9 * * 1").is_ok());
    }
}
