//! Reflection cycle date math: next due date, expected counts, streaks.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Days reported when an activity has no deadline.
pub const NO_DEADLINE_DAYS: i64 = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReflectionCycle {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

impl ReflectionCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReflectionCycle::Daily => "daily",
            ReflectionCycle::Weekly => "weekly",
            ReflectionCycle::Biweekly => "biweekly",
            ReflectionCycle::Monthly => "monthly",
        }
    }
}

impl fmt::Display for ReflectionCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReflectionCycle {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(ReflectionCycle::Daily),
            "weekly" => Ok(ReflectionCycle::Weekly),
            "biweekly" => Ok(ReflectionCycle::Biweekly),
            "monthly" => Ok(ReflectionCycle::Monthly),
            other => Err(AppError::validation(
                "INVALID_REFLECTION_CYCLE",
                format!("reflection_cycle must be daily, weekly, biweekly or monthly, got '{other}'"),
            )),
        }
    }
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// `day` in the given month, clamped to the month's last day.
fn clamped_date(year: i32, month: u32, day: u32) -> NaiveDate {
    let day = day.min(last_day_of_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

/// Next date a reflection is due, always strictly after `today`.
pub fn next_reflection_date(start: NaiveDate, cycle: ReflectionCycle, today: NaiveDate) -> NaiveDate {
    match cycle {
        ReflectionCycle::Daily => today + Duration::days(1),
        ReflectionCycle::Weekly => {
            let days_ahead = 7 - today.weekday().num_days_from_monday() as i64;
            today + Duration::days(days_ahead)
        }
        ReflectionCycle::Biweekly => {
            let elapsed = (today - start).num_days();
            today + Duration::days(14 - elapsed.rem_euclid(14))
        }
        ReflectionCycle::Monthly => {
            let this_month = clamped_date(today.year(), today.month(), start.day());
            if this_month > today {
                this_month
            } else if today.month() == 12 {
                clamped_date(today.year() + 1, 1, start.day())
            } else {
                clamped_date(today.year(), today.month() + 1, start.day())
            }
        }
    }
}

/// How many reflections a space spanning `start..=end` should collect.
pub fn expected_reflections(start: NaiveDate, end: NaiveDate, cycle: ReflectionCycle) -> i64 {
    let days = (end - start).num_days() + 1;
    if days <= 0 {
        return 0;
    }
    let period = match cycle {
        ReflectionCycle::Daily => 1,
        ReflectionCycle::Weekly => 7,
        ReflectionCycle::Biweekly => 14,
        ReflectionCycle::Monthly => 30,
    };
    (days + period - 1) / period
}

/// Consecutive days with at least one entry, counting back from `today`.
///
/// `dates` must be sorted newest first. Entries dated after `today` are
/// ignored and repeated dates count once.
pub fn reflection_streak(dates: &[NaiveDate], today: NaiveDate) -> u32 {
    let mut streak = 0;
    let mut cursor = today;
    for date in dates {
        if *date > cursor {
            continue;
        }
        if *date == cursor {
            streak += 1;
            cursor = cursor - Duration::days(1);
        } else {
            break;
        }
    }
    streak
}

/// Days until `deadline`, never negative; [`NO_DEADLINE_DAYS`] when there is none.
pub fn days_left(deadline: Option<NaiveDate>, today: NaiveDate) -> i64 {
    match deadline {
        Some(d) => (d - today).num_days().max(0),
        None => NO_DEADLINE_DAYS,
    }
}

/// Rule-based cycle suggestion by activity type and length.
pub fn recommend_cycle(activity_type: &str, start: NaiveDate, end: NaiveDate) -> ReflectionCycle {
    let days = (end - start).num_days() + 1;
    match activity_type {
        "공모전" if days <= 7 => ReflectionCycle::Daily,
        "공모전" if days <= 30 => ReflectionCycle::Weekly,
        "공모전" => ReflectionCycle::Biweekly,
        "프로젝트" if days <= 14 => ReflectionCycle::Weekly,
        "프로젝트" => ReflectionCycle::Biweekly,
        "스터디" => ReflectionCycle::Weekly,
        "동아리" if days <= 60 => ReflectionCycle::Biweekly,
        "동아리" => ReflectionCycle::Monthly,
        _ => ReflectionCycle::Weekly,
    }
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_isoywd_opt(date.iso_week().year(), date.iso_week().week(), Weekday::Mon)
        .unwrap_or(date)
}

/// Parses the date part of `YYYY-MM-DD` or an RFC 3339 timestamp.
pub fn parse_day(text: &str) -> Option<NaiveDate> {
    let head = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn daily_is_tomorrow() {
        assert_eq!(
            next_reflection_date(d(2024, 1, 1), ReflectionCycle::Daily, d(2024, 3, 10)),
            d(2024, 3, 11)
        );
    }

    #[test]
    fn weekly_is_next_monday() {
        // 2024-03-13 is a Wednesday, 2024-03-11 a Monday.
        assert_eq!(
            next_reflection_date(d(2024, 1, 1), ReflectionCycle::Weekly, d(2024, 3, 13)),
            d(2024, 3, 18)
        );
        assert_eq!(
            next_reflection_date(d(2024, 1, 1), ReflectionCycle::Weekly, d(2024, 3, 11)),
            d(2024, 3, 18)
        );
    }

    #[test]
    fn biweekly_counts_from_start() {
        let start = d(2024, 3, 1);
        assert_eq!(
            next_reflection_date(start, ReflectionCycle::Biweekly, d(2024, 3, 5)),
            d(2024, 3, 15)
        );
        assert_eq!(
            next_reflection_date(start, ReflectionCycle::Biweekly, d(2024, 3, 15)),
            d(2024, 3, 29)
        );
    }

    #[test]
    fn biweekly_before_start_stays_on_grid() {
        let start = d(2024, 3, 20);
        assert_eq!(
            next_reflection_date(start, ReflectionCycle::Biweekly, d(2024, 3, 15)),
            d(2024, 3, 20)
        );
    }

    #[test]
    fn monthly_rolls_to_next_month() {
        let start = d(2024, 1, 10);
        assert_eq!(
            next_reflection_date(start, ReflectionCycle::Monthly, d(2024, 3, 5)),
            d(2024, 3, 10)
        );
        assert_eq!(
            next_reflection_date(start, ReflectionCycle::Monthly, d(2024, 3, 10)),
            d(2024, 4, 10)
        );
        assert_eq!(
            next_reflection_date(start, ReflectionCycle::Monthly, d(2024, 12, 20)),
            d(2025, 1, 10)
        );
    }

    #[test]
    fn monthly_clamps_short_months() {
        let start = d(2024, 1, 31);
        assert_eq!(
            next_reflection_date(start, ReflectionCycle::Monthly, d(2024, 2, 10)),
            d(2024, 2, 29)
        );
        assert_eq!(
            next_reflection_date(start, ReflectionCycle::Monthly, d(2023, 2, 28)),
            d(2023, 3, 31)
        );
    }

    #[test]
    fn expected_counts_round_up() {
        let start = d(2024, 3, 1);
        let end = d(2024, 3, 31);
        assert_eq!(expected_reflections(start, end, ReflectionCycle::Daily), 31);
        assert_eq!(expected_reflections(start, end, ReflectionCycle::Weekly), 5);
        assert_eq!(expected_reflections(start, end, ReflectionCycle::Biweekly), 3);
        assert_eq!(expected_reflections(start, end, ReflectionCycle::Monthly), 2);
        assert_eq!(expected_reflections(start, start, ReflectionCycle::Monthly), 1);
        assert_eq!(expected_reflections(end, start, ReflectionCycle::Daily), 0);
    }

    #[test]
    fn streak_stops_at_gap_and_skips_duplicates() {
        let today = d(2024, 3, 10);
        let dates = vec![
            d(2024, 3, 11),
            d(2024, 3, 10),
            d(2024, 3, 10),
            d(2024, 3, 9),
            d(2024, 3, 8),
            d(2024, 3, 6),
        ];
        assert_eq!(reflection_streak(&dates, today), 3);
        assert_eq!(reflection_streak(&[d(2024, 3, 9)], today), 0);
        assert_eq!(reflection_streak(&[], today), 0);
    }

    #[test]
    fn days_left_is_clamped() {
        let today = d(2024, 3, 10);
        assert_eq!(days_left(Some(d(2024, 3, 15)), today), 5);
        assert_eq!(days_left(Some(d(2024, 3, 1)), today), 0);
        assert_eq!(days_left(None, today), NO_DEADLINE_DAYS);
    }

    #[test]
    fn cycle_recommendations() {
        let start = d(2024, 3, 1);
        assert_eq!(recommend_cycle("공모전", start, d(2024, 3, 7)), ReflectionCycle::Daily);
        assert_eq!(recommend_cycle("공모전", start, d(2024, 3, 30)), ReflectionCycle::Weekly);
        assert_eq!(recommend_cycle("공모전", start, d(2024, 5, 1)), ReflectionCycle::Biweekly);
        assert_eq!(recommend_cycle("프로젝트", start, d(2024, 3, 14)), ReflectionCycle::Weekly);
        assert_eq!(recommend_cycle("프로젝트", start, d(2024, 3, 15)), ReflectionCycle::Biweekly);
        assert_eq!(recommend_cycle("스터디", start, d(2024, 9, 1)), ReflectionCycle::Weekly);
        assert_eq!(recommend_cycle("동아리", start, d(2024, 4, 29)), ReflectionCycle::Biweekly);
        assert_eq!(recommend_cycle("동아리", start, d(2024, 6, 1)), ReflectionCycle::Monthly);
        assert_eq!(recommend_cycle("기타", start, d(2024, 6, 1)), ReflectionCycle::Weekly);
    }

    #[test]
    fn parses_cycle_names() {
        assert_eq!("biweekly".parse::<ReflectionCycle>().unwrap(), ReflectionCycle::Biweekly);
        assert!("yearly".parse::<ReflectionCycle>().is_err());
    }

    #[test]
    fn parses_day_prefix() {
        assert_eq!(parse_day("2024-03-10T09:00:00+00:00"), Some(d(2024, 3, 10)));
        assert_eq!(parse_day("2024-03-10"), Some(d(2024, 3, 10)));
        assert_eq!(parse_day("soon"), None);
        assert_eq!(week_start(d(2024, 3, 13)), d(2024, 3, 11));
    }
}
