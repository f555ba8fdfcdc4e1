use crate::error::{CoreError, CoreResult};
use crate::model::{Group, Partial, Settings, Weekday};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeSet;

/// Which slice of the semester a date sequence covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateScope {
    Semester,
    Partial(Partial),
}

impl DateScope {
    /// `"semester"` / `"all"`, or a partial number (`1`, `2`, `"1"`, `"2"`).
    pub fn parse(raw: Option<&serde_json::Value>) -> CoreResult<Self> {
        let Some(v) = raw else {
            return Ok(DateScope::Semester);
        };
        if v.is_null() {
            return Ok(DateScope::Semester);
        }
        if let Some(n) = v.as_u64() {
            return partial_from_u64(n).map(DateScope::Partial);
        }
        let Some(s) = v.as_str() else {
            return Err(CoreError::bad_params(
                "scope must be 'semester', 1 or 2",
            ));
        };
        let t = s.trim();
        if t.eq_ignore_ascii_case("semester") || t.eq_ignore_ascii_case("all") {
            return Ok(DateScope::Semester);
        }
        match t.parse::<u64>() {
            Ok(n) => partial_from_u64(n).map(DateScope::Partial),
            Err(_) => Err(CoreError::bad_params(
                "scope must be 'semester', 1 or 2",
            )),
        }
    }
}

fn partial_from_u64(n: u64) -> CoreResult<Partial> {
    u8::try_from(n)
        .ok()
        .and_then(|n| Partial::try_from(n).ok())
        .ok_or_else(|| CoreError::bad_params("partial must be 1 or 2"))
}

/// Dates in `[start, end]` whose weekday is in `days`, ascending.
pub fn class_dates(start: NaiveDate, end: NaiveDate, days: &BTreeSet<Weekday>) -> Vec<NaiveDate> {
    if days.is_empty() || end < start {
        return Vec::new();
    }
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| Weekday::of(*d).map(|w| days.contains(&w)).unwrap_or(false))
        .collect()
}

/// Inclusive bounds of a partial, or `None` when the settings don't define it.
pub fn partial_range(settings: &Settings, partial: Partial) -> Option<(NaiveDate, NaiveDate)> {
    match partial {
        Partial::First => Some((settings.semester_start?, settings.first_partial_end?)),
        Partial::Second => Some((
            settings.first_partial_end?.succ_opt()?,
            settings.semester_end?,
        )),
    }
}

pub fn scope_range(settings: &Settings, scope: DateScope) -> Option<(NaiveDate, NaiveDate)> {
    match scope {
        DateScope::Semester => Some((settings.semester_start?, settings.semester_end?)),
        DateScope::Partial(p) => partial_range(settings, p),
    }
}

pub fn group_dates(settings: &Settings, group: &Group, scope: DateScope) -> Vec<NaiveDate> {
    match scope_range(settings, scope) {
        Some((start, end)) => class_dates(start, end, &group.class_days),
        None => Vec::new(),
    }
}

pub fn month_dates(dates: &[NaiveDate], year: i32, month: u32) -> Vec<NaiveDate> {
    dates
        .iter()
        .copied()
        .filter(|d| d.year() == year && d.month() == month)
        .collect()
}

pub fn parse_iso_date(raw: &str) -> CoreResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| CoreError::bad_params(format!("invalid date '{}', expected YYYY-MM-DD", raw)))
}

/// `YYYY-MM` month key.
pub fn parse_month_key(raw: &str) -> CoreResult<(i32, u32)> {
    let t = raw.trim();
    let Some((y, m)) = t.split_once('-') else {
        return Err(CoreError::bad_params("month must be YYYY-MM"));
    };
    let year = y
        .parse::<i32>()
        .map_err(|_| CoreError::bad_params("month year must be numeric"))?;
    let month = m
        .parse::<u32>()
        .map_err(|_| CoreError::bad_params("month must be YYYY-MM"))?;
    if !(1..=12).contains(&month) {
        return Err(CoreError::bad_params("month must be between 01 and 12"));
    }
    Ok((year, month))
}

pub fn parse_class_days<'a, I>(raw: I) -> CoreResult<BTreeSet<Weekday>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = BTreeSet::new();
    for name in raw {
        let Some(day) = Weekday::parse(name) else {
            return Err(CoreError::bad_params(format!(
                "unknown class day '{}' (Monday..Saturday)",
                name
            )));
        };
        out.insert(day);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    fn days(list: &[Weekday]) -> BTreeSet<Weekday> {
        list.iter().copied().collect()
    }

    #[test]
    fn single_day_range_on_matching_weekday() {
        let monday = d(2024, 9, 2);
        assert_eq!(
            class_dates(monday, monday, &days(&[Weekday::Monday])),
            vec![monday]
        );
    }

    #[test]
    fn empty_days_or_inverted_range_yield_nothing() {
        assert!(class_dates(d(2024, 9, 2), d(2024, 9, 30), &BTreeSet::new()).is_empty());
        assert!(class_dates(d(2024, 9, 30), d(2024, 9, 2), &days(&[Weekday::Monday])).is_empty());
    }

    #[test]
    fn dates_are_ascending_unique_and_on_requested_weekdays() {
        let set = days(&[Weekday::Tuesday, Weekday::Thursday]);
        let out = class_dates(d(2024, 9, 1), d(2024, 10, 31), &set);
        assert_eq!(out.len(), 18);
        assert!(out.windows(2).all(|w| w[0] < w[1]));
        assert!(out
            .iter()
            .all(|x| Weekday::of(*x).map(|w| set.contains(&w)).unwrap_or(false)));
        // restartable: same inputs, same output
        assert_eq!(out, class_dates(d(2024, 9, 1), d(2024, 10, 31), &set));
    }

    #[test]
    fn partial_split_is_exclusive_at_first_partial_end() {
        let settings = Settings {
            semester_start: Some(d(2024, 9, 2)),
            first_partial_end: Some(d(2024, 10, 14)),
            semester_end: Some(d(2024, 12, 13)),
        };
        assert_eq!(
            partial_range(&settings, Partial::First),
            Some((d(2024, 9, 2), d(2024, 10, 14)))
        );
        assert_eq!(
            partial_range(&settings, Partial::Second),
            Some((d(2024, 10, 15), d(2024, 12, 13)))
        );

        let group = Group {
            id: "g".into(),
            name: "G".into(),
            subject: String::new(),
            class_days: days(&[Weekday::Monday]),
            students: Vec::new(),
            evaluation_types: Default::default(),
        };
        let p1 = group_dates(&settings, &group, DateScope::Partial(Partial::First));
        let p2 = group_dates(&settings, &group, DateScope::Partial(Partial::Second));
        let all = group_dates(&settings, &group, DateScope::Semester);
        assert_eq!(p1.last(), Some(&d(2024, 10, 14)));
        assert_eq!(p2.first(), Some(&d(2024, 10, 21)));
        assert_eq!(p1.len() + p2.len(), all.len());
    }

    #[test]
    fn missing_settings_give_empty_schedule() {
        let settings = Settings {
            semester_start: Some(d(2024, 9, 2)),
            first_partial_end: None,
            semester_end: Some(d(2024, 12, 13)),
        };
        assert_eq!(partial_range(&settings, Partial::First), None);
        assert_eq!(partial_range(&settings, Partial::Second), None);
        assert!(scope_range(&settings, DateScope::Semester).is_some());
    }

    #[test]
    fn scope_and_month_parsing() {
        assert_eq!(
            DateScope::parse(Some(&serde_json::json!(2))).expect("scope"),
            DateScope::Partial(Partial::Second)
        );
        assert_eq!(
            DateScope::parse(Some(&serde_json::json!("semester"))).expect("scope"),
            DateScope::Semester
        );
        assert!(DateScope::parse(Some(&serde_json::json!(3))).is_err());
        assert_eq!(parse_month_key("2024-09").expect("month"), (2024, 9));
        assert!(parse_month_key("2024-13").is_err());
        assert!(parse_iso_date("2024-02-30").is_err());
    }
}
