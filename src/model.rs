use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Class weekdays, Monday-first. Sunday is never a class day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Weekday {
    pub const ALL: [Weekday; 6] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
    ];

    pub fn of(date: NaiveDate) -> Option<Self> {
        match date.weekday() {
            chrono::Weekday::Mon => Some(Weekday::Monday),
            chrono::Weekday::Tue => Some(Weekday::Tuesday),
            chrono::Weekday::Wed => Some(Weekday::Wednesday),
            chrono::Weekday::Thu => Some(Weekday::Thursday),
            chrono::Weekday::Fri => Some(Weekday::Friday),
            chrono::Weekday::Sat => Some(Weekday::Saturday),
            chrono::Weekday::Sun => None,
        }
    }

    /// Accepts full English names or three-letter abbreviations, any case.
    pub fn parse(raw: &str) -> Option<Self> {
        let t = raw.trim().to_ascii_lowercase();
        Weekday::ALL.into_iter().find(|d| {
            let name = d.as_str().to_ascii_lowercase();
            t == name || (t.len() == 3 && name.starts_with(&t))
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    #[default]
    Pending,
    Present,
    Absent,
    Late,
    Justified,
    Exchange,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 6] = [
        AttendanceStatus::Pending,
        AttendanceStatus::Present,
        AttendanceStatus::Absent,
        AttendanceStatus::Late,
        AttendanceStatus::Justified,
        AttendanceStatus::Exchange,
    ];

    /// Keyboard shortcut used by the grid and the attendance taker.
    /// `Delete`/`Backspace` map to `Pending` (clear).
    pub fn from_hotkey(key: &str) -> Option<Self> {
        match key {
            "Delete" | "Backspace" => return Some(AttendanceStatus::Pending),
            _ => {}
        }
        match key.to_ascii_lowercase().as_str() {
            "p" => Some(AttendanceStatus::Present),
            "a" => Some(AttendanceStatus::Absent),
            "r" => Some(AttendanceStatus::Late),
            "j" => Some(AttendanceStatus::Justified),
            "i" => Some(AttendanceStatus::Exchange),
            _ => None,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let t = raw.trim();
        if t.is_empty() {
            return Some(AttendanceStatus::Pending);
        }
        AttendanceStatus::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(t))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Pending => "pending",
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Justified => "justified",
            AttendanceStatus::Exchange => "exchange",
        }
    }

    pub fn is_pending(self) -> bool {
        self == AttendanceStatus::Pending
    }
}

/// One of the two grading periods of a semester. Serialized as `1` or `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Partial {
    First,
    Second,
}

impl Partial {
    pub const BOTH: [Partial; 2] = [Partial::First, Partial::Second];

    pub fn number(self) -> u8 {
        match self {
            Partial::First => 1,
            Partial::Second => 2,
        }
    }
}

impl TryFrom<u8> for Partial {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Partial::First),
            2 => Ok(Partial::Second),
            other => Err(format!("partial must be 1 or 2, got {}", other)),
        }
    }
}

impl From<Partial> for u8 {
    fn from(p: Partial) -> u8 {
        p.number()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matricula: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationType {
    pub id: String,
    pub name: String,
    pub weight: f64,
    #[serde(default)]
    pub is_attendance: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialTypes {
    #[serde(default)]
    pub partial1: Vec<EvaluationType>,
    #[serde(default)]
    pub partial2: Vec<EvaluationType>,
}

impl PartialTypes {
    pub fn get(&self, partial: Partial) -> &[EvaluationType] {
        match partial {
            Partial::First => &self.partial1,
            Partial::Second => &self.partial2,
        }
    }

    pub fn get_mut(&mut self, partial: Partial) -> &mut Vec<EvaluationType> {
        match partial {
            Partial::First => &mut self.partial1,
            Partial::Second => &mut self.partial2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub class_days: BTreeSet<Weekday>,
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub evaluation_types: PartialTypes,
}

impl Group {
    pub fn student(&self, student_id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == student_id)
    }

    pub fn has_student(&self, student_id: &str) -> bool {
        self.student(student_id).is_some()
    }

    pub fn evaluation_type(&self, partial: Partial, type_id: &str) -> Option<&EvaluationType> {
        self.evaluation_types
            .get(partial)
            .iter()
            .find(|t| t.id == type_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub id: String,
    pub name: String,
    pub max_score: f64,
    pub partial: Partial,
    pub type_id: String,
}

/// Semester calendar. Partial 1 is `[semester_start, first_partial_end]`,
/// partial 2 is `(first_partial_end, semester_end]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub semester_start: Option<NaiveDate>,
    #[serde(default)]
    pub first_partial_end: Option<NaiveDate>,
    #[serde(default)]
    pub semester_end: Option<NaiveDate>,
}

impl Settings {
    pub fn validate(&self) -> Result<(), String> {
        let ordered = |a: Option<NaiveDate>, b: Option<NaiveDate>| match (a, b) {
            (Some(a), Some(b)) => a <= b,
            _ => true,
        };
        if !ordered(self.semester_start, self.first_partial_end) {
            return Err("firstPartialEnd must not be before semesterStart".to_string());
        }
        if !ordered(self.first_partial_end, self.semester_end) {
            return Err("semesterEnd must not be before firstPartialEnd".to_string());
        }
        if !ordered(self.semester_start, self.semester_end) {
            return Err("semesterEnd must not be before semesterStart".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hotkeys_map_to_statuses() {
        assert_eq!(
            AttendanceStatus::from_hotkey("p"),
            Some(AttendanceStatus::Present)
        );
        assert_eq!(
            AttendanceStatus::from_hotkey("R"),
            Some(AttendanceStatus::Late)
        );
        assert_eq!(
            AttendanceStatus::from_hotkey("i"),
            Some(AttendanceStatus::Exchange)
        );
        assert_eq!(
            AttendanceStatus::from_hotkey("Backspace"),
            Some(AttendanceStatus::Pending)
        );
        assert_eq!(AttendanceStatus::from_hotkey("x"), None);
        assert_eq!(AttendanceStatus::from_hotkey("delete"), None);
    }

    #[test]
    fn sunday_is_never_a_class_day() {
        let sunday = NaiveDate::from_ymd_opt(2024, 9, 1).expect("date");
        assert_eq!(Weekday::of(sunday), None);
        let monday = NaiveDate::from_ymd_opt(2024, 9, 2).expect("date");
        assert_eq!(Weekday::of(monday), Some(Weekday::Monday));
    }

    #[test]
    fn weekday_parse_accepts_abbreviations() {
        assert_eq!(Weekday::parse("wed"), Some(Weekday::Wednesday));
        assert_eq!(Weekday::parse(" Saturday "), Some(Weekday::Saturday));
        assert_eq!(Weekday::parse("sunday"), None);
    }

    #[test]
    fn partial_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Partial::Second).expect("ser"), "2");
        let p: Partial = serde_json::from_str("1").expect("de");
        assert_eq!(p, Partial::First);
        assert!(serde_json::from_str::<Partial>("3").is_err());
    }

    #[test]
    fn settings_reject_inverted_partial_split() {
        let s = Settings {
            semester_start: NaiveDate::from_ymd_opt(2024, 9, 1),
            first_partial_end: NaiveDate::from_ymd_opt(2024, 8, 1),
            semester_end: NaiveDate::from_ymd_opt(2024, 12, 20),
        };
        assert!(s.validate().is_err());
        assert!(Settings::default().validate().is_ok());
    }
}
