use crate::attendance::{AttendanceStore, StudentAttendance};
use crate::error::{CoreError, CoreResult};
use crate::grades::{GradeBook, StudentGrades};
use crate::model::{AttendanceStatus, Evaluation, Group, Partial, Settings};
use crate::schedule::{self, DateScope};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 1-decimal rounding for display values: `Int(10*x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

/// How an attendance percentage is computed. Every call site names the one it
/// uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttendancePolicy {
    /// Policy A. Every class date up to `as_of` counts; Exchange is present.
    CalendarGated,
    /// Policy B. Only dates with a recorded status count; Exchange is left out
    /// of both sides; `as_of` is ignored.
    RecordedGated,
}

impl AttendancePolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "a" | "calendargated" | "calendar" => Some(AttendancePolicy::CalendarGated),
            "b" | "recordedgated" | "recorded" => Some(AttendancePolicy::RecordedGated),
            _ => None,
        }
    }

    fn counts(self, date: NaiveDate, status: AttendanceStatus, as_of: NaiveDate) -> bool {
        match self {
            AttendancePolicy::CalendarGated => date <= as_of,
            AttendancePolicy::RecordedGated => !matches!(
                status,
                AttendanceStatus::Pending | AttendanceStatus::Exchange
            ),
        }
    }

    fn is_present(self, status: AttendanceStatus) -> bool {
        match self {
            AttendancePolicy::CalendarGated => matches!(
                status,
                AttendanceStatus::Present
                    | AttendanceStatus::Late
                    | AttendanceStatus::Justified
                    | AttendanceStatus::Exchange
            ),
            AttendancePolicy::RecordedGated => matches!(
                status,
                AttendanceStatus::Present | AttendanceStatus::Late | AttendanceStatus::Justified
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendancePercent {
    pub percent: u32,
    pub has_data: bool,
    pub present: usize,
    pub total: usize,
}

/// Percentage of counted dates with a present-like status. With nothing to
/// count the result is a vacuous 100 with `has_data = false`.
pub fn percent_present(
    record: Option<&StudentAttendance>,
    dates: &[NaiveDate],
    as_of: NaiveDate,
    policy: AttendancePolicy,
) -> AttendancePercent {
    let mut present = 0_usize;
    let mut total = 0_usize;
    for date in dates {
        let status = record
            .and_then(|r| r.get(date))
            .copied()
            .unwrap_or_default();
        if !policy.counts(*date, status, as_of) {
            continue;
        }
        total += 1;
        if policy.is_present(status) {
            present += 1;
        }
    }

    if total == 0 {
        return AttendancePercent {
            percent: 100,
            has_data: false,
            present,
            total,
        };
    }
    let percent = (100.0 * present as f64 / total as f64).round() as u32;
    AttendancePercent {
        percent,
        has_data: true,
        present,
        total,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentContribution {
    pub type_id: String,
    pub name: String,
    pub weight: f64,
    pub is_attendance: bool,
    /// Weighted points earned, or `None` when the type was left out.
    pub contribution: Option<f64>,
    pub graded_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialAverage {
    pub partial: Partial,
    /// 0–10 scale; `None` when nothing has been graded yet.
    pub average: Option<f64>,
    pub accumulated_weight: f64,
    pub components: Vec<ComponentContribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAverages {
    pub student_id: String,
    pub partial1: PartialAverage,
    pub partial2: PartialAverage,
    pub final_average: Option<f64>,
}

/// Everything the grade aggregator reads for one group, borrowed from a
/// snapshot.
#[derive(Debug, Clone)]
pub struct GradeContext<'a> {
    pub settings: &'a Settings,
    pub group: &'a Group,
    pub evaluations: &'a [Evaluation],
    pub attendance: &'a AttendanceStore,
    pub grades: &'a GradeBook,
    pub as_of: NaiveDate,
}

impl<'a> GradeContext<'a> {
    pub fn new(
        settings: &'a Settings,
        group: &'a Group,
        attendance: &'a AttendanceStore,
        grades: &'a GradeBook,
        as_of: NaiveDate,
    ) -> Self {
        Self {
            settings,
            group,
            evaluations: grades.evaluations(&group.id),
            attendance,
            grades,
            as_of,
        }
    }

    fn student_grades(&self, student_id: &str) -> Option<&'a StudentGrades> {
        self.grades.student_grades(&self.group.id, student_id)
    }

    fn student_attendance(&self, student_id: &str) -> Option<&'a StudentAttendance> {
        self.attendance.student_record(&self.group.id, student_id)
    }
}

/// Weighted average of one partial. Types without any graded evaluation are
/// excluded and the rest re-normalized over the weight that did count; the
/// attendance type always counts.
pub fn partial_average(ctx: &GradeContext<'_>, student_id: &str, partial: Partial) -> PartialAverage {
    let grades = ctx.student_grades(student_id);
    let mut sum = 0.0_f64;
    let mut accumulated_weight = 0.0_f64;
    let mut components = Vec::new();

    for ty in ctx.group.evaluation_types.get(partial) {
        if ty.is_attendance {
            let dates = schedule::group_dates(ctx.settings, ctx.group, DateScope::Partial(partial));
            let pct = percent_present(
                ctx.student_attendance(student_id),
                &dates,
                ctx.as_of,
                AttendancePolicy::CalendarGated,
            );
            let contribution = (pct.percent as f64 / 100.0) * ty.weight;
            sum += contribution;
            accumulated_weight += ty.weight;
            components.push(ComponentContribution {
                type_id: ty.id.clone(),
                name: ty.name.clone(),
                weight: ty.weight,
                is_attendance: true,
                contribution: Some(contribution),
                graded_count: pct.total,
            });
            continue;
        }

        let mut score_sum = 0.0_f64;
        let mut max_sum = 0.0_f64;
        let mut graded_count = 0_usize;
        for evaluation in ctx
            .evaluations
            .iter()
            .filter(|e| e.partial == partial && e.type_id == ty.id)
        {
            let Some(score) = grades.and_then(|g| g.get(&evaluation.id)) else {
                continue;
            };
            score_sum += *score;
            max_sum += evaluation.max_score;
            graded_count += 1;
        }

        let contribution = if graded_count > 0 && max_sum > 0.0 {
            let c = (score_sum / max_sum) * ty.weight;
            sum += c;
            accumulated_weight += ty.weight;
            Some(c)
        } else {
            None
        };
        components.push(ComponentContribution {
            type_id: ty.id.clone(),
            name: ty.name.clone(),
            weight: ty.weight,
            is_attendance: false,
            contribution,
            graded_count,
        });
    }

    let average = if accumulated_weight > 0.0 {
        Some((sum / accumulated_weight) * 10.0)
    } else {
        None
    };
    PartialAverage {
        partial,
        average,
        accumulated_weight,
        components,
    }
}

pub fn final_average(partial1: Option<f64>, partial2: Option<f64>) -> Option<f64> {
    match (partial1, partial2) {
        (Some(a), Some(b)) => Some((a + b) / 2.0),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

pub fn student_averages(ctx: &GradeContext<'_>, student_id: &str) -> CoreResult<StudentAverages> {
    if !ctx.group.has_student(student_id) {
        return Err(CoreError::not_found("student", student_id));
    }
    let partial1 = partial_average(ctx, student_id, Partial::First);
    let partial2 = partial_average(ctx, student_id, Partial::Second);
    let final_average = final_average(partial1.average, partial2.average);
    Ok(StudentAverages {
        student_id: student_id.to_string(),
        partial1,
        partial2,
        final_average,
    })
}
