use crate::calc::{
    self, percent_present, round_off_1_decimal, AttendancePercent, AttendancePolicy, GradeContext,
};
use crate::classroom::{ClassroomState, StateVersion};
use crate::error::{CoreError, CoreResult};
use crate::model::{AttendanceStatus, Partial};
use crate::schedule::{self, DateScope};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRow {
    pub student_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matricula: Option<String>,
    /// Policy A over the whole semester.
    pub attendance: AttendancePercent,
    pub partial1: Option<f64>,
    pub partial2: Option<f64>,
    pub final_average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub group_id: String,
    pub group_name: String,
    pub subject: String,
    pub as_of: NaiveDate,
    pub class_date_count: usize,
    pub rows: Vec<SummaryRow>,
    pub class_final_average: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub justified: usize,
    pub exchange: usize,
    pub pending: usize,
}

impl StatusCounts {
    fn add(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
            AttendanceStatus::Late => self.late += 1,
            AttendanceStatus::Justified => self.justified += 1,
            AttendanceStatus::Exchange => self.exchange += 1,
            AttendanceStatus::Pending => self.pending += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRow {
    pub student_id: String,
    pub name: String,
    /// Policy B: only recorded, non-exchange days count.
    pub attendance: AttendancePercent,
    pub counts: StatusCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySummary {
    pub group_id: String,
    pub month: String,
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<MonthlyRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationStats {
    pub evaluation_id: String,
    pub name: String,
    pub partial: Partial,
    pub max_score: f64,
    pub graded_count: usize,
    pub ungraded_count: usize,
    pub mean_score: Option<f64>,
    pub mean_percent: Option<f64>,
}

pub fn group_summary(
    state: &ClassroomState,
    group_id: &str,
    as_of: NaiveDate,
) -> CoreResult<GroupSummary> {
    let group = state.group(group_id)?;
    let semester = schedule::group_dates(&state.settings, group, DateScope::Semester);
    let ctx = GradeContext::new(
        &state.settings,
        group,
        &state.attendance,
        &state.grades,
        as_of,
    );

    let mut rows = Vec::with_capacity(group.students.len());
    for student in &group.students {
        let averages = calc::student_averages(&ctx, &student.id)?;
        rows.push(SummaryRow {
            student_id: student.id.clone(),
            name: student.name.clone(),
            matricula: student.matricula.clone(),
            attendance: percent_present(
                state.attendance.student_record(group_id, &student.id),
                &semester,
                as_of,
                AttendancePolicy::CalendarGated,
            ),
            partial1: averages.partial1.average,
            partial2: averages.partial2.average,
            final_average: averages.final_average,
        });
    }

    let finals: Vec<f64> = rows.iter().filter_map(|r| r.final_average).collect();
    let class_final_average = if finals.is_empty() {
        None
    } else {
        Some(finals.iter().sum::<f64>() / finals.len() as f64)
    };

    Ok(GroupSummary {
        group_id: group.id.clone(),
        group_name: group.name.clone(),
        subject: group.subject.clone(),
        as_of,
        class_date_count: semester.len(),
        rows,
        class_final_average,
    })
}

pub fn monthly_attendance(
    state: &ClassroomState,
    group_id: &str,
    year: i32,
    month: u32,
) -> CoreResult<MonthlySummary> {
    let group = state.group(group_id)?;
    let semester = schedule::group_dates(&state.settings, group, DateScope::Semester);
    let dates = schedule::month_dates(&semester, year, month);

    let rows = group
        .students
        .iter()
        .map(|student| {
            let record = state.attendance.student_record(group_id, &student.id);
            let mut counts = StatusCounts::default();
            for d in &dates {
                counts.add(record.and_then(|r| r.get(d)).copied().unwrap_or_default());
            }
            // as_of is not consulted under the recorded-gated policy
            let attendance =
                percent_present(record, &dates, NaiveDate::MAX, AttendancePolicy::RecordedGated);
            MonthlyRow {
                student_id: student.id.clone(),
                name: student.name.clone(),
                attendance,
                counts,
            }
        })
        .collect();

    Ok(MonthlySummary {
        group_id: group.id.clone(),
        month: format!("{:04}-{:02}", year, month),
        dates,
        rows,
    })
}

pub fn evaluation_stats(
    state: &ClassroomState,
    group_id: &str,
    evaluation_id: &str,
) -> CoreResult<EvaluationStats> {
    let group = state.group(group_id)?;
    let Some(evaluation) = state.grades.evaluation(group_id, evaluation_id) else {
        return Err(CoreError::not_found("evaluation", evaluation_id));
    };
    let scores: Vec<f64> = group
        .students
        .iter()
        .filter_map(|s| state.grades.grade(group_id, &s.id, evaluation_id))
        .collect();
    let graded_count = scores.len();
    let mean_score = if graded_count > 0 {
        Some(scores.iter().sum::<f64>() / graded_count as f64)
    } else {
        None
    };
    let mean_percent = mean_score.map(|m| round_off_1_decimal(100.0 * m / evaluation.max_score));

    Ok(EvaluationStats {
        evaluation_id: evaluation.id.clone(),
        name: evaluation.name.clone(),
        partial: evaluation.partial,
        max_score: evaluation.max_score,
        graded_count,
        ungraded_count: group.students.len() - graded_count,
        mean_score,
        mean_percent,
    })
}

/// Group summaries memoized per `(group, as_of)` and stamped with the state
/// version they were computed from. Any mutation moves the version, so a hit
/// is always current.
#[derive(Debug, Default)]
pub struct ReportCache {
    summaries: HashMap<(String, NaiveDate), (StateVersion, GroupSummary)>,
}

impl ReportCache {
    pub fn group_summary(
        &mut self,
        state: &ClassroomState,
        group_id: &str,
        as_of: NaiveDate,
    ) -> CoreResult<GroupSummary> {
        let version = state.version();
        let key = (group_id.to_string(), as_of);
        if let Some((stamp, cached)) = self.summaries.get(&key) {
            if *stamp == version {
                tracing::debug!(group_id, %as_of, "group summary cache hit");
                return Ok(cached.clone());
            }
        }
        let summary = group_summary(state, group_id, as_of)?;
        self.summaries.retain(|_, (stamp, _)| *stamp == version);
        self.summaries.insert(key, (version, summary.clone()));
        Ok(summary)
    }
}
