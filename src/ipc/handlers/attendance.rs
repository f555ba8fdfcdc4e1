use crate::attendance::AttendanceWrite;
use crate::calc::{self, AttendancePolicy};
use crate::error::CoreError;
use crate::ipc::helpers::{self, get_as_of, get_required_date, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::AttendanceStatus;
use crate::schedule::{self, DateScope};
use serde_json::json;

fn parse_status(raw: &str) -> Result<AttendanceStatus, HandlerErr> {
    AttendanceStatus::parse(raw)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown attendance status '{}'", raw)))
}

fn attendance_get(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let student_id = get_required_str(params, "studentId")?;
    let date = get_required_date(params, "date")?;
    let group = state.classroom.group(&group_id)?;
    if !group.has_student(&student_id) {
        return Err(CoreError::not_found("student", student_id).into());
    }
    let status = state.classroom.attendance.get(&group_id, &student_id, date);
    Ok(json!({ "status": status }))
}

/// The student's non-pending entries, optionally narrowed to a scope.
fn attendance_record(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let student_id = get_required_str(params, "studentId")?;
    let group = state.classroom.group(&group_id)?;
    if !group.has_student(&student_id) {
        return Err(CoreError::not_found("student", student_id).into());
    }
    let bounds = match params.get("scope") {
        None => None,
        Some(v) => schedule::scope_range(&state.classroom.settings, DateScope::parse(Some(v))?),
    };
    let mut entries = serde_json::Map::new();
    if let Some(record) = state.classroom.attendance.student_record(&group_id, &student_id) {
        for (date, status) in record {
            if let Some((start, end)) = bounds {
                if *date < start || *date > end {
                    continue;
                }
            }
            entries.insert(date.to_string(), json!(status));
        }
    }
    Ok(json!({ "entries": entries }))
}

fn attendance_set(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let student_id = get_required_str(params, "studentId")?;
    let date = get_required_date(params, "date")?;
    let status = parse_status(&get_required_str(params, "status")?)?;
    let group = state.classroom.group(&group_id)?;
    if !group.has_student(&student_id) {
        return Err(CoreError::not_found("student", student_id).into());
    }
    let changed = state
        .classroom
        .attendance
        .set(&group_id, &student_id, date, status);
    Ok(json!({ "changed": changed, "status": status }))
}

/// Each record is validated on its own; malformed or unknown ones come back
/// in `rejected` and the rest are applied as one batch.
fn attendance_bulk_set(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let Some(records) = params.get("records").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing records"));
    };

    let mut writes = Vec::with_capacity(records.len());
    let mut index_of = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();
    for (i, record) in records.iter().enumerate() {
        let parsed = get_required_str(record, "studentId").and_then(|student_id| {
            let date = get_required_date(record, "date")?;
            let status = parse_status(&get_required_str(record, "status")?)?;
            Ok(AttendanceWrite {
                student_id,
                date,
                status,
            })
        });
        match parsed {
            Ok(w) => {
                index_of.push(i);
                writes.push(w);
            }
            Err(e) => rejected.push(json!({ "index": i, "code": e.code, "message": e.message })),
        }
    }

    let applied_candidates = writes.len();
    let (changed, unknown) = state.classroom.bulk_set_attendance(&group_id, writes)?;
    for (pos, e) in &unknown {
        rejected.push(json!({
            "index": index_of[*pos],
            "code": e.code(),
            "message": e.to_string(),
        }));
    }
    rejected.sort_by_key(|r| r["index"].as_u64().unwrap_or(u64::MAX));
    if !rejected.is_empty() {
        tracing::warn!(%group_id, rejected = rejected.len(), "attendance bulk set rejected records");
    }
    Ok(json!({
        "applied": applied_candidates - unknown.len(),
        "changed": changed,
        "rejected": rejected,
    }))
}

fn attendance_percent(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let student_id = get_required_str(params, "studentId")?;
    let scope = DateScope::parse(params.get("scope"))?;
    let policy = match params.get("policy").and_then(|v| v.as_str()) {
        None => AttendancePolicy::CalendarGated,
        Some(raw) => AttendancePolicy::parse(raw)
            .ok_or_else(|| HandlerErr::bad_params(format!("unknown policy '{}'", raw)))?,
    };
    let as_of = get_as_of(state, params)?;
    let group = state.classroom.group(&group_id)?;
    if !group.has_student(&student_id) {
        return Err(CoreError::not_found("student", student_id).into());
    }
    let mut dates = schedule::group_dates(&state.classroom.settings, group, scope);
    if let Some(month) = params.get("month").and_then(|v| v.as_str()) {
        let (year, month) = schedule::parse_month_key(month)?;
        dates = schedule::month_dates(&dates, year, month);
    }
    let pct = calc::percent_present(
        state.classroom.attendance.student_record(&group_id, &student_id),
        &dates,
        as_of,
        policy,
    );
    Ok(json!({ "policy": policy, "asOf": as_of, "attendance": pct }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.get" => Some(helpers::run(state, req, attendance_get)),
        "attendance.record" => Some(helpers::run(state, req, attendance_record)),
        "attendance.set" => Some(helpers::mutate(state, req, attendance_set)),
        "attendance.bulkSet" => Some(helpers::mutate(state, req, attendance_bulk_set)),
        "attendance.percent" => Some(helpers::run(state, req, attendance_percent)),
        _ => None,
    }
}
