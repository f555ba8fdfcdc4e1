use crate::ipc::helpers::{self, get_as_of, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::reports;
use crate::schedule;
use serde_json::json;

fn group_summary(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let as_of = get_as_of(state, params)?;
    let summary = state
        .reports
        .group_summary(&state.classroom, &group_id, as_of)?;
    Ok(json!(summary))
}

fn monthly_attendance(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let (year, month) = schedule::parse_month_key(&get_required_str(params, "month")?)?;
    let summary = reports::monthly_attendance(&state.classroom, &group_id, year, month)?;
    Ok(json!(summary))
}

fn evaluation_stats(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let evaluation_id = get_required_str(params, "evaluationId")?;
    let stats = reports::evaluation_stats(&state.classroom, &group_id, &evaluation_id)?;
    Ok(json!(stats))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.groupSummary" => Some(helpers::run(state, req, group_summary)),
        "reports.monthlyAttendance" => Some(helpers::run(state, req, monthly_attendance)),
        "reports.evaluationStats" => Some(helpers::run(state, req, evaluation_stats)),
        _ => None,
    }
}
