use crate::ipc::error::ok;
use crate::ipc::helpers::{self, get_required_date, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::Partial;
use crate::schedule::{self, DateScope};
use serde_json::json;

/// Stateless: works before any workspace is selected.
fn class_dates(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let start = get_required_date(params, "start")?;
    let end = get_required_date(params, "end")?;
    let names: Vec<&str> = params
        .get("classDays")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("missing classDays"))?
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    let days = schedule::parse_class_days(names)?;
    Ok(json!({ "dates": schedule::class_dates(start, end, &days) }))
}

fn handle_class_dates(req: &Request) -> serde_json::Value {
    match class_dates(&req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn group_dates(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let scope = DateScope::parse(params.get("scope"))?;
    let group = state.classroom.group(&group_id)?;
    let mut dates = schedule::group_dates(&state.classroom.settings, group, scope);
    if let Some(month) = params.get("month").and_then(|v| v.as_str()) {
        let (year, month) = schedule::parse_month_key(month)?;
        dates = schedule::month_dates(&dates, year, month);
    }
    Ok(json!({ "dates": dates }))
}

fn partials(state: &mut AppState, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let settings = &state.classroom.settings;
    let ranges: Vec<serde_json::Value> = Partial::BOTH
        .into_iter()
        .map(|p| {
            let range = schedule::partial_range(settings, p);
            json!({
                "partial": p,
                "start": range.map(|r| r.0),
                "end": range.map(|r| r.1),
            })
        })
        .collect();
    Ok(json!({ "partials": ranges }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.classDates" => Some(handle_class_dates(req)),
        "schedule.groupDates" => Some(helpers::run(state, req, group_dates)),
        "schedule.partials" => Some(helpers::run(state, req, partials)),
        _ => None,
    }
}
