use crate::attendance::AttendanceWrite;
use crate::calc::{self, AttendancePolicy};
use crate::grid::{Cell, CellEdit, GridController, GridKey};
use crate::ipc::helpers::{self, get_as_of, get_required_str, get_usize, HandlerErr};
use crate::ipc::types::{AppState, GridSession, Request};
use crate::schedule::{self, DateScope};
use serde_json::json;

/// Upper bound on cells a single grid may hold.
const GRID_MAX_CELLS: usize = 200_000;

fn no_session() -> HandlerErr {
    HandlerErr::new("no_session", "open an attendance grid first")
}

fn session(state: &AppState) -> Result<&GridSession, HandlerErr> {
    state.grid.as_ref().ok_or_else(no_session)
}

fn cell_param(params: &serde_json::Value) -> Result<Cell, HandlerErr> {
    Ok(Cell::new(get_usize(params, "row")?, get_usize(params, "col")?))
}

fn controller_json(controller: &GridController) -> serde_json::Value {
    json!({
        "focused": controller.focused(),
        "selection": controller.selection(),
        "rect": controller.selection().rect(),
    })
}

/// Full view of the open grid: header rows, the status matrix and the
/// policy-A percentage of every row as of `as_of`.
fn session_json(state: &AppState, as_of: chrono::NaiveDate) -> Result<serde_json::Value, HandlerErr> {
    let s = session(state)?;
    let group = state.classroom.group(&s.group_id)?;
    let attendance = &state.classroom.attendance;

    let mut students = Vec::with_capacity(s.student_ids.len());
    let mut cells = Vec::with_capacity(s.student_ids.len());
    let mut percents = Vec::with_capacity(s.student_ids.len());
    for student_id in &s.student_ids {
        let name = group
            .student(student_id)
            .map(|st| st.name.clone())
            .unwrap_or_default();
        students.push(json!({ "id": student_id, "name": name }));
        cells.push(
            s.dates
                .iter()
                .map(|d| attendance.get(&s.group_id, student_id, *d))
                .collect::<Vec<_>>(),
        );
        percents.push(calc::percent_present(
            attendance.student_record(&s.group_id, student_id),
            &s.dates,
            as_of,
            AttendancePolicy::CalendarGated,
        ));
    }

    Ok(json!({
        "groupId": s.group_id,
        "students": students,
        "dates": s.dates,
        "cells": cells,
        "rowPercents": percents,
        "controller": controller_json(&s.controller),
    }))
}

fn grid_open(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let scope = DateScope::parse(params.get("scope"))?;
    let as_of = get_as_of(state, params)?;
    let group = state.classroom.group(&group_id)?;
    let mut dates = schedule::group_dates(&state.classroom.settings, group, scope);
    if let Some(month) = params.get("month").and_then(|v| v.as_str()) {
        let (year, month) = schedule::parse_month_key(month)?;
        dates = schedule::month_dates(&dates, year, month);
    }
    let student_ids: Vec<String> = group.students.iter().map(|s| s.id.clone()).collect();
    if student_ids.len().saturating_mul(dates.len()) > GRID_MAX_CELLS {
        return Err(HandlerErr {
            code: "bad_params",
            message: "grid too large; narrow the scope or month".to_string(),
            details: Some(json!({
                "rows": student_ids.len(),
                "cols": dates.len(),
                "maxCells": GRID_MAX_CELLS,
            })),
        });
    }
    let controller = GridController::new(student_ids.len(), dates.len());
    tracing::debug!(%group_id, rows = student_ids.len(), cols = dates.len(), "grid opened");
    state.grid = Some(GridSession {
        group_id,
        student_ids,
        dates,
        controller,
    });
    session_json(state, as_of)
}

fn grid_state(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let as_of = get_as_of(state, params)?;
    session_json(state, as_of)
}

fn grid_close(state: &mut AppState, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let closed = state.grid.take().is_some();
    Ok(json!({ "closed": closed }))
}

fn grid_pointer_down(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let cell = cell_param(params)?;
    let s = state.grid.as_mut().ok_or_else(no_session)?;
    let accepted = s.controller.pointer_down(cell);
    Ok(json!({ "accepted": accepted, "controller": controller_json(&s.controller) }))
}

fn grid_pointer_enter(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let cell = cell_param(params)?;
    let s = state.grid.as_mut().ok_or_else(no_session)?;
    let accepted = s.controller.pointer_enter(cell);
    Ok(json!({ "accepted": accepted, "controller": controller_json(&s.controller) }))
}

fn grid_pointer_up(state: &mut AppState, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let s = state.grid.as_mut().ok_or_else(no_session)?;
    s.controller.pointer_up();
    Ok(json!({ "controller": controller_json(&s.controller) }))
}

/// Maps cell edits onto the session's rows/columns, applies them as one
/// batch and persists when anything changed.
fn apply_edits(state: &mut AppState, edits: Vec<CellEdit>) -> Result<serde_json::Value, HandlerErr> {
    let s = session(state)?;
    let group_id = s.group_id.clone();
    let mut writes = Vec::with_capacity(edits.len());
    let mut applied = Vec::with_capacity(edits.len());
    for e in &edits {
        let (Some(student_id), Some(date)) = (s.student_ids.get(e.row), s.dates.get(e.col)) else {
            continue;
        };
        applied.push(json!({
            "row": e.row,
            "col": e.col,
            "studentId": student_id,
            "date": date,
            "status": e.status,
        }));
        writes.push(AttendanceWrite {
            student_id: student_id.clone(),
            date: *date,
            status: e.status,
        });
    }

    let changed = if writes.is_empty() {
        0
    } else {
        let (changed, rejected) = state.classroom.bulk_set_attendance(&group_id, writes)?;
        if !rejected.is_empty() {
            tracing::warn!(%group_id, rejected = rejected.len(), "grid edits hit students no longer in the group");
        }
        changed
    };
    if changed > 0 {
        helpers::persist(state)?;
    }
    let controller = state
        .grid
        .as_ref()
        .map(|s| controller_json(&s.controller))
        .unwrap_or(serde_json::Value::Null);
    Ok(json!({ "edits": applied, "changed": changed, "controller": controller }))
}

fn grid_key(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let raw = get_required_str(params, "key")?;
    let s = state.grid.as_mut().ok_or_else(no_session)?;
    let Some(key) = GridKey::parse(&raw) else {
        return Ok(json!({ "ignored": true, "controller": controller_json(&s.controller) }));
    };
    let edits = s.controller.key(key);
    apply_edits(state, edits)
}

fn grid_context_menu(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let cell = cell_param(params)?;
    let s = session(state)?;
    let edits: Vec<CellEdit> = s.controller.context_menu(cell).into_iter().collect();
    apply_edits(state, edits)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "grid.open" => helpers::run(state, req, grid_open),
        "grid.state" => helpers::run(state, req, grid_state),
        "grid.close" => helpers::run(state, req, grid_close),
        "grid.pointerDown" => helpers::run(state, req, grid_pointer_down),
        "grid.pointerEnter" => helpers::run(state, req, grid_pointer_enter),
        "grid.pointerUp" => helpers::run(state, req, grid_pointer_up),
        "grid.key" => helpers::run(state, req, grid_key),
        "grid.contextMenu" => helpers::run(state, req, grid_context_menu),
        _ => return None,
    };
    Some(resp)
}
