use crate::ipc::helpers::{self, get_required_date, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::taker::{pending_queue, AttendanceTaker, TakerKey, TakerPhase};
use serde_json::json;

fn no_session() -> HandlerErr {
    HandlerErr::new("no_session", "start attendance taking first")
}

fn queue_for(state: &AppState, taker: &AttendanceTaker) -> Result<Vec<String>, HandlerErr> {
    let group = state.classroom.group(taker.group_id())?;
    Ok(pending_queue(group, &state.classroom.attendance, taker.date()))
}

fn taker_json(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let taker = state.taker.as_ref().ok_or_else(no_session)?;
    let queue = queue_for(state, taker)?;
    let group = state.classroom.group(taker.group_id())?;
    let current = taker.current(&queue).and_then(|id| group.student(id));
    Ok(json!({
        "groupId": taker.group_id(),
        "date": taker.date(),
        "phase": taker.phase(),
        "currentIndex": taker.current_index(),
        "pendingCount": queue.len(),
        "current": current,
    }))
}

fn taker_open(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let date = get_required_date(params, "date")?;
    let group = state.classroom.group(&group_id)?;
    let queue = pending_queue(group, &state.classroom.attendance, date);
    state.taker = Some(AttendanceTaker::open(&group_id, date, queue.len()));
    tracing::debug!(%group_id, %date, pending = queue.len(), "attendance taker opened");
    taker_json(state)
}

fn taker_state(state: &mut AppState, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    taker_json(state)
}

/// One key press: the queue is recomputed from the live store before and
/// after any write, and the taker re-synced against the fresh length.
fn taker_key(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let raw = get_required_str(params, "key")?;
    let mut taker = state.taker.clone().ok_or_else(no_session)?;
    let Some(key) = TakerKey::parse(&raw) else {
        return taker_json(state);
    };

    let queue = queue_for(state, &taker)?;
    let write = taker.key(key, &queue);
    let mut changed = false;
    if let Some(w) = &write {
        changed = state
            .classroom
            .attendance
            .set(taker.group_id(), &w.student_id, w.date, w.status);
    }
    let queue = queue_for(state, &taker)?;
    taker.sync(queue.len());
    let closed = taker.phase() == TakerPhase::Closed;
    state.taker = Some(taker);
    if changed {
        helpers::persist(state)?;
    }

    let mut view = taker_json(state)?;
    view["written"] = json!(write);
    if closed {
        state.taker = None;
    }
    Ok(view)
}

fn taker_close(state: &mut AppState, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let closed = state.taker.take().is_some();
    Ok(json!({ "closed": closed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "taker.open" => helpers::run(state, req, taker_open),
        "taker.state" => helpers::run(state, req, taker_state),
        "taker.key" => helpers::run(state, req, taker_key),
        "taker.close" => helpers::run(state, req, taker_close),
        _ => return None,
    };
    Some(resp)
}
