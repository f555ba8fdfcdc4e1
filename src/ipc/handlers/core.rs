use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{self, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::Settings;
use crate::schedule;
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "today": state.today().to_string(),
        }),
    )
}

/// Opens (or creates) the workspace database and loads its snapshot. Used by
/// `workspace.select` and by the startup auto-open.
pub fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<usize> {
    let conn = db::open_db(path)?;
    let loaded = db::load_state(&conn)?;
    let group_count = loaded.groups.len();
    state.classroom.replace_with(loaded);
    state.close_sessions(None);
    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    tracing::info!(workspace = %path.to_string_lossy(), groups = group_count, "workspace opened");
    Ok(group_count)
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match open_workspace(state, &path) {
        Ok(group_count) => ok(
            &req.id,
            json!({ "workspacePath": path.to_string_lossy(), "groupCount": group_count }),
        ),
        Err(e) => err(&req.id, "db_open_failed", format!("{e:#}"), None),
    }
}

fn settings_get(state: &mut AppState, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({ "settings": state.classroom.settings }))
}

/// Patch semantics: absent keys keep their value, `null` clears.
fn settings_update(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut next: Settings = state.classroom.settings.clone();
    for (key, slot) in [
        ("semesterStart", &mut next.semester_start),
        ("firstPartialEnd", &mut next.first_partial_end),
        ("semesterEnd", &mut next.semester_end),
    ] {
        match params.get(key) {
            None => {}
            Some(serde_json::Value::Null) => *slot = None,
            Some(serde_json::Value::String(raw)) => *slot = Some(schedule::parse_iso_date(raw)?),
            Some(_) => return Err(HandlerErr::bad_params(format!("{} must be a date or null", key))),
        }
    }
    state.classroom.update_settings(next)?;
    state.close_sessions(None);
    Ok(json!({ "settings": state.classroom.settings }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "settings.get" => Some(helpers::run(state, req, settings_get)),
        "settings.update" => Some(helpers::mutate(state, req, settings_update)),
        _ => None,
    }
}
