use crate::db;
use crate::error::CoreError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::Partial;
use crate::schedule;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<CoreError> for HandlerErr {
    fn from(e: CoreError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
            details: e.details(),
        }
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_opt_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn get_required_date(params: &serde_json::Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    let raw = get_required_str(params, key)?;
    Ok(schedule::parse_iso_date(&raw)?)
}

/// `params.asOf` when given, otherwise the sidecar's notion of today.
pub fn get_as_of(state: &AppState, params: &serde_json::Value) -> Result<NaiveDate, HandlerErr> {
    match params.get("asOf") {
        None | Some(serde_json::Value::Null) => Ok(state.today()),
        Some(_) => get_required_date(params, "asOf"),
    }
}

pub fn get_partial(params: &serde_json::Value, key: &str) -> Result<Partial, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .and_then(|n| u8::try_from(n).ok())
        .and_then(|n| Partial::try_from(n).ok())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be 1 or 2", key)))
}

pub fn get_usize(params: &serde_json::Value, key: &str) -> Result<usize, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .ok_or_else(|| HandlerErr::bad_params(format!("missing or invalid {}", key)))
}

/// Deserializes `params[key]` (or the whole params object for `None`).
pub fn parse_value<T: DeserializeOwned>(
    params: &serde_json::Value,
    key: Option<&str>,
) -> Result<T, HandlerErr> {
    let v = match key {
        Some(k) => params
            .get(k)
            .cloned()
            .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", k)))?,
        None => params.clone(),
    };
    serde_json::from_value(v).map_err(|e| {
        HandlerErr::bad_params(match key {
            Some(k) => format!("invalid {}: {}", k, e),
            None => format!("invalid params: {}", e),
        })
    })
}

fn no_workspace(id: &str) -> serde_json::Value {
    err(id, "no_workspace", "select a workspace first", None)
}

/// Runs a handler body that does not need persisting once a workspace is open.
pub fn run<F>(state: &mut AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&mut AppState, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
{
    if state.db.is_none() {
        return no_workspace(&req.id);
    }
    match f(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

/// Runs a mutating handler body and, on success, persists the snapshot. If
/// the save fails the in-memory state is reloaded from the database so the
/// two never diverge.
pub fn mutate<F>(state: &mut AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&mut AppState, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
{
    if state.db.is_none() {
        return no_workspace(&req.id);
    }
    let result = match f(state, &req.params) {
        Ok(result) => result,
        Err(error) => return error.response(&req.id),
    };
    if let Err(error) = persist(state) {
        return error.response(&req.id);
    }
    ok(&req.id, result)
}

pub fn persist(state: &mut AppState) -> Result<(), HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let Err(e) = db::save_state(conn, &state.classroom) else {
        return Ok(());
    };
    tracing::error!(error = ?e, "failed to persist classroom snapshot");
    match db::load_state(conn) {
        Ok(restored) => {
            state.classroom.replace_with(restored);
            state.close_sessions(None);
        }
        Err(reload) => tracing::error!(error = ?reload, "failed to reload snapshot after save error"),
    }
    Err(HandlerErr::new("db_update_failed", format!("{e:#}")))
}
