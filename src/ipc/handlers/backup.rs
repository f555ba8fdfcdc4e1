use crate::backup;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn path_param(req: &Request, key: &str) -> Option<String> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn handle_backup_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(out_path) = path_param(req, "outPath") else {
        return err(&req.id, "bad_params", "missing outPath", None);
    };
    if state.db.is_none() {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    }

    let out = PathBuf::from(&out_path);
    match backup::export_snapshot_bundle(&state.classroom, &out) {
        Ok(export) => ok(
            &req.id,
            json!({
                "path": out_path,
                "bundleFormat": export.bundle_format,
                "entryCount": export.entry_count,
                "sha256": export.sha256,
            }),
        ),
        Err(e) => err(
            &req.id,
            "backup_export_failed",
            format!("{e:#}"),
            Some(json!({ "path": out_path })),
        ),
    }
}

/// Replaces the live snapshot with the bundle's and persists it. A bundle
/// that fails validation leaves everything untouched.
fn handle_backup_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(in_path) = path_param(req, "inPath") else {
        return err(&req.id, "bad_params", "missing inPath", None);
    };
    if state.db.is_none() {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    }

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": in_path })),
        );
    }

    let (restored, summary) = match backup::import_snapshot_bundle(&src) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(path = %in_path, error = %format!("{e:#}"), "bundle rejected");
            let details = match e.downcast_ref::<backup::SnapshotRejected>() {
                Some(rejected) => json!({ "path": in_path, "problems": rejected.problems }),
                None => json!({ "path": in_path }),
            };
            return err(&req.id, "backup_import_failed", format!("{e:#}"), Some(details));
        }
    };

    state.classroom.replace_with(restored);
    state.close_sessions(None);
    if let Err(e) = helpers::persist(state) {
        return e.response(&req.id);
    }
    ok(
        &req.id,
        json!({
            "bundleFormatDetected": summary.bundle_format_detected,
            "groupCount": summary.group_count,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.export" => Some(handle_backup_export(state, req)),
        "backup.import" => Some(handle_backup_import(state, req)),
        _ => None,
    }
}
