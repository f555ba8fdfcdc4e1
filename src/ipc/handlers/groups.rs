use crate::classroom::{weight_warnings, EvaluationTypeInput, GroupPatch, StudentInput};
use crate::ipc::helpers::{self, get_opt_str, get_partial, get_required_str, parse_value, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{Group, Weekday};
use crate::schedule;
use serde_json::json;
use std::collections::BTreeSet;

fn class_days_param(params: &serde_json::Value) -> Result<Option<BTreeSet<Weekday>>, HandlerErr> {
    let Some(v) = params.get("classDays") else {
        return Ok(None);
    };
    let Some(items) = v.as_array() else {
        return Err(HandlerErr::bad_params("classDays must be an array of weekday names"));
    };
    let mut names = Vec::with_capacity(items.len());
    for item in items {
        let Some(name) = item.as_str() else {
            return Err(HandlerErr::bad_params("classDays must be an array of weekday names"));
        };
        names.push(name);
    }
    Ok(Some(schedule::parse_class_days(names)?))
}

fn group_json(group: &Group) -> serde_json::Value {
    json!({
        "group": group,
        "warnings": weight_warnings(group),
    })
}

fn groups_list(state: &mut AppState, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let groups: Vec<serde_json::Value> = state
        .classroom
        .groups
        .iter()
        .map(|g| {
            json!({
                "id": g.id,
                "name": g.name,
                "subject": g.subject,
                "classDays": g.class_days,
                "studentCount": g.students.len(),
            })
        })
        .collect();
    Ok(json!({ "groups": groups }))
}

fn groups_get(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    Ok(group_json(state.classroom.group(&group_id)?))
}

fn groups_create(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let subject = get_opt_str(params, "subject").unwrap_or_default();
    let class_days = class_days_param(params)?.unwrap_or_default();
    let group = state
        .classroom
        .create_group(get_opt_str(params, "id"), &name, &subject, class_days)?;
    tracing::info!(group_id = %group.id, "group created");
    Ok(group_json(group))
}

fn groups_update(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let patch = GroupPatch {
        name: get_opt_str(params, "name"),
        subject: get_opt_str(params, "subject"),
        class_days: class_days_param(params)?,
    };
    state.classroom.update_group(&group_id, patch)?;
    state.close_sessions(Some(&group_id));
    Ok(group_json(state.classroom.group(&group_id)?))
}

fn groups_delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    state.classroom.delete_group(&group_id)?;
    state.close_sessions(Some(&group_id));
    tracing::info!(%group_id, "group deleted");
    Ok(json!({ "deleted": true }))
}

fn students_add(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let input: StudentInput = parse_value(params, None)?;
    let student = state.classroom.add_student(&group_id, input)?;
    state.close_sessions(Some(&group_id));
    Ok(json!({ "student": student }))
}

fn students_update(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let student_id = get_required_str(params, "studentId")?;
    let matricula = match params.get("matricula") {
        None => None,
        Some(serde_json::Value::Null) => Some(None),
        Some(serde_json::Value::String(s)) => Some(Some(s.clone())),
        Some(_) => return Err(HandlerErr::bad_params("matricula must be a string or null")),
    };
    let student = state.classroom.update_student(
        &group_id,
        &student_id,
        get_opt_str(params, "name"),
        matricula,
    )?;
    Ok(json!({ "student": student }))
}

fn students_remove(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let student_id = get_required_str(params, "studentId")?;
    state.classroom.remove_student(&group_id, &student_id)?;
    state.close_sessions(Some(&group_id));
    Ok(json!({ "removed": true }))
}

fn students_reorder(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let ids: Vec<String> = parse_value(params, Some("studentIds"))?;
    state.classroom.reorder_students(&group_id, &ids)?;
    state.close_sessions(Some(&group_id));
    Ok(json!({ "studentIds": ids }))
}

fn evaluation_types_set(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let partial = get_partial(params, "partial")?;
    let inputs: Vec<EvaluationTypeInput> = parse_value(params, Some("types"))?;
    let removed = state
        .classroom
        .set_evaluation_types(&group_id, partial, inputs)?;
    let group = state.classroom.group(&group_id)?;
    Ok(json!({
        "types": group.evaluation_types.get(partial),
        "removedTypeIds": removed,
        "warnings": weight_warnings(group),
    }))
}

fn evaluation_types_warnings(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    Ok(json!({ "warnings": weight_warnings(state.classroom.group(&group_id)?) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "groups.list" => helpers::run(state, req, groups_list),
        "groups.get" => helpers::run(state, req, groups_get),
        "groups.create" => helpers::mutate(state, req, groups_create),
        "groups.update" => helpers::mutate(state, req, groups_update),
        "groups.delete" => helpers::mutate(state, req, groups_delete),
        "students.add" => helpers::mutate(state, req, students_add),
        "students.update" => helpers::mutate(state, req, students_update),
        "students.remove" => helpers::mutate(state, req, students_remove),
        "students.reorder" => helpers::mutate(state, req, students_reorder),
        "evaluationTypes.set" => helpers::mutate(state, req, evaluation_types_set),
        "evaluationTypes.warnings" => helpers::run(state, req, evaluation_types_warnings),
        _ => return None,
    };
    Some(resp)
}
