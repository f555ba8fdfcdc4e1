use crate::calc::{self, GradeContext};
use crate::error::CoreError;
use crate::grades::EvaluationInput;
use crate::ipc::helpers::{self, get_as_of, get_partial, get_required_str, parse_value, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn evaluations_list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    state.classroom.group(&group_id)?;
    let partial = match params.get("partial") {
        None | Some(serde_json::Value::Null) => None,
        Some(_) => Some(get_partial(params, "partial")?),
    };
    let list: Vec<_> = state
        .classroom
        .grades
        .evaluations(&group_id)
        .iter()
        .filter(|e| partial.map(|p| e.partial == p).unwrap_or(true))
        .collect();
    Ok(json!({ "evaluations": list }))
}

fn evaluations_create(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let input: EvaluationInput = parse_value(params, None)?;
    let group = state.classroom.group(&group_id)?.clone();
    let evaluation = state.classroom.grades.create_evaluation(&group, input)?;
    Ok(json!({ "evaluation": evaluation }))
}

fn evaluations_update(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let evaluation_id = get_required_str(params, "evaluationId")?;
    let input: EvaluationInput = parse_value(params, None)?;
    let group = state.classroom.group(&group_id)?.clone();
    let evaluation = state
        .classroom
        .grades
        .update_evaluation(&group, &evaluation_id, input)?;
    Ok(json!({ "evaluation": evaluation }))
}

fn evaluations_delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let evaluation_id = get_required_str(params, "evaluationId")?;
    state.classroom.group(&group_id)?;
    let removed = state
        .classroom
        .grades
        .delete_evaluation(&group_id, &evaluation_id)?;
    tracing::info!(%group_id, %evaluation_id, removed_grades = removed, "evaluation deleted");
    Ok(json!({ "deleted": true, "removedGrades": removed }))
}

/// `score: null` clears the grade back to "not graded".
fn grades_set(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let student_id = get_required_str(params, "studentId")?;
    let evaluation_id = get_required_str(params, "evaluationId")?;
    let score = match params.get("score") {
        None => return Err(HandlerErr::bad_params("missing score")),
        Some(serde_json::Value::Null) => None,
        Some(v) => Some(
            v.as_f64()
                .ok_or_else(|| HandlerErr::bad_params("score must be a number or null"))?,
        ),
    };
    state
        .classroom
        .set_grade(&group_id, &student_id, &evaluation_id, score)?;
    Ok(json!({ "score": score }))
}

fn grades_get(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let student_id = get_required_str(params, "studentId")?;
    let group = state.classroom.group(&group_id)?;
    if !group.has_student(&student_id) {
        return Err(CoreError::not_found("student", student_id).into());
    }
    let grades = state.classroom.grades.student_grades(&group_id, &student_id);
    Ok(json!({ "grades": grades.cloned().unwrap_or_default() }))
}

fn grades_partial_average(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let student_id = get_required_str(params, "studentId")?;
    let partial = get_partial(params, "partial")?;
    let as_of = get_as_of(state, params)?;
    let classroom = &state.classroom;
    let group = classroom.group(&group_id)?;
    if !group.has_student(&student_id) {
        return Err(CoreError::not_found("student", student_id).into());
    }
    let ctx = GradeContext::new(
        &classroom.settings,
        group,
        &classroom.attendance,
        &classroom.grades,
        as_of,
    );
    Ok(json!(calc::partial_average(&ctx, &student_id, partial)))
}

fn grades_student_averages(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let student_id = get_required_str(params, "studentId")?;
    let as_of = get_as_of(state, params)?;
    let classroom = &state.classroom;
    let group = classroom.group(&group_id)?;
    let ctx = GradeContext::new(
        &classroom.settings,
        group,
        &classroom.attendance,
        &classroom.grades,
        as_of,
    );
    let averages = calc::student_averages(&ctx, &student_id)?;
    Ok(json!(averages))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "evaluations.list" => helpers::run(state, req, evaluations_list),
        "evaluations.create" => helpers::mutate(state, req, evaluations_create),
        "evaluations.update" => helpers::mutate(state, req, evaluations_update),
        "evaluations.delete" => helpers::mutate(state, req, evaluations_delete),
        "grades.set" => helpers::mutate(state, req, grades_set),
        "grades.get" => helpers::run(state, req, grades_get),
        "grades.partialAverage" => helpers::run(state, req, grades_partial_average),
        "grades.studentAverages" => helpers::run(state, req, grades_student_averages),
        _ => return None,
    };
    Some(resp)
}
