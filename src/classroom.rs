use crate::attendance::{AttendanceStore, AttendanceWrite};
use crate::error::{CoreError, CoreResult};
use crate::grades::{validate_score, GradeBook};
use crate::model::{EvaluationType, Group, Partial, Settings, Student, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use uuid::Uuid;

/// The instructor's whole data set. Serializes to plain string-keyed JSON so a
/// snapshot can be saved and restored verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomState {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub attendance: AttendanceStore,
    #[serde(default)]
    pub grades: GradeBook,
    #[serde(skip)]
    roster_version: u64,
}

/// Version stamp of every mutable part of the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateVersion {
    pub roster: u64,
    pub attendance: u64,
    pub grades: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPatch {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub class_days: Option<BTreeSet<Weekday>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInput {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub matricula: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationTypeInput {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub weight: f64,
    #[serde(default)]
    pub is_attendance: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightWarning {
    pub partial: Partial,
    pub code: &'static str,
    pub message: String,
}

/// Non-blocking checks on a group's evaluation types. Weights are never
/// enforced; these only inform the instructor.
pub fn weight_warnings(group: &Group) -> Vec<WeightWarning> {
    let mut out = Vec::new();
    for partial in Partial::BOTH {
        let types = group.evaluation_types.get(partial);
        if types.is_empty() {
            continue;
        }
        let total: f64 = types.iter().map(|t| t.weight).sum();
        if (total - 100.0).abs() > 1e-6 {
            out.push(WeightWarning {
                partial,
                code: "weights_not_100",
                message: format!(
                    "partial {} weights sum to {} instead of 100",
                    partial.number(),
                    total
                ),
            });
        }
        let attendance_types = types.iter().filter(|t| t.is_attendance).count();
        if attendance_types > 1 {
            out.push(WeightWarning {
                partial,
                code: "multiple_attendance_types",
                message: format!(
                    "partial {} has {} attendance types; each is counted",
                    partial.number(),
                    attendance_types
                ),
            });
        }
        for t in types.iter().filter(|t| !(0.0..=100.0).contains(&t.weight)) {
            out.push(WeightWarning {
                partial,
                code: "weight_out_of_range",
                message: format!("type '{}' has weight {} outside 0..100", t.name, t.weight),
            });
        }
    }
    out
}

fn new_id(requested: Option<String>) -> String {
    requested
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn clean_opt(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl ClassroomState {
    pub fn from_parts(
        settings: Settings,
        groups: Vec<Group>,
        attendance: AttendanceStore,
        grades: GradeBook,
    ) -> Self {
        Self {
            settings,
            groups,
            attendance,
            grades,
            roster_version: 0,
        }
    }

    pub fn version(&self) -> StateVersion {
        StateVersion {
            roster: self.roster_version,
            attendance: self.attendance.version(),
            grades: self.grades.version(),
        }
    }

    pub fn group(&self, group_id: &str) -> CoreResult<&Group> {
        self.groups
            .iter()
            .find(|g| g.id == group_id)
            .ok_or_else(|| CoreError::not_found("group", group_id))
    }

    fn group_mut(&mut self, group_id: &str) -> CoreResult<&mut Group> {
        self.groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or_else(|| CoreError::not_found("group", group_id))
    }

    pub fn update_settings(&mut self, settings: Settings) -> CoreResult<()> {
        settings.validate().map_err(CoreError::BadParams)?;
        self.settings = settings;
        self.roster_version += 1;
        Ok(())
    }

    pub fn create_group(
        &mut self,
        id: Option<String>,
        name: &str,
        subject: &str,
        class_days: BTreeSet<Weekday>,
    ) -> CoreResult<&Group> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::bad_params("group name must not be empty"));
        }
        let id = new_id(id);
        if self.groups.iter().any(|g| g.id == id) {
            return Err(CoreError::Duplicate { kind: "group", id });
        }
        self.groups.push(Group {
            id,
            name: name.to_string(),
            subject: subject.trim().to_string(),
            class_days,
            students: Vec::new(),
            evaluation_types: Default::default(),
        });
        self.roster_version += 1;
        Ok(&self.groups[self.groups.len() - 1])
    }

    pub fn update_group(&mut self, group_id: &str, patch: GroupPatch) -> CoreResult<&Group> {
        if let Some(name) = patch.name.as_deref() {
            if name.trim().is_empty() {
                return Err(CoreError::bad_params("group name must not be empty"));
            }
        }
        let group = self.group_mut(group_id)?;
        if let Some(name) = patch.name {
            group.name = name.trim().to_string();
        }
        if let Some(subject) = patch.subject {
            group.subject = subject.trim().to_string();
        }
        if let Some(days) = patch.class_days {
            group.class_days = days;
        }
        self.roster_version += 1;
        self.group(group_id)
    }

    /// Removes the group with its attendance, evaluations and grades.
    pub fn delete_group(&mut self, group_id: &str) -> CoreResult<()> {
        let before = self.groups.len();
        self.groups.retain(|g| g.id != group_id);
        if self.groups.len() == before {
            return Err(CoreError::not_found("group", group_id));
        }
        self.attendance.remove_group(group_id);
        self.grades.remove_group(group_id);
        self.roster_version += 1;
        Ok(())
    }

    pub fn add_student(&mut self, group_id: &str, input: StudentInput) -> CoreResult<Student> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(CoreError::bad_params("student name must not be empty"));
        }
        let group = self.group_mut(group_id)?;
        let id = new_id(input.id);
        if group.has_student(&id) {
            return Err(CoreError::Duplicate { kind: "student", id });
        }
        let student = Student {
            id,
            name,
            matricula: clean_opt(input.matricula),
        };
        group.students.push(student.clone());
        self.roster_version += 1;
        Ok(student)
    }

    pub fn update_student(
        &mut self,
        group_id: &str,
        student_id: &str,
        name: Option<String>,
        matricula: Option<Option<String>>,
    ) -> CoreResult<Student> {
        if let Some(n) = name.as_deref() {
            if n.trim().is_empty() {
                return Err(CoreError::bad_params("student name must not be empty"));
            }
        }
        let group = self.group_mut(group_id)?;
        let Some(student) = group.students.iter_mut().find(|s| s.id == student_id) else {
            return Err(CoreError::not_found("student", student_id));
        };
        if let Some(n) = name {
            student.name = n.trim().to_string();
        }
        if let Some(m) = matricula {
            student.matricula = clean_opt(m);
        }
        let updated = student.clone();
        self.roster_version += 1;
        Ok(updated)
    }

    /// Drops the student together with their attendance and grades.
    pub fn remove_student(&mut self, group_id: &str, student_id: &str) -> CoreResult<()> {
        let group = self.group_mut(group_id)?;
        let before = group.students.len();
        group.students.retain(|s| s.id != student_id);
        if group.students.len() == before {
            return Err(CoreError::not_found("student", student_id));
        }
        self.attendance.remove_student(group_id, student_id);
        self.grades.remove_student(group_id, student_id);
        self.roster_version += 1;
        Ok(())
    }

    /// `ordered_ids` must be a permutation of the current roster.
    pub fn reorder_students(&mut self, group_id: &str, ordered_ids: &[String]) -> CoreResult<()> {
        let group = self.group_mut(group_id)?;
        let current: HashSet<&str> = group.students.iter().map(|s| s.id.as_str()).collect();
        let requested: HashSet<&str> = ordered_ids.iter().map(|s| s.as_str()).collect();
        if ordered_ids.len() != group.students.len() || current != requested {
            return Err(CoreError::bad_params(
                "studentIds must list every student of the group exactly once",
            ));
        }
        let mut reordered = Vec::with_capacity(ordered_ids.len());
        for id in ordered_ids {
            if let Some(s) = group.students.iter().find(|s| &s.id == id) {
                reordered.push(s.clone());
            }
        }
        group.students = reordered;
        self.roster_version += 1;
        Ok(())
    }

    /// Replaces one partial's evaluation types. Types that disappear take
    /// their evaluations and grades with them. Returns the removed type ids.
    pub fn set_evaluation_types(
        &mut self,
        group_id: &str,
        partial: Partial,
        inputs: Vec<EvaluationTypeInput>,
    ) -> CoreResult<Vec<String>> {
        let mut types = Vec::with_capacity(inputs.len());
        let mut seen = HashSet::new();
        for input in inputs {
            let name = input.name.trim().to_string();
            if name.is_empty() {
                return Err(CoreError::bad_params("evaluation type name must not be empty"));
            }
            if !input.weight.is_finite() {
                return Err(CoreError::bad_params("evaluation type weight must be a number"));
            }
            let id = new_id(input.id);
            if !seen.insert(id.clone()) {
                return Err(CoreError::Duplicate {
                    kind: "evaluation type",
                    id,
                });
            }
            types.push(EvaluationType {
                id,
                name,
                weight: input.weight,
                is_attendance: input.is_attendance,
            });
        }

        let group = self.group_mut(group_id)?;
        let removed: Vec<String> = group
            .evaluation_types
            .get(partial)
            .iter()
            .filter(|t| !seen.contains(&t.id))
            .map(|t| t.id.clone())
            .collect();
        *group.evaluation_types.get_mut(partial) = types;
        self.grades
            .delete_evaluations_of_types(group_id, partial, &removed);
        self.roster_version += 1;
        Ok(removed)
    }

    /// Validates every write against the group's roster first, then applies
    /// the accepted ones as one batch. Rejected writes are returned with
    /// their index.
    pub fn bulk_set_attendance(
        &mut self,
        group_id: &str,
        writes: Vec<AttendanceWrite>,
    ) -> CoreResult<(usize, Vec<(usize, CoreError)>)> {
        let group = self.group(group_id)?;
        let mut accepted = Vec::with_capacity(writes.len());
        let mut rejected = Vec::new();
        for (i, w) in writes.into_iter().enumerate() {
            if group.has_student(&w.student_id) {
                accepted.push(w);
            } else {
                rejected.push((i, CoreError::not_found("student", w.student_id)));
            }
        }
        let changed = self.attendance.bulk_set(group_id, &accepted);
        Ok((changed, rejected))
    }

    pub fn set_grade(
        &mut self,
        group_id: &str,
        student_id: &str,
        evaluation_id: &str,
        score: Option<f64>,
    ) -> CoreResult<()> {
        let group = self.group(group_id)?;
        if !group.has_student(student_id) {
            return Err(CoreError::not_found("student", student_id));
        }
        self.grades
            .set_grade(group_id, student_id, evaluation_id, score)
    }

    /// Everything in this snapshot that the mutation paths would have refused:
    /// out-of-order settings, duplicate ids, evaluations without a type in
    /// their partial, out-of-range scores and rows pointing at unknown
    /// groups, students or evaluations. Empty means the snapshot is sound.
    pub fn integrity_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if let Err(e) = self.settings.validate() {
            problems.push(format!("settings: {}", e));
        }

        let mut group_ids = HashSet::new();
        for group in &self.groups {
            if !group_ids.insert(group.id.as_str()) {
                problems.push(format!("duplicate group id '{}'", group.id));
            }
            let mut student_ids = HashSet::new();
            for student in &group.students {
                if !student_ids.insert(student.id.as_str()) {
                    problems.push(format!(
                        "group '{}': duplicate student id '{}'",
                        group.id, student.id
                    ));
                }
            }
            for partial in Partial::BOTH {
                let mut type_ids = HashSet::new();
                for ty in group.evaluation_types.get(partial) {
                    if !type_ids.insert(ty.id.as_str()) {
                        problems.push(format!(
                            "group '{}': duplicate type id '{}' in partial {}",
                            group.id,
                            ty.id,
                            partial.number()
                        ));
                    }
                    if !ty.weight.is_finite() {
                        problems.push(format!(
                            "group '{}': type '{}' has a non-numeric weight",
                            group.id, ty.id
                        ));
                    }
                }
            }
        }

        let mut evaluation_ids = HashSet::new();
        for (group_id, evaluation) in self.grades.all_evaluations() {
            if !evaluation_ids.insert((group_id, evaluation.id.as_str())) {
                problems.push(format!(
                    "group '{}': duplicate evaluation id '{}'",
                    group_id, evaluation.id
                ));
            }
            let Ok(group) = self.group(group_id) else {
                problems.push(format!(
                    "evaluation '{}' belongs to unknown group '{}'",
                    evaluation.id, group_id
                ));
                continue;
            };
            if !evaluation.max_score.is_finite() || evaluation.max_score <= 0.0 {
                problems.push(format!(
                    "evaluation '{}' in group '{}' has maxScore {}",
                    evaluation.id, group_id, evaluation.max_score
                ));
            }
            if group
                .evaluation_type(evaluation.partial, &evaluation.type_id)
                .is_none()
            {
                problems.push(format!(
                    "evaluation '{}' in group '{}' uses type '{}' missing from partial {}",
                    evaluation.id,
                    group_id,
                    evaluation.type_id,
                    evaluation.partial.number()
                ));
            }
        }

        for (group_id, student_id, evaluation_id, score) in self.grades.all_grades() {
            let known_student = self
                .group(group_id)
                .map(|g| g.has_student(student_id))
                .unwrap_or(false);
            if !known_student {
                problems.push(format!(
                    "grade for unknown student '{}' in group '{}'",
                    student_id, group_id
                ));
            }
            match self.grades.evaluation(group_id, evaluation_id) {
                None => problems.push(format!(
                    "grade of '{}' for unknown evaluation '{}' in group '{}'",
                    student_id, evaluation_id, group_id
                )),
                Some(evaluation) => {
                    if let Err(e) = validate_score(score, evaluation.max_score) {
                        problems.push(format!(
                            "grade of '{}' for '{}' in group '{}': {}",
                            student_id, evaluation_id, group_id, e
                        ));
                    }
                }
            }
        }

        for (group_id, student_id, date, _) in self.attendance.entries() {
            let known_student = self
                .group(group_id)
                .map(|g| g.has_student(student_id))
                .unwrap_or(false);
            if !known_student {
                problems.push(format!(
                    "attendance on {} for unknown student '{}' in group '{}'",
                    date, student_id, group_id
                ));
            }
        }
        problems
    }

    /// Swaps in a restored snapshot; all versions move so caches drop.
    pub fn replace_with(&mut self, restored: ClassroomState) {
        let next = self.roster_version + 1;
        let attendance_floor = self.attendance.version();
        let grades_floor = self.grades.version();
        *self = restored;
        self.roster_version = next;
        self.attendance.bump_past(attendance_floor);
        self.grades.bump_past(grades_floor);
    }
}
