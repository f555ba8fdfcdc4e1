use crate::error::{CoreError, CoreResult};
use crate::model::{Evaluation, Group, Partial};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type StudentGrades = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationInput {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub max_score: f64,
    pub partial: Partial,
    pub type_id: String,
}

/// Evaluations per group plus the sparse `group -> student -> evaluation -> score`
/// map. A missing score means "not graded yet".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBook {
    #[serde(default)]
    evaluations: BTreeMap<String, Vec<Evaluation>>,
    #[serde(default)]
    grades: BTreeMap<String, BTreeMap<String, StudentGrades>>,
    #[serde(skip)]
    version: u64,
}

pub fn validate_score(score: f64, max_score: f64) -> CoreResult<()> {
    if !score.is_finite() || score < 0.0 || score > max_score {
        return Err(CoreError::InvalidScore { score, max_score });
    }
    Ok(())
}

fn validate_input(group: &Group, input: &EvaluationInput) -> CoreResult<()> {
    if input.name.trim().is_empty() {
        return Err(CoreError::bad_params("evaluation name must not be empty"));
    }
    if !input.max_score.is_finite() || input.max_score <= 0.0 {
        return Err(CoreError::bad_params("maxScore must be > 0"));
    }
    if group.evaluation_type(input.partial, &input.type_id).is_none() {
        return Err(CoreError::not_found("evaluation type", input.type_id.clone()));
    }
    Ok(())
}

impl GradeBook {
    pub fn evaluations(&self, group_id: &str) -> &[Evaluation] {
        self.evaluations
            .get(group_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn evaluation(&self, group_id: &str, evaluation_id: &str) -> Option<&Evaluation> {
        self.evaluations(group_id)
            .iter()
            .find(|e| e.id == evaluation_id)
    }

    pub fn create_evaluation(
        &mut self,
        group: &Group,
        input: EvaluationInput,
    ) -> CoreResult<Evaluation> {
        validate_input(group, &input)?;
        let id = input
            .id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.evaluation(&group.id, &id).is_some() {
            return Err(CoreError::Duplicate {
                kind: "evaluation",
                id,
            });
        }
        let evaluation = Evaluation {
            id,
            name: input.name.trim().to_string(),
            max_score: input.max_score,
            partial: input.partial,
            type_id: input.type_id,
        };
        self.evaluations
            .entry(group.id.clone())
            .or_default()
            .push(evaluation.clone());
        self.version += 1;
        Ok(evaluation)
    }

    /// Lowering `maxScore` below a score already recorded is rejected so the
    /// grade record never holds an out-of-range value.
    pub fn update_evaluation(
        &mut self,
        group: &Group,
        evaluation_id: &str,
        input: EvaluationInput,
    ) -> CoreResult<Evaluation> {
        validate_input(group, &input)?;
        if self.evaluation(&group.id, evaluation_id).is_none() {
            return Err(CoreError::not_found("evaluation", evaluation_id));
        }
        if let Some(students) = self.grades.get(&group.id) {
            for score in students.values().filter_map(|g| g.get(evaluation_id)) {
                validate_score(*score, input.max_score)?;
            }
        }
        let Some(slot) = self
            .evaluations
            .get_mut(&group.id)
            .and_then(|v| v.iter_mut().find(|e| e.id == evaluation_id))
        else {
            return Err(CoreError::not_found("evaluation", evaluation_id));
        };
        slot.name = input.name.trim().to_string();
        slot.max_score = input.max_score;
        slot.partial = input.partial;
        slot.type_id = input.type_id;
        let updated = slot.clone();
        self.version += 1;
        Ok(updated)
    }

    /// Deletes the evaluation and every grade referencing it. Returns the
    /// number of grades removed.
    pub fn delete_evaluation(&mut self, group_id: &str, evaluation_id: &str) -> CoreResult<usize> {
        let Some(list) = self.evaluations.get_mut(group_id) else {
            return Err(CoreError::not_found("evaluation", evaluation_id));
        };
        let before = list.len();
        list.retain(|e| e.id != evaluation_id);
        if list.len() == before {
            return Err(CoreError::not_found("evaluation", evaluation_id));
        }
        if list.is_empty() {
            self.evaluations.remove(group_id);
        }
        let removed = self.remove_grades_for(group_id, |id| id == evaluation_id);
        self.version += 1;
        Ok(removed)
    }

    /// Cascade used when evaluation types are removed from a partial. Type ids
    /// are only unique within a partial, so the other partial is never touched.
    pub fn delete_evaluations_of_types(
        &mut self,
        group_id: &str,
        partial: Partial,
        type_ids: &[String],
    ) -> usize {
        let Some(list) = self.evaluations.get_mut(group_id) else {
            return 0;
        };
        let doomed: Vec<String> = list
            .iter()
            .filter(|e| e.partial == partial && type_ids.contains(&e.type_id))
            .map(|e| e.id.clone())
            .collect();
        if doomed.is_empty() {
            return 0;
        }
        list.retain(|e| !doomed.contains(&e.id));
        if list.is_empty() {
            self.evaluations.remove(group_id);
        }
        self.remove_grades_for(group_id, |id| doomed.iter().any(|d| d == id));
        self.version += 1;
        doomed.len()
    }

    fn remove_grades_for<F>(&mut self, group_id: &str, matches: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let Some(students) = self.grades.get_mut(group_id) else {
            return 0;
        };
        let mut removed = 0;
        for grades in students.values_mut() {
            let before = grades.len();
            grades.retain(|id, _| !matches(id.as_str()));
            removed += before - grades.len();
        }
        students.retain(|_, g| !g.is_empty());
        if students.is_empty() {
            self.grades.remove(group_id);
        }
        removed
    }

    pub fn grade(&self, group_id: &str, student_id: &str, evaluation_id: &str) -> Option<f64> {
        self.student_grades(group_id, student_id)?
            .get(evaluation_id)
            .copied()
    }

    pub fn student_grades(&self, group_id: &str, student_id: &str) -> Option<&StudentGrades> {
        self.grades.get(group_id)?.get(student_id)
    }

    /// `None` clears the grade. Out-of-range scores are rejected before the
    /// record is touched.
    pub fn set_grade(
        &mut self,
        group_id: &str,
        student_id: &str,
        evaluation_id: &str,
        score: Option<f64>,
    ) -> CoreResult<()> {
        let Some(evaluation) = self.evaluation(group_id, evaluation_id) else {
            return Err(CoreError::not_found("evaluation", evaluation_id));
        };
        match score {
            Some(score) => {
                validate_score(score, evaluation.max_score)?;
                self.grades
                    .entry(group_id.to_string())
                    .or_default()
                    .entry(student_id.to_string())
                    .or_default()
                    .insert(evaluation_id.to_string(), score);
            }
            None => {
                let Some(students) = self.grades.get_mut(group_id) else {
                    return Ok(());
                };
                if let Some(g) = students.get_mut(student_id) {
                    g.remove(evaluation_id);
                    if g.is_empty() {
                        students.remove(student_id);
                    }
                }
                if students.is_empty() {
                    self.grades.remove(group_id);
                }
            }
        }
        self.version += 1;
        Ok(())
    }

    pub fn remove_student(&mut self, group_id: &str, student_id: &str) {
        let Some(students) = self.grades.get_mut(group_id) else {
            return;
        };
        if students.remove(student_id).is_some() {
            self.version += 1;
        }
        if students.is_empty() {
            self.grades.remove(group_id);
        }
    }

    pub fn remove_group(&mut self, group_id: &str) {
        let had_evaluations = self.evaluations.remove(group_id).is_some();
        let had_grades = self.grades.remove(group_id).is_some();
        if had_evaluations || had_grades {
            self.version += 1;
        }
    }

    pub fn all_evaluations(&self) -> impl Iterator<Item = (&str, &Evaluation)> {
        self.evaluations
            .iter()
            .flat_map(|(g, list)| list.iter().map(move |e| (g.as_str(), e)))
    }

    pub fn all_grades(&self) -> impl Iterator<Item = (&str, &str, &str, f64)> {
        self.grades.iter().flat_map(|(g, students)| {
            students.iter().flat_map(move |(s, grades)| {
                grades
                    .iter()
                    .map(move |(e, score)| (g.as_str(), s.as_str(), e.as_str(), *score))
            })
        })
    }

    /// Rebuilds a book from persisted rows without bumping versions.
    pub fn from_parts(
        evaluations: BTreeMap<String, Vec<Evaluation>>,
        grades: BTreeMap<String, BTreeMap<String, StudentGrades>>,
    ) -> Self {
        Self {
            evaluations,
            grades,
            version: 0,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Moves the version strictly past `floor`, used when a restored snapshot
    /// replaces live state.
    pub fn bump_past(&mut self, floor: u64) {
        self.version = self.version.max(floor) + 1;
    }
}
