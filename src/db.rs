use crate::attendance::AttendanceStore;
use crate::classroom::ClassroomState;
use crate::grades::{GradeBook, StudentGrades};
use crate::model::{
    AttendanceStatus, Evaluation, EvaluationType, Group, Partial, PartialTypes, Settings, Student,
    Weekday,
};
use anyhow::Context;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

pub const DB_FILE: &str = "classbook.sqlite3";
const SETTINGS_KEY_SEMESTER: &str = "semester";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS groups(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            subject TEXT NOT NULL,
            class_days TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            group_id TEXT NOT NULL,
            id TEXT NOT NULL,
            name TEXT NOT NULL,
            matricula TEXT,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(group_id, id),
            FOREIGN KEY(group_id) REFERENCES groups(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_group_sort ON students(group_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS evaluation_types(
            group_id TEXT NOT NULL,
            partial INTEGER NOT NULL,
            id TEXT NOT NULL,
            name TEXT NOT NULL,
            weight REAL NOT NULL,
            is_attendance INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(group_id, partial, id),
            FOREIGN KEY(group_id) REFERENCES groups(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS evaluations(
            group_id TEXT NOT NULL,
            id TEXT NOT NULL,
            name TEXT NOT NULL,
            max_score REAL NOT NULL,
            partial INTEGER NOT NULL,
            type_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(group_id, id),
            FOREIGN KEY(group_id) REFERENCES groups(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            group_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            PRIMARY KEY(group_id, student_id, date),
            FOREIGN KEY(group_id, student_id) REFERENCES students(group_id, id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_group_date ON attendance(group_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            group_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            evaluation_id TEXT NOT NULL,
            score REAL NOT NULL,
            PRIMARY KEY(group_id, student_id, evaluation_id),
            FOREIGN KEY(group_id, student_id) REFERENCES students(group_id, id),
            FOREIGN KEY(group_id, evaluation_id) REFERENCES evaluations(group_id, id)
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(text) => Ok(Some(
            serde_json::from_str(&text).with_context(|| format!("settings.{} is invalid JSON", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

fn encode_class_days(days: &BTreeSet<Weekday>) -> String {
    days.iter().map(|d| d.as_str()).collect::<Vec<_>>().join(",")
}

fn decode_class_days(raw: &str) -> BTreeSet<Weekday> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| {
            let day = Weekday::parse(s);
            if day.is_none() {
                tracing::warn!(value = s, "ignoring unknown class day in database");
            }
            day
        })
        .collect()
}

fn partial_from_db(n: i64) -> anyhow::Result<Partial> {
    u8::try_from(n)
        .ok()
        .and_then(|n| Partial::try_from(n).ok())
        .ok_or_else(|| anyhow::anyhow!("invalid partial {} in database", n))
}

/// Writes the whole snapshot in one transaction, replacing what was there.
pub fn save_state(conn: &Connection, state: &ClassroomState) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    for table in ["grades", "attendance", "evaluations", "evaluation_types", "students", "groups"] {
        tx.execute(&format!("DELETE FROM {}", table), [])?;
    }

    settings_set_json(
        &tx,
        SETTINGS_KEY_SEMESTER,
        &serde_json::to_value(&state.settings)?,
    )?;

    for (g_idx, group) in state.groups.iter().enumerate() {
        tx.execute(
            "INSERT INTO groups(id, name, subject, class_days, sort_order) VALUES(?, ?, ?, ?, ?)",
            (
                &group.id,
                &group.name,
                &group.subject,
                encode_class_days(&group.class_days),
                g_idx as i64,
            ),
        )
        .with_context(|| format!("failed to save group {}", group.id))?;
        for (s_idx, student) in group.students.iter().enumerate() {
            tx.execute(
                "INSERT INTO students(group_id, id, name, matricula, sort_order) VALUES(?, ?, ?, ?, ?)",
                (
                    &group.id,
                    &student.id,
                    &student.name,
                    &student.matricula,
                    s_idx as i64,
                ),
            )?;
        }
        for partial in Partial::BOTH {
            for (t_idx, ty) in group.evaluation_types.get(partial).iter().enumerate() {
                tx.execute(
                    "INSERT INTO evaluation_types(group_id, partial, id, name, weight, is_attendance, sort_order)
                     VALUES(?, ?, ?, ?, ?, ?, ?)",
                    (
                        &group.id,
                        partial.number() as i64,
                        &ty.id,
                        &ty.name,
                        ty.weight,
                        ty.is_attendance as i64,
                        t_idx as i64,
                    ),
                )?;
            }
        }
    }

    let group_ids: HashSet<&str> = state.groups.iter().map(|g| g.id.as_str()).collect();
    let mut order: BTreeMap<&str, i64> = BTreeMap::new();
    for (group_id, evaluation) in state.grades.all_evaluations() {
        if !group_ids.contains(group_id) {
            tracing::warn!(group_id, evaluation_id = %evaluation.id, "skipping evaluation of unknown group");
            continue;
        }
        let slot = order.entry(group_id).or_insert(0);
        tx.execute(
            "INSERT INTO evaluations(group_id, id, name, max_score, partial, type_id, sort_order)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                group_id,
                &evaluation.id,
                &evaluation.name,
                evaluation.max_score,
                evaluation.partial.number() as i64,
                &evaluation.type_id,
                *slot,
            ),
        )?;
        *slot += 1;
    }

    // Orphaned rows can only come from an imported snapshot and are skipped.
    let enrolled: HashSet<(&str, &str)> = state
        .groups
        .iter()
        .flat_map(|g| g.students.iter().map(move |s| (g.id.as_str(), s.id.as_str())))
        .collect();
    let known_evaluations: HashSet<(&str, &str)> = state
        .grades
        .all_evaluations()
        .filter(|(g, _)| group_ids.contains(g))
        .map(|(g, e)| (g, e.id.as_str()))
        .collect();
    let mut skipped = 0usize;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO attendance(group_id, student_id, date, status) VALUES(?, ?, ?, ?)",
        )?;
        for (group_id, student_id, date, status) in state.attendance.entries() {
            if !enrolled.contains(&(group_id, student_id)) {
                skipped += 1;
                continue;
            }
            stmt.execute((group_id, student_id, date.to_string(), status.as_str()))?;
        }
        let mut stmt = tx.prepare(
            "INSERT INTO grades(group_id, student_id, evaluation_id, score) VALUES(?, ?, ?, ?)",
        )?;
        for (group_id, student_id, evaluation_id, score) in state.grades.all_grades() {
            if !enrolled.contains(&(group_id, student_id))
                || !known_evaluations.contains(&(group_id, evaluation_id))
            {
                skipped += 1;
                continue;
            }
            stmt.execute((group_id, student_id, evaluation_id, score))?;
        }
    }
    if skipped > 0 {
        tracing::warn!(skipped, "dropped orphaned attendance/grade rows while saving");
    }

    tx.commit().context("failed to commit snapshot")?;
    Ok(())
}

pub fn load_state(conn: &Connection) -> anyhow::Result<ClassroomState> {
    let settings: Settings = match settings_get_json(conn, SETTINGS_KEY_SEMESTER)? {
        Some(v) => serde_json::from_value(v).context("settings.semester has an unexpected shape")?,
        None => Settings::default(),
    };

    let mut groups: Vec<Group> = {
        let mut stmt = conn.prepare(
            "SELECT id, name, subject, class_days FROM groups ORDER BY sort_order",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(Group {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    subject: r.get(2)?,
                    class_days: decode_class_days(&r.get::<_, String>(3)?),
                    students: Vec::new(),
                    evaluation_types: PartialTypes::default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    for group in &mut groups {
        let mut stmt = conn.prepare(
            "SELECT id, name, matricula FROM students WHERE group_id = ? ORDER BY sort_order",
        )?;
        group.students = stmt
            .query_map([&group.id], |r| {
                Ok(Student {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    matricula: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT partial, id, name, weight, is_attendance
             FROM evaluation_types
             WHERE group_id = ?
             ORDER BY partial, sort_order",
        )?;
        let types = stmt
            .query_map([&group.id], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    EvaluationType {
                        id: r.get(1)?,
                        name: r.get(2)?,
                        weight: r.get(3)?,
                        is_attendance: r.get::<_, i64>(4)? != 0,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (partial, ty) in types {
            group
                .evaluation_types
                .get_mut(partial_from_db(partial)?)
                .push(ty);
        }
    }

    let mut evaluations: BTreeMap<String, Vec<Evaluation>> = BTreeMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT group_id, id, name, max_score, partial, type_id
             FROM evaluations
             ORDER BY group_id, sort_order",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, f64>(3)?,
                    r.get::<_, i64>(4)?,
                    r.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (group_id, id, name, max_score, partial, type_id) in rows {
            evaluations.entry(group_id).or_default().push(Evaluation {
                id,
                name,
                max_score,
                partial: partial_from_db(partial)?,
                type_id,
            });
        }
    }

    let mut grades: BTreeMap<String, BTreeMap<String, StudentGrades>> = BTreeMap::new();
    {
        let mut stmt =
            conn.prepare("SELECT group_id, student_id, evaluation_id, score FROM grades")?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, f64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (group_id, student_id, evaluation_id, score) in rows {
            grades
                .entry(group_id)
                .or_default()
                .entry(student_id)
                .or_default()
                .insert(evaluation_id, score);
        }
    }

    let mut attendance = AttendanceStore::default();
    {
        let mut stmt =
            conn.prepare("SELECT group_id, student_id, date, status FROM attendance")?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (group_id, student_id, date, status) in rows {
            let Ok(date) = NaiveDate::parse_from_str(&date, "%Y-%m-%d") else {
                tracing::warn!(%group_id, %student_id, %date, "skipping attendance row with bad date");
                continue;
            };
            let Some(status) = AttendanceStatus::parse(&status) else {
                tracing::warn!(%group_id, %student_id, %status, "skipping attendance row with unknown status");
                continue;
            };
            attendance.set(&group_id, &student_id, date, status);
        }
    }

    Ok(ClassroomState::from_parts(
        settings,
        groups,
        attendance,
        GradeBook::from_parts(evaluations, grades),
    ))
}
