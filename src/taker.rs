//! One-student-at-a-time attendance taking for a single date.
//!
//! The pending queue is never stored: callers recompute it from the live store
//! before each event and call [`AttendanceTaker::sync`] after applying any
//! write. Marking a student drops them from the queue, so the same index then
//! points at the next pending student.

use crate::attendance::{AttendanceStore, AttendanceWrite};
use crate::model::{AttendanceStatus, Group};
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TakerPhase {
    Active,
    /// Everyone has a status; only closing remains.
    Completed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakerKey {
    Mark(AttendanceStatus),
    Skip,
    Back,
    Escape,
}

impl TakerKey {
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "Escape" => return Some(TakerKey::Escape),
            "ArrowRight" => return Some(TakerKey::Skip),
            "ArrowLeft" => return Some(TakerKey::Back),
            _ => {}
        }
        if key.eq_ignore_ascii_case("s") {
            return Some(TakerKey::Skip);
        }
        match AttendanceStatus::from_hotkey(key) {
            Some(AttendanceStatus::Pending) | None => None,
            Some(status) => Some(TakerKey::Mark(status)),
        }
    }
}

/// Students of `group`, in roster order, with no status on `date`.
pub fn pending_queue(group: &Group, store: &AttendanceStore, date: NaiveDate) -> Vec<String> {
    group
        .students
        .iter()
        .filter(|s| store.get(&group.id, &s.id, date).is_pending())
        .map(|s| s.id.clone())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceTaker {
    group_id: String,
    date: NaiveDate,
    current_index: usize,
    phase: TakerPhase,
}

impl AttendanceTaker {
    pub fn open(group_id: &str, date: NaiveDate, queue_len: usize) -> Self {
        let mut taker = Self {
            group_id: group_id.to_string(),
            date,
            current_index: 0,
            phase: TakerPhase::Active,
        };
        taker.sync(queue_len);
        taker
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn phase(&self) -> TakerPhase {
        self.phase
    }

    pub fn current<'q>(&self, queue: &'q [String]) -> Option<&'q str> {
        if self.phase != TakerPhase::Active {
            return None;
        }
        queue.get(self.current_index).map(|s| s.as_str())
    }

    /// Handles one key against the current queue. A returned write must be
    /// applied to the store and followed by [`sync`](Self::sync).
    pub fn key(&mut self, key: TakerKey, queue: &[String]) -> Option<AttendanceWrite> {
        if self.phase == TakerPhase::Closed {
            return None;
        }
        match key {
            TakerKey::Escape => {
                self.phase = TakerPhase::Closed;
                None
            }
            TakerKey::Skip => {
                if self.phase == TakerPhase::Active && self.current_index + 1 < queue.len() {
                    self.current_index += 1;
                } else {
                    self.phase = TakerPhase::Closed;
                }
                None
            }
            TakerKey::Back => {
                if self.phase == TakerPhase::Active && self.current_index > 0 {
                    self.current_index -= 1;
                }
                None
            }
            TakerKey::Mark(status) => {
                let student_id = self.current(queue)?;
                Some(AttendanceWrite {
                    student_id: student_id.to_string(),
                    date: self.date,
                    status,
                })
            }
        }
    }

    /// Re-clamps the index against a freshly computed queue length.
    pub fn sync(&mut self, queue_len: usize) {
        if self.phase == TakerPhase::Closed {
            return;
        }
        if queue_len == 0 {
            self.current_index = 0;
            self.phase = TakerPhase::Completed;
            return;
        }
        if self.current_index >= queue_len {
            self.current_index = queue_len - 1;
        }
    }
}
