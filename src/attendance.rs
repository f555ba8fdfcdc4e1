use crate::model::AttendanceStatus;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type StudentAttendance = BTreeMap<NaiveDate, AttendanceStatus>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceWrite {
    pub student_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

/// Sparse `group -> student -> date -> status` map. `Pending` is never stored:
/// writing it removes the entry and prunes maps left empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttendanceStore {
    records: BTreeMap<String, BTreeMap<String, StudentAttendance>>,
    #[serde(skip)]
    version: u64,
}

impl AttendanceStore {
    pub fn get(&self, group_id: &str, student_id: &str, date: NaiveDate) -> AttendanceStatus {
        self.student_record(group_id, student_id)
            .and_then(|r| r.get(&date))
            .copied()
            .unwrap_or_default()
    }

    pub fn student_record(&self, group_id: &str, student_id: &str) -> Option<&StudentAttendance> {
        self.records.get(group_id)?.get(student_id)
    }

    /// Returns whether the stored value changed.
    pub fn set(
        &mut self,
        group_id: &str,
        student_id: &str,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> bool {
        let changed = self.apply(group_id, student_id, date, status);
        if changed {
            self.version += 1;
        }
        changed
    }

    /// Applies every write as one batch; the version moves at most once.
    /// Returns how many entries actually changed.
    pub fn bulk_set(&mut self, group_id: &str, writes: &[AttendanceWrite]) -> usize {
        let changed = writes
            .iter()
            .filter(|w| self.apply(group_id, &w.student_id, w.date, w.status))
            .count();
        if changed > 0 {
            self.version += 1;
        }
        changed
    }

    fn apply(
        &mut self,
        group_id: &str,
        student_id: &str,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> bool {
        if status.is_pending() {
            let Some(group) = self.records.get_mut(group_id) else {
                return false;
            };
            let Some(student) = group.get_mut(student_id) else {
                return false;
            };
            let removed = student.remove(&date).is_some();
            if student.is_empty() {
                group.remove(student_id);
            }
            if group.is_empty() {
                self.records.remove(group_id);
            }
            return removed;
        }

        let slot = self
            .records
            .entry(group_id.to_string())
            .or_default()
            .entry(student_id.to_string())
            .or_default();
        slot.insert(date, status) != Some(status)
    }

    pub fn remove_student(&mut self, group_id: &str, student_id: &str) {
        let Some(group) = self.records.get_mut(group_id) else {
            return;
        };
        if group.remove(student_id).is_some() {
            self.version += 1;
        }
        if group.is_empty() {
            self.records.remove(group_id);
        }
    }

    pub fn remove_group(&mut self, group_id: &str) {
        if self.records.remove(group_id).is_some() {
            self.version += 1;
        }
    }

    /// Removes stored `Pending` values, which only a deserialized snapshot can
    /// carry. Returns how many were dropped.
    pub fn drop_pending(&mut self) -> usize {
        let mut dropped = 0;
        for students in self.records.values_mut() {
            for record in students.values_mut() {
                let before = record.len();
                record.retain(|_, status| !status.is_pending());
                dropped += before - record.len();
            }
            students.retain(|_, record| !record.is_empty());
        }
        self.records.retain(|_, students| !students.is_empty());
        dropped
    }

    /// Every stored (non-pending) entry, for persistence.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, NaiveDate, AttendanceStatus)> {
        self.records.iter().flat_map(|(g, students)| {
            students.iter().flat_map(move |(s, dates)| {
                dates
                    .iter()
                    .map(move |(d, status)| (g.as_str(), s.as_str(), *d, *status))
            })
        })
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

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, day).expect("valid date")
    }

    #[test]
    fn missing_entry_reads_as_pending() {
        let store = AttendanceStore::default();
        assert_eq!(store.get("g1", "s1", d(2)), AttendanceStatus::Pending);
    }

    #[test]
    fn clearing_to_pending_is_indistinguishable_from_never_set() {
        let mut store = AttendanceStore::default();
        assert!(store.set("g1", "s1", d(2), AttendanceStatus::Present));
        assert!(store.set("g1", "s1", d(2), AttendanceStatus::Pending));
        assert_eq!(store.get("g1", "s1", d(2)), AttendanceStatus::Pending);
        assert!(store.student_record("g1", "s1").is_none());
        assert_eq!(
            serde_json::to_value(&store).expect("ser"),
            serde_json::to_value(AttendanceStore::default()).expect("ser")
        );
    }

    #[test]
    fn pending_write_on_empty_store_changes_nothing() {
        let mut store = AttendanceStore::default();
        assert!(!store.set("g1", "s1", d(2), AttendanceStatus::Pending));
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn bulk_set_counts_changes_and_bumps_version_once() {
        let mut store = AttendanceStore::default();
        store.set("g1", "s1", d(2), AttendanceStatus::Absent);
        let before = store.version();
        let writes = vec![
            AttendanceWrite {
                student_id: "s1".into(),
                date: d(2),
                status: AttendanceStatus::Absent,
            },
            AttendanceWrite {
                student_id: "s1".into(),
                date: d(3),
                status: AttendanceStatus::Late,
            },
            AttendanceWrite {
                student_id: "s2".into(),
                date: d(2),
                status: AttendanceStatus::Exchange,
            },
        ];
        assert_eq!(store.bulk_set("g1", &writes), 2);
        assert_eq!(store.version(), before + 1);
        assert_eq!(store.get("g1", "s1", d(3)), AttendanceStatus::Late);
        assert_eq!(store.get("g1", "s2", d(2)), AttendanceStatus::Exchange);
        assert_eq!(store.entries().count(), 3);
    }

    #[test]
    fn serializes_as_nested_string_keyed_maps() {
        let mut store = AttendanceStore::default();
        store.set("g1", "s1", d(2), AttendanceStatus::Justified);
        let v = serde_json::to_value(&store).expect("ser");
        assert_eq!(v["g1"]["s1"]["2024-09-02"], "justified");
        let back: AttendanceStore = serde_json::from_value(v).expect("de");
        assert_eq!(back.get("g1", "s1", d(2)), AttendanceStatus::Justified);
    }

    #[test]
    fn removing_a_student_drops_only_their_entries() {
        let mut store = AttendanceStore::default();
        store.set("g1", "s1", d(2), AttendanceStatus::Present);
        store.set("g1", "s2", d(2), AttendanceStatus::Absent);
        store.remove_student("g1", "s1");
        assert!(store.student_record("g1", "s1").is_none());
        assert_eq!(store.get("g1", "s2", d(2)), AttendanceStatus::Absent);
    }
}
