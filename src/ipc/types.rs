use std::path::PathBuf;

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Deserialize;

use crate::classroom::ClassroomState;
use crate::grid::GridController;
use crate::reports::ReportCache;
use crate::taker::AttendanceTaker;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The grid the shell currently has open: rows are `student_ids`, columns are
/// `dates`, both frozen when the session opened.
#[derive(Debug)]
pub struct GridSession {
    pub group_id: String,
    pub student_ids: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub controller: GridController,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub classroom: ClassroomState,
    pub grid: Option<GridSession>,
    pub taker: Option<AttendanceTaker>,
    pub reports: ReportCache,
    pub today_override: Option<NaiveDate>,
}

impl AppState {
    pub fn new(today_override: Option<NaiveDate>) -> Self {
        Self {
            workspace: None,
            db: None,
            classroom: ClassroomState::default(),
            grid: None,
            taker: None,
            reports: ReportCache::default(),
            today_override,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.today_override
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Drops open sessions bound to `group_id`, or every session for `None`.
    /// Sessions freeze roster and dates, so they cannot outlive a change to
    /// either.
    pub fn close_sessions(&mut self, group_id: Option<&str>) {
        let hit = |g: &str| group_id.map(|id| id == g).unwrap_or(true);
        if self.grid.as_ref().map(|s| hit(&s.group_id)).unwrap_or(false) {
            tracing::debug!(group_id = ?group_id, "closing grid session");
            self.grid = None;
        }
        if self.taker.as_ref().map(|t| hit(t.group_id())).unwrap_or(false) {
            tracing::debug!(group_id = ?group_id, "closing attendance taker");
            self.taker = None;
        }
    }
}
