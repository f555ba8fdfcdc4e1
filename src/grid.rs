//! Focus / drag-selection state machine for the attendance grid.
//!
//! Rows are students in group order, columns are class dates. The controller
//! never touches the attendance store; it returns the edits a key press or
//! context-menu click implies and the caller applies them in one batch.

use crate::model::AttendanceStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

impl Cell {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Inclusive bounding box of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rect {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

impl Rect {
    pub fn spanning(a: Cell, b: Cell) -> Self {
        Self {
            top: a.row.min(b.row),
            left: a.col.min(b.col),
            bottom: a.row.max(b.row),
            right: a.col.max(b.col),
        }
    }

    /// Row-major walk over every cell.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (self.top..=self.bottom)
            .flat_map(move |row| (self.left..=self.right).map(move |col| Cell::new(row, col)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub start: Option<Cell>,
    pub end: Option<Cell>,
    pub dragging: bool,
}

impl Selection {
    pub fn rect(&self) -> Option<Rect> {
        Some(Rect::spanning(self.start?, self.end?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridKey {
    Up,
    Down,
    Left,
    Right,
    Status(AttendanceStatus),
    Escape,
}

impl GridKey {
    /// DOM-style key names: `ArrowUp`, `p`, `Delete`, `Escape`, ...
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "ArrowUp" => Some(GridKey::Up),
            "ArrowDown" => Some(GridKey::Down),
            "ArrowLeft" => Some(GridKey::Left),
            "ArrowRight" => Some(GridKey::Right),
            "Escape" => Some(GridKey::Escape),
            other => AttendanceStatus::from_hotkey(other).map(GridKey::Status),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellEdit {
    pub row: usize,
    pub col: usize,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridController {
    row_count: usize,
    col_count: usize,
    focused: Option<Cell>,
    selection: Selection,
}

impl GridController {
    pub fn new(row_count: usize, col_count: usize) -> Self {
        Self {
            row_count,
            col_count,
            focused: None,
            selection: Selection::default(),
        }
    }

    pub fn focused(&self) -> Option<Cell> {
        self.focused
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    fn in_bounds(&self, cell: Cell) -> bool {
        cell.row < self.row_count && cell.col < self.col_count
    }

    /// Focuses the cell and starts a fresh 1x1 drag selection. Cells outside
    /// the grid are ignored; returns whether the event was taken.
    pub fn pointer_down(&mut self, cell: Cell) -> bool {
        if !self.in_bounds(cell) {
            return false;
        }
        self.focused = Some(cell);
        self.selection = Selection {
            start: Some(cell),
            end: Some(cell),
            dragging: true,
        };
        true
    }

    pub fn pointer_enter(&mut self, cell: Cell) -> bool {
        if !self.selection.dragging || !self.in_bounds(cell) {
            return false;
        }
        self.selection.end = Some(cell);
        true
    }

    /// Ends a drag. The rectangle stays until the next pointer-down.
    pub fn pointer_up(&mut self) {
        self.selection.dragging = false;
    }

    pub fn key(&mut self, key: GridKey) -> Vec<CellEdit> {
        match key {
            GridKey::Up => self.move_focus(-1, 0),
            GridKey::Down => self.move_focus(1, 0),
            GridKey::Left => self.move_focus(0, -1),
            GridKey::Right => self.move_focus(0, 1),
            GridKey::Status(status) => return self.apply_status(status),
            GridKey::Escape => {}
        }
        Vec::new()
    }

    /// Right click clears exactly that cell.
    pub fn context_menu(&self, cell: Cell) -> Option<CellEdit> {
        if !self.in_bounds(cell) {
            return None;
        }
        Some(CellEdit {
            row: cell.row,
            col: cell.col,
            status: AttendanceStatus::Pending,
        })
    }

    fn move_focus(&mut self, d_row: isize, d_col: isize) {
        let Some(cell) = self.focused else {
            return;
        };
        if self.row_count == 0 || self.col_count == 0 {
            return;
        }
        let clamp = |v: usize, d: isize, n: usize| -> usize {
            (v as isize + d).clamp(0, n as isize - 1) as usize
        };
        self.focused = Some(Cell::new(
            clamp(cell.row, d_row, self.row_count),
            clamp(cell.col, d_col, self.col_count),
        ));
    }

    fn apply_status(&self, status: AttendanceStatus) -> Vec<CellEdit> {
        if let Some(rect) = self.selection.rect() {
            return rect
                .cells()
                .filter(|c| self.in_bounds(*c))
                .map(|c| CellEdit {
                    row: c.row,
                    col: c.col,
                    status,
                })
                .collect();
        }
        match self.focused {
            Some(c) if self.in_bounds(c) => vec![CellEdit {
                row: c.row,
                col: c.col,
                status,
            }],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_builds_bounding_box_in_either_direction() {
        let mut grid = GridController::new(5, 5);
        assert!(grid.pointer_down(Cell::new(3, 2)));
        assert!(grid.pointer_enter(Cell::new(1, 0)));
        grid.pointer_up();
        let rect = grid.selection().rect().expect("rect");
        assert_eq!(
            rect,
            Rect {
                top: 1,
                left: 0,
                bottom: 3,
                right: 2
            }
        );
        assert_eq!(rect.cells().count(), 9);
        assert!(!grid.selection().dragging);
        assert_eq!(grid.focused(), Some(Cell::new(3, 2)));
    }

    #[test]
    fn pointer_enter_without_drag_is_ignored() {
        let mut grid = GridController::new(5, 5);
        grid.pointer_down(Cell::new(0, 0));
        grid.pointer_up();
        assert!(!grid.pointer_enter(Cell::new(4, 4)));
        assert_eq!(grid.selection().rect().map(|r| r.cells().count()), Some(1));
    }

    #[test]
    fn status_key_applies_to_whole_rectangle() {
        let mut grid = GridController::new(5, 5);
        grid.pointer_down(Cell::new(1, 0));
        grid.pointer_enter(Cell::new(2, 1));
        grid.pointer_enter(Cell::new(3, 2));
        grid.pointer_up();
        let edits = grid.key(GridKey::parse("p").expect("key"));
        assert_eq!(edits.len(), 9);
        assert!(edits
            .iter()
            .all(|e| (1..=3).contains(&e.row) && e.col <= 2 && e.status == AttendanceStatus::Present));
    }

    #[test]
    fn arrows_clamp_and_leave_selection_alone() {
        let mut grid = GridController::new(3, 4);
        grid.pointer_down(Cell::new(0, 0));
        grid.pointer_up();
        let before = grid.selection();
        assert!(grid.key(GridKey::Up).is_empty());
        assert!(grid.key(GridKey::Left).is_empty());
        assert_eq!(grid.focused(), Some(Cell::new(0, 0)));
        for _ in 0..10 {
            grid.key(GridKey::Down);
            grid.key(GridKey::Right);
        }
        assert_eq!(grid.focused(), Some(Cell::new(2, 3)));
        assert_eq!(grid.selection(), before);
    }

    #[test]
    fn no_focus_and_no_selection_is_a_no_op() {
        let mut grid = GridController::new(3, 3);
        assert!(grid.key(GridKey::Status(AttendanceStatus::Absent)).is_empty());
        grid.key(GridKey::Down);
        assert_eq!(grid.focused(), None);
    }

    #[test]
    fn delete_and_context_menu_clear() {
        let mut grid = GridController::new(2, 2);
        grid.pointer_down(Cell::new(1, 1));
        let edits = grid.key(GridKey::parse("Delete").expect("key"));
        assert_eq!(
            edits,
            vec![CellEdit {
                row: 1,
                col: 1,
                status: AttendanceStatus::Pending
            }]
        );
        assert_eq!(
            grid.context_menu(Cell::new(0, 1)).map(|e| e.status),
            Some(AttendanceStatus::Pending)
        );
        assert_eq!(grid.context_menu(Cell::new(2, 0)), None);
    }

    #[test]
    fn out_of_bounds_pointer_and_empty_grid() {
        let mut grid = GridController::new(0, 0);
        assert!(!grid.pointer_down(Cell::new(0, 0)));
        assert!(grid.key(GridKey::Status(AttendanceStatus::Present)).is_empty());
        assert_eq!(GridKey::parse("Escape"), Some(GridKey::Escape));
        assert_eq!(GridKey::parse("q"), None);
    }
}
