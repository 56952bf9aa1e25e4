use std::collections::HashSet;

use crate::state::data::DisplayRow;
use crate::state::selection::SelectionTracker;

/// Cells that can be clicked to copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopiedCell {
    Information,
    Content,
}

/// What the grid currently shows.
///
/// Rows are only ever replaced as a whole by a finished reload, or patched
/// one at a time by add and delete.
#[derive(Debug, Default)]
pub struct GridModel {
    rows: Vec<DisplayRow>,
    selection: SelectionTracker,
    /// Cells currently showing their "Copied" state
    copied: HashSet<(String, CopiedCell)>,
    reloading: bool,
}

impl GridModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the grid for a reload. Returns `false` if one is already running.
    pub fn begin_reload(&mut self) -> bool {
        if self.reloading {
            return false;
        }

        self.reloading = true;
        self.rows.clear();
        self.copied.clear();
        self.selection.force_clear();
        true
    }

    /// Swap in the fully hydrated rows
    pub fn finish_reload(&mut self, rows: Vec<DisplayRow>) {
        self.rows = rows;
        self.reloading = false;

        // Populating the grid selects its first row; the tracker drops it
        let first = self.rows.first().map(|row| row.indexation_id().to_string());
        self.selection.selection_changed(first.as_deref());
    }

    /// Leave the reloading state without rows (the reload failed)
    pub fn abort_reload(&mut self) {
        self.reloading = false;
        self.selection.selection_changed(None);
    }

    pub fn is_reloading(&self) -> bool {
        self.reloading
    }

    /// New entries go on top, matching most-recent-first order
    pub fn insert_top(&mut self, row: DisplayRow) {
        self.rows.insert(0, row);
    }

    pub fn remove(&mut self, indexation_id: &str) -> Option<DisplayRow> {
        let index = self
            .rows
            .iter()
            .position(|row| row.indexation_id() == indexation_id)?;

        self.selection.row_removed(indexation_id);
        self.copied.retain(|(id, _)| id != indexation_id);
        Some(self.rows.remove(index))
    }

    pub fn click_row(&mut self, indexation_id: &str) {
        if self.row(indexation_id).is_some() {
            self.selection.selection_changed(Some(indexation_id));
        }
    }

    pub fn rows(&self) -> &[DisplayRow] {
        &self.rows
    }

    pub fn row(&self, indexation_id: &str) -> Option<&DisplayRow> {
        self.rows
            .iter()
            .find(|row| row.indexation_id() == indexation_id)
    }

    pub fn selected(&self) -> Option<&DisplayRow> {
        self.selection.selected().and_then(|id| self.row(id))
    }

    pub fn is_selected(&self, indexation_id: &str) -> bool {
        self.selection.is_selected(indexation_id)
    }

    /// Put a cell into its "Copied" state.
    /// Returns `false` if it already is, in which case nothing should be copied.
    pub fn mark_copied(&mut self, indexation_id: &str, cell: CopiedCell) -> bool {
        self.copied.insert((indexation_id.to_string(), cell))
    }

    pub fn clear_copied(&mut self, indexation_id: &str, cell: CopiedCell) {
        self.copied.remove(&(indexation_id.to_string(), cell));
    }

    pub fn is_copied(&self, indexation_id: &str, cell: CopiedCell) -> bool {
        self.copied.contains(&(indexation_id.to_string(), cell))
    }

    pub fn count_label(&self) -> String {
        let count = self.rows.len();
        let noun = if count == 1 { "entry" } else { "entries" };
        format!("Now displaying {} {}", count, noun)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::DirtRecord;

    fn row(id: &str) -> DisplayRow {
        DisplayRow::unresolved(DirtRecord {
            indexation_id: id.to_string(),
            user_id: "42".to_string(),
            attachment_id: 1,
            username: "getos".to_string(),
            notes: String::new(),
        })
    }

    fn loaded(ids: &[&str]) -> GridModel {
        let mut grid = GridModel::new();
        assert!(grid.begin_reload());
        grid.finish_reload(ids.iter().map(|id| row(id)).collect());
        grid
    }

    #[test]
    fn test_reload_does_not_select_first_row() {
        let grid = loaded(&["42-2", "42-1"]);
        assert!(grid.selected().is_none());
        assert_eq!(grid.count_label(), "Now displaying 2 entries");
    }

    #[test]
    fn test_second_reload_is_refused_while_running() {
        let mut grid = loaded(&["42-1"]);
        assert!(grid.begin_reload());
        assert!(!grid.begin_reload());
        assert!(grid.rows().is_empty());

        grid.finish_reload(vec![row("42-1")]);
        assert!(!grid.is_reloading());
    }

    #[test]
    fn test_reload_clears_selection() {
        let mut grid = loaded(&["42-1"]);
        grid.click_row("42-1");
        assert_eq!(grid.selected().map(|r| r.indexation_id()), Some("42-1"));

        grid.begin_reload();
        assert!(grid.selected().is_none());
    }

    #[test]
    fn test_insert_and_remove() {
        let mut grid = loaded(&["42-1"]);
        grid.insert_top(row("42-2"));
        assert_eq!(grid.rows()[0].indexation_id(), "42-2");
        assert_eq!(grid.count_label(), "Now displaying 2 entries");

        grid.click_row("42-2");
        assert!(grid.remove("42-2").is_some());
        assert!(grid.selected().is_none());
        assert_eq!(grid.count_label(), "Now displaying 1 entry");
        assert!(grid.remove("42-2").is_none());
    }

    #[test]
    fn test_copied_cell_ignores_repeat_clicks() {
        let mut grid = loaded(&["42-1"]);

        assert!(grid.mark_copied("42-1", CopiedCell::Information));
        assert!(!grid.mark_copied("42-1", CopiedCell::Information));
        assert!(grid.mark_copied("42-1", CopiedCell::Content));

        grid.clear_copied("42-1", CopiedCell::Information);
        assert!(!grid.is_copied("42-1", CopiedCell::Information));
        assert!(grid.is_copied("42-1", CopiedCell::Content));
    }
}
