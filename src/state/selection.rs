/// Selection Tracker
///
/// Keeps the single row the View and Delete actions act on, independent of
/// what the grid widget highlights. A reload forces the state back to
/// nothing and arms a one-shot flag: the grid reports a selection as soon as
/// it is repopulated, and that first event is not the operator's.

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    None,
    /// Indexation id of the selected row
    Selected(String),
}

#[derive(Debug, Clone)]
pub struct SelectionTracker {
    selection: Selection,
    /// Swallow the next selection change (fired by grid population)
    loading: bool,
}

impl Default for SelectionTracker {
    fn default() -> Self {
        // The grid populates once at startup, same as after a reload
        Self {
            selection: Selection::None,
            loading: true,
        }
    }
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the selection ahead of a grid reload
    pub fn force_clear(&mut self) {
        self.loading = true;
        self.selection = Selection::None;
    }

    /// Feed a selection change reported by the grid.
    /// Returns `true` if the selection was taken.
    pub fn selection_changed(&mut self, indexation_id: Option<&str>) -> bool {
        if self.loading {
            self.loading = false;
            return false;
        }

        self.selection = match indexation_id {
            Some(id) => Selection::Selected(id.to_string()),
            None => Selection::None,
        };
        true
    }

    /// Forget the selection if it points at a row that no longer exists
    pub fn row_removed(&mut self, indexation_id: &str) {
        if self.selected() == Some(indexation_id) {
            self.selection = Selection::None;
        }
    }

    pub fn selected(&self) -> Option<&str> {
        match &self.selection {
            Selection::Selected(id) => Some(id),
            Selection::None => None,
        }
    }

    pub fn is_selected(&self, indexation_id: &str) -> bool {
        self.selected() == Some(indexation_id)
    }

    #[cfg(test)]
    pub fn state(&self) -> &Selection {
        &self.selection
    }
}
