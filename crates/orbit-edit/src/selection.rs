use std::collections::BTreeSet;

use orbit_model::{Chart, Note, NoteId};

/// Notes the user has selected, plus an optional highlighted note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    selected: BTreeSet<NoteId>,
    highlighted: Option<NoteId>,
}

impl Selection {
    pub fn select(&mut self, id: NoteId) {
        self.selected.insert(id);
    }

    pub fn deselect(&mut self, id: NoteId) {
        self.selected.remove(&id);
    }

    pub fn toggle(&mut self, id: NoteId) {
        if !self.selected.remove(&id) {
            self.selected.insert(id);
        }
    }

    /// Forget a note entirely, e.g. because it left the chart.
    pub fn remove(&mut self, id: NoteId) {
        self.selected.remove(&id);
        if self.highlighted == Some(id) {
            self.highlighted = None;
        }
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.highlighted = None;
    }

    pub fn select_all(&mut self, chart: &Chart) {
        self.selected.extend(chart.notes().map(|n| n.id));
    }

    pub fn contains(&self, id: NoteId) -> bool {
        self.selected.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NoteId> + '_ {
        self.selected.iter().copied()
    }

    pub fn highlighted(&self) -> Option<NoteId> {
        self.highlighted
    }

    pub fn set_highlighted(&mut self, id: Option<NoteId>) {
        self.highlighted = id;
    }

    /// Selected notes that still exist, in chart order.
    pub fn notes<'a>(&self, chart: &'a Chart) -> Vec<&'a Note> {
        chart.notes().filter(|n| self.contains(n.id)).collect()
    }
}
