use std::collections::VecDeque;

use orbit_model::Chart;

use crate::operation::Operation;
use crate::selection::Selection;

/// Undo and redo stacks of applied operations.
///
/// Pushing a new operation always empties the redo stack. With a non-zero
/// limit the oldest undo entry is dropped once the limit is exceeded.
#[derive(Debug, Clone, Default)]
pub struct UndoRedoManager {
    undo_stack: VecDeque<Operation>,
    redo_stack: Vec<Operation>,
    limit: usize,
}

impl UndoRedoManager {
    pub fn new(limit: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
        self.enforce_limit();
    }

    /// Record an operation that has already been applied.
    pub fn push(&mut self, operation: Operation) {
        self.redo_stack.clear();
        self.undo_stack.push_back(operation);
        self.enforce_limit();
    }

    /// Apply `operation` and record it.
    pub fn invoke_and_push(&mut self, operation: Operation, chart: &mut Chart, selection: &mut Selection) {
        operation.redo(chart, selection);
        self.push(operation);
    }

    /// Revert the most recent operation. Returns it, now on top of the redo stack.
    pub fn undo(&mut self, chart: &mut Chart, selection: &mut Selection) -> Option<&Operation> {
        let operation = self.undo_stack.pop_back()?;
        operation.undo(chart, selection);
        self.redo_stack.push(operation);
        self.redo_stack.last()
    }

    /// Re-apply the most recently undone operation.
    pub fn redo(&mut self, chart: &mut Chart, selection: &mut Selection) -> Option<&Operation> {
        let operation = self.redo_stack.pop()?;
        operation.redo(chart, selection);
        self.undo_stack.push_back(operation);
        self.undo_stack.back()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn peek_undo(&self) -> Option<&Operation> {
        self.undo_stack.back()
    }

    pub fn peek_redo(&self) -> Option<&Operation> {
        self.redo_stack.last()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    fn enforce_limit(&mut self) {
        if self.limit == 0 {
            return;
        }
        while self.undo_stack.len() > self.limit {
            self.undo_stack.pop_front();
        }
    }
}
