//! # Undo/Redo Stack
//!
//! Snapshot-based history for document editing.
//!
//! ## Design
//!
//! - Before a mutation commits, the session pushes a snapshot of the state
//!   it is about to leave, labelled with the mutation's comment
//! - Undo hands back the most recent snapshot and keeps the current state
//!   for redo
//! - New undo points clear the redo stack
//! - A batch groups several mutations under the first point pushed inside it

use crate::snapshot::StateSnapshot;

/// One recorded state and what the next edit did to it
#[derive(Debug, Clone)]
pub struct UndoPoint {
    pub snapshot: StateSnapshot,
    pub comment: String,
}

impl UndoPoint {
    pub fn new(snapshot: StateSnapshot, comment: impl Into<String>) -> Self {
        Self {
            snapshot,
            comment: comment.into(),
        }
    }
}

#[derive(Debug)]
pub struct UndoStack {
    /// Most recent last
    undo_stack: Vec<UndoPoint>,

    redo_stack: Vec<UndoPoint>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    /// Comment of the open batch, if any
    batch: Option<BatchState>,
}

#[derive(Debug)]
struct BatchState {
    comment: String,
    recorded: bool,
}

impl UndoStack {
    /// Create a new undo stack with default max levels (100)
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
            batch: None,
        }
    }

    /// Records the state before an edit. Inside a batch only the first
    /// point is kept.
    pub fn push(&mut self, point: UndoPoint) {
        if let Some(batch) = &mut self.batch {
            if batch.recorded {
                return;
            }
            batch.recorded = true;
            let comment = batch.comment.clone();
            self.push_point(UndoPoint::new(point.snapshot, comment));
            return;
        }
        self.push_point(point);
    }

    fn push_point(&mut self, point: UndoPoint) {
        self.undo_stack.push(point);

        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }

        self.redo_stack.clear();
    }

    /// Groups the following edits into one undo step
    pub fn begin_batch(&mut self, comment: impl Into<String>) {
        self.batch = Some(BatchState {
            comment: comment.into(),
            recorded: false,
        });
    }

    pub fn end_batch(&mut self) {
        self.batch = None;
    }

    pub fn in_batch(&self) -> bool {
        self.batch.is_some()
    }

    /// Swaps the most recent point for `current`; returns the state to restore
    pub fn undo(&mut self, current: StateSnapshot) -> Option<UndoPoint> {
        let point = self.undo_stack.pop()?;
        self.redo_stack
            .push(UndoPoint::new(current, point.comment.clone()));
        Some(point)
    }

    /// Swaps the most recently undone point for `current`
    pub fn redo(&mut self, current: StateSnapshot) -> Option<UndoPoint> {
        let point = self.redo_stack.pop()?;
        self.undo_stack
            .push(UndoPoint::new(current, point.comment.clone()));
        Some(point)
    }

    /// The point `undo` would hand back
    pub fn peek_undo(&self) -> Option<&UndoPoint> {
        self.undo_stack.last()
    }

    pub fn peek_redo(&self) -> Option<&UndoPoint> {
        self.redo_stack.last()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Comment of the edit `undo` would revert
    pub fn undo_comment(&self) -> Option<&str> {
        self.undo_stack.last().map(|p| p.comment.as_str())
    }

    pub fn redo_comment(&self) -> Option<&str> {
        self.redo_stack.last().map(|p| p.comment.as_str())
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn max_levels(&self) -> usize {
        self.max_levels
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.batch = None;
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotPayload;

    fn snapshot(tag: &str) -> StateSnapshot {
        StateSnapshot {
            payload: SnapshotPayload::Nested(vec![format!("Flow -name {}", tag)]),
            expanded: Vec::new(),
            selected: Vec::new(),
            modified: false,
            file: None,
        }
    }

    fn tag(point: &UndoPoint) -> String {
        match &point.snapshot.payload {
            SnapshotPayload::Nested(lines) => lines[0].clone(),
            SnapshotPayload::Instance(_) => String::new(),
        }
    }

    #[test]
    fn test_undo_redo_swap_states() {
        let mut stack = UndoStack::new();
        stack.push(UndoPoint::new(snapshot("a"), "first"));

        let point = stack.undo(snapshot("b")).unwrap();
        assert_eq!(tag(&point), "Flow -name a");
        assert_eq!(point.comment, "first");
        assert!(!stack.can_undo());
        assert_eq!(stack.redo_comment(), Some("first"));

        let point = stack.redo(snapshot("a")).unwrap();
        assert_eq!(tag(&point), "Flow -name b");
        assert!(stack.can_undo());
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_new_point_clears_redo() {
        let mut stack = UndoStack::new();
        stack.push(UndoPoint::new(snapshot("a"), "first"));
        stack.undo(snapshot("b"));
        assert!(stack.can_redo());

        stack.push(UndoPoint::new(snapshot("a"), "second"));
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_max_levels_drops_oldest() {
        let mut stack = UndoStack::with_max_levels(2);
        for name in ["a", "b", "c"] {
            stack.push(UndoPoint::new(snapshot(name), name));
        }
        assert_eq!(stack.undo_count(), 2);
        assert_eq!(stack.undo_comment(), Some("c"));
        stack.undo(snapshot("d"));
        let oldest = stack.undo(snapshot("c")).unwrap();
        assert_eq!(oldest.comment, "b");
        assert!(!stack.can_undo());
    }

    #[test]
    fn test_batch_keeps_first_point() {
        let mut stack = UndoStack::new();
        stack.begin_batch("Cleaning up");
        stack.push(UndoPoint::new(snapshot("a"), "one"));
        stack.push(UndoPoint::new(snapshot("b"), "two"));
        stack.end_batch();

        assert_eq!(stack.undo_count(), 1);
        let point = stack.undo(snapshot("c")).unwrap();
        assert_eq!(point.comment, "Cleaning up");
        assert_eq!(tag(&point), "Flow -name a");
    }
}
