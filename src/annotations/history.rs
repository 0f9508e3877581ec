//! Undo/redo history for the annotation store
//!
//! Every mutation is recorded as an [`Edit`]: the annotations it removed
//! and the annotations it put in their place. Applying an edit replaces
//! `before` with `after`; its inverse swaps the two, so undo and redo
//! are the same operation run in opposite directions.

use super::Annotation;
use std::collections::VecDeque;

/// What kind of user action produced an edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Create,
    Resize,
    Relabel,
    SetChannels,
    Delete,
    Merge,
    Split,
    Import,
    RelabelAll,
    RemoveLabel,
}

impl EditKind {
    /// Bulk label edits drop labels nobody uses any more from the registry
    pub fn prunes_labels(&self) -> bool {
        matches!(self, EditKind::RelabelAll | EditKind::RemoveLabel)
    }
}

/// A reversible change to the annotation set
#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    pub kind: EditKind,
    /// Annotations present before the edit and removed by it
    pub before: Vec<Annotation>,
    /// Annotations present after the edit
    pub after: Vec<Annotation>,
}

impl Edit {
    pub fn new(kind: EditKind, before: Vec<Annotation>, after: Vec<Annotation>) -> Self {
        Self { kind, before, after }
    }

    /// The edit that undoes this one
    pub fn inverse(&self) -> Edit {
        Edit {
            kind: self.kind,
            before: self.after.clone(),
            after: self.before.clone(),
        }
    }
}

/// Bounded undo stack with a redo stack
#[derive(Debug, Clone, Default)]
pub struct History {
    undo: VecDeque<Edit>,
    redo: Vec<Edit>,
    limit: Option<usize>,
}

impl History {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            limit,
        }
    }

    /// Record a fresh edit; this discards anything that could be redone
    pub fn record(&mut self, edit: Edit) {
        self.redo.clear();
        self.push_undo(edit);
    }

    fn push_undo(&mut self, edit: Edit) {
        if self.limit == Some(0) {
            return;
        }
        self.undo.push_back(edit);
        if let Some(limit) = self.limit {
            while self.undo.len() > limit {
                self.undo.pop_front();
            }
        }
    }

    /// Take the most recent edit for undoing; it moves to the redo stack
    pub fn undo(&mut self) -> Option<Edit> {
        let edit = self.undo.pop_back()?;
        self.redo.push(edit.clone());
        Some(edit)
    }

    /// Take the most recently undone edit for redoing
    pub fn redo(&mut self) -> Option<Edit> {
        let edit = self.redo.pop()?;
        self.push_undo(edit.clone());
        Some(edit)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
