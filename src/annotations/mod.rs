//! Annotation store
//!
//! The store is the single source of truth for labeled time regions. It
//! has one writer (the interaction thread, through `&mut self`) and any
//! number of readers. After every mutation the store publishes a new
//! immutable snapshot, sorted by `(onset, id)`, so a reader on another
//! thread sees either the state before an edit or the state after it.
//!
//! # Main Types
//!
//! - [`AnnotationStore`] - Owns the annotations, the label registry and the undo history
//! - [`AnnotationReader`] - Cloneable, thread-safe query handle
//! - [`Annotation`] - A labeled interval with a stable [`AnnotationId`]
//! - [`AnnotationRecord`] - The id-less shape used for export and import
//!
//! # Invariants
//!
//! - `onset >= 0` and `duration >= 0`; inputs are clamped, never rejected
//! - Annotations are never merged or split implicitly, even when they
//!   overlap and share a label; [`AnnotationStore::merge`] and
//!   [`AnnotationStore::split`] are explicit actions
//! - Every mutation is undoable

pub mod history;

pub use history::{Edit, EditKind, History};

use crate::config::AnnotationSettings;
use crate::error::{Result, ViewerError};
use crate::types::TimeRange;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

/// Stable identity of an annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnnotationId(pub u64);

impl std::fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Channels an annotation applies to (storage indices)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelScope {
    #[default]
    All,
    Subset(BTreeSet<usize>),
}

impl ChannelScope {
    pub fn applies_to(&self, channel: usize) -> bool {
        match self {
            ChannelScope::All => true,
            ChannelScope::Subset(set) => set.contains(&channel),
        }
    }

    /// Smallest scope covering both
    pub fn union(&self, other: &ChannelScope) -> ChannelScope {
        match (self, other) {
            (ChannelScope::Subset(a), ChannelScope::Subset(b)) => {
                ChannelScope::Subset(a.union(b).copied().collect())
            }
            _ => ChannelScope::All,
        }
    }
}

/// A labeled time interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    /// Start in seconds
    pub onset: f64,
    /// Length in seconds
    pub duration: f64,
    pub label: String,
    pub channels: ChannelScope,
}

impl Annotation {
    pub fn end(&self) -> f64 {
        self.onset + self.duration
    }

    /// Closed-interval intersection with a time range
    pub fn overlaps(&self, range: &TimeRange) -> bool {
        range.overlaps(self.onset, self.end())
    }
}

/// Export/import shape: `(onset, duration, label, channels)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub onset: f64,
    pub duration: f64,
    pub label: String,
    #[serde(default)]
    pub channels: ChannelScope,
}

impl From<&Annotation> for AnnotationRecord {
    fn from(a: &Annotation) -> Self {
        Self {
            onset: a.onset,
            duration: a.duration,
            label: a.label.clone(),
            channels: a.channels.clone(),
        }
    }
}

fn clamp_time(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

fn sort_snapshot(items: &mut [Annotation]) {
    items.sort_by(|a, b| a.onset.total_cmp(&b.onset).then(a.id.cmp(&b.id)));
}

type Published = Arc<RwLock<Arc<Vec<Annotation>>>>;

/// Read-only handle onto the latest published snapshot
#[derive(Debug, Clone)]
pub struct AnnotationReader {
    published: Published,
}

impl AnnotationReader {
    /// The current snapshot, ordered by `(onset, id)`
    pub fn snapshot(&self) -> Arc<Vec<Annotation>> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Annotations intersecting `range`, ordered by `(onset, id)`
    pub fn query(&self, range: TimeRange) -> Vec<Annotation> {
        self.snapshot()
            .iter()
            .filter(|a| a.overlaps(&range))
            .cloned()
            .collect()
    }
}

/// Mutable set of annotations with undo/redo
#[derive(Debug)]
pub struct AnnotationStore {
    items: BTreeMap<AnnotationId, Annotation>,
    published: Published,
    next_id: u64,
    history: History,
    labels: Vec<String>,
}

impl Default for AnnotationStore {
    fn default() -> Self {
        Self::new(&AnnotationSettings::default())
    }
}

impl AnnotationStore {
    pub fn new(settings: &AnnotationSettings) -> Self {
        Self {
            items: BTreeMap::new(),
            published: Arc::new(RwLock::new(Arc::new(Vec::new()))),
            next_id: 1,
            history: History::new(settings.undo_limit),
            labels: Vec::new(),
        }
    }

    /// A query handle usable from any thread
    pub fn reader(&self) -> AnnotationReader {
        AnnotationReader {
            published: self.published.clone(),
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<Annotation>> {
        self.reader().snapshot()
    }

    pub fn query(&self, range: TimeRange) -> Vec<Annotation> {
        self.reader().query(range)
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.items.get(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Labels in the order they were first used
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Add a label to the registry without creating an annotation
    pub fn register_label(&mut self, label: &str) -> usize {
        match self.label_index(label) {
            Some(index) => index,
            None => {
                self.labels.push(label.to_string());
                self.labels.len() - 1
            }
        }
    }

    fn allocate_id(&mut self) -> AnnotationId {
        let id = AnnotationId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Replace `edit.before` with `edit.after` and publish
    fn apply(&mut self, edit: &Edit) {
        for annotation in &edit.before {
            self.items.remove(&annotation.id);
        }
        for annotation in &edit.after {
            self.register_label(&annotation.label);
            self.items.insert(annotation.id, annotation.clone());
        }
        if edit.kind.prunes_labels() {
            for annotation in &edit.before {
                if !self.items.values().any(|a| a.label == annotation.label) {
                    self.labels.retain(|l| *l != annotation.label);
                }
            }
        }
        self.publish();
    }

    fn commit(&mut self, edit: Edit) {
        self.apply(&edit);
        self.history.record(edit);
    }

    fn publish(&self) {
        let mut snapshot: Vec<Annotation> = self.items.values().cloned().collect();
        sort_snapshot(&mut snapshot);
        let mut published = self.published.write().unwrap_or_else(|e| e.into_inner());
        *published = Arc::new(snapshot);
    }

    // ==================== Mutations ====================

    /// Add an annotation; negative or non-finite times are clamped to 0
    pub fn create(
        &mut self,
        onset: f64,
        duration: f64,
        label: impl Into<String>,
        channels: ChannelScope,
    ) -> AnnotationId {
        let id = self.allocate_id();
        let annotation = Annotation {
            id,
            onset: clamp_time(onset),
            duration: clamp_time(duration),
            label: label.into(),
            channels,
        };
        self.commit(Edit::new(EditKind::Create, Vec::new(), vec![annotation]));
        id
    }

    /// Move/resize an annotation; returns false for unknown ids or no change
    pub fn resize(&mut self, id: AnnotationId, onset: f64, duration: f64) -> bool {
        let Some(old) = self.items.get(&id).cloned() else {
            return false;
        };
        let mut new = old.clone();
        new.onset = clamp_time(onset);
        new.duration = clamp_time(duration);
        if new == old {
            return false;
        }
        self.commit(Edit::new(EditKind::Resize, vec![old], vec![new]));
        true
    }

    pub fn relabel(&mut self, id: AnnotationId, label: impl Into<String>) -> bool {
        let Some(old) = self.items.get(&id).cloned() else {
            return false;
        };
        let label = label.into();
        if old.label == label {
            return false;
        }
        let new = Annotation {
            label,
            ..old.clone()
        };
        self.commit(Edit::new(EditKind::Relabel, vec![old], vec![new]));
        true
    }

    pub fn set_channels(&mut self, id: AnnotationId, channels: ChannelScope) -> bool {
        let Some(old) = self.items.get(&id).cloned() else {
            return false;
        };
        if old.channels == channels {
            return false;
        }
        let new = Annotation {
            channels,
            ..old.clone()
        };
        self.commit(Edit::new(EditKind::SetChannels, vec![old], vec![new]));
        true
    }

    pub fn delete(&mut self, id: AnnotationId) -> Option<Annotation> {
        let old = self.items.get(&id).cloned()?;
        self.commit(Edit::new(EditKind::Delete, vec![old.clone()], Vec::new()));
        Some(old)
    }

    /// Merge annotations into one spanning all of them
    ///
    /// The result keeps the id and label of the earliest annotation and the
    /// union of their channel scopes. Needs at least two existing ids.
    pub fn merge(&mut self, ids: &[AnnotationId]) -> Option<AnnotationId> {
        let mut parts: Vec<Annotation> = ids.iter().filter_map(|id| self.items.get(id).cloned()).collect();
        sort_snapshot(&mut parts);
        parts.dedup_by_key(|a| a.id);
        if parts.len() < 2 {
            return None;
        }

        let first = &parts[0];
        let onset = first.onset;
        let end = parts.iter().map(Annotation::end).fold(f64::MIN, f64::max);
        let channels = parts[1..]
            .iter()
            .fold(first.channels.clone(), |scope, a| scope.union(&a.channels));
        let merged = Annotation {
            id: first.id,
            onset,
            duration: end - onset,
            label: first.label.clone(),
            channels,
        };
        let id = merged.id;
        self.commit(Edit::new(EditKind::Merge, parts, vec![merged]));
        Some(id)
    }

    /// Cut an annotation in two at time `at`
    ///
    /// The left part keeps the id; the right part gets a new one, which is
    /// returned. `at` must lie strictly inside the annotation.
    pub fn split(&mut self, id: AnnotationId, at: f64) -> Option<AnnotationId> {
        let old = self.items.get(&id).cloned()?;
        if !(at > old.onset && at < old.end()) {
            return None;
        }
        let right_id = self.allocate_id();
        let left = Annotation {
            duration: at - old.onset,
            ..old.clone()
        };
        let right = Annotation {
            id: right_id,
            onset: at,
            duration: old.end() - at,
            ..old.clone()
        };
        self.commit(Edit::new(EditKind::Split, vec![old], vec![left, right]));
        Some(right_id)
    }

    /// Give every annotation labelled `old` the label `new`
    ///
    /// One undoable edit; returns how many annotations changed.
    pub fn relabel_all(&mut self, old: &str, new: impl Into<String>) -> usize {
        let new = new.into();
        if old == new {
            return 0;
        }
        let before: Vec<Annotation> = self.items.values().filter(|a| a.label == old).cloned().collect();
        if before.is_empty() {
            return 0;
        }
        let after = before
            .iter()
            .map(|a| Annotation {
                label: new.clone(),
                ..a.clone()
            })
            .collect();
        let count = before.len();
        tracing::info!("Relabeled {} annotations from {} to {}", count, old, new);
        self.commit(Edit::new(EditKind::RelabelAll, before, after));
        count
    }

    /// Delete every annotation labelled `label` and drop the label
    ///
    /// One undoable edit; returns how many annotations were deleted. An
    /// unused registered label is dropped without an edit.
    pub fn remove_label(&mut self, label: &str) -> usize {
        let before: Vec<Annotation> = self.items.values().filter(|a| a.label == label).cloned().collect();
        if before.is_empty() {
            self.labels.retain(|l| l != label);
            return 0;
        }
        let count = before.len();
        tracing::info!("Removed {} annotations labelled {}", count, label);
        self.commit(Edit::new(EditKind::RemoveLabel, before, Vec::new()));
        count
    }

    // ==================== History ====================

    /// Revert the last edit; false when there is nothing to undo
    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(edit) => {
                self.apply(&edit.inverse());
                tracing::debug!("Undid {:?}", edit.kind);
                true
            }
            None => false,
        }
    }

    /// Reapply the last undone edit; false when there is nothing to redo
    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(edit) => {
                self.apply(&edit);
                tracing::debug!("Redid {:?}", edit.kind);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // ==================== Persistence ====================

    /// Every annotation as `(onset, duration, label, channels)`, ordered
    pub fn export(&self) -> Vec<AnnotationRecord> {
        self.snapshot().iter().map(AnnotationRecord::from).collect()
    }

    /// Replace the contents with `records`; undoable as one edit
    pub fn import(&mut self, records: Vec<AnnotationRecord>) {
        let before: Vec<Annotation> = self.items.values().cloned().collect();
        let after: Vec<Annotation> = records
            .into_iter()
            .map(|r| Annotation {
                id: self.allocate_id(),
                onset: clamp_time(r.onset),
                duration: clamp_time(r.duration),
                label: r.label,
                channels: r.channels,
            })
            .collect();
        tracing::info!("Imported {} annotations, replacing {}", after.len(), before.len());
        self.commit(Edit::new(EditKind::Import, before, after));
    }

    /// Export as a JSON array of records
    pub fn export_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.export())
            .map_err(|e| ViewerError::Serialization(format!("Failed to serialize annotations: {}", e)))
    }

    /// Import a JSON array of records
    pub fn import_json(&mut self, json: &str) -> Result<()> {
        let records: Vec<AnnotationRecord> = serde_json::from_str(json)
            .map_err(|e| ViewerError::Serialization(format!("Failed to parse annotations: {}", e)))?;
        self.import(records);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn subset(channels: &[usize]) -> ChannelScope {
        ChannelScope::Subset(channels.iter().copied().collect())
    }

    #[test]
    fn test_create_query_delete_scenario() {
        let mut store = AnnotationStore::default();
        let id = store.create(5.0, 2.0, "bad_segment", ChannelScope::All);

        let found = store.query(TimeRange::new(4.0, 8.0));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
        assert_eq!(found[0].label, "bad_segment");

        assert!(store.delete(id).is_some());
        assert!(store.query(TimeRange::new(4.0, 8.0)).is_empty());
    }

    #[test]
    fn test_query_ordering_and_bounds() {
        let mut store = AnnotationStore::default();
        let b = store.create(3.0, 1.0, "b", ChannelScope::All);
        let a = store.create(1.0, 1.0, "a", ChannelScope::All);
        let c = store.create(3.0, 0.5, "c", ChannelScope::All);

        let ids: Vec<_> = store.snapshot().iter().map(|x| x.id).collect();
        assert_eq!(ids, vec![a, b, c]);
        // touching the end counts as overlap
        assert_eq!(store.query(TimeRange::new(2.0, 2.5)).len(), 1);
        assert!(store.query(TimeRange::new(2.1, 2.9)).is_empty());
    }

    #[test]
    fn test_inputs_are_clamped() {
        let mut store = AnnotationStore::default();
        let id = store.create(-3.0, f64::NAN, "x", ChannelScope::All);
        let a = store.get(id).unwrap();
        assert_eq!((a.onset, a.duration), (0.0, 0.0));

        assert!(store.resize(id, 2.0, -1.0));
        assert_eq!(store.get(id).unwrap().duration, 0.0);
        assert!(!store.resize(AnnotationId(999), 1.0, 1.0));
    }

    #[test]
    fn test_overlapping_same_label_kept_apart() {
        let mut store = AnnotationStore::default();
        store.create(1.0, 2.0, "BAD_", ChannelScope::All);
        store.create(2.0, 2.0, "BAD_", ChannelScope::All);
        assert_eq!(store.len(), 2);
        assert_eq!(store.labels(), &["BAD_".to_string()]);
    }

    #[test]
    fn test_undo_redo_each_mutation() {
        let mut store = AnnotationStore::default();
        let id = store.create(1.0, 1.0, "a", ChannelScope::All);
        let created = store.snapshot();

        store.resize(id, 2.0, 3.0);
        store.relabel(id, "b");
        store.set_channels(id, subset(&[1, 2]));
        store.delete(id);
        assert!(store.is_empty());

        for _ in 0..4 {
            assert!(store.undo());
        }
        assert_eq!(store.snapshot(), created);
        for _ in 0..4 {
            assert!(store.redo());
        }
        assert!(store.is_empty());
        assert!(!store.redo());
    }

    #[test]
    fn test_relabel_all_is_one_edit() {
        let mut store = AnnotationStore::default();
        store.create(1.0, 1.0, "BAD_blink", ChannelScope::All);
        store.create(3.0, 1.0, "BAD_blink", subset(&[2]));
        store.create(5.0, 1.0, "keep", ChannelScope::All);

        assert_eq!(store.relabel_all("BAD_blink", "BAD_eye"), 2);
        let labels: Vec<String> = store.snapshot().iter().map(|a| a.label.clone()).collect();
        assert_eq!(labels, vec!["BAD_eye", "BAD_eye", "keep"]);
        assert_eq!(store.labels(), &["keep".to_string(), "BAD_eye".to_string()]);
        assert_eq!(store.snapshot()[1].channels, subset(&[2]));

        assert!(store.undo());
        assert!(store.snapshot().iter().take(2).all(|a| a.label == "BAD_blink"));
        assert!(store.label_index("BAD_blink").is_some());
        assert!(store.label_index("BAD_eye").is_none());
        assert!(store.redo());
        assert!(store.label_index("BAD_blink").is_none());
        assert_eq!(store.snapshot()[0].label, "BAD_eye");

        assert_eq!(store.relabel_all("missing", "x"), 0);
        assert_eq!(store.relabel_all("keep", "keep"), 0);
    }

    #[test]
    fn test_remove_label_deletes_all_its_annotations() {
        let mut store = AnnotationStore::default();
        store.create(1.0, 1.0, "BAD_", ChannelScope::All);
        store.create(4.0, 1.0, "BAD_", ChannelScope::All);
        store.create(2.0, 1.0, "other", ChannelScope::All);

        assert_eq!(store.remove_label("BAD_"), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.labels(), &["other".to_string()]);

        assert!(store.undo());
        assert_eq!(store.len(), 3);
        assert!(store.label_index("BAD_").is_some());

        store.register_label("unused");
        assert_eq!(store.remove_label("unused"), 0);
        assert!(store.label_index("unused").is_none());
    }

    #[test]
    fn test_new_edit_clears_redo() {
        let mut store = AnnotationStore::default();
        store.create(1.0, 1.0, "a", ChannelScope::All);
        store.undo();
        assert!(store.can_redo());
        store.create(2.0, 1.0, "b", ChannelScope::All);
        assert!(!store.can_redo());
    }

    #[test]
    fn test_merge_and_split() {
        let mut store = AnnotationStore::default();
        let a = store.create(1.0, 1.0, "a", subset(&[0]));
        let b = store.create(1.5, 2.0, "b", subset(&[3]));

        let merged = store.merge(&[b, a]).unwrap();
        assert_eq!(merged, a);
        let m = store.get(a).unwrap();
        assert_eq!((m.onset, m.duration), (1.0, 2.5));
        assert_eq!(m.channels, subset(&[0, 3]));
        assert!(store.get(b).is_none());

        let right = store.split(a, 2.0).unwrap();
        assert_eq!(store.get(a).unwrap().duration, 1.0);
        assert_eq!(store.get(right).unwrap().onset, 2.0);
        assert_eq!(store.get(right).unwrap().duration, 1.5);
        assert!(store.split(a, 5.0).is_none());
        assert!(store.merge(&[a]).is_none());

        store.undo();
        store.undo();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(b).unwrap().label, "b");
    }

    #[test]
    fn test_export_import_round_trip() {
        let mut store = AnnotationStore::default();
        store.create(4.0, 1.0, "BAD_blink", ChannelScope::All);
        store.create(1.0, 0.5, "edge", subset(&[2]));
        let json = store.export_json().unwrap();

        let mut other = AnnotationStore::default();
        other.create(9.0, 9.0, "old", ChannelScope::All);
        other.import_json(&json).unwrap();
        assert_eq!(other.export(), store.export());
        assert_eq!(other.export()[0].label, "edge");

        assert!(other.undo());
        assert_eq!(other.export()[0].label, "old");
        assert!(other.import_json("not json").is_err());
    }

    #[test]
    fn test_reader_sees_whole_edits() {
        let mut store = AnnotationStore::default();
        let reader = store.reader();
        let handle = std::thread::spawn(move || {
            for _ in 0..200 {
                let snap = reader.snapshot();
                // A split is published whole: either one piece or both
                assert!(snap.len() <= 2);
                if snap.len() == 2 {
                    assert_eq!(snap[0].end(), snap[1].onset);
                }
            }
        });
        let id = store.create(0.0, 10.0, "x", ChannelScope::All);
        for _ in 0..50 {
            store.split(id, 5.0);
            store.undo();
        }
        handle.join().unwrap();
    }

    #[derive(Debug, Clone)]
    enum Op {
        Create(f64, f64, u8),
        Resize(usize, f64, f64),
        Relabel(usize, u8),
        Delete(usize),
        Undo,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0.0f64..100.0, 0.0f64..10.0, 0u8..3).prop_map(|(o, d, l)| Op::Create(o, d, l)),
            (0usize..8, -5.0f64..100.0, -1.0f64..10.0).prop_map(|(i, o, d)| Op::Resize(i, o, d)),
            (0usize..8, 0u8..3).prop_map(|(i, l)| Op::Relabel(i, l)),
            (0usize..8).prop_map(Op::Delete),
            Just(Op::Undo),
        ]
    }

    proptest! {
        #[test]
        fn prop_undo_create_restores_contents(
            ops in prop::collection::vec(op(), 0..30),
            onset in 0.0f64..100.0,
            duration in 0.0f64..10.0,
        ) {
            let mut store = AnnotationStore::default();
            for op in ops {
                let ids: Vec<_> = store.snapshot().iter().map(|a| a.id).collect();
                let pick = |i: usize| ids.get(i % ids.len().max(1)).copied();
                match op {
                    Op::Create(o, d, l) => { store.create(o, d, format!("L{}", l), ChannelScope::All); }
                    Op::Resize(i, o, d) => { if let Some(id) = pick(i) { store.resize(id, o, d); } }
                    Op::Relabel(i, l) => { if let Some(id) = pick(i) { store.relabel(id, format!("L{}", l)); } }
                    Op::Delete(i) => { if let Some(id) = pick(i) { store.delete(id); } }
                    Op::Undo => { store.undo(); }
                }
            }
            let before = store.snapshot();
            store.create(onset, duration, "new", ChannelScope::All);
            prop_assert!(store.undo());
            prop_assert_eq!(store.snapshot(), before);
        }
    }
}
