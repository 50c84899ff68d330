//! Collection change sets.
//!
//! Executors never look inside an in-memory collection directly. They walk it
//! through [`PersistentCollection`], which exposes the current entries, the
//! diff against the last flushed snapshot and the hooks called around inserts.
//! [`CollectionState`] is the stock implementation: entries live in a vector and
//! are addressed by [`EntryRef`] (their position), so executors hold no
//! references into the collection while they mutate it through the hooks.

use serde_json::Value;

use crate::error::{PersistError, PersistResult};
use crate::model::{
    CollectionClassification, CollectionDescriptor, IdentifierGenerator, StorageStrategy,
};

static NULL_VALUE: Value = Value::Null;

/// Position of an entry in [`PersistentCollection::entries`]; doubles as the
/// ordinal for ordered collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryRef(pub usize);

impl EntryRef {
    pub fn ordinal(self) -> usize {
        self.0
    }
}

/// Hands out surrogate ids for entries that do not have one yet.
pub trait IdentifierSource {
    fn next_identifier(&self) -> Value;
}

impl IdentifierSource for IdentifierGenerator {
    fn next_identifier(&self) -> Value {
        self.generate()
    }
}

pub trait PersistentCollection {
    /// Owning key recorded when the collection was loaded or attached
    fn recorded_key(&self) -> Option<&Value>;

    /// False for a lazy collection whose contents were never read. Only queued
    /// operations can be flushed for it.
    fn was_initialized(&self) -> bool;

    /// False until the collection has been loaded or flushed once.
    fn has_snapshot(&self) -> bool;

    fn entries(&self) -> Vec<EntryRef>;

    /// Whether the entry should be written at all (null list slots are not).
    fn entry_exists(&self, entry: EntryRef) -> bool;

    fn element_for(&self, entry: EntryRef) -> &Value;

    /// In-memory index: list position or map key.
    fn index_for(&self, entry: EntryRef) -> Option<Value>;

    fn identifier_for(&self, entry: EntryRef) -> Option<&Value>;

    /// Element the snapshot holds for the same position, key or id.
    fn snapshot_element_at(&self, entry: EntryRef) -> Option<&Value>;

    fn needs_inserting(&self, entry: EntryRef) -> bool;

    fn needs_updating(&self, entry: EntryRef) -> bool;

    /// Snapshot rows gone from the collection: surrogate ids for id-bags,
    /// otherwise in-memory indices when `by_index`, else snapshot elements.
    fn deletes(&self, by_index: bool) -> Vec<Value>;

    /// An element was removed from the middle of an ordered collection.
    fn element_removed(&self) -> bool;

    fn is_row_update_possible(&self) -> bool;

    /// Row-level diffing cannot express the change; the whole collection must
    /// be removed and written again.
    fn needs_recreate(&self, descriptor: &CollectionDescriptor) -> bool;

    fn queued_additions(&self) -> &[Value];

    fn has_queued_operations(&self) -> bool {
        !self.queued_additions().is_empty()
    }

    fn pre_insert(&mut self, _ids: Option<&dyn IdentifierSource>) {}

    fn after_row_insert(&mut self, _entry: EntryRef) {}

    /// Current state becomes the snapshot.
    fn post_flush(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Set,
    Bag,
    /// Bag whose rows carry a surrogate id
    IdBag,
    List,
    Map,
}

impl CollectionKind {
    pub fn for_descriptor(descriptor: &CollectionDescriptor) -> Self {
        match descriptor.classification() {
            CollectionClassification::Set => CollectionKind::Set,
            CollectionClassification::Bag if descriptor.has_surrogate_id() => CollectionKind::IdBag,
            CollectionClassification::Bag => CollectionKind::Bag,
            CollectionClassification::List => CollectionKind::List,
            CollectionClassification::Map => CollectionKind::Map,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub element: Value,
    /// Map key; lists use their position instead
    pub index: Option<Value>,
    pub identifier: Option<Value>,
}

impl Entry {
    pub fn element(element: Value) -> Self {
        Self {
            element,
            index: None,
            identifier: None,
        }
    }

    pub fn keyed(index: Value, element: Value) -> Self {
        Self {
            element,
            index: Some(index),
            identifier: None,
        }
    }

    pub fn identified(identifier: Value, element: Value) -> Self {
        Self {
            element,
            index: None,
            identifier: Some(identifier),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectionState {
    kind: CollectionKind,
    key: Option<Value>,
    initialized: bool,
    entries: Vec<Entry>,
    snapshot: Option<Vec<Entry>>,
    queued: Vec<Value>,
    element_removed: bool,
    inserted: Vec<EntryRef>,
}

impl CollectionState {
    /// A collection created in memory, never written.
    pub fn new(kind: CollectionKind, key: Option<Value>) -> Self {
        Self {
            kind,
            key,
            initialized: true,
            entries: Vec::new(),
            snapshot: None,
            queued: Vec::new(),
            element_removed: false,
            inserted: Vec::new(),
        }
    }

    /// A collection read from the store; `entries` become the snapshot.
    pub fn loaded(kind: CollectionKind, key: Value, entries: Vec<Entry>) -> Self {
        Self {
            snapshot: Some(entries.clone()),
            entries,
            ..Self::new(kind, Some(key))
        }
    }

    /// A lazy collection that was never read. Additions are queued.
    pub fn uninitialized(kind: CollectionKind, key: Value) -> Self {
        Self {
            initialized: false,
            ..Self::new(kind, Some(key))
        }
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn key(&self) -> Option<&Value> {
        self.key.as_ref()
    }

    pub fn set_key(&mut self, key: Value) {
        self.key = Some(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn elements(&self) -> Vec<&Value> {
        self.entries.iter().map(|e| &e.element).collect()
    }

    /// Entries written since the last flush, in insert order
    pub fn inserted(&self) -> &[EntryRef] {
        &self.inserted
    }

    pub fn add(&mut self, element: Value) -> PersistResult<bool> {
        self.require_initialized("add")?;
        self.reject_kind(CollectionKind::Map, "add")?;
        if self.kind == CollectionKind::Set && self.entries.iter().any(|e| e.element == element) {
            return Ok(false);
        }
        self.entries.push(Entry::element(element));
        Ok(true)
    }

    pub fn remove_element(&mut self, element: &Value) -> PersistResult<bool> {
        self.require_initialized("remove")?;
        self.reject_kind(CollectionKind::Map, "remove")?;
        match self.entries.iter().position(|e| &e.element == element) {
            Some(position) => {
                self.entries.remove(position);
                if self.kind == CollectionKind::List {
                    self.element_removed = true;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove_at(&mut self, position: usize) -> PersistResult<Option<Value>> {
        self.require_initialized("remove_at")?;
        self.require_kind(CollectionKind::List, "remove_at")?;
        if position >= self.entries.len() {
            return Ok(None);
        }
        self.element_removed = true;
        Ok(Some(self.entries.remove(position).element))
    }

    pub fn set(&mut self, position: usize, element: Value) -> PersistResult<Value> {
        self.require_initialized("set")?;
        self.require_kind(CollectionKind::List, "set")?;
        let len = self.entries.len();
        let entry = self.entries.get_mut(position).ok_or_else(|| {
            PersistError::conversion(format!("position {} out of bounds for list of {}", position, len))
        })?;
        Ok(std::mem::replace(&mut entry.element, element))
    }

    pub fn put(&mut self, index: Value, element: Value) -> PersistResult<Option<Value>> {
        self.require_initialized("put")?;
        self.require_kind(CollectionKind::Map, "put")?;
        match self
            .entries
            .iter_mut()
            .find(|e| e.index.as_ref() == Some(&index))
        {
            Some(entry) => Ok(Some(std::mem::replace(&mut entry.element, element))),
            None => {
                self.entries.push(Entry::keyed(index, element));
                Ok(None)
            }
        }
    }

    pub fn remove_key(&mut self, index: &Value) -> PersistResult<Option<Value>> {
        self.require_initialized("remove_key")?;
        self.require_kind(CollectionKind::Map, "remove_key")?;
        match self
            .entries
            .iter()
            .position(|e| e.index.as_ref() == Some(index))
        {
            Some(position) => Ok(Some(self.entries.remove(position).element)),
            None => Ok(None),
        }
    }

    /// Add without reading the collection. Initialized collections take the
    /// element directly; a set queues each element once.
    pub fn queue_addition(&mut self, element: Value) -> PersistResult<()> {
        self.reject_kind(CollectionKind::Map, "queue")?;
        if self.initialized {
            self.add(element)?;
        } else if self.kind != CollectionKind::Set || !self.queued.contains(&element) {
            self.queued.push(element);
        }
        Ok(())
    }

    fn require_initialized(&self, operation: &str) -> PersistResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(PersistError::configuration(format!(
                "cannot {} on an uninitialized collection",
                operation
            )))
        }
    }

    fn require_kind(&self, kind: CollectionKind, operation: &str) -> PersistResult<()> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(PersistError::configuration(format!(
                "{} is not supported on a {:?} collection",
                operation, self.kind
            )))
        }
    }

    fn reject_kind(&self, kind: CollectionKind, operation: &str) -> PersistResult<()> {
        if self.kind == kind {
            Err(PersistError::configuration(format!(
                "{} is not supported on a {:?} collection",
                operation, self.kind
            )))
        } else {
            Ok(())
        }
    }

    fn snapshot_entries(&self) -> &[Entry] {
        self.snapshot.as_deref().unwrap_or(&[])
    }

    fn entry(&self, entry: EntryRef) -> Option<&Entry> {
        self.entries.get(entry.0)
    }

    fn snapshot_by_index(&self, index: &Value) -> Option<&Entry> {
        self.snapshot_entries()
            .iter()
            .find(|s| s.index.as_ref() == Some(index))
    }

    fn snapshot_by_id(&self, id: &Value) -> Option<&Entry> {
        self.snapshot_entries()
            .iter()
            .find(|s| s.identifier.as_ref() == Some(id))
    }

    /// Snapshot counterpart of an entry, matched by position, key or id.
    fn counterpart(&self, entry: EntryRef) -> Option<&Entry> {
        let current = self.entry(entry)?;
        match self.kind {
            CollectionKind::List => self.snapshot_entries().get(entry.0),
            CollectionKind::Map => current.index.as_ref().and_then(|k| self.snapshot_by_index(k)),
            CollectionKind::IdBag => current.identifier.as_ref().and_then(|id| self.snapshot_by_id(id)),
            CollectionKind::Set | CollectionKind::Bag => None,
        }
    }

    fn occurrences(entries: &[Entry], element: &Value) -> usize {
        entries.iter().filter(|e| &e.element == element).count()
    }
}

impl PersistentCollection for CollectionState {
    fn recorded_key(&self) -> Option<&Value> {
        self.key.as_ref()
    }

    fn was_initialized(&self) -> bool {
        self.initialized
    }

    fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    fn entries(&self) -> Vec<EntryRef> {
        (0..self.entries.len()).map(EntryRef).collect()
    }

    fn entry_exists(&self, entry: EntryRef) -> bool {
        self.entry(entry).is_some_and(|e| !e.element.is_null())
    }

    fn element_for(&self, entry: EntryRef) -> &Value {
        self.entry(entry).map(|e| &e.element).unwrap_or(&NULL_VALUE)
    }

    fn index_for(&self, entry: EntryRef) -> Option<Value> {
        match self.kind {
            CollectionKind::List => Some(Value::from(entry.0 as i64)),
            CollectionKind::Map => self.entry(entry).and_then(|e| e.index.clone()),
            _ => None,
        }
    }

    fn identifier_for(&self, entry: EntryRef) -> Option<&Value> {
        self.entry(entry).and_then(|e| e.identifier.as_ref())
    }

    fn snapshot_element_at(&self, entry: EntryRef) -> Option<&Value> {
        self.counterpart(entry).map(|s| &s.element)
    }

    fn needs_inserting(&self, entry: EntryRef) -> bool {
        let Some(current) = self.entry(entry) else {
            return false;
        };
        if current.element.is_null() {
            return false;
        }
        match self.kind {
            CollectionKind::Set => !self
                .snapshot_entries()
                .iter()
                .any(|s| s.element == current.element),
            CollectionKind::Bag => {
                let occurrence = Self::occurrences(&self.entries[..=entry.0], &current.element);
                occurrence > Self::occurrences(self.snapshot_entries(), &current.element)
            }
            CollectionKind::IdBag if current.identifier.is_none() => true,
            CollectionKind::IdBag | CollectionKind::List | CollectionKind::Map => {
                match self.counterpart(entry) {
                    None => true,
                    Some(s) => s.element.is_null(),
                }
            }
        }
    }

    fn needs_updating(&self, entry: EntryRef) -> bool {
        let Some(current) = self.entry(entry) else {
            return false;
        };
        if current.element.is_null() {
            return false;
        }
        match self.kind {
            CollectionKind::Set | CollectionKind::Bag => false,
            _ => self
                .counterpart(entry)
                .is_some_and(|s| !s.element.is_null() && s.element != current.element),
        }
    }

    fn deletes(&self, by_index: bool) -> Vec<Value> {
        let snapshot = self.snapshot_entries();
        match self.kind {
            CollectionKind::Set => snapshot
                .iter()
                .filter(|s| !self.entries.iter().any(|e| e.element == s.element))
                .map(|s| s.element.clone())
                .collect(),
            CollectionKind::Bag => {
                let mut deletes = Vec::new();
                for (i, s) in snapshot.iter().enumerate() {
                    let seen = Self::occurrences(&snapshot[..i], &s.element);
                    if seen >= Self::occurrences(&self.entries, &s.element) {
                        deletes.push(s.element.clone());
                    }
                }
                deletes
            }
            CollectionKind::IdBag => snapshot
                .iter()
                .filter_map(|s| s.identifier.as_ref())
                .filter(|id| !self.entries.iter().any(|e| e.identifier.as_ref() == Some(*id)))
                .cloned()
                .collect(),
            CollectionKind::List => {
                let mut deletes = Vec::new();
                for (i, s) in snapshot.iter().enumerate() {
                    let gone = match self.entries.get(i) {
                        None => true,
                        Some(current) => current.element.is_null() && !s.element.is_null(),
                    };
                    if !gone {
                        continue;
                    }
                    if by_index {
                        deletes.push(Value::from(i as i64));
                    } else if !s.element.is_null() {
                        deletes.push(s.element.clone());
                    }
                }
                deletes
            }
            CollectionKind::Map => snapshot
                .iter()
                .filter(|s| !s.element.is_null())
                .filter(|s| {
                    !self
                        .entries
                        .iter()
                        .any(|e| e.index == s.index && !e.element.is_null())
                })
                .filter_map(|s| {
                    if by_index {
                        s.index.clone()
                    } else {
                        Some(s.element.clone())
                    }
                })
                .collect(),
        }
    }

    fn element_removed(&self) -> bool {
        self.element_removed
    }

    fn is_row_update_possible(&self) -> bool {
        !matches!(self.kind, CollectionKind::Set | CollectionKind::Bag)
    }

    fn needs_recreate(&self, descriptor: &CollectionDescriptor) -> bool {
        // a plain bag row cannot be addressed once duplicates exist
        if self.kind == CollectionKind::Bag
            && descriptor.storage() == StorageStrategy::JoinTable
            && !self.deletes(false).is_empty()
        {
            return true;
        }

        // composite restriction values with a null part never match `col = ?`
        let (navigable, use_index) = match descriptor.index() {
            Some(index) => (index, true),
            None => (descriptor.element(), false),
        };
        if navigable.column_count() < 2 {
            return false;
        }
        self.entries
            .iter()
            .filter(|e| !e.element.is_null())
            .any(|e| {
                let value = if use_index {
                    e.index.as_ref().unwrap_or(&NULL_VALUE)
                } else {
                    &e.element
                };
                navigable
                    .unresolve(value)
                    .map(|form| form.values().iter().any(Value::is_null))
                    .unwrap_or(false)
            })
    }

    fn queued_additions(&self) -> &[Value] {
        &self.queued
    }

    fn pre_insert(&mut self, ids: Option<&dyn IdentifierSource>) {
        let Some(ids) = ids else {
            return;
        };
        if self.kind != CollectionKind::IdBag {
            return;
        }
        for entry in self.entries.iter_mut() {
            if entry.identifier.is_none() && !entry.element.is_null() {
                entry.identifier = Some(ids.next_identifier());
            }
        }
    }

    fn after_row_insert(&mut self, entry: EntryRef) {
        self.inserted.push(entry);
    }

    fn post_flush(&mut self) {
        if self.initialized {
            self.snapshot = Some(self.entries.clone());
        }
        self.queued.clear();
        self.element_removed = false;
        self.inserted.clear();
    }
}
