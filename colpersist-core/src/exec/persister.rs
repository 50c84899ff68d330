//! Per-collection facade over the executors.
//!
//! A persister compiles every statement its descriptor supports when it is
//! built. Strategy combinations that are deliberately unimplemented are kept as
//! [`Capability::Unsupported`] and reported when used; any other compile error
//! aborts construction.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::creation::{CollectionCreationExecutor, RowInsertionExecutor};
use super::deletion::JoinTableRowsDeletionExecutor;
use super::removal::CollectionRemovalExecutor;
use super::selector::{ElementExistsSelector, IndexExistsSelector, RowByIndexSelector, SizeSelector};
use super::update::{RowUpdateCounts, RowsUpdateExecutor};
use super::{resolve_key, Capability, UnitOfWork};
use crate::change_set::PersistentCollection;
use crate::error::PersistResult;
use crate::model::{CollectionClassification, CollectionDescriptor, StorageStrategy};
use crate::sql::{CompiledStatement, StatementCompiler};

/// Statements issued by one [`CollectionPersister::flush`]
///
/// `updated` counts rows rewritten in place; for owned tables that is the
/// attach statements of changed entries, while their detach statements are
/// counted in `detached`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushStats {
    pub recreated: bool,
    pub removed: u64,
    pub deleted: usize,
    pub detached: usize,
    pub updated: usize,
    pub inserted: usize,
    pub queued: usize,
}

#[derive(Debug)]
pub struct CollectionPersister {
    descriptor: Arc<CollectionDescriptor>,
    creation: Capability<CollectionCreationExecutor>,
    insertion: Capability<RowInsertionExecutor>,
    update: Capability<RowsUpdateExecutor>,
    deletion: Capability<JoinTableRowsDeletionExecutor>,
    removal: CollectionRemovalExecutor,
    row_by_index: Capability<RowByIndexSelector>,
    index_exists: Capability<IndexExistsSelector>,
    element_exists: ElementExistsSelector,
    size: SizeSelector,
}

impl CollectionPersister {
    pub fn new(descriptor: Arc<CollectionDescriptor>, compiler: &StatementCompiler) -> PersistResult<Self> {
        let shared = || Arc::clone(&descriptor);

        let row_by_index = if descriptor.has_index() {
            Capability::Ready(RowByIndexSelector::new(shared(), compiler)?)
        } else {
            Capability::NotApplicable(format!("{}: collection is not indexed", descriptor.role()))
        };
        let index_exists = if descriptor.has_index() || descriptor.has_surrogate_id() {
            Capability::Ready(IndexExistsSelector::new(shared(), compiler)?)
        } else {
            Capability::NotApplicable(format!(
                "{}: collection has neither index nor identifier",
                descriptor.role()
            ))
        };

        let persister = Self {
            creation: Capability::from_result(CollectionCreationExecutor::new(shared(), compiler))?,
            insertion: Capability::from_result(RowInsertionExecutor::new(shared(), compiler))?,
            update: Capability::from_result(RowsUpdateExecutor::new(shared(), compiler))?,
            deletion: Capability::from_result(JoinTableRowsDeletionExecutor::new(shared(), compiler))?,
            removal: CollectionRemovalExecutor::new(shared(), compiler)?,
            row_by_index,
            index_exists,
            element_exists: ElementExistsSelector::new(shared(), compiler)?,
            size: SizeSelector::new(shared(), compiler)?,
            descriptor,
        };
        debug!(
            "Built persister for {} ({} statements)",
            persister.descriptor.role(),
            persister.statements().len()
        );
        Ok(persister)
    }

    pub fn descriptor(&self) -> &CollectionDescriptor {
        &self.descriptor
    }

    pub fn role(&self) -> &str {
        self.descriptor.role()
    }

    fn writes_rows(&self) -> bool {
        !self.descriptor.is_inverse() && self.descriptor.row_insert_enabled()
    }

    fn deletes_rows(&self) -> bool {
        !self.descriptor.is_inverse() && self.descriptor.row_delete_enabled()
    }

    /// Write every entry of a collection that has no stored rows.
    pub fn recreate(
        &self,
        collection: &mut dyn PersistentCollection,
        key: Option<&Value>,
        uow: &mut dyn UnitOfWork,
    ) -> PersistResult<usize> {
        if !self.writes_rows() {
            return Ok(0);
        }
        self.creation.get()?.create(collection, key, uow)
    }

    pub fn insert_rows(
        &self,
        collection: &mut dyn PersistentCollection,
        key: Option<&Value>,
        uow: &mut dyn UnitOfWork,
    ) -> PersistResult<usize> {
        if !self.writes_rows() {
            return Ok(0);
        }
        self.insertion.get()?.execute(collection, key, uow)
    }

    /// Rewrite changed rows. Owned tables also detach removed rows here.
    pub fn update_rows(
        &self,
        collection: &dyn PersistentCollection,
        key: Option<&Value>,
        uow: &mut dyn UnitOfWork,
    ) -> PersistResult<RowUpdateCounts> {
        if self.descriptor.is_inverse() {
            return Ok(RowUpdateCounts::default());
        }
        if self.descriptor.storage() == StorageStrategy::JoinTable && !collection.is_row_update_possible() {
            return Ok(RowUpdateCounts::default());
        }
        self.update.get()?.execute(collection, key, uow)
    }

    pub fn delete_rows(
        &self,
        collection: &dyn PersistentCollection,
        key: Option<&Value>,
        uow: &mut dyn UnitOfWork,
    ) -> PersistResult<usize> {
        if !self.deletes_rows() {
            return Ok(0);
        }
        self.deletion.get()?.execute(collection, key, uow)
    }

    /// Remove every stored row of `key`.
    pub fn remove(&self, key: &Value, uow: &mut dyn UnitOfWork) -> PersistResult<u64> {
        if !self.deletes_rows() {
            return Ok(0);
        }
        self.removal.remove(key, uow)
    }

    /// Write additions queued on a collection that was never read. Ordinal
    /// indices continue after the currently stored size.
    pub fn process_queued_ops(
        &self,
        collection: &dyn PersistentCollection,
        key: Option<&Value>,
        uow: &mut dyn UnitOfWork,
    ) -> PersistResult<usize> {
        if !collection.has_queued_operations() || !self.writes_rows() {
            return Ok(0);
        }
        let key = resolve_key(&self.descriptor, key, collection.recorded_key())?;
        let next_index = if self.descriptor.is_ordinal_indexed() {
            self.size.size(&key, uow)?
        } else {
            0
        };
        let mut additions = Vec::with_capacity(collection.queued_additions().len());
        for element in collection.queued_additions() {
            if self.descriptor.classification() == CollectionClassification::Set
                && self.element_exists.exists(&key, element, uow)?
            {
                debug!("Queued element {} of {} is already stored", element, self.role());
                continue;
            }
            additions.push(element.clone());
        }
        self.insertion.get()?.insert_queued(&additions, &key, next_index, uow)
    }

    /// Bring stored rows in line with the collection, then make its current
    /// state the new snapshot.
    pub fn flush(
        &self,
        collection: &mut dyn PersistentCollection,
        key: Option<&Value>,
        uow: &mut dyn UnitOfWork,
    ) -> PersistResult<FlushStats> {
        let mut stats = FlushStats::default();
        if self.descriptor.is_inverse() {
            debug!("Skipping inverse collection {}", self.role());
            return Ok(stats);
        }
        let owned_key = resolve_key(&self.descriptor, key, collection.recorded_key())?;
        let key = Some(&owned_key);

        if !collection.was_initialized() {
            stats.queued = self.process_queued_ops(&*collection, key, uow)?;
        } else if !collection.has_snapshot() {
            stats.recreated = true;
            stats.inserted = self.recreate(collection, key, uow)?;
        } else if collection.needs_recreate(&self.descriptor) {
            stats.recreated = true;
            stats.removed = self.remove(&owned_key, uow)?;
            stats.inserted = self.recreate(collection, key, uow)?;
        } else {
            if self.descriptor.storage() == StorageStrategy::JoinTable {
                stats.deleted = self.delete_rows(&*collection, key, uow)?;
            }
            let counts = self.update_rows(&*collection, key, uow)?;
            stats.detached = counts.detached;
            stats.updated = counts.updated;
            stats.inserted = self.insert_rows(collection, key, uow)?;
        }
        collection.post_flush();
        debug!("Flushed {}: {:?}", self.role(), stats);
        Ok(stats)
    }

    pub fn size(&self, key: &Value, uow: &mut dyn UnitOfWork) -> PersistResult<usize> {
        self.size.size(key, uow)
    }

    /// `index` is a list position or map key, or the surrogate id for id-bags.
    pub fn index_exists(&self, key: &Value, index: &Value, uow: &mut dyn UnitOfWork) -> PersistResult<bool> {
        self.index_exists.get()?.exists(key, index, uow)
    }

    pub fn element_exists(&self, key: &Value, element: &Value, uow: &mut dyn UnitOfWork) -> PersistResult<bool> {
        self.element_exists.exists(key, element, uow)
    }

    pub fn element_by_index(
        &self,
        key: &Value,
        index: &Value,
        uow: &mut dyn UnitOfWork,
    ) -> PersistResult<Option<Value>> {
        self.row_by_index.get()?.select(key, index, uow)
    }

    /// Every compiled statement, duplicates removed.
    pub fn statements(&self) -> Vec<&CompiledStatement> {
        let mut statements: Vec<&CompiledStatement> = Vec::new();
        if let Some(executor) = self.creation.ready() {
            statements.push(executor.statement());
        }
        if let Some(executor) = self.deletion.ready() {
            statements.push(executor.statement());
        }
        if let Some(executor) = self.update.ready() {
            statements.extend(executor.statements());
        }
        statements.push(self.removal.statement());
        if let Some(selector) = self.row_by_index.ready() {
            statements.push(selector.statement());
        }
        if let Some(selector) = self.index_exists.ready() {
            statements.push(selector.statement());
        }
        statements.push(self.element_exists.statement());
        statements.push(self.size.statement());

        let mut seen = Vec::new();
        statements.retain(|s| {
            if seen.contains(&s.operation()) {
                false
            } else {
                seen.push(s.operation());
                true
            }
        });
        statements
    }

    /// Reasons recorded for operations this persister cannot run.
    pub fn unsupported_operations(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        for capability in [
            reason(&self.creation),
            reason(&self.insertion),
            reason(&self.update),
            reason(&self.deletion),
        ] {
            if let Some(message) = capability {
                if !reasons.contains(&message) {
                    reasons.push(message);
                }
            }
        }
        reasons
    }
}

fn reason<T>(capability: &Capability<T>) -> Option<String> {
    match capability {
        Capability::Unsupported(message) => Some(message.clone()),
        _ => None,
    }
}
