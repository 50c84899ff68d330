//! Collection descriptors.
//!
//! Built once from the mapping at startup and shared read-only afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use super::column::{Column, Table};
use super::navigable::{Navigable, NavigableRole};
use crate::error::{PersistError, PersistResult};
use crate::value::ValueType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionClassification {
    Set,
    List,
    Bag,
    Map,
}

impl fmt::Display for CollectionClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollectionClassification::Set => "set",
            CollectionClassification::List => "list",
            CollectionClassification::Bag => "bag",
            CollectionClassification::Map => "map",
        };
        f.write_str(name)
    }
}

/// Where collection rows live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageStrategy {
    /// Dedicated collection table
    JoinTable,
    /// Rows of the element's own table, linked back by a foreign key (one-to-many)
    OwnedTable,
}

impl fmt::Display for StorageStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageStrategy::JoinTable => f.write_str("join_table"),
            StorageStrategy::OwnedTable => f.write_str("owned_table"),
        }
    }
}

/// How a row is addressed by UPDATE/DELETE restrictions, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowIdentity {
    SurrogateId,
    KeyAndIndex,
    KeyAndElement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeStrategy {
    /// `max(index) + 1`, adjusted by the base index when read
    MaxIndex,
    /// `count(1)`
    Count,
}

/// Capability flags the compiler dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrategyProfile {
    pub storage: StorageStrategy,
    pub has_surrogate_id: bool,
    pub has_index: bool,
    pub has_physical_index: bool,
    pub ordinal_index: bool,
}

impl StrategyProfile {
    pub fn row_identity(&self) -> RowIdentity {
        if self.has_surrogate_id {
            RowIdentity::SurrogateId
        } else if self.has_physical_index {
            RowIdentity::KeyAndIndex
        } else {
            RowIdentity::KeyAndElement
        }
    }

    /// Index columns may be assigned by a row update only if they are physical
    /// and not what identifies the row.
    pub fn index_assignable(&self) -> bool {
        self.has_physical_index && self.row_identity() != RowIdentity::KeyAndIndex
    }

    pub fn size_strategy(&self) -> SizeStrategy {
        if self.ordinal_index && self.has_physical_index {
            SizeStrategy::MaxIndex
        } else {
            SizeStrategy::Count
        }
    }

    /// Row deletions are addressed by index rather than by element.
    pub fn deletes_by_index(&self) -> bool {
        self.storage == StorageStrategy::JoinTable
            && self.row_identity() == RowIdentity::KeyAndIndex
    }
}

/// Source of surrogate ids for entries that have none yet.
#[derive(Debug)]
pub enum IdentifierGenerator {
    Increment(AtomicI64),
    Uuid,
}

impl IdentifierGenerator {
    pub fn increment_from(start: i64) -> Self {
        IdentifierGenerator::Increment(AtomicI64::new(start))
    }

    pub fn generate(&self) -> Value {
        match self {
            IdentifierGenerator::Increment(next) => {
                Value::from(next.fetch_add(1, Ordering::SeqCst))
            }
            IdentifierGenerator::Uuid => Value::String(uuid::Uuid::now_v7().to_string()),
        }
    }
}

#[derive(Debug)]
pub struct SurrogateId {
    pub navigable: Navigable,
    pub generator: IdentifierGenerator,
}

#[derive(Debug)]
pub struct CollectionDescriptor {
    role: String,
    classification: CollectionClassification,
    storage: StorageStrategy,
    table: Table,
    key: Navigable,
    element: Navigable,
    index: Option<Navigable>,
    identifier: Option<SurrogateId>,
    inverse: bool,
    base_index: i64,
    row_insert_enabled: bool,
    row_delete_enabled: bool,
}

impl CollectionDescriptor {
    pub fn builder(
        role: impl Into<String>,
        classification: CollectionClassification,
        table: Table,
    ) -> CollectionDescriptorBuilder {
        CollectionDescriptorBuilder {
            role: role.into(),
            classification,
            storage: StorageStrategy::JoinTable,
            table,
            key: None,
            element: None,
            index: None,
            identifier: None,
            inverse: false,
            base_index: 0,
            row_insert_enabled: true,
            row_delete_enabled: true,
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn classification(&self) -> CollectionClassification {
        self.classification
    }

    pub fn storage(&self) -> StorageStrategy {
        self.storage
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn key(&self) -> &Navigable {
        &self.key
    }

    pub fn element(&self) -> &Navigable {
        &self.element
    }

    pub fn index(&self) -> Option<&Navigable> {
        self.index.as_ref()
    }

    pub fn identifier(&self) -> Option<&Navigable> {
        self.identifier.as_ref().map(|id| &id.navigable)
    }

    pub fn identifier_generator(&self) -> Option<&IdentifierGenerator> {
        self.identifier.as_ref().map(|id| &id.generator)
    }

    pub fn is_inverse(&self) -> bool {
        self.inverse
    }

    pub fn base_index(&self) -> i64 {
        self.base_index
    }

    pub fn row_insert_enabled(&self) -> bool {
        self.row_insert_enabled
    }

    pub fn row_delete_enabled(&self) -> bool {
        self.row_delete_enabled
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    pub fn has_physical_index(&self) -> bool {
        self.index.as_ref().is_some_and(|idx| !idx.has_formula())
    }

    pub fn has_surrogate_id(&self) -> bool {
        self.identifier.is_some()
    }

    /// Lists store their position; map keys are not ordinals.
    pub fn is_ordinal_indexed(&self) -> bool {
        self.classification == CollectionClassification::List && self.index.is_some()
    }

    pub fn profile(&self) -> StrategyProfile {
        StrategyProfile {
            storage: self.storage,
            has_surrogate_id: self.has_surrogate_id(),
            has_index: self.has_index(),
            has_physical_index: self.has_physical_index(),
            ordinal_index: self.is_ordinal_indexed(),
        }
    }

    /// Physical index value for an in-memory index: ordinals are shifted by the
    /// base index, map keys are used as-is.
    pub fn index_to_stored(&self, index: &Value) -> PersistResult<Value> {
        if !self.is_ordinal_indexed() || self.base_index == 0 {
            return Ok(index.clone());
        }
        let ordinal = index.as_i64().ok_or_else(|| {
            PersistError::conversion(format!(
                "list index {} of {} is not an integer",
                index, self.role
            ))
        })?;
        let stored = ordinal.checked_add(self.base_index).ok_or_else(|| {
            PersistError::conversion(format!(
                "list index {} of {} overflows with base index {}",
                ordinal, self.role, self.base_index
            ))
        })?;
        Ok(Value::from(stored))
    }

    /// Inverse of [`index_to_stored`](Self::index_to_stored).
    pub fn index_from_stored(&self, stored: &Value) -> PersistResult<Value> {
        if !self.is_ordinal_indexed() || self.base_index == 0 {
            return Ok(stored.clone());
        }
        let position = stored.as_i64().ok_or_else(|| {
            PersistError::conversion(format!(
                "stored index {} of {} is not an integer",
                stored, self.role
            ))
        })?;
        let ordinal = position.checked_sub(self.base_index).ok_or_else(|| {
            PersistError::conversion(format!(
                "stored index {} of {} underflows with base index {}",
                position, self.role, self.base_index
            ))
        })?;
        Ok(Value::from(ordinal))
    }
}

pub struct CollectionDescriptorBuilder {
    role: String,
    classification: CollectionClassification,
    storage: StorageStrategy,
    table: Table,
    key: Option<Navigable>,
    element: Option<Navigable>,
    index: Option<Navigable>,
    identifier: Option<SurrogateId>,
    inverse: bool,
    base_index: i64,
    row_insert_enabled: bool,
    row_delete_enabled: bool,
}

impl CollectionDescriptorBuilder {
    pub fn storage(mut self, storage: StorageStrategy) -> Self {
        self.storage = storage;
        self
    }

    pub fn key(mut self, key: Navigable) -> Self {
        self.key = Some(key);
        self
    }

    pub fn element(mut self, element: Navigable) -> Self {
        self.element = Some(element);
        self
    }

    pub fn index(mut self, index: Navigable) -> Self {
        self.index = Some(index);
        self
    }

    pub fn identifier(mut self, navigable: Navigable, generator: IdentifierGenerator) -> Self {
        self.identifier = Some(SurrogateId {
            navigable,
            generator,
        });
        self
    }

    pub fn inverse(mut self, inverse: bool) -> Self {
        self.inverse = inverse;
        self
    }

    pub fn base_index(mut self, base_index: i64) -> Self {
        self.base_index = base_index;
        self
    }

    pub fn row_insert_enabled(mut self, enabled: bool) -> Self {
        self.row_insert_enabled = enabled;
        self
    }

    pub fn row_delete_enabled(mut self, enabled: bool) -> Self {
        self.row_delete_enabled = enabled;
        self
    }

    pub fn build(self) -> PersistResult<CollectionDescriptor> {
        let role = self.role;
        let fail = |msg: String| PersistError::configuration(format!("{}: {}", role, msg));

        let key = self.key.ok_or_else(|| fail("missing key navigable".to_string()))?;
        let element = self
            .element
            .ok_or_else(|| fail("missing element navigable".to_string()))?;

        let mut navigables: Vec<(NavigableRole, &Navigable)> =
            vec![(NavigableRole::Key, &key), (NavigableRole::Element, &element)];
        if let Some(index) = &self.index {
            navigables.push((NavigableRole::Index, index));
        }
        if let Some(id) = &self.identifier {
            navigables.push((NavigableRole::Identifier, &id.navigable));
        }

        let mut seen: Vec<&Column> = Vec::new();
        for (expected, navigable) in &navigables {
            if navigable.role() != *expected {
                return Err(fail(format!(
                    "{} navigable registered as {}",
                    navigable.role(),
                    expected
                )));
            }
            if *expected != NavigableRole::Index && navigable.has_formula() {
                return Err(fail(format!("{} columns cannot be formulas", expected)));
            }
            for (column, _) in navigable.columns() {
                if column.table() != self.table.name() {
                    return Err(fail(format!(
                        "column {} is not on table {}",
                        column, self.table
                    )));
                }
                if seen.contains(&column) {
                    return Err(fail(format!("column {} is mapped twice", column)));
                }
                seen.push(column);
            }
        }

        let indexed = matches!(
            self.classification,
            CollectionClassification::List | CollectionClassification::Map
        );
        match (&self.index, indexed) {
            (None, true) => {
                return Err(fail(format!("a {} requires an index", self.classification)));
            }
            (Some(_), false) => {
                return Err(fail(format!("a {} cannot have an index", self.classification)));
            }
            _ => {}
        }

        if self.classification == CollectionClassification::List {
            if let Some(index) = &self.index {
                let ordinal = index.column_count() == 1
                    && index.columns()[0].1 == ValueType::Integer;
                if !ordinal {
                    return Err(fail("list index must be a single integer column".to_string()));
                }
            }
        } else if self.base_index != 0 {
            return Err(fail(format!(
                "base index only applies to lists, not a {}",
                self.classification
            )));
        }

        if self.identifier.is_some() && self.classification != CollectionClassification::Bag {
            return Err(fail(format!(
                "surrogate ids are only supported on bags, not a {}",
                self.classification
            )));
        }

        if self.storage == StorageStrategy::JoinTable
            && (!self.row_insert_enabled || !self.row_delete_enabled)
        {
            return Err(fail(
                "row insert/delete toggles only apply to owned-table collections".to_string(),
            ));
        }

        Ok(CollectionDescriptor {
            role,
            classification: self.classification,
            storage: self.storage,
            table: self.table,
            key,
            element,
            index: self.index,
            identifier: self.identifier,
            inverse: self.inverse,
            base_index: self.base_index,
            row_insert_enabled: self.row_insert_enabled,
            row_delete_enabled: self.row_delete_enabled,
        })
    }
}
