//! colpersist core - storage-independent persistence of collection-valued relationships.
//!
//! This crate compiles the SQL needed to keep the rows of one collection (a
//! set, bag, list or map owned by a record) in sync with its in-memory state,
//! and executes those statements through a [`UnitOfWork`] implementation.
//!
//! # Main Components
//!
//! - **Model**: tables, columns, navigable accessors and the collection descriptor
//! - **SQL**: statement AST, renderer and the statement compiler
//! - **Binding**: per-row parameter bindings in compile order
//! - **Change set**: the diff between a collection and its last flushed snapshot
//! - **Executors**: creation, row insert/update/delete, removal and selectors,
//!   bundled per collection in a [`CollectionPersister`]
//! - **Memory**: an in-memory [`UnitOfWork`] that interprets compiled statements
//!
//! # Example
//!
//! ```rust
//! use colpersist_core::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let table = Table::new("order_tags").unwrap();
//! let descriptor = CollectionDescriptor::builder("Order.tags", CollectionClassification::Set, table.clone())
//!     .key(Navigable::basic(NavigableRole::Key, Column::physical(&table, "order_id").unwrap(), ValueType::Integer))
//!     .element(Navigable::basic(NavigableRole::Element, Column::physical(&table, "tag").unwrap(), ValueType::Text))
//!     .build()
//!     .unwrap();
//! let persister = CollectionPersister::new(Arc::new(descriptor), &StatementCompiler::default()).unwrap();
//!
//! let mut db = InMemoryDatabase::new();
//! db.create_table("order_tags", &["order_id", "tag"]);
//!
//! let mut tags = CollectionState::new(CollectionKind::Set, Some(json!(7)));
//! tags.add(json!("a")).unwrap();
//! tags.add(json!("b")).unwrap();
//! persister.flush(&mut tags, None, &mut db).unwrap();
//!
//! assert_eq!(persister.size(&json!(7), &mut db).unwrap(), 2);
//! ```

pub mod binding;
pub mod change_set;
pub mod error;
pub mod exec;
pub mod memory;
pub mod model;
pub mod sql;
pub mod value;

// Re-export main types for convenience
pub use binding::{Binding, BindingContext};
pub use change_set::{
    CollectionKind, CollectionState, Entry, EntryRef, IdentifierSource, PersistentCollection,
};
pub use error::{BackendError, PersistError, PersistResult};
pub use exec::{
    CollectionCreationExecutor, CollectionPersister, CollectionRemovalExecutor,
    ElementExistsSelector, FlushStats, IndexExistsSelector, JoinTableRowsDeletionExecutor,
    JoinTableRowsUpdateExecutor, OneToManyRowsUpdateExecutor, RowByIndexSelector,
    RowInsertionExecutor, RowUpdateCounts, RowsUpdateExecutor, SizeSelector, UnitOfWork,
};
pub use memory::{ExecutedStatement, InMemoryDatabase, MemoryError, MemoryResult};
pub use model::{
    CollectionClassification, CollectionDescriptor, CollectionDescriptorBuilder, Column,
    ColumnKind, IdentifierGenerator, Navigable, NavigablePart, NavigableRole, RelationalForm,
    RowIdentity, SizeStrategy, StorageStrategy, StrategyProfile, Table,
};
pub use sql::{
    Clause, CollectionOperation, CompiledStatement, JdbcParameter, ParameterSlot, ParameterStyle,
    SqlRenderer, StatementCompiler,
};
pub use value::{SqlValue, ValueType};
