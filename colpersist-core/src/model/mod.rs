//! Mapping model consumed by the compiler and executors.

pub mod column;
pub mod descriptor;
pub mod navigable;

pub use column::{Column, ColumnKind, Table};
pub use descriptor::{
    CollectionClassification, CollectionDescriptor, CollectionDescriptorBuilder,
    IdentifierGenerator, RowIdentity, SizeStrategy, StorageStrategy, StrategyProfile,
    SurrogateId,
};
pub use navigable::{Navigable, NavigablePart, NavigableRole, RelationalForm};
