//! SQL generation for collection operations
//!
//! Descriptors are compiled into an AST, parameters are registered while the AST
//! is built, and the AST is rendered once into SQL text.

pub mod ast;
pub mod compiled;
pub mod compiler;
pub mod render;

pub use compiled::{Clause, CompiledStatement, JdbcParameter, ParameterListBuilder, ParameterSlot};
pub use compiler::{CollectionOperation, StatementCompiler};
pub use render::{ParameterStyle, SqlRenderer};
