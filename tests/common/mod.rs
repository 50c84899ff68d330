//! Common test utilities for collection persistence tests
//!
//! Provides shared helpers for:
//! - Building a registry from the fixture mapping
//! - Creating an in-memory database with every fixture table
//! - Reading rows back as plain values

#![allow(dead_code)]

use colpersist::{MappingConfig, MappingRegistry};
use colpersist_core::{InMemoryDatabase, SqlValue};
use serde_json::Value;

pub const MAPPING: &str = r#"
[[collection]]
role = "Order.tags"
classification = "set"
table = "order_tags"
key = [{ name = "order_id", type = "integer" }]
element = [{ name = "tag", type = "text" }]

[[collection]]
role = "Order.items"
classification = "bag"
table = "order_items"
key = [{ name = "order_id", type = "integer" }]
element = [{ name = "item", type = "text" }]

[[collection]]
role = "Order.lines"
classification = "list"
table = "order_lines"
key = [{ name = "order_id", type = "integer" }]
element = [{ name = "line", type = "text" }]
index = [{ name = "pos", type = "integer" }]

[[collection]]
role = "Order.steps"
classification = "list"
table = "order_steps"
base_index = 1
key = [{ name = "order_id", type = "integer" }]
element = [{ name = "step", type = "text" }]
index = [{ name = "pos", type = "integer" }]

[[collection]]
role = "Order.attributes"
classification = "map"
table = "order_attrs"
key = [{ name = "order_id", type = "integer" }]
element = [{ name = "attr_value", type = "text" }]
index = [{ name = "attr_name", type = "text" }]

[[collection]]
role = "Order.notes"
classification = "bag"
table = "order_notes"
key = [{ name = "order_id", type = "integer" }]
element = [{ name = "note", type = "text" }]
identifier = { columns = [{ name = "note_id", type = "integer" }], generator = "increment", start = 100 }

[[collection]]
role = "Customer.orders"
classification = "bag"
storage = "owned_table"
table = "orders"
key = [{ name = "customer_id", type = "integer" }]
element = [{ name = "id", type = "integer" }]

[[collection]]
role = "Customer.addresses"
classification = "list"
storage = "owned_table"
table = "addresses"
key = [{ name = "customer_id", type = "integer" }]
element = [{ name = "id", type = "integer" }]
index = [{ name = "pos", type = "integer" }]
"#;

pub fn create_registry() -> MappingRegistry {
    let config = MappingConfig::parse(MAPPING).expect("Failed to parse fixture mapping");
    MappingRegistry::build(&config).expect("Failed to build registry")
}

pub fn create_database() -> InMemoryDatabase {
    let mut db = InMemoryDatabase::new();
    db.create_table("order_tags", &["order_id", "tag"]);
    db.create_table("order_items", &["order_id", "item"]);
    db.create_table("order_lines", &["order_id", "pos", "line"]);
    db.create_table("order_steps", &["order_id", "pos", "step"]);
    db.create_table("order_attrs", &["order_id", "attr_name", "attr_value"]);
    db.create_table("order_notes", &["order_id", "note_id", "note"]);
    db.create_table("orders", &["id", "customer_id"]);
    db.create_table("addresses", &["id", "customer_id", "pos"]);
    db
}

pub fn setup() -> (MappingRegistry, InMemoryDatabase) {
    (create_registry(), create_database())
}

/// One column of every row, in storage order, as domain values.
pub fn column(db: &InMemoryDatabase, table: &str, column: &str) -> Vec<Value> {
    db.rows(table)
        .expect("Unknown table")
        .iter()
        .map(|row| row.get(column).cloned().unwrap_or(SqlValue::Null).to_domain())
        .collect()
}

/// Rows of `table` whose `filter` column holds `value`, projected to `columns`.
pub fn rows_where(
    db: &InMemoryDatabase,
    table: &str,
    filter: &str,
    value: SqlValue,
    columns: &[&str],
) -> Vec<Vec<Value>> {
    db.rows(table)
        .expect("Unknown table")
        .iter()
        .filter(|row| row.get(filter) == Some(&value))
        .map(|row| {
            columns
                .iter()
                .map(|c| row.get(*c).cloned().unwrap_or(SqlValue::Null).to_domain())
                .collect()
        })
        .collect()
}

/// Seed rows of a join table for one owning key.
pub fn seed(db: &mut InMemoryDatabase, table: &str, rows: &[&[(&str, SqlValue)]]) {
    for row in rows {
        db.insert_row(table, row).expect("Failed to seed row");
    }
}
