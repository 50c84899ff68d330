//! Human and machine readable description of compiled statements.

use colpersist_core::{
    Clause, CollectionClassification, CollectionOperation, CollectionPersister, CompiledStatement,
    RowIdentity, SizeStrategy, StorageStrategy, ValueType,
};
use serde::Serialize;
use std::fmt::Write;

use crate::error::MappingResult;
use crate::registry::MappingRegistry;

#[derive(Debug, Clone, Serialize)]
pub struct ParameterExplain {
    pub slot: usize,
    pub column: String,
    pub clause: Clause,
    pub value_type: ValueType,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatementExplain {
    pub operation: CollectionOperation,
    pub sql: String,
    pub parameters: Vec<ParameterExplain>,
}

impl From<&CompiledStatement> for StatementExplain {
    fn from(statement: &CompiledStatement) -> Self {
        Self {
            operation: statement.operation(),
            sql: statement.sql().to_string(),
            parameters: statement
                .parameters()
                .iter()
                .map(|p| ParameterExplain {
                    slot: p.slot,
                    column: p.column.to_string(),
                    clause: p.clause,
                    value_type: p.value_type,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionExplain {
    pub role: String,
    pub classification: CollectionClassification,
    pub storage: StorageStrategy,
    pub inverse: bool,
    pub row_identity: RowIdentity,
    pub size_strategy: SizeStrategy,
    pub statements: Vec<StatementExplain>,
    pub unsupported: Vec<String>,
}

impl From<&CollectionPersister> for CollectionExplain {
    fn from(persister: &CollectionPersister) -> Self {
        let descriptor = persister.descriptor();
        let profile = descriptor.profile();
        Self {
            role: descriptor.role().to_string(),
            classification: descriptor.classification(),
            storage: descriptor.storage(),
            inverse: descriptor.is_inverse(),
            row_identity: profile.row_identity(),
            size_strategy: profile.size_strategy(),
            statements: persister.statements().into_iter().map(StatementExplain::from).collect(),
            unsupported: persister.unsupported_operations(),
        }
    }
}

/// Explain one role, or every registered collection when `role` is `None`.
pub fn explain(registry: &MappingRegistry, role: Option<&str>) -> MappingResult<Vec<CollectionExplain>> {
    match role {
        Some(role) => Ok(vec![CollectionExplain::from(registry.get(role)?)]),
        None => Ok(registry.persisters().map(CollectionExplain::from).collect()),
    }
}

pub fn render_text(collections: &[CollectionExplain]) -> String {
    let mut out = String::new();
    for collection in collections {
        let _ = writeln!(
            out,
            "{} ({}, {}{}) identity={} size={}",
            collection.role,
            collection.classification,
            collection.storage,
            if collection.inverse { ", inverse" } else { "" },
            snake(&collection.row_identity),
            snake(&collection.size_strategy),
        );
        for statement in &collection.statements {
            let _ = writeln!(out, "  {:<22} {}", statement.operation.to_string(), statement.sql);
            for p in &statement.parameters {
                let _ = writeln!(
                    out,
                    "  {:<22}   [{}] {} {} {}",
                    "", p.slot, p.clause, p.column, p.value_type
                );
            }
        }
        for reason in &collection.unsupported {
            let _ = writeln!(out, "  unsupported: {}", reason);
        }
    }
    out
}

fn snake<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MappingConfig;

    fn registry() -> MappingRegistry {
        let config = MappingConfig::parse(
            r#"
[[collection]]
role = "Order.tags"
classification = "set"
table = "order_tags"
key = [{ name = "order_id", type = "integer" }]
element = [{ name = "tag", type = "text" }]
"#,
        )
        .unwrap();
        MappingRegistry::build(&config).unwrap()
    }

    #[test]
    fn test_explain_set() {
        let explained = explain(&registry(), Some("Order.tags")).unwrap();
        assert_eq!(explained.len(), 1);
        let tags = &explained[0];
        assert_eq!(tags.row_identity, RowIdentity::KeyAndElement);
        assert!(tags.unsupported.is_empty());

        let insert = tags
            .statements
            .iter()
            .find(|s| s.operation == CollectionOperation::InsertRow)
            .unwrap();
        assert_eq!(insert.sql, "insert into order_tags (order_id, tag) values (?, ?)");
        assert_eq!(insert.parameters.len(), 2);
        assert_eq!(insert.parameters[0].column, "order_tags.order_id");
        assert_eq!(insert.parameters[1].clause, Clause::Values);
    }

    #[test]
    fn test_render_text() {
        let explained = explain(&registry(), None).unwrap();
        let text = render_text(&explained);
        assert!(text.starts_with("Order.tags (set, join_table) identity=key_and_element size=count"));
        assert!(text.contains("delete from order_tags where order_id=?"));
        assert!(text.contains("[0] where order_tags.order_id integer"));
    }

    #[test]
    fn test_json_shape() {
        let explained = explain(&registry(), None).unwrap();
        let json = serde_json::to_value(&explained).unwrap();
        assert_eq!(json[0]["role"], "Order.tags");
        assert_eq!(json[0]["storage"], "join_table");
        assert_eq!(json[0]["statements"][0]["parameters"][0]["clause"], "values");
    }
}
