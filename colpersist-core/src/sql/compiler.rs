//! Statement compiler.
//!
//! Builds the AST for one collection operation from a descriptor, registers one
//! parameter per bound column in the order the AST is rendered, and renders the
//! SQL. Compilation happens once per (descriptor, operation) when a persister is
//! built; anything the descriptor cannot support fails here, never at flush time.

use serde::Serialize;
use std::fmt;

use super::ast::*;
use super::compiled::{Clause, CompiledStatement, ParameterListBuilder};
use super::render::{ParameterStyle, SqlRenderer};
use crate::error::{PersistError, PersistResult};
use crate::model::{
    CollectionDescriptor, Navigable, RowIdentity, SizeStrategy, StorageStrategy,
};
use crate::value::SqlValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionOperation {
    /// Write one row (an UPDATE of the foreign key for owned tables)
    InsertRow,
    /// Remove every row of one owning key
    DeleteAll,
    DeleteRow,
    UpdateRow,
    /// Owned tables only: clear the foreign key of a removed element
    DetachRow,
    RowExistsByIndex,
    RowExistsByElement,
    SelectRowByIndex,
    Size,
}

impl CollectionOperation {
    pub const ALL: [CollectionOperation; 9] = [
        CollectionOperation::InsertRow,
        CollectionOperation::DeleteAll,
        CollectionOperation::DeleteRow,
        CollectionOperation::UpdateRow,
        CollectionOperation::DetachRow,
        CollectionOperation::RowExistsByIndex,
        CollectionOperation::RowExistsByElement,
        CollectionOperation::SelectRowByIndex,
        CollectionOperation::Size,
    ];
}

impl fmt::Display for CollectionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollectionOperation::InsertRow => "insert-row",
            CollectionOperation::DeleteAll => "delete-all",
            CollectionOperation::DeleteRow => "delete-row",
            CollectionOperation::UpdateRow => "update-row",
            CollectionOperation::DetachRow => "detach-row",
            CollectionOperation::RowExistsByIndex => "row-exists-by-index",
            CollectionOperation::RowExistsByElement => "row-exists-by-element",
            CollectionOperation::SelectRowByIndex => "select-row-by-index",
            CollectionOperation::Size => "size",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatementCompiler {
    renderer: SqlRenderer,
}

impl StatementCompiler {
    pub fn new(style: ParameterStyle) -> Self {
        Self {
            renderer: SqlRenderer::new(style),
        }
    }

    pub fn renderer(&self) -> &SqlRenderer {
        &self.renderer
    }

    pub fn compile(
        &self,
        descriptor: &CollectionDescriptor,
        operation: CollectionOperation,
    ) -> PersistResult<CompiledStatement> {
        let mut params = ParameterListBuilder::new();
        let statement = match descriptor.storage() {
            StorageStrategy::JoinTable => join_table_statement(descriptor, operation, &mut params)?,
            StorageStrategy::OwnedTable => owned_table_statement(descriptor, operation, &mut params)?,
        };
        let sql = self.renderer.render(&statement);
        tracing::debug!(
            "Compiled {} for {}: {}",
            operation,
            descriptor.role(),
            sql
        );
        Ok(CompiledStatement::new(
            descriptor.role().to_string(),
            operation,
            sql,
            statement,
            params.finish(),
        ))
    }
}

fn join_table_statement(
    descriptor: &CollectionDescriptor,
    operation: CollectionOperation,
    params: &mut ParameterListBuilder,
) -> PersistResult<Statement> {
    match operation {
        CollectionOperation::InsertRow => insert_row(descriptor, params),
        CollectionOperation::DeleteAll => Ok(Statement::Delete(DeleteStatement {
            target: target(descriptor),
            restriction: Predicate::and(restrict(params, descriptor.key())?),
        })),
        CollectionOperation::DeleteRow => Ok(Statement::Delete(DeleteStatement {
            target: target(descriptor),
            restriction: identity_restriction(descriptor, params)?,
        })),
        CollectionOperation::UpdateRow => {
            let mut assignments = assign(params, descriptor.element())?;
            if descriptor.profile().index_assignable() {
                if let Some(index) = descriptor.index() {
                    assignments.extend(assign(params, index)?);
                }
            }
            Ok(Statement::Update(UpdateStatement {
                target: target(descriptor),
                assignments,
                restriction: identity_restriction(descriptor, params)?,
            }))
        }
        CollectionOperation::DetachRow => Err(PersistError::configuration(format!(
            "{}: detach-row only applies to owned-table collections",
            descriptor.role()
        ))),
        _ => select_statement(descriptor, operation, params),
    }
}

fn owned_table_statement(
    descriptor: &CollectionDescriptor,
    operation: CollectionOperation,
    params: &mut ParameterListBuilder,
) -> PersistResult<Statement> {
    match operation {
        CollectionOperation::InsertRow | CollectionOperation::UpdateRow => {
            if descriptor.has_surrogate_id() {
                return Err(PersistError::unsupported(format!(
                    "{}: re-binding surrogate ids of one-to-many rows",
                    descriptor.role()
                )));
            }
            let mut assignments = assign(params, descriptor.key())?;
            if let Some(index) = descriptor.index() {
                assignments.extend(assign(params, index)?);
            }
            Ok(Statement::Update(UpdateStatement {
                target: target(descriptor),
                assignments,
                restriction: Predicate::and(restrict(params, descriptor.element())?),
            }))
        }
        CollectionOperation::DeleteAll => {
            let assignments = clear_foreign_key(descriptor);
            Ok(Statement::Update(UpdateStatement {
                target: target(descriptor),
                assignments,
                restriction: Predicate::and(restrict(params, descriptor.key())?),
            }))
        }
        CollectionOperation::DetachRow => {
            let assignments = clear_foreign_key(descriptor);
            let mut predicates = restrict(params, descriptor.key())?;
            predicates.extend(restrict(params, descriptor.element())?);
            Ok(Statement::Update(UpdateStatement {
                target: target(descriptor),
                assignments,
                restriction: Predicate::and(predicates),
            }))
        }
        CollectionOperation::DeleteRow => Err(PersistError::unsupported(format!(
            "{}: deleting single rows of a one-to-many collection",
            descriptor.role()
        ))),
        _ => select_statement(descriptor, operation, params),
    }
}

fn insert_row(
    descriptor: &CollectionDescriptor,
    params: &mut ParameterListBuilder,
) -> PersistResult<Statement> {
    let mut navigables: Vec<&Navigable> = vec![descriptor.key()];
    if let Some(id) = descriptor.identifier() {
        navigables.push(id);
    }
    if let Some(index) = descriptor.index() {
        navigables.push(index);
    }
    navigables.push(descriptor.element());

    let mut columns = Vec::new();
    let mut values = Vec::new();
    for navigable in navigables {
        for (column, value_type) in navigable.columns() {
            if column.is_formula() {
                continue;
            }
            values.push(params.register(column, Clause::Values, value_type)?);
            columns.push(ColumnReference::new(column.clone()));
        }
    }
    Ok(Statement::Insert(InsertStatement {
        target: target(descriptor),
        columns,
        values,
    }))
}

fn select_statement(
    descriptor: &CollectionDescriptor,
    operation: CollectionOperation,
    params: &mut ParameterListBuilder,
) -> PersistResult<Statement> {
    let (selections, predicates) = match operation {
        CollectionOperation::RowExistsByIndex => {
            let mut predicates = restrict(params, descriptor.key())?;
            if let Some(id) = descriptor.identifier() {
                predicates.extend(restrict(params, id)?);
            } else {
                predicates.extend(restrict(params, required_index(descriptor, operation)?)?);
            }
            (vec![literal_one()], predicates)
        }
        CollectionOperation::RowExistsByElement => {
            let mut predicates = restrict(params, descriptor.key())?;
            predicates.extend(restrict(params, descriptor.element())?);
            (vec![literal_one()], predicates)
        }
        CollectionOperation::SelectRowByIndex => {
            let index = required_index(descriptor, operation)?;
            let mut predicates = restrict(params, descriptor.key())?;
            predicates.extend(restrict(params, index)?);
            let selections = descriptor
                .element()
                .columns()
                .into_iter()
                .map(|(column, _)| Selection {
                    expression: column_expr(column),
                    alias: None,
                })
                .collect();
            (selections, predicates)
        }
        CollectionOperation::Size => {
            let expression = match descriptor.profile().size_strategy() {
                SizeStrategy::MaxIndex => {
                    let index = required_index(descriptor, operation)?;
                    let (column, _) = index.columns()[0];
                    Expression::Arithmetic {
                        left: Box::new(Expression::Aggregate {
                            function: AggregateFunction::Max,
                            argument: Box::new(column_expr(column)),
                        }),
                        op: ArithmeticOperator::Add,
                        right: Box::new(Expression::Literal(SqlValue::Integer(1))),
                    }
                }
                SizeStrategy::Count => Expression::Aggregate {
                    function: AggregateFunction::Count,
                    argument: Box::new(Expression::Literal(SqlValue::Integer(1))),
                },
            };
            let selections = vec![Selection {
                expression,
                alias: None,
            }];
            (selections, restrict(params, descriptor.key())?)
        }
        other => {
            return Err(PersistError::configuration(format!(
                "{}: {} is not a query",
                descriptor.role(),
                other
            )))
        }
    };
    Ok(Statement::Select(SelectStatement {
        from: target(descriptor),
        selections,
        restriction: Predicate::and(predicates),
    }))
}

/// Restriction addressing exactly one row: id, else key + physical index,
/// else key + element.
fn identity_restriction(
    descriptor: &CollectionDescriptor,
    params: &mut ParameterListBuilder,
) -> PersistResult<Option<Predicate>> {
    let predicates = match descriptor.profile().row_identity() {
        RowIdentity::SurrogateId => {
            let id = descriptor.identifier().ok_or_else(|| {
                PersistError::configuration(format!("{}: missing identifier", descriptor.role()))
            })?;
            restrict(params, id)?
        }
        RowIdentity::KeyAndIndex => {
            let index = required_index(descriptor, CollectionOperation::DeleteRow)?;
            let mut predicates = restrict(params, descriptor.key())?;
            predicates.extend(restrict(params, index)?);
            predicates
        }
        RowIdentity::KeyAndElement => {
            let mut predicates = restrict(params, descriptor.key())?;
            predicates.extend(restrict(params, descriptor.element())?);
            predicates
        }
    };
    Ok(Predicate::and(predicates))
}

fn required_index<'a>(
    descriptor: &'a CollectionDescriptor,
    operation: CollectionOperation,
) -> PersistResult<&'a Navigable> {
    descriptor.index().ok_or_else(|| {
        PersistError::configuration(format!(
            "{}: {} requires an indexed collection",
            descriptor.role(),
            operation
        ))
    })
}

fn restrict(
    params: &mut ParameterListBuilder,
    navigable: &Navigable,
) -> PersistResult<Vec<Predicate>> {
    navigable
        .columns()
        .into_iter()
        .map(|(column, value_type)| -> PersistResult<Predicate> {
            let parameter = params.register(column, Clause::Restriction, value_type)?;
            Ok(Predicate::equals(column_expr(column), parameter))
        })
        .collect()
}

fn assign(
    params: &mut ParameterListBuilder,
    navigable: &Navigable,
) -> PersistResult<Vec<Assignment>> {
    navigable
        .columns()
        .into_iter()
        .filter(|(column, _)| !column.is_formula())
        .map(|(column, value_type)| -> PersistResult<Assignment> {
            Ok(Assignment {
                column: ColumnReference::new(column.clone()),
                value: params.register(column, Clause::Assignment, value_type)?,
            })
        })
        .collect()
}

/// `fk = null` plus `index = null` for physical index columns; no parameters.
fn clear_foreign_key(descriptor: &CollectionDescriptor) -> Vec<Assignment> {
    let mut columns: Vec<_> = descriptor.key().columns();
    if let Some(index) = descriptor.index() {
        columns.extend(index.columns());
    }
    columns
        .into_iter()
        .filter(|(column, _)| !column.is_formula())
        .map(|(column, _)| Assignment {
            column: ColumnReference::new(column.clone()),
            value: Expression::Literal(SqlValue::Null),
        })
        .collect()
}

fn target(descriptor: &CollectionDescriptor) -> TableReference {
    TableReference::new(descriptor.table().clone())
}

fn column_expr(column: &crate::model::Column) -> Expression {
    Expression::Column(ColumnReference::new(column.clone()))
}

fn literal_one() -> Selection {
    Selection {
        expression: Expression::Literal(SqlValue::Integer(1)),
        alias: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::value::ValueType;

    fn nav(t: &Table, role: NavigableRole, name: &str, ty: ValueType) -> Navigable {
        Navigable::basic(role, Column::physical(t, name).unwrap(), ty)
    }

    fn set_descriptor() -> CollectionDescriptor {
        let t = Table::new("order_tags").unwrap();
        CollectionDescriptor::builder("Order.tags", CollectionClassification::Set, t.clone())
            .key(nav(&t, NavigableRole::Key, "order_id", ValueType::Integer))
            .element(nav(&t, NavigableRole::Element, "tag", ValueType::Text))
            .build()
            .unwrap()
    }

    fn list_descriptor(storage: StorageStrategy) -> CollectionDescriptor {
        let t = Table::new("order_lines").unwrap();
        CollectionDescriptor::builder("Order.lines", CollectionClassification::List, t.clone())
            .storage(storage)
            .key(nav(&t, NavigableRole::Key, "order_id", ValueType::Integer))
            .element(nav(&t, NavigableRole::Element, "line_id", ValueType::Integer))
            .index(nav(&t, NavigableRole::Index, "pos", ValueType::Integer))
            .build()
            .unwrap()
    }

    fn id_bag_descriptor() -> CollectionDescriptor {
        let t = Table::new("order_notes").unwrap();
        CollectionDescriptor::builder("Order.notes", CollectionClassification::Bag, t.clone())
            .key(nav(&t, NavigableRole::Key, "order_id", ValueType::Integer))
            .element(nav(&t, NavigableRole::Element, "note", ValueType::Text))
            .identifier(
                nav(&t, NavigableRole::Identifier, "note_id", ValueType::Integer),
                IdentifierGenerator::increment_from(1),
            )
            .build()
            .unwrap()
    }

    fn formula_map_descriptor() -> CollectionDescriptor {
        let t = Table::new("order_attrs").unwrap();
        let index = Navigable::new(
            NavigableRole::Index,
            vec![NavigablePart::new(
                Column::formula(&t, "lower(attr_name)").unwrap(),
                ValueType::Text,
            )],
        )
        .unwrap();
        CollectionDescriptor::builder("Order.attrs", CollectionClassification::Map, t.clone())
            .key(nav(&t, NavigableRole::Key, "order_id", ValueType::Integer))
            .element(nav(&t, NavigableRole::Element, "attr_value", ValueType::Text))
            .index(index)
            .build()
            .unwrap()
    }

    fn compile(d: &CollectionDescriptor, op: CollectionOperation) -> CompiledStatement {
        StatementCompiler::default().compile(d, op).unwrap()
    }

    fn names(stmt: &CompiledStatement) -> Vec<String> {
        stmt.parameters()
            .iter()
            .map(|p| format!("{}:{}", p.clause, p.column.name()))
            .collect()
    }

    #[test]
    fn test_insert_column_order() {
        let d = id_bag_descriptor();
        let stmt = compile(&d, CollectionOperation::InsertRow);
        assert_eq!(
            stmt.sql(),
            "insert into order_notes (order_id, note_id, note) values (?, ?, ?)"
        );
        assert_eq!(names(&stmt), vec!["values:order_id", "values:note_id", "values:note"]);

        let d = list_descriptor(StorageStrategy::JoinTable);
        let stmt = compile(&d, CollectionOperation::InsertRow);
        assert_eq!(
            stmt.sql(),
            "insert into order_lines (order_id, pos, line_id) values (?, ?, ?)"
        );
    }

    #[test]
    fn test_delete_row_precedence() {
        let stmt = compile(&id_bag_descriptor(), CollectionOperation::DeleteRow);
        assert_eq!(stmt.sql(), "delete from order_notes where note_id=?");

        let stmt = compile(&list_descriptor(StorageStrategy::JoinTable), CollectionOperation::DeleteRow);
        assert_eq!(stmt.sql(), "delete from order_lines where order_id=? and pos=?");

        let stmt = compile(&set_descriptor(), CollectionOperation::DeleteRow);
        assert_eq!(stmt.sql(), "delete from order_tags where order_id=? and tag=?");

        let stmt = compile(&formula_map_descriptor(), CollectionOperation::DeleteRow);
        assert_eq!(
            stmt.sql(),
            "delete from order_attrs where order_id=? and attr_value=?"
        );
    }

    #[test]
    fn test_update_row_assignments() {
        let stmt = compile(&list_descriptor(StorageStrategy::JoinTable), CollectionOperation::UpdateRow);
        assert_eq!(
            stmt.sql(),
            "update order_lines set line_id=? where order_id=? and pos=?"
        );

        let stmt = compile(&id_bag_descriptor(), CollectionOperation::UpdateRow);
        assert_eq!(stmt.sql(), "update order_notes set note=? where note_id=?");

        // element both assigned and restricted: two distinct slots
        let stmt = compile(&formula_map_descriptor(), CollectionOperation::UpdateRow);
        assert_eq!(
            stmt.sql(),
            "update order_attrs set attr_value=? where order_id=? and attr_value=?"
        );
        assert_eq!(
            names(&stmt),
            vec!["set:attr_value", "where:order_id", "where:attr_value"]
        );
    }

    #[test]
    fn test_delete_all_by_key() {
        let stmt = compile(&set_descriptor(), CollectionOperation::DeleteAll);
        assert_eq!(stmt.sql(), "delete from order_tags where order_id=?");

        let stmt = compile(&id_bag_descriptor(), CollectionOperation::DeleteAll);
        assert_eq!(stmt.sql(), "delete from order_notes where order_id=?");
    }

    #[test]
    fn test_size_statements() {
        let stmt = compile(&list_descriptor(StorageStrategy::JoinTable), CollectionOperation::Size);
        assert_eq!(stmt.sql(), "select max(pos) + 1 from order_lines where order_id=?");

        let stmt = compile(&formula_map_descriptor(), CollectionOperation::Size);
        assert_eq!(stmt.sql(), "select count(1) from order_attrs where order_id=?");

        let stmt = compile(&set_descriptor(), CollectionOperation::Size);
        assert_eq!(stmt.sql(), "select count(1) from order_tags where order_id=?");
    }

    #[test]
    fn test_selectors() {
        let d = list_descriptor(StorageStrategy::JoinTable);
        assert_eq!(
            compile(&d, CollectionOperation::SelectRowByIndex).sql(),
            "select line_id from order_lines where order_id=? and pos=?"
        );
        assert_eq!(
            compile(&d, CollectionOperation::RowExistsByIndex).sql(),
            "select 1 from order_lines where order_id=? and pos=?"
        );
        assert_eq!(
            compile(&d, CollectionOperation::RowExistsByElement).sql(),
            "select 1 from order_lines where order_id=? and line_id=?"
        );
        assert_eq!(
            compile(&id_bag_descriptor(), CollectionOperation::RowExistsByIndex).sql(),
            "select 1 from order_notes where order_id=? and note_id=?"
        );
        assert_eq!(
            compile(&formula_map_descriptor(), CollectionOperation::RowExistsByIndex).sql(),
            "select 1 from order_attrs where order_id=? and (lower(attr_name))=?"
        );
    }

    #[test]
    fn test_index_operations_require_index() {
        let err = StatementCompiler::default()
            .compile(&set_descriptor(), CollectionOperation::SelectRowByIndex)
            .unwrap_err();
        assert!(matches!(err, PersistError::Configuration(_)));

        let err = StatementCompiler::default()
            .compile(&set_descriptor(), CollectionOperation::RowExistsByIndex)
            .unwrap_err();
        assert!(matches!(err, PersistError::Configuration(_)));
    }

    #[test]
    fn test_owned_table_statements() {
        let d = list_descriptor(StorageStrategy::OwnedTable);
        assert_eq!(
            compile(&d, CollectionOperation::InsertRow).sql(),
            "update order_lines set order_id=?, pos=? where line_id=?"
        );
        assert_eq!(
            compile(&d, CollectionOperation::DetachRow).sql(),
            "update order_lines set order_id=null, pos=null where order_id=? and line_id=?"
        );
        assert_eq!(
            compile(&d, CollectionOperation::DeleteAll).sql(),
            "update order_lines set order_id=null, pos=null where order_id=?"
        );
        let err = StatementCompiler::default()
            .compile(&d, CollectionOperation::DeleteRow)
            .unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_detach_rejected_for_join_table() {
        let err = StatementCompiler::default()
            .compile(&set_descriptor(), CollectionOperation::DetachRow)
            .unwrap_err();
        assert!(matches!(err, PersistError::Configuration(_)));
    }

    #[test]
    fn test_numbered_parameters() {
        let compiler = StatementCompiler::new(ParameterStyle::Numbered);
        let stmt = compiler
            .compile(&list_descriptor(StorageStrategy::JoinTable), CollectionOperation::UpdateRow)
            .unwrap();
        assert_eq!(
            stmt.sql(),
            "update order_lines set line_id=$1 where order_id=$2 and pos=$3"
        );
    }

    #[test]
    fn test_parameter_slots_match_render_order() {
        let d = list_descriptor(StorageStrategy::JoinTable);
        for op in CollectionOperation::ALL {
            let Ok(stmt) = StatementCompiler::default().compile(&d, op) else {
                continue;
            };
            let slots: Vec<usize> = stmt.parameters().iter().map(|p| p.slot).collect();
            let expected: Vec<usize> = (0..stmt.parameter_count()).collect();
            assert_eq!(slots, expected, "{}", op);
            assert_eq!(stmt.sql().matches('?').count(), stmt.parameter_count(), "{}", op);
        }
    }
}
