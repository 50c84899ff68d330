//! In-memory execution primitive.
//!
//! Interprets compiled statement ASTs against in-memory tables. Used by the
//! test suites and the CLI to run collection operations without a database.
//! Unique constraints follow SQL semantics (rows with a NULL in the constrained
//! columns never collide) and are checked after every statement; a violating
//! statement leaves the table unchanged.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

use crate::error::BackendError;
use crate::exec::UnitOfWork;
use crate::sql::ast::*;
use crate::sql::{CollectionOperation, CompiledStatement};
use crate::value::SqlValue;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    #[error("Unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Formula '{0}' cannot be evaluated in memory")]
    Formula(String),

    #[error("Unique constraint ({columns}) violated on table '{table}'")]
    UniqueViolation { table: String, columns: String },

    #[error("Parameter {0} was not supplied")]
    MissingParameter(usize),

    #[error("Invalid statement: {0}")]
    InvalidStatement(String),
}

pub type MemoryResult<T> = Result<T, MemoryError>;

/// Row keyed by column name, as returned by [`InMemoryDatabase::rows`]
pub type Row = BTreeMap<String, SqlValue>;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub operation: CollectionOperation,
    pub sql: String,
    pub params: Vec<SqlValue>,
}

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    unique: Vec<Vec<usize>>,
}

impl MemoryTable {
    fn column_index(&self, table: &str, column: &str) -> MemoryResult<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| MemoryError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })
    }

    fn check_unique(&self, table: &str) -> MemoryResult<()> {
        for constraint in &self.unique {
            let mut seen: HashSet<String> = HashSet::new();
            for row in &self.rows {
                let parts: Vec<&SqlValue> = constraint.iter().map(|i| &row[*i]).collect();
                if parts.iter().any(|v| v.is_null()) {
                    continue;
                }
                let fingerprint = parts
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join("\u{1f}");
                if !seen.insert(fingerprint) {
                    let columns = constraint
                        .iter()
                        .map(|i| self.columns[*i].as_str())
                        .collect::<Vec<_>>()
                        .join(", ");
                    return Err(MemoryError::UniqueViolation {
                        table: table.to_string(),
                        columns,
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    tables: BTreeMap<String, MemoryTable>,
    log: Vec<ExecutedStatement>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) an empty table.
    pub fn create_table(&mut self, name: &str, columns: &[&str]) {
        self.tables.insert(
            name.to_string(),
            MemoryTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                ..MemoryTable::default()
            },
        );
    }

    pub fn add_unique_constraint(&mut self, table: &str, columns: &[&str]) -> MemoryResult<()> {
        let target = self.table_mut(table)?;
        let indices = columns
            .iter()
            .map(|c| target.column_index(table, c))
            .collect::<MemoryResult<Vec<_>>>()?;
        target.unique.push(indices);
        target.check_unique(table)
    }

    /// Seed a row directly, bypassing the statement log. Missing columns are NULL.
    pub fn insert_row(&mut self, table: &str, values: &[(&str, SqlValue)]) -> MemoryResult<()> {
        let target = self.table_mut(table)?;
        let mut row = vec![SqlValue::Null; target.columns.len()];
        for (column, value) in values {
            row[target.column_index(table, column)?] = value.clone();
        }
        target.rows.push(row);
        if let Err(err) = target.check_unique(table) {
            target.rows.pop();
            return Err(err);
        }
        Ok(())
    }

    pub fn rows(&self, table: &str) -> MemoryResult<Vec<Row>> {
        let source = self
            .tables
            .get(table)
            .ok_or_else(|| MemoryError::UnknownTable(table.to_string()))?;
        Ok(source
            .rows
            .iter()
            .map(|row| source.columns.iter().cloned().zip(row.iter().cloned()).collect())
            .collect())
    }

    /// Statements executed so far, in execution order
    pub fn statement_log(&self) -> &[ExecutedStatement] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    fn table_mut(&mut self, table: &str) -> MemoryResult<&mut MemoryTable> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| MemoryError::UnknownTable(table.to_string()))
    }

    fn table(&self, table: &str) -> MemoryResult<&MemoryTable> {
        self.tables
            .get(table)
            .ok_or_else(|| MemoryError::UnknownTable(table.to_string()))
    }

    fn record(&mut self, statement: &CompiledStatement, params: &[SqlValue]) {
        self.log.push(ExecutedStatement {
            operation: statement.operation(),
            sql: statement.sql().to_string(),
            params: params.to_vec(),
        });
    }

    fn run_insert(&mut self, stmt: &InsertStatement, params: &[SqlValue]) -> MemoryResult<u64> {
        let name = stmt.target.table.name().to_string();
        let target = self.table_mut(&name)?;
        let mut row = vec![SqlValue::Null; target.columns.len()];
        for (column, value) in stmt.columns.iter().zip(&stmt.values) {
            let index = target.column_index(&name, physical_name(column)?)?;
            row[index] = eval(value, None, params)?;
        }
        target.rows.push(row);
        if let Err(err) = target.check_unique(&name) {
            target.rows.pop();
            return Err(err);
        }
        Ok(1)
    }

    fn run_update(&mut self, stmt: &UpdateStatement, params: &[SqlValue]) -> MemoryResult<u64> {
        let name = stmt.target.table.name().to_string();
        let target = self.table_mut(&name)?;
        let mut assignments = Vec::with_capacity(stmt.assignments.len());
        for assignment in &stmt.assignments {
            let index = target.column_index(&name, physical_name(&assignment.column)?)?;
            assignments.push((index, &assignment.value));
        }

        let original = target.rows.clone();
        let mut affected = 0;
        for i in 0..target.rows.len() {
            if !matches(stmt.restriction.as_ref(), target, &name, &original[i], params)? {
                continue;
            }
            for (index, value) in &assignments {
                let scope = Some(RowScope {
                    table: &*target,
                    name: &name,
                    row: &original[i],
                });
                let new_value = eval(value, scope, params)?;
                target.rows[i][*index] = new_value;
            }
            affected += 1;
        }
        if let Err(err) = target.check_unique(&name) {
            target.rows = original;
            return Err(err);
        }
        Ok(affected)
    }

    fn run_delete(&mut self, stmt: &DeleteStatement, params: &[SqlValue]) -> MemoryResult<u64> {
        let name = stmt.target.table.name().to_string();
        let target = self.table_mut(&name)?;
        let mut kept = Vec::with_capacity(target.rows.len());
        let mut affected = 0;
        for row in &target.rows {
            if matches(stmt.restriction.as_ref(), target, &name, row, params)? {
                affected += 1;
            } else {
                kept.push(row.clone());
            }
        }
        target.rows = kept;
        Ok(affected)
    }

    fn run_select(&self, stmt: &SelectStatement, params: &[SqlValue]) -> MemoryResult<Vec<Vec<SqlValue>>> {
        let name = stmt.from.table.name();
        let source = self.table(name)?;
        let mut filtered = Vec::new();
        for row in &source.rows {
            if matches(stmt.restriction.as_ref(), source, name, row, params)? {
                filtered.push(row);
            }
        }

        if stmt.selections.iter().any(|s| is_aggregate(&s.expression)) {
            let row = stmt
                .selections
                .iter()
                .map(|s| eval_aggregate(&s.expression, source, name, &filtered, params))
                .collect::<MemoryResult<Vec<_>>>()?;
            return Ok(vec![row]);
        }

        filtered
            .into_iter()
            .map(|row| {
                stmt.selections
                    .iter()
                    .map(|s| {
                        let scope = Some(RowScope {
                            table: source,
                            name,
                            row,
                        });
                        eval(&s.expression, scope, params)
                    })
                    .collect()
            })
            .collect()
    }
}

impl UnitOfWork for InMemoryDatabase {
    fn execute_update(&mut self, statement: &CompiledStatement, params: &[SqlValue]) -> Result<u64, BackendError> {
        self.record(statement, params);
        let affected = match statement.statement() {
            Statement::Insert(s) => self.run_insert(s, params)?,
            Statement::Update(s) => self.run_update(s, params)?,
            Statement::Delete(s) => self.run_delete(s, params)?,
            Statement::Select(_) => {
                return Err(MemoryError::InvalidStatement("query passed as update".to_string()).into())
            }
        };
        Ok(affected)
    }

    fn execute_query(
        &mut self,
        statement: &CompiledStatement,
        params: &[SqlValue],
    ) -> Result<Vec<Vec<SqlValue>>, BackendError> {
        self.record(statement, params);
        match statement.statement() {
            Statement::Select(s) => Ok(self.run_select(s, params)?),
            _ => Err(MemoryError::InvalidStatement("update passed as query".to_string()).into()),
        }
    }
}

#[derive(Clone, Copy)]
struct RowScope<'a> {
    table: &'a MemoryTable,
    name: &'a str,
    row: &'a [SqlValue],
}

fn physical_name(column: &ColumnReference) -> MemoryResult<&str> {
    if column.column.is_formula() {
        return Err(MemoryError::Formula(column.column.name().to_string()));
    }
    Ok(column.column.name())
}

fn matches(
    restriction: Option<&Predicate>,
    table: &MemoryTable,
    name: &str,
    row: &[SqlValue],
    params: &[SqlValue],
) -> MemoryResult<bool> {
    match restriction {
        None => Ok(true),
        Some(predicate) => test(predicate, RowScope { table, name, row }, params),
    }
}

fn test(predicate: &Predicate, scope: RowScope<'_>, params: &[SqlValue]) -> MemoryResult<bool> {
    match predicate {
        Predicate::Comparison { left, op, right } => {
            let l = eval(left, Some(scope), params)?;
            let r = eval(right, Some(scope), params)?;
            let Some(ordering) = l.compare(&r) else {
                return Ok(false);
            };
            Ok(match op {
                ComparisonOperator::Eq => ordering == Ordering::Equal,
                ComparisonOperator::NotEq => ordering != Ordering::Equal,
                ComparisonOperator::Lt => ordering == Ordering::Less,
                ComparisonOperator::LtEq => ordering != Ordering::Greater,
                ComparisonOperator::Gt => ordering == Ordering::Greater,
                ComparisonOperator::GtEq => ordering != Ordering::Less,
            })
        }
        Predicate::Junction { kind, predicates } => {
            for p in predicates {
                let outcome = test(p, scope, params)?;
                match kind {
                    JunctionKind::And if !outcome => return Ok(false),
                    JunctionKind::Or if outcome => return Ok(true),
                    _ => {}
                }
            }
            Ok(*kind == JunctionKind::And)
        }
    }
}

fn eval(expr: &Expression, scope: Option<RowScope<'_>>, params: &[SqlValue]) -> MemoryResult<SqlValue> {
    match expr {
        Expression::Column(column) => {
            let name = physical_name(column)?;
            let scope = scope.ok_or_else(|| {
                MemoryError::InvalidStatement(format!("column {} outside of a row", name))
            })?;
            let index = scope.table.column_index(scope.name, name)?;
            Ok(scope.row[index].clone())
        }
        Expression::Parameter(slot) => params
            .get(*slot)
            .cloned()
            .ok_or(MemoryError::MissingParameter(*slot)),
        Expression::Literal(value) => Ok(value.clone()),
        Expression::Arithmetic { left, op, right } => {
            arithmetic(eval(left, scope, params)?, *op, eval(right, scope, params)?)
        }
        Expression::Aggregate { .. } => Err(MemoryError::InvalidStatement(
            "aggregate outside of a select list".to_string(),
        )),
    }
}

fn is_aggregate(expr: &Expression) -> bool {
    match expr {
        Expression::Aggregate { .. } => true,
        Expression::Arithmetic { left, right, .. } => is_aggregate(left) || is_aggregate(right),
        _ => false,
    }
}

fn eval_aggregate(
    expr: &Expression,
    table: &MemoryTable,
    name: &str,
    rows: &[&Vec<SqlValue>],
    params: &[SqlValue],
) -> MemoryResult<SqlValue> {
    match expr {
        Expression::Aggregate { function, argument } => {
            let mut values = Vec::with_capacity(rows.len());
            for row in rows {
                let scope = Some(RowScope {
                    table,
                    name,
                    row: row.as_slice(),
                });
                let value = eval(argument, scope, params)?;
                if !value.is_null() {
                    values.push(value);
                }
            }
            Ok(match function {
                AggregateFunction::Count => SqlValue::Integer(values.len() as i64),
                AggregateFunction::Max => values
                    .into_iter()
                    .reduce(|best, v| match v.compare(&best) {
                        Some(Ordering::Greater) => v,
                        _ => best,
                    })
                    .unwrap_or(SqlValue::Null),
            })
        }
        Expression::Arithmetic { left, op, right } => arithmetic(
            eval_aggregate(left, table, name, rows, params)?,
            *op,
            eval_aggregate(right, table, name, rows, params)?,
        ),
        other => eval(other, None, params),
    }
}

fn arithmetic(left: SqlValue, op: ArithmeticOperator, right: SqlValue) -> MemoryResult<SqlValue> {
    let value = match (&left, &right) {
        (SqlValue::Null, _) | (_, SqlValue::Null) => SqlValue::Null,
        (SqlValue::Integer(a), SqlValue::Integer(b)) => match op {
            ArithmeticOperator::Add => SqlValue::Integer(a + b),
            ArithmeticOperator::Subtract => SqlValue::Integer(a - b),
        },
        (SqlValue::Integer(_) | SqlValue::Real(_), SqlValue::Integer(_) | SqlValue::Real(_)) => {
            let a = as_f64(&left);
            let b = as_f64(&right);
            match op {
                ArithmeticOperator::Add => SqlValue::Real(a + b),
                ArithmeticOperator::Subtract => SqlValue::Real(a - b),
            }
        }
        _ => {
            return Err(MemoryError::InvalidStatement(format!(
                "cannot compute {} {:?} {}",
                left, op, right
            )))
        }
    };
    Ok(value)
}

fn as_f64(value: &SqlValue) -> f64 {
    match value {
        SqlValue::Integer(n) => *n as f64,
        SqlValue::Real(f) => *f,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::sql::StatementCompiler;
    use crate::value::ValueType;

    fn list() -> CollectionDescriptor {
        let t = Table::new("lines").unwrap();
        CollectionDescriptor::builder("Order.lines", CollectionClassification::List, t.clone())
            .key(Navigable::basic(NavigableRole::Key, Column::physical(&t, "order_id").unwrap(), ValueType::Integer))
            .element(Navigable::basic(NavigableRole::Element, Column::physical(&t, "line").unwrap(), ValueType::Text))
            .index(Navigable::basic(NavigableRole::Index, Column::physical(&t, "pos").unwrap(), ValueType::Integer))
            .build()
            .unwrap()
    }

    fn db() -> InMemoryDatabase {
        let mut db = InMemoryDatabase::new();
        db.create_table("lines", &["order_id", "pos", "line"]);
        db.add_unique_constraint("lines", &["order_id", "pos"]).unwrap();
        db
    }

    #[test]
    fn test_insert_and_size() {
        let d = list();
        let compiler = StatementCompiler::default();
        let insert = compiler.compile(&d, CollectionOperation::InsertRow).unwrap();
        let size = compiler.compile(&d, CollectionOperation::Size).unwrap();
        let mut db = db();

        let rows = db.execute_query(&size, &[SqlValue::Integer(1)]).unwrap();
        assert_eq!(rows, vec![vec![SqlValue::Null]]);

        db.execute_update(&insert, &[SqlValue::Integer(1), SqlValue::Integer(0), "a".into()]).unwrap();
        db.execute_update(&insert, &[SqlValue::Integer(1), SqlValue::Integer(1), "b".into()]).unwrap();
        db.execute_update(&insert, &[SqlValue::Integer(2), SqlValue::Integer(0), "c".into()]).unwrap();

        let rows = db.execute_query(&size, &[SqlValue::Integer(1)]).unwrap();
        assert_eq!(rows, vec![vec![SqlValue::Integer(2)]]);
        assert_eq!(db.statement_log().len(), 5);
    }

    #[test]
    fn test_unique_violation_rolls_back() {
        let d = list();
        let compiler = StatementCompiler::default();
        let insert = compiler.compile(&d, CollectionOperation::InsertRow).unwrap();
        let update = compiler.compile(&d, CollectionOperation::UpdateRow).unwrap();
        let mut db = db();
        db.execute_update(&insert, &[SqlValue::Integer(1), SqlValue::Integer(0), "a".into()]).unwrap();
        assert!(db.execute_update(&insert, &[SqlValue::Integer(1), SqlValue::Integer(0), "b".into()]).is_err());

        db.execute_update(&insert, &[SqlValue::Integer(1), SqlValue::Integer(1), "b".into()]).unwrap();
        let affected = db.execute_update(&update, &["z".into(), SqlValue::Integer(1), SqlValue::Integer(1)]).unwrap();
        assert_eq!(affected, 1);
        let rows = db.rows("lines").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["line"], SqlValue::from("z"));
    }

    #[test]
    fn test_null_never_matches() {
        let d = list();
        let delete = StatementCompiler::default()
            .compile(&d, CollectionOperation::DeleteAll)
            .unwrap();
        let mut db = db();
        db.insert_row("lines", &[("pos", SqlValue::Integer(0)), ("line", "x".into())]).unwrap();
        let affected = db.execute_update(&delete, &[SqlValue::Null]).unwrap();
        assert_eq!(affected, 0);
    }

    #[test]
    fn test_unknown_table() {
        let d = list();
        let delete = StatementCompiler::default()
            .compile(&d, CollectionOperation::DeleteAll)
            .unwrap();
        let mut db = InMemoryDatabase::new();
        let err = db.execute_update(&delete, &[SqlValue::Integer(1)]).unwrap_err();
        assert!(err.to_string().contains("Unknown table"));
    }
}
