//! SQL abstract syntax tree for collection statements

use crate::model::{Column, Table};
use crate::value::SqlValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    Select(SelectStatement),
}

impl Statement {
    pub fn target(&self) -> &TableReference {
        match self {
            Statement::Insert(s) => &s.target,
            Statement::Update(s) => &s.target,
            Statement::Delete(s) => &s.target,
            Statement::Select(s) => &s.from,
        }
    }

    pub fn is_query(&self) -> bool {
        matches!(self, Statement::Select(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableReference {
    pub table: Table,
    pub alias: Option<String>,
}

impl TableReference {
    pub fn new(table: Table) -> Self {
        Self { table, alias: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnReference {
    pub qualifier: Option<String>,
    pub column: Column,
}

impl ColumnReference {
    pub fn new(column: Column) -> Self {
        Self {
            qualifier: None,
            column,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub target: TableReference,
    pub columns: Vec<ColumnReference>,
    pub values: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: ColumnReference,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub target: TableReference,
    pub assignments: Vec<Assignment>,
    pub restriction: Option<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub target: TableReference,
    pub restriction: Option<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub expression: Expression,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub from: TableReference,
    pub selections: Vec<Selection>,
    pub restriction: Option<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Column(ColumnReference),
    /// Positional parameter; the slot is its 0-based position in compile order.
    Parameter(usize),
    Literal(SqlValue),
    Aggregate {
        function: AggregateFunction,
        argument: Box<Expression>,
    },
    Arithmetic {
        left: Box<Expression>,
        op: ArithmeticOperator,
        right: Box<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Max,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOperator {
    Add,
    Subtract,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Comparison {
        left: Expression,
        op: ComparisonOperator,
        right: Expression,
    },
    Junction {
        kind: JunctionKind,
        predicates: Vec<Predicate>,
    },
}

impl Predicate {
    pub fn equals(left: Expression, right: Expression) -> Self {
        Predicate::Comparison {
            left,
            op: ComparisonOperator::Eq,
            right,
        }
    }

    /// Conjunction; a single predicate is returned unwrapped.
    pub fn and(mut predicates: Vec<Predicate>) -> Option<Self> {
        match predicates.len() {
            0 => None,
            1 => predicates.pop(),
            _ => Some(Predicate::Junction {
                kind: JunctionKind::And,
                predicates,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JunctionKind {
    And,
    Or,
}
