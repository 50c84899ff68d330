//! Renders statement ASTs into SQL text.

use serde::{Deserialize, Serialize};

use super::ast::*;
use crate::model::ColumnKind;

/// Placeholder syntax of the target backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterStyle {
    /// `?`
    #[default]
    Positional,
    /// `$1`, `$2`, ...
    Numbered,
}

impl std::str::FromStr for ParameterStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "positional" | "?" => Ok(ParameterStyle::Positional),
            "numbered" | "$" => Ok(ParameterStyle::Numbered),
            other => Err(format!("unknown parameter style '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlRenderer {
    style: ParameterStyle,
}

impl SqlRenderer {
    pub fn new(style: ParameterStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> ParameterStyle {
        self.style
    }

    pub fn render(&self, statement: &Statement) -> String {
        match statement {
            Statement::Insert(s) => self.render_insert(s),
            Statement::Update(s) => self.render_update(s),
            Statement::Delete(s) => self.render_delete(s),
            Statement::Select(s) => self.render_select(s),
        }
    }

    fn render_insert(&self, stmt: &InsertStatement) -> String {
        let columns: Vec<String> = stmt.columns.iter().map(|c| self.render_column(c)).collect();
        let values: Vec<String> = stmt.values.iter().map(|v| self.render_expr(v)).collect();
        format!(
            "insert into {} ({}) values ({})",
            self.render_table(&stmt.target),
            columns.join(", "),
            values.join(", ")
        )
    }

    fn render_update(&self, stmt: &UpdateStatement) -> String {
        let assignments: Vec<String> = stmt
            .assignments
            .iter()
            .map(|a| format!("{}={}", self.render_column(&a.column), self.render_expr(&a.value)))
            .collect();
        let mut sql = format!(
            "update {} set {}",
            self.render_table(&stmt.target),
            assignments.join(", ")
        );
        self.append_where(&mut sql, stmt.restriction.as_ref());
        sql
    }

    fn render_delete(&self, stmt: &DeleteStatement) -> String {
        let mut sql = format!("delete from {}", self.render_table(&stmt.target));
        self.append_where(&mut sql, stmt.restriction.as_ref());
        sql
    }

    fn render_select(&self, stmt: &SelectStatement) -> String {
        let selections: Vec<String> = stmt
            .selections
            .iter()
            .map(|s| match &s.alias {
                Some(alias) => format!("{} as {}", self.render_expr(&s.expression), alias),
                None => self.render_expr(&s.expression),
            })
            .collect();
        let mut sql = format!(
            "select {} from {}",
            selections.join(", "),
            self.render_table(&stmt.from)
        );
        self.append_where(&mut sql, stmt.restriction.as_ref());
        sql
    }

    fn append_where(&self, sql: &mut String, restriction: Option<&Predicate>) {
        if let Some(predicate) = restriction {
            sql.push_str(" where ");
            sql.push_str(&self.render_predicate(predicate, false));
        }
    }

    fn render_table(&self, table: &TableReference) -> String {
        match &table.alias {
            Some(alias) => format!("{} {}", table.table, alias),
            None => table.table.to_string(),
        }
    }

    fn render_column(&self, column: &ColumnReference) -> String {
        let name = match column.column.kind() {
            ColumnKind::Physical => column.column.name().to_string(),
            ColumnKind::Formula => format!("({})", column.column.name()),
        };
        match (&column.qualifier, column.column.kind()) {
            (Some(q), ColumnKind::Physical) => format!("{}.{}", q, name),
            _ => name,
        }
    }

    fn render_expr(&self, expr: &Expression) -> String {
        match expr {
            Expression::Column(c) => self.render_column(c),
            Expression::Parameter(slot) => match self.style {
                ParameterStyle::Positional => "?".to_string(),
                ParameterStyle::Numbered => format!("${}", slot + 1),
            },
            Expression::Literal(value) => value.to_string(),
            Expression::Aggregate { function, argument } => {
                let name = match function {
                    AggregateFunction::Max => "max",
                    AggregateFunction::Count => "count",
                };
                format!("{}({})", name, self.render_expr(argument))
            }
            Expression::Arithmetic { left, op, right } => {
                let op_str = match op {
                    ArithmeticOperator::Add => "+",
                    ArithmeticOperator::Subtract => "-",
                };
                format!("{} {} {}", self.render_expr(left), op_str, self.render_expr(right))
            }
        }
    }

    fn render_predicate(&self, predicate: &Predicate, nested: bool) -> String {
        match predicate {
            Predicate::Comparison { left, op, right } => {
                let op_str = match op {
                    ComparisonOperator::Eq => "=",
                    ComparisonOperator::NotEq => "<>",
                    ComparisonOperator::Lt => "<",
                    ComparisonOperator::LtEq => "<=",
                    ComparisonOperator::Gt => ">",
                    ComparisonOperator::GtEq => ">=",
                };
                format!("{}{}{}", self.render_expr(left), op_str, self.render_expr(right))
            }
            Predicate::Junction { kind, predicates } => {
                let separator = match kind {
                    JunctionKind::And => " and ",
                    JunctionKind::Or => " or ",
                };
                let parts: Vec<String> = predicates
                    .iter()
                    .map(|p| self.render_predicate(p, true))
                    .collect();
                let joined = parts.join(separator);
                if nested && predicates.len() > 1 {
                    format!("({})", joined)
                } else {
                    joined
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, Table};
    use crate::value::SqlValue;

    fn col(table: &Table, name: &str) -> Expression {
        Expression::Column(ColumnReference::new(Column::physical(table, name).unwrap()))
    }

    #[test]
    fn test_render_insert() {
        let t = Table::new("order_tags").unwrap();
        let stmt = Statement::Insert(InsertStatement {
            target: TableReference::new(t.clone()),
            columns: vec![
                ColumnReference::new(Column::physical(&t, "order_id").unwrap()),
                ColumnReference::new(Column::physical(&t, "tag").unwrap()),
            ],
            values: vec![Expression::Parameter(0), Expression::Parameter(1)],
        });
        assert_eq!(
            SqlRenderer::default().render(&stmt),
            "insert into order_tags (order_id, tag) values (?, ?)"
        );
        assert_eq!(
            SqlRenderer::new(ParameterStyle::Numbered).render(&stmt),
            "insert into order_tags (order_id, tag) values ($1, $2)"
        );
    }

    #[test]
    fn test_render_update_with_null_literal() {
        let t = Table::new("lines").unwrap();
        let stmt = Statement::Update(UpdateStatement {
            target: TableReference::new(t.clone()),
            assignments: vec![Assignment {
                column: ColumnReference::new(Column::physical(&t, "order_id").unwrap()),
                value: Expression::Literal(SqlValue::Null),
            }],
            restriction: Predicate::and(vec![
                Predicate::equals(col(&t, "order_id"), Expression::Parameter(0)),
                Predicate::equals(col(&t, "id"), Expression::Parameter(1)),
            ]),
        });
        assert_eq!(
            SqlRenderer::default().render(&stmt),
            "update lines set order_id=null where order_id=? and id=?"
        );
    }

    #[test]
    fn test_render_size_select() {
        let t = Table::new("lines").unwrap();
        let stmt = Statement::Select(SelectStatement {
            from: TableReference::new(t.clone()),
            selections: vec![Selection {
                expression: Expression::Arithmetic {
                    left: Box::new(Expression::Aggregate {
                        function: AggregateFunction::Max,
                        argument: Box::new(col(&t, "pos")),
                    }),
                    op: ArithmeticOperator::Add,
                    right: Box::new(Expression::Literal(SqlValue::Integer(1))),
                },
                alias: None,
            }],
            restriction: Some(Predicate::equals(col(&t, "order_id"), Expression::Parameter(0))),
        });
        assert_eq!(
            SqlRenderer::default().render(&stmt),
            "select max(pos) + 1 from lines where order_id=?"
        );
    }

    #[test]
    fn test_render_nested_junction() {
        let t = Table::new("t").unwrap();
        let inner = Predicate::Junction {
            kind: JunctionKind::Or,
            predicates: vec![
                Predicate::equals(col(&t, "a"), Expression::Parameter(1)),
                Predicate::equals(col(&t, "b"), Expression::Parameter(2)),
            ],
        };
        let stmt = Statement::Delete(DeleteStatement {
            target: TableReference::new(t.clone()),
            restriction: Predicate::and(vec![
                Predicate::equals(col(&t, "k"), Expression::Parameter(0)),
                inner,
            ]),
        });
        assert_eq!(
            SqlRenderer::default().render(&stmt),
            "delete from t where k=? and (a=? or b=?)"
        );
    }

    #[test]
    fn test_parameter_style_from_str() {
        assert_eq!("numbered".parse::<ParameterStyle>().unwrap(), ParameterStyle::Numbered);
        assert!("named".parse::<ParameterStyle>().is_err());
    }
}
