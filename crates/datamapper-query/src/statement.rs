//! Compiled statements and their SQL rendering.

use crate::clause::OrderBy;
use crate::expr::Expr;
use crate::join::JoinClause;
use datamapper_core::{Dialect, Value};

/// What a statement does to its table.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// `SELECT <columns>`
    Select { columns: Vec<Expr> },
    /// `UPDATE ... SET <column> = <value>, ...`
    Update { changes: Vec<(String, Value)> },
    Delete,
}

impl StatementKind {
    /// Keyword used in diagnostics.
    pub const fn keyword(&self) -> &'static str {
        match self {
            StatementKind::Select { .. } => "SELECT",
            StatementKind::Update { .. } => "UPDATE",
            StatementKind::Delete => "DELETE",
        }
    }
}

/// A fully resolved statement, ready to render for any dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub table: String,
    pub joins: Vec<JoinClause>,
    pub filters: Vec<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Statement {
    /// Render SQL and bound parameters.
    pub fn to_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = self.build(dialect, &mut params);
        (sql, params)
    }

    /// Render `SELECT COUNT(*)` over this statement as a subquery.
    pub fn to_count_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let (inner, params) = self.to_sql(dialect);
        let sql = format!(
            "SELECT COUNT(*) AS {} FROM ({inner}) AS {}",
            dialect.quote_identifier("count"),
            dialect.quote_identifier("subquery_for_count")
        );
        (sql, params)
    }

    fn build(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        let table = dialect.quote_identifier(&self.table);
        let mut sql = match &self.kind {
            StatementKind::Select { columns } => {
                let cols: Vec<_> = columns
                    .iter()
                    .map(|c| c.build_with_dialect(dialect, params, 0))
                    .collect();
                format!("SELECT {} FROM {table}", cols.join(", "))
            }
            StatementKind::Update { changes } => {
                let sets: Vec<_> = changes
                    .iter()
                    .map(|(column, value)| {
                        let value_sql =
                            Expr::Literal(value.clone()).build_with_dialect(dialect, params, 0);
                        format!("{} = {value_sql}", dialect.quote_identifier(column))
                    })
                    .collect();
                format!("UPDATE {table} SET {}", sets.join(", "))
            }
            StatementKind::Delete => format!("DELETE FROM {table}"),
        };

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.build_with_dialect(dialect, params, 0));
        }

        if !self.filters.is_empty() {
            let grouped = self.filters.len() > 1;
            let parts: Vec<_> = self
                .filters
                .iter()
                .map(|filter| {
                    let part = filter.build_with_dialect(dialect, params, 0);
                    if grouped && filter.needs_grouping() {
                        format!("({part})")
                    } else {
                        part
                    }
                })
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&parts.join(" AND "));
        }

        if !self.order_by.is_empty() {
            let parts: Vec<_> = self
                .order_by
                .iter()
                .map(|o| o.build_with_dialect(dialect, params, 0))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&parts.join(", "));
        }

        if let Some(n) = self.limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }

        if let Some(n) = self.offset {
            sql.push_str(&format!(" OFFSET {}", n));
        }

        sql
    }
}
