//! Shared fixtures: a three-model registry and an in-memory executor.
#![allow(dead_code)]

use asupersync::{CancelReason, Cx, Outcome};
use datamapper::{
    Dialect, Error, Executor, QueryError, QueryErrorKind, Registry, Row, Schema, SqlType, Value,
    ValueKey,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock};

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn expect_err<T>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        Outcome::Ok(_) => panic!("expected an error, got a value"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn expect_cancelled<T>(outcome: Outcome<T, Error>) -> CancelReason {
    match outcome {
        Outcome::Cancelled(r) => r,
        Outcome::Ok(_) => panic!("expected cancellation, got a value"),
        Outcome::Err(e) => panic!("expected cancellation, got error: {e}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

/// `User` has many `pets` and one `home`; `Pet` and `Home` belong to an `owner`.
///
/// Built once per test binary.
pub fn registry() -> Arc<Registry> {
    static REGISTRY: OnceLock<Arc<Registry>> = OnceLock::new();
    Arc::clone(REGISTRY.get_or_init(build_registry))
}

fn build_registry() -> Arc<Registry> {
    let mut registry = Registry::new();
    registry
        .register(
            Schema::builder("User", "users")
                .primary_key("id", SqlType::BigInt)
                .column("name", SqlType::Text)
                .column("age", SqlType::Integer)
                .has_many("pets", "Pet", "owner_id")
                .has_one("home", "Home", "owner_id")
                .build(),
        )
        .expect("register User");
    registry
        .register(
            Schema::builder("Pet", "pets")
                .primary_key("id", SqlType::BigInt)
                .column("name", SqlType::Text)
                .column("owner_id", SqlType::BigInt)
                .belongs_to("owner", "User", "owner_id")
                .build(),
        )
        .expect("register Pet");
    registry
        .register(
            Schema::builder("Home", "homes")
                .primary_key("id", SqlType::BigInt)
                .column("owner_id", SqlType::BigInt)
                .belongs_to("owner", "User", "owner_id")
                .build(),
        )
        .expect("register Home");
    registry.finalize().expect("finalize registry")
}

#[derive(Debug, Default)]
pub struct MemoryState {
    pub tables: HashMap<String, Vec<Row>>,
    pub query_calls: usize,
    pub queries: Vec<(String, Vec<Value>)>,
    pub executed: Vec<(String, Vec<Value>)>,
    pub next_id: i64,
    /// Queries against this table fail.
    pub failing_table: Option<String>,
    /// Queries against this table are cancelled.
    pub cancelled_table: Option<String>,
}

impl MemoryState {
    pub fn insert_row(&mut self, table: &str, columns: &[&str], values: Vec<Value>) {
        let row = Row::new(columns.iter().map(|c| c.to_string()).collect(), values);
        self.tables.entry(table.to_string()).or_default().push(row);
    }

    pub fn rows(&self, table: &str) -> &[Row] {
        self.tables.get(table).map_or(&[], Vec::as_slice)
    }
}

/// Evaluates the narrow SQL subset the repository renders for Postgres:
/// single-table SELECT / UPDATE / DELETE with `=` and `IN` filters joined by
/// AND, LIMIT, COUNT subqueries and INSERT.
#[derive(Debug, Clone)]
pub struct MemoryExecutor {
    pub state: Arc<Mutex<MemoryState>>,
}

impl MemoryExecutor {
    pub fn new(state: Arc<Mutex<MemoryState>>) -> Self {
        Self { state }
    }
}

impl Executor for MemoryExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let params = params.to_vec();
        let state = Arc::clone(&self.state);
        let sql = sql.to_string();
        async move {
            let mut guard = state.lock().expect("lock poisoned");
            guard.query_calls += 1;
            guard.queries.push((sql.clone(), params.clone()));

            if let Some(table) = guard.failing_table.clone() {
                if first_table(&sql, "FROM ") == table {
                    return Outcome::Err(Error::Query(QueryError {
                        kind: QueryErrorKind::Database,
                        sql: Some(sql.clone()),
                        message: format!("relation \"{table}\" is unavailable"),
                        source: None,
                    }));
                }
            }

            if let Some(table) = guard.cancelled_table.clone() {
                if first_table(&sql, "FROM ") == table {
                    return Outcome::Cancelled(CancelReason::user("query cancelled"));
                }
            }

            if sql.starts_with("SELECT COUNT(*)") {
                let start = sql.find("FROM (").map_or(0, |i| i + "FROM (".len());
                let end = sql.rfind(") AS ").unwrap_or(sql.len());
                let count = select(&guard, &sql[start..end], &params).len();
                return Outcome::Ok(vec![Row::new(
                    vec!["count".to_string()],
                    vec![Value::BigInt(count as i64)],
                )]);
            }

            Outcome::Ok(select(&guard, &sql, &params))
        }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let params = params.to_vec();
        let state = Arc::clone(&self.state);
        let sql = sql.to_string();
        async move {
            let mut guard = state.lock().expect("lock poisoned");
            guard.executed.push((sql.clone(), params.clone()));
            let conditions = where_clause(&sql).map(str::to_string);
            let matches = |row: &Row| {
                conditions
                    .as_deref()
                    .is_none_or(|w| w.split(" AND ").all(|c| satisfies(row, c, &params)))
            };

            if let Some(rest) = sql.strip_prefix("DELETE FROM ") {
                let table = quoted(rest).to_string();
                let rows = guard.tables.entry(table).or_default();
                let before = rows.len();
                rows.retain(|row| !matches(row));
                return Outcome::Ok((before - rows.len()) as u64);
            }

            if let Some(rest) = sql.strip_prefix("UPDATE ") {
                let table = quoted(rest).to_string();
                let set_start = sql.find(" SET ").map_or(0, |i| i + " SET ".len());
                let set_end = sql.find(" WHERE ").unwrap_or(sql.len());
                let changes: Vec<(String, Value)> = sql[set_start..set_end]
                    .split(", ")
                    .filter_map(|part| {
                        let (column, placeholder) = part.split_once(" = ")?;
                        Some((quoted(column).to_string(), param(placeholder, &params)?))
                    })
                    .collect();

                let rows = guard.tables.entry(table).or_default();
                let mut affected = 0;
                for row in rows.iter_mut() {
                    if !matches(row) {
                        continue;
                    }
                    affected += 1;
                    let mut names: Vec<String> = row.column_info().names().to_vec();
                    let mut values: Vec<Value> = row.values().cloned().collect();
                    for (column, value) in &changes {
                        match names.iter().position(|n| n == column) {
                            Some(i) => values[i] = value.clone(),
                            None => {
                                names.push(column.clone());
                                values.push(value.clone());
                            }
                        }
                    }
                    *row = Row::new(names, values);
                }
                return Outcome::Ok(affected);
            }

            Outcome::Ok(0)
        }
    }

    fn insert(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        let params = params.to_vec();
        let state = Arc::clone(&self.state);
        let sql = sql.to_string();
        async move {
            let mut guard = state.lock().expect("lock poisoned");
            guard.executed.push((sql.clone(), params.clone()));

            let table = first_table(&sql, "INSERT INTO ");
            let mut names: Vec<String> = match (sql.find(" ("), sql.find(") VALUES")) {
                (Some(start), Some(end)) if start < end => sql[start + 2..end]
                    .split(", ")
                    .map(|c| quoted(c).to_string())
                    .collect(),
                _ => Vec::new(),
            };
            let mut values = params;

            let id = match names.iter().position(|n| n == "id") {
                Some(i) => values[i].as_i64().unwrap_or_default(),
                None => {
                    guard.next_id += 1;
                    names.push("id".to_string());
                    values.push(Value::BigInt(guard.next_id));
                    guard.next_id
                }
            };
            guard
                .tables
                .entry(table)
                .or_default()
                .push(Row::new(names, values));
            Outcome::Ok(id)
        }
    }
}

/// The identifier inside the first pair of double quotes.
fn quoted(text: &str) -> &str {
    let text = text.trim_start();
    let text = text.strip_prefix('"').unwrap_or(text);
    text.split('"').next().unwrap_or(text)
}

fn first_table(sql: &str, keyword: &str) -> String {
    sql.split_once(keyword)
        .map(|(_, rest)| quoted(rest).to_string())
        .unwrap_or_default()
}

fn where_clause(sql: &str) -> Option<&str> {
    let (_, rest) = sql.split_once(" WHERE ")?;
    let end = [" ORDER BY ", " LIMIT ", " OFFSET "]
        .iter()
        .filter_map(|k| rest.find(k))
        .min()
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

fn param(placeholder: &str, params: &[Value]) -> Option<Value> {
    let index: usize = placeholder.trim().strip_prefix('$')?.parse().ok()?;
    params.get(index.checked_sub(1)?).cloned()
}

fn same(a: &Value, b: &Value) -> bool {
    ValueKey::new(a.clone()) == ValueKey::new(b.clone())
}

fn satisfies(row: &Row, condition: &str, params: &[Value]) -> bool {
    if condition == "1 = 0" {
        return false;
    }
    let Some((lhs, rest)) = condition.split_once(' ') else {
        return true;
    };
    let column = quoted(lhs.rsplit('.').next().unwrap_or(lhs));
    let value = row.get_by_name(column).cloned().unwrap_or(Value::Null);

    if let Some(list) = rest.strip_prefix("IN (") {
        return list
            .trim_end_matches(')')
            .split(", ")
            .filter_map(|p| param(p, params))
            .any(|candidate| same(&candidate, &value));
    }
    if let Some(placeholder) = rest.strip_prefix("= ") {
        return param(placeholder, params).is_some_and(|candidate| same(&candidate, &value));
    }
    if rest == "IS NULL" {
        return value.is_null();
    }
    true
}

fn select(state: &MemoryState, sql: &str, params: &[Value]) -> Vec<Row> {
    let table = first_table(sql, "FROM ");
    let mut rows: Vec<Row> = state.rows(&table).to_vec();
    if let Some(conditions) = where_clause(sql) {
        for condition in conditions.split(" AND ") {
            rows.retain(|row| satisfies(row, condition, params));
        }
    }
    if let Some((_, rest)) = sql.split_once(" LIMIT ") {
        let limit = rest.split(' ').next().and_then(|n| n.parse().ok());
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
    }
    rows
}
