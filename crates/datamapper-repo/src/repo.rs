//! The repository: compiles queries and hands them to an [`Executor`].

use crate::preload::{self, PreloadTree};
use asupersync::{Cx, Outcome};
use datamapper_core::{
    CardinalityError, Dialect, Error, Executor, FromValue, Record, Row, Schema, Value,
};
use datamapper_query::{FromQueryRow, Query, Queryable, Statement};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configuration for a [`Repo`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Dialect to render statements in. Defaults to the executor's.
    pub dialect: Option<Dialect>,
    /// Emit every rendered statement at debug level.
    pub log_sql: bool,
}

impl RepoConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the rendering dialect (builder pattern).
    #[must_use]
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Set the `log_sql` option (builder pattern).
    #[must_use]
    pub fn log_sql(mut self, value: bool) -> Self {
        self.log_sql = value;
        self
    }
}

/// Dispatches compiled statements to an executor.
///
/// # Example
///
/// ```ignore
/// let repo = Repo::new(executor);
/// let users = repo
///     .all(&cx, Query::new(user).filter("age__gte", 18).preload("pets"))
///     .await;
/// ```
pub struct Repo<E: Executor> {
    executor: E,
    config: RepoConfig,
}

impl<E: Executor> Repo<E> {
    pub fn new(executor: E) -> Self {
        Self::with_config(executor, RepoConfig::default())
    }

    pub fn with_config(executor: E, config: RepoConfig) -> Self {
        Self { executor, config }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// The dialect statements are rendered in.
    pub fn dialect(&self) -> Dialect {
        self.config
            .dialect
            .unwrap_or_else(|| self.executor.dialect())
    }

    fn render(&self, statement: &Statement) -> (String, Vec<Value>) {
        let (sql, params) = statement.to_sql(self.dialect());
        self.log(&sql, params.len());
        (sql, params)
    }

    fn log(&self, sql: &str, params: usize) {
        if self.config.log_sql {
            tracing::debug!(sql = %sql, params, "executing statement");
        }
    }

    async fn run_query(&self, cx: &Cx, sql: &str, params: &[Value]) -> Outcome<Vec<Row>, Error> {
        match self.executor.query(cx, sql, params).await {
            Outcome::Ok(rows) => {
                tracing::trace!(rows = rows.len(), "query returned");
                Outcome::Ok(rows)
            }
            other => other,
        }
    }

    async fn run_execute(&self, cx: &Cx, statement: &Statement) -> Outcome<u64, Error> {
        let (sql, params) = self.render(statement);
        match self.executor.execute(cx, &sql, &params).await {
            Outcome::Ok(affected) => {
                tracing::debug!(
                    kind = statement.kind.keyword(),
                    table = %statement.table,
                    affected,
                    "statement executed"
                );
                Outcome::Ok(affected)
            }
            other => other,
        }
    }

    /// Fetch every result of a query, then run its preloads.
    pub async fn all<Q>(&self, cx: &Cx, queryable: Q) -> Outcome<Vec<Q::Output>, Error>
    where
        Q: Queryable,
    {
        let query = queryable.to_query();
        self.fetch(cx, &query).await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(model = %query.schema().model()))]
    async fn fetch<O: FromQueryRow>(&self, cx: &Cx, query: &Query<O>) -> Outcome<Vec<O>, Error> {
        let statement = match query.to_select_statement() {
            Ok(statement) => statement,
            Err(e) => return Outcome::Err(e),
        };
        let (sql, params) = self.render(&statement);
        let rows = match self.run_query(cx, &sql, &params).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            match query.deserialize(row) {
                Ok(result) => results.push(result),
                Err(e) => return Outcome::Err(e),
            }
        }

        if !query.preloads().is_empty() {
            if let Some(records) = O::records_mut(&mut results) {
                let tree = PreloadTree::from_paths(query.preloads());
                match preload::preload(cx, self, records, &tree).await {
                    Outcome::Ok(fetches) => {
                        tracing::debug!(fetches, "preloads resolved");
                    }
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                }
            }
        }

        Outcome::Ok(results)
    }

    /// The first result, or `None` when there is none.
    pub async fn first<Q>(&self, cx: &Cx, queryable: Q) -> Outcome<Option<Q::Output>, Error>
    where
        Q: Queryable,
    {
        let query = queryable.to_query().limit(1);
        match self.fetch(cx, &query).await {
            Outcome::Ok(results) => Outcome::Ok(results.into_iter().next()),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Exactly one result; zero or several is a cardinality error.
    pub async fn one<Q>(&self, cx: &Cx, queryable: Q) -> Outcome<Q::Output, Error>
    where
        Q: Queryable,
    {
        let results = match self.all(cx, queryable).await {
            Outcome::Ok(results) => results,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        match assert_one(results) {
            Ok(result) => Outcome::Ok(result),
            Err(e) => Outcome::Err(e),
        }
    }

    /// The single record whose primary key equals `id`.
    pub async fn get(
        &self,
        cx: &Cx,
        schema: &Arc<Schema>,
        id: impl Into<Value>,
    ) -> Outcome<Record, Error> {
        let query = Query::new(Arc::clone(schema)).filter(schema.primary_key(), id);
        self.one(cx, query).await
    }

    /// The single result matching every `(clause name, value)` pair.
    pub async fn get_by<Q, I, K, V>(
        &self,
        cx: &Cx,
        queryable: Q,
        fields: I,
    ) -> Outcome<Q::Output, Error>
    where
        Q: Queryable,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let query = queryable.to_query().filter_all(fields);
        self.one(cx, query).await
    }

    /// Number of rows the query would return.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn count<Q: Queryable>(&self, cx: &Cx, queryable: Q) -> Outcome<i64, Error> {
        let statement = match queryable.to_select_statement() {
            Ok(statement) => statement,
            Err(e) => return Outcome::Err(e),
        };
        let (sql, params) = statement.to_count_sql(self.dialect());
        self.log(&sql, params.len());
        let rows = match self.run_query(cx, &sql, &params).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let Some(row) = rows.first() else {
            return Outcome::Err(Error::Cardinality(CardinalityError::NoResults));
        };
        let count = match row.get_by_name("count").or_else(|| row.get(0)) {
            Some(value) => i64::from_value(value),
            None => return Outcome::Err(Error::Cardinality(CardinalityError::NoResults)),
        };
        match count {
            Ok(count) => Outcome::Ok(count),
            Err(e) => Outcome::Err(e),
        }
    }

    /// Insert a record's non-NULL columns.
    ///
    /// When the record has no primary key yet, the id reported by the
    /// executor is written back into it.
    #[tracing::instrument(level = "debug", skip_all, fields(model = %record.model()))]
    pub async fn insert(&self, cx: &Cx, mut record: Record) -> Outcome<Record, Error> {
        let dialect = self.dialect();
        let (sql, params) = insert_sql(&record, dialect);
        self.log(&sql, params.len());

        let id = match self.executor.insert(cx, &sql, &params).await {
            Outcome::Ok(id) => id,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        tracing::debug!(id, "record inserted");

        let primary_key = record.schema().primary_key().to_string();
        let needs_id = matches!(record.get(&primary_key), Ok(Value::Null));
        if needs_id {
            if let Err(e) = record.set(&primary_key, Value::BigInt(id)) {
                return Outcome::Err(e);
            }
        }
        Outcome::Ok(record)
    }

    /// Write `changes` to the row behind `record` and apply them locally.
    pub async fn update<I, K, V>(
        &self,
        cx: &Cx,
        mut record: Record,
        changes: I,
    ) -> Outcome<Record, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let changes = collect_changes(changes);
        let statement = match record.to_update_statement(changes.clone()) {
            Ok(statement) => statement,
            Err(e) => return Outcome::Err(e),
        };
        match self.run_execute(cx, &statement).await {
            Outcome::Ok(_) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
        for (column, value) in changes {
            if let Err(e) = record.set(&column, value) {
                return Outcome::Err(e);
            }
        }
        Outcome::Ok(record)
    }

    /// Delete the row behind `record`, handing the record back.
    pub async fn delete(&self, cx: &Cx, record: Record) -> Outcome<Record, Error> {
        let statement = match record.to_delete_statement() {
            Ok(statement) => statement,
            Err(e) => return Outcome::Err(e),
        };
        match self.run_execute(cx, &statement).await {
            Outcome::Ok(_) => Outcome::Ok(record),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Apply `changes` to every row the query matches; returns rows affected.
    pub async fn update_all<Q, I, K, V>(
        &self,
        cx: &Cx,
        queryable: Q,
        changes: I,
    ) -> Outcome<u64, Error>
    where
        Q: Queryable,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let statement = match queryable.to_update_statement(collect_changes(changes)) {
            Ok(statement) => statement,
            Err(e) => return Outcome::Err(e),
        };
        self.run_execute(cx, &statement).await
    }

    /// Delete every row the query matches; returns rows affected.
    pub async fn delete_all<Q: Queryable>(&self, cx: &Cx, queryable: Q) -> Outcome<u64, Error> {
        let statement = match queryable.to_delete_statement() {
            Ok(statement) => statement,
            Err(e) => return Outcome::Err(e),
        };
        self.run_execute(cx, &statement).await
    }

    /// Load association paths onto records that were already fetched.
    ///
    /// Returns the number of fetches issued.
    pub async fn preload<I, S>(
        &self,
        cx: &Cx,
        records: &mut [Record],
        paths: I,
    ) -> Outcome<usize, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tree = PreloadTree::from_paths(paths);
        preload::preload(cx, self, records, &tree).await
    }
}

fn collect_changes<I, K, V>(changes: I) -> Vec<(String, Value)>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    changes
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

fn assert_one<T>(results: Vec<T>) -> datamapper_core::Result<T> {
    let count = results.len();
    let mut results = results.into_iter();
    match (results.next(), count) {
        (None, _) => Err(Error::Cardinality(CardinalityError::NoResults)),
        (Some(result), 1) => Ok(result),
        (Some(_), n) => Err(Error::Cardinality(CardinalityError::MultipleResults(n))),
    }
}

fn insert_sql(record: &Record, dialect: Dialect) -> (String, Vec<Value>) {
    let table = dialect.quote_identifier(record.schema().table());
    let mut columns = Vec::new();
    let mut params = Vec::new();
    for (name, value) in record.attributes() {
        if value.is_null() {
            continue;
        }
        columns.push(dialect.quote_identifier(name));
        params.push(value.clone());
    }

    if columns.is_empty() {
        let sql = match dialect {
            Dialect::Mysql => format!("INSERT INTO {table} () VALUES ()"),
            _ => format!("INSERT INTO {table} DEFAULT VALUES"),
        };
        return (sql, params);
    }

    let placeholders: Vec<String> = (1..=params.len()).map(|i| dialect.placeholder(i)).collect();
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    );
    (sql, params)
}
