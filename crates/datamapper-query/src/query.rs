//! The immutable query builder and its statement compiler.
//!
//! Every builder method consumes the query and returns a new one. Clause
//! collections live behind `Arc`, so cloning a query is cheap and appending to
//! a shared collection copies it first; a query handed to several builders
//! never observes the others' additions.
//!
//! ```ignore
//! let query = Query::new(user)
//!     .join_as("pets", "p")
//!     .filter("p__name__startswith", "F")
//!     .order_by("-name")
//!     .limit(10);
//! let statement = query.to_select_statement()?;
//! ```

use crate::alias::AliasTracker;
use crate::clause::OrderBy;
use crate::expr::Expr;
use crate::join::{self, Join};
use crate::parser::{parse_order, parse_select, parse_where};
use crate::projection::{Projection, Shaped};
use crate::statement::{Statement, StatementKind};
use datamapper_core::{Error, Record, Result, Row, Schema, Value};
use std::marker::PhantomData;
use std::sync::Arc;

/// One WHERE entry.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    /// A raw predicate used verbatim
    Expr(Expr),
    /// Clause-name keyed values, ANDed in order
    Fields(Vec<(String, Value)>),
}

/// One ORDER BY entry.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderClause {
    /// A clause name such as `"-name"` or `"p__name"`
    Name(String),
    /// A raw ordering term
    Expr(OrderBy),
}

/// How a query's rows become results.
pub trait FromQueryRow: Sized + Send {
    fn from_query_row(query: &Query<Self>, row: &Row) -> Result<Self>;

    /// View results as records when they are records.
    fn records_mut(_results: &mut [Self]) -> Option<&mut [Record]> {
        None
    }
}

impl FromQueryRow for Record {
    fn from_query_row(query: &Query<Self>, row: &Row) -> Result<Self> {
        Ok(Record::from_row(Arc::clone(query.schema()), row))
    }

    fn records_mut(results: &mut [Self]) -> Option<&mut [Record]> {
        Some(results)
    }
}

impl FromQueryRow for Shaped {
    fn from_query_row(query: &Query<Self>, row: &Row) -> Result<Self> {
        match query.projection() {
            Some(projection) => projection.reshape(row),
            None => Ok(Shaped::Map(
                row.iter()
                    .map(|(name, value)| (name.to_string(), Shaped::Value(value.clone())))
                    .collect(),
            )),
        }
    }
}

/// An immutable query over one root model.
///
/// `O` is what each result row turns into: a [`Record`] by default, or a
/// [`Shaped`] value once a projection has been selected.
pub struct Query<O = Record> {
    schema: Arc<Schema>,
    wheres: Arc<Vec<WhereClause>>,
    order_bys: Arc<Vec<OrderClause>>,
    joins: Arc<Vec<Join>>,
    projection: Option<Arc<Projection>>,
    limit: Option<u64>,
    offset: Option<u64>,
    preloads: Arc<Vec<String>>,
    _output: PhantomData<fn() -> O>,
}

impl<O> Clone for Query<O> {
    fn clone(&self) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            wheres: Arc::clone(&self.wheres),
            order_bys: Arc::clone(&self.order_bys),
            joins: Arc::clone(&self.joins),
            projection: self.projection.clone(),
            limit: self.limit,
            offset: self.offset,
            preloads: Arc::clone(&self.preloads),
            _output: PhantomData,
        }
    }
}

impl<O> std::fmt::Debug for Query<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("model", &self.schema.model())
            .field("wheres", &self.wheres)
            .field("order_bys", &self.order_bys)
            .field("joins", &self.joins.iter().map(Join::name).collect::<Vec<_>>())
            .field("projection", &self.projection)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("preloads", &self.preloads)
            .finish()
    }
}

impl Query<Record> {
    /// The identity query over `schema`'s whole table.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            wheres: Arc::new(Vec::new()),
            order_bys: Arc::new(Vec::new()),
            joins: Arc::new(Vec::new()),
            projection: None,
            limit: None,
            offset: None,
            preloads: Arc::new(Vec::new()),
            _output: PhantomData,
        }
    }

    /// Preload a dotted association path on every fetched record.
    pub fn preload(mut self, path: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.preloads).push(path.into());
        self
    }

    /// Select a projection instead of whole records.
    ///
    /// Preload paths are dropped: projected rows are not records.
    pub fn select(self, projection: impl Into<Projection>) -> Query<Shaped> {
        if !self.preloads.is_empty() {
            tracing::warn!(
                preloads = self.preloads.len(),
                "dropping preloads from a projected query"
            );
        }
        self.with_projection(projection.into())
    }
}

impl Query<Shaped> {
    /// Replace the projection.
    pub fn select(self, projection: impl Into<Projection>) -> Query<Shaped> {
        self.with_projection(projection.into())
    }
}

impl<O> Query<O> {
    fn with_projection(self, projection: Projection) -> Query<Shaped> {
        Query {
            schema: self.schema,
            wheres: self.wheres,
            order_bys: self.order_bys,
            joins: self.joins,
            projection: Some(Arc::new(projection)),
            limit: self.limit,
            offset: self.offset,
            preloads: Arc::new(Vec::new()),
            _output: PhantomData,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Filter on one clause name, e.g. `"age__gte"` or `"p__name"`.
    pub fn filter(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter_all([(name.into(), value.into())])
    }

    /// Filter on several clause names at once.
    pub fn filter_all<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let fields: Vec<(String, Value)> = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Arc::make_mut(&mut self.wheres).push(WhereClause::Fields(fields));
        self
    }

    /// Filter with a raw predicate.
    pub fn filter_expr(mut self, expr: Expr) -> Self {
        Arc::make_mut(&mut self.wheres).push(WhereClause::Expr(expr));
        self
    }

    /// Order by a clause name; a leading `-` sorts descending.
    pub fn order_by(mut self, name: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.order_bys).push(OrderClause::Name(name.into()));
        self
    }

    pub fn order_by_expr(mut self, order: OrderBy) -> Self {
        Arc::make_mut(&mut self.order_bys).push(OrderClause::Expr(order));
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Inner-join a dotted association path.
    pub fn join(self, path: &str) -> Self {
        self.push_join(path, None, false)
    }

    /// Inner-join a dotted association path under an explicit alias.
    pub fn join_as(self, path: &str, alias: impl Into<String>) -> Self {
        self.push_join(path, Some(alias.into()), false)
    }

    /// Left-outer-join a dotted association path.
    pub fn outer_join(self, path: &str) -> Self {
        self.push_join(path, None, true)
    }

    pub fn outer_join_as(self, path: &str, alias: impl Into<String>) -> Self {
        self.push_join(path, Some(alias.into()), true)
    }

    fn push_join(mut self, path: &str, alias: Option<String>, outer: bool) -> Self {
        let join = Join::new(path, alias, outer);
        Arc::make_mut(&mut self.joins).push(join);
        self
    }

    pub fn wheres(&self) -> &[WhereClause] {
        &self.wheres
    }

    pub fn order_bys(&self) -> &[OrderClause] {
        &self.order_bys
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_deref()
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    pub fn preloads(&self) -> &[String] {
        &self.preloads
    }

    /// Compile to a SELECT statement.
    #[tracing::instrument(level = "debug", skip(self), fields(model = %self.schema.model()))]
    pub fn to_select_statement(&self) -> Result<Statement> {
        let mut tracker = AliasTracker::new();
        let joins = self.compile_joins(&mut tracker)?;
        let filters = self.compile_filters(&tracker)?;
        let order_by = self.compile_order(&tracker)?;
        let columns = match self.projection.as_deref() {
            Some(projection) => self.compile_projection(projection, &tracker)?,
            None => self
                .schema
                .column_names()
                .map(|name| Expr::qualified(self.schema.table(), name))
                .collect(),
        };

        tracing::trace!(
            joins = joins.len(),
            filters = filters.len(),
            columns = columns.len(),
            "compiled select"
        );

        Ok(Statement {
            kind: StatementKind::Select { columns },
            table: self.schema.table().to_string(),
            joins,
            filters,
            order_by,
            limit: self.limit,
            offset: self.offset,
        })
    }

    /// Compile to an UPDATE of every matching row.
    pub fn to_update_statement(&self, changes: Vec<(String, Value)>) -> Result<Statement> {
        self.check_filter_only("UPDATE")?;
        if changes.is_empty() {
            return Err(Error::Custom(
                "UPDATE statements need at least one change".to_string(),
            ));
        }
        for (column, _) in &changes {
            self.schema.column(column)?;
        }
        self.filter_only_statement(StatementKind::Update { changes })
    }

    /// Compile to a DELETE of every matching row.
    pub fn to_delete_statement(&self) -> Result<Statement> {
        self.check_filter_only("DELETE")?;
        self.filter_only_statement(StatementKind::Delete)
    }

    fn filter_only_statement(&self, kind: StatementKind) -> Result<Statement> {
        let tracker = AliasTracker::new();
        let filters = self.compile_filters(&tracker)?;
        Ok(Statement {
            kind,
            table: self.schema.table().to_string(),
            joins: Vec::new(),
            filters,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        })
    }

    fn check_filter_only(&self, keyword: &str) -> Result<()> {
        let unsupported = if !self.joins.is_empty() {
            Some("JOIN")
        } else if !self.order_bys.is_empty() {
            Some("ORDER BY")
        } else if self.projection.is_some() {
            Some("a column projection")
        } else if self.limit.is_some() {
            Some("LIMIT")
        } else if self.offset.is_some() {
            Some("OFFSET")
        } else {
            None
        };
        match unsupported {
            Some(clause) => Err(Error::unsupported_clause(clause, keyword)),
            None => Ok(()),
        }
    }

    fn compile_joins(&self, tracker: &mut AliasTracker) -> Result<Vec<join::JoinClause>> {
        if self.joins.is_empty() {
            return Ok(Vec::new());
        }
        let tree = join::to_join_tree(&self.joins)?;
        join::walk(&tree, &self.schema, self.schema.table(), tracker)
    }

    fn compile_filters(&self, tracker: &AliasTracker) -> Result<Vec<Expr>> {
        let mut filters = Vec::new();
        for clause in self.wheres.iter() {
            match clause {
                WhereClause::Expr(expr) => filters.push(expr.clone()),
                WhereClause::Fields(fields) => {
                    for (name, value) in fields {
                        let reference = parse_where(name);
                        let column =
                            self.column(&reference.column, reference.alias.as_deref(), tracker)?;
                        filters.push(reference.operator.apply(column, value.clone())?);
                    }
                }
            }
        }
        Ok(filters)
    }

    fn compile_order(&self, tracker: &AliasTracker) -> Result<Vec<OrderBy>> {
        self.order_bys
            .iter()
            .map(|clause| match clause {
                OrderClause::Expr(order) => Ok(order.clone()),
                OrderClause::Name(name) => {
                    let reference = parse_order(name);
                    let column =
                        self.column(&reference.column, reference.alias.as_deref(), tracker)?;
                    Ok(OrderBy {
                        expr: column,
                        direction: reference.direction,
                        nulls: None,
                    })
                }
            })
            .collect()
    }

    fn compile_projection(
        &self,
        projection: &Projection,
        tracker: &AliasTracker,
    ) -> Result<Vec<Expr>> {
        projection
            .leaves()
            .into_iter()
            .map(|leaf| match leaf {
                Projection::Column(name) => {
                    let reference = parse_select(name);
                    self.column(&reference.column, reference.alias.as_deref(), tracker)
                }
                Projection::Expr(expr) => Ok(expr.clone()),
                _ => Err(Error::Custom("projection leaf expected".to_string())),
            })
            .collect()
    }

    /// Resolve a column on an alias, or on the root table when unaliased.
    fn column(&self, name: &str, alias: Option<&str>, tracker: &AliasTracker) -> Result<Expr> {
        match alias {
            Some(alias) => {
                let aliased = tracker.fetch(alias)?;
                aliased.schema.column(name)?;
                Ok(Expr::qualified(alias, name))
            }
            None => {
                self.schema.column(name)?;
                Ok(Expr::qualified(self.schema.table(), name))
            }
        }
    }
}

impl<O: FromQueryRow> Query<O> {
    /// Turn one result row into this query's output.
    pub fn deserialize(&self, row: &Row) -> Result<O> {
        O::from_query_row(self, row)
    }
}
