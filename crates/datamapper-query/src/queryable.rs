//! Anything that can stand in for a query.

use crate::query::{FromQueryRow, Query};
use crate::statement::Statement;
use datamapper_core::{Record, Result, Row, Schema, Value};
use std::sync::Arc;

/// A source of queries: a built [`Query`], or a bare model schema meaning
/// "every row of this table".
pub trait Queryable {
    type Output: FromQueryRow;

    fn to_query(&self) -> Query<Self::Output>;

    fn to_select_statement(&self) -> Result<Statement> {
        self.to_query().to_select_statement()
    }

    fn to_update_statement(&self, changes: Vec<(String, Value)>) -> Result<Statement> {
        self.to_query().to_update_statement(changes)
    }

    fn to_delete_statement(&self) -> Result<Statement> {
        self.to_query().to_delete_statement()
    }

    fn deserialize(&self, row: &Row) -> Result<Self::Output> {
        self.to_query().deserialize(row)
    }
}

impl<O: FromQueryRow> Queryable for Query<O> {
    type Output = O;

    fn to_query(&self) -> Query<O> {
        self.clone()
    }
}

impl Queryable for Arc<Schema> {
    type Output = Record;

    fn to_query(&self) -> Query<Record> {
        Query::new(Arc::clone(self))
    }
}

/// A record stands for the query matching its own primary key.
impl Queryable for Record {
    type Output = Record;

    fn to_query(&self) -> Query<Record> {
        let schema = Arc::clone(self.schema());
        let key = schema.primary_key().to_string();
        let value = self.get(&key).cloned().unwrap_or(Value::Null);
        Query::new(schema).filter(key, value)
    }
}

impl<Q: Queryable + ?Sized> Queryable for &Q {
    type Output = Q::Output;

    fn to_query(&self) -> Query<Self::Output> {
        (**self).to_query()
    }
}
