//! The storage collaborator that runs rendered statements.
//!
//! The mapper never opens connections itself. Everything that touches the
//! database goes through an [`Executor`], which receives SQL text and bound
//! parameters and hands back rows, affected counts or inserted ids. All calls
//! carry an asupersync [`Cx`] so cancellation reaches the driver.

use crate::dialect::Dialect;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::future::Future;

/// Runs SQL on behalf of a repository.
pub trait Executor: Send + Sync {
    /// The SQL dialect statements should be rendered in.
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    /// Execute a query and return all rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, crate::Error>> + Send;

    /// Execute an UPDATE or DELETE and return rows affected.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, crate::Error>> + Send;

    /// Execute an INSERT and return the last inserted id.
    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, crate::Error>> + Send;
}
