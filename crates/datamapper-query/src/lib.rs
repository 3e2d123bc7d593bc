//! Query construction and compilation for datamapper.
//!
//! `datamapper-query` turns clause-name keyed filters, orderings, association
//! joins and projections into dialect-neutral [`Statement`]s.
//!
//! # Role In The Architecture
//!
//! - **Clause parser**: `"p__name__icontains"` style names become typed references.
//! - **Join planner**: dotted association paths become a checked tree of JOINs.
//! - **Alias tracker**: one per compilation, allocating `p0`, `u1`, ... aliases.
//! - **Query builder**: an immutable [`Query`] compiled into SELECT, UPDATE or DELETE.
//!
//! Statements render to SQL plus parameters for any [`Dialect`] and are run by
//! `datamapper-repo` through an `Executor`.

pub mod alias;
pub mod clause;
pub mod expr;
pub mod join;
pub mod parser;
pub mod projection;
pub mod query;
pub mod queryable;
pub mod statement;

pub use alias::{AliasTracker, AliasedTable};
pub use clause::{NullsOrder, OrderBy, OrderDirection};
pub use datamapper_core::Dialect;
pub use expr::{BinaryOp, Expr};
pub use join::{Join, JoinClause, JoinNode, JoinType, to_join_tree};
pub use parser::{ColumnRef, Operator, OrderRef, WhereRef, parse_order, parse_select, parse_where};
pub use projection::{Projection, Shaped};
pub use query::{FromQueryRow, OrderClause, Query, WhereClause};
pub use queryable::Queryable;
pub use statement::{Statement, StatementKind};
