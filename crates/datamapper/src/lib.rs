//! datamapper - query compilation and association preloading over a declared
//! relational schema.
//!
//! Models are declared at runtime as [`Schema`]s and collected into a
//! [`Registry`]. Queries are immutable values built from clause names
//! (`"age__gte"`, `"p__name__icontains"`, `"-name"`), compiled into
//! statements and dispatched through a [`Repo`] to any [`Executor`].
//!
//! # Quick Start
//!
//! ```ignore
//! use datamapper::prelude::*;
//!
//! let mut registry = Registry::new();
//! registry.register(
//!     Schema::builder("User", "users")
//!         .primary_key("id", SqlType::BigInt)
//!         .column("name", SqlType::Text)
//!         .has_many("pets", "Pet", "owner_id")
//!         .build(),
//! )?;
//! registry.register(
//!     Schema::builder("Pet", "pets")
//!         .primary_key("id", SqlType::BigInt)
//!         .column("owner_id", SqlType::BigInt)
//!         .belongs_to("owner", "User", "owner_id")
//!         .build(),
//! )?;
//! let registry = registry.finalize()?;
//! let user = registry.schema("User")?;
//!
//! async fn example(cx: &Cx, repo: &Repo<impl Executor>, user: Arc<Schema>) {
//!     let users = repo
//!         .all(cx, Query::new(user).join_as("pets", "p").filter("p__name", "Fido").preload("pets"))
//!         .await;
//! }
//! ```
//!
//! # Crates
//!
//! - `datamapper-core`: values, rows, errors, schema registry, records, executor trait
//! - `datamapper-query`: clause parser, join planner, query builder, statement compiler
//! - `datamapper-repo`: repository dispatch and batched preloading

pub use asupersync::{Cx, Outcome};

pub use datamapper_core::{
    Association, AssociationKind, Cardinality, CardinalityError, Column, ColumnInfo,
    DEFAULT_PRIMARY_KEY, Dialect, Error, Executor, FromValue, Loaded, PlanError, PlanErrorKind,
    QueryError, QueryErrorKind, Record, Registry, Result, Row, Schema, SchemaBuilder, SchemaError,
    SchemaErrorKind, SqlType, StateError, StateErrorKind, TypeError, Value, ValueKey,
};

pub use datamapper_query::{
    AliasTracker, BinaryOp, Expr, FromQueryRow, Join, JoinType, NullsOrder, Operator, OrderBy,
    OrderDirection, Projection, Query, Queryable, Shaped, Statement, StatementKind, parse_order,
    parse_select, parse_where,
};

pub use datamapper_repo::{PreloadTree, Repo, RepoConfig};

/// Commonly used items.
pub mod prelude {
    pub use crate::{
        Cx, Dialect, Error, Executor, Expr, Loaded, OrderBy, Outcome, Projection, Query,
        Queryable, Record, Registry, Repo, RepoConfig, Result, Row, Schema, Shaped, SqlType,
        Value,
    };
    pub use std::sync::Arc;
}
