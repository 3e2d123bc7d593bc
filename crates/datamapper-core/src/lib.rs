//! Core types for datamapper.
//!
//! - `Value` and `Row` for data flowing to and from the executor
//! - `Schema` and `Registry` for declared models and their associations
//! - `Record` for instances with loaded associations
//! - `Executor` trait for the storage collaborator
//! - `Outcome` and `Cx` re-exported from asupersync for cancel-correct async

pub use asupersync::{Cx, Outcome};

pub mod dialect;
pub mod error;
pub mod executor;
pub mod record;
pub mod row;
pub mod schema;
pub mod types;
pub mod value;

pub use dialect::Dialect;
pub use error::{
    CardinalityError, Error, PlanError, PlanErrorKind, QueryError, QueryErrorKind, Result,
    SchemaError, SchemaErrorKind, StateError, StateErrorKind, TypeError,
};
pub use executor::Executor;
pub use record::{Loaded, Record};
pub use row::{ColumnInfo, FromValue, Row};
pub use schema::{
    Association, AssociationKind, Cardinality, Column, DEFAULT_PRIMARY_KEY, Registry, Schema,
    SchemaBuilder,
};
pub use types::SqlType;
pub use value::{Value, ValueKey};
