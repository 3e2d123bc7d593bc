//! Error types for mapping, compilation and preload operations.

use std::fmt;

/// The primary error type for all datamapper operations.
#[derive(Debug)]
pub enum Error {
    /// Unknown columns, associations, aliases or models
    Schema(SchemaError),
    /// Join planning and statement shape errors
    Plan(PlanError),
    /// Record state errors (unloaded associations, unknown attributes)
    State(StateError),
    /// Result cardinality errors from `one`
    Cardinality(CardinalityError),
    /// Type conversion errors
    Type(TypeError),
    /// Errors reported by the executor, passed through unchanged
    Query(QueryError),
    /// Operation was cancelled via asupersync
    Cancelled,
    /// Custom error with message
    Custom(String),
}

#[derive(Debug, Clone)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Column is not declared on the table
    UnknownColumn,
    /// Association is not declared on the model
    UnknownAssociation,
    /// Alias was never allocated in this compilation
    UnknownAlias,
    /// Model name is not present in the registry
    UnknownModel,
    /// Model name registered twice
    DuplicateModel,
    /// Schema was used before its registry was finalized
    Detached,
}

#[derive(Debug, Clone)]
pub struct PlanError {
    pub kind: PlanErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanErrorKind {
    /// A nested join was requested without its parent path
    MissingJoin,
    /// An explicit or generated alias is already taken
    ConflictingAlias,
    /// Clause cannot be expressed in this statement kind
    UnsupportedClause,
}

#[derive(Debug, Clone)]
pub struct StateError {
    pub kind: StateErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateErrorKind {
    /// Association slot has not been populated
    NotLoaded,
    /// Attribute is neither a column nor an association
    UnknownAttribute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardinalityError {
    /// Exactly one row was expected, none came back
    NoResults,
    /// Exactly one row was expected, this many came back
    MultipleResults(usize),
}

#[derive(Debug, Clone)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
    pub rust_type: Option<&'static str>,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found by the engine
    NotFound,
    /// Other database error
    Database,
}

impl Error {
    /// `column '<name>' does not exist for table '<table>'`
    pub fn unknown_column(name: &str, table: &str) -> Self {
        Error::Schema(SchemaError {
            kind: SchemaErrorKind::UnknownColumn,
            message: format!("column '{name}' does not exist for table '{table}'"),
        })
    }

    /// `association '<name>' does not exist for model '<model>'`
    pub fn unknown_association(name: &str, model: &str) -> Self {
        Error::Schema(SchemaError {
            kind: SchemaErrorKind::UnknownAssociation,
            message: format!("association '{name}' does not exist for model '{model}'"),
        })
    }

    pub fn unknown_alias(name: &str) -> Self {
        Error::Schema(SchemaError {
            kind: SchemaErrorKind::UnknownAlias,
            message: format!("alias '{name}' does not exist"),
        })
    }

    pub fn unknown_model(name: &str) -> Self {
        Error::Schema(SchemaError {
            kind: SchemaErrorKind::UnknownModel,
            message: format!("model '{name}' is not registered"),
        })
    }

    pub fn duplicate_model(name: &str) -> Self {
        Error::Schema(SchemaError {
            kind: SchemaErrorKind::DuplicateModel,
            message: format!("model '{name}' is already registered"),
        })
    }

    pub fn detached(model: &str) -> Self {
        Error::Schema(SchemaError {
            kind: SchemaErrorKind::Detached,
            message: format!("model '{model}' is not attached to a registry"),
        })
    }

    pub fn missing_join(child: &str, parent: &str) -> Self {
        Error::Plan(PlanError {
            kind: PlanErrorKind::MissingJoin,
            message: format!("can't join '{child}' without joining '{parent}'"),
        })
    }

    pub fn conflicting_alias(name: &str) -> Self {
        Error::Plan(PlanError {
            kind: PlanErrorKind::ConflictingAlias,
            message: format!("alias '{name}' conflicts with an existing alias"),
        })
    }

    /// `<clause> is not supported in <KIND> statements`
    pub fn unsupported_clause(clause: &str, kind: &str) -> Self {
        Error::Plan(PlanError {
            kind: PlanErrorKind::UnsupportedClause,
            message: format!("{clause} is not supported in {kind} statements"),
        })
    }

    pub fn not_loaded(name: &str, model: &str) -> Self {
        Error::State(StateError {
            kind: StateErrorKind::NotLoaded,
            message: format!("association '{name}' is not loaded for model '{model}'"),
        })
    }

    pub fn unknown_attribute(name: &str, model: &str) -> Self {
        Error::State(StateError {
            kind: StateErrorKind::UnknownAttribute,
            message: format!("'{model}' object has no attribute '{name}'"),
        })
    }

    /// Kind of a schema error, if this is one.
    pub fn schema_kind(&self) -> Option<SchemaErrorKind> {
        match self {
            Error::Schema(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Kind of a plan error, if this is one.
    pub fn plan_kind(&self) -> Option<PlanErrorKind> {
        match self {
            Error::Plan(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Kind of a state error, if this is one.
    pub fn state_kind(&self) -> Option<StateErrorKind> {
        match self {
            Error::State(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Schema(e) => write!(f, "{}", e),
            Error::Plan(e) => write!(f, "{}", e),
            Error::State(e) => write!(f, "{}", e),
            Error::Cardinality(e) => write!(f, "{}", e),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for CardinalityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardinalityError::NoResults => {
                write!(f, "expected at least one result but got none")
            }
            CardinalityError::MultipleResults(count) => {
                write!(f, "expected at most one result but got {}", count)
            }
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<PlanError> for Error {
    fn from(err: PlanError) -> Self {
        Error::Plan(err)
    }
}

impl From<StateError> for Error {
    fn from(err: StateError) -> Self {
        Error::State(err)
    }
}

impl From<CardinalityError> for Error {
    fn from(err: CardinalityError) -> Self {
        Error::Cardinality(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

/// Result type alias for datamapper operations.
pub type Result<T> = std::result::Result<T, Error>;
