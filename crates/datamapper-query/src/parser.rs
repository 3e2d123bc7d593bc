//! Decoding of `alias__column__operator` clause names.
//!
//! ```text
//! select-ref := [alias "__"] column
//! order-ref  := ["-"] select-ref
//! where-ref  := [alias "__"] column ["__" operator]
//! ```
//!
//! A trailing segment that is not a known operator stays part of the column
//! reference, so `name__bogus` is the column `bogus` on alias `name`.

use crate::clause::OrderDirection;
use crate::expr::Expr;
use datamapper_core::{Error, Result, TypeError, Value};

/// Separator between alias, column and operator segments.
pub const SEPARATOR: &str = "__";

const DESCENDING_PREFIX: char = '-';

/// Comparison operators available in where-clause names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `exact`, `eq` (the default)
    Eq,
    /// `not_eq`
    NotEq,
    /// `iexact`: case-insensitive equality; `%` and `_` match themselves
    IExact,
    Like,
    NotLike,
    ILike,
    NotILike,
    /// `contains`: `LIKE '%v%'`
    Contains,
    /// `icontains`: `ILIKE '%v%'`
    IContains,
    /// `startswith`: `LIKE 'v%'`
    StartsWith,
    /// `endswith`: `LIKE '%v'`
    EndsWith,
    In,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    /// Look up an operator by its clause-name token.
    pub fn from_token(token: &str) -> Option<Self> {
        let op = match token {
            "exact" | "eq" => Operator::Eq,
            "not_eq" => Operator::NotEq,
            "iexact" => Operator::IExact,
            "like" => Operator::Like,
            "not_like" => Operator::NotLike,
            "ilike" => Operator::ILike,
            "not_ilike" => Operator::NotILike,
            "contains" => Operator::Contains,
            "icontains" => Operator::IContains,
            "startswith" => Operator::StartsWith,
            "endswith" => Operator::EndsWith,
            "in" => Operator::In,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            _ => return None,
        };
        Some(op)
    }

    /// Canonical token for this operator.
    pub const fn token(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::NotEq => "not_eq",
            Operator::IExact => "iexact",
            Operator::Like => "like",
            Operator::NotLike => "not_like",
            Operator::ILike => "ilike",
            Operator::NotILike => "not_ilike",
            Operator::Contains => "contains",
            Operator::IContains => "icontains",
            Operator::StartsWith => "startswith",
            Operator::EndsWith => "endswith",
            Operator::In => "in",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
        }
    }

    /// Whether this operator matches against a text pattern.
    pub const fn is_pattern(self) -> bool {
        matches!(
            self,
            Operator::IExact
                | Operator::Like
                | Operator::NotLike
                | Operator::ILike
                | Operator::NotILike
                | Operator::Contains
                | Operator::IContains
                | Operator::StartsWith
                | Operator::EndsWith
        )
    }

    /// Build the predicate `column <op> value`.
    ///
    /// Pattern operators require a text value. `In` accepts an array (a
    /// scalar is a one-element list); an empty list never matches. Equality
    /// against NULL renders as `IS NULL` / `IS NOT NULL`.
    pub fn apply(self, column: Expr, value: Value) -> Result<Expr> {
        if self.is_pattern() {
            let text = match value {
                Value::Text(text) => text,
                other => {
                    return Err(Error::Type(TypeError {
                        expected: "TEXT",
                        actual: other.type_name().to_string(),
                        column: column_name(&column),
                        rust_type: None,
                    }));
                }
            };
            let expr = match self {
                Operator::IExact => column.iexact(text),
                Operator::ILike => column.ilike(text),
                Operator::Like => column.like(text),
                Operator::NotLike => column.not_like(text),
                Operator::NotILike => column.not_ilike(text),
                Operator::Contains => column.contains(text),
                Operator::IContains => column.icontains(text),
                Operator::StartsWith => column.starts_with(text),
                _ => column.ends_with(text),
            };
            return Ok(expr);
        }

        let expr = match self {
            Operator::Eq if value.is_null() => column.is_null(),
            Operator::NotEq if value.is_null() => column.is_not_null(),
            Operator::Eq => column.eq(value),
            Operator::NotEq => column.ne(value),
            Operator::In => column.in_list(value.into_list()),
            Operator::Gt => column.gt(value),
            Operator::Gte => column.ge(value),
            Operator::Lt => column.lt(value),
            _ => column.le(value),
        };
        Ok(expr)
    }
}

fn column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Column { name, .. } => Some(name.clone()),
        _ => None,
    }
}

/// A possibly aliased column reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub column: String,
    pub alias: Option<String>,
}

/// A parsed ORDER BY clause name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRef {
    pub column: String,
    pub direction: OrderDirection,
    pub alias: Option<String>,
}

/// A parsed WHERE clause name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhereRef {
    pub column: String,
    pub operator: Operator,
    pub alias: Option<String>,
}

/// Split a column reference on its last separator.
///
/// `"p__name"` is `name` on alias `p`; `"name"` has no alias.
pub fn parse_select(text: &str) -> ColumnRef {
    match text.rsplit_once(SEPARATOR) {
        Some((alias, column)) => ColumnRef {
            column: column.to_string(),
            alias: Some(alias.to_string()),
        },
        None => ColumnRef {
            column: text.to_string(),
            alias: None,
        },
    }
}

/// Parse an order reference; a leading `-` means descending.
pub fn parse_order(text: &str) -> OrderRef {
    let (direction, rest) = match text.strip_prefix(DESCENDING_PREFIX) {
        Some(rest) => (OrderDirection::Desc, rest),
        None => (OrderDirection::Asc, text),
    };
    let ColumnRef { column, alias } = parse_select(rest);
    OrderRef {
        column,
        direction,
        alias,
    }
}

/// Parse a where reference, consuming a trailing operator if present.
///
/// A lone segment is always a column, so a column literally named `in` can
/// still be filtered on.
pub fn parse_where(text: &str) -> WhereRef {
    let (reference, operator) = match text.rsplit_once(SEPARATOR) {
        Some((rest, last)) => match Operator::from_token(last) {
            Some(op) => (rest, op),
            None => (text, Operator::Eq),
        },
        None => (text, Operator::Eq),
    };
    let ColumnRef { column, alias } = parse_select(reference);
    WhereRef {
        column,
        operator,
        alias,
    }
}
