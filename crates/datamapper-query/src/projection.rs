//! Column projections and positional reshaping of projected rows.
//!
//! A projection is a tree of column references and raw expressions. Compiling
//! it flattens the leaves depth-first into the SELECT list; reading a row walks
//! the same tree in the same order and consumes one value per leaf.

use crate::expr::Expr;
use datamapper_core::{Error, Result, Row, TypeError, Value};

/// The shape of a SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// A clause-name column reference, e.g. `"name"` or `"p__name"`
    Column(String),
    /// A raw expression selected as-is
    Expr(Expr),
    List(Vec<Projection>),
    Tuple(Vec<Projection>),
    /// Keyed entries in declaration order
    Map(Vec<(String, Projection)>),
}

impl Projection {
    pub fn col(name: impl Into<String>) -> Self {
        Projection::Column(name.into())
    }

    pub fn expr(expr: Expr) -> Self {
        Projection::Expr(expr)
    }

    pub fn list<I, P>(items: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Projection>,
    {
        Projection::List(items.into_iter().map(Into::into).collect())
    }

    pub fn tuple<I, P>(items: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Projection>,
    {
        Projection::Tuple(items.into_iter().map(Into::into).collect())
    }

    pub fn map<I, K, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, P)>,
        K: Into<String>,
        P: Into<Projection>,
    {
        Projection::Map(
            entries
                .into_iter()
                .map(|(k, p)| (k.into(), p.into()))
                .collect(),
        )
    }

    /// Leaves in depth-first order.
    pub fn leaves(&self) -> Vec<&Projection> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Projection>) {
        match self {
            Projection::Column(_) | Projection::Expr(_) => out.push(self),
            Projection::List(items) | Projection::Tuple(items) => {
                for item in items {
                    item.collect_leaves(out);
                }
            }
            Projection::Map(entries) => {
                for (_, item) in entries {
                    item.collect_leaves(out);
                }
            }
        }
    }

    /// Rebuild this projection's shape from a row's values.
    ///
    /// Fails if the row carries fewer values than the projection has leaves.
    /// Extra trailing values are dropped with a warning.
    pub fn reshape(&self, row: &Row) -> Result<Shaped> {
        let mut values = row.values().cloned();
        let shaped = self.take(&mut values)?;
        let leftover = values.count();
        if leftover > 0 {
            tracing::warn!(leftover, "projected row had unused trailing values");
        }
        Ok(shaped)
    }

    fn take(&self, values: &mut impl Iterator<Item = Value>) -> Result<Shaped> {
        match self {
            Projection::Column(_) | Projection::Expr(_) => {
                values.next().map(Shaped::Value).ok_or_else(|| {
                    Error::Type(TypeError {
                        expected: "a value for every projected column",
                        actual: "end of row".to_string(),
                        column: match self {
                            Projection::Column(name) => Some(name.clone()),
                            _ => None,
                        },
                        rust_type: None,
                    })
                })
            }
            Projection::List(items) => items
                .iter()
                .map(|item| item.take(values))
                .collect::<Result<Vec<_>>>()
                .map(Shaped::List),
            Projection::Tuple(items) => items
                .iter()
                .map(|item| item.take(values))
                .collect::<Result<Vec<_>>>()
                .map(Shaped::Tuple),
            Projection::Map(entries) => entries
                .iter()
                .map(|(key, item)| item.take(values).map(|shaped| (key.clone(), shaped)))
                .collect::<Result<Vec<_>>>()
                .map(Shaped::Map),
        }
    }
}

impl From<&str> for Projection {
    fn from(name: &str) -> Self {
        Projection::Column(name.to_string())
    }
}

impl From<String> for Projection {
    fn from(name: String) -> Self {
        Projection::Column(name)
    }
}

impl From<Expr> for Projection {
    fn from(expr: Expr) -> Self {
        Projection::Expr(expr)
    }
}

/// A projected row, shaped like the [`Projection`] that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Shaped {
    Value(Value),
    List(Vec<Shaped>),
    Tuple(Vec<Shaped>),
    Map(Vec<(String, Shaped)>),
}

impl Shaped {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Shaped::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Items of a list or tuple.
    pub fn items(&self) -> Option<&[Shaped]> {
        match self {
            Shaped::List(items) | Shaped::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Entry of a map by key.
    pub fn get(&self, key: &str) -> Option<&Shaped> {
        match self {
            Shaped::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}
