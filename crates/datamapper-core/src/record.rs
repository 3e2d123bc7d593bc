//! Records: attribute values plus loaded associations for one row.

use crate::error::{Error, Result, TypeError};
use crate::row::{FromValue, Row};
use crate::schema::{AssociationKind, Cardinality, Schema};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The loaded value of an association slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    /// A `BelongsTo`/`HasOne` target, `None` when no related row exists.
    One(Option<Box<Record>>),
    /// A `HasMany` target in fetch order.
    Many(Vec<Record>),
}

impl Loaded {
    /// The empty value for an association of the given cardinality.
    pub fn empty(cardinality: Cardinality) -> Self {
        match cardinality {
            Cardinality::One => Loaded::One(None),
            Cardinality::Many => Loaded::Many(Vec::new()),
        }
    }
}

/// A single instance of a model.
///
/// Holds one value per declared column and, for each association that has
/// been populated, its loaded value. Association slots start out unloaded;
/// reading one before it is populated is an error rather than `None`.
#[derive(Clone)]
pub struct Record {
    schema: Arc<Schema>,
    values: Vec<Value>,
    associations: HashMap<String, Loaded>,
}

impl Record {
    /// A record with every column set to NULL and no associations loaded.
    pub fn new(schema: Arc<Schema>) -> Self {
        let values = vec![Value::Null; schema.columns().len()];
        Self {
            schema,
            values,
            associations: HashMap::new(),
        }
    }

    /// Build a record from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(schema: Arc<Schema>, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut record = Self::new(schema);
        for (name, value) in pairs {
            record.set(name.as_ref(), value)?;
        }
        Ok(record)
    }

    /// Deserialize a row through `schema`.
    ///
    /// Columns the row does not carry stay NULL; row columns the schema does
    /// not declare are ignored.
    pub fn from_row(schema: Arc<Schema>, row: &Row) -> Self {
        let values = schema
            .columns()
            .iter()
            .map(|column| row.get_by_name(&column.name).cloned().unwrap_or(Value::Null))
            .collect();
        Self {
            schema,
            values,
            associations: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn model(&self) -> &str {
        self.schema.model()
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.schema
            .columns()
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| Error::unknown_attribute(name, self.schema.model()))
    }

    /// Read a column value.
    pub fn get(&self, name: &str) -> Result<&Value> {
        let index = self.index_of(name)?;
        Ok(&self.values[index])
    }

    /// Read a column value converted to `T`.
    #[allow(clippy::result_large_err)]
    pub fn get_as<T: FromValue>(&self, name: &str) -> Result<T> {
        T::from_value(self.get(name)?).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(name.to_string());
                Error::Type(te)
            }
            e => e,
        })
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let index = self.index_of(name)?;
        self.values[index] = value.into();
        Ok(())
    }

    /// Consuming variant of [`Record::set`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// `(column, value)` pairs in declaration order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema.column_names().zip(self.values.iter())
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.associations.contains_key(name)
    }

    /// The loaded value of an association.
    pub fn association(&self, name: &str) -> Result<&Loaded> {
        self.schema.association(name)?;
        self.associations
            .get(name)
            .ok_or_else(|| Error::not_loaded(name, self.schema.model()))
    }

    /// The loaded target of a single-valued association.
    pub fn one(&self, name: &str) -> Result<Option<&Record>> {
        match self.association(name)? {
            Loaded::One(record) => Ok(record.as_deref()),
            Loaded::Many(_) => Err(cardinality_mismatch(name, "one", "many")),
        }
    }

    /// The loaded targets of a collection association.
    pub fn many(&self, name: &str) -> Result<&[Record]> {
        match self.association(name)? {
            Loaded::Many(records) => Ok(records),
            Loaded::One(_) => Err(cardinality_mismatch(name, "many", "one")),
        }
    }

    /// Assign a single-valued association.
    ///
    /// For `BelongsTo` the owning foreign key is updated to the related
    /// record's key, or NULL when cleared.
    pub fn set_one(&mut self, name: &str, related: Option<Record>) -> Result<()> {
        let schema = Arc::clone(&self.schema);
        let association = schema.association(name)?;
        if association.cardinality() != Cardinality::One {
            return Err(cardinality_mismatch(name, "many", "one"));
        }
        if let Some(record) = &related {
            check_target(name, association.target_model(), record)?;
        }
        if association.kind() == AssociationKind::BelongsTo {
            let key = match &related {
                Some(record) => record.get(association.related_key())?.clone(),
                None => Value::Null,
            };
            self.set(association.owner_key(), key)?;
        }
        self.associations
            .insert(name.to_string(), Loaded::One(related.map(Box::new)));
        Ok(())
    }

    /// Assign a collection association.
    pub fn set_many(&mut self, name: &str, related: Vec<Record>) -> Result<()> {
        let association = self.schema.association(name)?;
        if association.cardinality() != Cardinality::Many {
            return Err(cardinality_mismatch(name, "one", "many"));
        }
        for record in &related {
            check_target(name, association.target_model(), record)?;
        }
        self.associations
            .insert(name.to_string(), Loaded::Many(related));
        Ok(())
    }

    /// Store a loaded association value as-is, leaving columns untouched.
    pub fn load(&mut self, name: &str, loaded: Loaded) -> Result<()> {
        self.schema.association(name)?;
        self.associations.insert(name.to_string(), loaded);
        Ok(())
    }
}

fn check_target(name: &str, expected: &str, record: &Record) -> Result<()> {
    if record.model() == expected {
        Ok(())
    } else {
        Err(Error::Type(TypeError {
            expected: "a record of the association's target model",
            actual: record.model().to_string(),
            column: Some(name.to_string()),
            rust_type: None,
        }))
    }
}

fn cardinality_mismatch(name: &str, expected: &'static str, actual: &str) -> Error {
    Error::Type(TypeError {
        expected,
        actual: actual.to_string(),
        column: Some(name.to_string()),
        rust_type: None,
    })
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.schema.model() == other.schema.model()
            && self.values == other.values
            && self.associations == other.associations
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.schema.model());
        for (name, value) in self.attributes() {
            s.field(name, value);
        }
        let mut loaded: Vec<_> = self.associations.iter().collect();
        loaded.sort_by(|a, b| a.0.cmp(b.0));
        for (name, value) in loaded {
            s.field(name, value);
        }
        s.finish()
    }
}
