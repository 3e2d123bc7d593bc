//! Schema registry: tables, columns and associations between models.
//!
//! Schemas are declared with [`Schema::builder`], registered into a
//! [`Registry`], and frozen with [`Registry::finalize`]. Associations name
//! their target model as a string so models may reference each other in any
//! order (including cycles); the target is resolved on first use and cached.
//!
//! A finalized registry is model metadata for the rest of the process: every
//! schema holds its registry, so an `Arc<Schema>` resolves associations no
//! matter which handles the caller keeps, and the registry is never freed.

use crate::error::{Error, Result};
use crate::types::SqlType;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Default primary key column for associations.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// A declared column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
    pub primary_key: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            primary_key: false,
        }
    }

    /// Mark this column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// The kind of association between two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// The owner holds the foreign key: `Home.owner -> User`.
    BelongsTo,
    /// The related side holds the foreign key, at most one row: `User.home -> Home`.
    HasOne,
    /// The related side holds the foreign key: `User.posts -> [Post]`.
    HasMany,
}

/// How many related records an association yields per owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// A named association from an owner model to a target model.
pub struct Association {
    name: String,
    kind: AssociationKind,
    target: String,
    foreign_key: String,
    primary_key: String,
    resolved: OnceLock<Arc<Schema>>,
}

impl Association {
    fn new(
        name: impl Into<String>,
        kind: AssociationKind,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            foreign_key: foreign_key.into(),
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            resolved: OnceLock::new(),
        }
    }

    pub fn belongs_to(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(name, AssociationKind::BelongsTo, target, foreign_key)
    }

    pub fn has_one(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(name, AssociationKind::HasOne, target, foreign_key)
    }

    pub fn has_many(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(name, AssociationKind::HasMany, target, foreign_key)
    }

    /// Override the primary key column (defaults to `id`).
    ///
    /// For `BelongsTo` this is the target's key; otherwise it is the owner's.
    #[must_use]
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AssociationKind {
        self.kind
    }

    /// Model name of the association target.
    pub fn target_model(&self) -> &str {
        &self.target
    }

    pub fn cardinality(&self) -> Cardinality {
        match self.kind {
            AssociationKind::HasMany => Cardinality::Many,
            AssociationKind::BelongsTo | AssociationKind::HasOne => Cardinality::One,
        }
    }

    /// Column on the owner side of the association.
    pub fn owner_key(&self) -> &str {
        match self.kind {
            AssociationKind::BelongsTo => &self.foreign_key,
            AssociationKind::HasOne | AssociationKind::HasMany => &self.primary_key,
        }
    }

    /// Column on the related side of the association.
    pub fn related_key(&self) -> &str {
        match self.kind {
            AssociationKind::BelongsTo => &self.primary_key,
            AssociationKind::HasOne | AssociationKind::HasMany => &self.foreign_key,
        }
    }

    /// Resolve the target schema through `registry`, memoizing the result.
    pub fn target(&self, registry: &Registry) -> Result<Arc<Schema>> {
        if let Some(schema) = self.resolved.get() {
            return Ok(Arc::clone(schema));
        }
        let schema = registry.schema(&self.target)?;
        Ok(Arc::clone(self.resolved.get_or_init(|| schema)))
    }
}

/// Table, column and association metadata for one model.
pub struct Schema {
    model: String,
    table: String,
    columns: Vec<Column>,
    column_index: HashMap<String, usize>,
    associations: Vec<Association>,
    association_index: HashMap<String, usize>,
    registry: OnceLock<Arc<Registry>>,
}

impl Schema {
    /// Start declaring a model stored in `table`.
    pub fn builder(model: impl Into<String>, table: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            model: model.into(),
            table: table.into(),
            columns: Vec::new(),
            associations: Vec::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Declared columns in declaration order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.column_index
            .get(name)
            .map(|&i| &self.columns[i])
            .ok_or_else(|| Error::unknown_column(name, &self.table))
    }

    /// The primary key column: the first column flagged as such, else `id`.
    pub fn primary_key(&self) -> &str {
        self.columns
            .iter()
            .find(|c| c.primary_key)
            .map_or(DEFAULT_PRIMARY_KEY, |c| c.name.as_str())
    }

    pub fn associations(&self) -> &[Association] {
        &self.associations
    }

    pub fn has_association(&self, name: &str) -> bool {
        self.association_index.contains_key(name)
    }

    pub fn association(&self, name: &str) -> Result<&Association> {
        self.association_index
            .get(name)
            .map(|&i| &self.associations[i])
            .ok_or_else(|| Error::unknown_association(name, &self.model))
    }

    /// The registry this schema was finalized into.
    pub fn registry(&self) -> Result<Arc<Registry>> {
        self.registry
            .get()
            .cloned()
            .ok_or_else(|| Error::detached(&self.model))
    }

    /// Target schema of the association `name`.
    pub fn related(&self, name: &str) -> Result<Arc<Schema>> {
        let association = self.association(name)?;
        let registry = self.registry()?;
        association.target(&registry)
    }
}

// Schemas and their registry form a cycle; print names instead of following it.
impl fmt::Debug for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Association")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("owner_key", &self.owner_key())
            .field("related_key", &self.related_key())
            .finish()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("model", &self.model)
            .field("table", &self.table)
            .field("columns", &self.columns)
            .field("associations", &self.associations)
            .field("attached", &self.registry.get().is_some())
            .finish()
    }
}

/// Builder returned by [`Schema::builder`].
#[derive(Debug)]
pub struct SchemaBuilder {
    model: String,
    table: String,
    columns: Vec<Column>,
    associations: Vec<Association>,
}

impl SchemaBuilder {
    pub fn column(mut self, name: impl Into<String>, sql_type: SqlType) -> Self {
        self.columns.push(Column::new(name, sql_type));
        self
    }

    pub fn primary_key(mut self, name: impl Into<String>, sql_type: SqlType) -> Self {
        self.columns.push(Column::new(name, sql_type).primary_key());
        self
    }

    pub fn belongs_to(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.association(Association::belongs_to(name, target, foreign_key))
    }

    pub fn has_one(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.association(Association::has_one(name, target, foreign_key))
    }

    pub fn has_many(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.association(Association::has_many(name, target, foreign_key))
    }

    pub fn association(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    /// Finish the declaration. Later declarations of the same name replace
    /// earlier ones.
    pub fn build(self) -> Schema {
        let mut columns: Vec<Column> = Vec::with_capacity(self.columns.len());
        let mut column_index = HashMap::new();
        for column in self.columns {
            if let Some(&i) = column_index.get(&column.name) {
                columns[i] = column;
            } else {
                column_index.insert(column.name.clone(), columns.len());
                columns.push(column);
            }
        }

        let mut associations: Vec<Association> = Vec::with_capacity(self.associations.len());
        let mut association_index = HashMap::new();
        for association in self.associations {
            if let Some(&i) = association_index.get(&association.name) {
                associations[i] = association;
            } else {
                association_index.insert(association.name.clone(), associations.len());
                associations.push(association);
            }
        }

        Schema {
            model: self.model,
            table: self.table,
            columns,
            column_index,
            associations,
            association_index,
            registry: OnceLock::new(),
        }
    }
}

/// A set of schemas that may reference each other by model name.
#[derive(Debug, Default)]
pub struct Registry {
    schemas: Vec<Arc<Schema>>,
    by_model: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a schema. Fails if its model name is already taken.
    pub fn register(&mut self, schema: Schema) -> Result<()> {
        if self.by_model.contains_key(&schema.model) {
            return Err(Error::duplicate_model(&schema.model));
        }
        tracing::trace!(model = %schema.model, table = %schema.table, "registering schema");
        self.by_model
            .insert(schema.model.clone(), self.schemas.len());
        self.schemas.push(Arc::new(schema));
        Ok(())
    }

    /// Freeze the registry and check every association.
    ///
    /// Each association target must be registered, its owner key must be a
    /// column of the owner and its related key a column of the target.
    ///
    /// Schemas and the registry reference each other from here on, so the
    /// returned registry stays alive for the rest of the process.
    pub fn finalize(self) -> Result<Arc<Registry>> {
        let registry = Arc::new(self);
        for schema in &registry.schemas {
            let _ = schema.registry.set(Arc::clone(&registry));
        }

        for schema in &registry.schemas {
            for association in &schema.associations {
                let target = association.target(&registry)?;
                schema.column(association.owner_key())?;
                target.column(association.related_key())?;
            }
        }

        tracing::debug!(models = registry.schemas.len(), "schema registry finalized");
        Ok(registry)
    }

    pub fn schema(&self, model: &str) -> Result<Arc<Schema>> {
        self.by_model
            .get(model)
            .map(|&i| Arc::clone(&self.schemas[i]))
            .ok_or_else(|| Error::unknown_model(model))
    }

    pub fn resolve_association<'s>(&self, schema: &'s Schema, name: &str) -> Result<&'s Association> {
        schema.association(name)
    }

    pub fn resolve_column<'s>(&self, schema: &'s Schema, name: &str) -> Result<&'s Column> {
        schema.column(name)
    }

    /// Registered schemas in registration order.
    pub fn schemas(&self) -> impl Iterator<Item = &Arc<Schema>> {
        self.schemas.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaErrorKind;

    fn registry() -> Arc<Registry> {
        let mut registry = Registry::new();
        registry
            .register(
                Schema::builder("User", "users")
                    .primary_key("id", SqlType::BigInt)
                    .column("name", SqlType::Text)
                    .has_one("home", "Home", "owner_id")
                    .has_many("posts", "Post", "author_id")
                    .build(),
            )
            .unwrap();
        registry
            .register(
                Schema::builder("Home", "homes")
                    .primary_key("id", SqlType::BigInt)
                    .column("owner_id", SqlType::BigInt)
                    .belongs_to("owner", "User", "owner_id")
                    .build(),
            )
            .unwrap();
        registry
            .register(
                Schema::builder("Post", "posts")
                    .primary_key("id", SqlType::BigInt)
                    .column("author_id", SqlType::BigInt)
                    .column("title", SqlType::Text)
                    .belongs_to("author", "User", "author_id")
                    .build(),
            )
            .unwrap();
        registry.finalize().unwrap()
    }

    #[test]
    fn association_keys_follow_kind() {
        let registry = registry();
        let user = registry.schema("User").unwrap();
        let home = registry.schema("Home").unwrap();

        let has_one = user.association("home").unwrap();
        assert_eq!(has_one.owner_key(), "id");
        assert_eq!(has_one.related_key(), "owner_id");
        assert_eq!(has_one.cardinality(), Cardinality::One);

        let belongs_to = home.association("owner").unwrap();
        assert_eq!(belongs_to.owner_key(), "owner_id");
        assert_eq!(belongs_to.related_key(), "id");

        let has_many = user.association("posts").unwrap();
        assert_eq!(has_many.cardinality(), Cardinality::Many);
    }

    #[test]
    fn circular_targets_resolve() {
        let registry = registry();
        let user = registry.schema("User").unwrap();
        let home = user.related("home").unwrap();
        assert_eq!(home.table(), "homes");
        let owner = home.related("owner").unwrap();
        assert!(Arc::ptr_eq(&owner, &user));
    }

    #[test]
    fn unknown_names_fail() {
        let registry = registry();
        let user = registry.schema("User").unwrap();

        let err = registry.resolve_column(&user, "nickname").unwrap_err();
        assert_eq!(
            err.to_string(),
            "column 'nickname' does not exist for table 'users'"
        );
        let err = registry.resolve_association(&user, "pets").unwrap_err();
        assert_eq!(
            err.to_string(),
            "association 'pets' does not exist for model 'User'"
        );
        assert_eq!(
            registry.schema("Pet").unwrap_err().schema_kind(),
            Some(SchemaErrorKind::UnknownModel)
        );
    }

    #[test]
    fn duplicate_model_is_rejected() {
        let mut registry = Registry::new();
        registry
            .register(Schema::builder("User", "users").build())
            .unwrap();
        let err = registry
            .register(Schema::builder("User", "people").build())
            .unwrap_err();
        assert_eq!(err.to_string(), "model 'User' is already registered");
    }

    #[test]
    fn finalize_rejects_unknown_target() {
        let mut registry = Registry::new();
        registry
            .register(
                Schema::builder("Home", "homes")
                    .primary_key("id", SqlType::BigInt)
                    .column("owner_id", SqlType::BigInt)
                    .belongs_to("owner", "Person", "owner_id")
                    .build(),
            )
            .unwrap();
        let err = registry.finalize().unwrap_err();
        assert_eq!(err.to_string(), "model 'Person' is not registered");
    }

    #[test]
    fn finalize_rejects_missing_key_column() {
        let mut registry = Registry::new();
        registry
            .register(
                Schema::builder("User", "users")
                    .primary_key("id", SqlType::BigInt)
                    .has_many("posts", "Post", "user_id")
                    .build(),
            )
            .unwrap();
        registry
            .register(
                Schema::builder("Post", "posts")
                    .primary_key("id", SqlType::BigInt)
                    .build(),
            )
            .unwrap();
        let err = registry.finalize().unwrap_err();
        assert_eq!(
            err.to_string(),
            "column 'user_id' does not exist for table 'posts'"
        );
    }

    #[test]
    fn schemas_outlive_the_registry_handle() {
        let user = registry().schema("User").unwrap();
        let home = user.related("home").unwrap();
        assert_eq!(home.table(), "homes");
        assert!(Arc::ptr_eq(&home.related("owner").unwrap(), &user));
        assert_eq!(user.registry().unwrap().schemas().count(), 3);
    }

    #[test]
    fn unregistered_schema_is_detached() {
        let schema = Schema::builder("User", "users")
            .has_one("home", "Home", "owner_id")
            .build();
        let err = schema.related("home").unwrap_err();
        assert_eq!(err.schema_kind(), Some(SchemaErrorKind::Detached));
    }

    #[test]
    fn primary_key_defaults_to_id() {
        let schema = Schema::builder("Tag", "tags")
            .column("label", SqlType::Text)
            .build();
        assert_eq!(schema.primary_key(), "id");

        let schema = Schema::builder("Country", "countries")
            .primary_key("code", SqlType::VarChar(2))
            .build();
        assert_eq!(schema.primary_key(), "code");
    }

    #[test]
    fn columns_keep_declaration_order() {
        let registry = registry();
        let post = registry.schema("Post").unwrap();
        let names: Vec<&str> = post.column_names().collect();
        assert_eq!(names, vec!["id", "author_id", "title"]);
    }
}
