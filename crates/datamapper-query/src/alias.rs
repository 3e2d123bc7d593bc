//! Table alias allocation for a single compilation.

use datamapper_core::{Error, Result, Schema};
use std::collections::HashMap;
use std::sync::Arc;

/// A table joined under an alias.
#[derive(Debug, Clone)]
pub struct AliasedTable {
    pub alias: String,
    pub schema: Arc<Schema>,
}

/// Allocates and remembers table aliases.
///
/// Generated aliases are the first letter of the table name followed by a
/// per-letter counter: `users`, `users`, `uploads` become `u0`, `u1`, `u2`.
#[derive(Debug, Default)]
pub struct AliasTracker {
    aliases: HashMap<String, AliasedTable>,
    counters: HashMap<char, usize>,
}

impl AliasTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `schema` under `explicit`, or under a generated alias.
    pub fn put(&mut self, schema: &Arc<Schema>, explicit: Option<&str>) -> Result<String> {
        let alias = match explicit {
            Some(name) => name.to_string(),
            None => self.generate(schema.table()),
        };
        if self.aliases.contains_key(&alias) {
            return Err(Error::conflicting_alias(&alias));
        }
        tracing::trace!(alias = %alias, table = %schema.table(), "allocated alias");
        self.aliases.insert(
            alias.clone(),
            AliasedTable {
                alias: alias.clone(),
                schema: Arc::clone(schema),
            },
        );
        Ok(alias)
    }

    /// Look up a previously registered alias.
    pub fn fetch(&self, alias: &str) -> Result<&AliasedTable> {
        self.aliases
            .get(alias)
            .ok_or_else(|| Error::unknown_alias(alias))
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    fn generate(&mut self, table: &str) -> String {
        let letter = table.chars().next().unwrap_or('t');
        let counter = self.counters.entry(letter).or_insert(0);
        let alias = format!("{letter}{counter}");
        *counter += 1;
        alias
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datamapper_core::error::{PlanErrorKind, SchemaErrorKind};

    fn table(model: &str, table: &str) -> Arc<Schema> {
        Arc::new(Schema::builder(model, table).build())
    }

    #[test]
    fn generates_per_letter_counters() {
        let users = table("User", "users");
        let uploads = table("Upload", "uploads");
        let pets = table("Pet", "pets");
        let mut tracker = AliasTracker::new();

        assert_eq!(tracker.put(&users, None).unwrap(), "u0");
        assert_eq!(tracker.put(&users, None).unwrap(), "u1");
        assert_eq!(tracker.put(&pets, None).unwrap(), "p0");
        assert_eq!(tracker.put(&uploads, None).unwrap(), "u2");
        assert_eq!(tracker.len(), 4);
    }

    #[test]
    fn explicit_alias_conflicts_with_generated() {
        let users = table("User", "users");
        let mut tracker = AliasTracker::new();
        tracker.put(&users, None).unwrap();
        tracker.put(&users, None).unwrap();

        let err = tracker.put(&users, Some("u0")).unwrap_err();
        assert_eq!(err.plan_kind(), Some(PlanErrorKind::ConflictingAlias));
        assert_eq!(
            err.to_string(),
            "alias 'u0' conflicts with an existing alias"
        );
    }

    #[test]
    fn generated_alias_conflicts_with_explicit() {
        let users = table("User", "users");
        let mut tracker = AliasTracker::new();
        tracker.put(&users, Some("u0")).unwrap();
        assert!(tracker.put(&users, None).is_err());
    }

    #[test]
    fn fetch_known_and_unknown() {
        let pets = table("Pet", "pets");
        let mut tracker = AliasTracker::new();
        tracker.put(&pets, Some("p")).unwrap();

        let aliased = tracker.fetch("p").unwrap();
        assert_eq!(aliased.schema.table(), "pets");
        assert_eq!(aliased.alias, "p");

        let err = tracker.fetch("q").unwrap_err();
        assert_eq!(err.schema_kind(), Some(SchemaErrorKind::UnknownAlias));
        assert_eq!(err.to_string(), "alias 'q' does not exist");
    }
}
