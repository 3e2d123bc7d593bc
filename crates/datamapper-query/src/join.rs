//! Association joins: dependency trees and JOIN clause emission.
//!
//! A join names a dotted association path from the query's root model, such
//! as `"pets"` or `"pets.owner"`. Nested paths may only be joined once their
//! parent path has been joined too; [`to_join_tree`] checks this and arranges
//! the joins so [`walk`] can emit them parents first.

use crate::alias::AliasTracker;
use crate::expr::Expr;
use datamapper_core::{Dialect, Error, Result, Schema, Value};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Path separator in join names.
pub const PATH_SEPARATOR: char = '.';

/// A requested association join.
///
/// Two joins are equal when they name the same path with the same outer
/// flag; the alias does not take part.
#[derive(Debug, Clone)]
pub struct Join {
    path: Vec<String>,
    name: String,
    alias: Option<String>,
    outer: bool,
}

impl Join {
    pub fn new(name: &str, alias: Option<String>, outer: bool) -> Self {
        Self {
            path: name.split(PATH_SEPARATOR).map(str::to_string).collect(),
            name: name.to_string(),
            alias,
            outer,
        }
    }

    /// Association names from the root model.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// The dotted path.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn is_outer(&self) -> bool {
        self.outer
    }

    fn association_name(&self) -> &str {
        self.path.last().map_or("", String::as_str)
    }
}

impl PartialEq for Join {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.outer == other.outer
    }
}

impl Eq for Join {}

impl Hash for Join {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.outer.hash(state);
    }
}

/// A join and the joins nested beneath it.
#[derive(Debug, Clone)]
pub struct JoinNode {
    pub join: Join,
    pub children: Vec<JoinNode>,
}

/// Arrange joins into a dependency tree.
///
/// Identical joins collapse into one (an explicit alias on any copy is kept).
/// Joins are ordered by dotted name so parents precede children. A join whose
/// parent path was never requested fails with the shortest missing prefix.
pub fn to_join_tree(joins: &[Join]) -> Result<Vec<JoinNode>> {
    let mut unique: Vec<Join> = Vec::with_capacity(joins.len());
    for join in joins {
        match unique.iter_mut().find(|existing| *existing == join) {
            Some(existing) => {
                if existing.alias.is_none() {
                    existing.alias.clone_from(&join.alias);
                }
            }
            None => unique.push(join.clone()),
        }
    }
    unique.sort_by(|a, b| a.name.cmp(&b.name));

    // dotted name -> outer flag of the join registered under it
    let mut registered: Vec<(String, bool)> = Vec::new();
    let mut roots: Vec<JoinNode> = Vec::new();

    for join in unique {
        let mut level = &mut roots;
        for depth in 1..join.path.len() {
            let parent_name = join.path[..depth].join(".");
            let outer = registered
                .iter()
                .rev()
                .find(|(name, _)| *name == parent_name)
                .map(|(_, outer)| *outer)
                .ok_or_else(|| Error::missing_join(&join.name, &parent_name))?;
            let position = level
                .iter()
                .position(|node| node.join.name == parent_name && node.join.outer == outer)
                .ok_or_else(|| Error::missing_join(&join.name, &parent_name))?;
            level = &mut level[position].children;
        }
        registered.push((join.name.clone(), join.outer));
        level.push(JoinNode {
            join,
            children: Vec::new(),
        });
    }

    Ok(roots)
}

/// Types of SQL joins emitted for associations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    /// Get the SQL keyword for this join type.
    pub const fn as_str(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

/// A compiled JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: String,
    pub alias: String,
    pub on: Expr,
}

impl JoinClause {
    pub fn build_with_dialect(
        &self,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> String {
        let on = self.on.build_with_dialect(dialect, params, offset);
        format!(
            "{} {} AS {} ON {}",
            self.join_type.as_str(),
            dialect.quote_identifier(&self.table),
            dialect.quote_identifier(&self.alias),
            on
        )
    }
}

/// Emit JOIN clauses for `tree`, parents before children.
///
/// `owner_ref` is the name the owner table is addressed by in SQL: the root
/// table name at the top, the allocated alias further down.
pub fn walk(
    tree: &[JoinNode],
    owner: &Arc<Schema>,
    owner_ref: &str,
    tracker: &mut AliasTracker,
) -> Result<Vec<JoinClause>> {
    let mut clauses = Vec::new();
    walk_into(tree, owner, owner_ref, tracker, &mut clauses)?;
    Ok(clauses)
}

fn walk_into(
    tree: &[JoinNode],
    owner: &Arc<Schema>,
    owner_ref: &str,
    tracker: &mut AliasTracker,
    clauses: &mut Vec<JoinClause>,
) -> Result<()> {
    for node in tree {
        let name = node.join.association_name();
        let association = owner.association(name)?;
        let related = owner.related(name)?;
        let alias = tracker.put(&related, node.join.alias())?;

        let on = Expr::qualified(alias.as_str(), association.related_key())
            .eq(Expr::qualified(owner_ref, association.owner_key()));
        let join_type = if node.join.is_outer() {
            JoinType::Left
        } else {
            JoinType::Inner
        };
        tracing::trace!(path = %node.join.name(), alias = %alias, "joining association");

        clauses.push(JoinClause {
            join_type,
            table: related.table().to_string(),
            alias: alias.clone(),
            on,
        });
        walk_into(&node.children, &related, &alias, tracker, clauses)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use datamapper_core::error::PlanErrorKind;
    use datamapper_core::{Registry, SqlType};

    fn registry() -> Arc<datamapper_core::Registry> {
        let mut registry = Registry::new();
        registry
            .register(
                Schema::builder("User", "users")
                    .primary_key("id", SqlType::BigInt)
                    .has_many("pets", "Pet", "owner_id")
                    .has_one("home", "Home", "owner_id")
                    .build(),
            )
            .unwrap();
        registry
            .register(
                Schema::builder("Pet", "pets")
                    .primary_key("id", SqlType::BigInt)
                    .column("owner_id", SqlType::BigInt)
                    .belongs_to("owner", "User", "owner_id")
                    .build(),
            )
            .unwrap();
        registry
            .register(
                Schema::builder("Home", "homes")
                    .primary_key("id", SqlType::BigInt)
                    .column("owner_id", SqlType::BigInt)
                    .build(),
            )
            .unwrap();
        registry.finalize().unwrap()
    }

    fn names(nodes: &[JoinNode]) -> Vec<String> {
        nodes.iter().map(|n| n.join.name().to_string()).collect()
    }

    #[test]
    fn tree_nests_children_under_parents() {
        let joins = vec![
            Join::new("pets.owner", None, false),
            Join::new("pets", None, false),
            Join::new("home", None, true),
        ];
        let tree = to_join_tree(&joins).unwrap();
        assert_eq!(names(&tree), vec!["home", "pets"]);
        assert_eq!(names(&tree[1].children), vec!["pets.owner"]);
    }

    #[test]
    fn missing_prefix_is_reported() {
        let joins = vec![Join::new("pets.owner.home", None, false)];
        let err = to_join_tree(&joins).unwrap_err();
        assert_eq!(err.plan_kind(), Some(PlanErrorKind::MissingJoin));
        assert_eq!(
            err.to_string(),
            "can't join 'pets.owner.home' without joining 'pets'"
        );
    }

    #[test]
    fn duplicates_collapse() {
        let joins = vec![
            Join::new("pets", None, false),
            Join::new("pets", Some("p".to_string()), false),
            Join::new("pets", None, true),
        ];
        let tree = to_join_tree(&joins).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].join.alias(), Some("p"));
        assert!(tree[1].join.is_outer());
    }

    #[test]
    fn walk_emits_aliased_clauses() {
        let registry = registry();
        let user = registry.schema("User").unwrap();
        let joins = vec![
            Join::new("pets", None, false),
            Join::new("pets.owner", Some("o".to_string()), true),
        ];
        let tree = to_join_tree(&joins).unwrap();
        let mut tracker = AliasTracker::new();
        let clauses = walk(&tree, &user, "users", &mut tracker).unwrap();

        let mut params = Vec::new();
        let rendered: Vec<String> = clauses
            .iter()
            .map(|c| c.build_with_dialect(Dialect::Postgres, &mut params, 0))
            .collect();
        assert_eq!(
            rendered,
            vec![
                "INNER JOIN \"pets\" AS \"p0\" ON \"p0\".\"owner_id\" = \"users\".\"id\"",
                "LEFT JOIN \"users\" AS \"o\" ON \"o\".\"id\" = \"p0\".\"owner_id\"",
            ]
        );
        assert!(params.is_empty());
        assert_eq!(tracker.fetch("o").unwrap().schema.table(), "users");
    }

    #[test]
    fn equality_ignores_alias() {
        let a = Join::new("pets", Some("x".to_string()), false);
        let b = Join::new("pets", None, false);
        let c = Join::new("pets", None, true);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
