//! Batched association preloading.
//!
//! Dotted paths such as `["pets", "pets.owner", "home"]` are merged into a
//! [`PreloadTree`]. Each node is loaded with a single
//! `related_key IN (...)` query over the distinct keys of every owner at
//! that depth, so the number of fetches depends on the shape of the tree and
//! never on how many records are being loaded.

use crate::repo::Repo;
use asupersync::{Cx, Outcome};
use datamapper_core::{Cardinality, Error, Executor, Loaded, Record, Value, ValueKey};
use datamapper_query::Query;
use datamapper_query::join::PATH_SEPARATOR;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Association paths to preload, keyed by first segment.
///
/// Children keep insertion order; a shared prefix appears once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadTree {
    children: Vec<(String, PreloadTree)>,
}

impl PreloadTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from dotted association paths.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree = Self::new();
        for path in paths {
            tree.insert(path.as_ref());
        }
        tree
    }

    /// Merge one dotted path into the tree.
    pub fn insert(&mut self, path: &str) {
        let mut node = self;
        for segment in path.split(PATH_SEPARATOR).filter(|s| !s.is_empty()) {
            let index = match node.children.iter().position(|(name, _)| name == segment) {
                Some(index) => index,
                None => {
                    node.children.push((segment.to_string(), PreloadTree::new()));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[index].1;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Direct children with their subtrees.
    pub fn children(&self) -> impl Iterator<Item = (&str, &PreloadTree)> {
        self.children.iter().map(|(name, tree)| (name.as_str(), tree))
    }

    /// Number of nodes, i.e. the most fetches a preload of this tree issues.
    pub fn node_count(&self) -> usize {
        self.children
            .iter()
            .map(|(_, tree)| 1 + tree.node_count())
            .sum()
    }
}

type PreloadFuture<'a> = Pin<Box<dyn Future<Output = Outcome<usize, Error>> + Send + 'a>>;

/// Load `tree` onto `owners`, returning the number of fetches issued.
///
/// All owners must be records of the same model. A failure aborts the
/// remaining work; levels that were already assigned stay assigned.
pub fn preload<'a, E: Executor>(
    cx: &'a Cx,
    repo: &'a Repo<E>,
    owners: &'a mut [Record],
    tree: &'a PreloadTree,
) -> PreloadFuture<'a> {
    Box::pin(async move {
        let Some(first) = owners.first() else {
            return Outcome::Ok(0);
        };
        let schema = Arc::clone(first.schema());
        let mut fetches = 0;

        for (name, subtree) in tree.children() {
            let (owner_key, related_key, cardinality) = match schema.association(name) {
                Ok(association) => (
                    association.owner_key().to_string(),
                    association.related_key().to_string(),
                    association.cardinality(),
                ),
                Err(e) => return Outcome::Err(e),
            };
            let target = match schema.related(name) {
                Ok(target) => target,
                Err(e) => return Outcome::Err(e),
            };

            let keys = match distinct_keys(owners, &owner_key) {
                Ok(keys) => keys,
                Err(e) => return Outcome::Err(e),
            };

            let mut related = if keys.is_empty() {
                tracing::trace!(
                    association = %name,
                    model = %schema.model(),
                    "no owner keys, skipping fetch"
                );
                Vec::new()
            } else {
                tracing::debug!(
                    association = %name,
                    model = %schema.model(),
                    owners = owners.len(),
                    keys = keys.len(),
                    "preloading association"
                );
                let query = Query::new(Arc::clone(&target))
                    .filter(format!("{related_key}__in"), Value::Array(keys));
                fetches += 1;
                match repo.all(cx, query).await {
                    Outcome::Ok(records) => records,
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                }
            };

            if !subtree.is_empty() && !related.is_empty() {
                match preload(cx, repo, &mut related, subtree).await {
                    Outcome::Ok(n) => fetches += n,
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                }
            }

            if let Err(e) = assign(owners, name, &owner_key, &related_key, cardinality, related) {
                return Outcome::Err(e);
            }
        }

        Outcome::Ok(fetches)
    })
}

/// Distinct non-null values of `column` across `records`, first seen first.
fn distinct_keys(records: &[Record], column: &str) -> datamapper_core::Result<Vec<Value>> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for record in records {
        let value = record.get(column)?;
        if value.is_null() {
            continue;
        }
        if seen.insert(ValueKey::new(value.clone())) {
            keys.push(value.clone());
        }
    }
    Ok(keys)
}

/// Partition fetched records by related key and hand them to their owners.
fn assign(
    owners: &mut [Record],
    name: &str,
    owner_key: &str,
    related_key: &str,
    cardinality: Cardinality,
    related: Vec<Record>,
) -> datamapper_core::Result<()> {
    match cardinality {
        Cardinality::One => {
            let mut lookup: HashMap<ValueKey, Record> = HashMap::new();
            for record in related {
                let key = ValueKey::new(record.get(related_key)?.clone());
                lookup.insert(key, record);
            }
            for owner in owners.iter_mut() {
                let key = ValueKey::new(owner.get(owner_key)?.clone());
                let found = if key.value().is_null() {
                    None
                } else {
                    lookup.get(&key).cloned().map(Box::new)
                };
                owner.load(name, Loaded::One(found))?;
            }
        }
        Cardinality::Many => {
            let mut lookup: HashMap<ValueKey, Vec<Record>> = HashMap::new();
            for record in related {
                let key = ValueKey::new(record.get(related_key)?.clone());
                lookup.entry(key).or_default().push(record);
            }
            for owner in owners.iter_mut() {
                let key = ValueKey::new(owner.get(owner_key)?.clone());
                let found = if key.value().is_null() {
                    Vec::new()
                } else {
                    lookup.get(&key).cloned().unwrap_or_default()
                };
                owner.load(name, Loaded::Many(found))?;
            }
        }
    }
    Ok(())
}
