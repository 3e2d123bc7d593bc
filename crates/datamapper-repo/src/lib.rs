//! Repository dispatch and association preloading for datamapper.
//!
//! A [`Repo`] compiles queries with `datamapper-query`, renders them for its
//! dialect and runs them through an injected [`Executor`]. Association paths
//! requested with `Query::preload` (or [`Repo::preload`] after the fact) are
//! loaded level by level, one batched fetch per association and depth.
//!
//! [`Executor`]: datamapper_core::Executor

pub mod preload;
pub mod repo;

pub use preload::PreloadTree;
pub use repo::{Repo, RepoConfig};
