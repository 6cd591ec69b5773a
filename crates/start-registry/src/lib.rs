//! Asset resolution and the module registry client.

pub mod cache;
pub mod client;
pub mod index;
pub mod install;
pub mod resolver;

pub use client::{registry_base, RegistryClient, DEFAULT_REGISTRY};
pub use index::{AssetIndex, IndexEntry};
pub use install::{assets_add, assets_update, AddedAsset, UpdateOutcome, UpdateResult};
pub use resolver::{ResolvedAsset, Resolver, MIN_MATCH_SCORE};
