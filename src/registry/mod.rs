//! # Type Registry
//!
//! Async store of composed assets keyed by string and indexed by kind and
//! tag. The free functions below operate on [`TypeRegistry::global`].

pub mod type_registry;

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::asset::{AssetKind, EnhancedAsset};
use crate::errors::Result;

pub use type_registry::{AssetMap, PostRegisterHook, RegistryEntry, RegistryStats, TypeRegistry};

/// Register `asset` in the global registry.
pub async fn register_type(
    asset: Arc<EnhancedAsset>,
    key: Option<&str>,
    asset_kind: Option<AssetKind>,
    metadata: Option<Map<String, Value>>,
) -> Result<Arc<EnhancedAsset>> {
    TypeRegistry::global()
        .register(asset, key, asset_kind, metadata)
        .await
}

pub async fn get_type(key: &str) -> Option<Arc<EnhancedAsset>> {
    TypeRegistry::global().get(key).await
}

pub async fn get_types_by_asset(kind: AssetKind) -> AssetMap {
    TypeRegistry::global().get_by_asset_type(kind).await
}

pub async fn get_types_by_tag(tag: &str) -> AssetMap {
    TypeRegistry::global().get_by_tag(tag).await
}

pub async fn get_types_by_tag_prefix(prefix: &str) -> AssetMap {
    TypeRegistry::global().get_by_tag_prefix(prefix).await
}

pub async fn get_types_by_tags<S: AsRef<str> + Sync>(tags: &[S], match_all: bool) -> AssetMap {
    TypeRegistry::global().get_by_tags(tags, match_all).await
}

pub async fn get_types_by_ancestor(ancestor: &str) -> AssetMap {
    TypeRegistry::global().get_by_ancestor(ancestor).await
}

pub async fn get_registry_stats() -> RegistryStats {
    TypeRegistry::global().stats().await
}
