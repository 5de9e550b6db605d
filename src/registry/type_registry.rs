//! Type registry: an async, lock-guarded store of composed assets.
//!
//! Every operation serializes on one `tokio::sync::Mutex` per registry. The
//! post-registration hook runs after the lock is released.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::asset::{AssetKind, EnhancedAsset};
use crate::capabilities::TaggingCapability;
use crate::config::{ForgeSettings, DEFAULT_REGISTRY_NAME};
use crate::errors::{AssetError, Result};

/// Called with the key and asset after each new registration.
pub type PostRegisterHook = Arc<dyn Fn(&str, &Arc<EnhancedAsset>) -> anyhow::Result<()> + Send + Sync>;

/// Assets keyed by registry key, in insertion order.
pub type AssetMap = IndexMap<String, Arc<EnhancedAsset>>;

static NAMED_REGISTRIES: Lazy<parking_lot::Mutex<HashMap<String, Arc<TypeRegistry>>>> =
    Lazy::new(|| parking_lot::Mutex::new(HashMap::new()));

/// One registered asset.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub key: String,
    pub asset: Arc<EnhancedAsset>,
    pub asset_kind: AssetKind,
    /// Registration-time metadata supplied by the caller.
    pub metadata: Map<String, Value>,
}

/// Snapshot returned by [`TypeRegistry::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub registry_name: String,
    pub total_types: usize,
    pub by_asset_kind: IndexMap<String, usize>,
    pub keys: Vec<String>,
    pub asset_kinds: Vec<AssetKind>,
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: IndexMap<String, RegistryEntry>,
    by_kind: IndexMap<AssetKind, IndexMap<String, Arc<EnhancedAsset>>>,
}

pub struct TypeRegistry {
    name: String,
    state: Mutex<RegistryState>,
    hook: RwLock<Option<PostRegisterHook>>,
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("name", &self.name)
            .finish()
    }
}

impl TypeRegistry {
    /// A fresh registry that is not shared through [`TypeRegistry::named`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(RegistryState::default()),
            hook: RwLock::new(None),
        }
    }

    /// The process-wide registry called `name`, created on first use.
    pub fn named(name: &str) -> Arc<TypeRegistry> {
        NAMED_REGISTRIES
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TypeRegistry::new(name)))
            .clone()
    }

    /// The registry named by [`ForgeSettings::global`].
    pub fn global() -> Arc<TypeRegistry> {
        let name = &ForgeSettings::global().registry_name;
        if name.is_empty() {
            Self::named(DEFAULT_REGISTRY_NAME)
        } else {
            Self::named(name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_post_register_hook<F>(&self, hook: F)
    where
        F: Fn(&str, &Arc<EnhancedAsset>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        *self.hook.write() = Some(Arc::new(hook));
    }

    pub fn clear_post_register_hook(&self) {
        *self.hook.write() = None;
    }

    /// Register `asset`.
    ///
    /// The key defaults to the asset's self-reported key and the kind to its
    /// own kind. Registering the same asset again under the same key is a
    /// no-op; a different asset under a bound key is a `KeyConflict`.
    pub async fn register(
        &self,
        asset: Arc<EnhancedAsset>,
        key: Option<&str>,
        asset_kind: Option<AssetKind>,
        metadata: Option<Map<String, Value>>,
    ) -> Result<Arc<EnhancedAsset>> {
        let key = key.unwrap_or_else(|| asset.registry_key()).to_string();
        let asset_kind = asset_kind.unwrap_or_else(|| asset.kind());

        {
            let mut state = self.state.lock().await;
            if let Some(existing) = state.entries.get(&key) {
                if Arc::ptr_eq(&existing.asset, &asset) {
                    return Ok(asset);
                }
                return Err(AssetError::KeyConflict {
                    key,
                    existing: existing.asset.name().to_string(),
                    attempted: asset.name().to_string(),
                });
            }
            state.entries.insert(
                key.clone(),
                RegistryEntry {
                    key: key.clone(),
                    asset: asset.clone(),
                    asset_kind,
                    metadata: metadata.unwrap_or_default(),
                },
            );
            state
                .by_kind
                .entry(asset_kind)
                .or_default()
                .insert(key.clone(), asset.clone());
        }
        log::debug!("[registry:{}] registered '{}' ({})", self.name, key, asset_kind);

        self.run_hook(&key, &asset);
        Ok(asset)
    }

    fn run_hook(&self, key: &str, asset: &Arc<EnhancedAsset>) {
        let Some(hook) = self.hook.read().clone() else {
            return;
        };
        match catch_unwind(AssertUnwindSafe(|| hook(key, asset))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("[registry:{}] post-register hook failed for '{}': {}", self.name, key, e),
            Err(_) => log::warn!("[registry:{}] post-register hook panicked for '{}'", self.name, key),
        }
    }

    /// Look up a registered asset.
    ///
    /// # Arguments
    ///
    /// * `key` - Registry key, usually the asset name.
    ///
    /// # Returns
    ///
    /// The shared asset, or `None` when nothing is registered under `key`.
    pub async fn get(&self, key: &str) -> Option<Arc<EnhancedAsset>> {
        self.state.lock().await.entries.get(key).map(|e| e.asset.clone())
    }

    /// Full entry for `key`, including its kind and registration metadata.
    pub async fn entry(&self, key: &str) -> Option<RegistryEntry> {
        self.state.lock().await.entries.get(key).cloned()
    }

    /// Remove `key` from the main table and its kind index.
    pub async fn unregister(&self, key: &str) -> Option<Arc<EnhancedAsset>> {
        let mut state = self.state.lock().await;
        let entry = state.entries.shift_remove(key)?;
        if let Some(index) = state.by_kind.get_mut(&entry.asset_kind) {
            index.shift_remove(key);
            if index.is_empty() {
                state.by_kind.shift_remove(&entry.asset_kind);
            }
        }
        log::debug!("[registry:{}] unregistered '{}'", self.name, key);
        Some(entry.asset)
    }

    /// Drop every entry and the kind index. The hook is kept.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.by_kind.clear();
    }

    /// Whether `key` is registered.
    ///
    /// # Arguments
    ///
    /// * `key` - Registry key to test.
    pub async fn contains(&self, key: &str) -> bool {
        self.state.lock().await.entries.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Registered keys.
    ///
    /// # Returns
    ///
    /// Keys in registration order. A key re-registered after removal moves
    /// to the end.
    pub async fn keys(&self) -> Vec<String> {
        self.state.lock().await.entries.keys().cloned().collect()
    }

    pub async fn get_all(&self) -> AssetMap {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.asset.clone()))
            .collect()
    }

    pub async fn get_by_asset_type(&self, kind: AssetKind) -> AssetMap {
        self.state
            .lock()
            .await
            .by_kind
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Locked scan over entries that carry the tagging capability.
    async fn scan_tags<F>(&self, predicate: F) -> AssetMap
    where
        F: Fn(&TaggingCapability) -> bool,
    {
        let state = self.state.lock().await;
        state
            .entries
            .iter()
            .filter_map(|(key, entry)| {
                let tagging = entry.asset.tagging()?;
                predicate(tagging).then(|| (key.clone(), entry.asset.clone()))
            })
            .collect()
    }

    pub async fn get_by_tag(&self, tag: &str) -> AssetMap {
        self.scan_tags(|t| t.has_tag(tag)).await
    }

    pub async fn get_by_tag_prefix(&self, prefix: &str) -> AssetMap {
        self.scan_tags(|t| t.has_tag_prefix(prefix)).await
    }

    /// Entries holding all of `tags` (`match_all`) or any of them.
    pub async fn get_by_tags<S: AsRef<str> + Sync>(&self, tags: &[S], match_all: bool) -> AssetMap {
        self.scan_tags(|t| t.has_tags(tags, match_all)).await
    }

    pub async fn get_by_ancestor(&self, ancestor: &str) -> AssetMap {
        self.scan_tags(|t| t.has_ancestor(ancestor)).await
    }

    pub async fn stats(&self) -> RegistryStats {
        let state = self.state.lock().await;
        RegistryStats {
            registry_name: self.name.clone(),
            total_types: state.entries.len(),
            by_asset_kind: state
                .by_kind
                .iter()
                .map(|(kind, index)| (kind.as_str().to_string(), index.len()))
                .collect(),
            keys: state.entries.keys().cloned().collect(),
            asset_kinds: state.by_kind.keys().copied().collect(),
        }
    }
}
