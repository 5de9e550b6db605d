//! Configuration: the per-asset config map and process-wide forge settings.

use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::{AssetError, Result};

pub const DEFAULT_REGISTRY_NAME: &str = "default";

/// Validation cache bound used when none is configured.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// AssetConfig
// ---------------------------------------------------------------------------

/// Merge `overrides` over `defaults`; overrides win per key.
pub fn merge_config(defaults: &Map<String, Value>, overrides: &Map<String, Value>) -> Map<String, Value> {
    let mut result = defaults.clone();
    for (key, value) in overrides {
        result.insert(key.clone(), value.clone());
    }
    result
}

/// Per-asset configuration, the baseline merged with the shell's overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetConfig(Map<String, Value>);

impl Default for AssetConfig {
    fn default() -> Self {
        Self(Self::baseline())
    }
}

impl AssetConfig {
    /// Baseline every asset starts from.
    pub fn baseline() -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("frozen".into(), json!(true));
        map.insert("validate_assignment".into(), json!(true));
        map.insert("arbitrary_types_allowed".into(), json!(true));
        map.insert("str_strip_whitespace".into(), json!(false));
        map
    }

    pub fn with_overrides(overrides: &Map<String, Value>) -> Self {
        Self(merge_config(&Self::baseline(), overrides))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    fn flag(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Instances reject replacement of their value.
    pub fn frozen(&self) -> bool {
        self.flag("frozen")
    }

    /// Replacement values are validated before being stored.
    pub fn validate_assignment(&self) -> bool {
        self.flag("validate_assignment")
    }

    /// String input is trimmed before the rule pipeline runs.
    pub fn str_strip_whitespace(&self) -> bool {
        self.flag("str_strip_whitespace")
    }

    /// Model input with undeclared keys is rejected (`extra = "forbid"`).
    pub fn forbids_extra(&self) -> bool {
        self.0.get("extra").and_then(Value::as_str) == Some("forbid")
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// ForgeSettings
// ---------------------------------------------------------------------------

/// Process-wide settings for the asset factory and registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeSettings {
    /// Registry declarations are registered into.
    pub registry_name: String,
    /// Register every declaration after composition.
    pub auto_register: bool,
    /// Turn dropped pipeline entries into composition errors.
    pub strict_rules: bool,
    /// Most entries an asset's validation cache keeps before evicting the oldest.
    pub cache_capacity: usize,
}

impl Default for ForgeSettings {
    fn default() -> Self {
        Self {
            registry_name: DEFAULT_REGISTRY_NAME.to_string(),
            auto_register: true,
            strict_rules: false,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    forge: ForgeSettings,
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|raw| {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            other => {
                log::warn!("[settings] ignoring {}={:?}, not a boolean", name, other);
                None
            }
        }
    })
}

static GLOBAL_SETTINGS: Lazy<ForgeSettings> = Lazy::new(ForgeSettings::from_env);

impl ForgeSettings {
    /// Defaults overridden by `ASSET_FORGE_REGISTRY`, `ASSET_FORGE_AUTO_REGISTER`,
    /// `ASSET_FORGE_STRICT_RULES` and `ASSET_FORGE_CACHE_CAPACITY`.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(name) = std::env::var("ASSET_FORGE_REGISTRY") {
            if !name.trim().is_empty() {
                settings.registry_name = name.trim().to_string();
            }
        }
        if let Some(flag) = env_flag("ASSET_FORGE_AUTO_REGISTER") {
            settings.auto_register = flag;
        }
        if let Some(flag) = env_flag("ASSET_FORGE_STRICT_RULES") {
            settings.strict_rules = flag;
        }
        if let Ok(raw) = std::env::var("ASSET_FORGE_CACHE_CAPACITY") {
            match raw.trim().parse::<usize>() {
                Ok(capacity) => settings.cache_capacity = capacity,
                Err(_) => log::warn!(
                    "[settings] ignoring ASSET_FORGE_CACHE_CAPACITY={:?}, not a count",
                    raw
                ),
            }
        }
        settings
    }

    /// Parse the `forge:` section of a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: SettingsFile = serde_yaml::from_str(yaml).map_err(|e| AssetError::Settings {
            message: e.to_string(),
        })?;
        Ok(file.forge)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| AssetError::Settings {
            message: format!("{}: {}", path.display(), e),
        })?;
        Self::from_yaml(&content)
    }

    /// Settings read from the environment on first use.
    pub fn global() -> &'static ForgeSettings {
        &GLOBAL_SETTINGS
    }
}
