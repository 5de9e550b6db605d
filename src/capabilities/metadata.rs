//! Metadata capability: the immutable record attached to every asset.

use std::any::Any;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Capability, CapabilityName, Invocation, ProtocolTier};
use crate::asset::AssetKind;
use crate::errors::Result;

/// Performance features switched on for an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceFlags {
    /// Validated results are memoized through the caching capability.
    pub caching: bool,
    /// Pipeline output is memoized per declaration.
    pub memoized_rules: bool,
    /// Rules run asynchronously.
    pub async_rules: bool,
}

/// Metadata attached once, at composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub asset_type: AssetKind,
    pub protocol_tier: ProtocolTier,
    /// Applied capability list, in applied order.
    pub capabilities: Vec<CapabilityName>,
    pub performance: PerformanceFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Caller-supplied keys.
    #[serde(default)]
    pub extra: IndexMap<String, Value>,
}

const RESERVED_KEYS: [&str; 5] = [
    "asset_type",
    "protocol_tier",
    "capabilities",
    "performance",
    "description",
];

impl AssetMetadata {
    pub fn new(
        asset_type: AssetKind,
        protocol_tier: ProtocolTier,
        capabilities: Vec<CapabilityName>,
    ) -> Self {
        let caching = capabilities.contains(&CapabilityName::Caching);
        Self {
            asset_type,
            protocol_tier,
            capabilities,
            performance: PerformanceFlags {
                caching,
                memoized_rules: true,
                async_rules: true,
            },
            description: None,
            extra: IndexMap::new(),
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Add caller-supplied keys. Keys that collide with a built-in field are ignored.
    pub fn with_extra(mut self, extra: impl IntoIterator<Item = (String, Value)>) -> Self {
        for (key, value) in extra {
            if RESERVED_KEYS.contains(&key.as_str()) {
                log::debug!("[metadata] ignoring caller key '{}', it is reserved", key);
                continue;
            }
            self.extra.insert(key, value);
        }
        self
    }

    pub fn has_capability(&self, name: CapabilityName) -> bool {
        self.capabilities.contains(&name)
    }

    /// Flat map view: built-in keys followed by caller keys.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        map.remove("extra");
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        map
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.to_map().remove(key)
    }
}

/// Exposes an asset's [`AssetMetadata`].
#[derive(Debug, Clone)]
pub struct MetadataCapability {
    metadata: Arc<AssetMetadata>,
}

impl MetadataCapability {
    pub const MEMBERS: &'static [&'static str] = &[
        "metadata",
        "get_metadata",
        "asset_type",
        "protocol_tier",
        "capabilities",
    ];

    pub fn new(metadata: Arc<AssetMetadata>) -> Self {
        Self { metadata }
    }

    pub fn metadata(&self) -> &AssetMetadata {
        &self.metadata
    }
}

impl Capability for MetadataCapability {
    fn name(&self) -> CapabilityName {
        CapabilityName::Metadata
    }

    fn members(&self) -> &'static [&'static str] {
        Self::MEMBERS
    }

    fn invoke(&self, call: &Invocation<'_>) -> Result<Value> {
        let md = &self.metadata;
        match call.member {
            "metadata" => Ok(Value::Object(md.to_map())),
            "get_metadata" => Ok(md.get(call.str_arg(0)?).unwrap_or(Value::Null)),
            "asset_type" => Ok(Value::String(md.asset_type.as_str().to_string())),
            "protocol_tier" => Ok(Value::String(md.protocol_tier.as_str().to_string())),
            "capabilities" => Ok(Value::Array(
                md.capabilities
                    .iter()
                    .map(|c| Value::String(c.as_str().to_string()))
                    .collect(),
            )),
            _ => Err(call.unsupported()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
