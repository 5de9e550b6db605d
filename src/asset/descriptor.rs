//! Build input for one composition.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::kind::{AssetKind, ValueType};
use super::shell::{AssetShell, RuleRef};
use crate::capabilities::{CapabilityName, ProtocolTier};
use crate::registry::TypeRegistry;

/// Operator families to apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationToggles {
    pub arithmetic: bool,
    pub container: bool,
    pub casting: bool,
    pub path_like: bool,
    pub datetime_like: bool,
    pub timedelta_like: bool,
}

impl OperationToggles {
    pub fn all() -> Self {
        Self {
            arithmetic: true,
            container: true,
            casting: true,
            path_like: true,
            datetime_like: true,
            timedelta_like: true,
        }
    }

    /// Toggled capabilities in fixed order.
    pub fn capabilities(&self) -> Vec<CapabilityName> {
        [
            (self.arithmetic, CapabilityName::Arithmetic),
            (self.container, CapabilityName::Container),
            (self.casting, CapabilityName::Casting),
            (self.path_like, CapabilityName::PathLike),
            (self.datetime_like, CapabilityName::DateTimeLike),
            (self.timedelta_like, CapabilityName::TimeDeltaLike),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }

    /// Toggles recovered from an applied capability list.
    pub fn from_capabilities(capabilities: &[CapabilityName]) -> Self {
        let has = |name| capabilities.contains(&name);
        Self {
            arithmetic: has(CapabilityName::Arithmetic),
            container: has(CapabilityName::Container),
            casting: has(CapabilityName::Casting),
            path_like: has(CapabilityName::PathLike),
            datetime_like: has(CapabilityName::DateTimeLike),
            timedelta_like: has(CapabilityName::TimeDeltaLike),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities().is_empty()
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            arithmetic: self.arithmetic || other.arithmetic,
            container: self.container || other.container,
            casting: self.casting || other.casting,
            path_like: self.path_like || other.path_like,
            datetime_like: self.datetime_like || other.datetime_like,
            timedelta_like: self.timedelta_like || other.timedelta_like,
        }
    }
}

/// Everything the factory needs for one composition. Consumed by it.
#[derive(Clone)]
pub struct AssetDescriptor {
    pub kind: AssetKind,
    pub shell: AssetShell,
    /// Falls back to the kind's default tier.
    pub target_tier: Option<ProtocolTier>,
    /// Inner type for wrapped values; enum base type for enums.
    pub value_type: Option<ValueType>,
    pub description: Option<String>,
    pub metadata: Map<String, Value>,
    pub tags: Vec<String>,
    pub rules: Vec<RuleRef>,
    pub operations: OperationToggles,
    pub enable_caching: bool,
    /// Register after composition. `None` follows the factory settings.
    pub register: Option<bool>,
    /// Registry to register into instead of the settings' registry.
    pub registry: Option<Arc<TypeRegistry>>,
}

impl std::fmt::Debug for AssetDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetDescriptor")
            .field("kind", &self.kind)
            .field("shell", &self.shell)
            .field("target_tier", &self.target_tier)
            .field("value_type", &self.value_type)
            .field("tags", &self.tags)
            .field("rules", &self.rules.len())
            .field("operations", &self.operations)
            .field("enable_caching", &self.enable_caching)
            .finish()
    }
}

impl AssetDescriptor {
    pub fn new(kind: AssetKind, shell: impl Into<AssetShell>) -> Self {
        Self {
            kind,
            shell: shell.into(),
            target_tier: None,
            value_type: None,
            description: None,
            metadata: Map::new(),
            tags: Vec::new(),
            rules: Vec::new(),
            operations: OperationToggles::default(),
            enable_caching: false,
            register: None,
            registry: None,
        }
    }

    pub fn tier(mut self, tier: ProtocolTier) -> Self {
        self.target_tier = Some(tier);
        self
    }

    pub fn value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn rule(mut self, rule: impl Into<RuleRef>) -> Self {
        self.rules.push(rule.into());
        self
    }

    pub fn rules<I, R>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RuleRef>,
    {
        self.rules.extend(rules.into_iter().map(Into::into));
        self
    }

    pub fn operations(mut self, operations: OperationToggles) -> Self {
        self.operations = operations;
        self
    }

    pub fn caching(mut self, enabled: bool) -> Self {
        self.enable_caching = enabled;
        self
    }

    pub fn register(mut self, register: bool) -> Self {
        self.register = Some(register);
        self
    }

    pub fn registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn resolved_tier(&self) -> ProtocolTier {
        self.target_tier.unwrap_or_else(|| self.kind.default_tier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_order_is_fixed() {
        let ops = OperationToggles {
            timedelta_like: true,
            arithmetic: true,
            ..Default::default()
        };
        assert_eq!(
            ops.capabilities(),
            vec![CapabilityName::Arithmetic, CapabilityName::TimeDeltaLike]
        );
        assert_eq!(OperationToggles::all().capabilities().len(), 6);
        assert_eq!(OperationToggles::from_capabilities(&ops.capabilities()), ops);
    }

    #[test]
    fn test_descriptor_tier_fallback() {
        let d = AssetDescriptor::new(AssetKind::Enum, "Status");
        assert_eq!(d.resolved_tier(), ProtocolTier::Core);
        assert_eq!(d.tier(ProtocolTier::Advanced).resolved_tier(), ProtocolTier::Advanced);
    }
}
