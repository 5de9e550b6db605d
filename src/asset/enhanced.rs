//! The composition result: an asset backed by a capability table.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use super::kind::{AssetKind, ValueType};
use super::shell::AssetShell;
use super::wrapper::ValidatedWrapper;
use crate::capabilities::comparison::hash_value;
use crate::capabilities::{
    AssetMetadata, CachingCapability, Capability, CapabilityName, CapabilityTable,
    DocumentationCapability, Invocation, ProtocolTier, RulesCapability, TaggingCapability,
};
use crate::config::AssetConfig;
use crate::errors::{AssetError, Result};

/// Where a member call is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberSource {
    Shell,
    Capability(CapabilityName),
    /// Ordering operator filled in by a wrapper from another one.
    DerivedOrdering { base: &'static str },
}

/// Member routing table: shell members first, then capability members in
/// applied order. The first provider of a name wins.
pub(crate) fn member_table(
    shell: &AssetShell,
    capabilities: &CapabilityTable,
) -> IndexMap<String, MemberSource> {
    let mut members: IndexMap<String, MemberSource> = shell
        .members()
        .keys()
        .map(|name| (name.clone(), MemberSource::Shell))
        .collect();

    for capability in capabilities.iter() {
        for member in capability.members() {
            match members.get(*member) {
                None => {
                    members.insert(member.to_string(), MemberSource::Capability(capability.name()));
                }
                Some(MemberSource::Shell) => log::debug!(
                    "[asset] '{}': shell member '{}' masks {} capability member",
                    shell.name(),
                    member,
                    capability.name()
                ),
                Some(_) => {}
            }
        }
    }
    members
}

/// An asset produced by the factory.
pub struct EnhancedAsset {
    pub(crate) name: String,
    pub(crate) kind: AssetKind,
    pub(crate) shell: AssetShell,
    pub(crate) metadata: Arc<AssetMetadata>,
    pub(crate) capabilities: CapabilityTable,
    pub(crate) members: IndexMap<String, MemberSource>,
    pub(crate) config: AssetConfig,
    pub(crate) value_type: Option<ValueType>,
    pub(crate) wrapper: Option<ValidatedWrapper>,
    /// Enum members with their coerced values.
    pub(crate) variants: IndexMap<String, Value>,
}

impl EnhancedAsset {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub fn metadata(&self) -> &AssetMetadata {
        &self.metadata
    }

    pub fn tier(&self) -> ProtocolTier {
        self.metadata.protocol_tier
    }

    /// Applied capability list, in applied order.
    pub fn applied_capabilities(&self) -> &[CapabilityName] {
        &self.metadata.capabilities
    }

    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    pub fn value_type(&self) -> Option<ValueType> {
        self.value_type
    }

    pub fn shell(&self) -> &AssetShell {
        &self.shell
    }

    /// Key the asset reports for registration: the shell's declared key or its name.
    pub fn registry_key(&self) -> &str {
        self.shell.declared_registry_key().unwrap_or(&self.name)
    }

    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    pub fn capability<T: Capability + 'static>(&self, name: CapabilityName) -> Option<&T> {
        self.capabilities.downcast(name)
    }

    pub fn tagging(&self) -> Option<&TaggingCapability> {
        self.capability(CapabilityName::Tagging)
    }

    pub fn rules(&self) -> Option<&RulesCapability> {
        self.capability(CapabilityName::Rules)
    }

    pub fn caching(&self) -> Option<&CachingCapability> {
        self.capability(CapabilityName::Caching)
    }

    pub fn doc(&self) -> Option<&str> {
        self.capability::<DocumentationCapability>(CapabilityName::Documentation)
            .and_then(|d| d.doc())
    }

    pub fn tags(&self) -> Vec<String> {
        self.tagging().map(|t| t.get_tags()).unwrap_or_default()
    }

    pub fn wrapper(&self) -> Option<&ValidatedWrapper> {
        self.wrapper.as_ref()
    }

    pub fn member_names(&self) -> Vec<&str> {
        self.members.keys().map(String::as_str).collect()
    }

    pub fn member_source(&self, member: &str) -> Option<MemberSource> {
        self.members.get(member).copied()
    }

    pub fn has_member(&self, member: &str) -> bool {
        self.members.contains_key(member)
    }

    /// Call an asset-level member.
    pub fn call(&self, member: &str, args: &[Value]) -> Result<Value> {
        self.dispatch(member, None, args)
    }

    pub(crate) fn dispatch(&self, member: &str, receiver: Option<&Value>, args: &[Value]) -> Result<Value> {
        let call = Invocation::new(&self.name, member, receiver, args);
        match self.members.get(member) {
            Some(MemberSource::Shell) => match self.shell.members().get(member) {
                Some(body) => body(&call),
                None => Err(call.unsupported()),
            },
            Some(MemberSource::Capability(name)) => match self.capabilities.get(*name) {
                Some(capability) => capability.invoke(&call),
                None => Err(call.unsupported()),
            },
            Some(MemberSource::DerivedOrdering { .. }) | None => Err(call.unsupported()),
        }
    }

    /// Validate `input` and bind the result to this asset.
    pub async fn validate(self: &Arc<Self>, input: Value) -> Result<AssetInstance> {
        match (&self.wrapper, self.kind) {
            (Some(wrapper), _) => {
                let value = wrapper.adapter().validate(input).await?;
                Ok(AssetInstance::new(self.clone(), value, None))
            }
            (None, AssetKind::Enum) => self.from_value(&input),
            (None, _) => Err(AssetError::UnsupportedOperation {
                asset: self.name.clone(),
                member: "validate".to_string(),
            }),
        }
    }

    /// [`validate`](Self::validate) from a synchronous call site.
    pub fn construct(self: &Arc<Self>, input: Value) -> Result<AssetInstance> {
        crate::runtime::block_on(self.validate(input))?
    }

    // -- enums --------------------------------------------------------------

    pub fn variants(&self) -> &IndexMap<String, Value> {
        &self.variants
    }

    /// Enum members in declaration order.
    pub fn members(self: &Arc<Self>) -> Vec<AssetInstance> {
        self.variants
            .iter()
            .map(|(name, value)| AssetInstance::new(self.clone(), value.clone(), Some(name.clone())))
            .collect()
    }

    /// Enum member by name.
    pub fn member(self: &Arc<Self>, name: &str) -> Result<AssetInstance> {
        self.variants
            .get(name)
            .map(|value| AssetInstance::new(self.clone(), value.clone(), Some(name.to_string())))
            .ok_or_else(|| AssetError::UnknownEnumMember {
                asset: self.name.clone(),
                member: name.to_string(),
            })
    }

    /// Enum member holding `value`.
    pub fn from_value(self: &Arc<Self>, value: &Value) -> Result<AssetInstance> {
        self.variants
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(name, v)| AssetInstance::new(self.clone(), v.clone(), Some(name.clone())))
            .ok_or_else(|| AssetError::UnknownEnumMember {
                asset: self.name.clone(),
                member: value.to_string(),
            })
    }
}

impl fmt::Debug for EnhancedAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnhancedAsset")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("tier", &self.metadata.protocol_tier)
            .field("capabilities", &self.metadata.capabilities)
            .field("value_type", &self.value_type)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// AssetInstance
// ---------------------------------------------------------------------------

/// A validated value bound to its asset.
#[derive(Clone)]
pub struct AssetInstance {
    asset: Arc<EnhancedAsset>,
    value: Value,
    variant: Option<String>,
}

impl AssetInstance {
    fn new(asset: Arc<EnhancedAsset>, value: Value, variant: Option<String>) -> Self {
        Self {
            asset,
            value,
            variant,
        }
    }

    pub fn asset(&self) -> &Arc<EnhancedAsset> {
        &self.asset
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Enum member name, for enum instances.
    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    /// Call an instance member. Wrapped values only expose the wrapper's
    /// curated members.
    pub fn call(&self, member: &str, args: &[Value]) -> Result<Value> {
        match self.asset.wrapper() {
            Some(wrapper) => wrapper.dispatch(&self.asset, member, &self.value, args),
            None => self.asset.dispatch(member, Some(&self.value), args),
        }
    }

    /// Replace the value, honoring the asset's `frozen` and
    /// `validate_assignment` config.
    pub async fn assign(&mut self, value: Value) -> Result<()> {
        let config = self.asset.config();
        if config.frozen() {
            return Err(AssetError::operation(
                "assign",
                format!("'{}' instances are frozen", self.asset.name()),
            ));
        }
        if config.validate_assignment() {
            let validated = self.asset.validate(value).await?;
            self.value = validated.value;
            self.variant = validated.variant;
        } else {
            self.value = value;
        }
        Ok(())
    }
}

impl PartialEq for AssetInstance {
    fn eq(&self, other: &Self) -> bool {
        if !Arc::ptr_eq(&self.asset, &other.asset) {
            return false;
        }
        match self.call("eq", std::slice::from_ref(&other.value)) {
            Ok(Value::Bool(b)) => b,
            _ => self.value == other.value,
        }
    }
}

impl Eq for AssetInstance {}

impl Hash for AssetInstance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.asset.name().hash(state);
        match self.call("hash", &[]) {
            Ok(Value::Number(n)) => n.as_u64().hash(state),
            _ => hash_value(&self.value).hash(state),
        }
    }
}

impl PartialOrd for AssetInstance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if !Arc::ptr_eq(&self.asset, &other.asset) {
            return None;
        }
        match self.call("compare", std::slice::from_ref(&other.value)) {
            Ok(v) => match v.as_i64()? {
                n if n < 0 => Some(Ordering::Less),
                0 => Some(Ordering::Equal),
                _ => Some(Ordering::Greater),
            },
            Err(_) => crate::capabilities::compare_values(&self.value, &other.value),
        }
    }
}

impl fmt::Debug for AssetInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{}.{}({})", self.asset.name(), variant, self.value),
            None => write!(f, "{}({})", self.asset.name(), self.value),
        }
    }
}

impl fmt::Display for AssetInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}
