//! Declarative entry points.
//!
//! Each `build_*` function returns an [`AssetBuilder`] which, when applied
//! to a shell, fills in an [`AssetDescriptor`] and runs it through the
//! factory.
//!
//! ```ignore
//! let email = build_alias(ValueType::String)
//!     .rule(keys::valid::string::IS_EMAIL)
//!     .tags(["format/email"])
//!     .apply(AssetShell::new("Email"))?;
//! let value = email.construct(json!("a@b.com"))?;
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::asset::{
    AssetDescriptor, AssetFactory, AssetKind, AssetShell, EnhancedAsset, ModelField,
    OperationToggles, RuleRef, ValueType,
};
use crate::capabilities::ProtocolTier;
use crate::config::merge_config;
use crate::errors::Result;
use crate::registry::TypeRegistry;
use crate::rules::{RuleArgs, RuleKey};

/// What an alias is declared over.
#[derive(Debug, Clone)]
pub enum AliasBase {
    /// Another composed asset; its inner type, rules and operators are inherited.
    Asset(Arc<EnhancedAsset>),
    Type(ValueType),
}

impl From<Arc<EnhancedAsset>> for AliasBase {
    fn from(asset: Arc<EnhancedAsset>) -> Self {
        Self::Asset(asset)
    }
}

impl From<&Arc<EnhancedAsset>> for AliasBase {
    fn from(asset: &Arc<EnhancedAsset>) -> Self {
        Self::Asset(asset.clone())
    }
}

impl From<ValueType> for AliasBase {
    fn from(value_type: ValueType) -> Self {
        Self::Type(value_type)
    }
}

/// Wrap a primitive inner type.
pub fn build_primitive(inner: ValueType) -> AssetBuilder {
    AssetBuilder::new(AssetKind::Primitive).value_type(inner)
}

/// Alias over a primitive asset or a bare inner type.
pub fn build_alias(base: impl Into<AliasBase>) -> AssetBuilder {
    let mut builder = AssetBuilder::new(AssetKind::Alias);
    builder.base = Some(base.into());
    builder
}

/// Structured model with declared fields.
pub fn build_model() -> AssetBuilder {
    AssetBuilder::new(AssetKind::Model)
}

/// Ordered named members, optionally checked against a base type.
pub fn build_enum() -> AssetBuilder {
    AssetBuilder::new(AssetKind::Enum)
}

/// Collects declaration options until [`apply`](AssetBuilder::apply) is called.
#[derive(Debug, Clone)]
pub struct AssetBuilder {
    kind: AssetKind,
    value_type: Option<ValueType>,
    base: Option<AliasBase>,
    tier: Option<ProtocolTier>,
    description: Option<String>,
    tags: Vec<String>,
    metadata: Map<String, Value>,
    rules: Vec<RuleRef>,
    operations: Option<OperationToggles>,
    enable_caching: bool,
    model_config: Map<String, Value>,
    fields: Vec<ModelField>,
    variants: IndexMap<String, Value>,
    register: Option<bool>,
    registry: Option<Arc<TypeRegistry>>,
    factory: Option<Arc<AssetFactory>>,
}

impl AssetBuilder {
    fn new(kind: AssetKind) -> Self {
        Self {
            kind,
            value_type: None,
            base: None,
            tier: None,
            description: None,
            tags: Vec::new(),
            metadata: Map::new(),
            rules: Vec::new(),
            operations: None,
            enable_caching: false,
            model_config: Map::new(),
            fields: Vec::new(),
            variants: IndexMap::new(),
            register: None,
            registry: None,
            factory: None,
        }
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    fn value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    /// Enum base type.
    pub fn base_type(self, value_type: ValueType) -> Self {
        self.value_type(value_type)
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add hierarchical tags (`"domain/contact"` style).
    ///
    /// # Arguments
    ///
    /// * `tags` - Tags appended after any already set.
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Memoize accepted inputs. The cache bound comes from the factory's
    /// `cache_capacity` setting.
    pub fn caching(mut self, enabled: bool) -> Self {
        self.enable_caching = enabled;
        self
    }

    /// Override the kind's default tier.
    pub fn tier(mut self, tier: ProtocolTier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Append one rule.
    ///
    /// # Arguments
    ///
    /// * `rule` - A ready entry, or a key resolved when the asset is composed.
    ///
    /// # Returns
    ///
    /// The builder. For aliases, these rules run after the base's rules.
    pub fn rule(mut self, rule: impl Into<RuleRef>) -> Self {
        self.rules.push(rule.into());
        self
    }

    /// A parameterized rule key, resolved at composition time.
    pub fn rule_with(self, key: RuleKey, args: RuleArgs) -> Self {
        self.rule(RuleRef::key(key, args))
    }

    pub fn rules<I, R>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RuleRef>,
    {
        self.rules.extend(rules.into_iter().map(Into::into));
        self
    }

    /// Replace the inferred operator families.
    pub fn operations(mut self, operations: OperationToggles) -> Self {
        self.operations = Some(operations);
        self
    }

    /// Set one model config override, e.g. `extra = "forbid"`.
    pub fn model_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.model_config.insert(key.into(), value.into());
        self
    }

    pub fn field(mut self, field: ModelField) -> Self {
        self.fields.push(field);
        self
    }

    /// Add an enum member. Values are checked against the base type when
    /// composed.
    ///
    /// # Arguments
    ///
    /// * `name` - Member name.
    /// * `value` - Member value.
    pub fn variant(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variants.insert(name.into(), value.into());
        self
    }

    pub fn register(mut self, register: bool) -> Self {
        self.register = Some(register);
        self
    }

    /// Register into `registry` instead of the settings' registry.
    pub fn registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Compose through `factory` instead of [`AssetFactory::global`].
    pub fn factory(mut self, factory: Arc<AssetFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// The descriptor this builder produces for `shell`.
    pub fn descriptor(self, shell: impl Into<AssetShell>) -> AssetDescriptor {
        self.into_parts(shell.into()).1
    }

    fn into_parts(self, shell: AssetShell) -> (Option<Arc<AssetFactory>>, AssetDescriptor) {
        let mut shell = shell;
        if !self.model_config.is_empty() {
            let merged = merge_config(&self.model_config, shell.config_overrides());
            shell = shell.config_map(merged);
        }
        for field in self.fields {
            shell = shell.field(field);
        }
        for (name, value) in self.variants {
            shell = shell.variant(name, value);
        }

        let (value_type, inherited_rules, inherited_ops) = match (&self.base, self.kind) {
            (Some(AliasBase::Asset(base)), _) => (
                base.value_type(),
                base.rules()
                    .map(|r| r.entries().into_iter().map(RuleRef::Entry).collect())
                    .unwrap_or_default(),
                OperationToggles::from_capabilities(base.applied_capabilities()),
            ),
            (Some(AliasBase::Type(value_type)), _) => {
                (Some(*value_type), Vec::new(), value_type.default_operations())
            }
            (None, AssetKind::Primitive) => (
                self.value_type,
                Vec::new(),
                self.value_type.map(|t| t.default_operations()).unwrap_or_default(),
            ),
            (None, _) => (self.value_type, Vec::new(), OperationToggles::default()),
        };

        let mut descriptor = AssetDescriptor::new(self.kind, shell)
            .tags(self.tags)
            .operations(self.operations.unwrap_or(inherited_ops))
            .caching(self.enable_caching)
            .rules(inherited_rules.into_iter().chain(self.rules));
        descriptor.value_type = value_type;
        descriptor.target_tier = self.tier;
        descriptor.description = self.description;
        descriptor.metadata = self.metadata;
        descriptor.register = self.register;
        descriptor.registry = self.registry;
        (self.factory, descriptor)
    }

    pub async fn apply_async(self, shell: impl Into<AssetShell>) -> Result<Arc<EnhancedAsset>> {
        let (factory, descriptor) = self.into_parts(shell.into());
        let factory = factory.unwrap_or_else(AssetFactory::global);
        factory.compose(descriptor).await
    }

    /// [`apply_async`](Self::apply_async) from a synchronous declaration site.
    ///
    /// The shell is converted before bridging so the driven future owns only
    /// `Send` data.
    pub fn apply(self, shell: impl Into<AssetShell>) -> Result<Arc<EnhancedAsset>> {
        let shell: AssetShell = shell.into();
        crate::runtime::block_on(self.apply_async(shell))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::CapabilityName;
    use crate::config::ForgeSettings;
    use crate::errors::AssetError;
    use crate::rules::keys;
    use serde_json::json;

    fn local_factory() -> Arc<AssetFactory> {
        Arc::new(AssetFactory::new(ForgeSettings {
            auto_register: false,
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn test_primitive_infers_operations_from_inner_type() {
        let count = build_primitive(ValueType::Integer)
            .factory(local_factory())
            .apply_async("Count")
            .await
            .unwrap();
        let applied = count.applied_capabilities();
        assert!(applied.contains(&CapabilityName::Arithmetic));
        assert!(applied.contains(&CapabilityName::Casting));
        assert!(!applied.contains(&CapabilityName::PathLike));

        let n = count.validate(json!(40)).await.unwrap();
        assert_eq!(n.call("add", &[json!(2)]).unwrap(), json!(42));
    }

    #[tokio::test]
    async fn test_alias_inherits_base_rules_first() {
        let factory = local_factory();
        let text = build_primitive(ValueType::String)
            .rule(keys::norm::string::STRIP)
            .factory(factory.clone())
            .apply_async(AssetShell::new("Text").config("str_strip_whitespace", false))
            .await
            .unwrap();
        let slug = build_alias(&text)
            .rule(keys::norm::string::LOWERCASE)
            .factory(factory)
            .apply_async("Slug")
            .await
            .unwrap();

        assert_eq!(slug.kind(), AssetKind::Alias);
        assert_eq!(slug.value_type(), Some(ValueType::String));
        let processed = slug.rules().unwrap().processed();
        assert_eq!(processed.ordered_names(), vec!["strip", "lowercase"]);
        assert_eq!(
            OperationToggles::from_capabilities(slug.applied_capabilities()),
            OperationToggles::from_capabilities(text.applied_capabilities())
        );

        let value = slug.validate(json!("  Hello ")).await.unwrap();
        assert_eq!(value.value(), &json!("hello"));
    }

    #[tokio::test]
    async fn test_alias_operations_override() {
        let alias = build_alias(ValueType::String)
            .operations(OperationToggles::default())
            .factory(local_factory())
            .apply_async("Plain")
            .await
            .unwrap();
        assert!(!alias.applied_capabilities().iter().any(|c| c.is_operation()));
    }

    #[tokio::test]
    async fn test_model_fields_and_config() {
        let user = build_model()
            .field(ModelField::new("name", ValueType::String).rule(keys::valid::string::IS_NON_EMPTY))
            .field(ModelField::new("age", ValueType::Integer).optional().default_value(0))
            .model_config("extra", "forbid")
            .factory(local_factory())
            .apply_async("User")
            .await
            .unwrap();

        assert!(user.config().forbids_extra());
        let ok = user.validate(json!({"name": "ada"})).await.unwrap();
        assert_eq!(ok.value(), &json!({"name": "ada", "age": 0}));

        let err = user.validate(json!({"name": "", "nick": "x"})).await.unwrap_err();
        let AssetError::ValidationFailed { failures, .. } = err else {
            panic!("expected ValidationFailed");
        };
        let fields: Vec<_> = failures.iter().map(|f| f.field.as_str()).collect();
        assert!(fields.contains(&"name"));
        assert!(fields.contains(&"nick"));
    }

    #[tokio::test]
    async fn test_enum_members() {
        let color = build_enum()
            .base_type(ValueType::String)
            .variant("Red", "red")
            .variant("Green", "green")
            .factory(local_factory())
            .apply_async("Color")
            .await
            .unwrap();

        assert_eq!(color.variants().len(), 2);
        let green = color.from_value(&json!("green")).unwrap();
        assert_eq!(green.variant(), Some("Green"));
        assert!(color.member("Blue").is_err());
    }

    #[test]
    fn test_descriptor_carries_builder_options() {
        let d = build_primitive(ValueType::Path)
            .tier(ProtocolTier::Core)
            .caching(true)
            .description("a path")
            .register(false)
            .descriptor("Location");
        assert_eq!(d.kind, AssetKind::Primitive);
        assert_eq!(d.value_type, Some(ValueType::Path));
        assert_eq!(d.target_tier, Some(ProtocolTier::Core));
        assert!(d.enable_caching);
        assert!(d.operations.path_like);
        assert_eq!(d.register, Some(false));
    }

    #[test]
    fn test_apply_from_sync_site() {
        let flag = build_primitive(ValueType::Boolean)
            .factory(local_factory())
            .apply("Flag")
            .unwrap();
        assert_eq!(flag.construct(json!(true)).unwrap().value(), &json!(true));
    }

    #[test]
    fn test_apply_runs_off_the_declaring_thread() {
        fn assert_send<T: Send>(_: &T) {}
        let pending = build_primitive(ValueType::Integer)
            .factory(local_factory())
            .apply_async("Count");
        assert_send(&pending);
        drop(pending);

        let count = std::thread::spawn(|| {
            build_primitive(ValueType::Integer)
                .factory(local_factory())
                .apply("Count")
        })
        .join()
        .unwrap()
        .unwrap();
        assert_eq!(count.construct(json!(4)).unwrap().value(), &json!(4));
    }
}
