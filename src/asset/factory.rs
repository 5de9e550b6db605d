//! Asset factory: capability resolution and composition.
//!
//! ## Composition Flow
//!
//! 1. Resolve the target tier (explicit, else the kind's default)
//! 2. Ask the [`CapabilityResolver`] for the tier's base list
//! 3. Append the core capabilities, then toggled operator families, then Caching
//! 4. De-duplicate, keeping first-seen order: the applied capability list
//! 5. Instantiate one capability per name and build the member table
//! 6. For wrapped kinds, run the rule pipeline and build the validated wrapper
//! 7. Attach metadata and tags, then optionally register
//!
//! Any failure is returned as a single `AssetError::Composition`.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use serde_json::Value;

use super::descriptor::{AssetDescriptor, OperationToggles};
use super::enhanced::{member_table, EnhancedAsset};
use super::kind::{AssetKind, ValueType};
use super::shell::resolve_rules;
use super::wrapper::{AnnotatedType, FieldSlot, ValidatedWrapper, ValidationAdapter};
use crate::capabilities::{
    ArithmeticCapability, AssetMetadata, CachingCapability, Capability, CapabilityName,
    CapabilityResolver, CapabilityTable, CastingCapability, ComparisonCapability,
    ConformanceChecker, ContainerCapability, DateTimeCapability, DocumentationCapability,
    MetadataCapability, PathCapability, ProtocolTier, RulesCapability, TableConformance,
    TaggingCapability, TierResolver, TimeDeltaCapability,
};
use crate::config::{AssetConfig, ForgeSettings};
use crate::errors::{AssetError, FieldFailure, Result};
use crate::registry::TypeRegistry;
use crate::rules::{RuleEntry, RuleSet, RuleTable};

static GLOBAL_FACTORY: Lazy<Arc<AssetFactory>> =
    Lazy::new(|| Arc::new(AssetFactory::new(ForgeSettings::global().clone())));

/// Inputs shared by every capability constructor.
struct CapabilityInputs<'a> {
    name: &'a str,
    metadata: &'a Arc<AssetMetadata>,
    description: Option<String>,
    tags: &'a [String],
    rules: &'a [RuleEntry],
    value_type: ValueType,
    cache_capacity: usize,
}

pub struct AssetFactory {
    resolver: Arc<dyn CapabilityResolver>,
    checker: Arc<dyn ConformanceChecker>,
    rule_table: Arc<RuleTable>,
    settings: ForgeSettings,
}

impl std::fmt::Debug for AssetFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetFactory")
            .field("settings", &self.settings)
            .finish()
    }
}

impl Default for AssetFactory {
    fn default() -> Self {
        Self::new(ForgeSettings::default())
    }
}

impl AssetFactory {
    pub fn new(settings: ForgeSettings) -> Self {
        Self {
            resolver: Arc::new(TierResolver),
            checker: Arc::new(TableConformance),
            rule_table: RuleTable::global(),
            settings,
        }
    }

    pub fn with_resolver(mut self, resolver: impl CapabilityResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn with_checker(mut self, checker: impl ConformanceChecker + 'static) -> Self {
        self.checker = Arc::new(checker);
        self
    }

    pub fn with_rule_table(mut self, table: Arc<RuleTable>) -> Self {
        self.rule_table = table;
        self
    }

    pub fn settings(&self) -> &ForgeSettings {
        &self.settings
    }

    pub fn rule_table(&self) -> &Arc<RuleTable> {
        &self.rule_table
    }

    /// Factory configured from [`ForgeSettings::global`].
    pub fn global() -> Arc<AssetFactory> {
        GLOBAL_FACTORY.clone()
    }

    /// The applied capability list for a tier and toggle set.
    pub fn resolve_capabilities(
        &self,
        tier: ProtocolTier,
        operations: &OperationToggles,
        enable_caching: bool,
    ) -> Vec<CapabilityName> {
        let mut applied: IndexSet<CapabilityName> = self.resolver.required(tier).into_iter().collect();
        applied.extend(CapabilityName::CORE);
        applied.extend(operations.capabilities());
        if enable_caching {
            applied.insert(CapabilityName::Caching);
        }
        applied.into_iter().collect()
    }

    /// Compose `descriptor` into an asset.
    pub async fn compose(&self, descriptor: AssetDescriptor) -> Result<Arc<EnhancedAsset>> {
        let tier = descriptor.resolved_tier();
        let applied =
            self.resolve_capabilities(tier, &descriptor.operations, descriptor.enable_caching);
        let shell_name = descriptor.shell.name().to_string();
        log::debug!(
            "[factory] composing {} '{}' at tier {} with {:?}",
            descriptor.kind,
            shell_name,
            tier,
            applied
        );

        match self.build(descriptor, tier, applied.clone()).await {
            Ok(asset) => Ok(asset),
            Err(err) => {
                log::warn!("[factory] composition of '{}' failed: {}", shell_name, err);
                Err(AssetError::composition(shell_name, applied, err))
            }
        }
    }

    async fn build(
        &self,
        descriptor: AssetDescriptor,
        tier: ProtocolTier,
        applied: Vec<CapabilityName>,
    ) -> Result<Arc<EnhancedAsset>> {
        let AssetDescriptor {
            kind,
            shell,
            value_type,
            description,
            metadata: extra,
            tags: descriptor_tags,
            rules,
            register,
            registry,
            ..
        } = descriptor;
        let name = shell.name().to_string();

        let entries = resolve_rules(&rules, &self.rule_table).await?;
        let value_type = match kind {
            AssetKind::Primitive | AssetKind::Alias => Some(value_type.unwrap_or(ValueType::Any)),
            AssetKind::Model => Some(ValueType::Map),
            AssetKind::Enum => value_type,
            AssetKind::Protocol => None,
        };

        let description = description.or_else(|| shell.doc_text().map(str::to_string));
        let metadata = Arc::new(
            AssetMetadata::new(kind, tier, applied.clone())
                .with_description(description.clone())
                .with_extra(extra),
        );
        let tags: Vec<String> = shell
            .declared_tags()
            .iter()
            .cloned()
            .chain(descriptor_tags)
            .collect();

        let inputs = CapabilityInputs {
            name: &name,
            metadata: &metadata,
            description,
            tags: &tags,
            rules: &entries,
            value_type: value_type.unwrap_or(ValueType::Any),
            cache_capacity: self.settings.cache_capacity,
        };
        let mut table = CapabilityTable::new();
        for capability in &applied {
            table.insert(instantiate(*capability, &inputs));
        }

        let config = AssetConfig::with_overrides(shell.config_overrides());
        let members = member_table(&shell, &table);

        let wrapper = if kind.is_wrapped() {
            Some(
                self.build_wrapper(&name, kind, &shell, &table, &members, &config, inputs.value_type)
                    .await?,
            )
        } else {
            None
        };

        let variants = if kind == AssetKind::Enum {
            coerce_variants(&name, shell.variants(), value_type)?
        } else {
            IndexMap::new()
        };

        let asset = Arc::new(EnhancedAsset {
            name,
            kind,
            shell,
            metadata,
            capabilities: table,
            members,
            config,
            value_type,
            wrapper,
            variants,
        });

        let should_register = register.unwrap_or(registry.is_some() || self.settings.auto_register);
        if should_register {
            let registry = registry.unwrap_or_else(|| TypeRegistry::named(&self.settings.registry_name));
            return registry.register(asset, None, None, None).await;
        }
        Ok(asset)
    }

    #[allow(clippy::too_many_arguments)]
    async fn build_wrapper(
        &self,
        name: &str,
        kind: AssetKind,
        shell: &super::shell::AssetShell,
        table: &CapabilityTable,
        members: &IndexMap<String, super::enhanced::MemberSource>,
        config: &AssetConfig,
        value_type: ValueType,
    ) -> Result<ValidatedWrapper> {
        let rule_set = if self.checker.conforms(table, CapabilityName::Rules) {
            table
                .downcast::<RulesCapability>(CapabilityName::Rules)
                .map(RulesCapability::rule_set)
                .unwrap_or_default()
        } else {
            Arc::new(RuleSet::default())
        };
        self.check_rejections(&rule_set)?;
        let annotated = AnnotatedType::new(value_type, rule_set);

        let mut adapter = if kind == AssetKind::Model {
            let mut slots = Vec::with_capacity(shell.fields().len());
            for field in shell.fields() {
                let entries = resolve_rules(&field.rules, &self.rule_table).await?;
                let set = Arc::new(RuleSet::new(entries));
                self.check_rejections(&set)?;
                slots.push(FieldSlot {
                    name: field.name.clone(),
                    required: field.required,
                    default: field.default.clone(),
                    annotated: AnnotatedType::new(field.value_type, set),
                });
            }
            ValidationAdapter::for_model(name, slots, annotated, config.clone())
        } else {
            ValidationAdapter::for_value(name, annotated, config.clone())
        };

        if let Some(cache) = table.downcast::<CachingCapability>(CapabilityName::Caching) {
            adapter = adapter.with_cache(cache.clone());
        }
        Ok(ValidatedWrapper::build(name, members, adapter))
    }

    fn check_rejections(&self, set: &RuleSet) -> Result<()> {
        let processed = set.processed();
        if self.settings.strict_rules && !processed.rejected.is_empty() {
            return Err(AssetError::RejectedRules {
                entries: processed
                    .rejected
                    .iter()
                    .map(|r| r.description.clone())
                    .collect(),
            });
        }
        Ok(())
    }
}

fn instantiate(name: CapabilityName, inputs: &CapabilityInputs<'_>) -> Arc<dyn Capability> {
    match name {
        CapabilityName::Metadata => Arc::new(MetadataCapability::new(inputs.metadata.clone())),
        CapabilityName::Tagging => Arc::new(TaggingCapability::new(inputs.tags)),
        CapabilityName::Rules => Arc::new(RulesCapability::new(inputs.rules.to_vec())),
        CapabilityName::Caching => Arc::new(CachingCapability::with_capacity(inputs.cache_capacity)),
        CapabilityName::Comparison => Arc::new(ComparisonCapability::new(inputs.value_type)),
        CapabilityName::Documentation => Arc::new(DocumentationCapability::new(
            inputs.name,
            inputs.description.clone(),
        )),
        CapabilityName::Arithmetic => Arc::new(ArithmeticCapability),
        CapabilityName::Container => Arc::new(ContainerCapability),
        CapabilityName::Casting => Arc::new(CastingCapability),
        CapabilityName::PathLike => Arc::new(PathCapability),
        CapabilityName::DateTimeLike => Arc::new(DateTimeCapability),
        CapabilityName::TimeDeltaLike => Arc::new(TimeDeltaCapability),
    }
}

/// Check enum member values against the base type.
fn coerce_variants(
    asset: &str,
    variants: &IndexMap<String, Value>,
    base: Option<ValueType>,
) -> Result<IndexMap<String, Value>> {
    let Some(base) = base else {
        return Ok(variants.clone());
    };
    let mut out = IndexMap::with_capacity(variants.len());
    let mut failures = Vec::new();
    for (member, value) in variants {
        match base.coerce(value.clone()) {
            Ok(value) => {
                out.insert(member.clone(), value);
            }
            Err(message) => failures.push(FieldFailure::new(member.as_str(), "type", message)),
        }
    }
    if failures.is_empty() {
        Ok(out)
    } else {
        Err(AssetError::ValidationFailed {
            asset: asset.to_string(),
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::shell::AssetShell;
    use crate::rules::{build_validator, keys, RuleContext, RuleFunction, ReturnHint, SkipMarker};
    use serde_json::json;

    fn factory() -> AssetFactory {
        AssetFactory::new(ForgeSettings {
            auto_register: false,
            ..Default::default()
        })
    }

    #[test]
    fn test_applied_list_has_core_once_and_toggles_in_order() {
        let factory = factory();
        for tier in ProtocolTier::ALL {
            for caching in [false, true] {
                for ops in [
                    OperationToggles::default(),
                    OperationToggles::all(),
                    OperationToggles { casting: true, path_like: true, ..Default::default() },
                ] {
                    let applied = factory.resolve_capabilities(tier, &ops, caching);
                    for core in CapabilityName::CORE {
                        assert_eq!(applied.iter().filter(|c| **c == core).count(), 1);
                    }
                    for op in OperationToggles::all().capabilities() {
                        assert_eq!(applied.contains(&op), ops.capabilities().contains(&op));
                    }
                    assert_eq!(applied.contains(&CapabilityName::Caching), caching);
                    let unique: IndexSet<_> = applied.iter().collect();
                    assert_eq!(unique.len(), applied.len());
                    assert_eq!(applied, factory.resolve_capabilities(tier, &ops, caching));
                }
            }
        }
    }

    #[test]
    fn test_core_follows_resolver_output() {
        let applied = factory().resolve_capabilities(
            ProtocolTier::Core,
            &OperationToggles { arithmetic: true, ..Default::default() },
            true,
        );
        use CapabilityName::*;
        assert_eq!(
            applied,
            vec![Metadata, Documentation, Comparison, Tagging, Rules, Arithmetic, Caching]
        );
    }

    #[tokio::test]
    async fn test_compose_primitive_with_rules() {
        let descriptor = AssetDescriptor::new(AssetKind::Primitive, AssetShell::new("Port").doc("TCP port"))
            .value_type(ValueType::Integer)
            .operations(ValueType::Integer.default_operations())
            .rule((keys::valid::numeric::IN_RANGE, crate::rules::RuleArgs::positional([1, 65535])))
            .metadata("owner", "net");
        let port = factory().compose(descriptor).await.unwrap();

        assert_eq!(port.kind(), AssetKind::Primitive);
        assert_eq!(port.tier(), ProtocolTier::Validated);
        assert_eq!(port.metadata().get("owner"), Some(json!("net")));
        assert_eq!(port.doc(), Some("TCP port"));

        let p = port.validate(json!(8080)).await.unwrap();
        assert_eq!(p.call("add", &[json!(1)]).unwrap(), json!(8081));
        assert!(p.call("get_tags", &[]).is_err());
        assert!(port.validate(json!(0)).await.is_err());
    }

    #[tokio::test]
    async fn test_shell_members_mask_capabilities() {
        let shell = AssetShell::new("Label").member("summary", |_call| Ok(json!("custom")));
        let asset = factory()
            .compose(AssetDescriptor::new(AssetKind::Protocol, shell))
            .await
            .unwrap();
        assert_eq!(asset.call("summary", &[]).unwrap(), json!("custom"));
        assert_eq!(asset.call("doc", &[]).unwrap(), json!(null));
        assert!(asset.wrapper().is_none());
    }

    #[tokio::test]
    async fn test_failures_are_wrapped_with_the_capability_list() {
        let descriptor = AssetDescriptor::new(AssetKind::Enum, "Level")
            .value_type(ValueType::Integer)
            .tier(ProtocolTier::Advanced);
        let mut descriptor = descriptor;
        descriptor.shell = descriptor.shell.clone().variant("LOW", 1).variant("HIGH", "x");
        let err = factory().compose(descriptor).await.unwrap_err();
        match &err {
            AssetError::Composition { shell, capabilities, .. } => {
                assert_eq!(shell, "Level");
                assert!(capabilities.contains(&CapabilityName::Tagging));
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(err.failures()[0].field, "HIGH");
    }

    #[tokio::test]
    async fn test_strict_rules_reject_sync_functions() {
        let sync_rule = RuleFunction::Sync {
            name: "legacy_check".into(),
            returns: ReturnHint::Boolean,
            body: Arc::new(|v: Value, _c: &RuleContext| Ok::<Value, String>(v)),
        };
        let lenient = factory()
            .compose(
                AssetDescriptor::new(AssetKind::Primitive, "Lenient")
                    .value_type(ValueType::String)
                    .rule(sync_rule.clone())
                    .rule(SkipMarker::Defer),
            )
            .await
            .unwrap();
        let rejected = lenient.call("rejected_rules", &[]).unwrap();
        assert_eq!(rejected.as_array().map(Vec::len), Some(1));

        let strict = AssetFactory::new(ForgeSettings {
            auto_register: false,
            strict_rules: true,
            ..Default::default()
        });
        let err = strict
            .compose(
                AssetDescriptor::new(AssetKind::Primitive, "Strict")
                    .value_type(ValueType::String)
                    .rule(sync_rule),
            )
            .await
            .unwrap_err();
        assert!(matches!(err.root(), AssetError::RejectedRules { .. }));
    }

    #[tokio::test]
    async fn test_caching_memoizes_validation() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        let counted = build_validator().build_blocking("counted", move |_v: &Value, _c: &RuleContext| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            true
        });
        let asset = factory()
            .compose(
                AssetDescriptor::new(AssetKind::Primitive, "Cached")
                    .value_type(ValueType::String)
                    .rule(counted)
                    .caching(true),
            )
            .await
            .unwrap();
        assert!(asset.metadata().performance.caching);
        asset.validate(json!("a")).await.unwrap();
        asset.validate(json!("a")).await.unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(asset.caching().map(|c| c.len()), Some(1));
    }

    #[tokio::test]
    async fn test_cached_result_retired_when_rules_change() {
        let asset = factory()
            .compose(
                AssetDescriptor::new(AssetKind::Primitive, "Word")
                    .value_type(ValueType::String)
                    .caching(true),
            )
            .await
            .unwrap();
        assert_eq!(asset.validate(json!("bad")).await.unwrap().value(), &json!("bad"));

        let rejects_bad = build_validator().build_blocking("not_bad", |v: &Value, _c: &RuleContext| {
            v.as_str() != Some("bad")
        });
        asset.rules().unwrap().push(rejects_bad);

        let err = asset.validate(json!("bad")).await.unwrap_err();
        assert_eq!(err.failures()[0].rule, "not_bad");
        assert!(asset.validate(json!("good")).await.is_ok());
    }

    #[tokio::test]
    async fn test_validation_cache_respects_capacity() {
        let factory = AssetFactory::new(ForgeSettings {
            auto_register: false,
            cache_capacity: 3,
            ..Default::default()
        });
        let asset = factory
            .compose(
                AssetDescriptor::new(AssetKind::Primitive, "Bounded")
                    .value_type(ValueType::Integer)
                    .caching(true),
            )
            .await
            .unwrap();
        for n in 0..10 {
            asset.validate(json!(n)).await.unwrap();
        }
        let cache = asset.caching().unwrap();
        assert_eq!(cache.capacity(), 3);
        assert_eq!(cache.len(), 3);
    }
}
