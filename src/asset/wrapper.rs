//! Validated value wrappers.
//!
//! Wrapped-value assets (primitive, alias, model) build instances through a
//! [`ValidatedWrapper`]: a single field whose type is an [`AnnotatedType`]
//! (inner type plus ordered rule list), a reusable [`ValidationAdapter`],
//! and a curated allow-list of operator members copied from the composed
//! asset.

use std::cmp::Ordering;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::enhanced::{EnhancedAsset, MemberSource};
use super::kind::ValueType;
use crate::capabilities::caching::{input_key, VALIDATION_NAMESPACE};
use crate::capabilities::{
    ArithmeticCapability, CachingCapability, CastingCapability, ComparisonCapability,
    ContainerCapability, DateTimeCapability, PathCapability, TimeDeltaCapability,
};
use crate::config::AssetConfig;
use crate::errors::{AssetError, FieldFailure, Result};
use crate::rules::{RuleContext, RuleSet};

/// Field name used for wrapped values.
pub const ROOT_FIELD: &str = "root";
/// Field name used for model-level rules.
pub const MODEL_FIELD: &str = "__model__";

// ---------------------------------------------------------------------------
// AnnotatedType
// ---------------------------------------------------------------------------

/// Inner type annotated with an ordered rule list.
#[derive(Debug, Clone)]
pub struct AnnotatedType {
    pub value_type: ValueType,
    pub rules: Arc<RuleSet>,
}

impl AnnotatedType {
    pub fn new(value_type: ValueType, rules: Arc<RuleSet>) -> Self {
        Self { value_type, rules }
    }

    /// Applied rule order: normalizers, then validators.
    pub fn rule_names(&self) -> Vec<String> {
        self.rules
            .processed()
            .ordered_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// ValidationAdapter
// ---------------------------------------------------------------------------

/// One declared model field, ready to validate.
#[derive(Debug, Clone)]
pub struct FieldSlot {
    pub name: String,
    pub required: bool,
    pub default: Option<Value>,
    pub annotated: AnnotatedType,
}

#[derive(Debug, Clone)]
enum Shape {
    Value(AnnotatedType),
    Model {
        fields: Vec<FieldSlot>,
        model: AnnotatedType,
    },
}

/// Reusable validator built from an annotated type.
#[derive(Debug, Clone)]
pub struct ValidationAdapter {
    asset: String,
    shape: Shape,
    config: AssetConfig,
    cache: Option<CachingCapability>,
}

type FieldOutcome = std::result::Result<Value, Vec<FieldFailure>>;

impl ValidationAdapter {
    pub fn for_value(asset: impl Into<String>, annotated: AnnotatedType, config: AssetConfig) -> Self {
        Self {
            asset: asset.into(),
            shape: Shape::Value(annotated),
            config,
            cache: None,
        }
    }

    pub fn for_model(
        asset: impl Into<String>,
        fields: Vec<FieldSlot>,
        model: AnnotatedType,
        config: AssetConfig,
    ) -> Self {
        Self {
            asset: asset.into(),
            shape: Shape::Model { fields, model },
            config,
            cache: None,
        }
    }

    /// Memoize accepted inputs in `cache`.
    pub fn with_cache(mut self, cache: CachingCapability) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The annotated type of the wrapper's single field.
    pub fn annotated(&self) -> &AnnotatedType {
        match &self.shape {
            Shape::Value(annotated) => annotated,
            Shape::Model { model, .. } => model,
        }
    }

    pub fn fields(&self) -> &[FieldSlot] {
        match &self.shape {
            Shape::Value(_) => &[],
            Shape::Model { fields, .. } => fields,
        }
    }

    /// Revision stamp over every rule list this adapter runs.
    ///
    /// Model stamps join the model-level revision with each field's, so a
    /// change to any field's rules retires cached results for the model.
    pub fn rules_revision(&self) -> String {
        match &self.shape {
            Shape::Value(annotated) => annotated.rules.revision().to_string(),
            Shape::Model { fields, model } => std::iter::once(model.rules.revision())
                .chain(fields.iter().map(|f| f.annotated.rules.revision()))
                .map(|rev| rev.to_string())
                .collect::<Vec<_>>()
                .join("."),
        }
    }

    /// Validate `input`, returning the normalized value.
    pub async fn validate(&self, input: Value) -> Result<Value> {
        let key = self
            .cache
            .as_ref()
            .map(|_| format!("{}:{}", self.rules_revision(), input_key(&input)));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache.read(VALIDATION_NAMESPACE, key) {
                return Ok(hit);
            }
        }

        let outcome = match &self.shape {
            Shape::Value(annotated) => {
                self.run_field(annotated, ROOT_FIELD, input, &Map::new()).await
            }
            Shape::Model { fields, model } => self.run_model(fields, model, input).await,
        };

        match outcome {
            Ok(value) => {
                if let (Some(cache), Some(key)) = (&self.cache, &key) {
                    cache.add(VALIDATION_NAMESPACE, key, value.clone());
                }
                Ok(value)
            }
            Err(failures) => Err(AssetError::ValidationFailed {
                asset: self.asset.clone(),
                failures,
            }),
        }
    }

    async fn run_field(
        &self,
        annotated: &AnnotatedType,
        field: &str,
        value: Value,
        data: &Map<String, Value>,
    ) -> FieldOutcome {
        let value = match value {
            Value::String(s) if self.config.str_strip_whitespace() => {
                Value::String(s.trim().to_string())
            }
            other => other,
        };
        let mut value = annotated
            .value_type
            .coerce(value)
            .map_err(|message| vec![FieldFailure::new(field, "type", message)])?;

        let processed = annotated.rules.processed();
        let ctx = RuleContext::new(self.asset.clone(), field).with_data(data.clone());

        for normalizer in &processed.normalizers {
            value = normalizer.apply(value, &ctx).await.map_err(|e| {
                let message = match e {
                    AssetError::RuleExecution { message, .. } => message,
                    other => other.to_string(),
                };
                vec![FieldFailure::new(field, normalizer.name(), message)]
            })?;
        }

        let mut failures = Vec::new();
        for validator in &processed.validators {
            if let Err(failure) = validator.validate(&value, &ctx).await {
                failures.push(failure);
            }
        }
        if failures.is_empty() {
            Ok(value)
        } else {
            Err(failures)
        }
    }

    async fn run_model(
        &self,
        fields: &[FieldSlot],
        model: &AnnotatedType,
        input: Value,
    ) -> FieldOutcome {
        let data = match input {
            Value::Object(data) => data,
            other => {
                return Err(vec![FieldFailure::new(
                    MODEL_FIELD,
                    "type",
                    format!("expected an object, got {other}"),
                )])
            }
        };

        let mut failures = Vec::new();
        if self.config.forbids_extra() {
            for key in data.keys() {
                if !fields.iter().any(|f| &f.name == key) {
                    failures.push(FieldFailure::new(key.as_str(), "extra", "unexpected field"));
                }
            }
        }

        let mut out = Map::new();
        for slot in fields {
            let raw = match (data.get(&slot.name), &slot.default) {
                (Some(value), _) => value.clone(),
                (None, Some(default)) => default.clone(),
                (None, None) if slot.required => {
                    failures.push(FieldFailure::new(slot.name.as_str(), "required", "field required"));
                    continue;
                }
                (None, None) => continue,
            };
            match self.run_field(&slot.annotated, &slot.name, raw, &data).await {
                Ok(value) => {
                    out.insert(slot.name.clone(), value);
                }
                Err(mut field_failures) => failures.append(&mut field_failures),
            }
        }
        if !failures.is_empty() {
            return Err(failures);
        }

        let whole = Value::Object(out);
        let snapshot = whole.as_object().cloned().unwrap_or_default();
        self.run_field(model, MODEL_FIELD, whole, &snapshot).await
    }
}

// ---------------------------------------------------------------------------
// ValidatedWrapper
// ---------------------------------------------------------------------------

/// Operator member names a wrapper may carry over from its asset.
pub fn curated_members() -> impl Iterator<Item = &'static str> {
    [
        ComparisonCapability::MEMBERS,
        CastingCapability::MEMBERS,
        ContainerCapability::MEMBERS,
        ArithmeticCapability::MEMBERS,
        PathCapability::MEMBERS,
        DateTimeCapability::MEMBERS,
        TimeDeltaCapability::MEMBERS,
    ]
    .into_iter()
    .flatten()
    .copied()
}

/// Fill in missing ordering operators when some, but not all, are present.
pub(crate) fn complete_ordering(members: &mut IndexMap<String, MemberSource>) {
    let present: Vec<&'static str> = ComparisonCapability::ORDERING
        .into_iter()
        .filter(|op| members.contains_key(*op))
        .collect();
    let Some(&base) = present.first() else {
        return;
    };
    if present.len() == ComparisonCapability::ORDERING.len() {
        return;
    }
    for op in ComparisonCapability::ORDERING {
        if !members.contains_key(op) {
            log::debug!("[wrapper] deriving '{}' from '{}'", op, base);
            members.insert(op.to_string(), MemberSource::DerivedOrdering { base });
        }
    }
}

/// Answer ordering operator `target` given the result of `base` and equality.
pub(crate) fn derive_ordering(base: &str, base_result: bool, equal: bool, target: &str) -> Option<bool> {
    let ordering = match (base, base_result) {
        (_, _) if equal => Ordering::Equal,
        ("lt", true) | ("le", true) => Ordering::Less,
        ("lt", false) | ("le", false) => Ordering::Greater,
        ("gt", true) | ("ge", true) => Ordering::Greater,
        ("gt", false) | ("ge", false) => Ordering::Less,
        _ => return None,
    };
    match target {
        "lt" => Some(ordering == Ordering::Less),
        "le" => Some(ordering != Ordering::Greater),
        "gt" => Some(ordering == Ordering::Greater),
        "ge" => Some(ordering != Ordering::Less),
        _ => None,
    }
}

/// Single-field wrapper around an annotated type.
#[derive(Debug, Clone)]
pub struct ValidatedWrapper {
    name: String,
    adapter: Arc<ValidationAdapter>,
    members: IndexMap<String, MemberSource>,
}

impl ValidatedWrapper {
    /// Copy the curated members present on the composed asset, completing
    /// the ordering set.
    pub(crate) fn build(
        asset: &str,
        asset_members: &IndexMap<String, MemberSource>,
        adapter: ValidationAdapter,
    ) -> Self {
        let mut members: IndexMap<String, MemberSource> = curated_members()
            .filter_map(|name| asset_members.get(name).map(|src| (name.to_string(), *src)))
            .collect();
        complete_ordering(&mut members);
        Self {
            name: format!("{asset}Value"),
            adapter: Arc::new(adapter),
            members,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn adapter(&self) -> &ValidationAdapter {
        &self.adapter
    }

    pub fn annotated(&self) -> &AnnotatedType {
        self.adapter.annotated()
    }

    pub fn members(&self) -> &IndexMap<String, MemberSource> {
        &self.members
    }

    pub fn has_member(&self, member: &str) -> bool {
        self.members.contains_key(member)
    }

    /// Call a curated member on an instance value.
    pub fn dispatch(
        &self,
        asset: &EnhancedAsset,
        member: &str,
        receiver: &Value,
        args: &[Value],
    ) -> Result<Value> {
        match self.members.get(member) {
            Some(MemberSource::DerivedOrdering { base }) => {
                let other = args.first().ok_or_else(|| {
                    AssetError::operation(member, "missing argument 1")
                })?;
                let base_result = asset
                    .dispatch(base, Some(receiver), args)?
                    .as_bool()
                    .unwrap_or(false);
                let equal = match asset.dispatch("eq", Some(receiver), args) {
                    Ok(v) => v.as_bool().unwrap_or(false),
                    Err(_) => receiver == other,
                };
                derive_ordering(base, base_result, equal, member)
                    .map(Value::Bool)
                    .ok_or_else(|| AssetError::operation(member, format!("cannot derive from '{base}'")))
            }
            Some(_) => asset.dispatch(member, Some(receiver), args),
            None => Err(AssetError::UnsupportedOperation {
                asset: asset.name().to_string(),
                member: member.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::CapabilityName;
    use crate::rules::{build_normalizer, build_validator, RuleEntry};
    use serde_json::json;

    fn rule_set(entries: Vec<RuleEntry>) -> Arc<RuleSet> {
        Arc::new(RuleSet::new(entries))
    }

    fn non_empty() -> RuleEntry {
        build_validator()
            .error_template("{field} must not be empty")
            .build("non_empty", |v: Value, _c: RuleContext| async move {
                v.as_str().map(|s| !s.is_empty()).unwrap_or(true)
            })
            .into()
    }

    fn lowercase() -> RuleEntry {
        build_normalizer()
            .build("lower", |v: Value, _c: RuleContext| async move {
                Ok::<Value, String>(match v {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other,
                })
            })
            .into()
    }

    #[tokio::test]
    async fn test_value_adapter_runs_normalizers_then_validators() {
        let annotated = AnnotatedType::new(ValueType::String, rule_set(vec![non_empty(), lowercase()]));
        assert_eq!(annotated.rule_names(), vec!["lower", "non_empty"]);
        let adapter = ValidationAdapter::for_value("Name", annotated, AssetConfig::default());

        assert_eq!(adapter.validate(json!("ADA")).await.unwrap(), json!("ada"));

        let err = adapter.validate(json!("")).await.unwrap_err();
        assert_eq!(err.failures()[0].message, "root must not be empty");

        let err = adapter.validate(json!(5)).await.unwrap_err();
        assert_eq!(err.failures()[0].rule, "type");
    }

    #[tokio::test]
    async fn test_strip_whitespace_config() {
        let overrides = json!({"str_strip_whitespace": true});
        let config = AssetConfig::with_overrides(overrides.as_object().unwrap());
        let annotated = AnnotatedType::new(ValueType::String, rule_set(vec![non_empty()]));
        let adapter = ValidationAdapter::for_value("Name", annotated, config);
        assert!(adapter.validate(json!("   ")).await.is_err());
    }

    #[tokio::test]
    async fn test_model_adapter_reports_per_field() {
        let fields = vec![
            FieldSlot {
                name: "name".into(),
                required: true,
                default: None,
                annotated: AnnotatedType::new(ValueType::String, rule_set(vec![non_empty()])),
            },
            FieldSlot {
                name: "age".into(),
                required: true,
                default: None,
                annotated: AnnotatedType::new(ValueType::Integer, rule_set(vec![])),
            },
            FieldSlot {
                name: "ratio".into(),
                required: false,
                default: Some(json!(1)),
                annotated: AnnotatedType::new(ValueType::Float, rule_set(vec![])),
            },
        ];
        let model = AnnotatedType::new(ValueType::Map, rule_set(vec![]));
        let adapter = ValidationAdapter::for_model("Person", fields, model, AssetConfig::default());

        let ok = adapter.validate(json!({"name": "Ada", "age": 36})).await.unwrap();
        assert_eq!(ok, json!({"name": "Ada", "age": 36, "ratio": 1.0}));

        let err = adapter.validate(json!({"name": "", "age": "x"})).await.unwrap_err();
        let fields: Vec<_> = err.failures().iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "age"]);

        let err = adapter.validate(json!({"name": "Ada"})).await.unwrap_err();
        assert_eq!(err.failures()[0].rule, "required");
    }

    #[tokio::test]
    async fn test_cache_memoizes_accepted_inputs() {
        let cache = CachingCapability::new();
        let annotated = AnnotatedType::new(ValueType::String, rule_set(vec![lowercase()]));
        let adapter = ValidationAdapter::for_value("Name", annotated, AssetConfig::default())
            .with_cache(cache.clone());
        adapter.validate(json!("X")).await.unwrap();
        assert!(adapter.validate(json!("")).await.is_ok());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.read(VALIDATION_NAMESPACE, "0:\"X\""), Some(json!("x")));
    }

    #[tokio::test]
    async fn test_model_revision_tracks_field_rules() {
        let name_rules = rule_set(vec![]);
        let fields = vec![FieldSlot {
            name: "name".into(),
            required: true,
            default: None,
            annotated: AnnotatedType::new(ValueType::String, name_rules.clone()),
        }];
        let model = AnnotatedType::new(ValueType::Map, rule_set(vec![]));
        let adapter = ValidationAdapter::for_model("Person", fields, model, AssetConfig::default())
            .with_cache(CachingCapability::new());
        assert_eq!(adapter.rules_revision(), "0.0");
        assert!(adapter.validate(json!({"name": ""})).await.is_ok());

        name_rules.push(non_empty());
        assert_eq!(adapter.rules_revision(), "0.1");
        let err = adapter.validate(json!({"name": ""})).await.unwrap_err();
        assert_eq!(err.failures()[0].field, "name");
    }

    #[test]
    fn test_partial_ordering_is_completed() {
        let mut members = IndexMap::new();
        members.insert("lt".to_string(), MemberSource::Shell);
        members.insert("eq".to_string(), MemberSource::Capability(CapabilityName::Comparison));
        complete_ordering(&mut members);
        assert_eq!(members["lt"], MemberSource::Shell);
        assert_eq!(members["ge"], MemberSource::DerivedOrdering { base: "lt" });
        assert_eq!(members.len(), 5);

        let mut none = IndexMap::new();
        complete_ordering(&mut none);
        assert!(none.is_empty());
    }

    #[test]
    fn test_derive_ordering() {
        // a < b
        assert_eq!(derive_ordering("lt", true, false, "ge"), Some(false));
        assert_eq!(derive_ordering("lt", true, false, "le"), Some(true));
        // a == b
        assert_eq!(derive_ordering("gt", false, true, "ge"), Some(true));
        // a > b, known only through le
        assert_eq!(derive_ordering("le", false, false, "gt"), Some(true));
        assert_eq!(derive_ordering("eq", true, false, "lt"), None);
    }
}
