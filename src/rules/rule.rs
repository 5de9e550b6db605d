//! Rule definitions: validators, normalizers and the entry points that build them.
//!
//! A rule is an immutable, self-describing async callable. Validators answer
//! `true`/`false` and turn `false` into a formatted failure; normalizers
//! return a transformed value.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::key::RuleKey;
use crate::errors::{AssetError, FieldFailure, Result};

// ---------------------------------------------------------------------------
// Body types
// ---------------------------------------------------------------------------

/// Async validator body: `(value, context) -> passed`.
pub type ValidatorBody = Arc<dyn Fn(Value, RuleContext) -> BoxFuture<'static, bool> + Send + Sync>;

/// Async normalizer body: `(value, context) -> transformed value`.
pub type NormalizerBody = Arc<
    dyn Fn(Value, RuleContext) -> BoxFuture<'static, std::result::Result<Value, String>>
        + Send
        + Sync,
>;

/// Which bucket a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Validator,
    Normalizer,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validator => write!(f, "validator"),
            Self::Normalizer => write!(f, "normalizer"),
        }
    }
}

// ---------------------------------------------------------------------------
// RuleContext / RuleArgs / RuleMetadata
// ---------------------------------------------------------------------------

/// Context handed to rule bodies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleContext {
    /// Asset the value is being validated for.
    pub asset: String,
    /// Field under validation (`root` for wrapped values).
    pub field: String,
    /// Sibling field values (model assets only).
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl RuleContext {
    pub fn new(asset: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            field: field.into(),
            data: Map::new(),
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }
}

/// Arguments passed when calling a rule key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleArgs {
    #[serde(default)]
    pub positional: Vec<Value>,
    #[serde(default)]
    pub named: Map<String, Value>,
}

impl RuleArgs {
    /// No arguments.
    pub fn none() -> Self {
        Self::default()
    }

    /// Positional arguments only.
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            positional: values.into_iter().map(Into::into).collect(),
            named: Map::new(),
        }
    }

    /// Add a named argument.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    /// Look up an argument by name, falling back to its position.
    pub fn arg(&self, index: usize, name: &str) -> Option<&Value> {
        self.named.get(name).or_else(|| self.positional.get(index))
    }

    /// Fetch a required non-negative integer argument.
    ///
    /// # Arguments
    ///
    /// * `index` - Position used when the argument is not passed by name.
    /// * `name` - Argument name, checked first.
    /// * `rule` - Rule name reported in the error.
    ///
    /// # Returns
    ///
    /// The value, or `InvalidRuleArguments` when it is missing or not a
    /// non-negative integer.
    pub fn require_u64(&self, index: usize, name: &str, rule: &str) -> Result<u64> {
        self.arg(index, name)
            .and_then(Value::as_u64)
            .ok_or_else(|| invalid_args(rule, format!("'{name}' must be a non-negative integer")))
    }

    /// Fetch a required numeric argument. Integers are widened.
    ///
    /// Arguments and errors follow [`require_u64`](Self::require_u64).
    pub fn require_f64(&self, index: usize, name: &str, rule: &str) -> Result<f64> {
        self.arg(index, name)
            .and_then(Value::as_f64)
            .ok_or_else(|| invalid_args(rule, format!("'{name}' must be a number")))
    }

    /// Fetch a required string argument as an owned `String`.
    ///
    /// Arguments and errors follow [`require_u64`](Self::require_u64).
    pub fn require_str(&self, index: usize, name: &str, rule: &str) -> Result<String> {
        self.arg(index, name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| invalid_args(rule, format!("'{name}' must be a string")))
    }
}

fn invalid_args(rule: &str, message: String) -> AssetError {
    AssetError::InvalidRuleArguments {
        rule: rule.to_string(),
        message,
    }
}

/// Free-form rule metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleMetadata {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Default template used when a validator declares none.
pub const DEFAULT_ERROR_TEMPLATE: &str = "Value {value} failed validation rule '{rule}'";

/// A rule whose body answers pass/fail.
#[derive(Clone)]
pub struct Validator {
    name: String,
    body: ValidatorBody,
    error_template: String,
    is_async: bool,
    accepts_context: bool,
    metadata: RuleMetadata,
    registered_as: Option<RuleKey>,
}

impl Validator {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn error_template(&self) -> &str {
        &self.error_template
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn accepts_context(&self) -> bool {
        self.accepts_context
    }

    pub fn metadata(&self) -> &RuleMetadata {
        &self.metadata
    }

    /// Key this rule self-registers under when its module loads.
    pub fn registered_as(&self) -> Option<&RuleKey> {
        self.registered_as.as_ref()
    }

    /// Run the body.
    pub async fn check(&self, value: &Value, ctx: &RuleContext) -> bool {
        let ctx = if self.accepts_context {
            ctx.clone()
        } else {
            RuleContext::default()
        };
        (self.body)(value.clone(), ctx).await
    }

    /// Run the body, turning `false` into a formatted failure.
    pub async fn validate(
        &self,
        value: &Value,
        ctx: &RuleContext,
    ) -> std::result::Result<(), FieldFailure> {
        if self.check(value, ctx).await {
            Ok(())
        } else {
            Err(FieldFailure::new(
                ctx.field.clone(),
                self.name.clone(),
                self.format_error(value, &ctx.field),
            ))
        }
    }

    /// Render the error template. Supports `{value}`, `{rule}` and `{field}`.
    pub fn format_error(&self, value: &Value, field: &str) -> String {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.error_template
            .replace("{value}", &rendered)
            .replace("{rule}", &self.name)
            .replace("{field}", field)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("name", &self.name)
            .field("error_template", &self.error_template)
            .field("is_async", &self.is_async)
            .field("registered_as", &self.registered_as)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// A rule whose body transforms a value.
#[derive(Clone)]
pub struct Normalizer {
    name: String,
    body: NormalizerBody,
    is_async: bool,
    accepts_context: bool,
    metadata: RuleMetadata,
    registered_as: Option<RuleKey>,
}

impl Normalizer {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn accepts_context(&self) -> bool {
        self.accepts_context
    }

    pub fn metadata(&self) -> &RuleMetadata {
        &self.metadata
    }

    pub fn registered_as(&self) -> Option<&RuleKey> {
        self.registered_as.as_ref()
    }

    /// Apply the transformation.
    pub async fn apply(&self, value: Value, ctx: &RuleContext) -> Result<Value> {
        let ctx = if self.accepts_context {
            ctx.clone()
        } else {
            RuleContext::default()
        };
        (self.body)(value, ctx)
            .await
            .map_err(|message| AssetError::RuleExecution {
                rule: self.name.clone(),
                message,
            })
    }
}

impl fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Normalizer")
            .field("name", &self.name)
            .field("is_async", &self.is_async)
            .field("registered_as", &self.registered_as)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// A concrete rule instance.
#[derive(Debug, Clone)]
pub enum Rule {
    Validator(Arc<Validator>),
    Normalizer(Arc<Normalizer>),
}

impl Rule {
    pub fn name(&self) -> &str {
        match self {
            Self::Validator(v) => v.name(),
            Self::Normalizer(n) => n.name(),
        }
    }

    pub fn kind(&self) -> RuleKind {
        match self {
            Self::Validator(_) => RuleKind::Validator,
            Self::Normalizer(_) => RuleKind::Normalizer,
        }
    }

    pub fn registered_as(&self) -> Option<&RuleKey> {
        match self {
            Self::Validator(v) => v.registered_as(),
            Self::Normalizer(n) => n.registered_as(),
        }
    }

    pub fn metadata(&self) -> &RuleMetadata {
        match self {
            Self::Validator(v) => v.metadata(),
            Self::Normalizer(n) => n.metadata(),
        }
    }

    /// Identity comparison: same underlying rule object.
    pub fn ptr_eq(&self, other: &Rule) -> bool {
        match (self, other) {
            (Self::Validator(a), Self::Validator(b)) => Arc::ptr_eq(a, b),
            (Self::Normalizer(a), Self::Normalizer(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Validator> for Rule {
    fn from(v: Validator) -> Self {
        Self::Validator(Arc::new(v))
    }
}

impl From<Normalizer> for Rule {
    fn from(n: Normalizer) -> Self {
        Self::Normalizer(Arc::new(n))
    }
}

// ---------------------------------------------------------------------------
// Declaring entry points
// ---------------------------------------------------------------------------

/// Start declaring a validator.
pub fn build_validator() -> ValidatorBuilder {
    ValidatorBuilder::default()
}

/// Start declaring a normalizer.
pub fn build_normalizer() -> NormalizerBuilder {
    NormalizerBuilder::default()
}

/// Builder returned by [`build_validator`].
#[derive(Debug, Clone, Default)]
pub struct ValidatorBuilder {
    error_template: Option<String>,
    metadata: RuleMetadata,
    register_as: Option<RuleKey>,
    accepts_context: bool,
}

impl ValidatorBuilder {
    pub fn error_template(mut self, template: impl Into<String>) -> Self {
        self.error_template = Some(template.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn register_as(mut self, key: RuleKey) -> Self {
        self.register_as = Some(key);
        self
    }

    /// Pass the full [`RuleContext`] to the body instead of an empty one.
    pub fn with_context(mut self) -> Self {
        self.accepts_context = true;
        self
    }

    /// Wrap an async body.
    pub fn build<F, Fut>(self, name: impl Into<String>, body: F) -> Validator
    where
        F: Fn(Value, RuleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let body: ValidatorBody = Arc::new(move |value, ctx| body(value, ctx).boxed());
        self.finish(name.into(), body, true)
    }

    /// Wrap a synchronous predicate; the resulting rule reports `is_async() == false`.
    pub fn build_blocking<F>(self, name: impl Into<String>, predicate: F) -> Validator
    where
        F: Fn(&Value, &RuleContext) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        let body: ValidatorBody = Arc::new(move |value, ctx| {
            let passed = predicate(&value, &ctx);
            async move { passed }.boxed()
        });
        self.finish(name.into(), body, false)
    }

    fn finish(self, name: String, body: ValidatorBody, is_async: bool) -> Validator {
        Validator {
            name,
            body,
            error_template: self
                .error_template
                .unwrap_or_else(|| DEFAULT_ERROR_TEMPLATE.to_string()),
            is_async,
            accepts_context: self.accepts_context,
            metadata: self.metadata,
            registered_as: self.register_as,
        }
    }
}

/// Builder returned by [`build_normalizer`].
#[derive(Debug, Clone, Default)]
pub struct NormalizerBuilder {
    metadata: RuleMetadata,
    register_as: Option<RuleKey>,
    accepts_context: bool,
}

impl NormalizerBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn register_as(mut self, key: RuleKey) -> Self {
        self.register_as = Some(key);
        self
    }

    pub fn with_context(mut self) -> Self {
        self.accepts_context = true;
        self
    }

    pub fn build<F, Fut>(self, name: impl Into<String>, body: F) -> Normalizer
    where
        F: Fn(Value, RuleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, String>> + Send + 'static,
    {
        let body: NormalizerBody = Arc::new(move |value, ctx| body(value, ctx).boxed());
        self.finish(name.into(), body, true)
    }

    pub fn build_blocking<F>(self, name: impl Into<String>, transform: F) -> Normalizer
    where
        F: Fn(Value, &RuleContext) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        let transform = Arc::new(transform);
        let body: NormalizerBody = Arc::new(move |value, ctx| {
            let out = transform(value, &ctx);
            async move { out }.boxed()
        });
        self.finish(name.into(), body, false)
    }

    fn finish(self, name: String, body: NormalizerBody, is_async: bool) -> Normalizer {
        Normalizer {
            name,
            body,
            is_async,
            accepts_context: self.accepts_context,
            metadata: self.metadata,
            registered_as: self.register_as,
        }
    }
}

/// Wrap a raw validator body without going through a builder.
pub(crate) fn validator_from_body(
    name: String,
    body: ValidatorBody,
    error_template: Option<String>,
) -> Validator {
    ValidatorBuilder {
        error_template,
        accepts_context: true,
        ..Default::default()
    }
    .finish(name, body, true)
}

/// Wrap a raw normalizer body without going through a builder.
pub(crate) fn normalizer_from_body(name: String, body: NormalizerBody) -> Normalizer {
    NormalizerBuilder {
        accepts_context: true,
        ..Default::default()
    }
    .finish(name, body, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_validator_formats_template() {
        let v = build_validator()
            .error_template("{field}: '{value}' rejected by {rule}")
            .build("never", |_value, _ctx| async { false });
        let ctx = RuleContext::new("Thing", "root");
        let failure = v.validate(&json!("abc"), &ctx).await.unwrap_err();
        assert_eq!(failure.message, "root: 'abc' rejected by never");
        assert_eq!(failure.rule, "never");
    }

    #[tokio::test]
    async fn test_context_is_only_passed_when_requested() {
        let plain = build_validator().build_blocking("sees_field", |_v, ctx| !ctx.field.is_empty());
        let aware = build_validator()
            .with_context()
            .build_blocking("sees_field", |_v, ctx| !ctx.field.is_empty());
        let ctx = RuleContext::new("Thing", "name");
        assert!(!plain.check(&json!(1), &ctx).await);
        assert!(aware.check(&json!(1), &ctx).await);
        assert!(!plain.is_async());
    }

    #[tokio::test]
    async fn test_normalizer_error_becomes_rule_execution() {
        let n = build_normalizer().build("boom", |_v, _ctx| async { Err("nope".to_string()) });
        let err = n.apply(json!(1), &RuleContext::default()).await.unwrap_err();
        assert!(matches!(err, AssetError::RuleExecution { ref rule, .. } if rule == "boom"));
    }

    #[test]
    fn test_rule_args_lookup() {
        let args = RuleArgs::positional([json!(5)]).with("pattern", "^a");
        assert_eq!(args.require_u64(0, "max", "max_length").unwrap(), 5);
        assert_eq!(args.require_str(9, "pattern", "matches").unwrap(), "^a");
        assert!(args.require_f64(3, "min", "in_range").is_err());
        assert!(RuleArgs::none().is_empty());
    }
}
