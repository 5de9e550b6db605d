//! Pipeline input entries.
//!
//! A declaration's rule list is an ordered sequence of [`RuleEntry`] values.
//! Besides concrete rules it can carry skip markers, objects that only
//! satisfy the rule contract structurally, and bare functions that still
//! need wrapping.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::rule::{Normalizer, Rule, RuleContext, RuleKind, Validator};

/// Placeholder meaning "omit this slot".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipMarker {
    Skip,
    Disabled,
    Defer,
    NoOp,
}

/// How a structurally conforming object reports asynchrony.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asyncness {
    /// Declares an `is_async` flag.
    DeclaredFlag,
    /// Is itself an async callable.
    AsyncCallable,
    /// Exposes an async call operator.
    AsyncCallOperator,
    /// Plain synchronous callable.
    Synchronous,
}

impl Asyncness {
    pub fn is_async(&self) -> bool {
        !matches!(self, Self::Synchronous)
    }
}

/// Contract for objects that behave like a rule without being one.
#[async_trait]
pub trait RuleProtocol: Send + Sync {
    fn name(&self) -> &str;

    /// Which bucket the object claims.
    fn role(&self) -> RuleKind;

    fn asyncness(&self) -> Asyncness;

    /// Template used when the object acts as a validator.
    fn error_template(&self) -> Option<&str> {
        None
    }

    /// Validators return a truthy/falsy value, normalizers the new value.
    async fn call(&self, value: Value, ctx: RuleContext) -> Result<Value, String>;
}

/// Declared return type of a bare function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnHint {
    Boolean,
    Untyped,
    Typed(String),
}

pub type AsyncRuleFn =
    Arc<dyn Fn(Value, RuleContext) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

pub type SyncRuleFn = Arc<dyn Fn(Value, &RuleContext) -> Result<Value, String> + Send + Sync>;

/// A bare function placed directly in a rule list.
#[derive(Clone)]
pub enum RuleFunction {
    Async {
        name: String,
        returns: ReturnHint,
        body: AsyncRuleFn,
    },
    Sync {
        name: String,
        returns: ReturnHint,
        body: SyncRuleFn,
    },
}

impl RuleFunction {
    pub fn name(&self) -> &str {
        match self {
            Self::Async { name, .. } | Self::Sync { name, .. } => name,
        }
    }
}

/// One slot of a rule list.
#[derive(Clone)]
pub enum RuleEntry {
    Rule(Rule),
    Skip(SkipMarker),
    Conforming(Arc<dyn RuleProtocol>),
    Function(RuleFunction),
    /// Anything the pipeline cannot interpret, described by name.
    Unrecognized(String),
}

impl RuleEntry {
    /// Short description used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Self::Rule(rule) => format!("{} '{}'", rule.kind(), rule.name()),
            Self::Skip(marker) => format!("skip marker {marker:?}"),
            Self::Conforming(obj) => format!("conforming {} '{}'", obj.role(), obj.name()),
            Self::Function(RuleFunction::Async { name, .. }) => format!("async function '{name}'"),
            Self::Function(RuleFunction::Sync { name, .. }) => format!("sync function '{name}'"),
            Self::Unrecognized(what) => format!("unrecognized entry '{what}'"),
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip(_))
    }
}

impl fmt::Debug for RuleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleEntry({})", self.describe())
    }
}

impl From<Rule> for RuleEntry {
    fn from(rule: Rule) -> Self {
        Self::Rule(rule)
    }
}

impl From<Validator> for RuleEntry {
    fn from(v: Validator) -> Self {
        Self::Rule(v.into())
    }
}

impl From<Normalizer> for RuleEntry {
    fn from(n: Normalizer) -> Self {
        Self::Rule(n.into())
    }
}

impl From<SkipMarker> for RuleEntry {
    fn from(marker: SkipMarker) -> Self {
        Self::Skip(marker)
    }
}

impl From<RuleFunction> for RuleEntry {
    fn from(f: RuleFunction) -> Self {
        Self::Function(f)
    }
}

/// Truthiness used when a function or conforming object acts as a validator.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!([1])));
        assert!(is_truthy(&json!(true)));
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            RuleEntry::from(SkipMarker::Defer).describe(),
            "skip marker Defer"
        );
        assert_eq!(
            RuleEntry::Unrecognized("42".into()).describe(),
            "unrecognized entry '42'"
        );
    }
}
