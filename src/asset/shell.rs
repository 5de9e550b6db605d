//! User-authored asset shells.
//!
//! A shell is what a declaration site writes: a name, optional docs, its
//! own members (which take precedence over capability members), a config
//! override map, and kind-specific parts (model fields, enum variants).

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::kind::ValueType;
use crate::capabilities::Invocation;
use crate::errors::Result;
use crate::rules::{
    Normalizer, Rule, RuleArgs, RuleEntry, RuleFunction, RuleKey, RuleTable, SkipMarker, Validator,
};

/// A member defined directly on a shell.
pub type ShellMember = Arc<dyn Fn(&Invocation<'_>) -> Result<Value> + Send + Sync>;

// ---------------------------------------------------------------------------
// RuleRef
// ---------------------------------------------------------------------------

/// A rule as written in a declaration: either a ready entry or a key to
/// resolve through the rule table at composition time.
#[derive(Clone, Debug)]
pub enum RuleRef {
    Entry(RuleEntry),
    Key { key: RuleKey, args: RuleArgs },
}

impl RuleRef {
    pub fn key(key: RuleKey, args: RuleArgs) -> Self {
        Self::Key { key, args }
    }

    pub async fn resolve(&self, table: &RuleTable) -> Result<RuleEntry> {
        match self {
            Self::Entry(entry) => Ok(entry.clone()),
            Self::Key { key, args } => table.resolve(key, args.clone()).await.map(RuleEntry::Rule),
        }
    }
}

/// Resolve a rule list in order.
pub async fn resolve_rules(refs: &[RuleRef], table: &RuleTable) -> Result<Vec<RuleEntry>> {
    let mut out = Vec::with_capacity(refs.len());
    for rule in refs {
        out.push(rule.resolve(table).await?);
    }
    Ok(out)
}

impl From<RuleEntry> for RuleRef {
    fn from(entry: RuleEntry) -> Self {
        Self::Entry(entry)
    }
}

impl From<Rule> for RuleRef {
    fn from(rule: Rule) -> Self {
        Self::Entry(rule.into())
    }
}

impl From<Validator> for RuleRef {
    fn from(v: Validator) -> Self {
        Self::Entry(v.into())
    }
}

impl From<Normalizer> for RuleRef {
    fn from(n: Normalizer) -> Self {
        Self::Entry(n.into())
    }
}

impl From<SkipMarker> for RuleRef {
    fn from(marker: SkipMarker) -> Self {
        Self::Entry(marker.into())
    }
}

impl From<RuleFunction> for RuleRef {
    fn from(f: RuleFunction) -> Self {
        Self::Entry(f.into())
    }
}

impl From<RuleKey> for RuleRef {
    fn from(key: RuleKey) -> Self {
        Self::Key {
            key,
            args: RuleArgs::none(),
        }
    }
}

impl From<(RuleKey, RuleArgs)> for RuleRef {
    fn from((key, args): (RuleKey, RuleArgs)) -> Self {
        Self::Key { key, args }
    }
}

// ---------------------------------------------------------------------------
// ModelField
// ---------------------------------------------------------------------------

/// One declared field of a model asset.
#[derive(Clone, Debug)]
pub struct ModelField {
    pub name: String,
    pub value_type: ValueType,
    pub rules: Vec<RuleRef>,
    pub required: bool,
    pub default: Option<Value>,
}

impl ModelField {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            rules: Vec::new(),
            required: true,
            default: None,
        }
    }

    pub fn rule(mut self, rule: impl Into<RuleRef>) -> Self {
        self.rules.push(rule.into());
        self
    }

    /// Missing values are left out instead of failing.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Value used when the field is missing.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self.required = false;
        self
    }
}

// ---------------------------------------------------------------------------
// AssetShell
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct AssetShell {
    name: String,
    doc: Option<String>,
    members: IndexMap<String, ShellMember>,
    config: Map<String, Value>,
    fields: Vec<ModelField>,
    variants: IndexMap<String, Value>,
    tags: Vec<String>,
    registry_key: Option<String>,
}

impl AssetShell {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Define a member. Shell members win over capability members of the same name.
    pub fn member<F>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.members.insert(name.into(), Arc::new(body));
        self
    }

    /// Override one key of the baseline asset config.
    pub fn config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn config_map(mut self, overrides: Map<String, Value>) -> Self {
        self.config.extend(overrides);
        self
    }

    pub fn field(mut self, field: ModelField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn variant(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variants.insert(name.into(), value.into());
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

    /// Key the asset reports for itself when registered without one.
    pub fn registry_key(mut self, key: impl Into<String>) -> Self {
        self.registry_key = Some(key.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc_text(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn members(&self) -> &IndexMap<String, ShellMember> {
        &self.members
    }

    pub fn config_overrides(&self) -> &Map<String, Value> {
        &self.config
    }

    pub fn fields(&self) -> &[ModelField] {
        &self.fields
    }

    pub fn variants(&self) -> &IndexMap<String, Value> {
        &self.variants
    }

    pub fn declared_tags(&self) -> &[String] {
        &self.tags
    }

    pub fn declared_registry_key(&self) -> Option<&str> {
        self.registry_key.as_deref()
    }
}

impl fmt::Debug for AssetShell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetShell")
            .field("name", &self.name)
            .field("members", &self.members.keys().collect::<Vec<_>>())
            .field("fields", &self.fields.iter().map(|f| &f.name).collect::<Vec<_>>())
            .field("variants", &self.variants.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl From<&str> for AssetShell {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for AssetShell {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}
