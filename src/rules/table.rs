//! Rule table: `RuleKey -> Rule | RuleFactory`.
//!
//! The table is filled from a static list of [`RuleModule`] loaders. Loading
//! happens once, on the first lookup miss, and registers:
//!
//! 1. every rule declared in a module, under its `register_as` key or, when
//!    it has none, under every leaf key sharing its name;
//! 2. every factory whose name matches a leaf of either key tree.
//!
//! Existing bindings are never overwritten.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use tokio::sync::{OnceCell, RwLock};

use super::entry::RuleEntry;
use super::key::{keys_for_leaf, RuleGroup, RuleKey};
use super::rule::{Rule, RuleArgs};
use crate::errors::{AssetError, Result};

/// Builds a rule from call arguments.
pub type RuleFactoryFn = Arc<dyn Fn(&RuleArgs) -> Result<RuleEntry> + Send + Sync>;

/// A parameterized rule: a plain callable that must produce a concrete rule.
#[derive(Clone)]
pub struct RuleFactory {
    name: String,
    build: RuleFactoryFn,
}

impl RuleFactory {
    pub fn new<F>(name: impl Into<String>, build: F) -> Self
    where
        F: Fn(&RuleArgs) -> Result<RuleEntry> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            build: Arc::new(build),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, args: &RuleArgs) -> Result<RuleEntry> {
        (self.build)(args)
    }
}

impl fmt::Debug for RuleFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleFactory({})", self.name)
    }
}

/// What a key is bound to.
#[derive(Debug, Clone)]
pub enum RuleBinding {
    Rule(Rule),
    Factory(RuleFactory),
}

impl From<Rule> for RuleBinding {
    fn from(rule: Rule) -> Self {
        Self::Rule(rule)
    }
}

impl From<RuleFactory> for RuleBinding {
    fn from(factory: RuleFactory) -> Self {
        Self::Factory(factory)
    }
}

/// One unit of rule implementations.
#[derive(Debug, Clone)]
pub struct RuleModule {
    pub name: String,
    pub group: RuleGroup,
    /// Rules built with the declaring entry points.
    pub rules: Vec<Rule>,
    /// Plain callables, matched against key leaf names.
    pub factories: Vec<RuleFactory>,
}

impl RuleModule {
    pub fn new(name: impl Into<String>, group: RuleGroup) -> Self {
        Self {
            name: name.into(),
            group,
            rules: Vec::new(),
            factories: Vec::new(),
        }
    }

    pub fn rule(mut self, rule: impl Into<Rule>) -> Self {
        self.rules.push(rule.into());
        self
    }

    pub fn factory(mut self, factory: RuleFactory) -> Self {
        self.factories.push(factory);
        self
    }
}

/// Produces a module when the catalogue loads.
pub type ModuleLoader = fn() -> RuleModule;

static GLOBAL_RULE_TABLE: Lazy<Arc<RuleTable>> =
    Lazy::new(|| Arc::new(RuleTable::with_modules(super::builtin::modules())));

/// Process-wide mapping from rule keys to rules or factories.
pub struct RuleTable {
    bindings: RwLock<HashMap<RuleKey, RuleBinding>>,
    modules: Vec<ModuleLoader>,
    loaded: OnceCell<usize>,
    load_runs: AtomicUsize,
}

impl fmt::Debug for RuleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleTable")
            .field("modules", &self.modules.len())
            .field("loaded", &self.loaded.initialized())
            .finish()
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::with_modules(Vec::new())
    }
}

impl RuleTable {
    /// Empty table with no catalogue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table backed by the given module loaders.
    pub fn with_modules(modules: Vec<ModuleLoader>) -> Self {
        Self {
            bindings: RwLock::new(HashMap::new()),
            modules,
            loaded: OnceCell::new(),
            load_runs: AtomicUsize::new(0),
        }
    }

    /// The process-wide table backed by the built-in catalogue.
    pub fn global() -> Arc<RuleTable> {
        GLOBAL_RULE_TABLE.clone()
    }

    /// Bind `key` unless it is already bound. Returns whether it was inserted.
    pub async fn register(&self, key: RuleKey, binding: impl Into<RuleBinding>) -> bool {
        let mut bindings = self.bindings.write().await;
        if bindings.contains_key(&key) {
            return false;
        }
        bindings.insert(key, binding.into());
        true
    }

    pub async fn lookup(&self, key: &RuleKey) -> Option<RuleBinding> {
        self.bindings.read().await.get(key).cloned()
    }

    pub async fn is_registered(&self, key: &RuleKey) -> bool {
        self.bindings.read().await.contains_key(key)
    }

    /// All bound keys, sorted.
    pub async fn registered_keys(&self) -> Vec<RuleKey> {
        let mut keys: Vec<RuleKey> = self.bindings.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Load the catalogue if that has not happened yet. Returns the number of
    /// bindings the load inserted.
    pub async fn ensure_loaded(&self) -> usize {
        *self.loaded.get_or_init(|| self.load_modules()).await
    }

    /// How many times the catalogue load actually ran.
    pub fn load_runs(&self) -> usize {
        self.load_runs.load(Ordering::SeqCst)
    }

    async fn load_modules(&self) -> usize {
        self.load_runs.fetch_add(1, Ordering::SeqCst);
        let mut inserted = 0;

        for loader in &self.modules {
            let module = loader();
            log::debug!(
                "[rule table] loading module '{}' ({:?}): {} rules, {} factories",
                module.name,
                module.group,
                module.rules.len(),
                module.factories.len()
            );

            for rule in module.rules {
                let targets = match rule.registered_as() {
                    Some(key) => vec![key.clone()],
                    None => keys_for_leaf(rule.name()),
                };
                if targets.is_empty() {
                    log::debug!(
                        "[rule table] rule '{}' in '{}' matches no key, skipping",
                        rule.name(),
                        module.name
                    );
                }
                for key in targets {
                    if self.register(key, rule.clone()).await {
                        inserted += 1;
                    }
                }
            }

            for factory in module.factories {
                for key in keys_for_leaf(factory.name()) {
                    if self.register(key, factory.clone()).await {
                        inserted += 1;
                    }
                }
            }
        }

        log::debug!("[rule table] catalogue loaded, {} bindings inserted", inserted);
        inserted
    }

    /// Resolve `key` to a usable rule.
    ///
    /// Factories are invoked with `args` and must return a concrete rule;
    /// concrete rules reject any arguments.
    pub async fn resolve(&self, key: &RuleKey, args: RuleArgs) -> Result<Rule> {
        let binding = match self.lookup(key).await {
            Some(binding) => binding,
            None => {
                self.ensure_loaded().await;
                self.lookup(key)
                    .await
                    .ok_or_else(|| AssetError::RuleNotRegistered {
                        key: key.to_string(),
                    })?
            }
        };

        match binding {
            RuleBinding::Factory(factory) => match factory.invoke(&args)? {
                RuleEntry::Rule(rule) => Ok(rule),
                other => Err(AssetError::RuleFactoryContractViolation {
                    key: key.to_string(),
                    returned: other.describe(),
                }),
            },
            RuleBinding::Rule(rule) => {
                if args.is_empty() {
                    Ok(rule)
                } else {
                    Err(AssetError::RuleNotConfigurable {
                        key: key.to_string(),
                    })
                }
            }
        }
    }
}
