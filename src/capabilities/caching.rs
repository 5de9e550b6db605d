//! Caching capability.
//!
//! In-memory result cache keyed by `"{namespace}-{input}"`. The validation
//! adapter uses the `validate` namespace to memoize accepted inputs.
//!
//! The cache is bounded: once `capacity` entries are held, each insert of a
//! new key evicts the oldest one.

use std::any::Any;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

use super::{Capability, CapabilityName, Invocation};
use crate::config::DEFAULT_CACHE_CAPACITY;
use crate::errors::Result;

/// Namespace the validation adapter stores accepted inputs under.
pub const VALIDATION_NAMESPACE: &str = "validate";

#[derive(Debug, Clone)]
pub struct CachingCapability {
    /// Keyed by "{namespace}-{input}", oldest first.
    cache: Arc<RwLock<IndexMap<String, Value>>>,
    capacity: usize,
}

impl Default for CachingCapability {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

fn cache_key(namespace: &str, input: &str) -> String {
    format!("{}-{}", namespace, input)
}

/// Canonical string form of an input value.
pub fn input_key(value: &Value) -> String {
    value.to_string()
}

impl CachingCapability {
    pub const MEMBERS: &'static [&'static str] =
        &["cache_get", "cache_put", "cache_clear", "cache_size"];

    /// A cache holding at most [`DEFAULT_CACHE_CAPACITY`] entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache holding at most `capacity` entries (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: Arc::new(RwLock::new(IndexMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store `output` for `input` under `namespace`.
    ///
    /// Re-adding an existing key replaces its value in place. A new key
    /// evicts the oldest entry once the cache is full.
    pub fn add(&self, namespace: &str, input: &str, output: Value) {
        let key = cache_key(namespace, input);
        let mut cache = self.cache.write();
        if let Some(slot) = cache.get_mut(&key) {
            *slot = output;
            return;
        }
        while cache.len() >= self.capacity {
            if let Some((evicted, _)) = cache.shift_remove_index(0) {
                log::trace!("[cache] evicting '{}'", evicted);
            }
        }
        cache.insert(key, output);
    }

    /// Cached output for `input` under `namespace`, if present.
    pub fn read(&self, namespace: &str, input: &str) -> Option<Value> {
        self.cache.read().get(&cache_key(namespace, input)).cloned()
    }

    pub fn clear(&self) {
        self.cache.write().clear();
    }

    /// Drop every entry stored under `namespace`.
    pub fn clear_namespace(&self, namespace: &str) -> usize {
        let prefix = format!("{}-", namespace);
        let mut cache = self.cache.write();
        let before = cache.len();
        cache.retain(|key, _| !key.starts_with(&prefix));
        before - cache.len()
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Capability for CachingCapability {
    fn name(&self) -> CapabilityName {
        CapabilityName::Caching
    }

    fn members(&self) -> &'static [&'static str] {
        Self::MEMBERS
    }

    fn invoke(&self, call: &Invocation<'_>) -> Result<Value> {
        match call.member {
            "cache_get" => Ok(self
                .read(call.str_arg(0)?, &input_key(call.arg(1)?))
                .unwrap_or(Value::Null)),
            "cache_put" => {
                self.add(call.str_arg(0)?, &input_key(call.arg(1)?), call.arg(2)?.clone());
                Ok(Value::Null)
            }
            "cache_clear" => {
                self.clear();
                Ok(Value::Null)
            }
            "cache_size" => Ok(Value::from(self.len())),
            _ => Err(call.unsupported()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_and_read() {
        let cache = CachingCapability::new();
        cache.add("validate", "\"a@b.com\"", json!("a@b.com"));
        assert_eq!(cache.read("validate", "\"a@b.com\""), Some(json!("a@b.com")));
        assert_eq!(cache.read("validate", "missing"), None);
        assert_eq!(cache.read("other", "\"a@b.com\""), None);
    }

    #[test]
    fn test_capacity_evicts_oldest_first() {
        let cache = CachingCapability::with_capacity(3);
        for i in 0..10 {
            cache.add("validate", &i.to_string(), Value::from(i));
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.read("validate", "6"), None);
        assert_eq!(cache.read("validate", "9"), Some(json!(9)));

        cache.add("validate", "7", json!("seven"));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.read("validate", "7"), Some(json!("seven")));
        assert_eq!(CachingCapability::with_capacity(0).capacity(), 1);
    }

    #[test]
    fn test_clear_namespace_keeps_others() {
        let cache = CachingCapability::new();
        cache.add("validate", "a", json!(1));
        cache.add("validate", "b", json!(2));
        cache.add("lookup", "a", json!(3));
        assert_eq!(cache.clear_namespace("validate"), 2);
        assert_eq!(cache.read("lookup", "a"), Some(json!(3)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_members() {
        let cache = CachingCapability::new();
        let args = [json!("lookup"), json!({"id": 1}), json!("hit")];
        cache
            .invoke(&Invocation::new("User", "cache_put", None, &args))
            .unwrap();
        let got = cache
            .invoke(&Invocation::new("User", "cache_get", None, &args[..2]))
            .unwrap();
        assert_eq!(got, json!("hit"));

        cache
            .invoke(&Invocation::new("User", "cache_clear", None, &[]))
            .unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_shared_across_threads() {
        use std::thread;

        let cache = CachingCapability::new();
        let writer_cache = cache.clone();
        let writer = thread::spawn(move || {
            for i in 0..50 {
                writer_cache.add("n", &i.to_string(), Value::from(i));
            }
        });
        let reader_cache = cache.clone();
        let reader = thread::spawn(move || {
            for i in 0..50 {
                let _ = reader_cache.read("n", &i.to_string());
            }
        });
        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(cache.len(), 50);
    }
}
