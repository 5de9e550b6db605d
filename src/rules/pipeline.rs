//! Rule processing pipeline.
//!
//! Classifies an ordered rule list into normalizers and validators. The
//! classification never fails: entries it cannot use are dropped and
//! recorded as [`RejectedEntry`] diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;

use super::entry::{is_truthy, ReturnHint, RuleEntry, RuleFunction, RuleProtocol};
use super::rule::{
    normalizer_from_body, validator_from_body, Normalizer, NormalizerBody, Rule, RuleKind,
    Validator, ValidatorBody,
};

/// Why an entry was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Satisfies the rule contract but is not asynchronous.
    SynchronousCallable,
    /// Not a rule, skip marker or recognizable callable.
    UnrecognizedEntry,
}

/// A dropped entry and its position in the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedEntry {
    pub position: usize,
    pub description: String,
    pub reason: RejectionReason,
}

/// Pipeline output. Each list keeps the input's relative order.
#[derive(Debug, Clone, Default)]
pub struct ProcessedRules {
    pub normalizers: Vec<Arc<Normalizer>>,
    pub validators: Vec<Arc<Validator>>,
    pub rejected: Vec<RejectedEntry>,
}

impl ProcessedRules {
    pub fn is_empty(&self) -> bool {
        self.normalizers.is_empty() && self.validators.is_empty()
    }

    pub fn len(&self) -> usize {
        self.normalizers.len() + self.validators.len()
    }

    pub fn normalizer_names(&self) -> Vec<&str> {
        self.normalizers.iter().map(|n| n.name()).collect()
    }

    pub fn validator_names(&self) -> Vec<&str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    /// Applied order: normalizers first, then validators.
    pub fn ordered_names(&self) -> Vec<&str> {
        let mut names = self.normalizer_names();
        names.extend(self.validator_names());
        names
    }
}

/// Classify `entries` into `(normalizers, validators)`.
pub fn process(entries: &[RuleEntry]) -> ProcessedRules {
    let mut out = ProcessedRules::default();

    for (position, entry) in entries.iter().enumerate() {
        match entry {
            RuleEntry::Skip(_) => {}
            RuleEntry::Rule(Rule::Normalizer(n)) => out.normalizers.push(n.clone()),
            RuleEntry::Rule(Rule::Validator(v)) => out.validators.push(v.clone()),
            RuleEntry::Conforming(obj) => {
                if obj.asyncness().is_async() {
                    match obj.role() {
                        RuleKind::Validator => out.validators.push(wrap_conforming_validator(obj)),
                        RuleKind::Normalizer => {
                            out.normalizers.push(wrap_conforming_normalizer(obj))
                        }
                    }
                } else {
                    reject(&mut out, position, entry, RejectionReason::SynchronousCallable);
                }
            }
            RuleEntry::Function(RuleFunction::Async {
                name,
                returns,
                body,
            }) => match returns {
                ReturnHint::Boolean | ReturnHint::Untyped => {
                    let body = body.clone();
                    let wrapped: ValidatorBody = Arc::new(move |value, ctx| {
                        let fut = body(value, ctx);
                        async move { fut.await.map(|v| is_truthy(&v)).unwrap_or(false) }.boxed()
                    });
                    out.validators
                        .push(Arc::new(validator_from_body(name.clone(), wrapped, None)));
                }
                ReturnHint::Typed(_) => {
                    let body = body.clone();
                    let wrapped: NormalizerBody = Arc::new(move |value, ctx| body(value, ctx));
                    out.normalizers
                        .push(Arc::new(normalizer_from_body(name.clone(), wrapped)));
                }
            },
            RuleEntry::Function(RuleFunction::Sync { .. }) => {
                reject(&mut out, position, entry, RejectionReason::SynchronousCallable);
            }
            RuleEntry::Unrecognized(_) => {
                reject(&mut out, position, entry, RejectionReason::UnrecognizedEntry);
            }
        }
    }

    out
}

fn reject(out: &mut ProcessedRules, position: usize, entry: &RuleEntry, reason: RejectionReason) {
    let description = entry.describe();
    log::warn!(
        "[rule pipeline] dropping {} at position {}: {:?}",
        description,
        position,
        reason
    );
    out.rejected.push(RejectedEntry {
        position,
        description,
        reason,
    });
}

fn wrap_conforming_validator(obj: &Arc<dyn RuleProtocol>) -> Arc<Validator> {
    let target = obj.clone();
    let body: ValidatorBody = Arc::new(move |value, ctx| {
        let target = target.clone();
        async move {
            target
                .call(value, ctx)
                .await
                .map(|v| is_truthy(&v))
                .unwrap_or(false)
        }
        .boxed()
    });
    Arc::new(validator_from_body(
        obj.name().to_string(),
        body,
        obj.error_template().map(str::to_string),
    ))
}

fn wrap_conforming_normalizer(obj: &Arc<dyn RuleProtocol>) -> Arc<Normalizer> {
    let target = obj.clone();
    let body: NormalizerBody = Arc::new(move |value, ctx| {
        let target = target.clone();
        async move { target.call(value, ctx).await }.boxed()
    });
    Arc::new(normalizer_from_body(obj.name().to_string(), body))
}

// ---------------------------------------------------------------------------
// RuleSet – memoized pipeline output for one declaration
// ---------------------------------------------------------------------------

/// A declaration's rule list together with its cached pipeline output.
///
/// The cache is dropped whenever the list changes.
#[derive(Debug, Default)]
pub struct RuleSet {
    entries: RwLock<Vec<RuleEntry>>,
    processed: RwLock<Option<Arc<ProcessedRules>>>,
    revision: AtomicU64,
}

impl RuleSet {
    pub fn new(entries: Vec<RuleEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
            processed: RwLock::new(None),
            revision: AtomicU64::new(0),
        }
    }

    pub fn entries(&self) -> Vec<RuleEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Replace the whole list.
    pub fn set(&self, entries: Vec<RuleEntry>) {
        *self.entries.write() = entries;
        self.invalidate();
    }

    /// Append one entry.
    pub fn push(&self, entry: RuleEntry) {
        self.entries.write().push(entry);
        self.invalidate();
    }

    /// Whether a pipeline result is currently cached.
    pub fn is_cached(&self) -> bool {
        self.processed.read().is_some()
    }

    /// Pipeline output, computed at most once per list revision.
    pub fn processed(&self) -> Arc<ProcessedRules> {
        if let Some(cached) = self.processed.read().as_ref() {
            return cached.clone();
        }
        let entries = self.entries.read();
        let mut slot = self.processed.write();
        slot.get_or_insert_with(|| Arc::new(process(&entries)))
            .clone()
    }

    /// Counter bumped on every change to the entry list.
    ///
    /// Memos derived from the rules (validation caches in particular) key on
    /// this so results computed under an older list are never served.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    fn invalidate(&self) {
        *self.processed.write() = None;
        self.revision.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::entry::{Asyncness, SkipMarker};
    use crate::rules::rule::{build_normalizer, build_validator, RuleContext};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    fn v(name: &str) -> RuleEntry {
        build_validator().build(name, |_v, _c| async { true }).into()
    }

    fn n(name: &str) -> RuleEntry {
        build_normalizer().build(name, |v, _c| async move { Ok(v) }).into()
    }

    struct Shouty {
        asyncness: Asyncness,
    }

    #[async_trait]
    impl RuleProtocol for Shouty {
        fn name(&self) -> &str {
            "shout"
        }
        fn role(&self) -> RuleKind {
            RuleKind::Normalizer
        }
        fn asyncness(&self) -> Asyncness {
            self.asyncness
        }
        async fn call(&self, value: Value, _ctx: RuleContext) -> Result<Value, String> {
            Ok(json!(value.as_str().unwrap_or_default().to_uppercase()))
        }
    }

    struct Picky {
        asyncness: Asyncness,
    }

    #[async_trait]
    impl RuleProtocol for Picky {
        fn name(&self) -> &str {
            "picky"
        }
        fn role(&self) -> RuleKind {
            RuleKind::Validator
        }
        fn asyncness(&self) -> Asyncness {
            self.asyncness
        }
        fn error_template(&self) -> Option<&str> {
            Some("{value} is not accepted")
        }
        async fn call(&self, value: Value, _ctx: RuleContext) -> Result<Value, String> {
            match value.as_str() {
                Some("boom") => Err("picky exploded".to_string()),
                _ => Ok(value),
            }
        }
    }

    #[tokio::test]
    async fn test_conforming_validators_for_every_asyncness() {
        let ctx = RuleContext::default();
        for asyncness in [
            Asyncness::DeclaredFlag,
            Asyncness::AsyncCallable,
            Asyncness::AsyncCallOperator,
        ] {
            let out = process(&[RuleEntry::Conforming(Arc::new(Picky { asyncness }))]);
            assert_eq!(out.validator_names(), vec!["picky"], "{asyncness:?}");
            assert!(out.normalizers.is_empty());
            assert!(out.rejected.is_empty());

            let validator = &out.validators[0];
            assert_eq!(validator.error_template(), "{value} is not accepted");
            assert!(validator.check(&json!(1), &ctx).await);
            assert!(validator.check(&json!("yes"), &ctx).await);
            assert!(!validator.check(&json!(0), &ctx).await);
            assert!(!validator.check(&json!(""), &ctx).await);
            // An error from the object counts as a failed check.
            assert!(!validator.check(&json!("boom"), &ctx).await);
        }

        let out = process(&[RuleEntry::Conforming(Arc::new(Picky {
            asyncness: Asyncness::Synchronous,
        }))]);
        assert!(out.is_empty());
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.rejected[0].reason, RejectionReason::SynchronousCallable);
    }

    #[test]
    fn test_skip_markers_are_elided_and_order_kept() {
        let entries = vec![
            SkipMarker::Skip.into(),
            v("V1"),
            n("N1"),
            SkipMarker::Disabled.into(),
            v("V2"),
        ];
        let out = process(&entries);
        assert_eq!(out.normalizer_names(), vec!["N1"]);
        assert_eq!(out.validator_names(), vec!["V1", "V2"]);
        assert!(out.rejected.is_empty());
    }

    #[test]
    fn test_all_markers_elided() {
        let entries: Vec<RuleEntry> = [
            SkipMarker::Skip,
            SkipMarker::Disabled,
            SkipMarker::Defer,
            SkipMarker::NoOp,
        ]
        .into_iter()
        .map(Into::into)
        .collect();
        let out = process(&entries);
        assert!(out.is_empty());
        assert!(out.rejected.is_empty());
    }

    #[tokio::test]
    async fn test_conforming_objects_need_asyncness() {
        let entries = vec![
            RuleEntry::Conforming(Arc::new(Shouty {
                asyncness: Asyncness::AsyncCallOperator,
            })),
            RuleEntry::Conforming(Arc::new(Shouty {
                asyncness: Asyncness::Synchronous,
            })),
        ];
        let out = process(&entries);
        assert_eq!(out.normalizer_names(), vec!["shout"]);
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.rejected[0].position, 1);
        assert_eq!(out.rejected[0].reason, RejectionReason::SynchronousCallable);

        let shouted = out.normalizers[0]
            .apply(json!("hi"), &RuleContext::default())
            .await
            .unwrap();
        assert_eq!(shouted, json!("HI"));
    }

    #[tokio::test]
    async fn test_bare_functions_classified_by_return_hint() {
        let check: crate::rules::entry::AsyncRuleFn =
            Arc::new(|value: Value, _ctx: RuleContext| {
                async move { Ok::<Value, String>(json!(value == json!(1))) }.boxed()
            });
        let double: crate::rules::entry::AsyncRuleFn =
            Arc::new(|value: Value, _ctx: RuleContext| {
                async move { Ok::<Value, String>(json!(value.as_i64().unwrap_or(0) * 2)) }.boxed()
            });
        let entries = vec![
            RuleFunction::Async {
                name: "is_one".into(),
                returns: ReturnHint::Boolean,
                body: check.clone(),
            }
            .into(),
            RuleFunction::Async {
                name: "untyped".into(),
                returns: ReturnHint::Untyped,
                body: check,
            }
            .into(),
            RuleFunction::Async {
                name: "double".into(),
                returns: ReturnHint::Typed("int".into()),
                body: double,
            }
            .into(),
            RuleFunction::Sync {
                name: "blocking".into(),
                returns: ReturnHint::Boolean,
                body: Arc::new(|_v: Value, _c: &RuleContext| Ok::<Value, String>(json!(true))),
            }
            .into(),
            RuleEntry::Unrecognized("None".into()),
        ];
        let out = process(&entries);
        assert_eq!(out.validator_names(), vec!["is_one", "untyped"]);
        assert_eq!(out.normalizer_names(), vec!["double"]);
        assert_eq!(out.rejected.len(), 2);
        assert_eq!(out.rejected[1].reason, RejectionReason::UnrecognizedEntry);

        let ctx = RuleContext::default();
        assert!(out.validators[0].check(&json!(1), &ctx).await);
        assert!(!out.validators[0].check(&json!(2), &ctx).await);
        assert_eq!(
            out.normalizers[0].apply(json!(4), &ctx).await.unwrap(),
            json!(8)
        );
    }

    #[test]
    fn test_rule_set_memoizes_until_changed() {
        let set = RuleSet::new(vec![v("a")]);
        assert!(!set.is_cached());
        assert_eq!(set.revision(), 0);
        let first = set.processed();
        let second = set.processed();
        assert!(Arc::ptr_eq(&first, &second));

        set.push(n("b"));
        assert!(!set.is_cached());
        assert_eq!(set.revision(), 1);
        let third = set.processed();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.ordered_names(), vec!["b", "a"]);

        set.set(vec![]);
        assert!(set.processed().is_empty());
    }
}
