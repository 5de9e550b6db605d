//! Rules capability: owns a declaration's rule list and its memoized
//! pipeline output.

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;

use super::{Capability, CapabilityName, Invocation};
use crate::errors::{AssetError, Result};
use crate::rules::{ProcessedRules, RuleEntry, RuleSet};

#[derive(Debug, Default)]
pub struct RulesCapability {
    set: Arc<RuleSet>,
}

impl RulesCapability {
    pub const MEMBERS: &'static [&'static str] = &[
        "rules",
        "rule_count",
        "has_rules",
        "normalizers",
        "validators",
        "rejected_rules",
    ];

    pub fn new(entries: Vec<RuleEntry>) -> Self {
        Self {
            set: Arc::new(RuleSet::new(entries)),
        }
    }

    /// Shared handle to the rule list.
    pub fn rule_set(&self) -> Arc<RuleSet> {
        self.set.clone()
    }

    pub fn entries(&self) -> Vec<RuleEntry> {
        self.set.entries()
    }

    pub fn processed(&self) -> Arc<ProcessedRules> {
        self.set.processed()
    }

    pub fn push(&self, entry: impl Into<RuleEntry>) {
        self.set.push(entry.into());
    }
}

fn names(list: Vec<&str>) -> Value {
    Value::from(list.into_iter().map(str::to_string).collect::<Vec<_>>())
}

impl Capability for RulesCapability {
    fn name(&self) -> CapabilityName {
        CapabilityName::Rules
    }

    fn members(&self) -> &'static [&'static str] {
        Self::MEMBERS
    }

    fn invoke(&self, call: &Invocation<'_>) -> Result<Value> {
        let processed = self.processed();
        match call.member {
            "rules" => Ok(names(processed.ordered_names())),
            "rule_count" => Ok(Value::from(processed.len())),
            "has_rules" => Ok(Value::Bool(!processed.is_empty())),
            "normalizers" => Ok(names(processed.normalizer_names())),
            "validators" => Ok(names(processed.validator_names())),
            "rejected_rules" => serde_json::to_value(&processed.rejected)
                .map_err(|e| AssetError::operation(call.member, e.to_string())),
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
    use crate::rules::{build_normalizer, build_validator, RuleContext, SkipMarker};
    use serde_json::json;

    #[test]
    fn test_members_reflect_pipeline_output() {
        let rules = RulesCapability::new(vec![
            build_validator()
                .build_blocking("non_empty", |v: &Value, _c: &RuleContext| v != &json!(""))
                .into(),
            SkipMarker::Disabled.into(),
            build_normalizer()
                .build_blocking("trim", |v: Value, _c: &RuleContext| Ok(v))
                .into(),
        ]);
        let call = Invocation::new("Name", "rules", None, &[]);
        assert_eq!(rules.invoke(&call).unwrap(), json!(["trim", "non_empty"]));

        rules.push(RuleEntry::Unrecognized("42".into()));
        let call = Invocation::new("Name", "rejected_rules", None, &[]);
        let rejected = rules.invoke(&call).unwrap();
        assert_eq!(rejected[0]["reason"], json!("unrecognized_entry"));
        assert_eq!(rejected[0]["position"], json!(3));
    }
}
