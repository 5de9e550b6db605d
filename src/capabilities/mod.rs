//! # Capabilities
//!
//! Independently implemented behavior units that the asset factory composes
//! into an [`EnhancedAsset`](crate::asset::EnhancedAsset).
//!
//! ## Dispatch
//!
//! An asset holds one boxed [`Capability`] per applied [`CapabilityName`] in a
//! [`CapabilityTable`]. A member call is resolved explicitly: shell members
//! first, then the capabilities in applied order. The first capability whose
//! [`Capability::members`] lists the name answers the call.

pub mod caching;
pub mod comparison;
pub mod documentation;
pub mod metadata;
pub mod operations;
pub mod rules;
pub mod tagging;
pub mod tier;

use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{AssetError, Result};

pub use caching::CachingCapability;
pub use comparison::{compare_values, ComparisonCapability};
pub use documentation::DocumentationCapability;
pub use metadata::{AssetMetadata, MetadataCapability, PerformanceFlags};
pub use operations::{
    ArithmeticCapability, CastingCapability, ContainerCapability, DateTimeCapability,
    PathCapability, TimeDeltaCapability,
};
pub use rules::RulesCapability;
pub use tagging::TaggingCapability;
pub use tier::{CapabilityResolver, ConformanceChecker, ProtocolTier, TableConformance, TierResolver};

// ---------------------------------------------------------------------------
// CapabilityName
// ---------------------------------------------------------------------------

/// Fixed catalogue of capability identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CapabilityName {
    Metadata,
    Tagging,
    Rules,
    Caching,
    Comparison,
    Documentation,
    Arithmetic,
    Container,
    Casting,
    PathLike,
    DateTimeLike,
    TimeDeltaLike,
}

impl CapabilityName {
    pub const ALL: [CapabilityName; 12] = [
        Self::Metadata,
        Self::Tagging,
        Self::Rules,
        Self::Caching,
        Self::Comparison,
        Self::Documentation,
        Self::Arithmetic,
        Self::Container,
        Self::Casting,
        Self::PathLike,
        Self::DateTimeLike,
        Self::TimeDeltaLike,
    ];

    /// Capabilities every asset carries, in the order they are appended.
    pub const CORE: [CapabilityName; 5] = [
        Self::Metadata,
        Self::Documentation,
        Self::Comparison,
        Self::Tagging,
        Self::Rules,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metadata => "Metadata",
            Self::Tagging => "Tagging",
            Self::Rules => "Rules",
            Self::Caching => "Caching",
            Self::Comparison => "Comparison",
            Self::Documentation => "Documentation",
            Self::Arithmetic => "Arithmetic",
            Self::Container => "Container",
            Self::Casting => "Casting",
            Self::PathLike => "PathLike",
            Self::DateTimeLike => "DateTimeLike",
            Self::TimeDeltaLike => "TimeDeltaLike",
        }
    }

    /// Operator families switched on by operation toggles.
    pub fn is_operation(&self) -> bool {
        matches!(
            self,
            Self::Arithmetic
                | Self::Container
                | Self::Casting
                | Self::PathLike
                | Self::DateTimeLike
                | Self::TimeDeltaLike
        )
    }

    pub fn is_core(&self) -> bool {
        Self::CORE.contains(self)
    }
}

impl fmt::Display for CapabilityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown capability '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Invocation / Capability
// ---------------------------------------------------------------------------

/// A member call routed to a shell member or a capability.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// Name of the asset being called.
    pub asset: &'a str,
    /// Member name.
    pub member: &'a str,
    /// Instance value for instance-level calls, `None` for asset-level calls.
    pub receiver: Option<&'a Value>,
    pub args: &'a [Value],
}

impl<'a> Invocation<'a> {
    pub fn new(asset: &'a str, member: &'a str, receiver: Option<&'a Value>, args: &'a [Value]) -> Self {
        Self {
            asset,
            member,
            receiver,
            args,
        }
    }

    /// The instance value; fails for asset-level calls.
    pub fn receiver(&self) -> Result<&'a Value> {
        self.receiver
            .ok_or_else(|| AssetError::operation(self.member, "requires an instance value"))
    }

    pub fn arg(&self, index: usize) -> Result<&'a Value> {
        self.args.get(index).ok_or_else(|| {
            AssetError::operation(self.member, format!("missing argument {}", index + 1))
        })
    }

    pub fn str_arg(&self, index: usize) -> Result<&'a str> {
        self.arg(index)?
            .as_str()
            .ok_or_else(|| AssetError::operation(self.member, format!("argument {} must be a string", index + 1)))
    }

    /// String arguments, accepting either one array argument or varargs.
    pub fn string_list(&self) -> Vec<String> {
        let values: Vec<&Value> = match self.args {
            [Value::Array(items)] => items.iter().collect(),
            other => other.iter().collect(),
        };
        values
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    pub fn unsupported(&self) -> AssetError {
        AssetError::UnsupportedOperation {
            asset: self.asset.to_string(),
            member: self.member.to_string(),
        }
    }
}

/// One named behavior unit.
pub trait Capability: Send + Sync + fmt::Debug {
    fn name(&self) -> CapabilityName;

    /// Member names this capability answers.
    fn members(&self) -> &'static [&'static str];

    fn invoke(&self, call: &Invocation<'_>) -> Result<Value>;

    fn as_any(&self) -> &dyn Any;

    fn provides(&self, member: &str) -> bool {
        self.members().contains(&member)
    }
}

// ---------------------------------------------------------------------------
// CapabilityTable
// ---------------------------------------------------------------------------

/// Applied capabilities, in applied order.
#[derive(Debug, Clone, Default)]
pub struct CapabilityTable {
    entries: IndexMap<CapabilityName, Arc<dyn Capability>>,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a capability. An existing entry with the same name is kept.
    pub fn insert(&mut self, capability: Arc<dyn Capability>) -> bool {
        let name = capability.name();
        if self.entries.contains_key(&name) {
            return false;
        }
        self.entries.insert(name, capability);
        true
    }

    pub fn get(&self, name: CapabilityName) -> Option<&Arc<dyn Capability>> {
        self.entries.get(&name)
    }

    /// Concrete implementation of `name`, if applied.
    pub fn downcast<T: Capability + 'static>(&self, name: CapabilityName) -> Option<&T> {
        self.entries
            .get(&name)
            .and_then(|c| c.as_any().downcast_ref::<T>())
    }

    pub fn contains(&self, name: CapabilityName) -> bool {
        self.entries.contains_key(&name)
    }

    pub fn names(&self) -> Vec<CapabilityName> {
        self.entries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Capability>> {
        self.entries.values()
    }

    /// First capability, in applied order, that answers `member`.
    pub fn find_member(&self, member: &str) -> Option<CapabilityName> {
        self.entries
            .values()
            .find(|c| c.provides(member))
            .map(|c| c.name())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_names_round_trip_through_strings() {
        for name in CapabilityName::ALL {
            assert_eq!(name.as_str().parse::<CapabilityName>().unwrap(), name);
        }
        assert_eq!("pathlike".parse::<CapabilityName>().unwrap(), CapabilityName::PathLike);
        assert!("Flying".parse::<CapabilityName>().is_err());
    }

    #[test]
    fn test_core_and_operation_partition() {
        let ops: Vec<_> = CapabilityName::ALL.iter().filter(|c| c.is_operation()).collect();
        assert_eq!(ops.len(), 6);
        assert!(CapabilityName::CORE.iter().all(|c| !c.is_operation()));
        assert!(!CapabilityName::Caching.is_core());
    }

    #[test]
    fn test_table_dispatch_uses_applied_order() {
        let mut table = CapabilityTable::new();
        table.insert(Arc::new(ArithmeticCapability));
        table.insert(Arc::new(CastingCapability));
        assert!(!table.insert(Arc::new(ArithmeticCapability)));
        assert_eq!(table.names(), vec![CapabilityName::Arithmetic, CapabilityName::Casting]);
        assert_eq!(table.find_member("add"), Some(CapabilityName::Arithmetic));
        assert_eq!(table.find_member("to_string"), Some(CapabilityName::Casting));
        assert_eq!(table.find_member("fly"), None);
        assert!(table.downcast::<CastingCapability>(CapabilityName::Casting).is_some());
    }

    #[test]
    fn test_invocation_string_list_accepts_both_shapes() {
        let varargs = [json!("a"), json!("b")];
        let call = Invocation::new("X", "add_tags", None, &varargs);
        assert_eq!(call.string_list(), vec!["a", "b"]);

        let array = [json!(["c", "d"])];
        let call = Invocation::new("X", "add_tags", None, &array);
        assert_eq!(call.string_list(), vec!["c", "d"]);
        assert!(call.receiver().is_err());
    }
}
