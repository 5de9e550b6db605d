//! Protocol tiers and the collaborators the factory consults about them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{CapabilityName, CapabilityTable};

/// Ordered capability requirement bundle. Each tier includes the previous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolTier {
    Core,
    Validated,
    Advanced,
}

impl ProtocolTier {
    pub const ALL: [ProtocolTier; 3] = [Self::Core, Self::Validated, Self::Advanced];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Validated => "validated",
            Self::Advanced => "advanced",
        }
    }
}

impl fmt::Display for ProtocolTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown protocol tier '{s}'"))
    }
}

/// Maps a tier to its base capability list.
pub trait CapabilityResolver: Send + Sync {
    fn required(&self, tier: ProtocolTier) -> Vec<CapabilityName>;
}

/// Default resolver: each tier adds to the one below it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TierResolver;

impl CapabilityResolver for TierResolver {
    fn required(&self, tier: ProtocolTier) -> Vec<CapabilityName> {
        use CapabilityName::*;
        let mut caps = vec![Metadata, Documentation];
        if tier >= ProtocolTier::Validated {
            caps.extend([Rules, Comparison]);
        }
        if tier >= ProtocolTier::Advanced {
            caps.push(Tagging);
        }
        caps
    }
}

/// Answers whether a composed capability table satisfies a capability contract.
pub trait ConformanceChecker: Send + Sync {
    fn conforms(&self, table: &CapabilityTable, capability: CapabilityName) -> bool;
}

/// Checks the table for an applied implementation of the capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableConformance;

impl ConformanceChecker for TableConformance {
    fn conforms(&self, table: &CapabilityTable, capability: CapabilityName) -> bool {
        table.contains(capability)
    }
}
