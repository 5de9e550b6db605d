//! Error types for asset composition, rule resolution and the type registry.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::CapabilityName;

/// A single failed rule, reported against the field it ran on.
///
/// Wrapped-value assets report under the field name `root`; model assets
/// report under each declared field name, or `__model__` for model-level rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFailure {
    /// Field the rule ran against.
    pub field: String,
    /// Name of the failing rule (or `type` for a type mismatch).
    pub rule: String,
    /// Formatted error message.
    pub message: String,
}

impl FieldFailure {
    pub fn new(
        field: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            rule: rule.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.field, self.rule, self.message)
    }
}

fn render_failures(failures: &[FieldFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn render_capabilities(capabilities: &[CapabilityName]) -> String {
    capabilities
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised by the composition engine.
#[derive(Debug, Error)]
pub enum AssetError {
    /// Capability application failed; nothing partial is returned.
    #[error(
        "Failed to compose asset '{shell}' with capabilities [{}]: {source}",
        render_capabilities(.capabilities)
    )]
    Composition {
        shell: String,
        capabilities: Vec<CapabilityName>,
        #[source]
        source: Box<AssetError>,
    },

    /// A registry key is already bound to a different asset.
    #[error("Registry key '{key}' is already bound to '{existing}', cannot bind '{attempted}'")]
    KeyConflict {
        key: String,
        existing: String,
        attempted: String,
    },

    /// The rule key resolved to nothing after the catalogue load.
    #[error("Rule key '{key}' is not registered")]
    RuleNotRegistered { key: String },

    /// A rule factory returned something other than a concrete rule.
    #[error("Rule factory for '{key}' returned {returned}, expected a validator or normalizer")]
    RuleFactoryContractViolation { key: String, returned: String },

    /// Arguments were passed to a rule that takes none.
    #[error("Rule '{key}' is not configurable and does not accept arguments")]
    RuleNotConfigurable { key: String },

    /// One or more validators rejected a value.
    #[error("Validation failed for '{asset}': {}", render_failures(.failures))]
    ValidationFailed {
        asset: String,
        failures: Vec<FieldFailure>,
    },

    /// The path is not a leaf of the rule key tree.
    #[error("Unknown rule key path '{path}'")]
    UnknownRuleKey { path: String },

    /// A rule factory rejected its arguments.
    #[error("Invalid arguments for rule '{rule}': {message}")]
    InvalidRuleArguments { rule: String, message: String },

    /// A normalizer body failed.
    #[error("Rule '{rule}' failed: {message}")]
    RuleExecution { rule: String, message: String },

    /// No shell member or capability provides the member.
    #[error("Asset '{asset}' does not support '{member}'")]
    UnsupportedOperation { asset: String, member: String },

    /// A member was found but could not be applied to its arguments.
    #[error("Operation '{member}' failed: {message}")]
    OperationFailed { member: String, message: String },

    /// No enum member has the given name or value.
    #[error("'{member}' is not a member of enum '{asset}'")]
    UnknownEnumMember { asset: String, member: String },

    /// Dropped pipeline entries under strict rule handling.
    #[error("Rejected rule entries: {}", .entries.join(", "))]
    RejectedRules { entries: Vec<String> },

    /// The declaration-site runtime bridge failed.
    #[error("Runtime bridge error: {message}")]
    Bridge { message: String },

    /// Settings file could not be read or parsed.
    #[error("Settings error: {message}")]
    Settings { message: String },
}

impl AssetError {
    /// Wrap a failure raised during capability application.
    pub fn composition(
        shell: impl Into<String>,
        capabilities: Vec<CapabilityName>,
        source: AssetError,
    ) -> Self {
        Self::Composition {
            shell: shell.into(),
            capabilities,
            source: Box::new(source),
        }
    }

    pub fn operation(member: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OperationFailed {
            member: member.into(),
            message: message.into(),
        }
    }

    /// Innermost error, unwrapping composition layers.
    pub fn root(&self) -> &AssetError {
        match self {
            Self::Composition { source, .. } => source.root(),
            other => other,
        }
    }

    /// Failures carried by a validation error, if this is one.
    pub fn failures(&self) -> &[FieldFailure] {
        match self.root() {
            Self::ValidationFailed { failures, .. } => failures,
            _ => &[],
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = AssetError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composition_message_lists_capabilities() {
        let err = AssetError::composition(
            "Email",
            vec![CapabilityName::Metadata, CapabilityName::Tagging],
            AssetError::RuleNotRegistered {
                key: "VALID.STRING.is_email".into(),
            },
        );
        let msg = err.to_string();
        assert!(msg.contains("'Email'"));
        assert!(msg.contains("Metadata, Tagging"));
        assert!(matches!(err.root(), AssetError::RuleNotRegistered { .. }));
    }

    #[test]
    fn test_validation_failures_are_reachable_through_composition() {
        let inner = AssetError::ValidationFailed {
            asset: "Port".into(),
            failures: vec![FieldFailure::new("root", "is_positive", "-1 is not positive")],
        };
        let err = AssetError::composition("Port", vec![], inner);
        assert_eq!(err.failures().len(), 1);
        assert_eq!(err.failures()[0].rule, "is_positive");
    }
}
