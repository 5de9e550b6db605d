//! # asset-forge
//!
//! Capability composition engine for typed assets.
//!
//! A declaration site writes an [`AssetShell`](asset::AssetShell) and hands
//! it to one of the [`builders`]. The [`AssetFactory`](asset::AssetFactory)
//! resolves the capabilities for the requested protocol tier, instantiates
//! one implementation per capability into an explicit dispatch table, and
//! (for wrapped kinds) builds a validated wrapper whose construction path runs
//! the asset's normalizers and validators. Composed assets can be registered
//! in an async, lock-guarded [`TypeRegistry`](registry::TypeRegistry) and
//! queried by kind or hierarchical tag.
//!
//! Rules come from a hierarchical key catalogue (`VALID.*`, `NORM.*`) backed
//! by a process-wide [`RuleTable`](rules::RuleTable).

pub mod asset;
pub mod builders;
pub mod capabilities;
pub mod config;
pub mod errors;
pub mod registry;
pub mod rules;
pub mod runtime;

pub use asset::{
    AssetDescriptor, AssetFactory, AssetInstance, AssetKind, AssetShell, EnhancedAsset, ModelField,
    OperationToggles, ValueType,
};
pub use builders::{build_alias, build_enum, build_model, build_primitive, AssetBuilder};
pub use capabilities::{CapabilityName, ProtocolTier};
pub use config::{AssetConfig, ForgeSettings};
pub use errors::{AssetError, FieldFailure, Result};
pub use registry::{RegistryStats, TypeRegistry};
pub use rules::{build_normalizer, build_validator, keys, Normalizer, Rule, RuleKey, RuleSet, Validator};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
