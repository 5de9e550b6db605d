//! # Assets
//!
//! Declarations (shells) and their composition into capability-backed
//! assets.
//!
//! - [`AssetShell`]: the declared name, docs, members, fields and variants
//! - [`AssetDescriptor`]: a shell plus everything the factory is asked to apply
//! - [`AssetFactory`]: resolves and instantiates capabilities
//! - [`EnhancedAsset`]: the result, with explicit member dispatch
//! - [`ValidatedWrapper`]: the value-construction path for wrapped kinds

pub mod descriptor;
pub mod enhanced;
pub mod factory;
pub mod kind;
pub mod shell;
pub mod wrapper;

pub use descriptor::{AssetDescriptor, OperationToggles};
pub use enhanced::{AssetInstance, EnhancedAsset, MemberSource};
pub use factory::AssetFactory;
pub use kind::{AssetKind, ValueType};
pub use shell::{resolve_rules, AssetShell, ModelField, RuleRef, ShellMember};
pub use wrapper::{AnnotatedType, FieldSlot, ValidatedWrapper, ValidationAdapter, MODEL_FIELD, ROOT_FIELD};
