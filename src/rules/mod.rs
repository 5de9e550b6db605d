//! # Rules
//!
//! Validators and normalizers, the hierarchical key namespace that names
//! them, the table that resolves keys, and the pipeline that classifies a
//! declaration's rule list.
//!
//! ## Resolution Flow
//!
//! 1. A declaration names `keys::valid::string::IS_EMAIL`
//! 2. `RuleTable::resolve` looks the key up, loading the catalogue on first miss
//! 3. Factories are invoked with the call arguments; plain rules are returned as-is
//! 4. `pipeline::process` splits the declaration's list into normalizers and validators

pub mod builtin;
pub mod entry;
pub mod key;
pub mod pipeline;
pub mod rule;
pub mod table;

pub use entry::{Asyncness, ReturnHint, RuleEntry, RuleFunction, RuleProtocol, SkipMarker};
pub use key::{keys, leaf_keys, KeyNode, RuleGroup, RuleKey};
pub use pipeline::{process, ProcessedRules, RejectedEntry, RejectionReason, RuleSet};
pub use rule::{
    build_normalizer, build_validator, Normalizer, Rule, RuleArgs, RuleContext, RuleKind,
    RuleMetadata, Validator,
};
pub use table::{ModuleLoader, RuleBinding, RuleFactory, RuleModule, RuleTable};
