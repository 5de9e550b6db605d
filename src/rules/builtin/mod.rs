//! Built-in rule catalogue.
//!
//! The static registration table the global [`RuleTable`](super::RuleTable)
//! loads on its first miss.

pub mod normalizers;
pub mod validators;

use super::table::ModuleLoader;

/// Validator modules followed by normalizer modules.
pub fn modules() -> Vec<ModuleLoader> {
    vec![
        validators::string_validators,
        validators::numeric_validators,
        validators::path_validators,
        validators::time_validators,
        normalizers::string_normalizers,
        normalizers::cache_normalizers,
        normalizers::time_normalizers,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::key::leaf_keys;
    use crate::rules::table::RuleTable;

    #[tokio::test]
    async fn test_catalogue_covers_every_leaf() {
        let table = RuleTable::with_modules(modules());
        table.ensure_loaded().await;
        let registered = table.registered_keys().await;
        for key in leaf_keys() {
            assert!(registered.contains(&key), "{key} has no implementation");
        }
    }
}
