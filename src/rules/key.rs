//! Hierarchical rule key namespace.
//!
//! Keys are dotted paths through two static trees, `VALID.*` for validators
//! and `NORM.*` for normalizers. Only leaves are valid keys; internal nodes
//! are namespaces.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::rule::{Rule, RuleArgs};
use super::table::RuleTable;
use crate::errors::{AssetError, Result};

/// Which catalogue group a key (or rule module) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleGroup {
    Validators,
    Normalizers,
}

impl RuleGroup {
    pub fn root(&self) -> &'static KeyNode {
        match self {
            Self::Validators => &VALIDATOR_KEYS,
            Self::Normalizers => &NORMALIZER_KEYS,
        }
    }
}

/// A node in the key tree.
#[derive(Debug)]
pub struct KeyNode {
    pub name: &'static str,
    pub children: &'static [KeyNode],
    pub leaves: &'static [&'static str],
}

impl KeyNode {
    /// Collect the full dotted path of every leaf under this node.
    pub fn walk(&self, prefix: &str, out: &mut Vec<RuleKey>) {
        let here = if prefix.is_empty() {
            self.name.to_string()
        } else {
            format!("{prefix}.{}", self.name)
        };
        for leaf in self.leaves {
            out.push(RuleKey::owned(format!("{here}.{leaf}")));
        }
        for child in self.children {
            child.walk(&here, out);
        }
    }

    fn contains_path(&self, segments: &[&str]) -> bool {
        match segments {
            [] => false,
            [leaf] => self.leaves.contains(leaf),
            [ns, rest @ ..] => self
                .children
                .iter()
                .any(|c| c.name == *ns && c.contains_path(rest)),
        }
    }
}

pub static VALIDATOR_KEYS: KeyNode = KeyNode {
    name: "VALID",
    children: &[
        KeyNode {
            name: "STRING",
            children: &[],
            leaves: &[
                "is_email",
                "is_non_empty",
                "max_length",
                "min_length",
                "matches_pattern",
            ],
        },
        KeyNode {
            name: "NUMERIC",
            children: &[],
            leaves: &["is_positive", "in_range"],
        },
        KeyNode {
            name: "PATH",
            children: &[],
            leaves: &["is_absolute"],
        },
        KeyNode {
            name: "TIME",
            children: &[],
            leaves: &["is_iso_datetime"],
        },
    ],
    leaves: &[],
};

pub static NORMALIZER_KEYS: KeyNode = KeyNode {
    name: "NORM",
    children: &[
        KeyNode {
            name: "STRING",
            children: &[],
            leaves: &["strip", "lowercase", "collapse_whitespace"],
        },
        KeyNode {
            name: "CACHE",
            children: &[],
            leaves: &["normalize_cache_key"],
        },
        KeyNode {
            name: "TIME",
            children: &[],
            leaves: &["normalize_ttl"],
        },
    ],
    leaves: &[],
};

/// Every leaf key in both trees, validators first.
pub fn leaf_keys() -> Vec<RuleKey> {
    let mut out = Vec::new();
    VALIDATOR_KEYS.walk("", &mut out);
    NORMALIZER_KEYS.walk("", &mut out);
    out
}

/// Every leaf key whose final segment is `name`.
pub fn keys_for_leaf(name: &str) -> Vec<RuleKey> {
    leaf_keys()
        .into_iter()
        .filter(|k| k.leaf_name() == name)
        .collect()
}

// ---------------------------------------------------------------------------
// RuleKey
// ---------------------------------------------------------------------------

/// A leaf of the key tree, e.g. `VALID.STRING.is_email`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleKey(Cow<'static, str>);

impl RuleKey {
    /// Key from a static path. The path is not checked; use the constants in
    /// [`keys`] or [`RuleKey::parse`] for checked keys.
    pub const fn from_static(path: &'static str) -> Self {
        Self(Cow::Borrowed(path))
    }

    fn owned(path: String) -> Self {
        Self(Cow::Owned(path))
    }

    /// Parse a dotted path, requiring it to name a leaf.
    pub fn parse(path: &str) -> Result<Self> {
        let segments: Vec<&str> = path.split('.').collect();
        let known = match segments.split_first() {
            Some((root, rest)) if *root == VALIDATOR_KEYS.name => {
                VALIDATOR_KEYS.contains_path(rest)
            }
            Some((root, rest)) if *root == NORMALIZER_KEYS.name => {
                NORMALIZER_KEYS.contains_path(rest)
            }
            _ => false,
        };
        if known {
            Ok(Self::owned(path.to_string()))
        } else {
            Err(AssetError::UnknownRuleKey {
                path: path.to_string(),
            })
        }
    }

    pub fn path(&self) -> &str {
        &self.0
    }

    /// Final path segment, e.g. `is_email`.
    pub fn leaf_name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// Everything before the leaf, e.g. `VALID.STRING`.
    pub fn namespace(&self) -> &str {
        self.0.rsplit_once('.').map(|(ns, _)| ns).unwrap_or("")
    }

    pub fn group(&self) -> Option<RuleGroup> {
        match self.0.split('.').next() {
            Some(root) if root == VALIDATOR_KEYS.name => Some(RuleGroup::Validators),
            Some(root) if root == NORMALIZER_KEYS.name => Some(RuleGroup::Normalizers),
            _ => None,
        }
    }

    /// Resolve against the global rule table.
    pub async fn resolve(&self, args: RuleArgs) -> Result<Rule> {
        RuleTable::global().resolve(self, args).await
    }

    /// Resolve a non-parameterized rule from a synchronous call site.
    pub fn get(&self) -> Result<Rule> {
        self.call(RuleArgs::none())
    }

    /// Resolve from a synchronous call site, bridging through the runtime.
    pub fn call(&self, args: RuleArgs) -> Result<Rule> {
        let key = self.clone();
        crate::runtime::block_on(async move { key.resolve(args).await })?
    }
}

impl fmt::Debug for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleKey({})", self.0)
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key constants mirroring the two trees.
pub mod keys {
    pub mod valid {
        pub mod string {
            use crate::rules::key::RuleKey;
            pub const IS_EMAIL: RuleKey = RuleKey::from_static("VALID.STRING.is_email");
            pub const IS_NON_EMPTY: RuleKey = RuleKey::from_static("VALID.STRING.is_non_empty");
            pub const MAX_LENGTH: RuleKey = RuleKey::from_static("VALID.STRING.max_length");
            pub const MIN_LENGTH: RuleKey = RuleKey::from_static("VALID.STRING.min_length");
            pub const MATCHES_PATTERN: RuleKey =
                RuleKey::from_static("VALID.STRING.matches_pattern");
        }
        pub mod numeric {
            use crate::rules::key::RuleKey;
            pub const IS_POSITIVE: RuleKey = RuleKey::from_static("VALID.NUMERIC.is_positive");
            pub const IN_RANGE: RuleKey = RuleKey::from_static("VALID.NUMERIC.in_range");
        }
        pub mod path {
            use crate::rules::key::RuleKey;
            pub const IS_ABSOLUTE: RuleKey = RuleKey::from_static("VALID.PATH.is_absolute");
        }
        pub mod time {
            use crate::rules::key::RuleKey;
            pub const IS_ISO_DATETIME: RuleKey = RuleKey::from_static("VALID.TIME.is_iso_datetime");
        }
    }

    pub mod norm {
        pub mod string {
            use crate::rules::key::RuleKey;
            pub const STRIP: RuleKey = RuleKey::from_static("NORM.STRING.strip");
            pub const LOWERCASE: RuleKey = RuleKey::from_static("NORM.STRING.lowercase");
            pub const COLLAPSE_WHITESPACE: RuleKey =
                RuleKey::from_static("NORM.STRING.collapse_whitespace");
        }
        pub mod cache {
            use crate::rules::key::RuleKey;
            pub const NORMALIZE_CACHE_KEY: RuleKey =
                RuleKey::from_static("NORM.CACHE.normalize_cache_key");
        }
        pub mod time {
            use crate::rules::key::RuleKey;
            pub const NORMALIZE_TTL: RuleKey = RuleKey::from_static("NORM.TIME.normalize_ttl");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::rule::RuleContext;

    #[test]
    fn test_every_constant_is_a_leaf() {
        let all = leaf_keys();
        for key in [
            keys::valid::string::IS_EMAIL,
            keys::valid::numeric::IN_RANGE,
            keys::valid::time::IS_ISO_DATETIME,
            keys::norm::cache::NORMALIZE_CACHE_KEY,
            keys::norm::time::NORMALIZE_TTL,
        ] {
            assert!(all.contains(&key), "{key} missing from tree");
            assert!(RuleKey::parse(key.path()).is_ok());
        }
    }

    #[test]
    fn test_parse_rejects_namespaces_and_unknown_paths() {
        assert!(RuleKey::parse("VALID.STRING").is_err());
        assert!(RuleKey::parse("VALID.STRING.is_phone").is_err());
        assert!(RuleKey::parse("OTHER.x").is_err());
        assert!(RuleKey::parse("").is_err());
    }

    #[test]
    fn test_key_parts() {
        let key = keys::valid::string::IS_EMAIL;
        assert_eq!(key.leaf_name(), "is_email");
        assert_eq!(key.namespace(), "VALID.STRING");
        assert_eq!(key.group(), Some(RuleGroup::Validators));
        assert_eq!(keys::norm::string::STRIP.group(), Some(RuleGroup::Normalizers));
    }

    #[test]
    fn test_walk_visits_both_trees() {
        let all = leaf_keys();
        assert_eq!(all.first().map(|k| k.path()), Some("VALID.STRING.is_email"));
        assert!(all.iter().any(|k| k.path() == "NORM.TIME.normalize_ttl"));
        assert_eq!(keys_for_leaf("strip").len(), 1);
    }

    #[test]
    fn test_get_from_sync_site() {
        let rule = keys::valid::string::IS_EMAIL.get().unwrap();
        assert_eq!(rule.name(), "is_email");
        assert!(matches!(rule, Rule::Validator(_)));
    }

    #[tokio::test]
    async fn test_get_inside_runtime() {
        let rule = keys::valid::string::IS_EMAIL.get().unwrap();
        assert_eq!(rule.name(), "is_email");
        let resolved = keys::valid::string::IS_EMAIL.resolve(RuleArgs::none()).await.unwrap();
        assert_eq!(resolved.name(), rule.name());
    }

    #[tokio::test]
    async fn test_call_configures_factory() {
        let rule = keys::valid::string::MAX_LENGTH
            .call(RuleArgs::positional([3]))
            .unwrap();
        let Rule::Validator(validator) = rule else {
            panic!("max_length should build a validator");
        };
        assert_eq!(validator.name(), "max_length");
        let ctx = RuleContext::default();
        assert!(validator.check(&serde_json::json!("abc"), &ctx).await);
        assert!(!validator.check(&serde_json::json!("abcd"), &ctx).await);
    }

    #[test]
    fn test_call_rejects_arguments_for_plain_rule() {
        let err = keys::norm::string::STRIP
            .call(RuleArgs::positional([1]))
            .unwrap_err();
        assert!(matches!(err, AssetError::RuleNotConfigurable { ref key } if key == "NORM.STRING.strip"));
        assert!(keys::norm::string::STRIP.get().is_ok());
    }
}
