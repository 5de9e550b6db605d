//! Tagging capability.
//!
//! Tags are hierarchical paths separated by `/`, e.g. `format/email`.
//! `format` is an ancestor of `format/email`; `form` is a prefix of it but
//! not an ancestor.

use std::any::Any;

use indexmap::IndexSet;
use parking_lot::RwLock;
use serde_json::Value;

use super::{Capability, CapabilityName, Invocation};
use crate::errors::Result;

pub const TAG_SEPARATOR: char = '/';

/// Trim whitespace and stray separators. Empty tags normalize to `None`.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let tag = tag.trim().trim_matches(TAG_SEPARATOR);
    if tag.is_empty() {
        None
    } else {
        Some(tag.to_string())
    }
}

/// `ancestor` equals `tag` or is one of its parent paths.
pub fn is_ancestor(ancestor: &str, tag: &str) -> bool {
    match tag.strip_prefix(ancestor) {
        Some("") => true,
        Some(rest) => rest.starts_with(TAG_SEPARATOR),
        None => false,
    }
}

#[derive(Debug, Default)]
pub struct TaggingCapability {
    tags: RwLock<IndexSet<String>>,
}

impl TaggingCapability {
    pub const MEMBERS: &'static [&'static str] = &[
        "get_tags",
        "add_tags",
        "remove_tags",
        "has_tag",
        "has_tags",
        "has_tag_prefix",
        "has_ancestor",
    ];

    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cap = Self::default();
        cap.add_tags(tags);
        cap
    }

    pub fn get_tags(&self) -> Vec<String> {
        self.tags.read().iter().cloned().collect()
    }

    /// Returns how many tags were new.
    pub fn add_tags<I, S>(&self, tags: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = self.tags.write();
        tags.into_iter()
            .filter_map(|t| normalize_tag(t.as_ref()))
            .filter(|t| set.insert(t.clone()))
            .count()
    }

    /// Returns how many tags were removed.
    pub fn remove_tags<I, S>(&self, tags: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = self.tags.write();
        tags.into_iter()
            .filter_map(|t| normalize_tag(t.as_ref()))
            .filter(|t| set.shift_remove(t))
            .count()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        normalize_tag(tag)
            .map(|t| self.tags.read().contains(&t))
            .unwrap_or(false)
    }

    /// All of `tags` when `match_all`, otherwise any of them.
    pub fn has_tags<S: AsRef<str>>(&self, tags: &[S], match_all: bool) -> bool {
        if match_all {
            tags.iter().all(|t| self.has_tag(t.as_ref()))
        } else {
            tags.iter().any(|t| self.has_tag(t.as_ref()))
        }
    }

    /// Some tag starts with `prefix` (plain string prefix).
    pub fn has_tag_prefix(&self, prefix: &str) -> bool {
        let prefix = prefix.trim();
        self.tags.read().iter().any(|t| t.starts_with(prefix))
    }

    /// Some tag is `ancestor` or sits below it in the hierarchy.
    pub fn has_ancestor(&self, ancestor: &str) -> bool {
        match normalize_tag(ancestor) {
            Some(ancestor) => self.tags.read().iter().any(|t| is_ancestor(&ancestor, t)),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.tags.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.read().is_empty()
    }
}

impl Capability for TaggingCapability {
    fn name(&self) -> CapabilityName {
        CapabilityName::Tagging
    }

    fn members(&self) -> &'static [&'static str] {
        Self::MEMBERS
    }

    fn invoke(&self, call: &Invocation<'_>) -> Result<Value> {
        match call.member {
            "get_tags" => Ok(Value::from(self.get_tags())),
            "add_tags" => Ok(Value::from(self.add_tags(call.string_list()))),
            "remove_tags" => Ok(Value::from(self.remove_tags(call.string_list()))),
            "has_tag" => Ok(Value::Bool(self.has_tag(call.str_arg(0)?))),
            "has_tags" => {
                let tags: Vec<String> = match call.arg(0)? {
                    Value::Array(items) => items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                    Value::String(s) => vec![s.clone()],
                    _ => Vec::new(),
                };
                let match_all = call.args.get(1).and_then(Value::as_bool).unwrap_or(true);
                Ok(Value::Bool(self.has_tags(&tags, match_all)))
            }
            "has_tag_prefix" => Ok(Value::Bool(self.has_tag_prefix(call.str_arg(0)?))),
            "has_ancestor" => Ok(Value::Bool(self.has_ancestor(call.str_arg(0)?))),
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
    use serde_json::json;

    #[test]
    fn test_add_remove_preserve_order() {
        let tags = TaggingCapability::new(["format/email", " /contact/ ", ""]);
        assert_eq!(tags.get_tags(), vec!["format/email", "contact"]);
        assert_eq!(tags.add_tags(["contact", "pii"]), 1);
        assert_eq!(tags.remove_tags(["format/email"]), 1);
        assert_eq!(tags.get_tags(), vec!["contact", "pii"]);
    }

    #[test]
    fn test_hierarchy_queries() {
        let tags = TaggingCapability::new(["format/email", "pii"]);
        assert!(tags.has_ancestor("format"));
        assert!(tags.has_ancestor("format/email"));
        assert!(!tags.has_ancestor("form"));
        assert!(tags.has_tag_prefix("form"));
        assert!(tags.has_tags(&["pii", "format/email"], true));
        assert!(!tags.has_tags(&["pii", "money"], true));
        assert!(tags.has_tags(&["pii", "money"], false));
    }

    #[test]
    fn test_members_through_invocation() {
        let tags = TaggingCapability::default();
        let args = [json!(["a/b", "c"])];
        let call = Invocation::new("Status", "add_tags", None, &args);
        assert_eq!(tags.invoke(&call).unwrap(), json!(2));

        let call = Invocation::new("Status", "get_tags", None, &[]);
        assert_eq!(tags.invoke(&call).unwrap(), json!(["a/b", "c"]));

        let args = [json!(["a/b", "z"]), json!(false)];
        let call = Invocation::new("Status", "has_tags", None, &args);
        assert_eq!(tags.invoke(&call).unwrap(), json!(true));
    }
}
