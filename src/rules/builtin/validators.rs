//! Built-in validator modules.

use std::path::Path;

use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::errors::AssetError;
use crate::rules::entry::RuleEntry;
use crate::rules::key::{keys, RuleGroup};
use crate::rules::rule::build_validator;
use crate::rules::table::{RuleFactory, RuleModule};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern is valid")
});

/// Character count for strings, element count for arrays and objects.
fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(a) => Some(a.len()),
        Value::Object(o) => Some(o.len()),
        _ => None,
    }
}

pub fn string_validators() -> RuleModule {
    RuleModule::new("validators.string", RuleGroup::Validators)
        .rule(
            build_validator()
                .error_template("'{value}' is not a valid email address")
                .description("Checks that a string is a syntactically valid email address")
                .tags(["string", "format/email"])
                .register_as(keys::valid::string::IS_EMAIL)
                .build("is_email", |value, _ctx| async move {
                    value.as_str().map(|s| EMAIL_RE.is_match(s)).unwrap_or(false)
                }),
        )
        .rule(
            build_validator()
                .error_template("{field} must not be empty")
                .description("Rejects empty or whitespace-only strings and empty collections")
                .tags(["string", "presence"])
                .build("is_non_empty", |value, _ctx| async move {
                    match &value {
                        Value::String(s) => !s.trim().is_empty(),
                        Value::Null => false,
                        other => length_of(other).map(|n| n > 0).unwrap_or(true),
                    }
                }),
        )
        .factory(RuleFactory::new("max_length", |args| {
            let max = args.require_u64(0, "max", "max_length")? as usize;
            Ok(build_validator()
                .error_template(format!("'{{value}}' is longer than {max}"))
                .tags(["string", "length"])
                .build("max_length", move |value, _ctx| async move {
                    length_of(&value).map(|n| n <= max).unwrap_or(false)
                })
                .into())
        }))
        .factory(RuleFactory::new("min_length", |args| {
            let min = args.require_u64(0, "min", "min_length")? as usize;
            Ok(build_validator()
                .error_template(format!("'{{value}}' is shorter than {min}"))
                .tags(["string", "length"])
                .build("min_length", move |value, _ctx| async move {
                    length_of(&value).map(|n| n >= min).unwrap_or(false)
                })
                .into())
        }))
        .factory(RuleFactory::new("matches_pattern", |args| {
            let pattern = args.require_str(0, "pattern", "matches_pattern")?;
            let re = Regex::new(&pattern).map_err(|e| AssetError::InvalidRuleArguments {
                rule: "matches_pattern".to_string(),
                message: e.to_string(),
            })?;
            Ok(build_validator()
                .error_template(format!("'{{value}}' does not match {pattern}"))
                .tags(["string", "format"])
                .build("matches_pattern", move |value, _ctx| {
                    let matched = value.as_str().map(|s| re.is_match(s)).unwrap_or(false);
                    async move { matched }
                })
                .into())
        }))
}

pub fn numeric_validators() -> RuleModule {
    RuleModule::new("validators.numeric", RuleGroup::Validators)
        .rule(
            build_validator()
                .error_template("{value} is not positive")
                .tags(["numeric"])
                .build("is_positive", |value, _ctx| async move {
                    value.as_f64().map(|n| n > 0.0).unwrap_or(false)
                }),
        )
        .factory(RuleFactory::new("in_range", |args| {
            let min = args.require_f64(0, "min", "in_range")?;
            let max = args.require_f64(1, "max", "in_range")?;
            if min > max {
                return Err(AssetError::InvalidRuleArguments {
                    rule: "in_range".to_string(),
                    message: format!("min {min} is greater than max {max}"),
                });
            }
            let rule: RuleEntry = build_validator()
                .error_template(format!("{{value}} is outside [{min}, {max}]"))
                .tags(["numeric", "range"])
                .build("in_range", move |value, _ctx| async move {
                    value.as_f64().map(|n| n >= min && n <= max).unwrap_or(false)
                })
                .into();
            Ok(rule)
        }))
}

pub fn path_validators() -> RuleModule {
    RuleModule::new("validators.path", RuleGroup::Validators).rule(
        build_validator()
            .error_template("'{value}' is not an absolute path")
            .tags(["path"])
            .build("is_absolute", |value, _ctx| async move {
                value
                    .as_str()
                    .map(|s| Path::new(s).is_absolute())
                    .unwrap_or(false)
            }),
    )
}

pub fn time_validators() -> RuleModule {
    RuleModule::new("validators.time", RuleGroup::Validators).rule(
        build_validator()
            .error_template("'{value}' is not an RFC 3339 timestamp")
            .tags(["time", "format"])
            .build("is_iso_datetime", |value, _ctx| async move {
                value
                    .as_str()
                    .map(|s| DateTime::parse_from_rfc3339(s).is_ok())
                    .unwrap_or(false)
            }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::rule::{Rule, RuleArgs, RuleContext};
    use crate::rules::table::RuleTable;
    use serde_json::json;

    async fn check(key: crate::rules::key::RuleKey, args: RuleArgs, value: Value) -> bool {
        let table = RuleTable::with_modules(crate::rules::builtin::modules());
        let Rule::Validator(v) = table.resolve(&key, args).await.unwrap() else {
            panic!("{key} is not a validator");
        };
        v.check(&value, &RuleContext::default()).await
    }

    #[tokio::test]
    async fn test_email() {
        let key = keys::valid::string::IS_EMAIL;
        assert!(check(key.clone(), RuleArgs::none(), json!("a@b.com")).await);
        assert!(check(key.clone(), RuleArgs::none(), json!("first.last+x@mail.example.org")).await);
        assert!(!check(key.clone(), RuleArgs::none(), json!("not-an-email")).await);
        assert!(!check(key, RuleArgs::none(), json!(42)).await);
    }

    #[tokio::test]
    async fn test_lengths_and_patterns() {
        assert!(check(keys::valid::string::MIN_LENGTH, RuleArgs::positional([2]), json!("ab")).await);
        assert!(!check(keys::valid::string::MAX_LENGTH, RuleArgs::positional([2]), json!([1, 2, 3])).await);
        assert!(
            check(
                keys::valid::string::MATCHES_PATTERN,
                RuleArgs::none().with("pattern", "^[a-z]+$"),
                json!("abc")
            )
            .await
        );
        assert!(!check(keys::valid::string::IS_NON_EMPTY, RuleArgs::none(), json!("   ")).await);
    }

    #[tokio::test]
    async fn test_bad_pattern_is_an_argument_error() {
        let table = RuleTable::with_modules(crate::rules::builtin::modules());
        let err = table
            .resolve(
                &keys::valid::string::MATCHES_PATTERN,
                RuleArgs::positional(["("]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::InvalidRuleArguments { .. }));
    }

    #[tokio::test]
    async fn test_numeric_path_time() {
        assert!(check(keys::valid::numeric::IS_POSITIVE, RuleArgs::none(), json!(0.5)).await);
        assert!(!check(keys::valid::numeric::IS_POSITIVE, RuleArgs::none(), json!(0)).await);
        assert!(check(keys::valid::numeric::IN_RANGE, RuleArgs::positional([1, 10]), json!(10)).await);
        assert!(!check(keys::valid::numeric::IN_RANGE, RuleArgs::positional([1, 10]), json!(11)).await);
        assert!(check(keys::valid::path::IS_ABSOLUTE, RuleArgs::none(), json!("/etc/hosts")).await);
        assert!(!check(keys::valid::path::IS_ABSOLUTE, RuleArgs::none(), json!("etc/hosts")).await);
        assert!(
            check(
                keys::valid::time::IS_ISO_DATETIME,
                RuleArgs::none(),
                json!("2024-05-01T12:00:00Z")
            )
            .await
        );
        assert!(!check(keys::valid::time::IS_ISO_DATETIME, RuleArgs::none(), json!("yesterday")).await);
    }
}
