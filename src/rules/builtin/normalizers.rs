//! Built-in normalizer modules.

use serde_json::{json, Value};

use crate::rules::key::{keys, RuleGroup};
use crate::rules::rule::build_normalizer;
use crate::rules::table::RuleModule;

fn map_str(value: Value, f: impl FnOnce(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(&s)),
        other => other,
    }
}

pub fn string_normalizers() -> RuleModule {
    RuleModule::new("normalizers.string", RuleGroup::Normalizers)
        .rule(
            build_normalizer()
                .description("Trims leading and trailing whitespace")
                .tags(["string"])
                .build("strip", |value, _ctx| async move {
                    Ok(map_str(value, |s| s.trim().to_string()))
                }),
        )
        .rule(
            build_normalizer()
                .tags(["string"])
                .build("lowercase", |value, _ctx| async move {
                    Ok(map_str(value, str::to_lowercase))
                }),
        )
        .rule(
            build_normalizer()
                .description("Collapses runs of whitespace into single spaces")
                .tags(["string"])
                .build("collapse_whitespace", |value, _ctx| async move {
                    Ok(map_str(value, |s| {
                        s.split_whitespace().collect::<Vec<_>>().join(" ")
                    }))
                }),
        )
}

/// Lowercase, trim, and replace anything outside `[a-z0-9:._-]` with `_`,
/// collapsing repeats.
pub fn normalize_cache_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_sep = false;
    for ch in raw.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() || matches!(ch, ':' | '.' | '-') {
            out.push(ch);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    out.trim_matches('_').to_string()
}

pub fn cache_normalizers() -> RuleModule {
    RuleModule::new("normalizers.cache", RuleGroup::Normalizers).rule(
        build_normalizer()
            .description("Canonical form for cache keys")
            .tags(["cache"])
            .register_as(keys::norm::cache::NORMALIZE_CACHE_KEY)
            .build("normalize_cache_key", |value, _ctx| async move {
                match value {
                    Value::String(s) => {
                        let key = normalize_cache_key(&s);
                        if key.is_empty() {
                            Err(format!("'{s}' has no usable cache key characters"))
                        } else {
                            Ok(Value::String(key))
                        }
                    }
                    other => Err(format!("cache keys must be strings, got {other}")),
                }
            }),
    )
}

/// Parse a TTL into whole seconds: integers are seconds, strings may carry
/// an `s`, `m`, `h` or `d` suffix.
pub fn parse_ttl(value: &Value) -> Result<u64, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .ok_or_else(|| format!("TTL must be non-negative, got {n}")),
        Value::String(s) => {
            let s = s.trim();
            let (digits, unit) = match s.char_indices().last() {
                Some((idx, c)) if c.is_ascii_alphabetic() => (&s[..idx], c),
                _ => (s, 's'),
            };
            let amount: u64 = digits
                .trim()
                .parse()
                .map_err(|_| format!("'{s}' is not a valid TTL"))?;
            let factor = match unit.to_ascii_lowercase() {
                's' => 1,
                'm' => 60,
                'h' => 3_600,
                'd' => 86_400,
                other => return Err(format!("unknown TTL unit '{other}'")),
            };
            amount
                .checked_mul(factor)
                .ok_or_else(|| format!("'{s}' overflows"))
        }
        other => Err(format!("TTL must be a number or string, got {other}")),
    }
}

pub fn time_normalizers() -> RuleModule {
    RuleModule::new("normalizers.time", RuleGroup::Normalizers).rule(
        build_normalizer()
            .description("Converts TTL expressions like '5m' into seconds")
            .tags(["time", "cache"])
            .build("normalize_ttl", |value, _ctx| async move {
                parse_ttl(&value).map(|secs| json!(secs))
            }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_cache_key() {
        assert_eq!(normalize_cache_key("  User Profile:42 "), "user_profile:42");
        assert_eq!(normalize_cache_key("a//b??c"), "a_b_c");
        assert_eq!(normalize_cache_key("***"), "");
    }

    #[test]
    fn test_parse_ttl() {
        assert_eq!(parse_ttl(&json!(30)), Ok(30));
        assert_eq!(parse_ttl(&json!("5m")), Ok(300));
        assert_eq!(parse_ttl(&json!("2h")), Ok(7_200));
        assert_eq!(parse_ttl(&json!("1d")), Ok(86_400));
        assert_eq!(parse_ttl(&json!("45")), Ok(45));
        assert!(parse_ttl(&json!(-1)).is_err());
        assert!(parse_ttl(&json!("3w")).is_err());
        assert!(parse_ttl(&json!(true)).is_err());
    }
}
