//! Asset kinds and inner value types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use super::descriptor::OperationToggles;
use crate::capabilities::ProtocolTier;
use crate::rules::builtin::normalizers::parse_ttl;

/// What an asset declaration produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Primitive,
    Alias,
    Model,
    Enum,
    Protocol,
}

impl AssetKind {
    pub const ALL: [AssetKind; 5] = [
        Self::Primitive,
        Self::Alias,
        Self::Model,
        Self::Enum,
        Self::Protocol,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primitive => "primitive",
            Self::Alias => "alias",
            Self::Model => "model",
            Self::Enum => "enum",
            Self::Protocol => "protocol",
        }
    }

    /// Tier used when a declaration names none.
    pub fn default_tier(&self) -> ProtocolTier {
        match self {
            Self::Primitive | Self::Alias => ProtocolTier::Validated,
            Self::Model => ProtocolTier::Advanced,
            Self::Enum | Self::Protocol => ProtocolTier::Core,
        }
    }

    /// Kinds whose instances are built through a validated wrapper.
    pub fn is_wrapped(&self) -> bool {
        matches!(self, Self::Primitive | Self::Alias | Self::Model)
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown asset kind '{s}'"))
    }
}

/// Inner type of a wrapped-value asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Integer,
    Float,
    Boolean,
    Path,
    DateTime,
    /// Seconds.
    TimeDelta,
    List,
    Map,
    Any,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Path => "path",
            Self::DateTime => "datetime",
            Self::TimeDelta => "timedelta",
            Self::List => "list",
            Self::Map => "map",
            Self::Any => "any",
        }
    }

    /// Operator families a primitive of this type gets by default.
    pub fn default_operations(&self) -> OperationToggles {
        let mut ops = OperationToggles::default();
        match self {
            Self::String => {
                ops.container = true;
                ops.casting = true;
            }
            Self::Integer | Self::Float => {
                ops.arithmetic = true;
                ops.casting = true;
            }
            Self::Boolean => ops.casting = true,
            Self::Path => {
                ops.path_like = true;
                ops.casting = true;
            }
            Self::DateTime => {
                ops.datetime_like = true;
                ops.casting = true;
            }
            Self::TimeDelta => {
                ops.timedelta_like = true;
                ops.arithmetic = true;
                ops.casting = true;
            }
            Self::List | Self::Map => ops.container = true,
            Self::Any => {}
        }
        ops
    }

    /// Coerce raw input into this type.
    ///
    /// Integers widen to floats, datetimes are parsed as RFC 3339 (or a unix
    /// timestamp) and re-rendered in UTC, time deltas accept seconds or a
    /// TTL expression such as `"5m"`.
    pub fn coerce(&self, value: Value) -> Result<Value, String> {
        let mismatch = |v: &Value| format!("expected {}, got {}", self.as_str(), v);
        match (self, value) {
            (Self::Any, v) => Ok(v),
            (Self::String | Self::Path, Value::String(s)) => Ok(Value::String(s)),
            (Self::Integer, Value::Number(n)) => {
                if n.is_i64() || n.is_u64() {
                    Ok(Value::Number(n))
                } else {
                    match n.as_f64() {
                        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                            Ok(Value::from(f as i64))
                        }
                        _ => Err(mismatch(&Value::Number(n))),
                    }
                }
            }
            (Self::Float, Value::Number(n)) => n
                .as_f64()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| mismatch(&Value::Number(n))),
            (Self::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
            (Self::DateTime, Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| {
                    Value::String(
                        dt.with_timezone(&Utc)
                            .to_rfc3339_opts(SecondsFormat::AutoSi, true),
                    )
                })
                .map_err(|e| format!("'{s}' is not an RFC 3339 datetime: {e}")),
            (Self::DateTime, Value::Number(n)) => n
                .as_i64()
                .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
                .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
                .ok_or_else(|| mismatch(&Value::Number(n))),
            (Self::TimeDelta, v @ (Value::Number(_) | Value::String(_))) => {
                parse_ttl(&v).map(Value::from)
            }
            (Self::List, Value::Array(a)) => Ok(Value::Array(a)),
            (Self::Map, Value::Object(o)) => Ok(Value::Object(o)),
            (_, other) => Err(mismatch(&other)),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
