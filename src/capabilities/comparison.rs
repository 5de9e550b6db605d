//! Comparison capability: equality, ordering and hashing of instance values.

use std::any::Any;
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::DateTime;
use serde_json::Value;

use super::{Capability, CapabilityName, Invocation};
use crate::asset::ValueType;
use crate::errors::{AssetError, Result};

/// Order two values. Numbers compare numerically, strings and booleans
/// naturally, arrays element-wise. Mixed kinds are unordered.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                match compare_values(l, r)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(x.len().cmp(&y.len()))
        }
        _ => None,
    }
}

/// Canonical form used for hashing: integral floats become integers, so
/// values that compare equal through [`compare_values`] hash equal.
pub fn canonical(value: &Value) -> Value {
    match value {
        Value::Number(n) if n.as_i64().is_none() && n.as_u64().is_none() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                Value::from(f as i64)
            }
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), canonical(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Stable hash of a value's canonical JSON form.
pub fn hash_value(value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    canonical(value).to_string().hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone)]
pub struct ComparisonCapability {
    value_type: ValueType,
}

impl Default for ComparisonCapability {
    fn default() -> Self {
        Self::new(ValueType::Any)
    }
}

impl ComparisonCapability {
    pub const MEMBERS: &'static [&'static str] =
        &["eq", "ne", "lt", "le", "gt", "ge", "hash", "compare"];

    pub const ORDERING: [&'static str; 4] = ["lt", "le", "gt", "ge"];

    pub fn new(value_type: ValueType) -> Self {
        Self { value_type }
    }

    /// Order two instance values of this asset's inner type.
    pub fn compare(&self, a: &Value, b: &Value) -> Option<Ordering> {
        if self.value_type == ValueType::DateTime {
            if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
                if let (Ok(x), Ok(y)) = (
                    DateTime::parse_from_rfc3339(x),
                    DateTime::parse_from_rfc3339(y),
                ) {
                    return Some(x.cmp(&y));
                }
            }
        }
        compare_values(a, b)
    }

    /// Hash consistent with `eq`: datetimes hash by instant, numbers by
    /// their canonical form.
    pub fn hash(&self, value: &Value) -> u64 {
        if self.value_type == ValueType::DateTime {
            if let Some(Ok(dt)) = value.as_str().map(DateTime::parse_from_rfc3339) {
                let instant = format!("{}.{}", dt.timestamp(), dt.timestamp_subsec_nanos());
                return hash_value(&Value::String(instant));
            }
        }
        hash_value(value)
    }

    fn ordered(&self, call: &Invocation<'_>) -> Result<Ordering> {
        let a = call.receiver()?;
        let b = call.arg(0)?;
        self.compare(a, b).ok_or_else(|| {
            AssetError::operation(call.member, format!("cannot order {a} and {b}"))
        })
    }
}

impl Capability for ComparisonCapability {
    fn name(&self) -> CapabilityName {
        CapabilityName::Comparison
    }

    fn members(&self) -> &'static [&'static str] {
        Self::MEMBERS
    }

    fn invoke(&self, call: &Invocation<'_>) -> Result<Value> {
        match call.member {
            "eq" | "ne" => {
                let a = call.receiver()?;
                let b = call.arg(0)?;
                let equal = self.compare(a, b) == Some(Ordering::Equal) || a == b;
                Ok(Value::Bool(equal == (call.member == "eq")))
            }
            "lt" => Ok(Value::Bool(self.ordered(call)? == Ordering::Less)),
            "le" => Ok(Value::Bool(self.ordered(call)? != Ordering::Greater)),
            "gt" => Ok(Value::Bool(self.ordered(call)? == Ordering::Greater)),
            "ge" => Ok(Value::Bool(self.ordered(call)? != Ordering::Less)),
            "compare" => Ok(Value::from(self.ordered(call)? as i8)),
            "hash" => Ok(Value::from(self.hash(call.receiver()?))),
            _ => Err(call.unsupported()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
