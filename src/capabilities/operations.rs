//! Operator-family capabilities switched on by operation toggles.
//!
//! Every member here works on the instance value (`Invocation::receiver`).

use std::any::Any;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Duration, FixedOffset, SecondsFormat};
use serde_json::{Number, Value};

use super::{Capability, CapabilityName, Invocation};
use crate::errors::{AssetError, Result};

macro_rules! capability_impl {
    ($ty:ty, $name:expr) => {
        impl Capability for $ty {
            fn name(&self) -> CapabilityName {
                $name
            }

            fn members(&self) -> &'static [&'static str] {
                Self::MEMBERS
            }

            fn invoke(&self, call: &Invocation<'_>) -> Result<Value> {
                self.dispatch(call)
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

fn float(member: &str, value: f64) -> Result<Value> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| AssetError::operation(member, format!("{value} is not a finite number")))
}

fn as_f64(member: &str, value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| AssetError::operation(member, format!("{value} is not a number")))
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct ArithmeticCapability;

impl ArithmeticCapability {
    pub const MEMBERS: &'static [&'static str] = &["add", "sub", "mul", "div", "neg"];

    fn binary(
        call: &Invocation<'_>,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<Value> {
        let a = call.receiver()?;
        let b = call.arg(0)?;
        if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
            return int_op(x, y)
                .map(Value::from)
                .ok_or_else(|| AssetError::operation(call.member, "integer overflow"));
        }
        float(call.member, float_op(as_f64(call.member, a)?, as_f64(call.member, b)?))
    }

    fn dispatch(&self, call: &Invocation<'_>) -> Result<Value> {
        match call.member {
            "add" => match (call.receiver()?, call.arg(0)?) {
                (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
                (Value::Array(a), Value::Array(b)) => {
                    Ok(Value::Array(a.iter().chain(b).cloned().collect()))
                }
                _ => Self::binary(call, i64::checked_add, |a, b| a + b),
            },
            "sub" => Self::binary(call, i64::checked_sub, |a, b| a - b),
            "mul" => Self::binary(call, i64::checked_mul, |a, b| a * b),
            "div" => {
                let divisor = as_f64(call.member, call.arg(0)?)?;
                if divisor == 0.0 {
                    return Err(AssetError::operation(call.member, "division by zero"));
                }
                float(call.member, as_f64(call.member, call.receiver()?)? / divisor)
            }
            "neg" => {
                let value = call.receiver()?;
                if let Some(x) = value.as_i64() {
                    return x
                        .checked_neg()
                        .map(Value::from)
                        .ok_or_else(|| AssetError::operation(call.member, "integer overflow"));
                }
                float(call.member, -as_f64(call.member, value)?)
            }
            _ => Err(call.unsupported()),
        }
    }
}

capability_impl!(ArithmeticCapability, CapabilityName::Arithmetic);

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerCapability;

impl ContainerCapability {
    pub const MEMBERS: &'static [&'static str] = &["len", "contains", "get_item", "items"];

    fn len(call: &Invocation<'_>) -> Result<usize> {
        match call.receiver()? {
            Value::String(s) => Ok(s.chars().count()),
            Value::Array(a) => Ok(a.len()),
            Value::Object(o) => Ok(o.len()),
            other => Err(AssetError::operation(call.member, format!("{other} has no length"))),
        }
    }

    fn dispatch(&self, call: &Invocation<'_>) -> Result<Value> {
        match call.member {
            "len" => Self::len(call).map(Value::from),
            "contains" => {
                let item = call.arg(0)?;
                let found = match (call.receiver()?, item) {
                    (Value::String(s), Value::String(sub)) => s.contains(sub.as_str()),
                    (Value::Array(a), item) => a.contains(item),
                    (Value::Object(o), Value::String(key)) => o.contains_key(key),
                    _ => false,
                };
                Ok(Value::Bool(found))
            }
            "get_item" => {
                let key = call.arg(0)?;
                let found = match (call.receiver()?, key) {
                    (Value::Array(a), Value::Number(n)) => n.as_i64().and_then(|i| {
                        let idx = if i < 0 { a.len() as i64 + i } else { i };
                        usize::try_from(idx).ok().and_then(|i| a.get(i).cloned())
                    }),
                    (Value::String(s), Value::Number(n)) => n
                        .as_u64()
                        .and_then(|i| s.chars().nth(i as usize))
                        .map(|c| Value::String(c.to_string())),
                    (Value::Object(o), Value::String(k)) => o.get(k).cloned(),
                    _ => None,
                };
                found.ok_or_else(|| AssetError::operation(call.member, format!("no item at {key}")))
            }
            "items" => match call.receiver()? {
                Value::Array(a) => Ok(Value::Array(a.clone())),
                Value::Object(o) => Ok(Value::Array(
                    o.iter()
                        .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
                        .collect(),
                )),
                Value::String(s) => Ok(Value::Array(
                    s.chars().map(|c| Value::String(c.to_string())).collect(),
                )),
                other => Err(AssetError::operation(call.member, format!("{other} is not iterable"))),
            },
            _ => Err(call.unsupported()),
        }
    }
}

capability_impl!(ContainerCapability, CapabilityName::Container);

// ---------------------------------------------------------------------------
// Casting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct CastingCapability;

impl CastingCapability {
    pub const MEMBERS: &'static [&'static str] = &["to_string", "to_int", "to_float"];

    fn dispatch(&self, call: &Invocation<'_>) -> Result<Value> {
        let value = call.receiver()?;
        let fail = || AssetError::operation(call.member, format!("cannot convert {value}"));
        match call.member {
            "to_string" => Ok(Value::String(match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })),
            "to_int" => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                    .map(Value::from)
                    .ok_or_else(fail),
                Value::String(s) => s.trim().parse::<i64>().map(Value::from).map_err(|_| fail()),
                Value::Bool(b) => Ok(Value::from(i64::from(*b))),
                _ => Err(fail()),
            },
            "to_float" => match value {
                Value::Number(n) => n.as_f64().ok_or_else(fail).and_then(|f| float(call.member, f)),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| fail())
                    .and_then(|f| float(call.member, f)),
                Value::Bool(b) => float(call.member, if *b { 1.0 } else { 0.0 }),
                _ => Err(fail()),
            },
            _ => Err(call.unsupported()),
        }
    }
}

capability_impl!(CastingCapability, CapabilityName::Casting);

// ---------------------------------------------------------------------------
// PathLike
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct PathCapability;

impl PathCapability {
    pub const MEMBERS: &'static [&'static str] = &[
        "file_name",
        "stem",
        "extension",
        "parent",
        "join",
        "is_absolute",
    ];

    fn dispatch(&self, call: &Invocation<'_>) -> Result<Value> {
        let raw = call
            .receiver()?
            .as_str()
            .ok_or_else(|| AssetError::operation(call.member, "path values must be strings"))?;
        let path = Path::new(raw);
        let text = |p: Option<&std::ffi::OsStr>| {
            p.and_then(|s| s.to_str())
                .map(|s| Value::String(s.to_string()))
                .unwrap_or(Value::Null)
        };
        match call.member {
            "file_name" => Ok(text(path.file_name())),
            "stem" => Ok(text(path.file_stem())),
            "extension" => Ok(text(path.extension())),
            "parent" => Ok(path
                .parent()
                .and_then(|p| p.to_str())
                .map(|s| Value::String(s.to_string()))
                .unwrap_or(Value::Null)),
            "join" => {
                let mut joined = PathBuf::from(raw);
                for part in call.string_list() {
                    joined.push(part);
                }
                Ok(Value::String(joined.to_string_lossy().into_owned()))
            }
            "is_absolute" => Ok(Value::Bool(path.is_absolute())),
            _ => Err(call.unsupported()),
        }
    }
}

capability_impl!(PathCapability, CapabilityName::PathLike);

// ---------------------------------------------------------------------------
// DateTimeLike
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeCapability;

impl DateTimeCapability {
    pub const MEMBERS: &'static [&'static str] = &["year", "weekday", "date", "add_seconds"];

    fn parse(call: &Invocation<'_>) -> Result<DateTime<FixedOffset>> {
        let raw = call
            .receiver()?
            .as_str()
            .ok_or_else(|| AssetError::operation(call.member, "datetime values must be strings"))?;
        DateTime::parse_from_rfc3339(raw)
            .map_err(|e| AssetError::operation(call.member, format!("'{raw}': {e}")))
    }

    fn dispatch(&self, call: &Invocation<'_>) -> Result<Value> {
        let dt = Self::parse(call)?;
        match call.member {
            "year" => Ok(Value::from(dt.year())),
            // Monday is 0.
            "weekday" => Ok(Value::from(dt.weekday().num_days_from_monday())),
            "date" => Ok(Value::String(dt.date_naive().to_string())),
            "add_seconds" => {
                let secs = as_f64(call.member, call.arg(0)?)?;
                let delta = Duration::try_milliseconds((secs * 1000.0).round() as i64)
                    .ok_or_else(|| AssetError::operation(call.member, "offset out of range"))?;
                dt.checked_add_signed(delta)
                    .map(|d| Value::String(d.to_rfc3339_opts(SecondsFormat::AutoSi, false)))
                    .ok_or_else(|| AssetError::operation(call.member, "result out of range"))
            }
            _ => Err(call.unsupported()),
        }
    }
}

capability_impl!(DateTimeCapability, CapabilityName::DateTimeLike);

// ---------------------------------------------------------------------------
// TimeDeltaLike
// ---------------------------------------------------------------------------

/// Time deltas are carried as a number of seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeDeltaCapability;

impl TimeDeltaCapability {
    pub const MEMBERS: &'static [&'static str] = &["total_seconds", "total_minutes", "days", "humanize"];

    fn humanize(seconds: f64) -> String {
        let sign = if seconds < 0.0 { "-" } else { "" };
        let mut rest = seconds.abs().round() as u64;
        let mut parts = Vec::new();
        for (unit, size) in [("d", 86_400), ("h", 3_600), ("m", 60)] {
            if rest >= size {
                parts.push(format!("{}{}", rest / size, unit));
                rest %= size;
            }
        }
        if rest > 0 || parts.is_empty() {
            parts.push(format!("{rest}s"));
        }
        format!("{sign}{}", parts.join(" "))
    }

    fn dispatch(&self, call: &Invocation<'_>) -> Result<Value> {
        let seconds = as_f64(call.member, call.receiver()?)?;
        match call.member {
            "total_seconds" => float(call.member, seconds),
            "total_minutes" => float(call.member, seconds / 60.0),
            "days" => Ok(Value::from((seconds / 86_400.0).trunc() as i64)),
            "humanize" => Ok(Value::String(Self::humanize(seconds))),
            _ => Err(call.unsupported()),
        }
    }
}

capability_impl!(TimeDeltaCapability, CapabilityName::TimeDeltaLike);
