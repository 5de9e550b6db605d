//! Documentation capability.

use std::any::Any;

use serde_json::{json, Value};

use super::{Capability, CapabilityName, Invocation};
use crate::errors::Result;

#[derive(Debug, Clone, Default)]
pub struct DocumentationCapability {
    name: String,
    doc: Option<String>,
}

impl DocumentationCapability {
    pub const MEMBERS: &'static [&'static str] = &["doc", "summary", "describe"];

    pub fn new(name: impl Into<String>, doc: Option<String>) -> Self {
        Self {
            name: name.into(),
            doc: doc.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
        }
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// First line of the doc, or the asset name.
    pub fn summary(&self) -> &str {
        self.doc
            .as_deref()
            .and_then(|d| d.lines().next())
            .unwrap_or(&self.name)
    }
}

impl Capability for DocumentationCapability {
    fn name(&self) -> CapabilityName {
        CapabilityName::Documentation
    }

    fn members(&self) -> &'static [&'static str] {
        Self::MEMBERS
    }

    fn invoke(&self, call: &Invocation<'_>) -> Result<Value> {
        match call.member {
            "doc" => Ok(self.doc.clone().map(Value::String).unwrap_or(Value::Null)),
            "summary" => Ok(Value::String(self.summary().to_string())),
            "describe" => Ok(json!({
                "name": self.name,
                "summary": self.summary(),
                "doc": self.doc,
            })),
            _ => Err(call.unsupported()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
