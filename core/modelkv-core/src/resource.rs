//! Logical resources and physical rows.
//!
//! Both are flat JSON objects: the provenance fields (`link`, `permalink`,
//! `author`, `time`) sit next to the model's own properties. A physical row
//! may additionally carry the [`MINIFIED_FIELD`] marker and the table's
//! update timestamp.

use crate::error::{MkvError, MkvResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub const LINK: &str = "link";
pub const PERMALINK: &str = "permalink";
pub const AUTHOR: &str = "author";
pub const TIME: &str = "time";

/// Provenance fields, present on every resource and never evicted.
pub const PROVENANCE_FIELDS: [&str; 4] = [LINK, PERMALINK, AUTHOR, TIME];

/// Marker set on rows whose properties were partially moved to overflow.
pub const MINIFIED_FIELD: &str = "_minified";

pub fn is_provenance(name: &str) -> bool {
    PROVENANCE_FIELDS.contains(&name)
}

/// Flat JSON object as seen by callers (logical) or stored (physical).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource {
    fields: Map<String, Value>,
}

impl Resource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn from_value(value: Value) -> MkvResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(MkvError::InvalidResource(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn link(&self) -> Option<&str> {
        self.fields.get(LINK).and_then(Value::as_str)
    }

    pub fn require_link(&self) -> MkvResult<&str> {
        self.link()
            .ok_or_else(|| MkvError::InvalidResource("resource has no 'link'".to_string()))
    }

    pub fn permalink(&self) -> Option<&str> {
        self.fields.get(PERMALINK).and_then(Value::as_str)
    }

    pub fn author(&self) -> Option<&str> {
        self.fields.get(AUTHOR).and_then(Value::as_str)
    }

    pub fn time(&self) -> Option<&Value> {
        self.fields.get(TIME)
    }

    pub fn is_minified(&self) -> bool {
        matches!(self.fields.get(MINIFIED_FIELD), Some(Value::Bool(true)))
    }

    /// Serialized JSON size in bytes, the measure used by the row budget.
    pub fn serialized_len(&self) -> MkvResult<usize> {
        Ok(serde_json::to_vec(&self.fields)?.len())
    }

    /// SHA-256 (hex) over the canonical JSON of everything but provenance.
    pub fn content_link(&self) -> MkvResult<String> {
        let body: Map<String, Value> = self
            .fields
            .iter()
            .filter(|(name, _)| !is_provenance(name) && name.as_str() != MINIFIED_FIELD)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let bytes = serde_json::to_vec(&body)?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }

    /// Fill `link` from content and default `permalink` to it (first revision).
    pub fn seal(&mut self) -> MkvResult<&str> {
        if self.link().is_none() {
            let link = self.content_link()?;
            self.fields.insert(LINK.to_string(), Value::String(link));
        }
        if self.permalink().is_none()
            && let Some(link) = self.fields.get(LINK).cloned()
        {
            self.fields.insert(PERMALINK.to_string(), link);
        }
        self.require_link()
    }
}

impl From<Map<String, Value>> for Resource {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}
