//! Physical table definitions derived from models.
//!
//! A [`TableDefinition`] is computed once per model by the
//! [`translator`] and cached for the life of the process.

pub mod translator;

pub use translator::{SchemaCache, table_name, translate};

use crate::error::{MkvError, MkvResult};
use crate::resource::{AUTHOR, LINK, PERMALINK, Resource, TIME};
use serde::Serialize;
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// Attribute name holding the last write time (epoch millis).
pub const UPDATED_AT_FIELD: &str = "_dateUpdated";

pub const AUTHOR_INDEX: &str = "AuthorAndDateIndex";
pub const PERMALINK_INDEX: &str = "PermalinkAndDateIndex";

/// Length/format hints carried by string attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StringConstraints {
    pub min_length: Option<u32>,
    pub max_length: Option<u32>,
    pub pattern: Option<String>,
    pub email: bool,
}

/// Storage type of one attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageType {
    String(StringConstraints),
    Number { min: Option<f64>, max: Option<f64> },
    Boolean,
    Date,
    Timestamp,
    /// Inlined object, stored as-is.
    Embedded,
    /// Reference to another resource, stored as `{ id, title }`.
    Stub,
    /// Reference with no usable target model.
    Blob,
    List { items: Box<StorageType> },
}

impl StorageType {
    pub fn plain_string() -> Self {
        StorageType::String(StringConstraints::default())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::String(_) => "string",
            StorageType::Number { .. } => "number",
            StorageType::Boolean => "boolean",
            StorageType::Date => "date",
            StorageType::Timestamp => "timestamp",
            StorageType::Embedded => "embedded",
            StorageType::Stub => "stub",
            StorageType::Blob => "blob",
            StorageType::List { .. } => "list",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Global,
}

/// Secondary index: a hash key plus optional range (sort) key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDefinition {
    pub name: String,
    pub hash_key: String,
    pub range_key: Option<String>,
    pub kind: IndexKind,
}

impl IndexDefinition {
    pub fn global(name: &str, hash_key: &str, range_key: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            hash_key: hash_key.to_string(),
            range_key: range_key.map(str::to_string),
            kind: IndexKind::Global,
        }
    }
}

/// The two fixed access patterns: list by author, list by revision chain.
pub fn default_indexes() -> Vec<IndexDefinition> {
    vec![
        IndexDefinition::global(AUTHOR_INDEX, AUTHOR, Some(TIME)),
        IndexDefinition::global(PERMALINK_INDEX, PERMALINK, Some(TIME)),
    ]
}

/// Primary key of a row.
#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    pub hash: Value,
    pub range: Option<Value>,
}

impl Key {
    pub fn hash(value: impl Into<Value>) -> Self {
        Self {
            hash: value.into(),
            range: None,
        }
    }

    pub fn with_range(mut self, value: impl Into<Value>) -> Self {
        self.range = Some(value.into());
        self
    }

    /// Canonical string form, used by backends as the storage key.
    pub fn encode(&self) -> String {
        match &self.range {
            None => value_key_string(&self.hash),
            Some(range) => format!(
                "{}\u{0}{}",
                value_key_string(&self.hash),
                value_key_string(range)
            ),
        }
    }
}

impl From<&str> for Key {
    fn from(link: &str) -> Self {
        Key::hash(link)
    }
}

impl From<String> for Key {
    fn from(link: String) -> Self {
        Key::hash(link)
    }
}

/// Strings encode as themselves, everything else as compact JSON.
pub(crate) fn value_key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Immutable physical schema of one model's table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDefinition {
    pub model_id: String,
    pub table_name: String,
    pub hash_key: String,
    pub range_key: Option<String>,
    pub indexes: Vec<IndexDefinition>,
    pub attributes: BTreeMap<String, StorageType>,
    pub updated_at_field: String,
}

impl TableDefinition {
    pub fn index(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// First index (declaration order) whose hash key is `property`.
    pub fn index_for_hash_key(&self, property: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|i| i.hash_key == property)
    }

    /// Primary hash key followed by every index hash key, in declaration order.
    pub fn indexed_properties(&self) -> SmallVec<[&str; 4]> {
        let mut props: SmallVec<[&str; 4]> = SmallVec::new();
        props.push(self.hash_key.as_str());
        for index in &self.indexes {
            if !props.contains(&index.hash_key.as_str()) {
                props.push(index.hash_key.as_str());
            }
        }
        props
    }

    /// Extract the primary key from a resource or row.
    pub fn key_of(&self, resource: &Resource) -> MkvResult<Key> {
        let hash = resource
            .get(&self.hash_key)
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| {
                MkvError::InvalidResource(format!(
                    "missing hash key '{}' for table '{}'",
                    self.hash_key, self.table_name
                ))
            })?;

        let range = match &self.range_key {
            None => None,
            Some(name) => Some(resource.get(name).cloned().ok_or_else(|| {
                MkvError::InvalidResource(format!(
                    "missing range key '{name}' for table '{}'",
                    self.table_name
                ))
            })?),
        };

        Ok(Key { hash, range })
    }

    /// Validate that a caller-supplied key matches this table's key shape.
    pub fn check_key(&self, key: &Key) -> MkvResult<()> {
        match (&self.range_key, &key.range) {
            (Some(name), None) => Err(MkvError::InvalidResource(format!(
                "table '{}' requires range key '{name}'",
                self.table_name
            ))),
            (None, Some(_)) => Err(MkvError::InvalidResource(format!(
                "table '{}' has no range key",
                self.table_name
            ))),
            _ => Ok(()),
        }
    }

    pub fn is_primary_key(&self, property: &str) -> bool {
        self.hash_key == property
    }
}

/// Name of the primary hash key attribute.
pub const HASH_KEY: &str = LINK;
