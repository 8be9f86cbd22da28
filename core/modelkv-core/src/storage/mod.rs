//! Storage module: physical key-value backends and the overflow store.
//!
//! The gateway and planner depend only on the [`KvBackend`] and
//! [`ObjectStore`] traits, never on concrete types.

pub mod compare;
pub mod condition;
pub mod memory;
pub mod sled_backend;

pub use condition::{Condition, ConditionOp};
pub use memory::{MemoryBackend, MemoryObjectStore};
pub use sled_backend::{SledBackend, SledObjectStore};

use crate::error::{MkvError, MkvResult};
use crate::resource::Resource;
use crate::schema::{Key, TableDefinition};
use async_trait::async_trait;
use serde_json::Value;

/// Conflict policy of [`KvBackend::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Conditional put: fails with `ResourceExists` if the key is taken.
    Create,
    /// Unconditional overwrite.
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// One read request against a table.
#[derive(Debug, Clone, PartialEq)]
pub enum KvRequest {
    /// Key-condition read on the primary key, or on `index` when set.
    Query {
        hash_value: Value,
        index: Option<String>,
        conditions: Vec<Condition>,
        order: Option<SortOrder>,
        limit: Option<usize>,
    },
    /// Full table pass.
    Scan {
        conditions: Vec<Condition>,
        limit: Option<usize>,
    },
}

impl KvRequest {
    /// `(hash attribute, range attribute)` addressed by a query.
    pub fn key_attributes<'a>(
        def: &'a TableDefinition,
        index: Option<&str>,
    ) -> MkvResult<(&'a str, Option<&'a str>)> {
        match index {
            None => Ok((def.hash_key.as_str(), def.range_key.as_deref())),
            Some(name) => {
                let index = def.index(name).ok_or_else(|| {
                    MkvError::Backend(format!(
                        "table '{}' has no index '{name}'",
                        def.table_name
                    ))
                })?;
                Ok((index.hash_key.as_str(), index.range_key.as_deref()))
            }
        }
    }
}

/// Result of [`KvBackend::execute`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub count: usize,
    pub items: Vec<Resource>,
}

impl QueryOutput {
    pub fn new(items: Vec<Resource>) -> Self {
        Self {
            count: items.len(),
            items,
        }
    }
}

/// Physical key-value store.
///
/// # Contract
///
/// - `create_table`: fails with `TableAlreadyExists` if the table exists.
/// - Every other call fails if the table was never created.
/// - `get`/`delete`: `None` for a missing key, never `NotFound`.
/// - `execute`: conditions are applied before `limit`.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn create_table(&self, def: &TableDefinition) -> MkvResult<()>;

    async fn get(&self, def: &TableDefinition, key: &Key) -> MkvResult<Option<Resource>>;

    async fn put(&self, def: &TableDefinition, row: &Resource, mode: WriteMode) -> MkvResult<()>;

    /// Returns the removed row.
    async fn delete(&self, def: &TableDefinition, key: &Key) -> MkvResult<Option<Resource>>;

    async fn execute(&self, def: &TableDefinition, request: &KvRequest) -> MkvResult<QueryOutput>;
}

/// Side store holding full resources, addressed by `link`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, resource: &Resource) -> MkvResult<Resource>;

    /// Fails with `NotFound` if absent.
    async fn get_object_by_link(&self, link: &str) -> MkvResult<Resource>;
}

/// Shared tail of every backend read: filter, order by the range attribute,
/// then limit.
pub(crate) fn finish_rows(
    mut rows: Vec<Resource>,
    conditions: &[Condition],
    range_attribute: Option<&str>,
    order: Option<SortOrder>,
    limit: Option<usize>,
) -> QueryOutput {
    rows.retain(|row| conditions.iter().all(|c| c.matches(row)));

    if let Some(attribute) = range_attribute {
        rows.sort_by(|a, b| compare::compare_optional(a.get(attribute), b.get(attribute)));
        if order == Some(SortOrder::Descending) {
            rows.reverse();
        }
    }

    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    QueryOutput::new(rows)
}

pub(crate) fn missing_table(table: &str) -> MkvError {
    MkvError::Backend(format!("table '{table}' does not exist"))
}
