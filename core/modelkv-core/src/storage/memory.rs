//! In-memory backends using DashMap
//!
//! Default collaborators for tests and embedding. Call counters let callers
//! observe how often each operation reached the store.

use super::{KvBackend, KvRequest, ObjectStore, QueryOutput, WriteMode, finish_rows, missing_table};
use crate::error::{MkvError, MkvResult};
use crate::resource::Resource;
use crate::schema::{Key, TableDefinition};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory table store: one ordered map per table, keyed by encoded key.
#[derive(Default)]
pub struct MemoryBackend {
    tables: DashMap<String, BTreeMap<String, Resource>>,
    create_table_calls: AtomicUsize,
    failing_creates: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `create_table` calls received, including failed ones.
    pub fn create_table_calls(&self) -> usize {
        self.create_table_calls.load(Ordering::SeqCst)
    }

    /// Make the next `n` `create_table` calls fail with a backend error.
    pub fn fail_next_creates(&self, n: usize) {
        self.failing_creates.store(n, Ordering::SeqCst);
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map(|t| t.len()).unwrap_or(0)
    }

    fn take_failure(&self) -> bool {
        self.failing_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn create_table(&self, def: &TableDefinition) -> MkvResult<()> {
        self.create_table_calls.fetch_add(1, Ordering::SeqCst);
        // give concurrent callers a chance to pile up on the same creation
        tokio::task::yield_now().await;

        if self.take_failure() {
            return Err(MkvError::Backend(format!(
                "injected failure creating '{}'",
                def.table_name
            )));
        }

        match self.tables.entry(def.table_name.clone()) {
            Entry::Occupied(_) => Err(MkvError::TableAlreadyExists(def.table_name.clone())),
            Entry::Vacant(slot) => {
                slot.insert(BTreeMap::new());
                Ok(())
            }
        }
    }

    async fn get(&self, def: &TableDefinition, key: &Key) -> MkvResult<Option<Resource>> {
        let table = self
            .tables
            .get(&def.table_name)
            .ok_or_else(|| missing_table(&def.table_name))?;
        Ok(table.get(&key.encode()).cloned())
    }

    async fn put(&self, def: &TableDefinition, row: &Resource, mode: WriteMode) -> MkvResult<()> {
        let key = def.key_of(row)?.encode();
        let mut table = self
            .tables
            .get_mut(&def.table_name)
            .ok_or_else(|| missing_table(&def.table_name))?;

        match (table.entry(key), mode) {
            (btree_map::Entry::Occupied(slot), WriteMode::Create) => {
                Err(MkvError::ResourceExists(slot.key().clone()))
            }
            (btree_map::Entry::Occupied(mut slot), WriteMode::Update) => {
                slot.insert(row.clone());
                Ok(())
            }
            (btree_map::Entry::Vacant(slot), _) => {
                slot.insert(row.clone());
                Ok(())
            }
        }
    }

    async fn delete(&self, def: &TableDefinition, key: &Key) -> MkvResult<Option<Resource>> {
        let mut table = self
            .tables
            .get_mut(&def.table_name)
            .ok_or_else(|| missing_table(&def.table_name))?;
        Ok(table.remove(&key.encode()))
    }

    async fn execute(&self, def: &TableDefinition, request: &KvRequest) -> MkvResult<QueryOutput> {
        let table = self
            .tables
            .get(&def.table_name)
            .ok_or_else(|| missing_table(&def.table_name))?;

        match request {
            KvRequest::Query {
                hash_value,
                index,
                conditions,
                order,
                limit,
            } => {
                let (hash_attribute, range_attribute) =
                    KvRequest::key_attributes(def, index.as_deref())?;
                let rows = table
                    .values()
                    .filter(|row| {
                        row.get(hash_attribute)
                            .is_some_and(|v| super::compare::loose_eq(v, hash_value))
                    })
                    .cloned()
                    .collect();
                Ok(finish_rows(
                    rows,
                    conditions,
                    range_attribute,
                    *order,
                    *limit,
                ))
            }
            KvRequest::Scan { conditions, limit } => {
                let rows = table.values().cloned().collect();
                Ok(finish_rows(rows, conditions, None, None, *limit))
            }
        }
    }
}

/// In-memory overflow store keyed by link.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, Resource>,
    puts: AtomicUsize,
    gets: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, resource: &Resource) -> MkvResult<Resource> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let link = resource.require_link()?;
        self.objects.insert(link.to_string(), resource.clone());
        Ok(resource.clone())
    }

    async fn get_object_by_link(&self, link: &str) -> MkvResult<Resource> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.objects
            .get(link)
            .map(|r| r.value().clone())
            .ok_or_else(|| MkvError::not_found("object", link))
    }
}
