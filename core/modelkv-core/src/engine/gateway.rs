//! Table Gateway: CRUD for one model's table.
//!
//! Writes minify the resource, stamp the update timestamp and mirror the
//! full resource into the overflow store. A create mirrors only once its
//! conditional put succeeded; an update writes both concurrently. Reads strip
//! row-only fields and inflate minified rows. Every call first ensures the
//! table exists.

use super::catalog::TableProvisioner;
use super::cursor::Cursor;
use crate::config::{EngineConfig, OverflowWrite};
use crate::error::{MkvError, MkvResult};
use crate::model::Model;
use crate::overflow;
use crate::resource::{MINIFIED_FIELD, Resource};
use crate::schema::{Key, TableDefinition};
use crate::storage::{KvBackend, ObjectStore, WriteMode};
use futures::future::try_join;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

pub struct TableGateway {
    model: Arc<Model>,
    def: Arc<TableDefinition>,
    config: Arc<EngineConfig>,
    backend: Arc<dyn KvBackend>,
    objects: Arc<dyn ObjectStore>,
    provisioner: Arc<TableProvisioner>,
}

impl TableGateway {
    pub(crate) fn new(
        model: Arc<Model>,
        def: Arc<TableDefinition>,
        config: Arc<EngineConfig>,
        backend: Arc<dyn KvBackend>,
        objects: Arc<dyn ObjectStore>,
        provisioner: Arc<TableProvisioner>,
    ) -> Self {
        Self {
            model,
            def,
            config,
            backend,
            objects,
            provisioner,
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn definition(&self) -> &TableDefinition {
        &self.def
    }

    pub(crate) fn backend(&self) -> &dyn KvBackend {
        self.backend.as_ref()
    }

    pub async fn ensure_table(&self) -> MkvResult<()> {
        self.provisioner.ensure_table(&self.def).await
    }

    /// Fetch by primary key. Fails with `NotFound` if there is no row.
    #[instrument(skip(self, key), fields(table = %self.def.table_name))]
    pub async fn get(&self, key: impl Into<Key>) -> MkvResult<Resource> {
        self.ensure_table().await?;
        let key = key.into();
        self.def.check_key(&key)?;

        let row = self
            .backend
            .get(&self.def, &key)
            .await?
            .ok_or_else(|| MkvError::not_found("resource", key.encode()))?;
        self.to_resource(row).await
    }

    /// Conditional put; fails with `ResourceExists` if the key is taken.
    ///
    /// Returns the complete resource, never the truncated row.
    #[instrument(skip_all, fields(table = %self.def.table_name))]
    pub async fn create(&self, resource: Resource) -> MkvResult<Resource> {
        self.write(resource, WriteMode::Create).await
    }

    /// Full overwrite. No merge with the stored row; last writer wins.
    #[instrument(skip_all, fields(table = %self.def.table_name))]
    pub async fn update(&self, resource: Resource) -> MkvResult<Resource> {
        self.write(resource, WriteMode::Update).await
    }

    /// Delete by key, returning the removed resource (inflated).
    #[instrument(skip(self, key), fields(table = %self.def.table_name))]
    pub async fn destroy(&self, key: impl Into<Key>) -> MkvResult<Resource> {
        self.ensure_table().await?;
        let key = key.into();
        self.def.check_key(&key)?;

        let row = self
            .backend
            .delete(&self.def, &key)
            .await?
            .ok_or_else(|| MkvError::not_found("resource", key.encode()))?;
        self.to_resource(row).await
    }

    /// Key-condition query on the primary key (or an index, see [`Cursor::using_index`]).
    pub fn query(&self, hash_value: impl Into<Value>) -> Cursor<'_> {
        Cursor::query(self, hash_value.into())
    }

    pub fn scan(&self) -> Cursor<'_> {
        Cursor::scan(self)
    }

    async fn write(&self, resource: Resource, mode: WriteMode) -> MkvResult<Resource> {
        self.ensure_table().await?;
        // fail before any I/O if the key is missing
        self.def.key_of(&resource)?;
        self.check_row_fields(&resource)?;

        let minified = overflow::minify(&resource, &self.model, &self.config)?;
        let mut row = minified.stored.clone();
        row.insert(self.def.updated_at_field.clone(), Value::from(Self::now()));

        let mirror = match self.config.overflow_write {
            OverflowWrite::Always => true,
            OverflowWrite::OnMinify => minified.was_minified,
        };

        match (mirror, mode) {
            (false, _) => self.backend.put(&self.def, &row, mode).await?,
            // the overflow copy of an existing row must survive a rejected create
            (true, WriteMode::Create) => {
                self.backend.put(&self.def, &row, mode).await?;
                self.objects.put_object(&minified.overflow).await?;
            }
            (true, WriteMode::Update) => {
                try_join(
                    self.backend.put(&self.def, &row, mode),
                    self.objects.put_object(&minified.overflow),
                )
                .await?;
            }
        }

        debug!(
            link = resource.link().unwrap_or_default(),
            minified = minified.was_minified,
            evicted = minified.evicted.len(),
            mirrored = mirror,
            ?mode,
            "row written"
        );
        Ok(minified.restore())
    }

    /// The minified marker and the update timestamp exist only on physical rows.
    fn check_row_fields(&self, resource: &Resource) -> MkvResult<()> {
        for field in [MINIFIED_FIELD, self.def.updated_at_field.as_str()] {
            if resource.contains(field) {
                return Err(MkvError::InvalidResource(format!(
                    "'{field}' is reserved for physical rows"
                )));
            }
        }
        Ok(())
    }

    /// Physical row → logical resource.
    pub(crate) async fn to_resource(&self, mut row: Resource) -> MkvResult<Resource> {
        row.remove(&self.def.updated_at_field);
        overflow::inflate(row, self.objects.as_ref()).await
    }

    fn now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}
