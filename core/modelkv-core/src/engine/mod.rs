//! Engine module: wires models, config and collaborators together.
//!
//! # 구조
//!
//! ```text
//! Engine
//!  └─ TableCatalog ── SchemaCache (model → TableDefinition)
//!      ├─ TableProvisioner (single-flight create_table)
//!      └─ TableGateway per model ── Cursor
//! ```

pub mod catalog;
pub mod cursor;
pub mod gateway;

pub use catalog::{TableCatalog, TableProvisioner};
pub use cursor::Cursor;
pub use gateway::TableGateway;

use crate::config::EngineConfig;
use crate::error::MkvResult;
use crate::model::ModelRegistry;
use crate::query::{Filter, OrderBy, execute, plan};
use crate::resolver::Resolvers;
use crate::resource::Resource;
use crate::storage::{KvBackend, MemoryBackend, MemoryObjectStore, ObjectStore};
use std::sync::Arc;
use tracing::{info, instrument};

/// Entry point: owns the catalog and hands out gateways and resolvers.
///
/// # 예제
///
/// ```rust
/// use modelkv_core::{Engine, EngineConfig, Model, ModelRegistry, Property, Resource};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> modelkv_core::MkvResult<()> {
/// let models = ModelRegistry::new(vec![
///     Model::new("acme.Widget")
///         .property("name", Property::string())
///         .required("name"),
/// ])?;
/// let engine = Engine::in_memory(models, EngineConfig::default())?;
///
/// let widgets = engine.table("acme.Widget")?;
/// widgets
///     .create(Resource::new().with("link", "L1").with("name", "x"))
///     .await?;
/// assert_eq!(widgets.get("L1").await?.get("name"), Some(&"x".into()));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Engine {
    catalog: Arc<TableCatalog>,
}

impl Engine {
    #[instrument(skip_all, fields(models = models.len()))]
    pub fn new(
        models: ModelRegistry,
        config: EngineConfig,
        backend: Arc<dyn KvBackend>,
        objects: Arc<dyn ObjectStore>,
    ) -> MkvResult<Self> {
        config.validate()?;
        info!(
            max_row_bytes = config.max_row_bytes,
            overflow_write = config.overflow_write.as_str(),
            "engine ready"
        );
        let catalog = TableCatalog::new(Arc::new(models), Arc::new(config), backend, objects);
        Ok(Self {
            catalog: Arc::new(catalog),
        })
    }

    /// Engine over [`MemoryBackend`] and [`MemoryObjectStore`].
    pub fn in_memory(models: ModelRegistry, config: EngineConfig) -> MkvResult<Self> {
        Self::new(
            models,
            config,
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryObjectStore::new()),
        )
    }

    pub fn catalog(&self) -> &TableCatalog {
        &self.catalog
    }

    pub fn models(&self) -> &ModelRegistry {
        self.catalog.models()
    }

    pub fn config(&self) -> &EngineConfig {
        self.catalog.config()
    }

    /// Gateway for `model_id`.
    pub fn table(&self, model_id: &str) -> MkvResult<Arc<TableGateway>> {
        self.catalog.get_or_create(model_id)
    }

    /// Plan and run a filtered, ordered, limited read.
    pub async fn list(
        &self,
        model_id: &str,
        filter: &Filter,
        order_by: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> MkvResult<Vec<Resource>> {
        let table = self.table(model_id)?;
        let plan = plan(table.definition(), filter, order_by, limit);
        execute(&table, &plan).await
    }

    /// Create every instantiable model's table up front.
    pub async fn provision_tables(&self) -> MkvResult<usize> {
        self.catalog.provision_tables().await
    }

    pub fn resolvers(&self) -> Resolvers {
        Resolvers::new(Arc::clone(&self.catalog))
    }

    /// Clear process-wide caches (test isolation).
    pub fn reset(&self) {
        self.catalog.reset();
    }
}
