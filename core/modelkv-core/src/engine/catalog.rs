//! Table catalog: one gateway per model id, one table creation per model id.
//!
//! 테이블 상태: Unknown → Creating → Ready
//!
//! Concurrent first accesses share a single in-flight creation future. A
//! completed future stays cached, so later callers resolve immediately. A
//! failed creation is evicted from the cache so the next caller retries.

use super::gateway::TableGateway;
use crate::config::EngineConfig;
use crate::error::{MkvError, MkvResult};
use crate::model::{ModelRegistry, introspect};
use crate::schema::{SchemaCache, TableDefinition};
use crate::storage::{KvBackend, ObjectStore};
use ahash::AHashMap;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared, try_join_all};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

type CreationFuture = Shared<BoxFuture<'static, Result<(), String>>>;

/// Guards physical table creation: at most one `create_table` per model id.
pub struct TableProvisioner {
    backend: Arc<dyn KvBackend>,
    in_flight: Mutex<AHashMap<String, CreationFuture>>,
}

impl TableProvisioner {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            in_flight: Mutex::new(AHashMap::new()),
        }
    }

    /// Resolve once the table backing `def` exists.
    ///
    /// "Already exists" from the backend counts as success.
    pub async fn ensure_table(&self, def: &Arc<TableDefinition>) -> MkvResult<()> {
        let creation = {
            let mut in_flight = self.in_flight.lock();
            in_flight
                .entry(def.model_id.clone())
                .or_insert_with(|| self.start_creation(Arc::clone(def)))
                .clone()
        };

        match creation.clone().await {
            Ok(()) => Ok(()),
            Err(reason) => {
                let mut in_flight = self.in_flight.lock();
                // a retry may already have replaced our entry
                if in_flight
                    .get(&def.model_id)
                    .is_some_and(|cached| cached.ptr_eq(&creation))
                {
                    in_flight.remove(&def.model_id);
                }
                Err(MkvError::TableCreation {
                    table: def.table_name.clone(),
                    reason,
                })
            }
        }
    }

    fn start_creation(&self, def: Arc<TableDefinition>) -> CreationFuture {
        let backend = Arc::clone(&self.backend);
        async move {
            match backend.create_table(&def).await {
                Ok(()) => {
                    info!(model = %def.model_id, table = %def.table_name, "table created");
                    Ok(())
                }
                Err(MkvError::TableAlreadyExists(_)) => {
                    debug!(table = %def.table_name, "table already exists");
                    Ok(())
                }
                Err(err) => {
                    warn!(table = %def.table_name, error = %err, "table creation failed");
                    Err(err.to_string())
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Whether a creation for `model_id` completed successfully.
    pub fn is_ready(&self, model_id: &str) -> bool {
        self.in_flight
            .lock()
            .get(model_id)
            .and_then(|f| f.peek().cloned())
            .is_some_and(|outcome| outcome.is_ok())
    }

    /// Forget every creation (tests only need this).
    pub fn reset(&self) {
        self.in_flight.lock().clear();
    }
}

/// Memoizing map from model id to [`TableGateway`].
pub struct TableCatalog {
    models: Arc<ModelRegistry>,
    config: Arc<EngineConfig>,
    backend: Arc<dyn KvBackend>,
    objects: Arc<dyn ObjectStore>,
    schemas: SchemaCache,
    provisioner: Arc<TableProvisioner>,
    gateways: DashMap<String, Arc<TableGateway>>,
}

impl TableCatalog {
    pub fn new(
        models: Arc<ModelRegistry>,
        config: Arc<EngineConfig>,
        backend: Arc<dyn KvBackend>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        let provisioner = Arc::new(TableProvisioner::new(Arc::clone(&backend)));
        Self {
            models,
            config,
            backend,
            objects,
            schemas: SchemaCache::new(),
            provisioner,
            gateways: DashMap::new(),
        }
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn provisioner(&self) -> &TableProvisioner {
        &self.provisioner
    }

    /// Cached table definition for an instantiable model.
    pub fn definition(&self, model_id: &str) -> MkvResult<Arc<TableDefinition>> {
        let model = self.models.get(model_id)?;
        if !introspect::is_instantiable(model, &self.config.base_model_id) {
            return Err(MkvError::InvalidModel {
                model: model_id.to_string(),
                message: "model is not instantiable and has no table".to_string(),
            });
        }
        self.schemas.get_or_translate(model, &self.models, &self.config)
    }

    /// The gateway for `model_id`, built on first access.
    ///
    /// Construction is cheap and does not touch the backend.
    pub fn get_or_create(&self, model_id: &str) -> MkvResult<Arc<TableGateway>> {
        if let Some(gateway) = self.gateways.get(model_id) {
            return Ok(Arc::clone(gateway.value()));
        }

        let def = self.definition(model_id)?;
        let model = Arc::clone(self.models.get(model_id)?);
        let gateway = self
            .gateways
            .entry(model_id.to_string())
            .or_insert_with(|| {
                Arc::new(TableGateway::new(
                    model,
                    def,
                    Arc::clone(&self.config),
                    Arc::clone(&self.backend),
                    Arc::clone(&self.objects),
                    Arc::clone(&self.provisioner),
                ))
            });
        Ok(Arc::clone(gateway.value()))
    }

    pub async fn ensure_table(&self, model_id: &str) -> MkvResult<()> {
        self.get_or_create(model_id)?.ensure_table().await
    }

    /// Ensure every instantiable model's table exists, concurrently.
    pub async fn provision_tables(&self) -> MkvResult<usize> {
        let gateways = self
            .models
            .instantiable_models(&self.config.base_model_id)
            .into_iter()
            .map(|id| self.get_or_create(id))
            .collect::<MkvResult<Vec<_>>>()?;

        try_join_all(gateways.iter().map(|gateway| gateway.ensure_table())).await?;
        info!(tables = gateways.len(), "provisioned tables");
        Ok(gateways.len())
    }

    /// Drop cached definitions, gateways and creation state.
    pub fn reset(&self) {
        self.gateways.clear();
        self.schemas.reset();
        self.provisioner.reset();
    }
}
