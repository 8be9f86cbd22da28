//! Schema Translator: Model → TableDefinition
//!
//! 최적화: DashMap 캐시로 모델당 한 번만 변환

use super::{
    HASH_KEY, StorageType, StringConstraints, TableDefinition, UPDATED_AT_FIELD, default_indexes,
};
use crate::config::EngineConfig;
use crate::error::MkvResult;
use crate::model::{Model, ModelRegistry, Property, PropertyType, introspect};
use crate::resource::{AUTHOR, LINK, MINIFIED_FIELD, PERMALINK, TIME};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Physical identifiers cannot contain `.`.
pub fn table_name(model_id: &str) -> String {
    model_id.replace('.', "_")
}

/// Translate a model into its physical table definition.
pub fn translate(
    model: &Model,
    models: &ModelRegistry,
    config: &EngineConfig,
) -> MkvResult<TableDefinition> {
    model.validate()?;

    let mut attributes = BTreeMap::new();
    for name in introspect::own_properties(model) {
        let property = &model.properties[name];
        attributes.insert(
            name.to_string(),
            storage_type(name, property, models, config),
        );
    }

    // provenance fields always exist, whatever the model declares
    attributes.insert(LINK.to_string(), StorageType::plain_string());
    attributes.insert(PERMALINK.to_string(), StorageType::plain_string());
    attributes.insert(AUTHOR.to_string(), StorageType::plain_string());
    attributes.insert(TIME.to_string(), StorageType::Timestamp);
    attributes.insert(MINIFIED_FIELD.to_string(), StorageType::Boolean);
    attributes.insert(UPDATED_AT_FIELD.to_string(), StorageType::Timestamp);

    let def = TableDefinition {
        model_id: model.id.clone(),
        table_name: table_name(&model.id),
        hash_key: HASH_KEY.to_string(),
        range_key: config.range_key.clone(),
        indexes: default_indexes(),
        attributes,
        updated_at_field: UPDATED_AT_FIELD.to_string(),
    };

    debug!(
        model = %model.id,
        table = %def.table_name,
        attributes = def.attributes.len(),
        "translated model"
    );
    Ok(def)
}

fn storage_type(
    name: &str,
    property: &Property,
    models: &ModelRegistry,
    config: &EngineConfig,
) -> StorageType {
    match property.kind {
        PropertyType::String => StorageType::String(StringConstraints {
            min_length: property.min_length,
            max_length: property.max_length,
            pattern: property.pattern.clone(),
            email: introspect::is_email_property(name, property),
        }),
        PropertyType::Enum => StorageType::plain_string(),
        PropertyType::Number => StorageType::Number {
            // digit counts: maxLength 3 → at most 999, minLength 2 → at least 10
            max: property.max_length.map(|n| 10f64.powi(n as i32) - 1.0),
            min: property
                .min_length
                .filter(|n| *n > 0)
                .map(|n| 10f64.powi(n as i32 - 1)),
        },
        PropertyType::Boolean => StorageType::Boolean,
        PropertyType::Date => StorageType::Date,
        PropertyType::Object => object_type(property, models, config),
        PropertyType::Array => StorageType::List {
            items: Box::new(object_type(property, models, config)),
        },
    }
}

fn object_type(property: &Property, models: &ModelRegistry, config: &EngineConfig) -> StorageType {
    if introspect::is_inlined(property, models) {
        return StorageType::Embedded;
    }

    let target = introspect::ref_of(property).and_then(|id| models.try_get(id));
    match target {
        Some(model) if introspect::is_instantiable(model, &config.base_model_id) => {
            StorageType::Stub
        }
        _ => StorageType::Blob,
    }
}

/// Process-wide cache of table definitions, keyed by model id.
///
/// Definitions are never recomputed; `reset` exists for tests.
#[derive(Default)]
pub struct SchemaCache {
    defs: DashMap<String, Arc<TableDefinition>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached definition, translating on first access.
    pub fn get_or_translate(
        &self,
        model: &Model,
        models: &ModelRegistry,
        config: &EngineConfig,
    ) -> MkvResult<Arc<TableDefinition>> {
        if let Some(def) = self.defs.get(&model.id) {
            return Ok(Arc::clone(def.value()));
        }

        // the entry lock makes translation happen once even under contention
        let entry = self
            .defs
            .entry(model.id.clone())
            .or_try_insert_with(|| translate(model, models, config).map(Arc::new))?;
        Ok(Arc::clone(entry.value()))
    }

    pub fn get(&self, model_id: &str) -> Option<Arc<TableDefinition>> {
        self.defs.get(model_id).map(|d| Arc::clone(d.value()))
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn reset(&self) {
        self.defs.clear();
    }
}
