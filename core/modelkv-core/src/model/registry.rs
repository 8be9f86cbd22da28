//! Model Registry: immutable id → model mapping, fully loaded before use

use super::{Model, RawModel, introspect};
use crate::error::{MkvError, MkvResult};
use ahash::AHashMap;
use std::sync::Arc;

/// Loaded models, keyed by id. Never mutated after construction.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: AHashMap<String, Arc<Model>>,
}

impl ModelRegistry {
    /// Build a registry, validating every model.
    pub fn new(models: impl IntoIterator<Item = Model>) -> MkvResult<Self> {
        let mut map = AHashMap::new();
        for model in models {
            model.validate()?;
            if map.contains_key(&model.id) {
                return Err(MkvError::InvalidModel {
                    model: model.id.clone(),
                    message: "duplicate model id".to_string(),
                });
            }
            map.insert(model.id.clone(), Arc::new(model));
        }
        Ok(Self { models: map })
    }

    /// Load from JSON: either an array of models or an object keyed by id.
    pub fn from_json_str(json: &str) -> MkvResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let raws: Vec<RawModel> = match value {
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(serde_json::from_value)
                .collect::<Result<_, _>>()?,
            serde_json::Value::Object(map) => map
                .into_iter()
                .map(|(_, v)| serde_json::from_value(v))
                .collect::<Result<_, _>>()?,
            _ => {
                return Err(MkvError::Serialization(
                    "models must be a JSON array or object".to_string(),
                ));
            }
        };

        let models = raws
            .into_iter()
            .map(Model::try_from)
            .collect::<MkvResult<Vec<_>>>()?;
        Self::new(models)
    }

    pub fn get(&self, id: &str) -> MkvResult<&Arc<Model>> {
        self.models
            .get(id)
            .ok_or_else(|| MkvError::UnknownModel(id.to_string()))
    }

    pub fn try_get(&self, id: &str) -> Option<&Arc<Model>> {
        self.models.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Model ids, sorted for deterministic iteration.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.models.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Ids of models that can own a physical table.
    pub fn instantiable_models(&self, base_model_id: &str) -> Vec<&str> {
        self.ids()
            .into_iter()
            .filter(|id| {
                self.models
                    .get(*id)
                    .is_some_and(|m| introspect::is_instantiable(m, base_model_id))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Property;

    #[test]
    fn test_load_array_and_map_forms() {
        let array = r#"[
            { "id": "tradle.Photo", "properties": { "url": { "type": "string" } } },
            { "id": "tradle.Widget", "properties": { "name": { "type": "string" } }, "required": ["name"] }
        ]"#;
        let registry = ModelRegistry::from_json_str(array).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec!["tradle.Photo", "tradle.Widget"]);

        let map = r#"{ "tradle.Photo": { "id": "tradle.Photo" } }"#;
        let registry = ModelRegistry::from_json_str(map).unwrap();
        assert!(registry.contains("tradle.Photo"));
    }

    #[test]
    fn test_unknown_type_fails_registry_load() {
        let json = r#"[{ "id": "a.B", "properties": { "x": { "type": "blob" } } }]"#;
        let err = ModelRegistry::from_json_str(json).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_unknown_model_lookup() {
        let registry = ModelRegistry::default();
        assert!(matches!(
            registry.get("nope"),
            Err(MkvError::UnknownModel(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = ModelRegistry::new(vec![Model::new("a.B"), Model::new("a.B")]).unwrap_err();
        assert!(matches!(err, MkvError::InvalidModel { .. }));
    }

    #[test]
    fn test_instantiable_models() {
        let registry = ModelRegistry::new(vec![
            Model::new("tradle.Model"),
            Model::new("tradle.Form").interface(),
            Model::new("tradle.Base").abstract_model(),
            Model::new("tradle.Widget").property("name", Property::string()),
        ])
        .unwrap();

        assert_eq!(
            registry.instantiable_models("tradle.Model"),
            vec!["tradle.Widget"]
        );
    }
}
