//! Overflow Codec: minify/inflate
//!
//! Physical rows have a size budget; logical resources do not. `minify`
//! evicts properties from a row in greedy passes until it fits, and
//! `inflate` restores a minified row from the full copy kept in the
//! overflow store.
//!
//! 축출 순서: 사진 참조 → 큰 값 → 선택 속성 → 전부

use crate::config::EngineConfig;
use crate::error::MkvResult;
use crate::model::{Model, RESERVED_PREFIX, introspect};
use crate::resource::{MINIFIED_FIELD, PROVENANCE_FIELDS, Resource, is_provenance};
use crate::storage::ObjectStore;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Eviction passes, applied in order until the row fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPass {
    /// References to photo-typed models.
    Photos,
    /// Values whose serialized size reaches the big-value threshold.
    BigValues,
    /// Anything not listed in the model's `required`.
    Optional,
    /// Last resort: every non-system property.
    All,
}

pub const EVICTION_PASSES: [EvictionPass; 4] = [
    EvictionPass::Photos,
    EvictionPass::BigValues,
    EvictionPass::Optional,
    EvictionPass::All,
];

/// Outcome of [`minify`].
#[derive(Debug, Clone, PartialEq)]
pub struct Minified {
    /// Row to write; carries the minified marker when anything was evicted.
    pub stored: Resource,
    /// Properties moved out of `stored`.
    pub evicted: Map<String, Value>,
    /// Full resource to mirror into the overflow store.
    pub overflow: Resource,
    pub was_minified: bool,
}

impl Minified {
    /// `stored` with the evicted properties merged back and the marker dropped.
    pub fn restore(&self) -> Resource {
        let mut restored = self.stored.clone();
        restored.remove(MINIFIED_FIELD);
        for (name, value) in &self.evicted {
            restored.insert(name.clone(), value.clone());
        }
        restored
    }
}

fn is_evictable(name: &str) -> bool {
    !is_provenance(name) && !name.starts_with(RESERVED_PREFIX)
}

fn value_size(value: &Value) -> MkvResult<usize> {
    Ok(match value {
        Value::String(s) => s.len(),
        other => serde_json::to_vec(other)?.len(),
    })
}

fn keeps(
    pass: EvictionPass,
    model: &Model,
    name: &str,
    value: &Value,
    config: &EngineConfig,
) -> MkvResult<bool> {
    Ok(match pass {
        EvictionPass::Photos => !model
            .properties
            .get(name)
            .and_then(introspect::ref_of)
            .is_some_and(|r| config.is_photo_model(r)),
        EvictionPass::BigValues => value_size(value)? < config.big_value_bytes,
        EvictionPass::Optional => introspect::is_required(model, name),
        EvictionPass::All => false,
    })
}

/// Shrink `resource` below `config.max_row_bytes`.
///
/// A row that is still too large after every pass is returned in its most
/// reduced form; oversize is tolerated, not an error.
pub fn minify(resource: &Resource, model: &Model, config: &EngineConfig) -> MkvResult<Minified> {
    let mut stored = resource.clone();
    let mut evicted = Map::new();

    for pass in EVICTION_PASSES {
        if stored.serialized_len()? < config.max_row_bytes {
            break;
        }

        let candidates: Vec<String> = stored
            .names()
            .filter(|name| is_evictable(name))
            .map(str::to_string)
            .collect();

        for name in candidates {
            let Some(value) = stored.get(&name) else {
                continue;
            };
            if keeps(pass, model, &name, value, config)? {
                continue;
            }
            if let Some(value) = stored.remove(&name) {
                evicted.insert(name, value);
                stored.insert(MINIFIED_FIELD, Value::Bool(true));
            }
        }

        debug!(model = %model.id, ?pass, evicted = evicted.len(), "eviction pass");
    }

    let size = stored.serialized_len()?;
    if size >= config.max_row_bytes {
        warn!(
            model = %model.id,
            link = resource.link().unwrap_or_default(),
            size,
            budget = config.max_row_bytes,
            "row exceeds budget after all eviction passes, storing as-is"
        );
    }

    let was_minified = !evicted.is_empty();
    Ok(Minified {
        stored,
        evicted,
        overflow: resource.clone(),
        was_minified,
    })
}

/// Restore a row. Unminified rows come back unchanged.
///
/// Data properties are replaced wholesale by the overflow copy; only the
/// row's provenance fields survive. Nothing is merged.
pub async fn inflate<S>(row: Resource, store: &S) -> MkvResult<Resource>
where
    S: ObjectStore + ?Sized,
{
    if !row.is_minified() {
        return Ok(row);
    }

    let link = row.require_link()?.to_string();
    let full = store.get_object_by_link(&link).await?;

    let mut restored = Map::new();
    for (name, value) in full.iter() {
        if name != MINIFIED_FIELD {
            restored.insert(name.clone(), value.clone());
        }
    }
    for name in PROVENANCE_FIELDS {
        if let Some(value) = row.get(name) {
            restored.insert(name.to_string(), value.clone());
        }
    }

    Ok(Resource::from_map(restored))
}

/// Inflate a batch concurrently; the first failure wins.
pub async fn inflate_all<S>(rows: Vec<Resource>, store: &S) -> MkvResult<Vec<Resource>>
where
    S: ObjectStore + ?Sized,
{
    try_join_all(rows.into_iter().map(|row| inflate(row, store))).await
}
