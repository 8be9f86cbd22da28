//! Engine configuration
//!
//! Defaults match the production deployment: ~1KB rows, 50 byte "big value"
//! threshold, photos evicted first. Values can be loaded from a JSON file and
//! overridden through `MODELKV_*` environment variables.

use crate::error::{MkvError, MkvResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Default physical row budget in serialized bytes.
pub const DEFAULT_MAX_ROW_BYTES: usize = 1000;
/// Values at or above this serialized size are evicted in the second pass.
pub const DEFAULT_BIG_VALUE_BYTES: usize = 50;
/// Model id that is never instantiable.
pub const DEFAULT_BASE_MODEL_ID: &str = "tradle.Model";

/// When the full resource is mirrored into the overflow store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowWrite {
    /// Every create/update writes the full resource.
    #[default]
    Always,
    /// Only writes that evicted properties touch the overflow store.
    OnMinify,
}

impl OverflowWrite {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverflowWrite::Always => "always",
            OverflowWrite::OnMinify => "on_minify",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "always" => Some(OverflowWrite::Always),
            "on_minify" => Some(OverflowWrite::OnMinify),
            _ => None,
        }
    }
}

/// Tunables shared by the schema translator, overflow codec and gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_row_bytes: usize,
    pub big_value_bytes: usize,
    /// Models whose references are assumed to dominate row size.
    pub photo_models: Vec<String>,
    pub overflow_write: OverflowWrite,
    /// Optional primary range key (provenance field name, e.g. `time`).
    pub range_key: Option<String>,
    pub base_model_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_row_bytes: DEFAULT_MAX_ROW_BYTES,
            big_value_bytes: DEFAULT_BIG_VALUE_BYTES,
            photo_models: vec!["tradle.Photo".to_string()],
            overflow_write: OverflowWrite::Always,
            range_key: None,
            base_model_id: DEFAULT_BASE_MODEL_ID.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_row_bytes(mut self, bytes: usize) -> Self {
        self.max_row_bytes = bytes;
        self
    }

    pub fn with_photo_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.photo_models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_overflow_write(mut self, policy: OverflowWrite) -> Self {
        self.overflow_write = policy;
        self
    }

    pub fn with_range_key(mut self, name: impl Into<String>) -> Self {
        self.range_key = Some(name.into());
        self
    }

    pub fn is_photo_model(&self, model_id: &str) -> bool {
        self.photo_models.iter().any(|m| m == model_id)
    }

    /// Load from a JSON file. Missing keys keep their defaults.
    pub fn load_from_file(path: &Path) -> MkvResult<Self> {
        let json = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MODELKV_*` environment overrides on top of `self`.
    pub fn load_from_env(mut self) -> MkvResult<Self> {
        if let Ok(value) = env::var("MODELKV_MAX_ROW_BYTES") {
            self.max_row_bytes = parse_usize("MODELKV_MAX_ROW_BYTES", &value)?;
        }
        if let Ok(value) = env::var("MODELKV_BIG_VALUE_BYTES") {
            self.big_value_bytes = parse_usize("MODELKV_BIG_VALUE_BYTES", &value)?;
        }
        if let Ok(value) = env::var("MODELKV_PHOTO_MODELS") {
            self.photo_models = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(value) = env::var("MODELKV_OVERFLOW_WRITE") {
            self.overflow_write = OverflowWrite::parse(value.trim()).ok_or_else(|| {
                MkvError::InvalidConfig(format!("MODELKV_OVERFLOW_WRITE: unknown policy '{value}'"))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> MkvResult<()> {
        if self.max_row_bytes == 0 {
            return Err(MkvError::InvalidConfig(
                "max_row_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_usize(var: &str, value: &str) -> MkvResult<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| MkvError::InvalidConfig(format!("{var}: expected a number, got '{value}'")))
}
