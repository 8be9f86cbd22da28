//! Resource models: declarative property schemas read by the mapping layer.
//!
//! Models arrive as JSON (`{ id, properties, required, ... }`). Each raw
//! property description is converted exactly once into a typed [`Property`]
//! whose [`PropertyType`] is a closed enum, so the rest of the engine never
//! switches on type strings. Unknown types fail at load time.

pub mod introspect;
pub mod registry;

pub use registry::ModelRegistry;

use crate::error::{MkvError, MkvResult};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Prefix reserved for system/protocol properties.
pub const RESERVED_PREFIX: char = '_';

// ════════════════════════════════════════════
// Typed model
// ════════════════════════════════════════════

/// Property kind declared by a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Date,
    Object,
    Array,
    Enum,
}

impl PropertyType {
    pub fn parse(type_name: &str) -> Option<Self> {
        match type_name {
            "string" => Some(PropertyType::String),
            "number" => Some(PropertyType::Number),
            "boolean" => Some(PropertyType::Boolean),
            "date" => Some(PropertyType::Date),
            "object" => Some(PropertyType::Object),
            "array" => Some(PropertyType::Array),
            "enum" => Some(PropertyType::Enum),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Number => "number",
            PropertyType::Boolean => "boolean",
            PropertyType::Date => "date",
            PropertyType::Object => "object",
            PropertyType::Array => "array",
            PropertyType::Enum => "enum",
        }
    }
}

/// Element description of an array property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Items {
    pub reference: Option<String>,
}

/// A single declared property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub kind: PropertyType,
    pub reference: Option<String>,
    pub items: Option<Items>,
    pub inlined: bool,
    pub backlink: bool,
    pub range: Option<String>,
    pub max_length: Option<u32>,
    pub min_length: Option<u32>,
    pub pattern: Option<String>,
    pub keyboard: Option<String>,
}

impl Property {
    pub fn new(kind: PropertyType) -> Self {
        Self {
            kind,
            reference: None,
            items: None,
            inlined: false,
            backlink: false,
            range: None,
            max_length: None,
            min_length: None,
            pattern: None,
            keyboard: None,
        }
    }

    pub fn string() -> Self {
        Self::new(PropertyType::String)
    }

    pub fn number() -> Self {
        Self::new(PropertyType::Number)
    }

    pub fn boolean() -> Self {
        Self::new(PropertyType::Boolean)
    }

    pub fn date() -> Self {
        Self::new(PropertyType::Date)
    }

    /// Object property referencing another model.
    pub fn reference(model_id: impl Into<String>) -> Self {
        let mut property = Self::new(PropertyType::Object);
        property.reference = Some(model_id.into());
        property
    }

    /// Array property whose items reference another model.
    pub fn array_of(model_id: impl Into<String>) -> Self {
        let mut property = Self::new(PropertyType::Array);
        property.items = Some(Items {
            reference: Some(model_id.into()),
        });
        property
    }

    /// Array property with inline (ref-less) items.
    pub fn inline_array() -> Self {
        let mut property = Self::new(PropertyType::Array);
        property.items = Some(Items::default());
        property
    }

    pub fn inlined(mut self) -> Self {
        self.inlined = true;
        self
    }

    pub fn backlink(mut self) -> Self {
        self.backlink = true;
        self
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }

    pub fn with_max_length(mut self, max: u32) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn with_min_length(mut self, min: u32) -> Self {
        self.min_length = Some(min);
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_keyboard(mut self, keyboard: impl Into<String>) -> Self {
        self.keyboard = Some(keyboard.into());
        self
    }
}

/// Declarative resource model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub id: String,
    pub title: Option<String>,
    pub properties: BTreeMap<String, Property>,
    pub required: Vec<String>,
    pub is_interface: bool,
    pub is_abstract: bool,
    pub sub_class_of: Option<String>,
    /// Instances of this model are embedded wherever they are referenced.
    pub inlined: bool,
}

impl Model {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            properties: BTreeMap::new(),
            required: Vec::new(),
            is_interface: false,
            is_abstract: false,
            sub_class_of: None,
            inlined: false,
        }
    }

    pub fn property(mut self, name: impl Into<String>, property: Property) -> Self {
        self.properties.insert(name.into(), property);
        self
    }

    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    pub fn interface(mut self) -> Self {
        self.is_interface = true;
        self
    }

    pub fn abstract_model(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn inlined(mut self) -> Self {
        self.inlined = true;
        self
    }

    /// Check structural invariants (`required` ⊆ `properties`).
    pub fn validate(&self) -> MkvResult<()> {
        if let Some(missing) = self
            .required
            .iter()
            .find(|name| !self.properties.contains_key(name.as_str()))
        {
            return Err(MkvError::InvalidModel {
                model: self.id.clone(),
                message: format!("required property '{missing}' is not declared"),
            });
        }
        Ok(())
    }

    /// Parse a single model from its JSON description.
    pub fn from_json(value: serde_json::Value) -> MkvResult<Self> {
        let raw: RawModel = serde_json::from_value(value)?;
        Model::try_from(raw)
    }
}

// ════════════════════════════════════════════
// Raw (JSON) model
// ════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawModel {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    properties: BTreeMap<String, RawProperty>,
    #[serde(default)]
    required: Vec<String>,
    #[serde(default)]
    is_interface: bool,
    #[serde(default, rename = "abstract")]
    is_abstract: bool,
    #[serde(default)]
    sub_class_of: Option<String>,
    #[serde(default)]
    inlined: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProperty {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default, rename = "ref")]
    reference: Option<String>,
    #[serde(default)]
    items: Option<RawItems>,
    #[serde(default)]
    inlined: bool,
    #[serde(default)]
    backlink: Option<serde_json::Value>,
    #[serde(default)]
    range: Option<String>,
    #[serde(default)]
    max_length: Option<u32>,
    #[serde(default)]
    min_length: Option<u32>,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    keyboard: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawItems {
    #[serde(default, rename = "ref")]
    reference: Option<String>,
}

impl TryFrom<RawModel> for Model {
    type Error = MkvError;

    fn try_from(raw: RawModel) -> Result<Self, Self::Error> {
        let mut properties = BTreeMap::new();
        for (name, raw_prop) in raw.properties {
            let kind = PropertyType::parse(&raw_prop.type_name).ok_or_else(|| {
                MkvError::UnknownPropertyType {
                    model: raw.id.clone(),
                    property: name.clone(),
                    type_name: raw_prop.type_name.clone(),
                }
            })?;

            // backlink is either a flag or the name of the forward property
            let backlink = match raw_prop.backlink {
                None | Some(serde_json::Value::Null) | Some(serde_json::Value::Bool(false)) => {
                    false
                }
                Some(_) => true,
            };

            properties.insert(
                name,
                Property {
                    kind,
                    reference: raw_prop.reference,
                    items: raw_prop.items.map(|items| Items {
                        reference: items.reference,
                    }),
                    inlined: raw_prop.inlined,
                    backlink,
                    range: raw_prop.range,
                    max_length: raw_prop.max_length,
                    min_length: raw_prop.min_length,
                    pattern: raw_prop.pattern,
                    keyboard: raw_prop.keyboard,
                },
            );
        }

        let model = Model {
            id: raw.id,
            title: raw.title,
            properties,
            required: raw.required,
            is_interface: raw.is_interface,
            is_abstract: raw.is_abstract,
            sub_class_of: raw.sub_class_of,
            inlined: raw.inlined,
        };
        model.validate()?;
        Ok(model)
    }
}
