//! In-memory description of an entity's shape.
//!
//! A [`Form`] is built once at process start from the entity definition and
//! shared read-only with every handler afterwards. Identity is name-based:
//! two forms with the same name are equal regardless of their fields.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Type tag of a single field, serialized with the wire names consumers expect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "int")]
    Integer,
    #[serde(rename = "float")]
    Float,
    #[default]
    #[serde(rename = "str")]
    String,
    #[serde(rename = "coordinates")]
    Coordinates,
    #[serde(rename = "foreign_key")]
    ForeignKey,
}

fn default_true() -> bool {
    true
}

/// One attribute of a form.
///
/// Flags default to `true` when absent, matching what downstream form
/// renderers were built against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default = "default_true")]
    pub primary_key: bool,
    #[serde(default = "default_true")]
    pub unique: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub validation_code: Option<String>,
}

impl Field {
    /// Create a field with default flags.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            primary_key: true,
            unique: true,
            description: None,
            validation_code: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Float)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Named, ordered description of an entity's fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Form {
    pub name: String,
    pub fields: Vec<Field>,
    pub description: Option<String>,
}

impl Form {
    pub fn new(name: impl Into<String>, description: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
            description: Some(description.into()),
        }
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of all fields, in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

impl PartialEq for Form {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Form {}

impl Hash for Form {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}
