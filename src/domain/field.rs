use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Declared type of a schema field. Types outside the known set are kept
/// verbatim in `Other` and their values are stored without coercion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Int,
    Decimal,
    Currency,
    Date,
    Datetime,
    Boolean,
    ItemRelation,
    Other(String),
}

impl FieldType {
    pub const KNOWN: [FieldType; 8] = [
        FieldType::String,
        FieldType::Int,
        FieldType::Decimal,
        FieldType::Currency,
        FieldType::Date,
        FieldType::Datetime,
        FieldType::Boolean,
        FieldType::ItemRelation,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Decimal => "decimal",
            FieldType::Currency => "currency",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::Boolean => "boolean",
            FieldType::ItemRelation => "itemRelation",
            FieldType::Other(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, FieldType::Other(_))
    }

    pub fn parse(raw: &str) -> FieldType {
        let trimmed = raw.trim();
        FieldType::KNOWN
            .into_iter()
            .find(|known| known.as_str().eq_ignore_ascii_case(trimmed))
            .unwrap_or_else(|| FieldType::Other(trimmed.to_string()))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(FieldType::parse(&raw))
    }
}

/// Lowercases the display name and replaces spaces with underscores.
pub fn derive_property_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub id: String,
    pub name: String,
    pub derived_property_name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelationFieldDefinition {
    pub id: String,
    pub name: String,
    pub derived_property_name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub related_schema_id: String,
    pub related_schema_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FieldDraft {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelationFieldDraft {
    pub name: String,
    pub related_schema_id: String,
    #[serde(default)]
    pub related_schema_name: String,
}

impl FieldDraft {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
        }
    }
}

impl RelationFieldDraft {
    pub fn new(name: &str, related_schema_id: &str) -> Self {
        Self {
            name: name.to_string(),
            related_schema_id: related_schema_id.to_string(),
            related_schema_name: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("schema name cannot be empty")]
    EmptySchemaName,
    #[error("field names cannot be empty")]
    EmptyFieldName,
    #[error("there can't be two fields with the same name ('{0}')")]
    DuplicateFieldName(String),
    #[error("field '{0}' cannot use type itemRelation; declare it as a relation field")]
    RelationTypeOnPlainField(String),
    #[error("relation field '{0}' must name a related schema")]
    MissingRelationTarget(String),
    #[error("two relation fields target schema '{0}'")]
    DuplicateRelationTarget(String),
}
