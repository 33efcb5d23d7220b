use serde_json::Value;

use crate::cli::{ItemValueArgs, SchemaDefinitionArgs};
use crate::config::ConfigError;
use crate::domain::field::{FieldDraft, FieldType, RelationFieldDraft};
use crate::domain::item::{Item, ItemDraft};
use crate::domain::schema::{AppSchema, ConformanceError, SchemaDraft};
use crate::engine::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Usage(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ConformanceError> for CliError {
    fn from(value: ConformanceError) -> Self {
        CliError::Engine(value.into())
    }
}

/// `Name:type`; the type may itself not contain a colon.
pub fn parse_field_spec(raw: &str) -> Result<FieldDraft, CliError> {
    let (name, field_type) = raw
        .rsplit_once(':')
        .ok_or_else(|| CliError::Usage(format!("field '{raw}' must look like NAME:TYPE")))?;
    Ok(FieldDraft::new(name.trim(), FieldType::parse(field_type)))
}

pub fn parse_relation_spec(raw: &str) -> Result<RelationFieldDraft, CliError> {
    let (name, target) = split_pair(raw, "relation", "NAME=SCHEMA_ID")?;
    Ok(RelationFieldDraft::new(&name, &target))
}

/// `field=value`. The value is parsed as a JSON literal when possible so
/// numbers and booleans arrive typed; otherwise it is kept as text.
pub fn parse_assignment(raw: &str) -> Result<(String, Value), CliError> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| CliError::Usage(format!("value '{raw}' must look like FIELD=VALUE")))?;
    let parsed = serde_json::from_str::<Value>(value.trim())
        .unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.trim().to_string(), parsed))
}

pub fn parse_link(raw: &str) -> Result<(String, String), CliError> {
    split_pair(raw, "link", "RELATION=ITEM_ID")
}

fn split_pair(raw: &str, what: &str, shape: &str) -> Result<(String, String), CliError> {
    match raw.split_once('=') {
        Some((left, right)) if !left.trim().is_empty() && !right.trim().is_empty() => {
            Ok((left.trim().to_string(), right.trim().to_string()))
        }
        _ => Err(CliError::Usage(format!("{what} '{raw}' must look like {shape}"))),
    }
}

pub fn schema_draft(name: &str, definition: &SchemaDefinitionArgs) -> Result<SchemaDraft, CliError> {
    Ok(SchemaDraft {
        name: name.to_string(),
        icon_id: definition.icon.clone(),
        fields: definition
            .fields
            .iter()
            .map(|raw| parse_field_spec(raw))
            .collect::<Result<_, _>>()?,
        relation_fields: definition
            .relations
            .iter()
            .map(|raw| parse_relation_spec(raw))
            .collect::<Result<_, _>>()?,
    })
}

pub fn new_item_draft(
    schema: &AppSchema,
    name: &str,
    values: &ItemValueArgs,
) -> Result<ItemDraft, CliError> {
    let pairs = values
        .set
        .iter()
        .map(|raw| parse_assignment(raw))
        .collect::<Result<Vec<_>, _>>()?;
    let links = values
        .link
        .iter()
        .map(|raw| parse_link(raw))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(schema.draft_from_pairs(name, &pairs, &links)?)
}

/// Starts from the stored item and applies the overrides. A relation named
/// in `--link` has its targets replaced; other relations keep theirs.
pub fn update_item_draft(
    schema: &AppSchema,
    current: &Item,
    name: Option<&str>,
    values: &ItemValueArgs,
) -> Result<ItemDraft, CliError> {
    let mut pairs: Vec<(String, Value)> = current
        .field_values
        .iter()
        .map(|entry| (entry.name.clone(), entry.value.to_json()))
        .collect();
    for raw in &values.set {
        let (field, value) = parse_assignment(raw)?;
        pairs.retain(|(existing, _)| existing != &field);
        pairs.push((field, value));
    }

    let overrides = values
        .link
        .iter()
        .map(|raw| parse_link(raw))
        .collect::<Result<Vec<_>, _>>()?;
    let mut links = Vec::new();
    for relation in &current.relation_values {
        let replaced = overrides.iter().any(|(field, _)| {
            field == &relation.name || field == &relation.derived_property_name
        });
        if replaced {
            continue;
        }
        for related in &relation.edge.related_items {
            links.push((relation.name.clone(), related.related_item_id.clone()));
        }
    }
    links.extend(overrides);

    let name = name.unwrap_or(&current.descriptive_name);
    Ok(schema.draft_from_pairs(name, &pairs, &links)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_assignment, parse_field_spec, parse_link, parse_relation_spec, CliError};
    use crate::domain::field::FieldType;

    #[test]
    fn field_specs_split_on_the_last_colon() {
        let draft = parse_field_spec("Ratio: a:b:decimal").expect("field should parse");
        assert_eq!(draft.name, "Ratio: a:b");
        assert_eq!(draft.field_type, FieldType::Decimal);
        assert!(matches!(parse_field_spec("Total"), Err(CliError::Usage(_))));
    }

    #[test]
    fn assignments_parse_json_literals_and_fall_back_to_text() {
        assert_eq!(
            parse_assignment("Total=12.5").expect("should parse"),
            ("Total".to_string(), json!(12.5))
        );
        assert_eq!(
            parse_assignment("Active=true").expect("should parse"),
            ("Active".to_string(), json!(true))
        );
        assert_eq!(
            parse_assignment("Client Name=Acme = Co").expect("should parse"),
            ("Client Name".to_string(), json!("Acme = Co"))
        );
    }

    #[test]
    fn links_and_relations_need_both_sides() {
        assert_eq!(
            parse_link("Client=I-1").expect("should parse"),
            ("Client".to_string(), "I-1".to_string())
        );
        assert!(parse_link("Client=").is_err());
        let relation = parse_relation_spec("Client=S-9").expect("should parse");
        assert_eq!(relation.related_schema_id, "S-9");
        assert!(parse_relation_spec("=S-9").is_err());
    }
}
