use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::field::{
    derive_property_name, DefinitionError, FieldDefinition, FieldDraft, FieldType,
    RelationFieldDefinition, RelationFieldDraft,
};
use super::item::{
    FieldValueEntry, FieldValueInput, ItemDraft, ItemRelation, RelatedItem, RelationValue,
    RelationValueInput,
};
use super::value::{coerce, CoercionError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppSchema {
    pub id: String,
    pub name: String,
    pub icon_id: Option<String>,
    pub workspace_id: String,
    pub fields: Vec<FieldDefinition>,
    pub relation_fields: Vec<RelationFieldDefinition>,
    pub item_ids: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDraft {
    pub name: String,
    #[serde(default)]
    pub icon_id: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDraft>,
    #[serde(default)]
    pub relation_fields: Vec<RelationFieldDraft>,
}

/// Field structure produced by [`define_fields`], ready to attach to a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinedFields {
    pub fields: Vec<FieldDefinition>,
    pub relation_fields: Vec<RelationFieldDefinition>,
}

/// Validates a draft and assigns a fresh id to every field.
///
/// Relation field targets are taken as given; resolving the target schema's
/// name is the caller's job since it needs the store.
pub fn define_fields(
    draft: &SchemaDraft,
    mut mint_id: impl FnMut() -> String,
) -> Result<DefinedFields, DefinitionError> {
    if draft.name.trim().is_empty() {
        return Err(DefinitionError::EmptySchemaName);
    }

    let mut derived_names = HashSet::new();
    let mut claim = |name: &str| -> Result<String, DefinitionError> {
        if name.trim().is_empty() {
            return Err(DefinitionError::EmptyFieldName);
        }
        let derived = derive_property_name(name);
        if !derived_names.insert(derived.clone()) {
            return Err(DefinitionError::DuplicateFieldName(derived));
        }
        Ok(derived)
    };

    let mut fields = Vec::with_capacity(draft.fields.len());
    for field in &draft.fields {
        if field.field_type == FieldType::ItemRelation {
            return Err(DefinitionError::RelationTypeOnPlainField(field.name.clone()));
        }
        let derived = claim(&field.name)?;
        if !field.field_type.is_known() {
            tracing::warn!(
                field = %field.name,
                field_type = %field.field_type,
                "unknown field type; values will be stored unvalidated"
            );
        }
        fields.push(FieldDefinition {
            id: mint_id(),
            name: field.name.clone(),
            derived_property_name: derived,
            field_type: field.field_type.clone(),
        });
    }

    let mut targets = HashSet::new();
    let mut relation_fields = Vec::with_capacity(draft.relation_fields.len());
    for relation in &draft.relation_fields {
        let derived = claim(&relation.name)?;
        let target = relation.related_schema_id.trim();
        if target.is_empty() {
            return Err(DefinitionError::MissingRelationTarget(relation.name.clone()));
        }
        if !targets.insert(target.to_string()) {
            return Err(DefinitionError::DuplicateRelationTarget(target.to_string()));
        }
        relation_fields.push(RelationFieldDefinition {
            id: mint_id(),
            name: relation.name.clone(),
            derived_property_name: derived,
            field_type: FieldType::ItemRelation,
            related_schema_id: target.to_string(),
            related_schema_name: relation.related_schema_name.clone(),
        });
    }

    Ok(DefinedFields {
        fields,
        relation_fields,
    })
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConformanceError {
    #[error("{0}")]
    Mismatch(String),
    #[error("field '{field}': {source}")]
    Value {
        field: String,
        #[source]
        source: CoercionError,
    },
}

/// An item draft that matched its schema exactly: values coerced, relation
/// entries laid out per relation field with no edges yet, and the list of
/// requested targets per relation field.
#[derive(Debug, Clone, PartialEq)]
pub struct ConformedItem {
    pub descriptive_name: String,
    pub field_values: Vec<FieldValueEntry>,
    pub relation_values: Vec<RelationValue>,
    pub requested_edges: Vec<(String, Vec<String>)>,
}

impl ConformedItem {
    #[cfg(test)]
    pub fn requested_targets(&self, target_schema_id: &str) -> &[String] {
        self.requested_edges
            .iter()
            .find(|(schema_id, _)| schema_id == target_schema_id)
            .map(|(_, ids)| ids.as_slice())
            .unwrap_or(&[])
    }
}

fn match_exactly<'a, I>(
    kind: &str,
    definitions: impl Iterator<Item = (&'a str, &'a FieldType, &'a str)>,
    inputs: &[I],
    key: impl Fn(&I) -> (&str, &FieldType, &str),
) -> Result<Vec<usize>, ConformanceError> {
    let mut used = vec![false; inputs.len()];
    let mut order = Vec::new();
    for (name, field_type, derived) in definitions {
        let mut matched = inputs
            .iter()
            .enumerate()
            .filter(|(_, input)| key(input) == (name, field_type, derived));
        let Some((index, _)) = matched.next() else {
            return Err(ConformanceError::Mismatch(format!(
                "missing {kind} '{name}' ({field_type}, {derived})"
            )));
        };
        if matched.next().is_some() {
            return Err(ConformanceError::Mismatch(format!(
                "{kind} '{name}' was supplied more than once"
            )));
        }
        used[index] = true;
        order.push(index);
    }
    if let Some(extra) = used.iter().position(|used| !used) {
        let (name, field_type, derived) = key(&inputs[extra]);
        return Err(ConformanceError::Mismatch(format!(
            "{kind} '{name}' ({field_type}, {derived}) is not defined on this schema"
        )));
    }
    Ok(order)
}

impl AppSchema {
    pub fn has_items(&self) -> bool {
        !self.item_ids.is_empty()
    }

    /// Checks that `draft` carries exactly this schema's fields and relation
    /// fields, then coerces every value to its declared type.
    pub fn conform(&self, draft: &ItemDraft) -> Result<ConformedItem, ConformanceError> {
        let field_order = match_exactly(
            "field",
            self.fields.iter().map(|field| {
                (
                    field.name.as_str(),
                    &field.field_type,
                    field.derived_property_name.as_str(),
                )
            }),
            &draft.field_values,
            |input: &FieldValueInput| {
                (
                    input.name.as_str(),
                    &input.field_type,
                    input.derived_property_name.as_str(),
                )
            },
        )?;
        let relation_order = match_exactly(
            "relation field",
            self.relation_fields.iter().map(|relation| {
                (
                    relation.name.as_str(),
                    &relation.field_type,
                    relation.derived_property_name.as_str(),
                )
            }),
            &draft.relation_values,
            |input: &RelationValueInput| {
                (
                    input.name.as_str(),
                    &input.field_type,
                    input.derived_property_name.as_str(),
                )
            },
        )?;

        let mut field_values = Vec::with_capacity(self.fields.len());
        for (definition, index) in self.fields.iter().zip(field_order) {
            let input = &draft.field_values[index];
            let value = coerce(&definition.field_type, &input.value).map_err(|source| {
                ConformanceError::Value {
                    field: definition.name.clone(),
                    source,
                }
            })?;
            field_values.push(FieldValueEntry {
                field_id: definition.id.clone(),
                name: definition.name.clone(),
                derived_property_name: definition.derived_property_name.clone(),
                field_type: definition.field_type.clone(),
                value,
            });
        }

        let mut relation_values = Vec::with_capacity(self.relation_fields.len());
        let mut requested_edges = Vec::with_capacity(self.relation_fields.len());
        for (definition, index) in self.relation_fields.iter().zip(relation_order) {
            let input = &draft.relation_values[index];
            let declared = input.edge.related_schema_id.trim();
            if !declared.is_empty() && declared != definition.related_schema_id {
                return Err(ConformanceError::Mismatch(format!(
                    "relation field '{}' points at schema {}, not {}",
                    definition.name, definition.related_schema_id, declared
                )));
            }
            let mut targets: Vec<String> = Vec::new();
            for related in &input.edge.related_items {
                let id = related.related_item_id.trim();
                if id.is_empty() {
                    return Err(ConformanceError::Mismatch(format!(
                        "relation field '{}' has an empty related item id",
                        definition.name
                    )));
                }
                if !targets.iter().any(|existing| existing == id) {
                    targets.push(id.to_string());
                }
            }
            relation_values.push(RelationValue {
                relation_field_id: definition.id.clone(),
                name: definition.name.clone(),
                derived_property_name: definition.derived_property_name.clone(),
                field_type: FieldType::ItemRelation,
                edge: ItemRelation::new(
                    &definition.related_schema_id,
                    &definition.related_schema_name,
                ),
            });
            requested_edges.push((definition.related_schema_id.clone(), targets));
        }

        Ok(ConformedItem {
            descriptive_name: draft.descriptive_name.clone(),
            field_values,
            relation_values,
            requested_edges,
        })
    }

    /// Builds a conforming draft from loose `field=value` and
    /// `relation=item-id` pairs. Fields are looked up by display name or
    /// derived name; fields that are not mentioned are left empty.
    pub fn draft_from_pairs(
        &self,
        descriptive_name: &str,
        values: &[(String, Value)],
        links: &[(String, String)],
    ) -> Result<ItemDraft, ConformanceError> {
        let mut draft = ItemDraft {
            descriptive_name: descriptive_name.to_string(),
            field_values: self
                .fields
                .iter()
                .map(|field| FieldValueInput {
                    name: field.name.clone(),
                    field_type: field.field_type.clone(),
                    derived_property_name: field.derived_property_name.clone(),
                    value: Value::Null,
                })
                .collect(),
            relation_values: self
                .relation_fields
                .iter()
                .map(|relation| RelationValueInput {
                    name: relation.name.clone(),
                    field_type: relation.field_type.clone(),
                    derived_property_name: relation.derived_property_name.clone(),
                    edge: ItemRelation::new(
                        &relation.related_schema_id,
                        &relation.related_schema_name,
                    ),
                })
                .collect(),
        };

        for (key, value) in values {
            let derived = derive_property_name(key);
            let slot = draft
                .field_values
                .iter_mut()
                .find(|input| input.name == *key || input.derived_property_name == derived)
                .ok_or_else(|| {
                    ConformanceError::Mismatch(format!("field '{key}' is not defined on this schema"))
                })?;
            slot.value = value.clone();
        }

        for (key, item_id) in links {
            let derived = derive_property_name(key);
            let slot = draft
                .relation_values
                .iter_mut()
                .find(|input| input.name == *key || input.derived_property_name == derived)
                .ok_or_else(|| {
                    ConformanceError::Mismatch(format!(
                        "relation field '{key}' is not defined on this schema"
                    ))
                })?;
            slot.edge.related_items.push(RelatedItem {
                related_item_id: item_id.clone(),
                related_item_name: String::new(),
            });
        }

        Ok(draft)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{define_fields, AppSchema, ConformanceError, SchemaDraft};
    use crate::domain::field::{DefinitionError, FieldDraft, FieldType, RelationFieldDraft};
    use crate::domain::value::FieldValue;

    fn counter() -> impl FnMut() -> String {
        let mut next = 0;
        move || {
            next += 1;
            format!("F-{next}")
        }
    }

    fn clients_schema() -> AppSchema {
        let draft = SchemaDraft {
            name: "Clients".to_string(),
            icon_id: None,
            fields: vec![
                FieldDraft::new("Name", FieldType::String),
                FieldDraft::new("Active", FieldType::Boolean),
            ],
            relation_fields: vec![RelationFieldDraft::new("Region", "S-reg")],
        };
        let defined = define_fields(&draft, counter()).expect("draft should be valid");
        AppSchema {
            id: "S-cli".to_string(),
            name: draft.name,
            icon_id: None,
            workspace_id: "W-1".to_string(),
            fields: defined.fields,
            relation_fields: defined.relation_fields,
            item_ids: Vec::new(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn define_assigns_ids_and_derived_names() {
        let schema = clients_schema();
        assert_eq!(schema.fields[0].id, "F-1");
        assert_eq!(schema.fields[1].derived_property_name, "active");
        assert_eq!(schema.relation_fields[0].id, "F-3");
        assert_eq!(schema.relation_fields[0].field_type, FieldType::ItemRelation);
    }

    #[test]
    fn define_rejects_colliding_derived_names() {
        let draft = SchemaDraft {
            name: "Sales".to_string(),
            fields: vec![
                FieldDraft::new("Day Of Sale", FieldType::Date),
                FieldDraft::new("day of sale", FieldType::Date),
            ],
            ..SchemaDraft::default()
        };
        assert_eq!(
            define_fields(&draft, counter()),
            Err(DefinitionError::DuplicateFieldName("day_of_sale".to_string()))
        );

        let across = SchemaDraft {
            name: "Sales".to_string(),
            fields: vec![FieldDraft::new("Client", FieldType::String)],
            relation_fields: vec![RelationFieldDraft::new("client", "S-cli")],
            ..SchemaDraft::default()
        };
        assert!(matches!(
            define_fields(&across, counter()),
            Err(DefinitionError::DuplicateFieldName(_))
        ));
    }

    #[test]
    fn define_rejects_structural_mistakes() {
        let relation_on_plain = SchemaDraft {
            name: "X".to_string(),
            fields: vec![FieldDraft::new("Link", FieldType::ItemRelation)],
            ..SchemaDraft::default()
        };
        assert!(matches!(
            define_fields(&relation_on_plain, counter()),
            Err(DefinitionError::RelationTypeOnPlainField(_))
        ));

        let double_target = SchemaDraft {
            name: "X".to_string(),
            relation_fields: vec![
                RelationFieldDraft::new("Buyer", "S-cli"),
                RelationFieldDraft::new("Seller", "S-cli"),
            ],
            ..SchemaDraft::default()
        };
        assert_eq!(
            define_fields(&double_target, counter()),
            Err(DefinitionError::DuplicateRelationTarget("S-cli".to_string()))
        );

        let unnamed = SchemaDraft::default();
        assert_eq!(
            define_fields(&unnamed, counter()),
            Err(DefinitionError::EmptySchemaName)
        );
    }

    #[test]
    fn conform_requires_exact_field_set() {
        let schema = clients_schema();
        let draft = schema
            .draft_from_pairs(
                "Acme",
                &[
                    ("Name".to_string(), json!("Acme")),
                    ("active".to_string(), json!("true")),
                ],
                &[("Region".to_string(), "I-r1".to_string())],
            )
            .expect("pairs should map onto the schema");
        let conformed = schema.conform(&draft).expect("draft should conform");
        assert_eq!(conformed.field_values[1].value, FieldValue::Boolean(true));
        assert_eq!(conformed.requested_targets("S-reg"), ["I-r1".to_string()]);
        assert!(conformed.relation_values[0].edge.related_items.is_empty());

        let mut missing = draft.clone();
        missing.field_values.pop();
        assert!(matches!(
            schema.conform(&missing),
            Err(ConformanceError::Mismatch(_))
        ));

        let mut extra = draft.clone();
        let mut bogus = extra.field_values[0].clone();
        bogus.name = "Nickname".to_string();
        bogus.derived_property_name = "nickname".to_string();
        extra.field_values.push(bogus);
        assert!(matches!(
            schema.conform(&extra),
            Err(ConformanceError::Mismatch(_))
        ));

        let mut retyped = draft.clone();
        retyped.field_values[1].field_type = FieldType::String;
        assert!(matches!(
            schema.conform(&retyped),
            Err(ConformanceError::Mismatch(_))
        ));

        let mut duplicated = draft.clone();
        let copy = duplicated.field_values[0].clone();
        duplicated.field_values.push(copy);
        assert!(matches!(
            schema.conform(&duplicated),
            Err(ConformanceError::Mismatch(_))
        ));

        let mut no_relations = draft;
        no_relations.relation_values.clear();
        assert!(matches!(
            schema.conform(&no_relations),
            Err(ConformanceError::Mismatch(_))
        ));
    }

    #[test]
    fn conform_reports_bad_values_and_wrong_relation_targets() {
        let schema = clients_schema();
        let draft = schema
            .draft_from_pairs("Acme", &[("Active".to_string(), json!("maybe"))], &[])
            .expect("pairs should map onto the schema");
        assert!(matches!(
            schema.conform(&draft),
            Err(ConformanceError::Value { .. })
        ));

        let mut wrong_target = schema
            .draft_from_pairs("Acme", &[], &[])
            .expect("pairs should map onto the schema");
        wrong_target.relation_values[0].edge.related_schema_id = "S-other".to_string();
        assert!(matches!(
            schema.conform(&wrong_target),
            Err(ConformanceError::Mismatch(_))
        ));

        assert!(schema
            .draft_from_pairs("Acme", &[("Missing".to_string(), json!(1))], &[])
            .is_err());
    }

    #[test]
    fn conform_dedupes_requested_targets() {
        let schema = clients_schema();
        let draft = schema
            .draft_from_pairs(
                "Acme",
                &[],
                &[
                    ("region".to_string(), "I-r1".to_string()),
                    ("Region".to_string(), "I-r1".to_string()),
                ],
            )
            .expect("pairs should map onto the schema");
        let conformed = schema.conform(&draft).expect("draft should conform");
        assert_eq!(conformed.requested_targets("S-reg").len(), 1);
    }
}
