use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::field::FieldType;
use super::value::{coerce, FieldValue};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelatedItem {
    pub related_item_id: String,
    #[serde(default)]
    pub related_item_name: String,
}

/// One group of edges towards (outbound) or from (inbound) a single schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ItemRelation {
    pub related_schema_id: String,
    #[serde(default)]
    pub related_schema_name: String,
    #[serde(default)]
    pub related_items: Vec<RelatedItem>,
}

impl ItemRelation {
    pub fn new(schema_id: &str, schema_name: &str) -> Self {
        Self {
            related_schema_id: schema_id.to_string(),
            related_schema_name: schema_name.to_string(),
            related_items: Vec::new(),
        }
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.related_items
            .iter()
            .any(|related| related.related_item_id == item_id)
    }

    fn push_unique(&mut self, item: RelatedItem) -> bool {
        if self.contains(&item.related_item_id) {
            return false;
        }
        self.related_items.push(item);
        true
    }

    fn remove(&mut self, item_id: &str) -> bool {
        let before = self.related_items.len();
        self.related_items
            .retain(|related| related.related_item_id != item_id);
        before != self.related_items.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", try_from = "StoredFieldValue")]
pub struct FieldValueEntry {
    pub field_id: String,
    pub name: String,
    pub derived_property_name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub value: FieldValue,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredFieldValue {
    #[serde(default)]
    field_id: String,
    name: String,
    derived_property_name: String,
    #[serde(rename = "type")]
    field_type: FieldType,
    #[serde(default)]
    value: Value,
}

impl TryFrom<StoredFieldValue> for FieldValueEntry {
    type Error = String;

    fn try_from(stored: StoredFieldValue) -> Result<Self, Self::Error> {
        let value = coerce(&stored.field_type, &stored.value)
            .map_err(|err| format!("field '{}': {}", stored.name, err))?;
        Ok(Self {
            field_id: stored.field_id,
            name: stored.name,
            derived_property_name: stored.derived_property_name,
            field_type: stored.field_type,
            value,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelationValue {
    pub relation_field_id: String,
    pub name: String,
    pub derived_property_name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub edge: ItemRelation,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub schema_id: String,
    pub descriptive_name: String,
    pub field_values: Vec<FieldValueEntry>,
    pub relation_values: Vec<RelationValue>,
    pub relations: Vec<ItemRelation>,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Item {
    #[cfg(test)]
    pub fn field(&self, derived_property_name: &str) -> Option<&FieldValue> {
        self.field_values
            .iter()
            .find(|entry| entry.derived_property_name == derived_property_name)
            .map(|entry| &entry.value)
    }

    pub fn outbound(&self, target_schema_id: &str) -> Option<&ItemRelation> {
        self.relation_values
            .iter()
            .find(|value| value.edge.related_schema_id == target_schema_id)
            .map(|value| &value.edge)
    }

    pub fn inbound(&self, source_schema_id: &str) -> Option<&ItemRelation> {
        self.relations
            .iter()
            .find(|group| group.related_schema_id == source_schema_id)
    }

    pub fn has_outbound_field(&self, target_schema_id: &str) -> bool {
        self.outbound(target_schema_id).is_some()
    }

    /// Appends an outbound edge. Returns `None` when no relation field on this
    /// item targets `target_schema_id`, otherwise whether the edge was new.
    pub fn link_outbound(&mut self, target_schema_id: &str, target: RelatedItem) -> Option<bool> {
        self.relation_values
            .iter_mut()
            .find(|value| value.edge.related_schema_id == target_schema_id)
            .map(|value| value.edge.push_unique(target))
    }

    pub fn unlink_outbound(&mut self, target_schema_id: &str, target_item_id: &str) -> bool {
        self.relation_values
            .iter_mut()
            .filter(|value| value.edge.related_schema_id == target_schema_id)
            .fold(false, |changed, value| {
                value.edge.remove(target_item_id) || changed
            })
    }

    /// Records that `source` (an item of `source_schema_id`) points at this
    /// item, creating the inbound group for that schema when missing.
    pub fn link_inbound(
        &mut self,
        source_schema_id: &str,
        source_schema_name: &str,
        source: RelatedItem,
    ) -> bool {
        if let Some(group) = self
            .relations
            .iter_mut()
            .find(|group| group.related_schema_id == source_schema_id)
        {
            return group.push_unique(source);
        }
        let mut group = ItemRelation::new(source_schema_id, source_schema_name);
        group.related_items.push(source);
        self.relations.push(group);
        true
    }

    pub fn unlink_inbound(&mut self, source_schema_id: &str, source_item_id: &str) -> bool {
        self.relations
            .iter_mut()
            .filter(|group| group.related_schema_id == source_schema_id)
            .fold(false, |changed, group| group.remove(source_item_id) || changed)
    }

    /// `(schema, item)` pairs this item points at.
    pub fn outbound_targets(&self) -> Vec<(String, String)> {
        self.relation_values
            .iter()
            .flat_map(|value| {
                value.edge.related_items.iter().map(|related| {
                    (
                        value.edge.related_schema_id.clone(),
                        related.related_item_id.clone(),
                    )
                })
            })
            .collect()
    }

    /// `(schema, item)` pairs that point at this item.
    pub fn inbound_sources(&self) -> Vec<(String, String)> {
        self.relations
            .iter()
            .flat_map(|group| {
                group.related_items.iter().map(|related| {
                    (
                        group.related_schema_id.clone(),
                        related.related_item_id.clone(),
                    )
                })
            })
            .collect()
    }

    #[cfg(test)]
    pub fn references(&self, item_id: &str) -> bool {
        self.relation_values
            .iter()
            .any(|value| value.edge.contains(item_id))
            || self.relations.iter().any(|group| group.contains(item_id))
    }
}

/// Client-supplied field value, matched against the schema by
/// `(name, type, derivedPropertyName)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldValueInput {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub derived_property_name: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelationValueInput {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub derived_property_name: String,
    pub edge: ItemRelation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemDraft {
    pub descriptive_name: String,
    #[serde(default)]
    pub field_values: Vec<FieldValueInput>,
    #[serde(default)]
    pub relation_values: Vec<RelationValueInput>,
}
