use serde::Serialize;
use serde_json::json;
use time::OffsetDateTime;

use crate::domain::field::{FieldDraft, FieldType, RelationFieldDraft};
use crate::domain::schema::SchemaDraft;
use crate::engine::{Engine, EngineError};

const CLIENTS: i64 = 29;
const INVOICES: i64 = 59;
const DAY: i64 = 86_400;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SeedSummary {
    pub clients_schema_id: String,
    pub invoices_schema_id: String,
    pub clients: usize,
    pub invoices: usize,
}

fn today_midnight_utc() -> i64 {
    OffsetDateTime::now_utc()
        .date()
        .midnight()
        .assume_utc()
        .unix_timestamp()
}

/// Populates a workspace with "Clients Sample" and "Invoices Sample".
/// Every invoice links to one client picked by `i % 28`, so the last
/// client never receives an invoice.
pub fn seed_sample_schemas(
    engine: &Engine,
    workspace_id: &str,
) -> Result<SeedSummary, EngineError> {
    let today = today_midnight_utc();

    let clients = engine.create_schema(
        workspace_id,
        &SchemaDraft {
            name: "Clients Sample".to_string(),
            icon_id: Some("icon-55".to_string()),
            fields: vec![
                FieldDraft::new("Client Name", FieldType::String),
                FieldDraft::new("Active", FieldType::Boolean),
                FieldDraft::new("Day of sale", FieldType::Date),
                FieldDraft::new("Total", FieldType::Decimal),
                FieldDraft::new("Discount", FieldType::Decimal),
            ],
            relation_fields: Vec::new(),
        },
    )?;

    let mut client_items = Vec::with_capacity(CLIENTS as usize);
    for i in 1..=CLIENTS {
        let draft = clients.draft_from_pairs(
            &format!("Client Name {i}"),
            &[
                ("Client Name".to_string(), json!(format!("Client {i}"))),
                ("Active".to_string(), json!(i % 4 != 0)),
                ("Day of sale".to_string(), json!(today - 2 * i * DAY)),
                ("Total".to_string(), json!(3 * i)),
                ("Discount".to_string(), json!(0)),
            ],
            &[],
        )?;
        client_items.push(engine.create_item(&clients.id, &draft)?);
    }

    let invoices = engine.create_schema(
        workspace_id,
        &SchemaDraft {
            name: "Invoices Sample".to_string(),
            icon_id: Some("icon-180".to_string()),
            fields: vec![
                FieldDraft::new("Description", FieldType::String),
                FieldDraft::new("Paid", FieldType::Boolean),
                FieldDraft::new("Date", FieldType::Date),
                FieldDraft::new("Total", FieldType::Decimal),
            ],
            relation_fields: vec![RelationFieldDraft::new("Client", &clients.id)],
        },
    )?;

    let mut invoice_count = 0;
    for i in 1..=INVOICES {
        let client = &client_items[(i % 28) as usize];
        let draft = invoices.draft_from_pairs(
            &format!("Invoice {i} - {}", client.descriptive_name),
            &[
                (
                    "Description".to_string(),
                    json!(format!("This is a description for invoice number {i}")),
                ),
                ("Paid".to_string(), json!(i % 4 != 0)),
                ("Date".to_string(), json!(today - i * 5 * DAY / 2)),
                ("Total".to_string(), json!(3 * i)),
            ],
            &[("Client".to_string(), client.id.clone())],
        )?;
        engine.create_item(&invoices.id, &draft)?;
        invoice_count += 1;
    }

    tracing::info!(
        workspace = %workspace_id,
        clients = client_items.len(),
        invoices = invoice_count,
        "sample schemas seeded"
    );
    Ok(SeedSummary {
        clients_schema_id: clients.id,
        invoices_schema_id: invoices.id,
        clients: client_items.len(),
        invoices: invoice_count,
    })
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::seed_sample_schemas;
    use crate::config::Config;
    use crate::domain::value::FieldValue;
    use crate::engine::Engine;

    #[test]
    fn seeds_linked_clients_and_invoices() {
        let path = std::env::temp_dir()
            .join(format!("schemata-seed-{}.sqlite", Uuid::now_v7()))
            .display()
            .to_string();
        let engine = Engine::open(&path, &Config::default(), "alice").expect("engine should open");

        let summary = seed_sample_schemas(&engine, "W-demo").expect("seed should succeed");
        assert_eq!(summary.clients, 29);
        assert_eq!(summary.invoices, 59);

        let clients = engine
            .list_items(&summary.clients_schema_id)
            .expect("clients should list");
        let invoices = engine
            .list_items(&summary.invoices_schema_id)
            .expect("invoices should list");
        assert_eq!(clients.len(), 29);
        assert_eq!(invoices.len(), 59);

        let first = invoices
            .iter()
            .find(|invoice| invoice.descriptive_name.starts_with("Invoice 1 - "))
            .expect("invoice 1 should exist");
        assert_eq!(first.descriptive_name, "Invoice 1 - Client Name 2");
        assert_eq!(first.field("paid"), Some(&FieldValue::Boolean(true)));
        assert_eq!(first.field("total"), Some(&FieldValue::Decimal(3.0)));

        let inbound_counts: Vec<usize> = clients
            .iter()
            .map(|client| {
                client
                    .inbound(&summary.invoices_schema_id)
                    .map_or(0, |group| group.related_items.len())
            })
            .collect();
        assert_eq!(inbound_counts.iter().sum::<usize>(), 59);
        let lonely = clients
            .iter()
            .find(|client| client.descriptive_name == "Client Name 29")
            .expect("client 29 should exist");
        assert!(lonely.relations.is_empty());

        assert!(engine.fsck(false).expect("fsck should run").ok());

        drop(engine);
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{path}{suffix}"));
        }
    }
}
