use rusqlite::Connection;

use super::{Engine, EngineError};
use crate::db::{self, ActivityEntry};
use crate::domain::item::Item;
use crate::ids::IdKind;

impl Engine {
    pub(super) fn record_activity(
        &self,
        conn: &Connection,
        item: &Item,
        text: &str,
    ) -> Result<ActivityEntry, EngineError> {
        let entry = ActivityEntry {
            id: self.allocate(IdKind::Activity),
            item_id: item.id.clone(),
            app_id: item.schema_id.clone(),
            creator_id: self.actor.clone(),
            created_on: db::now_unix(),
            text: text.to_string(),
        };
        db::insert_activity(conn, &entry)?;
        Ok(entry)
    }

    pub fn add_activity(
        &self,
        schema_id: &str,
        item_id: &str,
        text: &str,
    ) -> Result<ActivityEntry, EngineError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::InvalidArgument(
                "activity text cannot be empty".to_string(),
            ));
        }
        self.write("add_activity", |tx| {
            let schema = self.load_schema(tx, schema_id)?;
            self.check_access(&schema)?;
            let item = db::get_item(tx, schema_id, item_id)?
                .ok_or_else(|| EngineError::not_found(IdKind::Item, item_id))?;
            self.record_activity(tx, &item, text)
        })
    }

    /// Oldest entry first.
    pub fn list_activity(
        &self,
        schema_id: &str,
        item_id: &str,
    ) -> Result<Vec<ActivityEntry>, EngineError> {
        let schema = self.load_schema(&self.conn, schema_id)?;
        self.check_access(&schema)?;
        Ok(db::list_activity(&self.conn, item_id)?)
    }
}
