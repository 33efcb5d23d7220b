use std::path::Path;

use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};

use crate::access::{AccessControl, AccessError};
use crate::config::Config;
use crate::db;
use crate::domain::field::DefinitionError;
use crate::domain::schema::{AppSchema, ConformanceError};
use crate::domain::value::CoercionError;
use crate::fsck::{self, FsckReport};
use crate::ids::{IdAllocator, IdKind, UuidAllocator};
use crate::retry::{RetryPolicy, Retryable};

mod activity;
mod items;
mod relations;
mod schemas;
mod tasks;

/// Schema registry, item store and task cascade over one SQLite store.
/// Every mutating call runs in a single IMMEDIATE transaction on behalf of
/// `actor`.
pub struct Engine {
    conn: Connection,
    access: Box<dyn AccessControl>,
    ids: Box<dyn IdAllocator>,
    retry: RetryPolicy,
    page_size: u32,
    actor: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: IdKind, id: String },
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("invalid definition: {0}")]
    InvalidDefinition(#[from] DefinitionError),
    #[error("invalid value for field '{field}': {source}")]
    InvalidValue {
        field: String,
        #[source]
        source: CoercionError,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("access denied: {0}")]
    AccessDenied(#[from] AccessError),
    #[error("{id} was modified concurrently (expected version {expected}, found {actual})")]
    Conflict {
        id: String,
        expected: i64,
        actual: i64,
    },
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn not_found(kind: IdKind, id: &str) -> Self {
        EngineError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<ConformanceError> for EngineError {
    fn from(value: ConformanceError) -> Self {
        match value {
            ConformanceError::Mismatch(message) => EngineError::SchemaMismatch(message),
            ConformanceError::Value { field, source } => EngineError::InvalidValue { field, source },
        }
    }
}

impl Retryable for EngineError {
    fn is_transient(&self) -> bool {
        match self {
            EngineError::Db(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

fn ensure_parent_dir(path: &str) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

impl Engine {
    pub fn open(db_path: &str, config: &Config, actor: &str) -> Result<Self, EngineError> {
        ensure_parent_dir(db_path)?;
        let busy_timeout = std::time::Duration::from_millis(config.store.busy_timeout_ms);
        let conn = db::open_connection(db_path, busy_timeout)?;
        Ok(Self {
            conn,
            access: config.access_control(),
            ids: Box::new(UuidAllocator),
            retry: config.retry,
            page_size: config.store.page_size.max(1),
            actor: actor.to_string(),
        })
    }

    #[cfg(test)]
    pub fn with_access(mut self, access: Box<dyn AccessControl>) -> Self {
        self.access = access;
        self
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    #[cfg(test)]
    pub fn set_actor(&mut self, actor: &str) {
        self.actor = actor.to_string();
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    fn allocate(&self, kind: IdKind) -> String {
        self.ids.allocate(kind)
    }

    /// Runs `op` inside one IMMEDIATE transaction, re-running the whole
    /// transaction on busy/locked failures.
    fn write<T>(
        &self,
        label: &str,
        mut op: impl FnMut(&Transaction<'_>) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        self.retry.run(label, || {
            let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
            let value = op(&tx)?;
            tx.commit()?;
            Ok(value)
        })
    }

    fn load_schema(&self, conn: &Connection, schema_id: &str) -> Result<AppSchema, EngineError> {
        db::get_schema(conn, schema_id)?.ok_or_else(|| EngineError::not_found(IdKind::Schema, schema_id))
    }

    fn check_access(&self, schema: &AppSchema) -> Result<(), EngineError> {
        self.access
            .assert_can_access_schema(&self.actor, &schema.id, &schema.workspace_id)?;
        Ok(())
    }

    fn check_modify(&self, schema: &AppSchema) -> Result<(), EngineError> {
        self.access
            .assert_can_modify_schema(&self.actor, &schema.id, &schema.workspace_id)?;
        Ok(())
    }

    /// Consistency check over the whole store. Repairs run in one
    /// transaction and report only the issues they could not fix.
    pub fn fsck(&self, repair: bool) -> Result<FsckReport, EngineError> {
        if repair {
            self.write("fsck_repair", |tx| Ok(fsck::run_fsck(tx, true)?))
        } else {
            Ok(fsck::run_fsck(&self.conn, false)?)
        }
    }
}

#[cfg(test)]
mod tests_cascade;
