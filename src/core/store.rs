//! Persistence adapter for change orders and their audit trail
//!
//! The engine never writes a change order without its audit entries: every
//! mutation goes through [`ChangeOrderStore::commit`], which applies the
//! record write and the audit append as one unit and rejects stale writes
//! with an optimistic version check.

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use thiserror::Error;

use crate::core::audit::{AuditEntry, NewAuditEntry};
use crate::core::identity::EntityId;
use crate::entities::change_order::ChangeOrder;

/// Record write carried by a commit
#[derive(Debug, Clone)]
pub enum Write {
    Insert(ChangeOrder),
    Update(ChangeOrder),
    Delete(EntityId),
}

impl Write {
    pub fn change_order_id(&self) -> &EntityId {
        match self {
            Write::Insert(co) | Write::Update(co) => &co.id,
            Write::Delete(id) => id,
        }
    }
}

/// A record write plus the audit entries that must land with it
#[derive(Debug, Clone)]
pub struct Commit {
    pub write: Write,
    /// Version the caller read; ignored for inserts
    pub expected_version: u32,
    pub audit: Vec<NewAuditEntry>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("change order {id} was modified concurrently (expected version {expected}, found {found})")]
    Conflict {
        id: EntityId,
        expected: u32,
        found: u32,
    },

    #[error("change order {0} already exists")]
    AlreadyExists(EntityId),

    #[error("change order {0} not found")]
    NotFound(EntityId),

    #[error("change order number {number} is already taken in project {project_id}")]
    NumberTaken { project_id: String, number: u32 },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode change order: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait ChangeOrderStore {
    /// Next sequential change order number within a project
    fn next_number(&self, project_id: &str) -> Result<u32, StoreError>;

    fn get(&self, id: &EntityId) -> Result<Option<ChangeOrder>, StoreError>;

    /// All change orders, optionally limited to one project, by number
    fn list(&self, project_id: Option<&str>) -> Result<Vec<ChangeOrder>, StoreError>;

    /// Apply the write and append the audit entries atomically
    fn commit(&mut self, commit: Commit) -> Result<Vec<AuditEntry>, StoreError>;

    /// Audit entries of one change order in sequence order
    fn audit(&self, id: &EntityId) -> Result<Vec<AuditEntry>, StoreError>;
}
