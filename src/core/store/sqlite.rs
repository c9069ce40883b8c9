//! SQLite-backed store; one transaction per commit

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::fs;
use std::path::Path;

use super::schema::init_schema;
use super::{ChangeOrderStore, Commit, StoreError, Write};
use crate::core::audit::AuditEntry;
use crate::core::identity::EntityId;
use crate::entities::change_order::ChangeOrder;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn stored_version(tx: &Transaction<'_>, id: &EntityId) -> Result<Option<u32>, StoreError> {
        Ok(tx
            .query_row(
                "SELECT version FROM change_orders WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn check_version(tx: &Transaction<'_>, id: &EntityId, expected: u32) -> Result<(), StoreError> {
        match Self::stored_version(tx, id)? {
            None => Err(StoreError::NotFound(id.clone())),
            Some(found) if found != expected => Err(StoreError::Conflict {
                id: id.clone(),
                expected,
                found,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Highest number issued in the project. Live rows are included for
    /// databases created before the counter table existed.
    fn issued_number(conn: &Connection, project_id: &str) -> Result<u32, StoreError> {
        Ok(conn.query_row(
            "SELECT MAX(
                COALESCE((SELECT last_number FROM number_counters WHERE project_id = ?1), 0),
                COALESCE((SELECT MAX(number) FROM change_orders WHERE project_id = ?1), 0)
             )",
            params![project_id],
            |row| row.get(0),
        )?)
    }

    fn write_order(tx: &Transaction<'_>, co: &ChangeOrder) -> Result<(), StoreError> {
        tx.execute(
            "INSERT OR REPLACE INTO change_orders
                (id, project_id, number, change_type, status, version, document)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                co.id.to_string(),
                co.project_id,
                co.number,
                co.change_type.as_str(),
                co.status.as_str(),
                co.version,
                serde_json::to_string(co)?,
            ],
        )?;
        Ok(())
    }

    fn apply(tx: &Transaction<'_>, commit: Commit) -> Result<Vec<AuditEntry>, StoreError> {
        match &commit.write {
            Write::Insert(co) => {
                if Self::stored_version(tx, &co.id)?.is_some() {
                    return Err(StoreError::AlreadyExists(co.id.clone()));
                }
                if co.number <= Self::issued_number(tx, &co.project_id)? {
                    return Err(StoreError::NumberTaken {
                        project_id: co.project_id.clone(),
                        number: co.number,
                    });
                }
                Self::write_order(tx, co)?;
                tx.execute(
                    "INSERT INTO number_counters (project_id, last_number) VALUES (?1, ?2)
                     ON CONFLICT (project_id) DO UPDATE
                     SET last_number = MAX(last_number, excluded.last_number)",
                    params![co.project_id, co.number],
                )?;
            }
            Write::Update(co) => {
                Self::check_version(tx, &co.id, commit.expected_version)?;
                Self::write_order(tx, co)?;
            }
            Write::Delete(id) => {
                Self::check_version(tx, id, commit.expected_version)?;
                tx.execute(
                    "DELETE FROM change_orders WHERE id = ?1",
                    params![id.to_string()],
                )?;
            }
        }

        let now = Utc::now();
        let mut sealed = Vec::with_capacity(commit.audit.len());
        for entry in commit.audit {
            let key = entry.change_order_id.to_string();
            let last: Option<(u32, String)> = tx
                .query_row(
                    "SELECT sequence, digest FROM audit_entries
                     WHERE change_order_id = ?1 ORDER BY sequence DESC LIMIT 1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let (sequence, previous) = match &last {
                Some((seq, digest)) => (seq + 1, Some(digest.as_str())),
                None => (1, None),
            };
            let entry = entry.seal(sequence, previous, now);
            tx.execute(
                "INSERT INTO audit_entries (id, change_order_id, sequence, digest, document)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.id.to_string(),
                    key,
                    entry.sequence,
                    entry.digest,
                    serde_json::to_string(&entry)?,
                ],
            )?;
            sealed.push(entry);
        }
        Ok(sealed)
    }
}

impl ChangeOrderStore for SqliteStore {
    fn next_number(&self, project_id: &str) -> Result<u32, StoreError> {
        Ok(Self::issued_number(&self.conn, project_id)? + 1)
    }

    fn get(&self, id: &EntityId) -> Result<Option<ChangeOrder>, StoreError> {
        let doc: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM change_orders WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match doc {
            Some(d) => Ok(Some(serde_json::from_str(&d)?)),
            None => Ok(None),
        }
    }

    fn list(&self, project_id: Option<&str>) -> Result<Vec<ChangeOrder>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT document FROM change_orders
             WHERE ?1 IS NULL OR project_id = ?1
             ORDER BY project_id, number",
        )?;
        let docs = stmt
            .query_map(params![project_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        docs.iter()
            .map(|d| serde_json::from_str(d).map_err(StoreError::from))
            .collect()
    }

    fn commit(&mut self, commit: Commit) -> Result<Vec<AuditEntry>, StoreError> {
        let tx = self.conn.transaction()?;
        let sealed = Self::apply(&tx, commit)?;
        tx.commit()?;
        Ok(sealed)
    }

    fn audit(&self, id: &EntityId) -> Result<Vec<AuditEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT document FROM audit_entries WHERE change_order_id = ?1 ORDER BY sequence",
        )?;
        let docs = stmt
            .query_map(params![id.to_string()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        docs.iter()
            .map(|d| serde_json::from_str(d).map_err(StoreError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audit::verify_chain;
    use crate::core::entity::ChangeStatus;
    use crate::core::store::tests::{commit_insert, commit_update, sample_order};
    use tempfile::tempdir;

    #[test]
    fn test_roundtrip_through_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join(".tcc/changes.db");
        let co = sample_order("gearbox", 1);
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.commit(commit_insert(&co)).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let loaded = store.get(&co.id).unwrap().unwrap();
        assert_eq!(loaded.title, co.title);
        assert_eq!(loaded.number, 1);
        assert_eq!(store.next_number("gearbox").unwrap(), 2);
        assert_eq!(store.list(None).unwrap().len(), 1);
        assert_eq!(store.list(Some("other")).unwrap().len(), 0);
    }

    #[test]
    fn test_audit_sequence_and_chain() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut co = sample_order("gearbox", 1);
        store.commit(commit_insert(&co)).unwrap();

        co.status = ChangeStatus::Submitted;
        co.version = 2;
        let sealed = store.commit(commit_update(&co, 1)).unwrap();
        assert_eq!(sealed[0].sequence, 2);

        let entries = store.audit(&co.id).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(verify_chain(&entries).is_ok());
    }

    #[test]
    fn test_conflict_rolls_back() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut co = sample_order("gearbox", 1);
        store.commit(commit_insert(&co)).unwrap();

        co.status = ChangeStatus::Submitted;
        co.version = 5;
        let err = store.commit(commit_update(&co, 4)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { found: 1, .. }));

        let stored = store.get(&co.id).unwrap().unwrap();
        assert_eq!(stored.status, ChangeStatus::Draft);
        assert_eq!(store.audit(&co.id).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_keeps_audit() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let co = sample_order("gearbox", 1);
        store.commit(commit_insert(&co)).unwrap();
        store
            .commit(Commit {
                write: Write::Delete(co.id.clone()),
                expected_version: 1,
                audit: vec![],
            })
            .unwrap();
        assert!(store.get(&co.id).unwrap().is_none());
        assert_eq!(store.audit(&co.id).unwrap().len(), 1);
    }

    #[test]
    fn test_audit_rows_are_immutable() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let co = sample_order("gearbox", 1);
        store.commit(commit_insert(&co)).unwrap();
        let err = store
            .conn
            .execute("DELETE FROM audit_entries", [])
            .unwrap_err();
        assert!(err.to_string().contains("immutable"));
    }

    #[test]
    fn test_deleted_numbers_are_not_reissued() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join(".tcc/changes.db");
        let second = sample_order("gearbox", 2);
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.commit(commit_insert(&sample_order("gearbox", 1))).unwrap();
            store.commit(commit_insert(&second)).unwrap();
            store
                .commit(Commit {
                    write: Write::Delete(second.id.clone()),
                    expected_version: second.version,
                    audit: Vec::new(),
                })
                .unwrap();
        }

        let mut store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.next_number("gearbox").unwrap(), 3);
        assert_eq!(store.next_number("other").unwrap(), 1);
        let err = store
            .commit(commit_insert(&sample_order("gearbox", 2)))
            .unwrap_err();
        assert!(matches!(err, StoreError::NumberTaken { number: 2, .. }));
        assert_eq!(store.audit(&second.id).unwrap().len(), 1);
    }
}
