//! SQLite schema for the change order store

use rusqlite::{params, Connection, OptionalExtension};

use super::StoreError;

/// Current schema version for migrations
pub(super) const SCHEMA_VERSION: i32 = 1;

pub(super) fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        -- Change orders, stored as JSON documents with indexed columns
        CREATE TABLE IF NOT EXISTS change_orders (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            number INTEGER NOT NULL,
            change_type TEXT NOT NULL,
            status TEXT NOT NULL,
            version INTEGER NOT NULL,
            document TEXT NOT NULL,
            UNIQUE (project_id, number)
        );
        CREATE INDEX IF NOT EXISTS idx_change_orders_project ON change_orders(project_id);
        CREATE INDEX IF NOT EXISTS idx_change_orders_status ON change_orders(status);

        -- Highest number ever issued per project; deletes never lower it
        CREATE TABLE IF NOT EXISTS number_counters (
            project_id TEXT PRIMARY KEY,
            last_number INTEGER NOT NULL
        );

        -- Audit trail; rows outlive deleted drafts
        CREATE TABLE IF NOT EXISTS audit_entries (
            id TEXT PRIMARY KEY,
            change_order_id TEXT NOT NULL,
            sequence INTEGER NOT NULL,
            digest TEXT NOT NULL,
            document TEXT NOT NULL,
            UNIQUE (change_order_id, sequence)
        );

        -- The ledger is write-once
        CREATE TRIGGER IF NOT EXISTS audit_entries_no_update
        BEFORE UPDATE ON audit_entries
        BEGIN
            SELECT RAISE(ABORT, 'audit entries are immutable');
        END;
        CREATE TRIGGER IF NOT EXISTS audit_entries_no_delete
        BEFORE DELETE ON audit_entries
        BEGIN
            SELECT RAISE(ABORT, 'audit entries are immutable');
        END;
        "#,
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;
    if version.is_none() {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
    }
    Ok(())
}
