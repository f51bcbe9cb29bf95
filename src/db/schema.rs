use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

pub const SCHEMA_VERSION: i32 = 2;

/// Initialize database schema
pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        [],
    )?;

    let current_version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    match current_version {
        None => {
            create_schema(conn)?;
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )?;
        }
        Some(v) if v < SCHEMA_VERSION => {
            // Derived data: the next sync repopulates it
            info!("Index schema v{v} is outdated; recreating tables");
            recreate(conn)?;
            conn.execute("UPDATE schema_version SET version = ?1", [SCHEMA_VERSION])?;
        }
        _ => {}
    }

    Ok(())
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- One record per known remote file
        CREATE TABLE IF NOT EXISTS files (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            modified_at TEXT NOT NULL,
            status TEXT NOT NULL,
            chunk_count INTEGER NOT NULL DEFAULT 0,
            dropped_chunks INTEGER NOT NULL DEFAULT 0
        );

        -- Chunk texts and vectors; position keeps the parallel order
        CREATE TABLE IF NOT EXISTS chunks (
            position INTEGER PRIMARY KEY,
            file_id TEXT NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL
        );

        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_id);
        CREATE INDEX IF NOT EXISTS idx_files_status ON files(status);
        ",
    )?;

    Ok(())
}

fn recreate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        DROP TABLE IF EXISTS files;
        DROP TABLE IF EXISTS chunks;
        DROP TABLE IF EXISTS embeddings;
        DROP TABLE IF EXISTS index_meta;
        ",
    )?;
    create_schema(conn)
}
