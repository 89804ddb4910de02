use anyhow::Result;
use rusqlite::Connection;
use tracing::debug;

/// Both tables hold a single row, pinned to `id = 1`.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS session (
            id          INTEGER PRIMARY KEY CHECK (id = 1),
            jwt         TEXT NOT NULL,
            user_json   TEXT NOT NULL,
            saved_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS settings (
            id              INTEGER PRIMARY KEY CHECK (id = 1),
            language        TEXT NOT NULL,
            speed           REAL NOT NULL,
            auto_speech     INTEGER NOT NULL,
            speech_engine   TEXT NOT NULL,
            updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    debug!("Database migrations complete");
    Ok(())
}
