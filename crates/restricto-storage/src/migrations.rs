use anyhow::Result;
use rusqlite::Connection;

/// Initialize database schema
///
/// # Errors
///
/// Returns an error if database table creation fails
pub fn init_schema(conn: &Connection) -> Result<()> {
    // Key/value store - restriction set and other namespaced string values
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv_store (
            namespace TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (namespace, key)
        )",
        [],
    )?;

    // Settings table - single-row monitor configuration
    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            paused INTEGER NOT NULL,
            tick_interval_ms INTEGER NOT NULL,
            cooldown_window_ms INTEGER NOT NULL,
            event_window_secs INTEGER NOT NULL,
            stats_lookback_ms INTEGER NOT NULL
        )",
        [],
    )?;

    Ok(())
}
