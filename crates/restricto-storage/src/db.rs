use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;

use crate::migrations;
use crate::models::{MonitorSettings, RestrictionSet};

/// Fixed namespace/key pair under which the restriction set is persisted.
const RESTRICTIONS_NAMESPACE: &str = "restricto";
const RESTRICTIONS_KEY: &str = "restricted_apps";

/// Database connection wrapper
pub struct Database {
    conn: Connection,
}

// Implement Send and Sync for Database to allow sharing across threads
unsafe impl Send for Database {}
unsafe impl Sync for Database {}

impl Database {
    /// Create a new database connection
    ///
    /// # Errors
    ///
    /// Returns an error if database directory creation, connection opening,
    /// or schema initialization fails
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = db_path.unwrap_or_else(Self::default_db_path);

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(&path).context("Failed to open database connection")?;
        migrations::init_schema(&conn)?;

        log::info!("Database initialized at: {}", path.display());

        Ok(Self { conn })
    }

    /// Get default database path
    fn default_db_path() -> PathBuf {
        let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("restricto");
        path.push("restricto.db");
        path
    }

    // ==================== Restriction Store ====================

    /// Load the persisted restriction set.
    ///
    /// A missing row is an empty set, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or the stored value
    /// cannot be parsed
    pub fn load_restrictions(&self) -> Result<RestrictionSet> {
        let value = self.kv_get(RESTRICTIONS_NAMESPACE, RESTRICTIONS_KEY)?;
        match value {
            Some(json) => {
                serde_json::from_str(&json).context("Failed to parse stored restriction set")
            }
            None => Ok(RestrictionSet::new()),
        }
    }

    /// Persist the restriction set, replacing any previous value wholesale.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database write fails
    pub fn save_restrictions(&self, restrictions: &RestrictionSet) -> Result<()> {
        let json = serde_json::to_string(restrictions)?;
        self.kv_set(RESTRICTIONS_NAMESPACE, RESTRICTIONS_KEY, &json)?;
        log::debug!("Saved restriction set ({} entries)", restrictions.len());
        Ok(())
    }

    // ==================== Settings ====================

    /// Get monitor settings, inserting defaults on first access.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn get_settings(&self) -> Result<MonitorSettings> {
        let settings = self
            .conn
            .query_row(
                "SELECT paused, tick_interval_ms, cooldown_window_ms, event_window_secs, stats_lookback_ms
                 FROM settings WHERE id = 1",
                [],
                |row| {
                    Ok(MonitorSettings {
                        paused: row.get::<_, i64>(0)? != 0,
                        tick_interval_ms: row.get::<_, i64>(1)?.unsigned_abs(),
                        cooldown_window_ms: row.get::<_, i64>(2)?.unsigned_abs(),
                        event_window_secs: row.get::<_, i64>(3)?.unsigned_abs(),
                        stats_lookback_ms: row.get::<_, i64>(4)?.unsigned_abs(),
                    })
                },
            )
            .optional()?;

        match settings {
            Some(settings) => Ok(settings),
            None => {
                let defaults = MonitorSettings::default();
                self.update_settings(&defaults)?;
                Ok(defaults)
            }
        }
    }

    /// Update monitor settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn update_settings(&self, settings: &MonitorSettings) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings
                (id, paused, tick_interval_ms, cooldown_window_ms, event_window_secs, stats_lookback_ms)
             VALUES (1, ?1, ?2, ?3, ?4, ?5)",
            params![
                i64::from(settings.paused),
                i64::try_from(settings.tick_interval_ms)?,
                i64::try_from(settings.cooldown_window_ms)?,
                i64::try_from(settings.event_window_secs)?,
                i64::try_from(settings.stats_lookback_ms)?,
            ],
        )?;
        Ok(())
    }

    // ==================== Key/Value Store ====================

    fn kv_get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_store WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn kv_set(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv_store (namespace, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![namespace, key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
