// Last-notified state persistence
// SQLite-backed so a restarted monitor does not re-alert on transitions
// it already delivered.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::types::{Signal, Symbol};

/// One persisted row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    pub symbol: Symbol,
    pub last_notified: Signal,
    pub updated_at: String,
}

pub struct SqliteStateStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStateStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self::from_connection(conn)?;
        info!(path = %db_path.display(), "State store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.create_tables()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("State database lock poisoned"))
    }

    fn create_tables(&self) -> Result<()> {
        self.conn()?.execute(
            "CREATE TABLE IF NOT EXISTS tracked_state (
                symbol TEXT PRIMARY KEY,
                last_notified INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        debug!("Database schema created/verified");
        Ok(())
    }

    pub fn save(&self, symbol: &Symbol, last_notified: Signal) -> Result<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO tracked_state (symbol, last_notified, updated_at)
             VALUES (?1, ?2, ?3)",
            params![
                symbol.as_str(),
                last_notified.value(),
                Utc::now().to_rfc3339()
            ],
        )?;

        debug!(symbol = %symbol, last_notified = %last_notified, "State saved");
        Ok(())
    }

    /// Every stored row, ordered by symbol. Rows with an unknown signal value
    /// are skipped.
    pub fn load_all(&self) -> Result<Vec<StoredState>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT symbol, last_notified, updated_at FROM tracked_state ORDER BY symbol",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let states = rows
            .into_iter()
            .filter_map(|(symbol, value, updated_at)| match Signal::from_value(value) {
                Some(last_notified) => Some(StoredState {
                    symbol: Symbol::new(symbol),
                    last_notified,
                    updated_at,
                }),
                None => {
                    warn!(symbol = %symbol, value, "Ignoring stored state with unknown signal");
                    None
                }
            })
            .collect::<Vec<_>>();

        debug!("Loaded {} tracked states", states.len());
        Ok(states)
    }

    pub fn clear(&self, symbol: &Symbol) -> Result<bool> {
        let removed = self.conn()?.execute(
            "DELETE FROM tracked_state WHERE symbol = ?1",
            params![symbol.as_str()],
        )?;
        Ok(removed > 0)
    }

    pub fn clear_all(&self) -> Result<usize> {
        let removed = self.conn()?.execute("DELETE FROM tracked_state", [])?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        store.save(&Symbol::new("MSFT"), Signal::Sell).unwrap();
        store.save(&Symbol::new("AAPL"), Signal::Buy).unwrap();

        let states = store.load_all().unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].symbol, Symbol::new("AAPL"));
        assert_eq!(states[0].last_notified, Signal::Buy);
        assert_eq!(states[1].last_notified, Signal::Sell);
    }

    #[test]
    fn test_save_replaces_existing_row() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        let symbol = Symbol::new("AAPL");
        store.save(&symbol, Signal::Buy).unwrap();
        store.save(&symbol, Signal::Sell).unwrap();

        let states = store.load_all().unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].last_notified, Signal::Sell);
    }

    #[test]
    fn test_clear() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        store.save(&Symbol::new("A"), Signal::Buy).unwrap();
        store.save(&Symbol::new("B"), Signal::Buy).unwrap();

        assert!(store.clear(&Symbol::new("A")).unwrap());
        assert!(!store.clear(&Symbol::new("A")).unwrap());
        assert_eq!(store.clear_all().unwrap(), 1);
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_signal_value_is_skipped() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO tracked_state (symbol, last_notified, updated_at) VALUES ('X', 7, 'now')",
                [],
            )
            .unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }
}
