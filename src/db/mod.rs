pub mod migrations;
pub mod queries;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rusqlite::Connection;

use crate::errors::StoreError;
use crate::models::Restaurant;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_db(path: &Path) -> anyhow::Result<Connection> {
    let conn = open_connection(path).context("failed to open database")?;

    conn.execute_batch("PRAGMA journal_mode=WAL;")
        .context("failed to set database pragmas")?;

    migrations::run_migrations(&conn)?;

    Ok(conn)
}

fn open_connection(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

/// Handle to the SQLite booking store.
///
/// Holds no connection. Every call opens one, runs on the blocking pool and
/// drops it before returning, so nothing is shared between requests.
#[derive(Clone, Debug)]
pub struct Store {
    path: Arc<PathBuf>,
    timeout: Duration,
}

impl Store {
    pub fn open(path: impl AsRef<Path>, timeout: Duration) -> anyhow::Result<Self> {
        let path = path.as_ref();
        anyhow::ensure!(
            path.as_os_str() != ":memory:",
            "in-memory databases are not supported, each store operation opens its own connection"
        );

        init_db(path)?;

        Ok(Self {
            path: Arc::new(path.to_path_buf()),
            timeout,
        })
    }

    /// Runs `f` against a fresh connection, bounded by the store timeout.
    ///
    /// A timeout or a failed blocking task is reported as
    /// [`StoreError::Unavailable`]. The blocking work is not aborted on
    /// timeout and may still commit.
    pub async fn call<T, F>(&self, op: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let path = Arc::clone(&self.path);
        let task = tokio::task::spawn_blocking(move || {
            let mut conn = open_connection(&path)?;
            f(&mut conn)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!(op, error = %e, "store task failed");
                Err(StoreError::Unavailable(format!("{op} failed: {e}")))
            }
            Err(_) => {
                tracing::warn!(op, timeout_ms = self.timeout.as_millis() as u64, "store operation timed out");
                Err(StoreError::Unavailable(format!("{op} timed out")))
            }
        }
    }

    pub async fn upsert_restaurants(&self, restaurants: Vec<Restaurant>) -> Result<usize, StoreError> {
        self.call("upsert_restaurants", move |conn| {
            let tx = conn.transaction()?;
            for restaurant in &restaurants {
                queries::upsert_restaurant(&tx, restaurant)?;
            }
            tx.commit()?;
            Ok(restaurants.len())
        })
        .await
    }
}

/// Loads a JSON array of restaurants and upserts them with their slot catalogs.
pub async fn seed_from_file(store: &Store, path: &str) -> anyhow::Result<usize> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read seed file: {path}"))?;
    let restaurants: Vec<Restaurant> =
        serde_json::from_str(&raw).with_context(|| format!("failed to parse seed file: {path}"))?;

    let count = store.upsert_restaurants(restaurants).await?;
    tracing::info!(count, path, "seeded restaurants");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_in_memory() {
        assert!(Store::open(":memory:", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_call_times_out_behind_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.db");
        let store = Store::open(&path, Duration::from_millis(200)).unwrap();

        let writer = Connection::open(&path).unwrap();
        writer.execute_batch("BEGIN IMMEDIATE;").unwrap();

        let result = store
            .call("insert_cuisine", |conn| {
                conn.execute("INSERT INTO cuisines (name) VALUES ('Thai')", [])?;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));

        writer.execute_batch("ROLLBACK;").unwrap();
    }

    #[tokio::test]
    async fn test_seed_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("seed.db"), Duration::from_secs(5)).unwrap();
        let seed = dir.path().join("restaurants.json");
        std::fs::write(
            &seed,
            r#"[{"id":7,"name":"Roma","city":"Mumbai","cuisine":["Italian"],"daily_slots":["8:00 PM","7:00 PM"]}]"#,
        )
        .unwrap();

        let count = seed_from_file(&store, seed.to_str().unwrap()).await.unwrap();
        assert_eq!(count, 1);

        let catalog = store
            .call("catalog", |conn| Ok(queries::get_slot_catalog(conn, 7)?))
            .await
            .unwrap();
        assert_eq!(catalog, vec!["7:00 PM", "8:00 PM"]);
    }
}
