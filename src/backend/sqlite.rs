//! SQLite table store
//!
//! Each table holds `(item_key, attributes)` rows, with the attribute map
//! stored as a JSON object. WAL mode lets the catalog and audit tables share
//! one database file with concurrent event processing.

use async_trait::async_trait;
use lz_store_interface::{Item, Result, StoreError, TableStore};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

/// SQLite-backed key/item table
pub struct SqliteTableStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteTableStore {
    /// Open (or create) the database at `path` and ensure `table` exists
    pub async fn open(path: &str, table: &str) -> Result<Self> {
        if !is_valid_table_name(table) {
            return Err(StoreError::InvalidRecord {
                store: path.to_string(),
                message: format!("invalid table name '{}'", table),
            });
        }

        let db_url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite://{}", path)
        };

        let options = SqliteConnectOptions::from_str(&db_url)
            .map_err(|e| StoreError::unavailable(path, e))?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::unavailable(path, e))?;

        Self::with_pool(pool, table).await
    }

    /// Use an existing pool (for example an in-memory database in tests)
    pub async fn with_pool(pool: SqlitePool, table: &str) -> Result<Self> {
        if !is_valid_table_name(table) {
            return Err(StoreError::InvalidRecord {
                store: table.to_string(),
                message: format!("invalid table name '{}'", table),
            });
        }

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                item_key TEXT PRIMARY KEY NOT NULL,
                attributes TEXT NOT NULL
            )",
            table
        );
        sqlx::query(&ddl)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::unavailable(table, e))?;

        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    fn decode(&self, key: &str, attributes: &str) -> Result<Item> {
        serde_json::from_str(attributes).map_err(|e| StoreError::InvalidRecord {
            store: self.table.clone(),
            message: format!("item '{}': {}", key, e),
        })
    }
}

/// Table names are interpolated into SQL, so keep them to identifiers
fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[async_trait]
impl TableStore for SqliteTableStore {
    async fn get_item(&self, key: &str) -> Result<Option<Item>> {
        let sql = format!("SELECT attributes FROM {} WHERE item_key = ?", self.table);
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::unavailable(&self.table, e))?;

        match row {
            Some(row) => {
                let attributes: String = row
                    .try_get("attributes")
                    .map_err(|e| StoreError::unavailable(&self.table, e))?;
                Ok(Some(self.decode(key, &attributes)?))
            }
            None => Ok(None),
        }
    }

    async fn put_item(&self, key: &str, item: Item) -> Result<()> {
        let attributes = serde_json::to_string(&item).map_err(|e| StoreError::InvalidRecord {
            store: self.table.clone(),
            message: e.to_string(),
        })?;

        let sql = format!(
            "INSERT INTO {} (item_key, attributes) VALUES (?, ?)
             ON CONFLICT (item_key) DO UPDATE SET attributes = excluded.attributes",
            self.table
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(attributes)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::unavailable(&self.table, e))?;
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<(String, Item)>> {
        let sql = format!(
            "SELECT item_key, attributes FROM {} ORDER BY item_key",
            self.table
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::unavailable(&self.table, e))?;

        rows.iter()
            .map(|row| {
                let key: String = row
                    .try_get("item_key")
                    .map_err(|e| StoreError::unavailable(&self.table, e))?;
                let attributes: String = row
                    .try_get("attributes")
                    .map_err(|e| StoreError::unavailable(&self.table, e))?;
                let item = self.decode(&key, &attributes)?;
                Ok((key, item))
            })
            .collect()
    }

    fn table_name(&self) -> &str {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_table_name_validation() {
        assert!(is_valid_table_name("dataset_catalog"));
        assert!(is_valid_table_name("_audit2"));
        assert!(!is_valid_table_name("2audit"));
        assert!(!is_valid_table_name("audit; DROP TABLE x"));
        assert!(!is_valid_table_name(""));
    }

    #[tokio::test]
    async fn test_upsert_get_scan() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("router.db");
        let store = SqliteTableStore::open(db.to_str().unwrap(), "landing_zone_log")
            .await
            .unwrap();

        let mut item = Item::new();
        item.insert("Status".to_string(), "PENDING".to_string());
        store.put_item("id-1", item.clone()).await.unwrap();

        item.insert("Status".to_string(), "COMMITTED".to_string());
        store.put_item("id-1", item).await.unwrap();

        let fetched = store.get_item("id-1").await.unwrap().unwrap();
        assert_eq!(fetched.get("Status").map(String::as_str), Some("COMMITTED"));
        assert!(store.get_item("id-2").await.unwrap().is_none());

        let rows = store.scan().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "id-1");
    }

    #[tokio::test]
    async fn test_two_tables_share_a_file() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("shared.db");
        let path = db.to_str().unwrap();

        let catalog = SqliteTableStore::open(path, "dataset_catalog").await.unwrap();
        let audit = SqliteTableStore::open(path, "landing_zone_log").await.unwrap();

        catalog.put_item("TOKEN", Item::new()).await.unwrap();
        assert!(audit.get_item("TOKEN").await.unwrap().is_none());
        assert!(catalog.get_item("TOKEN").await.unwrap().is_some());
    }
}
