//! In-memory stores
//!
//! Back `memory://` store URIs and the test suites. Both stores can be told to
//! fail, which is how outage behaviour is exercised without a network.

use async_trait::async_trait;
use bytes::Bytes;
use lz_store_interface::{BlobStore, Item, Result, StoreError, TableStore};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Object store held in a `HashMap`
///
/// Clones share the same objects.
///
/// # Example
///
/// ```rust
/// use lz_router::backend::MemoryBlobStore;
///
/// let store = MemoryBlobStore::new("landing-zone");
/// store.insert("abc_TOKEN_01012024.csv", b"a,b\n");
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    name: String,
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
    fail_gets: Arc<AtomicBool>,
    fail_puts: Arc<AtomicBool>,
    puts: Arc<AtomicUsize>,
}

impl MemoryBlobStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add an object directly
    pub fn insert(&self, key: impl Into<String>, data: &[u8]) {
        write(&self.objects).insert(key.into(), Bytes::copy_from_slice(data));
    }

    /// Get an object directly
    pub fn object(&self, key: &str) -> Option<Bytes> {
        read(&self.objects).get(key).cloned()
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = read(&self.objects).keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        read(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful `put` calls so far
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Make every `get` fail as unavailable
    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Make every `put` fail as unavailable
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Bytes> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(&self.name, "injected read failure"));
        }
        self.object(key).ok_or_else(|| StoreError::NotFound {
            store: self.name.clone(),
            key: key.to_string(),
        })
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(&self.name, "injected write failure"));
        }
        write(&self.objects).insert(key.to_string(), data);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(&self.name, "injected read failure"));
        }
        Ok(read(&self.objects).contains_key(key))
    }

    fn store_name(&self) -> &str {
        &self.name
    }
}

/// Table held in a `BTreeMap`
///
/// Clones share the same items.
#[derive(Debug, Clone, Default)]
pub struct MemoryTableStore {
    name: String,
    items: Arc<RwLock<BTreeMap<String, Item>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryTableStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add an item from `(attribute, value)` pairs
    pub fn insert(&self, key: impl Into<String>, attributes: &[(&str, &str)]) {
        let item = attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        write(&self.items).insert(key.into(), item);
    }

    pub fn item(&self, key: &str) -> Option<Item> {
        read(&self.items).get(key).cloned()
    }

    pub fn len(&self) -> usize {
        read(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make `get_item` and `scan` fail as unavailable
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make `put_item` fail as unavailable
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn get_item(&self, key: &str) -> Result<Option<Item>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(&self.name, "injected read failure"));
        }
        Ok(self.item(key))
    }

    async fn put_item(&self, key: &str, item: Item) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(&self.name, "injected write failure"));
        }
        write(&self.items).insert(key.to_string(), item);
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<(String, Item)>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(&self.name, "injected read failure"));
        }
        Ok(read(&self.items)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn table_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blob_clones_share_objects() {
        let store = MemoryBlobStore::new("lz");
        let other = store.clone();
        store.put("k", Bytes::from_static(b"v")).await.unwrap();

        assert_eq!(other.get("k").await.unwrap().as_ref(), b"v");
        assert_eq!(other.put_count(), 1);
        assert!(matches!(
            other.get("nope").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_blob_failure_injection() {
        let store = MemoryBlobStore::new("lz");
        store.insert("k", b"v");
        store.fail_gets(true);
        assert!(store.get("k").await.unwrap_err().is_transient());

        store.fail_puts(true);
        assert!(store.put("k2", Bytes::new()).await.is_err());
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_table_upsert_and_scan() {
        let table = MemoryTableStore::new("audit");
        table.insert("a", &[("Status", "PENDING")]);
        table.insert("a", &[("Status", "COMMITTED")]);
        table.insert("b", &[("Status", "PENDING")]);

        let rows = table.scan().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1.get("Status").map(String::as_str), Some("COMMITTED"));
        assert!(table.get_item("c").await.unwrap().is_none());
    }
}
