//! Local filesystem blob store
//!
//! Maps object keys onto files under a root directory. `/` in a key becomes a
//! directory separator, so partitioned data lake keys land in nested folders.

use async_trait::async_trait;
use bytes::Bytes;
use lz_store_interface::{BlobStore, Result, StoreError};
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Blob store rooted at a local directory
///
/// # Example
///
/// ```no_run
/// use lz_router::backend::LocalBlobStore;
/// use lz_store_interface::BlobStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = LocalBlobStore::new("/var/lib/lz/landing");
///     let data = store.get("abc_TOKEN123_04052023.csv").await?;
///     println!("Size: {} bytes", data.len());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    name: String,
}

impl LocalBlobStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        let root = root.into();
        let name = root.to_string_lossy().to_string();
        Self { root, name }
    }

    /// Resolve a key under the root, refusing keys that would escape it
    fn resolve_key(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

        if key.is_empty() || escapes {
            return Err(StoreError::InvalidRecord {
                store: self.name.clone(),
                message: format!("key '{}' does not name a file under the store root", key),
            });
        }

        Ok(self.root.join(relative))
    }

    fn map_io(&self, key: &str, err: io::Error) -> StoreError {
        match err.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound {
                store: self.name.clone(),
                key: key.to_string(),
            },
            _ => StoreError::Io(err),
        }
    }
}

async fn write_staged(staging: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(staging).await?;
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(staging, path).await
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.resolve_key(key)?;
        let data = fs::read(&path).await.map_err(|e| self.map_io(key, e))?;
        Ok(Bytes::from(data))
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.resolve_key(key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write next to the target and rename so readers never see a partial object
        let mut staging = path.clone().into_os_string();
        staging.push(".lz-partial");
        let staging = PathBuf::from(staging);

        if let Err(e) = write_staged(&staging, &path, &data).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.resolve_key(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    fn store_name(&self) -> &str {
        &self.name
    }
}
