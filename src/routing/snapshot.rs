//! Route table persistence.
//!
//! The snapshot is a versioned JSON document holding the full route set. It is
//! read once at startup and rewritten wholesale after every mutation. Writes go
//! to a sibling temp file which is then renamed over the snapshot, so a crash
//! mid-write leaves the previous snapshot intact.
//!
//! Only one gateway process may own a snapshot file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::routing::route::Route;

/// Current on-disk format version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    routes: Vec<Route>,
}

/// Reads and writes the route snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted routes.
    ///
    /// A missing, unreadable or undecodable file yields an empty set; the
    /// gateway starts with an empty table rather than refusing to boot.
    pub fn load(&self) -> Vec<Route> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No route snapshot found, starting empty");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Route snapshot unreadable, starting empty");
                return Vec::new();
            }
        };

        match serde_json::from_slice::<SnapshotFile>(&bytes) {
            Ok(file) if file.version == SNAPSHOT_VERSION => {
                tracing::info!(path = %self.path.display(), routes = file.routes.len(), "Loaded route snapshot");
                file.routes
            }
            Ok(file) => {
                tracing::warn!(
                    path = %self.path.display(),
                    version = file.version,
                    expected = SNAPSHOT_VERSION,
                    "Unsupported route snapshot version, starting empty"
                );
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Route snapshot corrupt, starting empty");
                Vec::new()
            }
        }
    }

    /// Persist the full route set (write temp file, fsync, rename).
    pub async fn save(&self, routes: &[Route]) -> std::io::Result<()> {
        let snapshot = SnapshotFile {
            version: SNAPSHOT_VERSION,
            routes: routes.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        let tmp = self.temp_path();
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!(path = %self.path.display(), routes = routes.len(), "Saved route snapshot");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name: OsString = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("routes.json"));
        let routes = vec![
            Route::new("api", "GET", "/a", Url::parse("http://engine/a").unwrap()),
            Route::new("api", "POST", "/b/:id", Url::parse("http://engine/b").unwrap()),
        ];

        store.save(&routes).await.unwrap();
        assert_eq!(store.load(), routes);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("absent.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");
        std::fs::write(&path, b"\x00\x01 not json").unwrap();
        assert!(SnapshotStore::new(path).load().is_empty());
    }

    #[test]
    fn test_unknown_version_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");
        std::fs::write(&path, br#"{"version": 99, "routes": []}"#).unwrap();
        assert!(SnapshotStore::new(path).load().is_empty());
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("routes.json"));
        let first = vec![Route::new("a", "GET", "/", Url::parse("http://engine/1").unwrap())];
        store.save(&first).await.unwrap();
        store.save(&[]).await.unwrap();
        assert!(store.load().is_empty());
    }
}
