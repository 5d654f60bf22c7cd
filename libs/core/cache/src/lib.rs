//! Disk-backed, TTL-scoped cache. Writes are atomic (temp file + rename);
//! corrupt or unreadable entries are logged and treated as misses, never
//! surfaced as errors to the caller.

mod error;
mod layout;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use uuid::Uuid;

pub use error::CacheError;

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    content_hash: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: u64,
    pub bytes: u64,
    pub hits: u64,
    pub misses: u64,
}

/// A disk-backed cache rooted at one directory, created with owner-only
/// permissions. One `Cache` is meant to be shared process-wide behind an
/// `Arc`; all methods take `&self`.
pub struct Cache {
    root: PathBuf,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Cache {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|source| CacheError::Io {
            path: root.display().to_string(),
            source,
        })?;
        set_owner_only_dir(&root)?;
        Ok(Self {
            root,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    #[instrument(skip(self, value))]
    pub async fn set(&self, kind: &str, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let paths = layout::entry_paths(&self.root, kind, key);
        tokio::fs::create_dir_all(&paths.dir).await.map_err(|source| CacheError::Io {
            path: paths.dir.display().to_string(),
            source,
        })?;
        set_owner_only_dir(&paths.dir)?;

        let now = Utc::now();
        let meta = EntryMeta {
            created_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).expect("ttl fits in a chrono::Duration"),
            content_hash: layout::hash_bytes(value),
        };
        let meta_json = serde_json::to_vec(&meta).expect("EntryMeta always serializes");

        write_atomic(&paths.data, value).await?;
        write_atomic(&paths.meta, &meta_json).await?;
        set_owner_only_file(&paths.data)?;
        set_owner_only_file(&paths.meta)?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, kind: &str, key: &str) -> (Option<Vec<u8>>, bool) {
        let paths = layout::entry_paths(&self.root, kind, key);

        let meta = match tokio::fs::read(&paths.meta).await {
            Ok(bytes) => match serde_json::from_slice::<EntryMeta>(&bytes) {
                Ok(meta) => meta,
                Err(err) => {
                    warn!(path = %paths.meta.display(), %err, "cache: corrupt metadata, treating as miss");
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return (None, false);
                }
            },
            Err(_) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return (None, false);
            }
        };

        if Utc::now() >= meta.expires_at {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return (None, false);
        }

        match tokio::fs::read(&paths.data).await {
            Ok(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                (Some(value), true)
            }
            Err(err) => {
                warn!(path = %paths.data.display(), %err, "cache: unreadable entry, treating as miss");
                self.misses.fetch_add(1, Ordering::Relaxed);
                (None, false)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, kind: &str, key: &str) -> Result<(), CacheError> {
        let paths = layout::entry_paths(&self.root, kind, key);
        for path in [&paths.data, &paths.meta] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(CacheError::Io {
                        path: path.display().to_string(),
                        source,
                    })
                }
            }
        }
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.root.display().to_string(),
                    source,
                })
            }
        }
        tokio::fs::create_dir_all(&self.root).await.map_err(|source| CacheError::Io {
            path: self.root.display().to_string(),
            source,
        })?;
        set_owner_only_dir(&self.root)?;
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, bytes) = walk_entries(&self.root);
        CacheStats {
            entries,
            bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Sweeps expired entries in O(n) over files on disk. Implementers are
    /// free to index by expiry for a faster sweep; this one does not.
    #[instrument(skip(self))]
    pub async fn cleanup_expired(&self) -> Result<usize, CacheError> {
        let mut removed = 0usize;
        let now = Utc::now();

        for meta_path in meta_file_paths(&self.root) {
            let Ok(bytes) = std::fs::read(&meta_path) else {
                continue;
            };
            let Ok(meta) = serde_json::from_slice::<EntryMeta>(&bytes) else {
                continue;
            };
            if now >= meta.expires_at {
                let data_path = meta_path.with_extension("bin");
                let _ = std::fs::remove_file(&data_path);
                let _ = std::fs::remove_file(&meta_path);
                removed += 1;
            }
        }
        Ok(removed)
    }
}

async fn write_atomic(final_path: &std::path::Path, bytes: &[u8]) -> Result<(), CacheError> {
    let tmp_path = final_path.with_extension(format!("tmp.{}", Uuid::new_v4()));
    tokio::fs::write(&tmp_path, bytes).await.map_err(|source| CacheError::Io {
        path: tmp_path.display().to_string(),
        source,
    })?;
    tokio::fs::rename(&tmp_path, final_path).await.map_err(|source| CacheError::Io {
        path: final_path.display().to_string(),
        source,
    })
}

fn meta_file_paths(root: &std::path::Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(kinds) = std::fs::read_dir(root) else {
        return out;
    };
    for kind in kinds.flatten() {
        let Ok(shards) = std::fs::read_dir(kind.path()) else {
            continue;
        };
        for shard in shards.flatten() {
            let Ok(files) = std::fs::read_dir(shard.path()) else {
                continue;
            };
            for file in files.flatten() {
                if file.path().extension().is_some_and(|ext| ext == "meta") {
                    out.push(file.path());
                }
            }
        }
    }
    out
}

fn walk_entries(root: &std::path::Path) -> (u64, u64) {
    let mut entries = 0u64;
    let mut bytes = 0u64;
    for meta_path in meta_file_paths(root) {
        let data_path = meta_path.with_extension("bin");
        if let Ok(metadata) = std::fs::metadata(&data_path) {
            entries += 1;
            bytes += metadata.len();
        }
    }
    (entries, bytes)
}

#[cfg(unix)]
fn set_owner_only_dir(path: &std::path::Path) -> Result<(), CacheError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).map_err(|source| CacheError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(not(unix))]
fn set_owner_only_dir(_path: &std::path::Path) -> Result<(), CacheError> {
    Ok(())
}

#[cfg(unix)]
fn set_owner_only_file(path: &std::path::Path) -> Result<(), CacheError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(|source| CacheError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(not(unix))]
fn set_owner_only_file(_path: &std::path::Path) -> Result<(), CacheError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path()).await.unwrap();

        cache.set("schema", "db-123", b"hello", Duration::from_secs(60)).await.unwrap();
        let (value, hit) = cache.get("schema", "db-123").await;

        assert!(hit);
        assert_eq!(value.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn expired_entries_are_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path()).await.unwrap();

        cache.set("schema", "db-123", b"hello", Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (value, hit) = cache.get("schema", "db-123").await;
        assert!(!hit);
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn missing_key_is_a_miss_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path()).await.unwrap();

        let (value, hit) = cache.get("schema", "does-not-exist").await;
        assert!(!hit);
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn corrupt_metadata_is_treated_as_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path()).await.unwrap();
        cache.set("schema", "db-123", b"hello", Duration::from_secs(60)).await.unwrap();

        let paths = layout::entry_paths(dir.path(), "schema", "db-123");
        tokio::fs::write(&paths.meta, b"not json").await.unwrap();

        let (value, hit) = cache.get("schema", "db-123").await;
        assert!(!hit);
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn delete_removes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path()).await.unwrap();
        cache.set("schema", "db-123", b"hello", Duration::from_secs(60)).await.unwrap();

        cache.delete("schema", "db-123").await.unwrap();
        let (value, hit) = cache.get("schema", "db-123").await;
        assert!(!hit);
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn stats_counts_hits_and_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path()).await.unwrap();
        cache.set("schema", "db-123", b"hello", Duration::from_secs(60)).await.unwrap();

        let _ = cache.get("schema", "db-123").await;
        let _ = cache.get("schema", "missing").await;

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cache_directory_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path().join("nested")).await.unwrap();

        cache.set("schema", "db-123", b"hello", Duration::from_secs(60)).await.unwrap();
        let metadata = std::fs::metadata(dir.path().join("nested")).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o700);
    }
}
