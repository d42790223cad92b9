use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to create cache directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// On-disk JSON cache for API responses, one file per (namespace, query)
pub struct Cache {
    cache_dir: PathBuf,
    enabled: bool,
    ttl: Duration,
}

impl Cache {
    /// Cache under the user cache directory (`~/.cache/wikicite` on Linux)
    pub fn new(enabled: bool, ttl: Duration) -> Result<Self, CacheError> {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("wikicite");
        Self::at(cache_dir, enabled, ttl)
    }

    pub fn at(cache_dir: impl Into<PathBuf>, enabled: bool, ttl: Duration) -> Result<Self, CacheError> {
        let cache_dir = cache_dir.into();
        if enabled {
            fs::create_dir_all(&cache_dir).map_err(|source| CacheError::CreateDir {
                path: cache_dir.clone(),
                source,
            })?;
        }

        Ok(Self {
            cache_dir,
            enabled,
            ttl,
        })
    }

    pub fn disabled() -> Self {
        Self {
            cache_dir: PathBuf::new(),
            enabled: false,
            ttl: Duration::ZERO,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    fn entry_path(&self, namespace: &str, query: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}_{:016x}.json", namespace, fingerprint(query)))
    }

    /// Cached value, or `None` when missing, expired or unreadable
    pub fn get<T: DeserializeOwned>(&self, namespace: &str, query: &str) -> Option<T> {
        if !self.enabled {
            return None;
        }

        let path = self.entry_path(namespace, query);
        let modified = fs::metadata(&path).ok()?.modified().ok()?;
        let age = SystemTime::now().duration_since(modified).ok()?;

        if age > self.ttl {
            debug!(path = %path.display(), "cache entry expired");
            let _ = fs::remove_file(&path);
            return None;
        }

        let content = fs::read_to_string(&path).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn set<T: Serialize>(&self, namespace: &str, query: &str, value: &T) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }

        let content = serde_json::to_string(value)?;
        fs::write(self.entry_path(namespace, query), content)?;
        Ok(())
    }

    /// Remove every cached entry; returns how many files were deleted
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        if self.cache_dir.as_os_str().is_empty() || !self.cache_dir.exists() {
            return Ok(removed);
        }

        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |e| e == "json") {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Stable-within-a-build hash so arbitrary queries become safe file names
fn fingerprint(s: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Payload {
        title: String,
    }

    #[test]
    fn test_cache_round_trip_and_clear() {
        let dir = tempdir().unwrap();
        let cache = Cache::at(dir.path(), true, Duration::from_secs(3600)).unwrap();
        let payload = Payload {
            title: "Photosynthesis".to_string(),
        };

        cache.set("mediawiki", "action=parse&page=Photosynthesis", &payload).unwrap();
        let hit: Option<Payload> = cache.get("mediawiki", "action=parse&page=Photosynthesis");
        assert_eq!(hit, Some(payload));

        let miss: Option<Payload> = cache.get("mediawiki", "action=parse&page=Other");
        assert!(miss.is_none());

        assert_eq!(cache.clear().unwrap(), 1);
        let gone: Option<Payload> = cache.get("mediawiki", "action=parse&page=Photosynthesis");
        assert!(gone.is_none());
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let dir = tempdir().unwrap();
        let cache = Cache::at(dir.path(), true, Duration::ZERO).unwrap();
        cache.set("ns", "q", &1u32).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get::<u32>("ns", "q"), None);
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let cache = Cache::disabled();
        cache.set("ns", "q", &1u32).unwrap();
        assert_eq!(cache.get::<u32>("ns", "q"), None);
        assert_eq!(cache.clear().unwrap(), 0);
    }
}
