//! Local persisted cache: string slots in a JSON file.
//!
//! Works like browser local storage. Each slot holds a string (usually JSON
//! text) and nothing about slot contents is trusted; readers validate what
//! they decode. Every write rewrites the whole file through a temp file and a
//! rename.

use crate::error::{Error, Result};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::instrument;

/// Slot holding the cached question list (a JSON array)
pub const QUESTIONS_SLOT: &str = "questions";

/// Slot holding migration progress: keys of the [`QUESTIONS_SLOT`] entries
/// already in the authoritative store, plus the one being inserted
pub const MIGRATED_SLOT: &str = "questions.migrated";

#[derive(Debug)]
pub struct LocalCache {
    path: PathBuf,
    slots: Mutex<BTreeMap<String, String>>,
}

impl LocalCache {
    /// Open the cache file, starting empty if it does not exist yet
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self> {
        let slots = match tokio::fs::read_to_string(path).await {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str::<BTreeMap<String, String>>(&content)
                .map_err(|e| Error::corrupt_cache(path, e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No local cache file yet");
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        tracing::debug!("Opened local cache with {} slot(s)", slots.len());
        Ok(Self { path: path.to_path_buf(), slots: Mutex::new(slots) })
    }

    pub async fn get_item(&self, key: &str) -> Option<String> {
        self.slots.lock().await.get(key).cloned()
    }

    pub async fn set_item(&self, key: &str, value: impl Into<String>) -> Result<()> {
        let mut slots = self.slots.lock().await;
        let mut next = slots.clone();
        next.insert(key.to_string(), value.into());
        self.persist(&next).await?;
        *slots = next;
        Ok(())
    }

    pub async fn remove_item(&self, key: &str) -> Result<()> {
        self.remove_items(&[key]).await
    }

    /// Remove several slots in one write, so either all go or none do
    pub async fn remove_items(&self, keys: &[&str]) -> Result<()> {
        let mut slots = self.slots.lock().await;
        if !keys.iter().any(|key| slots.contains_key(*key)) {
            return Ok(());
        }

        let mut next = slots.clone();
        for key in keys {
            next.remove(*key);
        }
        self.persist(&next).await?;
        *slots = next;
        Ok(())
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    async fn persist(&self, slots: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(slots)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        tracing::trace!("Persisted {} slot(s)", slots.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let cache = LocalCache::open(&temp_dir.path().join("cache.json")).await.unwrap();
        assert!(cache.is_empty().await);
        assert_eq!(cache.get_item(QUESTIONS_SLOT).await, None);
    }

    #[tokio::test]
    async fn test_set_get_remove_persist() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sub").join("cache.json");

        let cache = LocalCache::open(&path).await.unwrap();
        cache.set_item(QUESTIONS_SLOT, "[]").await.unwrap();
        cache.set_item(MIGRATED_SLOT, r#"{"migrated":["id:1"]}"#).await.unwrap();

        let reopened = LocalCache::open(&path).await.unwrap();
        assert_eq!(reopened.get_item(QUESTIONS_SLOT).await.as_deref(), Some("[]"));
        assert_eq!(reopened.get_item(MIGRATED_SLOT).await.as_deref(), Some("2"));

        reopened.remove_items(&[QUESTIONS_SLOT, MIGRATED_SLOT]).await.unwrap();
        let reopened = LocalCache::open(&path).await.unwrap();
        assert!(reopened.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_missing_key_does_not_create_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");
        let cache = LocalCache::open(&path).await.unwrap();
        cache.remove_item(QUESTIONS_SLOT).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");
        tokio::fs::write(&path, "[1, 2, 3]").await.unwrap();

        let err = LocalCache::open(&path).await.unwrap_err();
        assert!(matches!(err, Error::CorruptCache { .. }));
    }

    #[tokio::test]
    async fn test_blank_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");
        tokio::fs::write(&path, "\n").await.unwrap();
        assert!(LocalCache::open(&path).await.unwrap().is_empty().await);
    }
}
