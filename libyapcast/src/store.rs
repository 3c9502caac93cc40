//! JSON blob persistence
//!
//! Every logical store (sessions, reply counts, the OAuth vault) is one JSON
//! blob under its own file in the data directory, loaded fully into memory
//! and rewritten fully on every mutation. There is no incremental patching;
//! stores are small and mutations are rare.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{Result, StoreError};
use crate::types::{Platform, ReplyCount};

/// A single JSON-file-backed blob.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the blob, falling back to `T::default()` when the file is
    /// missing or unparseable. A corrupt blob is logged and discarded rather
    /// than poisoning startup.
    pub fn read_or_default<T: DeserializeOwned + Default>(&self) -> T {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Discarding corrupt store {}: {}", self.path.display(), e);
                    T::default()
                }
            },
            Err(_) => T::default(),
        }
    }

    /// Rewrite the whole blob.
    pub fn write<T: Serialize>(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }
        let content = serde_json::to_string_pretty(value).map_err(StoreError::Serialize)?;
        std::fs::write(&self.path, content).map_err(StoreError::Io)?;
        Ok(())
    }
}

/// Client-side cache of reply counts, keyed by `(platform, post_id)`.
///
/// Collaborator contract for the notification layer: the poller records
/// counts here, consumers read and mark them seen.
pub struct ReplyCountCache {
    store: JsonStore,
    entries: HashMap<String, ReplyCount>,
}

impl ReplyCountCache {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let store = JsonStore::new(path);
        let entries = store.read_or_default();
        Self { store, entries }
    }

    fn key(platform: Platform, post_id: &str) -> String {
        format!("{}:{}", platform, post_id)
    }

    pub fn get(&self, platform: Platform, post_id: &str) -> Option<&ReplyCount> {
        self.entries.get(&Self::key(platform, post_id))
    }

    /// Record a freshly fetched count; marks the entry unread when the count
    /// grew since the last fetch.
    pub fn record(&mut self, reply: ReplyCount) -> Result<()> {
        let key = Self::key(reply.platform, &reply.post_id);
        let unread = match self.entries.get(&key) {
            Some(prev) => reply.count > prev.count || prev.unread,
            None => reply.count > 0,
        };
        self.entries.insert(key, ReplyCount { unread, ..reply });
        self.store.write(&self.entries)
    }

    pub fn mark_read(&mut self, platform: Platform, post_id: &str) -> Result<()> {
        if let Some(entry) = self.entries.get_mut(&Self::key(platform, post_id)) {
            entry.unread = false;
            self.store.write(&self.entries)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_json_store_missing_file_defaults() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path().join("missing.json"));
        let value: HashMap<String, u32> = store.read_or_default();
        assert!(value.is_empty());
    }

    #[test]
    fn test_json_store_corrupt_file_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupt.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonStore::new(&path);
        let value: HashMap<String, u32> = store.read_or_default();
        assert!(value.is_empty());
    }

    #[test]
    fn test_json_store_full_rewrite_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path().join("nested").join("blob.json"));

        let mut value = HashMap::new();
        value.insert("a".to_string(), 1u32);
        store.write(&value).unwrap();

        let back: HashMap<String, u32> = store.read_or_default();
        assert_eq!(back.get("a"), Some(&1));
    }

    fn sample_reply(count: u64) -> ReplyCount {
        ReplyCount {
            platform: Platform::Mastodon,
            post_id: "status-1".to_string(),
            count,
            fetched_at: 1_700_000_000,
            unread: false,
        }
    }

    #[test]
    fn test_reply_cache_record_and_get() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reply_counts.json");

        let mut cache = ReplyCountCache::load(&path);
        cache.record(sample_reply(2)).unwrap();

        let entry = cache.get(Platform::Mastodon, "status-1").unwrap();
        assert_eq!(entry.count, 2);
        assert!(entry.unread, "first nonzero count starts unread");

        // Reload from disk and confirm persistence
        let cache = ReplyCountCache::load(&path);
        assert_eq!(cache.get(Platform::Mastodon, "status-1").unwrap().count, 2);
    }

    #[test]
    fn test_reply_cache_growth_marks_unread() {
        let dir = TempDir::new().unwrap();
        let mut cache = ReplyCountCache::load(dir.path().join("reply_counts.json"));

        cache.record(sample_reply(1)).unwrap();
        cache.mark_read(Platform::Mastodon, "status-1").unwrap();
        assert!(!cache.get(Platform::Mastodon, "status-1").unwrap().unread);

        cache.record(sample_reply(4)).unwrap();
        assert!(cache.get(Platform::Mastodon, "status-1").unwrap().unread);

        // Same count again stays read once acknowledged
        cache.mark_read(Platform::Mastodon, "status-1").unwrap();
        cache.record(sample_reply(4)).unwrap();
        assert!(!cache.get(Platform::Mastodon, "status-1").unwrap().unread);
    }

    #[test]
    fn test_reply_cache_keys_are_platform_scoped() {
        let dir = TempDir::new().unwrap();
        let mut cache = ReplyCountCache::load(dir.path().join("reply_counts.json"));

        cache.record(sample_reply(1)).unwrap();
        cache
            .record(ReplyCount {
                platform: Platform::Bluesky,
                post_id: "status-1".to_string(),
                count: 7,
                fetched_at: 1_700_000_100,
                unread: false,
            })
            .unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(Platform::Bluesky, "status-1").unwrap().count, 7);
        assert_eq!(cache.get(Platform::Mastodon, "status-1").unwrap().count, 1);
    }
}
