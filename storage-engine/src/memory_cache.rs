use async_trait::async_trait;
use cachet::domain::WriteMode;
use cachet::domain::response::{DeleteResult, ReadResult, WriteResult};
use cachet::ports::CacheStore;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use shared::{Error, Options, Result, TtlSecs};
use std::fmt::Debug;
use std::sync::{Arc, LazyLock};
use tokio::sync::Mutex;
use tracing::debug;

/// A stored payload and the instant it stops being live.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub data: String,
    pub expire_at_utc: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(data: String, ttl: TtlSecs, now: DateTime<Utc>) -> Self {
        let expire_at_utc = i64::try_from(ttl.as_secs())
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { data, expire_at_utc }
    }

    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expire_at_utc
    }
}

/// Entries plus the lock serialising writes.
///
/// There is exactly one per process (see [`MemoryStore::shared`]); every
/// [`MemoryCache`] reads and writes the same data. Expired entries are not
/// swept, they are dropped by the next read or listing that touches them.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, CacheEntry>,
    write_lock: Mutex<()>,
}

static SHARED_STORE: LazyLock<Arc<MemoryStore>> = LazyLock::new(|| Arc::new(MemoryStore::default()));

impl MemoryStore {
    pub fn shared() -> Arc<MemoryStore> {
        Arc::clone(&SHARED_STORE)
    }

    /// Physical entry count, expired entries included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// In-process backend over the process-wide [`MemoryStore`].
pub struct MemoryCache {
    store: Arc<MemoryStore>,
    options: Options,
}

impl MemoryCache {
    pub fn new(options: Options) -> Self {
        Self {
            store: MemoryStore::shared(),
            options,
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Live payload under `key`; an expired entry is removed on the way.
    fn read_live(&self, key: &str) -> Option<String> {
        let now = Utc::now();
        let entry = self.store.entries.get(key).map(|e| e.value().clone())?;
        if entry.is_live_at(now) {
            return Some(entry.data);
        }

        // Only remove what is still expired; a concurrent writer may have
        // replaced it already.
        if self
            .store
            .entries
            .remove_if(key, |_, e| !e.is_live_at(now))
            .is_some()
        {
            debug!(key = %key, "evicted expired entry");
        }
        None
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn read(&self, key: &str) -> Result<ReadResult<String>> {
        Ok(match self.read_live(key) {
            Some(data) => ReadResult::ok(data),
            None => ReadResult::missing(),
        })
    }

    async fn write(
        &self,
        key: &str,
        value: String,
        mode: WriteMode,
        ttl: Option<TtlSecs>,
    ) -> Result<WriteResult> {
        let _guard = self.store.write_lock.lock().await;
        let now = Utc::now();
        let entry = CacheEntry::new(value, self.options.effective_ttl(ttl), now);

        match mode {
            WriteMode::Always => {
                self.store.entries.insert(key.to_string(), entry);
            }
            WriteMode::IfAbsent => match self.store.entries.entry(key.to_string()) {
                Entry::Occupied(existing) if existing.get().is_live_at(now) => {
                    return Err(Error::KeyAlreadyExists(key.to_string()));
                }
                Entry::Occupied(mut expired) => {
                    expired.insert(entry);
                }
                Entry::Vacant(slot) => {
                    slot.insert(entry);
                }
            },
        }

        Ok(WriteResult::ok())
    }

    async fn delete(&self, key: &str) -> Result<DeleteResult> {
        self.store.entries.remove(key);
        Ok(DeleteResult::ok())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<DeleteResult> {
        for key in keys {
            self.store.entries.remove(key);
        }
        Ok(DeleteResult::ok())
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let candidates: Vec<String> = self
            .store
            .entries
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| prefix.is_none_or(|p| k.starts_with(p)))
            .collect();

        Ok(candidates
            .into_iter()
            .filter(|k| self.read_live(k).is_some())
            .collect())
    }
}

impl Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.store.len())
            .field("default_ttl", &self.options.default_expiration_ttl)
            .finish()
    }
}
