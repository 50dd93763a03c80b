use crate::domain::WriteMode;
use crate::domain::response::{DeleteResult, ReadResult, WriteResult};
use crate::ports::CacheStore;
use crate::serialization::{Codec, JsonCodec};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::{Result, TtlSecs};
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Typed cache contract over any [`CacheStore`].
///
/// Logical keys are passed to the backend unmodified, so reading a key with a
/// type it was not written as fails with `Error::InvalidType` rather than
/// missing. See [`crate::key_codec::TypedKey`] for type-scoped keys.
#[derive(Clone)]
pub struct Cache<C: Codec = JsonCodec> {
    store: Arc<dyn CacheStore>,
    codec: C,
}

impl Cache<JsonCodec> {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_codec(store, JsonCodec::default())
    }
}

impl<C: Codec> Cache<C> {
    pub fn with_codec(store: Arc<dyn CacheStore>, codec: C) -> Self {
        Self { store, codec }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Unconditional upsert. `ttl` of `None` uses the backend default.
    pub async fn write<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<TtlSecs>,
    ) -> Result<WriteResult> {
        self.write_with_mode(key, value, WriteMode::Always, ttl).await
    }

    /// Fails with `Error::KeyAlreadyExists` when a live entry is present.
    pub async fn write_if_absent<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<TtlSecs>,
    ) -> Result<WriteResult> {
        self.write_with_mode(key, value, WriteMode::IfAbsent, ttl).await
    }

    pub async fn write_with_mode<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        mode: WriteMode,
        ttl: Option<TtlSecs>,
    ) -> Result<WriteResult> {
        let payload = self.codec.encode(value)?;
        let result = self.store.write(key, payload, mode, ttl).await?;
        if !result.is_ok() {
            warn!(key = %key, backend = self.store.name(), reason = ?result.reason, "write degraded");
        }
        Ok(result)
    }

    /// `None` when the key is absent, expired, or the backend soft-failed.
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        Ok(self.read_result(key).await?.into_value())
    }

    /// Like [`read`](Self::read) but keeps the status and reason.
    pub async fn read_result<T: DeserializeOwned>(&self, key: &str) -> Result<ReadResult<T>> {
        let raw = self.store.read(key).await?;
        if raw.is_timeout() {
            warn!(key = %key, backend = self.store.name(), "read degraded by timeout");
        }
        raw.try_map(|payload| self.codec.decode::<T>(&payload))
    }

    /// The stored payload without decoding.
    pub async fn read_raw(&self, key: &str) -> Result<Option<String>> {
        Ok(self.store.read(key).await?.into_value())
    }

    /// Idempotent: an absent key is not an error.
    pub async fn delete(&self, key: &str) -> Result<DeleteResult> {
        self.store.delete(key).await
    }

    pub async fn delete_many<I, S>(&self, keys: I) -> Result<DeleteResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return Ok(DeleteResult::ok());
        }
        self.store.delete_many(&keys).await
    }

    /// A blank prefix lists every live key.
    pub async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        self.store.list_keys(prefix.filter(|p| !p.trim().is_empty())).await
    }

    /// Returns the live value, or runs `producer`, writes a `Some` result and
    /// returns it.
    ///
    /// Not atomic across callers: two callers on a cold key may both run the
    /// producer and both write.
    pub async fn read_or_write<T, F, Fut>(
        &self,
        key: &str,
        producer: F,
        ttl: Option<TtlSecs>,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        if let Some(value) = self.read::<T>(key).await? {
            return Ok(Some(value));
        }

        debug!(key = %key, "cache miss, running producer");
        let Some(value) = producer().await else {
            return Ok(None);
        };
        self.write(key, &value, ttl).await?;
        Ok(Some(value))
    }

    /// [`read_or_write`](Self::read_or_write) with a synchronous producer.
    pub async fn read_or_write_with<T, F>(
        &self,
        key: &str,
        producer: F,
        ttl: Option<TtlSecs>,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Option<T>,
    {
        self.read_or_write(key, || std::future::ready(producer()), ttl)
            .await
    }
}

impl<C: Codec + Debug> Debug for Cache<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("backend", &self.store.name())
            .field("codec", &self.codec)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::response::{ReadReason, Status, WriteReason};
    use async_trait::async_trait;
    use serde::Deserialize;
    use shared::Error;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend double: a plain map, optionally answering every call with a
    /// soft timeout.
    #[derive(Default)]
    struct MapStore {
        entries: Mutex<HashMap<String, String>>,
        timing_out: bool,
        batch_calls: AtomicUsize,
    }

    #[async_trait]
    impl CacheStore for MapStore {
        fn name(&self) -> &'static str {
            "map"
        }

        async fn read(&self, key: &str) -> Result<ReadResult<String>> {
            if self.timing_out {
                return Ok(ReadResult::fail(ReadReason::Timeout));
            }
            Ok(match self.entries.lock().unwrap().get(key) {
                Some(v) => ReadResult::ok(v.clone()),
                None => ReadResult::missing(),
            })
        }

        async fn write(
            &self,
            key: &str,
            value: String,
            mode: WriteMode,
            _ttl: Option<TtlSecs>,
        ) -> Result<WriteResult> {
            if self.timing_out {
                return Ok(WriteResult::fail(WriteReason::Timeout));
            }
            let mut entries = self.entries.lock().unwrap();
            if mode == WriteMode::IfAbsent && entries.contains_key(key) {
                return Err(Error::KeyAlreadyExists(key.to_string()));
            }
            entries.insert(key.to_string(), value);
            Ok(WriteResult::ok())
        }

        async fn delete(&self, key: &str) -> Result<DeleteResult> {
            self.entries.lock().unwrap().remove(key);
            Ok(DeleteResult::ok())
        }

        async fn delete_many(&self, keys: &[String]) -> Result<DeleteResult> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            let mut entries = self.entries.lock().unwrap();
            for key in keys {
                entries.remove(key);
            }
            Ok(DeleteResult::ok())
        }

        async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .keys()
                .filter(|k| prefix.is_none_or(|p| k.starts_with(p)))
                .cloned()
                .collect())
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct ComplexObject {
        string_value: Option<String>,
        count: Option<i64>,
        flags: Vec<bool>,
    }

    fn cache() -> (Cache, Arc<MapStore>) {
        let store = Arc::new(MapStore::default());
        (Cache::new(store.clone()), store)
    }

    #[tokio::test]
    async fn read_missing_key_returns_none() {
        let (cache, _) = cache();
        assert_eq!(cache.read::<String>("test").await.unwrap(), None);

        let result = cache.read_result::<String>("test").await.unwrap();
        assert_eq!(result.status, Status::Fail);
        assert_eq!(result.reason, Some(ReadReason::KeyDoesNotExist));
    }

    #[tokio::test]
    async fn write_and_read_round_trips_structured_values() {
        let (cache, _) = cache();
        let value = ComplexObject {
            string_value: Some("String".into()),
            count: None,
            flags: vec![true, false],
        };

        cache.write("complex", &value, None).await.unwrap();
        cache.write("flag", &true, None).await.unwrap();
        cache.write("maybe", &Some(7_i32), None).await.unwrap();

        assert_eq!(cache.read::<ComplexObject>("complex").await.unwrap(), Some(value));
        assert_eq!(cache.read::<bool>("flag").await.unwrap(), Some(true));
        assert_eq!(cache.read::<Option<i32>>("maybe").await.unwrap(), Some(Some(7)));
    }

    #[tokio::test]
    async fn reading_with_other_type_is_invalid_type() {
        let (cache, _) = cache();
        cache.write("typed", &"unitTest", None).await.unwrap();

        let result = cache.read::<bool>("typed").await;
        assert!(matches!(result, Err(Error::InvalidType(_))));
    }

    #[tokio::test]
    async fn read_raw_returns_payload() {
        let (cache, _) = cache();
        cache.write("dynamic", &"someValue", None).await.unwrap();
        assert_eq!(
            cache.read_raw("dynamic").await.unwrap().as_deref(),
            Some("\"someValue\"")
        );
    }

    #[tokio::test]
    async fn write_if_absent_twice_fails() {
        let (cache, _) = cache();
        cache.write_if_absent("once", &1, None).await.unwrap();

        let second = cache.write_if_absent("once", &2, None).await;
        assert!(matches!(second, Err(Error::KeyAlreadyExists(_))));
        assert_eq!(cache.read::<i32>("once").await.unwrap(), Some(1));

        let upsert = cache
            .write_with_mode("once", &3, WriteMode::from_error_if_exists(false), None)
            .await
            .unwrap();
        assert!(upsert.is_ok());
    }

    #[tokio::test]
    async fn delete_many_uses_one_backend_call() {
        let (cache, store) = cache();
        for key in ["a", "b", "c"] {
            cache.write(key, &key, None).await.unwrap();
        }

        cache.delete_many(["a", "b"]).await.unwrap();
        cache.delete_many(Vec::<String>::new()).await.unwrap();

        assert_eq!(store.batch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.list_keys(None).await.unwrap(), vec!["c".to_string()]);
        assert!(cache.delete("absent").await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn read_or_write_runs_producer_once_then_reads() {
        let (cache, _) = cache();
        let calls = AtomicUsize::new(0);

        let first = cache
            .read_or_write(
                "lazy",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Some("unitTest".to_string())
                },
                None,
            )
            .await
            .unwrap();
        let second = cache
            .read_or_write_with(
                "lazy",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Some("other".to_string())
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(first.as_deref(), Some("unitTest"));
        assert_eq!(second.as_deref(), Some("unitTest"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn read_or_write_does_not_store_none() {
        let (cache, _) = cache();
        let value: Option<String> = cache.read_or_write_with("nothing", || None, None).await.unwrap();
        assert!(value.is_none());
        assert!(cache.read_raw("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn soft_timeouts_surface_as_fail_results() {
        let store = Arc::new(MapStore {
            timing_out: true,
            ..Default::default()
        });
        let cache = Cache::new(store);

        let write = cache.write("k", &"v", None).await.unwrap();
        assert!(write.is_timeout());

        let read = cache.read_result::<String>("k").await.unwrap();
        assert!(read.is_timeout());
        assert_eq!(cache.read::<String>("k").await.unwrap(), None);

        // The producer's value is still handed back when the write degrades.
        let produced = cache
            .read_or_write_with("k", || Some("fresh".to_string()), None)
            .await
            .unwrap();
        assert_eq!(produced.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn blank_prefix_lists_everything() {
        let (cache, _) = cache();
        cache.write("p1", &1, None).await.unwrap();
        cache.write("q1", &1, None).await.unwrap();

        for blank in ["", "   ", "\t"] {
            let mut keys = cache.list_keys(Some(blank)).await.unwrap();
            keys.sort();
            assert_eq!(keys, vec!["p1".to_string(), "q1".to_string()]);
        }
        assert_eq!(cache.list_keys(Some("p")).await.unwrap(), vec!["p1".to_string()]);
    }
}
