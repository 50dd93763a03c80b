//! Storage backends for the `cachet` contract.

use cachet::ports::{CacheStore, StorageFactory};
use shared::Result;
use shared::config::{Backend, Settings};
use std::sync::Arc;
use tracing::info;

mod http_kv_api;
pub mod http_kv_cache;
pub mod memory_cache;
pub mod redis_cache;

pub use http_kv_api::{ListKeysResponse, ListedKey, ResultInfo};
pub use http_kv_cache::{HttpKvCache, HttpKvOptions};
pub use memory_cache::{CacheEntry, MemoryCache, MemoryStore};
pub use redis_cache::{RedisCache, RedisOptions};

/// Builds the backend selected by [`Settings::backend`].
#[derive(Clone, Copy, Debug, Default)]
pub struct StoreFactory;

impl StorageFactory for StoreFactory {
    fn create_from_settings(&self, settings: &Settings) -> Result<Arc<dyn CacheStore>> {
        let store: Arc<dyn CacheStore> = match settings.backend {
            Backend::Memory => Arc::new(MemoryCache::new(settings.options)),
            Backend::HttpKv => Arc::new(HttpKvCache::new(HttpKvOptions::from_settings(
                settings.options,
                &settings.http_kv,
            ))?),
            Backend::Redis => Arc::new(RedisCache::new(RedisOptions::from_settings(
                settings.options,
                &settings.redis,
            ))?),
        };

        info!(
            backend = store.name(),
            default_ttl = settings.options.default_expiration_ttl.as_secs(),
            "storage backend ready"
        );
        Ok(store)
    }
}
