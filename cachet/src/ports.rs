#![deny(clippy::all)]

use crate::domain::WriteMode;
use crate::domain::response::{DeleteResult, ReadResult, WriteResult};
use async_trait::async_trait;
use shared::config::Settings;
use shared::{Result, TtlSecs};
use std::sync::Arc;

// Ports are the pluggable extension points for the storage backends

/// Port for building a backend from process configuration
pub trait StorageFactory: Send + Sync + 'static {
    fn create_from_settings(&self, settings: &Settings) -> Result<Arc<dyn CacheStore>>;
}

/// Port every backend adapter implements.
///
/// Keys are storage keys and values are already-encoded payloads; decoding and
/// key derivation happen in [`crate::Cache`]. Absence is reported through
/// [`ReadResult`], never as an error.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    async fn read(&self, key: &str) -> Result<ReadResult<String>>;

    /// Writes `value`. `ttl` of `None` means the backend's configured default.
    /// `WriteMode::IfAbsent` must be race-free against concurrent writers of
    /// the same key as far as the backend allows, and returns
    /// `Error::KeyAlreadyExists` when a live entry is present.
    async fn write(
        &self,
        key: &str,
        value: String,
        mode: WriteMode,
        ttl: Option<TtlSecs>,
    ) -> Result<WriteResult>;

    async fn delete(&self, key: &str) -> Result<DeleteResult>;

    /// Removes all `keys`; backends with a native multi-key delete use a single
    /// round trip.
    async fn delete_many(&self, keys: &[String]) -> Result<DeleteResult>;

    /// Live keys starting with `prefix`, or all live keys.
    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>>;
}
