use crate::http_kv_api::{KvApi, ListKeysResponse};
use async_trait::async_trait;
use cachet::domain::WriteMode;
use cachet::domain::response::{DeleteResult, ReadResult, WriteResult};
use cachet::ports::CacheStore;
use reqwest::Url;
use shared::config::HttpKvSettings;
use shared::{Error, Options, Result, TtlSecs, required_value};
use std::fmt::Debug;
use std::time::Duration;
use tracing::{debug, warn};

/// Options of the remote HTTP KV backend.
#[derive(Clone, Debug)]
pub struct HttpKvOptions {
    pub options: Options,
    pub api_token: Option<String>,
    pub account_id: Option<String>,
    pub namespace_id: Option<String>,
    pub base_url: String,
    pub request_timeout: Duration,
    /// Follow `result_info.cursor` when listing; one page otherwise.
    pub follow_cursor: bool,
}

impl HttpKvOptions {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.cloudflare.com/client/v4";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(
        api_token: impl Into<String>,
        account_id: impl Into<String>,
        namespace_id: impl Into<String>,
    ) -> Self {
        Self {
            api_token: Some(api_token.into()),
            account_id: Some(account_id.into()),
            namespace_id: Some(namespace_id.into()),
            ..Default::default()
        }
    }

    pub fn from_settings(options: Options, settings: &HttpKvSettings) -> Self {
        Self {
            options,
            api_token: settings.api_token.clone(),
            account_id: settings.account_id.clone(),
            namespace_id: settings.namespace_id.clone(),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
            request_timeout: settings
                .request_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(Self::DEFAULT_TIMEOUT),
            follow_cursor: settings.follow_cursor,
        }
    }

    fn namespace_url(&self) -> Result<Url> {
        let account_id = required_value("AccountId", self.account_id.as_deref())?;
        let namespace_id = required_value("NamespaceId", self.namespace_id.as_deref())?;

        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::Configuration(format!("invalid base url '{}': {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| Error::Configuration(format!("invalid base url '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(["accounts", account_id, "storage", "kv", "namespaces", namespace_id]);
        Ok(url)
    }
}

impl Default for HttpKvOptions {
    fn default() -> Self {
        Self {
            options: Options::default(),
            api_token: None,
            account_id: None,
            namespace_id: None,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            request_timeout: Self::DEFAULT_TIMEOUT,
            follow_cursor: false,
        }
    }
}

/// Backend over a remote key-value HTTP service (Cloudflare Workers KV wire
/// format).
///
/// The service cannot store anything for less than
/// [`MIN_TTL`](HttpKvCache::MIN_TTL). Conditional writes are a read followed
/// by a write: two writers racing on the same cold key can both succeed.
pub struct HttpKvCache {
    api: KvApi,
    options: Options,
    follow_cursor: bool,
}

impl HttpKvCache {
    pub const MIN_TTL: TtlSecs = TtlSecs(60);

    pub fn new(options: HttpKvOptions) -> Result<Self> {
        let namespace_url = options.namespace_url()?;
        let api_token = required_value("ApiToken", options.api_token.as_deref())?.to_string();

        Ok(Self {
            api: KvApi::new(namespace_url, api_token, options.request_timeout)?,
            options: options.options,
            follow_cursor: options.follow_cursor,
        })
    }

    async fn put(&self, key: &str, value: String, ttl: TtlSecs) -> Result<WriteResult> {
        let response = self.api.put_value(key, ttl, value).await?;
        if !response.is_success() {
            warn!(key = %key, status = %response.status, "remote KV rejected write");
            return Err(Error::Write(format!(
                "Could not write to remote KV: {}",
                response.body
            )));
        }
        debug!(key = %key, ttl = ttl.as_secs(), "remote KV write");
        Ok(WriteResult::ok())
    }
}

#[async_trait]
impl CacheStore for HttpKvCache {
    fn name(&self) -> &'static str {
        "http-kv"
    }

    async fn read(&self, key: &str) -> Result<ReadResult<String>> {
        let response = self.api.get_value(key).await?;
        if response.is_not_found() {
            return Ok(ReadResult::missing());
        }
        if !response.is_success() {
            warn!(key = %key, status = %response.status, "remote KV read failed");
            return Err(Error::Read(format!(
                "Could not read from remote KV: {}",
                response.body
            )));
        }
        Ok(ReadResult::ok(response.body))
    }

    async fn write(
        &self,
        key: &str,
        value: String,
        mode: WriteMode,
        ttl: Option<TtlSecs>,
    ) -> Result<WriteResult> {
        let ttl = self.options.effective_ttl(ttl);
        if ttl < Self::MIN_TTL {
            return Err(Error::Write(format!(
                "Expiration should be {} or greater.",
                Self::MIN_TTL.as_secs()
            )));
        }

        if mode == WriteMode::IfAbsent && self.read(key).await?.is_ok() {
            return Err(Error::KeyAlreadyExists(key.to_string()));
        }

        self.put(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<DeleteResult> {
        let response = self.api.delete_value(key).await?;
        if !response.is_success() && !response.is_not_found() {
            return Err(Error::Delete(format!(
                "Could not delete from remote KV: {}",
                response.body
            )));
        }
        Ok(DeleteResult::ok())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<DeleteResult> {
        if keys.is_empty() {
            return Ok(DeleteResult::ok());
        }
        let response = self.api.delete_bulk(keys).await?;
        if !response.is_success() && !response.is_not_found() {
            return Err(Error::Delete(format!(
                "Could not bulk delete from remote KV: {}",
                response.body
            )));
        }
        Ok(DeleteResult::ok())
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let response = self.api.list_keys(prefix, cursor.as_deref()).await?;
            if !response.is_success() {
                return Err(Error::Read(format!(
                    "Could not list keys from remote KV: {}",
                    response.body
                )));
            }

            let page: ListKeysResponse = serde_json::from_str(&response.body)
                .map_err(|e| Error::Read(format!("unexpected key listing: {e}")))?;
            if page.success == Some(false) {
                return Err(Error::Read(format!(
                    "remote KV refused key listing: {}",
                    response.body
                )));
            }
            let next = page.next_cursor().map(str::to_string);
            keys.extend(page.result.unwrap_or_default().into_iter().map(|k| k.name));

            match next {
                Some(next) if self.follow_cursor => cursor = Some(next),
                _ => break,
            }
        }

        Ok(keys)
    }
}

impl Debug for HttpKvCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpKvCache")
            .field("api", &"<KvApi>")
            .field("default_ttl", &self.options.default_expiration_ttl)
            .field("follow_cursor", &self.follow_cursor)
            .finish()
    }
}
