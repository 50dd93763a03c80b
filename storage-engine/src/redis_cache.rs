use async_trait::async_trait;
use cachet::domain::WriteMode;
use cachet::domain::response::{DeleteResult, ReadReason, ReadResult, WriteReason, WriteResult};
use cachet::ports::CacheStore;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, PoolError, Runtime, Timeouts};
use redis::{AsyncCommands, RedisError, RedisResult};
use shared::config::RedisSettings;
use shared::{Error, Options, Result, TtlSecs, required_value};
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Options of the networked store backend.
#[derive(Clone, Debug)]
pub struct RedisOptions {
    pub options: Options,
    /// Connection URL, e.g. `redis://localhost:6379/0`.
    pub url: Option<String>,
    /// Turn connection failures and timeouts into `Fail` results tagged
    /// `Timeout` instead of errors.
    pub ignore_timeouts: bool,
    pub pool_size: usize,
    /// Bound on connecting and on every command.
    pub timeout: Duration,
}

impl RedisOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn from_settings(options: Options, settings: &RedisSettings) -> Self {
        Self {
            options,
            url: settings.url.clone(),
            ignore_timeouts: settings.ignore_timeouts,
            pool_size: settings.pool_size,
            timeout: Duration::from_millis(settings.timeout_ms),
        }
    }
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            options: Options::default(),
            url: None,
            ignore_timeouts: false,
            pool_size: 16,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Why a store call did not produce a reply.
#[derive(Debug)]
enum Failure {
    Timeout(String),
    Connection(String),
    Command(RedisError),
}

impl Failure {
    fn from_pool(err: PoolError) -> Self {
        match err {
            PoolError::Timeout(kind) => Failure::Timeout(format!("pool {kind:?} timed out")),
            PoolError::Backend(err) => Failure::from_redis(err),
            other => Failure::Connection(other.to_string()),
        }
    }

    fn from_redis(err: RedisError) -> Self {
        if err.is_timeout() {
            Failure::Timeout(err.to_string())
        } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            Failure::Connection(err.to_string())
        } else {
            Failure::Command(err)
        }
    }

    /// Failures the ignore-timeouts policy may swallow.
    fn is_transient(&self) -> bool {
        matches!(self, Failure::Timeout(_) | Failure::Connection(_))
    }

    fn into_error(self, wrap: fn(String) -> Error) -> Error {
        match self {
            Failure::Timeout(msg) => Error::Timeout(msg),
            Failure::Connection(msg) => Error::Connection(msg),
            Failure::Command(err) => wrap(err.to_string()),
        }
    }
}

/// Backend over a Redis-compatible networked store.
///
/// Conditional writes use `SET .. NX`, batch deletes a single multi-key `DEL`.
/// The store expires entries itself, so listings are returned as found.
pub struct RedisCache {
    pool: Pool,
    options: Options,
    ignore_timeouts: bool,
    timeout: Duration,
}

impl RedisCache {
    const SCAN_COUNT: usize = 250;
    /// About 136 years.
    const MAX_EXPIRE_SECS: u64 = u32::MAX as u64;

    /// Builds the connection pool. No connection is opened until the first
    /// command.
    pub fn new(options: RedisOptions) -> Result<Self> {
        let url = required_value("Configuration", options.url.as_deref())?;

        let mut timeouts = Timeouts::default();
        timeouts.wait = Some(options.timeout);
        timeouts.create = Some(options.timeout);
        timeouts.recycle = Some(options.timeout);
        let mut pool_config = PoolConfig::new(options.pool_size.max(1));
        pool_config.timeouts = timeouts;

        let mut config = Config::from_url(url);
        config.pool = Some(pool_config);
        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::Configuration(format!("invalid redis configuration: {e}")))?;

        Ok(Self {
            pool,
            options: options.options,
            ignore_timeouts: options.ignore_timeouts,
            timeout: options.timeout,
        })
    }

    async fn connection(&self) -> std::result::Result<Connection, Failure> {
        bounded(self.timeout, async {
            self.pool.get().await.map_err(Failure::from_pool)
        })
        .await
    }

    /// Checks out a connection and runs `command` on it. Checkout and command
    /// are each bounded by the configured timeout.
    async fn run<T, F, Fut>(&self, command: F) -> std::result::Result<T, Failure>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.connection().await?;
        bounded(self.timeout, async {
            command(conn).await.map_err(Failure::from_redis)
        })
        .await
    }

    fn swallow(&self, failure: &Failure) -> bool {
        self.ignore_timeouts && failure.is_transient()
    }
}

async fn bounded<T>(
    limit: Duration,
    attempt: impl Future<Output = std::result::Result<T, Failure>>,
) -> std::result::Result<T, Failure> {
    match tokio::time::timeout(limit, attempt).await {
        Ok(result) => result,
        Err(_) => Err(Failure::Timeout(format!(
            "no reply within {}ms",
            limit.as_millis()
        ))),
    }
}

/// `EX` argument for `ttl`. Redis refuses 0 and expiries whose millisecond
/// deadline overflows, so the value is kept within `1..=MAX_EXPIRE_SECS`.
fn expire_secs(ttl: TtlSecs) -> u64 {
    ttl.as_secs().clamp(1, RedisCache::MAX_EXPIRE_SECS)
}

/// One step of a `SCAN` cursor walk.
#[async_trait]
trait KeyPages: Send {
    async fn page(&mut self, cursor: u64) -> std::result::Result<(u64, Vec<String>), Failure>;
}

struct Scan {
    conn: Connection,
    pattern: String,
}

#[async_trait]
impl KeyPages for Scan {
    async fn page(&mut self, cursor: u64) -> std::result::Result<(u64, Vec<String>), Failure> {
        let mut cmd = redis::cmd("SCAN");
        cmd.arg(cursor)
            .arg("MATCH")
            .arg(&self.pattern)
            .arg("COUNT")
            .arg(RedisCache::SCAN_COUNT);
        let reply: RedisResult<(u64, Vec<String>)> = cmd.query_async(&mut self.conn).await;
        reply.map_err(Failure::from_redis)
    }
}

/// Follows the cursor back to 0. Each page is bounded by `limit` on its own.
async fn collect_keys(
    pages: &mut impl KeyPages,
    limit: Duration,
) -> std::result::Result<Vec<String>, Failure> {
    let mut cursor: u64 = 0;
    let mut keys: Vec<String> = Vec::new();
    loop {
        let (next, batch) = bounded(limit, pages.page(cursor)).await?;
        keys.extend(batch);
        if next == 0 {
            break;
        }
        cursor = next;
    }
    // SCAN may return a key more than once.
    keys.sort();
    keys.dedup();
    Ok(keys)
}

/// Escapes glob metacharacters so a prefix only matches literally.
fn scan_pattern(prefix: Option<&str>) -> String {
    let mut pattern = String::new();
    for c in prefix.unwrap_or_default().chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

#[async_trait]
impl CacheStore for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn read(&self, key: &str) -> Result<ReadResult<String>> {
        let reply = self
            .run(|mut conn| async move { conn.get::<_, Option<String>>(key).await })
            .await;

        match reply {
            Ok(Some(value)) => Ok(ReadResult::ok(value)),
            Ok(None) => Ok(ReadResult::missing()),
            Err(failure) if self.swallow(&failure) => {
                warn!(key = %key, ?failure, "redis read ignored");
                Ok(ReadResult::fail(ReadReason::Timeout))
            }
            Err(failure) => Err(failure.into_error(Error::Read)),
        }
    }

    async fn write(
        &self,
        key: &str,
        value: String,
        mode: WriteMode,
        ttl: Option<TtlSecs>,
    ) -> Result<WriteResult> {
        let ttl = self.options.effective_ttl(ttl);
        let reply = self
            .run(|mut conn| async move {
                let mut cmd = redis::cmd("SET");
                cmd.arg(key).arg(value).arg("EX").arg(expire_secs(ttl));
                if mode == WriteMode::IfAbsent {
                    cmd.arg("NX");
                }
                let reply: redis::Value = cmd.query_async(&mut conn).await?;
                Ok(reply)
            })
            .await;

        match reply {
            Ok(redis::Value::Nil) if mode == WriteMode::IfAbsent => {
                Err(Error::KeyAlreadyExists(key.to_string()))
            }
            Ok(redis::Value::Nil) => Err(Error::Write("Could not write to Redis".into())),
            Ok(_) => {
                debug!(key = %key, ttl = ttl.as_secs(), "redis write");
                Ok(WriteResult::ok())
            }
            Err(failure) if self.swallow(&failure) => {
                warn!(key = %key, ?failure, "redis write dropped");
                Ok(WriteResult::fail(WriteReason::Timeout))
            }
            Err(failure) => Err(failure.into_error(Error::Write)),
        }
    }

    async fn delete(&self, key: &str) -> Result<DeleteResult> {
        let reply = self
            .run(|mut conn| async move { conn.del::<_, i64>(key).await })
            .await;

        match reply {
            Ok(_) => Ok(DeleteResult::ok()),
            Err(failure) if self.swallow(&failure) => {
                warn!(key = %key, ?failure, "redis delete dropped");
                Ok(DeleteResult::fail(WriteReason::Timeout))
            }
            Err(failure) => Err(failure.into_error(Error::Delete)),
        }
    }

    async fn delete_many(&self, keys: &[String]) -> Result<DeleteResult> {
        if keys.is_empty() {
            return Ok(DeleteResult::ok());
        }
        let owned = keys.to_vec();
        let reply = self
            .run(|mut conn| async move { conn.del::<_, i64>(owned).await })
            .await;

        match reply {
            Ok(removed) => {
                debug!(requested = keys.len(), removed, "redis batch delete");
                Ok(DeleteResult::ok())
            }
            Err(failure) if self.swallow(&failure) => {
                warn!(count = keys.len(), ?failure, "redis batch delete dropped");
                Ok(DeleteResult::fail(WriteReason::Timeout))
            }
            Err(failure) => Err(failure.into_error(Error::Delete)),
        }
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let listing = async {
            let conn = self.connection().await?;
            let mut scan = Scan {
                conn,
                pattern: scan_pattern(prefix),
            };
            collect_keys(&mut scan, self.timeout).await
        };
        let reply = listing.await;

        match reply {
            Ok(keys) => Ok(keys),
            Err(failure) if self.swallow(&failure) => {
                warn!(?prefix, ?failure, "redis listing ignored");
                Ok(Vec::new())
            }
            Err(failure) => Err(failure.into_error(Error::Read)),
        }
    }
}

impl Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("pool", &self.pool.status())
            .field("default_ttl", &self.options.default_expiration_ttl)
            .field("ignore_timeouts", &self.ignore_timeouts)
            .finish()
    }
}
