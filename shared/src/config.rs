use crate::{Error, Options, Result, TtlSecs};
use tracing::warn;

/// Which backend adapter the process talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Memory,
    HttpKv,
    Redis,
}

impl std::str::FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" | "inmemory" => Ok(Backend::Memory),
            "http-kv" | "httpkv" | "cloudflare" => Ok(Backend::HttpKv),
            "redis" => Ok(Backend::Redis),
            other => Err(Error::Configuration(format!("unknown backend '{other}'"))),
        }
    }
}

/// Remote HTTP KV settings. Required values stay optional here and are checked
/// when the adapter is built.
#[derive(Clone, Debug, Default)]
pub struct HttpKvSettings {
    pub api_token: Option<String>,
    pub account_id: Option<String>,
    pub namespace_id: Option<String>,
    pub base_url: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub follow_cursor: bool,
}

#[derive(Clone, Debug)]
pub struct RedisSettings {
    pub url: Option<String>,
    pub ignore_timeouts: bool,
    pub pool_size: usize,
    pub timeout_ms: u64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: None,
            ignore_timeouts: false,
            pool_size: Settings::DEFAULT_REDIS_POOL_SIZE,
            timeout_ms: Settings::DEFAULT_REDIS_TIMEOUT_MS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub backend: Backend,
    pub options: Options,
    pub http_kv: HttpKvSettings,
    pub redis: RedisSettings,
}

impl Settings {
    const DEFAULT_BACKEND: Backend = Backend::Memory;
    const DEFAULT_REDIS_POOL_SIZE: usize = 16;
    const DEFAULT_REDIS_TIMEOUT_MS: u64 = 5_000;

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from any variable source; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("CACHET_BACKEND") {
            Some(raw) => raw.parse::<Backend>()?,
            None => Self::DEFAULT_BACKEND,
        };

        let default_ttl = parse_or("CACHET_DEFAULT_TTL", lookup("CACHET_DEFAULT_TTL"), TtlSecs::DEFAULT.0);

        Ok(Self {
            backend,
            options: Options::with_default_ttl(default_ttl),
            http_kv: HttpKvSettings {
                api_token: lookup("CACHET_KV_API_TOKEN"),
                account_id: lookup("CACHET_KV_ACCOUNT_ID"),
                namespace_id: lookup("CACHET_KV_NAMESPACE_ID"),
                base_url: lookup("CACHET_KV_BASE_URL"),
                request_timeout_ms: lookup("CACHET_KV_TIMEOUT_MS")
                    .map(|raw| parse_or("CACHET_KV_TIMEOUT_MS", Some(raw), 10_000)),
                follow_cursor: parse_flag(lookup("CACHET_KV_FOLLOW_CURSOR")),
            },
            redis: RedisSettings {
                url: lookup("CACHET_REDIS_URL"),
                ignore_timeouts: parse_flag(lookup("CACHET_REDIS_IGNORE_TIMEOUTS")),
                pool_size: parse_or(
                    "CACHET_REDIS_POOL_SIZE",
                    lookup("CACHET_REDIS_POOL_SIZE"),
                    Self::DEFAULT_REDIS_POOL_SIZE,
                ),
                timeout_ms: parse_or(
                    "CACHET_REDIS_TIMEOUT_MS",
                    lookup("CACHET_REDIS_TIMEOUT_MS"),
                    Self::DEFAULT_REDIS_TIMEOUT_MS,
                ),
            },
        })
    }
}

fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    match raw {
        None => default,
        Some(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("{name}='{raw}' is not valid, using default {default}");
            default
        }),
    }
}

fn parse_flag(raw: Option<String>) -> bool {
    matches!(
        raw.as_deref().map(|s| s.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_to_memory_backend_with_one_day_ttl() {
        let settings = Settings::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(settings.backend, Backend::Memory);
        assert_eq!(settings.options.default_expiration_ttl, TtlSecs(86_400));
        assert!(!settings.redis.ignore_timeouts);
        assert_eq!(settings.redis.pool_size, 16);
    }

    #[test]
    fn reads_redis_settings() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("CACHET_BACKEND", "redis"),
            ("CACHET_DEFAULT_TTL", "120"),
            ("CACHET_REDIS_URL", "redis://localhost:6379"),
            ("CACHET_REDIS_IGNORE_TIMEOUTS", "true"),
            ("CACHET_REDIS_TIMEOUT_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(settings.backend, Backend::Redis);
        assert_eq!(settings.options.default_expiration_ttl, TtlSecs(120));
        assert_eq!(settings.redis.url.as_deref(), Some("redis://localhost:6379"));
        assert!(settings.redis.ignore_timeouts);
        assert_eq!(settings.redis.timeout_ms, 250);
    }

    #[test]
    fn invalid_number_falls_back_to_default() {
        let settings =
            Settings::from_lookup(lookup_from(&[("CACHET_DEFAULT_TTL", "soon")])).unwrap();
        assert_eq!(settings.options.default_expiration_ttl, TtlSecs::DEFAULT);
    }

    #[test]
    fn unknown_backend_is_a_configuration_error() {
        let result = Settings::from_lookup(lookup_from(&[("CACHET_BACKEND", "memcached")]));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
