// shared/src/lib.rs

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("configuration: {0}")]
    Configuration(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("read failed: {0}")]
    Read(String),
    #[error("delete failed: {0}")]
    Delete(String),
    #[error("key already exists: {0}")]
    KeyAlreadyExists(String),
    #[error("invalid type: {0}")]
    InvalidType(String),
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("connection: {0}")]
    Connection(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Time-to-live in whole seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TtlSecs(pub u64);

impl TtlSecs {
    /// One day, the default expiration of every backend.
    pub const DEFAULT: TtlSecs = TtlSecs(86_400);

    pub fn as_secs(self) -> u64 {
        self.0
    }

    pub fn as_duration(self) -> std::time::Duration {
        std::time::Duration::from_secs(self.0)
    }
}

impl Default for TtlSecs {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u64> for TtlSecs {
    fn from(secs: u64) -> Self {
        TtlSecs(secs)
    }
}

/// Options common to every backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Options {
    /// Used whenever a write does not carry its own expiration.
    pub default_expiration_ttl: TtlSecs,
}

impl Options {
    pub fn with_default_ttl(ttl: impl Into<TtlSecs>) -> Self {
        Self {
            default_expiration_ttl: ttl.into(),
        }
    }

    /// Resolves the effective TTL of a single write.
    pub fn effective_ttl(&self, requested: Option<TtlSecs>) -> TtlSecs {
        requested.unwrap_or(self.default_expiration_ttl)
    }
}

/// Returns the value when present and non-blank, otherwise a configuration error
/// naming the setting.
pub fn required_value<'a>(name: &str, value: Option<&'a str>) -> Result<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Configuration(format!("Setting {name} is empty."))),
    }
}

pub mod config;
