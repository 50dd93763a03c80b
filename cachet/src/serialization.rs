//! Turns typed values into the string payloads stored by every backend.
//!
//! Values go through serde, so private fields and constructor-only types
//! round-trip through their `Serialize`/`Deserialize` impls. Owned Rust values
//! cannot form reference cycles; shared graphs (`Rc`/`Arc`) are written by
//! value.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared::{Error, Result};
use std::any::type_name;

/// Encoding used between the cache façade and a backend.
pub trait Codec: Send + Sync + 'static {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String>;

    /// Fails with `Error::InvalidType` when the payload does not fit `T`.
    fn decode<T: DeserializeOwned>(&self, payload: &str) -> Result<T>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SerializerSettings {
    /// Indented output; easier to inspect in a remote store's dashboard.
    pub pretty: bool,
    /// Wraps every payload with the Rust type it was written as, and refuses
    /// to decode it as anything else.
    pub type_preserving: bool,
}

#[derive(Clone, Debug, Default)]
pub struct JsonCodec {
    settings: SerializerSettings,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    #[serde(rename = "$type")]
    type_tag: &'a str,
    value: &'a T,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "$type")]
    type_tag: String,
    value: serde_json::Value,
}

impl JsonCodec {
    pub fn new(settings: SerializerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> SerializerSettings {
        self.settings
    }

    fn to_string<T: Serialize>(&self, value: &T) -> serde_json::Result<String> {
        if self.settings.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
    }
}

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String> {
        let encoded = if self.settings.type_preserving {
            self.to_string(&EnvelopeRef {
                type_tag: type_name::<T>(),
                value,
            })
        } else {
            self.to_string(value)
        };
        encoded.map_err(|e| Error::Serialization(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, payload: &str) -> Result<T> {
        let expected = type_name::<T>();

        if !self.settings.type_preserving {
            return serde_json::from_str(payload)
                .map_err(|e| Error::InvalidType(format!("payload is not a {expected}: {e}")));
        }

        let envelope: Envelope = serde_json::from_str(payload)
            .map_err(|e| Error::InvalidType(format!("payload has no type envelope: {e}")))?;
        if envelope.type_tag != expected {
            return Err(Error::InvalidType(format!(
                "payload was written as {}, requested {expected}",
                envelope.type_tag
            )));
        }
        serde_json::from_value(envelope.value)
            .map_err(|e| Error::InvalidType(format!("payload is not a {expected}: {e}")))
    }
}
