//! Cache contract shared by every storage backend.
//!
//! [`Cache`] encodes values through a [`serialization::Codec`] and forwards to
//! a [`ports::CacheStore`] adapter. Adapters live in the `storage-engine`
//! crate.

pub mod cache;
pub mod domain;
pub mod key_codec;
pub mod ports;
pub mod serialization;

pub use cache::Cache;
pub use domain::WriteMode;
pub use domain::response::{DeleteResult, ReadReason, ReadResult, Status, WriteReason, WriteResult};
pub use key_codec::TypedKey;
pub use serialization::{Codec, JsonCodec, SerializerSettings};
pub use shared::{Error, Options, Result, TtlSecs};
