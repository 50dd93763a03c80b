use sha2::{Digest, Sha256};
use std::fmt;

/// Composite key of an explicit type tag and a logical key.
///
/// The cache itself stores logical keys as given. Callers that keep several
/// value types under one logical key build a `TypedKey` and use its
/// [`storage_key`](TypedKey::storage_key) instead.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypedKey<'a> {
    pub type_tag: &'a str,
    pub key: &'a str,
}

impl<'a> TypedKey<'a> {
    pub fn new(type_tag: &'a str, key: &'a str) -> Self {
        Self { type_tag, key }
    }

    /// Lowercase hex SHA-256 of `"{type_tag}-{key}"`.
    pub fn storage_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.type_tag.as_bytes());
        hasher.update(b"-");
        hasher.update(self.key.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for TypedKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.type_tag, self.key)
    }
}
