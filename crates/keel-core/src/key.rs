use derive_more::{Deref, Display};
use serde::{Deserialize, Serialize};

///
/// Key
///
/// Map key for collection members and record identities.
/// Numeric ids normalize to their decimal text form, so an item keyed by
/// `42` and one keyed by `"42"` collide on purpose.
///

#[derive(
    Clone, Debug, Default, Deref, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Key(Box<str>);

impl Key {
    /// Build a key from anything key-like.
    pub fn new(key: impl Into<Self>) -> Self {
        key.into()
    }

    /// Return the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the key is the empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Self(key.into())
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Self(key.into_boxed_str())
    }
}

impl From<i64> for Key {
    fn from(key: i64) -> Self {
        Self(key.to_string().into_boxed_str())
    }
}

impl From<u64> for Key {
    fn from(key: u64) -> Self {
        Self(key.to_string().into_boxed_str())
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_keys_normalize_to_text() {
        assert_eq!(Key::from(42_i64), Key::from("42"));
        assert_eq!(Key::from(42_u64).as_str(), "42");
    }

    #[test]
    fn keys_order_lexicographically() {
        assert!(Key::from("a") < Key::from("b"));
    }

    #[test]
    fn serializes_transparently() {
        let key = Key::from("alpha");
        assert_eq!(serde_json::to_string(&key).expect("json"), "\"alpha\"");
        let back: Key = serde_json::from_str("\"alpha\"").expect("json");
        assert_eq!(back, key);
    }
}
