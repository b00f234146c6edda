//! Content fingerprints used to tell a real configuration change from a no-op.

use std::fmt;

use serde::Serialize;

/// Hex encoded MD5 of a value's JSON serialization.
///
/// An empty fingerprint means the value could not be serialized. It never
/// matches anything, not even another empty fingerprint, so callers always
/// treat such a value as changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether both fingerprints identify the same content.
    pub fn same_as(&self, other: &Fingerprint) -> bool {
        !self.is_empty() && self.0 == other.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "<none>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Compute the fingerprint of any serializable value.
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Fingerprint {
    match serde_json::to_vec(value) {
        Ok(bytes) => Fingerprint(hex::encode(md5::compute(bytes).0)),
        Err(_) => Fingerprint::default(),
    }
}
