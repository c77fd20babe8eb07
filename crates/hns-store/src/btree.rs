//! Keys of the sorted link indices.
//!
//! The name index is ordered by a 32-bit hash of the link name, with the
//! name itself as tie-breaker, so lookups by name are a single ordered
//! probe. Name order therefore differs from index order; callers that need
//! lexicographic order sort the records themselves.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Key of a record in a sorted link index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndexKey {
    /// Name index key.
    Name { hash: u32, name: String },
    /// Creation-order index key.
    CreationOrder(u64),
}

impl IndexKey {
    /// Name index key for `name`.
    pub fn name(name: &str) -> Self {
        Self::Name {
            hash: name_hash(name),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name { hash, name } => write!(f, "{name:?}#{hash:08x}"),
            Self::CreationOrder(n) => write!(f, "corder {n}"),
        }
    }
}

/// 32-bit hash of a link name (first four bytes of its BLAKE3 digest).
pub fn name_hash(name: &str) -> u32 {
    let digest = blake3::hash(name.as_bytes());
    let bytes = digest.as_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_hash_is_stable() {
        assert_eq!(name_hash("alpha"), name_hash("alpha"));
        assert_ne!(name_hash("alpha"), name_hash("beta"));
    }

    #[test]
    fn name_keys_order_by_hash_first() {
        let a = IndexKey::name("a");
        let b = IndexKey::name("b");
        let (IndexKey::Name { hash: ha, .. }, IndexKey::Name { hash: hb, .. }) = (&a, &b) else {
            panic!("expected name keys");
        };
        assert_eq!(a < b, ha < hb);
    }

    #[test]
    fn creation_order_keys_sort_numerically() {
        assert!(IndexKey::CreationOrder(2) < IndexKey::CreationOrder(10));
    }
}
