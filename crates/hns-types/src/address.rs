use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Persistent address of an object header inside a container.
///
/// Several links may name the same `Address` (hard links). An address does
/// not own the object it names; it is only meaningful together with the
/// container it was allocated in.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(u64);

impl Address {
    /// The undefined address. Represents "no object".
    pub const UNDEFINED: Address = Address(u64::MAX);

    /// Wrap a raw address value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw address value.
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Returns `true` if this is the undefined address.
    pub fn is_undefined(&self) -> bool {
        self.0 == u64::MAX
    }

    /// Big-endian hex representation (16 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_be_bytes())
    }

    /// Parse from a big-endian hex string (16 characters).
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 8 {
            return Err(TypeError::InvalidLength {
                expected: 8,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&bytes);
        Ok(Self(u64::from_be_bytes(arr)))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_undefined() {
            write!(f, "Address(UNDEF)")
        } else {
            write!(f, "Address({:#x})", self.0)
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_undefined() {
            write!(f, "UNDEF")
        } else {
            write!(f, "{:#x}", self.0)
        }
    }
}

impl From<u64> for Address {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_is_max() {
        assert!(Address::UNDEFINED.is_undefined());
        assert!(!Address::new(0).is_undefined());
    }

    #[test]
    fn hex_roundtrip() {
        let addr = Address::new(0x1234_5678_9abc);
        let parsed = Address::from_hex(&addr.to_hex()).unwrap();
        assert_eq!(addr, parsed);
        assert_eq!(addr.to_hex().len(), 16);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = Address::from_hex("abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 8,
                actual: 2
            }
        );
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert!(matches!(
            Address::from_hex("zz"),
            Err(TypeError::InvalidHex(_))
        ));
    }

    #[test]
    fn display_formats() {
        assert_eq!(format!("{}", Address::new(255)), "0xff");
        assert_eq!(format!("{}", Address::UNDEFINED), "UNDEF");
        assert_eq!(format!("{:?}", Address::new(16)), "Address(0x10)");
    }

    #[test]
    fn serde_roundtrip() {
        let addr = Address::new(42);
        let json = serde_json::to_string(&addr).unwrap();
        let parsed: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(addr, parsed);
    }
}
