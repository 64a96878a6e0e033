//! Byte order selection for multi-byte scalars
//!
//! A scalar's byte order is resolved most-specific-first: an endianness set
//! on the scalar itself, then the default declared by the schema that owns
//! it, then the process-wide default kept here.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Byte order for multi-byte values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Native byte order of the platform
    Native,
    /// Network byte order (big-endian)
    Network,
    /// Little-endian
    Little,
    /// Big-endian
    Big,
}

impl Endianness {
    /// Whether values are laid out least significant byte first
    #[inline]
    pub fn is_little(self) -> bool {
        match self {
            Endianness::Native => cfg!(target_endian = "little"),
            Endianness::Network | Endianness::Big => false,
            Endianness::Little => true,
        }
    }

    const fn to_u8(self) -> u8 {
        match self {
            Endianness::Native => 0,
            Endianness::Network => 1,
            Endianness::Little => 2,
            Endianness::Big => 3,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Endianness::Network,
            2 => Endianness::Little,
            3 => Endianness::Big,
            _ => Endianness::Native,
        }
    }
}

static DEFAULT_ENDIANNESS: AtomicU8 = AtomicU8::new(Endianness::Native.to_u8());

/// The byte order used by scalars that neither set one nor inherit one
pub fn default_endianness() -> Endianness {
    Endianness::from_u8(DEFAULT_ENDIANNESS.load(Ordering::Relaxed))
}

/// Change the process-wide default byte order.
///
/// Only scalars with no explicit or schema-level endianness are affected, and
/// only on their next encode or decode.
pub fn set_default_endianness(endianness: Endianness) {
    DEFAULT_ENDIANNESS.store(endianness.to_u8(), Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_order() {
        assert!(!Endianness::Network.is_little());
        assert!(!Endianness::Big.is_little());
        assert!(Endianness::Little.is_little());
        assert_eq!(
            Endianness::Native.is_little(),
            cfg!(target_endian = "little")
        );
    }

    #[test]
    fn test_u8_mapping() {
        for e in [
            Endianness::Native,
            Endianness::Network,
            Endianness::Little,
            Endianness::Big,
        ] {
            assert_eq!(Endianness::from_u8(e.to_u8()), e);
        }
    }
}
