//! Byte-order is a frequent source of bugs in Stratum implementations: V1
//! gives hashes in "display" order (as printed by block explorers), V2 gives
//! them in "internal" order (raw SHA-256 output, as used by the hashing
//! engine). Keeping these as distinct types makes the conversion explicit at
//! every call site instead of relying on a comment.

use std::fmt;

/// A 32-byte hash in SHA-256 internal (engine) byte order, as used directly
/// by midstate computation and as delivered by Stratum V2.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct InternalHash(pub [u8; 32]);

/// A 32-byte hash in display (reversed, big-endian-looking hex) byte order,
/// as delivered by Stratum V1 and shown to users.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct DisplayHash(pub [u8; 32]);

impl InternalHash {
    pub fn to_display(&self) -> DisplayHash {
        let mut reversed = self.0;
        reversed.reverse();
        DisplayHash(reversed)
    }
}

impl DisplayHash {
    pub fn to_internal(&self) -> InternalHash {
        let mut reversed = self.0;
        reversed.reverse();
        InternalHash(reversed)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for DisplayHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for DisplayHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DisplayHash({})", self)
    }
}

impl fmt::Debug for InternalHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InternalHash({})", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_internal_roundtrip() {
        let mut bytes = [0u8; 32];
        bytes[0] = 1;
        bytes[31] = 2;
        let internal = InternalHash(bytes);
        let display = internal.to_display();
        assert_eq!(display.to_internal(), internal);
    }
}
