//! Target/difficulty math shared by the result task (C8, block/share
//! difficulty) and both Stratum clients (pool-difficulty / `pdiff`).

use uint::construct_uint;

construct_uint! {
    /// 256-bit unsigned integer used for targets and hash interpretation.
    pub struct U256(4);
}

/// Binary representation of the "difficulty 1" target, as used by every
/// Bitcoin-derived pool protocol.
pub const DIFFICULTY_1_TARGET_BYTES: [u8; 32] = [
    0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// A 256-bit target, always held internally as little-endian (the order
/// used both for SHA-256 digest interpretation and for SV2 `SetTarget`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Target(pub U256);

impl Target {
    pub fn difficulty_1() -> Self {
        Self(U256::from_little_endian(&DIFFICULTY_1_TARGET_BYTES))
    }

    /// Decode a target from its 32-byte little-endian wire representation
    /// (as used by SV2's `SetTarget`).
    pub fn from_le_bytes(bytes: &[u8; 32]) -> Self {
        Self(U256::from_little_endian(bytes))
    }

    pub fn to_le_bytes(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        self.0.to_little_endian(&mut out);
        out
    }

    /// Expand a compact ("nBits") target to its full 256-bit form.
    pub fn from_compact(bits: u32) -> Self {
        let exponent = (bits >> 24) as usize;
        let mantissa = bits & 0x00ff_ffff;
        let mut bytes = [0u8; 32];
        if exponent <= 3 {
            let mantissa = mantissa >> (8 * (3 - exponent));
            bytes[0..4].copy_from_slice(&mantissa.to_le_bytes());
        } else {
            let shift = exponent - 3;
            if shift < 32 {
                let mantissa_bytes = mantissa.to_le_bytes();
                for (i, b) in mantissa_bytes.iter().enumerate() {
                    let idx = shift + i;
                    if idx < 32 {
                        bytes[idx] = *b;
                    }
                }
            }
        }
        Self(U256::from_little_endian(&bytes))
    }

    /// Interpret a 32-byte digest (already in internal/LE order) as a target
    /// and compute its "true difficulty", i.e. `difficulty_1 / digest`.
    pub fn difficulty_of_hash(digest: &[u8; 32]) -> f64 {
        let as_target = U256::from_little_endian(digest);
        if as_target.is_zero() {
            return f64::INFINITY;
        }
        Self::difficulty_1().ratio_to(Self(as_target))
    }

    /// `difficulty_1 / self`, expressed as an `f64` the way pool difficulty
    /// ("pdiff") is normally reported.
    pub fn difficulty(self) -> f64 {
        Self::difficulty_1().ratio_to(self)
    }

    /// `self / other` computed with enough precision for difficulty
    /// reporting (targets routinely span more bits than an f64 mantissa, so
    /// the ratio is taken in a few top limbs rather than truncating to u64).
    fn ratio_to(self, other: Self) -> f64 {
        if other.0.is_zero() {
            return f64::INFINITY;
        }
        u256_to_f64(self.0) / u256_to_f64(other.0)
    }
}

fn u256_to_f64(value: U256) -> f64 {
    let mut result = 0f64;
    for word in value.0.iter().rev() {
        result = result * (u64::MAX as f64 + 1.0) + *word as f64;
    }
    result
}
