//! Bitcoin mining primitives shared by the job pipeline and both Stratum
//! clients: SHA-256 midstate, block header packing, merkle assembly and
//! target/difficulty math.

pub mod hash;
pub mod header;
pub mod merkle;
pub mod midstate;
pub mod target;

pub use hash::{DisplayHash, InternalHash};
pub use header::BlockHeader;
pub use midstate::Midstate;
pub use target::Target;

/// https://github.com/bitcoin/bips/blob/master/bip-0320.mediawiki
pub const BIP320_VERSION_MASK: u32 = 0x1fff_e000;
pub const BIP320_VERSION_SHIFT: u32 = 13;
pub const BIP320_VERSION_MAX: u32 = u16::MAX as u32;

/// A Bitcoin block header is 80 bytes long.
pub const BLOCK_HEADER_SIZE: usize = 80;

/// First chunk of the block header used for midstate computation.
pub const BLOCK_HEADER_CHUNK1_SIZE: usize = 64;

/// Enumerate the BIP320-rolled versions of `base_version`, OR-ing successive
/// increments of the masked bits into the base. The ASIC families reconstruct
/// rolled versions the same way, so the job builder must precompute midstates
/// in lock step with this enumeration.
pub fn roll_versions(base_version: u32, mask: u32, count: usize) -> Vec<u32> {
    let mut out = Vec::with_capacity(count);
    let mut roll: u32 = 0;
    for _ in 0..count {
        let rolled = (base_version & !mask) | (roll & mask);
        out.push(rolled);
        roll = roll.wrapping_add(1 << mask.trailing_zeros().min(31));
    }
    out
}
