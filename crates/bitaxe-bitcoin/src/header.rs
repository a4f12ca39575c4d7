use packed_struct::prelude::*;
use packed_struct_codegen::PackedStruct;

pub use bitcoin_hashes::{hex::FromHex, sha256d::Hash, Hash as HashTrait};

use crate::midstate::Midstate;
use crate::BLOCK_HEADER_SIZE;

/// Bitcoin block header, packed to its 80-byte wire representation.
#[derive(PackedStruct, Debug, Clone, Copy, Default)]
#[packed_struct(endian = "lsb")]
pub struct BlockHeader {
    /// Current network consensus version, possibly with BIP320-rolled bits.
    pub version: u32,
    /// Double-SHA256 hash of the previous block header, internal order.
    pub previous_hash: [u8; 32],
    /// Double-SHA256 merkle root of the block's transactions, internal order.
    pub merkle_root: [u8; 32],
    /// Block timestamp, seconds since the Unix epoch.
    pub time: u32,
    /// Target in compact ("nBits") form.
    pub bits: u32,
    /// Nonce that brings the header hash below target.
    pub nonce: u32,
}

impl BlockHeader {
    #[inline]
    pub fn into_bytes(self) -> [u8; BLOCK_HEADER_SIZE] {
        self.pack()
    }

    /// Double-SHA256 hash of the full 80-byte header.
    pub fn hash(&self) -> Hash {
        let block_bytes = self.into_bytes();
        Hash::hash(&block_bytes)
    }

    /// SHA-256 midstate of the header's first 64 bytes.
    pub fn midstate(&self) -> Midstate {
        Midstate::compute(&self.into_bytes())
    }
}
