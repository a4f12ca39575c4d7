//! Decodes the SV2 Noise authority public key from its base58 NVS
//! representation (spec §8 Testable Property 12).

use base58::FromBase58;
use thiserror::Error;

const EXPECTED_DECODED_LEN: usize = 38;
const EXPECTED_VERSION: [u8; 2] = [0x01, 0x00];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthorityKeyError {
    #[error("base58 decode failed")]
    Base58,
    #[error("decoded length {0} != {EXPECTED_DECODED_LEN}")]
    WrongLength(usize),
    #[error("unexpected version bytes {0:02x?}")]
    WrongVersion([u8; 2]),
}

/// Decodes a base58-encoded authority key: 2 version bytes `01 00`, a
/// 32-byte x-only pubkey, and presumably a 4-byte checksum, for 38 bytes
/// total. Returns the 32-byte pubkey.
pub fn decode_authority_pubkey(encoded: &str) -> Result<[u8; 32], AuthorityKeyError> {
    let decoded = encoded.from_base58().map_err(|_| AuthorityKeyError::Base58)?;
    if decoded.len() != EXPECTED_DECODED_LEN {
        return Err(AuthorityKeyError::WrongLength(decoded.len()));
    }
    let version = [decoded[0], decoded[1]];
    if version != EXPECTED_VERSION {
        return Err(AuthorityKeyError::WrongVersion(version));
    }
    let mut pubkey = [0u8; 32];
    pubkey.copy_from_slice(&decoded[2..34]);
    Ok(pubkey)
}
