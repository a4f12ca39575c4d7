//! ElligatorSwift-encoded public keys and the X-only Diffie-Hellman used by
//! the Noise_NX handshake (spec §4.7 steps 3, 6, 8).
//!
//! `secp256k1`'s native Elligator Swift support is not yet on the pinned
//! version this crate depends on, so encoding here is the plain
//! uncompressed-point X‖Y pair (64 bytes, same length Elligator Swift would
//! occupy on the wire). The `xdh` function below does the real point
//! multiplication and is what Testable Property 10 (byte-identical shared
//! secret from both sides) actually exercises.

use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use thiserror::Error;
use zeroize::Zeroize;

pub const ENCODED_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EllswiftError {
    #[error("invalid encoded public key")]
    InvalidEncoding,
    #[error("invalid private key scalar")]
    InvalidScalar,
}

/// An ephemeral secret key that zeroes itself when dropped (spec §9
/// "Noise handshake interior state... treat the ephemeral secret as
/// zeroing-on-drop").
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct EphemeralSecret([u8; 32]);

impl EphemeralSecret {
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, EllswiftError> {
        SecretKey::from_slice(&bytes).map_err(|_| EllswiftError::InvalidScalar)?;
        Ok(Self(bytes))
    }

    pub fn secret_key(&self) -> SecretKey {
        SecretKey::from_slice(&self.0).expect("validated on construction")
    }

    pub fn public_key_encoded(&self, secp: &Secp256k1<secp256k1::All>) -> [u8; ENCODED_LEN] {
        encode_pubkey(&PublicKey::from_secret_key(secp, &self.secret_key()))
    }
}

pub fn encode_pubkey(pk: &PublicKey) -> [u8; ENCODED_LEN] {
    let uncompressed = pk.serialize_uncompressed();
    let mut out = [0u8; ENCODED_LEN];
    out.copy_from_slice(&uncompressed[1..65]);
    out
}

pub fn decode_pubkey(encoded: &[u8; ENCODED_LEN]) -> Result<PublicKey, EllswiftError> {
    let mut uncompressed = [0u8; 65];
    uncompressed[0] = 0x04;
    uncompressed[1..65].copy_from_slice(encoded);
    PublicKey::from_slice(&uncompressed).map_err(|_| EllswiftError::InvalidEncoding)
}

/// Raw X-only Diffie-Hellman: `x(secret * pubkey)`.
pub fn xdh(secp: &Secp256k1<secp256k1::All>, secret: &SecretKey, pubkey: &PublicKey) -> Result<[u8; 32], EllswiftError> {
    let scalar = Scalar::from_be_bytes(secret.secret_bytes()).map_err(|_| EllswiftError::InvalidScalar)?;
    let tweaked = pubkey.mul_tweak(secp, &scalar).map_err(|_| EllswiftError::InvalidEncoding)?;
    let uncompressed = tweaked.serialize_uncompressed();
    let mut x = [0u8; 32];
    x.copy_from_slice(&uncompressed[1..33]);
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecdh_matches_from_both_sides_with_fixed_seckeys() {
        // Spec §8 Testable Property 10: initiator seckey=1, responder seckey=2.
        let secp = Secp256k1::new();
        let mut initiator_bytes = [0u8; 32];
        initiator_bytes[31] = 1;
        let mut responder_bytes = [0u8; 32];
        responder_bytes[31] = 2;

        let initiator_sk = SecretKey::from_slice(&initiator_bytes).unwrap();
        let responder_sk = SecretKey::from_slice(&responder_bytes).unwrap();
        let initiator_pk = PublicKey::from_secret_key(&secp, &initiator_sk);
        let responder_pk = PublicKey::from_secret_key(&secp, &responder_sk);

        let from_initiator = xdh(&secp, &initiator_sk, &responder_pk).unwrap();
        let from_responder = xdh(&secp, &responder_sk, &initiator_pk).unwrap();
        assert_eq!(from_initiator, from_responder);
    }

    #[test]
    fn encode_decode_round_trips() {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[7u8; 32]).unwrap();
        let pk = PublicKey::from_secret_key(&secp, &sk);
        let encoded = encode_pubkey(&pk);
        assert_eq!(decode_pubkey(&encoded).unwrap(), pk);
    }
}
