//! Noise_NX handshake (spec §4.7 steps 1-11): `Noise_NX_Secp256k1+EllSwift_ChaChaPoly_SHA256`,
//! initiator-anonymous / responder-authenticated by a BIP-340 certificate.

use super::ellswift::{self, EphemeralSecret, EllswiftError};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hmac::{Hmac, Mac};
use secp256k1::{PublicKey, Secp256k1};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroize;

pub const PROTOCOL_NAME: &[u8] = b"Noise_NX_Secp256k1+EllSwift_ChaChaPoly_SHA256";
const STATIC_CIPHERTEXT_LEN: usize = 80;
const CERT_CIPHERTEXT_LEN: usize = 90;
pub const ACT2_LEN: usize = ellswift::ENCODED_LEN + STATIC_CIPHERTEXT_LEN + CERT_CIPHERTEXT_LEN;
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum NoiseError {
    #[error("ellswift: {0}")]
    Ellswift(#[from] EllswiftError),
    #[error("AEAD decryption failed")]
    Aead,
    #[error("act 2 message has wrong length: expected {ACT2_LEN}, got {0}")]
    BadAct2Length(usize),
    #[error("certificate signature verification failed")]
    CertificateInvalid,
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn mix_hash(h: &mut [u8; 32], data: &[u8]) {
    let mut hasher = Sha256::new();
    hasher.update(&h[..]);
    hasher.update(data);
    *h = hasher.finalize().into();
}

/// Noise-spec `HKDF(chaining_key, input_key_material, 2)`.
fn hkdf2(chaining_key: &[u8; 32], ikm: &[u8]) -> ([u8; 32], [u8; 32]) {
    let mut temp_mac = Hmac::<Sha256>::new_from_slice(chaining_key).expect("hmac accepts any key length");
    temp_mac.update(ikm);
    let temp_key: [u8; 32] = temp_mac.finalize().into_bytes().into();

    let mut mac1 = Hmac::<Sha256>::new_from_slice(&temp_key).expect("hmac accepts any key length");
    mac1.update(&[0x01]);
    let output1: [u8; 32] = mac1.finalize().into_bytes().into();

    let mut mac2 = Hmac::<Sha256>::new_from_slice(&temp_key).expect("hmac accepts any key length");
    mac2.update(&output1);
    mac2.update(&[0x02]);
    let output2: [u8; 32] = mac2.finalize().into_bytes().into();

    (output1, output2)
}

fn nonce_from_counter(counter: u64) -> Nonce {
    let mut bytes = [0u8; 12];
    bytes[4..12].copy_from_slice(&counter.to_le_bytes());
    Nonce::clone_from_slice(&bytes)
}

fn aead_decrypt(key: &[u8; 32], counter: u64, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, NoiseError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(&nonce_from_counter(counter), Payload { msg: ciphertext, aad })
        .map_err(|_| NoiseError::Aead)
}

fn aead_encrypt(key: &[u8; 32], counter: u64, aad: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(&nonce_from_counter(counter), Payload { msg: plaintext, aad })
        .expect("chacha20poly1305 encryption does not fail")
}

/// Decoded Act 2 certificate payload (spec §4.7 step 9).
#[derive(Debug, Clone)]
pub struct Certificate {
    pub version: u16,
    pub valid_from: u32,
    pub not_valid_after: u32,
    pub signature: [u8; 64],
}

/// The two derived transport keys plus whichever ephemeral bytes should be
/// zeroed once the handshake completes (spec §9: "no plaintext secret
/// outlives its subscope").
pub struct TransportKeys {
    pub send_key: [u8; 32],
    pub receive_key: [u8; 32],
}

impl Drop for TransportKeys {
    fn drop(&mut self) {
        self.send_key.zeroize();
        self.receive_key.zeroize();
    }
}

pub struct Initiator {
    secp: Secp256k1<secp256k1::All>,
    h: [u8; 32],
    ck: [u8; 32],
    ephemeral: EphemeralSecret,
}

impl Initiator {
    /// Starts the handshake and returns both the new initiator state and
    /// the 64 ephemeral bytes to send as Act 1 (spec step 4).
    pub fn start(ephemeral_secret_bytes: [u8; 32]) -> Result<(Self, [u8; ellswift::ENCODED_LEN]), NoiseError> {
        let secp = Secp256k1::new();
        let mut h = sha256(PROTOCOL_NAME);
        let ck = h;
        mix_hash(&mut h, &[]); // empty prologue

        let ephemeral = EphemeralSecret::from_bytes(ephemeral_secret_bytes)?;
        let encoded_ephemeral = ephemeral.public_key_encoded(&secp);
        mix_hash(&mut h, &encoded_ephemeral);
        mix_hash(&mut h, &[]); // empty payload after the 'e' token

        Ok((Self { secp, h, ck, ephemeral }, encoded_ephemeral))
    }

    /// Processes the responder's Act 2 message (spec steps 5-10) and
    /// returns the derived transport keys plus the parsed certificate. If
    /// `authority_pubkey` is supplied, the certificate signature is
    /// verified and a failure rejects the connection.
    pub fn process_act2(
        mut self,
        act2: &[u8],
        authority_pubkey: Option<&PublicKey>,
    ) -> Result<(TransportKeys, Certificate), NoiseError> {
        if act2.len() != ACT2_LEN {
            return Err(NoiseError::BadAct2Length(act2.len()));
        }
        let responder_ephemeral_encoded: [u8; ellswift::ENCODED_LEN] = act2[0..64].try_into().unwrap();
        let static_ciphertext = &act2[64..64 + STATIC_CIPHERTEXT_LEN];
        let cert_ciphertext = &act2[64 + STATIC_CIPHERTEXT_LEN..];

        mix_hash(&mut self.h, &responder_ephemeral_encoded);
        let responder_ephemeral_pk = ellswift::decode_pubkey(&responder_ephemeral_encoded)?;

        let ecdh1 = ellswift::xdh(&self.secp, &self.ephemeral.secret_key(), &responder_ephemeral_pk)?;
        let (ck2, temp_k1) = hkdf2(&self.ck, &ecdh1);
        self.ck = ck2;

        let static_plaintext = aead_decrypt(&temp_k1, 0, &self.h, static_ciphertext)?;
        mix_hash(&mut self.h, static_ciphertext);
        let responder_static_pk = ellswift::decode_pubkey(&static_plaintext[0..64].try_into().unwrap())?;

        let ecdh2 = ellswift::xdh(&self.secp, &self.ephemeral.secret_key(), &responder_static_pk)?;
        let (ck3, temp_k2) = hkdf2(&self.ck, &ecdh2);
        self.ck = ck3;

        let cert_plaintext = aead_decrypt(&temp_k2, 0, &self.h, cert_ciphertext)?;
        mix_hash(&mut self.h, cert_ciphertext);

        let version = u16::from_le_bytes([cert_plaintext[0], cert_plaintext[1]]);
        let valid_from = u32::from_le_bytes(cert_plaintext[2..6].try_into().unwrap());
        let not_valid_after = u32::from_le_bytes(cert_plaintext[6..10].try_into().unwrap());
        let signature: [u8; 64] = cert_plaintext[10..74].try_into().unwrap();
        let certificate = Certificate { version, valid_from, not_valid_after, signature };

        if let Some(authority_pubkey) = authority_pubkey {
            verify_certificate(&self.secp, &certificate, &responder_static_pk, authority_pubkey)?;
        }

        let (send_key, receive_key) = hkdf2(&self.ck, &[]);
        self.ck.zeroize();
        self.h.zeroize();

        Ok((TransportKeys { send_key, receive_key }, certificate))
    }
}

fn verify_certificate(
    secp: &Secp256k1<secp256k1::All>,
    certificate: &Certificate,
    responder_static_pk: &PublicKey,
    authority_pubkey: &PublicKey,
) -> Result<(), NoiseError> {
    let (x_only, _) = responder_static_pk.x_only_public_key();
    let mut message = Vec::with_capacity(10 + 32);
    message.extend_from_slice(&certificate.version.to_le_bytes());
    message.extend_from_slice(&certificate.valid_from.to_le_bytes());
    message.extend_from_slice(&certificate.not_valid_after.to_le_bytes());
    message.extend_from_slice(&x_only.serialize());
    let digest = sha256(&message);

    let signature = secp256k1::schnorr::Signature::from_slice(&certificate.signature).map_err(|_| NoiseError::CertificateInvalid)?;
    let (authority_x_only, _) = authority_pubkey.x_only_public_key();
    let message = secp256k1::Message::from_digest(digest);
    secp.verify_schnorr(&signature, &message, &authority_x_only).map_err(|_| NoiseError::CertificateInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::SecretKey;

    #[test]
    fn act1_encodes_64_ephemeral_bytes() {
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let (_, act1) = Initiator::start(secret).unwrap();
        assert_eq!(act1.len(), 64);
    }

    #[test]
    fn rejects_wrong_length_act2() {
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let (initiator, _) = Initiator::start(secret).unwrap();
        let result = initiator.process_act2(&[0u8; 10], None);
        assert!(matches!(result, Err(NoiseError::BadAct2Length(10))));
    }

    #[test]
    fn hkdf2_is_deterministic_for_fixed_inputs() {
        let ck = [0x11u8; 32];
        let ikm = [0x22u8; 32];
        let (a1, a2) = hkdf2(&ck, &ikm);
        let (b1, b2) = hkdf2(&ck, &ikm);
        assert_eq!(a1, b1);
        assert_eq!(a2, b2);
    }

    #[test]
    fn full_handshake_round_trip_matches_on_both_sides() {
        // Builds a responder side inline (not spec-mandated interface, just
        // enough to drive the initiator code path against real Act 2 bytes
        // and confirm both sides end up with the same transport keys).
        let secp = Secp256k1::new();

        let mut initiator_secret = [0u8; 32];
        initiator_secret[31] = 1;
        let (initiator, act1) = Initiator::start(initiator_secret).unwrap();
        let initiator_ephemeral_pk = ellswift::decode_pubkey(&act1).unwrap();

        let mut h = sha256(PROTOCOL_NAME);
        let ck = h;
        mix_hash(&mut h, &[]);
        mix_hash(&mut h, &act1);
        mix_hash(&mut h, &[]);

        let mut responder_ephemeral_secret = [0u8; 32];
        responder_ephemeral_secret[31] = 2;
        let responder_ephemeral_sk = SecretKey::from_slice(&responder_ephemeral_secret).unwrap();
        let responder_ephemeral_pk = PublicKey::from_secret_key(&secp, &responder_ephemeral_sk);
        let responder_ephemeral_encoded = ellswift::encode_pubkey(&responder_ephemeral_pk);
        mix_hash(&mut h, &responder_ephemeral_encoded);

        let ecdh1 = ellswift::xdh(&secp, &responder_ephemeral_sk, &initiator_ephemeral_pk).unwrap();
        let (ck2, temp_k1) = hkdf2(&ck, &ecdh1);

        let mut responder_static_secret = [0u8; 32];
        responder_static_secret[31] = 3;
        let responder_static_sk = SecretKey::from_slice(&responder_static_secret).unwrap();
        let responder_static_pk = PublicKey::from_secret_key(&secp, &responder_static_sk);
        let responder_static_encoded = ellswift::encode_pubkey(&responder_static_pk);
        let static_ciphertext = aead_encrypt(&temp_k1, 0, &h, &responder_static_encoded);
        mix_hash(&mut h, &static_ciphertext);

        let ecdh2 = ellswift::xdh(&secp, &responder_static_sk, &initiator_ephemeral_pk).unwrap();
        let (ck3, temp_k2) = hkdf2(&ck2, &ecdh2);

        let mut cert_plaintext = Vec::with_capacity(74);
        cert_plaintext.extend_from_slice(&1u16.to_le_bytes());
        cert_plaintext.extend_from_slice(&0u32.to_le_bytes());
        cert_plaintext.extend_from_slice(&0xffff_ffffu32.to_le_bytes());
        cert_plaintext.extend_from_slice(&[0u8; 64]);
        let cert_ciphertext = aead_encrypt(&temp_k2, 0, &h, &cert_plaintext);

        let mut act2 = Vec::with_capacity(ACT2_LEN);
        act2.extend_from_slice(&responder_ephemeral_encoded);
        act2.extend_from_slice(&static_ciphertext);
        act2.extend_from_slice(&cert_ciphertext);

        let (initiator_keys, certificate) = initiator.process_act2(&act2, None).unwrap();

        // Both sides derive the same (o1, o2) pair from the identical chaining
        // key; roles are mirrored, not recomputed: initiator sends with o1 and
        // receives with o2, responder sends with o2 and receives with o1.
        let (o1, o2) = hkdf2(&ck3, &[]);
        let responder_send_key = o2;
        let responder_receive_key = o1;
        assert_eq!(initiator_keys.send_key, responder_receive_key);
        assert_eq!(initiator_keys.receive_key, responder_send_key);
        assert_eq!(certificate.version, 1);
    }
}
