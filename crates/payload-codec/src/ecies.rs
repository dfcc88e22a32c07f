//! secp256k1 ECIES in the layout produced by `eciespy` and `ecies-rs`, which
//! is what the operator-facing encryptor emits.
//!
//! ```text
//! ephemeral public key (65, uncompressed) | nonce (16) | tag (16) | ciphertext
//! ```
//!
//! The AES-256-GCM key is HKDF-SHA256 over the uncompressed ephemeral public
//! key followed by the uncompressed shared point, with empty salt and info.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Key, Nonce};
use hkdf::Hkdf;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{AffinePoint, PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

/// AES-256-GCM with the 16-byte nonce used by the eciespy family.
type Cipher = AesGcm<Aes256, U16>;

const UNCOMPRESSED_POINT_LEN: usize = 65;
const NONCE_LEN: usize = 16;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = UNCOMPRESSED_POINT_LEN + NONCE_LEN + TAG_LEN;

/// Errors produced while sealing or opening an ECIES payload.
#[derive(Debug, thiserror::Error)]
pub enum EciesError {
    #[error("ciphertext too short ({0} bytes, need at least {HEADER_LEN})")]
    TooShort(usize),

    #[error("ephemeral public key is not a valid secp256k1 point")]
    InvalidEphemeralKey,

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("authentication failed (wrong key or corrupted ciphertext)")]
    Authentication,

    #[error("encryption failed")]
    Encryption,
}

/// Encrypt `plaintext` to `recipient`.
pub fn encrypt(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, EciesError> {
    let ephemeral = SecretKey::random(&mut OsRng);
    let ephemeral_point = ephemeral.public_key().to_encoded_point(false);
    let key = derive_key(ephemeral_point.as_bytes(), &ephemeral, recipient)?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let cipher = Cipher::new(Key::<Cipher>::from_slice(key.as_ref()));
    let sealed = cipher
        .encrypt(Nonce::<U16>::from_slice(&nonce), plaintext)
        .map_err(|_| EciesError::Encryption)?;

    // aes-gcm appends the tag; the wire layout wants it before the body.
    let (body, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(ephemeral_point.as_bytes());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(tag);
    out.extend_from_slice(body);
    Ok(out)
}

/// Decrypt a payload sealed to the public half of `secret`.
pub fn decrypt(secret: &SecretKey, payload: &[u8]) -> Result<Zeroizing<Vec<u8>>, EciesError> {
    if payload.len() < HEADER_LEN {
        return Err(EciesError::TooShort(payload.len()));
    }

    let (ephemeral_bytes, rest) = payload.split_at(UNCOMPRESSED_POINT_LEN);
    let (nonce, rest) = rest.split_at(NONCE_LEN);
    let (tag, body) = rest.split_at(TAG_LEN);

    let ephemeral =
        PublicKey::from_sec1_bytes(ephemeral_bytes).map_err(|_| EciesError::InvalidEphemeralKey)?;
    let key = derive_key(ephemeral_bytes, secret, &ephemeral)?;

    let mut sealed = Vec::with_capacity(body.len() + TAG_LEN);
    sealed.extend_from_slice(body);
    sealed.extend_from_slice(tag);

    let cipher = Cipher::new(Key::<Cipher>::from_slice(key.as_ref()));
    cipher
        .decrypt(Nonce::<U16>::from_slice(nonce), sealed.as_ref())
        .map(Zeroizing::new)
        .map_err(|_| EciesError::Authentication)
}

/// HKDF-SHA256(ephemeral_pk || shared_point), both uncompressed.
fn derive_key(
    ephemeral_point: &[u8],
    secret: &SecretKey,
    peer: &PublicKey,
) -> Result<Zeroizing<[u8; 32]>, EciesError> {
    let shared: AffinePoint = (peer.to_projective() * *secret.to_nonzero_scalar()).into();
    let shared = shared.to_encoded_point(false);

    let mut ikm = Zeroizing::new(Vec::with_capacity(UNCOMPRESSED_POINT_LEN * 2));
    ikm.extend_from_slice(ephemeral_point);
    ikm.extend_from_slice(shared.as_bytes());

    let mut okm = Zeroizing::new([0u8; 32]);
    Hkdf::<Sha256>::new(None, &ikm)
        .expand(&[], okm.as_mut())
        .map_err(|_| EciesError::KeyDerivation)?;
    Ok(okm)
}
