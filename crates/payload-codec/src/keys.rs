//! Process key pair used to decrypt operator-encrypted credentials.

use std::fmt;

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

/// Errors raised while loading or generating the key pair.
///
/// `InvalidSecretKey` and `Entropy` are fatal at startup: without a usable
/// secret key the relay has nothing to decrypt with. `InvalidPublicKey` only
/// comes from [`parse_public_key`], which the operator tooling uses.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("secret key is not a valid secp256k1 scalar")]
    InvalidSecretKey,

    #[error("public key is not a valid secp256k1 point")]
    InvalidPublicKey,

    #[error("entropy source failure: {0}")]
    Entropy(#[source] rand::Error),
}

/// Where the key pair came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Both halves were supplied by the environment.
    Supplied,
    /// Generated at startup because at least one half was missing.
    Generated,
}

/// secp256k1 key pair. Immutable once built; share it as `Arc<KeyPair>`.
pub struct KeyPair {
    secret: SecretKey,
    /// Always derived from `secret`.
    public: PublicKey,
    /// What operators are told to encrypt for: the supplied `PK` verbatim,
    /// or the formatted public key of a generated pair.
    public_text: String,
    source: KeySource,
}

impl KeyPair {
    /// Use the supplied key pair when both halves are present, otherwise
    /// generate a fresh one.
    ///
    /// Only the secret half is parsed. The public half is display text for
    /// operators and is kept exactly as supplied, even when it is malformed
    /// or does not belong to the secret; a wrong `PK` shows up later as
    /// decryption failures.
    pub fn obtain(secret: Option<&str>, public: Option<&str>) -> Result<Self, KeyError> {
        let secret = secret.map(str::trim).filter(|s| !s.is_empty());
        let public = public.map(str::trim).filter(|s| !s.is_empty());

        match (secret, public) {
            (Some(secret), Some(public)) => {
                let secret = parse_secret_key(secret)?;
                Ok(Self {
                    public: secret.public_key(),
                    secret,
                    public_text: public.to_owned(),
                    source: KeySource::Supplied,
                })
            }
            _ => Self::generate(),
        }
    }

    /// Generate a new key pair from the operating system entropy source.
    pub fn generate() -> Result<Self, KeyError> {
        let mut bytes = Zeroizing::new([0u8; 32]);
        loop {
            OsRng
                .try_fill_bytes(bytes.as_mut())
                .map_err(KeyError::Entropy)?;
            // Zero or >= n is rejected; draw again.
            if let Ok(secret) = SecretKey::from_slice(bytes.as_ref()) {
                let public = secret.public_key();
                return Ok(Self {
                    secret,
                    public_text: format_public_key(&public),
                    public,
                    source: KeySource::Generated,
                });
            }
        }
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    /// Public key derived from the secret; this is what ciphertext must be
    /// sealed to.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn source(&self) -> KeySource {
        self.source
    }

    /// Public key as shown to operators. A supplied `PK` comes back exactly
    /// as given; a generated one is `0x` + 64 bytes of hex (uncompressed
    /// point without the `04` tag), the form the browser-side encryptor
    /// accepts.
    pub fn public_key_hex(&self) -> String {
        self.public_text.clone()
    }

    /// Secret key as `0x` + 32 bytes of hex. Only the `keygen` command should
    /// ever print this.
    pub fn secret_key_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("0x{}", hex::encode(self.secret.to_bytes())))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_key_hex())
            .field("secret", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Parse a hex secret key, with or without a `0x` prefix.
pub fn parse_secret_key(text: &str) -> Result<SecretKey, KeyError> {
    let bytes = Zeroizing::new(
        hex::decode(strip_hex_prefix(text)).map_err(|_| KeyError::InvalidSecretKey)?,
    );
    if bytes.len() != 32 {
        return Err(KeyError::InvalidSecretKey);
    }
    SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidSecretKey)
}

/// Parse a hex public key, with or without a `0x` prefix.
///
/// Accepts 64 bytes (bare coordinates), 65 bytes (uncompressed SEC1) and
/// 33 bytes (compressed SEC1).
pub fn parse_public_key(text: &str) -> Result<PublicKey, KeyError> {
    let mut bytes = hex::decode(strip_hex_prefix(text)).map_err(|_| KeyError::InvalidPublicKey)?;
    if bytes.len() == 64 {
        bytes.insert(0, 0x04);
    }
    PublicKey::from_sec1_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)
}

pub fn format_public_key(public: &PublicKey) -> String {
    let point = public.to_encoded_point(false);
    format!("0x{}", hex::encode(&point.as_bytes()[1..]))
}

fn strip_hex_prefix(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text)
}
