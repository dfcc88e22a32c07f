//! Decrypts intercepted fields and rewrites the frame that carried them.
//!
//! Password fills are spliced into the original text so every other byte of
//! the frame survives unchanged. Storage states change shape (a wrapper
//! object becomes the decrypted document), so that path parses the frame,
//! swaps the value and serialises it again.
//!
//! Decryption problems never escape [`PayloadCodec::rewrite`]: the failure is
//! logged and the original frame is returned.

use std::borrow::Cow;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::ecies::{self, EciesError};
use crate::keys::KeyPair;
use crate::patterns::{MatchKind, ENCODED_VALUE_KEY, STORAGE_STATE_PATH};
use crate::scanner::{InterceptedField, Scanner};

/// Reasons an intercepted field could not be substituted.
///
/// Display strings deliberately carry no payload bytes; sources are kept for
/// debugging but are never formatted into log lines.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("ciphertext is not valid hex")]
    Hex(#[source] hex::FromHexError),

    #[error("decryption failed")]
    Decrypt(#[source] EciesError),

    #[error("decrypted value is not UTF-8")]
    Utf8(#[source] std::str::Utf8Error),

    #[error("frame is not valid JSON")]
    MalformedFrame(#[source] serde_json::Error),

    #[error("decrypted storage state is not valid JSON")]
    MalformedPlaintext(#[source] serde_json::Error),

    #[error("failed to serialise rewritten frame")]
    Serialize(#[source] serde_json::Error),
}

/// Rewrites client frames, substituting decrypted credentials.
pub struct PayloadCodec {
    keys: Arc<KeyPair>,
    scanner: Scanner,
}

impl PayloadCodec {
    pub fn new(keys: Arc<KeyPair>) -> Result<Self, regex::Error> {
        Ok(Self {
            keys,
            scanner: Scanner::new()?,
        })
    }

    /// Rewrite `message`, or hand it back untouched.
    ///
    /// The result borrows `message` whenever nothing was substituted, which
    /// includes every failure case.
    pub fn rewrite<'a>(&self, message: &'a str) -> Cow<'a, str> {
        match self.try_rewrite(message) {
            Ok(Some(rewritten)) => Cow::Owned(rewritten),
            Ok(None) => Cow::Borrowed(message),
            Err((kind, err)) => {
                warn!(
                    field = %kind,
                    error = %err,
                    frame_len = message.len(),
                    "failed to decrypt intercepted field; forwarding original frame"
                );
                Cow::Borrowed(message)
            }
        }
    }

    /// Fallible form of [`rewrite`](Self::rewrite).
    ///
    /// `Ok(None)` means no encrypted field was present. Password fills take
    /// precedence; the storage-state path only runs when the frame holds no
    /// password fill.
    pub fn try_rewrite(&self, message: &str) -> Result<Option<String>, (MatchKind, CodecError)> {
        let fields = self.scanner.scan(message);

        let has_password = fields
            .iter()
            .any(|f| f.kind() == MatchKind::PasswordFill);
        if has_password {
            return self
                .splice_passwords(message, &fields)
                .map(Some)
                .map_err(|err| (MatchKind::PasswordFill, err));
        }

        if fields.contains(&InterceptedField::StorageState) {
            return self
                .expand_storage_state(message)
                .map_err(|err| (MatchKind::StorageState, err));
        }

        Ok(None)
    }

    /// Replace each quoted password ciphertext with its quoted plaintext.
    fn splice_passwords(
        &self,
        message: &str,
        fields: &[InterceptedField<'_>],
    ) -> Result<String, CodecError> {
        let mut result = String::with_capacity(message.len());
        let mut cursor = 0;

        for field in fields {
            let InterceptedField::PasswordFill {
                ciphertext_hex,
                value_span,
            } = field
            else {
                continue;
            };

            let plaintext = self.decrypt_hex(ciphertext_hex)?;
            let plaintext = std::str::from_utf8(&plaintext).map_err(CodecError::Utf8)?;
            // Serialising a &str cannot fail; it only adds quotes and escapes.
            let quoted = Zeroizing::new(
                serde_json::to_string(plaintext).map_err(CodecError::Serialize)?,
            );

            result.push_str(&message[cursor..value_span.start]);
            result.push_str(&quoted);
            cursor = value_span.end;
        }

        result.push_str(&message[cursor..]);
        Ok(result)
    }

    /// Swap `params.storageState` for the document its `encoded_value`
    /// decrypts to.
    ///
    /// A storage state without `encoded_value` was not encrypted by the
    /// operator and is forwarded as-is.
    fn expand_storage_state(&self, message: &str) -> Result<Option<String>, CodecError> {
        let mut frame: Value = serde_json::from_str(message).map_err(CodecError::MalformedFrame)?;

        let Some(state) = STORAGE_STATE_PATH
            .iter()
            .try_fold(&mut frame, |node, key| node.get_mut(*key))
        else {
            debug!("newContext call without params.storageState");
            return Ok(None);
        };

        let Some(ciphertext_hex) = state.get(ENCODED_VALUE_KEY).and_then(Value::as_str) else {
            debug!("storage state is not encrypted; forwarding unchanged");
            return Ok(None);
        };

        let plaintext = self.decrypt_hex(ciphertext_hex)?;
        let document: Value =
            serde_json::from_slice(&plaintext).map_err(CodecError::MalformedPlaintext)?;
        *state = document;

        serde_json::to_string(&frame)
            .map(Some)
            .map_err(CodecError::Serialize)
    }

    fn decrypt_hex(&self, ciphertext_hex: &str) -> Result<Zeroizing<Vec<u8>>, CodecError> {
        let ciphertext = hex::decode(ciphertext_hex).map_err(CodecError::Hex)?;
        ecies::decrypt(self.keys.secret_key(), &ciphertext).map_err(CodecError::Decrypt)
    }
}
