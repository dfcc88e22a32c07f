//! # payload-codec
//!
//! Decrypts credentials that an operator encrypted out of band and that
//! travel inside browser-automation control frames.
//!
//! The crate is organised in layers:
//!
//! 1. **[`keys`]** -- the process [`KeyPair`], loaded from the environment or
//!    generated at startup.
//! 2. **[`ecies`]** -- secp256k1 ECIES matching the operator's encryptor.
//! 3. **[`patterns`]** / **[`scanner`]** -- where encrypted fields live in a
//!    frame and how to find them.
//! 4. **[`codec`]** -- [`PayloadCodec::rewrite`], which decrypts and
//!    substitutes, falling back to the original frame on any failure.
//! 5. **[`hook`]** -- the same codec shaped as a per-message hook for an
//!    intercepting proxy.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use payload_codec::{ecies, KeyPair, PayloadCodec};
//!
//! let keys = Arc::new(KeyPair::generate().unwrap());
//! let codec = PayloadCodec::new(Arc::clone(&keys)).unwrap();
//!
//! let sealed = hex::encode(ecies::encrypt(keys.public_key(), b"pw").unwrap());
//! let frame = format!(r#"{{"selector":"input[type=password]","value":"{sealed}"}}"#);
//! assert_eq!(codec.rewrite(&frame), r#"{"selector":"input[type=password]","value":"pw"}"#);
//! ```

pub mod codec;
pub mod ecies;
pub mod hook;
pub mod keys;
pub mod patterns;
pub mod scanner;

pub use codec::{CodecError, PayloadCodec};
pub use ecies::EciesError;
pub use hook::{InterceptHook, WsContent};
pub use keys::{KeyError, KeyPair, KeySource};
pub use patterns::MatchKind;
pub use scanner::{InterceptedField, Scanner};
