//! Catalogue of the encrypted-field shapes recognised in client frames.
//!
//! Both patterns are matched against the raw frame text. The automation
//! client serialises its control messages compactly, so the patterns assume
//! no whitespace between keys and values.

use std::fmt;

/// Which kind of encrypted field a pattern locates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    /// A `fill` call targeting `input[type=password]` whose value is a quoted
    /// hex ciphertext. Rewritten by splicing text in place.
    PasswordFill,
    /// A `newContext` call whose `storageState` wraps a hex ciphertext of a
    /// whole storage-state document. Rewritten by full parse and re-serialise.
    StorageState,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PasswordFill => write!(f, "password_fill"),
            Self::StorageState => write!(f, "storage_state"),
        }
    }
}

/// A single recognised field shape.
pub struct FieldPattern {
    pub kind: MatchKind,
    /// Regex source. For [`MatchKind::PasswordFill`] capture group 1 is the
    /// quoted ciphertext value.
    pub pattern: &'static str,
}

pub static PASSWORD_FILL: FieldPattern = FieldPattern {
    kind: MatchKind::PasswordFill,
    pattern: r#""input\[type=password\]","value":("[^"]+")"#,
};

pub static STORAGE_STATE: FieldPattern = FieldPattern {
    kind: MatchKind::StorageState,
    pattern: r#""method":"newContext",.+"storageState":"#,
};

/// JSON path of the storage-state wrapper object inside a `newContext` call.
pub const STORAGE_STATE_PATH: [&str; 2] = ["params", "storageState"];

/// Key inside the wrapper object that carries the hex ciphertext.
pub const ENCODED_VALUE_KEY: &str = "encoded_value";
