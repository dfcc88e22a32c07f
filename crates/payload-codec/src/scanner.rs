//! Locates encrypted fields inside a frame without decrypting anything.

use std::ops::Range;

use regex::Regex;

use crate::patterns::{MatchKind, PASSWORD_FILL, STORAGE_STATE};

/// Transient match result, consumed immediately by the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptedField<'a> {
    /// A password value to splice. `value_span` covers the quoted value,
    /// quotes included; `ciphertext_hex` is the text between the quotes.
    PasswordFill {
        ciphertext_hex: &'a str,
        value_span: Range<usize>,
    },
    /// A `newContext` call carrying a storage state. The ciphertext is only
    /// reachable after parsing the whole frame.
    StorageState,
}

impl InterceptedField<'_> {
    pub fn kind(&self) -> MatchKind {
        match self {
            Self::PasswordFill { .. } => MatchKind::PasswordFill,
            Self::StorageState => MatchKind::StorageState,
        }
    }
}

/// Compiled matchers for the field catalogue.
pub struct Scanner {
    password_fill: Regex,
    storage_state: Regex,
}

impl Scanner {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            password_fill: Regex::new(PASSWORD_FILL.pattern)?,
            storage_state: Regex::new(STORAGE_STATE.pattern)?,
        })
    }

    /// Scan `text` and return every intercepted field, password fills first
    /// in offset order, then at most one storage-state marker.
    pub fn scan<'a>(&self, text: &'a str) -> Vec<InterceptedField<'a>> {
        let mut fields: Vec<InterceptedField<'a>> = self
            .password_fill
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|quoted| InterceptedField::PasswordFill {
                ciphertext_hex: &text[quoted.start() + 1..quoted.end() - 1],
                value_span: quoted.range(),
            })
            .collect();

        if self.storage_state.is_match(text) {
            fields.push(InterceptedField::StorageState);
        }

        fields
    }
}
