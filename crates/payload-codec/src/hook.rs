//! Adapter for running the codec as a per-message hook inside a general
//! intercepting proxy instead of the standalone relay.
//!
//! The host proxy calls [`InterceptHook::on_websocket_message`] once for
//! every WebSocket message it observes and forwards whatever content is left
//! behind.

use std::borrow::Cow;
use std::sync::Arc;

use crate::codec::PayloadCodec;

/// Content of one observed WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsContent {
    Text(String),
    Binary(Vec<u8>),
}

/// Message hook sharing the relay's pattern recognition and fail-open
/// behaviour.
#[derive(Clone)]
pub struct InterceptHook {
    codec: Arc<PayloadCodec>,
}

impl InterceptHook {
    pub fn new(codec: Arc<PayloadCodec>) -> Self {
        Self { codec }
    }

    /// Rewrite client-originated text in place. Returns `true` if the content
    /// was changed.
    pub fn on_websocket_message(&self, from_client: bool, content: &mut WsContent) -> bool {
        if !from_client {
            return false;
        }
        let WsContent::Text(text) = content else {
            return false;
        };

        let rewritten = match self.codec.rewrite(text) {
            Cow::Owned(rewritten) => rewritten,
            Cow::Borrowed(_) => return false,
        };
        *text = rewritten;
        true
    }
}
