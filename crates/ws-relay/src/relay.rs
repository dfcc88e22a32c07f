use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use payload_codec::PayloadCodec;
use tokio_tungstenite::tungstenite::{self, Message};

/// Per-connection metadata passed to inspectors.
pub struct ConnectionContext {
    /// Unique identifier for this relay session.
    pub connection_id: uuid::Uuid,
    /// The TCP address of the connecting client.
    pub remote_addr: SocketAddr,
    /// Request path of the client's upgrade request.
    pub path: String,
}

/// The result of a [`MessageInspector`] looking at one client text frame.
pub enum InspectionResult {
    /// Forward the frame unmodified.
    Pass,
    /// Forward this text instead.
    Modify(String),
}

/// Hook for rewriting text frames on their way from the client to the
/// backend.
///
/// Frames travelling from the backend to the client are never inspected.
/// Implementations must not perform I/O and must not fail: anything they
/// cannot handle should come back as [`InspectionResult::Pass`].
pub trait MessageInspector: Send + Sync {
    fn inspect_client_text(&self, text: &str, ctx: &ConnectionContext) -> InspectionResult;
}

impl MessageInspector for PayloadCodec {
    fn inspect_client_text(&self, text: &str, _ctx: &ConnectionContext) -> InspectionResult {
        match self.rewrite(text) {
            Cow::Borrowed(_) => InspectionResult::Pass,
            Cow::Owned(rewritten) => InspectionResult::Modify(rewritten),
        }
    }
}

/// Direction of frame flow through a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client -> backend, routed through the inspectors.
    ClientToBackend,
    /// Backend -> client, forwarded verbatim.
    BackendToClient,
}

/// Why one leg of a session stopped.
#[derive(Debug)]
pub enum LegEnd {
    /// The source sent a close frame or its stream ended cleanly.
    Closed,
    /// Reading from the source failed.
    ReadFailed(tungstenite::Error),
    /// Writing to the destination failed.
    WriteFailed(tungstenite::Error),
}

impl fmt::Display for LegEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "source closed"),
            Self::ReadFailed(err) => write!(f, "read failed: {err}"),
            Self::WriteFailed(err) => write!(f, "write failed: {err}"),
        }
    }
}

impl LegEnd {
    /// Whether this is the protocol's normal way of ending a connection.
    pub fn is_normal(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::ReadFailed(err) | Self::WriteFailed(err) => matches!(
                err,
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed
            ),
        }
    }
}

/// Forward frames from `reader` to `writer` until either side gives out.
///
/// Each frame is written and flushed before the next one is read, so a slow
/// destination holds the source back instead of piling frames up in memory.
pub(crate) async fn relay_frames<R, W>(
    reader: &mut R,
    writer: &mut W,
    inspectors: &[Arc<dyn MessageInspector>],
    ctx: &ConnectionContext,
    direction: Direction,
) -> LegEnd
where
    R: StreamExt<Item = Result<Message, tungstenite::Error>> + Unpin,
    W: SinkExt<Message, Error = tungstenite::Error> + Unpin,
{
    while let Some(msg_result) = reader.next().await {
        let msg = match msg_result {
            Ok(msg) => msg,
            Err(err) => return LegEnd::ReadFailed(err),
        };

        let outgoing = match msg {
            Message::Text(text) if direction == Direction::ClientToBackend => {
                match run_inspectors(inspectors, &text, ctx) {
                    Some(rewritten) => Message::Text(rewritten.into()),
                    None => Message::Text(text),
                }
            }
            Message::Close(frame) => {
                // Best effort: the session tears both legs down next anyway.
                let _ = writer.send(Message::Close(frame)).await;
                return LegEnd::Closed;
            }
            // Raw frames only appear when writing; tungstenite never yields
            // them from a read.
            Message::Frame(_) => continue,
            other => other,
        };

        if let Err(err) = writer.send(outgoing).await {
            return LegEnd::WriteFailed(err);
        }
    }

    LegEnd::Closed
}

/// Run `text` through every inspector in order. Returns `None` when no
/// inspector changed it.
fn run_inspectors(
    inspectors: &[Arc<dyn MessageInspector>],
    text: &str,
    ctx: &ConnectionContext,
) -> Option<String> {
    let mut current: Option<String> = None;

    for inspector in inspectors {
        let input = current.as_deref().unwrap_or(text);
        if let InspectionResult::Modify(modified) = inspector.inspect_client_text(input, ctx) {
            current = Some(modified);
        }
    }

    current
}
