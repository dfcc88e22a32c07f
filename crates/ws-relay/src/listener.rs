use std::future::Future;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use http::StatusCode;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request as HsRequest, Response as HsResponse,
};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::Utf8Bytes;
use tracing::Instrument;

use crate::path;
use crate::relay::{relay_frames, ConnectionContext, Direction, LegEnd, MessageInspector};

/// 4 GiB; storage-state blobs can be very large.
pub const DEFAULT_MAX_MESSAGE_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Default bound on each opening handshake (client upgrade, backend connect).
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on the close handshake when a session is torn down.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after a failed `accept` so a persistent error (e.g. fd exhaustion)
/// does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// What happens to live sessions when the relay is asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    /// Let sessions finish on their own within the grace period, then close
    /// the stragglers.
    #[default]
    Drain,
    /// Close every session right away with a close frame on both legs.
    Close,
}

impl FromStr for ShutdownPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drain" => Ok(Self::Drain),
            "close" => Ok(Self::Close),
            other => anyhow::bail!("unknown shutdown policy '{other}' (expected drain or close)"),
        }
    }
}

/// Configuration for the WebSocket relay.
pub struct RelayConfig {
    /// Address to bind the listening socket to.
    pub listen_addr: SocketAddr,
    /// WebSocket URL of the browser backend; every session connects here.
    pub backend_url: String,
    /// Upgrade path clients must use. `None` accepts any path.
    pub path: Option<String>,
    /// Largest message or frame accepted on either leg, in bytes.
    pub max_message_size: u64,
    /// How long the client upgrade and the backend connect may each take.
    pub handshake_timeout: Duration,
    /// Ordered list of inspectors applied to client text frames.
    pub inspectors: Vec<Arc<dyn MessageInspector>>,
    /// Behaviour of live sessions at shutdown.
    pub shutdown_policy: ShutdownPolicy,
    /// How long live sessions get before they are aborted.
    pub grace_period: Duration,
}

impl RelayConfig {
    fn websocket_config(&self) -> WebSocketConfig {
        let limit = usize::try_from(self.max_message_size).unwrap_or(usize::MAX);
        WebSocketConfig::default()
            .max_message_size(Some(limit))
            .max_frame_size(Some(limit))
    }
}

/// The WebSocket relay server.
///
/// Accepts client WebSocket connections on the configured path, opens a
/// matching connection to the browser backend, and relays frames both ways,
/// running client text frames through the [`MessageInspector`] chain.
pub struct Relay {
    config: Arc<RelayConfig>,
    listener: TcpListener,
}

impl Relay {
    /// Bind the listening socket.
    pub async fn bind(config: RelayConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .with_context(|| format!("failed to bind {}", config.listen_addr))?;
        Ok(Self {
            config: Arc::new(config),
            listener,
        })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` resolves, then wind live sessions down
    /// according to the configured [`ShutdownPolicy`].
    ///
    /// Each connection is handled in its own Tokio task. A failing session
    /// never affects the listener or other sessions.
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let Self { config, listener } = self;
        tracing::info!(
            addr = %listener.local_addr()?,
            backend = %config.backend_url,
            path = config.path.as_deref().unwrap_or("*"),
            "ws-relay listening"
        );

        let (close_tx, _) = broadcast::channel::<()>(1);
        let mut sessions: JoinSet<()> = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            tracing::warn!(%err, "accept failed");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };

                    let config = Arc::clone(&config);
                    let close_rx = close_tx.subscribe();
                    let connection_id = uuid::Uuid::new_v4();
                    let span = tracing::info_span!("session", %connection_id, %remote_addr);

                    sessions.spawn(
                        async move {
                            if let Err(err) =
                                handle_connection(stream, remote_addr, connection_id, config, close_rx).await
                            {
                                tracing::warn!("session ended with error: {err:#}");
                            }
                        }
                        .instrument(span),
                    );
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(err) = joined {
                        if err.is_panic() {
                            tracing::error!(%err, "session task panicked");
                        }
                    }
                }
            }
        }

        drop(listener);
        wind_down(sessions, close_tx, &config).await;
        Ok(())
    }
}

/// Stop live sessions per the shutdown policy, aborting whatever is still
/// running once the grace period is over.
async fn wind_down(mut sessions: JoinSet<()>, close_tx: broadcast::Sender<()>, config: &RelayConfig) {
    tracing::info!(
        active = sessions.len(),
        policy = ?config.shutdown_policy,
        grace_secs = config.grace_period.as_secs_f64(),
        "ws-relay shutting down"
    );

    let drain_for = match config.shutdown_policy {
        ShutdownPolicy::Drain => config.grace_period,
        ShutdownPolicy::Close => Duration::ZERO,
    };

    if !join_all_within(&mut sessions, drain_for).await {
        // Sessions only ever exchange whole frames, so a close frame here
        // never lands inside a partially written message.
        let _ = close_tx.send(());
        let close_for = match config.shutdown_policy {
            ShutdownPolicy::Drain => CLOSE_TIMEOUT,
            ShutdownPolicy::Close => config.grace_period.max(CLOSE_TIMEOUT),
        };
        if !join_all_within(&mut sessions, close_for).await {
            tracing::warn!(remaining = sessions.len(), "aborting sessions that did not close");
            sessions.shutdown().await;
        }
    }

    tracing::info!("ws-relay stopped");
}

/// Returns `true` if every session finished within `limit`.
async fn join_all_within(sessions: &mut JoinSet<()>, limit: Duration) -> bool {
    if sessions.is_empty() {
        return true;
    }
    if limit.is_zero() {
        return false;
    }
    tokio::time::timeout(limit, async {
        while sessions.join_next().await.is_some() {}
    })
    .await
    .is_ok()
}

/// How a session ended.
#[derive(Debug)]
enum SessionEnd {
    /// One of the two legs stopped.
    Leg(Direction, LegEnd),
    /// The relay is shutting down.
    Shutdown,
}

/// Handle a single TCP connection from accept through WebSocket relay and
/// teardown.
async fn handle_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    connection_id: uuid::Uuid,
    config: Arc<RelayConfig>,
    mut close_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    // ------------------------------------------------------------------
    // 1. Accept the WebSocket handshake, checking the request path in the
    //    callback.
    // ------------------------------------------------------------------
    let captured_path: Arc<std::sync::Mutex<String>> = Arc::new(std::sync::Mutex::new(String::new()));
    let captured_path_cb = Arc::clone(&captured_path);
    let expected_path = config.path.clone();

    let callback =
        move |req: &HsRequest, response: HsResponse| -> Result<HsResponse, ErrorResponse> {
            let request_path = req.uri().path().to_string();

            if let Ok(mut guard) = captured_path_cb.lock() {
                guard.clone_from(&request_path);
            }

            if let Err(rejection) = path::validate_path(&request_path, expected_path.as_deref()) {
                tracing::warn!(%rejection, "upgrade rejected");
                let mut err_response = ErrorResponse::new(Some("Not Found".to_string()));
                *err_response.status_mut() = StatusCode::NOT_FOUND;
                return Err(err_response);
            }

            Ok(response)
        };

    let mut client_ws = tokio::time::timeout(
        config.handshake_timeout,
        tokio_tungstenite::accept_hdr_async_with_config(stream, callback, Some(config.websocket_config())),
    )
    .await
    .context("client handshake timed out")?
    .context("client handshake failed")?;

    let path = captured_path
        .lock()
        .map(|g| g.clone())
        .unwrap_or_default();

    tracing::info!(%path, "client connected");

    // ------------------------------------------------------------------
    // 2. Connect to the browser backend.
    // ------------------------------------------------------------------
    let connected = tokio::time::timeout(
        config.handshake_timeout,
        tokio_tungstenite::connect_async_with_config(
            config.backend_url.as_str(),
            Some(config.websocket_config()),
            false,
        ),
    )
    .await;
    let backend = match connected {
        Ok(Ok((ws, _))) => Ok(ws),
        Ok(Err(err)) => Err(anyhow::Error::new(err)),
        Err(elapsed) => Err(anyhow::Error::new(elapsed)),
    };

    let backend_ws = match backend {
        Ok(ws) => ws,
        Err(err) => {
            let frame = CloseFrame {
                code: CloseCode::Error,
                reason: Utf8Bytes::from_static("backend unavailable"),
            };
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, client_ws.close(Some(frame))).await;
            return Err(err.context(format!("failed to connect to backend {}", config.backend_url)));
        }
    };

    tracing::debug!(backend = %config.backend_url, "backend connected");

    // ------------------------------------------------------------------
    // 3. Split both connections and relay until either leg stops. Both legs
    //    run inside this task, so when one finishes the other is dropped
    //    mid-await; tungstenite keeps partially read or written frames in
    //    its own buffers, so nothing is torn.
    // ------------------------------------------------------------------
    let (mut client_write, mut client_read) = client_ws.split();
    let (mut backend_write, mut backend_read) = backend_ws.split();

    let ctx = ConnectionContext {
        connection_id,
        remote_addr,
        path,
    };

    let end = tokio::select! {
        end = relay_frames(
            &mut client_read,
            &mut backend_write,
            &config.inspectors,
            &ctx,
            Direction::ClientToBackend,
        ) => SessionEnd::Leg(Direction::ClientToBackend, end),
        end = relay_frames(
            &mut backend_read,
            &mut client_write,
            &[],
            &ctx,
            Direction::BackendToClient,
        ) => SessionEnd::Leg(Direction::BackendToClient, end),
        _ = close_rx.recv() => SessionEnd::Shutdown,
    };

    // ------------------------------------------------------------------
    // 4. Close both legs together.
    // ------------------------------------------------------------------
    let (client_closed, backend_closed) = tokio::join!(
        tokio::time::timeout(CLOSE_TIMEOUT, client_write.close()),
        tokio::time::timeout(CLOSE_TIMEOUT, backend_write.close()),
    );
    tracing::debug!(
        client_closed = matches!(client_closed, Ok(Ok(()))),
        backend_closed = matches!(backend_closed, Ok(Ok(()))),
        "legs closed"
    );

    match end {
        SessionEnd::Shutdown => {
            tracing::info!("session closed for shutdown");
        }
        SessionEnd::Leg(direction, leg) if leg.is_normal() => {
            tracing::info!(?direction, "session closed");
        }
        SessionEnd::Leg(direction, leg) => {
            tracing::warn!(?direction, reason = %leg, "session ended abnormally");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use payload_codec::{ecies, KeyPair, PayloadCodec};
    use tokio::sync::oneshot;
    use tokio::io::AsyncReadExt;
    use tokio_tungstenite::tungstenite::{self, Message};

    const WAIT: Duration = Duration::from_secs(5);
    const HANDSHAKE_LIMIT: Duration = Duration::from_millis(500);

    /// Backend that echoes text and binary frames.
    async fn spawn_echo_backend() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    while let Some(Ok(msg)) = ws.next().await {
                        if (msg.is_text() || msg.is_binary()) && ws.send(msg).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        addr
    }

    /// Backend that sends `greeting` as soon as a client connects and then
    /// echoes.
    async fn spawn_greeting_backend(greeting: String) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let greeting = greeting.clone();
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    let _ = ws.send(Message::text(greeting)).await;
                    while let Some(Ok(msg)) = ws.next().await {
                        if msg.is_text() && ws.send(msg).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        addr
    }

    /// Backend that accepts, reads one frame and then closes normally.
    async fn spawn_closing_backend() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    let _ = ws.next().await;
                    let _ = ws.close(None).await;
                    while let Some(Ok(_)) = ws.next().await {}
                });
            }
        });
        addr
    }

    /// Backend that accepts TCP connections but never answers the upgrade.
    async fn spawn_silent_backend() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        addr
    }

    /// A port nothing listens on.
    async fn dead_port() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    struct Running {
        addr: SocketAddr,
        stop: oneshot::Sender<()>,
        handle: tokio::task::JoinHandle<anyhow::Result<()>>,
    }

    async fn start_relay(
        backend: SocketAddr,
        inspectors: Vec<Arc<dyn MessageInspector>>,
        max_message_size: u64,
        shutdown_policy: ShutdownPolicy,
    ) -> Running {
        let config = RelayConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            backend_url: format!("ws://{backend}/"),
            path: Some("/srv".to_string()),
            max_message_size,
            handshake_timeout: HANDSHAKE_LIMIT,
            inspectors,
            shutdown_policy,
            grace_period: Duration::from_secs(1),
        };
        let relay = Relay::bind(config).await.unwrap();
        let addr = relay.local_addr().unwrap();
        let (stop, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(relay.run(async move {
            let _ = stop_rx.await;
        }));
        Running { addr, stop, handle }
    }

    async fn connect(
        addr: SocketAddr,
    ) -> tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>> {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/srv"))
            .await
            .unwrap();
        ws
    }

    /// Next text frame, skipping control frames. `None` once the connection
    /// closes or errors.
    async fn next_text<S>(ws: &mut S) -> Option<String>
    where
        S: StreamExt<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        loop {
            match tokio::time::timeout(WAIT, ws.next()).await.ok()?? {
                Ok(Message::Text(text)) => return Some(text.as_str().to_owned()),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    fn codec() -> (Arc<KeyPair>, Vec<Arc<dyn MessageInspector>>) {
        let keys = Arc::new(KeyPair::generate().unwrap());
        let codec = PayloadCodec::new(Arc::clone(&keys)).unwrap();
        (keys, vec![Arc::new(codec)])
    }

    fn encrypted_fill(keys: &KeyPair, password: &str) -> String {
        let sealed = hex::encode(ecies::encrypt(keys.public_key(), password.as_bytes()).unwrap());
        fill_frame(&sealed)
    }

    fn fill_frame(value: &str) -> String {
        format!(
            r#"{{"id":9,"guid":"frame@1","method":"fill","params":{{"selector":"input[type=password]","value":"{value}"}}}}"#
        )
    }

    #[tokio::test]
    async fn client_password_is_decrypted_before_backend() {
        let backend = spawn_echo_backend().await;
        let (keys, inspectors) = codec();
        let relay = start_relay(backend, inspectors, DEFAULT_MAX_MESSAGE_SIZE, ShutdownPolicy::Drain).await;

        let mut client = connect(relay.addr).await;
        client
            .send(Message::text(encrypted_fill(&keys, "s3cret")))
            .await
            .unwrap();
        assert_eq!(next_text(&mut client).await.as_deref(), Some(fill_frame("s3cret").as_str()));

        client.send(Message::text("plain")).await.unwrap();
        assert_eq!(next_text(&mut client).await.as_deref(), Some("plain"));
    }

    #[tokio::test]
    async fn backend_frames_reach_client_verbatim() {
        let (keys, inspectors) = codec();
        let greeting = encrypted_fill(&keys, "not-for-client");
        let backend = spawn_greeting_backend(greeting.clone()).await;
        let relay = start_relay(backend, inspectors, DEFAULT_MAX_MESSAGE_SIZE, ShutdownPolicy::Drain).await;

        let mut client = connect(relay.addr).await;
        assert_eq!(next_text(&mut client).await, Some(greeting));
    }

    #[tokio::test]
    async fn undecryptable_frame_is_forwarded_unchanged() {
        let backend = spawn_echo_backend().await;
        let (_, inspectors) = codec();
        let relay = start_relay(backend, inspectors, DEFAULT_MAX_MESSAGE_SIZE, ShutdownPolicy::Drain).await;

        let stranger = KeyPair::generate().unwrap();
        let frame = encrypted_fill(&stranger, "x");
        let mut client = connect(relay.addr).await;
        client.send(Message::text(frame.clone())).await.unwrap();
        assert_eq!(next_text(&mut client).await, Some(frame));
    }

    #[tokio::test]
    async fn wrong_path_is_rejected_with_404() {
        let backend = spawn_echo_backend().await;
        let relay = start_relay(backend, Vec::new(), DEFAULT_MAX_MESSAGE_SIZE, ShutdownPolicy::Drain).await;

        let err = tokio_tungstenite::connect_async(format!("ws://{}/admin", relay.addr))
            .await
            .unwrap_err();
        match err {
            tungstenite::Error::Http(response) => {
                assert_eq!(response.status(), StatusCode::NOT_FOUND);
            }
            other => panic!("expected HTTP rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn backend_normal_close_ends_session_and_server_keeps_serving() {
        let backend = spawn_closing_backend().await;
        let relay = start_relay(backend, Vec::new(), DEFAULT_MAX_MESSAGE_SIZE, ShutdownPolicy::Drain).await;

        for _ in 0..2 {
            let mut client = connect(relay.addr).await;
            client.send(Message::text("hello")).await.unwrap();
            assert_eq!(next_text(&mut client).await, None);
        }
        assert!(!relay.handle.is_finished());
    }

    #[tokio::test]
    async fn unreachable_backend_closes_client_only() {
        let backend = dead_port().await;
        let relay = start_relay(backend, Vec::new(), DEFAULT_MAX_MESSAGE_SIZE, ShutdownPolicy::Drain).await;

        let mut client = connect(relay.addr).await;
        assert_eq!(next_text(&mut client).await, None);

        // The listener is still accepting.
        let mut again = connect(relay.addr).await;
        assert_eq!(next_text(&mut again).await, None);
        assert!(!relay.handle.is_finished());
    }

    #[tokio::test]
    async fn silent_client_is_dropped_after_handshake_timeout() {
        let backend = spawn_echo_backend().await;
        let relay = start_relay(backend, Vec::new(), DEFAULT_MAX_MESSAGE_SIZE, ShutdownPolicy::Drain).await;

        let mut stream = TcpStream::connect(relay.addr).await.unwrap();
        let mut buf = [0u8; 64];
        let read = tokio::time::timeout(WAIT, stream.read(&mut buf)).await;
        assert!(matches!(read, Ok(Ok(0)) | Ok(Err(_))));

        let mut client = connect(relay.addr).await;
        client.send(Message::text("still here")).await.unwrap();
        assert_eq!(next_text(&mut client).await.as_deref(), Some("still here"));
    }

    #[tokio::test]
    async fn silent_backend_closes_client_after_handshake_timeout() {
        let backend = spawn_silent_backend().await;
        let relay = start_relay(backend, Vec::new(), DEFAULT_MAX_MESSAGE_SIZE, ShutdownPolicy::Drain).await;

        let mut client = connect(relay.addr).await;
        let closed = tokio::time::timeout(WAIT, client.next()).await.unwrap();
        match closed {
            Some(Ok(Message::Close(Some(frame)))) => assert_eq!(frame.code, CloseCode::Error),
            other => panic!("expected a close frame, got {other:?}"),
        }
        assert!(!relay.handle.is_finished());
    }

    #[tokio::test]
    async fn frames_at_limit_pass_and_oversized_frames_end_only_their_session() {
        const LIMIT: u64 = 64 * 1024;
        let backend = spawn_echo_backend().await;
        let relay = start_relay(backend, Vec::new(), LIMIT, ShutdownPolicy::Drain).await;

        let mut sibling = connect(relay.addr).await;
        let mut offender = connect(relay.addr).await;

        let at_limit = "a".repeat(LIMIT as usize);
        sibling.send(Message::text(at_limit.clone())).await.unwrap();
        assert_eq!(next_text(&mut sibling).await, Some(at_limit));

        let too_big = "b".repeat(LIMIT as usize * 2);
        let _ = offender.send(Message::text(too_big)).await;
        assert_eq!(next_text(&mut offender).await, None);

        sibling.send(Message::text("still here")).await.unwrap();
        assert_eq!(next_text(&mut sibling).await.as_deref(), Some("still here"));
    }

    #[tokio::test]
    async fn frame_order_is_preserved() {
        let backend = spawn_echo_backend().await;
        let relay = start_relay(backend, Vec::new(), DEFAULT_MAX_MESSAGE_SIZE, ShutdownPolicy::Drain).await;

        let mut client = connect(relay.addr).await;
        for i in 0..50 {
            client.send(Message::text(i.to_string())).await.unwrap();
        }
        for i in 0..50 {
            assert_eq!(next_text(&mut client).await, Some(i.to_string()));
        }
    }

    #[tokio::test]
    async fn close_policy_closes_live_sessions_on_shutdown() {
        let backend = spawn_echo_backend().await;
        let relay = start_relay(backend, Vec::new(), DEFAULT_MAX_MESSAGE_SIZE, ShutdownPolicy::Close).await;

        let mut client = connect(relay.addr).await;
        client.send(Message::text("ping")).await.unwrap();
        assert_eq!(next_text(&mut client).await.as_deref(), Some("ping"));

        relay.stop.send(()).unwrap();
        assert_eq!(next_text(&mut client).await, None);

        let result = tokio::time::timeout(WAIT, relay.handle).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn drain_policy_lets_idle_relay_stop_promptly() {
        let backend = spawn_echo_backend().await;
        let relay = start_relay(backend, Vec::new(), DEFAULT_MAX_MESSAGE_SIZE, ShutdownPolicy::Drain).await;

        relay.stop.send(()).unwrap();
        let result = tokio::time::timeout(WAIT, relay.handle).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn shutdown_policy_parses_case_insensitively() {
        assert_eq!("drain".parse::<ShutdownPolicy>().unwrap(), ShutdownPolicy::Drain);
        assert_eq!("CLOSE".parse::<ShutdownPolicy>().unwrap(), ShutdownPolicy::Close);
        assert!("abort".parse::<ShutdownPolicy>().is_err());
    }
}
