//! Streaming fan-out: one loop per subscribed client.
//!
//! Every subscriber owns a [`SnapshotCursor`] and polls the [`StateStore`]
//! on a fixed interval.  When the store version differs from the last one
//! the subscriber was sent, the current snapshot is serialized and written
//! as a single frame.  Several writes between two ticks collapse into one
//! frame carrying the newest snapshot; a subscriber never sees a snapshot
//! older than one it already received.
//!
//! A stream ends when the client hangs up, a write fails, or the shutdown
//! token is cancelled.  Only that client is affected.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use poolbridge_kernel::StateStore;
use poolbridge_types::Snapshot;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{Interval, MissedTickBehavior};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_util::sync::CancellationToken;

use crate::http::event_stream_head;

/// Default polling interval for streaming subscribers.
pub const DEFAULT_STREAM_INTERVAL: Duration = Duration::from_millis(500);

/// Tracks which store version a subscriber has already been sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotCursor {
    last_sent: Option<u64>,
}

impl SnapshotCursor {
    /// A cursor that has sent nothing yet, so its first poll always yields
    /// the current snapshot (even the empty one at version `0`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Version of the last snapshot handed out, if any.
    pub fn last_sent(&self) -> Option<u64> {
        self.last_sent
    }

    /// The current snapshot if it has not been sent yet.
    ///
    /// Records the version actually read, not the one compared against, so
    /// a write that lands in between is never skipped.
    pub fn poll(&mut self, store: &StateStore) -> Option<(Arc<Snapshot>, u64)> {
        if self.last_sent == Some(store.version()) {
            return None;
        }
        let (snapshot, version) = store.read();
        self.last_sent = Some(version);
        Some((snapshot, version))
    }
}

/// Why a stream stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The server is shutting down.
    Cancelled,
    /// The client closed the stream.
    ClientClosed,
    /// A write or read on the connection failed.
    Transport(String),
    /// The snapshot could not be encoded.
    Encode(String),
}

/// One SSE frame: `id: <version>\ndata: <json>\n\n`.
pub fn sse_frame(version: u64, snapshot: &Snapshot) -> Result<String, serde_json::Error> {
    let data = serde_json::to_string(snapshot)?;
    Ok(format!("id: {version}\ndata: {data}\n\n"))
}

fn ticker(interval: Duration) -> Interval {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Stream snapshots to `writer` as Server-Sent Events until the client goes
/// away or `cancel` fires.  Writes the response head first.
///
/// `reader` is the client's half of the connection.  Anything the client
/// sends is discarded; end of file there ends the stream even while the
/// store is idle.
pub async fn run_sse<R, W>(
    mut reader: R,
    mut writer: W,
    store: &StateStore,
    interval: Duration,
    cancel: &CancellationToken,
) -> StreamEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Err(e) = send(&mut writer, event_stream_head().as_bytes()).await {
        return StreamEnd::Transport(e.to_string());
    }

    let mut cursor = SnapshotCursor::new();
    let mut ticker = ticker(interval);
    let mut discard = [0u8; 512];
    loop {
        tokio::select! {
            () = cancel.cancelled() => return StreamEnd::Cancelled,
            read = reader.read(&mut discard) => match read {
                Ok(0) => return StreamEnd::ClientClosed,
                Ok(_) => continue,
                Err(e) => return StreamEnd::Transport(e.to_string()),
            },
            _ = ticker.tick() => {}
        }

        let Some((snapshot, version)) = cursor.poll(store) else {
            continue;
        };
        let frame = match sse_frame(version, &snapshot) {
            Ok(frame) => frame,
            Err(e) => return StreamEnd::Encode(e.to_string()),
        };
        if let Err(e) = send(&mut writer, frame.as_bytes()).await {
            return StreamEnd::Transport(e.to_string());
        }
    }
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Finish a WebSocket handshake whose request (carrying `key`) has already
/// been read from `stream`.
pub async fn accept_websocket<S>(mut stream: S, key: &str) -> std::io::Result<WebSocketStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let head = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        derive_accept_key(key.as_bytes())
    );
    send(&mut stream, head.as_bytes()).await?;
    Ok(WebSocketStream::from_raw_socket(stream, Role::Server, None).await)
}

/// Stream snapshots over an established WebSocket, one text message per
/// snapshot, until the client closes or `cancel` fires.
pub async fn run_websocket<S>(
    ws: WebSocketStream<S>,
    store: &StateStore,
    interval: Duration,
    cancel: &CancellationToken,
) -> StreamEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut tx, mut rx) = ws.split();
    let mut cursor = SnapshotCursor::new();
    let mut ticker = ticker(interval);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = tx.send(Message::Close(None)).await;
                return StreamEnd::Cancelled;
            }
            incoming = rx.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => return StreamEnd::ClientClosed,
                Some(Err(e)) => return StreamEnd::Transport(e.to_string()),
                // Pings are answered by tungstenite; other client messages are ignored.
                Some(Ok(_)) => {}
            },
            _ = ticker.tick() => {
                let Some((snapshot, _)) = cursor.poll(store) else {
                    continue;
                };
                let json = match serde_json::to_string(&*snapshot) {
                    Ok(json) => json,
                    Err(e) => return StreamEnd::Encode(e.to_string()),
                };
                if let Err(e) = tx.send(Message::Text(json.into())).await {
                    return StreamEnd::Transport(e.to_string());
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::DuplexStream;

    const FAST: Duration = Duration::from_millis(5);

    fn marked(air: i32) -> Snapshot {
        Snapshot {
            air_temp: Some(air),
            ..Snapshot::default()
        }
    }

    /// Accepts `ok_writes` writes, then fails every write with a broken pipe.
    struct FlakyWriter {
        ok_writes: usize,
    }

    impl AsyncWrite for FlakyWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.ok_writes == 0 {
                return Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)));
            }
            self.ok_writes -= 1;
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Read from `reader` until `needle` has appeared; returns everything read.
    async fn read_until_contains(reader: &mut DuplexStream, needle: &str) -> String {
        let mut seen = String::new();
        let mut buf = [0u8; 4096];
        tokio::time::timeout(Duration::from_secs(5), async {
            while !seen.contains(needle) {
                let n = reader.read(&mut buf).await.unwrap();
                assert!(n > 0, "stream closed before {needle:?} arrived");
                seen.push_str(std::str::from_utf8(&buf[..n]).unwrap());
            }
        })
        .await
        .expect("timed out waiting for stream output");
        seen
    }

    // ── SnapshotCursor ──────────────────────────────────────────────────────

    #[test]
    fn fresh_cursor_yields_version_zero() {
        let store = StateStore::new();
        let mut cursor = SnapshotCursor::new();
        let (snapshot, version) = cursor.poll(&store).unwrap();
        assert_eq!(version, 0);
        assert_eq!(*snapshot, Snapshot::default());
        assert_eq!(cursor.last_sent(), Some(0));
        assert!(cursor.poll(&store).is_none());
    }

    #[test]
    fn late_subscriber_gets_exactly_the_latest_write() {
        let store = StateStore::new();
        for air in 1..=3 {
            store.write(marked(air));
        }
        let mut cursor = SnapshotCursor::new();
        let (snapshot, version) = cursor.poll(&store).unwrap();
        assert_eq!(version, 3);
        assert_eq!(snapshot.air_temp, Some(3));
        assert!(cursor.poll(&store).is_none());
    }

    #[test]
    fn bursts_coalesce_to_the_newest_snapshot() {
        let store = StateStore::new();
        let mut cursor = SnapshotCursor::new();
        cursor.poll(&store);

        store.write(marked(1));
        store.write(marked(2));
        store.write(marked(3));
        let (snapshot, version) = cursor.poll(&store).unwrap();
        assert_eq!((version, snapshot.air_temp), (3, Some(3)));
        assert!(cursor.poll(&store).is_none());
    }

    #[test]
    fn sse_frame_layout() {
        let frame = sse_frame(7, &marked(70)).unwrap();
        assert!(frame.starts_with("id: 7\ndata: {"));
        assert!(frame.contains("\"airTemp\":70"));
        assert!(frame.ends_with("}\n\n"));
    }

    // ── SSE loop ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn sse_sends_head_then_current_snapshot_then_updates() {
        let store = Arc::new(StateStore::new());
        let cancel = CancellationToken::new();
        let (server, mut client) = tokio::io::duplex(64 * 1024);

        let task = {
            let store = Arc::clone(&store);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let (rd, wr) = tokio::io::split(server);
                run_sse(rd, wr, &store, FAST, &cancel).await
            })
        };

        let first = read_until_contains(&mut client, "id: 0\n").await;
        assert!(first.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(first.contains("text/event-stream"));
        assert!(first.contains("\"circuits\":{}"));

        store.write(marked(81));
        let next = read_until_contains(&mut client, "id: 1\n").await;
        assert!(next.contains("\"airTemp\":81"));

        cancel.cancel();
        assert_eq!(task.await.unwrap(), StreamEnd::Cancelled);
    }

    #[tokio::test]
    async fn broken_pipe_ends_only_that_stream() {
        let store = Arc::new(StateStore::new());
        let cancel = CancellationToken::new();
        let (server, mut client) = tokio::io::duplex(64 * 1024);
        let (_silent_client, silent) = tokio::io::duplex(64);

        // Head and first frame succeed, the next write fails.
        let broken = {
            let store = Arc::clone(&store);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                run_sse(silent, FlakyWriter { ok_writes: 2 }, &store, FAST, &cancel).await
            })
        };
        let healthy = {
            let store = Arc::clone(&store);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let (rd, wr) = tokio::io::split(server);
                run_sse(rd, wr, &store, FAST, &cancel).await
            })
        };

        read_until_contains(&mut client, "id: 0\n").await;

        // Keep publishing until the broken subscriber trips over its pipe.
        let end = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if broken.is_finished() {
                    break broken.await.unwrap();
                }
                store.write(marked(75));
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(matches!(end, StreamEnd::Transport(_)), "got {end:?}");

        // The other subscriber and the store carry on.
        let version = store.write(marked(76));
        let tail = read_until_contains(&mut client, &format!("id: {version}\n")).await;
        assert!(tail.contains("\"airTemp\":76"));

        cancel.cancel();
        assert_eq!(healthy.await.unwrap(), StreamEnd::Cancelled);
    }

    #[tokio::test]
    async fn failing_head_write_ends_immediately() {
        let store = StateStore::new();
        let cancel = CancellationToken::new();
        let (_client, idle) = tokio::io::duplex(64);
        let end = run_sse(idle, FlakyWriter { ok_writes: 0 }, &store, FAST, &cancel).await;
        assert!(matches!(end, StreamEnd::Transport(_)));
    }

    #[tokio::test]
    async fn cancel_ends_an_idle_stream() {
        let store = StateStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (_client, idle) = tokio::io::duplex(64);
        let end = run_sse(idle, tokio::io::sink(), &store, Duration::from_secs(3600), &cancel).await;
        assert_eq!(end, StreamEnd::Cancelled);
    }

    #[tokio::test]
    async fn idle_stream_ends_when_the_client_hangs_up() {
        let store = Arc::new(StateStore::new());
        let cancel = CancellationToken::new();
        let (server, mut client) = tokio::io::duplex(64 * 1024);

        let task = {
            let store = Arc::clone(&store);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let (rd, wr) = tokio::io::split(server);
                run_sse(rd, wr, &store, Duration::from_millis(20), &cancel).await
            })
        };

        read_until_contains(&mut client, "id: 0\n").await;
        drop(client);

        // No store writes: only the hang-up can end the loop.
        let end = tokio::time::timeout(Duration::from_millis(200), task)
            .await
            .expect("idle stream outlived its client")
            .unwrap();
        assert!(
            matches!(end, StreamEnd::ClientClosed | StreamEnd::Transport(_)),
            "got {end:?}"
        );
        assert_eq!(store.version(), 0);
    }

    #[tokio::test]
    async fn client_chatter_is_ignored() {
        let store = Arc::new(StateStore::new());
        let cancel = CancellationToken::new();
        let (server, mut client) = tokio::io::duplex(64 * 1024);

        let task = {
            let store = Arc::clone(&store);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let (rd, wr) = tokio::io::split(server);
                run_sse(rd, wr, &store, FAST, &cancel).await
            })
        };

        read_until_contains(&mut client, "id: 0\n").await;
        client.write_all(b"keep-alive noise").await.unwrap();
        store.write(marked(64));
        let next = read_until_contains(&mut client, "id: 1\n").await;
        assert!(next.contains("\"airTemp\":64"));

        cancel.cancel();
        assert_eq!(task.await.unwrap(), StreamEnd::Cancelled);
    }
}
