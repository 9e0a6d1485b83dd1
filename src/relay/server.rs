//! # Relay HTTP Server
//!
//! WebSocket transport for [`MicRelay`] sessions.
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /`, `GET /mic` | WebSocket upgrade; each chunk is sent as one binary frame |
//! | `GET /health` | `{"capturing": bool, "subscribers": n}` |
//!
//! Frames carry raw S16_LE mono PCM with no header or framing of their own.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::MicRelay;

/// Relay status for `/health`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayHealth {
    pub capturing: bool,
    pub subscribers: usize,
}

/// Build the relay router
pub fn router(relay: MicRelay) -> Router {
    Router::new()
        .route("/", get(upgrade))
        .route("/mic", get(upgrade))
        .route("/health", get(health))
        .with_state(relay)
}

async fn health(State(relay): State<MicRelay>) -> Json<RelayHealth> {
    Json(RelayHealth {
        capturing: relay.is_capturing().await,
        subscribers: relay.subscriber_count().await,
    })
}

async fn upgrade(ws: WebSocketUpgrade, State(relay): State<MicRelay>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_session(socket, relay))
}

/// Pump one WebSocket until either side closes
async fn serve_session(mut socket: WebSocket, relay: MicRelay) {
    let mut session = match relay.join().await {
        Ok(session) => session,
        Err(e) => {
            warn!("Rejecting microphone subscriber: {}", e);
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    let id = session.id;
    info!("{} connected", id);

    loop {
        tokio::select! {
            chunk = session.chunks.recv() => match chunk {
                Some(bytes) => {
                    if let Err(e) = socket.send(Message::Binary(bytes.to_vec())).await {
                        debug!("{} send failed: {}", id, e);
                        break;
                    }
                }
                None => {
                    // Relay closed the session
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },

            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!("{} transport error: {}", id, e);
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    relay.leave(id).await;
    info!("{} disconnected", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::capture::{CaptureProcess, MockCaptureSpawner};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::{SinkExt, StreamExt};
    use std::future::Future;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message as ClientMessage;

    struct ChannelCapture {
        chunks: mpsc::UnboundedReceiver<Bytes>,
        terminations: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CaptureProcess for ChannelCapture {
        async fn next_chunk(&mut self) -> Option<std::io::Result<Bytes>> {
            self.chunks.recv().await.map(Ok)
        }

        async fn terminate(&mut self) -> crate::error::Result<()> {
            self.terminations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Relay with a single scripted capture; returns the feed and termination count
    fn scripted_relay() -> (MicRelay, mpsc::UnboundedSender<Bytes>, Arc<AtomicUsize>) {
        let (feed, chunks) = mpsc::unbounded_channel();
        let chunks = std::sync::Mutex::new(Some(chunks));
        let terminations = Arc::new(AtomicUsize::new(0));

        let mut spawner = MockCaptureSpawner::new();
        let spawn_terms = Arc::clone(&terminations);
        spawner.expect_spawn().times(1).returning(move || {
            Ok(Box::new(ChannelCapture {
                chunks: chunks.lock().unwrap().take().expect("spawned twice"),
                terminations: Arc::clone(&spawn_terms),
            }))
        });

        (MicRelay::new(Arc::new(spawner), 8), feed, terminations)
    }

    async fn serve(relay: MicRelay) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(relay)).await.unwrap() });
        addr
    }

    async fn eventually<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_health_reports_idle_relay() {
        let relay = MicRelay::new(Arc::new(MockCaptureSpawner::new()), 4);
        let Json(status) = health(State(relay)).await;
        assert_eq!(
            status,
            RelayHealth {
                capturing: false,
                subscribers: 0
            }
        );
    }

    #[test]
    fn test_health_json_shape() {
        let json = serde_json::to_value(RelayHealth {
            capturing: true,
            subscribers: 2,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"capturing": true, "subscribers": 2}));
    }

    #[tokio::test]
    async fn test_chunks_arrive_as_binary_frames_and_close_stops_capture() {
        let (relay, feed, terminations) = scripted_relay();
        let addr = serve(relay.clone()).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/mic", addr))
            .await
            .unwrap();
        eventually(|| {
            let relay = relay.clone();
            async move { relay.subscriber_count().await == 1 }
        })
        .await;
        assert!(relay.is_capturing().await);

        feed.send(Bytes::from_static(b"\x01\x00\xff\x7f")).unwrap();
        feed.send(Bytes::from_static(b"\x02\x00")).unwrap();
        for expected in [vec![0x01, 0x00, 0xff, 0x7f], vec![0x02, 0x00]] {
            let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            assert_eq!(frame, ClientMessage::Binary(expected));
        }

        ws.close(None).await.unwrap();
        eventually(|| {
            let relay = relay.clone();
            async move { !relay.is_capturing().await }
        })
        .await;
        assert_eq!(relay.subscriber_count().await, 0);
        assert_eq!(terminations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_sends_close_frame() {
        let (relay, _feed, terminations) = scripted_relay();
        let addr = serve(relay.clone()).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/", addr))
            .await
            .unwrap();
        eventually(|| {
            let relay = relay.clone();
            async move { relay.subscriber_count().await == 1 }
        })
        .await;

        relay.shutdown().await;

        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(matches!(frame, ClientMessage::Close(_)), "got {:?}", frame);
        assert_eq!(terminations.load(Ordering::SeqCst), 1);
        assert!(!relay.is_capturing().await);
    }
}
