use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use streamcast_protocol::{ConfigMessage, VideoFrameMessage, VideoInitMessage};
use tokio::sync::{RwLock, broadcast};
use tokio::time::{Duration, Instant, interval};
use uuid::Uuid;

use crate::error::PipelineError;

const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
const WS_PONG_TIMEOUT: Duration = Duration::from_secs(90);

/// Asynchronous fan-out to the live set of viewer connections.
///
/// A single `broadcast` channel carries Frame messages to every
/// attached client. The one-shot Init message is cached and replayed
/// directly to each client as it attaches, satisfying the
/// Init-before-Frame ordering invariant without needing the broadcast
/// channel itself to be ordered with respect to attachment.
pub struct Broadcaster {
    frames_tx: broadcast::Sender<Bytes>,
    init: RwLock<Option<Bytes>>,
    config: RwLock<ConfigMessage>,
    stats: Stats,
}

struct Stats {
    frames: AtomicU64,
    bytes: AtomicU64,
    clients: AtomicUsize,
}

impl Broadcaster {
    pub fn new(initial_config: ConfigMessage) -> Arc<Self> {
        let (frames_tx, _) = broadcast::channel(32);
        Arc::new(Broadcaster {
            frames_tx,
            init: RwLock::new(None),
            config: RwLock::new(initial_config),
            stats: Stats {
                frames: AtomicU64::new(0),
                bytes: AtomicU64::new(0),
                clients: AtomicUsize::new(0),
            },
        })
    }

    pub async fn has_init(&self) -> bool {
        self.init.read().await.is_some()
    }

    pub async fn current_config(&self) -> ConfigMessage {
        *self.config.read().await
    }

    /// Builds and caches the Init message, updates the stream config's
    /// dimensions, and broadcasts it to every attached client. Must be
    /// called at most once per encoder session; later calls are
    /// ignored with a warning.
    ///
    /// The write lock on `init` is held across the `frames_tx.send`, not
    /// just the cache write. `attach` reads the cache and subscribes to
    /// `frames_tx` under the matching read lock, so the two critical
    /// sections can't interleave: an attaching client either subscribes
    /// before this send (and picks the Init up from the channel) or
    /// after it (and picks it up from the cache), never both and never
    /// neither.
    pub async fn broadcast_init(&self, sps: Vec<u8>, pps: Vec<u8>, width: u16, height: u16) {
        let mut init_slot = self.init.write().await;
        if init_slot.is_some() {
            tracing::warn!("broadcast_init called more than once in a session, ignoring");
            return;
        }
        let msg = VideoInitMessage {
            width,
            height,
            sps,
            pps,
        };
        let bytes = Bytes::from(msg.serialize());
        *init_slot = Some(bytes.clone());
        let _ = self.frames_tx.send(bytes);
        drop(init_slot);

        if width != 0 && height != 0 {
            let mut config = self.config.write().await;
            config.width = width;
            config.height = height;
        }

        tracing::info!(width, height, "video init broadcast");
    }

    /// Broadcasts one access unit to every attached client. Per-client
    /// send isolation is provided by each client's own task.
    pub fn broadcast_frame(&self, packet: Vec<u8>, is_key: bool) {
        let len = packet.len() as u64;
        let msg = VideoFrameMessage {
            is_keyframe: is_key,
            payload: packet,
        };
        let bytes = Bytes::from(msg.serialize());
        // No receivers yet is not an error: frames are simply dropped
        // until the first client attaches.
        let _ = self.frames_tx.send(bytes);
        self.stats.frames.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes.fetch_add(len, Ordering::Relaxed);
    }

    /// Sends a legacy Image message directly to every current
    /// subscriber, used by the Fallback Frame Source.
    pub fn broadcast_image(&self, payload: Vec<u8>) {
        let msg = streamcast_protocol::ImageMessage { payload };
        let _ = self.frames_tx.send(Bytes::from(msg.serialize()));
    }

    /// Drives one client's connection end to end: sends Config, replays
    /// a cached Init if present, then forwards broadcast frames while
    /// decoding inbound input events. Returns once the socket closes.
    pub async fn attach(self: &Arc<Self>, client_id: Uuid, mut socket: WebSocket) {
        self.stats.clients.fetch_add(1, Ordering::Relaxed);
        tracing::info!(%client_id, "client attached");

        let config = self.current_config().await;
        if socket
            .send(Message::Binary(config.serialize().into()))
            .await
            .is_err()
        {
            tracing::debug!(error = %PipelineError::ClientSendFailed { client_id });
            self.stats.clients.fetch_sub(1, Ordering::Relaxed);
            return;
        }

        // Subscribing and reading the cached Init happen under the same
        // read-lock acquisition as `broadcast_init`'s write, so this
        // client either subscribes strictly before that send (and will
        // receive Init over `frames_rx`) or strictly after it (and picks
        // up `cached_init` below) — never neither, never both.
        let (cached_init, mut frames_rx) = {
            let init_guard = self.init.read().await;
            (init_guard.clone(), self.frames_tx.subscribe())
        };

        if let Some(init) = cached_init {
            if socket.send(Message::Binary(init)).await.is_err() {
                tracing::debug!(error = %PipelineError::ClientSendFailed { client_id });
                self.stats.clients.fetch_sub(1, Ordering::Relaxed);
                return;
            }
        }

        let mut ping_interval = interval(WS_PING_INTERVAL);
        ping_interval.tick().await;
        let mut last_pong = Instant::now();

        loop {
            tokio::select! {
                frame = frames_rx.recv() => {
                    match frame {
                        Ok(bytes) => {
                            if socket.send(Message::Binary(bytes)).await.is_err() {
                                tracing::debug!(error = %PipelineError::ClientSendFailed { client_id });
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(%client_id, skipped, "client fell behind, dropping frames");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if last_pong.elapsed() > WS_PONG_TIMEOUT {
                        tracing::warn!(%client_id, "pong timeout, disconnecting client");
                        break;
                    }
                    if socket.send(Message::Ping(Bytes::new())).await.is_err() {
                        tracing::debug!(error = %PipelineError::ClientSendFailed { client_id });
                        break;
                    }
                }
                incoming = socket.recv() => {
                    match incoming {
                        Some(Ok(Message::Binary(data))) => {
                            crate::input::handle_inbound(client_id, &data);
                        }
                        Some(Ok(Message::Pong(_))) => {
                            last_pong = Instant::now();
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::debug!(%client_id, error = %e, "websocket error");
                            break;
                        }
                    }
                }
            }
        }

        self.stats.clients.fetch_sub(1, Ordering::Relaxed);
        tracing::info!(%client_id, "client detached");
    }

    /// Snapshot of throughput counters, reset is not performed: values
    /// are cumulative since process start.
    pub fn stats_snapshot(&self) -> (u64, u64, usize) {
        (
            self.stats.frames.load(Ordering::Relaxed),
            self.stats.bytes.load(Ordering::Relaxed),
            self.stats.clients.load(Ordering::Relaxed),
        )
    }
}

/// Periodically logs throughput and client-count statistics.
pub async fn run_stats_loop(broadcaster: Arc<Broadcaster>) {
    let mut ticker = interval(Duration::from_secs(1));
    let mut last_frames = 0u64;
    let mut last_bytes = 0u64;
    loop {
        ticker.tick().await;
        let (frames, bytes, clients) = broadcaster.stats_snapshot();
        tracing::debug!(
            frames_per_sec = frames.saturating_sub(last_frames),
            bytes_per_sec = bytes.saturating_sub(last_bytes),
            clients,
            "broadcaster stats"
        );
        last_frames = frames;
        last_bytes = bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_config() -> ConfigMessage {
        ConfigMessage {
            width: 1920,
            height: 1080,
            fps: 30,
            quality: 80,
        }
    }

    #[tokio::test]
    async fn init_is_cached_after_first_broadcast() {
        let b = Broadcaster::new(default_config());
        assert!(!b.has_init().await);
        b.broadcast_init(vec![0x67], vec![0x68], 640, 480).await;
        assert!(b.has_init().await);
        let config = b.current_config().await;
        assert_eq!(config.width, 640);
        assert_eq!(config.height, 480);
    }

    #[tokio::test]
    async fn second_broadcast_init_is_ignored() {
        let b = Broadcaster::new(default_config());
        b.broadcast_init(vec![0x67], vec![0x68], 640, 480).await;
        b.broadcast_init(vec![0x67], vec![0x68], 1920, 1080).await;
        let config = b.current_config().await;
        assert_eq!(config.width, 640, "first init's dimensions must stick");
    }

    #[test]
    fn broadcast_frame_with_no_subscribers_does_not_panic() {
        let b = Broadcaster::new(default_config());
        b.broadcast_frame(vec![0, 0, 0, 1, 0x65], true);
        let (frames, _, clients) = b.stats_snapshot();
        assert_eq!(frames, 1);
        assert_eq!(clients, 0);
    }
}
