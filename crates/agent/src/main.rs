mod assembler;
mod bitstream;
mod broadcaster;
mod cli;
mod config;
mod encoder;
mod error;
mod fallback;
mod input;
mod sps;
mod transport;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use streamcast_protocol::ConfigMessage;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

use assembler::{Assembler, AssemblerEvent};
use broadcaster::Broadcaster;

/// A tiny placeholder still image, sent as the Fallback Frame Source's
/// payload until the first real H.264 Init arrives. Not decoded by the
/// agent; any bytes would do.
const FALLBACK_IMAGE: &[u8] = &[0xff, 0xd8, 0xff, 0xd9];

/// Cross-thread rendezvous for assembler events, drained in strict
/// emission order by a single async consumer. Consecutive Frame events
/// coalesce (drop-on-overwrite) when the consumer falls behind; Init is
/// one-shot and is never dropped or reordered relative to the Frames
/// around it. Routing both event kinds through this single queue, rather
/// than publishing Frame here and spawning Init separately onto the
/// runtime, is what keeps Init strictly ahead of every Frame emitted
/// after it on each client's wire.
struct FrameBridge {
    queue: Mutex<VecDeque<AssemblerEvent>>,
    notify: Notify,
}

impl FrameBridge {
    fn new() -> Arc<Self> {
        Arc::new(FrameBridge {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        })
    }

    /// Called from the blocking thread. A Frame event replaces an
    /// immediately preceding, not-yet-consumed Frame; an Init event is
    /// always appended and never coalesced away.
    fn publish(&self, event: AssemblerEvent) {
        let mut queue = self.queue.lock().expect("frame bridge mutex poisoned");
        let coalesce = matches!(
            (&event, queue.back()),
            (AssemblerEvent::Frame { .. }, Some(AssemblerEvent::Frame { .. }))
        );
        if coalesce {
            queue.pop_back();
        }
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
    }

    /// Called from the async consumer task. Blocks until an event is
    /// available, returning events in the order they were published.
    async fn next(&self) -> AssemblerEvent {
        loop {
            if let Some(event) = self.queue.lock().expect("frame bridge mutex poisoned").pop_front()
            {
                return event;
            }
            self.notify.notified().await;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = cli::parse_args()?;
    let mut cfg = config::load_config(&args.config_path)?;
    if let Some(bind) = args.bind {
        cfg.server.bind = bind;
    }
    if let Some(port) = args.port {
        cfg.server.port = port;
    }
    if let Some(encoder) = args.encoder {
        cfg.video.encoder = Some(encoder);
    }
    if let Some(fps) = args.framerate {
        cfg.video.framerate = fps;
    }
    if let Some(quality) = args.quality {
        cfg.video.quality = quality;
    }
    if let Some(width) = args.width {
        cfg.video.width = width;
    }
    if let Some(height) = args.height {
        cfg.video.height = height;
    }

    let broadcaster = Broadcaster::new(ConfigMessage {
        width: cfg.video.width,
        height: cfg.video.height,
        fps: cfg.video.framerate,
        quality: cfg.video.quality,
    });

    tokio::spawn(broadcaster::run_stats_loop(Arc::clone(&broadcaster)));
    tokio::spawn(fallback::run(
        Arc::clone(&broadcaster),
        FALLBACK_IMAGE.to_vec(),
        cfg.video.framerate,
    ));

    let bridge = FrameBridge::new();

    spawn_pipeline_thread(
        cfg.video.width,
        cfg.video.height,
        cfg.video.framerate,
        cfg.video.encoder.clone(),
        Arc::clone(&bridge),
    );

    {
        let bridge = Arc::clone(&bridge);
        let broadcaster = Arc::clone(&broadcaster);
        tokio::spawn(async move {
            loop {
                match bridge.next().await {
                    AssemblerEvent::Frame { packet, is_key } => {
                        broadcaster.broadcast_frame(packet, is_key);
                    }
                    AssemblerEvent::Init {
                        sps,
                        pps,
                        width,
                        height,
                    } => {
                        broadcaster.broadcast_init(sps, pps, width, height).await;
                    }
                }
            }
        });
    }

    let state = transport::AppState {
        broadcaster: Arc::clone(&broadcaster),
    };
    let app = transport::build_router(state);

    let bind_addr = format!("{}:{}", cfg.server.bind, cfg.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind to {bind_addr}"))?;

    tracing::info!(%bind_addr, "streamcast agent listening");

    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        result = server => {
            match result {
                Ok(Err(e)) => tracing::error!(error = %e, "server exited with error"),
                Err(e) => tracing::error!(error = %e, "server task panicked"),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }

    Ok(())
}

/// Launches the dedicated blocking thread running Encoder Supervisor ->
/// Bitstream Scanner -> Frame Assembler, strictly sequential. Every
/// assembler event, Frame and Init alike, crosses into the async world
/// through `bridge` in emission order; nothing on this thread talks to
/// the runtime directly.
fn spawn_pipeline_thread(
    width: u16,
    height: u16,
    framerate: u32,
    forced_encoder: Option<String>,
    bridge: Arc<FrameBridge>,
) {
    std::thread::Builder::new()
        .name("encoder-ingest".into())
        .spawn(move || {
            let candidates =
                encoder::candidates(width, height, framerate, forced_encoder.as_deref());
            let Some((mut supervisor, stdout, name)) = encoder::Supervisor::launch(&candidates)
            else {
                tracing::warn!(
                    "no encoder candidate produced a live process, falling back to still image only"
                );
                return;
            };
            tracing::info!(encoder = name, "encoder ingest thread started");

            let mut scanner = bitstream::Scanner::new();
            let mut assembler = Assembler::new();

            encoder::read_loop(stdout, |chunk| {
                scanner.feed(chunk);
                for (nal_type, payload) in scanner.drain() {
                    for event in assembler.push_nal(nal_type, payload) {
                        bridge.publish(event);
                    }
                }
            });

            for (nal_type, payload) in scanner.flush() {
                for event in assembler.push_nal(nal_type, payload) {
                    bridge.publish(event);
                }
            }
            for event in assembler.flush() {
                bridge.publish(event);
            }

            supervisor.stop();
        })
        .expect("failed to spawn encoder ingest thread");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consecutive_frames_coalesce_to_the_latest() {
        let bridge = FrameBridge::new();
        bridge.publish(AssemblerEvent::Frame {
            packet: vec![1],
            is_key: true,
        });
        bridge.publish(AssemblerEvent::Frame {
            packet: vec![2],
            is_key: false,
        });
        match bridge.next().await {
            AssemblerEvent::Frame { packet, is_key } => {
                assert_eq!(packet, vec![2]);
                assert!(!is_key);
            }
            other => panic!("expected Frame, got {other:?}"),
        }
        assert!(bridge.queue.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn init_is_never_coalesced_and_keeps_its_position() {
        let bridge = FrameBridge::new();
        bridge.publish(AssemblerEvent::Frame {
            packet: vec![1],
            is_key: true,
        });
        bridge.publish(AssemblerEvent::Init {
            sps: vec![0x67],
            pps: vec![0x68],
            width: 640,
            height: 480,
        });
        bridge.publish(AssemblerEvent::Frame {
            packet: vec![2],
            is_key: false,
        });

        let first = bridge.next().await;
        assert!(matches!(first, AssemblerEvent::Frame { .. }));
        let second = bridge.next().await;
        assert!(matches!(second, AssemblerEvent::Init { .. }));
        let third = bridge.next().await;
        assert!(matches!(third, AssemblerEvent::Frame { .. }));
    }
}
