use std::sync::Arc;

use tokio::time::{Duration, interval};

use crate::broadcaster::Broadcaster;

/// Emits a still-image frame on a timer whenever the H.264 path has
/// not yet produced an Init message, so a freshly attached client
/// always has something to render. Stops permanently once Init fires.
pub async fn run(broadcaster: Arc<Broadcaster>, still_image: Vec<u8>, fps: u32) {
    let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
    let mut ticker = interval(period);
    loop {
        ticker.tick().await;
        if broadcaster.has_init().await {
            tracing::info!("video init available, stopping fallback frame source");
            return;
        }
        broadcaster.broadcast_image(still_image.clone());
    }
}
