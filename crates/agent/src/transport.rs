use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;
use axum::routing::get;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::broadcaster::Broadcaster;

#[derive(Clone)]
pub struct AppState {
    pub broadcaster: Arc<Broadcaster>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let client_id = Uuid::new_v4();
    ws.max_message_size(64 * 1024)
        .on_upgrade(move |socket| async move {
            state.broadcaster.attach(client_id, socket).await;
        })
}
