use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::broadcast::Topic;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsParams {
    /// `package:<tracking>` or `user:<username>`.
    pub topic: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let topic = Topic::parse(&params.topic)
        .ok_or_else(|| AppError::BadRequest(format!("invalid topic: {}", params.topic)))?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, topic)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, topic: Topic) {
    let (mut sender, mut receiver) = socket.split();
    let rx = state.broadcaster.subscribe(&topic);
    state.metrics.topic_subscribers.inc();

    info!(?topic, "websocket subscriber connected");

    let mut send_task = tokio::spawn(async move {
        let mut events = BroadcastStream::new(rx);
        while let Some(event) = events.next().await {
            // A lagged receiver skips the missed events; nobody else waits.
            let Ok(event) = event else {
                continue;
            };

            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    // Either side closing tears the subscription down. The surviving task
    // must be aborted so the broadcast receiver drops and the topic can be
    // swept; otherwise a client disconnect leaves the send task parked on an
    // idle topic forever.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.metrics.topic_subscribers.dec();
    info!(?topic, "websocket subscriber disconnected");
}
