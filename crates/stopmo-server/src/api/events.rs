// ABOUTME: Live event handlers: WebSocket subscription and authenticated event ingress.
// ABOUTME: Each viewer gets a bounded queue registered with the bus; ingress broadcasts to all of them.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use stopmo_core::{ButtonEvent, EventKind};
use tokio::sync::mpsc;

use crate::app_state::SharedState;
use crate::bus::{ChannelSubscriber, EventBus};
use crate::error::ApiError;

/// Events a viewer may have queued before it counts as stalled.
const SUBSCRIBER_QUEUE: usize = 32;
/// How long a broadcast waits on a full viewer queue.
const DELIVERY_DEADLINE: Duration = Duration::from_millis(250);

/// GET /events - Upgrade to a WebSocket that receives every button event.
pub async fn subscribe(State(state): State<SharedState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let bus = Arc::clone(&state.bus);
    ws.on_upgrade(move |socket| serve_viewer(socket, bus))
}

async fn serve_viewer(socket: WebSocket, bus: Arc<EventBus>) {
    let (subscriber, events) = ChannelSubscriber::new(SUBSCRIBER_QUEUE, DELIVERY_DEADLINE);
    let id = bus.register(Arc::new(subscriber));
    tracing::debug!(subscriber = %id, "viewer connected");

    let (sender, receiver) = socket.split();
    pump_events(events, sender, receiver).await;

    bus.unregister(id);
    tracing::debug!(subscriber = %id, "viewer disconnected");
}

/// Forward queued events to the socket until either side goes away.
///
/// Incoming client messages are read only to notice the close; their content
/// is ignored.
pub(crate) async fn pump_events<S, R, E>(mut events: mpsc::Receiver<ButtonEvent>, mut sink: S, mut incoming: R)
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
{
    loop {
        tokio::select! {
            event = events.recv() => {
                // None means the bus dropped this viewer.
                let Some(event) = event else { break };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(event = %event.kind, "failed to encode event: {}", e);
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            msg = incoming.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    let _ = sink.close().await;
}

#[derive(Debug, Deserialize)]
pub struct IngressEvent {
    #[serde(rename = "type")]
    pub kind: String,
}

/// POST /events - Broadcast a button event to every connected viewer.
///
/// The bearer token has already been checked by the auth layer.
pub async fn ingest_event(
    State(state): State<SharedState>,
    payload: Result<Json<IngressEvent>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(payload) = payload?;
    let kind: EventKind = payload.kind.parse()?;

    let report = state.bus.broadcast(&ButtonEvent::new(kind)).await;
    tracing::info!(event = %kind, delivered = report.delivered, "event broadcast");

    Ok(Json(serde_json::json!({
        "ok": true,
        "delivered": report.delivered,
    })))
}
