//! Actix-Web WebSocket handler for the event channel.
//! Observers connect on the same port as the HTTP API and receive every
//! published event as a JSON text frame.

use crate::gateway::events::EventBroadcaster;
use crate::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::AggregatedMessage;
use futures_util::StreamExt;
use std::sync::Arc;

/// WebSocket handler for Actix-Web
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let (response, session, msg_stream) = actix_ws::handle(&req, stream)?;

    actix_web::rt::spawn(handle_ws_connection(
        session,
        msg_stream,
        data.broadcaster.clone(),
    ));

    Ok(response)
}

async fn handle_ws_connection(
    mut session: actix_ws::Session,
    msg_stream: actix_ws::MessageStream,
    broadcaster: Arc<EventBroadcaster>,
) {
    let mut msg_stream = msg_stream
        .aggregate_continuations()
        .max_continuation_size(64 * 1024);

    let (client_id, mut event_rx) = broadcaster.subscribe();
    log::info!(
        "[WEBSOCKET] Observer {} connected (total: {} observers)",
        client_id,
        broadcaster.client_count()
    );

    let mut send_session = session.clone();
    let send_client_id = client_id.clone();

    // Forward events to the socket
    let send_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if send_session.text(json).await.is_err() {
                        log::warn!(
                            "[WEBSOCKET] Failed to send '{}' event to observer {}",
                            event.event_type,
                            send_client_id
                        );
                        break;
                    }
                }
                Err(e) => {
                    log::error!("[WEBSOCKET] Failed to serialize event: {}", e);
                }
            }
        }
    });

    // Observers only listen; incoming frames are limited to keepalive and close
    while let Some(msg_result) = msg_stream.next().await {
        match msg_result {
            Ok(AggregatedMessage::Ping(data)) => {
                if session.pong(&data).await.is_err() {
                    break;
                }
            }
            Ok(AggregatedMessage::Close(_)) => break,
            Ok(AggregatedMessage::Text(text)) => {
                log::debug!("[WEBSOCKET] Ignoring text frame from {}: {}", client_id, text);
            }
            Err(e) => {
                log::error!("[WEBSOCKET] Protocol error from {}: {:?}", client_id, e);
                break;
            }
            _ => {}
        }
    }

    broadcaster.unsubscribe(&client_id);
    send_task.abort();
    let _ = session.close(None).await;
    log::info!("[WEBSOCKET] Observer {} disconnected", client_id);
}
