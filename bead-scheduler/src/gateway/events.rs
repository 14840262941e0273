use crate::gateway::protocol::GatewayEvent;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Capacity of each observer's outbound queue
const OBSERVER_QUEUE_SIZE: usize = 1000;

/// Broadcasts events to all connected observers.
///
/// `publish()` never blocks: the event goes onto an unbounded FIFO channel and
/// a background tokio task fans it out, so publish order is delivery order.
/// There is no replay buffer; an observer only sees events published after it
/// subscribed.
pub struct EventBroadcaster {
    event_tx: mpsc::UnboundedSender<GatewayEvent>,
    clients: Arc<DashMap<String, mpsc::Sender<GatewayEvent>>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let clients: Arc<DashMap<String, mpsc::Sender<GatewayEvent>>> =
            Arc::new(DashMap::new());

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::run_loop(event_rx, clients.clone()));

        Self { event_tx, clients }
    }

    /// Subscribe a new observer and return (client_id, receiver).
    pub fn subscribe(&self) -> (String, mpsc::Receiver<GatewayEvent>) {
        let client_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(OBSERVER_QUEUE_SIZE);

        self.clients.insert(client_id.clone(), tx);

        log::debug!("Client {} subscribed to events", client_id);
        (client_id, rx)
    }

    pub fn unsubscribe(&self, client_id: &str) {
        self.clients.remove(client_id);
        log::debug!("Client {} unsubscribed from events", client_id);
    }

    /// Queue an event for delivery to every current observer.
    pub fn publish(&self, event: GatewayEvent) {
        if self.event_tx.send(event).is_err() {
            log::warn!("[BROADCAST] Broadcast loop is gone, dropping event");
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    // ── background task ──────────────────────────────────────────────

    async fn run_loop(
        mut event_rx: mpsc::UnboundedReceiver<GatewayEvent>,
        clients: Arc<DashMap<String, mpsc::Sender<GatewayEvent>>>,
    ) {
        while let Some(event) = event_rx.recv().await {
            if log::log_enabled!(log::Level::Debug) {
                if let Ok(json) = serde_json::to_string(&event) {
                    log::debug!(
                        "[BROADCAST] '{}' to {} client(s): {}",
                        event.event_type,
                        clients.len(),
                        json
                    );
                }
            }

            let mut closed_clients = Vec::new();

            for entry in clients.iter() {
                match entry.value().try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        log::warn!(
                            "[BROADCAST] Queue full for client {}, dropping '{}' event",
                            entry.key(),
                            event.event_type
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        closed_clients.push(entry.key().clone());
                    }
                }
            }

            for client_id in closed_clients {
                clients.remove(&client_id);
                log::debug!("Removed disconnected client {}", client_id);
            }
        }

        log::info!("[BROADCAST] Background broadcast loop shutting down");
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::time::{timeout, Duration};

    async fn next(rx: &mut mpsc::Receiver<GatewayEvent>) -> GatewayEvent {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_events_delivered_in_publish_order() {
        let broadcaster = EventBroadcaster::new();
        let (_id, mut rx) = broadcaster.subscribe();

        for i in 0..5 {
            broadcaster.publish(GatewayEvent::new("session_output", json!({ "seq": i })));
        }

        for i in 0..5 {
            assert_eq!(next(&mut rx).await.payload["seq"], i);
        }
    }

    #[tokio::test]
    async fn test_fan_out_to_every_observer() {
        let broadcaster = EventBroadcaster::new();
        let (_a, mut rx_a) = broadcaster.subscribe();
        let (_b, mut rx_b) = broadcaster.subscribe();
        assert_eq!(broadcaster.client_count(), 2);

        broadcaster.publish(GatewayEvent::new("session_queued", json!({})));

        assert_eq!(next(&mut rx_a).await.event_type, "session_queued");
        assert_eq!(next(&mut rx_b).await.event_type, "session_queued");
    }

    #[tokio::test]
    async fn test_closed_observer_does_not_affect_others() {
        let broadcaster = EventBroadcaster::new();
        let (_gone, rx_gone) = broadcaster.subscribe();
        let (_live, mut rx_live) = broadcaster.subscribe();
        drop(rx_gone);

        broadcaster.publish(GatewayEvent::new("session_started", json!({ "n": 1 })));
        broadcaster.publish(GatewayEvent::new("session_exit", json!({ "n": 2 })));

        assert_eq!(next(&mut rx_live).await.payload["n"], 1);
        assert_eq!(next(&mut rx_live).await.payload["n"], 2);
        assert_eq!(broadcaster.client_count(), 1);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_no_replay() {
        let broadcaster = EventBroadcaster::new();
        let (_early, mut rx_early) = broadcaster.subscribe();
        broadcaster.publish(GatewayEvent::new("session_queued", json!({ "n": 1 })));
        next(&mut rx_early).await;

        let (_late, mut rx_late) = broadcaster.subscribe();
        broadcaster.publish(GatewayEvent::new("session_started", json!({ "n": 2 })));

        let event = next(&mut rx_late).await;
        assert_eq!(event.event_type, "session_started");
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let broadcaster = EventBroadcaster::new();
        let (id, _rx) = broadcaster.subscribe();
        broadcaster.unsubscribe(&id);
        assert_eq!(broadcaster.client_count(), 0);
    }
}
