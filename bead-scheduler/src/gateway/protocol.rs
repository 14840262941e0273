//! Event envelope delivered to observers on the event channel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::{ProvenanceRecord, Session};

/// Event types published on the event channel
pub mod event_type {
    pub const SESSION_QUEUED: &str = "session_queued";
    pub const SESSION_STARTED: &str = "session_started";
    pub const SESSION_OUTPUT: &str = "session_output";
    pub const SESSION_EXIT: &str = "session_exit";
    pub const SESSION_CANCELLED: &str = "session_cancelled";
    pub const WORK_ITEM_STATUS_CHANGED: &str = "work_item_status_changed";
}

/// Envelope serialized as `{type, timestamp, payload}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

impl GatewayEvent {
    pub fn new(event_type: &str, payload: Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            timestamp: Utc::now(),
            payload,
        }
    }

    fn lifecycle(event_type: &str, session: &Session) -> Self {
        Self::new(
            event_type,
            json!({
                "sessionId": session.id,
                "workItemId": session.work_item_id,
                "session": session,
            }),
        )
    }

    pub fn session_queued(session: &Session) -> Self {
        Self::lifecycle(event_type::SESSION_QUEUED, session)
    }

    pub fn session_started(session: &Session) -> Self {
        Self::lifecycle(event_type::SESSION_STARTED, session)
    }

    /// Covers both `success` and `failed` resolutions
    pub fn session_exit(session: &Session) -> Self {
        Self::lifecycle(event_type::SESSION_EXIT, session)
    }

    pub fn session_cancelled(session: &Session) -> Self {
        Self::lifecycle(event_type::SESSION_CANCELLED, session)
    }

    /// A raw output chunk. Chunk boundaries do not follow line boundaries.
    pub fn session_output(
        session_id: &str,
        work_item_id: Option<&str>,
        stream: &str,
        chunk: &[u8],
    ) -> Self {
        Self::new(
            event_type::SESSION_OUTPUT,
            json!({
                "sessionId": session_id,
                "workItemId": work_item_id,
                "stream": stream,
                "chunk": String::from_utf8_lossy(chunk),
            }),
        )
    }

    pub fn work_item_status_changed(record: &ProvenanceRecord) -> Self {
        Self::new(
            event_type::WORK_ITEM_STATUS_CHANGED,
            json!({
                "workItemId": record.work_item_id,
                "status": record.resulting_status,
                "action": record.action,
                "sessionId": record.session_id,
                "actor": record.actor,
            }),
        )
    }
}
