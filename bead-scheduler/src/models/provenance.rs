use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mutating tracker operation recorded in the provenance log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerAction {
    /// Mark a bead in progress
    Claim,
    /// Mark a bead closed
    Close,
}

impl TrackerAction {
    /// Tracker status a bead ends up in after this action
    pub fn resulting_status(&self) -> &'static str {
        match self {
            TrackerAction::Claim => "in_progress",
            TrackerAction::Close => "closed",
        }
    }
}

impl std::fmt::Display for TrackerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerAction::Claim => write!(f, "claim"),
            TrackerAction::Close => write!(f, "close"),
        }
    }
}

/// Immutable audit entry, one JSON object per line on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceRecord {
    pub timestamp: DateTime<Utc>,
    pub action: TrackerAction,
    pub work_item_id: String,
    pub resulting_status: String,
    pub session_id: Option<String>,
    pub actor: Option<String>,
}

impl ProvenanceRecord {
    pub fn new(
        action: TrackerAction,
        work_item_id: impl Into<String>,
        session_id: Option<String>,
        actor: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            work_item_id: work_item_id.into(),
            resulting_status: action.resulting_status().to_string(),
            session_id,
            actor,
        }
    }
}

/// Body of `POST /beads/{id}/claim` and `POST /beads/{id}/close`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerMutationRequest {
    pub actor: Option<String>,
    pub session_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_carries_resulting_status() {
        let claim = ProvenanceRecord::new(TrackerAction::Claim, "bd-1", None, Some("alice".into()));
        assert_eq!(claim.resulting_status, "in_progress");

        let close = ProvenanceRecord::new(TrackerAction::Close, "bd-1", Some("s-1".into()), None);
        assert_eq!(close.resulting_status, "closed");
    }

    #[test]
    fn test_record_json_shape() {
        let record = ProvenanceRecord::new(TrackerAction::Close, "bd-9", Some("s-2".into()), None);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["action"], "close");
        assert_eq!(json["workItemId"], "bd-9");
        assert_eq!(json["resultingStatus"], "closed");
        assert_eq!(json["sessionId"], "s-2");
        assert!(json["actor"].is_null());
    }
}
