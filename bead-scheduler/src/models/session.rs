use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Waiting in the admission queue
    Queued,
    /// Process spawned (or spawn attempted) and not yet resolved. A failed
    /// spawn passes through here without a `process_id` on its way to `Failed`.
    Running,
    /// Process exited with code 0
    Success,
    /// Process exited non-zero, or could not be spawned/driven
    Failed,
    /// Cancelled by a caller before reaching another terminal state
    Cancelled,
}

impl SessionStatus {
    /// `success`, `failed` and `cancelled` accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Success | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Queued => write!(f, "queued"),
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Success => write!(f, "success"),
            SessionStatus::Failed => write!(f, "failed"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One execution attempt of an external command, optionally tied to a bead
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session identifier (UUID)
    pub id: String,
    /// Bead this session works on, if any. Never validated against the tracker.
    pub work_item_id: Option<String>,
    pub status: SessionStatus,
    pub command: String,
    pub args: Vec<String>,
    pub working_directory: PathBuf,
    /// OS process id, present once the process has been spawned
    pub process_id: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Only set when the process exited on its own
    pub exit_code: Option<i32>,
    /// Failure detail for spawn/runtime errors
    pub last_error: Option<String>,
    /// Append-only file receiving interleaved stdout/stderr
    pub log_path: PathBuf,
}

impl Session {
    /// Create a new queued session. The log file lives at `<log_dir>/<id>.log`.
    pub fn new(
        work_item_id: Option<String>,
        command: impl Into<String>,
        args: Vec<String>,
        working_directory: PathBuf,
        log_dir: &std::path::Path,
    ) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let log_path = log_dir.join(format!("{}.log", id));
        Self {
            id,
            work_item_id,
            status: SessionStatus::Queued,
            command: command.into(),
            args,
            working_directory,
            process_id: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            exit_code: None,
            last_error: None,
            log_path,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Duration in milliseconds between start and end (or now, while running)
    pub fn duration_ms(&self) -> Option<i64> {
        let start = self.started_at?;
        let end = self.ended_at.unwrap_or_else(Utc::now);
        Some((end - start).num_milliseconds())
    }
}

/// How a running session came to an end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionResolution {
    /// The process exited by itself. `None` means the OS reported no code.
    Exited { exit_code: Option<i32> },
    /// Spawning or driving the process failed
    Errored { error: String },
    /// A caller asked for the session to stop
    Cancelled,
}

/// Body of `POST /sessions`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionsRequest {
    pub bead_ids: Option<Vec<String>>,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub workdir: Option<String>,
}

impl CreateSessionsRequest {
    /// Bead links for the sessions to create. A missing or empty list yields a
    /// single unlinked session.
    pub fn work_item_links(&self) -> Vec<Option<String>> {
        match &self.bead_ids {
            Some(ids) if !ids.is_empty() => ids.iter().cloned().map(Some).collect(),
            _ => vec![None],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_queued_and_unspawned() {
        let session = Session::new(
            Some("bd-12".to_string()),
            "echo",
            vec!["hi".to_string()],
            PathBuf::from("/tmp"),
            std::path::Path::new("/var/log/sessions"),
        );

        assert_eq!(session.status, SessionStatus::Queued);
        assert!(session.process_id.is_none());
        assert!(session.started_at.is_none());
        assert!(session.exit_code.is_none());
        assert_eq!(
            session.log_path,
            PathBuf::from(format!("/var/log/sessions/{}.log", session.id))
        );
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!SessionStatus::Queued.is_terminal());
        assert!(!SessionStatus::Running.is_terminal());
        assert!(SessionStatus::Success.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_session_serializes_camel_case() {
        let session = Session::new(
            None,
            "true",
            vec![],
            PathBuf::from("."),
            std::path::Path::new("logs"),
        );
        let json = serde_json::to_value(&session).unwrap();

        assert_eq!(json["status"], "queued");
        assert!(json.get("workItemId").is_some());
        assert!(json.get("logPath").is_some());
        assert!(json["processId"].is_null());
    }

    #[test]
    fn test_work_item_links_default_to_single_unlinked() {
        let omitted: CreateSessionsRequest =
            serde_json::from_str(r#"{"command": "true"}"#).unwrap();
        assert_eq!(omitted.work_item_links(), vec![None]);

        let empty: CreateSessionsRequest =
            serde_json::from_str(r#"{"command": "true", "beadIds": []}"#).unwrap();
        assert_eq!(empty.work_item_links(), vec![None]);

        let linked: CreateSessionsRequest =
            serde_json::from_str(r#"{"command": "true", "beadIds": ["a", "b"]}"#).unwrap();
        assert_eq!(
            linked.work_item_links(),
            vec![Some("a".to_string()), Some("b".to_string())]
        );
    }
}
