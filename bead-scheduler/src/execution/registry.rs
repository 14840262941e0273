//! Canonical store of session records.
//!
//! Sessions are never removed; they only move forward through the state
//! machine. Every transition is a check-and-set on the current status so that
//! whichever of {cancel, natural exit, spawn error} arrives first wins and the
//! others become no-ops.

use chrono::Utc;
use std::collections::HashMap;

use crate::models::{Session, SessionResolution, SessionStatus};

#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    /// Insertion order, for listing
    order: Vec<String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, session: Session) {
        let id = session.id.clone();
        if self.sessions.insert(id.clone(), session).is_none() {
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn status(&self, id: &str) -> Option<SessionStatus> {
        self.sessions.get(id).map(|s| s.status)
    }

    /// All sessions in insertion order
    pub fn list(&self) -> Vec<Session> {
        self.order
            .iter()
            .filter_map(|id| self.sessions.get(id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn count_by_status(&self, status: SessionStatus) -> usize {
        self.sessions.values().filter(|s| s.status == status).count()
    }

    /// `queued -> running`. Returns the updated session, or `None` if the
    /// session is unknown or no longer queued.
    pub fn mark_running(&mut self, id: &str, process_id: Option<u32>) -> Option<&Session> {
        let session = self.sessions.get_mut(id)?;
        if session.status != SessionStatus::Queued {
            return None;
        }
        session.status = SessionStatus::Running;
        session.process_id = process_id;
        session.started_at = Some(Utc::now());
        Some(session)
    }

    /// Move a non-terminal session into its terminal state.
    ///
    /// Exits and errors only apply to running sessions; cancellation applies
    /// to queued or running ones. Returns `None` when the transition is not
    /// allowed, leaving the record untouched.
    pub fn resolve(&mut self, id: &str, resolution: SessionResolution) -> Option<&Session> {
        let session = self.sessions.get_mut(id)?;

        let allowed = match resolution {
            SessionResolution::Cancelled => !session.status.is_terminal(),
            SessionResolution::Exited { .. } | SessionResolution::Errored { .. } => {
                session.status == SessionStatus::Running
            }
        };
        if !allowed {
            return None;
        }

        match resolution {
            SessionResolution::Exited { exit_code: Some(0) } => {
                session.status = SessionStatus::Success;
                session.exit_code = Some(0);
            }
            SessionResolution::Exited { exit_code: Some(code) } => {
                session.status = SessionStatus::Failed;
                session.exit_code = Some(code);
            }
            SessionResolution::Exited { exit_code: None } => {
                session.status = SessionStatus::Failed;
                session.last_error = Some("terminated by signal".to_string());
            }
            SessionResolution::Errored { error } => {
                session.status = SessionStatus::Failed;
                session.last_error = Some(error);
            }
            SessionResolution::Cancelled => {
                session.status = SessionStatus::Cancelled;
            }
        }
        session.ended_at = Some(Utc::now());
        Some(session)
    }
}
