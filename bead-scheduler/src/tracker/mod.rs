//! External work-item tracker integration

pub mod bridge;
pub mod provenance;

pub use bridge::TrackerBridge;
pub use provenance::ProvenanceLog;

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// The CLI could not be started
    Spawn(String),
    /// The CLI exited unsuccessfully
    CommandFailed { code: Option<i32>, message: String },
    /// The CLI succeeded but the provenance record could not be written
    Provenance(String),
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::Spawn(e) => write!(f, "failed to run tracker CLI: {}", e),
            TrackerError::CommandFailed { message, .. } => write!(f, "{}", message),
            TrackerError::Provenance(e) => write!(f, "failed to record provenance: {}", e),
        }
    }
}

impl std::error::Error for TrackerError {}
