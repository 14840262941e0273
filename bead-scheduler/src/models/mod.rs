pub mod provenance;
pub mod session;

pub use provenance::{ProvenanceRecord, TrackerAction, TrackerMutationRequest};
pub use session::{CreateSessionsRequest, Session, SessionResolution, SessionStatus};
