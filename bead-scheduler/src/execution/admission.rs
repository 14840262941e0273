//! FIFO admission under a fixed parallelism ceiling.
//!
//! Pure bookkeeping: no I/O, no locking. Owned by the scheduler actor, which
//! is the only code that touches it.

use std::collections::VecDeque;

use crate::execution::registry::SessionRegistry;
use crate::models::SessionStatus;

pub struct AdmissionQueue {
    pending: VecDeque<String>,
    running: usize,
    max_parallel: usize,
}

impl AdmissionQueue {
    /// `max_parallel` is clamped to at least 1.
    pub fn new(max_parallel: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            running: 0,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Append to the tail. Admission happens separately via `next_admissible`.
    pub fn enqueue(&mut self, session_id: String) {
        self.pending.push_back(session_id);
    }

    /// Pop the next session that may start, counting it as running.
    ///
    /// Returns `None` once the ceiling is reached or nothing admissible is
    /// left. Entries whose session is no longer queued (cancelled while
    /// waiting) are dropped without taking a slot.
    pub fn next_admissible(&mut self, registry: &SessionRegistry) -> Option<String> {
        while self.running < self.max_parallel {
            let id = self.pending.pop_front()?;
            match registry.status(&id) {
                Some(SessionStatus::Queued) => {
                    self.running += 1;
                    return Some(id);
                }
                status => {
                    log::debug!(
                        "[SCHEDULER] Skipping queue entry {} (status: {:?})",
                        id,
                        status
                    );
                }
            }
        }
        None
    }

    /// Release the slot held by a session that reached a terminal state.
    /// Must be called exactly once per admitted session.
    pub fn on_session_finished(&mut self) {
        debug_assert!(self.running > 0, "running counter underflow");
        self.running = self.running.saturating_sub(1);
    }

    pub fn running_count(&self) -> usize {
        self.running
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }
}
