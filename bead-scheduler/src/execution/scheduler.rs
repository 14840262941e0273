//! Single-writer scheduler actor.
//!
//! One tokio task owns the session registry, the admission queue and the
//! running counter. HTTP handlers talk to it through `Scheduler` (a cheap,
//! cloneable handle) and process monitors report back on a separate exit
//! channel. Nothing else mutates session state, so every transition and its
//! event are applied in one uninterrupted step.

use crate::execution::admission::AdmissionQueue;
use crate::execution::process_manager::{ProcessExit, ProcessHandle, ProcessManager};
use crate::execution::registry::SessionRegistry;
use crate::gateway::events::EventBroadcaster;
use crate::gateway::protocol::GatewayEvent;
use crate::models::{CreateSessionsRequest, Session, SessionResolution, SessionStatus};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Settings the scheduler needs from the service configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_parallel: usize,
    pub workdir_root: PathBuf,
    pub log_dir: PathBuf,
}

/// Point-in-time counters for health reporting
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub running_sessions: usize,
    pub queued_sessions: usize,
    pub total_sessions: usize,
    pub max_parallel: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The actor task has stopped
    Unavailable,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::Unavailable => write!(f, "scheduler is not running"),
        }
    }
}

impl std::error::Error for SchedulerError {}

enum SchedulerCmd {
    Submit {
        request: CreateSessionsRequest,
        reply: oneshot::Sender<Vec<Session>>,
    },
    List {
        reply: oneshot::Sender<Vec<Session>>,
    },
    Get {
        session_id: String,
        reply: oneshot::Sender<Option<Session>>,
    },
    Cancel {
        session_id: String,
        reply: oneshot::Sender<Option<Session>>,
    },
    Stats {
        reply: oneshot::Sender<SchedulerStats>,
    },
}

/// Handle to the scheduler actor
#[derive(Clone)]
pub struct Scheduler {
    cmd_tx: mpsc::UnboundedSender<SchedulerCmd>,
}

impl Scheduler {
    /// Spawn the actor on the current tokio runtime.
    pub fn start(config: SchedulerConfig, broadcaster: Arc<EventBroadcaster>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();

        log::info!(
            "[SCHEDULER] Starting with max {} parallel session(s), logs in {}",
            config.max_parallel.max(1),
            config.log_dir.display()
        );

        let actor = SchedulerActor {
            registry: SessionRegistry::new(),
            queue: AdmissionQueue::new(config.max_parallel),
            processes: HashMap::new(),
            process_manager: ProcessManager::new(broadcaster.clone(), exit_tx),
            broadcaster,
            config,
        };
        tokio::spawn(actor.run_loop(cmd_rx, exit_rx));

        Self { cmd_tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SchedulerCmd,
    ) -> Result<T, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(reply))
            .map_err(|_| SchedulerError::Unavailable)?;
        rx.await.map_err(|_| SchedulerError::Unavailable)
    }

    /// Create and enqueue one session per requested bead (or a single
    /// unlinked session). Returns the records as created, all `queued`.
    pub async fn submit(
        &self,
        request: CreateSessionsRequest,
    ) -> Result<Vec<Session>, SchedulerError> {
        self.request(|reply| SchedulerCmd::Submit { request, reply }).await
    }

    /// All sessions in creation order
    pub async fn list(&self) -> Result<Vec<Session>, SchedulerError> {
        self.request(|reply| SchedulerCmd::List { reply }).await
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<Session>, SchedulerError> {
        let session_id = session_id.to_string();
        self.request(|reply| SchedulerCmd::Get { session_id, reply }).await
    }

    /// Cancel a queued or running session. Terminal sessions come back
    /// unchanged; `None` means the session is unknown.
    pub async fn cancel(&self, session_id: &str) -> Result<Option<Session>, SchedulerError> {
        let session_id = session_id.to_string();
        self.request(|reply| SchedulerCmd::Cancel { session_id, reply }).await
    }

    pub async fn stats(&self) -> Result<SchedulerStats, SchedulerError> {
        self.request(|reply| SchedulerCmd::Stats { reply }).await
    }
}

struct SchedulerActor {
    registry: SessionRegistry,
    queue: AdmissionQueue,
    /// Handles of sessions whose process is being monitored
    processes: HashMap<String, ProcessHandle>,
    process_manager: ProcessManager,
    broadcaster: Arc<EventBroadcaster>,
    config: SchedulerConfig,
}

impl SchedulerActor {
    async fn run_loop(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<SchedulerCmd>,
        mut exit_rx: mpsc::UnboundedReceiver<ProcessExit>,
    ) {
        loop {
            tokio::select! {
                Some(exit) = exit_rx.recv() => self.handle_exit(exit),
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_cmd(cmd),
                    None => break,
                },
            }
        }

        log::info!("[SCHEDULER] All handles dropped, scheduler loop shutting down");
    }

    fn handle_cmd(&mut self, cmd: SchedulerCmd) {
        match cmd {
            SchedulerCmd::Submit { request, reply } => {
                let created = self.submit(request);
                let _ = reply.send(created);
            }
            SchedulerCmd::List { reply } => {
                let _ = reply.send(self.registry.list());
            }
            SchedulerCmd::Get { session_id, reply } => {
                let _ = reply.send(self.registry.get(&session_id).cloned());
            }
            SchedulerCmd::Cancel { session_id, reply } => {
                let result = self.cancel(&session_id);
                let _ = reply.send(result);
            }
            SchedulerCmd::Stats { reply } => {
                let _ = reply.send(SchedulerStats {
                    running_sessions: self.registry.count_by_status(SessionStatus::Running),
                    queued_sessions: self.registry.count_by_status(SessionStatus::Queued),
                    total_sessions: self.registry.len(),
                    max_parallel: self.queue.max_parallel(),
                });
            }
        }
    }

    fn submit(&mut self, request: CreateSessionsRequest) -> Vec<Session> {
        let working_directory = match &request.workdir {
            Some(dir) => self.config.workdir_root.join(dir),
            None => self.config.workdir_root.clone(),
        };

        let mut created = Vec::new();
        for work_item_id in request.work_item_links() {
            let session = Session::new(
                work_item_id,
                request.command.clone(),
                request.args.clone(),
                working_directory.clone(),
                &self.config.log_dir,
            );
            log::info!(
                "[SCHEDULER] Queued session {} (bead: {:?}): {}",
                session.id,
                session.work_item_id,
                session.command
            );
            self.broadcaster.publish(GatewayEvent::session_queued(&session));
            self.queue.enqueue(session.id.clone());
            created.push(session.clone());
            self.registry.insert(session);
        }

        self.admit();
        created
    }

    /// Start queued sessions while there is capacity.
    fn admit(&mut self) {
        while let Some(session_id) = self.queue.next_admissible(&self.registry) {
            self.launch(&session_id);
        }
    }

    fn launch(&mut self, session_id: &str) {
        let Some(session) = self.registry.get(session_id).cloned() else {
            self.queue.on_session_finished();
            return;
        };

        let spawned = self.process_manager.spawn(&session);
        let pid = spawned.as_ref().ok().and_then(|p| p.pid());

        let Some(started) = self.registry.mark_running(session_id, pid).cloned() else {
            // next_admissible only yields queued sessions
            log::error!("[SCHEDULER] Session {} was not queued at launch", session_id);
            self.queue.on_session_finished();
            return;
        };
        self.broadcaster.publish(GatewayEvent::session_started(&started));

        match spawned {
            Ok(process) => {
                let handle = self.process_manager.watch(process, &started);
                log::info!(
                    "[SCHEDULER] Session {} running (pid: {:?}, {}/{} slots, {} waiting)",
                    session_id,
                    handle.pid,
                    self.queue.running_count(),
                    self.queue.max_parallel(),
                    self.queue.pending_len()
                );
                self.processes.insert(session_id.to_string(), handle);
            }
            Err(error) => {
                log::warn!("[SCHEDULER] Session {} failed to start: {}", session_id, error);
                self.finish(session_id, SessionResolution::Errored { error });
            }
        }
    }

    fn handle_exit(&mut self, exit: ProcessExit) {
        self.processes.remove(&exit.session_id);
        if !self.finish(&exit.session_id, exit.resolution) {
            log::debug!(
                "[SCHEDULER] Discarding late exit for session {} (already terminal)",
                exit.session_id
            );
            return;
        }
        self.admit();
    }

    /// Resolve a running session and release its slot. Returns false when the
    /// session was already terminal, in which case nothing changes.
    fn finish(&mut self, session_id: &str, resolution: SessionResolution) -> bool {
        let Some(session) = self.registry.resolve(session_id, resolution).cloned() else {
            return false;
        };

        log::info!(
            "[SCHEDULER] Session {} {} (exit code: {:?}, {}ms)",
            session.id,
            session.status,
            session.exit_code,
            session.duration_ms().unwrap_or(0)
        );
        self.broadcaster.publish(GatewayEvent::session_exit(&session));
        self.queue.on_session_finished();
        true
    }

    fn cancel(&mut self, session_id: &str) -> Option<Session> {
        let status = self.registry.status(session_id)?;
        if status.is_terminal() {
            return self.registry.get(session_id).cloned();
        }

        let session = self
            .registry
            .resolve(session_id, SessionResolution::Cancelled)
            .cloned()?;
        log::info!("[SCHEDULER] Session {} cancelled (was {})", session_id, status);
        self.broadcaster.publish(GatewayEvent::session_cancelled(&session));

        if status == SessionStatus::Running {
            if let Some(handle) = self.processes.remove(session_id) {
                handle.interrupt();
            }
            self.queue.on_session_finished();
            self.admit();
        }

        Some(session)
    }
}
