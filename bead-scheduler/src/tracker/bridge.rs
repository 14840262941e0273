//! Tracker CLI bridge.
//!
//! Read queries pass the CLI output straight through. Mutations (`claim`,
//! `close`) additionally append one provenance record and publish one
//! `work_item_status_changed` event, but only after the CLI reported
//! success.

use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;

use crate::gateway::events::EventBroadcaster;
use crate::gateway::protocol::GatewayEvent;
use crate::models::{ProvenanceRecord, TrackerAction, TrackerMutationRequest};
use crate::tracker::provenance::ProvenanceLog;
use crate::tracker::TrackerError;

/// Outcome of a successful claim or close
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerTransition {
    pub work_item_id: String,
    pub status: String,
    pub provenance: ProvenanceRecord,
    /// Parsed CLI output
    pub result: Value,
}

pub struct TrackerBridge {
    bin: PathBuf,
    workdir: PathBuf,
    provenance: Arc<ProvenanceLog>,
    broadcaster: Arc<EventBroadcaster>,
}

impl TrackerBridge {
    pub fn new(
        bin: impl Into<PathBuf>,
        workdir: impl Into<PathBuf>,
        provenance: Arc<ProvenanceLog>,
        broadcaster: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            bin: bin.into(),
            workdir: workdir.into(),
            provenance,
            broadcaster,
        }
    }

    pub fn provenance(&self) -> &ProvenanceLog {
        &self.provenance
    }

    /// All work items, or only those the tracker considers ready
    pub async fn list(&self, ready_only: bool) -> Result<Value, TrackerError> {
        let subcommand = if ready_only { "ready" } else { "list" };
        self.run(&[subcommand], None).await
    }

    pub async fn claim(
        &self,
        work_item_id: &str,
        request: TrackerMutationRequest,
    ) -> Result<TrackerTransition, TrackerError> {
        self.mutate(TrackerAction::Claim, work_item_id, request).await
    }

    pub async fn close(
        &self,
        work_item_id: &str,
        request: TrackerMutationRequest,
    ) -> Result<TrackerTransition, TrackerError> {
        self.mutate(TrackerAction::Close, work_item_id, request).await
    }

    async fn mutate(
        &self,
        action: TrackerAction,
        work_item_id: &str,
        request: TrackerMutationRequest,
    ) -> Result<TrackerTransition, TrackerError> {
        let args: Vec<&str> = match action {
            TrackerAction::Claim => {
                vec!["update", work_item_id, "--status", action.resulting_status()]
            }
            TrackerAction::Close => vec!["close", work_item_id],
        };
        let result = self.run(&args, request.actor.as_deref()).await?;

        let record = ProvenanceRecord::new(action, work_item_id, request.session_id, request.actor);
        if let Err(e) = self.provenance.append(&record).await {
            log::error!(
                "[PROVENANCE] Failed to record {} of {} at {}: {}",
                action,
                work_item_id,
                self.provenance.path().display(),
                e
            );
            return Err(TrackerError::Provenance(e.to_string()));
        }

        self.broadcaster.publish(GatewayEvent::work_item_status_changed(&record));

        Ok(TrackerTransition {
            work_item_id: record.work_item_id.clone(),
            status: record.resulting_status.clone(),
            provenance: record,
            result,
        })
    }

    /// Run the CLI in the working root with `--json` (and `--actor`) appended
    async fn run(&self, args: &[&str], actor: Option<&str>) -> Result<Value, TrackerError> {
        let mut cmd = Command::new(&self.bin);
        cmd.args(args).arg("--json");
        if let Some(actor) = actor {
            cmd.arg("--actor").arg(actor);
        }
        cmd.current_dir(&self.workdir);

        log::debug!("[TRACKER] Running {} {}", self.bin.display(), args.join(" "));

        let output = cmd.output().await.map_err(|e| {
            log::warn!("[TRACKER] Failed to run {}: {}", self.bin.display(), e);
            TrackerError::Spawn(format!("{}: {}", self.bin.display(), e))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output.status.code();
            let message = if !stderr.trim().is_empty() {
                stderr.trim().to_string()
            } else if !stdout.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                match code {
                    Some(code) => format!("exit status {}", code),
                    None => "terminated by signal".to_string(),
                }
            };
            log::warn!(
                "[TRACKER] '{}' failed ({:?}): {}",
                args.first().unwrap_or(&""),
                code,
                message
            );
            return Err(TrackerError::CommandFailed { code, message });
        }

        Ok(parse_output(&stdout))
    }
}

/// Structured output when the CLI printed JSON, the raw text otherwise
fn parse_output(stdout: &str) -> Value {
    serde_json::from_str(stdout.trim()).unwrap_or_else(|_| Value::String(stdout.to_string()))
}
