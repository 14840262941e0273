//! Process execution for admitted sessions
//!
//! The ProcessManager spawns a session's command and hands back a handle the
//! scheduler can use to interrupt it. A monitor task then:
//! - appends every stdout/stderr chunk verbatim to the session log file
//! - publishes each chunk as a `session_output` event
//! - appends an exit trailer and reports the outcome back to the scheduler
//!
//! The monitor never touches session state itself; it only reports a
//! `ProcessExit`, and the scheduler decides whether that still applies.

use crate::gateway::events::EventBroadcaster;
use crate::gateway::protocol::GatewayEvent;
use crate::models::{Session, SessionResolution};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

/// Read buffer size for process output
const READ_CHUNK_SIZE: usize = 8192;

/// Chunks in flight between the pipe readers and the log writer
const CHUNK_CHANNEL_SIZE: usize = 64;

/// How long output is still drained after the child itself has exited
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Outcome of a monitored process, reported back to the scheduler
#[derive(Debug)]
pub struct ProcessExit {
    pub session_id: String,
    pub resolution: SessionResolution,
}

/// A spawned child that is not yet being monitored
pub struct SpawnedProcess {
    child: Child,
}

impl SpawnedProcess {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Transient handle to a monitored process, owned by the scheduler
pub struct ProcessHandle {
    pub pid: Option<u32>,
    interrupt_tx: Option<oneshot::Sender<()>>,
}

impl ProcessHandle {
    /// Ask the monitor to interrupt the process. Best effort: a process that
    /// already exited, or that ignores the signal, is left alone.
    pub fn interrupt(mut self) {
        if let Some(tx) = self.interrupt_tx.take() {
            if tx.send(()).is_err() {
                log::debug!("[PROCESS_MANAGER] Process {:?} already finished", self.pid);
            }
        }
    }
}

struct OutputChunk {
    stream: &'static str,
    bytes: Vec<u8>,
}

/// Everything the monitor task needs about its session
struct MonitorContext {
    session_id: String,
    work_item_id: Option<String>,
    log_path: PathBuf,
    pid: Option<u32>,
    broadcaster: Arc<EventBroadcaster>,
    exit_tx: mpsc::UnboundedSender<ProcessExit>,
}

pub struct ProcessManager {
    broadcaster: Arc<EventBroadcaster>,
    exit_tx: mpsc::UnboundedSender<ProcessExit>,
}

impl ProcessManager {
    /// Outcomes of monitored processes are sent on `exit_tx`.
    pub fn new(
        broadcaster: Arc<EventBroadcaster>,
        exit_tx: mpsc::UnboundedSender<ProcessExit>,
    ) -> Self {
        Self {
            broadcaster,
            exit_tx,
        }
    }

    /// Spawn the session's command in its working directory.
    ///
    /// Output stays buffered in the pipes until `watch` starts draining them,
    /// so callers can publish `session_started` before any `session_output`.
    pub fn spawn(&self, session: &Session) -> Result<SpawnedProcess, String> {
        let mut cmd = Command::new(&session.command);
        cmd.args(&session.args)
            .current_dir(&session.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| format!("Failed to spawn '{}': {}", session.command, e))?;

        log::info!(
            "[PROCESS_MANAGER] Spawned session {} (pid: {:?}): {} {}",
            session.id,
            child.id(),
            session.command,
            session.args.join(" ")
        );

        Ok(SpawnedProcess { child })
    }

    /// Start monitoring a spawned process on its own task.
    pub fn watch(&self, process: SpawnedProcess, session: &Session) -> ProcessHandle {
        let pid = process.pid();
        let (interrupt_tx, interrupt_rx) = oneshot::channel();

        let ctx = MonitorContext {
            session_id: session.id.clone(),
            work_item_id: session.work_item_id.clone(),
            log_path: session.log_path.clone(),
            pid,
            broadcaster: self.broadcaster.clone(),
            exit_tx: self.exit_tx.clone(),
        };

        tokio::spawn(Self::monitor_process(process.child, ctx, interrupt_rx));

        ProcessHandle {
            pid,
            interrupt_tx: Some(interrupt_tx),
        }
    }

    async fn monitor_process(
        mut child: Child,
        ctx: MonitorContext,
        interrupt_rx: oneshot::Receiver<()>,
    ) {
        let resolution = Self::drive(&mut child, &ctx, interrupt_rx).await;

        log::info!(
            "[PROCESS_MANAGER] Session {} process finished: {:?}",
            ctx.session_id,
            resolution
        );

        let exit = ProcessExit {
            session_id: ctx.session_id.clone(),
            resolution,
        };
        if ctx.exit_tx.send(exit).is_err() {
            log::warn!(
                "[PROCESS_MANAGER] Scheduler is gone, dropping exit of session {}",
                ctx.session_id
            );
        }
    }

    async fn drive(
        child: &mut Child,
        ctx: &MonitorContext,
        mut interrupt_rx: oneshot::Receiver<()>,
    ) -> SessionResolution {
        let mut log_file = match open_log(&ctx.log_path).await {
            Ok(file) => file,
            Err(e) => {
                log::error!(
                    "[PROCESS_MANAGER] Cannot open log {} for session {}: {}",
                    ctx.log_path.display(),
                    ctx.session_id,
                    e
                );
                let _ = child.start_kill();
                let _ = child.wait().await;
                return SessionResolution::Errored {
                    error: format!("Failed to open log file {}: {}", ctx.log_path.display(), e),
                };
            }
        };

        let (chunk_tx, mut chunk_rx) = mpsc::channel(CHUNK_CHANNEL_SIZE);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(read_stream(stdout, "stdout", chunk_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(read_stream(stderr, "stderr", chunk_tx.clone()));
        }
        drop(chunk_tx);

        let mut listening = true;
        let mut log_healthy = true;
        let mut pipes_open = true;
        let mut exit_status = None;

        let wait = child.wait();
        tokio::pin!(wait);
        let drain_deadline = tokio::time::sleep(OUTPUT_DRAIN_GRACE);
        tokio::pin!(drain_deadline);

        // Drain both pipes while waiting for the child. Descendants may keep
        // the pipes open after the child exits, so draining stops after a
        // short grace period once the exit status is known.
        let status = loop {
            tokio::select! {
                chunk = chunk_rx.recv(), if pipes_open => match chunk {
                    Some(chunk) => {
                        if log_healthy {
                            if let Err(e) = log_file.write_all(&chunk.bytes).await {
                                log::error!(
                                    "[PROCESS_MANAGER] Log write failed for session {}: {}",
                                    ctx.session_id,
                                    e
                                );
                                log_healthy = false;
                            }
                        }
                        ctx.broadcaster.publish(GatewayEvent::session_output(
                            &ctx.session_id,
                            ctx.work_item_id.as_deref(),
                            chunk.stream,
                            &chunk.bytes,
                        ));
                    }
                    None => {
                        pipes_open = false;
                        if let Some(status) = exit_status.take() {
                            break status;
                        }
                    }
                },
                status = &mut wait, if exit_status.is_none() => {
                    if !pipes_open {
                        break status;
                    }
                    drain_deadline
                        .as_mut()
                        .reset(tokio::time::Instant::now() + OUTPUT_DRAIN_GRACE);
                    exit_status = Some(status);
                },
                _ = &mut drain_deadline, if exit_status.is_some() => {
                    log::warn!(
                        "[PROCESS_MANAGER] Session {} exited but its output is still held open, \
                         closing the log",
                        ctx.session_id
                    );
                    if let Some(status) = exit_status.take() {
                        break status;
                    }
                },
                signal = &mut interrupt_rx, if listening && exit_status.is_none() => {
                    listening = false;
                    if signal.is_ok() {
                        send_interrupt(ctx.pid);
                    }
                }
            }
        };
        drop(chunk_rx);

        let resolution = match status {
            Ok(status) => SessionResolution::Exited {
                exit_code: status.code(),
            },
            Err(e) => SessionResolution::Errored {
                error: format!("Failed waiting for process: {}", e),
            },
        };

        if log_healthy {
            let trailer = exit_trailer(&status_summary(&resolution));
            if let Err(e) = write_trailer(&mut log_file, &trailer).await {
                log::error!(
                    "[PROCESS_MANAGER] Failed to finalize log for session {}: {}",
                    ctx.session_id,
                    e
                );
            }
        }

        resolution
    }
}

async fn open_log(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    OpenOptions::new().create(true).append(true).open(path).await
}

async fn write_trailer(file: &mut File, trailer: &str) -> std::io::Result<()> {
    file.write_all(trailer.as_bytes()).await?;
    file.flush().await
}

async fn read_stream<R>(mut reader: R, stream: &'static str, tx: mpsc::Sender<OutputChunk>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = OutputChunk {
                    stream,
                    bytes: buf[..n].to_vec(),
                };
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                log::warn!("[PROCESS_MANAGER] Error reading {}: {}", stream, e);
                break;
            }
        }
    }
}

fn status_summary(resolution: &SessionResolution) -> String {
    match resolution {
        SessionResolution::Exited {
            exit_code: Some(code),
        } => format!("exit code {}", code),
        SessionResolution::Exited { exit_code: None } => "terminated by signal".to_string(),
        SessionResolution::Errored { error } => format!("error: {}", error),
        SessionResolution::Cancelled => "cancelled".to_string(),
    }
}

fn exit_trailer(summary: &str) -> String {
    format!("\n[{}]\n", summary)
}

#[cfg(unix)]
fn send_interrupt(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    // SAFETY: kill(2) with a pid we spawned and have not yet reaped.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
    if rc != 0 {
        log::warn!(
            "[PROCESS_MANAGER] Failed to interrupt pid {}: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn send_interrupt(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    let result = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(e) = result {
        log::warn!("[PROCESS_MANAGER] Failed to interrupt pid {}: {}", pid, e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    struct Harness {
        manager: ProcessManager,
        exit_rx: mpsc::UnboundedReceiver<ProcessExit>,
        events: mpsc::Receiver<GatewayEvent>,
        dir: tempfile::TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let broadcaster = Arc::new(EventBroadcaster::new());
            let (_client, events) = broadcaster.subscribe();
            let (exit_tx, exit_rx) = mpsc::unbounded_channel();
            Self {
                manager: ProcessManager::new(broadcaster, exit_tx),
                exit_rx,
                events,
                dir: tempfile::tempdir().expect("tempdir"),
            }
        }

        fn session(&self, command: &str, args: &[&str]) -> Session {
            Session::new(
                Some("bd-1".into()),
                command,
                args.iter().map(|a| a.to_string()).collect(),
                self.dir.path().to_path_buf(),
                &self.dir.path().join("logs"),
            )
        }

        async fn exit(&mut self) -> ProcessExit {
            timeout(Duration::from_secs(5), self.exit_rx.recv())
                .await
                .expect("timed out waiting for exit")
                .expect("exit channel closed")
        }

        fn drain_output(&mut self, stream: &str) -> String {
            let mut out = String::new();
            while let Ok(event) = self.events.try_recv() {
                if event.payload["stream"] == stream {
                    out.push_str(event.payload["chunk"].as_str().unwrap_or_default());
                }
            }
            out
        }
    }

    #[tokio::test]
    async fn test_output_goes_to_log_and_events() {
        let mut h = Harness::new();
        let session = h.session(
            "sh",
            &["-c", "printf 'hello\\nwor'; printf 'ld'; sleep 0.1; printf oops >&2"],
        );

        let spawned = h.manager.spawn(&session).unwrap();
        assert!(spawned.pid().is_some());
        let _handle = h.manager.watch(spawned, &session);

        let exit = h.exit().await;
        assert_eq!(exit.session_id, session.id);
        assert_eq!(exit.resolution, SessionResolution::Exited { exit_code: Some(0) });

        let log = std::fs::read_to_string(&session.log_path).unwrap();
        assert!(log.contains("hello\nworld"));
        assert!(log.contains("oops"));
        assert!(log.ends_with("\n[exit code 0]\n"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.drain_output("stdout"), "hello\nworld");
    }

    #[tokio::test]
    async fn test_log_bytes_match_process_output() {
        let mut h = Harness::new();
        let script = "i=0; while [ $i -lt 2000 ]; do echo line-$i; i=$((i+1)); done";
        let session = h.session("sh", &["-c", script]);

        let spawned = h.manager.spawn(&session).unwrap();
        let _handle = h.manager.watch(spawned, &session);
        h.exit().await;

        let expected: String = (0..2000).map(|i| format!("line-{}\n", i)).collect();
        let log = std::fs::read_to_string(&session.log_path).unwrap();
        assert_eq!(log, format!("{}\n[exit code 0]\n", expected));
    }

    #[tokio::test]
    async fn test_nonzero_exit_code_reported() {
        let mut h = Harness::new();
        let session = h.session("sh", &["-c", "exit 7"]);

        let spawned = h.manager.spawn(&session).unwrap();
        let _handle = h.manager.watch(spawned, &session);

        let exit = h.exit().await;
        assert_eq!(exit.resolution, SessionResolution::Exited { exit_code: Some(7) });
        let log = std::fs::read_to_string(&session.log_path).unwrap();
        assert!(log.ends_with("[exit code 7]\n"));
    }

    #[tokio::test]
    async fn test_exit_resolves_while_descendant_holds_output() {
        let mut h = Harness::new();
        let session = h.session("sh", &["-c", "sleep 3 & echo hi"]);

        let started = std::time::Instant::now();
        let spawned = h.manager.spawn(&session).unwrap();
        let _handle = h.manager.watch(spawned, &session);

        let exit = h.exit().await;
        assert_eq!(exit.resolution, SessionResolution::Exited { exit_code: Some(0) });
        assert!(started.elapsed() < Duration::from_millis(2500));

        let log = std::fs::read_to_string(&session.log_path).unwrap();
        assert_eq!(log, "hi\n\n[exit code 0]\n");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_log_write_failure_keeps_output_and_exit_code() {
        let mut h = Harness::new();
        let session = h.session("sh", &["-c", "echo still-streaming; exit 3"]);
        std::fs::create_dir_all(session.log_path.parent().unwrap()).unwrap();
        std::os::unix::fs::symlink("/dev/full", &session.log_path).unwrap();

        let spawned = h.manager.spawn(&session).unwrap();
        let _handle = h.manager.watch(spawned, &session);

        let exit = h.exit().await;
        assert_eq!(exit.resolution, SessionResolution::Exited { exit_code: Some(3) });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.drain_output("stdout"), "still-streaming\n");
    }

    #[tokio::test]
    async fn test_spawn_failure_for_missing_command() {
        let h = Harness::new();
        let session = h.session("definitely-not-a-real-command-xyz", &[]);

        let err = h.manager.spawn(&session).err().expect("spawn should fail");
        assert!(err.contains("definitely-not-a-real-command-xyz"));
        assert!(!session.log_path.exists());
    }

    #[tokio::test]
    async fn test_interrupt_stops_process() {
        let mut h = Harness::new();
        let session = h.session("sleep", &["10"]);

        let spawned = h.manager.spawn(&session).unwrap();
        let handle = h.manager.watch(spawned, &session);
        handle.interrupt();

        let exit = h.exit().await;
        // SIGINT terminates sleep without an exit code
        assert_eq!(exit.resolution, SessionResolution::Exited { exit_code: None });
    }
}
