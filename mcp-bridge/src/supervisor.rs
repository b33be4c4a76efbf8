//! Child process supervisor.
//!
//! Owns the single MCP server process: spawns it, routes its stdout into the
//! correlation table, logs its stderr, runs the handshake after a boot delay,
//! and restarts it after a backoff whenever it exits. `shutdown()` stops the
//! child for good.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::bytes::Bytes;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use crate::bridge::codec::{Frame, JsonLineCodec};
use crate::bridge::protocol::{JsonRpcMessage, MessageKind};
use crate::dispatcher::ChildTransport;
use crate::handshake::HandshakeSequencer;
use crate::health::{ChildInfo, ProcessState};
use crate::state::BridgeState;

/// Drain reason when the child dies under in-flight requests.
pub const EXIT_REASON: &str = "process exited";
/// Drain reason on bridge shutdown.
pub const SHUTDOWN_REASON: &str = "bridge shutting down";

/// Longest slice of an unparseable stdout line that gets logged.
const LOGGED_LINE_LIMIT: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("MCP process not running")]
    NotRunning,
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error("MCP process has no {0} pipe")]
    MissingPipe(&'static str),
    #[error("failed to write to MCP process: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("spawn failed: {0}")]
    Other(String),
}

/// Program, arguments and environment for the child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl ChildCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

/// Extension point for how the child gets started.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, command: &ChildCommand) -> Result<Child, SpawnError>;
}

/// Spawns the child with piped stdio; it inherits the bridge's environment.
pub struct CommandSpawner;

impl ProcessSpawner for CommandSpawner {
    fn spawn(&self, command: &ChildCommand) -> Result<Child, SpawnError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = command.current_dir {
            cmd.current_dir(dir);
        }
        Ok(cmd.spawn()?)
    }
}

pub struct SupervisorConfig {
    pub command: ChildCommand,
    /// Wait between spawn and the handshake.
    pub boot_delay: Duration,
    /// Wait between an exit and the next spawn.
    pub restart_backoff: Duration,
    /// Consecutive restarts without a completed handshake before giving up.
    /// `None` restarts forever.
    pub max_restarts: Option<u32>,
    /// SIGTERM to SIGKILL grace on shutdown.
    pub stop_grace: Duration,
    pub spawner: Arc<dyn ProcessSpawner>,
}

impl SupervisorConfig {
    pub fn new(command: ChildCommand) -> Self {
        Self {
            command,
            boot_delay: Duration::from_millis(800),
            restart_backoff: Duration::from_millis(1500),
            max_restarts: None,
            stop_grace: Duration::from_secs(5),
            spawner: Arc::new(CommandSpawner),
        }
    }

    pub fn with_boot_delay(mut self, delay: Duration) -> Self {
        self.boot_delay = delay;
        self
    }

    pub fn with_restart_backoff(mut self, backoff: Duration) -> Self {
        self.restart_backoff = backoff;
        self
    }

    pub fn with_max_restarts(mut self, max: Option<u32>) -> Self {
        self.max_restarts = max;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.spawner = spawner;
        self
    }
}

struct ChildHandle {
    generation: u64,
    stdin: ChildStdin,
}

pub struct ProcessSupervisor {
    config: SupervisorConfig,
    bridge: Arc<BridgeState>,
    /// Write end of the current child. `None` while no child is running.
    handle: Mutex<Option<ChildHandle>>,
    state: watch::Sender<ProcessState>,
    child: watch::Sender<Option<ChildInfo>>,
    restarts: AtomicU64,
    shutdown: CancellationToken,
    /// Cancelled when the supervise loop has returned.
    finished: CancellationToken,
    started: AtomicBool,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig, bridge: Arc<BridgeState>) -> Arc<Self> {
        Arc::new(Self {
            config,
            bridge,
            handle: Mutex::new(None),
            state: watch::Sender::new(ProcessState::Stopped),
            child: watch::Sender::new(None),
            restarts: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            finished: CancellationToken::new(),
            started: AtomicBool::new(false),
        })
    }

    /// Start supervising. The first spawn happens immediately.
    pub fn start(self: &Arc<Self>, handshake: Arc<HandshakeSequencer>) -> JoinHandle<()> {
        self.started.store(true, Ordering::Release);
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            let _finished = supervisor.finished.clone().drop_guard();
            supervisor.supervise(handshake).await
        })
    }

    pub fn process_state(&self) -> ProcessState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.process_state().is_running()
    }

    pub fn child_info(&self) -> Option<ChildInfo> {
        self.child.borrow().clone()
    }

    /// Restarts scheduled since startup.
    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Acquire)
    }

    /// Write one frame to the current child's stdin.
    pub async fn write(&self, frame: &[u8]) -> Result<(), SupervisorError> {
        let mut guard = self.handle.lock().await;
        let handle = guard.as_mut().ok_or(SupervisorError::NotRunning)?;
        if let Err(e) = write_frame(&mut handle.stdin, frame).await {
            tracing::warn!(generation = handle.generation, error = %e, "Write to MCP process failed");
            return Err(e.into());
        }
        Ok(())
    }

    /// Stop the child and the restart loop. Pending requests are drained.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down MCP process");
        self.shutdown.cancel();

        if self.started.load(Ordering::Acquire) {
            let stopped = tokio::time::timeout(
                self.config.stop_grace + Duration::from_secs(1),
                self.finished.cancelled(),
            )
            .await
            .is_ok();
            if !stopped {
                tracing::warn!("Timed out waiting for MCP supervisor to stop");
            }
        }

        self.release(SHUTDOWN_REASON).await;
        self.set_state(ProcessState::Stopped);
    }

    async fn supervise(self: Arc<Self>, handshake: Arc<HandshakeSequencer>) {
        let mut generation: u64 = 0;
        let mut unready_runs: u32 = 0;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            generation += 1;
            self.set_state(ProcessState::Starting);

            let was_ready = match self.launch(generation).await {
                Ok(mut child) => {
                    self.set_state(ProcessState::Running);
                    let boot = self.schedule_handshake(Arc::clone(&handshake), generation);

                    let exit = tokio::select! {
                        status = child.wait() => Some(status),
                        _ = self.shutdown.cancelled() => None,
                    };
                    boot.abort();

                    match exit {
                        Some(Ok(status)) => {
                            tracing::warn!(generation, %status, "MCP process exited");
                        }
                        Some(Err(e)) => {
                            tracing::error!(generation, error = %e, "Failed to wait on MCP process");
                        }
                        None => {
                            self.terminate(&mut child, generation).await;
                            break;
                        }
                    }
                    self.on_exit().await
                }
                Err(e) => {
                    tracing::error!(generation, error = %e, "Failed to start MCP process");
                    self.on_exit().await
                }
            };

            unready_runs = if was_ready { 0 } else { unready_runs + 1 };
            if let Some(max) = self.config.max_restarts
                && unready_runs > max
            {
                tracing::error!(
                    max_restarts = max,
                    "MCP process keeps failing before becoming ready; giving up"
                );
                break;
            }

            self.restarts.fetch_add(1, Ordering::AcqRel);
            tracing::info!(
                backoff_ms = self.config.restart_backoff.as_millis() as u64,
                "Restarting MCP process after backoff"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.config.restart_backoff) => {}
                _ = self.shutdown.cancelled() => break,
            }
        }

        self.release(SHUTDOWN_REASON).await;
        self.set_state(ProcessState::Stopped);
        tracing::info!("MCP supervisor stopped");
    }

    async fn launch(&self, generation: u64) -> Result<Child, SupervisorError> {
        let mut child = self.config.spawner.spawn(&self.config.command)?;
        let stdin = child.stdin.take().ok_or(SupervisorError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(SupervisorError::MissingPipe("stdout"))?;

        let info = ChildInfo::new(child.id(), generation);
        tracing::info!(
            pid = ?info.pid,
            generation,
            program = %self.config.command.program.display(),
            "MCP process started"
        );

        tokio::spawn(read_stdout(stdout, Arc::clone(&self.bridge), generation));
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(stderr, generation));
        }

        *self.handle.lock().await = Some(ChildHandle { generation, stdin });
        self.child.send_replace(Some(info));
        Ok(child)
    }

    fn schedule_handshake(
        &self,
        handshake: Arc<HandshakeSequencer>,
        generation: u64,
    ) -> JoinHandle<()> {
        let delay = self.config.boot_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = handshake.run().await {
                tracing::warn!(generation, error = %e, "MCP handshake failed; bridge stays not ready");
            }
        })
    }

    /// Bookkeeping after the child died. Returns whether it had become ready.
    async fn on_exit(&self) -> bool {
        let was_ready = self.bridge.set_initialized(false);
        self.handle.lock().await.take();
        self.child.send_replace(None);
        self.set_state(ProcessState::Exited);
        let drained = self.bridge.pending().drain_all(EXIT_REASON);
        if drained > 0 {
            tracing::warn!(drained, "Failed in-flight requests after MCP process exit");
        }
        was_ready
    }

    async fn release(&self, reason: &str) {
        self.bridge.set_initialized(false);
        self.handle.lock().await.take();
        self.child.send_replace(None);
        self.bridge.pending().drain_all(reason);
    }

    async fn terminate(&self, child: &mut Child, generation: u64) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    Ok(()) => {
                        if tokio::time::timeout(self.config.stop_grace, child.wait())
                            .await
                            .is_ok()
                        {
                            tracing::info!(generation, "MCP process terminated");
                            return;
                        }
                        tracing::warn!(generation, "MCP process ignored SIGTERM; killing");
                    }
                    Err(e) => tracing::debug!(generation, error = %e, "SIGTERM failed"),
                }
            }
        }

        if let Err(e) = child.kill().await {
            tracing::warn!(generation, error = %e, "Failed to kill MCP process");
        }
    }

    fn set_state(&self, state: ProcessState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(?previous, ?state, "MCP process state changed");
        }
    }
}

#[async_trait]
impl ChildTransport for ProcessSupervisor {
    async fn write(&self, frame: Bytes) -> Result<(), SupervisorError> {
        ProcessSupervisor::write(self, &frame).await
    }

    fn state(&self) -> ProcessState {
        self.process_state()
    }

    fn restarts(&self) -> u64 {
        ProcessSupervisor::restarts(self)
    }

    fn child_info(&self) -> Option<ChildInfo> {
        ProcessSupervisor::child_info(self)
    }

    async fn shutdown(&self) {
        ProcessSupervisor::shutdown(self).await
    }
}

async fn write_frame(stdin: &mut ChildStdin, frame: &[u8]) -> std::io::Result<()> {
    stdin.write_all(frame).await?;
    stdin.flush().await
}

async fn read_stdout(stdout: ChildStdout, bridge: Arc<BridgeState>, generation: u64) {
    let mut reader = FramedRead::new(stdout, JsonLineCodec::new());

    while let Some(frame) = reader.next().await {
        match frame {
            Ok(Frame::Message(message)) => route_message(&bridge, message),
            Ok(Frame::Malformed { line, error }) => {
                tracing::warn!(
                    generation,
                    %error,
                    line = %truncate(&line, LOGGED_LINE_LIMIT),
                    "Dropping unparseable line from MCP process"
                );
            }
            Ok(Frame::Oversized) => {
                tracing::warn!(generation, "Dropping oversized line from MCP process");
            }
            Err(e) => {
                tracing::error!(generation, error = %e, "Error reading MCP process stdout");
                break;
            }
        }
    }

    tracing::debug!(generation, "MCP process stdout closed");
}

async fn log_stderr(stderr: ChildStderr, generation: u64) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::warn!(target: "mcp_bridge::child", generation, "{}", line);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(generation, error = %e, "Error reading MCP process stderr");
                break;
            }
        }
    }
}

/// Deliver one message from the child.
pub(crate) fn route_message(bridge: &BridgeState, message: JsonRpcMessage) {
    match message.kind() {
        MessageKind::Response => {
            if let Some(id) = message.id
                && !bridge.pending().complete(id, message)
            {
                tracing::debug!(id, "Discarding response with no pending request");
            }
        }
        MessageKind::Notification => {
            tracing::debug!(
                method = message.method.as_deref().unwrap_or(""),
                "Notification from MCP process"
            );
        }
        MessageKind::Request => {
            tracing::warn!(
                method = message.method.as_deref().unwrap_or(""),
                id = ?message.id,
                "Ignoring request from MCP process"
            );
        }
        MessageKind::Invalid => {
            tracing::warn!("Ignoring message with neither id nor method");
        }
    }
}

fn truncate(line: &str, limit: usize) -> &str {
    if line.len() <= limit {
        return line;
    }
    let mut end = limit;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::HandshakeConfig;
    use crate::normalize::Normalizer;
    use crate::correlation::CallError;
    use crate::dispatcher::{DispatchError, Dispatcher};
    use serde_json::json;

    #[test]
    fn response_completes_pending_request() {
        let bridge = BridgeState::new();
        let _completion = bridge.pending().register(3, Duration::from_secs(5)).unwrap();

        route_message(&bridge, JsonRpcMessage::response(3, json!({"ok": true})));
        assert!(bridge.pending().is_empty());
    }

    #[test]
    fn unmatched_and_unsolicited_messages_are_dropped() {
        let bridge = BridgeState::new();
        let _completion = bridge.pending().register(3, Duration::from_secs(5)).unwrap();

        route_message(&bridge, JsonRpcMessage::response(99, json!({})));
        route_message(
            &bridge,
            JsonRpcMessage::notification("notifications/progress", Some(json!({"progress": 1}))),
        );
        route_message(&bridge, JsonRpcMessage::request("sampling/createMessage", json!({})).with_id(3));

        // the child's request reused id 3 but is not a response
        assert!(bridge.pending().contains(3));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("错误错误", 4), "错");
    }

    #[test]
    fn child_command_builder() {
        let command = ChildCommand::new("/usr/bin/server")
            .with_args(["--stdio", "-v"])
            .with_env("MODE", "test")
            .with_current_dir("/tmp");
        assert_eq!(command.args, vec!["--stdio", "-v"]);
        assert_eq!(command.env, vec![("MODE".to_string(), "test".to_string())]);
        assert_eq!(command.current_dir, Some(PathBuf::from("/tmp")));
    }

    #[tokio::test]
    async fn write_without_child_is_not_running() {
        let supervisor = ProcessSupervisor::new(
            SupervisorConfig::new(ChildCommand::new("unused")),
            Arc::new(BridgeState::new()),
        );
        assert_eq!(supervisor.process_state(), ProcessState::Stopped);
        let err = supervisor.write(b"{}\n").await.unwrap_err();
        assert!(matches!(err, SupervisorError::NotRunning));
        assert_eq!(err.to_string(), "MCP process not running");
    }

    #[tokio::test]
    async fn shutdown_before_start_is_immediate() {
        let supervisor = ProcessSupervisor::new(
            SupervisorConfig::new(ChildCommand::new("unused")),
            Arc::new(BridgeState::new()),
        );
        supervisor.shutdown().await;
        assert_eq!(supervisor.process_state(), ProcessState::Stopped);
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        /// Answers every request with `{"ok":true}`; exits with 3 on method "crash".
        const SERVER_SCRIPT: &str = r#"
echo "booting"
echo "server ready" >&2
while IFS= read -r line; do
  case "$line" in
    *'"method":"crash"'*) exit 3 ;;
  esac
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  if [ -n "$id" ]; then
    printf '{"jsonrpc":"2.0","id":%s,"result":{"ok":true}}\n' "$id"
  fi
done
"#;

        struct Harness {
            bridge: Arc<BridgeState>,
            supervisor: Arc<ProcessSupervisor>,
            dispatcher: Arc<Dispatcher>,
            task: JoinHandle<()>,
        }

        fn harness(command: ChildCommand, max_restarts: Option<u32>) -> Harness {
            let bridge = Arc::new(BridgeState::new());
            let supervisor = ProcessSupervisor::new(
                SupervisorConfig::new(command)
                    .with_boot_delay(Duration::from_millis(10))
                    .with_restart_backoff(Duration::from_millis(100))
                    .with_max_restarts(max_restarts)
                    .with_stop_grace(Duration::from_secs(1)),
                Arc::clone(&bridge),
            );
            let dispatcher = Dispatcher::spawn(
                Arc::clone(&bridge),
                Arc::clone(&supervisor) as Arc<dyn ChildTransport>,
                Normalizer::default(),
            );
            let handshake = Arc::new(HandshakeSequencer::new(
                Arc::clone(&dispatcher),
                Arc::clone(&bridge),
                HandshakeConfig::default().with_timeout(Duration::from_secs(5)),
            ));
            let task = supervisor.start(handshake);
            Harness {
                bridge,
                supervisor,
                dispatcher,
                task,
            }
        }

        fn sh_server() -> ChildCommand {
            ChildCommand::new("sh").with_args(["-c", SERVER_SCRIPT])
        }

        async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
            let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
            while !condition() {
                assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        #[tokio::test]
        async fn handshake_then_calls() {
            let h = harness(sh_server(), None);
            wait_until("initialized", || h.bridge.is_initialized()).await;

            assert!(h.supervisor.is_running());
            let info = h.supervisor.child_info().unwrap();
            assert_eq!(info.generation, 1);
            assert!(info.pid.is_some());

            let response = h
                .dispatcher
                .call(
                    JsonRpcMessage::request("tools/list", json!({})),
                    Duration::from_secs(5),
                )
                .await
                .unwrap();
            assert_eq!(response.result, Some(json!({"ok": true})));

            h.supervisor.shutdown().await;
            assert_eq!(h.supervisor.process_state(), ProcessState::Stopped);
            assert!(!h.bridge.is_initialized());
            assert!(h.supervisor.child_info().is_none());
        }

        #[tokio::test]
        async fn crash_drains_in_flight_and_restarts() {
            let h = harness(sh_server(), None);
            wait_until("initialized", || h.bridge.is_initialized()).await;

            let err = h
                .dispatcher
                .call(
                    JsonRpcMessage::request("crash", json!({})),
                    Duration::from_secs(5),
                )
                .await
                .unwrap_err();
            match err {
                DispatchError::Call(CallError::Drained(reason)) => assert_eq!(reason, EXIT_REASON),
                other => panic!("expected drain, got {other:?}"),
            }
            assert!(h.bridge.pending().is_empty());

            wait_until("restart", || {
                h.supervisor.child_info().is_some_and(|c| c.generation == 2)
                    && h.bridge.is_initialized()
            })
            .await;
            assert_eq!(h.supervisor.restarts(), 1);

            h.supervisor.shutdown().await;
        }

        #[tokio::test]
        async fn gives_up_after_max_restarts() {
            let h = harness(ChildCommand::new("sh").with_args(["-c", "exit 1"]), Some(1));

            tokio::time::timeout(Duration::from_secs(10), h.task)
                .await
                .expect("supervisor should give up")
                .unwrap();
            assert_eq!(h.supervisor.restarts(), 1);
            assert_eq!(h.supervisor.process_state(), ProcessState::Stopped);
            assert!(!h.bridge.is_initialized());
        }

        #[tokio::test]
        async fn missing_program_counts_as_failed_run() {
            let h = harness(ChildCommand::new("/nonexistent/mcp-server"), Some(0));

            tokio::time::timeout(Duration::from_secs(10), h.task)
                .await
                .expect("supervisor should give up")
                .unwrap();
            assert_eq!(h.supervisor.restarts(), 0);
            assert_eq!(h.supervisor.process_state(), ProcessState::Stopped);

            let err = h
                .dispatcher
                .call(
                    JsonRpcMessage::request("tools/list", json!({})),
                    Duration::from_secs(1),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, DispatchError::Transport(SupervisorError::NotRunning)));
        }

        #[tokio::test]
        async fn shutdown_during_startup_waits_for_supervisor() {
            let h = harness(sh_server(), None);
            tokio::task::yield_now().await;

            h.supervisor.shutdown().await;
            assert!(h.supervisor.finished.is_cancelled());
            assert_eq!(h.supervisor.process_state(), ProcessState::Stopped);
            assert!(h.supervisor.child_info().is_none());

            tokio::time::timeout(Duration::from_secs(1), h.task)
                .await
                .expect("supervise task already returned")
                .unwrap();
        }

        #[tokio::test]
        async fn shutdown_stops_restarts() {
            let h = harness(sh_server(), None);
            wait_until("initialized", || h.bridge.is_initialized()).await;

            h.supervisor.shutdown().await;
            tokio::time::sleep(Duration::from_millis(300)).await;

            assert_eq!(h.supervisor.process_state(), ProcessState::Stopped);
            assert_eq!(h.supervisor.restarts(), 0);
            assert!(h.supervisor.child_info().is_none());
        }
    }
}
