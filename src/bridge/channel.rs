//! Line-framed channel to a single child worker process.
//!
//! # Responsibilities
//! - Spawn the worker with piped stdio and out-of-band configuration
//! - Serialize request/response exchanges (one in flight at a time)
//! - Detect worker death, EOF and unresponsiveness
//! - Graceful close: end-of-input, drain, wait, kill on deadline
//!
//! # Cancellation
//! Once an exchange holds the channel lock it runs in its own task until the
//! response line is read or the worker faults. Dropping the caller's future
//! only discards the result; the pipe never keeps an unread response.
//!
//! # State Machine
//! ```text
//! open() ──▶ Running ──exchange() fault──▶ Terminated
//!               │
//!               └────────close()─────────▶ Closed
//! ```

use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::bridge::error::{BridgeError, BridgeResult};

/// Observable channel state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Running = 0,
    Terminated = 1,
    Closed = 2,
}

impl From<u8> for ChannelStatus {
    fn from(val: u8) -> Self {
        match val {
            0 => ChannelStatus::Running,
            1 => ChannelStatus::Terminated,
            _ => ChannelStatus::Closed,
        }
    }
}

/// Tunables for a [`ProcessChannel`].
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Upper bound on waiting for a response line. `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// How long `close()` waits for the worker to exit before killing it.
    pub shutdown_timeout: Duration,
    /// Start the worker with an empty environment plus the supplied vars.
    pub clear_env: bool,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            read_timeout: None,
            shutdown_timeout: Duration::from_secs(10),
            clear_env: false,
        }
    }
}

struct WorkerIo {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

enum ChannelState {
    Running(WorkerIo),
    Terminated(Option<String>),
    Closed,
}

/// Exclusive, line-oriented connection to one worker process.
pub struct ProcessChannel {
    program: String,
    pid: Option<u32>,
    state: Arc<Mutex<ChannelState>>,
    counters: Arc<Counters>,
    options: ChannelOptions,
}

impl ProcessChannel {
    /// Spawn `command` and take ownership of its stdio.
    ///
    /// `env` is added to the child's environment and is never logged.
    /// Must be called from within a Tokio runtime.
    pub fn open(
        command: &str,
        args: &[String],
        env: &[(String, String)],
        options: ChannelOptions,
    ) -> BridgeResult<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if options.clear_env {
            cmd.env_clear();
        }
        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| BridgeError::Spawn {
            program: command.to_string(),
            source,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Construction("worker stdin was not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Construction("worker stdout was not captured".into()))?;

        if let Some(stderr) = child.stderr.take() {
            let worker = command.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::info!(target: "payment_bridge::worker", worker = %worker, "{}", line);
                }
            });
        }

        let pid = child.id();
        tracing::info!(program = %command, pid = ?pid, "Worker process started");

        Ok(Self {
            program: command.to_string(),
            pid,
            state: Arc::new(Mutex::new(ChannelState::Running(WorkerIo {
                child,
                stdin,
                stdout: BufReader::new(stdout),
            }))),
            counters: Arc::new(Counters {
                status: AtomicU8::new(ChannelStatus::Running as u8),
                exchanges: AtomicU64::new(0),
            }),
            options,
        })
    }

    /// Write one line and read one line back, holding the channel lock
    /// for the whole round trip.
    ///
    /// Suspends until the worker answers, dies, or the read timeout fires.
    /// The round trip itself runs in a spawned task, so it completes even if
    /// this future is dropped while waiting for the response.
    pub async fn exchange(&self, payload: &str) -> BridgeResult<String> {
        if payload.contains('\n') {
            return Err(BridgeError::Protocol("outbound payload contains a newline".into()));
        }

        let state = self.state.clone().lock_owned().await;
        let task = tokio::spawn(exchange_locked(
            state,
            payload.to_string(),
            self.counters.clone(),
            self.program.clone(),
            self.pid,
            self.options.read_timeout,
        ));

        match task.await {
            Ok(result) => result,
            Err(e) => Err(BridgeError::Io(std::io::Error::other(e))),
        }
    }

    /// Signal end-of-input, drain remaining output and wait for exit.
    ///
    /// Idempotent. A worker that outlives `shutdown_timeout` is killed.
    pub async fn close(&self) -> BridgeResult<()> {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, ChannelState::Closed);
        self.counters.set_status(ChannelStatus::Closed);

        let WorkerIo { mut child, stdin, mut stdout } = match previous {
            ChannelState::Running(io) => io,
            ChannelState::Terminated(_) | ChannelState::Closed => return Ok(()),
        };
        drop(stdin);

        let mut trailing = Vec::new();
        let drain = async {
            stdout.read_to_end(&mut trailing).await?;
            Ok::<_, std::io::Error>(child.wait().await?)
        };
        let outcome = tokio::time::timeout(self.options.shutdown_timeout, drain).await;

        if !trailing.is_empty() {
            tracing::debug!(bytes = trailing.len(), "Discarded trailing worker output");
        }

        match outcome {
            Ok(Ok(status)) => {
                tracing::info!(program = %self.program, status = %status, "Worker process exited");
                Ok(())
            }
            Ok(Err(e)) => Err(BridgeError::Io(e)),
            Err(_) => {
                tracing::warn!(
                    program = %self.program,
                    timeout = ?self.options.shutdown_timeout,
                    "Worker did not exit in time, killing"
                );
                child.kill().await.map_err(BridgeError::Io)
            }
        }
    }

    /// Kill the worker immediately. No-op unless running.
    pub async fn terminate(&self) {
        let mut state = self.state.lock().await;
        if !matches!(&*state, ChannelState::Running(_)) {
            return;
        }
        if let ChannelState::Running(mut io) = std::mem::replace(&mut *state, ChannelState::Terminated(None)) {
            if let Err(e) = io.child.kill().await {
                tracing::warn!(program = %self.program, error = %e, "Failed to kill worker");
            }
            let exit_status = io.child.try_wait().ok().flatten().map(|s| s.to_string());
            *state = ChannelState::Terminated(exit_status);
        }
        self.counters.set_status(ChannelStatus::Terminated);
    }

    pub fn status(&self) -> ChannelStatus {
        ChannelStatus::from(self.counters.status.load(Ordering::Relaxed))
    }

    /// Number of completed round trips.
    pub fn exchanges(&self) -> u64 {
        self.counters.exchanges.load(Ordering::Relaxed)
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl std::fmt::Debug for ProcessChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessChannel")
            .field("program", &self.program)
            .field("pid", &self.pid)
            .field("status", &self.status())
            .field("exchanges", &self.exchanges())
            .finish()
    }
}

struct Counters {
    status: AtomicU8,
    exchanges: AtomicU64,
}

impl Counters {
    fn set_status(&self, status: ChannelStatus) {
        self.status.store(status as u8, Ordering::Relaxed);
    }
}

async fn exchange_locked(
    mut state: OwnedMutexGuard<ChannelState>,
    payload: String,
    counters: Arc<Counters>,
    program: String,
    pid: Option<u32>,
    read_timeout: Option<Duration>,
) -> BridgeResult<String> {
    let io = match &mut *state {
        ChannelState::Running(io) => io,
        ChannelState::Terminated(status) => return Err(BridgeError::WorkerTerminated(status.clone())),
        ChannelState::Closed => return Err(BridgeError::BridgeClosed),
    };

    let result = round_trip(io, &payload, read_timeout).await;

    match &result {
        Ok(_) => {
            counters.exchanges.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) if err.is_transport_fault() => {
            let exit_status = match std::mem::replace(&mut *state, ChannelState::Terminated(None)) {
                ChannelState::Running(mut io) => io
                    .child
                    .try_wait()
                    .ok()
                    .flatten()
                    .map(|status| status.to_string()),
                _ => None,
            };
            tracing::error!(
                program = %program,
                pid = ?pid,
                error = %err,
                exit_status = ?exit_status,
                "Worker channel failed"
            );
            *state = ChannelState::Terminated(exit_status);
            counters.set_status(ChannelStatus::Terminated);
        }
        Err(_) => {}
    }

    result
}

async fn round_trip(
    io: &mut WorkerIo,
    payload: &str,
    read_timeout: Option<Duration>,
) -> BridgeResult<String> {
    if let Some(status) = io.child.try_wait()? {
        return Err(BridgeError::WorkerTerminated(Some(status.to_string())));
    }

    io.stdin.write_all(payload.as_bytes()).await.map_err(pipe_error)?;
    io.stdin.write_all(b"\n").await.map_err(pipe_error)?;
    io.stdin.flush().await.map_err(pipe_error)?;

    if let Some(status) = io.child.try_wait()? {
        return Err(BridgeError::WorkerTerminated(Some(status.to_string())));
    }

    let mut line = String::new();
    let read = io.stdout.read_line(&mut line);
    let n = match read_timeout {
        Some(limit) => match tokio::time::timeout(limit, read).await {
            Ok(result) => result.map_err(pipe_error)?,
            Err(_) => {
                let _ = io.child.start_kill();
                return Err(BridgeError::WorkerUnresponsive(limit));
            }
        },
        None => read.await.map_err(pipe_error)?,
    };

    // EOF, or a partial line cut off by EOF.
    if n == 0 || !line.ends_with('\n') {
        let status = io.child.try_wait().ok().flatten().map(|s| s.to_string());
        return Err(BridgeError::WorkerTerminated(status));
    }

    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);
    Ok(line)
}

fn pipe_error(e: std::io::Error) -> BridgeError {
    match e.kind() {
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof => {
            BridgeError::WorkerTerminated(None)
        }
        ErrorKind::InvalidData => BridgeError::Protocol("worker emitted invalid UTF-8".into()),
        _ => BridgeError::Io(e),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let channel = ProcessChannel::open("cat", &[], &[], ChannelOptions::default()).unwrap();
        assert_eq!(channel.status(), ChannelStatus::Running);

        let line = channel.exchange(r#"{"request_id":1}"#).await.unwrap();
        assert_eq!(line, r#"{"request_id":1}"#);
        let line = channel.exchange("second").await.unwrap();
        assert_eq!(line, "second");
        assert_eq!(channel.exchanges(), 2);

        channel.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_embedded_newline() {
        let channel = ProcessChannel::open("cat", &[], &[], ChannelOptions::default()).unwrap();
        let err = channel.exchange("a\nb").await.unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
        // Nothing was written; the channel is still healthy.
        assert_eq!(channel.status(), ChannelStatus::Running);
        assert_eq!(channel.exchange("ok").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_environment_is_passed_out_of_band() {
        let env = vec![("PAYMENT_CONFIGURATION".to_string(), r#"[{"name":"test"}]"#.to_string())];
        let channel = ProcessChannel::open(
            "sh",
            &sh(r#"while read line; do echo "$PAYMENT_CONFIGURATION"; done"#),
            &env,
            ChannelOptions::default(),
        )
        .unwrap();
        let line = channel.exchange("ping").await.unwrap();
        assert_eq!(line, r#"[{"name":"test"}]"#);
    }

    #[tokio::test]
    async fn test_spawn_error() {
        let err = ProcessChannel::open(
            "/nonexistent/payment-worker",
            &[],
            &[],
            ChannelOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_exited_worker_is_detected() {
        let channel =
            ProcessChannel::open("sh", &sh("exit 3"), &[], ChannelOptions::default()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let err = channel.exchange("hello").await.unwrap_err();
        assert!(matches!(err, BridgeError::WorkerTerminated(_)), "got {err:?}");
        assert_eq!(channel.status(), ChannelStatus::Terminated);

        // Fails fast from now on.
        let err = channel.exchange("again").await.unwrap_err();
        assert!(matches!(err, BridgeError::WorkerTerminated(_)));
        assert_eq!(channel.exchanges(), 0);
    }

    #[tokio::test]
    async fn test_read_timeout_marks_worker_unresponsive() {
        let options = ChannelOptions {
            read_timeout: Some(Duration::from_millis(200)),
            ..ChannelOptions::default()
        };
        let channel =
            ProcessChannel::open("sh", &sh("while read line; do :; done"), &[], options).unwrap();

        let err = channel.exchange("hello").await.unwrap_err();
        assert!(matches!(err, BridgeError::WorkerUnresponsive(_)));
        assert_eq!(channel.status(), ChannelStatus::Terminated);
    }

    #[tokio::test]
    async fn test_abandoned_exchange_still_consumes_its_response() {
        let channel = ProcessChannel::open(
            "sh",
            &sh(r#"while read line; do sleep 1; echo "$line"; done"#),
            &[],
            ChannelOptions::default(),
        )
        .unwrap();

        let abandoned = tokio::time::timeout(Duration::from_millis(200), channel.exchange("first")).await;
        assert!(abandoned.is_err());

        // Waits for the first round trip to finish, then gets its own line.
        assert_eq!(channel.exchange("second").await.unwrap(), "second");
        assert_eq!(channel.status(), ChannelStatus::Running);
        assert_eq!(channel.exchanges(), 2);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let channel = ProcessChannel::open("cat", &[], &[], ChannelOptions::default()).unwrap();
        channel.close().await.unwrap();
        channel.close().await.unwrap();
        assert_eq!(channel.status(), ChannelStatus::Closed);

        let err = channel.exchange("late").await.unwrap_err();
        assert!(matches!(err, BridgeError::BridgeClosed));
    }

    #[tokio::test]
    async fn test_close_kills_worker_that_ignores_eof() {
        let options = ChannelOptions {
            shutdown_timeout: Duration::from_millis(200),
            ..ChannelOptions::default()
        };
        let channel = ProcessChannel::open("sh", &sh("exec sleep 30"), &[], options).unwrap();
        channel.close().await.unwrap();
        assert_eq!(channel.status(), ChannelStatus::Closed);
    }

    #[tokio::test]
    async fn test_terminate() {
        let channel = ProcessChannel::open("cat", &[], &[], ChannelOptions::default()).unwrap();
        channel.terminate().await;
        assert_eq!(channel.status(), ChannelStatus::Terminated);
        assert!(channel.exchange("x").await.is_err());
        // Closing a terminated channel still succeeds.
        channel.close().await.unwrap();
    }
}
