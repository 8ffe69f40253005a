//! Gateway running as a child process.
//!
//! # Responsibilities
//! - Resolve and spawn the gateway program
//! - Stream stdout/stderr line by line into the log buffer (and the parent's streams)
//! - Own the `Child` in a watcher task that reports its exit exactly once

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::gateway::path::{resolve_program, SearchPathResolver};
use crate::gateway::shutdown::{shutdown_child, DEFAULT_STOP_GRACE};
use crate::gateway::supervisor::{ExitReport, GatewayError, GatewayHandle, LaunchSpec};
use crate::logs::{LogBuffer, LogKind};

/// How long to wait for output readers to drain after the child exits.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Settings for launching the gateway as a child process.
#[derive(Clone)]
pub struct ProcessLaunch {
    pub program: String,
    /// Arguments; `{config}` and `{port}` are substituted at launch.
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub forward_output: bool,
    pub resolver: Arc<dyn SearchPathResolver>,
}

impl std::fmt::Debug for ProcessLaunch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessLaunch")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &self.env)
            .field("forward_output", &self.forward_output)
            .finish_non_exhaustive()
    }
}

impl ProcessLaunch {
    /// Arguments with placeholders filled in for `spec`.
    pub fn render_args(&self, spec: &LaunchSpec) -> Vec<String> {
        let config = spec.config_path.display().to_string();
        let port = spec.port.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace("{config}", &config).replace("{port}", &port))
            .collect()
    }
}

struct StopRequest {
    grace: Duration,
    done: oneshot::Sender<ExitReport>,
}

/// Handle to a running gateway child process.
pub struct ChildGateway {
    pid: Option<u32>,
    stop_tx: Option<oneshot::Sender<StopRequest>>,
}

impl ChildGateway {
    /// Spawn the gateway. Its exit is reported once on `exit_tx`.
    pub fn spawn(
        launch: &ProcessLaunch,
        spec: &LaunchSpec,
        logs: LogBuffer,
        exit_tx: oneshot::Sender<ExitReport>,
    ) -> Result<Self, GatewayError> {
        let search_path = launch.resolver.search_path();
        let program = resolve_program(&launch.program, search_path.as_deref()).map_err(|source| {
            GatewayError::Resolve {
                program: launch.program.clone(),
                source,
            }
        })?;
        let args = launch.render_args(spec);

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .envs(&launch.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = &search_path {
            cmd.env("PATH", path);
        }

        let mut child = cmd.spawn().map_err(GatewayError::Spawn)?;
        let pid = child.id();

        tracing::info!(
            program = %program.display(),
            ?args,
            pid,
            port = spec.port,
            "Gateway process spawned"
        );

        let readers = spawn_log_readers(&mut child, &logs, launch.forward_output);
        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(watch_child(child, readers, stop_rx, exit_tx));

        Ok(Self {
            pid,
            stop_tx: Some(stop_tx),
        })
    }
}

#[async_trait]
impl GatewayHandle for ChildGateway {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn kind(&self) -> &'static str {
        "process"
    }

    async fn stop(&mut self, grace: Duration) -> Result<(), GatewayError> {
        let Some(stop_tx) = self.stop_tx.take() else {
            return Ok(());
        };

        let (done_tx, done_rx) = oneshot::channel();
        if stop_tx.send(StopRequest { grace, done: done_tx }).is_err() {
            // Watcher already saw the exit
            return Ok(());
        }

        match done_rx.await {
            Ok(report) => {
                tracing::info!(pid = self.pid, status = %report.description, "Gateway process stopped");
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }
}

enum WatchEvent {
    Exited(io::Result<ExitStatus>),
    Stop(Option<StopRequest>),
}

async fn watch_child(
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    mut stop_rx: oneshot::Receiver<StopRequest>,
    exit_tx: oneshot::Sender<ExitReport>,
) {
    let event = tokio::select! {
        status = child.wait() => WatchEvent::Exited(status),
        request = &mut stop_rx => WatchEvent::Stop(request.ok()),
    };

    let (status, reply) = match event {
        WatchEvent::Exited(status) => (status, None),
        WatchEvent::Stop(request) => {
            let grace = request.as_ref().map_or(DEFAULT_STOP_GRACE, |r| r.grace);
            let status = shutdown_child(&mut child, grace).await;
            (status, request.map(|r| r.done))
        }
    };

    for reader in readers {
        let _ = tokio::time::timeout(READER_DRAIN_TIMEOUT, reader).await;
    }

    let report = match status {
        Ok(status) => ExitReport::from_status(status),
        Err(e) => ExitReport {
            code: None,
            description: format!("wait failed: {e}"),
        },
    };

    let _ = exit_tx.send(report.clone());
    if let Some(done) = reply {
        let _ = done.send(report);
    }
}

fn spawn_log_readers(child: &mut Child, logs: &LogBuffer, forward: bool) -> Vec<JoinHandle<()>> {
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(read_lines(stdout, logs.clone(), LogKind::Stdout, forward)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(read_lines(stderr, logs.clone(), LogKind::Stderr, forward)));
    }
    readers
}

/// Reads raw bytes per line; invalid UTF-8 is decoded lossily so the pipe stays drained.
async fn read_lines<R>(stream: R, logs: LogBuffer, kind: LogKind, forward: bool)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf: Vec<u8> = Vec::with_capacity(1024);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                if forward {
                    forward_line(kind, &line).await;
                }
                logs.push(kind, line);
            }
            Err(e) => {
                tracing::warn!(?kind, error = %e, "Gateway output read failed");
                break;
            }
        }
    }
    tracing::debug!(?kind, "Gateway output reader exiting");
}

async fn forward_line(kind: LogKind, line: &str) {
    let mut bytes = Vec::with_capacity(line.len() + 1);
    bytes.extend_from_slice(line.as_bytes());
    bytes.push(b'\n');

    let _ = match kind {
        LogKind::Stderr => tokio::io::stderr().write_all(&bytes).await,
        _ => tokio::io::stdout().write_all(&bytes).await,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::path::InheritedSearchPath;
    use std::path::PathBuf;

    fn launch(program: &str, args: &[&str]) -> ProcessLaunch {
        ProcessLaunch {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: BTreeMap::new(),
            forward_output: false,
            resolver: Arc::new(InheritedSearchPath),
        }
    }

    fn spec() -> LaunchSpec {
        LaunchSpec {
            config_path: PathBuf::from("/tmp/gateway.json"),
            port: 9851,
        }
    }

    #[test]
    fn placeholders_are_substituted() {
        let launch = launch("gateway", &["--config", "{config}", "--port={port}"]);
        assert_eq!(
            launch.render_args(&spec()),
            vec!["--config", "/tmp/gateway.json", "--port=9851"]
        );
    }

    #[test]
    fn unknown_program_fails_to_resolve() {
        let (exit_tx, _exit_rx) = oneshot::channel();
        let result = ChildGateway::spawn(
            &launch("definitely-not-a-gateway-binary", &[]),
            &spec(),
            LogBuffer::new(10),
            exit_tx,
        );
        assert!(matches!(result, Err(GatewayError::Resolve { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_output_and_reports_exit() {
        let logs = LogBuffer::new(100);
        let (exit_tx, exit_rx) = oneshot::channel();
        let _gateway = ChildGateway::spawn(
            &launch("sh", &["-c", "echo hello; echo oops >&2; exit 3"]),
            &spec(),
            logs.clone(),
            exit_tx,
        )
        .unwrap();

        let report = tokio::time::timeout(Duration::from_secs(5), exit_rx).await.unwrap().unwrap();
        assert_eq!(report.code, Some(3));

        let entries = logs.snapshot();
        assert!(entries.iter().any(|e| e.kind == LogKind::Stdout && e.line == "hello"));
        assert!(entries.iter().any(|e| e.kind == LogKind::Stderr && e.line == "oops"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn invalid_utf8_output_keeps_reader_alive() {
        let logs = LogBuffer::new(100);
        let (exit_tx, exit_rx) = oneshot::channel();
        let _gateway = ChildGateway::spawn(
            &launch("sh", &["-c", "printf 'before\\n\\377\\376bad\\r\\n'; echo after"]),
            &spec(),
            logs.clone(),
            exit_tx,
        )
        .unwrap();

        let report = tokio::time::timeout(Duration::from_secs(5), exit_rx).await.unwrap().unwrap();
        assert_eq!(report.code, Some(0));

        let lines: Vec<String> = logs
            .snapshot()
            .into_iter()
            .filter(|e| e.kind == LogKind::Stdout)
            .map(|e| e.line)
            .collect();
        assert_eq!(lines, vec!["before".to_string(), "\u{FFFD}\u{FFFD}bad".to_string(), "after".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_terminates_child() {
        let (exit_tx, exit_rx) = oneshot::channel();
        let mut gateway =
            ChildGateway::spawn(&launch("sleep", &["30"]), &spec(), LogBuffer::new(10), exit_tx).unwrap();
        assert!(gateway.pid().is_some());

        gateway.stop(Duration::from_secs(5)).await.unwrap();
        let report = exit_rx.await.unwrap();
        assert_eq!(report.code, None);
        assert!(!report.is_failure());

        // Second stop is a no-op
        gateway.stop(Duration::from_secs(5)).await.unwrap();
    }
}
