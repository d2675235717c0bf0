//! k6 process launching
//!
//! Builds the `k6 run` command line, spawns the engine with its REST API
//! bound to a loopback control port, and drains its output in the
//! background so the pipes never fill up.

use std::collections::VecDeque;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::EngineConfig;
use crate::error::{K6Error, K6Result};

/// Loopback address the control API is bound to
pub fn control_address(port: u16) -> String {
    format!("127.0.0.1:{}", port)
}

/// A freshly spawned engine process
pub struct Launch {
    pub child: Child,
    pub pid: u32,
    pub output: OutputTail,
    pub readers: Vec<JoinHandle<()>>,
}

/// Bounded buffer holding the most recent lines of engine output
#[derive(Clone)]
pub struct OutputTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, line: String) {
        if self.capacity == 0 {
            return;
        }
        let Ok(mut lines) = self.lines.lock() else {
            return;
        };
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Build the engine command: `k6 run <script> --address 127.0.0.1:<port> --paused`
pub fn build_command(engine: &EngineConfig, script: &Path, port: u16) -> Command {
    let mut cmd = Command::new(&engine.binary);
    cmd.arg("run")
        .arg(script)
        .arg("--address")
        .arg(control_address(port))
        .arg("--paused")
        .args(&engine.extra_args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Spawn the engine for `script` with its control API on `port`
pub fn spawn(engine: &EngineConfig, test_id: &str, script: &Path, port: u16) -> K6Result<Launch> {
    let mut child = build_command(engine, script, port).spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            K6Error::ExecutableMissing(engine.binary.clone())
        } else {
            K6Error::LaunchFailed(format!("failed to spawn '{}': {}", engine.binary, e))
        }
    })?;

    let pid = child
        .id()
        .ok_or_else(|| K6Error::LaunchFailed("process exited before its pid was read".into()))?;

    let output = OutputTail::new(engine.output_tail_lines);
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(drain(stdout, "stdout", test_id.to_string(), output.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(drain(stderr, "stderr", test_id.to_string(), output.clone()));
    }

    debug!(test_id, pid, port, "spawned {}", engine.binary);

    Ok(Launch {
        child,
        pid,
        output,
        readers,
    })
}

/// Read the pipe until EOF. Output is not required to be UTF-8, and the
/// read end must stay open for as long as the engine may write to it.
fn drain<R>(reader: R, stream: &'static str, test_id: String, tail: OutputTail) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = decode_line(&buf);
                    trace!(test_id = %test_id, stream, "{}", line);
                    tail.push(line);
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(test_id = %test_id, stream, "engine output unreadable, discarding the rest: {}", e);
                    // Keep consuming so the engine never blocks or hits a closed pipe
                    let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                    break;
                }
            }
        }
    })
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// True once something accepts connections on the control port
pub async fn control_port_open(port: u16) -> bool {
    let connect = TcpStream::connect(control_address(port));
    matches!(
        tokio::time::timeout(Duration::from_millis(500), connect).await,
        Ok(Ok(_))
    )
}

/// Wait briefly for the output readers to hit EOF after the process exited
pub async fn collect_output(readers: Vec<JoinHandle<()>>, tail: &OutputTail) -> Vec<String> {
    for reader in readers {
        let _ = tokio::time::timeout(Duration::from_secs(1), reader).await;
    }
    tail.snapshot()
}

/// Describe an engine that died during startup
pub fn exit_report(status: ExitStatus, output: &[String]) -> String {
    let mut report = match status.code() {
        Some(code) => format!("k6 exited during startup with code {}", code),
        None => "k6 was terminated by a signal during startup".to_string(),
    };
    if !output.is_empty() {
        report.push_str(":\n");
        report.push_str(&output.join("\n"));
    }
    report
}
