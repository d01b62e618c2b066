//! Process-backed implementation of the editor's "Run" capability.
//! （以外部程序實作編輯器的「執行」功能。）
//!
//! A [`ScriptRunner`] maps the file's language code to an interpreter command,
//! pipes the file content on stdin and reports the captured output. The
//! project core only sees the [`RunCapability`] trait.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{ErrorKind, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use treepad_project::{RunCapability, RunReport, RunRequest};
use treepad_settings::RunPreferences;

const POLL_INTERVAL: Duration = Duration::from_millis(15);

/// Errors that may surface while preparing or executing a command.
/// （準備或執行指令時有可能發生的錯誤。）
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no interpreter configured for language `{0}`")]
    NoInterpreter(String),
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("process stdin not available")]
    StdinUnavailable,
    #[error("failed to write to stdin: {0}")]
    Stdin(std::io::Error),
    #[error("failed to read process output: {0}")]
    Output(std::io::Error),
    #[error("failed to poll process status: {0}")]
    Poll(std::io::Error),
    #[error("failed to terminate process: {0}")]
    Kill(std::io::Error),
}

/// Serializable command specification.
/// （可序列化的指令設定資料結構。）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub stdin: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl RunSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            timeout_ms: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    /// Applies a timeout; the process is killed once it elapses.
    /// （設定逾時；逾時後強制終止進程。）
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_millis().clamp(1, u128::from(u64::MAX)) as u64;
        self.timeout_ms = Some(millis);
        self
    }
}

/// Captured result of a finished (or killed) process.
/// （指令執行完成後的結果資訊。）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutput {
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration_ms: u128,
    pub timed_out: bool,
}

impl RunOutput {
    /// Indicates whether the command exited with code `0` before any timeout.
    pub fn success(&self) -> bool {
        !self.timed_out && matches!(self.exit_code, Some(0))
    }

    fn into_report(self, timeout_ms: Option<u64>) -> RunReport {
        let stdout = String::from_utf8_lossy(&self.stdout).into_owned();
        if self.success() {
            return RunReport::succeeded(stdout);
        }
        let stderr = String::from_utf8_lossy(&self.stderr).into_owned();
        let mut message = if stderr.trim().is_empty() { stdout } else { stderr };
        if !message.is_empty() && !message.ends_with('\n') {
            message.push('\n');
        }
        if self.timed_out {
            message.push_str(&format!("timed out after {} ms", timeout_ms.unwrap_or_default()));
        } else {
            match self.exit_code {
                Some(code) => message.push_str(&format!("exited with code {code}")),
                None => message.push_str("terminated by signal"),
            }
        }
        RunReport::failed(message)
    }
}

/// Executes commands according to a [`RunSpec`].
/// （依照設定執行指令的主要元件。）
pub struct RunExecutor;

impl RunExecutor {
    pub fn execute(spec: &RunSpec) -> Result<RunOutput, RunError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let start = Instant::now();
        let mut child = command.spawn().map_err(|source| RunError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        // Drain both pipes while the process runs so a chatty child cannot block.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        // Stdin is written from its own thread; the timeout clock already runs.
        let stdin = match &spec.stdin {
            Some(payload) => match child.stdin.take() {
                Some(pipe) => Some(feed(pipe, payload.clone().into_bytes())),
                None => {
                    reap(&mut child);
                    return Err(RunError::StdinUnavailable);
                }
            },
            None => None,
        };

        let timeout = spec.timeout_ms.map(Duration::from_millis);
        let (exit_code, timed_out) = match wait(&mut child, start, timeout) {
            Ok(status) => status,
            Err(err) => {
                reap(&mut child);
                return Err(err);
            }
        };
        finish_feed(stdin)?;

        Ok(RunOutput {
            exit_code,
            stdout: collect(stdout)?,
            stderr: collect(stderr)?,
            duration_ms: start.elapsed().as_millis(),
            timed_out,
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<std::io::Result<Vec<u8>>>> {
    pipe.map(|mut reader| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            reader.read_to_end(&mut buffer)?;
            Ok(buffer)
        })
    })
}

/// Writes `payload` and closes the pipe so the interpreter sees EOF.
/// A child that exits (or is killed) before reading everything is not an error.
fn feed(mut pipe: ChildStdin, payload: Vec<u8>) -> JoinHandle<std::io::Result<()>> {
    thread::spawn(move || match pipe.write_all(&payload) {
        Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
        other => other,
    })
}

fn finish_feed(handle: Option<JoinHandle<std::io::Result<()>>>) -> Result<(), RunError> {
    match handle {
        Some(handle) => handle
            .join()
            .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")))
            .map_err(RunError::Stdin),
        None => Ok(()),
    }
}

/// Best-effort kill and wait used on error paths after spawn.
fn reap(child: &mut Child) {
    if let Err(err) = child.kill() {
        tracing::debug!(error = %err, "kill after failed run");
    }
    if let Err(err) = child.wait() {
        tracing::debug!(error = %err, "wait after failed run");
    }
}

fn collect(handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> Result<Vec<u8>, RunError> {
    match handle {
        Some(handle) => handle
            .join()
            .unwrap_or_else(|_| Err(std::io::Error::other("output reader panicked")))
            .map_err(RunError::Output),
        None => Ok(Vec::new()),
    }
}

fn wait(
    child: &mut Child,
    start: Instant,
    timeout: Option<Duration>,
) -> Result<(Option<i32>, bool), RunError> {
    let Some(timeout) = timeout else {
        let status = child.wait().map_err(RunError::Poll)?;
        return Ok((status.code(), false));
    };
    loop {
        if let Some(status) = child.try_wait().map_err(RunError::Poll)? {
            return Ok((status.code(), false));
        }
        if start.elapsed() >= timeout {
            child.kill().map_err(RunError::Kill)?;
            let status = child.wait().map_err(RunError::Poll)?;
            return Ok((status.code(), true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Runs file content through a per-language interpreter.
/// （依語言選擇直譯器執行檔案內容。）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptRunner {
    interpreters: BTreeMap<String, Vec<String>>,
    timeout: Duration,
}

impl ScriptRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            interpreters: BTreeMap::new(),
            timeout,
        }
    }

    pub fn from_preferences(preferences: &RunPreferences) -> Self {
        let mut runner = Self::new(Duration::from_millis(preferences.timeout_ms));
        for (code, argv) in &preferences.interpreters {
            runner = runner.with_interpreter(code.clone(), argv.clone());
        }
        runner
    }

    /// Registers the argv used for `code`; an empty argv is ignored.
    pub fn with_interpreter(mut self, code: impl Into<String>, argv: Vec<String>) -> Self {
        if !argv.is_empty() {
            self.interpreters
                .insert(code.into().to_ascii_lowercase(), argv);
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Builds the command for a run request.
    pub fn spec_for(&self, request: &RunRequest<'_>) -> Result<RunSpec, RunError> {
        let code = request.language.code().to_ascii_lowercase();
        let (program, args) = self
            .interpreters
            .get(&code)
            .and_then(|argv| argv.split_first())
            .ok_or_else(|| RunError::NoInterpreter(code.clone()))?;
        Ok(RunSpec::new(program.clone())
            .with_args(args.iter().cloned())
            .with_stdin(request.content)
            .with_timeout(self.timeout))
    }
}

impl RunCapability for ScriptRunner {
    fn run(&self, request: &RunRequest<'_>) -> RunReport {
        let spec = match self.spec_for(request) {
            Ok(spec) => spec,
            Err(err) => return RunReport::failed(err.to_string()),
        };
        tracing::info!(program = %spec.program, file = %request.file_name, "running file");
        match RunExecutor::execute(&spec) {
            Ok(output) => {
                tracing::info!(
                    exit_code = ?output.exit_code,
                    timed_out = output.timed_out,
                    duration_ms = output.duration_ms as u64,
                    "run finished"
                );
                output.into_report(spec.timeout_ms)
            }
            Err(err) => {
                tracing::warn!(error = %err, "run could not start");
                RunReport::failed(err.to_string())
            }
        }
    }
}
