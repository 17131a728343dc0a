//! Process Invoker: one subprocess per question.
//!
//! The child receives a single newline-terminated input blob on stdin, after
//! which stdin is closed. stdout and stderr are buffered to completion while
//! the input is being written, so a chatty child can never deadlock against a
//! full pipe. The child is spawned with `kill_on_drop`, so cancelling the
//! calling future (for example when the HTTP client disconnects) kills it.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use calgpt_core::config::{BridgeConfig, InputMode};
use calgpt_core::types::QueryRequest;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::BridgeError;

/// Everything observable about one finished subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout decoded as UTF-8 (lossy) and trimmed.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }

    /// stderr decoded as UTF-8 (lossy) and trimmed.
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// The answer payload of a successful run, or the failure with stderr.
    pub fn into_payload(self) -> Result<String, BridgeError> {
        if self.success() {
            Ok(self.stdout_text())
        } else {
            Err(BridgeError::ProcessFailed {
                code: self.exit_code,
                stderr: self.stderr_text(),
            })
        }
    }
}

/// Spawns the answering process and collects its output.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    input_mode: InputMode,
    timeout: Duration,
}

impl ProcessInvoker {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            input_mode: InputMode::default(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.as_ref().map(PathBuf::from),
            input_mode: config.input_mode,
            timeout: config.timeout(),
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

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_input_mode(mut self, mode: InputMode) -> Self {
        self.input_mode = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Bytes written to the child's stdin for `request`.
    pub fn encode_input(&self, request: &QueryRequest) -> Result<Vec<u8>, BridgeError> {
        let mut input = match self.input_mode {
            // One line per query: embedded line breaks become spaces.
            InputMode::Raw => request
                .question
                .replace(|c: char| c == '\r' || c == '\n', " ")
                .into_bytes(),
            InputMode::Json => {
                serde_json::to_vec(request).map_err(|e| BridgeError::Encode(e.to_string()))?
            }
        };
        input.push(b'\n');
        Ok(input)
    }

    /// Run the process for `request` and return its raw result.
    ///
    /// A nonzero exit is not an error here; see [`ProcessResult::into_payload`].
    pub async fn invoke(&self, request: &QueryRequest) -> Result<ProcessResult, BridgeError> {
        let input = self.encode_input(request)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| {
            warn!(program = %self.program, error = %source, "Failed to spawn query process");
            BridgeError::Spawn {
                program: self.program.clone(),
                source,
            }
        })?;
        debug!(pid = ?child.id(), program = %self.program, "Spawned query process");

        let outcome = tokio::time::timeout(self.timeout, exchange(&mut child, input)).await;
        let (status, stdout, stderr) = match outcome {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    pid = ?child.id(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Query process timed out, killing"
                );
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out query process");
                }
                return Err(BridgeError::TimedOut(self.timeout));
            }
        };

        let result = ProcessResult {
            exit_code: status.code(),
            stdout,
            stderr,
            elapsed: started.elapsed(),
        };
        info!(
            exit_code = ?result.exit_code,
            stdout_bytes = result.stdout.len(),
            stderr_bytes = result.stderr.len(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Query process finished"
        );
        Ok(result)
    }

    /// [`invoke`](Self::invoke) followed by [`ProcessResult::into_payload`].
    pub async fn run(&self, request: &QueryRequest) -> Result<String, BridgeError> {
        self.invoke(request).await?.into_payload()
    }
}

/// Write `input`, drain both output pipes and reap the child.
async fn exchange(
    child: &mut Child,
    input: Vec<u8>,
) -> Result<(ExitStatus, Vec<u8>, Vec<u8>), BridgeError> {
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| BridgeError::Io("child stdin was not captured".to_string()))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| BridgeError::Io("child stdout was not captured".to_string()))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| BridgeError::Io("child stderr was not captured".to_string()))?;

    let write = async move {
        let result = stdin.write_all(&input).await;
        // Dropping the handle closes the pipe so the child sees EOF.
        drop(stdin);
        result
    };

    let mut out = Vec::new();
    let mut err = Vec::new();
    let (written, read_out, read_err) = tokio::join!(
        write,
        stdout.read_to_end(&mut out),
        stderr.read_to_end(&mut err)
    );

    match written {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
            debug!("Query process closed stdin before reading all input");
        }
        Err(e) => return Err(BridgeError::Io(format!("writing stdin: {}", e))),
    }
    read_out.map_err(|e| BridgeError::Io(format!("reading stdout: {}", e)))?;
    read_err.map_err(|e| BridgeError::Io(format!("reading stderr: {}", e)))?;

    let status = child
        .wait()
        .await
        .map_err(|e| BridgeError::Io(format!("waiting for process: {}", e)))?;
    Ok((status, out, err))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use calgpt_core::types::{HistoryTurn, ParsedAnswer};

    fn sh(script: &str) -> ProcessInvoker {
        ProcessInvoker::new("sh")
            .with_args(["-c", script])
            .with_timeout(Duration::from_secs(10))
    }

    fn question(text: &str) -> QueryRequest {
        QueryRequest::new(text)
    }

    #[tokio::test]
    async fn test_structured_stdout_is_returned_trimmed() {
        let invoker = sh(r#"cat >/dev/null; printf '{"text":"X"}\n\n'"#);
        let payload = invoker.run(&question("anything")).await.unwrap();
        assert_eq!(payload, r#"{"text":"X"}"#);
    }

    #[tokio::test]
    async fn test_echoed_object_parses_as_structured() {
        let invoker = sh(r#"cat >/dev/null; echo '{"text":"X"}'"#);
        let payload = invoker.run(&question("any question")).await.unwrap();
        assert_eq!(
            crate::parser::parse_output(&payload),
            ParsedAnswer::Structured {
                text: "X".to_string(),
                courses: vec![]
            }
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let invoker = sh("cat >/dev/null; echo boom >&2; exit 1");
        let result = invoker.invoke(&question("q")).await.unwrap();
        assert_eq!(result.exit_code, Some(1));
        assert!(!result.success());

        match result.into_payload() {
            Err(BridgeError::ProcessFailed { code, stderr }) => {
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected ProcessFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stdout_ignored_on_failure() {
        let invoker = sh(r#"cat >/dev/null; printf '{"text":"partial"}'; exit 3"#);
        let err = invoker.run(&question("q")).await.unwrap_err();
        assert!(matches!(err, BridgeError::ProcessFailed { code: Some(3), .. }));
    }

    #[tokio::test]
    async fn test_signal_exit_has_no_code() {
        let invoker = sh("kill -9 $$");
        let result = invoker.invoke(&question("q")).await.unwrap();
        assert_eq!(result.exit_code, None);
        assert!(matches!(
            result.into_payload(),
            Err(BridgeError::ProcessFailed { code: None, .. })
        ));
    }

    #[tokio::test]
    async fn test_raw_mode_writes_question_line() {
        let invoker = sh("cat");
        let result = invoker
            .invoke(&question("easy upper divs?"))
            .await
            .unwrap();
        assert_eq!(result.stdout, b"easy upper divs?\n");
        assert_eq!(result.stdout_text(), "easy upper divs?");
    }

    #[tokio::test]
    async fn test_raw_mode_multiline_question_reaches_line_reader() {
        let invoker = sh(r#"read line; printf '%s' "$line""#);
        let payload = invoker
            .run(&question("easy breadths?\nwith open seats"))
            .await
            .unwrap();
        assert_eq!(payload, "easy breadths? with open seats");
    }

    #[tokio::test]
    async fn test_silent_failure_hides_exit_code_from_client() {
        let invoker = sh("cat >/dev/null; exit 2");
        let err = invoker.run(&question("q")).await.unwrap_err();
        assert!(err.to_string().contains("exit code 2"));
        assert_eq!(err.client_message(), "query process failed");
    }

    #[tokio::test]
    async fn test_json_mode_writes_request_object() {
        let invoker = sh("cat").with_input_mode(InputMode::Json);
        let request = question("and after that?").with_history(vec![
            HistoryTurn::user("hi"),
            HistoryTurn::assistant("hello"),
        ]);
        let payload = invoker.run(&request).await.unwrap();

        let echoed: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(echoed["question"], "and after that?");
        assert_eq!(echoed["chatHistory"][0]["sender"], "user");
        assert_eq!(echoed["chatHistory"][1]["text"], "hello");
    }

    #[test]
    fn test_encode_input_is_single_line() {
        let raw = ProcessInvoker::new("x").encode_input(&question("q")).unwrap();
        assert_eq!(raw, b"q\n");

        let raw = ProcessInvoker::new("x")
            .encode_input(&question("easy breadths?\nignore me\r\nplease"))
            .unwrap();
        assert_eq!(raw, b"easy breadths? ignore me  please\n");

        let json = ProcessInvoker::new("x")
            .with_input_mode(InputMode::Json)
            .encode_input(&question("multi\nline"))
            .unwrap();
        assert_eq!(json.iter().filter(|b| **b == b'\n').count(), 1);
        assert_eq!(json.last(), Some(&b'\n'));
    }

    #[tokio::test]
    async fn test_child_that_never_reads_stdin_is_fine() {
        let invoker = sh("echo ready");
        let request = question(&"x".repeat(256 * 1024));
        let payload = invoker.run(&request).await.unwrap();
        assert_eq!(payload, "ready");
    }

    #[tokio::test]
    async fn test_large_output_does_not_deadlock() {
        let invoker = sh("cat >/dev/null; i=0; while [ $i -lt 5000 ]; do echo 'diagnostic line padding padding'; echo 'err line' >&2; i=$((i+1)); done");
        let result = invoker.invoke(&question("q")).await.unwrap();
        assert!(result.success());
        assert!(result.stdout.len() > 100_000);
        assert!(result.stderr.len() > 40_000);
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let invoker = sh("exec sleep 5").with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        let err = invoker.invoke(&question("q")).await.unwrap_err();
        assert!(matches!(err, BridgeError::TimedOut(d) if d == Duration::from_millis(200)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_spawn_failure_reported() {
        let invoker = ProcessInvoker::new("/nonexistent/calgpt-query-process");
        let err = invoker.invoke(&question("q")).await.unwrap_err();
        match err {
            BridgeError::Spawn { program, source } => {
                assert_eq!(program, "/nonexistent/calgpt-query-process");
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected Spawn, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_working_dir_applied() {
        let dir = std::env::temp_dir();
        let invoker = sh("cat >/dev/null; pwd").with_working_dir(&dir);
        let payload = invoker.run(&question("q")).await.unwrap();
        let expected = dir.canonicalize().unwrap();
        let actual = PathBuf::from(payload).canonicalize().unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_from_config() {
        let mut config = BridgeConfig::default();
        config.program = "/usr/bin/python3".to_string();
        config.args = vec!["/srv/query.py".to_string()];
        config.working_dir = Some("/srv".to_string());
        config.input_mode = InputMode::Json;
        config.timeout_secs = 7;

        let invoker = ProcessInvoker::from_config(&config);
        assert_eq!(invoker.program(), "/usr/bin/python3");
        assert_eq!(invoker.input_mode(), InputMode::Json);
        assert_eq!(invoker.timeout(), Duration::from_secs(7));
        assert_eq!(invoker.args, vec!["/srv/query.py"]);
        assert_eq!(invoker.working_dir, Some(PathBuf::from("/srv")));
    }
}
