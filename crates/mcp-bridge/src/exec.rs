//! Subprocess execution with deadline-bound forced cancellation.
//!
//! Every process is started in its own process group. When the deadline wins the race,
//! the whole group is killed and the child is reaped before [`ExecutionEngine::execute`]
//! returns, so nothing outlives the call.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

use crate::error::ExecError;

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Program and arguments, no shell involved.
    Argv(Vec<String>),
    /// A shell line, run with `sh -c`.
    Shell(String),
}

impl CommandLine {
    fn program(&self) -> &str {
        match self {
            Self::Argv(argv) => argv.first().map_or("", String::as_str),
            Self::Shell(_) => "sh",
        }
    }

    fn to_command(&self) -> Result<Command, ExecError> {
        match self {
            Self::Argv(argv) => {
                let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;
                let mut cmd = Command::new(program);
                cmd.args(args);
                Ok(cmd)
            }
            Self::Shell(line) => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(line);
                Ok(cmd)
            }
        }
    }
}

/// A single execution request.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub command: CommandLine,
    pub working_dir: PathBuf,
    pub timeout: Duration,
    /// Variables stripped from the inherited environment.
    pub env_remove: Vec<String>,
    /// Variables added or overridden.
    pub env_set: Vec<(String, String)>,
}

impl ExecRequest {
    #[must_use]
    pub fn new(command: CommandLine, working_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            command,
            working_dir: working_dir.into(),
            timeout,
            env_remove: Vec::new(),
            env_set: Vec::new(),
        }
    }

    #[must_use]
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_set.push((key.into(), value.into()));
        self
    }
}

/// Output of a process that ran to completion.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Exit code, or -1 when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ExecOutput {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// How an execution ended.
#[derive(Debug, Clone)]
pub enum ExecOutcome {
    Completed(ExecOutput),
    /// The deadline elapsed; the process group was killed and reaped.
    TimedOut { timeout: Duration },
}

/// Spawns processes and races them against their deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionEngine;

impl ExecutionEngine {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Run `request` to completion or until its timeout.
    ///
    /// A non-zero exit is returned as [`ExecOutcome::Completed`]; only failures to spawn or
    /// to collect output are errors.
    pub async fn execute(&self, request: ExecRequest) -> Result<ExecOutcome, ExecError> {
        let mut cmd = request.command.to_command()?;
        cmd.current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for key in &request.env_remove {
            cmd.env_remove(key);
        }
        for (key, value) in &request.env_set {
            cmd.env(key, value);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: request.command.program().to_owned(),
            source,
        })?;
        // Fixed at spawn: `child.id()` goes to `None` once the child is reaped, but the
        // group can outlive it.
        let pgid = child.id();
        tracing::debug!(
            pid = pgid,
            program = request.command.program(),
            cwd = %request.working_dir.display(),
            "Spawned process"
        );

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let run = async {
            tokio::try_join!(child.wait(), read_all(stdout), read_all(stderr))
        };

        let result = tokio::time::timeout(request.timeout, run).await;
        match result {
            Ok(Ok((status, stdout, stderr))) => Ok(ExecOutcome::Completed(ExecOutput {
                exit_code: status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                elapsed: start.elapsed(),
            })),
            Ok(Err(e)) => {
                terminate(&mut child, pgid).await;
                Err(ExecError::Io(e))
            }
            Err(_) => {
                tracing::warn!(
                    program = request.command.program(),
                    timeout_secs = request.timeout.as_secs_f64(),
                    "Process timed out, killing"
                );
                terminate(&mut child, pgid).await;
                Ok(ExecOutcome::TimedOut { timeout: request.timeout })
            }
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(stream: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Kill the process group led by `pgid`, then kill and reap the child itself.
///
/// The group is signalled even when the child has already exited, since background
/// processes it started keep the group alive.
async fn terminate(child: &mut Child, pgid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pgid) = pgid {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
            tracing::debug!(pgid, error = %e, "killpg failed");
        }
    }
    #[cfg(not(unix))]
    let _ = pgid;

    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "kill after timeout failed");
        // Still reap whatever is left.
        let _ = child.wait().await;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(line: &str, timeout: Duration) -> ExecRequest {
        ExecRequest::new(CommandLine::Shell(line.to_owned()), std::env::temp_dir(), timeout)
    }

    fn completed(outcome: ExecOutcome) -> ExecOutput {
        match outcome {
            ExecOutcome::Completed(output) => output,
            ExecOutcome::TimedOut { .. } => panic!("unexpected timeout"),
        }
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let engine = ExecutionEngine::new();
        let output = completed(
            engine
                .execute(shell("echo out; echo err >&2", Duration::from_secs(10)))
                .await
                .unwrap(),
        );

        assert!(output.success());
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_data() {
        let engine = ExecutionEngine::new();
        let output =
            completed(engine.execute(shell("exit 3", Duration::from_secs(10))).await.unwrap());
        assert_eq!(output.exit_code, 3);
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_argv_runs_without_shell() {
        let engine = ExecutionEngine::new();
        let request = ExecRequest::new(
            CommandLine::Argv(vec!["echo".into(), "$HOME".into()]),
            std::env::temp_dir(),
            Duration::from_secs(10),
        );
        let output = completed(engine.execute(request).await.unwrap());
        assert_eq!(output.stdout, "$HOME\n");
    }

    #[tokio::test]
    async fn test_working_dir_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ExecutionEngine::new();
        let request = ExecRequest::new(
            CommandLine::Shell("pwd; echo \"$TERM|${CLAUDECODE:-unset}\"".into()),
            dir.path(),
            Duration::from_secs(10),
        )
        .env("TERM", "dumb")
        .env_remove("CLAUDECODE");

        let output = completed(engine.execute(request).await.unwrap());
        let canonical = std::fs::canonicalize(dir.path()).unwrap();
        let mut lines = output.stdout.lines();
        assert_eq!(std::fs::canonicalize(lines.next().unwrap()).unwrap(), canonical);
        assert_eq!(lines.next(), Some("dumb|unset"));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let engine = ExecutionEngine::new();
        let request = ExecRequest::new(
            CommandLine::Argv(vec!["definitely-not-a-real-binary-4242".into()]),
            std::env::temp_dir(),
            Duration::from_secs(5),
        );
        let err = engine.execute(request).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_empty_argv_rejected() {
        let engine = ExecutionEngine::new();
        let request =
            ExecRequest::new(CommandLine::Argv(vec![]), std::env::temp_dir(), Duration::from_secs(1));
        assert!(matches!(engine.execute(request).await, Err(ExecError::EmptyCommand)));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let engine = ExecutionEngine::new();
        let start = Instant::now();
        let outcome = engine.execute(shell("sleep 30", Duration::from_millis(300))).await.unwrap();

        assert!(matches!(outcome, ExecOutcome::TimedOut { .. }));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    /// Whether `pid` is still running. A zombie counts as dead: it only awaits reaping by init.
    #[cfg(target_os = "linux")]
    async fn eventually_dead(pid: i32) -> bool {
        for _ in 0..50 {
            let alive = match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
                Ok(stat) => !stat.split_whitespace().nth(2).is_some_and(|s| s == "Z"),
                Err(_) => false,
            };
            if !alive {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[cfg(target_os = "linux")]
    async fn background_pid_after_timeout(line_template: &str) -> i32 {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let line = line_template.replace("{pid_file}", &pid_file.display().to_string());

        let engine = ExecutionEngine::new();
        let outcome = engine.execute(shell(&line, Duration::from_millis(500))).await.unwrap();
        assert!(matches!(outcome, ExecOutcome::TimedOut { .. }));

        std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_leaves_no_background_process() {
        let pid = background_pid_after_timeout("sleep 30 & echo $! > {pid_file}; wait").await;
        assert!(eventually_dead(pid).await, "background process {pid} survived the timeout");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_group_after_parent_exited() {
        // The shell exits at once; the orphaned sleep keeps stdout open past the deadline.
        let pid = background_pid_after_timeout("sleep 30 & echo $! > {pid_file}").await;
        assert!(eventually_dead(pid).await, "orphaned process {pid} survived the timeout");
    }
}
