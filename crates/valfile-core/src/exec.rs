//! Building and running the generated program.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::bundle::ModMode;

/// Per-stream capture limit.
pub const OUTPUT_CAP: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The program ran to completion with this exit code.
    Exited(i32),
    /// The build or the run hit the deadline and was killed.
    TimedOut,
    /// The go tool failed to build the program.
    BuildFailed(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub status: RunStatus,
    /// Stdout followed by stderr.
    pub output: Vec<u8>,
    pub truncated: bool,
}

impl ExecutionOutcome {
    /// Whether the output opens with the failure marker.
    pub fn is_marked(&self, marker: &str) -> bool {
        self.output.starts_with(marker.as_bytes())
    }
}

#[derive(Debug, Clone)]
pub struct ExecRequest<'a> {
    pub workspace: &'a Path,
    pub mod_mode: ModMode,
    /// Bound on build and run together.
    pub timeout: Duration,
}

pub trait Executor {
    fn execute(&self, req: &ExecRequest<'_>) -> Result<ExecutionOutcome>;
}

#[derive(Debug, Clone)]
pub struct GoExecutor {
    pub go: PathBuf,
}

impl GoExecutor {
    pub fn new(go: impl Into<PathBuf>) -> Self {
        GoExecutor { go: go.into() }
    }
}

impl Default for GoExecutor {
    fn default() -> Self {
        GoExecutor::new("go")
    }
}

const BINARY_NAME: &str = if cfg!(windows) {
    "valfile-check.exe"
} else {
    "valfile-check"
};

impl Executor for GoExecutor {
    fn execute(&self, req: &ExecRequest<'_>) -> Result<ExecutionOutcome> {
        let deadline = Instant::now().checked_add(req.timeout);
        let bin = req.workspace.join(BINARY_NAME);

        let mut build = Command::new(&self.go);
        build
            .arg("build")
            .arg(req.mod_mode.flag())
            .arg("-o")
            .arg(&bin)
            .arg(".")
            .current_dir(req.workspace)
            .env("GOWORK", "off");
        tracing::debug!(go = %self.go.display(), mode = req.mod_mode.flag(), "building validation program");
        let built = run_captured(&mut build, deadline)
            .with_context(|| format!("running {} build", self.go.display()))?;
        if built.timed_out {
            return Ok(built.into_outcome(RunStatus::TimedOut));
        }
        if !built.status.success() {
            let code = exit_code(built.status);
            return Ok(built.into_outcome(RunStatus::BuildFailed(code)));
        }

        let mut run = Command::new(&bin);
        run.current_dir(req.workspace).env_clear();
        tracing::debug!(bin = %bin.display(), "running validation program");
        let ran = run_captured(&mut run, deadline)
            .with_context(|| format!("running {}", bin.display()))?;
        let status = if ran.timed_out {
            RunStatus::TimedOut
        } else {
            RunStatus::Exited(exit_code(ran.status))
        };
        Ok(ran.into_outcome(status))
    }
}

struct Captured {
    status: ExitStatus,
    timed_out: bool,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    truncated: bool,
}

impl Captured {
    fn into_outcome(self, status: RunStatus) -> ExecutionOutcome {
        let mut output = self.stdout;
        output.extend_from_slice(&self.stderr);
        ExecutionOutcome {
            status,
            output,
            truncated: self.truncated,
        }
    }
}

fn run_captured(cmd: &mut Command, deadline: Option<Instant>) -> Result<Captured> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn().context("spawn")?;
    let stdout = child.stdout.take().context("take stdout")?;
    let stderr = child.stderr.take().context("take stderr")?;

    let stdout_thread = std::thread::spawn(move || read_to_end_capped(stdout, OUTPUT_CAP));
    let stderr_thread = std::thread::spawn(move || read_to_end_capped(stderr, OUTPUT_CAP));

    let (status, timed_out) = wait_with_deadline(&mut child, deadline)?;
    let (stdout, out_trunc) = stdout_thread
        .join()
        .unwrap_or_else(|_| Ok((Vec::new(), false)))
        .context("read stdout")?;
    let (stderr, err_trunc) = stderr_thread
        .join()
        .unwrap_or_else(|_| Ok((Vec::new(), false)))
        .context("read stderr")?;
    Ok(Captured {
        status,
        timed_out,
        stdout,
        stderr,
        truncated: out_trunc || err_trunc,
    })
}

fn wait_with_deadline(
    child: &mut std::process::Child,
    deadline: Option<Instant>,
) -> Result<(ExitStatus, bool)> {
    loop {
        if let Some(status) = child.try_wait().context("try_wait child")? {
            return Ok((status, false));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            let _ = child.kill();
            let status = child.wait().context("wait child after kill")?;
            return Ok((status, true));
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt as _;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal: Option<i32> = None;
    match status.code() {
        Some(code) => code,
        None => signal.map(|s| 128 + s).unwrap_or(1),
    }
}

/// Reads `reader` to the end, keeping at most `cap` bytes. Draining continues
/// past the cap so the writer never blocks on a full pipe.
pub fn read_to_end_capped<R: Read>(mut reader: R, cap: usize) -> std::io::Result<(Vec<u8>, bool)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut truncated = false;
    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            return Ok((buf, truncated));
        }
        let room = cap.saturating_sub(buf.len());
        if n > room {
            truncated = true;
        }
        buf.extend_from_slice(&chunk[..n.min(room)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capped_reads_drain_and_flag_truncation() {
        let data = vec![7u8; 20_000];
        let (buf, truncated) = read_to_end_capped(&data[..], 10_000).unwrap();
        assert_eq!(buf.len(), 10_000);
        assert!(truncated);

        let (buf, truncated) = read_to_end_capped(&b"short"[..], 10_000).unwrap();
        assert_eq!(buf, b"short");
        assert!(!truncated);
    }

    #[test]
    fn outcome_concatenates_stdout_then_stderr() {
        let c = Captured {
            status: success_status(),
            timed_out: false,
            stdout: b"out\n".to_vec(),
            stderr: b"err\n".to_vec(),
            truncated: false,
        };
        let o = c.into_outcome(RunStatus::Exited(0));
        assert_eq!(o.output, b"out\nerr\n");
    }

    #[cfg(unix)]
    fn success_status() -> ExitStatus {
        use std::os::unix::process::ExitStatusExt as _;
        ExitStatus::from_raw(0)
    }

    #[cfg(windows)]
    fn success_status() -> ExitStatus {
        use std::os::windows::process::ExitStatusExt as _;
        ExitStatus::from_raw(0)
    }

    #[cfg(unix)]
    #[test]
    fn deadline_kills_the_child() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let start = Instant::now();
        let c = run_captured(&mut cmd, Instant::now().checked_add(Duration::from_millis(100)))
            .expect("run");
        assert!(c.timed_out);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_go_binary_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let exec = GoExecutor::new(dir.path().join("no-such-go"));
        let err = exec
            .execute(&ExecRequest {
                workspace: dir.path(),
                mod_mode: ModMode::Mod,
                timeout: Duration::from_secs(5),
            })
            .unwrap_err();
        assert!(format!("{err:#}").contains("build"), "{err:#}");
    }
}
