//! Builder and runner for external tool invocations.
//!
//! A [`ToolCommand`] describes one invocation as a program path plus an
//! argument vector; nothing is ever passed through a shell. A
//! [`ProcessRunner`] executes it, feeding every line of the merged
//! stdout/stderr stream to a caller-supplied [`LineHandler`], and resolves to a
//! [`ProcessOutcome`] once the process has been reaped and both streams have
//! been drained.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use sweep_core::{Error, Result};

use crate::lines::ToolLineCodec;

/// Values extracted from a process's output by its line handler.
pub type Metrics = BTreeMap<String, String>;

/// Exit code reported for a process terminated by a signal.
pub const SIGNALLED_EXIT_CODE: i32 = -1;

/// The result of one completed tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    /// Process exit code, or [`SIGNALLED_EXIT_CODE`].
    pub exit_code: i32,
    /// CPU time (user + system) the process consumed.
    ///
    /// Sampled from `/proc` after the process exits and before it is reaped.
    /// Where that is unavailable (non-Linux targets, or a failed sample) this
    /// falls back to the wall time between spawn and reap.
    pub processor_time: Duration,
    /// Metrics captured by the line handler.
    pub metrics: Metrics,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn metric(&self, key: &str) -> Option<&str> {
        self.metrics.get(key).map(String::as_str)
    }
}

/// Per-line callback invoked by a [`ProcessRunner`].
///
/// An error (or panic) from `handle` is logged and the line is skipped; it
/// never aborts the invocation.
pub trait LineHandler: Send {
    fn handle(&mut self, line: &str, metrics: &mut Metrics) -> Result<()>;
}

impl<F> LineHandler for F
where
    F: FnMut(&str, &mut Metrics) -> Result<()> + Send,
{
    fn handle(&mut self, line: &str, metrics: &mut Metrics) -> Result<()> {
        self(line, metrics)
    }
}

/// A [`LineHandler`] that ignores every line.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardLines;

impl LineHandler for DiscardLines {
    fn handle(&mut self, _line: &str, _metrics: &mut Metrics) -> Result<()> {
        Ok(())
    }
}

/// A [`LineHandler`] that keeps every line, in order.
#[derive(Debug, Default, Clone)]
pub struct CollectLines {
    pub lines: Vec<String>,
}

impl CollectLines {
    pub fn joined(&self) -> String {
        self.lines.join("\n")
    }
}

impl LineHandler for CollectLines {
    fn handle(&mut self, line: &str, _metrics: &mut Metrics) -> Result<()> {
        self.lines.push(line.to_string());
        Ok(())
    }
}

/// A builder for constructing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use sweep_av::{DiscardLines, ProcessRunner, ToolCommand, TokioRunner};
/// use std::path::PathBuf;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> sweep_core::Result<()> {
/// let mut cmd = ToolCommand::new(PathBuf::from("ffprobe"));
/// cmd.args(["-v", "quiet", "-print_format", "json", "-show_format"])
///     .arg("/path/to/video.mkv");
/// let outcome = TokioRunner
///     .run(&cmd, &mut DiscardLines, &CancellationToken::new())
///     .await?;
/// println!("exit code {}", outcome.exit_code);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Append a path argument.
    pub fn path_arg(&mut self, path: &Path) -> &mut Self {
        self.arg(path.to_string_lossy())
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Option<Duration>) -> &mut Self {
        self.timeout = d;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn argv(&self) -> &[String] {
        &self.args
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.timeout
    }

    /// File name of the program, for logs and errors.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }
}

/// Executes [`ToolCommand`]s.
///
/// A non-zero exit code is reported in the [`ProcessOutcome`], not as an
/// error; deciding what to do about it is the caller's business. `Err` is
/// reserved for invocations that could not run to completion: spawn
/// failures, timeouts, and cancellation ([`Error::Cancelled`]).
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        cmd: &ToolCommand,
        handler: &mut dyn LineHandler,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutcome>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioRunner;

#[async_trait]
impl ProcessRunner for TokioRunner {
    async fn run(
        &self,
        cmd: &ToolCommand,
        handler: &mut dyn LineHandler,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutcome> {
        let tool = cmd.program_name();
        tracing::debug!(tool = %tool, args = ?cmd.argv(), "spawning");

        let mut command = Command::new(cmd.program());
        command
            .args(cmd.argv())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let start = Instant::now();
        let mut child = command
            .spawn()
            .map_err(|e| Error::tool(&tool, format!("failed to spawn: {e}")))?;

        // Both readers feed one channel so lines keep their arrival order.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, tx.clone()));
        }
        drop(tx);

        let deadline = cmd.time_limit().map(|limit| start + limit);
        let expired = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at.into()).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(expired);

        let mut metrics = Metrics::new();
        let mut interrupted: Option<Error> = None;

        // The channel closes only once every reader has hit end-of-stream.
        loop {
            tokio::select! {
                line = rx.recv() => match line {
                    Some(line) => dispatch_line(handler, &line, &mut metrics, &tool),
                    None => break,
                },
                _ = cancel.cancelled(), if interrupted.is_none() => {
                    tracing::info!(tool = %tool, "cancelling");
                    terminate(&mut child);
                    interrupted = Some(Error::Cancelled);
                }
                _ = &mut expired, if interrupted.is_none() => {
                    tracing::warn!(tool = %tool, "timed out; killing");
                    terminate(&mut child);
                    interrupted = Some(timed_out(&tool, cmd.time_limit()));
                }
            }
        }

        for reader in readers {
            if let Err(e) = reader.await {
                tracing::warn!(tool = %tool, "output reader failed: {e}");
            }
        }

        let exited = cpu_time_at_exit(child.id());
        tokio::pin!(exited);
        let cpu_time = loop {
            tokio::select! {
                cpu = &mut exited => break cpu,
                _ = cancel.cancelled(), if interrupted.is_none() => {
                    terminate(&mut child);
                    interrupted = Some(Error::Cancelled);
                }
                _ = &mut expired, if interrupted.is_none() => {
                    terminate(&mut child);
                    interrupted = Some(timed_out(&tool, cmd.time_limit()));
                }
            }
        };

        let status = loop {
            tokio::select! {
                status = child.wait() => {
                    break status.map_err(|e| {
                        Error::tool(&tool, format!("I/O error waiting for process: {e}"))
                    })?;
                }
                _ = cancel.cancelled(), if interrupted.is_none() => {
                    terminate(&mut child);
                    interrupted = Some(Error::Cancelled);
                }
                _ = &mut expired, if interrupted.is_none() => {
                    terminate(&mut child);
                    interrupted = Some(timed_out(&tool, cmd.time_limit()));
                }
            }
        };
        let wall_time = start.elapsed();
        let processor_time = cpu_time.unwrap_or_else(|| {
            tracing::debug!(tool = %tool, "cpu time unavailable, reporting wall time");
            wall_time
        });

        if let Some(err) = interrupted {
            return Err(err);
        }

        let exit_code = status.code().unwrap_or(SIGNALLED_EXIT_CODE);
        tracing::debug!(
            tool = %tool,
            exit_code,
            cpu = ?processor_time,
            wall = ?wall_time,
            "process exited"
        );

        Ok(ProcessOutcome {
            exit_code,
            processor_time,
            metrics,
        })
    }
}

/// Read one output stream line by line into the shared channel until EOF.
fn spawn_reader<R>(reader: R, tx: mpsc::UnboundedSender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = FramedRead::new(reader, ToolLineCodec::new());
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!("output stream error: {e}");
                    break;
                }
            }
        }
    })
}

/// Hand one line to the handler, isolating the runner from its failures.
fn dispatch_line(handler: &mut dyn LineHandler, line: &str, metrics: &mut Metrics, tool: &str) {
    tracing::trace!(tool = %tool, "{line}");
    match std::panic::catch_unwind(AssertUnwindSafe(|| handler.handle(line, metrics))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(tool = %tool, "line handler failed, line ignored: {e}"),
        Err(_) => tracing::warn!(tool = %tool, "line handler panicked, line ignored"),
    }
}

/// Wait for the child to exit without reaping it, then read the CPU time it
/// used while its `/proc` entry still exists.
#[cfg(target_os = "linux")]
async fn cpu_time_at_exit(pid: Option<u32>) -> Option<Duration> {
    let pid = pid?;
    tokio::task::spawn_blocking(move || {
        use nix::errno::Errno;
        use nix::sys::wait::{waitid, Id, WaitPidFlag};
        use nix::unistd::{sysconf, Pid, SysconfVar};

        loop {
            let id = Id::Pid(Pid::from_raw(pid as i32));
            match waitid(id, WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT) {
                Ok(_) => break,
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    tracing::debug!(pid, "waitid failed: {e}");
                    return None;
                }
            }
        }

        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        let ticks = parse_cpu_ticks(&stat)?;
        let per_second = sysconf(SysconfVar::CLK_TCK).ok().flatten()?;
        ticks_to_duration(ticks, u64::try_from(per_second).ok()?)
    })
    .await
    .ok()
    .flatten()
}

#[cfg(not(target_os = "linux"))]
async fn cpu_time_at_exit(_pid: Option<u32>) -> Option<Duration> {
    None
}

/// Sum of `utime` and `stime` (fields 14 and 15) from a `/proc/<pid>/stat`
/// line, in clock ticks.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_cpu_ticks(stat: &str) -> Option<u64> {
    // The command name is parenthesised and may itself contain spaces.
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace().skip(11);
    let utime: u64 = fields.next()?.parse().ok()?;
    let stime: u64 = fields.next()?.parse().ok()?;
    Some(utime + stime)
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn ticks_to_duration(ticks: u64, per_second: u64) -> Option<Duration> {
    if per_second == 0 {
        return None;
    }
    let nanos = u128::from(ticks) * 1_000_000_000 / u128::from(per_second);
    Some(Duration::from_nanos(u64::try_from(nanos).ok()?))
}

fn timed_out(tool: &str, limit: Option<Duration>) -> Error {
    Error::tool(tool, format!("timed out after {:?}", limit.unwrap_or_default()))
}

/// Kill the child and, on Unix, every process in its group.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => return,
            Err(e) => tracing::debug!(pid, "killpg failed, falling back to kill: {e}"),
        }
    }

    if let Err(e) = child.start_kill() {
        tracing::debug!("kill failed: {e}");
    }
}
