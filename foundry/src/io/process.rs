//! Helpers for running child processes: bounded one-shot runs and line-streamed runs.

use std::collections::{BTreeSet, VecDeque};
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Lines of stderr kept for error messages from streamed children.
const STDERR_TAIL_LINES: usize = 20;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

/// Put the child in its own process group so a terminal Ctrl+C reaches only this process.
pub fn isolate_process_group(cmd: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    #[cfg(not(unix))]
    {
        let _ = cmd;
    }
}

/// Isolated children (each leading its own process group) that are still running.
///
/// A terminal Ctrl+C never reaches these groups, so a hard stop must kill them
/// explicitly with [`ChildGroups::kill_all`].
#[derive(Debug, Clone, Default)]
pub struct ChildGroups {
    pids: Arc<Mutex<BTreeSet<u32>>>,
}

impl ChildGroups {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, pid: u32) {
        self.pids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pid);
    }

    fn remove(&self, pid: u32) {
        self.pids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&pid);
    }

    pub fn pids(&self) -> Vec<u32> {
        self.pids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    /// SIGKILL every tracked process group. Safe to call from a signal handler thread.
    pub fn kill_all(&self) {
        for pid in self.pids() {
            match kill_group(pid) {
                Ok(()) => debug!(pid, "killed child process group"),
                Err(err) => {
                    warn!(pid, err = %format!("{err:#}"), "failed to kill child process group");
                }
            }
        }
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) -> Result<()> {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).context("pid out of range")?;
    killpg(Pid::from_raw(raw), Signal::SIGKILL).context("killpg")
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) -> Result<()> {
    Ok(())
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        child_stdin.write_all(input).context("write stdin")?;
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

/// Spawn `cmd`, feed it `stdin`, and yield its stdout one line at a time.
///
/// There is no timeout: the stream ends when the child closes stdout. A
/// non-zero exit is reported as a final error item carrying the tail of stderr.
/// The child is registered in `groups` until it has been reaped.
#[instrument(skip_all)]
pub fn spawn_line_stream(
    mut cmd: Command,
    stdin: &[u8],
    groups: &ChildGroups,
) -> Result<LineStream> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning streaming child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    // Written on its own thread: a large prompt must not block reading stdout.
    let mut child_stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("stdin was not piped"))?;
    let input = stdin.to_vec();
    thread::spawn(move || {
        if let Err(err) = child_stdin.write_all(&input) {
            warn!(err = %err, "failed to write command stdin");
        }
    });

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
    let tail = Arc::clone(&stderr_tail);
    thread::spawn(move || {
        for line in BufReader::new(stderr).lines() {
            let Ok(line) = line else { break };
            debug!(line = %line, "child stderr");
            let mut tail = tail.lock().unwrap_or_else(PoisonError::into_inner);
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    });

    groups.insert(child.id());
    Ok(LineStream {
        child: Some(child),
        stdout: BufReader::new(stdout),
        stderr_tail,
        groups: groups.clone(),
    })
}

/// Stdout lines of a running child. Dropping the stream early kills the child.
#[derive(Debug)]
pub struct LineStream {
    child: Option<Child>,
    stdout: BufReader<ChildStdout>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    groups: ChildGroups,
}

impl LineStream {
    fn reap(&self, child: &mut Child) -> Result<ExitStatus> {
        let status = child.wait().context("wait for command");
        self.groups.remove(child.id());
        status
    }

    fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = self.reap(&mut child);
        }
    }

    fn finish(&mut self) -> Option<Result<String>> {
        let mut child = self.child.take()?;
        let status = match self.reap(&mut child) {
            Ok(status) => status,
            Err(err) => return Some(Err(err)),
        };
        debug!(exit_code = ?status.code(), "streaming command finished");
        if status.success() {
            return None;
        }
        // Give the stderr reader a moment to drain the final lines.
        thread::sleep(Duration::from_millis(50));
        let tail = self
            .stderr_tail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");
        warn!(exit_code = ?status.code(), "streaming command failed");
        Some(Err(anyhow!(
            "command failed with status {:?}{}",
            status.code(),
            if tail.is_empty() {
                String::new()
            } else {
                format!(": {tail}")
            }
        )))
    }
}

impl Iterator for LineStream {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.child.as_ref()?;
        let mut line = String::new();
        match self.stdout.read_line(&mut line) {
            Ok(0) => self.finish(),
            Ok(_) => Some(Ok(line.trim_end_matches(['\r', '\n']).to_string())),
            Err(err) => {
                self.kill();
                Some(Err(err).context("read command output"))
            }
        }
    }
}

impl Drop for LineStream {
    fn drop(&mut self) {
        if self.child.is_some() {
            debug!("killing unfinished streaming command");
            self.kill();
        }
    }
}
