//! Helpers for running child processes with an optional timeout and bounded output.
//!
//! On Unix every child leads its own process group. A timeout kills the whole
//! group, and whatever the child leaves running in it is killed once the child
//! exits, so background grandchildren cannot keep the pipes (or the caller) open.

use std::io::{ErrorKind, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How long to keep draining output after the child has exited.
const OUTPUT_GRACE: Duration = Duration::from_secs(1);

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

impl CommandOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    pub fn stderr_truncated_notice(&self, label: &str) -> String {
        truncated_notice(label, "stderr", self.stderr_truncated)
    }

    pub fn stdout_truncated_notice(&self, label: &str) -> String {
        truncated_notice(label, "stdout", self.stdout_truncated)
    }
}

fn truncated_notice(label: &str, stream: &str, truncated: usize) -> String {
    if truncated > 0 {
        format!("\n[{label} {stream} truncated {truncated} bytes]\n")
    } else {
        String::new()
    }
}

/// Run a command and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// With `timeout = None` the call waits for the child indefinitely. Once the child has exited,
/// output still arriving after [`OUTPUT_GRACE`] is abandoned.
#[instrument(skip_all, fields(timeout_ms = timeout.map(|t| t.as_millis() as u64), output_limit_bytes))]
pub fn run_command(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_reader = StreamReader::spawn(stdout, output_limit_bytes);
    let stderr_reader = StreamReader::spawn(stderr, output_limit_bytes);

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        match child_stdin.write_all(input) {
            Ok(()) => {}
            // The child exited without reading its input; its status tells the story.
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                debug!("child closed stdin early");
            }
            Err(e) => {
                kill_tree(&mut child);
                let _ = child.wait();
                return Err(e).context("write stdin");
            }
        }
    }

    let mut timed_out = false;
    let status = match timeout {
        Some(limit) => match child.wait_timeout(limit).context("wait for command")? {
            Some(status) => status,
            None => {
                warn!(timeout_ms = limit.as_millis() as u64, "command timed out, killing");
                timed_out = true;
                kill_tree(&mut child);
                child.wait().context("wait command after kill")?
            }
        },
        None => child.wait().context("wait for command")?,
    };
    kill_leftovers(&child);

    let deadline = Instant::now() + OUTPUT_GRACE;
    let (stdout, stdout_truncated) = stdout_reader.finish(deadline).context("collect stdout")?;
    let (stderr, stderr_truncated) = stderr_reader.finish(deadline).context("collect stderr")?;

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

/// Kill the child and everything in its process group.
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    if signal_group(child).is_err() {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

/// Kill whatever the exited child left running in its group.
#[cfg(unix)]
fn kill_leftovers(child: &Child) {
    match signal_group(child) {
        Ok(()) => debug!("killed processes left behind by the child"),
        Err(nix::errno::Errno::ESRCH) => {}
        Err(err) => warn!(%err, "failed to signal child process group"),
    }
}

#[cfg(not(unix))]
fn kill_leftovers(_child: &Child) {}

#[cfg(unix)]
fn signal_group(child: &Child) -> std::result::Result<(), nix::errno::Errno> {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = i32::try_from(child.id()).map_err(|_| nix::errno::Errno::ESRCH)?;
    killpg(Pid::from_raw(pgid), Signal::SIGKILL)
}

/// Bytes kept from one stream, and how many were dropped past the limit.
#[derive(Debug, Default)]
struct Capture {
    bytes: Vec<u8>,
    truncated: usize,
}

/// Background reader for one output pipe.
///
/// The buffer is shared so that the caller can take what has been read even
/// when the pipe never closes.
struct StreamReader {
    capture: Arc<Mutex<Capture>>,
    finished: Receiver<Result<()>>,
}

impl StreamReader {
    fn spawn<R: Read + Send + 'static>(reader: R, limit: usize) -> Self {
        let capture = Arc::new(Mutex::new(Capture::default()));
        let (tx, finished) = mpsc::channel();
        let shared = Arc::clone(&capture);
        thread::spawn(move || {
            let _ = tx.send(read_stream_limited(reader, limit, &shared));
        });
        Self { capture, finished }
    }

    /// Wait for end of stream until `deadline`, then take what was read.
    fn finish(self, deadline: Instant) -> Result<(Vec<u8>, usize)> {
        let wait = deadline.saturating_duration_since(Instant::now());
        match self.finished.recv_timeout(wait) {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => {
                warn!("output pipe still open after the child exited, abandoning it");
            }
            Err(RecvTimeoutError::Disconnected) => bail!("output reader thread panicked"),
        }
        let mut capture = self
            .capture
            .lock()
            .map_err(|_| anyhow!("output buffer poisoned"))?;
        Ok((std::mem::take(&mut capture.bytes), capture.truncated))
    }
}

fn read_stream_limited<R: Read>(
    mut reader: R,
    limit: usize,
    capture: &Mutex<Capture>,
) -> Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            return Ok(());
        }
        let mut capture = capture
            .lock()
            .map_err(|_| anyhow!("output buffer poisoned"))?;
        let remaining = limit.saturating_sub(capture.bytes.len());
        let keep = n.min(remaining);
        capture.bytes.extend_from_slice(&chunk[..keep]);
        capture.truncated += n - keep;
    }
}

/// Last stdout line that starts with `marker`, with the marker stripped.
pub fn marked_line<'a>(stdout: &'a str, marker: &str) -> Option<&'a str> {
    stdout
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(marker))
        .map(str::trim)
}
