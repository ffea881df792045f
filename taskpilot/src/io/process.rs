//! Helpers for running child processes with timeouts, streaming and bounded output.

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::{OutputChunk, StreamKind};

/// Exit code reported when the process never ran or was killed by a signal.
pub const NO_EXIT_CODE: i32 = -1;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    /// Set when the program could not be started at all (e.g. not installed).
    pub spawn_error: Option<String>,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out && self.spawn_error.is_none()
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    fn spawn_failed(program: &str, err: &std::io::Error, started: Instant) -> Self {
        let message = format!("failed to spawn {program}: {err}");
        Self {
            exit_code: NO_EXIT_CODE,
            stdout: Vec::new(),
            stderr: message.clone().into_bytes(),
            stdout_truncated: 0,
            stderr_truncated: 0,
            timed_out: false,
            spawn_error: Some(message),
            duration: started.elapsed(),
        }
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs; every line is also sent to `sink`
/// when one is given. `output_limit_bytes` bounds what is kept in memory per stream
/// (bytes beyond it are discarded while still draining the pipe). On timeout the whole
/// process tree is killed and a `timed out` marker is appended to stderr.
///
/// A program that cannot be spawned is reported as `exit_code = -1` with `spawn_error`
/// set rather than as an `Err`.
#[instrument(
    skip_all,
    fields(
        program = ?cmd.get_program(),
        timeout_ms = timeout.as_millis() as u64,
        output_limit_bytes
    )
)]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
    sink: Option<&Sender<OutputChunk>>,
) -> Result<CommandOutput> {
    let started = Instant::now();
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    isolate_process_group(&mut cmd);

    let program = cmd.get_program().to_string_lossy().into_owned();
    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            warn!(err = %e, program, "failed to spawn command");
            return Ok(CommandOutput::spawn_failed(&program, &e, started));
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

    let stdout_sink = sink.cloned();
    let stderr_sink = sink.cloned();
    let stdout_handle = thread::spawn(move || {
        read_stream_limited(stdout, output_limit_bytes, StreamKind::Stdout, stdout_sink)
    });
    let stderr_handle = thread::spawn(move || {
        read_stream_limited(stderr, output_limit_bytes, StreamKind::Stderr, stderr_sink)
    });

    // Feed stdin from its own thread so a child that writes before reading cannot
    // deadlock against us.
    let stdin_handle = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => {
            let input = input.to_vec();
            Some(thread::spawn(move || match pipe.write_all(&input) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
                Err(e) => Err(e),
            }))
        }
        _ => None,
    };

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "command timed out, killing process tree"
            );
            timed_out = true;
            kill_process_tree(&mut child);
            child.wait().context("wait command after kill")?
        }
    };

    if let Some(handle) = stdin_handle {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(err = %e, "failed to write stdin"),
            Err(_) => warn!("stdin writer thread panicked"),
        }
    }

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (mut stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    if timed_out {
        let marker = format!("\n[process timed out after {}ms]\n", timeout.as_millis());
        if let Some(sink) = sink {
            let _ = sink.send(OutputChunk {
                stream: StreamKind::Stderr,
                text: marker.clone(),
            });
        }
        stderr.extend_from_slice(marker.as_bytes());
    }

    let exit_code = status.code().unwrap_or(NO_EXIT_CODE);
    debug!(exit_code, timed_out, "command finished");
    Ok(CommandOutput {
        exit_code,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
        spawn_error: None,
        duration: started.elapsed(),
    })
}

/// Probe a binary by running it with `args` (usually `--version`).
///
/// Any failure to spawn, non-zero exit, or timeout counts as unavailable.
pub fn probe_command(cmd: Command, timeout: Duration) -> bool {
    match run_command_with_timeout(cmd, None, timeout, 4096, None) {
        Ok(output) => {
            debug!(
                exit_code = output.exit_code,
                timed_out = output.timed_out,
                "probe finished"
            );
            output.success()
        }
        Err(err) => {
            debug!(err = %err, "probe errored");
            false
        }
    }
}

/// Put the child in its own process group so a timeout can kill its descendants too.
pub(crate) fn isolate_process_group(cmd: &mut Command) {
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

/// Kill a child and everything it spawned. Best effort: failures are logged.
fn kill_process_tree(child: &mut Child) {
    let pid = child.id();

    #[cfg(unix)]
    let group_kill = Command::new("kill")
        .args(["-s", "KILL", "--", &format!("-{pid}")])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    #[cfg(windows)]
    let group_kill = Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    #[cfg(not(any(unix, windows)))]
    let group_kill: std::io::Result<std::process::ExitStatus> =
        Err(std::io::Error::other("no process tree kill on this platform"));

    match group_kill {
        Ok(status) if status.success() => debug!(pid, "killed process tree"),
        Ok(status) => debug!(pid, code = ?status.code(), "process tree kill reported failure"),
        Err(e) => debug!(pid, err = %e, "process tree kill unavailable"),
    }

    // The direct child may still be alive if the tree kill was unavailable.
    if let Err(e) = child.kill() {
        debug!(pid, err = %e, "direct kill after tree kill");
    }
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Read a stream line by line with a size limit, forwarding each line to `sink`.
fn read_stream_limited<R: Read>(
    reader: R,
    limit: usize,
    kind: StreamKind,
    sink: Option<Sender<OutputChunk>>,
) -> Result<(Vec<u8>, usize)> {
    let mut buf_reader = BufReader::new(reader);
    let mut collected = Vec::new();
    let mut truncated = 0usize;

    loop {
        let mut line = Vec::new();
        let n = buf_reader
            .read_until(b'\n', &mut line)
            .context("read output")?;
        if n == 0 {
            break;
        }

        if let Some(sink) = &sink {
            // A dropped receiver only means nobody is watching anymore.
            let _ = sink.send(OutputChunk {
                stream: kind,
                text: String::from_utf8_lossy(&line).into_owned(),
            });
        }

        let remaining = limit.saturating_sub(collected.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            collected.extend_from_slice(&line[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((collected, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_both_streams_and_exit_code() {
        let output = run_command_with_timeout(
            sh("echo out; echo err >&2; exit 3"),
            None,
            Duration::from_secs(5),
            1024,
            None,
        )
        .expect("run");
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout_text(), "out\n");
        assert_eq!(output.stderr_text(), "err\n");
        assert!(!output.success());
    }

    #[test]
    fn pipes_stdin_and_streams_lines() {
        let (tx, rx) = mpsc::channel();
        let output = run_command_with_timeout(
            sh("cat"),
            Some(b"line one\nline two\n"),
            Duration::from_secs(5),
            1024,
            Some(&tx),
        )
        .expect("run");
        drop(tx);

        assert!(output.success());
        let chunks: Vec<OutputChunk> = rx.iter().collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "line one\n");
        assert_eq!(chunks[1].stream, StreamKind::Stdout);
    }

    #[test]
    fn missing_binary_reports_minus_one() {
        let output = run_command_with_timeout(
            Command::new("taskpilot-definitely-not-installed"),
            None,
            Duration::from_secs(1),
            1024,
            None,
        )
        .expect("spawn failure is not an error");
        assert_eq!(output.exit_code, NO_EXIT_CODE);
        assert!(output.spawn_error.is_some());
        assert!(!probe_command(
            Command::new("taskpilot-definitely-not-installed"),
            Duration::from_secs(1)
        ));
    }

    #[test]
    fn truncates_beyond_limit() {
        let output = run_command_with_timeout(
            sh("printf 'abcdefghij'"),
            None,
            Duration::from_secs(5),
            4,
            None,
        )
        .expect("run");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stdout_truncated, 6);
    }
}
