//! Helpers for running child processes with live output and bounded capture.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, error, instrument, warn};

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    /// Tail of stdout and stderr, interleaved in arrival order.
    pub combined: Vec<u8>,
    /// Leading bytes dropped to keep `combined` within the output limit.
    pub truncated: usize,
}

impl CommandOutput {
    pub fn combined_lossy(&self) -> String {
        let tail = String::from_utf8_lossy(&self.combined);
        if self.truncated > 0 {
            format!("[output truncated {} bytes]\n{tail}", self.truncated)
        } else {
            tail.into_owned()
        }
    }
}

/// Where a child's output is echoed while it is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    /// Forward stdout/stderr to the parent's stdout/stderr.
    Console,
    /// Capture only.
    Silent,
}

/// Keeps the last `limit` bytes; failures are usually reported at the end.
#[derive(Debug, Default)]
struct Capture {
    buf: VecDeque<u8>,
    limit: usize,
    truncated: usize,
}

impl Capture {
    fn push(&mut self, chunk: &[u8]) {
        self.buf.extend(chunk);
        let excess = self.buf.len().saturating_sub(self.limit);
        if excess > 0 {
            self.buf.drain(..excess);
            self.truncated += excess;
        }
    }
}

/// Run a command to completion, echoing its output live and capturing both
/// streams into one buffer bounded by `output_limit_bytes`.
///
/// Each pipe is drained by its own thread so a chatty child can never block on
/// a full pipe. Both threads are joined before returning, even when waiting on
/// the child fails.
#[instrument(skip_all, fields(output_limit_bytes, echo = ?echo))]
pub fn run_command_streaming(
    mut cmd: Command,
    output_limit_bytes: usize,
    echo: Echo,
) -> io::Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e);
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("stderr was not piped"))?;

    let capture = Arc::new(Mutex::new(Capture {
        limit: output_limit_bytes,
        ..Capture::default()
    }));

    let (out_sink, err_sink): (Box<dyn Write + Send>, Box<dyn Write + Send>) = match echo {
        Echo::Console => (Box::new(io::stdout()), Box::new(io::stderr())),
        Echo::Silent => (Box::new(io::sink()), Box::new(io::sink())),
    };

    let out_capture = Arc::clone(&capture);
    let stdout_handle = thread::spawn(move || tee_chunks(stdout, out_sink, &out_capture));
    let err_capture = Arc::clone(&capture);
    let stderr_handle = thread::spawn(move || tee_chunks(stderr, err_sink, &err_capture));

    let waited = child.wait();
    if let Err(e) = &waited {
        error!(err = %e, "failed to wait for command, killing");
        let _ = child.kill();
    }
    let status = join_after_wait(waited, [stdout_handle, stderr_handle])?;

    let (combined, truncated) = match capture.lock() {
        Ok(mut cap) => (Vec::from(std::mem::take(&mut cap.buf)), cap.truncated),
        Err(_) => return Err(io::Error::other("output capture lock poisoned")),
    };
    if truncated > 0 {
        warn!(truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), "command finished");
    Ok(CommandOutput {
        status,
        combined,
        truncated,
    })
}

type Reader = thread::JoinHandle<io::Result<()>>;

/// Join every reader, then report the wait error first, else the first reader error.
fn join_after_wait(waited: io::Result<ExitStatus>, readers: [Reader; 2]) -> io::Result<ExitStatus> {
    let joined: Vec<io::Result<()>> = readers.into_iter().map(join_reader).collect();
    let status = waited?;
    for result in joined {
        result?;
    }
    Ok(status)
}

fn join_reader(handle: Reader) -> io::Result<()> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(io::Error::other("output reader thread panicked")),
    }
}

/// Copy `reader` in fixed-size chunks into `sink` (flushing each) and `capture`.
fn tee_chunks<R: Read>(
    mut reader: R,
    mut sink: Box<dyn Write + Send>,
    capture: &Mutex<Capture>,
) -> io::Result<()> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        if let Err(e) = sink.write_all(&chunk[..n]) {
            warn!(err = %e, "failed to echo child output");
        } else if let Err(e) = sink.flush() {
            warn!(err = %e, "failed to flush child output");
        }

        if let Ok(mut cap) = capture.lock() {
            cap.push(&chunk[..n]);
        }
    }
    Ok(())
}
