//! Runs a single shell command on the local machine, capturing its output.
//!
//! Everything this crate does goes through [`run`], including "remote"
//! steps, which arrive here already wrapped as `ssh host '<command>'`. The command
//! string is handed to `sh -c`, both output pipes are drained concurrently,
//! and each completed line is optionally streamed to a caller-supplied sink
//! with an `@<host>` prefix so that interleaved output from several hosts
//! stays attributable.

use std::io::Write;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process;

use crate::error::Error;
use crate::options::ExecOptions;

/// Where streamed output lines go.
///
/// Lines written to the stdout sink are prefixed `@<host> `, lines written
/// to the stderr sink `@<host>-err `. The sink is shared across concurrent
/// calls on the same [`Connection`](crate::Connection), hence the lock.
pub type Sink = Arc<Mutex<dyn Write + Send>>;

/// Captured output of a command, or the in-order concatenation across every
/// step of a copy pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

pub(crate) async fn run(
    command: &str,
    host: &str,
    exec: &ExecOptions,
    stdout_sink: Option<&Sink>,
    stderr_sink: Option<&Sink>,
) -> Result<Output, Error> {
    let mut child = process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(Error::Spawn)?;

    let out_pipe = child.stdout.take().unwrap();
    let err_pipe = child.stderr.take().unwrap();

    let out_prefix = format!("@{} ", host);
    let err_prefix = format!("@{}-err ", host);

    // both pipes must be drained before wait(), and concurrently with each
    // other: the child blocks once either pipe's buffer fills up.
    let (stdout, stderr) = tokio::try_join!(
        drain(out_pipe, exec.max_buffer, stdout_sink, &out_prefix),
        drain(err_pipe, exec.max_buffer, stderr_sink, &err_prefix),
    )?;

    let status = child.wait().await.map_err(Error::ChildIo)?;
    if !status.success() {
        return Err(Error::Exit { status, stderr });
    }

    Ok(Output { stdout, stderr })
}

/// Read a pipe to EOF, capturing the bytes and forwarding completed lines
/// to `sink`. Capture is byte-faithful; only the streamed copy is
/// line-oriented.
async fn drain<R: AsyncRead + Unpin>(
    mut pipe: R,
    max_buffer: usize,
    sink: Option<&Sink>,
    prefix: &str,
) -> Result<String, Error> {
    let mut captured = Vec::new();
    let mut line = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = pipe.read(&mut chunk).await.map_err(Error::ChildIo)?;
        if n == 0 {
            break;
        }
        if captured.len() + n > max_buffer {
            return Err(Error::OutputLimit(max_buffer));
        }
        captured.extend_from_slice(&chunk[..n]);

        if let Some(sink) = sink {
            for &b in &chunk[..n] {
                if b == b'\n' {
                    emit(sink, prefix, &line)?;
                    line.clear();
                } else {
                    line.push(b);
                }
            }
        }
    }

    if let Some(sink) = sink {
        if !line.is_empty() {
            emit(sink, prefix, &line)?;
        }
    }

    Ok(String::from_utf8_lossy(&captured).into_owned())
}

fn emit(sink: &Sink, prefix: &str, line: &[u8]) -> Result<(), Error> {
    // a sink that panicked mid-write poisons the lock; the buffer may hold
    // a torn line, but that must not take every later line down with it
    let mut w = sink.lock().unwrap_or_else(|e| e.into_inner());
    w.write_all(prefix.as_bytes()).map_err(Error::ChildIo)?;
    w.write_all(line).map_err(Error::ChildIo)?;
    w.write_all(b"\n").map_err(Error::ChildIo)?;
    Ok(())
}
