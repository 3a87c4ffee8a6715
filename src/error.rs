use std::fmt;
use std::io;
use std::process::ExitStatus;

/// Errors that occur when building or executing remote commands.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The endpoint string could not be parsed.
    Endpoint(String),

    /// A copy path cannot be used (for example, the source of a copy has no
    /// base name to derive an archive name from).
    Path(String),

    /// The local shell could not be spawned.
    Spawn(io::Error),

    /// Reading a spawned process's stdout/stderr failed, or a caller-supplied
    /// output sink rejected a write.
    ChildIo(io::Error),

    /// A spawned command exited with a non-zero status.
    ///
    /// For a multi-step copy pipeline this is the error of the first failing
    /// step; later steps never ran, and no cleanup of what earlier steps left
    /// behind (a created directory, a staged archive) has been attempted.
    Exit {
        /// Exit status reported by the shell.
        status: ExitStatus,
        /// Captured standard error of the failing command.
        stderr: String,
    },

    /// Captured output exceeded the configured `max_buffer` size in bytes.
    OutputLimit(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Endpoint(ref s) => write!(f, "invalid remote endpoint `{}`", s),
            Error::Path(ref s) => write!(f, "invalid path: {}", s),
            Error::Spawn(_) => write!(f, "the local shell could not be spawned"),
            Error::ChildIo(_) => {
                write!(f, "failure while accessing standard I/O of spawned process")
            }
            Error::Exit { ref status, .. } => {
                write!(f, "command exited with {}", status)
            }
            Error::OutputLimit(limit) => {
                write!(f, "captured output exceeded max_buffer ({} bytes)", limit)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::Spawn(ref e) | Error::ChildIo(ref e) => Some(e),

            Error::Endpoint(_)
            | Error::Path(_)
            | Error::Exit { .. }
            | Error::OutputLimit(_) => None,
        }
    }
}
