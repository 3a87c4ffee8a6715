//! Remote command execution and file synchronization through OpenSSH.
//!
//! This crate wraps the OpenSSH client binaries (`ssh` and `scp` on most
//! machines) plus `rsync` and `tar`, and provides a convenient mechanism for
//! running commands on remote hosts and copying directory trees to and from
//! them. Since everything is executed through the stock command-line tools,
//! all your existing configuration (e.g., in `.ssh/config`) should continue
//! to work as expected.
//!
//! The entry point is a [`Connection`]: an endpoint (`[user@]host[:port]`)
//! plus a set of defaults merged at construction. A connection holds no
//! session and no background resources; every [`run`](Connection::run) and
//! [`copy`](Connection::copy) spawns its own processes, so concurrent calls
//! on the same `Connection` are independent and may run in parallel. Note
//! that copies derive their temporary archive name deterministically from
//! the source's base name, so two concurrent copies of the same source name
//! against the same host can collide; serialize those yourself if you need
//! them.
//!
//! [`copy`](Connection::copy) picks between two transfer mechanisms: if the
//! `rsync` binary is on the local PATH it builds a single differential
//! `rsync -az` invocation; otherwise it falls back to a six-step pipeline
//! that packs the source with `tar`, moves the archive with `scp`, and
//! unpacks it on the other side. The pipeline runs strictly in order and
//! stops at the first failing step. There is **no rollback**: a failure
//! after the first step can leave a created directory or a stray
//! `<name>.tmp.tar.gz` behind, and the error you get is the failing step's,
//! untouched. Remediation is deliberately left to the caller.
//!
//! # Authentication
//!
//! This library supports only password-less authentication schemes. If
//! reaching the target host requires you to provide input on standard input
//! (such as a password), this crate will not work for you. Set up
//! keypair-based authentication instead.
//!
//! # Logging
//!
//! Commands and target hosts are logged through [`tracing`] at debug level
//! before execution; without a subscriber installed this is a no-op. For
//! watching live output of long-running commands, attach sinks with
//! [`ConnectionBuilder::stdout_sink`] and each line will be forwarded
//! prefixed with `@<host> ` (or `@<host>-err ` for stderr).
//!
//! # Examples
//!
//! ```rust,no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), ssh_ferry::Error> {
//! use ssh_ferry::{Connection, CopyOptions, RunOptions};
//!
//! let conn = Connection::new("deploy@web1.example.com")?;
//! let uname = conn.run("uname -a", RunOptions::default()).await?;
//! eprintln!("{}", uname.stdout);
//!
//! conn.copy(
//!     "/local/app",
//!     "/srv/app",
//!     CopyOptions::default().exclude("node_modules"),
//! )
//! .await?;
//! # Ok(()) }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

use std::fmt;

mod command;
mod copy;
mod endpoint;
mod error;
mod executor;
mod options;

pub use copy::Direction;
pub use endpoint::Endpoint;
pub use error::Error;
pub use executor::{Output, Sink};
pub use options::{CopyOptions, KnownHosts, RunOptions, DEFAULT_MAX_BUFFER};

use copy::Strategy;
use options::{ExecOptions, RsyncOptions, SshOptions};

/// A handle for running commands against, and copying files to and from, a
/// single remote host.
///
/// A `Connection` owns its [`Endpoint`] and a configuration record merged
/// once at construction; individual calls may override parts of it without
/// mutating the connection. Dropping a `Connection` releases nothing,
/// because nothing is held.
pub struct Connection {
    endpoint: Endpoint,
    ssh: SshOptions,
    rsync: RsyncOptions,
    exec: ExecOptions,
    stdout_sink: Option<Sink>,
    stderr_sink: Option<Sink>,
}

impl Connection {
    /// Build a connection to `destination` with all defaults.
    ///
    /// The format of `destination` is the same as the `destination` argument
    /// to `ssh`: `[user@]hostname[:port]`, or a URI of the form
    /// `ssh://[user@]hostname[:port]`. A malformed destination fails here,
    /// before any command is built.
    ///
    /// For more options, see [`ConnectionBuilder`].
    pub fn new<S: AsRef<str>>(destination: S) -> Result<Self, Error> {
        ConnectionBuilder::default().build(destination)
    }

    /// The endpoint this connection targets.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Run a shell command on the remote host and wait for it to finish.
    ///
    /// The command is escaped and passed as a single argument to `ssh`, so
    /// the remote shell sees it exactly as written. A non-zero exit status
    /// surfaces as [`Error::Exit`] carrying the captured stderr.
    pub async fn run<S: AsRef<str>>(
        &self,
        command: S,
        opts: RunOptions,
    ) -> Result<Output, Error> {
        let command = command.as_ref();
        let ssh = self.ssh.merged(&opts.ssh);
        let exec = self.exec.merged(&opts.exec);

        let host = self.endpoint.to_string();
        tracing::debug!(host = %host, command, "running remote command");

        let wrapped = command::ssh_exec(&self.endpoint, command, &ssh);
        executor::run(
            &wrapped,
            &host,
            &exec,
            self.stdout_sink.as_ref(),
            self.stderr_sink.as_ref(),
        )
        .await
    }

    /// Copy a directory tree between this machine and the remote host.
    ///
    /// The direction defaults to local → remote; set
    /// [`CopyOptions::direction`] to pull instead. If `rsync` is available
    /// locally the copy is a single differential transfer; otherwise a
    /// tar-over-scp pipeline is used (see the crate docs for its
    /// partial-failure semantics). On success the returned [`Output`] is
    /// the concatenation of every executed command's output, in order.
    pub async fn copy<S: AsRef<str>, D: AsRef<str>>(
        &self,
        src: S,
        dest: D,
        opts: CopyOptions,
    ) -> Result<Output, Error> {
        let (src, dest) = (src.as_ref(), dest.as_ref());
        let ssh = self.ssh.merged(&opts.ssh);
        let rsync = self.rsync.merged(&opts.rsync);
        let exec = self.exec.merged(&opts.exec);
        let direction = opts.direction.unwrap_or(Direction::LocalToRemote);

        tracing::debug!(
            host = %self.endpoint,
            src,
            dest,
            ?direction,
            "copying"
        );

        match copy::select_strategy().await {
            Strategy::Rsync => {
                let cmd = copy::rsync_command(
                    &self.endpoint,
                    src,
                    dest,
                    direction,
                    &opts.exclude,
                    &ssh,
                    &rsync,
                );
                self.run_step(&cmd, "localhost", &exec).await
            }
            Strategy::TarScp => {
                let steps = copy::tar_scp_pipeline(
                    &self.endpoint,
                    src,
                    dest,
                    direction,
                    &opts.exclude,
                    &ssh,
                )?;
                copy::run_pipeline(
                    &steps,
                    &self.endpoint,
                    &ssh,
                    &exec,
                    self.stdout_sink.as_ref(),
                    self.stderr_sink.as_ref(),
                )
                .await
            }
        }
    }

    async fn run_step(
        &self,
        cmd: &str,
        host: &str,
        exec: &ExecOptions,
    ) -> Result<Output, Error> {
        tracing::debug!(host, command = cmd, "executing");
        executor::run(
            cmd,
            host,
            exec,
            self.stdout_sink.as_ref(),
            self.stderr_sink.as_ref(),
        )
        .await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("ssh", &self.ssh)
            .field("rsync", &self.rsync)
            .field("exec", &self.exec)
            .field("stdout_sink", &self.stdout_sink.is_some())
            .field("stderr_sink", &self.stderr_sink.is_some())
            .finish()
    }
}

/// Build a [`Connection`] with options.
///
/// Everything set here becomes the connection-level default; individual
/// [`run`](Connection::run)/[`copy`](Connection::copy) calls can override
/// any of it through [`RunOptions`]/[`CopyOptions`].
#[derive(Default)]
pub struct ConnectionBuilder {
    ssh: SshOptions,
    rsync: RsyncOptions,
    exec: ExecOptions,
    stdout_sink: Option<Sink>,
    stderr_sink: Option<Sink>,
}

impl ConnectionBuilder {
    /// Set the port to connect on.
    ///
    /// Takes precedence over a port given in the destination string passed
    /// to [`build`](ConnectionBuilder::build).
    pub fn port(mut self, port: u16) -> Self {
        self.ssh.port = Some(port);
        self
    }

    /// Set the keyfile to use (`ssh -i`).
    ///
    /// If a keyfile is given, _only_ that keyfile is offered
    /// (`IdentitiesOnly=yes`).
    pub fn keyfile(mut self, p: impl AsRef<std::path::Path>) -> Self {
        self.ssh.keyfile = Some(p.as_ref().to_path_buf());
        self
    }

    /// Set the host key checking policy. See [`KnownHosts`].
    pub fn known_hosts_check(mut self, k: KnownHosts) -> Self {
        self.ssh.known_hosts = Some(k);
        self
    }

    /// Raw arguments appended verbatim to every ssh-family invocation.
    pub fn ssh_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ssh.raw = args.into_iter().map(Into::into).collect();
        self
    }

    /// Raw arguments appended verbatim to every `rsync` invocation.
    pub fn rsync_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rsync.raw = args.into_iter().map(Into::into).collect();
        self
    }

    /// How many bytes of output a single command may produce before the
    /// call fails. Defaults to [`DEFAULT_MAX_BUFFER`].
    pub fn max_buffer(mut self, bytes: usize) -> Self {
        self.exec.max_buffer = bytes;
        self
    }

    /// Stream every line of standard output, prefixed `@<host> `, to `sink`.
    pub fn stdout_sink(mut self, sink: Sink) -> Self {
        self.stdout_sink = Some(sink);
        self
    }

    /// Stream every line of standard error, prefixed `@<host>-err `, to
    /// `sink`.
    pub fn stderr_sink(mut self, sink: Sink) -> Self {
        self.stderr_sink = Some(sink);
        self
    }

    /// Parse `destination` and produce the [`Connection`].
    pub fn build<S: AsRef<str>>(self, destination: S) -> Result<Connection, Error> {
        let endpoint = Endpoint::parse(destination.as_ref())?;
        Ok(Connection {
            endpoint,
            ssh: self.ssh,
            rsync: self.rsync,
            exec: self.exec,
            stdout_sink: self.stdout_sink,
            stderr_sink: self.stderr_sink,
        })
    }
}

impl fmt::Debug for ConnectionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBuilder")
            .field("ssh", &self.ssh)
            .field("rsync", &self.rsync)
            .field("exec", &self.exec)
            .field("stdout_sink", &self.stdout_sink.is_some())
            .field("stderr_sink", &self.stderr_sink.is_some())
            .finish()
    }
}
