use std::path::{Path, PathBuf};

use crate::copy::Direction;

/// Built-in default for [`max_buffer`](crate::ConnectionBuilder::max_buffer):
/// how many bytes of stdout (and, separately, stderr) a single command may
/// produce before the call fails with [`Error::OutputLimit`](crate::Error).
pub const DEFAULT_MAX_BUFFER: usize = 1000 * 1024 * 1024;

/// Specifies how the remote host's key fingerprint should be handled.
#[derive(Debug, Clone)]
pub enum KnownHosts {
    /// The host's fingerprint must match what is in the known hosts file.
    ///
    /// If the host is not in the known hosts file, the connection is rejected.
    ///
    /// This corresponds to `-o StrictHostKeyChecking=yes`.
    Strict,
    /// Strict, but if the host is not already in the known hosts file, it
    /// will be added.
    ///
    /// This corresponds to `-o StrictHostKeyChecking=accept-new`.
    Add,
    /// Accept whatever key the server provides and add it to the known hosts
    /// file.
    ///
    /// This corresponds to `-o StrictHostKeyChecking=no`.
    Accept,
}

impl KnownHosts {
    pub(crate) fn as_option(&self) -> &'static str {
        match *self {
            KnownHosts::Strict => "StrictHostKeyChecking=yes",
            KnownHosts::Add => "StrictHostKeyChecking=accept-new",
            KnownHosts::Accept => "StrictHostKeyChecking=no",
        }
    }
}

/// Connection-level ssh defaults, shared by the `ssh` exec form and the
/// `scp`/`rsync` transports.
#[derive(Debug, Clone, Default)]
pub(crate) struct SshOptions {
    pub(crate) port: Option<u16>,
    pub(crate) keyfile: Option<PathBuf>,
    pub(crate) known_hosts: Option<KnownHosts>,
    pub(crate) raw: Vec<String>,
}

impl SshOptions {
    /// Merge call-level overrides over these options. Set call-level keys
    /// win; unset keys fall through.
    pub(crate) fn merged(&self, over: &SshOverride) -> SshOptions {
        SshOptions {
            port: over.port.or(self.port),
            keyfile: over.keyfile.clone().or_else(|| self.keyfile.clone()),
            known_hosts: over.known_hosts.clone().or_else(|| self.known_hosts.clone()),
            raw: over.raw.clone().unwrap_or_else(|| self.raw.clone()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SshOverride {
    pub(crate) port: Option<u16>,
    pub(crate) keyfile: Option<PathBuf>,
    pub(crate) known_hosts: Option<KnownHosts>,
    pub(crate) raw: Option<Vec<String>>,
}

/// Connection-level rsync defaults (raw trailing arguments only; archive
/// and compression flags are always on).
#[derive(Debug, Clone, Default)]
pub(crate) struct RsyncOptions {
    pub(crate) raw: Vec<String>,
}

impl RsyncOptions {
    pub(crate) fn merged(&self, over: &RsyncOverride) -> RsyncOptions {
        RsyncOptions {
            raw: over.raw.clone().unwrap_or_else(|| self.raw.clone()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RsyncOverride {
    pub(crate) raw: Option<Vec<String>>,
}

/// Connection-level execution defaults.
#[derive(Debug, Clone)]
pub(crate) struct ExecOptions {
    pub(crate) max_buffer: usize,
}

impl Default for ExecOptions {
    fn default() -> Self {
        ExecOptions {
            max_buffer: DEFAULT_MAX_BUFFER,
        }
    }
}

impl ExecOptions {
    pub(crate) fn merged(&self, over: &ExecOverride) -> ExecOptions {
        ExecOptions {
            max_buffer: over.max_buffer.unwrap_or(self.max_buffer),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ExecOverride {
    pub(crate) max_buffer: Option<usize>,
}

/// Call-level overrides for [`Connection::run`](crate::Connection::run).
///
/// Every field is optional; unset fields fall back to the values configured
/// on the [`Connection`](crate::Connection), which in turn fall back to the
/// built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub(crate) ssh: SshOverride,
    pub(crate) exec: ExecOverride,
}

impl RunOptions {
    /// Override the port to connect on (`ssh -p`).
    pub fn port(mut self, port: u16) -> Self {
        self.ssh.port = Some(port);
        self
    }

    /// Override the keyfile to use (`ssh -i`, with `IdentitiesOnly=yes`).
    pub fn keyfile(mut self, p: impl AsRef<Path>) -> Self {
        self.ssh.keyfile = Some(p.as_ref().to_path_buf());
        self
    }

    /// Override the host key checking policy. See [`KnownHosts`].
    pub fn known_hosts_check(mut self, k: KnownHosts) -> Self {
        self.ssh.known_hosts = Some(k);
        self
    }

    /// Replace the raw arguments appended verbatim to the `ssh` invocation.
    pub fn ssh_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ssh.raw = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Override the output capture limit, in bytes.
    pub fn max_buffer(mut self, bytes: usize) -> Self {
        self.exec.max_buffer = Some(bytes);
        self
    }
}

/// Call-level overrides for [`Connection::copy`](crate::Connection::copy).
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    pub(crate) direction: Option<Direction>,
    pub(crate) exclude: Vec<String>,
    pub(crate) ssh: SshOverride,
    pub(crate) rsync: RsyncOverride,
    pub(crate) exec: ExecOverride,
}

impl CopyOptions {
    /// Set the transfer direction.
    ///
    /// Defaults to [`Direction::LocalToRemote`].
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Add a pattern to exclude from the transfer.
    ///
    /// Patterns are passed through in order, one `--exclude <pattern>` pair
    /// each, to `rsync` or `tar` depending on the chosen strategy.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    /// Override the port to connect on.
    pub fn port(mut self, port: u16) -> Self {
        self.ssh.port = Some(port);
        self
    }

    /// Override the keyfile to use (`-i`, with `IdentitiesOnly=yes`).
    pub fn keyfile(mut self, p: impl AsRef<Path>) -> Self {
        self.ssh.keyfile = Some(p.as_ref().to_path_buf());
        self
    }

    /// Override the host key checking policy. See [`KnownHosts`].
    pub fn known_hosts_check(mut self, k: KnownHosts) -> Self {
        self.ssh.known_hosts = Some(k);
        self
    }

    /// Replace the raw arguments appended to ssh/scp invocations.
    pub fn ssh_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ssh.raw = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the raw arguments appended to the `rsync` invocation.
    pub fn rsync_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rsync.raw = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Override the output capture limit, in bytes.
    pub fn max_buffer(mut self, bytes: usize) -> Self {
        self.exec.max_buffer = Some(bytes);
        self
    }
}
