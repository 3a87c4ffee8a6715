//! Formatters turning structured options into shell command strings.
//!
//! Commands are assembled as token lists and only serialized to a single
//! string here, at the boundary to the shell, with each token escaped
//! individually. Nothing in this module touches the process table except
//! [`rsync_available`], which probes for the `rsync` binary.

use std::borrow::Cow;
use std::process::Stdio;

use tokio::process;

use crate::endpoint::Endpoint;
use crate::options::{RsyncOptions, SshOptions};

/// Escape a single token for a POSIX shell.
///
/// Both sides of a transfer are assumed to run a POSIX-compliant shell, so
/// the unix escaping rules are used regardless of the local platform.
pub(crate) fn quote(s: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(Cow::Borrowed(s))
}

/// Serialize a token list into a single shell command string.
pub(crate) fn render(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| quote(t))
        .collect::<Vec<_>>()
        .join(" ")
}

/// One `--exclude <pattern>` pair per pattern, order-preserving.
///
/// The same pairs are understood by both `rsync` and `tar`.
pub(crate) fn exclude_args(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .flat_map(|p| ["--exclude".to_string(), p.clone()])
        .collect()
}

fn effective_port(endpoint: &Endpoint, ssh: &SshOptions) -> Option<u16> {
    ssh.port.or_else(|| endpoint.port())
}

/// Arguments shared by every ssh-family invocation: keyfile, host key
/// policy, raw extras. The port flag differs between the exec form (`-p`)
/// and the copy form (`-P`), so it is not part of this list.
fn common_args(ssh: &SshOptions) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(ref k) = ssh.keyfile {
        // if the user gives a keyfile, _only_ use that keyfile
        args.push("-o".to_string());
        args.push("IdentitiesOnly=yes".to_string());
        args.push("-i".to_string());
        args.push(k.display().to_string());
    }
    if let Some(ref k) = ssh.known_hosts {
        args.push("-o".to_string());
        args.push(k.as_option().to_string());
    }
    args.extend(ssh.raw.iter().cloned());
    args
}

/// Argument list for the `ssh` exec form (`-p` for the port).
pub(crate) fn ssh_args(endpoint: &Endpoint, ssh: &SshOptions) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(port) = effective_port(endpoint, ssh) {
        args.push("-p".to_string());
        args.push(port.to_string());
    }
    args.extend(common_args(ssh));
    args
}

/// Wrap `command` so that it executes on the remote side:
/// `ssh [args] user@host '<command>'`.
pub(crate) fn ssh_exec(endpoint: &Endpoint, command: &str, ssh: &SshOptions) -> String {
    let mut tokens = vec!["ssh".to_string()];
    tokens.extend(ssh_args(endpoint, ssh));
    tokens.push(endpoint.to_string());
    tokens.push(command.to_string());
    render(&tokens)
}

/// An `scp` copy between two already-resolved locations (either of which may
/// carry a `user@host:` prefix). Note the `-P` port flag: scp reserves `-p`
/// for preserving file times.
pub(crate) fn scp(src: &str, dest: &str, endpoint: &Endpoint, ssh: &SshOptions) -> String {
    let mut tokens = vec!["scp".to_string()];
    if let Some(port) = effective_port(endpoint, ssh) {
        tokens.push("-P".to_string());
        tokens.push(port.to_string());
    }
    tokens.extend(common_args(ssh));
    tokens.push(src.to_string());
    tokens.push(dest.to_string());
    render(&tokens)
}

/// A single `rsync` invocation between two already-resolved locations.
///
/// Archive and compression flags are always on. When any ssh options are in
/// effect, the transport is overridden with `-e "ssh <args>"` so that rsync
/// reaches the remote the same way `run` would.
pub(crate) fn rsync(
    src: &str,
    dest: &str,
    endpoint: &Endpoint,
    excludes: &[String],
    ssh: &SshOptions,
    rsync: &RsyncOptions,
) -> String {
    let mut tokens = vec!["rsync".to_string(), "-az".to_string()];
    tokens.extend(exclude_args(excludes));

    let transport = ssh_args(endpoint, ssh);
    if !transport.is_empty() {
        tokens.push("-e".to_string());
        tokens.push(format!("ssh {}", render(&transport)));
    }

    tokens.extend(rsync.raw.iter().cloned());
    tokens.push(src.to_string());
    tokens.push(dest.to_string());
    render(&tokens)
}

/// Probe whether the `rsync` binary is resolvable on the local PATH.
///
/// Absence is a normal outcome, not a fault: a failed spawn, a non-zero
/// exit, anything short of a clean `rsync --version` reports `false`.
pub(crate) async fn rsync_available() -> bool {
    process::Command::new("rsync")
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}
