//! Copy strategy selection and pipeline construction.
//!
//! A copy either becomes one `rsync` invocation, or, when rsync is not on
//! the local PATH, a fixed six-step pipeline of `tar`, `mkdir`, `scp` and
//! `rm` commands. Which end of the transfer a path or a command belongs to
//! is derived from the transfer [`Direction`] in exactly one place,
//! [`Direction::side_of`], so that path prefixing and ssh-wrapping can
//! never disagree.

use std::path::Path;

use crate::command;
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::executor::{self, Output, Sink};
use crate::options::{ExecOptions, RsyncOptions, SshOptions};

/// Which way a copy moves between the local machine and the remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `src` is a local path, `dest` lives on the remote endpoint.
    LocalToRemote,
    /// `src` lives on the remote endpoint, `dest` is a local path.
    RemoteToLocal,
}

/// Which machine a path or a command step is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Local,
    Remote,
}

/// The two ends of a copy, before direction is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PathSide {
    Src,
    Dest,
}

impl Direction {
    pub(crate) fn side_of(self, path: PathSide) -> Side {
        match (self, path) {
            (Direction::LocalToRemote, PathSide::Src) => Side::Local,
            (Direction::LocalToRemote, PathSide::Dest) => Side::Remote,
            (Direction::RemoteToLocal, PathSide::Src) => Side::Remote,
            (Direction::RemoteToLocal, PathSide::Dest) => Side::Local,
        }
    }
}

/// One of the two interchangeable transfer mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Strategy {
    Rsync,
    TarScp,
}

/// Probe the local environment and pick a strategy.
///
/// Deterministic given the probe result; probe failure means fallback,
/// never an error.
pub(crate) async fn select_strategy() -> Strategy {
    if command::rsync_available().await {
        Strategy::Rsync
    } else {
        Strategy::TarScp
    }
}

/// Resolve a path against the side it lives on: remote paths get the
/// `user@host:` prefix, local paths stay bare.
fn locate(path: &str, side: Side, endpoint: &Endpoint) -> String {
    match side {
        Side::Local => path.to_string(),
        Side::Remote => format!("{}:{}", endpoint, path),
    }
}

/// The single rsync invocation for a copy. Always runs locally.
pub(crate) fn rsync_command(
    endpoint: &Endpoint,
    src: &str,
    dest: &str,
    direction: Direction,
    excludes: &[String],
    ssh: &SshOptions,
    rsync: &RsyncOptions,
) -> String {
    let src = locate(src, direction.side_of(PathSide::Src), endpoint);
    let dest = locate(dest, direction.side_of(PathSide::Dest), endpoint);
    command::rsync(&src, &dest, endpoint, excludes, ssh, rsync)
}

/// One shell command of a copy pipeline, tagged with the side it must
/// execute on. Remote-side steps are wrapped as `ssh host '<command>'` by
/// [`resolve_step`] just before execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Step {
    pub(crate) command: String,
    pub(crate) side: Side,
}

/// Build the fallback pipeline: pack, prepare destination, transfer,
/// clean up the source archive, unpack, clean up the destination archive.
///
/// Steps must run strictly in order, since each one depends on the side
/// effects of the previous, and there is no rollback: a failure mid-pipeline
/// leaves whatever the earlier steps created in place, and the caller gets
/// the failing step's error untouched.
pub(crate) fn tar_scp_pipeline(
    endpoint: &Endpoint,
    src: &str,
    dest: &str,
    direction: Direction,
    excludes: &[String],
    ssh: &SshOptions,
) -> Result<Vec<Step>, Error> {
    let path = Path::new(src);
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Path(format!("`{}` has no base name to archive", src)))?
        .to_string();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy().into_owned(),
        _ => ".".to_string(),
    };
    let archive = format!("{}.tmp.tar.gz", name);

    let src_side = direction.side_of(PathSide::Src);
    let dest_side = direction.side_of(PathSide::Dest);

    // 1. pack: from within the source's parent, so the archive holds a
    //    single top-level directory named after the source
    let mut pack = vec!["tar".to_string()];
    pack.extend(command::exclude_args(excludes));
    pack.push("-czf".to_string());
    pack.push(archive.clone());
    pack.push(name);
    let pack = Step {
        command: format!("cd {} && {}", command::quote(&parent), command::render(&pack)),
        side: src_side,
    };

    // 2. make sure the destination directory exists
    let mkdir = Step {
        command: format!("mkdir -p {}", command::quote(dest)),
        side: dest_side,
    };

    // 3. move the archive across; the one step that crosses the boundary,
    //    so it always runs locally and the remote end shows up as a
    //    `user@host:` path
    let archive_src = locate(&format!("{}/{}", parent, archive), src_side, endpoint);
    let archive_dest = locate(&format!("{}/{}", dest, archive), dest_side, endpoint);
    let transfer = Step {
        command: command::scp(&archive_src, &archive_dest, endpoint, ssh),
        side: Side::Local,
    };

    // 4. drop the archive on the source side
    let clean_src = Step {
        command: format!(
            "cd {} && rm {}",
            command::quote(&parent),
            command::quote(&archive)
        ),
        side: src_side,
    };

    // 5. unpack inside dest, discarding the top-level directory captured
    //    during packing so the contents land directly in dest
    let unpack = Step {
        command: format!(
            "cd {} && tar -xzf {} --strip-components 1",
            command::quote(dest),
            command::quote(&archive)
        ),
        side: dest_side,
    };

    // 6. drop the archive on the destination side
    let clean_dest = Step {
        command: format!(
            "cd {} && rm {}",
            command::quote(dest),
            command::quote(&archive)
        ),
        side: dest_side,
    };

    Ok(vec![pack, mkdir, transfer, clean_src, unpack, clean_dest])
}

/// Turn a step into the command string actually handed to the local shell,
/// plus the host label its output is attributed to.
pub(crate) fn resolve_step(
    step: &Step,
    endpoint: &Endpoint,
    ssh: &SshOptions,
) -> (String, String) {
    match step.side {
        Side::Local => (step.command.clone(), "localhost".to_string()),
        Side::Remote => (
            command::ssh_exec(endpoint, &step.command, ssh),
            endpoint.to_string(),
        ),
    }
}

/// Execute a pipeline strictly sequentially: each step starts only after
/// the previous one succeeded, the first failure aborts the rest with that
/// step's error, and no compensating commands are issued. On success the
/// outputs are concatenated in step order.
pub(crate) async fn run_pipeline(
    steps: &[Step],
    endpoint: &Endpoint,
    ssh: &SshOptions,
    exec: &ExecOptions,
    stdout_sink: Option<&Sink>,
    stderr_sink: Option<&Sink>,
) -> Result<Output, Error> {
    let mut aggregated = Output::default();
    for step in steps {
        let (cmd, host) = resolve_step(step, endpoint, ssh);
        tracing::debug!(host = %host, command = %cmd, "executing");
        let out = executor::run(&cmd, &host, exec, stdout_sink, stderr_sink).await?;
        aggregated.stdout.push_str(&out.stdout);
        aggregated.stderr.push_str(&out.stderr);
    }
    Ok(aggregated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn endpoint(s: &str) -> Endpoint {
        Endpoint::parse(s).unwrap()
    }

    #[test]
    fn side_resolution_is_symmetric() {
        use Direction::*;
        use PathSide::*;
        assert_eq!(LocalToRemote.side_of(Src), Side::Local);
        assert_eq!(LocalToRemote.side_of(Dest), Side::Remote);
        assert_eq!(RemoteToLocal.side_of(Src), Side::Remote);
        assert_eq!(RemoteToLocal.side_of(Dest), Side::Local);
    }

    #[test]
    fn rsync_prefixes_dest_for_local_to_remote() {
        let e = endpoint("user@host");
        let cmd = rsync_command(
            &e,
            "/local/app",
            "/srv/app",
            Direction::LocalToRemote,
            &[],
            &SshOptions::default(),
            &RsyncOptions::default(),
        );
        assert_eq!(cmd, "rsync -az /local/app 'user@host:/srv/app'");
    }

    #[test]
    fn rsync_prefixes_src_for_remote_to_local() {
        let e = endpoint("user@host");
        let cmd = rsync_command(
            &e,
            "/srv/app",
            "/local/app",
            Direction::RemoteToLocal,
            &[],
            &SshOptions::default(),
            &RsyncOptions::default(),
        );
        assert_eq!(cmd, "rsync -az 'user@host:/srv/app' /local/app");
    }

    #[test]
    fn pipeline_has_six_steps_in_fixed_order() {
        let e = endpoint("user@host");
        let steps = tar_scp_pipeline(
            &e,
            "/a/b/proj",
            "/srv/proj",
            Direction::LocalToRemote,
            &[],
            &SshOptions::default(),
        )
        .unwrap();

        assert_eq!(steps.len(), 6);
        assert!(steps[0].command.contains("tar"));
        assert!(steps[0].command.contains("-czf"));
        assert!(steps[1].command.starts_with("mkdir -p"));
        assert!(steps[2].command.starts_with("scp"));
        assert!(steps[3].command.ends_with("rm proj.tmp.tar.gz"));
        assert!(steps[4].command.contains("tar -xzf"));
        assert!(steps[4].command.contains("--strip-components 1"));
        assert!(steps[5].command.ends_with("rm proj.tmp.tar.gz"));
    }

    #[test]
    fn archive_is_named_after_source_basename_and_packed_from_parent() {
        let e = endpoint("user@host");
        let steps = tar_scp_pipeline(
            &e,
            "/a/b/proj",
            "/srv/proj",
            Direction::LocalToRemote,
            &[],
            &SshOptions::default(),
        )
        .unwrap();

        assert_eq!(steps[0].command, "cd /a/b && tar -czf proj.tmp.tar.gz proj");
    }

    #[test]
    fn bare_source_name_packs_from_current_directory() {
        let e = endpoint("user@host");
        let steps = tar_scp_pipeline(
            &e,
            "proj",
            "/srv/proj",
            Direction::LocalToRemote,
            &[],
            &SshOptions::default(),
        )
        .unwrap();
        assert_eq!(steps[0].command, "cd . && tar -czf proj.tmp.tar.gz proj");
    }

    #[test]
    fn source_without_basename_is_rejected() {
        let e = endpoint("user@host");
        let err = tar_scp_pipeline(
            &e,
            "/",
            "/srv",
            Direction::LocalToRemote,
            &[],
            &SshOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Path(_)));
    }

    #[test]
    fn local_to_remote_sides() {
        let e = endpoint("user@host");
        let steps = tar_scp_pipeline(
            &e,
            "/local/app",
            "/srv/app",
            Direction::LocalToRemote,
            &[],
            &SshOptions::default(),
        )
        .unwrap();

        let sides: Vec<Side> = steps.iter().map(|s| s.side).collect();
        assert_eq!(
            sides,
            [
                Side::Local,  // pack on src side
                Side::Remote, // mkdir on dest side
                Side::Local,  // transfer always local
                Side::Local,  // rm archive on src side
                Side::Remote, // unpack on dest side
                Side::Remote, // rm archive on dest side
            ]
        );
    }

    #[test]
    fn remote_to_local_sides_invert() {
        let e = endpoint("user@host");
        let steps = tar_scp_pipeline(
            &e,
            "/srv/app",
            "/local/app",
            Direction::RemoteToLocal,
            &[],
            &SshOptions::default(),
        )
        .unwrap();

        let sides: Vec<Side> = steps.iter().map(|s| s.side).collect();
        assert_eq!(
            sides,
            [
                Side::Remote,
                Side::Local,
                Side::Local,
                Side::Remote,
                Side::Local,
                Side::Local,
            ]
        );
    }

    #[test]
    fn end_to_end_local_to_remote_pipeline() {
        let e = endpoint("user@host");
        let ssh = SshOptions::default();
        let steps = tar_scp_pipeline(
            &e,
            "/local/app",
            "/srv/app",
            Direction::LocalToRemote,
            &["node_modules".to_string()],
            &ssh,
        )
        .unwrap();

        let resolved: Vec<String> = steps
            .iter()
            .map(|s| resolve_step(s, &e, &ssh).0)
            .collect();

        assert_eq!(
            resolved,
            [
                "cd /local && tar --exclude node_modules -czf app.tmp.tar.gz app",
                "ssh 'user@host' 'mkdir -p /srv/app'",
                "scp /local/app.tmp.tar.gz 'user@host:/srv/app/app.tmp.tar.gz'",
                "cd /local && rm app.tmp.tar.gz",
                "ssh 'user@host' 'cd /srv/app && tar -xzf app.tmp.tar.gz --strip-components 1'",
                "ssh 'user@host' 'cd /srv/app && rm app.tmp.tar.gz'",
            ]
        );
    }

    #[test]
    fn remote_to_local_transfer_pulls_from_remote() {
        let e = endpoint("user@host:2222");
        let ssh = SshOptions::default();
        let steps = tar_scp_pipeline(
            &e,
            "/srv/app",
            "/local/app",
            Direction::RemoteToLocal,
            &[],
            &ssh,
        )
        .unwrap();

        assert_eq!(
            steps[2].command,
            "scp -P 2222 'user@host:/srv/app.tmp.tar.gz' /local/app/app.tmp.tar.gz"
        );
        let (cmd, host) = resolve_step(&steps[0], &e, &ssh);
        assert_eq!(cmd, "ssh -p 2222 'user@host' 'cd /srv && tar -czf app.tmp.tar.gz app'");
        assert_eq!(host, "user@host");
    }

    #[test]
    fn resolve_step_labels() {
        let e = endpoint("deploy@web1");
        let ssh = SshOptions::default();
        let local = Step {
            command: "mkdir -p /tmp/x".to_string(),
            side: Side::Local,
        };
        let remote = Step {
            command: "mkdir -p /tmp/x".to_string(),
            side: Side::Remote,
        };
        assert_eq!(
            resolve_step(&local, &e, &ssh),
            ("mkdir -p /tmp/x".to_string(), "localhost".to_string())
        );
        assert_eq!(
            resolve_step(&remote, &e, &ssh),
            (
                "ssh 'deploy@web1' 'mkdir -p /tmp/x'".to_string(),
                "deploy@web1".to_string()
            )
        );
    }

    #[tokio::test]
    async fn failing_step_aborts_pipeline_without_compensation() {
        use crate::options::ExecOptions;

        let tmp = tempfile::tempdir().unwrap();
        let before = tmp.path().join("before");
        let after = tmp.path().join("after");

        let step = |cmd: String| Step {
            command: cmd,
            side: Side::Local,
        };
        let steps = vec![
            step(format!("touch {}", command::quote(before.to_str().unwrap()))),
            step("echo failing now >&2; exit 7".to_string()),
            step(format!("touch {}", command::quote(after.to_str().unwrap()))),
        ];

        let e = endpoint("user@host");
        let err = run_pipeline(
            &steps,
            &e,
            &SshOptions::default(),
            &ExecOptions::default(),
            None,
            None,
        )
        .await
        .unwrap_err();

        // the failing step's error, untouched
        match err {
            Error::Exit { status, stderr } => {
                assert_eq!(status.code(), Some(7));
                assert_eq!(stderr, "failing now\n");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // earlier side effects stay in place, later steps never ran
        assert!(before.exists());
        assert!(!after.exists());
    }

    #[tokio::test]
    async fn pipeline_output_is_concatenated_in_step_order() {
        use crate::options::ExecOptions;

        let step = |cmd: &str| Step {
            command: cmd.to_string(),
            side: Side::Local,
        };
        let steps = vec![step("echo one"), step("echo two"), step("echo three")];

        let e = endpoint("user@host");
        let out = run_pipeline(
            &steps,
            &e,
            &SshOptions::default(),
            &ExecOptions::default(),
            None,
            None,
        )
        .await
        .unwrap();
        assert_eq!(out.stdout, "one\ntwo\nthree\n");
    }

    // the pack step is a real command; make sure it actually produces an
    // archive that unpacks the way step 5 expects
    #[tokio::test]
    async fn pack_and_unpack_steps_round_trip_locally() {
        use crate::executor;
        use crate::options::ExecOptions;

        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("proj");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("file.txt"), "payload").unwrap();
        std::fs::create_dir(src.join("skipped")).unwrap();
        std::fs::write(src.join("skipped/unwanted"), "x").unwrap();
        let dest = tmp.path().join("out");

        let e = endpoint("user@host");
        let steps = tar_scp_pipeline(
            &e,
            src.to_str().unwrap(),
            dest.to_str().unwrap(),
            Direction::LocalToRemote,
            &["skipped".to_string()],
            &SshOptions::default(),
        )
        .unwrap();

        let exec = ExecOptions::default();
        // run pack (step 1) as-is; run the dest-side steps 2, 5, 6 unwrapped
        // so the whole pipeline stays on this machine, and replace scp with
        // its local degenerate case
        executor::run(&steps[0].command, "localhost", &exec, None, None)
            .await
            .unwrap();
        executor::run(&steps[1].command, "localhost", &exec, None, None)
            .await
            .unwrap();
        let archive = tmp.path().join("proj.tmp.tar.gz");
        assert!(archive.exists());
        std::fs::copy(&archive, dest.join("proj.tmp.tar.gz")).unwrap();
        executor::run(&steps[3].command, "localhost", &exec, None, None)
            .await
            .unwrap();
        executor::run(&steps[4].command, "localhost", &exec, None, None)
            .await
            .unwrap();
        executor::run(&steps[5].command, "localhost", &exec, None, None)
            .await
            .unwrap();

        assert!(!archive.exists());
        assert_eq!(
            std::fs::read_to_string(dest.join("file.txt")).unwrap(),
            "payload"
        );
        assert!(!dest.join("skipped").exists());
    }
}
