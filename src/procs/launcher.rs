// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::future::Future;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ErrorKind;
use crate::procfile::ProcessSpec;
use crate::Error;

/// A running child, started by [`launch`]
///
/// Rules:
/// - owns the child's process group, every termination request goes to the whole group
/// - the group stays reachable through [`ProcessGroup`] after the child itself has exited
#[derive(Debug)]
pub struct ManagedProcess {
    spec: ProcessSpec,
    label: Arc<str>,
    child: Child,
    group: ProcessGroup,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

/// The process group of a launched child and the scope that stops it.
///
/// Background jobs of the shell stay in the group and may hold its output open after the shell
///  has exited, so termination requests are addressed to the group rather than the child.
#[derive(Clone, Debug)]
pub struct ProcessGroup {
    name: Arc<str>,
    pgid: Option<Pid>,
    cancel: CancellationToken,
}

/// Starts `<shell> -c <command>` for `spec`, bound to the `cancel` scope.
///
/// The child gets its own process group, stdin from `/dev/null`, and both output streams piped
///  before it starts, so no early output is lost.
pub fn launch(
    spec: ProcessSpec,
    label: Arc<str>,
    shell: &Path,
    cancel: CancellationToken,
) -> Result<ManagedProcess, Error> {
    let mut child = Command::new(shell)
        .arg("-c")
        .arg(spec.command())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ErrorKind::Spawn {
            name: spec.name().to_string(),
            source,
        })?;

    let stdout = child.stdout.take().ok_or("no stdout available")?;
    let stderr = child.stderr.take().ok_or("no stderr available")?;

    // a new process group takes the id of its leader
    let pgid = child.id().map(|pid| Pid::from_raw(pid as i32));
    info!(process = spec.name(), pid = ?pgid, "started process");

    let group = ProcessGroup {
        name: Arc::from(spec.name()),
        pgid,
        cancel,
    };

    Ok(ManagedProcess {
        spec,
        label,
        child,
        group,
        stdout: Some(stdout),
        stderr: Some(stderr),
    })
}

impl ManagedProcess {
    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    pub fn label(&self) -> &Arc<str> {
        &self.label
    }

    pub fn group(&self) -> ProcessGroup {
        self.group.clone()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Waits for the child to exit, forwarding termination requests to its group.
    ///
    /// See [`ProcessGroup::guard`]. The scope is left untouched, release it with
    ///  [`ProcessGroup::release`] once the output has been drained.
    pub async fn wait(mut self, kill: CancellationToken) -> Result<ExitStatus, Error> {
        let status = self.group.guard(&kill, self.child.wait()).await?;
        info!(process = &*self.group.name, %status, "process exited");
        Ok(status)
    }

    /// Kills the process group and reaps the child, for launches that must be rolled back
    pub async fn abort(mut self) {
        self.group.signal(Signal::SIGKILL);
        if let Err(err) = self.child.wait().await {
            warn!(process = &*self.group.name, "failed to reap aborted process: {}", err);
        }
        self.group.release();
    }
}

impl ProcessGroup {
    /// Drives `fut` to completion, sending SIGTERM to the group when the scope is cancelled and
    ///  SIGKILL when `kill` is.
    ///
    /// Without `kill` a group that ignores SIGTERM holds `fut` back indefinitely.
    pub async fn guard<F: Future>(&self, kill: &CancellationToken, fut: F) -> F::Output {
        tokio::pin!(fut);
        let mut terminated = false;
        let mut killed = false;

        loop {
            tokio::select! {
                output = &mut fut => return output,
                _ = self.cancel.cancelled(), if !terminated => {
                    terminated = true;
                    debug!(process = &*self.name, "terminating process group");
                    self.signal(Signal::SIGTERM);
                }
                _ = kill.cancelled(), if !killed => {
                    killed = true;
                    warn!(process = &*self.name, "killing process group");
                    self.signal(Signal::SIGKILL);
                }
            }
        }
    }

    /// Cancels the scope, once the child has exited and its output is drained
    pub fn release(&self) {
        self.cancel.cancel();
    }

    pub fn is_released(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn signal(&self, signal: Signal) {
        let pgid = match self.pgid {
            Some(pgid) => pgid,
            None => return,
        };

        // the group is gone once every member has exited
        match killpg(pgid, signal) {
            Ok(()) | Err(Errno::ESRCH) => (),
            Err(err) => warn!(
                process = &*self.name,
                signal = signal.as_str(),
                "failed to signal process group: {}",
                err
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncReadExt;
    use tokio::time::timeout;

    use super::*;
    use crate::config::DEFAULT_SHELL;

    fn start(command: &str, cancel: CancellationToken) -> ManagedProcess {
        launch(
            ProcessSpec::new("test", command),
            Arc::from("test"),
            Path::new(DEFAULT_SHELL),
            cancel,
        )
        .expect("launch failed")
    }

    #[tokio::test]
    async fn test_captures_both_streams() {
        let mut process = start("echo out; echo err >&2", CancellationToken::new());
        let mut stdout = process.take_stdout().expect("no stdout");
        let mut stderr = process.take_stderr().expect("no stderr");
        assert!(process.take_stdout().is_none());

        let status = process
            .wait(CancellationToken::new())
            .await
            .expect("wait failed");
        assert!(status.success());

        let mut out = String::new();
        stdout.read_to_string(&mut out).await.expect("read failed");
        let mut err = String::new();
        stderr.read_to_string(&mut err).await.expect("read failed");

        assert_eq!(out, "out\n");
        assert_eq!(err, "err\n");
    }

    #[tokio::test]
    async fn test_exit_keeps_scope_until_released() {
        let cancel = CancellationToken::new();
        let process = start("exit 3", cancel.clone());
        let group = process.group();

        let status = process
            .wait(CancellationToken::new())
            .await
            .expect("wait failed");
        assert_eq!(status.code(), Some(3));
        assert!(!cancel.is_cancelled());

        group.release();
        assert!(cancel.is_cancelled());
        assert!(group.is_released());
    }

    #[tokio::test]
    async fn test_group_reachable_after_leader_exits() {
        let cancel = CancellationToken::new();
        let mut process = start("sleep 30 & echo hi", cancel.clone());
        let group = process.group();
        let mut stdout = process.take_stdout().expect("no stdout");

        let status = process
            .wait(CancellationToken::new())
            .await
            .expect("wait failed");
        assert!(status.success());

        // the background sleep still holds stdout open
        let mut out = String::new();
        let drained = tokio::spawn(async move {
            stdout.read_to_string(&mut out).await.map(|_| out)
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!drained.is_finished());

        cancel.cancel();
        let out = timeout(
            Duration::from_secs(10),
            group.guard(&CancellationToken::new(), drained),
        )
        .await
        .expect("background job ignored SIGTERM")
        .expect("reader panicked")
        .expect("read failed");
        assert_eq!(out, "hi\n");
    }

    #[tokio::test]
    async fn test_abort_kills_and_releases() {
        let cancel = CancellationToken::new();
        let process = start("sleep 60", cancel.clone());

        timeout(Duration::from_secs(10), process.abort())
            .await
            .expect("abort did not reap the process");
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_terminates_pipeline() {
        let cancel = CancellationToken::new();
        let process = start("sleep 30 | cat", cancel.clone());

        cancel.cancel();
        let status = timeout(Duration::from_secs(10), process.wait(CancellationToken::new()))
            .await
            .expect("process ignored SIGTERM")
            .expect("wait failed");
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_kill_escalation() {
        let cancel = CancellationToken::new();
        let kill = CancellationToken::new();
        let mut process = start("trap '' TERM; echo ready; while :; do sleep 1; done", cancel.clone());

        // wait for the trap to be installed before asking it to stop
        let mut stdout = process.take_stdout().expect("no stdout");
        let mut ready = [0u8; 6];
        stdout.read_exact(&mut ready).await.expect("read failed");

        cancel.cancel();
        let wait = tokio::spawn(process.wait(kill.clone()));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!wait.is_finished());

        kill.cancel();
        let status = timeout(Duration::from_secs(10), wait)
            .await
            .expect("process survived SIGKILL")
            .expect("wait panicked")
            .expect("wait failed");
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_missing_shell_is_an_error() {
        let err = launch(
            ProcessSpec::new("web", "echo hi"),
            Arc::from("web"),
            Path::new("/nonexistent/sh"),
            CancellationToken::new(),
        )
        .unwrap_err();

        assert!(matches!(err.kind(), ErrorKind::Spawn { name, .. } if name == "web"));
    }
}
