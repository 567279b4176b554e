//! Subject process supervision.
//!
//! The analyzer runs in its own process group. Whatever way supervision ends
//! (exit, timeout, cancellation, or the future being dropped), the guard kills
//! the whole group so no traced grandchild outlives the run.

use std::io;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{HarnessError, Result};

/// Kills a process group on drop.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid {
            kill_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg only sends a signal; a group that already exited
    // yields ESRCH, which is ignored.
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

#[cfg(unix)]
fn configure_child(command: &mut Command, unlimited_stack: bool) {
    // SAFETY: the closure runs between fork and exec and only calls
    // async-signal-safe functions (setpgid, getrlimit, setrlimit).
    unsafe {
        command.pre_exec(move || {
            if libc::setpgid(0, 0) != 0 {
                return Err(io::Error::last_os_error());
            }
            if unlimited_stack {
                let mut limit = libc::rlimit {
                    rlim_cur: 0,
                    rlim_max: 0,
                };
                if libc::getrlimit(libc::RLIMIT_STACK, &mut limit) == 0 && limit.rlim_cur != limit.rlim_max {
                    limit.rlim_cur = limit.rlim_max;
                    libc::setrlimit(libc::RLIMIT_STACK, &limit);
                }
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn configure_child(_command: &mut Command, _unlimited_stack: bool) {}

/// Run `command` to completion, bounded by `timeout` and `cancel`.
///
/// Timeout and cancellation are reported as [`HarnessError::IncompleteReport`]
/// since the subject never got to finish its report.
pub(crate) async fn supervise(
    mut command: Command,
    timeout: Duration,
    unlimited_stack: bool,
    cancel: &CancellationToken,
) -> Result<Output> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    configure_child(&mut command, unlimited_stack);

    let program = command.as_std().get_program().to_string_lossy().into_owned();
    let child = command.spawn().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => HarnessError::ToolNotFound(program.clone()),
        _ => HarnessError::Io(e),
    })?;
    let _group = ProcessGroupGuard::new(child.id());
    tracing::debug!(program = %program, pid = ?child.id(), "Analyzer started");

    tokio::select! {
        result = tokio::time::timeout(timeout, child.wait_with_output()) => match result {
            Ok(output) => Ok(output?),
            Err(_) => {
                tracing::warn!(program = %program, timeout_secs = timeout.as_secs(), "Analyzer timed out, killing process group");
                Err(HarnessError::IncompleteReport(format!(
                    "analyzer timed out after {}s",
                    timeout.as_secs()
                )))
            }
        },
        _ = cancel.cancelled() => {
            tracing::warn!(program = %program, "Run cancelled, killing process group");
            Err(HarnessError::IncompleteReport("run cancelled".into()))
        }
    }
}
