//! Process-group handling for external tools.
//!
//! yt-dlp hands conversion off to its own ffmpeg child. Killing only the
//! yt-dlp PID leaves that child writing into the workspace, so tools that
//! fork are started in a fresh process group and the whole group is killed
//! when the caller gives up on them.

use tokio::process::{Child, Command};

/// Start the command as the leader of a new process group
pub fn spawn_in_new_group(command: &mut Command) -> std::io::Result<Child> {
    #[cfg(unix)]
    command.process_group(0);

    command.spawn()
}

/// Kills a process group on drop unless disarmed.
///
/// Disarm it once the leader has been reaped; the group id may be reused
/// after that.
#[derive(Debug)]
pub struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    pub fn new(child: &Child) -> Self {
        Self { pgid: child.id() }
    }

    pub fn disarm(&mut self) {
        self.pgid = None;
    }

    /// Kill every process in the group now
    pub fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => tracing::debug!("Killed process group {}", pgid),
        Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!("Failed to kill process group {}: {}", pgid, e),
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {
    // kill_on_drop on the leader is all we have here
}
