//! Platform glue: async pipe readers and process-group termination.

use std::io::{self, PipeReader};
use tokio::process::Child;

#[cfg(unix)]
pub(crate) type OutputReader = tokio::net::unix::pipe::Receiver;

#[cfg(windows)]
pub(crate) type OutputReader = tokio::fs::File;

/// Turn the read end of an anonymous pipe into an async reader.
#[cfg(unix)]
pub(crate) fn output_reader(reader: PipeReader) -> io::Result<OutputReader> {
    tokio::net::unix::pipe::Receiver::from_owned_fd(reader.into())
}

#[cfg(windows)]
pub(crate) fn output_reader(reader: PipeReader) -> io::Result<OutputReader> {
    let handle = std::os::windows::io::OwnedHandle::from(reader);
    Ok(tokio::fs::File::from_std(std::fs::File::from(handle)))
}

/// The isolation group a task process was spawned into.
///
/// On unix the child is its own group leader (`process_group(0)`), so the
/// group id equals the child's pid and every descendant inherits it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    pub(crate) fn of(child: &Child) -> Self {
        Self { pgid: child.id() }
    }

    /// Send a single SIGTERM to every process in the group.
    #[cfg(unix)]
    pub(crate) fn terminate(&self, _child: &mut Child) {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let Some(pgid) = self.pgid else {
            return;
        };
        match killpg(Pid::from_raw(pgid as i32), Signal::SIGTERM) {
            Ok(()) => tracing::debug!(pgid, "sent SIGTERM to process group"),
            // Everything in the group already exited.
            Err(Errno::ESRCH) => {}
            Err(e) => tracing::warn!(pgid, error = %e, "failed to signal process group"),
        }
    }

    /// Without process groups only the direct child can be killed.
    #[cfg(not(unix))]
    pub(crate) fn terminate(&self, child: &mut Child) {
        if let Err(e) = child.start_kill() {
            tracing::warn!(pid = ?self.pgid, error = %e, "failed to kill task process");
        }
    }
}
