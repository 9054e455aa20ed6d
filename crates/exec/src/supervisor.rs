//! Runs one shell command to completion or timeout.

use crate::{
    ExecError, OutputWindow,
    platform::{self, OutputReader, ProcessGroup},
};
use std::io::{self, ErrorKind};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

/// Default output cap: 16 MiB.
pub const DEFAULT_OUTPUT_CAP: usize = 16 * 1024 * 1024;

/// Supervisor settings.
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Shell program used to interpret commands.
    pub shell: String,
    /// Flag that makes the shell read the command from its argument.
    pub shell_flag: String,
    /// Output window cap in bytes.
    pub output_cap: usize,
    /// Size of a single read from the output pipe.
    pub read_chunk_size: usize,
    /// How long to keep draining output after the process group was
    /// signalled before giving up on end-of-stream.
    pub drain_grace: Duration,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_owned(),
            shell_flag: "-c".to_owned(),
            output_cap: DEFAULT_OUTPUT_CAP,
            read_chunk_size: 8 * 1024,
            drain_grace: Duration::from_secs(2),
        }
    }
}

/// Outcome of one supervised run.
#[derive(Debug)]
pub struct Execution {
    /// Tail of the combined stdout/stderr stream.
    pub output: Vec<u8>,
    /// Whether the deadline fired before the process exited.
    pub timed_out: bool,
    /// Exit status, when the process could be reaped.
    pub status: Option<ExitStatus>,
    /// Wall-clock time from spawn to return.
    pub elapsed: Duration,
    /// Bytes evicted from the front of the output window.
    pub dropped: u64,
}

/// Spawns commands in their own process group and races them against a
/// deadline.
#[derive(Debug, Clone, Default)]
pub struct Supervisor {
    config: ExecConfig,
}

impl Supervisor {
    pub fn new(config: ExecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    /// Run `command` through the shell, killing its whole process group if
    /// it outlives `timeout`.
    pub async fn run(&self, command: &str, timeout: Duration) -> Result<Execution, ExecError> {
        let started = Instant::now();
        let (reader, mut child) = self.spawn(command)?;
        let group = ProcessGroup::of(&child);
        tracing::debug!(pid = ?child.id(), "spawned task process");

        let mut window = OutputWindow::new(self.config.output_cap);
        let mut status = None;
        let mut timed_out = false;
        {
            let drain = drain(reader, &mut window, self.config.read_chunk_size);
            tokio::pin!(drain);
            let deadline = tokio::time::sleep(timeout);
            tokio::pin!(deadline);
            let mut drained = false;

            loop {
                tokio::select! {
                    _ = &mut drain, if !drained => drained = true,
                    result = child.wait() => {
                        match result {
                            Ok(exit) => status = Some(exit),
                            Err(e) => tracing::warn!(error = %e, "failed to wait on task process"),
                        }
                        break;
                    }
                    _ = &mut deadline => {
                        timed_out = true;
                        break;
                    }
                }
            }

            let mut signalled = timed_out;
            if timed_out {
                group.terminate(&mut child);
            } else if !drained {
                // The shell is gone but descendants may still hold the pipe.
                tokio::select! {
                    _ = &mut drain => drained = true,
                    _ = &mut deadline => signalled = true,
                }
                if signalled {
                    tracing::debug!("output still open at deadline after exit");
                    group.terminate(&mut child);
                }
            }

            if !drained && signalled {
                let finished = tokio::time::timeout(self.config.drain_grace, &mut drain)
                    .await
                    .is_ok();
                if !finished {
                    tracing::warn!(
                        grace = ?self.config.drain_grace,
                        "output stream still open after termination, abandoning drain"
                    );
                }
            }
        }

        if timed_out {
            // Reap within the grace period; tokio reaps anything left later.
            if let Ok(Ok(exit)) = tokio::time::timeout(self.config.drain_grace, child.wait()).await
            {
                status = Some(exit);
            }
        }

        let dropped = window.dropped();
        Ok(Execution {
            output: window.finalize(),
            timed_out,
            status,
            elapsed: started.elapsed(),
            dropped,
        })
    }

    /// Spawn the shell with stdout and stderr sharing one pipe.
    fn spawn(&self, command: &str) -> Result<(OutputReader, Child), ExecError> {
        let (reader, writer) = io::pipe().map_err(ExecError::Pipe)?;
        let stderr = writer.try_clone().map_err(ExecError::Pipe)?;

        let mut cmd = Command::new(&self.config.shell);
        cmd.arg(&self.config.shell_flag)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: self.config.shell.clone(),
            source,
        })?;
        // The command still owns our copies of the write end; end-of-stream
        // is only observable once they are closed.
        drop(cmd);

        let reader = platform::output_reader(reader).map_err(ExecError::Pipe)?;
        Ok((reader, child))
    }
}

/// Read the stream into the window until end-of-stream or a read error.
async fn drain<R>(mut reader: R, window: &mut OutputWindow, chunk_size: usize)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => window.append(buf[..n].to_vec()),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read task output");
                break;
            }
        }
    }
}
