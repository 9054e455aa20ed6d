//! Tasker execution core: runs shell commands in an isolated process group,
//! captures the tail of their combined output under a byte cap, and
//! terminates the whole group when a deadline passes.

pub use supervisor::{DEFAULT_OUTPUT_CAP, ExecConfig, Execution, Supervisor};
pub use window::OutputWindow;

mod platform;
pub mod supervisor;
pub mod window;

/// Errors that prevent a command from being started.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The output pipe could not be created or registered.
    #[error("failed to create output pipe: {0}")]
    Pipe(#[source] std::io::Error),
    /// The shell could not be spawned.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}
