//! Tasker wire protocol types shared between the worker and its coordinator.
//!
//! One inbound message carries a [`TaskDescriptor`], one outbound message
//! carries a [`ResultEnvelope`]. Both are encoded as self-describing maps of
//! named fields, see [`codec`].

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod codec;
pub mod frame;

pub use codec::{CodecError, WireFormat};

/// Opaque task identifier, echoed back exactly as received.
///
/// Coordinators may number tasks or name them; either form survives a
/// round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskId {
    /// Numeric identifier.
    Number(u64),
    /// Textual identifier.
    Text(CompactString),
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "#{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for TaskId {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::Text(s.into())
    }
}

/// One unit of work received from the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    /// Identifier echoed in the result.
    pub task_id: TaskId,
    /// Command line handed to the shell.
    pub command: String,
    /// Uploaded payload to stage before running the command. An empty
    /// payload is not an artifact and travels as `None`.
    pub artifact: Option<Vec<u8>>,
    /// Wall-clock budget for the command.
    pub timeout: Duration,
}

/// The result of one task, sent back to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEnvelope {
    /// Identifier copied from the task.
    pub task_id: TaskId,
    /// Captured output, not necessarily valid UTF-8.
    pub output: Vec<u8>,
}
