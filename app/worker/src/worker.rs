//! The worker loop: one task at a time, strictly in arrival order.

use crate::config::WorkerConfig;
use crate::connection::{Connection, TransportError, WireMessage};
use crate::staging;
use exec::{Execution, Supervisor};
use protocol::codec::{self, CodecError};
use protocol::{ResultEnvelope, TaskDescriptor, TaskId, WireFormat};
use std::path::{Path, PathBuf};

/// Appended to the output of a task whose process group was terminated at
/// its deadline.
pub const TIMEOUT_MARKER: &str = "\n[tasker] hard timeout: process group terminated\n";

/// Prepended to output whose head was cut so the result fits in one message.
pub const TRUNCATION_NOTICE: &str = "[tasker] result too large, output truncated to fit\n";

/// Errors surfaced by the worker loop.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The connection failed. Fatal for the worker.
    #[error("connection error: {0}")]
    Transport(#[from] TransportError),
    /// An inbound message was not a valid task envelope. Fatal for the
    /// current iteration only.
    #[error("malformed task envelope: {0}")]
    Decode(#[source] CodecError),
    /// A result could not be encoded. Fatal for the current iteration only.
    #[error("failed to encode result for task {task_id}: {source}")]
    Encode {
        task_id: TaskId,
        #[source]
        source: CodecError,
    },
    /// Even an empty output does not fit in one message.
    #[error("result for task {task_id} needs {size} bytes, connection allows {max}")]
    Oversized {
        task_id: TaskId,
        size: usize,
        max: usize,
    },
}

/// What one iteration of the loop did.
#[derive(Debug)]
pub enum Iteration {
    /// A task ran and its result was sent.
    Completed(ResultEnvelope),
    /// The coordinator closed the connection.
    Closed,
}

/// Executes tasks received over a [`Connection`].
#[derive(Debug, Clone)]
pub struct Worker {
    supervisor: Supervisor,
    staging_path: PathBuf,
}

impl Worker {
    pub fn new(supervisor: Supervisor, staging_path: impl Into<PathBuf>) -> Self {
        Self {
            supervisor,
            staging_path: staging_path.into(),
        }
    }

    /// Build a worker from loaded configuration.
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(
            Supervisor::new(config.exec.exec_config()),
            config.staging.path.clone(),
        )
    }

    pub fn staging_path(&self) -> &Path {
        &self.staging_path
    }

    /// Process tasks until the coordinator closes the connection.
    ///
    /// Malformed envelopes are logged and skipped; transport failures end
    /// the loop with an error.
    pub async fn run<C: Connection>(&self, conn: &mut C) -> Result<(), WorkerError> {
        loop {
            match self.run_once(conn).await {
                Ok(Iteration::Completed(_)) => {}
                Ok(Iteration::Closed) => return Ok(()),
                Err(
                    e @ (WorkerError::Decode(_)
                    | WorkerError::Encode { .. }
                    | WorkerError::Oversized { .. }),
                ) => {
                    tracing::error!("{e}");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Receive one task, run it, and send its result.
    pub async fn run_once<C: Connection>(&self, conn: &mut C) -> Result<Iteration, WorkerError> {
        let Some(message) = conn.receive().await? else {
            return Ok(Iteration::Closed);
        };
        let task = codec::decode_task(&message.payload, message.format)
            .map_err(WorkerError::Decode)?;

        let result = self.execute(task).await;

        let (result, payload) = encode_within(result, message.format, conn.max_message_size())?;
        conn.send(WireMessage {
            format: message.format,
            payload,
        })
        .await?;
        Ok(Iteration::Completed(result))
    }

    /// Stage the task's artifact, run its command and build the result.
    ///
    /// Failures to stage or spawn are reported in the output rather than
    /// returned, so the coordinator always hears back.
    pub async fn execute(&self, task: TaskDescriptor) -> ResultEnvelope {
        let TaskDescriptor {
            task_id,
            command,
            artifact,
            timeout,
        } = task;
        tracing::info!(task = %task_id, ?timeout, "starting task");

        if let Some(artifact) = artifact {
            if let Err(e) = staging::stage_artifact(&self.staging_path, &artifact).await {
                tracing::error!(task = %task_id, path = %self.staging_path.display(), "failed to stage upload: {e}");
                let output = format!(
                    "[tasker] failed to stage upload at {}: {e}\n",
                    self.staging_path.display()
                );
                return ResultEnvelope {
                    task_id,
                    output: output.into_bytes(),
                };
            }
            tracing::debug!(task = %task_id, bytes = artifact.len(), "staged upload");
        }

        let output = match self.supervisor.run(&command, timeout).await {
            Ok(run) => {
                tracing::info!(
                    task = %task_id,
                    elapsed = ?run.elapsed,
                    timed_out = run.timed_out,
                    status = ?run.status,
                    bytes = run.output.len(),
                    dropped = run.dropped,
                    "task finished"
                );
                with_timeout_marker(run)
            }
            Err(e) => {
                tracing::error!(task = %task_id, "failed to start task: {e}");
                format!("[tasker] failed to start task: {e}\n").into_bytes()
            }
        };

        ResultEnvelope { task_id, output }
    }
}

/// The captured output, with [`TIMEOUT_MARKER`] as the last content when the
/// deadline fired.
fn with_timeout_marker(run: Execution) -> Vec<u8> {
    let mut output = run.output;
    if run.timed_out {
        output.extend_from_slice(TIMEOUT_MARKER.as_bytes());
    }
    output
}

fn encode(result: &ResultEnvelope, format: WireFormat) -> Result<Vec<u8>, WorkerError> {
    codec::encode_result(result, format).map_err(|source| WorkerError::Encode {
        task_id: result.task_id.clone(),
        source,
    })
}

/// Encode `result`, dropping the head of its output until the payload fits
/// in `max` bytes.
///
/// The tail is kept so a trailing [`TIMEOUT_MARKER`] survives, and the cut
/// output is prefixed with [`TRUNCATION_NOTICE`].
fn encode_within(
    result: ResultEnvelope,
    format: WireFormat,
    max: usize,
) -> Result<(ResultEnvelope, Vec<u8>), WorkerError> {
    let payload = encode(&result, format)?;
    if payload.len() <= max {
        return Ok((result, payload));
    }

    let ResultEnvelope { task_id, output } = result;
    let original = payload.len();
    // Encoded bytes per output byte: 1 for MessagePack, up to 4 for binary
    // output in JSON.
    let expansion = (original / output.len().max(1)).max(1);
    let mut start = 0;
    let mut excess = original - max + TRUNCATION_NOTICE.len();
    loop {
        let cut = excess.div_ceil(expansion);
        start = utf8_boundary(&output, (start + cut).min(output.len()));
        let mut trimmed = Vec::with_capacity(TRUNCATION_NOTICE.len() + output.len() - start);
        trimmed.extend_from_slice(TRUNCATION_NOTICE.as_bytes());
        trimmed.extend_from_slice(&output[start..]);
        let candidate = ResultEnvelope {
            task_id: task_id.clone(),
            output: trimmed,
        };

        let payload = encode(&candidate, format)?;
        if payload.len() <= max {
            tracing::warn!(
                task = %task_id,
                original,
                max,
                dropped = start,
                "result exceeded message limit, sent output tail"
            );
            return Ok((candidate, payload));
        }
        if start == output.len() {
            return Err(WorkerError::Oversized {
                task_id,
                size: payload.len(),
                max,
            });
        }
        excess = payload.len() - max;
    }
}

/// Move `index` past UTF-8 continuation bytes so a cut never splits a
/// character of otherwise valid text.
fn utf8_boundary(bytes: &[u8], mut index: usize) -> usize {
    for _ in 0..3 {
        match bytes.get(index) {
            Some(b) if b & 0xC0 == 0x80 => index += 1,
            _ => break,
        }
    }
    index
}
