//! Envelope encoding.
//!
//! Envelopes are maps keyed by field name. Binary transports carry
//! MessagePack (`rmp-serde`, named fields); text transports carry JSON with
//! the same field names.
//!
//! Inbound fields: `task_id`, `command`, `upload` (optional bytes),
//! `timeout` (seconds). Outbound fields: `task_id`, `output`.
//!
//! `output` is written as a string when it is valid UTF-8 and as raw bytes
//! otherwise; decoding accepts either.

use crate::{ResultEnvelope, TaskDescriptor, TaskId};
use serde::{Deserialize, Serialize, Serializer, de::DeserializeOwned};
use serde_bytes::{ByteBuf, Bytes};
use std::time::Duration;

/// Encoding used for one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WireFormat {
    /// MessagePack map with named fields.
    #[default]
    MessagePack,
    /// JSON object, used on text channels.
    Json,
}

/// Errors produced while encoding or decoding envelopes.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("msgpack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("msgpack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// Timeouts must be positive, finite and representable.
    #[error("invalid timeout: {0} seconds")]
    InvalidTimeout(f64),
}

#[derive(Serialize)]
struct TaskOut<'a> {
    task_id: &'a TaskId,
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    upload: Option<&'a Bytes>,
    #[serde(serialize_with = "serialize_seconds")]
    timeout: Duration,
}

#[derive(Deserialize)]
struct TaskIn {
    task_id: TaskId,
    command: String,
    #[serde(default)]
    upload: Option<ByteBuf>,
    timeout: f64,
}

#[derive(Serialize)]
struct ResultOut<'a> {
    task_id: &'a TaskId,
    output: TextOrBytes<'a>,
}

#[derive(Deserialize)]
struct ResultIn {
    task_id: TaskId,
    output: ByteBuf,
}

/// Output bytes, written as a string whenever they happen to be UTF-8.
struct TextOrBytes<'a>(&'a [u8]);

impl Serialize for TextOrBytes<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(self.0) {
            Ok(text) => serializer.serialize_str(text),
            Err(_) => serializer.serialize_bytes(self.0),
        }
    }
}

/// Whole seconds go out as integers, fractional ones as floats.
fn serialize_seconds<S: Serializer>(timeout: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    if timeout.subsec_nanos() == 0 {
        serializer.serialize_u64(timeout.as_secs())
    } else {
        serializer.serialize_f64(timeout.as_secs_f64())
    }
}

fn to_bytes<T: Serialize>(value: &T, format: WireFormat) -> Result<Vec<u8>, CodecError> {
    Ok(match format {
        WireFormat::MessagePack => rmp_serde::to_vec_named(value)?,
        WireFormat::Json => serde_json::to_vec(value)?,
    })
}

fn from_bytes<T: DeserializeOwned>(payload: &[u8], format: WireFormat) -> Result<T, CodecError> {
    Ok(match format {
        WireFormat::MessagePack => rmp_serde::from_slice(payload)?,
        WireFormat::Json => serde_json::from_slice(payload)?,
    })
}

/// Encode a task descriptor.
///
/// An empty artifact is written as an absent `upload`, the same as no
/// artifact, so encoding and decoding agree on it.
pub fn encode_task(task: &TaskDescriptor, format: WireFormat) -> Result<Vec<u8>, CodecError> {
    let wire = TaskOut {
        task_id: &task.task_id,
        command: &task.command,
        upload: task
            .artifact
            .as_deref()
            .filter(|bytes| !bytes.is_empty())
            .map(Bytes::new),
        timeout: task.timeout,
    };
    to_bytes(&wire, format)
}

/// Decode a task descriptor.
///
/// `task_id`, `command` and `timeout` are required. An absent, null or empty
/// `upload` means there is no artifact.
pub fn decode_task(payload: &[u8], format: WireFormat) -> Result<TaskDescriptor, CodecError> {
    let wire: TaskIn = from_bytes(payload, format)?;
    if !(wire.timeout.is_finite() && wire.timeout > 0.0) {
        return Err(CodecError::InvalidTimeout(wire.timeout));
    }
    let timeout = Duration::try_from_secs_f64(wire.timeout)
        .map_err(|_| CodecError::InvalidTimeout(wire.timeout))?;

    Ok(TaskDescriptor {
        task_id: wire.task_id,
        command: wire.command,
        artifact: wire
            .upload
            .map(ByteBuf::into_vec)
            .filter(|bytes| !bytes.is_empty()),
        timeout,
    })
}

/// Encode a result envelope.
pub fn encode_result(result: &ResultEnvelope, format: WireFormat) -> Result<Vec<u8>, CodecError> {
    let wire = ResultOut {
        task_id: &result.task_id,
        output: TextOrBytes(&result.output),
    };
    to_bytes(&wire, format)
}

/// Decode a result envelope.
pub fn decode_result(payload: &[u8], format: WireFormat) -> Result<ResultEnvelope, CodecError> {
    let wire: ResultIn = from_bytes(payload, format)?;
    Ok(ResultEnvelope {
        task_id: wire.task_id,
        output: wire.output.into_vec(),
    })
}
