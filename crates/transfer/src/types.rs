use std::time::Duration;

use resumable_protocol::ByteRange;
use resumable_protocol::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_REQUEST_TIMEOUT};
use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;

/// Tunables for one transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Bytes per chunk request. Must be non-zero.
    pub chunk_size: u64,
    /// Upper bound for a single chunk request, response included.
    #[serde(with = "duration_ms", rename = "request_timeout_ms")]
    pub request_timeout: Duration,
    /// Backoff policy for failed attempts.
    pub retry: RetryConfig,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }
}

impl TransferConfig {
    /// Checks the configuration before any request is made.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than zero".into());
        }
        if self.request_timeout.is_zero() {
            return Err("request_timeout must be greater than zero".into());
        }
        self.retry.validate()
    }
}

/// Structured progress events, in the order the driver emits them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransferEvent {
    /// A chunk request is about to be sent.
    ChunkStarted { range: ByteRange, attempt: u32 },
    /// The session accepted bytes. `confirmed` is `false` when the offset
    /// comes from the optimistic fallback (no usable `Range` header).
    ChunkCommitted {
        range: ByteRange,
        committed: u64,
        confirmed: bool,
    },
    /// An attempt failed and the same range will be retried.
    ChunkFailed {
        range: ByteRange,
        attempt: u32,
        error: String,
        retry_in_ms: u64,
    },
    /// The session finalized the object.
    Completed { total: u64, requests: u32 },
    /// The caller cancelled the transfer.
    Cancelled { committed: u64 },
    /// The transfer stopped with an unrecoverable error.
    Failed { committed: u64, error: String },
}

/// Why a transfer ended in [`TransferState::DoneFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    ExhaustedRetries,
    MalformedResponse,
    UnexpectedStatus,
    Rejected,
    Transport,
    Source,
    InvalidConfig,
}

/// Driver state, observable through
/// [`ChunkTransferDriver::subscribe_state`](crate::ChunkTransferDriver::subscribe_state).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransferState {
    /// No transfer has started yet.
    #[default]
    Idle,
    /// Reading the chunk from the source.
    Sending(ByteRange),
    /// Request sent, waiting for the session.
    AwaitingResponse(ByteRange),
    /// Moving the committed offset forward.
    Advancing { committed: u64 },
    /// Sleeping before retrying the same range.
    RetryWait { range: ByteRange, attempt: u32 },
    DoneSuccess,
    DoneFailure(FailureReason),
    Cancelled,
}

impl TransferState {
    /// Returns `true` for states a transfer cannot leave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferState::DoneSuccess | TransferState::DoneFailure(_) | TransferState::Cancelled
        )
    }
}

/// Summary of a successful transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReport {
    pub total_bytes: u64,
    /// Chunk requests sent, retries included.
    pub requests: u32,
    /// Attempts that failed and were retried.
    pub retries: u32,
    /// Status of the finalizing response; `None` for an empty payload.
    pub final_status: Option<u16>,
}

/// Serde helper storing a [`Duration`] as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
