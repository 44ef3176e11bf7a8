//! Chunked upload driver for HTTP resumable-upload sessions.
//!
//! [`ChunkTransferDriver`] sends a [`ByteSource`] to an already negotiated
//! session endpoint, one `PUT` per chunk, through any [`Transport`]. The
//! server's `308 Resume Incomplete` responses drive the committed offset;
//! transient failures are retried on the same byte range with exponential
//! backoff until [`RetryConfig::max_attempts`] is reached.

mod driver;
mod progress;
mod retry;
mod source;
mod transport;
mod types;

pub use driver::{ChunkTransferDriver, SessionStatus};
pub use progress::{ProgressCallback, ProgressTracker, SpeedCalculator, TransferProgress};
pub use retry::RetryConfig;
pub use source::{ByteSource, FileSource};
pub use transport::{Transport, TransportError};
pub use types::{FailureReason, TransferConfig, TransferEvent, TransferReport, TransferState};

pub use resumable_protocol::DEFAULT_CHUNK_SIZE;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("byte source error: {0}")]
    Source(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("cancelled after {committed} committed bytes")]
    Cancelled { committed: u64 },

    #[error("gave up at offset {offset} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        offset: u64,
        attempts: u32,
        last_error: String,
    },

    #[error("session rejected chunk at offset {offset} with status {status}")]
    Rejected { status: u16, offset: u64 },

    #[error("malformed server response: {0}")]
    MalformedResponse(String),

    #[error("session answered with status {status}")]
    UnexpectedStatus { status: u16 },
}

impl TransferError {
    /// The failure class reported in [`TransferState::DoneFailure`].
    ///
    /// `None` for cancellation, which ends in [`TransferState::Cancelled`].
    pub fn reason(&self) -> Option<FailureReason> {
        let reason = match self {
            TransferError::Cancelled { .. } => return None,
            TransferError::InvalidConfig(_) => FailureReason::InvalidConfig,
            TransferError::Source(_) => FailureReason::Source,
            TransferError::Transport(_) => FailureReason::Transport,
            TransferError::RetriesExhausted { .. } => FailureReason::ExhaustedRetries,
            TransferError::Rejected { .. } => FailureReason::Rejected,
            TransferError::MalformedResponse(_) => FailureReason::MalformedResponse,
            TransferError::UnexpectedStatus { .. } => FailureReason::UnexpectedStatus,
        };
        Some(reason)
    }
}
