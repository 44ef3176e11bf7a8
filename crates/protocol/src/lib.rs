//! Wire contract for the chunk-upload half of an HTTP resumable-upload
//! session.
//!
//! Everything here is transport-agnostic: header names, status codes,
//! `Content-Range` formatting, `Range` parsing and response classification.
//! The driver in `resumable-transfer` builds requests from these pieces and
//! any HTTP client can carry them.

pub mod constants;
pub mod http;
pub mod range;

// Re-export primary types for convenience.
pub use constants::{DEFAULT_CHUNK_SIZE, METHOD_PUT};
pub use http::{HttpRequest, HttpResponse, ResponseKind};
pub use range::{ByteRange, ContentRange, RangeError, parse_committed_range};
