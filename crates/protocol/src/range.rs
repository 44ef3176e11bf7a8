//! Byte-range headers.
//!
//! Requests describe their position with `Content-Range: bytes a-b/total`
//! (or `bytes */total` for a status query). A `308` response may carry
//! `Range: bytes=0-N`, where `N` is the last committed byte (inclusive).

use std::fmt;

use serde::{Deserialize, Serialize};

/// A non-empty half-open byte range `[start, end)` within an object of
/// `total` bytes.
///
/// Fields are private so every value satisfies `start < end <= total`,
/// including deserialized ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawByteRange")]
pub struct ByteRange {
    start: u64,
    end: u64,
    total: u64,
}

#[derive(Deserialize)]
struct RawByteRange {
    start: u64,
    end: u64,
    total: u64,
}

impl TryFrom<RawByteRange> for ByteRange {
    type Error = RangeError;

    fn try_from(raw: RawByteRange) -> Result<Self, Self::Error> {
        ByteRange::new(raw.start, raw.end, raw.total)
    }
}

/// Error building a [`ByteRange`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("empty range at offset {0}")]
    Empty(u64),

    #[error("range end {end} exceeds object size {total}")]
    OutOfBounds { end: u64, total: u64 },
}

impl ByteRange {
    /// Creates a range, rejecting empty and out-of-bounds ranges.
    pub fn new(start: u64, end: u64, total: u64) -> Result<Self, RangeError> {
        if end <= start {
            return Err(RangeError::Empty(start));
        }
        if end > total {
            return Err(RangeError::OutOfBounds { end, total });
        }
        Ok(Self { start, end, total })
    }

    /// Computes the next chunk starting at `offset`, clamped to `total`.
    ///
    /// Returns `None` once `offset` has reached `total`, or if `chunk_size`
    /// is zero.
    pub fn next_chunk(offset: u64, chunk_size: u64, total: u64) -> Option<Self> {
        if offset >= total || chunk_size == 0 {
            return None;
        }
        let end = offset.saturating_add(chunk_size).min(total);
        Some(Self {
            start: offset,
            end,
            total,
        })
    }

    /// First byte of the range.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// One past the last byte of the range.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Size of the whole object.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of bytes in the range.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Always `false`: a `ByteRange` is never empty.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Returns `true` if this range ends at the last byte of the object.
    pub fn is_final(&self) -> bool {
        self.end == self.total
    }

    /// The `Content-Range` value describing this range.
    pub fn content_range(&self) -> ContentRange {
        ContentRange::Bytes(*self)
    }
}

/// Value of a request `Content-Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRange {
    /// `bytes <start>-<end-1>/<total>`
    Bytes(ByteRange),
    /// `bytes */<total>`: asks the server how much it has committed.
    Query { total: u64 },
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentRange::Bytes(r) => write!(f, "bytes {}-{}/{}", r.start, r.end - 1, r.total),
            ContentRange::Query { total } => write!(f, "bytes */{total}"),
        }
    }
}

/// Parses a `Range: bytes=0-N` response header and returns `N`, the last
/// committed byte (inclusive).
///
/// Returns `None` when the header does not describe a prefix starting at 0
/// or `N` is not a number. Callers treat that the same as a missing header.
pub fn parse_committed_range(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes=")?.trim_start();
    let rest = rest.strip_prefix("0-")?;
    let digits_len = rest
        .as_bytes()
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits_len == 0 {
        return None;
    }
    rest[..digits_len].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn content_range_is_inclusive() {
        let r = ByteRange::new(0, 5 * MIB, 12 * MIB).unwrap();
        assert_eq!(r.content_range().to_string(), "bytes 0-5242879/12582912");
    }

    #[test]
    fn content_range_single_byte() {
        let r = ByteRange::new(9, 10, 10).unwrap();
        assert_eq!(r.content_range().to_string(), "bytes 9-9/10");
        assert_eq!(r.len(), 1);
        assert!(r.is_final());
    }

    #[test]
    fn content_range_query() {
        let q = ContentRange::Query { total: 4096 };
        assert_eq!(q.to_string(), "bytes */4096");
    }

    #[test]
    fn new_rejects_empty_and_oob() {
        assert_eq!(ByteRange::new(5, 5, 10), Err(RangeError::Empty(5)));
        assert_eq!(
            ByteRange::new(0, 11, 10),
            Err(RangeError::OutOfBounds { end: 11, total: 10 })
        );
    }

    #[test]
    fn next_chunk_clamps_to_total() {
        let c = ByteRange::next_chunk(10 * MIB, 5 * MIB, 12 * MIB).unwrap();
        assert_eq!(c.start, 10 * MIB);
        assert_eq!(c.end, 12 * MIB);
        assert!(c.is_final());

        let c = ByteRange::next_chunk(0, 5 * MIB, 12 * MIB).unwrap();
        assert_eq!(c.end, 5 * MIB);
        assert!(!c.is_final());
    }

    #[test]
    fn next_chunk_none_at_end() {
        assert!(ByteRange::next_chunk(10, 4, 10).is_none());
        assert!(ByteRange::next_chunk(0, 4, 0).is_none());
        assert!(ByteRange::next_chunk(0, 0, 10).is_none());
    }

    #[test]
    fn next_chunk_does_not_overflow() {
        let c = ByteRange::next_chunk(u64::MAX - 1, u64::MAX, u64::MAX).unwrap();
        assert_eq!(c.end, u64::MAX);
    }

    #[test]
    fn parse_committed_range_valid() {
        assert_eq!(parse_committed_range("bytes=0-5242879"), Some(5_242_879));
        assert_eq!(parse_committed_range("bytes=0-0"), Some(0));
        assert_eq!(parse_committed_range("  bytes=0-42  "), Some(42));
    }

    #[test]
    fn parse_committed_range_takes_leading_digits() {
        assert_eq!(parse_committed_range("bytes=0-99/1000"), Some(99));
    }

    #[test]
    fn parse_committed_range_rejects_garbage() {
        assert_eq!(parse_committed_range(""), None);
        assert_eq!(parse_committed_range("bytes=0-"), None);
        assert_eq!(parse_committed_range("bytes=10-20"), None);
        assert_eq!(parse_committed_range("bytes 0-20/100"), None);
        assert_eq!(parse_committed_range("items=0-20"), None);
        assert_eq!(parse_committed_range("bytes=0-abc"), None);
        assert_eq!(parse_committed_range("bytes=0-99999999999999999999999"), None);
    }

    #[test]
    fn byte_range_serializes_flat() {
        let r = ByteRange::new(3, 7, 10).unwrap();
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"start":3,"end":7,"total":10}"#);
    }

    #[test]
    fn byte_range_deserialize_validates() {
        let r: ByteRange = serde_json::from_str(r#"{"start":3,"end":7,"total":10}"#).unwrap();
        assert_eq!((r.start(), r.end(), r.total()), (3, 7, 10));

        assert!(serde_json::from_str::<ByteRange>(r#"{"start":0,"end":0,"total":0}"#).is_err());
        assert!(serde_json::from_str::<ByteRange>(r#"{"start":0,"end":9,"total":4}"#).is_err());
    }
}
