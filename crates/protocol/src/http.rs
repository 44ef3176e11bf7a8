//! Transport-neutral request/response values and status classification.

use std::collections::BTreeMap;

use crate::constants::{
    HEADER_CONTENT_LENGTH, HEADER_CONTENT_RANGE, HEADER_RANGE, METHOD_PUT, STATUS_CREATED,
    STATUS_OK, STATUS_REQUEST_TIMEOUT, STATUS_RESUME_INCOMPLETE, STATUS_TOO_MANY_REQUESTS,
};
use crate::range::{ByteRange, ContentRange, parse_committed_range};

/// An HTTP request as handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Builds the `PUT` carrying one chunk of the object.
    ///
    /// `body` must hold exactly `range.len()` bytes.
    pub fn put_chunk(url: &str, range: ByteRange, body: Vec<u8>) -> Self {
        debug_assert_eq!(body.len() as u64, range.len());
        let mut headers = BTreeMap::new();
        headers.insert(HEADER_CONTENT_LENGTH.to_string(), body.len().to_string());
        headers.insert(
            HEADER_CONTENT_RANGE.to_string(),
            range.content_range().to_string(),
        );
        Self {
            method: METHOD_PUT.to_string(),
            url: url.to_string(),
            headers,
            body,
        }
    }

    /// Builds the empty `PUT` asking the session how much it has committed.
    pub fn status_query(url: &str, total: u64) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(HEADER_CONTENT_LENGTH.to_string(), "0".to_string());
        headers.insert(
            HEADER_CONTENT_RANGE.to_string(),
            ContentRange::Query { total }.to_string(),
        );
        Self {
            method: METHOD_PUT.to_string(),
            url: url.to_string(),
            headers,
            body: Vec::new(),
        }
    }

    /// Looks up a request header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        lookup(&self.headers, name)
    }
}

/// An HTTP response as returned by a transport. Only status and headers
/// matter to the protocol; bodies are discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
        }
    }

    /// Adds a header; builder style, mostly for tests and mocks.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Looks up a response header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        lookup(&self.headers, name)
    }

    /// Last committed byte (inclusive) reported by a `Range` header, if the
    /// header is present and parseable.
    pub fn committed_through(&self) -> Option<u64> {
        self.header(HEADER_RANGE).and_then(parse_committed_range)
    }

    /// Classifies the status code.
    pub fn kind(&self) -> ResponseKind {
        ResponseKind::classify(self.status)
    }
}

fn lookup<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// What a response status means for the upload loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// `200`/`201`: the object is finalized.
    Complete,
    /// `308`: more bytes are expected.
    ResumeIncomplete,
    /// Any other status worth retrying (5xx, 408, 429, stray 1xx/3xx).
    Retryable(u16),
    /// A 4xx the session will keep rejecting (expired session, bad range).
    Rejected(u16),
}

impl ResponseKind {
    pub fn classify(status: u16) -> Self {
        match status {
            STATUS_OK | STATUS_CREATED => ResponseKind::Complete,
            STATUS_RESUME_INCOMPLETE => ResponseKind::ResumeIncomplete,
            STATUS_REQUEST_TIMEOUT | STATUS_TOO_MANY_REQUESTS => ResponseKind::Retryable(status),
            400..=499 => ResponseKind::Rejected(status),
            _ => ResponseKind::Retryable(status),
        }
    }
}
