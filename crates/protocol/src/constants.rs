use std::time::Duration;

/// Default chunk size: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Chunk granularity expected by GCS-style sessions.
///
/// Every chunk except the last should be a multiple of this value, otherwise
/// the server may only commit a prefix of it.
pub const CHUNK_GRANULARITY: u64 = 256 * 1024;

/// Default timeout for a single chunk request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Method used for every chunk and status request.
pub const METHOD_PUT: &str = "PUT";

/// Request header carrying the chunk length.
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";

/// Request header carrying the chunk position within the object.
pub const HEADER_CONTENT_RANGE: &str = "Content-Range";

/// Response header reporting the committed prefix on a `308`.
pub const HEADER_RANGE: &str = "Range";

/// Object finalized (existing object overwritten).
pub const STATUS_OK: u16 = 200;

/// Object finalized (new object created).
pub const STATUS_CREATED: u16 = 201;

/// Resume Incomplete: the session expects more bytes.
pub const STATUS_RESUME_INCOMPLETE: u16 = 308;

/// Request Timeout. A 4xx that is still worth retrying.
pub const STATUS_REQUEST_TIMEOUT: u16 = 408;

/// Too Many Requests. A 4xx that is still worth retrying.
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;
