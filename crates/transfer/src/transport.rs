//! Transport seam between the driver and an HTTP client.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use resumable_protocol::{HttpRequest, HttpResponse};

/// Errors a transport reports for a single request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Network failures and timeouts are worth another attempt; a request the
    /// client cannot even build is not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::InvalidRequest(_))
    }
}

/// Sends one HTTP request and returns its status and headers.
///
/// `resumable-http` implements this on top of `reqwest`. Keeping it a trait
/// lets the driver run against scripted transports in tests.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classes() {
        assert!(TransportError::Network("reset".into()).is_retryable());
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!TransportError::InvalidRequest("bad url".into()).is_retryable());
    }

    #[test]
    fn timeout_message() {
        let e = TransportError::Timeout(Duration::from_secs(3));
        assert_eq!(e.to_string(), "request timed out after 3s");
    }
}
