//! Chunk transfer driver.
//!
//! One transfer is a strictly sequential loop: compute the next chunk from
//! the committed offset, `PUT` it, then either finish (`200`/`201`), advance
//! (`308`), or back off and resend the same range. Chunk `N + 1` depends on
//! the offset confirmed for chunk `N`, so requests never overlap.

use std::sync::{Arc, Mutex};

use resumable_protocol::constants::CHUNK_GRANULARITY;
use resumable_protocol::{ByteRange, HttpRequest, HttpResponse, ResponseKind};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::TransferError;
use crate::source::ByteSource;
use crate::transport::{Transport, TransportError};
use crate::types::{TransferConfig, TransferEvent, TransferReport, TransferState};

/// Capacity of the event channel. Chunk events are dropped, not awaited,
/// when a slow consumer lets it fill up; one slot per transfer is reserved
/// for the terminal event.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What the session reports for a status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// The object is finalized.
    Complete { status: u16 },
    /// The session holds the first `committed` bytes.
    Incomplete { committed: u64 },
}

/// Result of one chunk attempt that did not end the transfer.
enum Attempt {
    /// The committed offset moved to this value.
    Advanced { committed: u64, confirmed: bool },
    /// The attempt failed and may be retried.
    Failed(String),
}

/// Drives one resumable upload session from offset 0 to completion.
pub struct ChunkTransferDriver {
    transport: Arc<dyn Transport>,
    config: TransferConfig,
    events_tx: mpsc::Sender<TransferEvent>,
    events_rx: Option<mpsc::Receiver<TransferEvent>>,
    state_tx: watch::Sender<TransferState>,
    cancel: Mutex<CancellationToken>,
}

impl ChunkTransferDriver {
    /// Creates a driver. Fails fast on an invalid configuration.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: TransferConfig,
    ) -> Result<Self, TransferError> {
        config.validate().map_err(TransferError::InvalidConfig)?;
        if config.chunk_size % CHUNK_GRANULARITY != 0 {
            warn!(
                chunk_size = config.chunk_size,
                granularity = CHUNK_GRANULARITY,
                "chunk size is not a multiple of the session granularity; servers may commit partial chunks"
            );
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, _) = watch::channel(TransferState::Idle);
        Ok(Self {
            transport,
            config,
            events_tx,
            events_rx: Some(events_rx),
            state_tx,
            cancel: Mutex::new(CancellationToken::new()),
        })
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<TransferEvent>> {
        self.events_rx.take()
    }

    /// Returns a receiver tracking the driver's current state.
    pub fn subscribe_state(&self) -> watch::Receiver<TransferState> {
        self.state_tx.subscribe()
    }

    /// Returns the driver's current state.
    pub fn state(&self) -> TransferState {
        self.state_tx.borrow().clone()
    }

    /// Returns the token that cancels the running or next transfer.
    ///
    /// Once a transfer or status query ends cancelled the driver arms a
    /// fresh token, so later calls run normally; fetch the token again to
    /// cancel them.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn rearm_cancel(&self) {
        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = CancellationToken::new();
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Uploads `source` to the session at `endpoint`.
    ///
    /// Returns once the session finalizes the object, the retry budget at
    /// one offset runs out, the session rejects a chunk, or the transfer is
    /// cancelled. An empty source completes without sending anything.
    pub async fn transfer(
        &self,
        source: &dyn ByteSource,
        endpoint: &str,
    ) -> Result<TransferReport, TransferError> {
        if endpoint.trim().is_empty() {
            return Err(TransferError::InvalidConfig(
                "session endpoint must not be empty".into(),
            ));
        }

        let total = source.size();
        info!(total_bytes = total, chunk_size = self.config.chunk_size, "starting transfer");

        // Chunk events may be dropped on a full channel; the terminal event
        // goes through this slot instead.
        let terminal_slot = self.events_tx.clone().try_reserve_owned().ok();
        let cancel = self.cancel_token();

        let result = self.run(source, endpoint, total, &cancel).await;
        let terminal = match &result {
            Ok(report) => {
                self.set_state(TransferState::DoneSuccess);
                info!(
                    total_bytes = total,
                    requests = report.requests,
                    retries = report.retries,
                    "transfer complete"
                );
                TransferEvent::Completed {
                    total,
                    requests: report.requests,
                }
            }
            Err(TransferError::Cancelled { committed }) => {
                self.set_state(TransferState::Cancelled);
                self.rearm_cancel();
                info!(committed, "transfer cancelled");
                TransferEvent::Cancelled {
                    committed: *committed,
                }
            }
            Err(e) => {
                let committed = self.committed_hint();
                if let Some(reason) = e.reason() {
                    self.set_state(TransferState::DoneFailure(reason));
                }
                warn!(error = %e, committed, "transfer failed");
                TransferEvent::Failed {
                    committed,
                    error: e.to_string(),
                }
            }
        };
        match terminal_slot {
            Some(permit) => {
                permit.send(terminal);
            }
            None => self.emit(terminal),
        }
        result
    }

    async fn run(
        &self,
        source: &dyn ByteSource,
        endpoint: &str,
        total: u64,
        cancel: &CancellationToken,
    ) -> Result<TransferReport, TransferError> {
        let mut committed: u64 = 0;
        let mut failures: u32 = 0;
        let mut requests: u32 = 0;
        let mut retries: u32 = 0;

        while let Some(range) = ByteRange::next_chunk(committed, self.config.chunk_size, total) {
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled { committed });
            }

            let attempt = failures + 1;
            self.set_state(TransferState::Sending(range));
            self.emit(TransferEvent::ChunkStarted { range, attempt });
            debug!(start = range.start(), end = range.end(), attempt, "sending chunk");

            let body = source.slice(range.start(), range.end()).await?;
            let request = HttpRequest::put_chunk(endpoint, range, body);

            self.set_state(TransferState::AwaitingResponse(range));
            requests = requests.saturating_add(1);
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(TransferError::Cancelled { committed });
                }
                r = self.send_with_timeout(request) => r,
            };

            let error = match response {
                Ok(resp) => match resp.kind() {
                    ResponseKind::Complete => {
                        return Ok(TransferReport {
                            total_bytes: total,
                            requests,
                            retries,
                            final_status: Some(resp.status),
                        });
                    }
                    ResponseKind::ResumeIncomplete => match self.advance(&resp, range)? {
                        Attempt::Advanced {
                            committed: next,
                            confirmed,
                        } => {
                            committed = next;
                            failures = 0;
                            self.set_state(TransferState::Advancing { committed });
                            self.emit(TransferEvent::ChunkCommitted {
                                range,
                                committed,
                                confirmed,
                            });
                            debug!(committed, confirmed, "chunk committed");
                            continue;
                        }
                        Attempt::Failed(error) => error,
                    },
                    ResponseKind::Rejected(status) => {
                        return Err(TransferError::Rejected {
                            status,
                            offset: range.start(),
                        });
                    }
                    ResponseKind::Retryable(status) => format!("unexpected status {status}"),
                },
                Err(e) if !e.is_retryable() => return Err(e.into()),
                Err(e) => e.to_string(),
            };

            failures += 1;
            if self.config.retry.exhausted(failures) {
                return Err(TransferError::RetriesExhausted {
                    offset: range.start(),
                    attempts: failures,
                    last_error: error,
                });
            }
            retries = retries.saturating_add(1);

            let delay = self.config.retry.delay_for_attempt(failures);
            warn!(
                offset = range.start(),
                attempt = failures,
                error = %error,
                retry_in_ms = delay.as_millis() as u64,
                "chunk upload failed, retrying"
            );
            self.set_state(TransferState::RetryWait {
                range,
                attempt: failures,
            });
            self.emit(TransferEvent::ChunkFailed {
                range,
                attempt: failures,
                error,
                retry_in_ms: delay.as_millis() as u64,
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(TransferError::Cancelled { committed });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if total == 0 {
            return Ok(TransferReport {
                total_bytes: 0,
                requests,
                retries,
                final_status: None,
            });
        }

        // Every byte was accepted but the final chunk got a 308 instead of
        // 200/201, so the object was never finalized.
        Err(TransferError::MalformedResponse(format!(
            "all {total} bytes sent but the session never confirmed completion"
        )))
    }

    /// Interprets a `308` for `range`.
    fn advance(&self, resp: &HttpResponse, range: ByteRange) -> Result<Attempt, TransferError> {
        let Some(last) = resp.committed_through() else {
            debug!(
                end = range.end(),
                "308 without a usable Range header, assuming the whole chunk was accepted"
            );
            return Ok(Attempt::Advanced {
                committed: range.end(),
                confirmed: false,
            });
        };

        let next = last.saturating_add(1);
        if next > range.end() {
            return Err(TransferError::MalformedResponse(format!(
                "session reports {next} committed bytes but only {} were sent",
                range.end()
            )));
        }
        if next < range.start() {
            return Err(TransferError::MalformedResponse(format!(
                "session committed offset went back from {} to {next}",
                range.start()
            )));
        }
        if next == range.start() {
            return Ok(Attempt::Failed(format!(
                "session committed none of the chunk at offset {}",
                range.start()
            )));
        }
        Ok(Attempt::Advanced {
            committed: next,
            confirmed: true,
        })
    }

    /// Asks the session how many bytes it holds, with one request.
    pub async fn query_status(
        &self,
        endpoint: &str,
        total: u64,
    ) -> Result<SessionStatus, TransferError> {
        if endpoint.trim().is_empty() {
            return Err(TransferError::InvalidConfig(
                "session endpoint must not be empty".into(),
            ));
        }

        let request = HttpRequest::status_query(endpoint, total);
        let cancel = self.cancel_token();
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.rearm_cancel();
                return Err(TransferError::Cancelled { committed: 0 });
            }
            r = self.send_with_timeout(request) => r?,
        };

        match resp.kind() {
            ResponseKind::Complete => Ok(SessionStatus::Complete {
                status: resp.status,
            }),
            ResponseKind::ResumeIncomplete => {
                let committed = match resp.committed_through() {
                    Some(last) => last.saturating_add(1),
                    None => 0,
                };
                if committed > total {
                    return Err(TransferError::MalformedResponse(format!(
                        "session reports {committed} committed bytes for a {total}-byte object"
                    )));
                }
                debug!(committed, total, "session status");
                Ok(SessionStatus::Incomplete { committed })
            }
            ResponseKind::Rejected(status) => Err(TransferError::Rejected { status, offset: 0 }),
            ResponseKind::Retryable(status) => Err(TransferError::UnexpectedStatus { status }),
        }
    }

    async fn send_with_timeout(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }

    fn set_state(&self, state: TransferState) {
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: TransferEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            debug!("transfer event dropped: {e}");
        }
    }

    /// Best known committed offset, for the failure event.
    fn committed_hint(&self) -> u64 {
        match &*self.state_tx.borrow() {
            TransferState::Advancing { committed } => *committed,
            TransferState::Sending(range)
            | TransferState::AwaitingResponse(range)
            | TransferState::RetryWait { range, .. } => range.start(),
            _ => 0,
        }
    }
}
