//! Progress reporting derived from [`TransferEvent`]s.

use std::collections::VecDeque;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::types::TransferEvent;

/// Callback invoked whenever the committed offset moves.
pub type ProgressCallback = Box<dyn Fn(&TransferProgress) + Send + Sync>;

/// Snapshot of one transfer's progress.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferProgress {
    pub committed: u64,
    pub total: u64,
    /// Failed attempts seen so far.
    pub retries: u32,
    pub bytes_per_second: f64,
    pub eta: Option<Duration>,
}

impl TransferProgress {
    /// Fraction committed, in `[0.0, 1.0]`. An empty payload counts as done.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.committed as f64 / self.total as f64).min(1.0)
    }

    pub fn percent(&self) -> f64 {
        self.fraction() * 100.0
    }
}

/// Folds the driver's event stream into a running [`TransferProgress`].
pub struct ProgressTracker {
    inner: RwLock<TrackerInner>,
    speed: SpeedCalculator,
}

struct TrackerInner {
    callbacks: Vec<ProgressCallback>,
    total: u64,
    committed: u64,
    retries: u32,
}

impl ProgressTracker {
    /// Creates a tracker for a payload of `total` bytes.
    pub fn new(total: u64) -> Self {
        Self {
            inner: RwLock::new(TrackerInner {
                callbacks: Vec::new(),
                total,
                committed: 0,
                retries: 0,
            }),
            speed: SpeedCalculator::default(),
        }
    }

    /// Registers a progress callback.
    pub fn on_progress(&self, callback: ProgressCallback) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.callbacks.push(callback);
    }

    /// Applies one event. Returns `true` if the event ends the transfer.
    pub fn apply(&self, event: &TransferEvent) -> bool {
        let (moved, terminal) = {
            let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
            match event {
                TransferEvent::ChunkStarted { .. } => (false, false),
                TransferEvent::ChunkCommitted { committed, .. } => {
                    let delta = committed.saturating_sub(inner.committed);
                    inner.committed = inner.committed.max(*committed);
                    self.speed.add_sample(delta);
                    (delta > 0, false)
                }
                TransferEvent::ChunkFailed { .. } => {
                    inner.retries = inner.retries.saturating_add(1);
                    (false, false)
                }
                TransferEvent::Completed { total, .. } => {
                    let delta = total.saturating_sub(inner.committed);
                    inner.committed = *total;
                    self.speed.add_sample(delta);
                    (true, true)
                }
                TransferEvent::Cancelled { .. } | TransferEvent::Failed { .. } => (false, true),
            }
        };

        if moved {
            let progress = self.snapshot();
            let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
            for cb in &inner.callbacks {
                cb(&progress);
            }
        }
        terminal
    }

    /// Consumes events until the transfer ends or the channel closes.
    pub async fn follow(&self, events: &mut mpsc::Receiver<TransferEvent>) {
        while let Some(event) = events.recv().await {
            if self.apply(&event) {
                break;
            }
        }
    }

    /// Returns the current progress.
    pub fn snapshot(&self) -> TransferProgress {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        TransferProgress {
            committed: inner.committed,
            total: inner.total,
            retries: inner.retries,
            bytes_per_second: self.speed.bytes_per_second(),
            eta: self.speed.eta(inner.total.saturating_sub(inner.committed)),
        }
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

const DEFAULT_WINDOW: Duration = Duration::from_secs(5);
const DEFAULT_MAX_SAMPLES: usize = 64;

struct SpeedSample {
    bytes: u64,
    at: Instant,
}

/// Throughput over a sliding window of committed-byte samples.
pub struct SpeedCalculator {
    samples: Mutex<VecDeque<SpeedSample>>,
    window: Duration,
    max_samples: usize,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_MAX_SAMPLES)
    }
}

impl SpeedCalculator {
    pub fn new(window: Duration, max_samples: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::new()),
            window,
            max_samples: max_samples.max(2),
        }
    }

    /// Records `bytes` committed at the current instant.
    pub fn add_sample(&self, bytes: u64) {
        let now = Instant::now();
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        samples.push_back(SpeedSample { bytes, at: now });

        if let Some(cutoff) = now.checked_sub(self.window) {
            while samples.front().is_some_and(|s| s.at < cutoff) {
                samples.pop_front();
            }
        }
        while samples.len() > self.max_samples {
            samples.pop_front();
        }
    }

    /// Average bytes/second within the window; 0.0 with fewer than two
    /// samples.
    ///
    /// The oldest sample only marks the start of the window, so its bytes
    /// are not counted.
    pub fn bytes_per_second(&self) -> f64 {
        let samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        let (Some(first), Some(last)) = (samples.front(), samples.back()) else {
            return 0.0;
        };
        let elapsed = last.at.duration_since(first.at);
        if samples.len() < 2 || elapsed.is_zero() {
            return 0.0;
        }
        let bytes: u64 = samples.iter().skip(1).map(|s| s.bytes).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }

    /// Time left for `remaining` bytes at the current speed.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(remaining as f64 / speed).ok()
    }

    pub fn reset(&self) {
        self.samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resumable_protocol::ByteRange;
    use std::sync::Arc;

    fn committed(end: u64, total: u64) -> TransferEvent {
        TransferEvent::ChunkCommitted {
            range: ByteRange::new(0, end, total).unwrap(),
            committed: end,
            confirmed: true,
        }
    }

    #[test]
    fn tracker_folds_events() {
        let tracker = ProgressTracker::new(100);
        assert!(!tracker.apply(&committed(40, 100)));
        assert!(!tracker.apply(&TransferEvent::ChunkFailed {
            range: ByteRange::new(40, 80, 100).unwrap(),
            attempt: 1,
            error: "reset".into(),
            retry_in_ms: 10,
        }));

        let progress = tracker.snapshot();
        assert_eq!(progress.committed, 40);
        assert_eq!(progress.retries, 1);
        assert!((progress.fraction() - 0.4).abs() < f64::EPSILON);

        assert!(tracker.apply(&TransferEvent::Completed {
            total: 100,
            requests: 3,
        }));
        assert_eq!(tracker.snapshot().committed, 100);
    }

    #[test]
    fn tracker_callbacks_fire_on_progress_only() {
        let tracker = ProgressTracker::new(10);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        tracker.on_progress(Box::new(move |p: &TransferProgress| {
            s.lock().unwrap().push(p.committed);
        }));

        tracker.apply(&TransferEvent::ChunkStarted {
            range: ByteRange::new(0, 4, 10).unwrap(),
            attempt: 1,
        });
        tracker.apply(&committed(4, 10));
        tracker.apply(&TransferEvent::Completed {
            total: 10,
            requests: 3,
        });

        assert_eq!(*seen.lock().unwrap(), vec![4, 10]);
    }

    #[test]
    fn tracker_failure_is_terminal() {
        let tracker = ProgressTracker::new(10);
        assert!(tracker.apply(&TransferEvent::Failed {
            committed: 0,
            error: "gave up".into(),
        }));
        assert!(tracker.apply(&TransferEvent::Cancelled { committed: 0 }));
    }

    #[test]
    fn empty_payload_is_complete() {
        let tracker = ProgressTracker::new(0);
        assert_eq!(tracker.snapshot().fraction(), 1.0);
    }

    #[tokio::test]
    async fn follow_stops_at_terminal_event() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(committed(5, 10)).await.unwrap();
        tx.send(TransferEvent::Cancelled { committed: 5 })
            .await
            .unwrap();
        tx.send(committed(10, 10)).await.unwrap();

        let tracker = ProgressTracker::new(10);
        tracker.follow(&mut rx).await;

        assert_eq!(tracker.snapshot().committed, 5);
        // The event after the terminal one is left in the channel.
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn speed_needs_two_samples() {
        let calc = SpeedCalculator::default();
        assert_eq!(calc.bytes_per_second(), 0.0);
        calc.add_sample(100);
        assert_eq!(calc.bytes_per_second(), 0.0);
        assert!(calc.eta(1000).is_none());
    }

    #[test]
    fn speed_and_eta() {
        let calc = SpeedCalculator::default();
        calc.add_sample(0);
        std::thread::sleep(Duration::from_millis(50));
        calc.add_sample(1000);

        assert!(calc.bytes_per_second() > 0.0);
        assert!(calc.eta(10_000).is_some_and(|eta| eta > Duration::ZERO));

        calc.reset();
        assert_eq!(calc.bytes_per_second(), 0.0);
    }

    #[test]
    fn speed_caps_sample_count() {
        let calc = SpeedCalculator::new(Duration::from_secs(60), 5);
        for i in 0..20 {
            calc.add_sample(i * 10);
        }
        assert_eq!(calc.samples.lock().unwrap().len(), 5);
    }
}
