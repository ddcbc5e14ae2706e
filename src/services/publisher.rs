//! Change-event publication.
//!
//! `publish` blocks until the transport accepts the event. The async variant
//! returns immediately and a background task retries with exponential backoff
//! until delivery succeeds. `close` stops intake and waits for those tasks; if
//! a drain timeout is configured, tasks still pending when it expires are
//! cancelled and every abandoned event is logged.

use crate::errors::{StorageError, StorageResult};
use crate::models::{EventKind, FileInfo};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// The message-bus seam. Implementations deliver one serialized event.
#[async_trait]
pub trait EventTransport: Send + Sync + 'static {
    async fn send(&self, kind: EventKind, payload: Bytes) -> StorageResult<()>;
}

#[async_trait]
pub trait ChangePublisher: Send + Sync {
    /// Deliver `info` and wait for the transport to accept it.
    async fn publish(&self, kind: EventKind, info: &FileInfo) -> StorageResult<()>;

    /// Deliver `info` in the background, retrying until it succeeds.
    fn publish_async_with_retries(&self, kind: EventKind, info: FileInfo);

    /// Stop accepting events and wait for outstanding background deliveries.
    async fn close(&self);
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// How long `close` waits before abandoning pending deliveries. `None` waits forever.
    pub drain_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            drain_timeout: Some(Duration::from_secs(30)),
        }
    }
}

pub struct RetryingPublisher<T: EventTransport> {
    transport: Arc<T>,
    policy: RetryPolicy,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    closed: AtomicBool,
    /// Held while checking `closed` and spawning, and while closing, so no
    /// spawn can slip past a finished drain.
    intake: std::sync::Mutex<()>,
}

impl<T: EventTransport> RetryingPublisher<T> {
    pub fn new(transport: Arc<T>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
            intake: std::sync::Mutex::new(()),
        }
    }

    /// Background deliveries still in flight.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }
}

#[async_trait]
impl<T: EventTransport> ChangePublisher for RetryingPublisher<T> {
    async fn publish(&self, kind: EventKind, info: &FileInfo) -> StorageResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::PublisherClosed);
        }
        let payload = Bytes::from(serde_json::to_vec(info)?);
        self.transport.send(kind, payload).await
    }

    fn publish_async_with_retries(&self, kind: EventKind, info: FileInfo) {
        let _intake = self.intake.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::SeqCst) {
            error!(kind = %kind, bucket = %info.bucket_id, file = %info.file_id, version = %info.version,
                "publisher closed, event dropped");
            return;
        }

        let transport = self.transport.clone();
        let policy = self.policy.clone();
        let shutdown = self.shutdown.clone();
        self.tracker.spawn(async move {
            let payload = match serde_json::to_vec(&info) {
                Ok(p) => Bytes::from(p),
                Err(err) => {
                    error!(kind = %kind, file = %info.file_id, "event not serializable: {}", err);
                    return;
                }
            };

            let mut backoff = policy.initial_backoff;
            let mut attempt: u32 = 1;
            loop {
                let sent = tokio::select! {
                    _ = shutdown.cancelled() => None,
                    result = transport.send(kind, payload.clone()) => Some(result),
                };
                match sent {
                    Some(Ok(())) => {
                        debug!(kind = %kind, file = %info.file_id, attempt, "event published");
                        return;
                    }
                    Some(Err(err)) => {
                        warn!(kind = %kind, file = %info.file_id, attempt, "publish failed, retrying: {}", err);
                    }
                    None => break,
                }

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(policy.max_backoff);
                attempt += 1;
            }

            error!(kind = %kind, bucket = %info.bucket_id, file = %info.file_id, version = %info.version,
                attempt, "publisher shut down before event was delivered");
        });
    }

    async fn close(&self) {
        {
            let _intake = self.intake.lock().unwrap_or_else(PoisonError::into_inner);
            self.closed.store(true, Ordering::SeqCst);
            self.tracker.close();
        }

        let pending = self.tracker.len();
        if pending > 0 {
            info!(pending, "waiting for outstanding change events");
        }

        match self.policy.drain_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, self.tracker.wait()).await.is_err() {
                    warn!(pending = self.tracker.len(), "drain timeout elapsed, abandoning deliveries");
                    self.shutdown.cancel();
                    self.tracker.wait().await;
                }
            }
            None => self.tracker.wait().await,
        }
    }
}

/// Records delivered events; can be told to fail a number of sends first.
#[derive(Default)]
pub struct MemoryTransport {
    delivered: Mutex<Vec<(EventKind, FileInfo)>>,
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose first `failures` sends are rejected.
    pub fn failing(failures: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(failures),
            ..Self::default()
        }
    }

    pub async fn events(&self) -> Vec<(EventKind, FileInfo)> {
        self.delivered.lock().await.clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventTransport for MemoryTransport {
    async fn send(&self, kind: EventKind, payload: Bytes) -> StorageResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let rejected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(StorageError::Publish("transport unavailable".into()));
        }
        let info: FileInfo = serde_json::from_slice(&payload)?;
        self.delivered.lock().await.push((kind, info));
        Ok(())
    }
}

/// Writes every event to the log. Used when no bus is attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl EventTransport for LogTransport {
    async fn send(&self, kind: EventKind, payload: Bytes) -> StorageResult<()> {
        info!(subject = %kind, payload = %String::from_utf8_lossy(&payload), "change event");
        Ok(())
    }
}
