//! Queue publisher: one bounded delivery attempt per envelope.
//!
//! The broker handle is created lazily, cached for reuse, and dropped as soon
//! as a connect or publish call fails so that the next envelope starts from a
//! fresh connection. Failures never leave this module as errors; callers get a
//! [`PublishOutcome`].

use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    sync::Mutex,
    time::{self, Instant},
};
use tracing::{debug, warn};

use super::envelope::Envelope;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connect(String),
    #[error("broker channel setup failed: {0}")]
    Channel(String),
    #[error("broker publish failed: {0}")]
    Publish(String),
    #[error("broker {0} timed out after {1:?}")]
    Timeout(&'static str, Duration),
    #[error("envelope serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Transport to a message broker.
///
/// `connect` yields a ready-to-publish handle (queue declared); `publish`
/// delivers one payload over it. Neither retries. `close` tears down a
/// handle the publisher gave up on; it is best-effort.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    type Handle: Send + Sync + 'static;

    async fn connect(&self) -> Result<Self::Handle, BrokerError>;

    async fn publish(&self, handle: &Self::Handle, payload: &[u8]) -> Result<(), BrokerError>;

    async fn close(&self, _handle: &Self::Handle) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    NotDelivered(String),
}

impl PublishOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Sink the queuer hands finished envelopes to.
#[async_trait]
pub trait EnvelopePublisher: Send + Sync {
    async fn publish(&self, envelope: &Envelope) -> PublishOutcome;
}

pub struct QueuePublisher<B: Broker> {
    broker: B,
    handle: Mutex<Option<Arc<B::Handle>>>,
    /// Held by the one request currently connecting.
    connecting: Mutex<()>,
    timeout: Duration,
}

impl<B: Broker> QueuePublisher<B> {
    /// `timeout` bounds a whole delivery: waiting for another request's
    /// connect, connecting, and publishing.
    pub fn new(broker: B, timeout: Duration) -> Self {
        Self {
            broker,
            handle: Mutex::new(None),
            connecting: Mutex::new(()),
            timeout,
        }
    }

    #[cfg(test)]
    pub async fn is_connected(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    async fn cached(&self) -> Option<Arc<B::Handle>> {
        self.handle.lock().await.as_ref().map(Arc::clone)
    }

    /// Reuse the cached handle or open a new one before `deadline`.
    ///
    /// Only one request connects at a time; the others wait on `connecting`
    /// until their own deadline and then pick up whatever got cached. The
    /// handle slot itself is never locked across a broker call.
    async fn acquire(&self, deadline: Instant) -> Result<Arc<B::Handle>, BrokerError> {
        if let Some(handle) = self.cached().await {
            return Ok(handle);
        }

        let _connecting = time::timeout_at(deadline, self.connecting.lock())
            .await
            .map_err(|_| BrokerError::Timeout("connect", self.timeout))?;
        if let Some(handle) = self.cached().await {
            return Ok(handle);
        }

        let handle = time::timeout_at(deadline, self.broker.connect())
            .await
            .map_err(|_| BrokerError::Timeout("connect", self.timeout))??;
        let handle = Arc::new(handle);
        *self.handle.lock().await = Some(Arc::clone(&handle));
        debug!("queuer: broker connection established");
        Ok(handle)
    }

    /// Drop `failed` if it is still the cached handle and close it, waiting at
    /// most one timeout. A handle another request already replaced is left
    /// alone.
    async fn discard(&self, failed: &Arc<B::Handle>) {
        let removed = {
            let mut slot = self.handle.lock().await;
            if slot.as_ref().is_some_and(|held| Arc::ptr_eq(held, failed)) {
                slot.take()
            } else {
                None
            }
        };
        let Some(handle) = removed else {
            return;
        };
        debug!("queuer: broker connection discarded");

        if time::timeout(self.timeout, self.broker.close(&handle))
            .await
            .is_err()
        {
            debug!("queuer: closing discarded broker connection timed out");
        }
    }

    async fn deliver(&self, payload: &[u8]) -> Result<(), BrokerError> {
        let deadline = Instant::now() + self.timeout;
        let handle = self.acquire(deadline).await?;
        let result = match time::timeout_at(deadline, self.broker.publish(&handle, payload)).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Timeout("publish", self.timeout)),
        };
        if result.is_err() {
            self.discard(&handle).await;
        }
        result
    }
}

#[async_trait]
impl<B: Broker> EnvelopePublisher for QueuePublisher<B> {
    async fn publish(&self, envelope: &Envelope) -> PublishOutcome {
        let result = match serde_json::to_vec(envelope) {
            Ok(payload) => self.deliver(&payload).await,
            Err(err) => Err(BrokerError::from(err)),
        };

        match result {
            Ok(()) => PublishOutcome::Delivered,
            Err(err) => {
                warn!(error = %err, uri = %envelope.uri, "queuer: envelope not delivered");
                PublishOutcome::NotDelivered(err.to_string())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::queuer::envelope::Operation;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    /// In-process broker recording every payload it accepts.
    ///
    /// Handles are connection serial numbers. The flags switch on refused
    /// connections, connects and publishes that never return, and failing
    /// publishes. Closed handles are recorded.
    #[derive(Default)]
    pub(crate) struct FakeBroker {
        pub(crate) connects: AtomicU64,
        pub(crate) refuse_connect: AtomicBool,
        pub(crate) stall_connect: AtomicBool,
        pub(crate) closed: StdMutex<Vec<u64>>,
        pub(crate) fail_publish: AtomicBool,
        pub(crate) stall_publish: AtomicBool,
        pub(crate) published: StdMutex<Vec<Vec<u8>>>,
    }

    impl FakeBroker {
        pub(crate) fn messages(&self) -> Vec<serde_json::Value> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .map(|p| serde_json::from_slice(p).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl Broker for Arc<FakeBroker> {
        type Handle = u64;

        async fn connect(&self) -> Result<u64, BrokerError> {
            if self.stall_connect.load(Ordering::SeqCst) {
                time::sleep(Duration::from_secs(30)).await;
            }
            if self.refuse_connect.load(Ordering::SeqCst) {
                return Err(BrokerError::Connect("connection refused".into()));
            }
            Ok(self.connects.fetch_add(1, Ordering::SeqCst) + 1)
        }

        async fn publish(&self, _handle: &u64, payload: &[u8]) -> Result<(), BrokerError> {
            if self.stall_publish.load(Ordering::SeqCst) {
                time::sleep(Duration::from_secs(30)).await;
            }
            if self.fail_publish.load(Ordering::SeqCst) {
                return Err(BrokerError::Publish("channel closed".into()));
            }
            self.published.lock().unwrap().push(payload.to_vec());
            Ok(())
        }

        async fn close(&self, handle: &u64) {
            self.closed.lock().unwrap().push(*handle);
        }
    }

    fn closed_handles(broker: &FakeBroker) -> Vec<u64> {
        broker.closed.lock().unwrap().clone()
    }

    pub(crate) fn envelope() -> Envelope {
        Envelope {
            account: "A".into(),
            container: Some("C".into()),
            object: Some("obj1".into()),
            content_type: Some("text/plain".into()),
            content_length: Some(3),
            etag: None,
            metadata: BTreeMap::from([("color".to_string(), "red".to_string())]),
            op: Operation::Create,
            http_method: "PUT".into(),
            uri: "/v1/A/C/obj1".into(),
            timestamp: Utc::now(),
        }
    }

    fn publisher(broker: &Arc<FakeBroker>) -> QueuePublisher<Arc<FakeBroker>> {
        QueuePublisher::new(Arc::clone(broker), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn connects_lazily_and_reuses_the_connection() {
        let broker = Arc::new(FakeBroker::default());
        let publisher = publisher(&broker);
        assert!(!publisher.is_connected().await);
        assert_eq!(broker.connects.load(Ordering::SeqCst), 0);

        assert_eq!(publisher.publish(&envelope()).await, PublishOutcome::Delivered);
        assert_eq!(publisher.publish(&envelope()).await, PublishOutcome::Delivered);

        assert!(publisher.is_connected().await);
        assert_eq!(broker.connects.load(Ordering::SeqCst), 1);
        let messages = broker.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["metadata"]["color"], "red");
        assert_eq!(messages[0]["content-type"], "text/plain");
    }

    #[tokio::test]
    async fn connect_failure_is_reported_not_raised() {
        let broker = Arc::new(FakeBroker::default());
        broker.refuse_connect.store(true, Ordering::SeqCst);
        let publisher = publisher(&broker);

        let outcome = publisher.publish(&envelope()).await;
        assert!(!outcome.is_delivered());
        assert!(!publisher.is_connected().await);

        broker.refuse_connect.store(false, Ordering::SeqCst);
        assert!(publisher.publish(&envelope()).await.is_delivered());
    }

    #[tokio::test]
    async fn publish_failure_discards_connection_without_retrying() {
        let broker = Arc::new(FakeBroker::default());
        let publisher = publisher(&broker);
        assert!(publisher.publish(&envelope()).await.is_delivered());

        broker.fail_publish.store(true, Ordering::SeqCst);
        let outcome = publisher.publish(&envelope()).await;
        assert!(matches!(outcome, PublishOutcome::NotDelivered(ref reason) if reason.contains("channel closed")));
        assert!(!publisher.is_connected().await);
        // one attempt only: no reconnect happened inside the failed publish
        assert_eq!(broker.connects.load(Ordering::SeqCst), 1);

        broker.fail_publish.store(false, Ordering::SeqCst);
        assert!(publisher.publish(&envelope()).await.is_delivered());
        assert_eq!(broker.connects.load(Ordering::SeqCst), 2);
        assert_eq!(broker.messages().len(), 2);
    }

    #[tokio::test]
    async fn stalled_publish_times_out() {
        let broker = Arc::new(FakeBroker::default());
        broker.stall_publish.store(true, Ordering::SeqCst);
        let publisher = QueuePublisher::new(Arc::clone(&broker), Duration::from_millis(50));

        let started = std::time::Instant::now();
        let outcome = publisher.publish(&envelope()).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(outcome, PublishOutcome::NotDelivered(ref reason) if reason.contains("timed out")));
        assert!(!publisher.is_connected().await);
        assert!(broker.messages().is_empty());
    }

    #[tokio::test]
    async fn stale_failure_keeps_a_newer_connection() {
        let broker = Arc::new(FakeBroker::default());
        let publisher = publisher(&broker);

        let deadline = || Instant::now() + Duration::from_secs(1);

        let old = publisher.acquire(deadline()).await.unwrap();
        publisher.discard(&old).await;
        let fresh = publisher.acquire(deadline()).await.unwrap();
        assert_eq!(*fresh, 2);

        publisher.discard(&old).await;
        assert!(publisher.is_connected().await);
        assert_eq!(closed_handles(&broker), vec![1]);
    }

    #[tokio::test]
    async fn failed_connection_is_closed_not_just_dropped() {
        let broker = Arc::new(FakeBroker::default());
        let publisher = publisher(&broker);
        assert!(publisher.publish(&envelope()).await.is_delivered());

        broker.fail_publish.store(true, Ordering::SeqCst);
        assert!(!publisher.publish(&envelope()).await.is_delivered());

        assert_eq!(closed_handles(&broker), vec![1]);
    }

    #[tokio::test]
    async fn stalled_connect_times_out() {
        let broker = Arc::new(FakeBroker::default());
        broker.stall_connect.store(true, Ordering::SeqCst);
        let publisher = QueuePublisher::new(Arc::clone(&broker), Duration::from_millis(50));

        let outcome = publisher.publish(&envelope()).await;

        assert!(matches!(outcome, PublishOutcome::NotDelivered(ref reason) if reason.contains("connect timed out")));
        assert!(!publisher.is_connected().await);
    }

    #[tokio::test]
    async fn concurrent_publishes_stay_within_the_timeout() {
        let broker = Arc::new(FakeBroker::default());
        broker.stall_connect.store(true, Ordering::SeqCst);
        let timeout = Duration::from_millis(100);
        let publisher = Arc::new(QueuePublisher::new(Arc::clone(&broker), timeout));

        let tasks = (0..8)
            .map(|_| {
                let publisher = Arc::clone(&publisher);
                tokio::spawn(async move {
                    let started = std::time::Instant::now();
                    let outcome = publisher.publish(&envelope()).await;
                    (started.elapsed(), outcome)
                })
            })
            .collect::<Vec<_>>();

        for task in tasks {
            let (elapsed, outcome) = task.await.unwrap();
            assert!(!outcome.is_delivered());
            assert!(elapsed < timeout * 3, "publish took {elapsed:?}");
        }
        assert!(!publisher.is_connected().await);
    }
}
