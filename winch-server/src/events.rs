//! Job event broker
//!
//! Injectable subscribe/notify registry keyed by job id. The executor
//! notifies after every store write for a job; streaming sessions subscribe
//! to wake up without polling per-line.
//!
//! Delivery is lossy by design: `notify` uses `try_send`, so a subscriber
//! whose wakeup channel is full misses that wakeup instead of blocking the
//! producer. Subscribers must pair the wakeup with a fallback timer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

const WAKEUP_CHANNEL_CAPACITY: usize = 16;

#[derive(Clone, Default)]
pub struct JobBroker {
    inner: Arc<Mutex<BrokerInner>>,
}

#[derive(Default)]
struct BrokerInner {
    next_token: u64,
    subscribers: HashMap<i64, Vec<(u64, mpsc::Sender<()>)>>,
}

impl JobBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to wakeups for one job. The subscription unsubscribes
    /// itself when dropped.
    pub fn subscribe(&self, job_id: i64) -> JobSubscription {
        let (tx, rx) = mpsc::channel(WAKEUP_CHANNEL_CAPACITY);
        let mut inner = self.inner.lock().unwrap();
        let token = inner.next_token;
        inner.next_token += 1;
        inner.subscribers.entry(job_id).or_default().push((token, tx));

        JobSubscription {
            job_id,
            token,
            rx,
            broker: Arc::clone(&self.inner),
        }
    }

    /// Wake every subscriber of a job. Never blocks: full channels drop the
    /// wakeup, closed channels are pruned.
    pub fn notify(&self, job_id: i64) {
        let mut inner = self.inner.lock().unwrap();
        let empty = if let Some(subs) = inner.subscribers.get_mut(&job_id) {
            subs.retain(|(_, tx)| match tx.try_send(()) {
                Ok(()) => true,
                Err(TrySendError::Full(())) => true,
                Err(TrySendError::Closed(())) => false,
            });
            subs.is_empty()
        } else {
            false
        };
        if empty {
            inner.subscribers.remove(&job_id);
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self, job_id: i64) -> usize {
        self.inner
            .lock()
            .unwrap()
            .subscribers
            .get(&job_id)
            .map_or(0, |subs| subs.len())
    }
}

pub struct JobSubscription {
    job_id: i64,
    token: u64,
    rx: mpsc::Receiver<()>,
    broker: Arc<Mutex<BrokerInner>>,
}

impl JobSubscription {
    /// Wait for the next wakeup for this job.
    pub async fn changed(&mut self) {
        if self.rx.recv().await.is_none() {
            // Sender pruned by the broker; let the caller's fallback timer
            // drive progress instead of spinning here.
            std::future::pending::<()>().await;
        }
    }
}

impl Drop for JobSubscription {
    fn drop(&mut self) {
        let mut inner = self.broker.lock().unwrap();
        let empty = if let Some(subs) = inner.subscribers.get_mut(&self.job_id) {
            subs.retain(|(token, _)| *token != self.token);
            subs.is_empty()
        } else {
            false
        };
        if empty {
            inner.subscribers.remove(&self.job_id);
        }
    }
}
