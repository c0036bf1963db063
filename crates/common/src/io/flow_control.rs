use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{watch, Semaphore};

use super::error::IoError;
use crate::name::Name;
use crate::store::{ContentStore, StoreError};

/// Bounded, acknowledged hand-off of blocks to the store
///
/// Each [`FlowControl::put`] takes a permit before it is sent and returns it
///  once the store acknowledges, so at most `capacity` blocks are in flight
///  and a fast writer waits on a slow store. Outstanding acknowledgements are
///  counted so [`FlowControl::wait_for_put_drain`] can tell when everything
///  landed. Failed puts are remembered and reported on the next drain.
#[derive(Debug, Clone)]
pub struct FlowControl<S: ContentStore> {
    store: S,
    permits: Arc<Semaphore>,
    outstanding: Arc<watch::Sender<usize>>,
    failures: Arc<Mutex<Vec<(Name, StoreError)>>>,
    timeout: Duration,
    enabled: bool,
}

impl<S: ContentStore> FlowControl<S> {
    pub fn new(store: S, capacity: usize, timeout: Duration) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(capacity)),
            outstanding: Arc::new(watch::Sender::new(0)),
            failures: Arc::new(Mutex::new(Vec::new())),
            timeout,
            enabled: true,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Stop tracking puts: blocks are sent without a permit and nobody
    ///  waits for their acknowledgement. Failures are only logged.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Blocks sent but not yet acknowledged
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Hand `data` to the store, waiting for a free permit first
    ///
    /// The wait for a permit is bounded by the timeout: a store that stops
    ///  acknowledging fails the put with [`IoError::DrainTimeout`] instead of
    ///  holding the writer forever.
    pub async fn put(&self, name: Name, data: Bytes) -> Result<(), IoError> {
        let store = self.store.clone();

        if !self.enabled {
            tokio::spawn(async move {
                if let Err(e) = store.put(&name, data).await {
                    tracing::warn!("unacknowledged put of {} failed: {}", name, e);
                }
            });
            return Ok(());
        }

        let permit = tokio::time::timeout(self.timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| {
                let outstanding = self.outstanding();
                tracing::warn!(
                    "no put slot for {} within {:?}, {} outstanding",
                    name,
                    self.timeout,
                    outstanding
                );
                IoError::DrainTimeout { outstanding }
            })?
            .map_err(|_| IoError::Closed)?;
        self.outstanding.send_modify(|n| *n += 1);

        let outstanding = self.outstanding.clone();
        let failures = self.failures.clone();
        tokio::spawn(async move {
            if let Err(e) = store.put(&name, data).await {
                tracing::warn!("put of {} failed: {}", name, e);
                failures.lock().push((name, e));
            }
            outstanding.send_modify(|n| *n -= 1);
            drop(permit);
        });
        Ok(())
    }

    /// Wait until every tracked put is acknowledged, up to the configured
    ///  timeout
    pub async fn wait_for_put_drain(&self) -> Result<(), IoError> {
        self.wait_for_put_drain_within(self.timeout).await
    }

    pub async fn wait_for_put_drain_within(&self, timeout: Duration) -> Result<(), IoError> {
        let mut rx = self.outstanding.subscribe();
        let drained = tokio::time::timeout(timeout, async {
            // the sender lives in self, so this only ends when the count hits zero
            let _ = rx.wait_for(|n| *n == 0).await;
        })
        .await;
        if drained.is_err() {
            let outstanding = self.outstanding();
            tracing::warn!("put drain timed out, {} outstanding", outstanding);
            return Err(IoError::DrainTimeout { outstanding });
        }

        let mut failures = std::mem::take(&mut *self.failures.lock());
        if failures.is_empty() {
            return Ok(());
        }
        let failed = failures.len();
        let (first, reason) = failures.swap_remove(0);
        Err(IoError::PutFailed {
            failed,
            first,
            reason,
        })
    }
}
