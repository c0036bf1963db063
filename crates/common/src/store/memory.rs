use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::Notify;

use super::provider::{ContentStore, StoreError};
use crate::name::Name;

/// In-memory content store
///
/// Objects are kept in a `BTreeMap` ordered by name, which makes latest
///  version lookups a range scan. `get` waits for objects that have not
///  arrived yet, so one handle can block on content another handle is
///  still publishing.
#[derive(Debug, Clone, Default)]
pub struct MemoryContentStore {
    inner: Arc<MemoryContentStoreInner>,
}

#[derive(Debug, Default)]
struct MemoryContentStoreInner {
    objects: RwLock<BTreeMap<Name, Bytes>>,
    /// Woken on every put
    arrivals: Notify,
    /// Artificial delay before a put is acknowledged
    put_delay: Option<Duration>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that holds every put for `delay` before acknowledging it
    pub fn with_put_delay(delay: Duration) -> Self {
        Self {
            inner: Arc::new(MemoryContentStoreInner {
                put_delay: Some(delay),
                ..Default::default()
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.objects.read().is_empty()
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.inner.objects.read().contains_key(name)
    }

    /// Every stored name that starts with `prefix`, in name order
    pub fn names_under(&self, prefix: &Name) -> Vec<Name> {
        let objects = self.inner.objects.read();
        objects
            .range::<Name, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, name: &Name, data: Bytes) -> Result<(), StoreError> {
        if let Some(delay) = self.inner.put_delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut objects = self.inner.objects.write();
            match objects.get(name) {
                Some(existing) if *existing != data => {
                    return Err(StoreError::Backend(format!(
                        "conflicting content already published at {}",
                        name
                    )));
                }
                Some(_) => return Ok(()),
                None => {
                    objects.insert(name.clone(), data);
                }
            }
        }

        tracing::trace!("memory store: stored {}", name);
        self.inner.arrivals.notify_waiters();
        Ok(())
    }

    async fn get(&self, name: &Name, timeout: Duration) -> Result<Bytes, StoreError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // register interest before checking so a put between the
            //  check and the wait is not missed
            let arrival = self.inner.arrivals.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            if let Some(data) = self.inner.objects.read().get(name) {
                return Ok(data.clone());
            }

            if tokio::time::timeout_at(deadline, arrival).await.is_err() {
                return Err(StoreError::Timeout(name.clone()));
            }
        }
    }

    async fn get_latest_version(
        &self,
        base: &Name,
        _timeout: Duration,
    ) -> Result<Option<Name>, StoreError> {
        let objects = self.inner.objects.read();
        let depth = base.len();
        let latest = objects
            .range::<Name, _>((Bound::Excluded(base), Bound::Unbounded))
            .take_while(|(name, _)| base.is_prefix_of(name))
            .filter_map(|(name, _)| name.components()[depth].as_version())
            .max();
        Ok(latest.map(|v| base.with_version(v)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn name(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_put_get() {
        let store = MemoryContentStore::new();
        store
            .put(&name("/a/b"), Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let data = store.get(&name("/a/b"), Duration::ZERO).await.unwrap();
        assert_eq!(&data[..], b"hello");
        assert!(store.contains(&name("/a/b")));
    }

    #[tokio::test]
    async fn test_get_times_out() {
        let store = MemoryContentStore::new();
        let result = store.get(&name("/missing"), Duration::from_millis(10)).await;
        assert_eq!(result, Err(StoreError::Timeout(name("/missing"))));

        let optional = store
            .get_optional(&name("/missing"), Duration::ZERO)
            .await
            .unwrap();
        assert!(optional.is_none());
    }

    #[tokio::test]
    async fn test_get_awaits_arrival() {
        let store = MemoryContentStore::new();
        let writer = store.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer
                .put(&name("/late"), Bytes::from_static(b"arrived"))
                .await
                .unwrap();
        });

        let data = store.get(&name("/late"), Duration::from_secs(5)).await.unwrap();
        assert_eq!(&data[..], b"arrived");
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_immutable_names() {
        let store = MemoryContentStore::new();
        let n = name("/fixed");
        store.put(&n, Bytes::from_static(b"one")).await.unwrap();
        store.put(&n, Bytes::from_static(b"one")).await.unwrap();
        assert!(store.put(&n, Bytes::from_static(b"two")).await.is_err());
    }

    #[tokio::test]
    async fn test_latest_version() {
        let store = MemoryContentStore::new();
        let base = name("/docs/report");
        assert_eq!(
            store.get_latest_version(&base, Duration::ZERO).await.unwrap(),
            None
        );

        for v in [3u64, 17, 256] {
            let segment = base.with_version(v).add_segment(0);
            store.put(&segment, Bytes::from_static(b"x")).await.unwrap();
        }
        // a sibling with a longer name must not count
        store
            .put(&name("/docs/report2").with_version(999), Bytes::new())
            .await
            .unwrap();

        let latest = store
            .get_latest_version(&base, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest, base.with_version(256));
        assert_eq!(store.names_under(&base).len(), 3);
    }
}
