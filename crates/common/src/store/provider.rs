use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::name::Name;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store did not ack or return within the bound
    #[error("timed out waiting for {0}")]
    Timeout(Name),
    /// Any other backend failure, already stringified so backend
    ///  types never leak past the store boundary
    #[error("content store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout(_))
    }
}

/// Storage for immutable, signed, named content objects
///
/// This is the seam to the network/repository. Everything above it
///  addresses data by [`Name`] only.
#[async_trait]
pub trait ContentStore: Send + Sync + Debug + Clone + 'static {
    /// Publish `data` at `name`
    ///
    /// Resolves once the store has acknowledged the object. Objects are
    ///  immutable: re-putting identical bytes is accepted, putting
    ///  different bytes at an existing name is a backend error.
    async fn put(&self, name: &Name, data: Bytes) -> Result<(), StoreError>;

    /// Fetch the object at exactly `name`, waiting up to `timeout`
    ///  for it to arrive
    ///
    /// # Returns
    /// * `Err(StoreError::Timeout)` - nothing arrived within the bound
    async fn get(&self, name: &Name, timeout: Duration) -> Result<Bytes, StoreError>;

    /// Find the highest version published directly under `base`
    ///
    /// # Returns
    /// * `Ok(Some(name))` - `base` plus its latest version component
    /// * `Ok(None)` - no version of `base` is known
    async fn get_latest_version(
        &self,
        base: &Name,
        timeout: Duration,
    ) -> Result<Option<Name>, StoreError>;

    /// Fetch the object at `name` if it shows up within `timeout`,
    ///  mapping a timeout to `None`
    async fn get_optional(
        &self,
        name: &Name,
        timeout: Duration,
    ) -> Result<Option<Bytes>, StoreError> {
        match self.get(name, timeout).await {
            Ok(data) => Ok(Some(data)),
            Err(StoreError::Timeout(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
