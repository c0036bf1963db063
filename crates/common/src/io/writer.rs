use std::time::Duration;

use super::error::IoError;
use super::flow_control::FlowControl;
use super::segmenter::{SegmentOptions, Segmenter};
use crate::content::{ContentType, KeyLocator};
use crate::crypto::PrincipalDigest;
use crate::handle::Handle;
use crate::identity::Identity;
use crate::name::Name;
use crate::store::ContentStore;

#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Ignored for protected names, which are always `Encrypted`
    pub content_type: ContentType,
    /// Digest of the local identity to sign as; the default identity if unset
    pub publisher: Option<PrincipalDigest>,
    pub freshness_seconds: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct NewVersionOptions {
    /// Ignored for protected names, which are always `Encrypted`
    pub content_type: ContentType,
    pub locator: KeyLocator,
    pub publisher: Option<PrincipalDigest>,
}

/// Publishes content, encrypted when an ACL covers it
///
/// Puts return once every block has been handed to flow control; call
///  [`Writer::close`] to wait for the store to acknowledge them.
#[derive(Debug)]
pub struct Writer<S: ContentStore> {
    handle: Handle<S>,
    flow: FlowControl<S>,
    segmenter: Segmenter,
    closed: bool,
}

impl<S: ContentStore> Writer<S> {
    pub fn new(handle: Handle<S>) -> Self {
        let config = handle.config();
        let flow = FlowControl::new(handle.store().clone(), config.flow_capacity, config.timeout());
        let segmenter = Segmenter::new(config.block_size);
        Self {
            handle,
            flow,
            segmenter,
            closed: false,
        }
    }

    /// Publish `data` at `name`, adding a timestamp version if `name` has
    ///  none
    ///
    /// # Returns
    /// * the versioned name the content was published under
    pub async fn put(&mut self, name: &Name, data: &[u8], options: PutOptions) -> Result<Name, IoError> {
        let versioned = if name.is_versioned() {
            name.clone()
        } else {
            name.add_version()
        };
        let segment_options = SegmentOptions {
            content_type: options.content_type,
            freshness_seconds: options.freshness_seconds,
            key_locator: KeyLocator::Key,
        };
        self.publish(&versioned, data, &segment_options, options.publisher.as_ref())
            .await?;
        Ok(versioned)
    }

    /// Publish `data` as a version newer than any the store knows of
    ///
    /// The latest version is read first and the new one derived from it, so
    ///  two writers racing on the same name can pick the same version.
    pub async fn new_version(
        &mut self,
        name: &Name,
        data: &[u8],
        options: NewVersionOptions,
    ) -> Result<Name, IoError> {
        let base = name.base();
        let latest = self
            .handle
            .store()
            .get_latest_version(&base, self.flow.timeout())
            .await?
            .and_then(|n| n.version());
        let versioned = base.add_next_version(latest);

        let segment_options = SegmentOptions {
            content_type: options.content_type,
            freshness_seconds: None,
            key_locator: options.locator,
        };
        self.publish(&versioned, data, &segment_options, options.publisher.as_ref())
            .await?;
        Ok(versioned)
    }

    /// Wait for every put to be acknowledged
    ///
    /// The writer accepts no more puts afterwards, whatever the outcome.
    pub async fn close(&mut self) -> Result<(), IoError> {
        self.closed = true;
        self.flow.wait_for_put_drain().await
    }

    /// Send blocks without waiting for acknowledgements
    pub fn disable_flow_control(&mut self) {
        self.flow.disable();
    }

    /// Bound on lookups and on the drain in [`Writer::close`]
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.flow.set_timeout(timeout);
    }

    pub fn flow_control(&self) -> &FlowControl<S> {
        &self.flow
    }

    fn publisher(&self, digest: Option<&PrincipalDigest>) -> Result<&Identity, IoError> {
        match digest {
            Some(digest) => self
                .handle
                .identities()
                .get(digest)
                .ok_or(IoError::UnknownPublisher(*digest)),
            None => Ok(self.handle.identity()),
        }
    }

    async fn publish(
        &self,
        versioned: &Name,
        data: &[u8],
        options: &SegmentOptions,
        publisher: Option<&PrincipalDigest>,
    ) -> Result<u64, IoError> {
        if self.closed {
            return Err(IoError::Closed);
        }
        let signer = self.publisher(publisher)?.secret_key().clone();
        let protection = self.handle.protection_key(versioned).await?;
        self.segmenter
            .put(
                &self.flow,
                versioned,
                data,
                options,
                protection.as_ref(),
                &signer,
            )
            .await
    }
}
