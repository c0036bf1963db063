use std::io::{Cursor, Read};

use futures::future::try_join_all;

use super::error::IoError;
use crate::access::{data_key, UserKeyRecord};
use crate::content::{ContentObject, ContentType, KeyLocator, SignedInfo};
use crate::crypto::{PublicKey, Secret};
use crate::handle::Handle;
use crate::name::Name;
use crate::store::ContentStore;

/// Fetches, verifies, decrypts and reassembles published content
#[derive(Debug, Clone)]
pub struct Reader<S: ContentStore> {
    handle: Handle<S>,
}

impl<S: ContentStore> Reader<S> {
    pub fn new(handle: Handle<S>) -> Self {
        Self { handle }
    }

    /// Open the content at `name`
    ///
    /// An unversioned name opens its latest version. Segment 0 is fetched
    ///  first to learn the segment count, the rest are fetched concurrently.
    ///
    /// # Returns
    /// * `Err(e)` with `e.is_access_denied()` - the content is encrypted
    ///   and no local identity can unwrap its node key
    pub async fn open(&self, name: &Name) -> Result<ContentStream, IoError> {
        let timeout = self.handle.config().timeout();
        let store = self.handle.store();

        let name = match name.segment() {
            Some(_) => name.parent().unwrap_or_default(),
            None => name.clone(),
        };
        let versioned = if name.is_versioned() {
            name
        } else {
            store
                .get_latest_version(&name, timeout)
                .await?
                .ok_or_else(|| IoError::NotFound(name.clone()))?
        };

        let first = self.fetch_segment(&versioned, 0).await?;
        let final_segment = first.final_segment().unwrap_or(0);
        let max_segments = self.handle.config().max_segments;
        if final_segment >= max_segments {
            return Err(IoError::malformed(
                &versioned,
                format!(
                    "claims {} segments, more than the {} accepted",
                    final_segment.saturating_add(1),
                    max_segments
                ),
            ));
        }
        let mut segments = vec![first];
        segments.extend(
            try_join_all((1..=final_segment).map(|index| self.fetch_segment(&versioned, index)))
                .await?,
        );

        let info = segments[0].info().clone();
        let key_ref = segments[0].key_ref().cloned();
        for segment in &segments {
            if segment.final_segment() != Some(final_segment)
                || segment.key_ref() != key_ref.as_ref()
                || segment.publisher() != &info.publisher
            {
                return Err(IoError::malformed(
                    segment.name(),
                    "segment disagrees with segment 0",
                ));
            }
        }
        if let KeyLocator::Name(locator) = &info.key_locator {
            self.verify_locator(&versioned, locator, &info.publisher)
                .await?;
        }

        let data_key = match &key_ref {
            Some(key_ref) => {
                let acm = self.handle.access_control(&key_ref.node).await?;
                let node_key = acm.node_key(&key_ref.node, key_ref.version).await?;
                Some(data_key(&node_key, &versioned))
            }
            None if info.content_type == ContentType::Encrypted => {
                return Err(IoError::malformed(&versioned, "encrypted without a key reference"));
            }
            None => None,
        };

        let mut data = Vec::new();
        for segment in segments {
            match &data_key {
                Some(key) => data.extend(decrypt(key, &segment)?),
                None => data.extend(segment.into_payload()),
            }
        }
        tracing::debug!(
            "read {} ({} segments, {} bytes)",
            versioned,
            final_segment + 1,
            data.len()
        );

        Ok(ContentStream {
            name: versioned,
            info,
            segments: final_segment + 1,
            data: Cursor::new(data),
        })
    }

    async fn fetch_segment(&self, versioned: &Name, index: u64) -> Result<ContentObject, IoError> {
        let name = versioned.add_segment(index);
        let data = self
            .handle
            .store()
            .get(&name, self.handle.config().timeout())
            .await?;
        Ok(ContentObject::decode(&name, &data)?)
    }

    /// Check that the key object `locator` names holds the key the content
    ///  was signed with
    async fn verify_locator(
        &self,
        versioned: &Name,
        locator: &Name,
        publisher: &PublicKey,
    ) -> Result<(), IoError> {
        let data = self
            .handle
            .store()
            .get(locator, self.handle.config().timeout())
            .await?;
        let record: UserKeyRecord = ContentObject::decode(locator, &data)?.record()?;
        if &record.public_key != publisher {
            return Err(IoError::KeyLocatorMismatch(versioned.clone()));
        }
        Ok(())
    }
}

fn decrypt(key: &Secret, segment: &ContentObject) -> Result<Vec<u8>, IoError> {
    Ok(key.open(segment.payload(), segment.name().to_uri().as_bytes())?)
}

/// A fully fetched and decrypted version, readable with [`std::io::Read`]
#[derive(Debug)]
pub struct ContentStream {
    name: Name,
    info: SignedInfo,
    segments: u64,
    data: Cursor<Vec<u8>>,
}

impl ContentStream {
    /// The versioned name that was read
    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn info(&self) -> &SignedInfo {
        &self.info
    }

    pub fn publisher(&self) -> &PublicKey {
        &self.info.publisher
    }

    pub fn segments(&self) -> u64 {
        self.segments
    }

    pub fn len(&self) -> usize {
        self.data.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.get_ref().is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data.into_inner()
    }
}

impl Read for ContentStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.data.read(buf)
    }
}
