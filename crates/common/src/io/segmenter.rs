use super::error::IoError;
use super::flow_control::FlowControl;
use crate::access::ProtectionKey;
use crate::content::{ContentObject, ContentType, KeyLocator, KeyRef, SignedInfo};
use crate::crypto::SecretKey;
use crate::name::Name;
use crate::store::ContentStore;

/// Signed-info fields shared by every segment of one version
#[derive(Debug, Clone, Default)]
pub struct SegmentOptions {
    pub content_type: ContentType,
    pub freshness_seconds: Option<u32>,
    pub key_locator: KeyLocator,
}

/// Splits a payload into fixed-size signed blocks
#[derive(Debug, Clone, Copy)]
pub struct Segmenter {
    block_size: usize,
}

impl Segmenter {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Segments needed for `len` bytes; an empty payload still takes one
    pub fn segment_count(&self, len: usize) -> u64 {
        len.div_ceil(self.block_size).max(1) as u64
    }

    /// Build the segments of `data` published at the versioned name
    ///  `versioned`
    ///
    /// Blocks are sealed under the data key of `protection` when given,
    ///  bound to their segment name, and every segment carries the index of
    ///  the last one.
    pub fn segment(
        &self,
        versioned: &Name,
        data: &[u8],
        options: &SegmentOptions,
        protection: Option<&ProtectionKey>,
        signer: &SecretKey,
    ) -> Result<Vec<ContentObject>, IoError> {
        let final_segment = self.segment_count(data.len()) - 1;
        let data_key = protection.map(|p| p.data_key(versioned));
        let key_ref = protection.map(|p| KeyRef {
            node: p.node.clone(),
            version: p.version,
        });
        let content_type = if protection.is_some() {
            ContentType::Encrypted
        } else {
            options.content_type
        };

        let blocks: Vec<&[u8]> = if data.is_empty() {
            vec![data]
        } else {
            data.chunks(self.block_size).collect()
        };

        let mut segments = Vec::with_capacity(blocks.len());
        for (index, block) in blocks.into_iter().enumerate() {
            let name = versioned.add_segment(index as u64);
            let payload = match &data_key {
                Some(key) => key.seal(block, name.to_uri().as_bytes())?,
                None => block.to_vec(),
            };
            let mut info = SignedInfo::new(signer.public(), content_type);
            info.freshness_seconds = options.freshness_seconds;
            info.final_segment = Some(final_segment);
            info.key_locator = options.key_locator.clone();

            segments.push(ContentObject::sign(
                name,
                info,
                key_ref.clone(),
                payload,
                signer,
            )?);
        }
        Ok(segments)
    }

    /// Segment `data` and hand the blocks to `flow` in index order
    ///
    /// # Returns
    /// * the number of segments published
    pub async fn put<S: ContentStore>(
        &self,
        flow: &FlowControl<S>,
        versioned: &Name,
        data: &[u8],
        options: &SegmentOptions,
        protection: Option<&ProtectionKey>,
        signer: &SecretKey,
    ) -> Result<u64, IoError> {
        let segments = self.segment(versioned, data, options, protection, signer)?;
        let count = segments.len() as u64;
        for segment in segments {
            let encoded = segment.encode()?;
            flow.put(segment.name().clone(), encoded).await?;
        }
        tracing::debug!(
            "queued {} segments of {} ({} bytes{})",
            count,
            versioned,
            data.len(),
            if protection.is_some() { ", encrypted" } else { "" }
        );
        Ok(count)
    }
}
