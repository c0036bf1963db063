use std::fmt;

use serde::{Deserialize, Serialize};

/// Leading byte of a version component
pub const VERSION_MARKER: u8 = 0xFD;
/// Leading byte of a segment component
pub const SEGMENT_MARKER: u8 = 0x00;

/// Marker byte followed by a fixed-width big-endian u64. Fixed width keeps
/// byte order equal to numeric order.
const NUMBERED_LEN: usize = 1 + 8;

/// One opaque component of a [`Name`](super::Name)
///
/// Components order as byte strings: byte by byte, and when one is a prefix
/// of the other the shorter sorts first.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Component(Vec<u8>);

impl Component {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Component(bytes.into())
    }

    pub fn version(version: u64) -> Self {
        Self::numbered(VERSION_MARKER, version)
    }

    pub fn segment(index: u64) -> Self {
        Self::numbered(SEGMENT_MARKER, index)
    }

    fn numbered(marker: u8, value: u64) -> Self {
        let mut bytes = Vec::with_capacity(NUMBERED_LEN);
        bytes.push(marker);
        bytes.extend_from_slice(&value.to_be_bytes());
        Component(bytes)
    }

    fn as_numbered(&self, marker: u8) -> Option<u64> {
        if self.0.len() != NUMBERED_LEN || self.0[0] != marker {
            return None;
        }
        let mut buff = [0u8; 8];
        buff.copy_from_slice(&self.0[1..]);
        Some(u64::from_be_bytes(buff))
    }

    pub fn as_version(&self) -> Option<u64> {
        self.as_numbered(VERSION_MARKER)
    }

    pub fn as_segment(&self) -> Option<u64> {
        self.as_numbered(SEGMENT_MARKER)
    }

    pub fn is_version(&self) -> bool {
        self.as_version().is_some()
    }

    pub fn is_segment(&self) -> bool {
        self.as_segment().is_some()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Component {
    fn from(s: &str) -> Self {
        Component(s.as_bytes().to_vec())
    }
}

impl From<String> for Component {
    fn from(s: String) -> Self {
        Component(s.into_bytes())
    }
}

impl From<&[u8]> for Component {
    fn from(bytes: &[u8]) -> Self {
        Component(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Component {
    fn from(bytes: Vec<u8>) -> Self {
        Component(bytes)
    }
}

impl<const N: usize> From<&[u8; N]> for Component {
    fn from(bytes: &[u8; N]) -> Self {
        Component(bytes.to_vec())
    }
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~' | b'+' | b',' | b'=')
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if is_unreserved(b) {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "%{:02X}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(v) = self.as_version() {
            return write!(f, "v{}", v);
        }
        if let Some(s) = self.as_segment() {
            return write!(f, "s{}", s);
        }
        write!(f, "{}", self)
    }
}
