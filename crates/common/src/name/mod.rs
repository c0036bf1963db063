//! Hierarchical content names
//!
//! A [`Name`] is an ordered sequence of opaque binary [`Component`]s. Names
//! are the only addressing scheme: content, ACLs, wrapped keys and group
//! records all live at names.
//!
//! Two component kinds are reserved:
//!
//! ```text
//! /domain/docs/report.pdf/%FD<version>/%00<segment>
//!                         ^^^^^^^^^^^^ ^^^^^^^^^^^^
//!                         version      segment (0, 1, ... final)
//! ```
//!
//! A version is appended to a base name to create a new immutable version;
//! segments enumerate the blocks of that version.
//!
//! # Version allocation
//!
//! [`Name::add_next_version`] picks a value greater than the latest version
//! the caller has observed. Observing and then publishing is a read-then-write
//! race: two writers on different handles can pick the same number. That is a
//! known limitation of the scheme, not a unique allocator.

mod component;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use component::{Component, SEGMENT_MARKER, VERSION_MARKER};

#[derive(Debug, thiserror::Error)]
pub enum NameError {
    #[error("invalid name uri: {0}")]
    InvalidUri(String),
}

/// A hierarchical content name
///
/// Ordered component-wise; see [`Component`] for per-component order.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name(Vec<Component>);

impl Name {
    /// The empty (root) name
    pub fn root() -> Self {
        Name(Vec::new())
    }

    /// Parse a `/`-separated uri; `%XX` escapes decode to raw bytes
    ///
    /// Empty path segments are dropped, so `/a//b/` parses as `/a/b`.
    pub fn parse(uri: &str) -> Result<Self, NameError> {
        let uri = uri.strip_prefix("ccnx:").unwrap_or(uri);
        let mut components = Vec::new();
        for part in uri.split('/').filter(|p| !p.is_empty()) {
            components.push(Component::new(percent_decode(part)?));
        }
        Ok(Name(components))
    }

    pub fn components(&self) -> &[Component] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Component> {
        self.0.last()
    }

    /// A new name with `components` appended
    pub fn append<I, C>(&self, components: I) -> Name
    where
        I: IntoIterator<Item = C>,
        C: Into<Component>,
    {
        let mut out = self.0.clone();
        out.extend(components.into_iter().map(Into::into));
        Name(out)
    }

    /// A new name with a single component appended
    pub fn child(&self, component: impl Into<Component>) -> Name {
        let mut out = self.0.clone();
        out.push(component.into());
        Name(out)
    }

    /// A new name with every component of `other` appended
    pub fn join(&self, other: &Name) -> Name {
        self.append(other.0.iter().cloned())
    }

    /// True if `self` is a strict prefix of `other`
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.0.len() < other.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// True if `prefix` is a prefix of `self` or equal to it
    pub fn starts_with(&self, prefix: &Name) -> bool {
        prefix == self || prefix.is_prefix_of(self)
    }

    /// The first `count` components
    pub fn prefix(&self, count: usize) -> Name {
        Name(self.0[..count.min(self.0.len())].to_vec())
    }

    pub fn parent(&self) -> Option<Name> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.prefix(self.0.len() - 1))
        }
    }

    /// `self`, then each shorter prefix down to and including the root
    pub fn ancestors(&self) -> impl Iterator<Item = Name> + '_ {
        (0..=self.0.len()).rev().map(move |n| self.prefix(n))
    }

    /// Append a version derived from the current time (microseconds)
    pub fn add_version(&self) -> Name {
        self.with_version(now_version())
    }

    /// Append a version greater than `latest_observed` and not behind the clock
    pub fn add_next_version(&self, latest_observed: Option<u64>) -> Name {
        let now = now_version();
        let version = match latest_observed {
            Some(latest) => now.max(latest.saturating_add(1)),
            None => now,
        };
        self.with_version(version)
    }

    pub fn with_version(&self, version: u64) -> Name {
        self.child(Component::version(version))
    }

    /// Append the segment component for block `index`
    pub fn add_segment(&self, index: u64) -> Name {
        self.child(Component::segment(index))
    }

    /// The version number if the last component is a version
    pub fn version(&self) -> Option<u64> {
        self.last().and_then(Component::as_version)
    }

    /// The segment index if the last component is a segment
    pub fn segment(&self) -> Option<u64> {
        self.last().and_then(Component::as_segment)
    }

    pub fn is_versioned(&self) -> bool {
        self.version().is_some()
    }

    /// Strip a trailing segment and then a trailing version
    pub fn base(&self) -> Name {
        let mut out = self.0.clone();
        if out.last().map(Component::is_segment).unwrap_or(false) {
            out.pop();
        }
        if out.last().map(Component::is_version).unwrap_or(false) {
            out.pop();
        }
        Name(out)
    }

    pub fn to_uri(&self) -> String {
        self.to_string()
    }
}

fn now_version() -> u64 {
    chrono::Utc::now().timestamp_micros().max(0) as u64
}

fn percent_decode(part: &str) -> Result<Vec<u8>, NameError> {
    let bytes = part.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = part
                .get(i + 1..i + 3)
                .ok_or_else(|| NameError::InvalidUri(part.to_string()))?;
            let byte =
                u8::from_str_radix(hex, 16).map_err(|_| NameError::InvalidUri(part.to_string()))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

impl FromStr for Name {
    type Err = NameError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Name::parse(s)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for c in &self.0 {
            write!(f, "/{}", c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name(")?;
        for c in &self.0 {
            write!(f, "/{:?}", c)?;
        }
        write!(f, ")")
    }
}

impl FromIterator<Component> for Name {
    fn from_iter<T: IntoIterator<Item = Component>>(iter: T) -> Self {
        Name(iter.into_iter().collect())
    }
}
