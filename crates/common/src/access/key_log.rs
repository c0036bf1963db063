use std::collections::BTreeSet;

use crate::crypto::PrincipalDigest;

/// One key version as it was created
///
/// Never mutated after it is appended: later grants on the same version are
///  recorded next to it in the log, not inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVersion {
    pub version: u64,
    /// Microseconds since the epoch
    pub created_at: i64,
    /// Holders the version was wrapped for when it was created
    pub wrapped_for: BTreeSet<PrincipalDigest>,
}

/// A grant of an existing version to one more holder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGrant {
    pub version: u64,
    pub holder: PrincipalDigest,
}

/// Append-only log of the key versions of one node or group
///
/// Versions live in an arena indexed by position; `current` points at the
///  newest. Versions only ever grow, so a stale reader of the log can never
///  pick a key older than one it has already seen.
#[derive(Debug, Clone, Default)]
pub struct KeyLog {
    versions: Vec<KeyVersion>,
    grants: Vec<KeyGrant>,
    current: Option<usize>,
}

impl KeyLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly created version
    ///
    /// # Returns
    /// * `false` - the version is not newer than the current one and was
    ///   ignored
    pub fn append(&mut self, version: u64, wrapped_for: BTreeSet<PrincipalDigest>) -> bool {
        if let Some(current) = self.current() {
            if version <= current.version {
                return false;
            }
        }
        self.versions.push(KeyVersion {
            version,
            created_at: chrono::Utc::now().timestamp_micros(),
            wrapped_for,
        });
        self.current = Some(self.versions.len() - 1);
        true
    }

    pub fn grant(&mut self, version: u64, holder: PrincipalDigest) {
        self.grants.push(KeyGrant { version, holder });
    }

    pub fn current(&self) -> Option<&KeyVersion> {
        self.current.map(|idx| &self.versions[idx])
    }

    pub fn current_version(&self) -> Option<u64> {
        self.current().map(|v| v.version)
    }

    pub fn get(&self, version: u64) -> Option<&KeyVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    /// Everyone `version` has been wrapped for, at creation or since
    pub fn holders(&self, version: u64) -> BTreeSet<PrincipalDigest> {
        let mut holders = self
            .get(version)
            .map(|v| v.wrapped_for.clone())
            .unwrap_or_default();
        holders.extend(
            self.grants
                .iter()
                .filter(|g| g.version == version)
                .map(|g| g.holder),
        );
        holders
    }

    pub fn versions(&self) -> impl Iterator<Item = &KeyVersion> {
        self.versions.iter()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
