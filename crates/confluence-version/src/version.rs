//! Versions and version paths
//!
//! Provides [`Version`] for naming a point in history and [`VersionPath`]
//! for the lineage an entity view reads through.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt::{self, Display, Formatter};

/// A point in an entity's history
///
/// Totally ordered by `(seq, sub)`. Operations mint versions with
/// `sub == 0`. Snapshots keep the `seq` of the version they extend and carry
/// a non-zero `sub`, which lands them strictly between two adjacent
/// operation versions without renumbering anything already recorded.
///
/// # Examples
/// - `v3` is the version minted by the fourth operation
/// - `v3.17` is a snapshot taken at tick 17 of something whose tail was `v3`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    seq: u64,
    sub: u64,
}

impl Version {
    /// Version minted for an operation scope
    #[inline]
    #[must_use]
    pub const fn operation(seq: u64) -> Self {
        Self { seq, sub: 0 }
    }

    /// Snapshot marker inserted right after `self`
    ///
    /// `tick` must be non-zero and greater than any tick already used as a
    /// `sub` on this `seq`.
    #[inline]
    #[must_use]
    pub const fn snapshot_of(self, tick: u64) -> Self {
        Self {
            seq: self.seq,
            sub: tick,
        }
    }

    /// Operation sequence number
    #[inline]
    #[must_use]
    pub const fn seq(self) -> u64 {
        self.seq
    }

    /// Subsequence (zero for operation versions, the snapshot tick otherwise)
    #[inline]
    #[must_use]
    pub const fn sub(self) -> u64 {
        self.sub
    }

    /// Whether this version was produced by a snapshot
    #[inline]
    #[must_use]
    pub const fn is_snapshot(self) -> bool {
        self.sub != 0
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.sub == 0 {
            write!(f, "v{}", self.seq)
        } else {
            write!(f, "v{}.{}", self.seq, self.sub)
        }
    }
}

/// Lineage of versions from an entity's creation to "now"
///
/// Never empty. Prefix-comparable: a slot written at path `K` is visible to
/// every reader whose path starts with `K`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionPath(SmallVec<[Version; 8]>);

#[allow(clippy::len_without_is_empty)]
impl VersionPath {
    /// Single-element path (the creation point)
    #[inline]
    #[must_use]
    pub fn root(version: Version) -> Self {
        let mut inner = SmallVec::new();
        inner.push(version);
        Self(inner)
    }

    /// Build path from a sequence of versions
    ///
    /// # Errors
    /// Returns [`PathError::Empty`] if `versions` yields nothing
    pub fn from_versions(versions: impl IntoIterator<Item = Version>) -> Result<Self, PathError> {
        let inner: SmallVec<[Version; 8]> = versions.into_iter().collect();
        if inner.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(inner))
    }

    /// Versions from oldest to newest
    #[inline]
    #[must_use]
    pub fn versions(&self) -> &[Version] {
        &self.0
    }

    /// Number of versions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Version at `index`
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Version> {
        self.0.get(index).copied()
    }

    /// Creation point
    #[inline]
    #[must_use]
    pub fn head(&self) -> Version {
        self.0[0]
    }

    /// Newest version ("now" for this view)
    #[inline]
    #[must_use]
    pub fn tail(&self) -> Version {
        self.0[self.0.len() - 1]
    }

    /// Append a version in place
    #[inline]
    pub fn push(&mut self, version: Version) {
        self.0.push(version);
    }

    /// Append a version, returning new path
    #[inline]
    #[must_use]
    pub fn child(&self, version: Version) -> Self {
        let mut new = self.clone();
        new.0.push(version);
        new
    }

    /// First `len` versions, or `None` when that would be empty or longer
    /// than this path
    #[inline]
    #[must_use]
    pub fn truncated(&self, len: usize) -> Option<Self> {
        if len == 0 || len > self.0.len() {
            None
        } else {
            Some(Self(SmallVec::from_slice(&self.0[..len])))
        }
    }

    /// Check if this path is a prefix of another
    #[inline]
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.0.len() <= other.0.len() && self.0[..] == other.0[..self.0.len()]
    }

    /// Whether `version` appears anywhere in the lineage
    #[inline]
    #[must_use]
    pub fn contains(&self, version: Version) -> bool {
        self.0.contains(&version)
    }

    /// Iterator over versions from oldest to newest
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = Version> + '_ {
        self.0.iter().copied()
    }
}

impl Display for VersionPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, version) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{version}")?;
        }
        write!(f, "]")
    }
}

impl From<Version> for VersionPath {
    fn from(version: Version) -> Self {
        Self::root(version)
    }
}

impl radix_trie::TrieKey for VersionPath {
    // Fixed-width big-endian encoding: byte prefixes that are trie keys are
    // always whole-version prefixes.
    fn encode_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * 16);
        for version in &self.0 {
            out.extend_from_slice(&version.seq.to_be_bytes());
            out.extend_from_slice(&version.sub.to_be_bytes());
        }
        out
    }
}

/// Errors related to version paths
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// A version path needs at least one version
    #[error("version path cannot be empty")]
    Empty,
}
