//! Version-indexed slot store
//!
//! Provides [`VersionTrie`], a map from [`VersionPath`] to an append-only
//! history of values with longest-prefix lookup, built on radix_trie.

use crate::version::{Version, VersionPath};
use radix_trie::{Trie, TrieCommon};
use std::fmt;

/// Value recorded at a trie key together with the tick it was written at
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<V> {
    tick: u64,
    value: V,
}

impl<V> Stamped<V> {
    /// Write tick
    #[inline]
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Recorded value
    #[inline]
    #[must_use]
    pub fn value(&self) -> &V {
        &self.value
    }
}

/// History stored under one key
///
/// The key is kept alongside the history so ancestor lookups can report
/// which prefix matched.
#[derive(Debug)]
struct Slot<V> {
    key: VersionPath,
    history: Vec<Stamped<V>>,
}

impl<V> Slot<V> {
    /// Entry visible to a reader whose path continues with `next` after
    /// this key
    ///
    /// A snapshot element right after the key hides everything written at
    /// or after the snapshot's tick.
    fn visible(&self, next: Option<Version>) -> Option<&Stamped<V>> {
        match next {
            Some(marker) if marker.is_snapshot() => {
                self.history.iter().rev().find(|e| e.tick < marker.sub())
            }
            _ => self.history.last(),
        }
    }
}

/// Version-indexed slot
///
/// One trie per attribute per entity. Entries are append-only: writing the
/// same key twice keeps both, and lookups pick the newest one the reader is
/// allowed to see.
///
/// We use radix_trie for:
/// - Exact lookups
/// - Closest-ancestor (longest prefix) lookups
///
/// The trie is not synchronized; owners wrap it in a lock.
pub struct VersionTrie<V> {
    inner: Trie<VersionPath, Slot<V>>,
    writes: usize,
}

impl<V> VersionTrie<V> {
    /// Create empty trie
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Trie::new(),
            writes: 0,
        }
    }

    /// Record `value` at `path`
    ///
    /// Never replaces an earlier entry. `tick` must not go backwards for a
    /// given key.
    pub fn set(&mut self, path: VersionPath, tick: u64, value: V) {
        let entry = Stamped { tick, value };
        self.writes += 1;

        if let Some(slot) = self.inner.get_mut(&path) {
            debug_assert!(slot.history.last().map_or(true, |last| last.tick <= tick));
            slot.history.push(entry);
            return;
        }

        self.inner.insert(
            path.clone(),
            Slot {
                key: path,
                history: vec![entry],
            },
        );
    }

    /// Newest value stored exactly at `path`
    #[must_use]
    pub fn get(&self, path: &VersionPath) -> Option<&V> {
        self.inner
            .get(path)
            .and_then(|slot| slot.history.last())
            .map(|entry| &entry.value)
    }

    /// Full history stored exactly at `path`, oldest first
    #[must_use]
    pub fn history(&self, path: &VersionPath) -> &[Stamped<V>] {
        self.inner
            .get(path)
            .map_or(&[][..], |slot| slot.history.as_slice())
    }

    /// Longest prefix of `path` holding a value visible to `path`
    ///
    /// Returns the matching key and its value, or `None` if no prefix of
    /// `path` has anything visible.
    #[must_use]
    pub fn longest_prefix(&self, path: &VersionPath) -> Option<(&VersionPath, &V)> {
        let mut probe = path.clone();
        loop {
            let slot = self
                .inner
                .get(&probe)
                .or_else(|| self.inner.get_ancestor_value(&probe))?;

            let depth = slot.key.len();
            if let Some(entry) = slot.visible(path.get(depth)) {
                return Some((&slot.key, &entry.value));
            }

            // Everything at this key is hidden by a snapshot; keep looking
            // further up the lineage.
            probe = slot.key.truncated(depth - 1)?;
        }
    }

    /// Number of distinct keys
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if nothing was ever written
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Total number of recorded entries across all keys
    #[inline]
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// All keys with at least one entry (order unspecified)
    pub fn keys(&self) -> impl Iterator<Item = &VersionPath> {
        self.inner.values().map(|slot| &slot.key)
    }
}

impl<V> Default for VersionTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for VersionTrie<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionTrie")
            .field("keys", &self.len())
            .field("writes", &self.writes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single-letter version names mirror string-keyed trie scenarios:
    // "abc" becomes [a b c].
    fn key(s: &str) -> VersionPath {
        VersionPath::from_versions(s.bytes().map(|b| Version::operation(u64::from(b)))).unwrap()
    }

    #[test]
    fn trie_new_is_empty() {
        let trie: VersionTrie<i32> = VersionTrie::new();
        assert!(trie.is_empty());
        assert_eq!(trie.len(), 0);
        assert!(trie.longest_prefix(&key("a")).is_none());
    }

    #[test]
    fn trie_longest_prefix_scenario() {
        let mut trie = VersionTrie::new();
        trie.set(key("abc"), 1, 5);

        assert_eq!(trie.longest_prefix(&key("abc")), Some((&key("abc"), &5)));
        assert_eq!(trie.longest_prefix(&key("abcd")), Some((&key("abc"), &5)));
        assert_eq!(trie.longest_prefix(&key("abcde")), Some((&key("abc"), &5)));
        assert_eq!(trie.longest_prefix(&key("ab")), None);

        trie.set(key("ab"), 2, 4);

        assert_eq!(trie.longest_prefix(&key("abc")), Some((&key("abc"), &5)));
        assert_eq!(trie.longest_prefix(&key("abcd")), Some((&key("abc"), &5)));
        assert_eq!(trie.longest_prefix(&key("ab")), Some((&key("ab"), &4)));
        assert_eq!(trie.longest_prefix(&key("abx")), Some((&key("ab"), &4)));
        assert_eq!(trie.longest_prefix(&key("a")), None);

        trie.set(key("a"), 3, 3);

        assert_eq!(trie.longest_prefix(&key("a")), Some((&key("a"), &3)));
        assert_eq!(trie.longest_prefix(&key("ax")), Some((&key("a"), &3)));
        assert_eq!(trie.longest_prefix(&key("ab")), Some((&key("ab"), &4)));
        assert_eq!(trie.longest_prefix(&key("b")), None);
    }

    #[test]
    fn trie_sibling_keys_do_not_leak() {
        let mut trie = VersionTrie::new();
        trie.set(key("ab"), 1, "left");
        trie.set(key("ac"), 2, "right");

        assert_eq!(trie.longest_prefix(&key("abz")).map(|(_, v)| *v), Some("left"));
        assert_eq!(trie.longest_prefix(&key("acz")).map(|(_, v)| *v), Some("right"));
        assert_eq!(trie.longest_prefix(&key("ad")), None);
    }

    #[test]
    fn trie_set_is_append_only() {
        let mut trie = VersionTrie::new();
        trie.set(key("a"), 1, 10);
        trie.set(key("a"), 2, 20);

        assert_eq!(trie.get(&key("a")), Some(&20));
        assert_eq!(trie.len(), 1);
        assert_eq!(trie.writes(), 2);

        let history: Vec<_> = trie.history(&key("a")).iter().map(|e| *e.value()).collect();
        assert_eq!(history, vec![10, 20]);
    }

    #[test]
    fn trie_snapshot_marker_hides_later_writes() {
        let v0 = Version::operation(0);
        let base = VersionPath::root(v0);

        let mut trie = VersionTrie::new();
        trie.set(base.clone(), 1, "before");
        trie.set(base.clone(), 5, "after");

        let frozen = base.child(v0.snapshot_of(3));
        assert_eq!(trie.longest_prefix(&frozen), Some((&base, &"before")));
        assert_eq!(trie.longest_prefix(&base), Some((&base, &"after")));

        // Later operations layered on the snapshot keep the cut.
        let derived = frozen.child(Version::operation(1));
        assert_eq!(trie.longest_prefix(&derived).map(|(_, v)| *v), Some("before"));
    }

    #[test]
    fn trie_fully_hidden_key_falls_back_to_shorter_prefix() {
        let v0 = Version::operation(0);
        let v1 = Version::operation(1);
        let outer = VersionPath::root(v0);
        let inner = outer.child(v1);

        let mut trie = VersionTrie::new();
        trie.set(outer.clone(), 1, "outer");
        trie.set(inner.clone(), 7, "inner");

        let frozen = inner.child(v1.snapshot_of(4));
        assert_eq!(trie.longest_prefix(&frozen), Some((&outer, &"outer")));
    }

    #[test]
    fn trie_history_of_missing_key_is_empty() {
        let trie: VersionTrie<u8> = VersionTrie::default();
        assert!(trie.history(&key("q")).is_empty());
        assert!(trie.get(&key("q")).is_none());
    }

    #[test]
    fn trie_keys_lists_written_paths() {
        let mut trie = VersionTrie::new();
        trie.set(key("a"), 1, ());
        trie.set(key("ab"), 2, ());
        trie.set(key("ab"), 3, ());

        let mut keys: Vec<_> = trie.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec![key("a"), key("ab")]);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_longest_prefix_matches_linear_scan(
                keys in proptest::collection::vec(proptest::collection::vec(0u64..4, 1..5), 1..20),
                probe in proptest::collection::vec(0u64..4, 1..7),
            ) {
                let to_path = |seqs: &[u64]| {
                    VersionPath::from_versions(seqs.iter().map(|s| Version::operation(*s))).unwrap()
                };

                let mut trie = VersionTrie::new();
                for (i, k) in keys.iter().enumerate() {
                    trie.set(to_path(k), i as u64 + 1, i);
                }

                let probe = to_path(&probe);
                let expected = keys
                    .iter()
                    .enumerate()
                    .map(|(i, k)| (to_path(k), i))
                    .filter(|(k, _)| k.is_prefix_of(&probe))
                    .max_by_key(|(k, i)| (k.len(), *i));

                let actual = trie.longest_prefix(&probe).map(|(k, v)| (k.clone(), *v));
                prop_assert_eq!(actual, expected);
            }
        }
    }
}
