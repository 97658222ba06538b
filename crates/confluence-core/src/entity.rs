//! Entities and entity views
//!
//! Provides [`Entity`], a view (version path) onto a shared backing of
//! version-indexed slots, and the [`Versioned`] trait for types layered on
//! top of an entity.

use crate::error::{ConfluenceError, OperationMisuse, Result};
use crate::manager::VersionManager;
use crate::rebase::Stored;
use crate::value::Value;
use confluence_version::{Version, VersionPath, VersionTrie};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Slots shared by every view of one entity
///
/// Lives as long as any view or stored reference does.
pub(crate) struct Backing {
    kind: Arc<str>,
    manager: VersionManager,
    slots: RwLock<HashMap<Arc<str>, VersionTrie<Stored>>>,
}

/// View of an entity at one version path
///
/// Cheap to clone. Reads resolve each slot at the longest prefix of the
/// view's path; writes require the path to end with the ambient operation's
/// version.
///
/// # Example
/// ```
/// use confluence_core::VersionManager;
///
/// let manager = VersionManager::new();
/// let node = manager
///     .operation(|op| {
///         let node = op.create("Node")?;
///         node.set("a", 1)?;
///         Ok(node)
///     })
///     .unwrap();
///
/// assert_eq!(node.get("a").unwrap().as_int(), Some(1));
/// assert!(node.set("a", 2).is_err()); // no operation is active
/// ```
#[derive(Clone)]
pub struct Entity {
    backing: Arc<Backing>,
    path: VersionPath,
}

impl Entity {
    pub(crate) fn new(manager: VersionManager, kind: &str, path: VersionPath) -> Self {
        let backing = Backing {
            kind: Arc::from(kind),
            manager,
            slots: RwLock::new(HashMap::new()),
        };
        Self {
            backing: Arc::new(backing),
            path,
        }
    }

    pub(crate) fn from_parts(backing: Arc<Backing>, path: VersionPath) -> Self {
        Self { backing, path }
    }

    pub(crate) fn into_parts(self) -> (Arc<Backing>, VersionPath) {
        (self.backing, self.path)
    }

    /// Kind given at creation
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.backing.kind
    }

    /// Path this view reads through
    #[inline]
    #[must_use]
    pub fn path(&self) -> &VersionPath {
        &self.path
    }

    /// Manager that minted this entity's versions
    #[inline]
    #[must_use]
    pub fn manager(&self) -> &VersionManager {
        &self.backing.manager
    }

    /// Check if both views share one backing
    #[inline]
    #[must_use]
    pub fn same_identity(&self, other: &Entity) -> bool {
        Arc::ptr_eq(&self.backing, &other.backing)
    }

    /// View of the same backing at an arbitrary path
    ///
    /// Read-only unless the path ends with the ambient operation's version.
    #[inline]
    #[must_use]
    pub fn at(&self, path: VersionPath) -> Entity {
        Self {
            backing: Arc::clone(&self.backing),
            path,
        }
    }

    /// Read slot `name` as seen from this view
    ///
    /// # Errors
    /// Returns [`ConfluenceError::AttributeNotFound`] if the slot was never
    /// declared or holds nothing visible at this path
    pub fn get(&self, name: &str) -> Result<Value> {
        let stored = {
            let slots = self.backing.slots.read();
            let trie = slots
                .get(name)
                .ok_or_else(|| ConfluenceError::not_found(self.kind(), name))?;
            let (_, stored) = trie
                .longest_prefix(&self.path)
                .ok_or_else(|| ConfluenceError::not_found(self.kind(), name))?;
            stored.clone()
        };
        Ok(stored.resolve(&self.path))
    }

    /// Check if slot `name` has a value visible from this view
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.backing
            .slots
            .read()
            .get(name)
            .is_some_and(|trie| trie.longest_prefix(&self.path).is_some())
    }

    /// Names of all slots visible from this view, sorted
    #[must_use]
    pub fn attributes(&self) -> Vec<String> {
        let slots = self.backing.slots.read();
        let mut names: Vec<String> = slots
            .iter()
            .filter(|(_, trie)| trie.longest_prefix(&self.path).is_some())
            .map(|(name, _)| name.to_string())
            .collect();
        names.sort();
        names
    }

    /// Write slot `name`
    ///
    /// Entity values are stored as references capturing the target's
    /// current path.
    ///
    /// # Errors
    /// Returns [`ConfluenceError::IncorrectOperation`] if no operation is
    /// ambient, this view was not entered into it, or `value` holds an
    /// entity from another manager
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let version = self.ensure_writable()?;
        let stored = Stored::capture(value.into(), self.manager())?;
        let tick = self.manager().next_tick();

        let mut slots = self.backing.slots.write();
        if let Some(trie) = slots.get_mut(name) {
            trie.set(self.path.clone(), tick, stored);
        } else {
            let mut trie = VersionTrie::new();
            trie.set(self.path.clone(), tick, stored);
            slots.insert(Arc::from(name), trie);
        }
        drop(slots);

        tracing::trace!(
            manager = %self.manager().name(),
            kind = %self.kind(),
            name,
            path = %self.path,
            %version,
            tick,
            "slot write"
        );
        Ok(())
    }

    /// Check that this view may be written in the ambient operation
    ///
    /// # Errors
    /// Returns [`ConfluenceError::IncorrectOperation`] when no operation is
    /// ambient or the path's tail is not its version
    pub fn ensure_writable(&self) -> Result<Version> {
        let expected = self
            .manager()
            .current_version()
            .ok_or(OperationMisuse::NoActiveOperation)?;
        let found = self.path.tail();
        if found != expected {
            return Err(OperationMisuse::VersionMismatch { expected, found }.into());
        }
        Ok(expected)
    }

    /// Fixed view of the current state
    ///
    /// Appends a fresh snapshot version to the path. Writes made later
    /// through this view's lineage, even within the same operation, are not
    /// visible through the snapshot, so a reference built from it never
    /// tracks them.
    #[must_use]
    pub fn snapshot(&self) -> Entity {
        let tick = self.manager().next_tick();
        let path = self.path.child(self.path.tail().snapshot_of(tick));
        tracing::trace!(kind = %self.kind(), from = %self.path, to = %path, "snapshot");
        self.at(path)
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.same_identity(other) && self.path == other.path
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Slots are not followed: entity graphs may be cyclic.
        f.debug_struct("Entity")
            .field("kind", &self.kind())
            .field("path", &format_args!("{}", self.path))
            .finish_non_exhaustive()
    }
}

/// Types that are a typed face over an [`Entity`]
///
/// Lets operation entry and snapshots work on the wrapper directly.
pub trait Versioned: Sized {
    /// Underlying entity view
    fn entity(&self) -> &Entity;

    /// Wrap a view of the same backing at another path
    ///
    /// # Errors
    /// Returns [`ConfluenceError::KindMismatch`] if the entity is not of the
    /// wrapper's kind
    fn from_entity(entity: Entity) -> Result<Self>;
}

impl Versioned for Entity {
    fn entity(&self) -> &Entity {
        self
    }

    fn from_entity(entity: Entity) -> Result<Self> {
        Ok(entity)
    }
}

/// Fixed view of `item`, see [`Entity::snapshot`]
///
/// # Errors
/// Propagates [`Versioned::from_entity`] failures
pub fn snapshot<T: Versioned>(item: &T) -> Result<T> {
    T::from_entity(item.entity().snapshot())
}
