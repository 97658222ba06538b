//! Reference rebasing (the confluence rule)
//!
//! A slot holding an entity stores the target's backing and the path the
//! target had when it was assigned. Reading it back through a different
//! lineage recomputes the effective path with [`rebase`].

use crate::entity::{Backing, Entity};
use crate::error::{OperationMisuse, Result};
use crate::manager::VersionManager;
use crate::value::{Atom, Value};
use confluence_version::VersionPath;
use std::sync::Arc;

/// Effective path of a reference stored as `target` when read through
/// `reader`
///
/// `target` extended with every version of `reader` newer than `target`'s
/// tail. The result rides along with later operations in the reader's
/// lineage while staying blind to anything before or beside it.
#[must_use]
pub fn rebase(target: &VersionPath, reader: &VersionPath) -> VersionPath {
    let tail = target.tail();
    let mut rebased = target.clone();
    for version in reader.iter().filter(|v| *v > tail) {
        rebased.push(version);
    }
    rebased
}

/// Stored form of an entity-valued slot
#[derive(Clone)]
pub(crate) struct Reference {
    backing: Arc<Backing>,
    path: VersionPath,
}

impl Reference {
    fn resolve(&self, reader: &VersionPath) -> Entity {
        Entity::from_parts(Arc::clone(&self.backing), rebase(&self.path, reader))
    }
}

/// Stored form of a slot value
#[derive(Clone)]
pub(crate) enum Stored {
    Atom(Atom),
    Ref(Reference),
    Tuple(Arc<[Stored]>),
}

impl Stored {
    /// Convert a value for storage, turning entities into references
    ///
    /// Entities owned by another manager are rejected: their versions are
    /// not comparable with ours.
    pub(crate) fn capture(value: Value, manager: &VersionManager) -> Result<Self> {
        match value {
            Value::Atom(atom) => Ok(Self::Atom(atom)),
            Value::Entity(entity) => {
                if !entity.manager().same_as(manager) {
                    return Err(OperationMisuse::ForeignManager.into());
                }
                let (backing, path) = entity.into_parts();
                Ok(Self::Ref(Reference { backing, path }))
            }
            Value::Tuple(items) => items
                .iter()
                .map(|item| Self::capture(item.clone(), manager))
                .collect::<Result<Arc<[Stored]>>>()
                .map(Self::Tuple),
        }
    }

    /// Read back through `reader`, rebasing any references
    pub(crate) fn resolve(&self, reader: &VersionPath) -> Value {
        match self {
            Self::Atom(atom) => Value::Atom(atom.clone()),
            Self::Ref(reference) => Value::Entity(reference.resolve(reader)),
            Self::Tuple(items) => Value::Tuple(items.iter().map(|s| s.resolve(reader)).collect()),
        }
    }
}
