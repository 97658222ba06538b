//! Persistent indexed list
//!
//! Provides [`PersistentList`], a sequence built from immutable-looking
//! cells that are ordinary entities, so every edit is a versioned write and
//! every earlier view of the list stays readable.
//!
//! # Layout
//!
//! Each cell holds `value`, `prev` (the cell before it), `count` (its
//! position plus one) and `skip`, a back pointer following the skew-binary
//! jump rule. The list entity's `head` slot points at the last cell.
//! Indexed reads walk `skip` pointers where they do not overshoot, giving
//! logarithmic access. Edits at index `i` rewrite only the cells after `i`.

use crate::entity::{Entity, Versioned};
use crate::error::{ConfluenceError, Result};
use crate::manager::VersionManager;
use crate::value::{Atom, Value};
use std::vec;

/// Kind of list entities
pub const LIST_KIND: &str = "confluence.List";

/// Kind of list cell entities
pub const CELL_KIND: &str = "confluence.ListCell";

const HEAD: &str = "head";
const VALUE: &str = "value";
const PREV: &str = "prev";
const SKIP: &str = "skip";
const COUNT: &str = "count";

/// One list cell, viewed through the list's lineage
#[derive(Clone)]
struct Cell(Entity);

impl Cell {
    fn from_value(value: Value) -> Result<Option<Self>> {
        match value {
            Value::Atom(Atom::None) => Ok(None),
            Value::Entity(entity) => Ok(Some(Self(entity))),
            other => Err(ConfluenceError::UnexpectedValue {
                expected: "list cell",
                found: other.type_name(),
            }),
        }
    }

    fn count(&self) -> Result<usize> {
        let count = self.0.get(COUNT)?.expect_int()?;
        usize::try_from(count).map_err(|_| ConfluenceError::UnexpectedValue {
            expected: "cell count",
            found: "negative int",
        })
    }

    fn value(&self) -> Result<Value> {
        self.0.get(VALUE)
    }

    fn prev(&self) -> Result<Option<Self>> {
        Self::from_value(self.0.get(PREV)?)
    }

    fn skip(&self) -> Result<Option<Self>> {
        Self::from_value(self.0.get(SKIP)?)
    }
}

/// Count of an optional cell; the empty root counts as 0
fn count_of(cell: Option<&Cell>) -> Result<usize> {
    cell.map_or(Ok(0), Cell::count)
}

fn count_value(count: usize) -> Value {
    Value::Atom(Atom::Int(i64::try_from(count).unwrap_or(i64::MAX)))
}

fn cell_value(cell: Option<&Cell>) -> Value {
    cell.map_or(Value::NONE, |cell| Value::from(&cell.0))
}

/// Skip pointer for a cell placed right after `prev`
///
/// Jumps over `prev`'s own jump when the two spans are equal, like a carry
/// in a skew-binary counter.
fn jump_target(prev: Option<&Cell>) -> Result<Option<Cell>> {
    let Some(prev) = prev else {
        return Ok(None);
    };
    let Some(skip) = prev.skip()? else {
        return Ok(Some(prev.clone()));
    };
    let skip_count = skip.count()?;
    let beyond = skip.skip()?;
    if prev.count()? - skip_count == skip_count - count_of(beyond.as_ref())? {
        Ok(beyond)
    } else {
        Ok(Some(prev.clone()))
    }
}

/// Resolve a possibly negative index against `len`
///
/// `inclusive` admits `len` itself, for insertion.
fn normalize(index: i64, len: usize, inclusive: bool) -> Result<usize> {
    let signed_len = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if index < 0 { index + signed_len } else { index };
    let upper = if inclusive { signed_len } else { signed_len - 1 };
    if resolved < 0 || resolved > upper {
        return Err(ConfluenceError::IndexOutOfRange { index, len });
    }
    usize::try_from(resolved).map_err(|_| ConfluenceError::IndexOutOfRange { index, len })
}

/// Versioned list of values
///
/// A view like [`Entity`]: reads go through the view's path, edits require
/// it to be entered into the ambient operation.
///
/// # Example
/// ```
/// use confluence_core::{PersistentList, Value, VersionManager};
///
/// let manager = VersionManager::new();
/// let before = manager
///     .operation(|_| PersistentList::from_values(&manager, (1..=5).map(Value::from)))
///     .unwrap();
///
/// let after = manager
///     .operation(|op| {
///         let list = op.enter(&before)?;
///         list.pop(2)?;
///         list.pop(-1)?;
///         Ok(list)
///     })
///     .unwrap();
///
/// let ints = |list: &PersistentList| -> Vec<i64> {
///     list.iter().unwrap().filter_map(|v| v.as_int()).collect()
/// };
/// assert_eq!(ints(&after), vec![1, 2, 4]);
/// assert_eq!(ints(&before), vec![1, 2, 3, 4, 5]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PersistentList {
    entity: Entity,
}

impl PersistentList {
    /// Create an empty list
    ///
    /// # Errors
    /// Returns [`ConfluenceError::IncorrectOperation`] outside an operation
    pub fn new(manager: &VersionManager) -> Result<Self> {
        let entity = manager.create(LIST_KIND)?;
        entity.set(HEAD, Value::NONE)?;
        Ok(Self { entity })
    }

    /// Create a list holding `values` in order
    ///
    /// # Errors
    /// Returns [`ConfluenceError::IncorrectOperation`] outside an operation
    pub fn from_values(
        manager: &VersionManager,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<Self> {
        let list = Self::new(manager)?;
        list.extend(values)?;
        Ok(list)
    }

    /// Underlying entity view
    #[inline]
    #[must_use]
    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// Take the underlying entity view
    #[inline]
    #[must_use]
    pub fn into_entity(self) -> Entity {
        self.entity
    }

    fn head(&self) -> Result<Option<Cell>> {
        Cell::from_value(self.entity.get(HEAD)?)
    }

    /// Number of values
    ///
    /// # Errors
    /// Returns an error if the list's cells are malformed
    pub fn len(&self) -> Result<usize> {
        count_of(self.head()?.as_ref())
    }

    /// Check if the list is empty
    ///
    /// # Errors
    /// As for [`PersistentList::len`]
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.head()?.is_none())
    }

    /// Cell at position `index` (already normalized and in range)
    fn cell_at(&self, index: usize) -> Result<Cell> {
        let target = index + 1;
        let mut cell = self.head()?;
        loop {
            let current = cell.ok_or(ConfluenceError::UnexpectedValue {
                expected: "list cell",
                found: "none",
            })?;
            if current.count()? == target {
                return Ok(current);
            }
            if let Some(skip) = current.skip()? {
                if skip.count()? >= target {
                    cell = Some(skip);
                    continue;
                }
            }
            cell = current.prev()?;
        }
    }

    /// Value at `index`; negative indices count from the end
    ///
    /// # Errors
    /// Returns [`ConfluenceError::IndexOutOfRange`] with the given index
    pub fn get(&self, index: i64) -> Result<Value> {
        let position = normalize(index, self.len()?, false)?;
        self.cell_at(position)?.value()
    }

    /// Replace the value at `index`
    ///
    /// # Errors
    /// Returns [`ConfluenceError::IncorrectOperation`] if the view is not
    /// writable and [`ConfluenceError::IndexOutOfRange`] for a bad index
    pub fn set(&self, index: i64, value: impl Into<Value>) -> Result<()> {
        self.entity.ensure_writable()?;
        let position = normalize(index, self.len()?, false)?;
        self.cell_at(position)?.0.set(VALUE, value)
    }

    /// Insert `value` before position `index`; `index == len` appends
    ///
    /// # Errors
    /// Returns [`ConfluenceError::IncorrectOperation`] if the view is not
    /// writable and [`ConfluenceError::IndexOutOfRange`] for a bad index
    pub fn insert(&self, index: i64, value: impl Into<Value>) -> Result<()> {
        self.entity.ensure_writable()?;
        let position = normalize(index, self.len()?, true)?;

        let cell = Cell(self.entity.manager().create(CELL_KIND)?);
        cell.0.set(VALUE, value)?;

        let (base, suffix) = self.split(position)?;
        let mut cells = Vec::with_capacity(suffix.len() + 1);
        cells.push(cell);
        cells.extend(suffix);
        self.relink(base, cells)
    }

    /// Append `value`
    ///
    /// # Errors
    /// Returns [`ConfluenceError::IncorrectOperation`] if the view is not
    /// writable
    pub fn append(&self, value: impl Into<Value>) -> Result<()> {
        self.entity.ensure_writable()?;
        let head = self.head()?;
        let cell = Cell(self.entity.manager().create(CELL_KIND)?);
        cell.0.set(VALUE, value)?;
        self.relink(head, vec![cell])
    }

    /// Append every value in order
    ///
    /// # Errors
    /// As for [`PersistentList::append`]
    pub fn extend(&self, values: impl IntoIterator<Item = Value>) -> Result<()> {
        for value in values {
            self.append(value)?;
        }
        Ok(())
    }

    /// Remove and return the value at `index`
    ///
    /// # Errors
    /// Returns [`ConfluenceError::IncorrectOperation`] if the view is not
    /// writable and [`ConfluenceError::IndexOutOfRange`] for a bad index
    pub fn pop(&self, index: i64) -> Result<Value> {
        self.entity.ensure_writable()?;
        let position = normalize(index, self.len()?, false)?;

        let (base, mut suffix) = self.split(position)?;
        let removed = suffix.remove(0);
        let value = removed.value()?;
        self.relink(base, suffix)?;
        Ok(value)
    }

    /// Remove and return the last value
    ///
    /// # Errors
    /// As for [`PersistentList::pop`]; an empty list reports index `-1`
    pub fn pop_last(&self) -> Result<Value> {
        self.pop(-1)
    }

    /// Remove the value at `index`
    ///
    /// # Errors
    /// As for [`PersistentList::pop`]
    pub fn delete(&self, index: i64) -> Result<()> {
        self.pop(index).map(drop)
    }

    /// Values from position `start` to the end
    ///
    /// # Errors
    /// Returns [`ConfluenceError::IndexOutOfRange`] unless
    /// `0 <= start <= len` after normalization
    pub fn iter_from(&self, start: i64) -> Result<ListIter> {
        let len = self.len()?;
        let start = normalize(start, len, true)?;

        let mut values = Vec::with_capacity(len - start);
        let mut cell = self.head()?;
        while let Some(current) = cell {
            if current.count()? <= start {
                break;
            }
            values.push(current.value()?);
            cell = current.prev()?;
        }
        values.reverse();
        Ok(ListIter {
            inner: values.into_iter(),
        })
    }

    /// All values in order
    ///
    /// # Errors
    /// Returns an error if the list's cells are malformed
    pub fn iter(&self) -> Result<ListIter> {
        self.iter_from(0)
    }

    /// Collect all values
    ///
    /// # Errors
    /// As for [`PersistentList::iter`]
    pub fn to_vec(&self) -> Result<Vec<Value>> {
        Ok(self.iter()?.collect())
    }

    /// Split at `keep`: the cell at position `keep - 1` (the new base) and
    /// every later cell in ascending order
    fn split(&self, keep: usize) -> Result<(Option<Cell>, Vec<Cell>)> {
        let mut suffix = Vec::new();
        let mut cell = self.head()?;
        while let Some(current) = cell {
            if current.count()? <= keep {
                cell = Some(current);
                break;
            }
            cell = current.prev()?;
            suffix.push(current);
        }
        suffix.reverse();
        Ok((cell, suffix))
    }

    /// Chain `cells` after `base`, rewriting their links, and make the last
    /// one the head
    fn relink(&self, base: Option<Cell>, cells: Vec<Cell>) -> Result<()> {
        let touched = cells.len();
        let mut prev = base;
        for cell in cells {
            let skip = jump_target(prev.as_ref())?;
            cell.0.set(PREV, cell_value(prev.as_ref()))?;
            cell.0.set(COUNT, count_value(count_of(prev.as_ref())? + 1))?;
            cell.0.set(SKIP, cell_value(skip.as_ref()))?;
            prev = Some(cell);
        }
        self.entity.set(HEAD, cell_value(prev.as_ref()))?;

        tracing::trace!(
            path = %self.entity.path(),
            touched,
            len = count_of(prev.as_ref())?,
            "list relinked"
        );
        Ok(())
    }
}

impl Versioned for PersistentList {
    fn entity(&self) -> &Entity {
        &self.entity
    }

    fn from_entity(entity: Entity) -> Result<Self> {
        if entity.kind() != LIST_KIND {
            return Err(ConfluenceError::KindMismatch {
                expected: LIST_KIND.to_string(),
                found: entity.kind().to_string(),
            });
        }
        Ok(Self { entity })
    }
}

impl TryFrom<Value> for PersistentList {
    type Error = ConfluenceError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_entity(value.expect_entity()?)
    }
}

impl From<PersistentList> for Value {
    fn from(list: PersistentList) -> Self {
        Value::Entity(list.entity)
    }
}

impl From<&PersistentList> for Value {
    fn from(list: &PersistentList) -> Self {
        Value::Entity(list.entity.clone())
    }
}

/// Values of a list view, materialized when the iterator is created
#[derive(Debug)]
pub struct ListIter {
    inner: vec::IntoIter<Value>,
}

impl Iterator for ListIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for ListIter {}

impl DoubleEndedIterator for ListIter {
    fn next_back(&mut self) -> Option<Value> {
        self.inner.next_back()
    }
}
