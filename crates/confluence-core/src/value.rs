//! Values readable from and writable to entity slots

use crate::entity::Entity;
use crate::error::{ConfluenceError, Result};
use std::sync::Arc;

/// Immutable scalar
///
/// Atoms pass through adoption unchanged and are stored by value.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    /// Absence of a value
    None,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// UTF-8 string
    Str(Arc<str>),
    /// Raw bytes
    Bytes(Arc<[u8]>),
}

impl Atom {
    /// Short name of the variant, used in error messages
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
        }
    }
}

/// Value of an entity slot
///
/// Equality on entities is view equality: same backing, same path.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Scalar
    Atom(Atom),
    /// Immutable sequence; entity members are rebased element-wise on read
    Tuple(Arc<[Value]>),
    /// Reference to another entity
    Entity(Entity),
}

impl Value {
    /// The `None` atom
    pub const NONE: Value = Value::Atom(Atom::None);

    /// Build a tuple value
    #[must_use]
    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Tuple(items.into_iter().collect())
    }

    /// Short name of the variant, used in error messages
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Atom(atom) => atom.type_name(),
            Self::Tuple(_) => "tuple",
            Self::Entity(_) => "entity",
        }
    }

    /// Check for the `None` atom
    #[inline]
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::Atom(Atom::None))
    }

    /// Integer payload
    #[inline]
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Atom(Atom::Int(n)) => Some(*n),
            _ => None,
        }
    }

    /// Boolean payload
    #[inline]
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Atom(Atom::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Float payload
    #[inline]
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Atom(Atom::Float(x)) => Some(*x),
            _ => None,
        }
    }

    /// String payload
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Atom(Atom::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Tuple members
    #[inline]
    #[must_use]
    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Referenced entity view
    #[inline]
    #[must_use]
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// Take the referenced entity view
    #[inline]
    #[must_use]
    pub fn into_entity(self) -> Option<Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// Integer payload or an error naming what was found
    ///
    /// # Errors
    /// Returns [`ConfluenceError::UnexpectedValue`] for any other variant
    pub fn expect_int(&self) -> Result<i64> {
        self.as_int().ok_or(ConfluenceError::UnexpectedValue {
            expected: "int",
            found: self.type_name(),
        })
    }

    /// Entity view or an error naming what was found
    ///
    /// # Errors
    /// Returns [`ConfluenceError::UnexpectedValue`] for any other variant
    pub fn expect_entity(self) -> Result<Entity> {
        match self {
            Self::Entity(entity) => Ok(entity),
            other => Err(ConfluenceError::UnexpectedValue {
                expected: "entity",
                found: other.type_name(),
            }),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::NONE
    }
}

impl From<Atom> for Value {
    fn from(atom: Atom) -> Self {
        Self::Atom(atom)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Self::NONE
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Atom(Atom::Bool(b))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Atom(Atom::Int(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Atom(Atom::Int(i64::from(n)))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Atom(Atom::Float(x))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Atom(Atom::Str(Arc::from(s)))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Atom(Atom::Str(Arc::from(s)))
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Self::Atom(Atom::Bytes(Arc::from(bytes)))
    }
}

impl From<Entity> for Value {
    fn from(entity: Entity) -> Self {
        Self::Entity(entity)
    }
}

impl From<&Entity> for Value {
    fn from(entity: &Entity) -> Self {
        Self::Entity(entity.clone())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Tuple(items.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::NONE, Into::into)
    }
}
