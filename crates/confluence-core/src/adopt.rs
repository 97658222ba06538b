//! Adoption of foreign values
//!
//! Provides the [`Foreign`] model of mutable values living outside the
//! versioned world, the [`AdapterRegistry`] for custom types and
//! [`Adoption`], which converts foreign values into entities and atoms.
//!
//! # Rules
//!
//! - Atoms pass through; entities are referenced, never copied
//! - Tuples convert element-wise
//! - Shared lists become [`PersistentList`]s, shared records become entities
//!   of the record's kind
//! - Custom values go through the adapter registered for their type
//! - Shared aggregates are cached by identity for the rest of the operation,
//!   before their members are converted, so cycles terminate
//!
//! Adoption copies eagerly. Mutations made through a retained foreign alias
//! after `adopt` returns are not visible through the adopted value.

use crate::entity::Entity;
use crate::error::{ConfluenceError, OperationMisuse, Result};
use crate::list::PersistentList;
use crate::manager::VersionManager;
use crate::value::{Atom, Value};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Shared mutable list
pub type SharedList = Arc<RwLock<Vec<Foreign>>>;

/// Shared mutable record
pub type SharedRecord = Arc<RwLock<ForeignRecord>>;

/// Value outside the versioned model
///
/// Identity of shared variants is the allocation they point at: two clones
/// of one [`SharedList`] are the same list.
#[derive(Clone)]
pub enum Foreign {
    /// Immutable scalar
    Atom(Atom),
    /// Already versioned entity
    Entity(Entity),
    /// Immutable sequence
    Tuple(Vec<Foreign>),
    /// Mutable list
    List(SharedList),
    /// Mutable record with named fields
    Record(SharedRecord),
    /// Value of a user type, converted by a registered adapter
    Custom(CustomValue),
}

impl Foreign {
    /// Wrap items in a new shared list
    #[must_use]
    pub fn list(items: impl IntoIterator<Item = Foreign>) -> Self {
        Self::List(new_shared_list(items))
    }

    /// Wrap a record in a new shared allocation
    #[must_use]
    pub fn record(record: ForeignRecord) -> Self {
        Self::Record(record.shared())
    }

    /// Wrap a user value
    #[must_use]
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        Self::Custom(CustomValue::new(value))
    }

    /// Identity of shared variants
    fn identity(&self) -> Option<usize> {
        match self {
            Self::List(list) => Some(Arc::as_ptr(list).cast::<()>() as usize),
            Self::Record(record) => Some(Arc::as_ptr(record).cast::<()>() as usize),
            Self::Custom(custom) => Some(Arc::as_ptr(&custom.value).cast::<()>() as usize),
            Self::Atom(_) | Self::Entity(_) | Self::Tuple(_) => None,
        }
    }
}

impl fmt::Debug for Foreign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Shared aggregates may be cyclic; show identity, not contents.
        match self {
            Self::Atom(atom) => f.debug_tuple("Atom").field(atom).finish(),
            Self::Entity(entity) => f.debug_tuple("Entity").field(entity).finish(),
            Self::Tuple(items) => f.debug_tuple("Tuple").field(items).finish(),
            Self::List(list) => write!(f, "List({:p})", Arc::as_ptr(list)),
            Self::Record(record) => write!(f, "Record({:p})", Arc::as_ptr(record)),
            Self::Custom(custom) => f.debug_tuple("Custom").field(custom).finish(),
        }
    }
}

impl From<Atom> for Foreign {
    fn from(atom: Atom) -> Self {
        Self::Atom(atom)
    }
}

impl From<i64> for Foreign {
    fn from(n: i64) -> Self {
        Self::Atom(Atom::Int(n))
    }
}

impl From<&str> for Foreign {
    fn from(s: &str) -> Self {
        Self::Atom(Atom::Str(Arc::from(s)))
    }
}

impl From<Entity> for Foreign {
    fn from(entity: Entity) -> Self {
        Self::Entity(entity)
    }
}

/// Create a shared list from items
#[must_use]
pub fn new_shared_list(items: impl IntoIterator<Item = Foreign>) -> SharedList {
    Arc::new(RwLock::new(items.into_iter().collect()))
}

/// Mutable record with a kind and named fields
#[derive(Debug, Clone)]
pub struct ForeignRecord {
    kind: String,
    fields: BTreeMap<String, Foreign>,
}

impl ForeignRecord {
    /// Create empty record of `kind`
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: BTreeMap::new(),
        }
    }

    /// With field `name` set to `value`
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Foreign>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set field `name`, replacing any previous value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Foreign>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Field `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Foreign> {
        self.fields.get(name)
    }

    /// Kind given to the adopted entity
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Fields in name order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Foreign)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Move into a new shared allocation
    #[must_use]
    pub fn shared(self) -> SharedRecord {
        Arc::new(RwLock::new(self))
    }
}

/// Type-erased user value
///
/// Clones share the value and therefore its identity.
#[derive(Clone)]
pub struct CustomValue {
    value: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

impl CustomValue {
    /// Wrap `value`
    #[must_use]
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wrap an already shared `value`, keeping its identity
    #[must_use]
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            value,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Borrow as `T`
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Rust type name of the wrapped value
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

type Adapter =
    Box<dyn Fn(&(dyn Any + Send + Sync), &mut Adoption<'_>) -> Result<Value> + Send + Sync>;

/// Adoption adapters keyed by the concrete type they convert
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<TypeId, Adapter>,
}

impl AdapterRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the adapter for `T`, replacing any previous one
    pub fn register<T, F>(&mut self, adapter: F)
    where
        T: Any + Send + Sync,
        F: Fn(&T, &mut Adoption<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        let erased: Adapter = Box::new(move |value, adoption| {
            let value = value
                .downcast_ref::<T>()
                .ok_or(ConfluenceError::NoAdapter {
                    type_name: std::any::type_name::<T>(),
                })?;
            adapter(value, adoption)
        });
        self.adapters.insert(TypeId::of::<T>(), erased);
    }

    /// Check if an adapter is registered for `T`
    #[must_use]
    pub fn contains<T: Any>(&self) -> bool {
        self.adapters.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered adapters
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Check if no adapter is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    fn get(&self, type_id: TypeId) -> Option<&Adapter> {
        self.adapters.get(&type_id)
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.adapters.len())
            .finish()
    }
}

/// One adoption pass
///
/// Handed to custom adapters so they can adopt nested values and create
/// their result entity.
pub struct Adoption<'a> {
    manager: &'a VersionManager,
    depth: usize,
    /// Custom value whose adapter has not created its entity yet
    pending: Option<(usize, Foreign)>,
}

impl<'a> Adoption<'a> {
    pub(crate) fn new(manager: &'a VersionManager) -> Self {
        Self {
            manager,
            depth: 0,
            pending: None,
        }
    }

    /// Manager adopted values belong to
    #[inline]
    #[must_use]
    pub fn manager(&self) -> &VersionManager {
        self.manager
    }

    /// Create the entity a custom value adopts into
    ///
    /// The entity is cached as the custom value's adopted form before the
    /// adapter converts any members, so a member referring back to the
    /// value resolves to this entity.
    ///
    /// # Errors
    /// Returns [`OperationMisuse::NoActiveOperation`] outside an operation
    pub fn create(&mut self, kind: &str) -> Result<Entity> {
        let entity = self.manager.create(kind)?;
        if let Some((key, source)) = self.pending.take() {
            self.manager
                .remember_adopted(key, source, Value::from(&entity))?;
        }
        Ok(entity)
    }

    /// Convert `value`
    ///
    /// # Errors
    /// Returns [`ConfluenceError::NoAdapter`] for a custom type without an
    /// adapter, [`ConfluenceError::AdoptionDepthExceeded`] past the
    /// configured depth and [`OperationMisuse::ForeignManager`] for entities
    /// of another manager
    pub fn adopt(&mut self, value: &Foreign) -> Result<Value> {
        let limit = self.manager.config().max_adoption_depth;
        if self.depth >= limit {
            return Err(ConfluenceError::AdoptionDepthExceeded { limit });
        }
        self.depth += 1;
        let result = self.convert(value);
        self.depth -= 1;
        result
    }

    fn convert(&mut self, value: &Foreign) -> Result<Value> {
        if let Some(key) = value.identity() {
            if let Some(hit) = self.manager.adopted(key)? {
                tracing::trace!(manager = %self.manager.name(), key, "adoption cache hit");
                return Ok(hit);
            }
        }

        match value {
            Foreign::Atom(atom) => Ok(Value::Atom(atom.clone())),
            Foreign::Entity(entity) => {
                if !entity.manager().same_as(self.manager) {
                    return Err(OperationMisuse::ForeignManager.into());
                }
                Ok(Value::Entity(entity.clone()))
            }
            Foreign::Tuple(items) => {
                let items = items
                    .iter()
                    .map(|item| self.adopt(item))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::from(items))
            }
            Foreign::List(list) => self.convert_list(value, list),
            Foreign::Record(record) => self.convert_record(value, record),
            Foreign::Custom(custom) => self.convert_custom(value, custom),
        }
    }

    fn convert_list(&mut self, source: &Foreign, list: &SharedList) -> Result<Value> {
        let adopted = PersistentList::new(self.manager)?;
        self.remember(source, Value::from(adopted.entity()))?;

        // Copy out so a self-containing list is not locked while recursing
        let items = list.read().clone();
        tracing::trace!(manager = %self.manager.name(), items = items.len(), "adopting list");
        for item in &items {
            let item = self.adopt(item)?;
            adopted.append(item)?;
        }
        Ok(Value::Entity(adopted.into_entity()))
    }

    fn convert_record(&mut self, source: &Foreign, record: &SharedRecord) -> Result<Value> {
        let (kind, fields) = {
            let record = record.read();
            (record.kind.clone(), record.fields.clone())
        };
        let entity = self.manager.create(&kind)?;
        self.remember(source, Value::from(&entity))?;

        tracing::trace!(
            manager = %self.manager.name(),
            kind = %kind,
            fields = fields.len(),
            "adopting record"
        );
        for (name, field) in &fields {
            let field = self.adopt(field)?;
            entity.set(name, field)?;
        }
        Ok(Value::Entity(entity))
    }

    fn convert_custom(&mut self, source: &Foreign, custom: &CustomValue) -> Result<Value> {
        let manager = self.manager;
        let adapter = manager
            .adapters()
            .get(custom.type_id)
            .ok_or(ConfluenceError::NoAdapter {
                type_name: custom.type_name,
            })?;
        let key = source.identity();

        let outer = std::mem::replace(&mut self.pending, key.map(|key| (key, source.clone())));
        let result = adapter(&*custom.value, self);
        self.pending = outer;
        let value = result?;

        // Adapters that never called `create` still get a cache entry
        if let Some(key) = key {
            if manager.adopted(key)?.is_none() {
                manager.remember_adopted(key, source.clone(), value.clone())?;
            }
        }
        Ok(value)
    }

    fn remember(&self, source: &Foreign, value: Value) -> Result<()> {
        match source.identity() {
            Some(key) => self.manager.remember_adopted(key, source.clone(), value),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Adoption<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adoption")
            .field("manager", &self.manager.name())
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}
