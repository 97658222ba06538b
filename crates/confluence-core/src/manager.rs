//! Version manager and operation scoping
//!
//! Provides [`VersionManager`], which mints versions and ticks, and
//! [`Operation`], the guard that keeps one version ambient on the current
//! thread while a batch of mutations runs.
//!
//! # Scoping rules
//!
//! - Ambient state is per thread and per manager
//! - A `begin` while an operation is ambient joins it instead of minting
//! - Only the outermost close runs finalizers and clears ambient state
//! - Writes are never rolled back; a failing finalizer only skips the rest

use crate::adopt::{AdapterRegistry, Adoption, Foreign};
use crate::config::ConfluenceConfig;
use crate::entity::{Entity, Versioned};
use crate::error::{OperationMisuse, Result};
use crate::value::Value;
use confluence_version::{Version, VersionPath};
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(0);

type Finalizer = Box<dyn FnOnce() -> Result<()>>;

/// Ambient state of one open operation
struct Scope {
    version: Version,
    depth: usize,
    finalizers: Vec<Finalizer>,
    /// Adoption cache keyed by foreign identity. The source is kept alive
    /// so its address cannot be reused while the entry exists.
    adopted: HashMap<usize, (Foreign, Value)>,
}

impl Scope {
    fn new(version: Version) -> Self {
        Self {
            version,
            depth: 1,
            finalizers: Vec::new(),
            adopted: HashMap::new(),
        }
    }
}

thread_local! {
    static AMBIENT: RefCell<HashMap<u64, Scope>> = RefCell::new(HashMap::new());
}

struct ManagerInner {
    id: u64,
    config: ConfluenceConfig,
    next_seq: AtomicU64,
    next_tick: AtomicU64,
    adapters: AdapterRegistry,
}

/// Independent version space
///
/// Cheap to clone; clones share counters, configuration and adapters.
/// Entities from different managers cannot reference each other.
///
/// # Example
/// ```
/// use confluence_core::VersionManager;
///
/// let manager = VersionManager::new();
/// let v0 = manager
///     .operation(|op| {
///         let node = op.create("Node")?;
///         node.set("a", 1)?;
///         Ok(node)
///     })
///     .unwrap();
///
/// let v1 = manager
///     .operation(|op| {
///         let node = op.enter(&v0)?;
///         node.set("a", 2)?;
///         Ok(node)
///     })
///     .unwrap();
///
/// assert_eq!(v0.get("a").unwrap().as_int(), Some(1));
/// assert_eq!(v1.get("a").unwrap().as_int(), Some(2));
/// ```
#[derive(Clone)]
pub struct VersionManager {
    inner: Arc<ManagerInner>,
}

impl VersionManager {
    /// Create manager with default configuration and no adapters
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ConfluenceConfig::default())
    }

    /// Create manager with configuration
    #[must_use]
    pub fn with_config(config: ConfluenceConfig) -> Self {
        Self::from_parts(config, AdapterRegistry::new())
    }

    /// Start building a manager
    #[inline]
    #[must_use]
    pub fn builder() -> VersionManagerBuilder {
        VersionManagerBuilder::default()
    }

    fn from_parts(config: ConfluenceConfig, adapters: AdapterRegistry) -> Self {
        let id = NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            manager = %config.name,
            id,
            adapters = adapters.len(),
            "version manager created"
        );
        Self {
            inner: Arc::new(ManagerInner {
                id,
                config,
                next_seq: AtomicU64::new(0),
                next_tick: AtomicU64::new(1),
                adapters,
            }),
        }
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ConfluenceConfig {
        &self.inner.config
    }

    /// Configured label
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Check if both handles refer to the same version space
    #[inline]
    #[must_use]
    pub fn same_as(&self, other: &VersionManager) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Version of the operation ambient on this thread, if any
    #[must_use]
    pub fn current_version(&self) -> Option<Version> {
        AMBIENT.with(|ambient| ambient.borrow().get(&self.inner.id).map(|s| s.version))
    }

    /// Check if an operation is ambient on this thread
    #[inline]
    #[must_use]
    pub fn in_operation(&self) -> bool {
        self.current_version().is_some()
    }

    pub(crate) fn require_version(&self) -> Result<Version> {
        self.current_version()
            .ok_or_else(|| OperationMisuse::NoActiveOperation.into())
    }

    pub(crate) fn next_tick(&self) -> u64 {
        self.inner.next_tick.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn adapters(&self) -> &AdapterRegistry {
        &self.inner.adapters
    }

    /// Open an operation, or join the one already ambient
    pub fn begin(&self) -> Operation {
        let id = self.inner.id;
        let (version, depth) = AMBIENT.with(|ambient| {
            let mut ambient = ambient.borrow_mut();
            if let Some(scope) = ambient.get_mut(&id) {
                scope.depth += 1;
                return (scope.version, scope.depth);
            }
            let version = Version::operation(self.inner.next_seq.fetch_add(1, Ordering::Relaxed));
            ambient.insert(id, Scope::new(version));
            (version, 1)
        });
        let outermost = depth == 1;

        if outermost {
            tracing::debug!(manager = %self.name(), %version, "operation opened");
        } else {
            tracing::trace!(manager = %self.name(), %version, depth, "operation joined");
        }

        Operation {
            manager: self.clone(),
            version,
            outermost,
            closed: false,
            _not_send: PhantomData,
        }
    }

    /// Open or join an operation and enter each entity into it
    ///
    /// # Errors
    /// Returns [`OperationMisuse::ForeignManager`] if an entity belongs to
    /// another manager; the operation is closed again before returning
    pub fn begin_with<'a>(
        &self,
        entities: impl IntoIterator<Item = &'a Entity>,
    ) -> Result<(Operation, Vec<Entity>)> {
        let op = self.begin();
        let views = entities
            .into_iter()
            .map(|entity| op.enter(entity))
            .collect::<Result<Vec<_>>>();
        match views {
            Ok(views) => Ok((op, views)),
            Err(err) => {
                let version = op.version();
                // Misuse wins over anything a finalizer reports
                if let Err(closed) = op.end() {
                    tracing::warn!(
                        manager = %self.name(),
                        %version,
                        error = %closed,
                        "finalizer failed while abandoning operation"
                    );
                }
                Err(err)
            }
        }
    }

    /// Run `body` inside an operation
    ///
    /// Finalizers run when the outermost scope closes, even if `body`
    /// failed. An error from `body` takes precedence over a finalizer error.
    ///
    /// # Errors
    /// Returns the error from `body`, else the first finalizer error
    pub fn operation<T>(&self, body: impl FnOnce(&Operation) -> Result<T>) -> Result<T> {
        let op = self.begin();
        let result = body(&op);
        let closed = op.end();
        let value = result?;
        closed?;
        Ok(value)
    }

    /// Create an entity of `kind` rooted at the ambient version
    ///
    /// # Errors
    /// Returns [`OperationMisuse::NoActiveOperation`] outside an operation
    pub fn create(&self, kind: &str) -> Result<Entity> {
        let version = self.require_version()?;
        tracing::trace!(manager = %self.name(), kind, %version, "entity created");
        Ok(Entity::new(self.clone(), kind, VersionPath::root(version)))
    }

    /// Register `finalizer` to run when the ambient operation closes
    ///
    /// # Errors
    /// Returns [`OperationMisuse::NoActiveOperation`] outside an operation
    pub fn on_finalize(&self, finalizer: impl FnOnce() -> Result<()> + 'static) -> Result<()> {
        self.with_scope(|scope| scope.finalizers.push(Box::new(finalizer)))
    }

    /// Convert a foreign value into the versioned model
    ///
    /// See [`Adoption`] for the conversion rules.
    ///
    /// # Errors
    /// Returns [`OperationMisuse::NoActiveOperation`] outside an operation,
    /// [`ConfluenceError::NoAdapter`](crate::ConfluenceError::NoAdapter) for
    /// unregistered custom types and
    /// [`ConfluenceError::AdoptionDepthExceeded`](crate::ConfluenceError::AdoptionDepthExceeded)
    /// past the configured depth
    pub fn adopt(&self, value: &Foreign) -> Result<Value> {
        self.require_version()?;
        Adoption::new(self).adopt(value)
    }

    pub(crate) fn adopted(&self, key: usize) -> Result<Option<Value>> {
        self.with_scope(|scope| scope.adopted.get(&key).map(|(_, value)| value.clone()))
    }

    pub(crate) fn remember_adopted(&self, key: usize, source: Foreign, value: Value) -> Result<()> {
        self.with_scope(|scope| {
            scope.adopted.insert(key, (source, value));
        })
    }

    fn with_scope<R>(&self, f: impl FnOnce(&mut Scope) -> R) -> Result<R> {
        AMBIENT.with(|ambient| {
            ambient
                .borrow_mut()
                .get_mut(&self.inner.id)
                .map(f)
                .ok_or_else(|| OperationMisuse::NoActiveOperation.into())
        })
    }

    /// Drain finalizers in registration order until none are left
    fn run_finalizers(&self) -> Result<()> {
        loop {
            let batch = self
                .with_scope(|scope| mem::take(&mut scope.finalizers))
                .unwrap_or_default();
            if batch.is_empty() {
                return Ok(());
            }
            tracing::debug!(manager = %self.name(), count = batch.len(), "running finalizers");
            for finalizer in batch {
                finalizer()?;
            }
        }
    }

    /// Leave the ambient scope opened as `version`
    ///
    /// The outermost guard runs finalizers and removes the scope whatever
    /// the depth. An inner guard only decrements the depth of its own
    /// operation and is a no-op once that operation is gone.
    fn close(&self, version: Version, outermost: bool) -> Result<()> {
        let id = self.inner.id;
        let last = AMBIENT.with(|ambient| match ambient.borrow_mut().get_mut(&id) {
            Some(scope) if scope.version != version => false,
            Some(_) if outermost => true,
            Some(scope) => {
                scope.depth = scope.depth.saturating_sub(1);
                tracing::trace!(
                    manager = %self.name(),
                    %version,
                    depth = scope.depth,
                    "operation left"
                );
                false
            }
            None => false,
        });
        if !last {
            return Ok(());
        }

        let result = self.run_finalizers();
        let scope = AMBIENT.with(|ambient| ambient.borrow_mut().remove(&id));
        let adopted = scope.as_ref().map_or(0, |s| s.adopted.len());
        // Dropped outside the borrow: finalizers and cached values may hold
        // anything.
        drop(scope);

        tracing::debug!(
            manager = %self.name(),
            %version,
            adopted,
            ok = result.is_ok(),
            "operation closed"
        );
        result
    }
}

impl Default for VersionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for VersionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionManager")
            .field("id", &self.inner.id)
            .field("name", &self.name())
            .field("adapters", &self.inner.adapters)
            .finish_non_exhaustive()
    }
}

/// Builder for [`VersionManager`]
#[derive(Debug, Default)]
pub struct VersionManagerBuilder {
    config: ConfluenceConfig,
    adapters: AdapterRegistry,
}

impl VersionManagerBuilder {
    /// Replace the whole configuration
    #[must_use]
    pub fn config(mut self, config: ConfluenceConfig) -> Self {
        self.config = config;
        self
    }

    /// With manager label
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config = self.config.with_name(name);
        self
    }

    /// With adoption depth limit
    #[must_use]
    pub fn max_adoption_depth(mut self, depth: usize) -> Self {
        self.config = self.config.with_max_adoption_depth(depth);
        self
    }

    /// Register the adoption adapter for custom values of type `T`
    ///
    /// Replaces any adapter previously registered for `T`.
    #[must_use]
    pub fn adapter<T, F>(mut self, adapter: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, &mut Adoption<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.adapters.register::<T, F>(adapter);
        self
    }

    /// Finish building
    #[must_use]
    pub fn build(self) -> VersionManager {
        VersionManager::from_parts(self.config, self.adapters)
    }
}

/// Guard for an open (or joined) operation
///
/// Ambient state is thread-local, so the guard cannot leave its thread.
/// Prefer [`Operation::end`] to observe finalizer errors; dropping the guard
/// closes it too and only logs them.
pub struct Operation {
    manager: VersionManager,
    version: Version,
    outermost: bool,
    closed: bool,
    _not_send: PhantomData<*const ()>,
}

impl Operation {
    /// Version shared by every write in this operation
    #[inline]
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Check if this guard opened the operation rather than joining it
    #[inline]
    #[must_use]
    pub fn is_outermost(&self) -> bool {
        self.outermost
    }

    /// Manager this operation belongs to
    #[inline]
    #[must_use]
    pub fn manager(&self) -> &VersionManager {
        &self.manager
    }

    /// Writable view of `item` in this operation
    ///
    /// Appends the operation's version to the item's path unless it
    /// already ends with it.
    ///
    /// # Errors
    /// Returns [`OperationMisuse::ForeignManager`] for an item of another
    /// manager
    pub fn enter<T: Versioned>(&self, item: &T) -> Result<T> {
        let entity = item.entity();
        if !entity.manager().same_as(&self.manager) {
            return Err(OperationMisuse::ForeignManager.into());
        }
        if entity.path().tail() == self.version {
            return T::from_entity(entity.clone());
        }
        T::from_entity(entity.at(entity.path().child(self.version)))
    }

    /// See [`VersionManager::create`]
    ///
    /// # Errors
    /// Returns [`OperationMisuse::NoActiveOperation`] if the operation was
    /// closed through another guard
    pub fn create(&self, kind: &str) -> Result<Entity> {
        self.manager.create(kind)
    }

    /// See [`VersionManager::adopt`]
    ///
    /// # Errors
    /// As for [`VersionManager::adopt`]
    pub fn adopt(&self, value: &Foreign) -> Result<Value> {
        self.manager.adopt(value)
    }

    /// See [`VersionManager::on_finalize`]
    ///
    /// # Errors
    /// Returns [`OperationMisuse::NoActiveOperation`] if the operation was
    /// closed through another guard
    pub fn on_finalize(&self, finalizer: impl FnOnce() -> Result<()> + 'static) -> Result<()> {
        self.manager.on_finalize(finalizer)
    }

    /// Close this guard
    ///
    /// The outermost close runs finalizers and clears ambient state.
    ///
    /// # Errors
    /// Returns the first finalizer error; later finalizers are skipped
    pub fn end(mut self) -> Result<()> {
        self.closed = true;
        self.manager.close(self.version, self.outermost)
    }
}

impl Drop for Operation {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.manager.close(self.version, self.outermost) {
            tracing::warn!(
                manager = %self.manager.name(),
                version = %self.version,
                error = %err,
                "finalizer failed while dropping operation"
            );
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("manager", &self.manager.name())
            .field("version", &self.version)
            .field("outermost", &self.outermost)
            .finish_non_exhaustive()
    }
}
