//! Testing utilities for the confluence workspace
//!
//! Shared fixtures, builders and assertions.

#![allow(missing_docs)]

use confluence_core::{
    Entity, Operation, PersistentList, Result, Value, VersionManager, VersionManagerBuilder,
    Versioned,
};
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install a test-writer subscriber honouring `RUST_LOG`, once per process
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

pub fn setup_manager() -> VersionManager {
    init_tracing();
    VersionManager::builder().name("test").build()
}

pub fn setup_manager_with(
    build: impl FnOnce(VersionManagerBuilder) -> VersionManagerBuilder,
) -> VersionManager {
    init_tracing();
    build(VersionManager::builder().name("test")).build()
}

/// Run `body` in an operation, panicking on error
pub fn in_op<T>(manager: &VersionManager, body: impl FnOnce(&Operation) -> Result<T>) -> T {
    manager.operation(body).unwrap()
}

/// Entity of `kind` with integer slots, created in its own operation
pub fn create_node(manager: &VersionManager, kind: &str, slots: &[(&str, i64)]) -> Entity {
    in_op(manager, |op| {
        let node = op.create(kind)?;
        for (name, value) in slots {
            node.set(name, *value)?;
        }
        Ok(node)
    })
}

/// List of integers, created in its own operation
pub fn create_int_list(
    manager: &VersionManager,
    values: impl IntoIterator<Item = i64>,
) -> PersistentList {
    in_op(manager, |_| {
        PersistentList::from_values(manager, values.into_iter().map(Value::from))
    })
}

/// Enter `item` into a fresh operation, apply `edit`, return the new view
pub fn mutate<T: Versioned>(
    manager: &VersionManager,
    item: &T,
    edit: impl FnOnce(&T) -> Result<()>,
) -> T {
    in_op(manager, |op| {
        let view = op.enter(item)?;
        edit(&view)?;
        Ok(view)
    })
}

pub fn list_ints(list: &PersistentList) -> Vec<i64> {
    list.iter()
        .unwrap()
        .map(|value| value.as_int().unwrap())
        .collect()
}

pub fn get_int(entity: &Entity, name: &str) -> i64 {
    entity.get(name).unwrap().as_int().unwrap()
}

pub fn get_entity(entity: &Entity, name: &str) -> Entity {
    entity.get(name).unwrap().expect_entity().unwrap()
}

/// Follow a chain of entity-valued slots, then read an integer
pub fn follow_int(entity: &Entity, chain: &[&str], name: &str) -> i64 {
    let mut current = entity.clone();
    for link in chain {
        current = get_entity(&current, link);
    }
    get_int(&current, name)
}

pub fn assert_int(entity: &Entity, name: &str, expected: i64) {
    assert_eq!(
        entity.get(name).unwrap().as_int(),
        Some(expected),
        "{}.{name} at {}",
        entity.kind(),
        entity.path()
    );
}

pub fn assert_missing(entity: &Entity, name: &str) {
    let err = entity.get(name).unwrap_err();
    assert!(err.is_not_found(), "expected {name} to be missing, got {err}");
}
