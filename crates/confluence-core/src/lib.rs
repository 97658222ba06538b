//! Confluence Core - confluently persistent object graphs
//!
//! Mutable-looking entities whose every write is non-destructive: each
//! prior state stays readable and independent branches of history can be
//! created cheaply and cross-referenced without copying.
//!
//! # Overview
//!
//! - **VersionManager / Operation**: mint versions and scope a batch of
//!   writes as one version, ambient on the current thread
//! - **Entity**: named slots stored in version tries, read through a view's
//!   version path
//! - **Rebase**: entity-valued slots ride along with the reader's lineage;
//!   [`snapshot`] pins them
//! - **PersistentList**: indexed list of cells with logarithmic access
//! - **Adoption**: conversion of foreign mutable values
//!
//! # Example
//!
//! ```rust
//! use confluence_core::prelude::*;
//!
//! # fn main() -> confluence_core::Result<()> {
//! let manager = VersionManager::new();
//!
//! let base = manager.operation(|op| {
//!     let node = op.create("Node")?;
//!     node.set("a", 1)?;
//!     Ok(node)
//! })?;
//!
//! // Two independent branches from the same base
//! let left = manager.operation(|op| {
//!     let node = op.enter(&base)?;
//!     node.set("a", 2)?;
//!     Ok(node)
//! })?;
//! let right = manager.operation(|op| {
//!     let node = op.enter(&base)?;
//!     node.set("b", 3)?;
//!     Ok(node)
//! })?;
//!
//! assert_eq!(base.get("a")?.as_int(), Some(1));
//! assert_eq!(left.get("a")?.as_int(), Some(2));
//! assert!(!left.has("b"));
//! assert_eq!(right.get("a")?.as_int(), Some(1));
//! assert_eq!(right.get("b")?.as_int(), Some(3));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod adopt;
pub mod config;
pub mod entity;
pub mod error;
pub mod list;
pub mod manager;
pub mod rebase;
pub mod value;

// Re-exports
pub use adopt::{
    new_shared_list, AdapterRegistry, Adoption, CustomValue, Foreign, ForeignRecord, SharedList,
    SharedRecord,
};
pub use config::ConfluenceConfig;
pub use entity::{snapshot, Entity, Versioned};
pub use error::{ConfluenceError, OperationMisuse, Result};
pub use list::{ListIter, PersistentList};
pub use manager::{Operation, VersionManager, VersionManagerBuilder};
pub use rebase::rebase;
pub use value::{Atom, Value};

pub use confluence_version::{Version, VersionPath};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with confluence core
    pub use crate::{
        snapshot, Atom, ConfluenceError, Entity, Foreign, ForeignRecord, Operation,
        PersistentList, Value, VersionManager, Versioned,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
