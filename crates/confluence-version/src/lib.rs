//! Confluence Version Store
//!
//! Versions, version paths and the version-indexed slot trie.
//!
//! # Overview
//!
//! - **Version**: `(seq, sub)` pair; operations mint `sub == 0`, snapshots
//!   slot in between with a non-zero `sub`
//! - **VersionPath**: non-empty lineage of versions, prefix-comparable
//! - **VersionTrie**: append-only map from version path to value with
//!   longest-prefix lookup
//!
//! # Example
//!
//! ```rust
//! use confluence_version::{Version, VersionPath, VersionTrie};
//!
//! let v0 = Version::operation(0);
//! let v1 = Version::operation(1);
//! let base = VersionPath::root(v0);
//!
//! let mut trie = VersionTrie::new();
//! trie.set(base.clone(), 1, "created");
//!
//! // A later lineage still sees the value written at its prefix
//! let (key, value) = trie.longest_prefix(&base.child(v1)).unwrap();
//! assert_eq!(key, &base);
//! assert_eq!(*value, "created");
//! ```

#![warn(missing_docs)]

pub mod trie;
pub mod version;

// Re-exports
pub use trie::{Stamped, VersionTrie};
pub use version::{PathError, Version, VersionPath};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
