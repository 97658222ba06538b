//! Error types for confluence core
//!
//! Provides error handling for:
//! - Mutation or creation outside the matching operation
//! - Reads of slots that are undeclared or not yet visible
//! - Out-of-range list access
//! - Adoption failures (missing adapters, runaway depth)

use confluence_version::{PathError, Version};

/// Result alias used throughout the crate
pub type Result<T, E = ConfluenceError> = std::result::Result<T, E>;

/// Main confluence error type
#[derive(Debug, thiserror::Error)]
pub enum ConfluenceError {
    /// Call made with no matching ambient operation
    #[error("incorrect operation: {0}")]
    IncorrectOperation(#[from] OperationMisuse),

    /// Slot is undeclared or has nothing visible at the view's path
    #[error("attribute not found: {kind}.{name}")]
    AttributeNotFound {
        /// Entity kind
        kind: String,
        /// Attribute name
        name: String,
    },

    /// List index outside the valid range
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// Index as requested by the caller, before normalization
        index: i64,
        /// Length at the time of the call
        len: usize,
    },

    /// Value has the wrong shape for the requested use
    #[error("expected {expected}, found {found}")]
    UnexpectedValue {
        /// What the caller needed
        expected: &'static str,
        /// What was actually stored
        found: &'static str,
    },

    /// Entity is not of the required kind
    #[error("expected entity of kind {expected}, found {found}")]
    KindMismatch {
        /// Required kind
        expected: String,
        /// Actual kind
        found: String,
    },

    /// Adoption met a custom value with no registered adapter
    #[error("no adapter registered for {type_name}")]
    NoAdapter {
        /// Rust type name of the value
        type_name: &'static str,
    },

    /// Adoption recursed deeper than the configured limit
    #[error("adoption exceeded maximum depth {limit}")]
    AdoptionDepthExceeded {
        /// Configured limit
        limit: usize,
    },

    /// Invalid version path
    #[error("invalid version path: {0}")]
    Path(#[from] PathError),

    /// Configuration could not be parsed
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

impl ConfluenceError {
    /// Check if error signals misuse of operation scoping
    #[inline]
    #[must_use]
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::IncorrectOperation(_))
    }

    /// Check if error is a missing attribute
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::AttributeNotFound { .. })
    }

    /// Check if error is an out-of-range index
    #[inline]
    #[must_use]
    pub fn is_index_error(&self) -> bool {
        matches!(self, Self::IndexOutOfRange { .. })
    }

    pub(crate) fn not_found(kind: &str, name: &str) -> Self {
        Self::AttributeNotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }
}

/// Ways an operation-scoped call can be misused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OperationMisuse {
    /// No operation is ambient on this thread for the manager
    #[error("no operation is active")]
    NoActiveOperation,

    /// View was not entered into the ambient operation
    #[error("view is at {found}, active operation is {expected}")]
    VersionMismatch {
        /// Ambient operation version
        expected: Version,
        /// Tail of the view's path
        found: Version,
    },

    /// Entity belongs to a different version manager
    #[error("entity belongs to a different version manager")]
    ForeignManager,
}
