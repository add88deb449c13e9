//! Error types for the cache table
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache table operations.
///
/// Lookup is the only fallible operation; everything else on the table is
/// total and side-effect-only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key absent from the table and no data loader is configured
    #[error("key not found and cannot be loaded")]
    NotFound,
}

// == Result Type Alias ==
/// Convenience Result type for cache table operations.
pub type Result<T> = std::result::Result<T, CacheError>;
