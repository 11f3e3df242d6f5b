//! Error types for the stashdb workspace.
//!
//! One enum covers every layer (backend, bucket allocator, schema,
//! map/list/index). We use `thiserror` for the `Display` and `Error`
//! implementations. Backend errors pass through unchanged; the core
//! never swallows or retries them.

use crate::codec::CodecError;
use std::io;
use thiserror::Error;

/// Result type alias for stashdb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for stashdb
#[derive(Debug, Error)]
pub enum Error {
    /// Key absent from the backend store
    #[error("key not found")]
    KeyNotFound,

    /// An index scan yielded no matching entry
    #[error("not found")]
    NotFound,

    /// The bucket allocator rejects the empty name
    #[error("bucket name cannot be empty")]
    EmptyBucketName,

    /// An index with this name is already registered on the list
    #[error("index already exists: {0}")]
    IndexExists(String),

    /// A unique index rejected a duplicate sort-key
    #[error("unique constraint violated on index: {0}")]
    UniqueConstraint(String),

    /// The stored version has no reachable ancestor in the current
    /// type's migration chain
    #[error("stored version of {anchor} is not migratable to the current shape")]
    NotMigratable {
        /// Anchor of the type that attempted the decode
        anchor: &'static str,
    },

    /// Exact-match find on a reversed scan while the store policy rejects it
    #[error("exact-match find is not allowed on a reversed scan")]
    ReverseFind,

    /// Malformed hex string id
    #[error("invalid record id: {0}")]
    InvalidId(#[from] hex::FromHexError),

    /// Serialization, deserialization or framing failure
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O error from a file-backed backend
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Opaque backend failure, propagated unchanged
    #[error("backend error: {0}")]
    Backend(String),
}
