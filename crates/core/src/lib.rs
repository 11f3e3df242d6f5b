//! stash-core: shared foundation for the stashdb workspace.
//!
//! This crate carries the pieces every other layer leans on:
//!
//! - [`error`]: the workspace error taxonomy
//! - [`frame`]: variable-length headers and length-prefixed framing
//! - [`sortkey`]: byte-order-preserving encoding of scalar sort-keys
//! - [`codec`]: the general object serializer contract
//!
//! Nothing in here touches a backend; it is pure byte plumbing.

pub mod codec;
pub mod error;
pub mod frame;
pub mod sortkey;

pub use codec::{from_bytes, to_bytes, CodecError};
pub use error::{Error, Result};
pub use sortkey::SortKey;
