//! stashdb - transactional object store over ordered key-value backends
//!
//! stashdb keeps typed records in any backend that can offer ordered
//! key iteration inside transactions. On top of that narrow interface
//! it layers bucket namespacing, versioned payloads with transparent
//! shape migration, and secondary indexes maintained in lock-step with
//! record writes.
//!
//! # Quick Start
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use stashdb::{Model, Shape, Store};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct User {
//!     name: String,
//!     level: i64,
//! }
//!
//! impl Model for User {
//!     fn anchor() -> &'static str {
//!         "User"
//!     }
//!     fn shape() -> Shape {
//!         Shape::Composite(vec![
//!             ("name", Shape::Scalar("String")),
//!             ("level", Shape::Scalar("i64")),
//!         ])
//!     }
//! }
//!
//! # fn main() -> stashdb::Result<()> {
//! let store = Store::in_memory();
//! let mut users = store.list::<User>()?;
//! let level = users.index("level", |u: &User| u.level)?;
//!
//! let id = users.add(&User { name: "jack".into(), level: 10 })?;
//! assert_eq!(users.get(&id)?.level, 10);
//! assert_eq!(level.from(&10i64).find_one()?.name, "jack");
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! The workspace is split along the dependency arrow: `stash-core`
//! holds the byte-level vocabulary (frames, sort-key encoding, the
//! error type), `stash-kv` defines the backend interface plus the
//! in-memory reference backend, and `stash-store` builds the typed
//! store on top. This crate re-exports the public surface of all
//! three.

pub use stash_core::{CodecError, Error, Result, SortKey};
pub use stash_kv::{IterFlow, IterFn, KvStore, Memory, Txn, TxnFn};
pub use stash_store::*;
