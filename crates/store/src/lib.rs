//! Transactional object store over any ordered key-value backend.
//!
//! The store keeps typed records as versioned payloads, hands out
//! short bucket prefixes for namespacing, and maintains secondary
//! indexes in lock-step with record mutations. Records whose shape
//! changed are migrated forward transparently on read.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use stash_store::{Model, Shape, Store};
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
//! # fn main() -> stash_core::Result<()> {
//! let store = Store::in_memory();
//! let mut users = store.list::<User>()?;
//! let level = users.index("level", |u: &User| u.level)?;
//!
//! users.add(&User { name: "jack".into(), level: 10 })?;
//! let jack = level.from(&10i64).find_one()?;
//! assert_eq!(jack.name, "jack");
//! # Ok(())
//! # }
//! ```

pub mod bucket;
pub mod index;
pub mod list;
pub mod map;
pub mod schema;
pub mod store;
pub mod value;

pub use bucket::Bucket;
pub use index::{Entry, GenCtx, Generator, Index, IndexAction, IndexTxn, Query, Scan};
pub use list::{List, ListTxn};
pub use map::{Map, MapTxn};
pub use schema::{migrate, Decoded, Fingerprint, Migrate, Model, Shape, TypeIdentity};
pub use store::{ReverseFindPolicy, Store, StoreOptions};
pub use value::{Value, ValueTxn};
