//! stash-kv: the ordered key-value transaction interface.
//!
//! This is the seam every backend plugs into. The core above it needs
//! exactly four primitives: get, set, delete and ordered key iteration,
//! all issued against one transaction that provides atomicity and a
//! consistent read view for its duration.
//!
//! The interface stays callback-shaped because backends may pin locks,
//! snapshots or iterators to the transaction scope; a callback lets them
//! clean up deterministically. Iteration callbacks return a tri-state
//! [`IterFlow`] instead of a sentinel error, so the error channel stays
//! reserved for real failures.

pub mod memory;

pub use memory::Memory;

use stash_core::Result;

/// Outcome of one iteration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterFlow {
    /// Keep iterating
    Continue,
    /// Stop cleanly; `iterate` returns `Ok`
    Stop,
}

/// Callback receiving each key during iteration.
pub type IterFn<'a> = dyn FnMut(&[u8]) -> Result<IterFlow> + 'a;

/// Transaction closure run by [`KvStore::run`].
pub type TxnFn<'a> = dyn FnMut(&mut dyn Txn) -> Result<()> + 'a;

/// One open transaction against a backend.
///
/// All operations observe a consistent view; mutations become visible
/// to other transactions only if the enclosing [`KvStore::run`] call
/// commits.
pub trait Txn {
    /// Read a value. Absent keys are [`stash_core::Error::KeyNotFound`].
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Write a key-value pair.
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key. Deleting an absent key is not an error.
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Key-only iteration in byte-wise lexicographic order.
    ///
    /// Ascending iteration starts at the first key `>= from`; descending
    /// (`reverse`) starts at the last key `<= from`, or at the very end
    /// when `from` is empty. The callback's [`IterFlow::Stop`] ends the
    /// iteration without an error; any `Err` aborts and propagates.
    fn iterate(&self, reverse: bool, from: &[u8], f: &mut IterFn<'_>) -> Result<()>;
}

/// A store that can run transactions.
pub trait KvStore: Send + Sync {
    /// Run `f` inside a new transaction.
    ///
    /// When `update` is false the transaction must not commit mutations,
    /// even if `f` performed writes and returned `Ok`. When `f` returns
    /// an error every write is discarded and the error propagates
    /// unchanged.
    fn run(&self, update: bool, f: &mut TxnFn<'_>) -> Result<()>;
}
