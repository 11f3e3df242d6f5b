//! Reference in-memory backend.
//!
//! A `BTreeMap` behind a `parking_lot::RwLock`. Transactions read a
//! consistent base view and stage their writes in a pending overlay;
//! the overlay is applied to the base map only when an update
//! transaction's closure returns `Ok`. Read-only transactions share the
//! read lock and always discard their overlay, which satisfies the
//! contract that `update == false` never commits.
//!
//! Update transactions hold the write lock for their duration: single
//! writer, many readers. The core imposes no scheduling model, so this
//! is a valid (if conservative) choice for a reference backend.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use stash_core::{Error, Result};

use crate::{IterFlow, IterFn, KvStore, Txn, TxnFn};

type Base = BTreeMap<Vec<u8>, Vec<u8>>;
type Overlay = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// In-memory ordered key-value store.
#[derive(Debug, Default)]
pub struct Memory {
    data: RwLock<Base>,
}

impl Memory {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys. Test helper.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// True when no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KvStore for Memory {
    fn run(&self, update: bool, f: &mut TxnFn<'_>) -> Result<()> {
        if update {
            let mut guard = self.data.write();
            let mut txn = MemoryTxn {
                base: &guard,
                pending: Overlay::new(),
            };
            f(&mut txn)?;
            let pending = txn.pending;
            for (key, value) in pending {
                match value {
                    Some(value) => {
                        guard.insert(key, value);
                    }
                    None => {
                        guard.remove(&key);
                    }
                }
            }
            Ok(())
        } else {
            let guard = self.data.read();
            let mut txn = MemoryTxn {
                base: &guard,
                pending: Overlay::new(),
            };
            // writes land in the overlay and die with it
            f(&mut txn)
        }
    }
}

struct MemoryTxn<'a> {
    base: &'a Base,
    pending: Overlay,
}

enum Pick {
    Base,
    Over,
    Both,
}

impl Txn for MemoryTxn<'_> {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        match self.pending.get(key) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(Error::KeyNotFound),
            None => self.base.get(key).cloned().ok_or(Error::KeyNotFound),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.pending.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.pending.insert(key.to_vec(), None);
        Ok(())
    }

    fn iterate(&self, reverse: bool, from: &[u8], f: &mut IterFn<'_>) -> Result<()> {
        let (base, over): (
            Box<dyn Iterator<Item = (&Vec<u8>, &Vec<u8>)> + '_>,
            Box<dyn Iterator<Item = (&Vec<u8>, &Option<Vec<u8>>)> + '_>,
        ) = if !reverse {
            (
                Box::new(self.base.range(from.to_vec()..)),
                Box::new(self.pending.range(from.to_vec()..)),
            )
        } else if from.is_empty() {
            (
                Box::new(self.base.iter().rev()),
                Box::new(self.pending.iter().rev()),
            )
        } else {
            (
                Box::new(self.base.range(..=from.to_vec()).rev()),
                Box::new(self.pending.range(..=from.to_vec()).rev()),
            )
        };

        let mut base = base.peekable();
        let mut over = over.peekable();

        loop {
            let pick = match (base.peek(), over.peek()) {
                (None, None) => break,
                (Some(_), None) => Pick::Base,
                (None, Some(_)) => Pick::Over,
                (Some((bk, _)), Some((ok, _))) => {
                    use std::cmp::Ordering::{Equal, Greater, Less};
                    let first = if reverse { Greater } else { Less };
                    match bk.cmp(ok) {
                        Equal => Pick::Both,
                        ord if ord == first => Pick::Base,
                        _ => Pick::Over,
                    }
                }
            };

            // the overlay shadows the base on equal keys
            let key: Option<&[u8]> = match pick {
                Pick::Base => base.next().map(|(k, _)| k.as_slice()),
                Pick::Over => match over.next() {
                    Some((k, Some(_))) => Some(k.as_slice()),
                    _ => None,
                },
                Pick::Both => {
                    base.next();
                    match over.next() {
                        Some((k, Some(_))) => Some(k.as_slice()),
                        _ => None,
                    }
                }
            };

            let Some(key) = key else {
                continue; // overlay deletion
            };

            match f(key)? {
                IterFlow::Continue => {}
                IterFlow::Stop => return Ok(()),
            }
        }
        Ok(())
    }
}
