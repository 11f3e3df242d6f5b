//! Single-record store: a map with one well-known (empty) id.

use crate::map::Map;
use crate::schema::Model;
use stash_core::{Error, Result};
use stash_kv::Txn;

/// A typed singleton record.
pub struct Value<T: Model> {
    map: Map<T>,
}

impl<T: Model> Value<T> {
    /// Wrap a map as a singleton and seed it with `init` when no
    /// record exists yet. Reopening never overwrites.
    pub(crate) fn create(map: Map<T>, init: &T) -> Result<Value<T>> {
        map.store().update(|txn| {
            if !map.exists(&*txn, b"")? {
                map.txn(txn).set_bytes(b"", init)?;
            }
            Ok(())
        })?;
        Ok(Value { map })
    }

    /// Bind this value to an open transaction.
    pub fn txn<'a>(&'a self, txn: &'a mut dyn Txn) -> ValueTxn<'a, T> {
        ValueTxn { value: self, txn }
    }

    /// One-shot read.
    pub fn get(&self) -> Result<T> {
        let mut out = None;
        self.map.store().view(|txn| {
            out = Some(self.txn(txn).get()?);
            Ok(())
        })?;
        out.ok_or(Error::KeyNotFound)
    }

    /// One-shot write.
    pub fn set(&self, item: &T) -> Result<()> {
        self.map.store().update(|txn| self.txn(txn).set(item))
    }
}

/// A value bound to one open transaction.
pub struct ValueTxn<'a, T: Model> {
    value: &'a Value<T>,
    txn: &'a mut dyn Txn,
}

impl<'a, T: Model> ValueTxn<'a, T> {
    /// Read the record.
    pub fn get(&mut self) -> Result<T> {
        self.value.map.txn(&mut *self.txn).get_bytes(b"")
    }

    /// Overwrite the record.
    pub fn set(&mut self, item: &T) -> Result<()> {
        self.value.map.txn(&mut *self.txn).set_bytes(b"", item)
    }
}
