//! Indexable list: a map plus server-assigned ids and secondary
//! indexes maintained in lock-step with every record mutation.
//!
//! Index registration is a handle-local concern: each `List` value
//! carries its own registry, and only registered indexes are kept in
//! sync by that handle. Registering the same definitions on every
//! handle that mutates the collection is the caller's contract.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::index::{probe_has, GenCtx, Generator, Index, IndexAction};
use crate::map::Map;
use crate::schema::Model;
use stash_core::{Error, Result, SortKey};
use stash_kv::{IterFlow, Txn};

fn random_id() -> Vec<u8> {
    rand::random::<[u8; 12]>().to_vec()
}

/// A record collection with secondary indexes.
pub struct List<T: Model> {
    map: Map<T>,
    indexes: BTreeMap<String, Arc<Index<T>>>,
}

impl<T: Model> List<T> {
    pub(crate) fn new(map: Map<T>) -> List<T> {
        List {
            map,
            indexes: BTreeMap::new(),
        }
    }

    /// The underlying map.
    pub fn map(&self) -> &Map<T> {
        &self.map
    }

    /// Register an index computing its sort-key from the record alone.
    ///
    /// Allocates the index buckets in their own transactions, so
    /// registration belongs in setup code, not inside an open
    /// transaction.
    pub fn index<K, F>(&mut self, name: &str, f: F) -> Result<Arc<Index<T>>>
    where
        K: SortKey,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.index_bytes(name, Arc::new(move |ctx: &GenCtx<'_, T>| Ok(f(ctx.item).encoded())))
    }

    /// Register an index with a byte-level generator that may consult
    /// the transaction or the mutation kind.
    pub fn index_bytes(&mut self, name: &str, gen: Generator<T>) -> Result<Arc<Index<T>>> {
        if self.indexes.contains_key(name) {
            return Err(Error::IndexExists(name.to_string()));
        }
        let anchor = self.map.identity().anchor;
        let bucket = self
            .map
            .store()
            .bucket(&[anchor, self.map.name(), "index", name])?;
        let rbucket = self
            .map
            .store()
            .bucket(&[anchor, self.map.name(), "rindex", name])?;
        let index = Arc::new(Index::new(name, self.map.clone(), bucket, rbucket, gen));
        self.indexes.insert(name.to_string(), index.clone());
        Ok(index)
    }

    /// Register an index that rejects a `add` whose sort-key is already
    /// present, with [`Error::UniqueConstraint`].
    ///
    /// Only creation probes; overwriting a record with its own key is
    /// an update and passes through.
    pub fn unique_index<K, F>(&mut self, name: &str, f: F) -> Result<Arc<Index<T>>>
    where
        K: SortKey,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        let anchor = self.map.identity().anchor;
        let bucket = self
            .map
            .store()
            .bucket(&[anchor, self.map.name(), "index", name])?;
        let index_name = name.to_string();
        self.index_bytes(
            name,
            Arc::new(move |ctx: &GenCtx<'_, T>| {
                let key = f(ctx.item).encoded();
                if ctx.action == IndexAction::Create && probe_has(ctx.txn, &bucket, &key)? {
                    return Err(Error::UniqueConstraint(index_name.clone()));
                }
                Ok(key)
            }),
        )
    }

    /// A registered index by name.
    pub fn get_index(&self, name: &str) -> Option<Arc<Index<T>>> {
        self.indexes.get(name).cloned()
    }

    /// Bind this list to an open transaction.
    pub fn txn<'a>(&'a self, txn: &'a mut dyn Txn) -> ListTxn<'a, T> {
        ListTxn { list: self, txn }
    }

    // ---- auto-transaction sugar ----

    /// Run `f` against this list inside one update transaction.
    pub fn update<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut ListTxn<'_, T>) -> Result<()>,
    {
        self.map.store().update(|txn| f(&mut self.txn(txn)))
    }

    /// Run `f` against this list inside one read-only transaction.
    pub fn view<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut ListTxn<'_, T>) -> Result<()>,
    {
        self.map.store().view(|txn| f(&mut self.txn(txn)))
    }

    /// One-shot add; returns the new record's id in hex.
    pub fn add(&self, item: &T) -> Result<String> {
        let mut id = None;
        self.update(|list| {
            id = Some(list.add(item)?);
            Ok(())
        })?;
        id.ok_or(Error::NotFound)
    }

    /// One-shot get by hex id.
    ///
    /// Runs read-only, so a migration write-back (and the index refresh
    /// that follows it) is discarded here; it happens for real the next
    /// time the record is read inside an update transaction.
    pub fn get(&self, id: &str) -> Result<T> {
        let mut out = None;
        self.view(|list| {
            out = Some(list.get(id)?);
            Ok(())
        })?;
        out.ok_or(Error::KeyNotFound)
    }

    /// One-shot overwrite by hex id.
    pub fn set(&self, id: &str, item: &T) -> Result<()> {
        self.update(|list| list.set(id, item))
    }

    /// One-shot delete by hex id.
    pub fn del(&self, id: &str) -> Result<()> {
        self.update(|list| list.del(id))
    }
}

/// A list bound to one open transaction.
pub struct ListTxn<'a, T: Model> {
    list: &'a List<T>,
    txn: &'a mut dyn Txn,
}

impl<'a, T: Model> ListTxn<'a, T> {
    /// Add a record: the type's [`Model::unique_id`] when it provides
    /// one, a random 12-byte id otherwise. The record write and every
    /// index entry land in the same transaction; a failing generator
    /// aborts all of it.
    pub fn add_bytes(&mut self, item: &T) -> Result<Vec<u8>> {
        let id = item.unique_id().unwrap_or_else(random_id);
        self.list.map.txn(&mut *self.txn).set_bytes(&id, item)?;
        for index in self.list.indexes.values() {
            index.add(self.txn, &id, item)?;
        }
        Ok(id)
    }

    /// Read the record under `id`. A read that decoded via migration
    /// rewrites the record and refreshes every registered index, once.
    pub fn get_bytes(&mut self, id: &[u8]) -> Result<T> {
        let (item, migrated) = self.list.map.txn(&mut *self.txn).get_traced(id)?;
        if migrated {
            for index in self.list.indexes.values() {
                index.update(self.txn, id, &item)?;
            }
        }
        Ok(item)
    }

    /// Overwrite the record under `id` and refresh every index. A
    /// missing id is an error; overwriting never creates.
    pub fn set_bytes(&mut self, id: &[u8], item: &T) -> Result<()> {
        if !self.list.map.exists(&*self.txn, id)? {
            return Err(Error::KeyNotFound);
        }
        self.list.map.txn(&mut *self.txn).set_bytes(id, item)?;
        for index in self.list.indexes.values() {
            index.update(self.txn, id, item)?;
        }
        Ok(())
    }

    /// Delete the record under `id` and its entry in every index.
    pub fn del_bytes(&mut self, id: &[u8]) -> Result<()> {
        if !self.list.map.exists(&*self.txn, id)? {
            return Err(Error::KeyNotFound);
        }
        for index in self.list.indexes.values() {
            index.del(self.txn, id)?;
        }
        self.list.map.txn(&mut *self.txn).del_bytes(id)
    }

    /// Iterate every record id in the list.
    pub fn each<F>(&mut self, f: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<IterFlow>,
    {
        self.list.map.txn(&mut *self.txn).each(f)
    }

    // ---- hex-id sugar ----

    /// Add a record, returning its id in hex.
    pub fn add(&mut self, item: &T) -> Result<String> {
        Ok(hex::encode(self.add_bytes(item)?))
    }

    /// Get by hex id.
    pub fn get(&mut self, id: &str) -> Result<T> {
        self.get_bytes(&hex::decode(id)?)
    }

    /// Overwrite by hex id.
    pub fn set(&mut self, id: &str, item: &T) -> Result<()> {
        self.set_bytes(&hex::decode(id)?, item)
    }

    /// Delete by hex id.
    pub fn del(&mut self, id: &str) -> Result<()> {
        self.del_bytes(&hex::decode(id)?)
    }
}
