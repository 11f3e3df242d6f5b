//! Typed map: record CRUD under one bucket.
//!
//! The map is the base collection type; a list is a map plus indexes.
//! It stores versioned payloads under `bucket.prefix || id` and decodes
//! them back through the type's migration chain. When a read decodes
//! via migration, the map rewrites the record in current form right
//! away so the same migration never runs twice.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::bucket::Bucket;
use crate::schema::{self, Decoded, Model, TypeIdentity};
use crate::store::Store;
use stash_core::{Error, Result};
use stash_kv::{IterFlow, Txn};

/// A typed record collection. Cheap to clone.
pub struct Map<T: Model> {
    store: Store,
    name: String,
    bucket: Bucket,
    identity: Arc<TypeIdentity>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Model> Clone for Map<T> {
    fn clone(&self) -> Self {
        Map {
            store: self.store.clone(),
            name: self.name.clone(),
            bucket: self.bucket.clone(),
            identity: self.identity.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Model> Map<T> {
    /// Allocate the map's bucket and the version-id buckets for the
    /// type's lineage, then hand out the collection handle.
    pub(crate) fn create(store: &Store, kind: &str, name: &str) -> Result<Map<T>> {
        let identity = store.identity::<T>();
        let bucket = store.bucket(&[identity.anchor, kind, name])?;
        store.register_lineage(&identity)?;
        Ok(Map {
            store: store.clone(),
            name: name.to_string(),
            bucket,
            identity,
            _record: PhantomData,
        })
    }

    /// Collection name (may be empty for the type-default collection).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn identity(&self) -> &TypeIdentity {
        &self.identity
    }

    /// Bind this map to an open transaction.
    pub fn txn<'a>(&'a self, txn: &'a mut dyn Txn) -> MapTxn<'a, T> {
        MapTxn { map: self, txn }
    }

    /// Read-only decode of one record, without migration write-back.
    /// Used inside index scans, which must not mutate mid-iteration.
    pub(crate) fn peek(&self, txn: &dyn Txn, id: &[u8]) -> Result<T> {
        let raw = txn.get(&self.bucket.prefix(id))?;
        let ids = self.lineage_ids(txn)?;
        Ok(schema::decode_payload::<T>(&raw, &ids)?.into_inner())
    }

    /// Whether a record exists under `id`, without decoding it.
    pub(crate) fn exists(&self, txn: &dyn Txn, id: &[u8]) -> Result<bool> {
        match txn.get(&self.bucket.prefix(id)) {
            Ok(_) => Ok(true),
            Err(Error::KeyNotFound) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn lineage_ids(&self, txn: &dyn Txn) -> Result<Vec<Option<Vec<u8>>>> {
        self.identity
            .lineage
            .iter()
            .map(|fp| self.store.version_id_read(txn, fp))
            .collect()
    }

    // ---- auto-transaction sugar ----

    /// One-shot set under a string id.
    pub fn set(&self, id: &str, item: &T) -> Result<()> {
        self.store.update(|txn| self.txn(txn).set(id, item))
    }

    /// One-shot get under a string id.
    ///
    /// Runs read-only: a migration write-back attempted here is
    /// discarded by the backend and will happen for real the next time
    /// the record is read inside an update transaction.
    pub fn get(&self, id: &str) -> Result<T> {
        let mut out = None;
        self.store.view(|txn| {
            out = Some(self.txn(txn).get(id)?);
            Ok(())
        })?;
        out.ok_or(Error::KeyNotFound)
    }

    /// One-shot delete under a string id.
    pub fn del(&self, id: &str) -> Result<()> {
        self.store.update(|txn| self.txn(txn).del(id))
    }
}

/// A map bound to one open transaction.
pub struct MapTxn<'a, T: Model> {
    map: &'a Map<T>,
    txn: &'a mut dyn Txn,
}

impl<'a, T: Model> MapTxn<'a, T> {
    /// Write `item` under `id` as a versioned payload.
    pub fn set_bytes(&mut self, id: &[u8], item: &T) -> Result<()> {
        let version = self
            .map
            .store
            .version_id(self.txn, self.map.identity.current())?;
        let payload = schema::encode_payload(item, &version)?;
        self.txn.set(&self.map.bucket.prefix(id), &payload)
    }

    /// Read the record under `id`.
    pub fn get_bytes(&mut self, id: &[u8]) -> Result<T> {
        self.get_traced(id).map(|(item, _)| item)
    }

    /// Read the record under `id`, reporting whether it was decoded
    /// via migration. A migrated record is rewritten in current form
    /// before returning, and the flag lets the list layer refresh its
    /// indexes too.
    pub fn get_traced(&mut self, id: &[u8]) -> Result<(T, bool)> {
        let raw = self.txn.get(&self.map.bucket.prefix(id))?;
        let ids = self.map.lineage_ids(self.txn)?;
        match schema::decode_payload::<T>(&raw, &ids)? {
            Decoded::Fresh(item) => Ok((item, false)),
            Decoded::Migrated(item) => {
                debug!(
                    anchor = self.map.identity.anchor,
                    "rewriting record in current shape after migration"
                );
                self.set_bytes(id, &item)?;
                Ok((item, true))
            }
        }
    }

    /// Delete the record under `id`. Absence is not checked here; the
    /// layers that need the old value surface it.
    pub fn del_bytes(&mut self, id: &[u8]) -> Result<()> {
        self.txn.delete(&self.map.bucket.prefix(id))
    }

    /// Iterate every record id in the map.
    pub fn each<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<IterFlow>,
    {
        let bucket = &self.map.bucket;
        self.txn.iterate(false, &bucket.prefix(b""), &mut |key| {
            if !bucket.valid(key) {
                return Ok(IterFlow::Stop);
            }
            f(&key[bucket.len()..])
        })
    }

    // ---- string-id sugar ----

    /// Set under a human-readable string id.
    pub fn set(&mut self, id: &str, item: &T) -> Result<()> {
        self.set_bytes(id.as_bytes(), item)
    }

    /// Get under a human-readable string id.
    pub fn get(&mut self, id: &str) -> Result<T> {
        self.get_bytes(id.as_bytes())
    }

    /// Delete under a human-readable string id.
    pub fn del(&mut self, id: &str) -> Result<()> {
        self.del_bytes(id.as_bytes())
    }
}
