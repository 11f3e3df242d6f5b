//! Store façade.
//!
//! The `Store` owns the backend handle and the two process-scoped
//! caches: bucket name -> prefix, and concrete type -> identity. Both are
//! pure performance caches, always re-derivable from the store, and
//! only ever populated from committed transactions.
//!
//! Collections are created here: [`Store::map`], [`Store::list`] and
//! [`Store::value`] allocate their buckets (and the version-id buckets
//! for the type's whole lineage) up front in one update transaction,
//! so that per-operation transactions never have to nest.

use std::any::TypeId;
use std::sync::Arc;

use dashmap::DashMap;
use stash_kv::{KvStore, Memory, Txn};
use tracing::trace;

use crate::bucket::Bucket;
use crate::list::List;
use crate::map::Map;
use crate::schema::{Fingerprint, Model, TypeIdentity};
use crate::value::Value;
use stash_core::Result;

/// How exact-match `find` behaves on a reversed scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReverseFindPolicy {
    /// Reject with [`stash_core::Error::ReverseFind`]
    #[default]
    Reject,
    /// Allow: matches are returned last-first
    Allow,
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Namespace prefix for every bucket name, so multiple stores can
    /// share one backend.
    pub name: String,
    /// Reversed exact-match find behavior.
    pub reverse_find: ReverseFindPolicy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            name: "stash".into(),
            reverse_find: ReverseFindPolicy::default(),
        }
    }
}

struct Inner {
    options: StoreOptions,
    db: Arc<dyn KvStore>,
    /// bucket name -> prefix; the only cross-transaction shared
    /// mutable state in the core
    bucket_cache: DashMap<String, Vec<u8>>,
    /// concrete type -> identity; a type cannot change shape at
    /// runtime, so entries are never invalidated. Keyed by `TypeId`,
    /// not anchor: migration-chain versions share one anchor but each
    /// carries its own lineage
    identities: DashMap<TypeId, Arc<TypeIdentity>>,
}

/// Handle to an open store. Cheap to clone; all clones share the
/// backend and the caches.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Store {
    /// Open a store over any backend with default options.
    pub fn open(db: Arc<dyn KvStore>) -> Store {
        Store::with_options(db, StoreOptions::default())
    }

    /// Open a store with explicit options.
    pub fn with_options(db: Arc<dyn KvStore>, options: StoreOptions) -> Store {
        Store {
            inner: Arc::new(Inner {
                options,
                db,
                bucket_cache: DashMap::new(),
                identities: DashMap::new(),
            }),
        }
    }

    /// Shortcut: a store over the in-memory reference backend.
    pub fn in_memory() -> Store {
        Store::open(Arc::new(Memory::new()))
    }

    /// Store options.
    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    /// Run `f` inside an update transaction. Mutations commit only if
    /// `f` returns `Ok`.
    pub fn update<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut dyn Txn) -> Result<()>,
    {
        self.inner.db.run(true, &mut f)
    }

    /// Run `f` inside a read-only transaction. Writes performed by `f`
    /// are always discarded.
    pub fn view<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut dyn Txn) -> Result<()>,
    {
        self.inner.db.run(false, &mut f)
    }

    /// Create (or reopen) a typed map named after the type alone.
    pub fn map<T: Model>(&self) -> Result<Map<T>> {
        self.map_named("")
    }

    /// Create (or reopen) a typed map with an explicit name, so one
    /// type can back several collections.
    pub fn map_named<T: Model>(&self, name: &str) -> Result<Map<T>> {
        Map::create(self, "map", name)
    }

    /// Create (or reopen) an indexable list named after the type.
    pub fn list<T: Model>(&self) -> Result<List<T>> {
        self.list_named("")
    }

    /// Create (or reopen) an indexable list with an explicit name.
    pub fn list_named<T: Model>(&self, name: &str) -> Result<List<T>> {
        Ok(List::new(Map::create(self, "list", name)?))
    }

    /// Single-record store seeded with `init` when absent.
    pub fn value<T: Model>(&self, name: &str, init: &T) -> Result<Value<T>> {
        Value::create(Map::create(self, "value", name)?, init)
    }

    /// Identity of `T`, computed once per concrete type.
    pub(crate) fn identity<T: Model>(&self) -> Arc<TypeIdentity> {
        self.inner
            .identities
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(TypeIdentity::of::<T>()))
            .clone()
    }

    /// Join bucket name parts under the store namespace, skipping
    /// empty parts.
    fn bucket_name(&self, parts: &[&str]) -> String {
        let mut joined = self.inner.options.name.clone();
        for part in parts {
            if part.is_empty() {
                continue;
            }
            joined.push(':');
            joined.push_str(part);
        }
        joined
    }

    /// Allocate (or reopen) a bucket in its own committed transaction
    /// and cache the prefix.
    pub(crate) fn bucket(&self, parts: &[&str]) -> Result<Bucket> {
        let name = self.bucket_name(parts);
        if let Some(prefix) = self.inner.bucket_cache.get(&name) {
            return Ok(Bucket::from_prefix(prefix.clone()));
        }
        let mut prefix = Vec::new();
        self.update(|txn| {
            let bucket = Bucket::open(txn, &name)?;
            prefix = bucket.raw().to_vec();
            Ok(())
        })?;
        self.inner.bucket_cache.insert(name, prefix.clone());
        Ok(Bucket::from_prefix(prefix))
    }

    fn version_bucket_name(&self, fingerprint: &Fingerprint) -> String {
        self.bucket_name(&["type", &fingerprint.to_hex()])
    }

    /// Pre-allocate version-id buckets for a type's whole lineage.
    /// Runs once per collection creation, in its own committed
    /// transaction, so the cache only ever holds persisted mappings.
    pub(crate) fn register_lineage(&self, identity: &TypeIdentity) -> Result<()> {
        let missing: Vec<(String, Fingerprint)> = identity
            .lineage
            .iter()
            .map(|fp| (self.version_bucket_name(fp), *fp))
            .filter(|(name, _)| !self.inner.bucket_cache.contains_key(name))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        let mut allocated: Vec<(String, Vec<u8>)> = Vec::new();
        self.update(|txn| {
            allocated.clear();
            for (name, _) in &missing {
                let bucket = Bucket::open(txn, name)?;
                allocated.push((name.clone(), bucket.raw().to_vec()));
            }
            Ok(())
        })?;
        for (name, prefix) in allocated {
            trace!(anchor = identity.anchor, bucket = %name, "registered version id");
            self.inner.bucket_cache.insert(name, prefix);
        }
        Ok(())
    }

    /// Resolve the short version id for a fingerprint, allocating it
    /// inside the caller's transaction when it was never seen.
    ///
    /// The freshly allocated case stays out of the cache: the caller's
    /// transaction may still abort, and the cache must never get ahead
    /// of the store.
    pub(crate) fn version_id(&self, txn: &mut dyn Txn, fingerprint: &Fingerprint) -> Result<Vec<u8>> {
        let name = self.version_bucket_name(fingerprint);
        if let Some(prefix) = self.inner.bucket_cache.get(&name) {
            return Ok(prefix.clone());
        }
        let (bucket, _) = Bucket::allocate(txn, &name)?;
        Ok(bucket.raw().to_vec())
    }

    /// Look up the version id for a fingerprint without allocating.
    /// `None` means no payload in this store can carry that marker.
    pub(crate) fn version_id_read(
        &self,
        txn: &dyn Txn,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Vec<u8>>> {
        let name = self.version_bucket_name(fingerprint);
        if let Some(prefix) = self.inner.bucket_cache.get(&name) {
            return Ok(Some(prefix.clone()));
        }
        Ok(Bucket::lookup(txn, &name)?.map(|b| b.raw().to_vec()))
    }
}
