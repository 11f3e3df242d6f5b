//! Secondary indexes: ordered sort-key space per record collection.
//!
//! An index entry is key-only: `bucket.prefix || frame(sortKey) ||
//! itemId`. The frame around the sort-key is mandatory — it keeps
//! different-length sort-keys from colliding on shared byte prefixes
//! and marks exactly where the item id begins. Two records may share a
//! sort-key; their entries differ in the id tail.
//!
//! A reverse bucket (`rbucket.prefix || itemId -> sortKey`) remembers
//! each record's last sort-key, so updates and deletes find the entry
//! to remove in O(1) instead of recomputing it from a possibly stale
//! record.
//!
//! All mutations here run inside the same transaction as the owning
//! record's mutation; an entry never outlives, and is never missing
//! relative to, its record.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::bucket::Bucket;
use crate::map::Map;
use crate::schema::Model;
use crate::store::ReverseFindPolicy;
use stash_core::{frame, Error, Result, SortKey};
use stash_kv::{IterFlow, Txn};

/// Which record mutation triggered the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexAction {
    /// Record is being added
    Create,
    /// Record is being overwritten
    Update,
    /// Record is being removed
    Delete,
}

/// Context handed to a sort-key generator.
///
/// The transaction is read-only here: generators may probe the store
/// (that is how uniqueness works) but never mutate it.
pub struct GenCtx<'a, T> {
    /// The record value after the mutation
    pub item: &'a T,
    /// Read view of the enclosing transaction
    pub txn: &'a dyn Txn,
    /// The mutation kind
    pub action: IndexAction,
}

/// Byte-level sort-key generator. An `Err` aborts the enclosing
/// transaction, record write included.
pub type Generator<T> = Arc<dyn Fn(&GenCtx<'_, T>) -> Result<Vec<u8>> + Send + Sync>;

/// A secondary index over one record collection.
pub struct Index<T: Model> {
    name: String,
    map: Map<T>,
    bucket: Bucket,
    rbucket: Bucket,
    gen: Generator<T>,
}

impl<T: Model> Index<T> {
    pub(crate) fn new(
        name: &str,
        map: Map<T>,
        bucket: Bucket,
        rbucket: Bucket,
        gen: Generator<T>,
    ) -> Index<T> {
        Index {
            name: name.to_string(),
            map,
            bucket,
            rbucket,
            gen,
        }
    }

    /// Index name, unique within its list.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn entry_key(&self, sort: &[u8], item_id: &[u8]) -> Vec<u8> {
        let mut key = self.bucket.prefix(&frame::encode(sort));
        key.extend_from_slice(item_id);
        key
    }

    /// Split an entry key into `(sortKey, itemId)`.
    fn split_entry<'k>(&self, key: &'k [u8]) -> Result<(&'k [u8], &'k [u8])> {
        let (sort, item_id) = frame::decode(&key[self.bucket.len()..])?;
        Ok((sort, item_id))
    }

    pub(crate) fn add(&self, txn: &mut dyn Txn, id: &[u8], item: &T) -> Result<()> {
        let sort = (self.gen)(&GenCtx {
            item,
            txn: &*txn,
            action: IndexAction::Create,
        })?;
        txn.set(&self.rbucket.prefix(id), &sort)?;
        txn.set(&self.entry_key(&sort, id), &[])
    }

    pub(crate) fn update(&self, txn: &mut dyn Txn, id: &[u8], item: &T) -> Result<()> {
        let rkey = self.rbucket.prefix(id);
        let old = txn.get(&rkey)?;
        let new = (self.gen)(&GenCtx {
            item,
            txn: &*txn,
            action: IndexAction::Update,
        })?;
        if old == new {
            return Ok(());
        }
        txn.delete(&self.entry_key(&old, id))?;
        txn.set(&rkey, &new)?;
        txn.set(&self.entry_key(&new, id), &[])
    }

    pub(crate) fn del(&self, txn: &mut dyn Txn, id: &[u8]) -> Result<()> {
        let rkey = self.rbucket.prefix(id);
        let sort = txn.get(&rkey)?;
        txn.delete(&rkey)?;
        txn.delete(&self.entry_key(&sort, id))
    }

    /// Bind this index to an open transaction.
    pub fn txn<'a>(&'a self, txn: &'a mut dyn Txn) -> IndexTxn<'a, T> {
        IndexTxn { index: self, txn }
    }

    fn policy(&self) -> ReverseFindPolicy {
        self.map.store().options().reverse_find
    }

    // ---- auto-transaction queries ----

    /// Open a query rooted at `key`, run in its own read transaction
    /// when a terminal method is called.
    pub fn from<K: SortKey + ?Sized>(&self, key: &K) -> Query<'_, T> {
        Query {
            index: self,
            root: Some(key.encoded()),
            reverse: false,
        }
    }

    /// Open a query over the whole index.
    pub fn scan_all(&self) -> Query<'_, T> {
        Query {
            index: self,
            root: None,
            reverse: false,
        }
    }
}

/// An index bound to one open transaction.
pub struct IndexTxn<'a, T: Model> {
    index: &'a Index<T>,
    txn: &'a mut dyn Txn,
}

impl<'a, T: Model> IndexTxn<'a, T> {
    /// Root an iteration at the encoding of `key`.
    pub fn from<K: SortKey + ?Sized>(&self, key: &K) -> Scan<'_, T> {
        self.from_bytes(Some(key.encoded()))
    }

    /// Root an iteration at the start (or, reversed, the upper seek
    /// point) of the index bucket.
    pub fn from_start(&self) -> Scan<'_, T> {
        self.from_bytes(None)
    }

    /// Byte-level root; `None` scans the whole bucket.
    pub fn from_bytes(&self, root: Option<Vec<u8>>) -> Scan<'_, T> {
        Scan {
            index: self.index,
            txn: &*self.txn,
            root,
            reverse: false,
        }
    }

    /// Recompute and rewrite every entry through the reverse bucket.
    /// For use after the generator's logic changes.
    pub fn reindex(&mut self) -> Result<()> {
        let rbucket = &self.index.rbucket;
        let mut ids = Vec::new();
        self.txn.iterate(false, &rbucket.prefix(b""), &mut |key| {
            if !rbucket.valid(key) {
                return Ok(IterFlow::Stop);
            }
            ids.push(key[rbucket.len()..].to_vec());
            Ok(IterFlow::Continue)
        })?;

        for id in ids {
            let (item, _) = self.index.map.txn(&mut *self.txn).get_traced(&id)?;
            self.index.update(self.txn, &id, &item)?;
        }
        Ok(())
    }
}

/// First index entry rooted at `root` matches it exactly.
///
/// Shared by [`Scan::has`] and the unique-index probe, which runs
/// against the index being defined before its entry is written.
pub(crate) fn probe_has(txn: &dyn Txn, bucket: &Bucket, root: &[u8]) -> Result<bool> {
    let from = bucket.prefix(&frame::encode(root));
    let mut has = false;
    txn.iterate(false, &from, &mut |key| {
        if bucket.valid(key) {
            let (sort, _) = frame::decode(&key[bucket.len()..])?;
            has = sort == root;
        }
        Ok(IterFlow::Stop)
    })?;
    Ok(has)
}

/// One entry seen during a scan.
pub struct Entry<'e, T: Model> {
    index: &'e Index<T>,
    txn: &'e dyn Txn,
    key: &'e [u8],
}

impl<T: Model> Entry<'_, T> {
    /// The record id this entry points at.
    pub fn item_id(&self) -> Result<&[u8]> {
        self.index.split_entry(self.key).map(|(_, id)| id)
    }

    /// The stored sort-key, without its frame.
    pub fn sort_key(&self) -> Result<&[u8]> {
        self.index.split_entry(self.key).map(|(sort, _)| sort)
    }

    /// Byte-compare the stored sort-key against the encoding of an
    /// arbitrary candidate value.
    pub fn compare<K: SortKey + ?Sized>(&self, key: &K) -> Result<Ordering> {
        let sort = self.sort_key()?;
        Ok(<[u8] as Ord>::cmp(sort, &key.encoded()))
    }

    /// Load the record this entry points at (read-only; migrations
    /// are not written back mid-scan).
    pub fn item(&self) -> Result<T> {
        self.index.map.peek(self.txn, self.item_id()?)
    }
}

/// An iteration context over an index, inside a transaction.
pub struct Scan<'s, T: Model> {
    index: &'s Index<T>,
    txn: &'s dyn Txn,
    root: Option<Vec<u8>>,
    reverse: bool,
}

impl<'s, T: Model> Scan<'s, T> {
    /// Flip the scan direction: walk strictly downward from the root.
    /// Entries whose sort-key equals the root lie above the seek point
    /// and are not visited, so a reversed scan needs a root past the
    /// keys of interest.
    pub fn reverse(mut self) -> Scan<'s, T> {
        self.reverse = true;
        self
    }

    fn start_key(&self) -> Vec<u8> {
        match &self.root {
            Some(root) => self.index.bucket.prefix(&frame::encode(root)),
            None => self.index.bucket.prefix(b""),
        }
    }

    /// Iterate raw entries from the root, stopping at the bucket end
    /// or on [`IterFlow::Stop`] from the callback.
    pub fn each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&Entry<'_, T>) -> Result<IterFlow>,
    {
        let from = self.start_key();
        self.txn.iterate(self.reverse, &from, &mut |key| {
            if !self.index.bucket.valid(key) {
                return Ok(IterFlow::Stop);
            }
            f(&Entry {
                index: self.index,
                txn: self.txn,
                key,
            })
        })
    }

    fn find_matches(&self, stop_after_first: bool) -> Result<Vec<T>> {
        if self.reverse && self.index.policy() == ReverseFindPolicy::Reject {
            return Err(Error::ReverseFind);
        }
        let root = self.root.clone().unwrap_or_default();
        let from = self.index.bucket.prefix(&frame::encode(&root));
        let mut items = Vec::new();

        // matches are contiguous from the framed root upward, so the
        // walk is forward in both modes; a reversed (allowed) find
        // just flips the collected order
        self.txn.iterate(false, &from, &mut |key| {
            if !self.index.bucket.valid(key) {
                return Ok(IterFlow::Stop);
            }
            let (sort, id) = self.index.split_entry(key)?;
            if sort != root {
                return Ok(IterFlow::Stop);
            }
            items.push(self.index.map.peek(self.txn, id)?);
            if stop_after_first && !self.reverse {
                return Ok(IterFlow::Stop);
            }
            Ok(IterFlow::Continue)
        })?;

        if self.reverse {
            items.reverse();
        }
        Ok(items)
    }

    /// The single record whose sort-key equals the root exactly.
    /// Multiple matches return the first (last, when reversed and
    /// allowed by policy); zero matches return [`Error::NotFound`].
    pub fn find_one(&self) -> Result<T> {
        let mut items = self.find_matches(true)?;
        if items.is_empty() {
            return Err(Error::NotFound);
        }
        Ok(items.swap_remove(0))
    }

    /// Every record whose sort-key equals the root exactly; zero
    /// matches return [`Error::NotFound`].
    pub fn find_all(&self) -> Result<Vec<T>> {
        let items = self.find_matches(false)?;
        if items.is_empty() {
            return Err(Error::NotFound);
        }
        Ok(items)
    }

    /// Iterate from the root, collecting records the predicate keeps.
    ///
    /// The predicate returns `(matched, proceed)`: `matched` collects
    /// the entry's record, `proceed == false` stops the scan.
    pub fn filter<F>(&self, mut pred: F) -> Result<Vec<T>>
    where
        F: FnMut(&Entry<'_, T>) -> Result<(bool, bool)>,
    {
        let mut items = Vec::new();
        self.each(|entry| {
            let (matched, proceed) = pred(entry)?;
            if matched {
                items.push(entry.item()?);
            }
            Ok(if proceed {
                IterFlow::Continue
            } else {
                IterFlow::Stop
            })
        })?;
        Ok(items)
    }

    /// True when the first entry from the root matches it exactly.
    pub fn has(&self) -> Result<bool> {
        probe_has(
            self.txn,
            &self.index.bucket,
            self.root.as_deref().unwrap_or_default(),
        )
    }
}

/// A deferred query that opens its own read transaction when a
/// terminal method runs.
pub struct Query<'q, T: Model> {
    index: &'q Index<T>,
    root: Option<Vec<u8>>,
    reverse: bool,
}

impl<'q, T: Model> Query<'q, T> {
    /// Flip the scan direction.
    pub fn reverse(mut self) -> Query<'q, T> {
        self.reverse = true;
        self
    }

    fn run<R>(&self, f: impl FnMut(&Scan<'_, T>) -> Result<R>) -> Result<R> {
        let mut f = f;
        let mut out = None;
        self.index.map.store().view(|txn| {
            let scan = Scan {
                index: self.index,
                txn: &*txn,
                root: self.root.clone(),
                reverse: self.reverse,
            };
            out = Some(f(&scan)?);
            Ok(())
        })?;
        out.ok_or(Error::NotFound)
    }

    /// See [`Scan::each`].
    pub fn each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&Entry<'_, T>) -> Result<IterFlow>,
    {
        self.run(|scan| scan.each(&mut f))
    }

    /// See [`Scan::find_one`].
    pub fn find_one(&self) -> Result<T> {
        self.run(|scan| scan.find_one())
    }

    /// See [`Scan::find_all`].
    pub fn find_all(&self) -> Result<Vec<T>> {
        self.run(|scan| scan.find_all())
    }

    /// See [`Scan::filter`].
    pub fn filter<F>(&self, mut pred: F) -> Result<Vec<T>>
    where
        F: FnMut(&Entry<'_, T>) -> Result<(bool, bool)>,
    {
        self.run(|scan| scan.filter(&mut pred))
    }

    /// See [`Scan::has`].
    pub fn has(&self) -> Result<bool> {
        self.run(|scan| scan.has())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Shape;
    use crate::store::{Store, StoreOptions};
    use serde::{Deserialize, Serialize};
    use stash_kv::Memory;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        name: String,
        level: i64,
    }

    impl Model for User {
        fn anchor() -> &'static str {
            "index.tests.User"
        }
        fn shape() -> Shape {
            Shape::Composite(vec![
                ("name", Shape::Scalar("String")),
                ("level", Shape::Scalar("i64")),
            ])
        }
    }

    fn seeded(store: &Store) -> Arc<Index<User>> {
        let mut users = store.list::<User>().unwrap();
        let level = users.index("level", |u: &User| u.level).unwrap();
        for (name, level) in [("a", 1), ("b", 2), ("c", 2), ("d", 3), ("e", 5)] {
            users
                .add(&User {
                    name: name.into(),
                    level,
                })
                .unwrap();
        }
        level
    }

    #[test]
    fn test_find_one_exact_match() {
        let store = Store::in_memory();
        let level = seeded(&store);
        assert_eq!(level.from(&3i64).find_one().unwrap().name, "d");
        assert!(matches!(level.from(&4i64).find_one(), Err(Error::NotFound)));
    }

    #[test]
    fn test_find_all_collects_equal_keys() {
        let store = Store::in_memory();
        let level = seeded(&store);
        let twos = level.from(&2i64).find_all().unwrap();
        assert_eq!(twos.len(), 2);
        assert!(twos.iter().all(|u| u.level == 2));
    }

    #[test]
    fn test_filter_walks_upward_from_root() {
        let store = Store::in_memory();
        let level = seeded(&store);
        let items = level
            .from(&3i64)
            .filter(|entry| {
                let below = entry.compare(&6i64)? == std::cmp::Ordering::Less;
                Ok((below, below))
            })
            .unwrap();
        let names: Vec<_> = items.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["d", "e"]);
    }

    #[test]
    fn test_reverse_filter_walks_downward() {
        let store = Store::in_memory();
        let level = seeded(&store);
        let items = level
            .from(&3i64)
            .reverse()
            .filter(|_| Ok((true, true)))
            .unwrap();
        let levels: Vec<_> = items.iter().map(|u| u.level).collect();
        assert_eq!(levels, vec![2, 2, 1]);
    }

    #[test]
    fn test_reverse_find_rejected_by_default() {
        let store = Store::in_memory();
        let level = seeded(&store);
        assert!(matches!(
            level.from(&2i64).reverse().find_one(),
            Err(Error::ReverseFind)
        ));
    }

    #[test]
    fn test_reverse_find_allowed_by_policy() {
        let store = Store::with_options(
            Arc::new(Memory::new()),
            StoreOptions {
                reverse_find: crate::store::ReverseFindPolicy::Allow,
                ..StoreOptions::default()
            },
        );
        let level = seeded(&store);
        let twos = level.from(&2i64).reverse().find_all().unwrap();
        let names: Vec<_> = twos.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b"]);
    }

    #[test]
    fn test_has_probes_exact_key() {
        let store = Store::in_memory();
        let level = seeded(&store);
        assert!(level.from(&2i64).has().unwrap());
        assert!(!level.from(&4i64).has().unwrap());
    }

    #[test]
    fn test_entry_exposes_id_and_sort_key() {
        let store = Store::in_memory();
        let level = seeded(&store);
        let mut seen = 0;
        level
            .scan_all()
            .each(|entry| {
                assert_eq!(entry.sort_key().unwrap().len(), 8);
                assert_eq!(entry.item_id().unwrap().len(), 12);
                seen += 1;
                Ok(IterFlow::Continue)
            })
            .unwrap();
        assert_eq!(seen, 5);
    }

    #[test]
    fn test_reindex_after_generator_change() {
        let store = Store::in_memory();
        let mut users = store.list::<User>().unwrap();
        users.index("level", |u: &User| u.level).unwrap();
        users
            .add(&User {
                name: "a".into(),
                level: 1,
            })
            .unwrap();

        // a second handle defines the same index with doubled keys
        let mut users2 = store.list::<User>().unwrap();
        let doubled = users2.index("level", |u: &User| u.level * 2).unwrap();
        store.update(|txn| doubled.txn(txn).reindex()).unwrap();

        assert!(matches!(
            doubled.from(&1i64).find_one(),
            Err(Error::NotFound)
        ));
        assert_eq!(doubled.from(&2i64).find_one().unwrap().name, "a");
    }
}

