//! Bucket namespace allocator.
//!
//! A bucket maps an arbitrary name to a short, persistent byte prefix.
//! The mapping lives inside the store itself: a monotonic counter under
//! a reserved key hands out prefixes, and a reserved name-map region
//! remembers `name -> prefix` for the lifetime of the store.
//!
//! Prefixes are bare frame headers, so a key can be asked which bucket
//! it belongs to by decoding its own length header — that is how scans
//! detect the end of a bucket without an explicit upper bound.
//!
//! Allocation happens inside whatever transaction asked for it, so
//! creating a bucket participates in the caller's atomicity and
//! rollback.

use stash_core::{frame, Error, Result};
use stash_kv::{IterFlow, Txn};
use tracing::debug;

/// Reserved key holding the allocation counter.
fn counter_key() -> Vec<u8> {
    frame::encode_header(0)
}

/// Reserved prefix for the `name -> prefix` map.
fn name_key(name: &str) -> Vec<u8> {
    let mut key = frame::encode_header(1);
    key.extend_from_slice(name.as_bytes());
    key
}

/// A namespace identified by a short order-comparable prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    prefix: Vec<u8>,
}

impl Bucket {
    /// Open (or lazily create) the bucket for `name`.
    pub fn open(txn: &mut dyn Txn, name: &str) -> Result<Bucket> {
        Self::allocate(txn, name).map(|(bucket, _)| bucket)
    }

    /// Open the bucket for `name`, reporting whether it was created by
    /// this call.
    ///
    /// The same name always resolves to the same prefix for the
    /// lifetime of the store. New buckets mutate two keys: the counter
    /// and the name mapping.
    pub fn allocate(txn: &mut dyn Txn, name: &str) -> Result<(Bucket, bool)> {
        if name.is_empty() {
            return Err(Error::EmptyBucketName);
        }

        let key = name_key(name);
        match txn.get(&key) {
            Ok(prefix) => return Ok((Bucket { prefix }, false)),
            Err(Error::KeyNotFound) => {}
            Err(err) => return Err(err),
        }

        // counter starts past the two reserved headers (0 and 1), so
        // the first prefix ever handed out is the header of 2
        let counter = match txn.get(&counter_key()) {
            Ok(data) => frame::decode_header(&data)?.0,
            Err(Error::KeyNotFound) => 1,
            Err(err) => return Err(err),
        };

        let prefix = frame::encode_header(counter + 1);
        txn.set(&counter_key(), &prefix)?;
        txn.set(&key, &prefix)?;
        debug!(bucket = name, prefix = ?prefix, "allocated bucket");

        Ok((Bucket { prefix }, true))
    }

    /// Look up the bucket for `name` without creating it.
    pub fn lookup(txn: &dyn Txn, name: &str) -> Result<Option<Bucket>> {
        if name.is_empty() {
            return Err(Error::EmptyBucketName);
        }
        match txn.get(&name_key(name)) {
            Ok(prefix) => Ok(Some(Bucket { prefix })),
            Err(Error::KeyNotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Build a bucket directly from a known prefix.
    pub(crate) fn from_prefix(prefix: Vec<u8>) -> Bucket {
        Bucket { prefix }
    }

    /// Prefix `key` with this bucket's prefix.
    pub fn prefix(&self, key: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.prefix.len() + key.len());
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(key);
        out
    }

    /// The raw prefix bytes.
    pub fn raw(&self) -> &[u8] {
        &self.prefix
    }

    /// Length of the prefix in bytes.
    pub fn len(&self) -> usize {
        self.prefix.len()
    }

    /// True for the degenerate unallocated bucket.
    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty()
    }

    /// Whether `key` belongs to this bucket.
    ///
    /// Decodes the key's own length header and byte-compares it against
    /// the prefix; undecodable or foreign keys are simply not valid,
    /// which is what lets a scan walk off the end of a bucket and stop.
    pub fn valid(&self, key: &[u8]) -> bool {
        match frame::decode_header(key) {
            Ok((_, header_len)) => key[..header_len] == self.prefix[..],
            Err(_) => false,
        }
    }

    /// Delete every key in this bucket.
    pub fn clear(&self, txn: &mut dyn Txn) -> Result<()> {
        let mut keys = Vec::new();
        txn.iterate(false, &self.prefix, &mut |key| {
            if !self.valid(key) {
                return Ok(IterFlow::Stop);
            }
            keys.push(key.to_vec());
            Ok(IterFlow::Continue)
        })?;
        for key in keys {
            txn.delete(&key)?;
        }
        Ok(())
    }

    /// Clear the bucket and remove its name mapping.
    ///
    /// The prefix itself is never reused; the counter only moves
    /// forward.
    pub fn drop_named(txn: &mut dyn Txn, name: &str) -> Result<()> {
        if let Some(bucket) = Bucket::lookup(txn, name)? {
            bucket.clear(txn)?;
            txn.delete(&name_key(name))?;
        }
        Ok(())
    }
}
