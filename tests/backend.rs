//! The store only asks a backend for the `KvStore`/`Txn` pair, so a
//! wrapper around the reference backend must be able to stand in for
//! it wholesale.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stashdb::{KvStore, Memory, Model, Result, Shape, Store, TxnFn};

/// Delegates everything to `Memory`, counting transactions.
#[derive(Default)]
struct Counted {
    inner: Memory,
    updates: AtomicUsize,
    views: AtomicUsize,
}

impl KvStore for Counted {
    fn run(&self, update: bool, f: &mut TxnFn<'_>) -> Result<()> {
        if update {
            self.updates.fetch_add(1, Ordering::Relaxed);
        } else {
            self.views.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.run(update, f)
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Note {
    text: String,
}

impl Model for Note {
    fn anchor() -> &'static str {
        "backend.Note"
    }
    fn shape() -> Shape {
        Shape::Composite(vec![("text", Shape::Scalar("String"))])
    }
}

#[test]
fn custom_backend_carries_a_full_store() {
    let backend = Arc::new(Counted::default());
    let store = Store::open(backend.clone());

    let notes = store.map::<Note>().unwrap();
    notes.set("a", &Note { text: "hi".into() }).unwrap();
    assert_eq!(notes.get("a").unwrap().text, "hi");

    assert!(backend.updates.load(Ordering::Relaxed) > 0);
    assert!(backend.views.load(Ordering::Relaxed) > 0);
}
