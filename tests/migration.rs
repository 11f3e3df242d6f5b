//! Records written by an older shape decode through the migration
//! chain, get rewritten in current form on read, and drag their index
//! entries along.

use serde::{Deserialize, Serialize};
use stashdb::{migrate, Error, Migrate, Model, Shape, Store};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct UserV1 {
    name: String,
}

impl Model for UserV1 {
    fn anchor() -> &'static str {
        "migration.User"
    }
    fn shape() -> Shape {
        Shape::Composite(vec![("name", Shape::Scalar("String"))])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct UserV2 {
    name: String,
    level: i64,
}

impl Model for UserV2 {
    fn anchor() -> &'static str {
        "migration.User"
    }
    fn shape() -> Shape {
        Shape::Composite(vec![
            ("name", Shape::Scalar("String")),
            ("level", Shape::Scalar("i64")),
        ])
    }
    fn shape_history() -> Vec<Shape> {
        migrate::history::<Self>()
    }
    fn decode_from(depth: usize, body: &[u8]) -> stashdb::Result<Self> {
        migrate::decode_from::<Self>(depth, body)
    }
}

impl Migrate for UserV2 {
    type Precedent = UserV1;

    fn migrate(prev: UserV1) -> UserV2 {
        UserV2 {
            name: prev.name,
            level: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct UserV3 {
    name: String,
    level: i64,
    tags: Vec<String>,
}

impl Model for UserV3 {
    fn anchor() -> &'static str {
        "migration.User"
    }
    fn shape() -> Shape {
        Shape::Composite(vec![
            ("name", Shape::Scalar("String")),
            ("level", Shape::Scalar("i64")),
            ("tags", Shape::Seq(Box::new(Shape::Scalar("String")))),
        ])
    }
    fn shape_history() -> Vec<Shape> {
        migrate::history::<Self>()
    }
    fn decode_from(depth: usize, body: &[u8]) -> stashdb::Result<Self> {
        migrate::decode_from::<Self>(depth, body)
    }
}

impl Migrate for UserV3 {
    type Precedent = UserV2;

    fn migrate(prev: UserV2) -> UserV3 {
        UserV3 {
            name: prev.name,
            level: prev.level,
            tags: Vec::new(),
        }
    }
}

#[test]
fn two_step_chain_folds_forward() {
    let store = Store::in_memory();
    let old = store.map::<UserV1>().unwrap();
    old.set("jack", &UserV1 { name: "jack".into() }).unwrap();

    let current = store.map::<UserV3>().unwrap();
    let jack = current.get("jack").unwrap();
    assert_eq!(
        jack,
        UserV3 {
            name: "jack".into(),
            level: 1,
            tags: vec![],
        }
    );
}

#[test]
fn write_back_happens_once_in_update_transactions() {
    let store = Store::in_memory();
    let old = store.map::<UserV1>().unwrap();
    old.set("jack", &UserV1 { name: "jack".into() }).unwrap();

    let current = store.map::<UserV3>().unwrap();
    store
        .update(|txn| {
            let (_, migrated) = current.txn(txn).get_traced(b"jack")?;
            assert!(migrated);
            let (_, migrated) = current.txn(txn).get_traced(b"jack")?;
            assert!(!migrated);
            Ok(())
        })
        .unwrap();

    // and it stuck across transactions
    store
        .update(|txn| {
            let (_, migrated) = current.txn(txn).get_traced(b"jack")?;
            assert!(!migrated);
            Ok(())
        })
        .unwrap();
}

#[test]
fn read_only_lookup_does_not_persist_the_rewrite() {
    let store = Store::in_memory();
    let old = store.map::<UserV1>().unwrap();
    old.set("jack", &UserV1 { name: "jack".into() }).unwrap();

    let current = store.map::<UserV3>().unwrap();
    // sugar get runs in a view transaction
    current.get("jack").unwrap();

    store
        .update(|txn| {
            let (_, migrated) = current.txn(txn).get_traced(b"jack")?;
            assert!(migrated);
            Ok(())
        })
        .unwrap();
}

#[test]
fn migrated_read_refreshes_indexes() {
    let store = Store::in_memory();

    let mut old = store.list::<UserV1>().unwrap();
    old.index("level", |_: &UserV1| 0i64).unwrap();
    let id = old
        .add(&UserV1 { name: "jack".into() })
        .unwrap();

    let mut current = store.list::<UserV3>().unwrap();
    let level = current.index("level", |u: &UserV3| u.level).unwrap();

    store
        .update(|txn| {
            current.txn(txn).get(&id)?;
            Ok(())
        })
        .unwrap();

    assert!(matches!(level.from(&0i64).find_one(), Err(Error::NotFound)));
    assert_eq!(level.from(&1i64).find_one().unwrap().name, "jack");
}

#[test]
fn unknown_version_is_rejected() {
    // a chain that does not reach back to V1
    #[derive(Debug, Serialize, Deserialize)]
    struct Shallow {
        name: String,
        level: i64,
        tags: Vec<String>,
    }
    impl Model for Shallow {
        fn anchor() -> &'static str {
            "migration.User"
        }
        fn shape() -> Shape {
            UserV3::shape()
        }
    }

    let store = Store::in_memory();
    let old = store.map::<UserV1>().unwrap();
    old.set("jack", &UserV1 { name: "jack".into() }).unwrap();

    let shallow = store.map::<Shallow>().unwrap();
    assert!(matches!(
        shallow.get("jack"),
        Err(Error::NotMigratable { .. })
    ));
}
