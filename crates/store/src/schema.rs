//! Type identity, shape fingerprints and schema migration.
//!
//! Every stored payload is tagged with a version marker derived from a
//! structural fingerprint of the record's shape. Fields are
//! canonicalized (sorted by name, nested shapes rendered recursively)
//! before hashing, so two independently written descriptions of the
//! same logical shape fingerprint identically regardless of field
//! declaration order.
//!
//! When a payload written by an older shape is read through a newer
//! type, the decoder walks the type's migration chain backward until it
//! finds the shape whose fingerprint matches the stored marker, decodes
//! there, and folds the value forward step by step. The caller learns
//! this happened through [`Decoded::Migrated`] and may rewrite the
//! record in current form.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use stash_core::{Error, Result};
use std::fmt;

/// Structural description of a record shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// A leaf type, named (`"i64"`, `"String"`, ...)
    Scalar(&'static str),
    /// A struct: field name and shape pairs, any declaration order
    Composite(Vec<(&'static str, Shape)>),
    /// A growable sequence of one element shape
    Seq(Box<Shape>),
    /// A fixed-length array
    Array(usize, Box<Shape>),
    /// A mapping from key shape to value shape
    Map(Box<Shape>, Box<Shape>),
}

impl Shape {
    /// Canonical rendering: composite fields sorted by name, nested
    /// shapes indented by level. Equal logical shapes render equal.
    fn render(&self, out: &mut String, level: usize) {
        match self {
            Shape::Scalar(name) => out.push_str(name),
            Shape::Composite(fields) => {
                let mut rendered: Vec<String> = fields
                    .iter()
                    .map(|(name, shape)| {
                        let mut s = String::new();
                        shape.render(&mut s, level + 1);
                        format!("{name} {s}")
                    })
                    .collect();
                rendered.sort();
                out.push('{');
                for field in &rendered {
                    newline(out, level + 1);
                    out.push_str(field);
                }
                newline(out, level);
                out.push('}');
            }
            Shape::Seq(elem) => elem.render(out, level),
            Shape::Array(len, elem) => {
                out.push_str(&format!("[{len}]"));
                elem.render(out, level);
            }
            Shape::Map(key, value) => {
                out.push('[');
                key.render(out, level);
                out.push(']');
                value.render(out, level);
            }
        }
    }

    fn canonical(&self) -> String {
        let mut out = String::new();
        self.render(&mut out, 0);
        out
    }
}

fn newline(out: &mut String, level: usize) {
    out.push('\n');
    for _ in 0..level {
        out.push_str("    ");
    }
}

/// Hash of a shape history, truncated to 16 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    /// Fingerprint a shape history: the current shape first, then each
    /// ancestor reachable through migrations.
    pub fn of(history: &[Shape]) -> Fingerprint {
        let mut hasher = Sha256::new();
        for shape in history {
            hasher.update(shape.canonical().as_bytes());
        }
        let digest = hasher.finalize();
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest[..16]);
        Fingerprint(out)
    }

    /// Raw fingerprint bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex form, used as the version bucket name.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

/// A record type storable in a map or list.
///
/// The two required items are [`Model::anchor`] (a name that stays
/// stable across renames) and [`Model::shape`]. Everything else has a
/// default: bodies go through the general object serializer, ids are
/// random, and the migration chain is empty.
///
/// Migratable types override [`Model::shape_history`] and
/// [`Model::decode_from`] by delegating to the [`migrate`] helpers;
/// see [`Migrate`].
pub trait Model: Serialize + DeserializeOwned + 'static {
    /// Stable identity for this shape, independent of the Rust path.
    fn anchor() -> &'static str;

    /// Structural description of the current shape.
    fn shape() -> Shape;

    /// This shape plus every ancestor shape, newest first.
    fn shape_history() -> Vec<Shape> {
        vec![Self::shape()]
    }

    /// Decode a body written `depth` steps back in the migration chain
    /// and fold it forward into the current shape.
    fn decode_from(depth: usize, body: &[u8]) -> Result<Self> {
        if depth == 0 {
            Self::decode_body(body)
        } else {
            Err(Error::NotMigratable {
                anchor: Self::anchor(),
            })
        }
    }

    /// Serialize the record body. Override for a custom wire format.
    fn encode_body(&self) -> Result<Vec<u8>> {
        Ok(stash_core::to_bytes(self)?)
    }

    /// Deserialize the record body. Override together with
    /// [`Model::encode_body`].
    fn decode_body(data: &[u8]) -> Result<Self> {
        Ok(stash_core::from_bytes(data)?)
    }

    /// Caller-supplied record id; `None` falls back to a random
    /// 12-byte id on `List::add`.
    fn unique_id(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Capability marking a model as migratable from an older shape.
///
/// Implementors must also wire the chain into their [`Model`] impl:
///
/// ```ignore
/// impl Model for UserV2 {
///     fn anchor() -> &'static str { "User" }
///     fn shape() -> Shape { /* ... */ }
///     fn shape_history() -> Vec<Shape> { migrate::history::<Self>() }
///     fn decode_from(depth: usize, body: &[u8]) -> Result<Self> {
///         migrate::decode_from::<Self>(depth, body)
///     }
/// }
/// ```
pub trait Migrate: Model {
    /// The previous shape in the chain.
    type Precedent: Model;

    /// Upgrade a decoded ancestor value into the current shape.
    fn migrate(prev: Self::Precedent) -> Self;
}

/// Chain-walking helpers for [`Migrate`] implementors.
pub mod migrate {
    use super::{Migrate, Model, Shape};
    use stash_core::Result;

    /// Shape history of a migratable type: its own shape followed by
    /// the precedent's full history. Finite and acyclic by
    /// construction, since every step names a distinct concrete type.
    pub fn history<T: Migrate>() -> Vec<Shape> {
        let mut shapes = vec![T::shape()];
        shapes.extend(<T::Precedent as Model>::shape_history());
        shapes
    }

    /// Decode at `depth` ancestors back, then fold forward through
    /// each `migrate` step until the value has the current shape.
    pub fn decode_from<T: Migrate>(depth: usize, body: &[u8]) -> Result<T> {
        if depth == 0 {
            T::decode_body(body)
        } else {
            let prev = <T::Precedent as Model>::decode_from(depth - 1, body)?;
            Ok(T::migrate(prev))
        }
    }
}

/// Identity of a record type: anchor plus the fingerprint of every
/// shape in its lineage.
///
/// `lineage[k]` is the fingerprint the k-th ancestor had back when it
/// was the current shape, which is exactly the marker its payloads were
/// written under.
#[derive(Debug, Clone)]
pub struct TypeIdentity {
    /// Stable shape name.
    pub anchor: &'static str,
    /// Fingerprints for each chain depth, newest first.
    pub lineage: Vec<Fingerprint>,
}

impl TypeIdentity {
    /// Compute the identity of a model type. Done once per concrete type per
    /// store; the result never changes at runtime.
    pub fn of<T: Model>() -> TypeIdentity {
        let history = T::shape_history();
        let lineage = (0..history.len())
            .map(|depth| Fingerprint::of(&history[depth..]))
            .collect();
        TypeIdentity {
            anchor: T::anchor(),
            lineage,
        }
    }

    /// Fingerprint of the current shape.
    pub fn current(&self) -> &Fingerprint {
        &self.lineage[0]
    }
}

/// Outcome of decoding a versioned payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    /// Payload was written by the current shape
    Fresh(T),
    /// Payload was written by an ancestor and migrated forward; the
    /// caller should consider rewriting it in current form
    Migrated(T),
}

impl<T> Decoded<T> {
    /// Unwrap the decoded value, discarding the migration signal.
    pub fn into_inner(self) -> T {
        match self {
            Decoded::Fresh(value) | Decoded::Migrated(value) => value,
        }
    }

    /// True when the payload needed migration.
    pub fn is_migrated(&self) -> bool {
        matches!(self, Decoded::Migrated(_))
    }
}

/// Frame a record body with its version marker.
pub fn encode_payload<T: Model>(item: &T, version: &[u8]) -> Result<Vec<u8>> {
    let body = item.encode_body()?;
    Ok(stash_core::frame::encode_pair(version, &body))
}

/// Split a versioned payload and decode it through the migration
/// chain.
///
/// `lineage_ids[k]` is the version marker for chain depth `k`, or
/// `None` when that marker was never allocated in this store (in which
/// case no stored payload can carry it).
pub fn decode_payload<T: Model>(
    payload: &[u8],
    lineage_ids: &[Option<Vec<u8>>],
) -> Result<Decoded<T>> {
    let (version, body) = stash_core::frame::decode_pair(payload)?;
    let depth = lineage_ids
        .iter()
        .position(|id| id.as_deref() == Some(version))
        .ok_or(Error::NotMigratable {
            anchor: T::anchor(),
        })?;
    let item = T::decode_from(depth, body)?;
    Ok(if depth == 0 {
        Decoded::Fresh(item)
    } else {
        Decoded::Migrated(item)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct UserV1 {
        name: String,
    }

    impl Model for UserV1 {
        fn anchor() -> &'static str {
            "tests.UserV1"
        }
        fn shape() -> Shape {
            Shape::Composite(vec![("name", Shape::Scalar("String"))])
        }
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct UserV2 {
        name: String,
        level: i64,
    }

    impl Model for UserV2 {
        fn anchor() -> &'static str {
            "tests.User"
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
        fn decode_from(depth: usize, body: &[u8]) -> Result<Self> {
            migrate::decode_from::<Self>(depth, body)
        }
    }

    impl Migrate for UserV2 {
        type Precedent = UserV1;
        fn migrate(prev: UserV1) -> Self {
            UserV2 {
                name: prev.name,
                level: 1,
            }
        }
    }

    #[test]
    fn test_fingerprint_ignores_field_order() {
        let a = Shape::Composite(vec![
            ("name", Shape::Scalar("String")),
            ("level", Shape::Scalar("i64")),
        ]);
        let b = Shape::Composite(vec![
            ("level", Shape::Scalar("i64")),
            ("name", Shape::Scalar("String")),
        ]);
        assert_eq!(Fingerprint::of(&[a]), Fingerprint::of(&[b]));
    }

    #[test]
    fn test_fingerprint_sees_nested_shapes() {
        let a = Shape::Composite(vec![("tags", Shape::Seq(Box::new(Shape::Scalar("String"))))]);
        let b = Shape::Composite(vec![("tags", Shape::Seq(Box::new(Shape::Scalar("i64"))))]);
        assert_ne!(Fingerprint::of(&[a]), Fingerprint::of(&[b]));
    }

    #[test]
    fn test_array_and_map_render_distinctly() {
        let array = Shape::Array(4, Box::new(Shape::Scalar("u8")));
        let map = Shape::Map(
            Box::new(Shape::Scalar("String")),
            Box::new(Shape::Scalar("u8")),
        );
        assert_ne!(Fingerprint::of(&[array]), Fingerprint::of(&[map]));
        assert_ne!(
            Fingerprint::of(&[Shape::Array(4, Box::new(Shape::Scalar("u8")))]),
            Fingerprint::of(&[Shape::Array(8, Box::new(Shape::Scalar("u8")))]),
        );
    }

    #[test]
    fn test_lineage_has_ancestor_fingerprints() {
        let identity = TypeIdentity::of::<UserV2>();
        assert_eq!(identity.lineage.len(), 2);
        // depth 1 is exactly the fingerprint UserV1 had when current
        let v1 = TypeIdentity::of::<UserV1>();
        assert_eq!(identity.lineage[1], v1.lineage[0]);
    }

    #[test]
    fn test_decode_fresh() {
        let user = UserV2 {
            name: "jack".into(),
            level: 7,
        };
        let ids = vec![Some(b"v2".to_vec()), Some(b"v1".to_vec())];
        let payload = encode_payload(&user, b"v2").unwrap();
        let decoded = decode_payload::<UserV2>(&payload, &ids).unwrap();
        assert_eq!(decoded, Decoded::Fresh(user));
    }

    #[test]
    fn test_decode_migrates_one_step() {
        let old = UserV1 {
            name: "jack".into(),
        };
        let ids = vec![Some(b"v2".to_vec()), Some(b"v1".to_vec())];
        let payload = encode_payload(&old, b"v1").unwrap();
        let decoded = decode_payload::<UserV2>(&payload, &ids).unwrap();
        assert!(decoded.is_migrated());
        let user = decoded.into_inner();
        assert_eq!(user.name, "jack");
        assert_eq!(user.level, 1);
    }

    #[test]
    fn test_decode_unknown_version_fails() {
        let old = UserV1 {
            name: "jack".into(),
        };
        let ids = vec![Some(b"v2".to_vec()), Some(b"v1".to_vec())];
        let payload = encode_payload(&old, b"v0").unwrap();
        let result = decode_payload::<UserV2>(&payload, &ids);
        assert!(matches!(result, Err(Error::NotMigratable { .. })));
    }

    #[test]
    fn test_chain_exhaustion_without_migrate_impl() {
        // UserV1 has no precedent: depth 1 must fail
        let result = UserV1::decode_from(1, b"");
        assert!(matches!(result, Err(Error::NotMigratable { .. })));
    }
}
