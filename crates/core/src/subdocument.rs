//! In-memory subdocument trees
//!
//! A [`SubDocument`] is what reads materialize and writes describe: either a
//! primitive or a container of children keyed by [`SubKey`]. Children are
//! held in a `BTreeMap`, so iteration order equals encoded-key order and a
//! materialized tree enumerates exactly as a storage scan would.

use std::collections::BTreeMap;

use crate::encoding::SubKey;
use crate::error::{Error, Result};
use crate::value::{ContainerKind, PrimitiveValue, ValueKind};

/// A materialized document fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum SubDocument {
    /// Leaf value.
    Primitive(PrimitiveValue),
    /// Container with ordered children.
    Container {
        /// What flavor of container this subtree is.
        kind: ContainerKind,
        /// Children in encoded-subkey order.
        entries: BTreeMap<SubKey, SubDocument>,
    },
}

impl Default for SubDocument {
    fn default() -> Self {
        SubDocument::object()
    }
}

impl SubDocument {
    /// An empty object.
    pub fn object() -> Self {
        SubDocument::Container { kind: ContainerKind::Object, entries: BTreeMap::new() }
    }

    /// An empty container of the given kind.
    pub fn container(kind: ContainerKind) -> Self {
        SubDocument::Container { kind, entries: BTreeMap::new() }
    }

    /// A string leaf.
    pub fn string(s: impl Into<String>) -> Self {
        SubDocument::Primitive(PrimitiveValue::String(s.into()))
    }

    /// An integer leaf.
    pub fn int64(v: i64) -> Self {
        SubDocument::Primitive(PrimitiveValue::Int64(v))
    }

    /// A double leaf.
    pub fn double(v: f64) -> Self {
        SubDocument::Primitive(PrimitiveValue::Double(v))
    }

    /// A null leaf.
    pub fn null() -> Self {
        SubDocument::Primitive(PrimitiveValue::Null)
    }

    /// A tombstone leaf, used by writes to delete a subtree.
    pub fn tombstone() -> Self {
        SubDocument::Primitive(PrimitiveValue::Tombstone)
    }

    /// The kind tag of this fragment.
    pub fn value_kind(&self) -> ValueKind {
        match self {
            SubDocument::Primitive(p) => p.kind(),
            SubDocument::Container { kind, .. } => ValueKind::from(*kind),
        }
    }

    /// True for leaves.
    pub fn is_primitive(&self) -> bool {
        matches!(self, SubDocument::Primitive(_))
    }

    /// Child at `key`, if this is a container holding one.
    pub fn get_child(&self, key: &SubKey) -> Option<&SubDocument> {
        match self {
            SubDocument::Container { entries, .. } => entries.get(key),
            SubDocument::Primitive(_) => None,
        }
    }

    /// Inserts or replaces the child at `key`. A primitive receiver becomes
    /// an object first, the way an implicit intermediate level would.
    pub fn set_child(&mut self, key: SubKey, child: SubDocument) {
        if self.is_primitive() {
            *self = SubDocument::object();
        }
        if let SubDocument::Container { entries, .. } = self {
            entries.insert(key, child);
        }
    }

    /// Mutable child at `key`, creating an empty object there if absent.
    pub fn get_or_add_child(&mut self, key: SubKey) -> &mut SubDocument {
        if self.is_primitive() {
            *self = SubDocument::object();
        }
        match self {
            SubDocument::Container { entries, .. } => {
                entries.entry(key).or_insert_with(SubDocument::object)
            }
            SubDocument::Primitive(_) => unreachable!("receiver was just made a container"),
        }
    }

    /// Number of direct children; zero for leaves.
    pub fn num_children(&self) -> usize {
        match self {
            SubDocument::Container { entries, .. } => entries.len(),
            SubDocument::Primitive(_) => 0,
        }
    }

    /// Children map, if this is a container.
    pub fn entries(&self) -> Option<&BTreeMap<SubKey, SubDocument>> {
        match self {
            SubDocument::Container { entries, .. } => Some(entries),
            SubDocument::Primitive(_) => None,
        }
    }

    /// Consumes this fragment into its children map, if a container.
    pub fn into_entries(self) -> Option<BTreeMap<SubKey, SubDocument>> {
        match self {
            SubDocument::Container { entries, .. } => Some(entries),
            SubDocument::Primitive(_) => None,
        }
    }

    /// Re-tags a container with a different kind, keeping its children.
    /// Fails on leaves.
    pub fn retag(self, new_kind: ContainerKind) -> Result<SubDocument> {
        match self {
            SubDocument::Container { entries, .. } => {
                Ok(SubDocument::Container { kind: new_kind, entries })
            }
            SubDocument::Primitive(p) => Err(Error::IllegalState(format!(
                "cannot retag primitive {:?} as {new_kind:?}",
                p.kind()
            ))),
        }
    }

    /// String payload, if this is a string leaf.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            SubDocument::Primitive(PrimitiveValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Integer payload, if this is an integer leaf.
    pub fn as_int64(&self) -> Option<i64> {
        match self {
            SubDocument::Primitive(PrimitiveValue::Int64(v)) => Some(*v),
            _ => None,
        }
    }

    /// Double payload, if this is a double leaf.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            SubDocument::Primitive(PrimitiveValue::Double(v)) => Some(*v),
            _ => None,
        }
    }
}
