//! Stored value representations
//!
//! A persisted record is a [`Value`]: either a primitive payload or a
//! container init marker, plus the write-level TTL and optional user
//! timestamp. Container *contents* are never stored inline; children live at
//! longer keys and the marker only establishes the container's kind and the
//! time before which older children are obsolete.

use serde::{Deserialize, Serialize};

use crate::time::{Ttl, UserTimestamp};

/// A scalar payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrimitiveValue {
    /// Explicit null (used e.g. for set-membership markers).
    Null,
    /// Deletion marker. Hides every older version beneath it.
    Tombstone,
    /// UTF-8 string.
    String(String),
    /// Signed 64-bit integer.
    Int64(i64),
    /// IEEE-754 double.
    Double(f64),
}

impl PrimitiveValue {
    /// The kind tag for this primitive.
    pub fn kind(&self) -> ValueKind {
        match self {
            PrimitiveValue::Null => ValueKind::Null,
            PrimitiveValue::Tombstone => ValueKind::Tombstone,
            PrimitiveValue::String(_) => ValueKind::String,
            PrimitiveValue::Int64(_) => ValueKind::Int64,
            PrimitiveValue::Double(_) => ValueKind::Double,
        }
    }
}

/// The kind of a container subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerKind {
    /// Generic map from subkey to subdocument. Rows, hashes, and implicit
    /// intermediate levels are all objects.
    Object,
    /// Set of subkeys; member values are null markers.
    Set,
    /// Sorted set held as mirrored forward/reverse maps plus a cardinality
    /// counter.
    SortedSet,
    /// Time series keyed by descending timestamp.
    TimeSeries,
}

/// Discriminates every storable record shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// See [`PrimitiveValue::Null`].
    Null,
    /// See [`PrimitiveValue::Tombstone`].
    Tombstone,
    /// See [`PrimitiveValue::String`].
    String,
    /// See [`PrimitiveValue::Int64`].
    Int64,
    /// See [`PrimitiveValue::Double`].
    Double,
    /// Object init marker.
    Object,
    /// Set init marker.
    Set,
    /// Sorted-set init marker.
    SortedSet,
    /// Time-series init marker.
    TimeSeries,
}

impl ValueKind {
    /// True for the container marker kinds.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            ValueKind::Object | ValueKind::Set | ValueKind::SortedSet | ValueKind::TimeSeries
        )
    }
}

impl From<ContainerKind> for ValueKind {
    fn from(kind: ContainerKind) -> Self {
        match kind {
            ContainerKind::Object => ValueKind::Object,
            ContainerKind::Set => ValueKind::Set,
            ContainerKind::SortedSet => ValueKind::SortedSet,
            ContainerKind::TimeSeries => ValueKind::TimeSeries,
        }
    }
}

/// The payload portion of a stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueBody {
    /// Scalar payload, including tombstones.
    Primitive(PrimitiveValue),
    /// Container init marker of the given kind.
    ContainerMarker(ContainerKind),
}

/// A full stored record: payload plus write metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    /// Payload.
    pub body: ValueBody,
    /// Write-level TTL.
    pub ttl: Ttl,
    /// Optional user timestamp overriding the commit time.
    pub user_timestamp: Option<UserTimestamp>,
}

impl Value {
    /// A primitive value with no TTL and no user timestamp.
    pub fn primitive(p: PrimitiveValue) -> Self {
        Value { body: ValueBody::Primitive(p), ttl: Ttl::UNLIMITED, user_timestamp: None }
    }

    /// A container marker with no TTL and no user timestamp.
    pub fn container(kind: ContainerKind) -> Self {
        Value { body: ValueBody::ContainerMarker(kind), ttl: Ttl::UNLIMITED, user_timestamp: None }
    }

    /// A tombstone with no TTL and no user timestamp.
    pub fn tombstone() -> Self {
        Value::primitive(PrimitiveValue::Tombstone)
    }

    /// Attaches a TTL.
    pub fn with_ttl(mut self, ttl: Ttl) -> Self {
        self.ttl = ttl;
        self
    }

    /// Attaches a user timestamp.
    pub fn with_user_timestamp(mut self, ts: Option<UserTimestamp>) -> Self {
        self.user_timestamp = ts;
        self
    }

    /// The kind tag for this record.
    pub fn kind(&self) -> ValueKind {
        match &self.body {
            ValueBody::Primitive(p) => p.kind(),
            ValueBody::ContainerMarker(k) => ValueKind::from(*k),
        }
    }

    /// True when this record is a deletion marker.
    pub fn is_tombstone(&self) -> bool {
        matches!(self.body, ValueBody::Primitive(PrimitiveValue::Tombstone))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_kind_mapping() {
        assert_eq!(Value::primitive(PrimitiveValue::Int64(3)).kind(), ValueKind::Int64);
        assert_eq!(Value::container(ContainerKind::SortedSet).kind(), ValueKind::SortedSet);
        assert_eq!(Value::tombstone().kind(), ValueKind::Tombstone);
    }

    #[test]
    fn test_container_kinds_are_containers() {
        assert!(ValueKind::Object.is_container());
        assert!(ValueKind::TimeSeries.is_container());
        assert!(!ValueKind::String.is_container());
        assert!(!ValueKind::Tombstone.is_container());
    }

    #[test]
    fn test_tombstone_detection() {
        assert!(Value::tombstone().is_tombstone());
        assert!(!Value::primitive(PrimitiveValue::Null).is_tombstone());
    }
}
