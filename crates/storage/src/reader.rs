//! Subdocument materialization
//!
//! [`get_sub_document`] reconstructs the subdocument at a key from the flat
//! store, applying the layering rules that make documents behave like trees:
//!
//! - an init marker obsoletes every strictly older entry beneath it, so a
//!   wholesale insert replaces the previous contents;
//! - a tombstone hides strictly older entries beneath it, while newer child
//!   writes resurrect the path as an implicit object;
//! - a version past its TTL behaves exactly like a tombstone;
//! - entries written with no enclosing marker (column writes, merges) hang
//!   off implicit objects.
//!
//! Obsolescence thresholds are carried as a "gate" hybrid time: while
//! descending, the gate is the maximum write time of every enclosing marker,
//! tombstone, or overwritten entry, and a child survives only if its own
//! write time is at or above the gate.

use std::collections::BTreeMap;
use std::ops::Bound;

use tracing::trace;

use dockv_core::{
    prefix_successor, ContainerKind, Error, HybridTime, QueryId, ReadHybridTime, RestartReadHt,
    Result, SubDocument, SubKey, Value, ValueBody,
};

use crate::store::{DocStore, VersionedValue};

/// What to materialize and how much of it.
#[derive(Debug, Clone)]
pub struct SubDocReadRequest<'a> {
    /// Encoded document key.
    pub doc_key: &'a [u8],
    /// Subkeys from the document root down to the read target.
    pub subkeys: &'a [SubKey],
    /// Lower bound on direct children of the target.
    pub low: Bound<SubKey>,
    /// Upper bound on direct children of the target.
    pub high: Bound<SubKey>,
    /// When set, only resolve the target's kind: primitives come back as
    /// themselves, containers as empty containers, and no children are read.
    pub return_type_only: bool,
    /// Statement this read belongs to, carried into trace events.
    pub query_id: QueryId,
}

impl<'a> SubDocReadRequest<'a> {
    /// Unbounded read of the subdocument at `doc_key` + `subkeys`.
    pub fn new(doc_key: &'a [u8], subkeys: &'a [SubKey]) -> Self {
        SubDocReadRequest {
            doc_key,
            subkeys,
            low: Bound::Unbounded,
            high: Bound::Unbounded,
            return_type_only: false,
            query_id: QueryId::ANONYMOUS,
        }
    }

    /// Tags the read with the statement it belongs to.
    pub fn for_query(mut self, query_id: QueryId) -> Self {
        self.query_id = query_id;
        self
    }

    /// Restricts the range of direct children materialized under the target.
    pub fn with_bounds(mut self, low: Bound<SubKey>, high: Bound<SubKey>) -> Self {
        self.low = low;
        self.high = high;
        self
    }

    /// Only resolve the target's kind.
    pub fn type_only(mut self) -> Self {
        self.return_type_only = true;
        self
    }

    fn target_key(&self) -> Vec<u8> {
        let mut key = self.doc_key.to_vec();
        for sk in self.subkeys {
            sk.encode_into(&mut key);
        }
        key
    }
}

#[derive(Default)]
struct RawNode {
    entry: Option<VersionedValue>,
    children: BTreeMap<SubKey, RawNode>,
}

/// Materializes the subdocument a request addresses, or `None` when nothing
/// visible exists there.
pub fn get_sub_document<S: DocStore>(
    store: &S,
    req: &SubDocReadRequest<'_>,
    read: ReadHybridTime,
    restart: &mut RestartReadHt,
) -> Result<Option<SubDocument>> {
    // Ancestor pass: every enclosing level's entry raises the gate, whether
    // it is a marker, a tombstone, or an overwritten primitive.
    let mut gate = HybridTime::MIN;
    let mut prefix = req.doc_key.to_vec();
    for sk in req.subkeys {
        if let Some(vv) = store.latest_visible(&prefix, read, restart)? {
            gate = gate.max(vv.write_time);
        }
        sk.encode_into(&mut prefix);
    }
    let target = prefix;

    let mut root = RawNode {
        entry: store
            .latest_visible(&target, read, restart)?
            .filter(|vv| vv.write_time >= gate),
        children: BTreeMap::new(),
    };

    if req.return_type_only {
        let doc = match root.entry {
            Some(vv) if !vv.is_dead_at(read.read) => Some(match vv.value.body {
                ValueBody::Primitive(p) => SubDocument::Primitive(p),
                ValueBody::ContainerMarker(kind) => SubDocument::container(kind),
            }),
            _ => None,
        };
        return Ok(doc);
    }

    let lower = match &req.low {
        Bound::Unbounded => {
            // Children have strictly longer keys; 0x00 sorts before every
            // component tag.
            let mut k = target.clone();
            k.push(0x00);
            k
        }
        Bound::Included(sk) => {
            let mut k = target.clone();
            sk.encode_into(&mut k);
            k
        }
        Bound::Excluded(sk) => {
            let mut k = target.clone();
            sk.encode_into(&mut k);
            match prefix_successor(&k) {
                Some(succ) => succ,
                None => return finish(root, gate, read.read),
            }
        }
    };
    let upper = match &req.high {
        Bound::Unbounded => prefix_successor(&target),
        Bound::Included(sk) => {
            let mut k = target.clone();
            sk.encode_into(&mut k);
            prefix_successor(&k)
        }
        Bound::Excluded(sk) => {
            let mut k = target.clone();
            sk.encode_into(&mut k);
            Some(k)
        }
    };

    let entries = store.scan_visible(&lower, upper.as_deref(), read, restart)?;
    trace!(
        query_id = req.query_id.0,
        target_len = target.len(),
        n = entries.len(),
        "materializing subdocument"
    );
    for (key, vv) in entries {
        let mut suffix = &key[target.len()..];
        let mut node = &mut root;
        while !suffix.is_empty() {
            let (sk, rest) = SubKey::decode(suffix).map_err(|e| {
                Error::Corruption(format!("bad subkey under document prefix: {e}"))
            })?;
            suffix = rest;
            node = node.children.entry(sk).or_default();
        }
        node.entry = Some(vv);
    }

    finish(root, gate, read.read)
}

fn finish(root: RawNode, gate: HybridTime, read: HybridTime) -> Result<Option<SubDocument>> {
    Ok(materialize(root, gate, read))
}

fn materialize(raw: RawNode, gate: HybridTime, read: HybridTime) -> Option<SubDocument> {
    let (alive_body, child_gate) = match raw.entry {
        Some(vv) if vv.write_time >= gate => {
            let child_gate = gate.max(vv.write_time);
            if vv.is_dead_at(read) {
                (None, child_gate)
            } else {
                (Some(vv.value.body), child_gate)
            }
        }
        _ => (None, gate),
    };

    let children: BTreeMap<SubKey, SubDocument> = raw
        .children
        .into_iter()
        .filter_map(|(sk, child)| materialize(child, child_gate, read).map(|doc| (sk, doc)))
        .collect();

    match alive_body {
        Some(ValueBody::ContainerMarker(kind)) => {
            Some(SubDocument::Container { kind, entries: children })
        }
        Some(ValueBody::Primitive(p)) => {
            if children.is_empty() {
                Some(SubDocument::Primitive(p))
            } else {
                // Newer child writes overwrote this primitive in place.
                Some(SubDocument::Container { kind: ContainerKind::Object, entries: children })
            }
        }
        None => {
            if children.is_empty() {
                None
            } else {
                // Implicit object: children exist with no enclosing marker.
                Some(SubDocument::Container { kind: ContainerKind::Object, entries: children })
            }
        }
    }
}
