//! Document write batches
//!
//! A [`DocWriteBatch`] turns document-level mutations into flat [`WriteOp`]s,
//! carrying a lookup cache so repeated type probes within one batch see the
//! batch's own pending writes instead of re-reading the store.

use std::sync::atomic::{AtomicI64, Ordering};

use rustc_hash::FxHashMap;
use tracing::trace;

use dockv_core::{
    DocPath, Error, PrimitiveValue, QueryId, ReadHybridTime, RestartReadHt, Result, SubDocument,
    SubKey, Ttl, UserTimestamp, Value, ValueBody, ValueKind,
};

use crate::reader::{get_sub_document, SubDocReadRequest};
use crate::store::{DocStore, WriteOp};

/// List element indexes must grow across batches so later appends sort after
/// earlier ones. Prepends take the negated counter, so they grow downward.
static NEXT_LIST_INDEX: AtomicI64 = AtomicI64::new(1);

/// Which end of a list an extend targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListExtendOrder {
    /// New elements go after every existing element.
    Append,
    /// New elements go before every existing element, keeping their own
    /// relative order.
    Prepend,
}

/// Accumulates writes against a store snapshot.
pub struct DocWriteBatch<'a, S: DocStore> {
    store: &'a S,
    query_id: QueryId,
    ops: Vec<WriteOp>,
    cache: FxHashMap<Vec<u8>, ValueKind>,
}

impl<'a, S: DocStore> DocWriteBatch<'a, S> {
    /// A fresh batch over the given store, with no statement context.
    pub fn new(store: &'a S) -> Self {
        Self::for_query(store, QueryId::ANONYMOUS)
    }

    /// A fresh batch tagged with the statement it executes.
    pub fn for_query(store: &'a S, query_id: QueryId) -> Self {
        DocWriteBatch { store, query_id, ops: Vec::new(), cache: FxHashMap::default() }
    }

    /// The store this batch reads from.
    pub fn store(&self) -> &'a S {
        self.store
    }

    /// Statement this batch belongs to.
    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    /// Kind of the pending write at `key`, if this batch wrote one.
    pub fn cached_kind(&self, key: &[u8]) -> Option<ValueKind> {
        self.cache.get(key).copied()
    }

    /// True when no writes are pending.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of pending writes.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Consumes the batch into its flat write ops.
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    fn push_op(&mut self, key: Vec<u8>, value: Value) {
        trace!(query_id = self.query_id.0, key_len = key.len(), kind = ?value.kind(), "staging write");
        self.cache.insert(key.clone(), value.kind());
        self.ops.push(WriteOp { key, value });
    }

    /// Writes a single primitive record at `path`.
    pub fn set_primitive(&mut self, path: &DocPath, value: Value) -> Result<()> {
        if matches!(value.body, ValueBody::ContainerMarker(_)) {
            return Err(Error::IllegalState(
                "set_primitive cannot write a container marker".to_string(),
            ));
        }
        self.push_op(path.encode(), value);
        Ok(())
    }

    /// Inserts a subdocument wholesale: container levels get init markers,
    /// so everything previously stored beneath `path` becomes obsolete.
    pub fn insert_sub_document(
        &mut self,
        path: &DocPath,
        doc: SubDocument,
        ttl: Ttl,
        user_timestamp: Option<UserTimestamp>,
    ) -> Result<()> {
        match doc {
            SubDocument::Primitive(p) => {
                self.push_op(
                    path.encode(),
                    Value::primitive(p).with_ttl(ttl).with_user_timestamp(user_timestamp),
                );
            }
            SubDocument::Container { kind, entries } => {
                self.push_op(
                    path.encode(),
                    Value::container(kind).with_ttl(ttl).with_user_timestamp(user_timestamp),
                );
                for (sk, child) in entries {
                    self.insert_sub_document(&path.join(sk), child, ttl, user_timestamp)?;
                }
            }
        }
        Ok(())
    }

    /// Merges a subdocument into whatever already exists at `path`: only
    /// leaf entries are written, no markers, so older siblings survive.
    pub fn extend_sub_document(&mut self, path: &DocPath, doc: SubDocument, ttl: Ttl) -> Result<()> {
        match doc {
            SubDocument::Primitive(p) => {
                self.push_op(path.encode(), Value::primitive(p).with_ttl(ttl));
            }
            SubDocument::Container { entries, .. } => {
                for (sk, child) in entries {
                    self.extend_sub_document(&path.join(sk), child, ttl)?;
                }
            }
        }
        Ok(())
    }

    /// Appends or prepends elements to the list at `path`.
    pub fn extend_list(
        &mut self,
        path: &DocPath,
        elements: Vec<SubDocument>,
        order: ListExtendOrder,
        ttl: Ttl,
    ) -> Result<()> {
        trace!(n = elements.len(), ?order, "extending list");
        match order {
            ListExtendOrder::Append => {
                for el in elements {
                    let idx = NEXT_LIST_INDEX.fetch_add(1, Ordering::SeqCst);
                    self.insert_sub_document(&path.join(SubKey::ArrayIndex(idx)), el, ttl, None)?;
                }
            }
            ListExtendOrder::Prepend => {
                // Reversed so the first element ends up closest to the front.
                for el in elements.into_iter().rev() {
                    let idx = -NEXT_LIST_INDEX.fetch_add(1, Ordering::SeqCst);
                    self.insert_sub_document(&path.join(SubKey::ArrayIndex(idx)), el, ttl, None)?;
                }
            }
        }
        Ok(())
    }

    /// Replaces the element at zero-based `target_index` of the list at
    /// `path`, reading the current list at `read` to find its storage index.
    pub fn replace_in_list(
        &mut self,
        path: &DocPath,
        target_index: usize,
        value: SubDocument,
        read: ReadHybridTime,
        restart: &mut RestartReadHt,
        ttl: Ttl,
    ) -> Result<()> {
        let encoded_doc_key = &path.encoded_doc_key;
        let req = SubDocReadRequest::new(encoded_doc_key, &path.subkeys).for_query(self.query_id);
        let current = get_sub_document(self.store, &req, read, restart)?;
        let entries = current.and_then(|doc| doc.into_entries()).unwrap_or_default();
        let mut seen = 0usize;
        for sk in entries.keys() {
            if matches!(sk, SubKey::ArrayIndex(_)) {
                if seen == target_index {
                    return self.insert_sub_document(&path.join(sk.clone()), value, ttl, None);
                }
                seen += 1;
            }
        }
        Err(Error::IndexOutOfBounds(format!(
            "index {target_index} in list of {seen}"
        )))
    }

    /// Writes a tombstone at `path`, deleting the subdocument there.
    pub fn delete(&mut self, path: &DocPath, user_timestamp: Option<UserTimestamp>) -> Result<()> {
        self.push_op(path.encode(), Value::tombstone().with_user_timestamp(user_timestamp));
        Ok(())
    }

    /// Writes a null liveness marker, used to keep a row alive independently
    /// of its user columns.
    pub fn set_liveness(&mut self, path: &DocPath, ttl: Ttl, user_timestamp: Option<UserTimestamp>) -> Result<()> {
        self.push_op(
            path.encode(),
            Value::primitive(PrimitiveValue::Null)
                .with_ttl(ttl)
                .with_user_timestamp(user_timestamp),
        );
        Ok(())
    }
}
