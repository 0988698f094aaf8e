//! Row scanning over the ordered store
//!
//! A [`RowIterator`] walks one hashed partition in key order. Static rows
//! (empty range section) surface before the regular rows of the same
//! partition because the group terminator sorts before every component tag;
//! the read engine relies on that ordering when it joins static columns in.

use std::collections::VecDeque;

use tracing::trace;

use dockv_core::{
    prefix_successor, ColumnId, DocKey, ReadHybridTime, Result, RestartReadHt, SubDocument, SubKey,
};
use dockv_storage::{get_sub_document, DocStore, SubDocReadRequest};

use crate::row::Row;
use crate::schema::{ColumnKind, Schema};

/// One materialized row from a scan.
#[derive(Debug, Clone)]
pub struct ScannedRow {
    /// Encoded document key of the row.
    pub key: Vec<u8>,
    /// True for the partition's static row.
    pub is_static: bool,
    /// Key columns plus projected value columns.
    pub row: Row,
}

/// Iterates the live rows of one hashed partition.
pub struct RowIterator<'a, S: DocStore> {
    store: &'a S,
    schema: &'a Schema,
    projection: Vec<ColumnId>,
    read: ReadHybridTime,
    row_keys: VecDeque<Vec<u8>>,
}

impl<'a, S: DocStore> RowIterator<'a, S> {
    /// Builds an iterator over every row whose key starts with
    /// `hash_prefix`, optionally resuming from `start_key`.
    pub fn new(
        store: &'a S,
        schema: &'a Schema,
        hash_prefix: &[u8],
        start_key: Option<&[u8]>,
        projection: Vec<ColumnId>,
        read: ReadHybridTime,
        restart: &mut RestartReadHt,
    ) -> Result<Self> {
        let lower = start_key.unwrap_or(hash_prefix).to_vec();
        let upper = prefix_successor(hash_prefix);
        let entries = store.scan_visible(&lower, upper.as_deref(), read, restart)?;
        // Row keys are prefix-free, so each row's entries are contiguous and
        // consecutive dedup is enough.
        let mut row_keys: VecDeque<Vec<u8>> = VecDeque::new();
        for (key, _) in entries {
            let len = DocKey::encoded_len(&key)?;
            let row_key = &key[..len];
            if row_keys.back().map(Vec::as_slice) != Some(row_key) {
                row_keys.push_back(row_key.to_vec());
            }
        }
        trace!(candidates = row_keys.len(), "partition scan");
        Ok(RowIterator { store, schema, projection, read, row_keys })
    }

    /// True when a candidate row key remains.
    pub fn has_next(&self) -> bool {
        !self.row_keys.is_empty()
    }

    /// Key of the next candidate row, used for paging state.
    pub fn peek_key(&self) -> Option<&[u8]> {
        self.row_keys.front().map(Vec::as_slice)
    }

    /// Materializes the next live row, skipping rows whose entries are all
    /// deleted or expired at the read time.
    pub fn next_row(&mut self, restart: &mut RestartReadHt) -> Result<Option<ScannedRow>> {
        while let Some(row_key) = self.row_keys.pop_front() {
            let req = SubDocReadRequest::new(&row_key, &[]);
            let Some(doc) = get_sub_document(self.store, &req, self.read, restart)? else {
                continue;
            };
            let (doc_key, _) = DocKey::decode(&row_key)?;
            let is_static = doc_key.range.is_empty();
            let mut row = Row::new();
            for (col, val) in self.schema.columns_of(ColumnKind::Hash).zip(&doc_key.hashed) {
                row.set(col.id, key_component_value(val));
            }
            if !is_static {
                for (col, val) in self.schema.columns_of(ColumnKind::Range).zip(&doc_key.range) {
                    row.set(col.id, key_component_value(val));
                }
            }
            for id in &self.projection {
                let col = self.schema.column_by_id(*id)?;
                let belongs_here = match col.kind {
                    ColumnKind::Static => is_static,
                    ColumnKind::Regular => !is_static,
                    ColumnKind::Hash | ColumnKind::Range => continue,
                };
                if !belongs_here {
                    continue;
                }
                if let Some(v) = doc.get_child(&SubKey::ColumnId(*id)) {
                    row.set(*id, v.clone());
                }
            }
            return Ok(Some(ScannedRow { key: row_key, is_static, row }));
        }
        Ok(None)
    }
}

/// Key components materialize as the primitive they encode.
fn key_component_value(sk: &SubKey) -> SubDocument {
    match sk {
        SubKey::String(s) => SubDocument::string(s.clone()),
        SubKey::Int64(v) | SubKey::DescendingInt64(v) | SubKey::ArrayIndex(v) => {
            SubDocument::int64(*v)
        }
        SubKey::Double(d) => SubDocument::double(*d),
        _ => SubDocument::null(),
    }
}

/// Reads one row's columns for a conditional write: key columns from the
/// document key, static columns from the partition's static row, everything
/// else from the row document. Returns `None` when the row does not exist.
pub fn fetch_row<S: DocStore>(
    store: &S,
    schema: &Schema,
    doc_key: &DocKey,
    columns: &[ColumnId],
    read: ReadHybridTime,
    restart: &mut RestartReadHt,
) -> Result<Option<Row>> {
    let pk = doc_key.encode();
    let req = SubDocReadRequest::new(&pk, &[]);
    let Some(doc) = get_sub_document(store, &req, read, restart)? else {
        return Ok(None);
    };
    let static_doc = if schema.has_static_columns() {
        let static_key =
            DocKey { hash_code: doc_key.hash_code, hashed: doc_key.hashed.clone(), range: Vec::new() }
                .encode();
        let req = SubDocReadRequest::new(&static_key, &[]);
        get_sub_document(store, &req, read, restart)?
    } else {
        None
    };

    let mut row = Row::new();
    for (col, val) in schema.columns_of(ColumnKind::Hash).zip(&doc_key.hashed) {
        row.set(col.id, key_component_value(val));
    }
    for (col, val) in schema.columns_of(ColumnKind::Range).zip(&doc_key.range) {
        row.set(col.id, key_component_value(val));
    }
    for id in columns {
        let col = schema.column_by_id(*id)?;
        let source = match col.kind {
            ColumnKind::Static => static_doc.as_ref(),
            ColumnKind::Regular => Some(&doc),
            ColumnKind::Hash | ColumnKind::Range => continue,
        };
        if let Some(v) = source.and_then(|d| d.get_child(&SubKey::ColumnId(*id))) {
            row.set(*id, v.clone());
        }
    }
    Ok(Some(row))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_component_values() {
        assert_eq!(key_component_value(&SubKey::Int64(4)), SubDocument::int64(4));
        assert_eq!(
            key_component_value(&SubKey::String("x".into())),
            SubDocument::string("x")
        );
        assert_eq!(key_component_value(&SubKey::Null), SubDocument::null());
    }
}
