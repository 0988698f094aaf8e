//! Structured write operations
//!
//! A [`WriteOperation`] turns one INSERT, UPDATE, or DELETE statement into
//! document mutations staged in a [`DocWriteBatch`]. Conditional statements
//! read the current row first and report `applied` plus the pre-image of the
//! condition's columns when the condition fails against an existing row.

use tracing::{debug, trace};

use dockv_core::{
    ColumnId, DocKey, DocPath, Error, IsolationLevel, Result, SubDocument, SubKey, SystemColumnId,
    Ttl, UserTimestamp,
};
use dockv_storage::{get_sub_document, DocStore, ListExtendOrder, SubDocReadRequest};

use crate::context::ApplyContext;
use crate::expression::Condition;
use crate::row::Row;
use crate::scan::{fetch_row, RowIterator};
use crate::schema::{ColumnKind, Schema};

/// Statement variant of a structured write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Writes columns and a liveness marker so an otherwise empty row exists.
    Insert,
    /// Writes columns only.
    Update,
    /// Deletes columns, a row, or a predicate-matched range of rows.
    Delete,
}

/// What to do to one target column.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteAction {
    /// Replace the column's value wholesale.
    Set(SubDocument),
    /// Merge entries into a map or set, keeping unmentioned entries.
    Extend(SubDocument),
    /// Remove the given map keys or set members.
    Remove(Vec<SubKey>),
    /// Append elements to a list.
    ListAppend(Vec<SubDocument>),
    /// Prepend elements to a list, preserving their given order.
    ListPrepend(Vec<SubDocument>),
    /// Replace the list element at a zero-based position.
    ListReplace {
        /// Zero-based position within the visible list.
        index: usize,
        /// Replacement element.
        value: SubDocument,
    },
    /// Remove every list element equal to one of the given values.
    ListRemove(Vec<SubDocument>),
    /// Set one map cell, `map[key] = value`.
    SubKeySet {
        /// Map key addressed by the subscript.
        subkey: SubKey,
        /// Value to store at that key.
        value: SubDocument,
    },
    /// Tombstone the column.
    Delete,
}

impl WriteAction {
    /// Partial merges change part of a stored value. A caller-supplied write
    /// timestamp is only meaningful for whole-value replacement, so merges
    /// reject it.
    fn is_partial_merge(&self) -> bool {
        matches!(
            self,
            WriteAction::Extend(_)
                | WriteAction::Remove(_)
                | WriteAction::ListAppend(_)
                | WriteAction::ListPrepend(_)
                | WriteAction::ListReplace { .. }
                | WriteAction::ListRemove(_)
        )
    }

    fn needs_read(&self) -> bool {
        matches!(self, WriteAction::ListReplace { .. } | WriteAction::ListRemove(_))
    }
}

/// One column-level mutation within a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnWrite {
    /// Target column.
    pub column: ColumnId,
    /// Mutation to apply to it.
    pub action: WriteAction,
}

/// One structured write statement.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    /// Statement variant.
    pub kind: WriteKind,
    /// Values for every hash column, in schema order.
    pub hashed_values: Vec<SubKey>,
    /// Values for the range columns, in schema order. A DELETE may leave
    /// these incomplete to address a range of rows.
    pub range_values: Vec<SubKey>,
    /// Per-column mutations.
    pub column_writes: Vec<ColumnWrite>,
    /// IF-clause evaluated against the current row.
    pub condition: Option<Condition>,
    /// Residual predicate of a range-targeted DELETE.
    pub where_condition: Option<Condition>,
    /// Time to live for the written values.
    pub ttl: Ttl,
    /// Caller-supplied write timestamp, replacing the commit time.
    pub user_timestamp: Option<UserTimestamp>,
}

/// Outcome of a structured write.
#[derive(Debug, Clone, Default)]
pub struct WriteResponse {
    /// False when an IF-clause did not hold; nothing was written.
    pub applied: bool,
    /// Pre-image of the condition's columns when the condition failed and
    /// the row existed.
    pub row: Option<Row>,
    /// A recoverable statement error, such as a bad list index.
    pub usage_error: Option<String>,
}

impl WriteResponse {
    fn applied() -> Self {
        WriteResponse { applied: true, row: None, usage_error: None }
    }

    fn rejected(row: Option<Row>) -> Self {
        WriteResponse { applied: false, row, usage_error: None }
    }

    fn usage(message: String) -> Self {
        WriteResponse { applied: false, row: None, usage_error: Some(message) }
    }
}

/// A validated write statement bound to a schema.
pub struct WriteOperation<'s> {
    schema: &'s Schema,
    request: WriteRequest,
    doc_key: DocKey,
    static_key: Option<DocKey>,
}

impl<'s> WriteOperation<'s> {
    /// Validates the request against the schema and precomputes the primary
    /// and static document keys.
    pub fn new(schema: &'s Schema, request: WriteRequest) -> Result<Self> {
        if request.hashed_values.len() != schema.num_hash_columns() {
            return Err(Error::InvalidCommand(format!(
                "statement supplies {} hash values for {} hash columns",
                request.hashed_values.len(),
                schema.num_hash_columns()
            )));
        }
        let full_range = request.range_values.len() == schema.num_range_columns();
        if !full_range && request.kind != WriteKind::Delete {
            return Err(Error::InvalidCommand(
                "only DELETE may leave range columns unspecified".to_string(),
            ));
        }
        if request.range_values.len() > schema.num_range_columns() {
            return Err(Error::InvalidCommand("too many range values".to_string()));
        }
        for cw in &request.column_writes {
            let col = schema.column_by_id(cw.column)?;
            if matches!(col.kind, ColumnKind::Hash | ColumnKind::Range) {
                return Err(Error::InvalidCommand(format!(
                    "column '{}' is a key column and cannot be written",
                    col.name
                )));
            }
            if request.user_timestamp.is_some() && cw.action.is_partial_merge() {
                return Err(Error::InvalidCommand(
                    "a write timestamp cannot be combined with a collection merge".to_string(),
                ));
            }
        }
        let doc_key = DocKey::hashed(request.hashed_values.clone(), request.range_values.clone());
        let static_key = if schema.has_static_columns() {
            Some(DocKey::hashed(request.hashed_values.clone(), Vec::new()))
        } else {
            None
        };
        Ok(WriteOperation { schema, request, doc_key, static_key })
    }

    /// True when this statement targets a range of rows instead of one row.
    fn is_range_delete(&self) -> bool {
        self.request.kind == WriteKind::Delete
            && self.request.range_values.len() < self.schema.num_range_columns()
    }

    /// True when applying must read current state first.
    pub fn require_read(&self) -> bool {
        self.request.condition.is_some()
            || self.request.user_timestamp.is_some()
            || self.is_range_delete()
            || self.request.column_writes.iter().any(|cw| cw.action.needs_read())
    }

    /// Statements that read declare snapshot isolation; blind writes may be
    /// conflict-checked without a read.
    pub fn isolation_level(&self) -> IsolationLevel {
        if self.require_read() {
            IsolationLevel::Snapshot
        } else {
            IsolationLevel::Serializable
        }
    }

    /// Paths an external lock manager should cover before applying.
    pub fn doc_paths_to_lock(&self) -> Vec<DocPath> {
        let mut paths = Vec::with_capacity(2);
        if let Some(sk) = &self.static_key {
            if self.touches_static() {
                paths.push(DocPath::root(sk));
            }
        }
        // A range delete locks the partial key; matched rows themselves are
        // not locked before deletion.
        paths.push(DocPath::root(&self.doc_key));
        paths
    }

    fn touches_static(&self) -> bool {
        let writes_static = self.request.column_writes.iter().any(|cw| {
            self.schema
                .column_by_id(cw.column)
                .map(|c| c.kind == ColumnKind::Static)
                .unwrap_or(false)
        });
        if writes_static {
            return true;
        }
        if let Some(cond) = &self.request.condition {
            let mut cols = Vec::new();
            cond.referenced_columns(&mut cols);
            return cols.iter().any(|id| self.schema.is_static_column(*id).unwrap_or(false));
        }
        false
    }

    /// Stages this statement's mutations into the batch.
    pub fn apply<S: DocStore>(&self, ctx: &mut ApplyContext<'_, '_, S>) -> Result<WriteResponse> {
        if let Some(cond) = &self.request.condition {
            let mut cols = Vec::new();
            cond.referenced_columns(&mut cols);
            let row = fetch_row(
                ctx.batch.store(),
                self.schema,
                &self.doc_key,
                &cols,
                ctx.read_time,
                ctx.restart,
            )?;
            if !cond.evaluate(row.as_ref())? {
                debug!(kind = ?self.request.kind, "condition rejected statement");
                return Ok(WriteResponse::rejected(row));
            }
        }
        match self.request.kind {
            WriteKind::Insert | WriteKind::Update => self.apply_upsert(ctx),
            WriteKind::Delete => self.apply_delete(ctx),
        }
    }

    fn column_path(&self, column: ColumnId) -> Result<DocPath> {
        let key = if self.schema.is_static_column(column)? {
            self.static_key.as_ref().unwrap_or(&self.doc_key)
        } else {
            &self.doc_key
        };
        Ok(DocPath::new(key, vec![SubKey::ColumnId(column)]))
    }

    fn apply_upsert<S: DocStore>(
        &self,
        ctx: &mut ApplyContext<'_, '_, S>,
    ) -> Result<WriteResponse> {
        if self.request.kind == WriteKind::Insert {
            let liveness = DocPath::new(
                &self.doc_key,
                vec![SubKey::SystemColumnId(SystemColumnId::Liveness)],
            );
            ctx.batch.set_liveness(&liveness, self.request.ttl, self.request.user_timestamp)?;
        }
        for cw in &self.request.column_writes {
            let path = self.column_path(cw.column)?;
            if let Some(resp) = self.apply_column(ctx, &path, &cw.action)? {
                return Ok(resp);
            }
        }
        Ok(WriteResponse::applied())
    }

    /// Applies one column action. Returns `Some` only for a recoverable
    /// usage error, which fails the statement without staging further writes.
    fn apply_column<S: DocStore>(
        &self,
        ctx: &mut ApplyContext<'_, '_, S>,
        path: &DocPath,
        action: &WriteAction,
    ) -> Result<Option<WriteResponse>> {
        let ttl = self.request.ttl;
        let user_ts = self.request.user_timestamp;
        match action {
            WriteAction::Set(doc) => {
                ctx.batch.insert_sub_document(path, doc.clone(), ttl, user_ts)?;
            }
            WriteAction::Extend(doc) => {
                ctx.batch.extend_sub_document(path, doc.clone(), ttl)?;
            }
            WriteAction::Remove(subkeys) => {
                for sk in subkeys {
                    ctx.batch.delete(&path.join(sk.clone()), None)?;
                }
            }
            WriteAction::ListAppend(elements) => {
                ctx.batch.extend_list(path, elements.clone(), ListExtendOrder::Append, ttl)?;
            }
            WriteAction::ListPrepend(elements) => {
                ctx.batch.extend_list(path, elements.clone(), ListExtendOrder::Prepend, ttl)?;
            }
            WriteAction::ListReplace { index, value } => {
                let outcome = ctx.batch.replace_in_list(
                    path,
                    *index,
                    value.clone(),
                    ctx.read_time,
                    ctx.restart,
                    ttl,
                );
                match outcome {
                    Ok(()) => {}
                    Err(e) if e.is_usage_error() => {
                        return Ok(Some(WriteResponse::usage(e.to_string())));
                    }
                    Err(e) => return Err(e),
                }
            }
            WriteAction::ListRemove(values) => {
                self.remove_list_elements(ctx, path, values)?;
            }
            WriteAction::SubKeySet { subkey, value } => {
                ctx.batch.insert_sub_document(&path.join(subkey.clone()), value.clone(), ttl, user_ts)?;
            }
            WriteAction::Delete => {
                ctx.batch.delete(path, user_ts)?;
            }
        }
        Ok(None)
    }

    fn remove_list_elements<S: DocStore>(
        &self,
        ctx: &mut ApplyContext<'_, '_, S>,
        path: &DocPath,
        values: &[SubDocument],
    ) -> Result<()> {
        let req = SubDocReadRequest::new(&path.encoded_doc_key, &path.subkeys)
            .for_query(ctx.batch.query_id());
        let Some(list) = get_sub_document(ctx.batch.store(), &req, ctx.read_time, ctx.restart)?
        else {
            return Ok(());
        };
        let Some(entries) = list.entries() else {
            return Ok(());
        };
        let mut removed = 0usize;
        for (sk, element) in entries {
            if matches!(sk, SubKey::ArrayIndex(_)) && values.contains(element) {
                ctx.batch.delete(&path.join(sk.clone()), None)?;
                removed += 1;
            }
        }
        trace!(removed, "removed list elements by value");
        Ok(())
    }

    fn apply_delete<S: DocStore>(
        &self,
        ctx: &mut ApplyContext<'_, '_, S>,
    ) -> Result<WriteResponse> {
        if !self.request.column_writes.is_empty() {
            // Named columns only; the row's remaining columns survive.
            for cw in &self.request.column_writes {
                let path = self.column_path(cw.column)?;
                if let Some(resp) = self.apply_column(ctx, &path, &cw.action)? {
                    return Ok(resp);
                }
            }
            return Ok(WriteResponse::applied());
        }
        if self.is_range_delete() {
            return self.apply_range_delete(ctx);
        }
        if self.request.user_timestamp.is_some() {
            // A caller-supplied delete timestamp cannot rely on a single
            // whole-row tombstone being ordered correctly against writes at
            // caller timestamps, so every column is tombstoned individually.
            for col in self.schema.columns() {
                if matches!(col.kind, ColumnKind::Hash | ColumnKind::Range) {
                    continue;
                }
                let path = self.column_path(col.id)?;
                ctx.batch.delete(&path, self.request.user_timestamp)?;
            }
            let liveness = DocPath::new(
                &self.doc_key,
                vec![SubKey::SystemColumnId(SystemColumnId::Liveness)],
            );
            ctx.batch.delete(&liveness, self.request.user_timestamp)?;
        } else {
            ctx.batch.delete(&DocPath::root(&self.doc_key), None)?;
        }
        Ok(WriteResponse::applied())
    }

    /// Deletes every row in the addressed range whose columns satisfy the
    /// residual predicate. Matched rows are deleted as scanned, without
    /// locking them first, so a concurrent writer to the same range can
    /// interleave with this statement.
    fn apply_range_delete<S: DocStore>(
        &self,
        ctx: &mut ApplyContext<'_, '_, S>,
    ) -> Result<WriteResponse> {
        let mut projection = Vec::new();
        if let Some(cond) = &self.request.where_condition {
            cond.referenced_columns(&mut projection);
        }
        let prefix = self.doc_key.encoded_hash_prefix();
        let mut iter = RowIterator::new(
            ctx.batch.store(),
            self.schema,
            &prefix,
            None,
            projection,
            ctx.read_time,
            ctx.restart,
        )?;
        let mut deleted = 0usize;
        while let Some(scanned) = iter.next_row(ctx.restart)? {
            if scanned.is_static {
                continue;
            }
            if !self.row_in_range(&scanned.key)? {
                continue;
            }
            let matches = match &self.request.where_condition {
                Some(cond) => cond.evaluate(Some(&scanned.row))?,
                None => true,
            };
            if matches {
                ctx.batch.delete(
                    &DocPath { encoded_doc_key: scanned.key, subkeys: Vec::new() },
                    None,
                )?;
                deleted += 1;
            }
        }
        debug!(deleted, "range delete staged");
        Ok(WriteResponse::applied())
    }

    /// True when the row's leading range components equal the statement's
    /// partial range values.
    fn row_in_range(&self, encoded_key: &[u8]) -> Result<bool> {
        if self.request.range_values.is_empty() {
            return Ok(true);
        }
        let (key, _) = DocKey::decode(encoded_key)?;
        Ok(key.range.starts_with(&self.request.range_values))
    }
}
