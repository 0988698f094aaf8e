//! Structured read operations
//!
//! A [`ReadOperation`] runs one SELECT against a hashed partition: it scans
//! the partition in key order, joins static columns into every regular row
//! of the same hash key, applies the residual predicate, and either projects
//! output rows or folds them into aggregate accumulators. Limit-bounded
//! queries return an opaque paging token that a later request can resume
//! from.

use serde::{Deserialize, Serialize};
use tracing::debug;

use dockv_core::{
    ColumnId, DocKey, Error, ReadHybridTime, Result, RestartReadHt, SubDocument, SubKey,
};
use dockv_storage::{get_sub_document, DocStore, SubDocReadRequest};

use crate::expression::{Accumulator, AggregateSpec, Condition};
use crate::row::Row;
use crate::scan::RowIterator;
use crate::schema::{ColumnKind, Schema};

/// One structured read statement.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    /// Values for every hash column, in schema order.
    pub hashed_values: Vec<SubKey>,
    /// Output columns, in selection order. Ignored by aggregate queries.
    pub projection: Vec<ColumnId>,
    /// Aggregate selections. Non-empty makes this an aggregate query.
    pub aggregates: Vec<AggregateSpec>,
    /// Residual predicate applied to each joined row.
    pub condition: Option<Condition>,
    /// Suppress consecutive duplicate output rows.
    pub distinct: bool,
    /// Maximum number of output rows. Zero short-circuits to an empty
    /// result.
    pub limit: Option<usize>,
    /// Continuation token from a prior limit-bounded read.
    pub paging_state: Option<Vec<u8>>,
}

/// Result rows plus an optional continuation token.
#[derive(Debug, Clone, Default)]
pub struct ReadResult {
    /// One entry per output row, values in selection order.
    pub rows: Vec<Vec<SubDocument>>,
    /// Present when the read stopped at its limit with rows remaining.
    pub paging_state: Option<Vec<u8>>,
}

/// Continuation cursor. Understood only by the read engine that produced it.
#[derive(Serialize, Deserialize)]
struct PagingState {
    next_row_key: Vec<u8>,
}

/// A validated read statement bound to a schema.
pub struct ReadOperation<'s> {
    schema: &'s Schema,
    request: ReadRequest,
}

impl<'s> ReadOperation<'s> {
    /// Validates the request against the schema.
    pub fn new(schema: &'s Schema, request: ReadRequest) -> Result<Self> {
        if request.hashed_values.len() != schema.num_hash_columns() {
            return Err(Error::InvalidCommand(format!(
                "statement supplies {} hash values for {} hash columns",
                request.hashed_values.len(),
                schema.num_hash_columns()
            )));
        }
        for id in &request.projection {
            schema.column_by_id(*id)?;
        }
        for spec in &request.aggregates {
            if let Some(id) = spec.column {
                schema.column_by_id(id)?;
            }
        }
        Ok(ReadOperation { schema, request })
    }

    fn is_aggregate(&self) -> bool {
        !self.request.aggregates.is_empty()
    }

    /// Columns the scan itself must materialize: the projection plus
    /// whatever the residual predicate and the aggregates read.
    fn scan_columns(&self) -> Vec<ColumnId> {
        let mut cols = self.request.projection.clone();
        if let Some(cond) = &self.request.condition {
            cond.referenced_columns(&mut cols);
        }
        for spec in &self.request.aggregates {
            if let Some(id) = spec.column {
                if !cols.contains(&id) {
                    cols.push(id);
                }
            }
        }
        cols
    }

    /// Projected columns that are static, in selection order.
    fn static_columns(&self, cols: &[ColumnId]) -> Vec<ColumnId> {
        cols.iter()
            .copied()
            .filter(|id| self.schema.is_static_column(*id).unwrap_or(false))
            .collect()
    }

    /// Runs the read at the given snapshot.
    pub fn execute<S: DocStore>(
        &self,
        store: &S,
        read: ReadHybridTime,
        restart: &mut RestartReadHt,
    ) -> Result<ReadResult> {
        if self.request.limit == Some(0) {
            return Ok(ReadResult::default());
        }
        let scan_columns = self.scan_columns();
        let static_columns = self.static_columns(&scan_columns);
        let partition = DocKey::hashed(self.request.hashed_values.clone(), Vec::new());
        let prefix = partition.encoded_hash_prefix();

        // A resumed page starts past the partition's static row, so its
        // static columns need one extra lookup before the main scan.
        let mut static_buffer = if self.request.paging_state.is_some() && !static_columns.is_empty()
        {
            self.fetch_static_row(store, &partition, &static_columns, read, restart)?
        } else {
            None
        };
        let mut static_joined = static_buffer.is_some();

        let start_key = match &self.request.paging_state {
            Some(token) => {
                let state: PagingState = bincode::deserialize(token)
                    .map_err(|e| Error::InvalidCommand(format!("bad paging state: {e}")))?;
                Some(state.next_row_key)
            }
            None => None,
        };

        let mut iter = RowIterator::new(
            store,
            self.schema,
            &prefix,
            start_key.as_deref(),
            scan_columns,
            read,
            restart,
        )?;

        let mut accumulators: Vec<Accumulator> =
            self.request.aggregates.iter().cloned().map(Accumulator::new).collect();
        let mut matched = 0usize;
        let mut out = ReadResult::default();
        let mut last_emitted: Option<Vec<SubDocument>> = None;

        while let Some(scanned) = iter.next_row(restart)? {
            if scanned.is_static {
                static_buffer = Some(scanned.row);
                static_joined = false;
                continue;
            }
            let mut row = scanned.row;
            if let Some(stat) = &static_buffer {
                row.merge_columns(stat, &static_columns);
                static_joined = true;
            }
            if !self.row_matches(&row)? {
                continue;
            }
            matched += 1;
            if self.is_aggregate() {
                for acc in &mut accumulators {
                    acc.push(&row)?;
                }
                continue;
            }
            if self.emit(&mut out, &mut last_emitted, &row) {
                if Some(out.rows.len()) == self.request.limit && iter.has_next() {
                    let state = PagingState {
                        next_row_key: iter.peek_key().map(<[u8]>::to_vec).unwrap_or_default(),
                    };
                    out.paging_state = Some(
                        bincode::serialize(&state)
                            .map_err(|e| Error::IllegalState(e.to_string()))?,
                    );
                    break;
                }
                if Some(out.rows.len()) == self.request.limit {
                    break;
                }
            }
        }

        // A static row no regular row joined with still surfaces once when
        // static columns were asked for.
        let under_limit = self.request.limit.map_or(true, |l| out.rows.len() < l);
        if !self.is_aggregate() && !static_joined && !static_columns.is_empty() && under_limit {
            if let Some(stat) = static_buffer {
                if self.row_matches(&stat)? && out.paging_state.is_none() {
                    matched += 1;
                    self.emit(&mut out, &mut last_emitted, &stat);
                }
            }
        }

        if self.is_aggregate() {
            if matched > 0 {
                out.rows.push(accumulators.into_iter().map(Accumulator::finish).collect());
            }
            debug!(matched, "aggregate read complete");
        } else {
            debug!(rows = out.rows.len(), paged = out.paging_state.is_some(), "read complete");
        }
        Ok(out)
    }

    fn row_matches(&self, row: &Row) -> Result<bool> {
        match &self.request.condition {
            Some(cond) => cond.evaluate(Some(row)),
            None => Ok(true),
        }
    }

    /// Projects and appends one output row, honoring DISTINCT. Returns true
    /// when a row was actually appended.
    fn emit(
        &self,
        out: &mut ReadResult,
        last_emitted: &mut Option<Vec<SubDocument>>,
        row: &Row,
    ) -> bool {
        let projected = row.project(&self.request.projection);
        if self.request.distinct && last_emitted.as_ref() == Some(&projected) {
            return false;
        }
        *last_emitted = Some(projected.clone());
        out.rows.push(projected);
        true
    }

    fn fetch_static_row<S: DocStore>(
        &self,
        store: &S,
        partition: &DocKey,
        static_columns: &[ColumnId],
        read: ReadHybridTime,
        restart: &mut RestartReadHt,
    ) -> Result<Option<Row>> {
        let key = partition.encode();
        let req = SubDocReadRequest::new(&key, &[]);
        let Some(doc) = get_sub_document(store, &req, read, restart)? else {
            return Ok(None);
        };
        let mut row = Row::new();
        for (col, val) in
            self.schema.columns_of(ColumnKind::Hash).zip(&self.request.hashed_values)
        {
            row.set(col.id, key_value(val));
        }
        for id in static_columns {
            if let Some(v) = doc.get_child(&SubKey::ColumnId(*id)) {
                row.set(*id, v.clone());
            }
        }
        Ok(Some(row))
    }
}

fn key_value(sk: &SubKey) -> SubDocument {
    match sk {
        SubKey::String(s) => SubDocument::string(s.clone()),
        SubKey::Int64(v) | SubKey::DescendingInt64(v) => SubDocument::int64(*v),
        SubKey::Double(d) => SubDocument::double(*d),
        _ => SubDocument::null(),
    }
}
