//! Operation engines for the dockv document store
//!
//! Two request surfaces run on top of the storage layer:
//! - `kv_write` / `kv_read`: typed key-value commands (strings, hashes,
//!   sets, sorted sets, time series) with per-command status codes
//! - `write` / `read`: structured row statements against a schema, with
//!   conditions, static columns, aggregates, and paging
//!
//! Supporting modules: `schema` and `row` for the structured model,
//! `expression` for conditions and aggregates, `scan` for partition
//! iteration, and `context` for the shared apply-side state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod expression;
pub mod kv_read;
pub mod kv_write;
pub mod read;
pub mod row;
pub mod scan;
pub mod schema;
pub mod types;
pub mod write;

pub use context::ApplyContext;
pub use expression::{Accumulator, AggregateFn, AggregateSpec, CompareOp, Condition};
pub use kv_read::KvReadOperation;
pub use kv_write::KvWriteOperation;
pub use read::{ReadOperation, ReadRequest, ReadResult};
pub use row::Row;
pub use scan::{fetch_row, RowIterator, ScannedRow};
pub use schema::{ColumnKind, ColumnSchema, Schema};
pub use types::{
    KvBound, KvDataType, KvReadCommand, KvReadRequest, KvResponse, KvStatusCode, KvTarget,
    KvWriteCommand, KvWriteMode, KvWriteRequest, SortedSetOptions, WRONG_TYPE_MESSAGE,
};
pub use write::{
    ColumnWrite, WriteAction, WriteKind, WriteOperation, WriteRequest, WriteResponse,
};
