//! dockv - document-operation execution engine over an ordered KV store
//!
//! dockv maps documents (rows, hashes, sets, sorted sets, time series) onto
//! a flat, ordered, multi-versioned key-value store and executes typed
//! operations against them: KV-style commands and structured row
//! statements with conditions, static columns, aggregates, and paging.
//!
//! # Quick Start
//!
//! ```ignore
//! use dockv::{DocKey, DocPath, DocWriteBatch, MemDocStore, PrimitiveValue, SubKey, Value};
//!
//! let store = MemDocStore::new();
//! let mut batch = DocWriteBatch::new(&store);
//!
//! let key = DocKey::hashed(vec![SubKey::String("user:123".into())], vec![]);
//! let value = Value::primitive(PrimitiveValue::String("Alice".into()));
//! batch.set_primitive(&DocPath::root(&key), value)?;
//! store.apply_ops_now(batch.into_ops());
//! ```
//!
//! # Architecture
//!
//! Three layers, each its own crate:
//! - [`dockv_core`]: key encoding, document model, versioning primitives
//! - [`dockv_storage`]: the [`DocStore`] trait, write batches, and the
//!   subdocument reader
//! - [`dockv_engine`]: the KV-command and structured-statement engines

pub use dockv_core::{
    hash_code_for, prefix_successor, upper_bound_for_prefix, ColumnId, ContainerKind, DocKey,
    DocPath, Error, HybridTime, IsolationLevel, PrimitiveValue, QueryId, ReadHybridTime, Result,
    RestartReadHt, SubDocKey, SubDocument, SubKey, SystemColumnId, Ttl, UserTimestamp, Value,
    ValueBody, ValueKind,
};
pub use dockv_engine::{
    fetch_row, Accumulator, AggregateFn, AggregateSpec, ApplyContext, ColumnKind, ColumnSchema,
    ColumnWrite, CompareOp, Condition, KvBound, KvDataType, KvReadCommand, KvReadOperation,
    KvReadRequest, KvResponse, KvStatusCode, KvTarget, KvWriteCommand, KvWriteMode,
    KvWriteOperation, KvWriteRequest, ReadOperation, ReadRequest, ReadResult, Row, RowIterator,
    ScannedRow, Schema, SortedSetOptions, WriteAction, WriteKind, WriteOperation, WriteRequest,
    WriteResponse, WRONG_TYPE_MESSAGE,
};
pub use dockv_storage::{
    get_sub_document, DocStore, DocWriteBatch, ListExtendOrder, MemDocStore, SubDocReadRequest,
    VersionedValue, WriteOp,
};
