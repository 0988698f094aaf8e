//! Shared helpers for the integration suites.
//!
//! Each helper runs one operation end to end: build a batch, apply the
//! operation at the store's current read time, commit the batch. Import via
//! `mod common;` from a suite's top-level file.

#![allow(dead_code)]

use std::sync::Once;

pub use dockv::{
    ApplyContext, ColumnId, ColumnKind, ColumnSchema, ColumnWrite, CompareOp, Condition,
    DocWriteBatch, KvReadCommand, KvReadOperation, KvReadRequest, KvResponse, KvStatusCode,
    KvTarget, KvWriteCommand, KvWriteMode, KvWriteOperation, KvWriteRequest, MemDocStore,
    PrimitiveValue, ReadOperation, ReadRequest, ReadResult, RestartReadHt, Row, Schema,
    SortedSetOptions, SubDocument, SubKey, Ttl, WriteAction, WriteKind, WriteOperation,
    WriteRequest, WriteResponse,
};

static INIT: Once = Once::new();

/// Wires test output into tracing once per process.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// Runs one mutating KV command and commits its batch.
pub fn kv_write(store: &MemDocStore, key: &str, command: KvWriteCommand) -> KvResponse {
    kv_write_mode(store, key, command, true)
}

/// Like `kv_write`, with explicit control over response emulation.
pub fn kv_write_mode(
    store: &MemDocStore,
    key: &str,
    command: KvWriteCommand,
    emulate: bool,
) -> KvResponse {
    init_tracing();
    let mut batch = DocWriteBatch::new(store);
    let mut restart = RestartReadHt::none();
    let mut op = KvWriteOperation::new(
        KvWriteRequest { target: KvTarget::new(key), command },
        emulate,
    );
    {
        let mut ctx = ApplyContext {
            batch: &mut batch,
            read_time: store.read_time_now(),
            restart: &mut restart,
        };
        op.apply(&mut ctx).unwrap();
    }
    store.apply_ops_now(batch.into_ops());
    op.into_response()
}

/// Runs one reading KV command at the store's current time.
pub fn kv_read(store: &MemDocStore, key: &str, command: KvReadCommand) -> KvResponse {
    init_tracing();
    let mut restart = RestartReadHt::none();
    let mut op = KvReadOperation::new(KvReadRequest { target: KvTarget::new(key), command });
    op.execute(store, store.read_time_now(), &mut restart).unwrap();
    op.into_response()
}

/// Runs one structured write statement. The batch commits only when the
/// statement applied cleanly.
pub fn run_write(store: &MemDocStore, schema: &Schema, request: WriteRequest) -> WriteResponse {
    init_tracing();
    let op = WriteOperation::new(schema, request).unwrap();
    let mut batch = DocWriteBatch::new(store);
    let mut restart = RestartReadHt::none();
    let resp = {
        let mut ctx = ApplyContext {
            batch: &mut batch,
            read_time: store.read_time_now(),
            restart: &mut restart,
        };
        op.apply(&mut ctx).unwrap()
    };
    if resp.applied {
        store.apply_ops_now(batch.into_ops());
    }
    resp
}

/// Runs one structured read statement at the store's current time.
pub fn run_read(store: &MemDocStore, schema: &Schema, request: ReadRequest) -> ReadResult {
    init_tracing();
    let op = ReadOperation::new(schema, request).unwrap();
    let mut restart = RestartReadHt::none();
    op.execute(store, store.read_time_now(), &mut restart).unwrap()
}

/// Schema used across the structured suites: one hash column, one range
/// column, one static column, two regular columns.
pub fn sample_schema() -> Schema {
    Schema::new(
        vec![
            ColumnSchema::new(1, "device", ColumnKind::Hash),
            ColumnSchema::new(2, "seq", ColumnKind::Range),
            ColumnSchema::new(3, "owner", ColumnKind::Static),
            ColumnSchema::new(4, "reading", ColumnKind::Regular),
            ColumnSchema::new(5, "label", ColumnKind::Regular),
        ],
        Ttl::UNLIMITED,
    )
    .unwrap()
}

/// Blank write request addressing `(device, seq)` in the sample schema.
pub fn write_request(kind: WriteKind, device: &str, seq: i64) -> WriteRequest {
    WriteRequest {
        kind,
        hashed_values: vec![SubKey::String(device.to_string())],
        range_values: vec![SubKey::Int64(seq)],
        column_writes: Vec::new(),
        condition: None,
        where_condition: None,
        ttl: Ttl::UNLIMITED,
        user_timestamp: None,
    }
}

/// Blank read request addressing the `device` partition in the sample schema.
pub fn read_request(device: &str) -> ReadRequest {
    ReadRequest {
        hashed_values: vec![SubKey::String(device.to_string())],
        projection: Vec::new(),
        aggregates: Vec::new(),
        condition: None,
        distinct: false,
        limit: None,
        paging_state: None,
    }
}

/// Fetches one row of the sample schema with the given columns, the way a
/// conditional write would.
pub fn get_row(
    store: &MemDocStore,
    schema: &Schema,
    device: &str,
    seq: i64,
    columns: &[i32],
) -> Option<Row> {
    let key = dockv::DocKey::hashed(
        vec![SubKey::String(device.to_string())],
        vec![SubKey::Int64(seq)],
    );
    let cols: Vec<ColumnId> = columns.iter().map(|c| ColumnId(*c)).collect();
    let mut restart = RestartReadHt::none();
    dockv::fetch_row(store, schema, &key, &cols, store.read_time_now(), &mut restart).unwrap()
}

/// Shorthand for a scalar-set column write.
pub fn set_col(column: i32, value: SubDocument) -> ColumnWrite {
    ColumnWrite { column: ColumnId(column), action: WriteAction::Set(value) }
}
