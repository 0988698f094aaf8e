//! The ordered multi-version store interface
//!
//! Everything above this trait sees the store as a flat, byte-ordered map
//! from encoded keys to timestamped [`Value`] versions. Reads are snapshot
//! reads: the store surfaces the newest version at or below the read time
//! and folds restart hints for versions inside the uncertainty window.

use dockv_core::{HybridTime, ReadHybridTime, RestartReadHt, Result, Value};

/// One version of one key, as a read surfaces it.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedValue {
    /// Commit time, or the user timestamp when one was supplied.
    pub write_time: HybridTime,
    /// The stored record.
    pub value: Value,
}

impl VersionedValue {
    /// True when this version is a tombstone or has outlived its TTL at
    /// the given read time.
    pub fn is_dead_at(&self, read: HybridTime) -> bool {
        self.value.is_tombstone() || self.value.ttl.is_expired_at(self.write_time, read)
    }
}

/// A write destined for the store, produced by a write batch.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOp {
    /// Encoded subdocument key.
    pub key: Vec<u8>,
    /// Record to store at that key.
    pub value: Value,
}

/// Snapshot-read access to the ordered store.
///
/// Tombstones and expired versions are returned as ordinary versions; the
/// reader layer interprets them, because their effect depends on what lies
/// beneath them in the document tree.
pub trait DocStore {
    /// Newest version of `key` at or below the read time.
    fn latest_visible(
        &self,
        key: &[u8],
        read: ReadHybridTime,
        restart: &mut RestartReadHt,
    ) -> Result<Option<VersionedValue>>;

    /// Newest visible version of every key in `[lower, upper)`, in key
    /// order. An `upper` of `None` means "to the end of the keyspace".
    fn scan_visible(
        &self,
        lower: &[u8],
        upper: Option<&[u8]>,
        read: ReadHybridTime,
        restart: &mut RestartReadHt,
    ) -> Result<Vec<(Vec<u8>, VersionedValue)>>;
}
