//! In-memory ordered multi-version store
//!
//! A `BTreeMap` of encoded keys, each holding its versions newest-last.
//! Commit times come from an internal monotonic clock, except for writes
//! carrying a user timestamp, which is used as the version's write time so
//! user timestamps and commit times compare in one domain.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::trace;

use dockv_core::{HybridTime, ReadHybridTime, RestartReadHt, Result, Value};

use crate::store::{DocStore, VersionedValue, WriteOp};

type VersionMap = BTreeMap<HybridTime, Value>;

/// In-memory implementation of [`DocStore`].
#[derive(Debug, Default)]
pub struct MemDocStore {
    data: RwLock<BTreeMap<Vec<u8>, VersionMap>>,
    clock: AtomicU64,
}

impl MemDocStore {
    /// An empty store with its clock at zero.
    pub fn new() -> Self {
        MemDocStore::default()
    }

    /// Advances the clock and returns a fresh commit time.
    pub fn next_hybrid_time(&self) -> HybridTime {
        HybridTime::from_micros(self.clock.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// A read time at the current clock, with no uncertainty window.
    pub fn read_time_now(&self) -> ReadHybridTime {
        ReadHybridTime::at(HybridTime::from_micros(self.clock.load(Ordering::SeqCst)))
    }

    /// Applies a batch of writes at the given commit time. Later ops in the
    /// batch overwrite earlier ones targeting the same key.
    pub fn apply_ops(&self, ops: Vec<WriteOp>, commit: HybridTime) {
        let mut data = self.data.write();
        trace!(n = ops.len(), commit = commit.micros(), "applying write batch");
        for op in ops {
            let write_time = op
                .value
                .user_timestamp
                .map(|ts| ts.as_hybrid_time())
                .unwrap_or(commit);
            data.entry(op.key).or_default().insert(write_time, op.value);
        }
        // Keep the clock ahead of every stored commit time.
        self.clock.fetch_max(commit.micros(), Ordering::SeqCst);
    }

    /// Applies a batch at a fresh commit time and returns that time.
    pub fn apply_ops_now(&self, ops: Vec<WriteOp>) -> HybridTime {
        let commit = self.next_hybrid_time();
        self.apply_ops(ops, commit);
        commit
    }

    /// Total number of stored versions, all keys included.
    pub fn version_count(&self) -> usize {
        self.data.read().values().map(|v| v.len()).sum()
    }

    fn pick_visible(
        versions: &VersionMap,
        read: ReadHybridTime,
        restart: &mut RestartReadHt,
    ) -> Option<VersionedValue> {
        // Versions in (read, global_limit] may have committed before our
        // snapshot was chosen; surface them as restart hints.
        for (&wt, _) in versions.range((Bound::Excluded(read.read), Bound::Included(read.global_limit))) {
            restart.make_at_least(wt);
        }
        versions
            .range((Bound::Unbounded, Bound::Included(read.read)))
            .next_back()
            .map(|(&wt, value)| VersionedValue { write_time: wt, value: value.clone() })
    }
}

impl DocStore for MemDocStore {
    fn latest_visible(
        &self,
        key: &[u8],
        read: ReadHybridTime,
        restart: &mut RestartReadHt,
    ) -> Result<Option<VersionedValue>> {
        let data = self.data.read();
        Ok(data.get(key).and_then(|versions| Self::pick_visible(versions, read, restart)))
    }

    fn scan_visible(
        &self,
        lower: &[u8],
        upper: Option<&[u8]>,
        read: ReadHybridTime,
        restart: &mut RestartReadHt,
    ) -> Result<Vec<(Vec<u8>, VersionedValue)>> {
        let data = self.data.read();
        let range: Box<dyn Iterator<Item = (&Vec<u8>, &VersionMap)>> = match upper {
            Some(upper) => Box::new(data.range::<[u8], _>((
                Bound::Included(lower),
                Bound::Excluded(upper),
            ))),
            None => Box::new(data.range::<[u8], _>((Bound::Included(lower), Bound::Unbounded))),
        };
        let mut out = Vec::new();
        for (key, versions) in range {
            if let Some(vv) = Self::pick_visible(versions, read, restart) {
                out.push((key.clone(), vv));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockv_core::{PrimitiveValue, Ttl};

    fn put(store: &MemDocStore, key: &[u8], v: &str, at: u64) {
        store.apply_ops(
            vec![WriteOp {
                key: key.to_vec(),
                value: Value::primitive(PrimitiveValue::String(v.to_string())),
            }],
            HybridTime::from_micros(at),
        );
    }

    #[test]
    fn test_latest_visible_picks_newest_at_or_below_read() {
        let store = MemDocStore::new();
        put(&store, b"k", "v1", 10);
        put(&store, b"k", "v2", 20);
        let mut restart = RestartReadHt::none();

        let at = |t| ReadHybridTime::at(HybridTime::from_micros(t));
        assert!(store.latest_visible(b"k", at(5), &mut restart).unwrap().is_none());
        let v = store.latest_visible(b"k", at(15), &mut restart).unwrap().unwrap();
        assert_eq!(v.write_time, HybridTime::from_micros(10));
        let v = store.latest_visible(b"k", at(20), &mut restart).unwrap().unwrap();
        assert_eq!(v.write_time, HybridTime::from_micros(20));
        assert_eq!(restart.as_option(), None);
    }

    #[test]
    fn test_uncertainty_window_folds_restart_hint() {
        let store = MemDocStore::new();
        put(&store, b"k", "v", 50);
        let mut restart = RestartReadHt::none();
        let read = ReadHybridTime::with_uncertainty(
            HybridTime::from_micros(40),
            HybridTime::from_micros(60),
        );
        assert!(store.latest_visible(b"k", read, &mut restart).unwrap().is_none());
        assert_eq!(restart.as_option(), Some(HybridTime::from_micros(50)));

        // Beyond the window: no hint.
        let mut restart = RestartReadHt::none();
        let read = ReadHybridTime::with_uncertainty(
            HybridTime::from_micros(40),
            HybridTime::from_micros(45),
        );
        assert!(store.latest_visible(b"k", read, &mut restart).unwrap().is_none());
        assert_eq!(restart.as_option(), None);
    }

    #[test]
    fn test_scan_visible_is_key_ordered_and_half_open() {
        let store = MemDocStore::new();
        put(&store, b"a", "1", 1);
        put(&store, b"b", "2", 1);
        put(&store, b"c", "3", 1);
        let mut restart = RestartReadHt::none();
        let rows = store
            .scan_visible(b"a", Some(b"c"), ReadHybridTime::latest(), &mut restart)
            .unwrap();
        let keys: Vec<_> = rows.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_same_commit_time_last_op_wins() {
        let store = MemDocStore::new();
        store.apply_ops(
            vec![
                WriteOp { key: b"k".to_vec(), value: Value::tombstone() },
                WriteOp {
                    key: b"k".to_vec(),
                    value: Value::primitive(PrimitiveValue::Int64(5)),
                },
            ],
            HybridTime::from_micros(7),
        );
        let mut restart = RestartReadHt::none();
        let v = store
            .latest_visible(b"k", ReadHybridTime::latest(), &mut restart)
            .unwrap()
            .unwrap();
        assert!(!v.value.is_tombstone());
    }

    #[test]
    fn test_dead_at_covers_ttl_and_tombstone() {
        let vv = VersionedValue {
            write_time: HybridTime::from_micros(1_000),
            value: Value::primitive(PrimitiveValue::Null).with_ttl(Ttl::from_millis(1)),
        };
        assert!(!vv.is_dead_at(HybridTime::from_micros(1_500)));
        assert!(vv.is_dead_at(HybridTime::from_micros(2_000)));
        let tomb = VersionedValue { write_time: HybridTime::from_micros(1), value: Value::tombstone() };
        assert!(tomb.is_dead_at(HybridTime::from_micros(1)));
    }

    #[test]
    fn test_clock_stays_ahead_of_applied_commits() {
        let store = MemDocStore::new();
        put(&store, b"k", "v", 100);
        assert!(store.next_hybrid_time() > HybridTime::from_micros(100));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// For any version history, the visible version is the newest
            /// one at or below the read time, and no restart hint appears
            /// without an uncertainty window.
            #[test]
            fn prop_visibility_picks_newest_at_or_below(
                commits in proptest::collection::btree_set(1u64..500, 1..20),
                read_at in 0u64..600,
            ) {
                let store = MemDocStore::new();
                for &t in &commits {
                    put(&store, b"k", &t.to_string(), t);
                }
                let mut restart = RestartReadHt::none();
                let read = ReadHybridTime::at(HybridTime::from_micros(read_at));
                let got = store.latest_visible(b"k", read, &mut restart).unwrap();
                let expected = commits.iter().rev().find(|&&t| t <= read_at);
                match expected {
                    None => prop_assert!(got.is_none()),
                    Some(&t) => {
                        prop_assert_eq!(got.unwrap().write_time, HybridTime::from_micros(t));
                    }
                }
                prop_assert_eq!(restart.as_option(), None);
            }
        }
    }
}
