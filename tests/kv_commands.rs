//! End-to-end KV command tests
//!
//! Each test runs commands through the full stack: engine dispatch, write
//! batch, in-memory store, multi-version reads.

#[path = "common/mod.rs"]
mod common;

use common::*;
use dockv::KvBound;

mod strings {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let store = MemDocStore::new();
        let resp = kv_write(&store, "k", KvWriteCommand::Set {
            value: "v1".into(),
            ttl_ms: None,
            mode: KvWriteMode::Upsert,
        });
        assert_eq!(resp.string_result.as_deref(), Some("OK"));
        let got = kv_read(&store, "k", KvReadCommand::Get);
        assert_eq!(got.code, KvStatusCode::Ok);
        assert_eq!(got.string_result.as_deref(), Some("v1"));
    }

    #[test]
    fn append_extends_and_reports_length() {
        let store = MemDocStore::new();
        kv_write(&store, "k", KvWriteCommand::Set {
            value: "v1".into(),
            ttl_ms: None,
            mode: KvWriteMode::Upsert,
        });
        let resp = kv_write(&store, "k", KvWriteCommand::Append { value: "v2".into() });
        assert_eq!(resp.int_result, Some(4));
        let got = kv_read(&store, "k", KvReadCommand::Get);
        assert_eq!(got.string_result.as_deref(), Some("v1v2"));
        let len = kv_read(&store, "k", KvReadCommand::Strlen);
        assert_eq!(len.int_result, Some(4));
    }

    #[test]
    fn del_then_get_is_not_found_never_wrong_type() {
        let store = MemDocStore::new();
        kv_write(&store, "k", KvWriteCommand::Set {
            value: "v".into(),
            ttl_ms: None,
            mode: KvWriteMode::Upsert,
        });
        let del = kv_write(&store, "k", KvWriteCommand::Del);
        assert_eq!(del.int_result, Some(1));
        let got = kv_read(&store, "k", KvReadCommand::Get);
        assert_eq!(got.code, KvStatusCode::NotFound);
        let exists = kv_read(&store, "k", KvReadCommand::Exists);
        assert_eq!(exists.int_result, Some(0));
    }

    #[test]
    fn set_nx_and_xx_respect_existence() {
        let store = MemDocStore::new();
        let first = kv_write(&store, "k", KvWriteCommand::Set {
            value: "a".into(),
            ttl_ms: None,
            mode: KvWriteMode::Insert,
        });
        assert_eq!(first.int_result, Some(1));
        let second = kv_write(&store, "k", KvWriteCommand::Set {
            value: "b".into(),
            ttl_ms: None,
            mode: KvWriteMode::Insert,
        });
        assert_eq!(second.code, KvStatusCode::NotFound);
        assert_eq!(kv_read(&store, "k", KvReadCommand::Get).string_result.as_deref(), Some("a"));

        let missing = kv_write(&store, "other", KvWriteCommand::Set {
            value: "x".into(),
            ttl_ms: None,
            mode: KvWriteMode::Update,
        });
        assert_eq!(missing.code, KvStatusCode::NotFound);
        assert_eq!(kv_read(&store, "other", KvReadCommand::Exists).int_result, Some(0));
    }

    #[test]
    fn skipped_set_gate_reports_not_found() {
        let store = MemDocStore::new();
        kv_write(&store, "k", KvWriteCommand::Set {
            value: "old".into(),
            ttl_ms: None,
            mode: KvWriteMode::Upsert,
        });
        let resp = kv_write(&store, "k", KvWriteCommand::Set {
            value: "new".into(),
            ttl_ms: None,
            mode: KvWriteMode::Insert,
        });
        assert_eq!(resp.code, KvStatusCode::NotFound);
        assert_eq!(resp.int_result, None);
        assert_eq!(kv_read(&store, "k", KvReadCommand::Get).string_result.as_deref(), Some("old"));
    }

    #[test]
    fn getset_swaps_and_returns_old() {
        let store = MemDocStore::new();
        let first = kv_write(&store, "k", KvWriteCommand::GetSet { value: "new".into() });
        assert_eq!(first.code, KvStatusCode::NotFound);
        let second = kv_write(&store, "k", KvWriteCommand::GetSet { value: "newer".into() });
        assert_eq!(second.string_result.as_deref(), Some("new"));
    }

    #[test]
    fn setrange_zero_pads_gaps() {
        let store = MemDocStore::new();
        let resp = kv_write(&store, "k", KvWriteCommand::SetRange { offset: 3, value: "x".into() });
        assert_eq!(resp.int_result, Some(4));
        let got = kv_read(&store, "k", KvReadCommand::Get);
        assert_eq!(got.string_result.as_deref(), Some("\0\0\0x"));
    }

    #[test]
    fn getrange_supports_negative_positions() {
        let store = MemDocStore::new();
        kv_write(&store, "k", KvWriteCommand::Set {
            value: "hello".into(),
            ttl_ms: None,
            mode: KvWriteMode::Upsert,
        });
        let head = kv_read(&store, "k", KvReadCommand::GetRange { start: 0, end: 1 });
        assert_eq!(head.string_result.as_deref(), Some("he"));
        let tail = kv_read(&store, "k", KvReadCommand::GetRange { start: -3, end: -1 });
        assert_eq!(tail.string_result.as_deref(), Some("llo"));
    }

    #[test]
    fn getrange_out_of_range_positions_are_flagged() {
        let store = MemDocStore::new();
        kv_write(&store, "k", KvWriteCommand::Set {
            value: "hello".into(),
            ttl_ms: None,
            mode: KvWriteMode::Upsert,
        });
        let past_end = kv_read(&store, "k", KvReadCommand::GetRange { start: 4, end: 10 });
        assert_eq!(past_end.code, KvStatusCode::IndexOutOfBounds);
        assert_eq!(past_end.string_result, None);
        let before_start = kv_read(&store, "k", KvReadCommand::GetRange { start: -9, end: 2 });
        assert_eq!(before_start.code, KvStatusCode::IndexOutOfBounds);
    }
}

mod counters {
    use super::*;

    #[test]
    fn incr_counts_from_zero() {
        let store = MemDocStore::new();
        let resp = kv_write(&store, "n", KvWriteCommand::Incr { delta: 5, field: None });
        assert_eq!(resp.int_result, Some(5));
        let resp = kv_write(&store, "n", KvWriteCommand::Incr { delta: -2, field: None });
        assert_eq!(resp.int_result, Some(3));
        assert_eq!(kv_read(&store, "n", KvReadCommand::Get).string_result.as_deref(), Some("3"));
    }

    #[test]
    fn incr_on_non_numeric_reports_error_and_keeps_value() {
        let store = MemDocStore::new();
        kv_write(&store, "k", KvWriteCommand::Set {
            value: "abc".into(),
            ttl_ms: None,
            mode: KvWriteMode::Upsert,
        });
        let resp = kv_write(&store, "k", KvWriteCommand::Incr { delta: 1, field: None });
        assert_eq!(resp.code, KvStatusCode::Error);
        assert_eq!(kv_read(&store, "k", KvReadCommand::Get).string_result.as_deref(), Some("abc"));
    }

    #[test]
    fn incr_overflow_reports_error_and_keeps_value() {
        let store = MemDocStore::new();
        let max = i64::MAX.to_string();
        kv_write(&store, "k", KvWriteCommand::Set {
            value: max.clone(),
            ttl_ms: None,
            mode: KvWriteMode::Upsert,
        });
        let resp = kv_write(&store, "k", KvWriteCommand::Incr { delta: 1, field: None });
        assert_eq!(resp.code, KvStatusCode::Error);
        assert_eq!(kv_read(&store, "k", KvReadCommand::Get).string_result.as_deref(), Some(max.as_str()));
    }

    #[test]
    fn incr_into_hash_field() {
        let store = MemDocStore::new();
        let resp = kv_write(&store, "h", KvWriteCommand::Incr { delta: 7, field: Some("hits".into()) });
        assert_eq!(resp.int_result, Some(7));
        let got = kv_read(&store, "h", KvReadCommand::HGet { field: "hits".into() });
        assert_eq!(got.string_result.as_deref(), Some("7"));
    }
}

mod hashes {
    use super::*;

    #[test]
    fn hset_and_hget() {
        let store = MemDocStore::new();
        let resp = kv_write(&store, "h", KvWriteCommand::HSet {
            fields: vec![("a".into(), "1".into()), ("b".into(), "2".into())],
            ttl_ms: None,
        });
        assert_eq!(resp.int_result, Some(2));
        let got = kv_read(&store, "h", KvReadCommand::HGet { field: "a".into() });
        assert_eq!(got.string_result.as_deref(), Some("1"));
        let missing = kv_read(&store, "h", KvReadCommand::HGet { field: "z".into() });
        assert_eq!(missing.code, KvStatusCode::NotFound);
    }

    #[test]
    fn hset_counts_only_new_fields() {
        let store = MemDocStore::new();
        kv_write(&store, "h", KvWriteCommand::HSet {
            fields: vec![("a".into(), "1".into())],
            ttl_ms: None,
        });
        let resp = kv_write(&store, "h", KvWriteCommand::HSet {
            fields: vec![("a".into(), "9".into()), ("b".into(), "2".into())],
            ttl_ms: None,
        });
        assert_eq!(resp.int_result, Some(1));
        assert_eq!(kv_read(&store, "h", KvReadCommand::HLen).int_result, Some(2));
    }

    #[test]
    fn hgetall_returns_interleaved_pairs() {
        let store = MemDocStore::new();
        kv_write(&store, "h", KvWriteCommand::HSet {
            fields: vec![("a".into(), "1".into()), ("b".into(), "2".into())],
            ttl_ms: None,
        });
        let all = kv_read(&store, "h", KvReadCommand::HGetAll);
        assert_eq!(all.array_result, Some(vec!["a".into(), "1".into(), "b".into(), "2".into()]));
        let keys = kv_read(&store, "h", KvReadCommand::HKeys);
        assert_eq!(keys.array_result, Some(vec!["a".into(), "b".into()]));
        let vals = kv_read(&store, "h", KvReadCommand::HVals);
        assert_eq!(vals.array_result, Some(vec!["1".into(), "2".into()]));
    }

    #[test]
    fn hdel_removes_and_counts() {
        let store = MemDocStore::new();
        kv_write(&store, "h", KvWriteCommand::HSet {
            fields: vec![("a".into(), "1".into()), ("b".into(), "2".into())],
            ttl_ms: None,
        });
        let resp = kv_write(&store, "h", KvWriteCommand::HDel {
            fields: vec!["a".into(), "zz".into()],
        });
        assert_eq!(resp.int_result, Some(1));
        let gone = kv_read(&store, "h", KvReadCommand::HExists { field: "a".into() });
        assert_eq!(gone.int_result, Some(0));
    }

    #[test]
    fn hset_on_string_is_wrong_type() {
        let store = MemDocStore::new();
        kv_write(&store, "k", KvWriteCommand::Set {
            value: "s".into(),
            ttl_ms: None,
            mode: KvWriteMode::Upsert,
        });
        let resp = kv_write(&store, "k", KvWriteCommand::HSet {
            fields: vec![("a".into(), "1".into())],
            ttl_ms: None,
        });
        assert_eq!(resp.code, KvStatusCode::WrongType);
        assert!(resp.error_message.unwrap().starts_with("WRONGTYPE"));
    }
}

mod sets {
    use super::*;

    #[test]
    fn sadd_smembers_srem() {
        let store = MemDocStore::new();
        let resp = kv_write(&store, "s", KvWriteCommand::SAdd {
            members: vec!["x".into(), "y".into()],
            ttl_ms: None,
        });
        assert_eq!(resp.int_result, Some(2));
        assert_eq!(kv_read(&store, "s", KvReadCommand::SCard).int_result, Some(2));
        let is = kv_read(&store, "s", KvReadCommand::SIsMember { member: "x".into() });
        assert_eq!(is.int_result, Some(1));
        kv_write(&store, "s", KvWriteCommand::SRem { members: vec!["x".into()] });
        let members = kv_read(&store, "s", KvReadCommand::SMembers);
        assert_eq!(members.array_result, Some(vec!["y".into()]));
    }

    #[test]
    fn srem_on_missing_key_is_zero() {
        let store = MemDocStore::new();
        let resp = kv_write(&store, "s", KvWriteCommand::SRem { members: vec!["x".into()] });
        assert_eq!(resp.int_result, Some(0));
    }

    #[test]
    fn scard_matches_distinct_adds_under_random_order() {
        use rand::Rng;
        use std::collections::HashSet;

        let store = MemDocStore::new();
        let mut rng = rand::thread_rng();
        let mut distinct = HashSet::new();
        for _ in 0..60 {
            let member = format!("m{}", rng.gen_range(0..20));
            distinct.insert(member.clone());
            kv_write(&store, "s", KvWriteCommand::SAdd { members: vec![member], ttl_ms: None });
        }
        let card = kv_read(&store, "s", KvReadCommand::SCard);
        assert_eq!(card.int_result, Some(distinct.len() as i64));
    }
}

mod sorted_sets {
    use super::*;

    fn zadd(store: &MemDocStore, key: &str, members: Vec<(f64, String)>, options: SortedSetOptions) -> KvResponse {
        kv_write(store, key, KvWriteCommand::ZAdd { members, options, ttl_ms: None })
    }

    #[test]
    fn cardinality_tracks_distinct_adds() {
        let store = MemDocStore::new();
        for i in 0..5 {
            zadd(&store, "z", vec![(i as f64, format!("m{i}"))], SortedSetOptions::default());
        }
        assert_eq!(kv_read(&store, "z", KvReadCommand::ZCard).int_result, Some(5));
    }

    #[test]
    fn nx_never_changes_an_existing_score() {
        let store = MemDocStore::new();
        zadd(&store, "z", vec![(1.0, "m".into())], SortedSetOptions::default());
        let resp = zadd(
            &store,
            "z",
            vec![(9.0, "m".into())],
            SortedSetOptions { mode: KvWriteMode::Insert, ..Default::default() },
        );
        assert_eq!(resp.int_result, Some(0));
        let score = kv_read(&store, "z", KvReadCommand::ZScore { member: "m".into() });
        assert_eq!(score.string_result.as_deref(), Some("1"));
    }

    #[test]
    fn xx_never_creates_a_missing_member() {
        let store = MemDocStore::new();
        let resp = zadd(
            &store,
            "z",
            vec![(1.0, "m".into())],
            SortedSetOptions { mode: KvWriteMode::Update, ..Default::default() },
        );
        assert_eq!(resp.int_result, Some(0));
        let score = kv_read(&store, "z", KvReadCommand::ZScore { member: "m".into() });
        assert_eq!(score.code, KvStatusCode::NotFound);
        assert_eq!(kv_read(&store, "z", KvReadCommand::Exists).int_result, Some(0));
    }

    #[test]
    fn incr_returns_the_new_score() {
        let store = MemDocStore::new();
        zadd(&store, "z", vec![(1.5, "m".into())], SortedSetOptions::default());
        let resp = zadd(
            &store,
            "z",
            vec![(2.0, "m".into())],
            SortedSetOptions { incr: true, ..Default::default() },
        );
        assert_eq!(resp.string_result.as_deref(), Some("3.5"));
    }

    #[test]
    fn range_by_score_is_ascending() {
        let store = MemDocStore::new();
        zadd(
            &store,
            "z",
            vec![(3.0, "c".into()), (1.0, "a".into()), (2.0, "b".into())],
            SortedSetOptions::default(),
        );
        let resp = kv_read(&store, "z", KvReadCommand::ZRangeByScore {
            lower: KvBound::Inclusive(1.0),
            upper: KvBound::Exclusive(3.0),
            with_scores: false,
        });
        assert_eq!(resp.array_result, Some(vec!["a".into(), "b".into()]));

        let with_scores = kv_read(&store, "z", KvReadCommand::ZRangeByScore {
            lower: KvBound::NegInfinity,
            upper: KvBound::PosInfinity,
            with_scores: true,
        });
        assert_eq!(
            with_scores.array_result,
            Some(vec!["a".into(), "1".into(), "b".into(), "2".into(), "c".into(), "3".into()])
        );
    }

    #[test]
    fn zrem_updates_cardinality_and_both_mirrors() {
        let store = MemDocStore::new();
        zadd(
            &store,
            "z",
            vec![(1.0, "a".into()), (2.0, "b".into())],
            SortedSetOptions::default(),
        );
        let resp = kv_write(&store, "z", KvWriteCommand::ZRem { members: vec!["a".into()] });
        assert_eq!(resp.int_result, Some(1));
        assert_eq!(kv_read(&store, "z", KvReadCommand::ZCard).int_result, Some(1));
        let range = kv_read(&store, "z", KvReadCommand::ZRangeByScore {
            lower: KvBound::NegInfinity,
            upper: KvBound::PosInfinity,
            with_scores: false,
        });
        assert_eq!(range.array_result, Some(vec!["b".into()]));
    }

    #[test]
    fn moving_a_score_leaves_no_stale_forward_entry() {
        let store = MemDocStore::new();
        zadd(&store, "z", vec![(1.0, "m".into())], SortedSetOptions::default());
        zadd(&store, "z", vec![(5.0, "m".into())], SortedSetOptions::default());
        let range = kv_read(&store, "z", KvReadCommand::ZRangeByScore {
            lower: KvBound::NegInfinity,
            upper: KvBound::PosInfinity,
            with_scores: true,
        });
        assert_eq!(range.array_result, Some(vec!["m".into(), "5".into()]));
        assert_eq!(kv_read(&store, "z", KvReadCommand::ZCard).int_result, Some(1));
    }
}

mod time_series {
    use super::*;

    #[test]
    fn tsget_hits_and_misses() {
        let store = MemDocStore::new();
        let resp = kv_write(&store, "t", KvWriteCommand::TsAdd {
            entries: vec![(10, "a".into()), (20, "b".into())],
            ttl_ms: None,
        });
        assert_eq!(resp.code, KvStatusCode::Ok);
        let got = kv_read(&store, "t", KvReadCommand::TsGet { timestamp: 10 });
        assert_eq!(got.string_result.as_deref(), Some("a"));
        let missing = kv_read(&store, "t", KvReadCommand::TsGet { timestamp: 15 });
        assert_eq!(missing.code, KvStatusCode::NotFound);
    }

    #[test]
    fn range_by_time_is_ascending() {
        let store = MemDocStore::new();
        kv_write(&store, "t", KvWriteCommand::TsAdd {
            entries: vec![(30, "c".into()), (10, "a".into()), (20, "b".into())],
            ttl_ms: None,
        });
        let resp = kv_read(&store, "t", KvReadCommand::TsRangeByTime {
            lower: KvBound::Inclusive(10),
            upper: KvBound::Exclusive(30),
        });
        assert_eq!(
            resp.array_result,
            Some(vec!["10".into(), "a".into(), "20".into(), "b".into()])
        );
    }

    #[test]
    fn tsrem_is_blind_but_effective() {
        let store = MemDocStore::new();
        kv_write(&store, "t", KvWriteCommand::TsAdd {
            entries: vec![(10, "a".into())],
            ttl_ms: None,
        });
        // Removals count their arguments, not the entries they hit.
        let resp = kv_write(&store, "t", KvWriteCommand::TsRem { timestamps: vec![10, 99] });
        assert_eq!(resp.int_result, Some(2));
        let got = kv_read(&store, "t", KvReadCommand::TsGet { timestamp: 10 });
        assert_eq!(got.code, KvStatusCode::NotFound);
    }
}

mod emulation {
    use super::*;

    #[test]
    fn ack_commands_collapse_to_plain_ok() {
        let store = MemDocStore::new();
        let resp = kv_write_mode(
            &store,
            "k",
            KvWriteCommand::Set { value: "v".into(), ttl_ms: None, mode: KvWriteMode::Upsert },
            false,
        );
        assert_eq!(resp, KvResponse::ok());
        let del = kv_write_mode(&store, "k", KvWriteCommand::Del, false);
        assert_eq!(del, KvResponse::ok());
    }

    #[test]
    fn value_returning_commands_keep_their_payload() {
        let store = MemDocStore::new();
        let resp = kv_write_mode(
            &store,
            "n",
            KvWriteCommand::Incr { delta: 2, field: None },
            false,
        );
        assert_eq!(resp.int_result, Some(2));
    }

    #[test]
    fn unsupported_list_commands_fail_loudly() {
        let store = MemDocStore::new();
        let mut batch = DocWriteBatch::new(&store);
        let mut restart = RestartReadHt::none();
        let mut op = KvWriteOperation::new(
            KvWriteRequest { target: KvTarget::new("l"), command: KvWriteCommand::Push },
            true,
        );
        let mut ctx = ApplyContext {
            batch: &mut batch,
            read_time: store.read_time_now(),
            restart: &mut restart,
        };
        assert!(op.apply(&mut ctx).is_err());
    }
}

mod batching {
    use super::*;

    /// A second conditional write in the same batch must see the first one
    /// through the batch's lookup cache, before anything hits the store.
    #[test]
    fn pending_writes_are_visible_to_type_probes() {
        let store = MemDocStore::new();
        let mut batch = DocWriteBatch::new(&store);
        let mut restart = RestartReadHt::none();
        let read = store.read_time_now();

        let mut first = KvWriteOperation::new(
            KvWriteRequest {
                target: KvTarget::new("k"),
                command: KvWriteCommand::Set {
                    value: "a".into(),
                    ttl_ms: None,
                    mode: KvWriteMode::Insert,
                },
            },
            true,
        );
        let mut second = KvWriteOperation::new(
            KvWriteRequest {
                target: KvTarget::new("k"),
                command: KvWriteCommand::Set {
                    value: "b".into(),
                    ttl_ms: None,
                    mode: KvWriteMode::Insert,
                },
            },
            true,
        );
        {
            let mut ctx = ApplyContext { batch: &mut batch, read_time: read, restart: &mut restart };
            first.apply(&mut ctx).unwrap();
            second.apply(&mut ctx).unwrap();
        }
        assert_eq!(first.response().int_result, Some(1));
        assert_eq!(second.response().code, KvStatusCode::NotFound);

        store.apply_ops_now(batch.into_ops());
        assert_eq!(kv_read(&store, "k", KvReadCommand::Get).string_result.as_deref(), Some("a"));
    }
}
