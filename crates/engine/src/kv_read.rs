//! KV-command read execution
//!
//! A [`KvReadOperation`] resolves one reading command against a store
//! snapshot. Array-shaped responses list pairs inline (`field, value, ...`);
//! per-element misses in `HMGET` come back as empty strings.

use std::ops::Bound;

use tracing::debug;

use dockv_core::{DocPath, Error, ReadHybridTime, Result, RestartReadHt, SubDocument, SubKey};
use dockv_storage::{get_sub_document, DocStore, SubDocReadRequest};

use crate::kv_write::format_score;
use crate::types::{KvBound, KvDataType, KvReadCommand, KvReadRequest, KvResponse};

/// One reading KV command.
pub struct KvReadOperation {
    request: KvReadRequest,
    response: KvResponse,
}

fn member_key(s: &str) -> SubKey {
    SubKey::String(s.to_string())
}

impl KvReadOperation {
    /// Wraps a request.
    pub fn new(request: KvReadRequest) -> Self {
        KvReadOperation { request, response: KvResponse::ok() }
    }

    /// The response recorded by `execute`.
    pub fn response(&self) -> &KvResponse {
        &self.response
    }

    /// Consumes the operation into its response.
    pub fn into_response(self) -> KvResponse {
        self.response
    }

    /// Resolves the command at the given snapshot.
    pub fn execute<S: DocStore>(
        &mut self,
        store: &S,
        read: ReadHybridTime,
        restart: &mut RestartReadHt,
    ) -> Result<()> {
        let root = DocPath::root(&self.request.target.doc_key());
        debug!(key = %self.request.target.key, "executing KV read");
        let command = self.request.command.clone();
        self.response = match command {
            KvReadCommand::Get => self.get_string(store, &root, read, restart)?,
            KvReadCommand::Exists => {
                let kind = type_at(store, &root, &[], read, restart)?;
                KvResponse::int((kind != KvDataType::None) as i64)
            }
            KvReadCommand::Strlen => match self.string_value(store, &root, read, restart)? {
                StringLookup::Found(s) => KvResponse::int(s.len() as i64),
                StringLookup::Missing => KvResponse::int(0),
                StringLookup::WrongType => KvResponse::wrong_type(),
            },
            KvReadCommand::GetRange { start, end } => {
                match self.string_value(store, &root, read, restart)? {
                    StringLookup::Found(s) => match substring(&s, start, end) {
                        Some(out) => KvResponse::string(out),
                        None => KvResponse::index_out_of_bounds(),
                    },
                    StringLookup::Missing => KvResponse::string(""),
                    StringLookup::WrongType => KvResponse::wrong_type(),
                }
            }
            KvReadCommand::HGet { field } => {
                self.child_string(store, &root, KvDataType::Hash, member_key(&field), read, restart)?
            }
            KvReadCommand::HMGet { fields } => {
                match self.container(store, &root, KvDataType::Hash, read, restart)? {
                    ContainerLookup::WrongType => KvResponse::wrong_type(),
                    ContainerLookup::Missing => {
                        KvResponse::array(vec![String::new(); fields.len()])
                    }
                    ContainerLookup::Found(doc) => {
                        let items = fields
                            .iter()
                            .map(|f| {
                                doc.get_child(&member_key(f))
                                    .and_then(|d| d.as_string())
                                    .unwrap_or("")
                                    .to_string()
                            })
                            .collect();
                        KvResponse::array(items)
                    }
                }
            }
            KvReadCommand::HExists { field } => {
                let kind = type_at(store, &root, &[], read, restart)?;
                match kind {
                    KvDataType::None => KvResponse::int(0),
                    KvDataType::Hash => {
                        let sub = type_at(store, &root, &[member_key(&field)], read, restart)?;
                        KvResponse::int((sub != KvDataType::None) as i64)
                    }
                    _ => KvResponse::wrong_type(),
                }
            }
            KvReadCommand::HStrLen { field } => {
                let r = self.child_string(store, &root, KvDataType::Hash, member_key(&field), read, restart)?;
                match (&r.string_result, r.code) {
                    (Some(s), _) => KvResponse::int(s.len() as i64),
                    (None, crate::types::KvStatusCode::WrongType) => r,
                    _ => KvResponse::int(0),
                }
            }
            KvReadCommand::HGetAll => {
                self.collection_items(store, &root, KvDataType::Hash, true, read, restart)?
            }
            KvReadCommand::HKeys => {
                self.collection_keys(store, &root, KvDataType::Hash, read, restart)?
            }
            KvReadCommand::HVals => {
                match self.container(store, &root, KvDataType::Hash, read, restart)? {
                    ContainerLookup::WrongType => KvResponse::wrong_type(),
                    ContainerLookup::Missing => KvResponse::array(Vec::new()),
                    ContainerLookup::Found(doc) => KvResponse::array(
                        doc.entries()
                            .into_iter()
                            .flatten()
                            .filter_map(|(_, v)| v.as_string().map(str::to_string))
                            .collect(),
                    ),
                }
            }
            KvReadCommand::HLen => {
                self.collection_len(store, &root, KvDataType::Hash, read, restart)?
            }
            KvReadCommand::SIsMember { member } => {
                let kind = type_at(store, &root, &[], read, restart)?;
                match kind {
                    KvDataType::None => KvResponse::int(0),
                    KvDataType::Set => {
                        let sub = type_at(store, &root, &[member_key(&member)], read, restart)?;
                        KvResponse::int((sub != KvDataType::None) as i64)
                    }
                    _ => KvResponse::wrong_type(),
                }
            }
            KvReadCommand::SMembers => {
                self.collection_keys(store, &root, KvDataType::Set, read, restart)?
            }
            KvReadCommand::SCard => {
                self.collection_len(store, &root, KvDataType::Set, read, restart)?
            }
            KvReadCommand::ZCard => {
                let kind = type_at(store, &root, &[], read, restart)?;
                match kind {
                    KvDataType::None => KvResponse::int(0),
                    KvDataType::SortedSet => {
                        let card = read_at(store, &root, &[SubKey::Counter], read, restart)?
                            .and_then(|d| d.as_int64())
                            .unwrap_or(0);
                        KvResponse::int(card)
                    }
                    _ => KvResponse::wrong_type(),
                }
            }
            KvReadCommand::ZScore { member } => {
                let kind = type_at(store, &root, &[], read, restart)?;
                match kind {
                    KvDataType::None => KvResponse::not_found(),
                    KvDataType::SortedSet => {
                        let score =
                            read_at(store, &root, &[SubKey::SortedSetReverse, member_key(&member)], read, restart)?
                                .and_then(|d| d.as_double());
                        match score {
                            Some(s) => KvResponse::string(format_score(s)),
                            None => KvResponse::not_found(),
                        }
                    }
                    _ => KvResponse::wrong_type(),
                }
            }
            KvReadCommand::ZRangeByScore { lower, upper, with_scores } => {
                self.zrange_by_score(store, &root, lower, upper, with_scores, read, restart)?
            }
            KvReadCommand::TsGet { timestamp } => self.child_string(
                store,
                &root,
                KvDataType::TimeSeries,
                SubKey::DescendingInt64(timestamp),
                read,
                restart,
            )?,
            KvReadCommand::TsRangeByTime { lower, upper } => {
                self.ts_range_by_time(store, &root, lower, upper, read, restart)?
            }
            KvReadCommand::MGet => return Err(Error::NotSupported("multi-key reads")),
        };
        Ok(())
    }

    fn get_string<S: DocStore>(
        &self,
        store: &S,
        root: &DocPath,
        read: ReadHybridTime,
        restart: &mut RestartReadHt,
    ) -> Result<KvResponse> {
        Ok(match self.string_value(store, root, read, restart)? {
            StringLookup::Found(s) => KvResponse::string(s),
            StringLookup::Missing => KvResponse::not_found(),
            StringLookup::WrongType => KvResponse::wrong_type(),
        })
    }

    fn string_value<S: DocStore>(
        &self,
        store: &S,
        root: &DocPath,
        read: ReadHybridTime,
        restart: &mut RestartReadHt,
    ) -> Result<StringLookup> {
        Ok(match read_at(store, root, &[], read, restart)? {
            None => StringLookup::Missing,
            Some(doc) => match doc.as_string() {
                Some(s) => StringLookup::Found(s.to_string()),
                None => StringLookup::WrongType,
            },
        })
    }

    fn container<S: DocStore>(
        &self,
        store: &S,
        root: &DocPath,
        expected: KvDataType,
        read: ReadHybridTime,
        restart: &mut RestartReadHt,
    ) -> Result<ContainerLookup> {
        let doc = read_at(store, root, &[], read, restart)?;
        Ok(match doc {
            None => ContainerLookup::Missing,
            Some(doc) => {
                let kind = KvDataType::from_value_kind(doc.value_kind())?;
                if kind == expected {
                    ContainerLookup::Found(doc)
                } else {
                    ContainerLookup::WrongType
                }
            }
        })
    }

    fn child_string<S: DocStore>(
        &self,
        store: &S,
        root: &DocPath,
        expected: KvDataType,
        child: SubKey,
        read: ReadHybridTime,
        restart: &mut RestartReadHt,
    ) -> Result<KvResponse> {
        let kind = type_at(store, root, &[], read, restart)?;
        if kind == KvDataType::None {
            return Ok(KvResponse::not_found());
        }
        if kind != expected {
            return Ok(KvResponse::wrong_type());
        }
        Ok(match read_at(store, root, std::slice::from_ref(&child), read, restart)? {
            Some(doc) => match doc.as_string() {
                Some(s) => KvResponse::string(s),
                None => KvResponse::not_found(),
            },
            None => KvResponse::not_found(),
        })
    }

    fn collection_keys<S: DocStore>(
        &self,
        store: &S,
        root: &DocPath,
        expected: KvDataType,
        read: ReadHybridTime,
        restart: &mut RestartReadHt,
    ) -> Result<KvResponse> {
        Ok(match self.container(store, root, expected, read, restart)? {
            ContainerLookup::WrongType => KvResponse::wrong_type(),
            ContainerLookup::Missing => KvResponse::array(Vec::new()),
            ContainerLookup::Found(doc) => KvResponse::array(
                doc.entries()
                    .into_iter()
                    .flatten()
                    .filter_map(|(k, _)| match k {
                        SubKey::String(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect(),
            ),
        })
    }

    fn collection_items<S: DocStore>(
        &self,
        store: &S,
        root: &DocPath,
        expected: KvDataType,
        with_values: bool,
        read: ReadHybridTime,
        restart: &mut RestartReadHt,
    ) -> Result<KvResponse> {
        Ok(match self.container(store, root, expected, read, restart)? {
            ContainerLookup::WrongType => KvResponse::wrong_type(),
            ContainerLookup::Missing => KvResponse::array(Vec::new()),
            ContainerLookup::Found(doc) => {
                let mut items = Vec::new();
                for (k, v) in doc.entries().into_iter().flatten() {
                    if let SubKey::String(s) = k {
                        items.push(s.clone());
                        if with_values {
                            items.push(v.as_string().unwrap_or("").to_string());
                        }
                    }
                }
                KvResponse::array(items)
            }
        })
    }

    fn collection_len<S: DocStore>(
        &self,
        store: &S,
        root: &DocPath,
        expected: KvDataType,
        read: ReadHybridTime,
        restart: &mut RestartReadHt,
    ) -> Result<KvResponse> {
        Ok(match self.container(store, root, expected, read, restart)? {
            ContainerLookup::WrongType => KvResponse::wrong_type(),
            ContainerLookup::Missing => KvResponse::int(0),
            ContainerLookup::Found(doc) => KvResponse::int(doc.num_children() as i64),
        })
    }

    fn zrange_by_score<S: DocStore>(
        &self,
        store: &S,
        root: &DocPath,
        lower: KvBound<f64>,
        upper: KvBound<f64>,
        with_scores: bool,
        read: ReadHybridTime,
        restart: &mut RestartReadHt,
    ) -> Result<KvResponse> {
        let kind = type_at(store, root, &[], read, restart)?;
        match kind {
            KvDataType::None => return Ok(KvResponse::array(Vec::new())),
            KvDataType::SortedSet => {}
            _ => return Ok(KvResponse::wrong_type()),
        }
        let low = match lower {
            KvBound::NegInfinity => Bound::Unbounded,
            KvBound::Inclusive(s) => Bound::Included(SubKey::Double(s)),
            KvBound::Exclusive(s) => Bound::Excluded(SubKey::Double(s)),
            KvBound::PosInfinity => return Ok(KvResponse::array(Vec::new())),
        };
        let high = match upper {
            KvBound::PosInfinity => Bound::Unbounded,
            KvBound::Inclusive(s) => Bound::Included(SubKey::Double(s)),
            KvBound::Exclusive(s) => Bound::Excluded(SubKey::Double(s)),
            KvBound::NegInfinity => return Ok(KvResponse::array(Vec::new())),
        };
        let subkeys = [SubKey::SortedSetForward];
        let req = SubDocReadRequest::new(&root.encoded_doc_key, &subkeys).with_bounds(low, high);
        let doc = get_sub_document(store, &req, read, restart)?;
        let mut items = Vec::new();
        if let Some(doc) = doc {
            for (score_key, members) in doc.entries().into_iter().flatten() {
                let SubKey::Double(score) = score_key else { continue };
                for member in members.entries().into_iter().flatten().map(|(k, _)| k) {
                    if let SubKey::String(m) = member {
                        items.push(m.clone());
                        if with_scores {
                            items.push(format_score(*score));
                        }
                    }
                }
            }
        }
        Ok(KvResponse::array(items))
    }

    fn ts_range_by_time<S: DocStore>(
        &self,
        store: &S,
        root: &DocPath,
        lower: KvBound<i64>,
        upper: KvBound<i64>,
        read: ReadHybridTime,
        restart: &mut RestartReadHt,
    ) -> Result<KvResponse> {
        let kind = type_at(store, root, &[], read, restart)?;
        match kind {
            KvDataType::None => return Ok(KvResponse::array(Vec::new())),
            KvDataType::TimeSeries => {}
            _ => return Ok(KvResponse::wrong_type()),
        }
        // Timestamps encode descending, so the scan's low edge comes from
        // the upper timestamp bound and vice versa.
        let low = match upper {
            KvBound::PosInfinity => Bound::Unbounded,
            KvBound::Inclusive(t) => Bound::Included(SubKey::DescendingInt64(t)),
            KvBound::Exclusive(t) => Bound::Excluded(SubKey::DescendingInt64(t)),
            KvBound::NegInfinity => return Ok(KvResponse::array(Vec::new())),
        };
        let high = match lower {
            KvBound::NegInfinity => Bound::Unbounded,
            KvBound::Inclusive(t) => Bound::Included(SubKey::DescendingInt64(t)),
            KvBound::Exclusive(t) => Bound::Excluded(SubKey::DescendingInt64(t)),
            KvBound::PosInfinity => return Ok(KvResponse::array(Vec::new())),
        };
        let req = SubDocReadRequest::new(&root.encoded_doc_key, &[]).with_bounds(low, high);
        let doc = get_sub_document(store, &req, read, restart)?;
        let mut items = Vec::new();
        if let Some(doc) = doc {
            // Entries iterate newest-first; the response lists ascending time.
            for (k, v) in doc.entries().into_iter().flatten().collect::<Vec<_>>().into_iter().rev()
            {
                if let (SubKey::DescendingInt64(ts), Some(val)) = (k, v.as_string()) {
                    items.push(ts.to_string());
                    items.push(val.to_string());
                }
            }
        }
        Ok(KvResponse::array(items))
    }
}

enum StringLookup {
    Found(String),
    Missing,
    WrongType,
}

enum ContainerLookup {
    Found(SubDocument),
    Missing,
    WrongType,
}

fn type_at<S: DocStore>(
    store: &S,
    root: &DocPath,
    subkeys: &[SubKey],
    read: ReadHybridTime,
    restart: &mut RestartReadHt,
) -> Result<KvDataType> {
    let req = SubDocReadRequest::new(&root.encoded_doc_key, subkeys).type_only();
    match get_sub_document(store, &req, read, restart)? {
        Some(doc) => KvDataType::from_value_kind(doc.value_kind()),
        None => Ok(KvDataType::None),
    }
}

fn read_at<S: DocStore>(
    store: &S,
    root: &DocPath,
    subkeys: &[SubKey],
    read: ReadHybridTime,
    restart: &mut RestartReadHt,
) -> Result<Option<SubDocument>> {
    let req = SubDocReadRequest::new(&root.encoded_doc_key, subkeys);
    get_sub_document(store, &req, read, restart)
}

/// Inclusive substring with negative-from-the-end positions. A position
/// resolving outside `[0, len]` is out of range and yields `None` rather
/// than being clamped.
fn substring(s: &str, start: i64, end: i64) -> Option<String> {
    let len = s.len() as i64;
    let resolve = |i: i64| {
        let i = if i < 0 { len + i } else { i };
        (0..=len).contains(&i).then_some(i)
    };
    let start = resolve(start)?;
    let end = resolve(end)?.min(len - 1);
    if start > end {
        return Some(String::new());
    }
    Some(String::from_utf8_lossy(&s.as_bytes()[start as usize..=end as usize]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substring_positions() {
        assert_eq!(substring("hello", 0, 1).as_deref(), Some("he"));
        assert_eq!(substring("hello", 0, -1).as_deref(), Some("hello"));
        assert_eq!(substring("hello", -3, -2).as_deref(), Some("ll"));
        assert_eq!(substring("hello", 0, 5).as_deref(), Some("hello"));
        assert_eq!(substring("hello", 3, 1).as_deref(), Some(""));
        assert_eq!(substring("", 0, 0).as_deref(), Some(""));
    }

    #[test]
    fn test_substring_out_of_range_positions() {
        assert_eq!(substring("hello", 4, 10), None);
        assert_eq!(substring("hello", -9, 2), None);
        assert_eq!(substring("hello", 6, 6), None);
        assert_eq!(substring("", 0, 5), None);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_substring_is_contained(
                s in "[a-z]{0,16}",
                start in -20i64..20,
                end in -20i64..20,
            ) {
                if let Some(out) = substring(&s, start, end) {
                    prop_assert!(out.len() <= s.len());
                    prop_assert!(s.contains(&out));
                }
            }
        }
    }
}
