//! KV-command write execution
//!
//! A [`KvWriteOperation`] wraps one mutating command. `apply` stages its
//! effects into the context's write batch and records the response; command
//! failures that are part of the protocol (wrong type, non-integer values,
//! skipped conditional writes) land in the response, while infrastructure
//! failures surface as errors.

use tracing::debug;

use dockv_core::{
    ContainerKind, DocPath, Error, IsolationLevel, PrimitiveValue, Result, SubDocument, SubKey,
    Ttl, Value,
};
use dockv_storage::{get_sub_document, DocStore, SubDocReadRequest};

use crate::context::ApplyContext;
use crate::types::{
    KvDataType, KvResponse, KvStatusCode, KvWriteCommand, KvWriteMode, KvWriteRequest,
    SortedSetOptions,
};

/// One mutating KV command, applied against a write batch.
pub struct KvWriteOperation {
    request: KvWriteRequest,
    emulate: bool,
    response: KvResponse,
}

fn ttl_of(ttl_ms: Option<u64>) -> Ttl {
    ttl_ms.map(Ttl::from_millis).unwrap_or(Ttl::UNLIMITED)
}

fn member_key(s: &str) -> SubKey {
    SubKey::String(s.to_string())
}

impl KvWriteOperation {
    /// Wraps a request. `emulate` selects protocol-shaped responses for the
    /// acknowledgement-style commands; when off they collapse to plain ok.
    pub fn new(request: KvWriteRequest, emulate: bool) -> Self {
        KvWriteOperation { request, emulate, response: KvResponse::ok() }
    }

    /// The response recorded by `apply`.
    pub fn response(&self) -> &KvResponse {
        &self.response
    }

    /// Consumes the operation into its response.
    pub fn into_response(self) -> KvResponse {
        self.response
    }

    /// Paths a lock manager would need to cover for this command.
    pub fn doc_paths_to_lock(&self) -> Vec<DocPath> {
        vec![DocPath::root(&self.request.target.doc_key())]
    }

    /// True when applying must read the current document state.
    pub fn require_read(&self) -> bool {
        match &self.request.command {
            KvWriteCommand::TsAdd { .. } | KvWriteCommand::TsRem { .. } => false,
            KvWriteCommand::Set { mode: KvWriteMode::Upsert, .. } => false,
            KvWriteCommand::Del => self.emulate,
            _ => true,
        }
    }

    /// Snapshot isolation when the command reads, serializable otherwise.
    pub fn isolation_level(&self) -> IsolationLevel {
        if self.require_read() {
            IsolationLevel::Snapshot
        } else {
            IsolationLevel::Serializable
        }
    }

    /// Stages the command's writes into `ctx.batch` and records the response.
    pub fn apply<S: DocStore>(&mut self, ctx: &mut ApplyContext<'_, '_, S>) -> Result<()> {
        let doc_key = self.request.target.doc_key();
        let root = DocPath::root(&doc_key);
        debug!(key = %self.request.target.key, "applying KV write");
        let command = self.request.command.clone();
        match command {
            KvWriteCommand::Set { value, ttl_ms, mode } => {
                self.apply_set(ctx, &root, value, ttl_of(ttl_ms), mode)
            }
            KvWriteCommand::HSet { fields, ttl_ms } => self.apply_collection_add(
                ctx,
                &root,
                ContainerKind::Object,
                fields
                    .into_iter()
                    .map(|(f, v)| (member_key(&f), SubDocument::string(v)))
                    .collect(),
                ttl_of(ttl_ms),
            ),
            KvWriteCommand::SAdd { members, ttl_ms } => self.apply_collection_add(
                ctx,
                &root,
                ContainerKind::Set,
                members
                    .into_iter()
                    .map(|m| (member_key(&m), SubDocument::null()))
                    .collect(),
                ttl_of(ttl_ms),
            ),
            KvWriteCommand::TsAdd { entries, ttl_ms } => {
                self.apply_ts_add(ctx, &root, entries, ttl_of(ttl_ms))
            }
            KvWriteCommand::ZAdd { members, options, ttl_ms } => {
                self.apply_zadd(ctx, &root, members, options, ttl_of(ttl_ms))
            }
            KvWriteCommand::GetSet { value } => self.apply_getset(ctx, &root, value),
            KvWriteCommand::Append { value } => self.apply_append(ctx, &root, value),
            KvWriteCommand::SetRange { offset, value } => {
                self.apply_setrange(ctx, &root, offset, value)
            }
            KvWriteCommand::Incr { delta, field } => self.apply_incr(ctx, &root, delta, field),
            KvWriteCommand::Del => self.apply_del(ctx, &root),
            KvWriteCommand::HDel { fields } => self.apply_collection_remove(
                ctx,
                &root,
                KvDataType::Hash,
                fields.iter().map(|f| member_key(f)).collect(),
            ),
            KvWriteCommand::SRem { members } => self.apply_collection_remove(
                ctx,
                &root,
                KvDataType::Set,
                members.iter().map(|m| member_key(m)).collect(),
            ),
            KvWriteCommand::ZRem { members } => self.apply_zrem(ctx, &root, members),
            KvWriteCommand::TsRem { timestamps } => self.apply_ts_rem(ctx, &root, timestamps),
            KvWriteCommand::Push | KvWriteCommand::Insert | KvWriteCommand::Pop => {
                Err(Error::NotSupported("list commands"))
            }
        }
    }

    /// Records a response, collapsing ok-coded payloads when emulation is
    /// off. Used by acknowledgement-style commands only.
    fn finish(&mut self, response: KvResponse) {
        self.response = if self.emulate || response.code != KvStatusCode::Ok {
            response
        } else {
            KvResponse::ok()
        };
    }

    fn value_type_at<S: DocStore>(
        &self,
        ctx: &mut ApplyContext<'_, '_, S>,
        root: &DocPath,
        subkeys: &[SubKey],
    ) -> Result<KvDataType> {
        let mut full = root.encoded_doc_key.clone();
        for sk in subkeys {
            sk.encode_into(&mut full);
        }
        if let Some(kind) = ctx.batch.cached_kind(&full) {
            return KvDataType::from_value_kind(kind);
        }
        let req = SubDocReadRequest::new(&root.encoded_doc_key, subkeys)
            .type_only()
            .for_query(ctx.batch.query_id());
        match get_sub_document(ctx.batch.store(), &req, ctx.read_time, ctx.restart)? {
            Some(doc) => KvDataType::from_value_kind(doc.value_kind()),
            None => Ok(KvDataType::None),
        }
    }

    fn read_doc<S: DocStore>(
        &self,
        ctx: &mut ApplyContext<'_, '_, S>,
        root: &DocPath,
        subkeys: &[SubKey],
    ) -> Result<Option<SubDocument>> {
        let req = SubDocReadRequest::new(&root.encoded_doc_key, subkeys)
            .for_query(ctx.batch.query_id());
        get_sub_document(ctx.batch.store(), &req, ctx.read_time, ctx.restart)
    }

    fn apply_set<S: DocStore>(
        &mut self,
        ctx: &mut ApplyContext<'_, '_, S>,
        root: &DocPath,
        value: String,
        ttl: Ttl,
        mode: KvWriteMode,
    ) -> Result<()> {
        if mode != KvWriteMode::Upsert {
            let exists = self.value_type_at(ctx, root, &[])? != KvDataType::None;
            let skip = match mode {
                KvWriteMode::Insert => exists,
                KvWriteMode::Update => !exists,
                KvWriteMode::Upsert => false,
            };
            if skip {
                self.finish(KvResponse::not_found());
                return Ok(());
            }
        }
        ctx.batch
            .set_primitive(root, Value::primitive(PrimitiveValue::String(value)).with_ttl(ttl))?;
        self.finish(match mode {
            KvWriteMode::Upsert => KvResponse::string("OK"),
            _ => KvResponse::int(1),
        });
        Ok(())
    }

    fn apply_collection_add<S: DocStore>(
        &mut self,
        ctx: &mut ApplyContext<'_, '_, S>,
        root: &DocPath,
        kind: ContainerKind,
        entries: Vec<(SubKey, SubDocument)>,
        ttl: Ttl,
    ) -> Result<()> {
        let expected = match kind {
            ContainerKind::Object => KvDataType::Hash,
            ContainerKind::Set => KvDataType::Set,
            _ => unreachable!("collection add only handles hashes and sets"),
        };
        let current = self.value_type_at(ctx, root, &[])?;
        if current != KvDataType::None && current != expected {
            self.finish(KvResponse::wrong_type());
            return Ok(());
        }

        let new_count = if current == KvDataType::None {
            entries.len() as i64
        } else if self.emulate {
            let mut n = 0;
            for (sk, _) in &entries {
                if self.value_type_at(ctx, root, std::slice::from_ref(sk))? == KvDataType::None {
                    n += 1;
                }
            }
            n
        } else {
            0
        };

        let mut doc = SubDocument::container(kind);
        for (sk, child) in entries {
            doc.set_child(sk, child);
        }
        if current == KvDataType::None {
            ctx.batch.insert_sub_document(root, doc, ttl, None)?;
        } else {
            ctx.batch.extend_sub_document(root, doc, ttl)?;
        }
        self.finish(KvResponse::int(new_count));
        Ok(())
    }

    fn apply_ts_add<S: DocStore>(
        &mut self,
        ctx: &mut ApplyContext<'_, '_, S>,
        root: &DocPath,
        entries: Vec<(i64, String)>,
        ttl: Ttl,
    ) -> Result<()> {
        let current = self.value_type_at(ctx, root, &[])?;
        if current != KvDataType::None && current != KvDataType::TimeSeries {
            self.response = KvResponse::wrong_type();
            return Ok(());
        }
        let mut doc = SubDocument::container(ContainerKind::TimeSeries);
        for (ts, v) in entries {
            doc.set_child(SubKey::DescendingInt64(ts), SubDocument::string(v));
        }
        if current == KvDataType::None {
            ctx.batch.insert_sub_document(root, doc, ttl, None)?;
        } else {
            ctx.batch.extend_sub_document(root, doc, ttl)?;
        }
        // Time-series writes always acknowledge with a bare ok.
        self.response = KvResponse::ok();
        Ok(())
    }

    fn zscore_of<S: DocStore>(
        &self,
        ctx: &mut ApplyContext<'_, '_, S>,
        root: &DocPath,
        member: &str,
    ) -> Result<Option<f64>> {
        let doc =
            self.read_doc(ctx, root, &[SubKey::SortedSetReverse, member_key(member)])?;
        Ok(doc.and_then(|d| d.as_double()))
    }

    fn apply_zadd<S: DocStore>(
        &mut self,
        ctx: &mut ApplyContext<'_, '_, S>,
        root: &DocPath,
        members: Vec<(f64, String)>,
        options: SortedSetOptions,
        ttl: Ttl,
    ) -> Result<()> {
        let current = self.value_type_at(ctx, root, &[])?;
        if current != KvDataType::None && current != KvDataType::SortedSet {
            self.finish(KvResponse::wrong_type());
            return Ok(());
        }
        let exists = current == KvDataType::SortedSet;

        let mut added = 0i64;
        let mut changed = 0i64;
        let mut incr_result: Option<f64> = None;
        // (member, old forward entry to clear, final score)
        let mut writes: Vec<(String, Option<f64>, f64)> = Vec::new();

        for (score, member) in members {
            let old = if exists { self.zscore_of(ctx, root, &member)? } else { None };
            match (old, options.mode) {
                (Some(_), KvWriteMode::Insert) => continue,
                (None, KvWriteMode::Update) => continue,
                _ => {}
            }
            let new_score = match (options.incr, old) {
                (true, Some(old)) => old + score,
                _ => score,
            };
            if options.incr {
                incr_result = Some(new_score);
            }
            match old {
                None => added += 1,
                Some(old) if old != new_score => changed += 1,
                Some(_) => {
                    if !options.incr {
                        continue;
                    }
                }
            }
            writes.push((member, old.filter(|o| *o != new_score), new_score));
        }

        if !exists && !writes.is_empty() {
            ctx.batch.insert_sub_document(
                root,
                SubDocument::container(ContainerKind::SortedSet),
                ttl,
                None,
            )?;
        }
        for (member, old, new_score) in &writes {
            if let Some(old) = old {
                ctx.batch.delete(
                    &root
                        .join(SubKey::SortedSetForward)
                        .join(SubKey::Double(*old))
                        .join(member_key(member)),
                    None,
                )?;
            }
            ctx.batch.set_primitive(
                &root
                    .join(SubKey::SortedSetForward)
                    .join(SubKey::Double(*new_score))
                    .join(member_key(member)),
                Value::primitive(PrimitiveValue::Null).with_ttl(ttl),
            )?;
            ctx.batch.set_primitive(
                &root.join(SubKey::SortedSetReverse).join(member_key(member)),
                Value::primitive(PrimitiveValue::Double(*new_score)).with_ttl(ttl),
            )?;
        }
        if added != 0 || (!exists && !writes.is_empty()) {
            let card = if exists {
                self.read_doc(ctx, root, &[SubKey::Counter])?
                    .and_then(|d| d.as_int64())
                    .unwrap_or(0)
            } else {
                0
            };
            ctx.batch.set_primitive(
                &root.join(SubKey::Counter),
                Value::primitive(PrimitiveValue::Int64(card + added)).with_ttl(ttl),
            )?;
        }

        if options.incr {
            self.response = match incr_result {
                Some(score) => KvResponse::string(format_score(score)),
                None => KvResponse::not_found(),
            };
        } else {
            let counted = if options.ch { added + changed } else { added };
            self.finish(KvResponse::int(counted));
        }
        Ok(())
    }

    fn apply_getset<S: DocStore>(
        &mut self,
        ctx: &mut ApplyContext<'_, '_, S>,
        root: &DocPath,
        value: String,
    ) -> Result<()> {
        let old = match self.read_doc(ctx, root, &[])? {
            None => None,
            Some(doc) => match doc.as_string() {
                Some(s) => Some(s.to_string()),
                None => {
                    self.response = KvResponse::wrong_type();
                    return Ok(());
                }
            },
        };
        ctx.batch.set_primitive(root, Value::primitive(PrimitiveValue::String(value)))?;
        self.response = match old {
            Some(old) => KvResponse::string(old),
            None => KvResponse::not_found(),
        };
        Ok(())
    }

    fn current_string<S: DocStore>(
        &mut self,
        ctx: &mut ApplyContext<'_, '_, S>,
        root: &DocPath,
    ) -> Result<Option<String>> {
        match self.read_doc(ctx, root, &[])? {
            None => Ok(Some(String::new())),
            Some(doc) => match doc.as_string() {
                Some(s) => Ok(Some(s.to_string())),
                None => {
                    self.response = KvResponse::wrong_type();
                    Ok(None)
                }
            },
        }
    }

    fn apply_append<S: DocStore>(
        &mut self,
        ctx: &mut ApplyContext<'_, '_, S>,
        root: &DocPath,
        value: String,
    ) -> Result<()> {
        let Some(mut current) = self.current_string(ctx, root)? else {
            return Ok(());
        };
        current.push_str(&value);
        let len = current.len() as i64;
        ctx.batch.set_primitive(root, Value::primitive(PrimitiveValue::String(current)))?;
        self.response = KvResponse::int(len);
        Ok(())
    }

    fn apply_setrange<S: DocStore>(
        &mut self,
        ctx: &mut ApplyContext<'_, '_, S>,
        root: &DocPath,
        offset: usize,
        value: String,
    ) -> Result<()> {
        let Some(current) = self.current_string(ctx, root)? else {
            return Ok(());
        };
        let mut bytes = current.into_bytes();
        if bytes.len() < offset {
            bytes.resize(offset, 0);
        }
        let end = offset + value.len();
        if bytes.len() < end {
            bytes.resize(end, 0);
        }
        bytes[offset..end].copy_from_slice(value.as_bytes());
        let len = bytes.len() as i64;
        let patched = String::from_utf8(bytes)
            .map_err(|e| Error::InvalidArgument(format!("SETRANGE produced non-UTF8 data: {e}")))?;
        ctx.batch.set_primitive(root, Value::primitive(PrimitiveValue::String(patched)))?;
        self.response = KvResponse::int(len);
        Ok(())
    }

    fn apply_incr<S: DocStore>(
        &mut self,
        ctx: &mut ApplyContext<'_, '_, S>,
        root: &DocPath,
        delta: i64,
        field: Option<String>,
    ) -> Result<()> {
        let current_type = self.value_type_at(ctx, root, &[])?;
        let (subkeys, expected) = match &field {
            Some(f) => (vec![member_key(f)], KvDataType::Hash),
            None => (Vec::new(), KvDataType::String),
        };
        if current_type != KvDataType::None && current_type != expected {
            self.response = KvResponse::wrong_type();
            return Ok(());
        }
        let current = self
            .read_doc(ctx, root, &subkeys)?
            .and_then(|d| d.as_string().map(|s| s.to_string()));
        let parsed: i64 = match current {
            None => 0,
            Some(s) => match s.parse() {
                Ok(v) => v,
                Err(_) => {
                    self.response = KvResponse::error(match field {
                        Some(_) => "ERR hash value is not an integer",
                        None => "ERR value is not an integer or out of range",
                    });
                    return Ok(());
                }
            },
        };
        let Some(next) = parsed.checked_add(delta) else {
            self.response = KvResponse::error("ERR increment or decrement would overflow");
            return Ok(());
        };
        match field {
            Some(f) => {
                let mut doc = SubDocument::object();
                doc.set_child(member_key(&f), SubDocument::string(next.to_string()));
                if current_type == KvDataType::None {
                    ctx.batch.insert_sub_document(root, doc, Ttl::UNLIMITED, None)?;
                } else {
                    ctx.batch.extend_sub_document(root, doc, Ttl::UNLIMITED)?;
                }
            }
            None => {
                ctx.batch
                    .set_primitive(root, Value::primitive(PrimitiveValue::String(next.to_string())))?;
            }
        }
        self.response = KvResponse::int(next);
        Ok(())
    }

    fn apply_del<S: DocStore>(
        &mut self,
        ctx: &mut ApplyContext<'_, '_, S>,
        root: &DocPath,
    ) -> Result<()> {
        let existed = if self.emulate {
            self.value_type_at(ctx, root, &[])? != KvDataType::None
        } else {
            false
        };
        ctx.batch.delete(root, None)?;
        self.finish(KvResponse::int(existed as i64));
        Ok(())
    }

    fn apply_collection_remove<S: DocStore>(
        &mut self,
        ctx: &mut ApplyContext<'_, '_, S>,
        root: &DocPath,
        expected: KvDataType,
        members: Vec<SubKey>,
    ) -> Result<()> {
        let current = self.value_type_at(ctx, root, &[])?;
        if current == KvDataType::None {
            self.finish(KvResponse::int(0));
            return Ok(());
        }
        if current != expected {
            self.finish(KvResponse::wrong_type());
            return Ok(());
        }
        let mut removed = 0;
        for member in members {
            if self.value_type_at(ctx, root, std::slice::from_ref(&member))? != KvDataType::None {
                ctx.batch.delete(&root.join(member), None)?;
                removed += 1;
            }
        }
        self.finish(KvResponse::int(removed));
        Ok(())
    }

    fn apply_zrem<S: DocStore>(
        &mut self,
        ctx: &mut ApplyContext<'_, '_, S>,
        root: &DocPath,
        members: Vec<String>,
    ) -> Result<()> {
        let current = self.value_type_at(ctx, root, &[])?;
        if current == KvDataType::None {
            self.finish(KvResponse::int(0));
            return Ok(());
        }
        if current != KvDataType::SortedSet {
            self.finish(KvResponse::wrong_type());
            return Ok(());
        }
        let mut removed = 0i64;
        for member in &members {
            if let Some(score) = self.zscore_of(ctx, root, member)? {
                ctx.batch.delete(
                    &root
                        .join(SubKey::SortedSetForward)
                        .join(SubKey::Double(score))
                        .join(member_key(member)),
                    None,
                )?;
                ctx.batch
                    .delete(&root.join(SubKey::SortedSetReverse).join(member_key(member)), None)?;
                removed += 1;
            }
        }
        if removed != 0 {
            let card = self
                .read_doc(ctx, root, &[SubKey::Counter])?
                .and_then(|d| d.as_int64())
                .unwrap_or(0);
            ctx.batch.set_primitive(
                &root.join(SubKey::Counter),
                Value::primitive(PrimitiveValue::Int64(card - removed)),
            )?;
        }
        self.finish(KvResponse::int(removed));
        Ok(())
    }

    /// Blind range delete: tombstones are written without reading the
    /// current entries, so concurrent readers never block on it.
    fn apply_ts_rem<S: DocStore>(
        &mut self,
        ctx: &mut ApplyContext<'_, '_, S>,
        root: &DocPath,
        timestamps: Vec<i64>,
    ) -> Result<()> {
        let n = timestamps.len() as i64;
        for ts in timestamps {
            ctx.batch.delete(&root.join(SubKey::DescendingInt64(ts)), None)?;
        }
        self.finish(KvResponse::int(n));
        Ok(())
    }
}

/// Scores render the way the emulated protocol prints doubles: integral
/// values drop the fraction.
pub(crate) fn format_score(score: f64) -> String {
    if score.fract() == 0.0 && score.is_finite() {
        format!("{}", score as i64)
    } else {
        format!("{score}")
    }
}
