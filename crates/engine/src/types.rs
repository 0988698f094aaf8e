//! KV-command request and response model
//!
//! Commands address a whole document by a single string key (hashed into the
//! key's hash section) and operate on one of five shapes: plain string,
//! hash, set, sorted set, or time series. Responses follow the emulated
//! protocol's conventions when emulation is on, and collapse to ok/error
//! statuses when it is off.

use dockv_core::{hash_code_for, DocKey, Error, Result, SubKey, ValueKind};

/// The shape a KV document currently has, as a type probe reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvDataType {
    /// Nothing visible at the key.
    None,
    /// Plain string value.
    String,
    /// Field-to-value hash.
    Hash,
    /// Set of members.
    Set,
    /// Sorted set.
    SortedSet,
    /// Time series.
    TimeSeries,
}

impl KvDataType {
    /// Maps a stored value kind onto the command-level type.
    pub fn from_value_kind(kind: ValueKind) -> Result<KvDataType> {
        match kind {
            ValueKind::Tombstone => Ok(KvDataType::None),
            ValueKind::Null | ValueKind::String => Ok(KvDataType::String),
            ValueKind::Object => Ok(KvDataType::Hash),
            ValueKind::Set => Ok(KvDataType::Set),
            ValueKind::SortedSet => Ok(KvDataType::SortedSet),
            ValueKind::TimeSeries => Ok(KvDataType::TimeSeries),
            ValueKind::Int64 | ValueKind::Double => Err(Error::Corruption(format!(
                "unexpected value kind {kind:?} in KV document"
            ))),
        }
    }
}

/// The document a command targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvTarget {
    /// User-visible key.
    pub key: String,
    /// Pre-computed hash code, when the router already chose one.
    pub hash_code: Option<u16>,
}

impl KvTarget {
    /// Target with a computed hash code.
    pub fn new(key: impl Into<String>) -> Self {
        KvTarget { key: key.into(), hash_code: None }
    }

    /// The document key this target addresses.
    pub fn doc_key(&self) -> DocKey {
        let hashed = vec![SubKey::String(self.key.clone())];
        let code = self.hash_code.unwrap_or_else(|| hash_code_for(&hashed));
        DocKey::with_hash_code(code, hashed, Vec::new())
    }
}

/// Existence requirement for set-style writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KvWriteMode {
    /// Write unconditionally.
    #[default]
    Upsert,
    /// Only write when absent (NX).
    Insert,
    /// Only write when present (XX).
    Update,
}

/// Options controlling sorted-set add semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortedSetOptions {
    /// Existence requirement per member.
    pub mode: KvWriteMode,
    /// Count changed members as well as added ones in the response.
    pub ch: bool,
    /// Treat scores as increments to existing scores.
    pub incr: bool,
}

/// One mutating KV command.
#[derive(Debug, Clone, PartialEq)]
pub enum KvWriteCommand {
    /// Set the plain-string value of the key.
    Set {
        /// New value.
        value: String,
        /// Expiry in milliseconds, if any.
        ttl_ms: Option<u64>,
        /// Existence requirement for the whole key.
        mode: KvWriteMode,
    },
    /// Set hash fields, creating the hash if absent.
    HSet {
        /// Field/value pairs.
        fields: Vec<(String, String)>,
        /// Expiry in milliseconds, if any.
        ttl_ms: Option<u64>,
    },
    /// Add set members, creating the set if absent.
    SAdd {
        /// Members to add.
        members: Vec<String>,
        /// Expiry in milliseconds, if any.
        ttl_ms: Option<u64>,
    },
    /// Add time-series entries, creating the series if absent.
    TsAdd {
        /// Timestamp/value pairs.
        entries: Vec<(i64, String)>,
        /// Expiry in milliseconds, if any.
        ttl_ms: Option<u64>,
    },
    /// Add sorted-set members with scores.
    ZAdd {
        /// Score/member pairs.
        members: Vec<(f64, String)>,
        /// NX/XX/CH/INCR handling.
        options: SortedSetOptions,
        /// Expiry in milliseconds, if any.
        ttl_ms: Option<u64>,
    },
    /// Swap in a new string value, returning the old one.
    GetSet {
        /// New value.
        value: String,
    },
    /// Append to the string value.
    Append {
        /// Suffix to append.
        value: String,
    },
    /// Overwrite part of the string value, zero-padding any gap.
    SetRange {
        /// Byte offset the patch starts at.
        offset: usize,
        /// Replacement bytes.
        value: String,
    },
    /// Add a signed delta to an integer-valued string or hash field.
    Incr {
        /// Delta to add.
        delta: i64,
        /// Hash field, when incrementing inside a hash.
        field: Option<String>,
    },
    /// Delete the whole document.
    Del,
    /// Remove hash fields.
    HDel {
        /// Fields to remove.
        fields: Vec<String>,
    },
    /// Remove set members.
    SRem {
        /// Members to remove.
        members: Vec<String>,
    },
    /// Remove sorted-set members.
    ZRem {
        /// Members to remove.
        members: Vec<String>,
    },
    /// Remove time-series entries by timestamp, without reading them first.
    TsRem {
        /// Timestamps to remove.
        timestamps: Vec<i64>,
    },
    /// List push. Recognized but not implemented.
    Push,
    /// List insert. Recognized but not implemented.
    Insert,
    /// List pop. Recognized but not implemented.
    Pop,
}

/// A mutating KV request.
#[derive(Debug, Clone, PartialEq)]
pub struct KvWriteRequest {
    /// Document the command targets.
    pub target: KvTarget,
    /// The command itself.
    pub command: KvWriteCommand,
}

/// A bound on scores or timestamps in range reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KvBound<T> {
    /// Unbounded below.
    NegInfinity,
    /// Unbounded above.
    PosInfinity,
    /// Closed bound.
    Inclusive(T),
    /// Open bound.
    Exclusive(T),
}

/// One reading KV command.
#[derive(Debug, Clone, PartialEq)]
pub enum KvReadCommand {
    /// Plain string value.
    Get,
    /// Whether the key exists in any shape.
    Exists,
    /// Length of the string value.
    Strlen,
    /// Substring by inclusive byte positions; negatives count from the end.
    GetRange {
        /// Start position.
        start: i64,
        /// End position, inclusive.
        end: i64,
    },
    /// One hash field.
    HGet {
        /// Field to fetch.
        field: String,
    },
    /// Several hash fields, with per-field misses.
    HMGet {
        /// Fields to fetch.
        fields: Vec<String>,
    },
    /// Whether a hash field exists.
    HExists {
        /// Field to test.
        field: String,
    },
    /// Length of one hash field's value.
    HStrLen {
        /// Field to measure.
        field: String,
    },
    /// All field/value pairs.
    HGetAll,
    /// All field names.
    HKeys,
    /// All field values.
    HVals,
    /// Number of fields.
    HLen,
    /// Whether a set contains a member.
    SIsMember {
        /// Member to test.
        member: String,
    },
    /// All set members.
    SMembers,
    /// Set cardinality.
    SCard,
    /// Sorted-set cardinality, from the stored counter.
    ZCard,
    /// Score of one sorted-set member.
    ZScore {
        /// Member to look up.
        member: String,
    },
    /// Members with scores in a range, ascending by score.
    ZRangeByScore {
        /// Lower score bound.
        lower: KvBound<f64>,
        /// Upper score bound.
        upper: KvBound<f64>,
        /// Interleave scores into the response.
        with_scores: bool,
    },
    /// One time-series entry.
    TsGet {
        /// Timestamp to fetch.
        timestamp: i64,
    },
    /// Time-series entries in a timestamp range, ascending by time.
    TsRangeByTime {
        /// Lower timestamp bound.
        lower: KvBound<i64>,
        /// Upper timestamp bound.
        upper: KvBound<i64>,
    },
    /// Multi-key get. Recognized but not implemented.
    MGet,
}

/// A reading KV request.
#[derive(Debug, Clone, PartialEq)]
pub struct KvReadRequest {
    /// Document the command targets.
    pub target: KvTarget,
    /// The command itself.
    pub command: KvReadCommand,
}

/// Outcome class of a KV command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvStatusCode {
    /// Command ran.
    Ok,
    /// Target (or member) does not exist.
    NotFound,
    /// Document exists with an incompatible shape.
    WrongType,
    /// A positional argument resolved outside the value.
    IndexOutOfBounds,
    /// Command-level error, see the message.
    Error,
}

/// Protocol message used for shape mismatches.
pub const WRONG_TYPE_MESSAGE: &str =
    "WRONGTYPE Operation against a key holding the wrong kind of value";

/// Response to a KV command.
#[derive(Debug, Clone, PartialEq)]
pub struct KvResponse {
    /// Outcome class.
    pub code: KvStatusCode,
    /// Message for `Error` and `WrongType` outcomes.
    pub error_message: Option<String>,
    /// Integer payload (counts, lengths, INCR results).
    pub int_result: Option<i64>,
    /// String payload.
    pub string_result: Option<String>,
    /// Array payload (members, fields, ranges).
    pub array_result: Option<Vec<String>>,
}

impl KvResponse {
    /// Plain ok with no payload.
    pub fn ok() -> Self {
        KvResponse {
            code: KvStatusCode::Ok,
            error_message: None,
            int_result: None,
            string_result: None,
            array_result: None,
        }
    }

    /// Ok with an integer payload.
    pub fn int(v: i64) -> Self {
        KvResponse { int_result: Some(v), ..KvResponse::ok() }
    }

    /// Ok with a string payload.
    pub fn string(s: impl Into<String>) -> Self {
        KvResponse { string_result: Some(s.into()), ..KvResponse::ok() }
    }

    /// Ok with an array payload.
    pub fn array(items: Vec<String>) -> Self {
        KvResponse { array_result: Some(items), ..KvResponse::ok() }
    }

    /// Target not found.
    pub fn not_found() -> Self {
        KvResponse { code: KvStatusCode::NotFound, ..KvResponse::ok() }
    }

    /// Position outside the value.
    pub fn index_out_of_bounds() -> Self {
        KvResponse { code: KvStatusCode::IndexOutOfBounds, ..KvResponse::ok() }
    }

    /// Shape mismatch.
    pub fn wrong_type() -> Self {
        KvResponse {
            code: KvStatusCode::WrongType,
            error_message: Some(WRONG_TYPE_MESSAGE.to_string()),
            ..KvResponse::ok()
        }
    }

    /// Command-level error with a message.
    pub fn error(msg: impl Into<String>) -> Self {
        KvResponse {
            code: KvStatusCode::Error,
            error_message: Some(msg.into()),
            ..KvResponse::ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_mapping() {
        assert_eq!(KvDataType::from_value_kind(ValueKind::Object).unwrap(), KvDataType::Hash);
        assert_eq!(KvDataType::from_value_kind(ValueKind::Null).unwrap(), KvDataType::String);
        assert_eq!(KvDataType::from_value_kind(ValueKind::Tombstone).unwrap(), KvDataType::None);
        assert!(KvDataType::from_value_kind(ValueKind::Int64).is_err());
    }

    #[test]
    fn test_target_doc_key_is_stable() {
        let a = KvTarget::new("user:1").doc_key();
        let b = KvTarget::new("user:1").doc_key();
        assert_eq!(a.encode(), b.encode());
        assert!(a.hash_code.is_some());
    }

    #[test]
    fn test_explicit_hash_code_is_respected() {
        let mut t = KvTarget::new("k");
        t.hash_code = Some(0xbeef);
        assert_eq!(t.doc_key().hash_code, Some(0xbeef));
    }

    #[test]
    fn test_response_builders() {
        assert_eq!(KvResponse::int(3).int_result, Some(3));
        assert_eq!(KvResponse::wrong_type().code, KvStatusCode::WrongType);
        assert!(KvResponse::error("ERR x").error_message.unwrap().contains("ERR"));
    }
}
