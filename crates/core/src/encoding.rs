//! Order-preserving key component encoding
//!
//! Every key component encodes to a tagged, prefix-free byte string whose
//! lexicographic order equals the component's logical order. That single
//! property is what makes range scans over the flat store correct:
//! - strings are zero-escaped (`00 -> 00 01`) and terminated with `00 00`,
//!   so no encoded string is a prefix of another;
//! - signed integers have the sign bit flipped and are written big-endian;
//! - doubles flip the sign bit for positives and complement all bits for
//!   negatives, mapping IEEE-754 order onto byte order;
//! - descending integers complement the ascending encoding, so newer
//!   time-series entries sort first.
//!
//! The group-end terminator byte sorts before every component tag. A key
//! whose range section is empty therefore sorts before every key that has
//! range components under the same hashed prefix.

use std::cmp::Ordering;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

/// Terminates a component group inside an encoded document key.
pub const GROUP_END: u8 = 0x21;

/// Leads the 16-bit hash code at the front of a hashed document key.
pub const HASH_CODE_TAG: u8 = 0x27;

const TAG_NULL: u8 = 0x30;
const TAG_COUNTER: u8 = 0x32;
const TAG_SS_FORWARD: u8 = 0x33;
const TAG_SS_REVERSE: u8 = 0x34;
const TAG_SYSTEM_COLUMN_ID: u8 = 0x35;
const TAG_COLUMN_ID: u8 = 0x36;
const TAG_ARRAY_INDEX: u8 = 0x40;
const TAG_DOUBLE: u8 = 0x44;
const TAG_INT64: u8 = 0x49;
const TAG_DESC_INT64: u8 = 0x4a;
const TAG_STRING: u8 = 0x53;

const SIGN_MASK: u64 = 1 << 63;

/// Identifies a user column inside a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnId(pub i32);

/// System columns carry row metadata rather than user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SystemColumnId {
    /// Written by INSERT to keep a row alive when every user column is
    /// deleted or expired.
    Liveness,
}

impl SystemColumnId {
    fn code(&self) -> u32 {
        match self {
            SystemColumnId::Liveness => 0,
        }
    }

    fn from_code(code: u32) -> Result<Self> {
        match code {
            0 => Ok(SystemColumnId::Liveness),
            other => Err(Error::Corruption(format!("unknown system column id {other}"))),
        }
    }
}

/// One step along a document path.
///
/// Subkeys order by their encoded bytes; the `Ord` impl below is defined to
/// agree with that byte order, including the total order on doubles.
#[derive(Debug, Clone)]
pub enum SubKey {
    /// Null component (nullable range columns).
    Null,
    /// Cardinality counter child of a sorted set. Sorts before both mirrors.
    Counter,
    /// Root of the score-to-member mirror of a sorted set.
    SortedSetForward,
    /// Root of the member-to-score mirror of a sorted set.
    SortedSetReverse,
    /// System column marker.
    SystemColumnId(SystemColumnId),
    /// User column marker.
    ColumnId(ColumnId),
    /// List element position. Appends allocate ascending indexes, prepends
    /// descending negative ones.
    ArrayIndex(i64),
    /// Double component (sorted-set scores).
    Double(f64),
    /// Ascending 64-bit integer component.
    Int64(i64),
    /// Descending 64-bit integer component (time-series timestamps).
    DescendingInt64(i64),
    /// String component.
    String(String),
}

impl SubKey {
    /// Appends this component's encoding to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            SubKey::Null => out.push(TAG_NULL),
            SubKey::Counter => out.push(TAG_COUNTER),
            SubKey::SortedSetForward => out.push(TAG_SS_FORWARD),
            SubKey::SortedSetReverse => out.push(TAG_SS_REVERSE),
            SubKey::SystemColumnId(id) => {
                out.push(TAG_SYSTEM_COLUMN_ID);
                let mut buf = [0u8; 4];
                BigEndian::write_u32(&mut buf, id.code());
                out.extend_from_slice(&buf);
            }
            SubKey::ColumnId(ColumnId(id)) => {
                out.push(TAG_COLUMN_ID);
                let mut buf = [0u8; 4];
                BigEndian::write_u32(&mut buf, (*id as u32) ^ (1 << 31));
                out.extend_from_slice(&buf);
            }
            SubKey::ArrayIndex(i) => {
                out.push(TAG_ARRAY_INDEX);
                encode_int64(*i, out);
            }
            SubKey::Double(d) => {
                out.push(TAG_DOUBLE);
                encode_double(*d, out);
            }
            SubKey::Int64(i) => {
                out.push(TAG_INT64);
                encode_int64(*i, out);
            }
            SubKey::DescendingInt64(i) => {
                out.push(TAG_DESC_INT64);
                let mut buf = [0u8; 8];
                BigEndian::write_u64(&mut buf, !((*i as u64) ^ SIGN_MASK));
                out.extend_from_slice(&buf);
            }
            SubKey::String(s) => {
                out.push(TAG_STRING);
                for &b in s.as_bytes() {
                    if b == 0 {
                        out.push(0);
                        out.push(1);
                    } else {
                        out.push(b);
                    }
                }
                out.push(0);
                out.push(0);
            }
        }
    }

    /// This component's encoding as a fresh byte string.
    pub fn encoded(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(10);
        self.encode_into(&mut out);
        out
    }

    /// Decodes one component from the front of `buf`, returning the rest.
    pub fn decode(buf: &[u8]) -> Result<(SubKey, &[u8])> {
        let (&tag, rest) = buf
            .split_first()
            .ok_or_else(|| Error::Corruption("empty buffer decoding key component".to_string()))?;
        match tag {
            TAG_NULL => Ok((SubKey::Null, rest)),
            TAG_COUNTER => Ok((SubKey::Counter, rest)),
            TAG_SS_FORWARD => Ok((SubKey::SortedSetForward, rest)),
            TAG_SS_REVERSE => Ok((SubKey::SortedSetReverse, rest)),
            TAG_SYSTEM_COLUMN_ID => {
                let (bytes, rest) = take(rest, 4)?;
                let id = SystemColumnId::from_code(BigEndian::read_u32(bytes))?;
                Ok((SubKey::SystemColumnId(id), rest))
            }
            TAG_COLUMN_ID => {
                let (bytes, rest) = take(rest, 4)?;
                let id = (BigEndian::read_u32(bytes) ^ (1 << 31)) as i32;
                Ok((SubKey::ColumnId(ColumnId(id)), rest))
            }
            TAG_ARRAY_INDEX => {
                let (i, rest) = decode_int64(rest)?;
                Ok((SubKey::ArrayIndex(i), rest))
            }
            TAG_DOUBLE => {
                let (bytes, rest) = take(rest, 8)?;
                Ok((SubKey::Double(decode_double(bytes)), rest))
            }
            TAG_INT64 => {
                let (i, rest) = decode_int64(rest)?;
                Ok((SubKey::Int64(i), rest))
            }
            TAG_DESC_INT64 => {
                let (bytes, rest) = take(rest, 8)?;
                let i = ((!BigEndian::read_u64(bytes)) ^ SIGN_MASK) as i64;
                Ok((SubKey::DescendingInt64(i), rest))
            }
            TAG_STRING => {
                let mut s = Vec::new();
                let mut i = 0;
                loop {
                    let b = *rest.get(i).ok_or_else(|| {
                        Error::Corruption("unterminated string key component".to_string())
                    })?;
                    if b == 0 {
                        let next = *rest.get(i + 1).ok_or_else(|| {
                            Error::Corruption("unterminated string key component".to_string())
                        })?;
                        match next {
                            0 => {
                                let s = String::from_utf8(s).map_err(|e| {
                                    Error::Corruption(format!("non-UTF8 string key: {e}"))
                                })?;
                                return Ok((SubKey::String(s), &rest[i + 2..]));
                            }
                            1 => {
                                s.push(0);
                                i += 2;
                            }
                            other => {
                                return Err(Error::Corruption(format!(
                                    "bad string escape byte {other:#04x}"
                                )))
                            }
                        }
                    } else {
                        s.push(b);
                        i += 1;
                    }
                }
            }
            other => Err(Error::Corruption(format!("unknown key component tag {other:#04x}"))),
        }
    }
}

impl PartialEq for SubKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SubKey {}

impl PartialOrd for SubKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SubKey {
    /// Agrees with the lexicographic order of [`SubKey::encoded`] bytes.
    /// `f64::total_cmp` uses the same sign-flip mapping as [`encode_double`],
    /// so the two orders coincide even for NaN and negative zero.
    fn cmp(&self, other: &Self) -> Ordering {
        fn tag(k: &SubKey) -> u8 {
            match k {
                SubKey::Null => TAG_NULL,
                SubKey::Counter => TAG_COUNTER,
                SubKey::SortedSetForward => TAG_SS_FORWARD,
                SubKey::SortedSetReverse => TAG_SS_REVERSE,
                SubKey::SystemColumnId(_) => TAG_SYSTEM_COLUMN_ID,
                SubKey::ColumnId(_) => TAG_COLUMN_ID,
                SubKey::ArrayIndex(_) => TAG_ARRAY_INDEX,
                SubKey::Double(_) => TAG_DOUBLE,
                SubKey::Int64(_) => TAG_INT64,
                SubKey::DescendingInt64(_) => TAG_DESC_INT64,
                SubKey::String(_) => TAG_STRING,
            }
        }
        match (self, other) {
            (SubKey::SystemColumnId(a), SubKey::SystemColumnId(b)) => a.cmp(b),
            (SubKey::ColumnId(a), SubKey::ColumnId(b)) => a.cmp(b),
            (SubKey::ArrayIndex(a), SubKey::ArrayIndex(b)) => a.cmp(b),
            (SubKey::Double(a), SubKey::Double(b)) => a.total_cmp(b),
            (SubKey::Int64(a), SubKey::Int64(b)) => a.cmp(b),
            (SubKey::DescendingInt64(a), SubKey::DescendingInt64(b)) => b.cmp(a),
            (SubKey::String(a), SubKey::String(b)) => a.as_bytes().cmp(b.as_bytes()),
            (a, b) => tag(a).cmp(&tag(b)),
        }
    }
}

fn take(buf: &[u8], n: usize) -> Result<(&[u8], &[u8])> {
    if buf.len() < n {
        return Err(Error::Corruption(format!(
            "truncated key component: need {n} bytes, have {}",
            buf.len()
        )));
    }
    Ok(buf.split_at(n))
}

fn encode_int64(v: i64, out: &mut Vec<u8>) {
    let mut buf = [0u8; 8];
    BigEndian::write_u64(&mut buf, (v as u64) ^ SIGN_MASK);
    out.extend_from_slice(&buf);
}

fn decode_int64(buf: &[u8]) -> Result<(i64, &[u8])> {
    let (bytes, rest) = take(buf, 8)?;
    Ok(((BigEndian::read_u64(bytes) ^ SIGN_MASK) as i64, rest))
}

fn encode_double(d: f64, out: &mut Vec<u8>) {
    let bits = d.to_bits();
    let mapped = if bits & SIGN_MASK != 0 { !bits } else { bits | SIGN_MASK };
    let mut buf = [0u8; 8];
    BigEndian::write_u64(&mut buf, mapped);
    out.extend_from_slice(&buf);
}

fn decode_double(bytes: &[u8]) -> f64 {
    let mapped = BigEndian::read_u64(bytes);
    let bits = if mapped & SIGN_MASK != 0 { mapped ^ SIGN_MASK } else { !mapped };
    f64::from_bits(bits)
}

/// The shortest byte string strictly greater than every string with the
/// given prefix, or `None` when the prefix is all `0xff`.
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut out = prefix.to_vec();
    while let Some(last) = out.last_mut() {
        if *last == 0xff {
            out.pop();
        } else {
            *last += 1;
            return Some(out);
        }
    }
    None
}
