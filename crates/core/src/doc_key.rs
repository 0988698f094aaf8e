//! Document keys, subdocument keys, and document paths
//!
//! A [`DocKey`] addresses one document (a row, or a KV-command entry). Its
//! encoding is `hash-tag + 16-bit hash + hashed components + group-end +
//! range components + group-end`; unhashed keys drop the leading hash
//! section. A [`SubDocKey`] extends a document key with subkeys addressing a
//! nested subdocument, and a [`DocPath`] is the write-side equivalent built
//! over an already-encoded document key.

use byteorder::{BigEndian, ByteOrder};
use xxhash_rust::xxh3::xxh3_64;

use crate::encoding::{prefix_successor, SubKey, GROUP_END, HASH_CODE_TAG};
use crate::error::{Error, Result};

/// Identifies one document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DocKey {
    /// 16-bit hash of the hashed components, present iff `hashed` is used.
    pub hash_code: Option<u16>,
    /// Components covered by the hash code.
    pub hashed: Vec<SubKey>,
    /// Range components, ordered by their encodings.
    pub range: Vec<SubKey>,
}

impl DocKey {
    /// A key with hashed components, computing the hash code.
    pub fn hashed(hashed: Vec<SubKey>, range: Vec<SubKey>) -> Self {
        let hash_code = Some(hash_code_for(&hashed));
        DocKey { hash_code, hashed, range }
    }

    /// A key with hashed components and a caller-provided hash code.
    pub fn with_hash_code(hash_code: u16, hashed: Vec<SubKey>, range: Vec<SubKey>) -> Self {
        DocKey { hash_code: Some(hash_code), hashed, range }
    }

    /// A range-only key.
    pub fn range_only(range: Vec<SubKey>) -> Self {
        DocKey { hash_code: None, hashed: Vec::new(), range }
    }

    /// Full encoding of this key.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32);
        if let Some(code) = self.hash_code {
            out.push(HASH_CODE_TAG);
            let mut buf = [0u8; 2];
            BigEndian::write_u16(&mut buf, code);
            out.extend_from_slice(&buf);
            for k in &self.hashed {
                k.encode_into(&mut out);
            }
            out.push(GROUP_END);
        }
        for k in &self.range {
            k.encode_into(&mut out);
        }
        out.push(GROUP_END);
        out
    }

    /// Encoding of the hashed section only (hash code, hashed components,
    /// and the group terminator). Every row sharing the hashed components
    /// starts with these bytes; for range-only keys this is empty.
    pub fn encoded_hash_prefix(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        if let Some(code) = self.hash_code {
            out.push(HASH_CODE_TAG);
            let mut buf = [0u8; 2];
            BigEndian::write_u16(&mut buf, code);
            out.extend_from_slice(&buf);
            for k in &self.hashed {
                k.encode_into(&mut out);
            }
            out.push(GROUP_END);
        }
        out
    }

    /// Decodes a document key from the front of `buf`, returning the number
    /// of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(DocKey, usize)> {
        let mut pos = 0;
        let mut hash_code = None;
        let mut hashed = Vec::new();
        if buf.first() == Some(&HASH_CODE_TAG) {
            if buf.len() < 3 {
                return Err(Error::Corruption("truncated hash code in document key".to_string()));
            }
            hash_code = Some(BigEndian::read_u16(&buf[1..3]));
            pos = 3;
            loop {
                match buf.get(pos) {
                    Some(&GROUP_END) => {
                        pos += 1;
                        break;
                    }
                    Some(_) => {
                        let (k, rest) = SubKey::decode(&buf[pos..])?;
                        pos = buf.len() - rest.len();
                        hashed.push(k);
                    }
                    None => {
                        return Err(Error::Corruption(
                            "document key missing hashed group terminator".to_string(),
                        ))
                    }
                }
            }
        }
        let mut range = Vec::new();
        loop {
            match buf.get(pos) {
                Some(&GROUP_END) => {
                    pos += 1;
                    break;
                }
                Some(_) => {
                    let (k, rest) = SubKey::decode(&buf[pos..])?;
                    pos = buf.len() - rest.len();
                    range.push(k);
                }
                None => {
                    return Err(Error::Corruption(
                        "document key missing range group terminator".to_string(),
                    ))
                }
            }
        }
        Ok((DocKey { hash_code, hashed, range }, pos))
    }

    /// Number of bytes the document key at the front of `buf` occupies.
    pub fn encoded_len(buf: &[u8]) -> Result<usize> {
        Ok(DocKey::decode(buf)?.1)
    }
}

/// 16-bit hash code over the encoded hashed components.
pub fn hash_code_for(hashed: &[SubKey]) -> u16 {
    let mut bytes = Vec::with_capacity(16);
    for k in hashed {
        k.encode_into(&mut bytes);
    }
    let h = xxh3_64(&bytes);
    (h as u16) ^ ((h >> 16) as u16) ^ ((h >> 32) as u16) ^ ((h >> 48) as u16)
}

/// A document key extended with subkeys into a nested subdocument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubDocKey {
    /// The enclosing document.
    pub doc_key: DocKey,
    /// Path from the document root.
    pub subkeys: Vec<SubKey>,
}

impl SubDocKey {
    /// A subdocument key at the document root.
    pub fn root(doc_key: DocKey) -> Self {
        SubDocKey { doc_key, subkeys: Vec::new() }
    }

    /// A subdocument key with the given path.
    pub fn new(doc_key: DocKey, subkeys: Vec<SubKey>) -> Self {
        SubDocKey { doc_key, subkeys }
    }

    /// Full encoding: document key followed by each subkey.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.doc_key.encode();
        for k in &self.subkeys {
            k.encode_into(&mut out);
        }
        out
    }
}

/// Write-side address: an encoded document key plus subkeys.
///
/// Writes address their targets through paths so a batch can append child
/// subkeys cheaply without re-encoding the document key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocPath {
    /// Encoded document key this path starts from.
    pub encoded_doc_key: Vec<u8>,
    /// Subkeys below the document root.
    pub subkeys: Vec<SubKey>,
}

impl DocPath {
    /// Path at the root of the given document.
    pub fn root(doc_key: &DocKey) -> Self {
        DocPath { encoded_doc_key: doc_key.encode(), subkeys: Vec::new() }
    }

    /// Path with subkeys below the document root.
    pub fn new(doc_key: &DocKey, subkeys: Vec<SubKey>) -> Self {
        DocPath { encoded_doc_key: doc_key.encode(), subkeys }
    }

    /// Extends this path by one subkey.
    pub fn join(&self, subkey: SubKey) -> DocPath {
        let mut subkeys = self.subkeys.clone();
        subkeys.push(subkey);
        DocPath { encoded_doc_key: self.encoded_doc_key.clone(), subkeys }
    }

    /// Full encoding of the addressed subdocument key.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.encoded_doc_key.clone();
        for k in &self.subkeys {
            k.encode_into(&mut out);
        }
        out
    }
}

/// Exclusive upper bound for scanning everything beneath an encoded prefix.
pub fn upper_bound_for_prefix(prefix: &[u8]) -> Option<Vec<u8>> {
    prefix_successor(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sk(s: &str) -> SubKey {
        SubKey::String(s.to_string())
    }

    #[test]
    fn test_doc_key_round_trip_hashed() {
        let key = DocKey::hashed(vec![sk("h1"), SubKey::Int64(7)], vec![sk("r1"), SubKey::Null]);
        let bytes = key.encode();
        let (decoded, consumed) = DocKey::decode(&bytes).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_doc_key_round_trip_range_only() {
        let key = DocKey::range_only(vec![SubKey::Int64(-3), sk("x")]);
        let bytes = key.encode();
        let (decoded, consumed) = DocKey::decode(&bytes).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_decode_consumes_exactly_doc_key() {
        let key = DocKey::hashed(vec![sk("h")], vec![sk("r")]);
        let mut bytes = key.encode();
        let extra = SubKey::ColumnId(crate::encoding::ColumnId(4));
        extra.encode_into(&mut bytes);
        let (decoded, consumed) = DocKey::decode(&bytes).unwrap();
        assert_eq!(decoded, key);
        let (tail, rest) = SubKey::decode(&bytes[consumed..]).unwrap();
        assert_eq!(tail, extra);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_static_row_key_sorts_before_rows_with_range() {
        // Same hashed section, empty range vs. populated range.
        let stat = DocKey::with_hash_code(0x1234, vec![sk("h")], vec![]);
        let row = DocKey::with_hash_code(0x1234, vec![sk("h")], vec![sk("a")]);
        assert!(stat.encode() < row.encode());
        assert_eq!(stat.encode().len(), stat.encoded_hash_prefix().len() + 1);
    }

    #[test]
    fn test_hash_prefix_is_shared_by_all_rows() {
        let a = DocKey::hashed(vec![sk("h")], vec![sk("a")]);
        let b = DocKey::hashed(vec![sk("h")], vec![sk("b"), SubKey::Int64(2)]);
        let prefix = a.encoded_hash_prefix();
        assert!(a.encode().starts_with(&prefix));
        assert!(b.encode().starts_with(&prefix));
        assert_eq!(prefix, b.encoded_hash_prefix());
    }

    #[test]
    fn test_hash_code_is_deterministic() {
        let h1 = hash_code_for(&[sk("k"), SubKey::Int64(1)]);
        let h2 = hash_code_for(&[sk("k"), SubKey::Int64(1)]);
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_doc_path_join_and_encode() {
        let key = DocKey::hashed(vec![sk("h")], vec![]);
        let path = DocPath::root(&key).join(SubKey::SortedSetForward).join(SubKey::Double(1.5));
        let subdoc =
            SubDocKey::new(key, vec![SubKey::SortedSetForward, SubKey::Double(1.5)]);
        assert_eq!(path.encode(), subdoc.encode());
    }
}
