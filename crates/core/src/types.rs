//! Small shared identifier and enum types

use serde::{Deserialize, Serialize};

/// Identifies the statement a write or read belongs to, for tracing and for
/// scoping batch-local bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryId(pub u64);

impl QueryId {
    /// Query id used when no statement context exists.
    pub const ANONYMOUS: QueryId = QueryId(0);
}

/// Isolation level a write operation requires, derived from whether the
/// operation must read before it writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Blind writes: no read-time dependency.
    Serializable,
    /// Read-modify-write operations must see a consistent snapshot.
    Snapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_id_equality() {
        assert_eq!(QueryId(7), QueryId(7));
        assert_ne!(QueryId(7), QueryId::ANONYMOUS);
    }
}
