//! Table schema
//!
//! Just enough schema for the structured engines: column ids, names, the
//! hash/range/static/regular split, and the table-level TTL that write-level
//! TTLs default to.

use dockv_core::{ColumnId, Error, Result, Ttl};

/// Where a column lives within a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Part of the hashed primary key.
    Hash,
    /// Part of the range (clustering) portion of the primary key.
    Range,
    /// Shared by every row with the same hashed key.
    Static,
    /// Ordinary per-row column.
    Regular,
}

/// One column.
#[derive(Debug, Clone)]
pub struct ColumnSchema {
    /// Column id, unique within the table.
    pub id: ColumnId,
    /// Column name, for messages only.
    pub name: String,
    /// Placement.
    pub kind: ColumnKind,
}

impl ColumnSchema {
    /// Shorthand constructor.
    pub fn new(id: i32, name: impl Into<String>, kind: ColumnKind) -> Self {
        ColumnSchema { id: ColumnId(id), name: name.into(), kind }
    }
}

/// A table schema.
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<ColumnSchema>,
    table_ttl: Ttl,
}

impl Schema {
    /// Builds a schema, requiring at least one hash column.
    pub fn new(columns: Vec<ColumnSchema>, table_ttl: Ttl) -> Result<Self> {
        if !columns.iter().any(|c| c.kind == ColumnKind::Hash) {
            return Err(Error::InvalidArgument("schema needs at least one hash column".to_string()));
        }
        Ok(Schema { columns, table_ttl })
    }

    /// Table-level TTL.
    pub fn table_ttl(&self) -> Ttl {
        self.table_ttl
    }

    /// All columns, in declaration order.
    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    /// Columns of one kind, in declaration order.
    pub fn columns_of(&self, kind: ColumnKind) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(move |c| c.kind == kind)
    }

    /// Number of hash columns.
    pub fn num_hash_columns(&self) -> usize {
        self.columns_of(ColumnKind::Hash).count()
    }

    /// Number of range columns.
    pub fn num_range_columns(&self) -> usize {
        self.columns_of(ColumnKind::Range).count()
    }

    /// Whether the table declares static columns at all.
    pub fn has_static_columns(&self) -> bool {
        self.columns.iter().any(|c| c.kind == ColumnKind::Static)
    }

    /// Column by id.
    pub fn column_by_id(&self, id: ColumnId) -> Result<&ColumnSchema> {
        self.columns
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown column id {}", id.0)))
    }

    /// True when `id` names a static column.
    pub fn is_static_column(&self, id: ColumnId) -> Result<bool> {
        Ok(self.column_by_id(id)?.kind == ColumnKind::Static)
    }
}
