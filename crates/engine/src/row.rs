//! Row buffers
//!
//! A [`Row`] maps column ids to materialized values. Missing and null
//! columns both read back as null, matching how the read engine projects
//! them.

use std::collections::BTreeMap;

use dockv_core::{ColumnId, SubDocument};

/// One projected row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: BTreeMap<ColumnId, SubDocument>,
}

impl Row {
    /// An empty row.
    pub fn new() -> Self {
        Row::default()
    }

    /// Sets a column value.
    pub fn set(&mut self, id: ColumnId, value: SubDocument) {
        self.values.insert(id, value);
    }

    /// Column value, if present.
    pub fn get(&self, id: ColumnId) -> Option<&SubDocument> {
        self.values.get(&id)
    }

    /// Column value, with absent columns reading as null.
    pub fn get_or_null(&self, id: ColumnId) -> SubDocument {
        self.values.get(&id).cloned().unwrap_or_else(SubDocument::null)
    }

    /// True when no column has a value.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of populated columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Populated columns in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&ColumnId, &SubDocument)> {
        self.values.iter()
    }

    /// Copies the given columns from `other` into this row.
    pub fn merge_columns(&mut self, other: &Row, columns: &[ColumnId]) {
        for id in columns {
            if let Some(v) = other.get(*id) {
                self.values.insert(*id, v.clone());
            }
        }
    }

    /// The projected values for `columns`, nulls for absent ones.
    pub fn project(&self, columns: &[ColumnId]) -> Vec<SubDocument> {
        columns.iter().map(|id| self.get_or_null(*id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_null_for_missing_column() {
        let row = Row::new();
        assert_eq!(row.get_or_null(ColumnId(1)), SubDocument::null());
        assert!(row.get(ColumnId(1)).is_none());
    }

    #[test]
    fn test_merge_columns_copies_only_requested() {
        let mut a = Row::new();
        let mut b = Row::new();
        b.set(ColumnId(1), SubDocument::int64(1));
        b.set(ColumnId(2), SubDocument::int64(2));
        a.merge_columns(&b, &[ColumnId(2)]);
        assert!(a.get(ColumnId(1)).is_none());
        assert_eq!(a.get(ColumnId(2)), Some(&SubDocument::int64(2)));
    }

    #[test]
    fn test_project_orders_by_request() {
        let mut row = Row::new();
        row.set(ColumnId(1), SubDocument::string("x"));
        let projected = row.project(&[ColumnId(2), ColumnId(1)]);
        assert_eq!(projected, vec![SubDocument::null(), SubDocument::string("x")]);
    }
}
