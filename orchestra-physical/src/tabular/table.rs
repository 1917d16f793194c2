//! This module defines [Table].

use std::collections::BTreeSet;

use crate::{datavalues::DataValue, error::Error};

/// A single row of a [Table]
pub type Row = Vec<DataValue>;

/// Set of rows of a fixed arity
///
/// Rows are kept sorted, so iteration order is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    name: String,
    arity: usize,
    rows: BTreeSet<Row>,
}

impl Table {
    /// Create a new empty [Table].
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
            rows: BTreeSet::new(),
        }
    }

    /// Return the name of this table.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the number of columns of this table.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Return the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Return whether the table contains no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Return whether the given row is contained in the table.
    pub fn contains(&self, row: &[DataValue]) -> bool {
        self.rows.contains(row)
    }

    /// Return an iterator over all rows in sorted order.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    fn check_arity(&self, row: &[DataValue]) -> Result<(), Error> {
        if row.len() != self.arity {
            return Err(Error::ArityMismatch {
                table: self.name.clone(),
                expected: self.arity,
                given: row.len(),
            });
        }

        Ok(())
    }

    /// Add a row to the table.
    ///
    /// Returns `true` if the row was not present before.
    pub fn insert(&mut self, row: Row) -> Result<bool, Error> {
        self.check_arity(&row)?;
        Ok(self.rows.insert(row))
    }

    /// Add all given rows and return how many of them were new.
    pub fn extend<Rows: IntoIterator<Item = Row>>(&mut self, rows: Rows) -> Result<usize, Error> {
        let mut added = 0;
        for row in rows {
            if self.insert(row)? {
                added += 1;
            }
        }

        Ok(added)
    }

    /// Remove a row from the table.
    ///
    /// Returns `true` if the row was present.
    pub fn remove(&mut self, row: &[DataValue]) -> bool {
        self.rows.remove(row)
    }

    /// Remove all rows.
    ///
    /// Returns the number of removed rows.
    pub fn clear(&mut self) -> usize {
        let removed = self.rows.len();
        self.rows.clear();
        removed
    }
}
