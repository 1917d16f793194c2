//! Error-handling module for the crate

use thiserror::Error;

/// Error-Collection for all the possible Errors occurring in this crate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A plan or statement referenced a table that does not exist
    #[error("table \"{0}\" does not exist")]
    TableNotFound(String),
    /// A table with the same name is already registered
    #[error("table \"{0}\" already exists")]
    TableExists(String),
    /// Row or binding length differs from the table arity
    #[error("table \"{table}\" has arity {expected}, but {given} columns were supplied")]
    ArityMismatch {
        /// Name of the affected table
        table: String,
        /// Arity of the table
        expected: usize,
        /// Number of supplied columns
        given: usize,
    },
    /// A head column or negated scan uses a variable that no positive scan binds
    #[error("variable marker {0} is not bound by the body of the plan")]
    UnboundVariable(usize),
    /// Rollback was requested before any state was committed
    #[error("no committed state to roll back to")]
    NoCommittedState,
}

impl Error {
    /// Return whether this error only reports a missing table.
    ///
    /// Cleanup statements treat such errors as expected.
    pub fn is_missing_table(&self) -> bool {
        matches!(self, Error::TableNotFound(_))
    }
}
