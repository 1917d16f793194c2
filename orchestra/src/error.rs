//! Error-handling module for the crate

use std::path::PathBuf;

use thiserror::Error;

/// Classification of an [Error] for the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A table that should be cleared or dropped does not exist;
    /// can be ignored by best-effort maintenance operations
    ExpectedMissingTable,
    /// Failure while evaluating programs; aborts the reconciliation round
    ExecutionFailure,
    /// The rules, mappings or input files are malformed
    Compilation,
}

/// Error-Collection for all the possible Errors occurring in this crate
#[allow(variant_size_differences)]
#[derive(Error, Debug)]
pub enum Error {
    /// Reference to a relation that is not registered
    #[error("relation \"{0}\" is unknown")]
    UnknownRelation(String),
    /// Reference to a peer that is not declared
    #[error("peer \"{0}\" is unknown")]
    UnknownPeer(String),
    /// Relation was declared twice
    #[error("relation \"{0}\" is declared more than once")]
    DuplicateRelation(String),
    /// Mapping was declared twice
    #[error("mapping \"{0}\" is declared more than once")]
    DuplicateMapping(String),
    /// An atom has fewer arguments than its relation has fields
    #[error("atom over \"{relation}\" has {given} arguments, but the relation has {expected} fields")]
    ArityMismatch {
        /// Name of the relation
        relation: String,
        /// Number of fields
        expected: usize,
        /// Number of supplied arguments
        given: usize,
    },
    /// A constant does not fit the type of its field
    #[error("value {value} does not fit field \"{field}\" of type {expected} in relation \"{relation}\"")]
    TypeMismatch {
        /// Name of the relation
        relation: String,
        /// Name of the field
        field: String,
        /// Type of the field
        expected: String,
        /// Offending value
        value: String,
    },
    /// A rule violates a structural requirement
    #[error("malformed rule `{rule}`: {reason}")]
    MalformedRule {
        /// Textual representation of the rule
        rule: String,
        /// Description of the problem
        reason: String,
    },
    /// Error while parsing an exchange file
    #[error("parse error at line {line}, column {column}: {message}")]
    Parse {
        /// Line of the error (starting at 1)
        line: usize,
        /// Column of the error (starting at 1)
        column: usize,
        /// Description of the problem
        message: String,
    },
    /// The engine was used before a connection was established
    #[error("the rule evaluation engine is not connected")]
    NotConnected,
    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// Writing or reading a document failed
    #[error("serialization failed: {0}")]
    Serialization(String),
    /// IO Error
    #[error(transparent)]
    IO(#[from] std::io::Error),
    /// Errors on reading a file
    #[error("failed to read \"{filename}\": {error}")]
    IOReading {
        /// Contains the wrapped error
        error: std::io::Error,
        /// Filename which caused the error
        filename: PathBuf,
    },
    /// Error in the physical layer
    #[error(transparent)]
    PhysicalError(#[from] orchestra_physical::error::Error),
}

impl Error {
    /// Return the [ErrorKind] of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::PhysicalError(error) if error.is_missing_table() => {
                ErrorKind::ExpectedMissingTable
            }
            Error::PhysicalError(_) | Error::NotConnected | Error::IO(_) => {
                ErrorKind::ExecutionFailure
            }
            Error::UnknownRelation(_)
            | Error::UnknownPeer(_)
            | Error::DuplicateRelation(_)
            | Error::DuplicateMapping(_)
            | Error::ArityMismatch { .. }
            | Error::TypeMismatch { .. }
            | Error::MalformedRule { .. }
            | Error::Parse { .. }
            | Error::Config(_)
            | Error::Serialization(_)
            | Error::IOReading { .. } => ErrorKind::Compilation,
        }
    }
}
