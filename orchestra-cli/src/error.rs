//! This module defines all the errors that can occur while executing orchestra-cli.

use thiserror::Error;

/// Error that occur during execution of Orchestra's CLI app
#[derive(Error, Debug)]
pub enum CliError {
    /// Error while parsing an exchange file
    #[error("unable to load exchange file `{filename}`: {source}")]
    ExchangeLoading {
        /// Name of the exchange file
        filename: String,
        /// Underlying error
        #[source]
        source: orchestra::error::Error,
    },
    /// Error resulting from io operations
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    /// Error originating from orchestra
    #[error(transparent)]
    OrchestraError(#[from] orchestra::error::Error),
}
