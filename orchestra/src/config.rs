//! This module defines [ExchangeConfig].

use std::path::Path;

use serde::Deserialize;

use crate::error::Error;

/// Parameters of the update exchange
///
/// Handed explicitly to the delta-rule containers and the exchange driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ExchangeConfig {
    /// Whether the backend supports prepared statements
    pub prepare: bool,
    /// Whether stratified evaluation is enabled
    pub stratified: bool,
    /// Whether deletions through bidirectional mappings may delete
    /// derived tuples that were not requested
    pub allow_side_effects: bool,
    /// Whether updates are propagated with delta rules
    /// instead of recomputing all derived relations
    pub incremental: bool,
    /// Whether the engine records phase-completion markers
    pub journal: bool,
    /// Whether the engine skips rules with an empty positive body relation
    pub skip_empty_rules: bool,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            prepare: true,
            stratified: false,
            allow_side_effects: true,
            incremental: true,
            journal: true,
            skip_empty_rules: true,
        }
    }
}

impl ExchangeConfig {
    /// Parse a configuration from a JSON string.
    ///
    /// Missing keys keep their default value.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|error| Error::IOReading {
            error,
            filename: path.to_path_buf(),
        })?;

        Self::from_json_str(&content)
    }

    /// Whether the main incremental program must be evaluated with query recompilation.
    ///
    /// Needed for backends without statement preparation under stratified evaluation.
    pub fn recompute_queries(&self) -> bool {
        !self.prepare && self.stratified
    }
}
