//! This module defines the [DatalogEngine] contract.

use std::time::Duration;

use crate::{
    error::{Error, ErrorKind},
    rule_model::program::DatalogSequence,
};

/// Evaluates [DatalogSequence]s against a storage backend
///
/// The delta-rule containers never touch tables directly;
/// every change they make goes through [DatalogEngine::evaluate_programs].
pub trait DatalogEngine {
    /// Establish the connection to the backend.
    fn connect(&mut self) -> Result<(), Error>;

    /// Return whether the engine is connected.
    fn is_connected(&self) -> bool;

    /// Make all changes durable.
    fn commit(&mut self) -> Result<(), Error>;

    /// Commit and reset the per-phase counters.
    fn commit_and_reset(&mut self) -> Result<(), Error> {
        self.commit()?;
        self.reset_counters();
        Ok(())
    }

    /// Evaluate all programs of the sequence in order.
    ///
    /// With `recompute` the engine must not reuse compiled queries.
    /// Returns the number of changed tuples.
    fn evaluate_programs(
        &mut self,
        sequence: &DatalogSequence,
        recompute: bool,
    ) -> Result<usize, Error>;

    /// Evaluate the sequence reusing compiled queries.
    fn evaluate(&mut self, sequence: &DatalogSequence) -> Result<usize, Error> {
        self.evaluate_programs(sequence, false)
    }

    /// Reset [DatalogEngine::log_time] and [DatalogEngine::empty_time].
    fn reset_counters(&mut self);

    /// Time spent on logging and journaling since the last reset.
    fn log_time(&self) -> Duration;

    /// Time spent on checking for empty relations since the last reset.
    fn empty_time(&self) -> Duration;

    /// Remember the current state so that [DatalogEngine::rollback] can restore it.
    fn checkpoint(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Restore the state of the last [DatalogEngine::checkpoint].
    fn rollback(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Drop the state remembered by [DatalogEngine::checkpoint] once it is no longer needed.
    fn release_checkpoint(&mut self) {}

    /// Return the names of all tables.
    fn table_names(&self) -> Vec<String>;

    /// Remove all rows of a table.
    fn clear_table(&mut self, name: &str) -> Result<(), Error>;

    /// Remove a table.
    fn drop_table(&mut self, name: &str) -> Result<(), Error>;

    /// Clear the given tables, skipping those that fail.
    ///
    /// Returns the number of cleared tables.
    fn clear_tables(&mut self, names: &[String]) -> usize {
        names
            .iter()
            .filter(|name| report_best_effort("clear", name, self.clear_table(name)))
            .count()
    }

    /// Drop the given tables, skipping those that fail.
    ///
    /// Returns the number of dropped tables.
    fn drop_tables(&mut self, names: &[String]) -> usize {
        names
            .iter()
            .filter(|name| report_best_effort("drop", name, self.drop_table(name)))
            .count()
    }

    /// Clear all tables, skipping those that fail.
    fn clear_all_tables(&mut self) -> usize {
        let names = self.table_names();
        self.clear_tables(&names)
    }

    /// Drop all tables, skipping those that fail.
    fn drop_all_tables(&mut self) -> usize {
        let names = self.table_names();
        self.drop_tables(&names)
    }
}

/// Log the failure of a maintenance statement and return whether it succeeded.
fn report_best_effort(action: &str, table: &str, result: Result<(), Error>) -> bool {
    match result {
        Ok(()) => true,
        Err(error) if error.kind() == ErrorKind::ExpectedMissingTable => {
            log::debug!("skipping {action} of {table}: {error}");
            false
        }
        Err(error) => {
            log::warn!("failed to {action} {table}: {error}");
            false
        }
    }
}
