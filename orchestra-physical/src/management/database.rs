//! This module defines [DatabaseInstance],
//! which is used to manage a collection of named tables.

use std::collections::{BTreeSet, HashMap};

use itertools::Itertools;

use crate::{
    datavalues::DataValue,
    error::Error,
    tabular::table::{Row, Table},
};

use super::execution_plan::{
    ColumnBinding, ExecutionPlan, ExecutionResult, HeadColumn, ScanNode, VariableMarker,
    WriteMode,
};

/// Partial assignment of values to the variable markers of a plan
type Assignment = Vec<Option<DataValue>>;

/// Represents a collection of tables
///
/// Besides the working state, the instance keeps the state of the last
/// [commit][DatabaseInstance::commit], which [rollback][DatabaseInstance::rollback] restores.
#[derive(Debug, Default, Clone)]
pub struct DatabaseInstance {
    /// Tables indexed by their name
    tables: HashMap<String, Table>,
    /// Snapshot taken at the last commit
    committed: Option<HashMap<String, Table>>,
}

// Return basic information about tables managed by the database
impl DatabaseInstance {
    /// Create a new empty [DatabaseInstance].
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current number of tables.
    pub fn num_tables(&self) -> usize {
        self.tables.len()
    }

    /// Return whether a table with the given name exists.
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Return the names of all tables in alphabetical order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).sorted().collect()
    }

    /// Return a reference to the table with the given name.
    pub fn table(&self, name: &str) -> Result<&Table, Error> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table, Error> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Return the number of rows of the table with the given name.
    pub fn count_rows(&self, name: &str) -> Result<usize, Error> {
        Ok(self.table(name)?.len())
    }
}

// Changing the set of tables and their content
impl DatabaseInstance {
    /// Create a new empty table.
    pub fn create_table(&mut self, name: &str, arity: usize) -> Result<(), Error> {
        if self.tables.contains_key(name) {
            return Err(Error::TableExists(name.to_string()));
        }

        log::trace!("creating table {name} with arity {arity}");
        self.tables.insert(name.to_string(), Table::new(name, arity));
        Ok(())
    }

    /// Remove the table with the given name.
    pub fn drop_table(&mut self, name: &str) -> Result<(), Error> {
        self.tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Remove all rows from the table with the given name.
    ///
    /// Returns the number of removed rows.
    pub fn clear_table(&mut self, name: &str) -> Result<usize, Error> {
        Ok(self.table_mut(name)?.clear())
    }

    /// Add rows to a table and return how many of them were new.
    pub fn insert_rows<Rows: IntoIterator<Item = Row>>(
        &mut self,
        name: &str,
        rows: Rows,
    ) -> Result<usize, Error> {
        self.table_mut(name)?.extend(rows)
    }

    /// Remove rows from a table and return how many of them were present.
    pub fn remove_rows<'a, Rows: IntoIterator<Item = &'a Row>>(
        &mut self,
        name: &str,
        rows: Rows,
    ) -> Result<usize, Error> {
        let table = self.table_mut(name)?;
        Ok(rows.into_iter().filter(|row| table.remove(row)).count())
    }

    /// Make the current state durable.
    pub fn commit(&mut self) {
        self.committed = Some(self.tables.clone());
    }

    /// Restore the state of the last commit.
    pub fn rollback(&mut self) -> Result<(), Error> {
        let committed = self.committed.as_ref().ok_or(Error::NoCommittedState)?;
        self.tables = committed.clone();
        Ok(())
    }
}

// Evaluation of execution plans
impl DatabaseInstance {
    /// Evaluate the given [ExecutionPlan] and write its result into the head table.
    pub fn execute_plan(&mut self, plan: &ExecutionPlan) -> Result<ExecutionResult, Error> {
        if plan.mode() == WriteMode::Truncate {
            let changed = self.clear_table(plan.head_table())?;
            return Ok(ExecutionResult {
                computed: 0,
                changed,
            });
        }

        let head_arity = self.table(plan.head_table())?.arity();
        if head_arity != plan.head().len() {
            return Err(Error::ArityMismatch {
                table: plan.head_table().to_string(),
                expected: head_arity,
                given: plan.head().len(),
            });
        }

        let rows = self.compute_rows(plan)?;
        let computed = rows.len();

        let changed = match plan.mode() {
            WriteMode::Insert => self.insert_rows(plan.head_table(), rows)?,
            WriteMode::Delete => self.remove_rows(plan.head_table(), rows.iter())?,
            WriteMode::Replace => {
                let table = self.table_mut(plan.head_table())?;
                let previous = table.rows().cloned().collect::<BTreeSet<Row>>();
                let changed = previous.symmetric_difference(&rows).count();
                table.clear();
                table.extend(rows)?;
                changed
            }
            WriteMode::Truncate => unreachable!("handled above"),
        };

        log::trace!(
            "plan for {} computed {computed} rows, changed {changed}",
            plan.head_table()
        );

        Ok(ExecutionResult { computed, changed })
    }

    /// Compute the distinct head rows of a plan without changing any table.
    pub fn compute_rows(&self, plan: &ExecutionPlan) -> Result<BTreeSet<Row>, Error> {
        for scan in plan.positive().iter().chain(plan.negative().iter()) {
            let table = self.table(scan.table())?;
            if table.arity() != scan.columns().len() {
                return Err(Error::ArityMismatch {
                    table: scan.table().to_string(),
                    expected: table.arity(),
                    given: scan.columns().len(),
                });
            }
        }

        let mut assignments = Vec::new();
        let mut current: Assignment = vec![None; plan.num_markers()];
        self.join(plan.positive(), &mut current, &mut assignments)?;

        let mut result = BTreeSet::new();
        'assignments: for mut assignment in assignments {
            for skolem in plan.skolems() {
                let arguments = skolem
                    .keys()
                    .iter()
                    .map(|key| resolve(key, &assignment))
                    .collect::<Result<Vec<_>, _>>()?;
                let value = DataValue::skolem(skolem.function(), arguments);

                match &assignment[skolem.output()] {
                    Some(bound) if *bound != value => continue 'assignments,
                    Some(_) => {}
                    None => assignment[skolem.output()] = Some(value),
                }
            }

            for scan in plan.negative() {
                if self.matches_any(scan, &assignment)? {
                    continue 'assignments;
                }
            }

            let row = plan
                .head()
                .iter()
                .map(|column| match column {
                    HeadColumn::Binding(binding) => resolve(binding, &assignment),
                    HeadColumn::Skolem {
                        function,
                        arguments,
                    } => Ok(DataValue::skolem(
                        function.clone(),
                        arguments
                            .iter()
                            .map(|argument| resolve(argument, &assignment))
                            .collect::<Result<Vec<_>, _>>()?,
                    )),
                })
                .collect::<Result<Row, _>>()?;

            result.insert(row);
        }

        Ok(result)
    }

    /// Nested-loop join of the given scans, extending `current`.
    fn join(
        &self,
        scans: &[ScanNode],
        current: &mut Assignment,
        output: &mut Vec<Assignment>,
    ) -> Result<(), Error> {
        let Some((scan, rest)) = scans.split_first() else {
            output.push(current.clone());
            return Ok(());
        };

        let table = self.table(scan.table())?;
        let mut newly_bound = Vec::<VariableMarker>::new();

        for row in table.rows() {
            if bind_row(scan, row, current, &mut newly_bound) {
                self.join(rest, current, output)?;
            }

            for marker in newly_bound.drain(..) {
                current[marker] = None;
            }
        }

        Ok(())
    }

    /// Check whether some row of the scanned table is compatible with the assignment.
    fn matches_any(&self, scan: &ScanNode, assignment: &Assignment) -> Result<bool, Error> {
        let table = self.table(scan.table())?;

        Ok(table.rows().any(|row| {
            scan.columns()
                .iter()
                .zip(row.iter())
                .enumerate()
                .all(|(index, (binding, value))| {
                    if value.is_null() && !scan.is_nullable(index) {
                        return false;
                    }

                    match binding {
                        ColumnBinding::Constant(constant) => constant == value,
                        ColumnBinding::Variable(marker) => match &assignment[*marker] {
                            Some(bound) => bound == value,
                            None => true,
                        },
                    }
                })
        }))
    }
}

/// Try to extend `current` so that it matches `row`.
///
/// Markers that receive a value are pushed onto `newly_bound`,
/// also if the row turns out not to match.
fn bind_row(
    scan: &ScanNode,
    row: &Row,
    current: &mut Assignment,
    newly_bound: &mut Vec<VariableMarker>,
) -> bool {
    for (index, (binding, value)) in scan.columns().iter().zip(row.iter()).enumerate() {
        if value.is_null() && !scan.is_nullable(index) {
            return false;
        }

        match binding {
            ColumnBinding::Constant(constant) => {
                if constant != value {
                    return false;
                }
            }
            ColumnBinding::Variable(marker) => match &current[*marker] {
                Some(bound) => {
                    if bound != value {
                        return false;
                    }
                }
                None => {
                    current[*marker] = Some(value.clone());
                    newly_bound.push(*marker);
                }
            },
        }
    }

    true
}

/// Return the value of a binding under the given assignment.
fn resolve(binding: &ColumnBinding, assignment: &Assignment) -> Result<DataValue, Error> {
    match binding {
        ColumnBinding::Constant(value) => Ok(value.clone()),
        ColumnBinding::Variable(marker) => assignment
            .get(*marker)
            .cloned()
            .flatten()
            .ok_or(Error::UnboundVariable(*marker)),
    }
}
