//! This module defines [Update] and the [UpdateApplier] trait,
//! which records local edits in the staging tables of a peer relation.

use std::fmt::Display;

use orchestra_physical::{datavalues::DataValue, management::database::DatabaseInstance};

use crate::{
    error::Error,
    rule_model::{
        atom_type::AtomType,
        relation::{LOCAL, REJECT},
    },
};

use super::memory_engine::{insert_row, MemoryEngine};

/// Kind of a local edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    /// Contribute a tuple
    Insert,
    /// Retract a contributed tuple
    Delete,
    /// Reject an imported tuple
    Reject,
    /// Withdraw the rejection of a tuple
    Unreject,
}

impl Display for UpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            UpdateKind::Insert => "+",
            UpdateKind::Delete => "-",
            UpdateKind::Reject => "!",
            UpdateKind::Unreject => "?",
        })
    }
}

/// Local edit of a single tuple of a peer relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    kind: UpdateKind,
    relation: String,
    tuple: Vec<DataValue>,
}

impl Update {
    /// Create a new [Update].
    pub fn new(kind: UpdateKind, relation: impl Into<String>, tuple: Vec<DataValue>) -> Self {
        Self {
            kind,
            relation: relation.into(),
            tuple,
        }
    }

    /// Return the [UpdateKind].
    pub fn kind(&self) -> UpdateKind {
        self.kind
    }

    /// Return the name of the peer relation.
    pub fn relation(&self) -> &str {
        &self.relation
    }

    /// Return the tuple.
    pub fn tuple(&self) -> &[DataValue] {
        &self.tuple
    }
}

impl Display for Update {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}(", self.kind, self.relation)?;
        for (index, value) in self.tuple.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}

/// Records local edits so that the next reconciliation round propagates them
///
/// Each method returns whether a staging table changed.
pub trait UpdateApplier {
    /// Stage the contribution of a tuple to `relation`.
    ///
    /// A pending deletion of the same tuple is cancelled instead.
    fn apply_insert(&mut self, relation: &str, tuple: Vec<DataValue>) -> Result<bool, Error>;

    /// Stage the retraction of a contributed tuple of `relation`.
    ///
    /// A pending insertion of the same tuple is cancelled instead.
    fn apply_delete(&mut self, relation: &str, tuple: Vec<DataValue>) -> Result<bool, Error>;

    /// Stage the rejection of a tuple of `relation`.
    ///
    /// A pending withdrawal of the same rejection is cancelled instead.
    fn apply_reject(&mut self, relation: &str, tuple: Vec<DataValue>) -> Result<bool, Error>;

    /// Stage the withdrawal of the rejection of a tuple of `relation`.
    ///
    /// A pending rejection of the same tuple is cancelled instead.
    fn apply_unreject(&mut self, relation: &str, tuple: Vec<DataValue>) -> Result<bool, Error>;

    /// Stage a single [Update].
    fn apply(&mut self, update: &Update) -> Result<bool, Error> {
        let tuple = update.tuple().to_vec();
        match update.kind() {
            UpdateKind::Insert => self.apply_insert(update.relation(), tuple),
            UpdateKind::Delete => self.apply_delete(update.relation(), tuple),
            UpdateKind::Reject => self.apply_reject(update.relation(), tuple),
            UpdateKind::Unreject => self.apply_unreject(update.relation(), tuple),
        }
    }

    /// Stage all updates in order and return the number that changed a staging table.
    fn apply_all<'a, Updates>(&mut self, updates: Updates) -> Result<usize, Error>
    where
        Updates: IntoIterator<Item = &'a Update>,
        Self: Sized,
    {
        let mut changed = 0;
        for update in updates {
            if self.apply(update)? {
                changed += 1;
            } else {
                log::debug!("update {update} has no effect");
            }
        }

        Ok(changed)
    }
}

/// Names of the current, insertion and deletion table of an auxiliary relation
fn staging_tables(
    database: &DatabaseInstance,
    relation: &str,
    suffix: &str,
) -> Result<(String, String, String), Error> {
    let name = format!("{relation}{suffix}");
    if !database.has_table(&name) {
        return Err(Error::UnknownRelation(relation.to_string()));
    }

    Ok((
        AtomType::None.staging_name(&name),
        AtomType::Ins.staging_name(&name),
        AtomType::Del.staging_name(&name),
    ))
}

fn contains(database: &DatabaseInstance, table: &str, tuple: &[DataValue]) -> Result<bool, Error> {
    Ok(database.table(table)?.contains(tuple))
}

impl UpdateApplier for MemoryEngine {
    fn apply_insert(&mut self, relation: &str, tuple: Vec<DataValue>) -> Result<bool, Error> {
        let database = self.database_mut();
        let (current, insertions, deletions) = staging_tables(database, relation, LOCAL)?;

        if contains(database, &deletions, &tuple)? {
            return Ok(database.remove_rows(&deletions, std::iter::once(&tuple))? > 0);
        }
        if contains(database, &current, &tuple)? {
            return Ok(false);
        }

        insert_row(database, &insertions, tuple)
    }

    fn apply_delete(&mut self, relation: &str, tuple: Vec<DataValue>) -> Result<bool, Error> {
        let database = self.database_mut();
        let (current, insertions, deletions) = staging_tables(database, relation, LOCAL)?;

        if contains(database, &insertions, &tuple)? {
            return Ok(database.remove_rows(&insertions, std::iter::once(&tuple))? > 0);
        }
        if !contains(database, &current, &tuple)? {
            return Ok(false);
        }

        insert_row(database, &deletions, tuple)
    }

    fn apply_reject(&mut self, relation: &str, tuple: Vec<DataValue>) -> Result<bool, Error> {
        let database = self.database_mut();
        let (current, insertions, deletions) = staging_tables(database, relation, REJECT)?;

        if contains(database, &deletions, &tuple)? {
            return Ok(database.remove_rows(&deletions, std::iter::once(&tuple))? > 0);
        }
        if contains(database, &current, &tuple)? {
            return Ok(false);
        }

        insert_row(database, &insertions, tuple)
    }

    fn apply_unreject(&mut self, relation: &str, tuple: Vec<DataValue>) -> Result<bool, Error> {
        let database = self.database_mut();
        let (current, insertions, deletions) = staging_tables(database, relation, REJECT)?;

        if contains(database, &insertions, &tuple)? {
            return Ok(database.remove_rows(&insertions, std::iter::once(&tuple))? > 0);
        }
        if !contains(database, &current, &tuple)? {
            return Ok(false);
        }

        insert_row(database, &deletions, tuple)
    }
}
