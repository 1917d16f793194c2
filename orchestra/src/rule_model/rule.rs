//! This module defines [Rule] and [RuleMode].

use std::{collections::HashSet, fmt::Display};

use crate::error::Error;

use super::{atom::Atom, term::Variable};

/// How the tuples derived by a [Rule] change its head relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RuleMode {
    /// Add derived tuples
    #[default]
    Insert,
    /// Remove derived tuples
    DeleteFromHead,
    /// Replace the content of the head relation by the derived tuples
    ClearAndCopy,
    /// Remove all tuples of the head relation; the rule has no body
    Clear,
}

/// Rule with a single head atom
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    head: Atom,
    body: Vec<Atom>,
    mode: RuleMode,
    /// Mapping this rule was derived from
    mapping: Option<String>,
}

impl Rule {
    /// Create a new insertion [Rule].
    pub fn new(head: Atom, body: Vec<Atom>) -> Self {
        Self {
            head,
            body,
            mode: RuleMode::Insert,
            mapping: None,
        }
    }

    /// Create a rule removing all tuples of the table addressed by `head`.
    pub fn clear(head: Atom) -> Self {
        Self {
            mode: RuleMode::Clear,
            ..Self::new(head, Vec::new())
        }
    }

    /// Return a copy with the given [RuleMode].
    pub fn with_mode(mut self, mode: RuleMode) -> Self {
        self.mode = mode;
        self
    }

    /// Return a copy that records the mapping it was derived from.
    pub fn with_mapping(mut self, mapping: Option<String>) -> Self {
        self.mapping = mapping;
        self
    }

    /// Return a copy with a different head and body.
    pub(crate) fn with_atoms(&self, head: Atom, body: Vec<Atom>) -> Self {
        Self {
            head,
            body,
            mode: self.mode,
            mapping: self.mapping.clone(),
        }
    }

    /// Return the head.
    pub fn head(&self) -> &Atom {
        &self.head
    }

    /// Return the body.
    pub fn body(&self) -> &[Atom] {
        &self.body
    }

    /// Return the [RuleMode].
    pub fn mode(&self) -> RuleMode {
        self.mode
    }

    /// Return the id of the mapping this rule was derived from.
    pub fn mapping(&self) -> Option<&str> {
        self.mapping.as_deref()
    }

    /// Return all variables bound by a positive body atom.
    pub fn safe_variables(&self) -> HashSet<&Variable> {
        let mut result = HashSet::new();

        for atom in self.body.iter().filter(|atom| !atom.is_negated()) {
            if atom.is_skolem() {
                result.extend(atom.values().iter().flat_map(|value| value.variables()));
            } else {
                result.extend(atom.variables());
            }
        }

        result
    }

    /// Check that the rule can be evaluated.
    ///
    /// Every variable of the head, of a negated atom and of the keys
    /// of a skolem atom must occur in a positive body atom.
    /// Clearing rules must not have a body.
    pub fn validate(&self) -> Result<(), Error> {
        let malformed = |reason: String| Error::MalformedRule {
            rule: self.to_string(),
            reason,
        };

        if self.mode == RuleMode::Clear {
            if !self.body.is_empty() {
                return Err(malformed("clearing rules must not have a body".to_string()));
            }
            return Ok(());
        }

        if self.head.is_negated() || self.head.is_skolem() {
            return Err(malformed("the head must be a positive relational atom".to_string()));
        }

        let safe = self.safe_variables();
        let mut constrained = self.head.variables().collect::<Vec<_>>();
        for atom in &self.body {
            if atom.is_skolem() {
                constrained.extend(
                    atom.skolem_key_values()
                        .into_iter()
                        .flatten()
                        .flat_map(|key| key.variables()),
                );
            } else if atom.is_negated() {
                constrained.extend(atom.variables());
            }
        }

        for variable in constrained {
            if !safe.contains(variable) {
                return Err(malformed(format!(
                    "variable {variable} does not occur in a positive body atom"
                )));
            }
        }

        Ok(())
    }
}

impl Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let operator = match self.mode {
            RuleMode::Insert => ":-",
            RuleMode::DeleteFromHead => ":- delete",
            RuleMode::ClearAndCopy => ":=",
            RuleMode::Clear => return write!(f, "clear {} .", self.head.staging_name()),
        };

        write!(f, "{} {operator} ", self.head)?;
        for (index, atom) in self.body.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            atom.fmt(f)?;
        }
        f.write_str(" .")
    }
}
