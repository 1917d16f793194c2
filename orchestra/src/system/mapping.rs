//! This module defines [Mapping] and [View].

use std::fmt::Display;

use crate::{
    error::Error,
    rule_model::{
        atom::Atom,
        relation::{FieldType, RelationField, RelationKind},
        rule::Rule,
        term::{AtomArgument, Variable},
    },
};

/// Declarative schema mapping `head_1, ..., head_k :- body`
///
/// Head variables that do not occur in the body are existentially quantified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    id: String,
    head: Vec<Atom>,
    body: Vec<Atom>,
    bidirectional: bool,
}

impl Mapping {
    /// Create a new [Mapping].
    ///
    /// The body atoms of a bidirectional mapping are marked for backward deletion.
    pub fn new(
        id: impl Into<String>,
        head: Vec<Atom>,
        body: Vec<Atom>,
        bidirectional: bool,
    ) -> Result<Self, Error> {
        let id = id.into();
        let body = body
            .into_iter()
            .map(|atom| {
                if bidirectional && !atom.is_negated() {
                    atom.with_del(true)
                } else {
                    atom
                }
            })
            .collect::<Vec<_>>();

        let result = Self {
            id,
            head,
            body,
            bidirectional,
        };
        result.validate()?;

        Ok(result)
    }

    fn validate(&self) -> Result<(), Error> {
        let malformed = |reason: &str| Error::MalformedRule {
            rule: self.to_string(),
            reason: reason.to_string(),
        };

        if self.head.is_empty() {
            return Err(malformed("mapping without head atoms"));
        }
        if !self.body.iter().any(|atom| !atom.is_negated()) {
            return Err(malformed("mapping without positive body atom"));
        }

        for atom in self.head.iter().chain(self.body.iter()) {
            if atom.relation().kind() != RelationKind::Peer {
                return Err(malformed(&format!(
                    "relation {} is not a peer relation",
                    atom.relation().name()
                )));
            }
        }

        if self.head.iter().any(Atom::is_negated) {
            return Err(malformed("negated head atom"));
        }

        let universal = self.universal_variables();
        for atom in self.body.iter().filter(|atom| atom.is_negated()) {
            if let Some(variable) = atom.variables().find(|variable| !universal.contains(variable)) {
                return Err(malformed(&format!(
                    "variable {variable} of a negated atom does not occur in a positive atom"
                )));
            }
        }

        for atom in &self.head {
            for value in atom.values() {
                if let AtomArgument::Skolem { arguments, .. } = value {
                    if arguments.iter().any(|argument| matches!(argument, AtomArgument::Skolem { .. })) {
                        return Err(malformed("nested skolem terms"));
                    }
                    if let Some(variable) = value.variables().find(|variable| !universal.contains(variable)) {
                        return Err(malformed(&format!(
                            "skolem argument {variable} does not occur in the body"
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Return the id of the mapping.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Return the head atoms.
    pub fn head(&self) -> &[Atom] {
        &self.head
    }

    /// Return the body atoms.
    pub fn body(&self) -> &[Atom] {
        &self.body
    }

    /// Return whether deletions propagate backwards through this mapping.
    pub fn is_bidirectional(&self) -> bool {
        self.bidirectional
    }

    /// Return the distinct variables of the positive body atoms in order of occurrence.
    pub fn universal_variables(&self) -> Vec<Variable> {
        let mut result = Vec::<Variable>::new();
        for atom in self.body.iter().filter(|atom| !atom.is_negated()) {
            for variable in atom.variables() {
                if !result.contains(variable) {
                    result.push(variable.clone());
                }
            }
        }

        result
    }

    /// Return the distinct head variables that do not occur in the body.
    pub fn existential_variables(&self) -> Vec<Variable> {
        let universal = self.universal_variables();
        let mut result = Vec::<Variable>::new();

        for atom in &self.head {
            for variable in atom.values().iter().filter_map(AtomArgument::as_variable) {
                if !universal.contains(variable) && !result.contains(variable) {
                    result.push(variable.clone());
                }
            }
        }

        result
    }

    /// Return the universal variables that occur in the head.
    pub fn frontier(&self) -> Vec<Variable> {
        self.universal_variables()
            .into_iter()
            .filter(|variable| self.head.iter().any(|atom| atom.variables().any(|v| v == variable)))
            .collect()
    }

    /// Return the fields of the mapping relation: one per universal variable.
    pub fn provenance_fields(&self) -> Vec<RelationField> {
        self.universal_variables()
            .into_iter()
            .map(|variable| {
                let nullable = self
                    .body
                    .iter()
                    .filter(|atom| !atom.is_negated())
                    .flat_map(|atom| atom.values().iter().zip(atom.nullable()))
                    .any(|(value, &nullable)| nullable && value.as_variable() == Some(&variable));
                let field_type = variable.field_type().unwrap_or(FieldType::String);

                if nullable {
                    RelationField::nullable(variable.name(), field_type)
                } else {
                    RelationField::new(variable.name(), field_type)
                }
            })
            .collect()
    }
}

impl Display for Mapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mapping {}", self.id)?;
        if self.bidirectional {
            f.write_str(" bidirectional")?;
        }
        f.write_str(": ")?;

        for (index, atom) in self.head.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            atom.fmt(f)?;
        }
        f.write_str(" :- ")?;
        for (index, atom) in self.body.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            atom.fmt(f)?;
        }
        f.write_str(" .")
    }
}

/// Rule defining a join or outer-union relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    rule: Rule,
}

impl View {
    /// Create a new [View].
    pub fn new(rule: Rule) -> Result<Self, Error> {
        if !rule.head().relation().kind().is_combined() {
            return Err(Error::MalformedRule {
                rule: rule.to_string(),
                reason: format!(
                    "views must define a join or outer-union relation, {} is neither",
                    rule.head().relation().name()
                ),
            });
        }
        rule.validate()?;

        Ok(Self { rule })
    }

    /// Return the defining rule.
    pub fn rule(&self) -> &Rule {
        &self.rule
    }
}
