//! This module defines [DatalogProgram] and [DatalogSequence].

use std::fmt::Display;

use super::rule::Rule;

/// Set of rules evaluated together
///
/// A recursive program is evaluated until none of its rules derives new tuples;
/// a non-recursive one applies each rule once in the given order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DatalogProgram {
    name: String,
    rules: Vec<Rule>,
    recursive: bool,
}

impl DatalogProgram {
    /// Create a new [DatalogProgram].
    pub fn new(name: impl Into<String>, rules: Vec<Rule>, recursive: bool) -> Self {
        Self {
            name: name.into(),
            rules,
            recursive,
        }
    }

    /// Return the name of the program.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the rules.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Return whether the program is evaluated to a fixpoint.
    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// Return whether the program contains no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Element of a [DatalogSequence]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatalogStep {
    /// Single program
    Program(DatalogProgram),
    /// Nested sequence
    Sequence(DatalogSequence),
}

impl DatalogStep {
    fn rules(&self) -> Box<dyn Iterator<Item = &Rule> + '_> {
        match self {
            DatalogStep::Program(program) => Box::new(program.rules().iter()),
            DatalogStep::Sequence(sequence) => sequence.rules(),
        }
    }
}

/// Ordered list of programs and nested sequences
///
/// Later steps may read relations written by earlier ones.
/// A recursive sequence repeats all its steps until none of them changes any relation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DatalogSequence {
    name: String,
    steps: Vec<DatalogStep>,
    recursive: bool,
}

impl DatalogSequence {
    /// Create a new empty [DatalogSequence].
    pub fn new(name: impl Into<String>, recursive: bool) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            recursive,
        }
    }

    /// Append a program.
    pub fn add_program(&mut self, program: DatalogProgram) {
        self.steps.push(DatalogStep::Program(program));
    }

    /// Append a nested sequence.
    pub fn add_sequence(&mut self, sequence: DatalogSequence) {
        self.steps.push(DatalogStep::Sequence(sequence));
    }

    /// Append a program built from the given rules, unless there are none.
    pub fn add_rules(&mut self, name: impl Into<String>, rules: Vec<Rule>, recursive: bool) {
        if !rules.is_empty() {
            self.add_program(DatalogProgram::new(name, rules, recursive));
        }
    }

    /// Return the name of the sequence.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the steps.
    pub fn steps(&self) -> &[DatalogStep] {
        &self.steps
    }

    /// Return whether the sequence is repeated until a fixpoint is reached.
    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// Iterate over all rules of all steps in evaluation order.
    pub fn rules(&self) -> Box<dyn Iterator<Item = &Rule> + '_> {
        Box::new(self.steps.iter().flat_map(DatalogStep::rules))
    }

    /// Return the total number of rules.
    pub fn num_rules(&self) -> usize {
        self.rules().count()
    }

    /// Return whether the sequence contains no rules.
    pub fn is_empty(&self) -> bool {
        self.rules().next().is_none()
    }

    fn format(&self, f: &mut std::fmt::Formatter<'_>, indent: usize) -> std::fmt::Result {
        let fixpoint = if self.recursive { " (fixpoint)" } else { "" };
        writeln!(f, "{:indent$}sequence {}{fixpoint}", "", self.name)?;

        for step in &self.steps {
            match step {
                DatalogStep::Program(program) => {
                    let fixpoint = if program.recursive { " (fixpoint)" } else { "" };
                    writeln!(f, "{:width$}program {}{fixpoint}", "", program.name, width = indent + 2)?;
                    for rule in &program.rules {
                        writeln!(f, "{:width$}{rule}", "", width = indent + 4)?;
                    }
                }
                DatalogStep::Sequence(sequence) => sequence.format(f, indent + 2)?,
            }
        }

        Ok(())
    }
}

impl Display for DatalogSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.format(f, 0)
    }
}
