//! This module defines [Variable] and [AtomArgument].

use std::{fmt::Display, hash::Hash};

use orchestra_physical::datavalues::DataValue;

use super::relation::FieldType;

/// Named variable
///
/// Two variables are equal if they have the same name;
/// the type only records the field the variable was first used in.
#[derive(Debug, Clone, Eq)]
pub struct Variable {
    name: String,
    field_type: Option<FieldType>,
}

impl Variable {
    /// Create a new untyped [Variable].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: None,
        }
    }

    /// Return the name of the variable.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the type of the variable, if known.
    pub fn field_type(&self) -> Option<FieldType> {
        self.field_type
    }

    pub(crate) fn set_type(&mut self, field_type: FieldType) {
        self.field_type = Some(field_type);
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Hash for Variable {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Argument of an atom
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AtomArgument {
    /// Variable
    Variable(Variable),
    /// Ground value
    Constant(DataValue),
    /// Application of a skolem function
    Skolem {
        /// Name of the function
        function: String,
        /// Arguments of the function
        arguments: Vec<AtomArgument>,
    },
}

impl AtomArgument {
    /// Create a variable argument.
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(Variable::new(name))
    }

    /// Create a constant argument.
    pub fn constant(value: impl Into<DataValue>) -> Self {
        Self::Constant(value.into())
    }

    /// Return the variable if this argument is one.
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            AtomArgument::Variable(variable) => Some(variable),
            _ => None,
        }
    }

    /// Return whether the argument contains no variables.
    pub fn is_ground(&self) -> bool {
        self.variables().next().is_none()
    }

    /// Iterate over all variables occurring in this argument.
    pub fn variables(&self) -> Box<dyn Iterator<Item = &Variable> + '_> {
        match self {
            AtomArgument::Variable(variable) => Box::new(std::iter::once(variable)),
            AtomArgument::Constant(_) => Box::new(std::iter::empty()),
            AtomArgument::Skolem { arguments, .. } => {
                Box::new(arguments.iter().flat_map(AtomArgument::variables))
            }
        }
    }

    /// Evaluate a ground argument.
    pub fn to_value(&self) -> Option<DataValue> {
        match self {
            AtomArgument::Variable(_) => None,
            AtomArgument::Constant(value) => Some(value.clone()),
            AtomArgument::Skolem {
                function,
                arguments,
            } => Some(DataValue::skolem(
                function.clone(),
                arguments
                    .iter()
                    .map(AtomArgument::to_value)
                    .collect::<Option<Vec<_>>>()?,
            )),
        }
    }
}

impl From<Variable> for AtomArgument {
    fn from(value: Variable) -> Self {
        Self::Variable(value)
    }
}

impl Display for AtomArgument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AtomArgument::Variable(variable) => variable.fmt(f),
            AtomArgument::Constant(value) => value.fmt(f),
            AtomArgument::Skolem {
                function,
                arguments,
            } => {
                write!(f, "{function}(")?;
                for (index, argument) in arguments.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    argument.fmt(f)?;
                }
                f.write_str(")")
            }
        }
    }
}
