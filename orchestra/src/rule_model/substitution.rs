//! This module defines [Substitution].

use std::collections::HashMap;

use super::{
    atom::Atom,
    rule::Rule,
    term::{AtomArgument, Variable},
};

/// Map from [Variable]s to [AtomArgument]s
/// that can be used to uniformly replace variables
///
/// Bindings may refer to other bound variables;
/// applying the substitution follows such chains.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Substitution {
    map: HashMap<Variable, AtomArgument>,
}

impl Substitution {
    /// Create a new [Substitution].
    pub fn new<Iterator>(iter: Iterator) -> Self
    where
        Iterator: IntoIterator<Item = (Variable, AtomArgument)>,
    {
        Self {
            map: iter.into_iter().collect(),
        }
    }

    /// Add a new mapping.
    pub fn insert(&mut self, from: Variable, to: AtomArgument) {
        self.map.insert(from, to);
    }

    /// Return the argument a variable is mapped to.
    pub fn get(&self, variable: &Variable) -> Option<&AtomArgument> {
        self.map.get(variable)
    }

    /// Return the number of mapped variables.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Return whether no variable is mapped.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Return an iterator over all mapped variables in this substitution.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.map.keys()
    }

    /// Apply the substitution to an argument.
    pub fn apply_argument(&self, argument: &AtomArgument) -> AtomArgument {
        match argument {
            AtomArgument::Variable(variable) => match self.map.get(variable) {
                Some(target) => self.apply_argument(target),
                None => argument.clone(),
            },
            AtomArgument::Constant(_) => argument.clone(),
            AtomArgument::Skolem {
                function,
                arguments,
            } => AtomArgument::Skolem {
                function: function.clone(),
                arguments: arguments
                    .iter()
                    .map(|argument| self.apply_argument(argument))
                    .collect(),
            },
        }
    }

    /// Apply the substitution to the arguments of an atom.
    pub fn apply_atom(&self, atom: &Atom) -> Atom {
        atom.map_arguments(|argument| self.apply_argument(argument))
    }

    /// Apply the substitution to every atom of a rule.
    pub fn apply_rule(&self, rule: &Rule) -> Rule {
        rule.with_atoms(
            self.apply_atom(rule.head()),
            rule.body().iter().map(|atom| self.apply_atom(atom)).collect(),
        )
    }

    /// Follow variable bindings until reaching an unbound variable or a non-variable.
    fn walk<'a>(&'a self, mut argument: &'a AtomArgument) -> &'a AtomArgument {
        while let AtomArgument::Variable(variable) = argument {
            match self.map.get(variable) {
                Some(target) => argument = target,
                None => break,
            }
        }

        argument
    }

    fn occurs(&self, variable: &Variable, argument: &AtomArgument) -> bool {
        match self.walk(argument) {
            AtomArgument::Variable(other) => other == variable,
            AtomArgument::Constant(_) => false,
            AtomArgument::Skolem { arguments, .. } => arguments
                .iter()
                .any(|argument| self.occurs(variable, argument)),
        }
    }

    /// Extend the substitution so that it makes both arguments equal.
    ///
    /// Returns `false` if this is impossible. The substitution may then
    /// contain bindings from the failed attempt and should be discarded.
    pub fn unify(&mut self, left: &AtomArgument, right: &AtomArgument) -> bool {
        let left = self.walk(left).clone();
        let right = self.walk(right).clone();

        match (&left, &right) {
            (AtomArgument::Variable(first), AtomArgument::Variable(second))
                if first == second =>
            {
                true
            }
            (AtomArgument::Variable(variable), other) | (other, AtomArgument::Variable(variable)) => {
                if self.occurs(variable, other) {
                    return false;
                }

                self.map.insert(variable.clone(), other.clone());
                true
            }
            (AtomArgument::Constant(first), AtomArgument::Constant(second)) => first == second,
            (
                AtomArgument::Skolem {
                    function: first_function,
                    arguments: first_arguments,
                },
                AtomArgument::Skolem {
                    function: second_function,
                    arguments: second_arguments,
                },
            ) => {
                first_function == second_function
                    && self.unify_all(first_arguments, second_arguments)
            }
            (AtomArgument::Constant(value), skolem @ AtomArgument::Skolem { .. })
            | (skolem @ AtomArgument::Skolem { .. }, AtomArgument::Constant(value)) => {
                skolem.to_value().as_ref() == Some(value)
            }
        }
    }

    /// Unify two argument lists position by position.
    pub fn unify_all(&mut self, left: &[AtomArgument], right: &[AtomArgument]) -> bool {
        left.len() == right.len()
            && left
                .iter()
                .zip(right.iter())
                .all(|(first, second)| self.unify(first, second))
    }
}

#[cfg(test)]
mod test {
    use crate::rule_model::term::{AtomArgument, Variable};

    use super::Substitution;

    fn var(name: &str) -> AtomArgument {
        AtomArgument::variable(name)
    }

    #[test]
    fn chains_are_followed() {
        let substitution = Substitution::new([
            (Variable::new("X"), var("Y")),
            (Variable::new("Y"), AtomArgument::constant(5i64)),
        ]);

        assert_eq!(
            substitution.apply_argument(&var("X")),
            AtomArgument::constant(5i64)
        );
        assert_eq!(substitution.apply_argument(&var("Z")), var("Z"));
    }

    #[test]
    fn unify_lists() {
        let mut substitution = Substitution::default();
        assert!(substitution.unify_all(
            &[var("A"), var("B"), AtomArgument::constant("x")],
            &[var("X"), var("X"), var("C")],
        ));

        assert_eq!(
            substitution.apply_argument(&var("A")),
            substitution.apply_argument(&var("B"))
        );
        assert_eq!(
            substitution.apply_argument(&var("C")),
            AtomArgument::constant("x")
        );
    }

    #[test]
    fn clashes_fail() {
        let mut substitution = Substitution::default();
        assert!(!substitution.unify_all(
            &[AtomArgument::constant(1i64), var("Y")],
            &[AtomArgument::constant(2i64), var("Y")],
        ));

        let skolem = AtomArgument::Skolem {
            function: "f".to_string(),
            arguments: vec![var("X")],
        };
        let mut substitution = Substitution::default();
        assert!(!substitution.unify(&var("X"), &skolem));

        let mut substitution = Substitution::default();
        assert!(!substitution.unify_all(&[var("X")], &[var("X"), var("Y")]));
    }
}
