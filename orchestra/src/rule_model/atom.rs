//! This module defines [Atom] and [AtomBuilder].

use std::{fmt::Display, sync::Arc};

use crate::error::Error;

use super::{
    atom_type::AtomType,
    relation::{Relation, RelationContext},
    term::{AtomArgument, Variable},
};

/// Semiring annotation of an atom
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Annotation {
    /// Trust priority of the derivation
    Trust(i64),
    /// Transaction that contributed the tuple
    Transaction(String),
}

impl Display for Annotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Annotation::Trust(priority) => write!(f, "@trust({priority})"),
            Annotation::Transaction(id) => write!(f, "@transaction({id})"),
        }
    }
}

/// Application of a relation to a list of arguments, tagged with an [AtomType]
///
/// Atoms are immutable; the `with_*` methods return modified copies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom {
    context: RelationContext,
    values: Vec<AtomArgument>,
    nullable: Vec<bool>,
    atom_type: AtomType,
    negated: bool,
    /// Participates in backward deletion through bidirectional mappings
    del: bool,
    all_strata: bool,
    skolem_key_values: Option<Vec<AtomArgument>>,
    annotations: Vec<Annotation>,
}

impl Atom {
    /// Start building an atom over the given relation.
    pub fn builder(context: RelationContext) -> AtomBuilder {
        AtomBuilder::new(context)
    }

    /// Create an atom over the given relation with one fresh variable per field.
    ///
    /// The variables are named `X0`, `X1` and so on.
    pub fn generic(context: RelationContext) -> Result<Self, Error> {
        let arity = context.relation().arity();
        Self::builder(context)
            .values((0..arity).map(|index| AtomArgument::variable(format!("X{index}"))))
            .build()
    }

    /// Create a skolem atom binding `output` to the skolem value of `keys`.
    ///
    /// The relation of the context names the skolem function.
    pub fn skolem(
        context: RelationContext,
        output: Variable,
        keys: Vec<AtomArgument>,
    ) -> Result<Self, Error> {
        Self::builder(context)
            .value(AtomArgument::Variable(output))
            .skolem_keys(keys)
            .build()
    }

    /// Return the [RelationContext].
    pub fn context(&self) -> &RelationContext {
        &self.context
    }

    /// Return the [Relation] this atom refers to.
    pub fn relation(&self) -> &Arc<Relation> {
        self.context.relation()
    }

    /// Return the arguments.
    pub fn values(&self) -> &[AtomArgument] {
        &self.values
    }

    /// Return for each position whether it may hold a labeled null.
    pub fn nullable(&self) -> &[bool] {
        &self.nullable
    }

    /// Return the role tag.
    pub fn atom_type(&self) -> AtomType {
        self.atom_type
    }

    /// Return whether the atom is negated.
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Return whether the atom takes part in backward deletion.
    pub fn is_del(&self) -> bool {
        self.del
    }

    /// Return whether the atom is evaluated across all strata.
    pub fn is_all_strata(&self) -> bool {
        self.all_strata
    }

    /// Return the key arguments if this is a skolem atom.
    pub fn skolem_key_values(&self) -> Option<&[AtomArgument]> {
        self.skolem_key_values.as_deref()
    }

    /// Return whether this atom generates a skolem value.
    pub fn is_skolem(&self) -> bool {
        self.skolem_key_values.is_some()
    }

    /// Return the annotations.
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Iterate over all variables of the atom, including skolem keys.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.values
            .iter()
            .chain(self.skolem_key_values.iter().flatten())
            .flat_map(AtomArgument::variables)
    }

    /// Return the name of the table this atom reads or writes according to its tag.
    pub fn staging_name(&self) -> String {
        self.atom_type.staging_name(self.relation().name())
    }

    /// Return the tag used for evaluation.
    ///
    /// All-strata atoms read the new state where other atoms read the current one.
    pub fn effective_type(&self) -> AtomType {
        match self.atom_type {
            AtomType::None if self.all_strata => AtomType::New,
            atom_type => atom_type,
        }
    }

    /// Return the name of the table read or written during evaluation.
    pub fn table_name(&self) -> String {
        self.effective_type().staging_name(self.relation().name())
    }

    /// Return a copy with a different role tag.
    pub fn with_type(&self, atom_type: AtomType) -> Self {
        Self {
            atom_type,
            ..self.clone()
        }
    }

    /// Return a copy with the given negation.
    pub fn with_negation(&self, negated: bool) -> Self {
        Self {
            negated,
            ..self.clone()
        }
    }

    /// Return a copy with the given deletion marker.
    pub fn with_del(&self, del: bool) -> Self {
        Self {
            del,
            ..self.clone()
        }
    }

    /// Return a copy with the given all-strata marker.
    pub fn with_all_strata(&self, all_strata: bool) -> Self {
        Self {
            all_strata,
            ..self.clone()
        }
    }

    /// Return a copy over a relation with the same fields.
    ///
    /// Used to address the local or reject relation of a peer relation.
    pub(crate) fn with_context(&self, context: RelationContext) -> Self {
        debug_assert_eq!(context.relation().arity(), self.relation().arity());

        Self {
            context,
            ..self.clone()
        }
    }

    /// Return a copy whose arguments and skolem keys are transformed by `function`.
    pub(crate) fn map_arguments<Function>(&self, function: Function) -> Self
    where
        Function: Fn(&AtomArgument) -> AtomArgument,
    {
        Self {
            values: self.values.iter().map(&function).collect(),
            skolem_key_values: self
                .skolem_key_values
                .as_ref()
                .map(|keys| keys.iter().map(&function).collect()),
            ..self.clone()
        }
    }
}

fn write_arguments(f: &mut std::fmt::Formatter<'_>, arguments: &[AtomArgument]) -> std::fmt::Result {
    for (index, argument) in arguments.iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        argument.fmt(f)?;
    }
    Ok(())
}

impl Display for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.negated {
            f.write_str("not ")?;
        }

        f.write_str(&self.staging_name())?;
        if self.all_strata {
            f.write_str("[all]")?;
        }

        f.write_str("(")?;
        write_arguments(f, &self.values)?;
        if let Some(keys) = &self.skolem_key_values {
            f.write_str("; ")?;
            write_arguments(f, keys)?;
        }
        f.write_str(")")?;

        for annotation in &self.annotations {
            write!(f, " {annotation}")?;
        }

        Ok(())
    }
}

/// Builder for [Atom]
#[derive(Debug, Clone)]
pub struct AtomBuilder {
    context: RelationContext,
    values: Vec<AtomArgument>,
    nullable: Option<Vec<bool>>,
    atom_type: AtomType,
    negated: bool,
    del: bool,
    all_strata: bool,
    skolem_key_values: Option<Vec<AtomArgument>>,
    annotations: Vec<Annotation>,
}

impl AtomBuilder {
    fn new(context: RelationContext) -> Self {
        Self {
            context,
            values: Vec::new(),
            nullable: None,
            atom_type: AtomType::None,
            negated: false,
            del: false,
            all_strata: false,
            skolem_key_values: None,
            annotations: Vec::new(),
        }
    }

    /// Append an argument.
    pub fn value(mut self, value: AtomArgument) -> Self {
        self.values.push(value);
        self
    }

    /// Append several arguments.
    pub fn values<Arguments: IntoIterator<Item = AtomArgument>>(mut self, values: Arguments) -> Self {
        self.values.extend(values);
        self
    }

    /// Append one variable argument per given name.
    pub fn variables(self, names: &[&str]) -> Self {
        self.values(names.iter().map(|name| AtomArgument::variable(*name)))
    }

    /// Override which positions may hold labeled nulls.
    ///
    /// By default this follows the fields of the relation.
    pub fn nullable(mut self, nullable: Vec<bool>) -> Self {
        self.nullable = Some(nullable);
        self
    }

    /// Set the role tag.
    pub fn atom_type(mut self, atom_type: AtomType) -> Self {
        self.atom_type = atom_type;
        self
    }

    /// Set whether the atom is negated.
    pub fn negated(mut self, negated: bool) -> Self {
        self.negated = negated;
        self
    }

    /// Set whether the atom takes part in backward deletion.
    pub fn del(mut self, del: bool) -> Self {
        self.del = del;
        self
    }

    /// Set whether the atom is evaluated across all strata.
    pub fn all_strata(mut self, all_strata: bool) -> Self {
        self.all_strata = all_strata;
        self
    }

    /// Mark the atom as skolem atom with the given keys.
    pub fn skolem_keys(mut self, keys: Vec<AtomArgument>) -> Self {
        self.skolem_key_values = Some(keys);
        self
    }

    /// Add an annotation.
    pub fn annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Add several annotations.
    pub fn annotations(mut self, annotations: Vec<Annotation>) -> Self {
        self.annotations.extend(annotations);
        self
    }

    /// Build the [Atom].
    ///
    /// Surplus arguments are dropped. Variables receive the type of their field.
    ///
    /// # Errors
    /// Returns an error if there are fewer arguments than fields
    /// or if a constant does not fit its field.
    pub fn build(self) -> Result<Atom, Error> {
        let relation = self.context.relation().clone();
        let arity = relation.arity();

        if self.values.len() < arity {
            return Err(Error::ArityMismatch {
                relation: relation.name().to_string(),
                expected: arity,
                given: self.values.len(),
            });
        }

        let mut values = self.values;
        values.truncate(arity);

        for (value, field) in values.iter_mut().zip(relation.fields()) {
            match value {
                AtomArgument::Variable(variable) => variable.set_type(field.field_type()),
                AtomArgument::Constant(constant) => {
                    let fits = field.field_type().admits(constant)
                        && (!constant.is_null() || field.is_nullable());

                    if !fits {
                        return Err(Error::TypeMismatch {
                            relation: relation.name().to_string(),
                            field: field.name().to_string(),
                            expected: field.field_type().to_string(),
                            value: constant.to_string(),
                        });
                    }
                }
                AtomArgument::Skolem { .. } => {}
            }
        }

        let mut nullable = self.nullable.unwrap_or_else(|| {
            relation
                .fields()
                .iter()
                .map(|field| field.is_nullable())
                .collect()
        });
        nullable.resize(arity, false);

        Ok(Atom {
            context: self.context,
            values,
            nullable,
            atom_type: self.atom_type,
            negated: self.negated,
            del: self.del,
            all_strata: self.all_strata,
            skolem_key_values: self.skolem_key_values,
            annotations: self.annotations,
        })
    }
}
