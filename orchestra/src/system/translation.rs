//! This module defines [ExchangeSystem] and the [TranslationRules] it compiles to.

use crate::{
    error::Error,
    rule_model::{
        atom::Atom,
        program::DatalogSequence,
        relation::{RelationField, RelationKind, PROVENANCE_PREFIX},
        rule::Rule,
        term::{AtomArgument, Variable},
    },
};

use super::{
    catalog::Catalog,
    dependency::DependencyGraph,
    mapping::{Mapping, View},
};

/// Peers, relations, mappings and views of one collaborative data-sharing system
#[derive(Debug, Default)]
pub struct ExchangeSystem {
    catalog: Catalog,
    mappings: Vec<Mapping>,
    views: Vec<View>,
}

impl ExchangeSystem {
    /// Create a new [ExchangeSystem] over the given [Catalog].
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            mappings: Vec::new(),
            views: Vec::new(),
        }
    }

    /// Return the [Catalog].
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Return the [Catalog] for registering further relations.
    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    /// Return the mappings.
    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    /// Return the views.
    pub fn views(&self) -> &[View] {
        &self.views
    }

    /// Return whether some mapping propagates deletions backwards.
    pub fn has_bidirectional(&self) -> bool {
        self.mappings.iter().any(Mapping::is_bidirectional)
    }

    /// Add a mapping and register its mapping relation `P_<id>`.
    pub fn add_mapping(&mut self, mapping: Mapping) -> Result<(), Error> {
        if self.mappings.iter().any(|other| other.id() == mapping.id()) {
            return Err(Error::DuplicateMapping(mapping.id().to_string()));
        }

        let peer = mapping.head()[0].context().peer().to_string();
        self.catalog
            .add_provenance_relation(&peer, mapping.id(), mapping.provenance_fields())?;
        self.mappings.push(mapping);

        Ok(())
    }

    /// Add a view.
    pub fn add_view(&mut self, view: View) {
        self.views.push(view);
    }

    /// Translate the mappings and views into rules.
    pub fn translate(&self) -> Result<TranslationRules, Error> {
        let mut result = TranslationRules::default();

        for context in self.catalog.relations_of_kind(RelationKind::Peer) {
            let local = self.catalog.local(context.relation().name())?;
            result.local.push(Rule::new(
                Atom::generic(context.clone())?,
                vec![Atom::generic(local.clone())?],
            ));
        }

        for mapping in &self.mappings {
            let (source, targets) = self.translate_mapping(mapping)?;
            result.source_to_provenance.push(source);
            result.provenance_to_target.extend(targets);
        }

        result
            .views
            .extend(self.views.iter().map(|view| view.rule().clone()));

        for rule in result.all_rules() {
            rule.validate()?;
        }

        log::debug!(
            "translated {} mappings and {} views into {} rules",
            self.mappings.len(),
            self.views.len(),
            result.all_rules().count()
        );

        Ok(result)
    }

    /// Return the rule defining the mapping relation
    /// and one rule per head atom deriving target tuples from it.
    fn translate_mapping(&self, mapping: &Mapping) -> Result<(Rule, Vec<Rule>), Error> {
        let id = Some(mapping.id().to_string());
        let provenance = self
            .catalog
            .relation(&format!("{PROVENANCE_PREFIX}{}", mapping.id()))?;

        let provenance_atom = Atom::builder(provenance.clone())
            .values(
                mapping
                    .universal_variables()
                    .into_iter()
                    .map(AtomArgument::Variable),
            )
            .build()?;

        let source = Rule::new(provenance_atom.clone(), mapping.body().to_vec())
            .with_mapping(id.clone());

        let frontier = mapping
            .frontier()
            .into_iter()
            .map(AtomArgument::Variable)
            .collect::<Vec<_>>();
        let existentials = mapping.existential_variables();

        let mut targets = Vec::new();
        let mut fresh = 0usize;

        for head in mapping.head() {
            let mut skolems = Vec::<Atom>::new();
            let mut values = Vec::new();

            for (value, field) in head.values().iter().zip(head.relation().fields()) {
                match value {
                    AtomArgument::Variable(variable) if existentials.contains(variable) => {
                        let function = format!("SK_{}_{}", mapping.id(), variable.name());
                        if !skolems.iter().any(|atom| atom.relation().name() == function) {
                            let output = RelationField::new(variable.name(), field.field_type());
                            skolems.push(Atom::skolem(
                                self.catalog.skolem_context(&function, output),
                                variable.clone(),
                                frontier.clone(),
                            )?);
                        }
                        values.push(value.clone());
                    }
                    AtomArgument::Skolem {
                        function,
                        arguments,
                    } => {
                        let variable = Variable::new(format!("_S{fresh}"));
                        fresh += 1;

                        let output = RelationField::new(variable.name(), field.field_type());
                        skolems.push(Atom::skolem(
                            self.catalog.skolem_context(function, output),
                            variable.clone(),
                            arguments.clone(),
                        )?);
                        values.push(AtomArgument::Variable(variable));
                    }
                    _ => values.push(value.clone()),
                }
            }

            let target = Atom::builder(head.context().clone())
                .values(values)
                .annotations(head.annotations().to_vec())
                .build()?;
            let reject = target
                .with_context(self.catalog.reject(head.relation().name())?.clone())
                .with_negation(true);

            let mut body = vec![provenance_atom.clone()];
            body.extend(skolems);
            body.push(reject);

            targets.push(Rule::new(target, body).with_mapping(id.clone()));
        }

        Ok((source, targets))
    }
}

/// Rules compiled from an [ExchangeSystem]
#[derive(Debug, Clone, Default)]
pub struct TranslationRules {
    local: Vec<Rule>,
    source_to_provenance: Vec<Rule>,
    provenance_to_target: Vec<Rule>,
    views: Vec<Rule>,
}

impl TranslationRules {
    /// Return the rules `R(x) :- R_L(x)` copying local contributions into peer relations.
    pub fn local(&self) -> &[Rule] {
        &self.local
    }

    /// Return the rules defining the mapping relations.
    pub fn source_to_provenance(&self) -> &[Rule] {
        &self.source_to_provenance
    }

    /// Return the rules deriving target tuples from mapping relations.
    pub fn provenance_to_target(&self) -> &[Rule] {
        &self.provenance_to_target
    }

    /// Return the rules defining join and outer-union relations.
    pub fn views(&self) -> &[Rule] {
        &self.views
    }

    /// Iterate over all rules.
    pub fn all_rules(&self) -> impl Iterator<Item = &Rule> {
        self.local
            .iter()
            .chain(self.source_to_provenance.iter())
            .chain(self.provenance_to_target.iter())
            .chain(self.views.iter())
    }

    /// Return whether some relation depends on itself.
    pub fn is_recursive(&self) -> bool {
        DependencyGraph::new(self.all_rules()).is_recursive()
    }

    /// Return the program recomputing all derived relations from the local relations.
    ///
    /// The program first clears every derived relation and then evaluates
    /// one program per strongly connected component of the dependency graph.
    pub fn full_program(&self) -> Result<DatalogSequence, Error> {
        let mut result = DatalogSequence::new("full recomputation", false);

        let mut cleared = Vec::<String>::new();
        let mut clear_rules = Vec::new();
        for rule in self.all_rules() {
            let head = rule.head();
            if !cleared.iter().any(|name| name == head.relation().name()) {
                cleared.push(head.relation().name().to_string());
                clear_rules.push(Rule::clear(Atom::generic(head.context().clone())?));
            }
        }
        result.add_rules("clear derived", clear_rules, false);

        let graph = DependencyGraph::new(self.all_rules());
        for (index, (component, recursive)) in graph.components().into_iter().enumerate() {
            let rules = self
                .all_rules()
                .filter(|rule| component.iter().any(|name| name == rule.head().relation().name()))
                .cloned()
                .collect::<Vec<_>>();

            result.add_rules(format!("stratum {index}"), rules, recursive);
        }

        Ok(result)
    }
}
