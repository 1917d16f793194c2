//! This module generates the delta-rule programs that propagate
//! insertions and deletions through the translated mappings.
//!
//! Each direction compiles to ordered [DatalogSequence]s:
//! a preparation phase copying the current state into the `NEW` staging tables,
//! the main incremental phase and a post phase applying the deltas and clearing
//! the staging tables.

pub mod deletion;
pub mod insertion;
pub mod unfolding;

use crate::{
    error::Error,
    rule_model::{
        atom::Atom,
        atom_type::AtomType,
        program::DatalogSequence,
        relation::{RelationContext, RelationKind},
        rule::{Rule, RuleMode},
    },
    system::catalog::Catalog,
};

/// Relations holding local contributions and rejections
pub(crate) fn base_relations(catalog: &Catalog) -> impl Iterator<Item = &RelationContext> {
    catalog.relations().filter(|context| {
        matches!(
            context.relation().kind(),
            RelationKind::Local | RelationKind::Reject
        )
    })
}

/// Relations whose content is derived by rules
pub(crate) fn derived_relations(catalog: &Catalog) -> impl Iterator<Item = &RelationContext> {
    catalog.relations().filter(|context| {
        matches!(
            context.relation().kind(),
            RelationKind::Peer
                | RelationKind::Provenance
                | RelationKind::Join
                | RelationKind::OuterUnion
        )
    })
}

/// All relations with tables
pub(crate) fn stored_relations(catalog: &Catalog) -> impl Iterator<Item = &RelationContext> {
    catalog
        .relations()
        .filter(|context| context.relation().kind().is_stored())
}

pub(crate) fn peer_relations(catalog: &Catalog) -> impl Iterator<Item = &RelationContext> {
    catalog.relations_of_kind(RelationKind::Peer)
}

/// `head_<to>(x) <mode> body_<from>(x)` over the same relation
pub(crate) fn copy_rule(
    context: &RelationContext,
    from: AtomType,
    to: AtomType,
    mode: RuleMode,
) -> Result<Rule, Error> {
    let atom = Atom::generic(context.clone())?;
    Ok(Rule::new(atom.with_type(to), vec![atom.with_type(from)]).with_mode(mode))
}

/// `head_<to>(x) <mode> body_<from>(x)` between two relations with the same fields
pub(crate) fn transfer_rule(
    head: &RelationContext,
    to: AtomType,
    body: &RelationContext,
    from: AtomType,
    mode: RuleMode,
) -> Result<Rule, Error> {
    let head_atom = Atom::generic(head.clone())?.with_type(to);
    let body_atom = Atom::generic(body.clone())?.with_type(from);
    Ok(Rule::new(head_atom, vec![body_atom]).with_mode(mode))
}

pub(crate) fn clear_rule(context: &RelationContext, atom_type: AtomType) -> Result<Rule, Error> {
    Ok(Rule::clear(Atom::generic(context.clone())?.with_type(atom_type)))
}

/// Rules clearing the given versions of each relation
pub(crate) fn clear_rules<'a, Relations>(relations: Relations, types: &[AtomType]) -> Result<Vec<Rule>, Error>
where
    Relations: Iterator<Item = &'a RelationContext>,
{
    let mut result = Vec::new();
    for context in relations {
        for &atom_type in types {
            result.push(clear_rule(context, atom_type)?);
        }
    }

    Ok(result)
}

/// Sequence replacing the `NEW` version of every stored relation by its current content
fn copy_to_new(catalog: &Catalog, name: &str) -> Result<DatalogSequence, Error> {
    let rules = stored_relations(catalog)
        .map(|context| copy_rule(context, AtomType::None, AtomType::New, RuleMode::ClearAndCopy))
        .collect::<Result<Vec<_>, _>>()?;

    let mut result = DatalogSequence::new(name, false);
    result.add_rules("copy current state", rules, false);
    Ok(result)
}

/// Whether a body atom may supply the delta of a delta rule
fn is_pivot_candidate(atom: &Atom) -> bool {
    !atom.is_skolem() && !atom.is_negated()
}

/// Return whether some positive body atom refers to a mapping relation.
fn reads_provenance(rule: &Rule) -> bool {
    rule.body()
        .iter()
        .any(|atom| atom.relation().kind() == RelationKind::Provenance)
}

/// Reject relations of all peer relations
pub(crate) fn reject_relations(catalog: &Catalog) -> impl Iterator<Item = &RelationContext> {
    catalog.relations_of_kind(RelationKind::Reject)
}

/// Delta rules of `rule` driven by a change of one of its negated rejection atoms.
///
/// The rejection atom turns into a positive `<at>` atom, the head is tagged
/// `head` and every other atom reads the current state.
fn rejection_rules(rule: &Rule, head: AtomType, at: AtomType) -> Vec<Rule> {
    let head = rule.head().with_type(head);

    rule.body()
        .iter()
        .enumerate()
        .filter(|(_, atom)| {
            atom.is_negated() && atom.relation().kind() == RelationKind::Reject
        })
        .map(|(pivot, _)| {
            let body = rule
                .body()
                .iter()
                .enumerate()
                .map(|(index, atom)| {
                    if index == pivot {
                        atom.with_negation(false).with_type(at)
                    } else if atom.is_skolem() {
                        atom.clone()
                    } else {
                        atom.with_type(AtomType::None)
                    }
                })
                .collect();

            rule.with_atoms(head.clone(), body).with_mode(RuleMode::Insert)
        })
        .collect()
}

/// Rules `R_<to> :- R_<from>` for every relation that is the head of one of `rules`
fn head_transfer_rules<'a, Rules>(rules: Rules, from: AtomType, to: AtomType) -> Result<Vec<Rule>, Error>
where
    Rules: Iterator<Item = &'a Rule>,
{
    let mut seen = Vec::<&str>::new();
    let mut result = Vec::new();

    for rule in rules {
        let context = rule.head().context();
        if !seen.contains(&context.relation().name()) {
            seen.push(context.relation().name());
            result.push(copy_rule(context, from, to, RuleMode::Insert)?);
        }
    }

    Ok(result)
}
