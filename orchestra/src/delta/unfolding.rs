//! This module inlines the definitions of mapping relations into the rules that read them.

use std::collections::HashMap;

use crate::{
    error::Error,
    rule_model::{
        atom::Atom,
        atom_type::AtomType,
        relation::RelationKind,
        rule::Rule,
        substitution::Substitution,
        term::{AtomArgument, Variable},
    },
};

/// Bound on the number of definitions inlined into a single rule
const MAX_EXPANSIONS: usize = 64;

/// Return the index of the first body atom that has definitions.
fn expandable_position(
    rule: &Rule,
    definitions: &HashMap<(String, AtomType), Vec<&Rule>>,
) -> Option<usize> {
    rule.body().iter().position(|atom| {
        !atom.is_negated()
            && atom.relation().kind() == RelationKind::Provenance
            && definitions.contains_key(&(atom.relation().name().to_string(), atom.atom_type()))
    })
}

/// Rename every variable of `rule` by appending `suffix`.
fn rename_apart(rule: &Rule, suffix: usize) -> Rule {
    let mut renaming = Substitution::default();
    let atoms = std::iter::once(rule.head()).chain(rule.body().iter());

    for variable in atoms.flat_map(Atom::variables) {
        if renaming.get(variable).is_none() {
            renaming.insert(
                variable.clone(),
                AtomArgument::Variable(Variable::new(format!("{}_{suffix}", variable.name()))),
            );
        }
    }

    renaming.apply_rule(rule)
}

/// Replace every positive mapping-relation atom of `rules` whose relation and tag
/// match the head of a definition in `defs` by the body of that definition.
///
/// An atom with several matching definitions yields one rule per definition;
/// definitions whose head does not unify with the atom are skipped.
/// Atoms without a matching definition stay unchanged.
pub fn unfold_prov_defs(defs: &[Rule], rules: &[Rule]) -> Result<Vec<Rule>, Error> {
    let mut definitions = HashMap::<(String, AtomType), Vec<&Rule>>::new();
    for def in defs {
        let head = def.head();
        definitions
            .entry((head.relation().name().to_string(), head.atom_type()))
            .or_default()
            .push(def);
    }

    let mut result = Vec::new();
    let mut fresh = 0usize;

    for rule in rules {
        let mut pending = vec![(rule.clone(), 0usize)];

        while let Some((current, expansions)) = pending.pop() {
            let Some(position) = expandable_position(&current, &definitions) else {
                result.push(current);
                continue;
            };

            if expansions >= MAX_EXPANSIONS {
                return Err(Error::MalformedRule {
                    rule: rule.to_string(),
                    reason: "definitions of mapping relations are recursive".to_string(),
                });
            }

            let atom = &current.body()[position];
            let key = (atom.relation().name().to_string(), atom.atom_type());

            let mut expanded = Vec::new();
            for def in &definitions[&key] {
                let renamed = rename_apart(def, fresh);
                fresh += 1;

                let mut unifier = Substitution::default();
                if !unifier.unify_all(renamed.head().values(), atom.values()) {
                    continue;
                }

                let mut body = current.body()[..position].to_vec();
                body.extend(renamed.body().iter().cloned());
                body.extend(current.body()[position + 1..].iter().cloned());

                let inlined = current.with_atoms(current.head().clone(), body);
                expanded.push((unifier.apply_rule(&inlined), expansions + 1));
            }

            // reversed so that results come out in definition order
            pending.extend(expanded.into_iter().rev());
        }
    }

    log::trace!(
        "unfolded {} rules over {} definitions into {} rules",
        rules.len(),
        defs.len(),
        result.len()
    );

    Ok(result)
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::rule_model::{
        atom::Atom,
        atom_type::AtomType,
        relation::{FieldType, Relation, RelationContext, RelationField, RelationId, RelationKind},
        rule::Rule,
        term::AtomArgument,
    };

    use super::unfold_prov_defs;

    fn context(name: &str, arity: usize, kind: RelationKind) -> RelationContext {
        let fields = (0..arity)
            .map(|index| RelationField::new(format!("f{index}"), FieldType::Integer))
            .collect();
        RelationContext::new(
            Arc::new(Relation::new(RelationId(0), name, fields, kind)),
            "P",
            "S",
            matches!(kind, RelationKind::Provenance),
        )
    }

    fn atom(name: &str, kind: RelationKind, arguments: Vec<AtomArgument>) -> Atom {
        Atom::builder(context(name, arguments.len(), kind))
            .values(arguments)
            .build()
            .unwrap()
    }

    fn var(name: &str) -> AtomArgument {
        AtomArgument::variable(name)
    }

    #[test]
    fn definitions_are_inlined() {
        let provenance = |arguments| atom("P_m", RelationKind::Provenance, arguments);
        let defs = vec![
            Rule::new(
                provenance(vec![var("X"), var("Y")]).with_type(AtomType::Ins),
                vec![
                    atom("A", RelationKind::Peer, vec![var("X"), var("Z")]).with_type(AtomType::Ins),
                    atom("B", RelationKind::Peer, vec![var("Z"), var("Y")]),
                ],
            ),
            Rule::new(
                provenance(vec![var("X"), var("Y")]).with_type(AtomType::Ins),
                vec![
                    atom("A", RelationKind::Peer, vec![var("X"), var("Z")]).with_type(AtomType::New),
                    atom("B", RelationKind::Peer, vec![var("Z"), var("Y")]).with_type(AtomType::Ins),
                ],
            ),
        ];
        let rule = Rule::new(
            atom("T", RelationKind::Peer, vec![var("U"), var("V")]).with_type(AtomType::Ins),
            vec![
                provenance(vec![var("U"), var("V")]).with_type(AtomType::Ins),
                atom("T_R", RelationKind::Reject, vec![var("U"), var("V")]).with_negation(true),
            ],
        );

        let unfolded = unfold_prov_defs(&defs, &[rule]).unwrap();

        assert_eq!(unfolded.len(), 2);
        assert_eq!(
            unfolded[0].to_string(),
            "T_INS(U, V) :- A_INS(U, Z_0), B(Z_0, V), not T_R(U, V) ."
        );
        assert_eq!(
            unfolded[1].to_string(),
            "T_INS(U, V) :- A_NEW(U, Z_1), B_INS(Z_1, V), not T_R(U, V) ."
        );
    }

    #[test]
    fn other_tags_are_kept() {
        let defs = vec![Rule::new(
            atom("P_m", RelationKind::Provenance, vec![var("X")]).with_type(AtomType::Ins),
            vec![atom("A", RelationKind::Peer, vec![var("X")]).with_type(AtomType::Ins)],
        )];
        let rule = Rule::new(
            atom("T", RelationKind::Peer, vec![var("X")]).with_type(AtomType::Ins),
            vec![atom("P_m", RelationKind::Provenance, vec![var("X")]).with_type(AtomType::New)],
        );

        let unfolded = unfold_prov_defs(&defs, &[rule.clone()]).unwrap();
        assert_eq!(unfolded, vec![rule]);
    }

    #[test]
    fn constants_restrict_definitions() {
        let defs = vec![Rule::new(
            atom(
                "P_m",
                RelationKind::Provenance,
                vec![AtomArgument::constant(1i64), var("Y")],
            )
            .with_type(AtomType::Ins),
            vec![atom("A", RelationKind::Peer, vec![var("Y")]).with_type(AtomType::Ins)],
        )];
        let matching = Rule::new(
            atom("T", RelationKind::Peer, vec![var("Y")]).with_type(AtomType::Ins),
            vec![atom(
                "P_m",
                RelationKind::Provenance,
                vec![AtomArgument::constant(1i64), var("Y")],
            )
            .with_type(AtomType::Ins)],
        );
        let clashing = Rule::new(
            atom("T", RelationKind::Peer, vec![var("Y")]).with_type(AtomType::Ins),
            vec![atom(
                "P_m",
                RelationKind::Provenance,
                vec![AtomArgument::constant(2i64), var("Y")],
            )
            .with_type(AtomType::Ins)],
        );

        let unfolded = unfold_prov_defs(&defs, &[matching, clashing]).unwrap();
        assert_eq!(unfolded.len(), 1);
        assert_eq!(unfolded[0].to_string(), "T_INS(Y) :- A_INS(Y) .");
    }
}
