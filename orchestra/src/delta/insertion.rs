//! This module defines [InsertionDeltaRuleGen].

use crate::{
    error::Error,
    rule_model::{
        atom::Atom,
        atom_type::AtomType,
        program::DatalogSequence,
        relation::RelationKind,
        rule::{Rule, RuleMode},
    },
    system::{catalog::Catalog, translation::TranslationRules},
};

use super::{
    base_relations, clear_rules, copy_rule, copy_to_new, head_transfer_rules,
    is_pivot_candidate, reads_provenance, reject_relations, rejection_rules, stored_relations,
    unfolding::unfold_prov_defs,
};

/// Compiles [TranslationRules] into the programs propagating insertions
#[derive(Debug, Clone, Copy)]
pub struct InsertionDeltaRuleGen<'a> {
    catalog: &'a Catalog,
    rules: &'a TranslationRules,
}

impl<'a> InsertionDeltaRuleGen<'a> {
    /// Create a new [InsertionDeltaRuleGen].
    pub fn new(catalog: &'a Catalog, rules: &'a TranslationRules) -> Self {
        Self { catalog, rules }
    }

    /// Return the delta rules of `rule`, one per body position that can supply the delta.
    ///
    /// In the rule for pivot `i` the head is tagged `INS`, body atoms before `i`
    /// are tagged `NEW`, the atom at `i` is tagged `INS` and atoms after `i` are
    /// tagged `NONE`. Skolem atoms and negated atoms are never pivots.
    /// With `all_strata` every body atom is marked to be evaluated across all strata.
    pub fn insertion_rules(rule: &Rule, all_strata: bool) -> Vec<Rule> {
        let head = rule.head().with_type(AtomType::Ins);
        let body = rule
            .body()
            .iter()
            .map(|atom| {
                if all_strata {
                    atom.with_all_strata(true)
                } else {
                    atom.clone()
                }
            })
            .collect::<Vec<_>>();

        body.iter()
            .enumerate()
            .filter(|(_, atom)| is_pivot_candidate(atom))
            .map(|(pivot, _)| {
                let delta_body = body
                    .iter()
                    .enumerate()
                    .map(|(index, atom)| pivot_tag(atom, index, pivot, AtomType::New, AtomType::Ins))
                    .collect();

                rule.with_atoms(head.clone(), delta_body)
                    .with_mode(RuleMode::Insert)
            })
            .collect()
    }

    /// Return the rules importing tuples whose rejection was withdrawn:
    /// `T_INS(t) :- P_m(v), T_R_DEL(t)` for `T(t) :- P_m(v), not T_R(t)`.
    ///
    /// Mapping relations are read in their state after the deletion phase;
    /// tuples whose derivation is new in this round are covered by the regular delta rules.
    pub fn withdrawn_rejection_rules(rule: &Rule) -> Vec<Rule> {
        rejection_rules(rule, AtomType::Ins, AtomType::Del)
    }

    /// Sequence copying the current state of every stored relation into its `NEW` version.
    pub fn pre_insertion(&self) -> Result<DatalogSequence, Error> {
        copy_to_new(self.catalog, "insertion prep")
    }

    /// Sequence computing the insertion deltas of all derived relations.
    pub fn create_insertion_program_sequence(&self) -> Result<DatalogSequence, Error> {
        let mut result = DatalogSequence::new("insertion", false);

        let base = base_relations(self.catalog)
            .map(|context| copy_rule(context, AtomType::Ins, AtomType::New, RuleMode::Insert))
            .collect::<Result<Vec<_>, _>>()?;
        result.add_rules("base insertions", base, false);

        let local = self
            .rules
            .local()
            .iter()
            .flat_map(|rule| Self::insertion_rules(rule, false))
            .collect::<Vec<_>>();
        result.add_rules("local insertions", local, false);

        let withdrawn = self
            .rules
            .all_rules()
            .flat_map(Self::withdrawn_rejection_rules)
            .collect::<Vec<_>>();
        result.add_rules("withdrawn rejections", withdrawn, false);

        let defs = self
            .rules
            .source_to_provenance()
            .iter()
            .flat_map(|rule| Self::insertion_rules(rule, false))
            .collect::<Vec<_>>();
        let combined = self
            .rules
            .views()
            .iter()
            .filter(|rule| !reads_provenance(rule))
            .flat_map(|rule| Self::insertion_rules(rule, true))
            .collect::<Vec<_>>();
        let idb_insertions = self
            .rules
            .provenance_to_target()
            .iter()
            .flat_map(|rule| Self::insertion_rules(rule, false))
            .collect::<Vec<_>>();

        let mut fixpoint = unfold_prov_defs(&defs, &defs)?;
        fixpoint.extend(combined.iter().cloned());
        fixpoint.extend(unfold_prov_defs(&defs, &idb_insertions)?);
        fixpoint.extend(head_transfer_rules(
            self.rules.local().iter().chain(self.rules.provenance_to_target()),
            AtomType::Ins,
            AtomType::New,
        )?);
        fixpoint.extend(head_transfer_rules(
            combined.iter(),
            AtomType::Ins,
            AtomType::New,
        )?);
        result.add_rules("mapping insertions", fixpoint, true);

        let provenance = self
            .catalog
            .relations_of_kind(RelationKind::Provenance)
            .map(|context| copy_rule(context, AtomType::Ins, AtomType::New, RuleMode::Insert))
            .collect::<Result<Vec<_>, _>>()?;
        result.add_rules("mapping relations", provenance, false);

        let combined_over_provenance = self
            .rules
            .views()
            .iter()
            .filter(|rule| reads_provenance(rule))
            .flat_map(|rule| Self::insertion_rules(rule, true))
            .collect::<Vec<_>>();
        let mut views = unfold_prov_defs(&defs, &combined_over_provenance)?;
        views.extend(head_transfer_rules(
            combined_over_provenance.iter(),
            AtomType::Ins,
            AtomType::New,
        )?);
        result.add_rules("combined insertions", views, false);

        Ok(result)
    }

    /// Sequence adding the insertion deltas to all relations and clearing the staging tables,
    /// including the withdrawn rejections.
    pub fn post_insertion(&self) -> Result<DatalogSequence, Error> {
        let mut result = DatalogSequence::new("insertion post", false);

        let apply = stored_relations(self.catalog)
            .map(|context| copy_rule(context, AtomType::Ins, AtomType::None, RuleMode::Insert))
            .collect::<Result<Vec<_>, _>>()?;
        result.add_rules("apply insertions", apply, false);

        let mut clear = clear_rules(
            stored_relations(self.catalog),
            &[AtomType::Ins, AtomType::New],
        )?;
        clear.extend(clear_rules(reject_relations(self.catalog), &[AtomType::Del])?);
        result.add_rules("clear staging", clear, false);

        Ok(result)
    }

    /// Return the preparation, main and post sequence.
    pub fn generate(&self) -> Result<Vec<DatalogSequence>, Error> {
        let result = vec![
            self.pre_insertion()?,
            self.create_insertion_program_sequence()?,
            self.post_insertion()?,
        ];

        log::debug!(
            "generated {} insertion rules",
            result.iter().map(DatalogSequence::num_rules).sum::<usize>()
        );

        Ok(result)
    }
}

/// Tag of the body atom at `index` in the delta rule for `pivot`
pub(super) fn pivot_tag(
    atom: &Atom,
    index: usize,
    pivot: usize,
    before: AtomType,
    at: AtomType,
) -> Atom {
    if atom.is_skolem() {
        atom.clone()
    } else if index < pivot {
        atom.with_type(before)
    } else if index == pivot {
        atom.with_type(at)
    } else {
        atom.with_type(AtomType::None)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use quickcheck_macros::quickcheck;
    use test_log::test;

    use crate::{
        rule_model::{
            atom::Atom,
            atom_type::AtomType,
            relation::{
                FieldType, Relation, RelationContext, RelationField, RelationId, RelationKind,
            },
            rule::{Rule, RuleMode},
            term::{AtomArgument, Variable},
        },
        system::{catalog::Catalog, mapping::Mapping, translation::ExchangeSystem},
    };

    use super::InsertionDeltaRuleGen;

    fn context(name: &str, kind: RelationKind) -> RelationContext {
        let relation = Relation::new(
            RelationId(0),
            name,
            vec![RelationField::new("a", FieldType::Integer)],
            kind,
        );
        RelationContext::new(Arc::new(relation), "P", "S", false)
    }

    /// Body atom `R<index>(X<index>)`, negated for shape 1 and a skolem atom for shape 2
    fn body_atom(index: usize, shape: u8) -> Atom {
        let name = format!("R{index}");
        match shape % 3 {
            2 => Atom::skolem(
                context(&name, RelationKind::Skolem),
                Variable::new(format!("X{index}")),
                vec![AtomArgument::variable("X0")],
            )
            .unwrap(),
            shape => Atom::builder(context(&name, RelationKind::Peer))
                .variables(&[format!("X{index}").as_str()])
                .negated(shape == 1)
                .build()
                .unwrap(),
        }
    }

    #[quickcheck]
    fn one_delta_rule_per_pivot(shapes: Vec<u8>) -> bool {
        let shapes = &shapes[..shapes.len().min(8)];
        let body = shapes
            .iter()
            .enumerate()
            .map(|(index, &shape)| body_atom(index, shape))
            .collect::<Vec<_>>();
        let head = Atom::builder(context("H", RelationKind::Peer))
            .variables(&["X0"])
            .build()
            .unwrap();
        let rule = Rule::new(head, body);

        let pivots = shapes
            .iter()
            .enumerate()
            .filter(|(_, &shape)| shape % 3 == 0)
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        let delta_rules = InsertionDeltaRuleGen::insertion_rules(&rule, false);

        if delta_rules.len() != pivots.len() {
            return false;
        }

        delta_rules.iter().zip(pivots).all(|(delta, pivot)| {
            delta.head().atom_type() == AtomType::Ins
                && delta.mode() == RuleMode::Insert
                && delta.body().len() == rule.body().len()
                && delta
                    .body()
                    .iter()
                    .zip(rule.body())
                    .enumerate()
                    .all(|(index, (atom, original))| {
                        let expected = if original.is_skolem() || index > pivot {
                            AtomType::None
                        } else if index < pivot {
                            AtomType::New
                        } else {
                            AtomType::Ins
                        };

                        atom.atom_type() == expected
                            && atom.is_negated() == original.is_negated()
                            && atom.relation().name() == original.relation().name()
                    })
        })
    }

    #[test]
    fn all_strata_marks_body() {
        let rule = Rule::new(
            Atom::builder(context("J", RelationKind::Join))
                .variables(&["X"])
                .build()
                .unwrap(),
            vec![
                Atom::builder(context("A", RelationKind::Peer))
                    .variables(&["X"])
                    .build()
                    .unwrap(),
                Atom::builder(context("B", RelationKind::Peer))
                    .variables(&["X"])
                    .build()
                    .unwrap(),
            ],
        );

        let rules = InsertionDeltaRuleGen::insertion_rules(&rule, true);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].to_string(), "J_INS(X) :- A_INS[all](X), B[all](X) .");
        assert_eq!(rules[0].body()[1].table_name(), "B_NEW");
        assert_eq!(rules[1].to_string(), "J_INS(X) :- A_NEW[all](X), B_INS[all](X) .");
    }

    fn copy_system() -> ExchangeSystem {
        let mut catalog = Catalog::new();
        catalog.add_peer("P1", "S1");
        for name in ["Emp", "EmpCopy"] {
            catalog
                .add_relation(
                    "P1",
                    name,
                    vec![
                        RelationField::new("id", FieldType::Integer),
                        RelationField::new("name", FieldType::String),
                    ],
                    RelationKind::Peer,
                )
                .unwrap();
        }

        let mut system = ExchangeSystem::new(catalog);
        let atom = |name: &str| {
            Atom::builder(system.catalog().relation(name).unwrap().clone())
                .variables(&["X", "Y"])
                .build()
                .unwrap()
        };
        let mapping = Mapping::new("m1", vec![atom("EmpCopy")], vec![atom("Emp")], false).unwrap();
        system.add_mapping(mapping).unwrap();

        system
    }

    #[test]
    fn copy_mapping_program() {
        let system = copy_system();
        let rules = system.translate().unwrap();
        let generator = InsertionDeltaRuleGen::new(system.catalog(), &rules);

        let prep = generator.pre_insertion().unwrap();
        // Emp, Emp_L, Emp_R, EmpCopy, EmpCopy_L, EmpCopy_R, P_m1
        assert_eq!(prep.num_rules(), 7);
        assert!(prep.rules().all(|rule| rule.mode() == RuleMode::ClearAndCopy));

        let main = generator.create_insertion_program_sequence().unwrap();
        let printed = main.rules().map(ToString::to_string).collect::<Vec<_>>();

        assert!(printed.contains(&"Emp_L_NEW(X0, X1) :- Emp_L_INS(X0, X1) .".to_string()));
        assert!(printed.contains(&"Emp_INS(X0, X1) :- Emp_L_INS(X0, X1) .".to_string()));
        assert!(printed.contains(&"P_m1_INS(X, Y) :- Emp_INS(X, Y) .".to_string()));
        assert!(printed.contains(
            &"EmpCopy_INS(X, Y) :- Emp_INS(X, Y), not EmpCopy_R(X, Y) .".to_string()
        ));
        assert!(printed.contains(&"P_m1_NEW(X0, X1) :- P_m1_INS(X0, X1) .".to_string()));
        assert!(!printed
            .iter()
            .any(|rule| rule.starts_with("EmpCopy_INS") && rule.contains("P_m1_INS")));
        assert!(printed.contains(
            &"EmpCopy_INS(X, Y) :- P_m1(X, Y), EmpCopy_R_DEL(X, Y) .".to_string()
        ));

        let post = generator.post_insertion().unwrap();
        // apply and clear both staging tables of every relation, clear withdrawn rejections
        assert_eq!(post.num_rules(), 7 * 3 + 2);
        assert_eq!(generator.generate().unwrap().len(), 3);
    }
}
