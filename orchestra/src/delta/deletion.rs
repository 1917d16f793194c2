//! This module defines [DeletionDeltaRuleGen].
//!
//! Deletions are propagated by delete and rederive: first every tuple with a
//! deleted derivation is over-deleted, then tuples that still have a derivation
//! in the new state are rederived and removed from the deletion delta again.
//!
//! If some mapping is bidirectional, deletions requested at the target of such
//! a mapping are first translated into deletions of its source tuples
//! according to the update policy. When side effects are not allowed, source
//! deletions that would delete further, unrequested tuples are dropped.

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
    base_relations, clear_rules, copy_rule, copy_to_new, derived_relations,
    head_transfer_rules, insertion::pivot_tag, is_pivot_candidate, peer_relations,
    reject_relations, rejection_rules, stored_relations, transfer_rule,
    unfolding::unfold_prov_defs,
};

/// Compiles [TranslationRules] into the programs propagating deletions
#[derive(Debug, Clone, Copy)]
pub struct DeletionDeltaRuleGen<'a> {
    catalog: &'a Catalog,
    rules: &'a TranslationRules,
}

impl<'a> DeletionDeltaRuleGen<'a> {
    /// Create a new [DeletionDeltaRuleGen].
    pub fn new(catalog: &'a Catalog, rules: &'a TranslationRules) -> Self {
        Self { catalog, rules }
    }

    /// Return the over-deletion rules of `rule`, one per body position that can supply the delta.
    ///
    /// The head and the pivot are tagged `DEL`; all other atoms read the current state.
    pub fn deletion_rules(rule: &Rule) -> Vec<Rule> {
        let head = rule.head().with_type(AtomType::Del);

        rule.body()
            .iter()
            .enumerate()
            .filter(|(_, atom)| is_pivot_candidate(atom))
            .map(|(pivot, _)| {
                let body = rule
                    .body()
                    .iter()
                    .enumerate()
                    .map(|(index, atom)| {
                        pivot_tag(atom, index, pivot, AtomType::None, AtomType::Del)
                    })
                    .collect();

                rule.with_atoms(head.clone(), body).with_mode(RuleMode::Insert)
            })
            .collect()
    }

    /// Return the rederivation rule of `rule`:
    /// `H_RCH :- H_DEL, body_NEW`.
    pub fn rederivation_rule(rule: &Rule) -> Rule {
        let mut body = vec![rule.head().with_type(AtomType::Del)];
        body.extend(rule.body().iter().map(|atom| {
            if atom.is_skolem() {
                atom.clone()
            } else {
                atom.with_type(AtomType::New)
            }
        }));

        rule.with_atoms(rule.head().with_type(AtomType::Rch), body)
            .with_mode(RuleMode::Insert)
    }

    /// Return the rules deleting tuples that became rejected:
    /// `T_DEL(t) :- P_m(v), T_R_INS(t)` for `T(t) :- P_m(v), not T_R(t)`.
    pub fn rejected_deletion_rules(rule: &Rule) -> Vec<Rule> {
        rejection_rules(rule, AtomType::Del, AtomType::Ins)
    }

    /// Sequence copying the current state of every stored relation into its `NEW` version.
    pub fn pre_deletion(&self) -> Result<DatalogSequence, Error> {
        copy_to_new(self.catalog, "deletion prep")
    }

    /// Sequence computing the net deletion deltas of all derived relations.
    ///
    /// Tuples rejected in this round are over-deleted together with the
    /// consequences of the local deletions.
    pub fn create_deletion_program_sequence(&self) -> Result<DatalogSequence, Error> {
        self.deletion_sequence(true)
    }

    fn deletion_sequence(&self, rejections: bool) -> Result<DatalogSequence, Error> {
        let mut result = DatalogSequence::new("deletion", false);

        let mut base = base_relations(self.catalog)
            .map(|context| {
                copy_rule(context, AtomType::Del, AtomType::New, RuleMode::DeleteFromHead)
            })
            .collect::<Result<Vec<_>, _>>()?;
        if rejections {
            for context in reject_relations(self.catalog) {
                base.push(copy_rule(
                    context,
                    AtomType::Ins,
                    AtomType::New,
                    RuleMode::Insert,
                )?);
            }
        }
        result.add_rules("base deletions", base, false);

        let local = self
            .rules
            .local()
            .iter()
            .flat_map(Self::deletion_rules)
            .collect::<Vec<_>>();
        result.add_rules("local over-deletion", local, false);

        if rejections {
            let rejected = self
                .rules
                .all_rules()
                .flat_map(Self::rejected_deletion_rules)
                .collect::<Vec<_>>();
            result.add_rules("rejections", rejected, false);
        }

        let defs = self
            .rules
            .source_to_provenance()
            .iter()
            .flat_map(Self::deletion_rules)
            .collect::<Vec<_>>();
        let idb_deletions = self
            .rules
            .provenance_to_target()
            .iter()
            .chain(self.rules.views())
            .flat_map(Self::deletion_rules)
            .collect::<Vec<_>>();

        let mut over_deletion = defs.clone();
        over_deletion.extend(unfold_prov_defs(&defs, &idb_deletions)?);
        result.add_rules("over-deletion", over_deletion, true);

        let new_state = derived_relations(self.catalog)
            .map(|context| {
                copy_rule(context, AtomType::Del, AtomType::New, RuleMode::DeleteFromHead)
            })
            .collect::<Result<Vec<_>, _>>()?;
        result.add_rules("new state", new_state, false);

        let mut rederivation = self
            .rules
            .all_rules()
            .map(Self::rederivation_rule)
            .collect::<Vec<_>>();
        rederivation.extend(head_transfer_rules(
            self.rules.all_rules(),
            AtomType::Rch,
            AtomType::New,
        )?);
        result.add_rules("rederivation", rederivation, true);

        let net = derived_relations(self.catalog)
            .map(|context| {
                copy_rule(context, AtomType::Rch, AtomType::Del, RuleMode::DeleteFromHead)
            })
            .collect::<Result<Vec<_>, _>>()?;
        result.add_rules("net deletions", net, false);

        Ok(result)
    }

    /// Sequence removing the deletion deltas from all relations, recording the
    /// new rejections and clearing the staging tables.
    ///
    /// Withdrawn rejections stay staged in `R_R_DEL` for the insertion phase.
    pub fn post_deletion(&self) -> Result<DatalogSequence, Error> {
        let mut result = DatalogSequence::new("deletion post", false);

        let apply = stored_relations(self.catalog)
            .map(|context| {
                copy_rule(context, AtomType::Del, AtomType::None, RuleMode::DeleteFromHead)
            })
            .collect::<Result<Vec<_>, _>>()?;
        result.add_rules("apply deletions", apply, false);

        let rejections = reject_relations(self.catalog)
            .map(|context| copy_rule(context, AtomType::Ins, AtomType::None, RuleMode::Insert))
            .collect::<Result<Vec<_>, _>>()?;
        result.add_rules("apply rejections", rejections, false);
        result.add_rules("clear staging", self.clear_staging()?, false);

        Ok(result)
    }

    fn clear_staging(&self) -> Result<Vec<Rule>, Error> {
        let mut result = clear_rules(
            stored_relations(self.catalog),
            &[AtomType::New, AtomType::Rch],
        )?;
        result.extend(clear_rules(
            stored_relations(self.catalog)
                .filter(|context| context.relation().kind() != RelationKind::Reject),
            &[AtomType::Del],
        )?);
        result.extend(clear_rules(reject_relations(self.catalog), &[AtomType::Ins])?);

        Ok(result)
    }

    /// Return whether some mapping propagates deletions backwards.
    pub fn has_bidirectional(&self) -> bool {
        self.rules
            .source_to_provenance()
            .iter()
            .any(|rule| rule.body().iter().any(Atom::is_del))
    }

    /// Rules `S_<source>(s) :- T_<target>(t), P_m(v), skolems` tracing target tuples
    /// back to the source atoms of their mapping that satisfy `select`.
    fn backward_rules<Select>(
        &self,
        target: AtomType,
        source: AtomType,
        select: Select,
    ) -> Vec<Rule>
    where
        Select: Fn(&Atom) -> bool,
    {
        let mut result = Vec::new();

        for forward in self.rules.provenance_to_target() {
            let Some(definition) = self
                .rules
                .source_to_provenance()
                .iter()
                .find(|rule| rule.mapping().is_some() && rule.mapping() == forward.mapping())
            else {
                continue;
            };

            let mut body = vec![forward.head().with_type(target)];
            body.extend(
                forward
                    .body()
                    .iter()
                    .filter(|atom| !atom.is_negated())
                    .cloned(),
            );

            for atom in definition
                .body()
                .iter()
                .filter(|atom| is_pivot_candidate(atom) && select(atom))
            {
                result.push(
                    Rule::new(atom.with_type(source), body.clone())
                        .with_mapping(forward.mapping().map(str::to_string)),
                );
            }
        }

        result
    }

    /// Clear the policy results and seed them with the requested local deletions:
    /// `R_D :- R_L_DEL`.
    pub fn update_policy_prep(&self) -> Result<DatalogSequence, Error> {
        let mut result = DatalogSequence::new("policy prep", false);
        result.add_rules(
            "clear policy",
            clear_rules(peer_relations(self.catalog), &[AtomType::D])?,
            false,
        );

        let seed = peer_relations(self.catalog)
            .map(|context| {
                let local = self.catalog.local(context.relation().name())?;
                transfer_rule(context, AtomType::D, local, AtomType::Del, RuleMode::Insert)
            })
            .collect::<Result<Vec<_>, _>>()?;
        result.add_rules("requested deletions", seed, false);

        Ok(result)
    }

    /// Propagate requested deletions backwards through bidirectional mappings:
    /// `S_D(s) :- T_D(t), P_m(v)` for every source atom marked for deletion.
    pub fn update_policy_apply(&self) -> Result<DatalogSequence, Error> {
        let mut result = DatalogSequence::new("policy", false);
        result.add_rules(
            "backward deletion",
            self.backward_rules(AtomType::D, AtomType::D, Atom::is_del),
            true,
        );

        Ok(result)
    }

    /// Turn policy results into local deletions: `S_L_DEL :- S_D, S_L`.
    pub fn update_policy_post(&self) -> Result<DatalogSequence, Error> {
        let rules = peer_relations(self.catalog)
            .map(|context| {
                let local = self.catalog.local(context.relation().name())?;
                let head = Atom::generic(local.clone())?.with_type(AtomType::Del);
                let policy = Atom::generic(context.clone())?.with_type(AtomType::D);
                let present = Atom::generic(local.clone())?;

                Ok(Rule::new(head, vec![policy, present]))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let mut result = DatalogSequence::new("policy post", false);
        result.add_rules("local deletions", rules, false);
        Ok(result)
    }

    /// Preparation of the side-effect detection; same as [DeletionDeltaRuleGen::pre_deletion].
    pub fn side_effect_prep(&self) -> Result<DatalogSequence, Error> {
        copy_to_new(self.catalog, "side-effect prep")
    }

    /// Compute the deletions the requested local deletions would cause.
    pub fn side_effect_maintain(&self) -> Result<DatalogSequence, Error> {
        let mut result = DatalogSequence::new("side-effect maintenance", false);
        result.add_sequence(self.deletion_sequence(false)?);
        Ok(result)
    }

    /// Record deletions not requested by the policy as side effects
    /// (`R_INV :- R_DEL, not R_D`) and clear the staging tables of derived relations.
    pub fn side_effect_post(&self) -> Result<DatalogSequence, Error> {
        let rules = peer_relations(self.catalog)
            .map(|context| {
                let atom = Atom::generic(context.clone())?;
                Ok(Rule::new(
                    atom.with_type(AtomType::Inv),
                    vec![
                        atom.with_type(AtomType::Del),
                        atom.with_type(AtomType::D).with_negation(true),
                    ],
                ))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        // requested local deletions stay staged for the deletion itself
        let mut clear = clear_rules(
            derived_relations(self.catalog),
            &[AtomType::Del, AtomType::New, AtomType::Rch],
        )?;
        clear.extend(clear_rules(base_relations(self.catalog), &[AtomType::New])?);

        let mut result = DatalogSequence::new("side-effect post", false);
        result.add_rules("side effects", rules, false);
        result.add_rules("clear staging", clear, false);
        Ok(result)
    }

    /// Remove locally requested deletions from the side effects: `R_INV -= R_L_DEL`.
    pub fn subtract_requested(&self) -> Result<DatalogSequence, Error> {
        let rules = peer_relations(self.catalog)
            .map(|context| {
                let local = self.catalog.local(context.relation().name())?;
                transfer_rule(
                    context,
                    AtomType::Inv,
                    local,
                    AtomType::Del,
                    RuleMode::DeleteFromHead,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut result = DatalogSequence::new("subtract requested", false);
        result.add_rules("requested deletions", rules, false);
        Ok(result)
    }

    /// Seed the lineage computation with the side effects: `R_RCH :- R_INV`.
    pub fn lineage_prep(&self) -> Result<DatalogSequence, Error> {
        let rules = peer_relations(self.catalog)
            .map(|context| copy_rule(context, AtomType::Inv, AtomType::Rch, RuleMode::Insert))
            .collect::<Result<Vec<_>, _>>()?;

        let mut result = DatalogSequence::new("lineage prep", false);
        result.add_rules(
            "clear lineage",
            clear_rules(peer_relations(self.catalog), &[AtomType::Rch])?,
            false,
        );
        result.add_rules("side effects", rules, false);
        Ok(result)
    }

    /// Trace side effects back to the source tuples they derive from.
    pub fn lineage(&self) -> Result<DatalogSequence, Error> {
        let mut result = DatalogSequence::new("lineage", false);
        result.add_rules(
            "backward lineage",
            self.backward_rules(AtomType::Rch, AtomType::Rch, |_| true),
            true,
        );
        Ok(result)
    }

    /// Keep only proper ancestors of side effects: `R_RCH -= R_INV`.
    pub fn lineage_post(&self) -> Result<DatalogSequence, Error> {
        let rules = peer_relations(self.catalog)
            .map(|context| {
                copy_rule(context, AtomType::Inv, AtomType::Rch, RuleMode::DeleteFromHead)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut result = DatalogSequence::new("lineage post", false);
        result.add_rules("remove side effects", rules, false);
        Ok(result)
    }

    /// Drop requested source deletions that cause side effects:
    /// `S_L_DEL -= S_RCH ∩ S_D`.
    pub fn subtract_side_effects(&self) -> Result<DatalogSequence, Error> {
        let rules = peer_relations(self.catalog)
            .map(|context| {
                let local = self.catalog.local(context.relation().name())?;
                let atom = Atom::generic(context.clone())?;

                Ok(Rule::new(
                    Atom::generic(local.clone())?.with_type(AtomType::Del),
                    vec![atom.with_type(AtomType::Rch), atom.with_type(AtomType::D)],
                )
                .with_mode(RuleMode::DeleteFromHead))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let mut result = DatalogSequence::new("subtract side effects", false);
        result.add_rules("causing deletions", rules, false);
        Ok(result)
    }

    /// Clear the policy, side-effect and lineage tables.
    pub fn update_policy_cleanup(&self) -> Result<DatalogSequence, Error> {
        let mut result = DatalogSequence::new("policy cleanup", false);
        result.add_rules(
            "clear policy",
            clear_rules(
                peer_relations(self.catalog),
                &[AtomType::D, AtomType::Inv, AtomType::Rch],
            )?,
            false,
        );
        Ok(result)
    }

    /// Return all sequences in execution order.
    ///
    /// Without bidirectional mappings these are the preparation, main and post
    /// sequence. Otherwise they are preceded by the three update-policy
    /// sequences and, unless side effects are allowed, by the nine
    /// side-effect and lineage sequences.
    pub fn generate(&self, allow_side_effects: bool) -> Result<Vec<DatalogSequence>, Error> {
        let mut result = Vec::new();

        if self.has_bidirectional() {
            result.push(self.update_policy_prep()?);
            result.push(self.update_policy_apply()?);
            result.push(self.update_policy_post()?);

            if !allow_side_effects {
                result.push(self.side_effect_prep()?);
                result.push(self.side_effect_maintain()?);
                result.push(self.side_effect_post()?);
                result.push(self.subtract_requested()?);
                result.push(self.lineage_prep()?);
                result.push(self.lineage()?);
                result.push(self.lineage_post()?);
                result.push(self.subtract_side_effects()?);
                result.push(self.update_policy_cleanup()?);
            }
        }

        result.push(self.pre_deletion()?);
        result.push(self.create_deletion_program_sequence()?);
        result.push(self.post_deletion()?);

        log::debug!(
            "generated {} deletion sequences with {} rules",
            result.len(),
            result.iter().map(DatalogSequence::num_rules).sum::<usize>()
        );

        Ok(result)
    }
}
