//! This module defines [UpdateExchange],
//! which propagates staged local updates to all peers.

use std::time::{Duration, Instant};

use crate::{
    config::ExchangeConfig,
    delta::{clear_rule, clear_rules, copy_rule, peer_relations, transfer_rule},
    error::Error,
    rule_model::{
        atom::Atom,
        atom_type::AtomType,
        program::DatalogSequence,
        relation::RelationKind,
        rule::{Rule, RuleMode},
        term::AtomArgument,
    },
    system::translation::{ExchangeSystem, TranslationRules},
};

use super::{
    applier::{Update, UpdateApplier},
    delta_rules::{DeletionDeltaRules, DeltaRules, InsertionDeltaRules},
    engine::DatalogEngine,
    memory_engine::MemoryEngine,
};

/// Times measured during reconciliation rounds
///
/// Each round appends to the list of the path it took.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExchangeStatistics {
    /// Net main-phase times of incremental insertion
    pub insertion_times: Vec<Duration>,
    /// Net main-phase times of incremental deletion
    pub deletion_times: Vec<Duration>,
    /// Times of full recomputations
    pub program_times: Vec<Duration>,
}

impl ExchangeStatistics {
    /// Return the number of completed rounds.
    pub fn rounds(&self) -> usize {
        self.deletion_times.len() + self.program_times.len()
    }

    /// Return the sum of all measured times.
    pub fn total(&self) -> Duration {
        self.insertion_times
            .iter()
            .chain(self.deletion_times.iter())
            .chain(self.program_times.iter())
            .sum()
    }
}

/// Compiled update exchange between the peers of an [ExchangeSystem]
#[derive(Debug)]
pub struct UpdateExchange {
    system: ExchangeSystem,
    config: ExchangeConfig,
    rules: TranslationRules,
    insertion: InsertionDeltaRules,
    deletion: DeletionDeltaRules,
    full_program: DatalogSequence,
    statistics: ExchangeStatistics,
}

impl UpdateExchange {
    /// Translate the system and compile its delta rules.
    pub fn new(system: ExchangeSystem, config: ExchangeConfig) -> Result<Self, Error> {
        let rules = system.translate()?;
        let insertion = InsertionDeltaRules::new(system.catalog(), &rules, config)?;
        let deletion = DeletionDeltaRules::new(system.catalog(), &rules, config)?;
        let full_program = rules.full_program()?;

        if rules.is_recursive() {
            log::info!("mappings are recursive");
        }

        Ok(Self {
            system,
            config,
            rules,
            insertion,
            deletion,
            full_program,
            statistics: ExchangeStatistics::default(),
        })
    }

    /// Return the [ExchangeSystem].
    pub fn system(&self) -> &ExchangeSystem {
        &self.system
    }

    /// Return the [ExchangeConfig].
    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Return the translated rules.
    pub fn rules(&self) -> &TranslationRules {
        &self.rules
    }

    /// Return the insertion delta rules.
    pub fn insertion(&self) -> &InsertionDeltaRules {
        &self.insertion
    }

    /// Return the deletion delta rules.
    pub fn deletion(&self) -> &DeletionDeltaRules {
        &self.deletion
    }

    /// Return the program recomputing all derived relations.
    pub fn full_program(&self) -> &DatalogSequence {
        &self.full_program
    }

    /// Return the times measured so far.
    pub fn statistics(&self) -> &ExchangeStatistics {
        &self.statistics
    }

    /// Create a connected [MemoryEngine] with a table for every relation version.
    pub fn create_engine(&self) -> Result<MemoryEngine, Error> {
        let mut engine = MemoryEngine::new(self.config);
        engine.connect()?;
        engine.create_tables(self.system.catalog())?;
        engine.commit()?;

        Ok(engine)
    }

    /// Stage local updates of peer relations.
    ///
    /// Returns the number of updates that changed a staging table.
    pub fn stage_updates<'a, Applier, Updates>(
        &self,
        applier: &mut Applier,
        updates: Updates,
    ) -> Result<usize, Error>
    where
        Applier: UpdateApplier,
        Updates: IntoIterator<Item = &'a Update>,
    {
        let updates = updates.into_iter().collect::<Vec<_>>();
        for update in &updates {
            let context = self.system.catalog().relation(update.relation())?;
            let relation = context.relation();
            if relation.kind() != RelationKind::Peer {
                return Err(Error::UnknownRelation(update.relation().to_string()));
            }

            // constants are checked against the field types
            Atom::builder(context.clone())
                .values(
                    update
                        .tuple()
                        .iter()
                        .cloned()
                        .map(AtomArgument::Constant),
                )
                .build()?;
        }

        applier.apply_all(updates)
    }

    /// Propagate all staged updates.
    ///
    /// Incrementally, deletions are propagated before insertions.
    /// If the round fails, the engine is rolled back to the state before the round,
    /// otherwise the remembered state is released.
    /// Returns the measured time of the round.
    pub fn map_updates(&mut self, engine: &mut dyn DatalogEngine) -> Result<Duration, Error> {
        engine.checkpoint()?;

        let result = if self.config.incremental {
            self.map_incrementally(engine)
        } else {
            self.recompute(engine)
        };

        match &result {
            Ok(_) => engine.release_checkpoint(),
            Err(error) => {
                log::warn!("reconciliation failed, rolling back: {error}");
                if let Err(rollback_error) = engine.rollback() {
                    log::error!("rollback failed: {rollback_error}");
                }
            }
        }

        result
    }

    fn map_incrementally(&mut self, engine: &mut dyn DatalogEngine) -> Result<Duration, Error> {
        let deletion = self.deletion.execute(engine)?;
        let insertion = self.insertion.execute(engine)?;

        log::info!(
            "propagated deletions in {}ms and insertions in {}ms",
            deletion.as_millis(),
            insertion.as_millis()
        );

        self.statistics.deletion_times.push(deletion);
        self.statistics.insertion_times.push(insertion);

        Ok(deletion + insertion)
    }

    fn recompute(&mut self, engine: &mut dyn DatalogEngine) -> Result<Duration, Error> {
        engine.commit_and_reset()?;
        engine.evaluate(&self.prepare_non_incremental()?)?;
        engine.commit_and_reset()?;

        let start = Instant::now();
        let changed = engine.evaluate(&self.full_program)?;
        let time = start.elapsed().saturating_sub(engine.log_time());
        engine.commit_and_reset()?;

        log::info!(
            "recomputed all derived relations in {}ms ({changed} changes)",
            time.as_millis()
        );

        self.statistics.program_times.push(time);
        Ok(time)
    }

    /// Sequence moving the local insertions that are not also deleted into the
    /// insertion table of the peer relation and back.
    ///
    /// Afterwards `R_L_DEL` and `R_INS` are empty and `R_L_INS` holds the
    /// difference of the previous `R_L_INS` and `R_L_DEL`.
    pub fn subtract_local_ins_del(&self) -> Result<DatalogSequence, Error> {
        let catalog = self.system.catalog();
        let mut subtract = Vec::new();
        let mut clear_insertions = Vec::new();
        let mut clear_deletions = Vec::new();
        let mut reseed = Vec::new();
        let mut clear_peer = Vec::new();

        for context in peer_relations(catalog) {
            let local = catalog.local(context.relation().name())?;
            let local_atom = Atom::generic(local.clone())?;

            subtract.push(Rule::new(
                Atom::generic(context.clone())?.with_type(AtomType::Ins),
                vec![
                    local_atom.with_type(AtomType::Ins),
                    local_atom.with_type(AtomType::Del).with_negation(true),
                ],
            ));
            clear_insertions.push(clear_rule(local, AtomType::Ins)?);
            clear_deletions.push(clear_rule(local, AtomType::Del)?);
            reseed.push(transfer_rule(
                local,
                AtomType::Ins,
                context,
                AtomType::Ins,
                RuleMode::Insert,
            )?);
            clear_peer.push(clear_rule(context, AtomType::Ins)?);
        }

        let mut result = DatalogSequence::new("subtract local deletions", false);
        result.add_rules("subtract", subtract, false);
        result.add_rules("clear local insertions", clear_insertions, false);
        result.add_rules("clear local deletions", clear_deletions, false);
        result.add_rules("reseed local insertions", reseed, false);
        result.add_rules("clear insertions", clear_peer, false);

        Ok(result)
    }

    /// Sequence applying all staged local updates and rejections
    /// to the local and reject relations.
    pub fn prepare_non_incremental(&self) -> Result<DatalogSequence, Error> {
        let catalog = self.system.catalog();
        let mut result = DatalogSequence::new("non-incremental prep", false);

        let mut deletions = Vec::new();
        for context in peer_relations(catalog) {
            deletions.push(copy_rule(
                catalog.local(context.relation().name())?,
                AtomType::Del,
                AtomType::None,
                RuleMode::DeleteFromHead,
            )?);
        }
        result.add_rules("apply local deletions", deletions, false);
        result.add_sequence(self.subtract_local_ins_del()?);

        let mut insertions = Vec::new();
        let mut staged = Vec::new();
        for kind in [RelationKind::Local, RelationKind::Reject] {
            for context in catalog.relations_of_kind(kind) {
                insertions.push(copy_rule(
                    context,
                    AtomType::Ins,
                    AtomType::None,
                    RuleMode::Insert,
                )?);
                staged.push(context);
            }
        }
        for context in catalog.relations_of_kind(RelationKind::Reject) {
            insertions.push(copy_rule(
                context,
                AtomType::Del,
                AtomType::None,
                RuleMode::DeleteFromHead,
            )?);
        }
        result.add_rules("apply local insertions", insertions, false);
        result.add_rules(
            "clear staged updates",
            clear_rules(staged.into_iter(), &[AtomType::Ins, AtomType::Del])?,
            false,
        );

        Ok(result)
    }
}

#[cfg(test)]
mod test {
    use orchestra_physical::datavalues::DataValue;
    use test_log::test;

    use crate::{
        config::ExchangeConfig,
        execution::{
            applier::{Update, UpdateApplier, UpdateKind},
            delta_rules::test::{system, RecordingEngine, EMPLOYEES},
            engine::DatalogEngine,
        },
    };

    use super::UpdateExchange;

    fn employee(id: i64, name: &str) -> Vec<DataValue> {
        vec![DataValue::from(id), DataValue::from(name)]
    }

    fn exchange(incremental: bool) -> UpdateExchange {
        let config = ExchangeConfig {
            incremental,
            ..Default::default()
        };
        UpdateExchange::new(system(EMPLOYEES), config).unwrap()
    }

    #[test]
    fn incremental_round_runs_deletion_first() {
        let mut exchange = exchange(true);
        let mut engine = RecordingEngine::default();
        exchange.map_updates(&mut engine).unwrap();

        assert_eq!(
            engine.evaluated(),
            [
                "deletion prep",
                "deletion",
                "deletion post",
                "insertion prep",
                "insertion",
                "insertion post"
            ]
        );
        assert_eq!(exchange.statistics().insertion_times.len(), 1);
        assert_eq!(exchange.statistics().rounds(), 1);
    }

    #[test]
    fn failed_round_is_not_recorded() {
        let mut exchange = exchange(true);
        let mut engine = RecordingEngine {
            fail_on: Some("insertion".to_string()),
            ..Default::default()
        };

        assert!(exchange.map_updates(&mut engine).is_err());
        assert_eq!(exchange.statistics().rounds(), 0);
    }

    #[test]
    fn subtraction_is_idempotent() {
        let exchange = exchange(false);
        let mut engine = exchange.create_engine().unwrap();

        engine.apply_insert("Emp", employee(1, "Alice")).unwrap();
        engine.apply_insert("Emp", employee(2, "Bob")).unwrap();
        engine
            .database_mut()
            .insert_rows("Emp_L_DEL", vec![employee(2, "Bob")])
            .unwrap();

        let subtract = exchange.subtract_local_ins_del().unwrap();
        engine.evaluate(&subtract).unwrap();
        let once = engine.rows("Emp_L_INS").unwrap();
        assert_eq!(once, vec![employee(1, "Alice")]);
        assert_eq!(engine.count("Emp_L_DEL").unwrap(), 0);
        assert_eq!(engine.count("Emp_INS").unwrap(), 0);

        engine.evaluate(&subtract).unwrap();
        assert_eq!(engine.rows("Emp_L_INS").unwrap(), once);
    }

    #[test]
    fn recomputation_applies_staged_updates() {
        let mut exchange = exchange(false);
        let mut engine = exchange.create_engine().unwrap();

        let updates = vec![
            Update::new(UpdateKind::Insert, "Emp", employee(1, "Alice")),
            Update::new(UpdateKind::Insert, "Emp", employee(2, "Bob")),
            Update::new(UpdateKind::Reject, "EmpCopy", employee(2, "Bob")),
        ];
        assert_eq!(exchange.stage_updates(&mut engine, &updates).unwrap(), 3);

        exchange.map_updates(&mut engine).unwrap();

        assert_eq!(engine.rows("Emp_L").unwrap().len(), 2);
        assert_eq!(engine.rows("EmpCopy").unwrap(), vec![employee(1, "Alice")]);
        assert_eq!(engine.count("Emp_L_INS").unwrap(), 0);
        assert_eq!(exchange.statistics().program_times.len(), 1);
        assert!(!engine.has_checkpoint());
    }

    #[test]
    fn staged_updates_are_checked() {
        let exchange = exchange(true);
        let mut engine = exchange.create_engine().unwrap();

        let unknown = [Update::new(UpdateKind::Insert, "Dept", employee(1, "A"))];
        assert!(exchange.stage_updates(&mut engine, &unknown).is_err());

        let mistyped = [Update::new(
            UpdateKind::Insert,
            "Emp",
            vec![DataValue::from("one"), DataValue::from("A")],
        )];
        assert!(exchange.stage_updates(&mut engine, &mistyped).is_err());

        let local = [Update::new(UpdateKind::Insert, "Emp_L", employee(1, "A"))];
        assert!(exchange.stage_updates(&mut engine, &local).is_err());
    }
}
