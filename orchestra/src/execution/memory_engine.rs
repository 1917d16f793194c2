//! This module defines [MemoryEngine],
//! a [DatalogEngine] evaluating programs on a [DatabaseInstance].

use std::{
    collections::{hash_map::Entry, HashMap},
    time::{Duration, Instant},
};

use orchestra_physical::{
    datavalues::DataValue,
    management::{
        database::DatabaseInstance,
        execution_plan::{
            ColumnBinding, ExecutionPlan, HeadColumn, ScanNode, SkolemNode, VariableMarker,
            WriteMode,
        },
    },
    meta::timing::TimedCode,
    tabular::table::Row,
};
use strum::IntoEnumIterator;

use crate::{
    config::ExchangeConfig,
    delta::stored_relations,
    error::Error,
    rule_model::{
        atom::Atom,
        atom_type::AtomType,
        program::{DatalogProgram, DatalogSequence, DatalogStep},
        rule::{Rule, RuleMode},
        term::{AtomArgument, Variable},
    },
    system::catalog::Catalog,
};

use super::engine::DatalogEngine;

/// In-memory [DatalogEngine]
///
/// Every rule is compiled into an [ExecutionPlan] once and cached,
/// unless the caller asks for recompilation.
#[derive(Debug)]
pub struct MemoryEngine {
    database: DatabaseInstance,
    connected: bool,
    config: ExchangeConfig,
    plans: HashMap<Rule, ExecutionPlan>,
    journal: Vec<String>,
    log_time: Duration,
    empty_time: Duration,
    /// State restored by [DatalogEngine::rollback]
    checkpoint: Option<DatabaseInstance>,
    timing: TimedCode,
}

impl MemoryEngine {
    /// Create a new, unconnected [MemoryEngine] without tables.
    pub fn new(config: ExchangeConfig) -> Self {
        Self {
            database: DatabaseInstance::new(),
            connected: false,
            config,
            plans: HashMap::new(),
            journal: Vec::new(),
            log_time: Duration::ZERO,
            empty_time: Duration::ZERO,
            checkpoint: None,
            timing: TimedCode::new(),
        }
    }

    /// Create every version of every stored relation of the catalog.
    ///
    /// Tables that already exist are kept.
    pub fn create_tables(&mut self, catalog: &Catalog) -> Result<usize, Error> {
        let mut created = 0;

        for context in stored_relations(catalog) {
            let relation = context.relation();
            for atom_type in AtomType::iter() {
                let name = atom_type.staging_name(relation.name());
                if !self.database.has_table(&name) {
                    self.database.create_table(&name, relation.arity())?;
                    created += 1;
                }
            }
        }

        log::debug!("created {created} tables");
        Ok(created)
    }

    /// Return the underlying [DatabaseInstance].
    pub fn database(&self) -> &DatabaseInstance {
        &self.database
    }

    pub(crate) fn database_mut(&mut self) -> &mut DatabaseInstance {
        &mut self.database
    }

    /// Return the rows of a table in sorted order.
    pub fn rows(&self, table: &str) -> Result<Vec<Row>, Error> {
        Ok(self.database.table(table)?.rows().cloned().collect())
    }

    /// Return the number of rows of a table.
    pub fn count(&self, table: &str) -> Result<usize, Error> {
        Ok(self.database.count_rows(table)?)
    }

    /// Return the phase-completion markers recorded so far.
    pub fn journal(&self) -> &[String] {
        &self.journal
    }

    /// Return the time measurements of all evaluated programs.
    pub fn timing(&self) -> &TimedCode {
        &self.timing
    }

    /// Return whether a state is kept for [DatalogEngine::rollback].
    pub fn has_checkpoint(&self) -> bool {
        self.checkpoint.is_some()
    }

    fn ensure_connected(&self) -> Result<(), Error> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn evaluate_sequence(
        &mut self,
        sequence: &DatalogSequence,
        recompute: bool,
    ) -> Result<usize, Error> {
        let mut total = 0;

        loop {
            let mut changed = 0;
            for step in sequence.steps() {
                changed += match step {
                    DatalogStep::Program(program) => self.evaluate_program(program, recompute)?,
                    DatalogStep::Sequence(nested) => self.evaluate_sequence(nested, recompute)?,
                };
            }

            total += changed;
            if !sequence.is_recursive() || changed == 0 {
                break;
            }
        }

        Ok(total)
    }

    fn evaluate_program(
        &mut self,
        program: &DatalogProgram,
        recompute: bool,
    ) -> Result<usize, Error> {
        let timing_key = format!("programs/{}", program.name());
        self.timing.sub(&timing_key).start();

        let mut total = 0;
        let mut iterations = 0;
        let outcome = 'program: loop {
            iterations += 1;
            let mut changed = 0;
            for rule in program.rules() {
                match self.evaluate_rule(rule, recompute) {
                    Ok(count) => changed += count,
                    Err(error) => break 'program Err(error),
                }
            }

            total += changed;
            if !program.is_recursive() || changed == 0 {
                break Ok(total);
            }
        };

        self.timing.sub(&timing_key).stop();
        let total = outcome?;

        log::debug!(
            "program {} changed {total} tuples in {iterations} iterations",
            program.name()
        );

        if self.config.journal {
            let start = Instant::now();
            self.journal
                .push(format!("{} completed ({total} changes)", program.name()));
            self.log_time += start.elapsed();
        }

        Ok(total)
    }

    fn evaluate_rule(&mut self, rule: &Rule, recompute: bool) -> Result<usize, Error> {
        let compiled;
        let plan: &ExecutionPlan = if recompute {
            compiled = compile_rule(rule)?;
            &compiled
        } else {
            match self.plans.entry(rule.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(compile_rule(rule)?),
            }
        };

        if self.config.skip_empty_rules
            && matches!(plan.mode(), WriteMode::Insert | WriteMode::Delete)
        {
            let start = Instant::now();
            let empty = plan
                .positive()
                .iter()
                .any(|scan| matches!(self.database.count_rows(scan.table()), Ok(0)));
            self.empty_time += start.elapsed();

            if empty {
                log::trace!("skipping `{rule}`");
                return Ok(0);
            }
        }

        let result = self.database.execute_plan(plan)?;
        log::trace!("`{rule}` changed {} tuples", result.changed);

        Ok(result.changed)
    }
}

impl DatalogEngine for MemoryEngine {
    fn connect(&mut self) -> Result<(), Error> {
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn commit(&mut self) -> Result<(), Error> {
        self.ensure_connected()?;
        self.database.commit();
        Ok(())
    }

    fn evaluate_programs(
        &mut self,
        sequence: &DatalogSequence,
        recompute: bool,
    ) -> Result<usize, Error> {
        self.ensure_connected()?;

        if recompute {
            self.plans.clear();
        }

        self.evaluate_sequence(sequence, recompute)
    }

    fn reset_counters(&mut self) {
        self.log_time = Duration::ZERO;
        self.empty_time = Duration::ZERO;
    }

    fn log_time(&self) -> Duration {
        self.log_time
    }

    fn empty_time(&self) -> Duration {
        self.empty_time
    }

    fn checkpoint(&mut self) -> Result<(), Error> {
        self.ensure_connected()?;
        self.checkpoint = Some(self.database.clone());
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), Error> {
        self.ensure_connected()?;

        match self.checkpoint.take() {
            Some(state) => {
                self.database = state;
                Ok(())
            }
            None => Ok(self.database.rollback()?),
        }
    }

    fn release_checkpoint(&mut self) {
        self.checkpoint = None;
    }

    fn table_names(&self) -> Vec<String> {
        self.database
            .table_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn clear_table(&mut self, name: &str) -> Result<(), Error> {
        self.database.clear_table(name)?;
        Ok(())
    }

    fn drop_table(&mut self, name: &str) -> Result<(), Error> {
        self.database.drop_table(name)?;
        self.plans.clear();
        Ok(())
    }
}

/// Assigns a [VariableMarker] to each variable of a rule
#[derive(Debug, Default)]
struct MarkerTable {
    markers: HashMap<Variable, VariableMarker>,
}

impl MarkerTable {
    fn get_or_insert(&mut self, variable: &Variable) -> VariableMarker {
        let next = self.markers.len();
        *self.markers.entry(variable.clone()).or_insert(next)
    }

    fn get(&self, variable: &Variable) -> Option<VariableMarker> {
        self.markers.get(variable).copied()
    }
}

fn malformed(rule: &Rule, reason: impl Into<String>) -> Error {
    Error::MalformedRule {
        rule: rule.to_string(),
        reason: reason.into(),
    }
}

/// Binding of a constant or ground skolem term
fn ground_binding(rule: &Rule, argument: &AtomArgument) -> Result<ColumnBinding, Error> {
    argument
        .to_value()
        .map(ColumnBinding::Constant)
        .ok_or_else(|| malformed(rule, format!("skolem term {argument} in the body is not ground")))
}

/// Binding of a body argument, introducing markers for unseen variables
fn scan_binding(
    rule: &Rule,
    argument: &AtomArgument,
    markers: &mut MarkerTable,
) -> Result<ColumnBinding, Error> {
    match argument {
        AtomArgument::Variable(variable) => {
            Ok(ColumnBinding::Variable(markers.get_or_insert(variable)))
        }
        _ => ground_binding(rule, argument),
    }
}

/// Binding of an argument whose variables must already be bound
fn bound_binding(
    rule: &Rule,
    argument: &AtomArgument,
    markers: &MarkerTable,
) -> Result<ColumnBinding, Error> {
    match argument {
        AtomArgument::Variable(variable) => markers
            .get(variable)
            .map(ColumnBinding::Variable)
            .ok_or_else(|| malformed(rule, format!("variable {variable} is not bound"))),
        _ => ground_binding(rule, argument),
    }
}

fn scan(rule: &Rule, atom: &Atom, markers: &mut MarkerTable) -> Result<ScanNode, Error> {
    let columns = atom
        .values()
        .iter()
        .map(|argument| scan_binding(rule, argument, markers))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ScanNode::new(atom.table_name(), columns).with_nullable(atom.nullable().to_vec()))
}

/// Translate a rule into an [ExecutionPlan].
fn compile_rule(rule: &Rule) -> Result<ExecutionPlan, Error> {
    let head_table = rule.head().table_name();
    let mode = match rule.mode() {
        RuleMode::Clear => return Ok(ExecutionPlan::truncate(head_table)),
        RuleMode::Insert => WriteMode::Insert,
        RuleMode::DeleteFromHead => WriteMode::Delete,
        RuleMode::ClearAndCopy => WriteMode::Replace,
    };

    let mut markers = MarkerTable::default();
    let mut positive = Vec::new();
    for atom in rule
        .body()
        .iter()
        .filter(|atom| !atom.is_negated() && !atom.is_skolem())
    {
        positive.push(scan(rule, atom, &mut markers)?);
    }

    let mut skolems = Vec::new();
    for atom in rule.body().iter().filter(|atom| atom.is_skolem()) {
        let keys = atom
            .skolem_key_values()
            .unwrap_or_default()
            .iter()
            .map(|key| bound_binding(rule, key, &markers))
            .collect::<Result<Vec<_>, _>>()?;

        let output = match atom.values() {
            [AtomArgument::Variable(variable)] => markers.get_or_insert(variable),
            _ => return Err(malformed(rule, format!("skolem atom {atom} has no output variable"))),
        };

        skolems.push(SkolemNode::new(output, atom.relation().name(), keys));
    }

    let mut negative = Vec::new();
    for atom in rule
        .body()
        .iter()
        .filter(|atom| atom.is_negated() && !atom.is_skolem())
    {
        negative.push(scan(rule, atom, &mut markers)?);
    }

    let head = rule
        .head()
        .values()
        .iter()
        .map(|argument| match argument {
            AtomArgument::Skolem {
                function,
                arguments,
            } if !argument.is_ground() => Ok(HeadColumn::Skolem {
                function: function.clone(),
                arguments: arguments
                    .iter()
                    .map(|inner| bound_binding(rule, inner, &markers))
                    .collect::<Result<Vec<_>, _>>()?,
            }),
            _ => Ok(HeadColumn::Binding(bound_binding(rule, argument, &markers)?)),
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let mut plan = ExecutionPlan::new(head_table, head, mode);
    positive.into_iter().for_each(|scan| plan.add_positive(scan));
    skolems.into_iter().for_each(|skolem| plan.add_skolem(skolem));
    negative.into_iter().for_each(|scan| plan.add_negative(scan));

    Ok(plan)
}

/// Insert a single row into the table, returning whether it was new.
pub(crate) fn insert_row(
    database: &mut DatabaseInstance,
    table: &str,
    row: Vec<DataValue>,
) -> Result<bool, Error> {
    Ok(database.insert_rows(table, std::iter::once(row))? > 0)
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use orchestra_physical::datavalues::DataValue;
    use test_log::test;

    use crate::{
        config::ExchangeConfig,
        execution::engine::DatalogEngine,
        rule_model::{
            atom::Atom,
            atom_type::AtomType,
            program::DatalogSequence,
            relation::{FieldType, Relation, RelationContext, RelationField, RelationId, RelationKind},
            rule::{Rule, RuleMode},
            term::AtomArgument,
        },
    };

    use super::{insert_row, MemoryEngine};

    fn context(name: &str, arity: usize) -> RelationContext {
        let fields = (0..arity)
            .map(|index| RelationField::new(format!("f{index}"), FieldType::Integer))
            .collect();
        RelationContext::new(
            Arc::new(Relation::new(RelationId(0), name, fields, RelationKind::Peer)),
            "P",
            "S",
            false,
        )
    }

    fn engine(tables: &[(&str, usize)]) -> MemoryEngine {
        let mut engine = MemoryEngine::new(ExchangeConfig::default());
        engine.connect().unwrap();
        for (name, arity) in tables {
            engine.database_mut().create_table(name, *arity).unwrap();
        }
        engine
    }

    fn edge_rules() -> (Rule, Rule) {
        let edge = context("E", 2);
        let path = context("T", 2);

        let base = Rule::new(
            Atom::builder(path.clone()).variables(&["X", "Y"]).build().unwrap(),
            vec![Atom::builder(edge.clone()).variables(&["X", "Y"]).build().unwrap()],
        );
        let step = Rule::new(
            Atom::builder(path.clone()).variables(&["X", "Z"]).build().unwrap(),
            vec![
                Atom::builder(path).variables(&["X", "Y"]).build().unwrap(),
                Atom::builder(edge).variables(&["Y", "Z"]).build().unwrap(),
            ],
        );

        (base, step)
    }

    #[test]
    fn transitive_closure_reaches_fixpoint() {
        let mut engine = engine(&[("E", 2), ("T", 2)]);
        for (from, to) in [(1i64, 2i64), (2, 3), (3, 4)] {
            insert_row(
                engine.database_mut(),
                "E",
                vec![DataValue::from(from), DataValue::from(to)],
            )
            .unwrap();
        }

        let (base, step) = edge_rules();
        let mut sequence = DatalogSequence::new("closure", false);
        sequence.add_rules("closure", vec![base, step], true);

        let changed = engine.evaluate(&sequence).unwrap();
        assert_eq!(changed, 6);
        assert_eq!(engine.count("T").unwrap(), 6);
        assert_eq!(engine.journal(), ["closure completed (6 changes)"]);

        assert_eq!(engine.evaluate(&sequence).unwrap(), 0);
    }

    #[test]
    fn negation_and_modes() {
        let mut engine = engine(&[("A", 1), ("A_DEL", 1), ("A_NEW", 1)]);
        for value in 1i64..=3 {
            insert_row(engine.database_mut(), "A", vec![DataValue::from(value)]).unwrap();
        }
        insert_row(engine.database_mut(), "A_DEL", vec![DataValue::from(2i64)]).unwrap();

        let relation = context("A", 1);
        let atom = Atom::generic(relation).unwrap();
        let new_state = Rule::new(
            atom.with_type(AtomType::New),
            vec![atom.clone(), atom.with_type(AtomType::Del).with_negation(true)],
        )
        .with_mode(RuleMode::ClearAndCopy);

        let mut sequence = DatalogSequence::new("new state", false);
        sequence.add_rules("new state", vec![new_state], false);
        engine.evaluate(&sequence).unwrap();

        assert_eq!(
            engine.rows("A_NEW").unwrap(),
            vec![vec![DataValue::from(1i64)], vec![DataValue::from(3i64)]]
        );

        let mut sequence = DatalogSequence::new("cleanup", false);
        sequence.add_rules(
            "cleanup",
            vec![
                Rule::new(atom.clone(), vec![atom.with_type(AtomType::Del)])
                    .with_mode(RuleMode::DeleteFromHead),
                Rule::clear(atom.with_type(AtomType::Del)),
            ],
            false,
        );
        engine.evaluate(&sequence).unwrap();

        assert_eq!(engine.count("A").unwrap(), 2);
        assert_eq!(engine.count("A_DEL").unwrap(), 0);
    }

    #[test]
    fn skolem_atoms_bind_outputs() {
        let mut engine = engine(&[("A", 1), ("B", 2)]);
        insert_row(engine.database_mut(), "A", vec![DataValue::from(7i64)]).unwrap();

        let skolem = Atom::skolem(
            context("SK_m_Y", 1),
            crate::rule_model::term::Variable::new("Y"),
            vec![AtomArgument::variable("X")],
        )
        .unwrap();
        let rule = Rule::new(
            Atom::builder(context("B", 2)).variables(&["X", "Y"]).build().unwrap(),
            vec![
                Atom::builder(context("A", 1)).variables(&["X"]).build().unwrap(),
                skolem,
            ],
        );

        let mut sequence = DatalogSequence::new("skolem", false);
        sequence.add_rules("skolem", vec![rule], false);
        engine.evaluate(&sequence).unwrap();

        assert_eq!(
            engine.rows("B").unwrap(),
            vec![vec![
                DataValue::from(7i64),
                DataValue::skolem("SK_m_Y", vec![DataValue::from(7i64)])
            ]]
        );
    }

    #[test]
    fn unbound_head_variables_are_rejected() {
        let mut engine = engine(&[("A", 1), ("B", 2)]);
        insert_row(engine.database_mut(), "A", vec![DataValue::from(1i64)]).unwrap();

        let rule = Rule::new(
            Atom::builder(context("B", 2)).variables(&["X", "Y"]).build().unwrap(),
            vec![Atom::builder(context("A", 1)).variables(&["X"]).build().unwrap()],
        );
        let mut sequence = DatalogSequence::new("unsafe", false);
        sequence.add_rules("unsafe", vec![rule], false);

        assert!(engine.evaluate(&sequence).is_err());
    }

    #[test]
    fn failing_rule_stops_recursive_program() {
        let mut engine = engine(&[("A", 1), ("T", 1), ("B", 2), ("C", 1)]);
        insert_row(engine.database_mut(), "A", vec![DataValue::from(1i64)]).unwrap();

        let unary = |name: &str| {
            Atom::builder(context(name, 1))
                .variables(&["X"])
                .build()
                .unwrap()
        };
        let unsafe_rule = Rule::new(
            Atom::builder(context("B", 2)).variables(&["X", "Y"]).build().unwrap(),
            vec![unary("A")],
        );
        let mut sequence = DatalogSequence::new("copies", false);
        sequence.add_rules(
            "copies",
            vec![
                Rule::new(unary("T"), vec![unary("A")]),
                unsafe_rule,
                Rule::new(unary("C"), vec![unary("A")]),
            ],
            true,
        );

        assert!(engine.evaluate(&sequence).is_err());
        assert_eq!(engine.count("T").unwrap(), 1);
        assert_eq!(engine.count("C").unwrap(), 0);
        assert!(engine.journal().is_empty());

        // the measurement of the failed program is closed
        let timing = engine.timing().get("programs/copies").unwrap();
        assert_eq!(timing.timings().runs(), 1);

        assert!(engine.evaluate(&sequence).is_err());
        let timing = engine.timing().get("programs/copies").unwrap();
        assert_eq!(timing.timings().runs(), 2);
        assert_eq!(engine.count("C").unwrap(), 0);
    }

    #[test]
    fn requires_connection() {
        let mut engine = MemoryEngine::new(ExchangeConfig::default());
        let sequence = DatalogSequence::new("empty", false);

        assert!(engine.evaluate(&sequence).is_err());
        assert!(engine.commit().is_err());
    }

    #[test]
    fn best_effort_cleanup_skips_missing_tables() {
        let mut engine = engine(&[("A", 1), ("B", 1)]);
        insert_row(engine.database_mut(), "A", vec![DataValue::from(1i64)]).unwrap();

        let cleared = engine.clear_tables(&["A".to_string(), "missing".to_string()]);
        assert_eq!(cleared, 1);
        assert_eq!(engine.count("A").unwrap(), 0);

        assert_eq!(engine.drop_all_tables(), 2);
        assert!(engine.table_names().is_empty());
    }

    #[test]
    fn rollback_restores_checkpoint() {
        let mut engine = engine(&[("A", 1)]);
        engine.checkpoint().unwrap();
        insert_row(engine.database_mut(), "A", vec![DataValue::from(1i64)]).unwrap();
        engine.commit().unwrap();

        engine.rollback().unwrap();
        assert_eq!(engine.count("A").unwrap(), 0);
    }

    #[test]
    fn released_checkpoint_falls_back_to_last_commit() {
        let mut engine = engine(&[("A", 1)]);
        engine.checkpoint().unwrap();
        assert!(engine.has_checkpoint());

        insert_row(engine.database_mut(), "A", vec![DataValue::from(1i64)]).unwrap();
        engine.commit().unwrap();
        engine.release_checkpoint();
        assert!(!engine.has_checkpoint());

        insert_row(engine.database_mut(), "A", vec![DataValue::from(2i64)]).unwrap();
        engine.rollback().unwrap();
        assert_eq!(engine.rows("A").unwrap(), vec![vec![DataValue::from(1i64)]]);
    }
}
