//! This module defines the [DeltaRules] containers,
//! which own compiled delta-rule sequences and run them phase by phase.

use std::time::{Duration, Instant};

use crate::{
    config::ExchangeConfig,
    delta::{deletion::DeletionDeltaRuleGen, insertion::InsertionDeltaRuleGen},
    error::Error,
    io::document::{Document, Element},
    rule_model::{
        program::{DatalogSequence, DatalogStep},
        rule::{Rule, RuleMode},
    },
    system::{catalog::Catalog, translation::TranslationRules},
};

use super::engine::DatalogEngine;

/// Compiled delta rules for one direction of change propagation
///
/// The last three sequences of [DeltaRules::code] are the preparation,
/// main and post phase; any sequences before them are run first, in order.
pub trait DeltaRules {
    /// Name of the direction, used in logs and as the serialized type.
    fn kind(&self) -> &'static str;

    /// Return all sequences in execution order.
    fn code(&self) -> &[DatalogSequence];

    /// Return the configuration the rules were compiled with.
    fn config(&self) -> &ExchangeConfig;

    /// Run all phases, committing after each one.
    ///
    /// Returns the time of the main phase without the time the engine spent on logging.
    /// The first error aborts the run and is returned unchanged.
    fn execute(&self, engine: &mut dyn DatalogEngine) -> Result<Duration, Error> {
        let kind = self.kind();
        let code = self.code();
        let (leading, phases) = code.split_at(code.len().saturating_sub(3));
        let [prep, main, post] = phases else {
            return Err(Error::MalformedRule {
                rule: kind.to_string(),
                reason: format!("expected three phases, found {}", phases.len()),
            });
        };

        for sequence in leading {
            phase(kind, sequence.name(), engine.commit_and_reset())?;
            phase(kind, sequence.name(), engine.evaluate(sequence))?;
        }

        phase(kind, prep.name(), engine.commit_and_reset())?;
        phase(kind, prep.name(), engine.evaluate(prep))?;
        phase(kind, prep.name(), engine.commit_and_reset())?;

        let start = Instant::now();
        let changed = phase(
            kind,
            main.name(),
            engine.evaluate_programs(main, self.config().recompute_queries()),
        )?;
        let net = start.elapsed().saturating_sub(engine.log_time());
        log::debug!(
            "{kind} main phase changed {changed} tuples in {}ms (empty checks {}ms)",
            net.as_millis(),
            engine.empty_time().as_millis()
        );
        phase(kind, main.name(), engine.commit_and_reset())?;

        phase(kind, post.name(), engine.evaluate(post))?;
        phase(kind, post.name(), engine.commit_and_reset())?;

        Ok(net)
    }

    /// Describe all sequences as an XML document.
    fn serialize(&self) -> Document {
        let mut root = Element::new("deltaRules").with_attribute("type", self.kind());
        for sequence in self.code() {
            root.push(sequence_element(sequence));
        }

        Document::new(root)
    }
}

/// Log the failure of a phase before handing the error on.
fn phase<T>(kind: &str, name: &str, result: Result<T, Error>) -> Result<T, Error> {
    result.map_err(|error| {
        log::error!("{kind} delta rules failed in phase \"{name}\": {error}");
        error
    })
}

fn mode_name(mode: RuleMode) -> &'static str {
    match mode {
        RuleMode::Insert => "insert",
        RuleMode::DeleteFromHead => "delete",
        RuleMode::ClearAndCopy => "replace",
        RuleMode::Clear => "clear",
    }
}

fn rule_element(rule: &Rule) -> Element {
    let element = Element::new("rule").with_attribute("mode", mode_name(rule.mode()));
    let element = match rule.mapping() {
        Some(mapping) => element.with_attribute("mapping", mapping),
        None => element,
    };

    element.with_text(rule.to_string())
}

fn sequence_element(sequence: &DatalogSequence) -> Element {
    let mut element = Element::new("sequence")
        .with_attribute("name", sequence.name())
        .with_attribute("recursive", sequence.is_recursive().to_string());

    for step in sequence.steps() {
        match step {
            DatalogStep::Program(program) => {
                let mut child = Element::new("program")
                    .with_attribute("name", program.name())
                    .with_attribute("recursive", program.is_recursive().to_string());
                for rule in program.rules() {
                    child.push(rule_element(rule));
                }
                element.push(child);
            }
            DatalogStep::Sequence(nested) => element.push(sequence_element(nested)),
        }
    }

    element
}

/// Delta rules propagating insertions
#[derive(Debug, Clone)]
pub struct InsertionDeltaRules {
    code: Vec<DatalogSequence>,
    config: ExchangeConfig,
}

impl InsertionDeltaRules {
    /// Compile the insertion delta rules of the translated mappings.
    pub fn new(
        catalog: &Catalog,
        rules: &TranslationRules,
        config: ExchangeConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            code: InsertionDeltaRuleGen::new(catalog, rules).generate()?,
            config,
        })
    }
}

impl DeltaRules for InsertionDeltaRules {
    fn kind(&self) -> &'static str {
        "Insertion"
    }

    fn code(&self) -> &[DatalogSequence] {
        &self.code
    }

    fn config(&self) -> &ExchangeConfig {
        &self.config
    }
}

/// Delta rules propagating deletions
#[derive(Debug, Clone)]
pub struct DeletionDeltaRules {
    code: Vec<DatalogSequence>,
    config: ExchangeConfig,
}

impl DeletionDeltaRules {
    /// Compile the deletion delta rules of the translated mappings.
    ///
    /// With bidirectional mappings the update-policy sequences
    /// run before the deletion itself.
    pub fn new(
        catalog: &Catalog,
        rules: &TranslationRules,
        config: ExchangeConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            code: DeletionDeltaRuleGen::new(catalog, rules).generate(config.allow_side_effects)?,
            config,
        })
    }
}

impl DeltaRules for DeletionDeltaRules {
    fn kind(&self) -> &'static str {
        "Deletion"
    }

    fn code(&self) -> &[DatalogSequence] {
        &self.code
    }

    fn config(&self) -> &ExchangeConfig {
        &self.config
    }
}
