//! This module contains the evaluation of delta rules:
//! the engine abstraction, an in-memory engine,
//! the delta-rule containers and the update-exchange driver.

pub mod applier;
pub mod delta_rules;
pub mod engine;
pub mod exchange;
pub mod memory_engine;
