//! This module defines the Datalog-style representation of mappings and delta rules.

pub mod atom;
pub mod atom_type;
pub mod program;
pub mod relation;
pub mod rule;
pub mod substitution;
pub mod term;
