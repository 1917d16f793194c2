//! This module defines the exchange system: peers, relations, mappings
//! and their translation into rules.

pub mod catalog;
pub mod dependency;
pub mod mapping;
pub mod translation;
