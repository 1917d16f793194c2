//! This module contains the row-based table representation.

pub mod table;
