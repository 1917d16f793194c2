//! This module contains the input and output formats:
//! the exchange file parser and the XML documents describing delta rules.

pub mod document;
pub mod parser;
