//! This crate defines low-level data structures and operations, i.e.,
//! it corresponds to the physical layer of the update-exchange engine.
//! It stores the rows of base, mapping and staging relations and evaluates
//! single-rule execution plans over them, without any knowledge of
//! role tags, mappings or peers.

#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts
)]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    variant_size_differences
)]

pub mod datavalues;
pub mod error;
pub mod management;
pub mod meta;
pub mod tabular;
