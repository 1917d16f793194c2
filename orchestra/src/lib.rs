//! An incremental update-exchange engine for collaborative data sharing
//!
//! Peers own relations that are connected by declarative schema mappings.
//! Local insertions and deletions at one peer are propagated to all
//! dependent relations by compiling the mappings into ordered sequences of
//! delta-rule programs ([delta]) and evaluating them with a
//! [DatalogEngine][execution::engine::DatalogEngine] ([execution]).

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

/// The crate for underlying physical operations.
pub extern crate orchestra_physical;

pub mod config;
pub mod delta;
pub mod error;
pub mod execution;
pub mod io;
pub mod rule_model;
pub mod system;

// we use datavalues and timing from orchestra_physical in our API, so re-export them here.
pub use orchestra_physical::datavalues;
pub use orchestra_physical::meta;
