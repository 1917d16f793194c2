//! This module collects miscellaneous functionality for measuring the engine.

pub mod timing;
