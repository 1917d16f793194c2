//! This module contains the management of tables and the evaluation of execution plans.

pub mod database;
pub mod execution_plan;
