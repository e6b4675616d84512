//! Integration tests for sqlrun.

pub mod column_types_test;
pub mod runner_test;
