//! Shared test utilities for paramstack integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated test execution with temp directories
//! - Settings fixture types covering nesting, lists, maps and recursion

pub mod fixtures;
pub mod harness;

pub use fixtures::*;
pub use harness::*;
