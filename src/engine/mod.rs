//! Execution engine for flagops
//!
//! The engine orchestrates:
//! 1. Planning - Build the ordered resource list from the manifest
//! 2. Diffing - Preview what each resource would change
//! 3. Executing - Confirm, then reconcile resource by resource

pub mod differ;
pub mod executor;
pub mod planner;

pub use executor::{RunOptions, run};
pub use planner::build_plan;
