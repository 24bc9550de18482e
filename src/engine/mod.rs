//! Execution engine for roster
//!
//! The engine orchestrates:
//! 1. Planning - Pair declared entries with tracked records
//! 2. Diffing - Show what apply would change
//! 3. Executing - Apply changes with terminal progress and confirmation

pub mod differ;
pub mod executor;
pub mod planner;

pub use planner::build_plan;
