//! Provider traits for execution
//!
//! These traits keep the declarative crate free of terminal and prompt
//! dependencies; the binary supplies implementations.

use crate::planner::Phase;
use crate::resource::Applied;
use anyhow::Result;

/// Progress callback for execution operations
///
/// Implement this trait to receive progress updates during execution.
/// Resources of one phase may complete in any order.
pub trait ProgressCallback: Send {
    /// Called when starting a phase with `count` resources to apply
    fn on_phase_start(&mut self, phase: Phase, count: usize);

    /// Called when a resource application completes
    fn on_resource_complete(&mut self, applied: &Applied);

    /// Called when a phase completes
    fn on_phase_complete(&mut self, phase: Phase);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_phase_start(&mut self, _phase: Phase, _count: usize) {}
    fn on_resource_complete(&mut self, _applied: &Applied) {}
    fn on_phase_complete(&mut self, _phase: Phase) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}
