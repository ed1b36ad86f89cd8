//! Execution result types

/// Result of instruction execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecutionResult {
    /// Continue to next instruction
    Continue,
    /// Stop the run without error (suspend, or a top-level return)
    Halt,
}
