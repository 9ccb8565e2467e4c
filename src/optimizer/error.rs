//! Per-method optimization failures

use thiserror::Error;

use super::list::NodeId;
use crate::bytecode::{DecodeError, EncodeError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizeError {
    /// An instruction the engine cannot model reached analysis
    #[error("Unsupported instruction {opcode:#04x} at position {offset}")]
    UnsupportedInstruction { opcode: u8, offset: usize },
    /// Folding would remove or change a run-time trap; the operation stays unfolded
    #[error("Not folding {operation}: {reason}")]
    RuntimeArithmetic { operation: String, reason: String },
    /// A deletion would strand a branch target; the deletion is skipped
    #[error("Deleting node {node} would leave a branch target dangling")]
    DanglingTarget { node: NodeId },
    #[error("Simulated operand stack underflow at node {node}")]
    InconsistentStackState { node: NodeId },
    #[error("Cannot decode method body: {0}")]
    Decoding(#[from] DecodeError),
    #[error("Cannot re-encode optimized method: {0}")]
    Encoding(#[from] EncodeError),
}

impl OptimizeError {
    pub fn runtime_arithmetic(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RuntimeArithmetic { operation: operation.into(), reason: reason.into() }
    }
}

/// Result type for optimizer operations
pub type OptimizeResult<T> = Result<T, OptimizeError>;
