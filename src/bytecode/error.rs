//! Error types for code-array decoding and encoding

use thiserror::Error;

/// Errors raised while turning raw code bytes into instructions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Code array truncated at offset {offset}")]
    Truncated { offset: usize },
    #[error("Unsupported opcode {opcode:#04x} at offset {offset}")]
    UnsupportedOpcode { opcode: u8, offset: usize },
    #[error("Branch at offset {offset} targets {target}, which is not an instruction boundary")]
    BadTarget { offset: usize, target: i64 },
    #[error("Exception table entry {index} does not line up with instruction boundaries")]
    BadExceptionRange { index: usize },
    #[error("Malformed switch at offset {offset}")]
    BadSwitch { offset: usize },
}

/// Errors raised while re-encoding an instruction list
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Conditional branch at index {index} needs offset {offset}, beyond 16-bit range")]
    BranchOutOfRange { index: usize, offset: i64 },
    #[error("Instruction {index} refers to missing target {target}")]
    MissingTarget { index: usize, target: usize },
    #[error("Instruction {index} has no bytecode encoding")]
    Unencodable { index: usize },
    #[error("Encoded method is {size} bytes, larger than the 65535 byte limit")]
    CodeTooLarge { size: usize },
    #[error("Local variable index {index} does not fit the instruction encoding")]
    LocalOutOfRange { index: u16 },
    #[error("Constant pool error: {0}")]
    Pool(#[from] PoolError),
}

/// Errors raised by constant pool adapters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Constant pool is out of space")]
    OutOfSpace,
    #[error("Invalid constant pool index: {0}")]
    InvalidIndex(u16),
}

/// Result type for decoding
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Result type for encoding
pub type EncodeResult<T> = Result<T, EncodeError>;

/// Result type for constant pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors raised while computing operand stack effects
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    #[error("No stack effect known for opcode {0:#04x}")]
    UnknownOpcode(u8),
    #[error("Constant pool entry {0} is not a member reference")]
    UnresolvedMember(u16),
    #[error("Invalid descriptor: {0}")]
    BadDescriptor(String),
    #[error("Operand stack underflow at instruction {index}")]
    Underflow { index: usize },
}

/// Result type for stack effect computation
pub type StackResult<T> = Result<T, StackError>;
