//! Class-file format errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassFormatError {
    #[error("Class file truncated at offset {offset}, needed {needed} more byte(s)")]
    Truncated { offset: usize, needed: usize },
    #[error("Bad magic number {0:#010x}")]
    BadMagic(u32),
    #[error("Unknown constant pool tag {tag} at index {index}")]
    BadConstantTag { tag: u8, index: u16 },
    #[error("Constant {index} is not valid modified UTF-8")]
    BadUtf8 { index: u16 },
    #[error("Constant pool index {0} is missing or of the wrong kind")]
    BadConstantIndex(u16),
    #[error("{0} trailing byte(s) after the class file")]
    TrailingBytes(usize),
    #[error("Malformed Code attribute: {message}")]
    BadCode { message: String },
}

impl ClassFormatError {
    pub fn bad_code(message: impl Into<String>) -> Self {
        Self::BadCode { message: message.into() }
    }
}

/// Result type for class-file parsing
pub type ClassFormatResult<T> = Result<T, ClassFormatError>;
