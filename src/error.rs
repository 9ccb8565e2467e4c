use std::path::PathBuf;

use thiserror::Error;

use crate::bytecode::{DecodeError, EncodeError};
use crate::classfile::ClassFormatError;
use crate::optimizer::OptimizeError;

/// Result type for classfold operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for classfold
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid class file: {0}")]
    ClassFormat(#[from] ClassFormatError),

    #[error("Cannot decode method body: {0}")]
    Decode(#[from] DecodeError),

    #[error("Cannot encode method body: {0}")]
    Encode(#[from] EncodeError),

    #[error("Optimization failed: {0}")]
    Optimize(#[from] OptimizeError),

    #[error("Cannot walk input tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// Attach the file being processed to an error
    pub fn in_file(self, path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into(), source: Box::new(self) }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }
}
