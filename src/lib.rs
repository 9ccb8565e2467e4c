//! classfold
//!
//! A per-method optimizer for compiled JVM class files: constant folding,
//! constant and variable propagation, dead branch elimination and iterated
//! dead-store elimination, with `max_stack` / `max_locals` recomputed for
//! every rewritten method.
//!
//! ## Architecture
//!
//! - **bytecode**: opcodes, the typed instruction model, code-array decoding and encoding
//! - **optimizer**: instruction stream, loop analysis, folding and dead-store passes
//! - **classfile**: class-file parsing, rewriting and writing
//! - **driver**: single-file and directory-tree batch entry points
//! - **bin**: command-line interface
//!
//! ## Flow
//!
//! ```text
//! .class → ClassFile → Code → MethodCode → optimizer → MethodCode → Code → .class
//!                                             ↓
//!                           fold/propagate/prune → dead stores → sizing
//! ```

pub mod bytecode;
pub mod classfile;
pub mod config;
pub mod driver;
pub mod error;
pub mod optimizer;

pub use config::Config;
pub use driver::{optimize_class_bytes, optimize_class_file, optimize_tree, BatchReport};
pub use error::{Error, Result};
pub use optimizer::{optimize, optimize_or_original, OptimizeError, OptimizedMethod};
