//! Bytecode layer: opcodes, the typed instruction model and its codecs
//!
//! ```text
//! code bytes --decode--> MethodCode (Instruction<usize>) --encode--> code bytes
//! ```

pub mod code;
pub mod decode;
pub mod descriptor;
pub mod encode;
pub mod error;
pub mod instruction;
pub mod opcodes;
pub mod pool;
pub mod stack;

pub use code::{ExceptionEntry, ExceptionHandler, MethodCode};
pub use decode::decode;
pub use encode::{encode, EncodedCode};
pub use error::{DecodeError, EncodeError, PoolError, StackError};
pub use instruction::{
    ArithOp, CompareKind, Condition, ConvertTarget, Instruction, LocalKind, NumericKind, Opaque, Relation, SwitchTable,
    Value,
};
pub use pool::{ConstantPoolAdapter, LiteralPool};
