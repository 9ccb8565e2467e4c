//! Per-method optimization pipeline
//!
//! ```text
//! MethodCode -> InstructionList -> fold -> dead stores -> MethodCode + limits
//!                   ^                |
//!              LoopBounds <----------+ (recomputed after every rewrite)
//! ```
//!
//! Each method is processed independently with fresh state. Any error that
//! reaches method level leaves that method untouched; see
//! [`optimize_or_original`].

pub mod dead_store;
pub mod error;
pub mod eval;
pub mod folder;
pub mod list;
pub mod loops;
pub mod sizing;

pub use dead_store::DeadStoreStats;
pub use error::{OptimizeError, OptimizeResult};
pub use folder::{FoldStats, MethodContext};
pub use list::{InstructionList, NodeId};
pub use loops::LoopBounds;

use log::{debug, warn};

use crate::bytecode::{ConstantPoolAdapter, MethodCode};
use crate::config::Config;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    pub fold: FoldStats,
    pub dead_stores: DeadStoreStats,
}

/// A rewritten method body with recomputed limits
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedMethod {
    pub code: MethodCode,
    /// False when the body came out identical to the input
    pub changed: bool,
    pub stats: OptimizeStats,
}

/// Optimize one method body.
///
/// `pool` is only read, to size invocations and field accesses when
/// recomputing `max_stack`.
pub fn optimize(code: &MethodCode, pool: &dyn ConstantPoolAdapter, config: &Config) -> OptimizeResult<OptimizedMethod> {
    let mut list = InstructionList::from_method_code(code)?;
    let mut stats = OptimizeStats::default();

    if config.fold_constants {
        let loops = LoopBounds::analyze(&list);
        stats.fold = folder::fold_method(&mut list, &loops)?;
    }
    if config.eliminate_dead_stores {
        stats.dead_stores = dead_store::eliminate_dead_stores(&mut list, config.max_dead_store_rounds)?;
    }

    let mut rewritten = list.to_method_code(code)?;
    let changed = !rewritten.same_body(code);
    if changed {
        rewritten.max_locals = sizing::max_locals(&rewritten);
        rewritten.max_stack = match sizing::max_stack(&rewritten, pool) {
            Ok(depth) => depth,
            Err(err) => {
                debug!("keeping declared max_stack {}: {}", code.max_stack, err);
                code.max_stack
            }
        };
    }
    Ok(OptimizedMethod { code: rewritten, changed, stats })
}

/// Like [`optimize`], but any failure yields the original body unchanged
pub fn optimize_or_original(code: &MethodCode, pool: &dyn ConstantPoolAdapter, config: &Config) -> OptimizedMethod {
    match optimize(code, pool, config) {
        Ok(optimized) => optimized,
        Err(err) => {
            warn!("method left unoptimized: {}", err);
            OptimizedMethod { code: code.clone(), changed: false, stats: OptimizeStats::default() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::opcodes::{GETSTATIC, INVOKEVIRTUAL, IRETURN, RETURN};
    use crate::bytecode::{ArithOp, Instruction, LiteralPool, LocalKind, NumericKind, Opaque, Value};

    const INT: LocalKind = LocalKind::Numeric(NumericKind::Int);

    fn int(v: i32) -> Instruction<usize> {
        Instruction::LoadConstant(Value::Int(v))
    }

    #[test]
    fn test_store_then_print_collapses() {
        let mut pool = LiteralPool::new();
        let out = pool.add_member("Ljava/io/PrintStream;").unwrap();
        let println = pool.add_member("(I)V").unwrap();
        let code = MethodCode::new(vec![
            int(5),
            Instruction::StoreLocal { kind: INT, index: 1 },
            Instruction::Other(Opaque::with_operands(GETSTATIC, out.to_be_bytes().to_vec())),
            Instruction::LoadLocal { kind: INT, index: 1 },
            Instruction::Other(Opaque::with_operands(INVOKEVIRTUAL, println.to_be_bytes().to_vec())),
            Instruction::Other(Opaque::new(RETURN)),
        ])
        .with_limits(2, 2, 1);

        let optimized = optimize(&code, &pool, &Config::default()).unwrap();
        assert!(optimized.changed);
        assert_eq!(
            optimized.code.instructions,
            vec![
                Instruction::Other(Opaque::with_operands(GETSTATIC, out.to_be_bytes().to_vec())),
                int(5),
                Instruction::Other(Opaque::with_operands(INVOKEVIRTUAL, println.to_be_bytes().to_vec())),
                Instruction::Other(Opaque::new(RETURN)),
            ]
        );
        assert_eq!(optimized.code.max_locals, 1);
        assert_eq!(optimized.code.max_stack, 2);
    }

    #[test]
    fn test_disabled_passes_leave_body() {
        let code = MethodCode::new(vec![
            int(2),
            int(3),
            Instruction::Arithmetic { op: ArithOp::Add, kind: NumericKind::Int },
            Instruction::Other(Opaque::new(IRETURN)),
        ]);
        let config = Config::new().with_folding(false).with_dead_store_elimination(false);
        let optimized = optimize(&code, &LiteralPool::new(), &config).unwrap();
        assert!(!optimized.changed);
        assert_eq!(optimized.code, code);
    }

    #[test]
    fn test_failure_returns_original() {
        let code = MethodCode::new(vec![
            Instruction::Arithmetic { op: ArithOp::Add, kind: NumericKind::Int },
            Instruction::Other(Opaque::new(IRETURN)),
        ])
        .with_limits(2, 0, 0);
        let result = optimize_or_original(&code, &LiteralPool::new(), &Config::default());
        assert!(!result.changed);
        assert_eq!(result.code, code);
    }
}
