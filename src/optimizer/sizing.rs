//! `max_stack` and `max_locals` for a rewritten method body

use crate::bytecode::error::{StackError, StackResult};
use crate::bytecode::stack::stack_effect;
use crate::bytecode::{ConstantPoolAdapter, Instruction, MethodCode};

/// Highest local slot referenced, never below the parameter slots
pub fn max_locals(code: &MethodCode) -> u16 {
    code.instructions
        .iter()
        .map(|insn| match insn {
            Instruction::LoadLocal { kind, index } | Instruction::StoreLocal { kind, index } => {
                index.saturating_add(kind.slots())
            }
            Instruction::Increment { index, .. } => index.saturating_add(1),
            _ => 0,
        })
        .fold(code.parameter_slots, u16::max)
}

/// Deepest operand stack over every reachable path.
///
/// Normal entry starts empty and every handler entry starts holding the
/// exception reference.
pub fn max_stack(code: &MethodCode, pool: &dyn ConstantPoolAdapter) -> StackResult<u16> {
    let mut depth_at: Vec<Option<u32>> = vec![None; code.len()];
    let mut pending = Vec::new();
    let mut deepest = 0u32;

    if !code.is_empty() {
        pending.push((0, 0));
    }
    pending.extend(code.handlers.iter().map(|h| (h.handler, 1)));

    while let Some((index, depth)) = pending.pop() {
        let Some(insn) = code.instructions.get(index) else {
            continue;
        };
        if depth_at[index].is_some() {
            continue;
        }
        depth_at[index] = Some(depth);
        deepest = deepest.max(depth);

        let effect = stack_effect(insn, pool)?;
        let after = depth
            .checked_sub(u32::from(effect.pops))
            .ok_or(StackError::Underflow { index })?
            + u32::from(effect.pushes);
        deepest = deepest.max(after);

        for target in insn.targets() {
            pending.push((target, after));
        }
        if insn.falls_through() {
            pending.push((index + 1, after));
        }
    }
    Ok(u16::try_from(deepest).unwrap_or(u16::MAX))
}
