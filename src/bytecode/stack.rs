//! Operand stack effects, counted in slots

use super::descriptor::{field_slots, method_shape};
use super::error::{StackError, StackResult};
use super::instruction::{Condition, Instruction, Opaque};
use super::opcodes::*;
use super::pool::ConstantPoolAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEffect {
    pub pops: u16,
    pub pushes: u16,
}

impl StackEffect {
    const fn new(pops: u16, pushes: u16) -> Self {
        Self { pops, pushes }
    }
}

/// Stack slots consumed and produced by one instruction
pub fn stack_effect<L>(insn: &Instruction<L>, pool: &dyn ConstantPoolAdapter) -> StackResult<StackEffect> {
    let effect = match insn {
        Instruction::LoadConstant(value) => StackEffect::new(0, value.slots()),
        Instruction::LoadLocal { kind, .. } => StackEffect::new(0, kind.slots()),
        Instruction::StoreLocal { kind, .. } => StackEffect::new(kind.slots(), 0),
        Instruction::Increment { .. } | Instruction::Jump { .. } => StackEffect::new(0, 0),
        Instruction::Arithmetic { op, kind } => {
            let pops = if op.is_shift() {
                kind.slots() + 1
            } else {
                kind.slots() * op.arity() as u16
            };
            StackEffect::new(pops, kind.slots())
        }
        Instruction::Compare(kind) => StackEffect::new(kind.operand_kind().slots() * 2, 1),
        Instruction::Convert { from, to } => StackEffect::new(from.slots(), to.result_kind().slots()),
        Instruction::Branch { condition, .. } => match condition {
            Condition::Zero(_) | Condition::Null(_) => StackEffect::new(1, 0),
            Condition::IntPair(_) | Condition::RefPair(_) => StackEffect::new(2, 0),
        },
        Instruction::Switch { .. } => StackEffect::new(1, 0),
        Instruction::Other(opaque) => opaque_effect(opaque, pool)?,
    };
    Ok(effect)
}

fn member(opaque: &Opaque, pool: &dyn ConstantPoolAdapter) -> StackResult<String> {
    let index = opaque.pool_index().ok_or(StackError::UnknownOpcode(opaque.opcode))?;
    pool.member_descriptor(index).ok_or(StackError::UnresolvedMember(index))
}

fn opaque_effect(opaque: &Opaque, pool: &dyn ConstantPoolAdapter) -> StackResult<StackEffect> {
    let effect = match opaque.opcode {
        NOP => StackEffect::new(0, 0),
        ACONST_NULL | LDC | LDC_W => StackEffect::new(0, 1),
        LDC2_W => StackEffect::new(0, 2),
        LALOAD | DALOAD => StackEffect::new(2, 2),
        IALOAD | FALOAD | AALOAD | BALOAD | CALOAD | SALOAD => StackEffect::new(2, 1),
        LASTORE | DASTORE => StackEffect::new(4, 0),
        IASTORE | FASTORE | AASTORE | BASTORE | CASTORE | SASTORE => StackEffect::new(3, 0),
        POP => StackEffect::new(1, 0),
        POP2 => StackEffect::new(2, 0),
        DUP => StackEffect::new(1, 2),
        DUP_X1 => StackEffect::new(2, 3),
        DUP_X2 => StackEffect::new(3, 4),
        DUP2 => StackEffect::new(2, 4),
        DUP2_X1 => StackEffect::new(3, 5),
        DUP2_X2 => StackEffect::new(4, 6),
        SWAP => StackEffect::new(2, 2),
        IRETURN | FRETURN | ARETURN => StackEffect::new(1, 0),
        LRETURN | DRETURN => StackEffect::new(2, 0),
        RETURN => StackEffect::new(0, 0),
        GETSTATIC | PUTSTATIC | GETFIELD | PUTFIELD => {
            let descriptor = member(opaque, pool)?;
            let slots = field_slots(&descriptor).ok_or(StackError::BadDescriptor(descriptor))?;
            match opaque.opcode {
                GETSTATIC => StackEffect::new(0, slots),
                PUTSTATIC => StackEffect::new(slots, 0),
                GETFIELD => StackEffect::new(1, slots),
                _ => StackEffect::new(1 + slots, 0),
            }
        }
        INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC | INVOKEINTERFACE | INVOKEDYNAMIC => {
            let descriptor = member(opaque, pool)?;
            let shape = method_shape(&descriptor).ok_or(StackError::BadDescriptor(descriptor))?;
            let receiver = match opaque.opcode {
                INVOKESTATIC | INVOKEDYNAMIC => 0,
                _ => 1,
            };
            StackEffect::new(shape.parameter_slots + receiver, shape.return_slots)
        }
        NEW => StackEffect::new(0, 1),
        NEWARRAY | ANEWARRAY | ARRAYLENGTH | CHECKCAST | INSTANCEOF => StackEffect::new(1, 1),
        ATHROW | MONITORENTER | MONITOREXIT => StackEffect::new(1, 0),
        MULTIANEWARRAY => {
            let dimensions = opaque.operands.get(2).copied().ok_or(StackError::UnknownOpcode(MULTIANEWARRAY))?;
            StackEffect::new(dimensions as u16, 1)
        }
        other => return Err(StackError::UnknownOpcode(other)),
    };
    Ok(effect)
}
