//! Raw code arrays to typed instruction lists

use std::collections::HashMap;

use super::code::{ExceptionEntry, ExceptionHandler, MethodCode};
use super::error::{DecodeError, DecodeResult};
use super::instruction::{
    ArithOp, CompareKind, Condition, ConvertTarget, Instruction, LocalKind, NumericKind, Opaque, SwitchTable, Value,
};
use super::opcodes::*;
use super::pool::ConstantPoolAdapter;

const NUMERIC_KINDS: [NumericKind; 4] = [NumericKind::Int, NumericKind::Long, NumericKind::Float, NumericKind::Double];

struct Cursor<'a> {
    code: &'a [u8],
    pc: usize,
}

impl<'a> Cursor<'a> {
    fn bytes(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        let end = self.pc + n;
        let slice = self.code.get(self.pc..end).ok_or(DecodeError::Truncated { offset: self.pc })?;
        self.pc = end;
        Ok(slice)
    }

    fn u8(&mut self) -> DecodeResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn i8(&mut self) -> DecodeResult<i8> {
        Ok(self.u8()? as i8)
    }

    fn u16(&mut self) -> DecodeResult<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn i16(&mut self) -> DecodeResult<i16> {
        Ok(self.u16()? as i16)
    }

    fn i32(&mut self) -> DecodeResult<i32> {
        let b = self.bytes(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Decode a method's code array and exception table.
///
/// Branch targets and exception ranges are resolved to instruction indices.
/// The returned `MethodCode` carries zero limits; callers set them with
/// [`MethodCode::with_limits`].
pub fn decode(
    code: &[u8],
    exception_table: &[ExceptionEntry],
    pool: &dyn ConstantPoolAdapter,
) -> DecodeResult<MethodCode> {
    let mut cursor = Cursor { code, pc: 0 };
    let mut offsets = Vec::new();
    let mut raw = Vec::new();
    while cursor.pc < code.len() {
        offsets.push(cursor.pc);
        raw.push(decode_one(&mut cursor, pool)?);
    }

    let index_of: HashMap<usize, usize> = offsets.iter().enumerate().map(|(i, pc)| (*pc, i)).collect();
    let resolve = |offset: usize, target: i64| -> DecodeResult<usize> {
        usize::try_from(target)
            .ok()
            .and_then(|t| index_of.get(&t).copied())
            .ok_or(DecodeError::BadTarget { offset, target })
    };

    let mut instructions = Vec::with_capacity(raw.len());
    for (insn, pc) in raw.iter().zip(&offsets) {
        instructions.push(insn.try_map_targets(|target| resolve(*pc, target))?);
    }

    let boundary = |pc: u16| -> Option<usize> {
        let pc = pc as usize;
        if pc == code.len() {
            Some(offsets.len())
        } else {
            index_of.get(&pc).copied()
        }
    };
    let mut handlers = Vec::with_capacity(exception_table.len());
    for (index, entry) in exception_table.iter().enumerate() {
        let bad = DecodeError::BadExceptionRange { index };
        let start = index_of.get(&(entry.start_pc as usize)).copied().ok_or(bad.clone())?;
        let end = boundary(entry.end_pc).ok_or(bad.clone())?;
        let handler = index_of.get(&(entry.handler_pc as usize)).copied().ok_or(bad.clone())?;
        if start >= end {
            return Err(bad);
        }
        handlers.push(ExceptionHandler { start, end, handler, catch_type: entry.catch_type });
    }

    Ok(MethodCode { handlers, ..MethodCode::new(instructions) })
}

fn decode_one(cursor: &mut Cursor<'_>, pool: &dyn ConstantPoolAdapter) -> DecodeResult<Instruction<i64>> {
    let start = cursor.pc;
    let opcode = cursor.u8()?;
    let unsupported = DecodeError::UnsupportedOpcode { opcode, offset: start };
    let here = start as i64;

    let insn = match opcode {
        ICONST_M1..=ICONST_5 => Instruction::LoadConstant(Value::Int(opcode as i32 - ICONST_0 as i32)),
        LCONST_0 | LCONST_1 => Instruction::LoadConstant(Value::Long((opcode - LCONST_0) as i64)),
        FCONST_0..=FCONST_2 => Instruction::LoadConstant(Value::Float((opcode - FCONST_0) as f32)),
        DCONST_0 | DCONST_1 => Instruction::LoadConstant(Value::Double((opcode - DCONST_0) as f64)),
        BIPUSH => Instruction::LoadConstant(Value::Int(cursor.i8()? as i32)),
        SIPUSH => Instruction::LoadConstant(Value::Int(cursor.i16()? as i32)),
        LDC | LDC_W | LDC2_W => {
            let index = if opcode == LDC { cursor.u8()? as u16 } else { cursor.u16()? };
            let wide = opcode == LDC2_W;
            match pool.resolve(index) {
                Some(value) if (value.slots() == 2) == wide => Instruction::LoadConstant(value),
                _ => Instruction::Other(Opaque::with_operands(opcode, cursor.code[start + 1..cursor.pc].to_vec())),
            }
        }
        ILOAD..=ALOAD => Instruction::LoadLocal { kind: local_kind(opcode - ILOAD)?, index: cursor.u8()? as u16 },
        ILOAD_0..=ALOAD_3 => {
            let n = opcode - ILOAD_0;
            Instruction::LoadLocal { kind: local_kind(n / 4)?, index: (n % 4) as u16 }
        }
        ISTORE..=ASTORE => Instruction::StoreLocal { kind: local_kind(opcode - ISTORE)?, index: cursor.u8()? as u16 },
        ISTORE_0..=ASTORE_3 => {
            let n = opcode - ISTORE_0;
            Instruction::StoreLocal { kind: local_kind(n / 4)?, index: (n % 4) as u16 }
        }
        IADD..=DNEG => {
            const OPS: [ArithOp; 6] = [ArithOp::Add, ArithOp::Sub, ArithOp::Mul, ArithOp::Div, ArithOp::Rem, ArithOp::Neg];
            let n = (opcode - IADD) as usize;
            Instruction::Arithmetic { op: OPS[n / 4], kind: NUMERIC_KINDS[n % 4] }
        }
        ISHL..=LUSHR => {
            const OPS: [ArithOp; 3] = [ArithOp::Shl, ArithOp::Shr, ArithOp::Ushr];
            let n = (opcode - ISHL) as usize;
            Instruction::Arithmetic { op: OPS[n / 2], kind: NUMERIC_KINDS[n % 2] }
        }
        IAND..=LXOR => {
            const OPS: [ArithOp; 3] = [ArithOp::And, ArithOp::Or, ArithOp::Xor];
            let n = (opcode - IAND) as usize;
            Instruction::Arithmetic { op: OPS[n / 2], kind: NUMERIC_KINDS[n % 2] }
        }
        IINC => Instruction::Increment { index: cursor.u8()? as u16, delta: cursor.i8()? as i16 },
        I2L..=I2S => {
            let (from, to) = conversion(opcode).ok_or(unsupported)?;
            Instruction::Convert { from, to }
        }
        LCMP => Instruction::Compare(CompareKind::Long),
        FCMPL => Instruction::Compare(CompareKind::FloatL),
        FCMPG => Instruction::Compare(CompareKind::FloatG),
        DCMPL => Instruction::Compare(CompareKind::DoubleL),
        DCMPG => Instruction::Compare(CompareKind::DoubleG),
        IFEQ..=IF_ACMPNE | IFNULL | IFNONNULL => {
            let condition = Condition::from_opcode(opcode).ok_or(unsupported)?;
            Instruction::Branch { condition, target: here + cursor.i16()? as i64 }
        }
        GOTO => Instruction::Jump { target: here + cursor.i16()? as i64 },
        GOTO_W => Instruction::Jump { target: here + cursor.i32()? as i64 },
        TABLESWITCH | LOOKUPSWITCH => decode_switch(cursor, opcode, start)?,
        WIDE => decode_wide(cursor, start)?,
        JSR | JSR_W | RET => return Err(unsupported),
        _ => {
            let length = fixed_length(opcode).ok_or(unsupported)?;
            Instruction::Other(Opaque::with_operands(opcode, cursor.bytes(length - 1)?.to_vec()))
        }
    };
    Ok(insn)
}

fn local_kind(family: u8) -> DecodeResult<LocalKind> {
    LocalKind::from_family_offset(family).ok_or(DecodeError::UnsupportedOpcode { opcode: family, offset: 0 })
}

fn conversion(opcode: u8) -> Option<(NumericKind, ConvertTarget)> {
    use NumericKind::*;
    let pair = match opcode {
        I2L => (Int, ConvertTarget::Kind(Long)),
        I2F => (Int, ConvertTarget::Kind(Float)),
        I2D => (Int, ConvertTarget::Kind(Double)),
        L2I => (Long, ConvertTarget::Kind(Int)),
        L2F => (Long, ConvertTarget::Kind(Float)),
        L2D => (Long, ConvertTarget::Kind(Double)),
        F2I => (Float, ConvertTarget::Kind(Int)),
        F2L => (Float, ConvertTarget::Kind(Long)),
        F2D => (Float, ConvertTarget::Kind(Double)),
        D2I => (Double, ConvertTarget::Kind(Int)),
        D2L => (Double, ConvertTarget::Kind(Long)),
        D2F => (Double, ConvertTarget::Kind(Float)),
        I2B => (Int, ConvertTarget::Byte),
        I2C => (Int, ConvertTarget::Char),
        I2S => (Int, ConvertTarget::Short),
        _ => return None,
    };
    Some(pair)
}

/// Opcode of a conversion, the inverse of the decoder's table
pub(crate) fn conversion_opcode(from: NumericKind, to: ConvertTarget) -> Option<u8> {
    (I2L..=I2S).find(|op| conversion(*op) == Some((from, to)))
}

fn decode_switch(cursor: &mut Cursor<'_>, opcode: u8, start: usize) -> DecodeResult<Instruction<i64>> {
    let padding = (4 - (start + 1) % 4) % 4;
    cursor.bytes(padding)?;
    let here = start as i64;
    let default = here + cursor.i32()? as i64;
    let table = if opcode == TABLESWITCH {
        let low = cursor.i32()?;
        let high = cursor.i32()?;
        if high < low {
            return Err(DecodeError::BadSwitch { offset: start });
        }
        let count = (high as i64 - low as i64 + 1) as usize;
        let mut targets = Vec::with_capacity(count.min(cursor.code.len()));
        for _ in 0..count {
            targets.push(here + cursor.i32()? as i64);
        }
        SwitchTable::Table { low, high, targets }
    } else {
        let count = usize::try_from(cursor.i32()?).map_err(|_| DecodeError::BadSwitch { offset: start })?;
        let mut pairs = Vec::with_capacity(count.min(cursor.code.len()));
        for _ in 0..count {
            let key = cursor.i32()?;
            pairs.push((key, here + cursor.i32()? as i64));
        }
        SwitchTable::Lookup { pairs }
    };
    Ok(Instruction::Switch { default, table })
}

fn decode_wide(cursor: &mut Cursor<'_>, start: usize) -> DecodeResult<Instruction<i64>> {
    let opcode = cursor.u8()?;
    let insn = match opcode {
        ILOAD..=ALOAD => Instruction::LoadLocal { kind: local_kind(opcode - ILOAD)?, index: cursor.u16()? },
        ISTORE..=ASTORE => Instruction::StoreLocal { kind: local_kind(opcode - ISTORE)?, index: cursor.u16()? },
        IINC => Instruction::Increment { index: cursor.u16()?, delta: cursor.i16()? },
        _ => return Err(DecodeError::UnsupportedOpcode { opcode, offset: start }),
    };
    Ok(insn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::instruction::Relation;
    use crate::bytecode::pool::LiteralPool;

    #[test]
    fn test_decode_straight_line() {
        // iconst_2 bipush 40 iadd istore 4 return
        let code = [ICONST_2, BIPUSH, 40, IADD, ISTORE, 4, RETURN];
        let method = decode(&code, &[], &LiteralPool::new()).unwrap();
        assert_eq!(
            method.instructions,
            vec![
                Instruction::LoadConstant(Value::Int(2)),
                Instruction::LoadConstant(Value::Int(40)),
                Instruction::Arithmetic { op: ArithOp::Add, kind: NumericKind::Int },
                Instruction::StoreLocal { kind: LocalKind::Numeric(NumericKind::Int), index: 4 },
                Instruction::Other(Opaque::new(RETURN)),
            ]
        );
    }

    #[test]
    fn test_decode_branch_targets_become_indices() {
        // 0: iload_0  1: ifle +6 (-> 7)  4: iconst_1  5: ireturn  6: nop  7: iconst_0  8: ireturn
        let code = [ILOAD_0, IFLE, 0, 6, ICONST_1, IRETURN, NOP, ICONST_0, IRETURN];
        let method = decode(&code, &[], &LiteralPool::new()).unwrap();
        assert_eq!(
            method.instructions[1],
            Instruction::Branch { condition: Condition::Zero(Relation::Le), target: 5 }
        );
    }

    #[test]
    fn test_decode_ldc_resolves_numeric_literals() {
        let mut pool = LiteralPool::new();
        let long = pool.add_literal(Value::Long(1 << 33)).unwrap();
        let string = pool.add_member("Ljava/lang/String;").unwrap();
        let code = [LDC2_W, 0, long as u8, LDC, string as u8, POP, POP2, LCMP, RETURN];
        let method = decode(&code, &[], &pool).unwrap();
        assert_eq!(method.instructions[0], Instruction::LoadConstant(Value::Long(1 << 33)));
        assert_eq!(method.instructions[1], Instruction::Other(Opaque::with_operands(LDC, vec![string as u8])));
        assert_eq!(method.instructions[4], Instruction::Compare(CompareKind::Long));
    }

    #[test]
    fn test_decode_tableswitch_padding() {
        // 0: iload_0  1: tableswitch, pad to 4, default +23, low 0, high 1, +23, +24
        let mut code = vec![ILOAD_0, TABLESWITCH, 0, 0];
        for v in [23i32, 0, 1, 23, 24] {
            code.extend_from_slice(&v.to_be_bytes());
        }
        code.extend_from_slice(&[RETURN, RETURN]);
        assert_eq!(code.len(), 26);
        let method = decode(&code, &[], &LiteralPool::new()).unwrap();
        assert_eq!(
            method.instructions[1],
            Instruction::Switch { default: 2, table: SwitchTable::Table { low: 0, high: 1, targets: vec![2, 3] } }
        );
    }

    #[test]
    fn test_decode_wide_forms() {
        let code = [WIDE, ILOAD, 1, 0, WIDE, IINC, 1, 0, 0xff, 0x00, RETURN];
        let method = decode(&code, &[], &LiteralPool::new()).unwrap();
        assert_eq!(method.instructions[0], Instruction::LoadLocal { kind: LocalKind::Numeric(NumericKind::Int), index: 256 });
        assert_eq!(method.instructions[1], Instruction::Increment { index: 256, delta: -256 });
    }

    #[test]
    fn test_decode_rejects_subroutines() {
        let code = [JSR, 0, 3, RETURN];
        let err = decode(&code, &[], &LiteralPool::new()).unwrap_err();
        assert_eq!(err, DecodeError::UnsupportedOpcode { opcode: JSR, offset: 0 });
    }

    #[test]
    fn test_decode_exception_ranges() {
        // 0: aload_0  1: athrow  2: astore_1  3: return
        let code = [ALOAD_0, ATHROW, ASTORE_1, RETURN];
        let table = [ExceptionEntry::new(0, 2, 2, 0)];
        let method = decode(&code, &table, &LiteralPool::new()).unwrap();
        assert_eq!(method.handlers, vec![ExceptionHandler { start: 0, end: 2, handler: 2, catch_type: 0 }]);

        let bad = [ExceptionEntry::new(0, 3, 2, 0)];
        assert!(decode(&[ALOAD_0, ATHROW, NOP, RETURN], &bad, &LiteralPool::new()).is_ok());
        let misaligned = [ExceptionEntry::new(0, 5, 2, 0)];
        assert!(matches!(
            decode(&code, &misaligned, &LiteralPool::new()),
            Err(DecodeError::BadExceptionRange { index: 0 })
        ));
    }

    #[test]
    fn test_decode_bad_target() {
        let code = [GOTO, 0, 2, RETURN];
        assert!(matches!(decode(&code, &[], &LiteralPool::new()), Err(DecodeError::BadTarget { .. })));
    }
}
