//! Typed instruction lists back to raw code arrays
//!
//! Layout is computed iteratively: a `goto` whose displacement no longer fits
//! in 16 bits is widened to `goto_w`, which shifts later offsets and switch
//! padding, so offsets are recomputed until no jump changes size.

use std::collections::HashMap;

use super::code::{ExceptionEntry, MethodCode};
use super::decode::conversion_opcode;
use super::error::{EncodeError, EncodeResult};
use super::instruction::{ArithOp, Instruction, LocalKind, NumericKind, SwitchTable, Value};
use super::opcodes::*;
use super::pool::ConstantPoolAdapter;

/// Encoded code array and exception table of one method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCode {
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionEntry>,
}

/// Opcode for a constant that has a dedicated short form
fn short_constant(value: &Value) -> Option<u8> {
    match *value {
        Value::Int(v) if (-1..=5).contains(&v) => Some((ICONST_0 as i32 + v) as u8),
        Value::Long(v) if (0..=1).contains(&v) => Some(LCONST_0 + v as u8),
        Value::Float(v) => [0.0f32, 1.0, 2.0]
            .iter()
            .position(|c| c.to_bits() == v.to_bits())
            .map(|i| FCONST_0 + i as u8),
        Value::Double(v) => [0.0f64, 1.0]
            .iter()
            .position(|c| c.to_bits() == v.to_bits())
            .map(|i| DCONST_0 + i as u8),
        _ => None,
    }
}

/// True when the constant must be loaded through the constant pool
fn needs_pool(value: &Value) -> bool {
    match *value {
        Value::Int(v) => short_constant(value).is_none() && i16::try_from(v).is_err(),
        _ => short_constant(value).is_none(),
    }
}

fn switch_padding(pc: usize) -> usize {
    (4 - (pc + 1) % 4) % 4
}

fn local_length(index: u16) -> usize {
    match index {
        0..=3 => 1,
        4..=255 => 2,
        _ => 4,
    }
}

struct Layout {
    offsets: Vec<usize>,
    size: usize,
}

struct Encoder<'a> {
    method: &'a MethodCode,
    pool_indices: HashMap<usize, u16>,
    wide_jumps: Vec<bool>,
}

impl<'a> Encoder<'a> {
    fn length(&self, index: usize, pc: usize) -> usize {
        match &self.method.instructions[index] {
            Instruction::LoadConstant(value) => {
                if short_constant(value).is_some() {
                    1
                } else if let Some(pool_index) = self.pool_indices.get(&index) {
                    if value.slots() == 1 && *pool_index <= u8::MAX as u16 {
                        2
                    } else {
                        3
                    }
                } else if let Value::Int(v) = value {
                    if i8::try_from(*v).is_ok() {
                        2
                    } else {
                        3
                    }
                } else {
                    3
                }
            }
            Instruction::LoadLocal { index, .. } | Instruction::StoreLocal { index, .. } => local_length(*index),
            Instruction::Increment { index, delta } => {
                if *index <= u8::MAX as u16 && i8::try_from(*delta).is_ok() {
                    3
                } else {
                    6
                }
            }
            Instruction::Arithmetic { .. } | Instruction::Compare(_) | Instruction::Convert { .. } => 1,
            Instruction::Branch { .. } => 3,
            Instruction::Jump { .. } => {
                if self.wide_jumps[index] {
                    5
                } else {
                    3
                }
            }
            Instruction::Switch { table, .. } => {
                let body = match table {
                    SwitchTable::Table { targets, .. } => 12 + 4 * targets.len(),
                    SwitchTable::Lookup { pairs } => 8 + 8 * pairs.len(),
                };
                1 + switch_padding(pc) + body
            }
            Instruction::Other(opaque) => 1 + opaque.operands.len(),
        }
    }

    fn layout(&self) -> Layout {
        let mut offsets = Vec::with_capacity(self.method.instructions.len());
        let mut pc = 0;
        for index in 0..self.method.instructions.len() {
            offsets.push(pc);
            pc += self.length(index, pc);
        }
        Layout { offsets, size: pc }
    }

    fn target_offset(&self, layout: &Layout, index: usize, target: usize) -> EncodeResult<i64> {
        let to = if target == layout.offsets.len() {
            layout.size
        } else {
            *layout.offsets.get(target).ok_or(EncodeError::MissingTarget { index, target })?
        };
        Ok(to as i64 - layout.offsets[index] as i64)
    }

    /// Widen jumps until every displacement fits its encoding
    fn settle(&mut self) -> EncodeResult<Layout> {
        let method = self.method;
        loop {
            let layout = self.layout();
            let mut widened = false;
            for (index, insn) in method.instructions.iter().enumerate() {
                match insn {
                    Instruction::Jump { target } if !self.wide_jumps[index] => {
                        let offset = self.target_offset(&layout, index, *target)?;
                        if i16::try_from(offset).is_err() {
                            self.wide_jumps[index] = true;
                            widened = true;
                        }
                    }
                    Instruction::Branch { target, .. } => {
                        let offset = self.target_offset(&layout, index, *target)?;
                        if i16::try_from(offset).is_err() {
                            return Err(EncodeError::BranchOutOfRange { index, offset });
                        }
                    }
                    _ => {}
                }
            }
            if !widened {
                return Ok(layout);
            }
        }
    }

    fn emit(&self, layout: &Layout) -> EncodeResult<Vec<u8>> {
        let mut out = Vec::with_capacity(layout.size);
        for (index, insn) in self.method.instructions.iter().enumerate() {
            let pc = layout.offsets[index];
            match insn {
                Instruction::LoadConstant(value) => self.emit_constant(&mut out, index, value),
                Instruction::LoadLocal { kind, index: local } => emit_local(&mut out, ILOAD, ILOAD_0, *kind, *local),
                Instruction::StoreLocal { kind, index: local } => emit_local(&mut out, ISTORE, ISTORE_0, *kind, *local),
                Instruction::Increment { index: local, delta } => {
                    match (u8::try_from(*local), i8::try_from(*delta)) {
                        (Ok(local), Ok(delta)) => out.extend_from_slice(&[IINC, local, delta as u8]),
                        _ => {
                            out.extend_from_slice(&[WIDE, IINC]);
                            out.extend_from_slice(&local.to_be_bytes());
                            out.extend_from_slice(&delta.to_be_bytes());
                        }
                    }
                }
                Instruction::Arithmetic { op, kind } => out.push(arithmetic_opcode(*op, *kind)),
                Instruction::Compare(kind) => out.push(kind.opcode()),
                Instruction::Convert { from, to } => {
                    out.push(conversion_opcode(*from, *to).ok_or(EncodeError::Unencodable { index })?)
                }
                Instruction::Branch { condition, target } => {
                    let offset = self.target_offset(layout, index, *target)? as i16;
                    out.push(condition.opcode());
                    out.extend_from_slice(&offset.to_be_bytes());
                }
                Instruction::Jump { target } => {
                    let offset = self.target_offset(layout, index, *target)?;
                    if self.wide_jumps[index] {
                        out.push(GOTO_W);
                        out.extend_from_slice(&(offset as i32).to_be_bytes());
                    } else {
                        out.push(GOTO);
                        out.extend_from_slice(&(offset as i16).to_be_bytes());
                    }
                }
                Instruction::Switch { default, table } => {
                    let displacement =
                        |target: usize| -> EncodeResult<[u8; 4]> { Ok((self.target_offset(layout, index, target)? as i32).to_be_bytes()) };
                    out.push(match table {
                        SwitchTable::Table { .. } => TABLESWITCH,
                        SwitchTable::Lookup { .. } => LOOKUPSWITCH,
                    });
                    out.extend(std::iter::repeat(0u8).take(switch_padding(pc)));
                    out.extend_from_slice(&displacement(*default)?);
                    match table {
                        SwitchTable::Table { low, high, targets } => {
                            out.extend_from_slice(&low.to_be_bytes());
                            out.extend_from_slice(&high.to_be_bytes());
                            for target in targets {
                                out.extend_from_slice(&displacement(*target)?);
                            }
                        }
                        SwitchTable::Lookup { pairs } => {
                            out.extend_from_slice(&(pairs.len() as i32).to_be_bytes());
                            for (key, target) in pairs {
                                out.extend_from_slice(&key.to_be_bytes());
                                out.extend_from_slice(&displacement(*target)?);
                            }
                        }
                    }
                }
                Instruction::Other(opaque) => {
                    out.push(opaque.opcode);
                    out.extend_from_slice(&opaque.operands);
                }
            }
        }
        Ok(out)
    }

    fn emit_constant(&self, out: &mut Vec<u8>, index: usize, value: &Value) {
        if let Some(opcode) = short_constant(value) {
            out.push(opcode);
        } else if let Some(pool_index) = self.pool_indices.get(&index) {
            if value.slots() == 2 {
                out.push(LDC2_W);
                out.extend_from_slice(&pool_index.to_be_bytes());
            } else if *pool_index <= u8::MAX as u16 {
                out.extend_from_slice(&[LDC, *pool_index as u8]);
            } else {
                out.push(LDC_W);
                out.extend_from_slice(&pool_index.to_be_bytes());
            }
        } else if let Value::Int(v) = *value {
            match i8::try_from(v) {
                Ok(byte) => out.extend_from_slice(&[BIPUSH, byte as u8]),
                Err(_) => {
                    out.push(SIPUSH);
                    out.extend_from_slice(&(v as i16).to_be_bytes());
                }
            }
        }
    }
}

fn emit_local(out: &mut Vec<u8>, long_form: u8, short_base: u8, kind: LocalKind, index: u16) {
    let family = kind.family_offset();
    match index {
        0..=3 => out.push(short_base + family * 4 + index as u8),
        4..=255 => out.extend_from_slice(&[long_form + family, index as u8]),
        _ => {
            out.extend_from_slice(&[WIDE, long_form + family]);
            out.extend_from_slice(&index.to_be_bytes());
        }
    }
}

/// Opcode of a typed arithmetic instruction
pub fn arithmetic_opcode(op: ArithOp, kind: NumericKind) -> u8 {
    let kind4 = match kind {
        NumericKind::Int => 0,
        NumericKind::Long => 1,
        NumericKind::Float => 2,
        NumericKind::Double => 3,
    };
    let kind2 = kind4 % 2;
    match op {
        ArithOp::Add => IADD + kind4,
        ArithOp::Sub => ISUB + kind4,
        ArithOp::Mul => IMUL + kind4,
        ArithOp::Div => IDIV + kind4,
        ArithOp::Rem => IREM + kind4,
        ArithOp::Neg => INEG + kind4,
        ArithOp::Shl => ISHL + kind2,
        ArithOp::Shr => ISHR + kind2,
        ArithOp::Ushr => IUSHR + kind2,
        ArithOp::And => IAND + kind2,
        ArithOp::Or => IOR + kind2,
        ArithOp::Xor => IXOR + kind2,
    }
}

/// Encode a method body, interning any literal that needs a pool entry.
///
/// Empty exception ranges are dropped.
pub fn encode(method: &MethodCode, pool: &mut dyn ConstantPoolAdapter) -> EncodeResult<EncodedCode> {
    let mut pool_indices = HashMap::new();
    for (index, insn) in method.instructions.iter().enumerate() {
        if let Instruction::LoadConstant(value) = insn {
            if needs_pool(value) {
                pool_indices.insert(index, pool.intern(*value)?);
            }
        }
    }

    let mut encoder = Encoder {
        method,
        pool_indices,
        wide_jumps: vec![false; method.instructions.len()],
    };
    let layout = encoder.settle()?;
    if layout.size > u16::MAX as usize {
        return Err(EncodeError::CodeTooLarge { size: layout.size });
    }
    let code = encoder.emit(&layout)?;

    let pc_of = |index: usize| -> u16 {
        if index >= layout.offsets.len() {
            layout.size as u16
        } else {
            layout.offsets[index] as u16
        }
    };
    let exception_table = method
        .handlers
        .iter()
        .filter(|h| pc_of(h.start) < pc_of(h.end))
        .map(|h| ExceptionEntry::new(pc_of(h.start), pc_of(h.end), pc_of(h.handler), h.catch_type))
        .collect();

    Ok(EncodedCode { code, exception_table })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::code::ExceptionHandler;
    use crate::bytecode::decode::decode;
    use crate::bytecode::instruction::{Condition, ConvertTarget, Opaque, Relation};
    use crate::bytecode::pool::LiteralPool;

    #[test]
    fn test_constant_forms() {
        let mut pool = LiteralPool::new();
        let method = MethodCode::new(vec![
            Instruction::LoadConstant(Value::Int(-1)),
            Instruction::LoadConstant(Value::Int(100)),
            Instruction::LoadConstant(Value::Int(1000)),
            Instruction::LoadConstant(Value::Int(100_000)),
            Instruction::LoadConstant(Value::Float(2.0)),
            Instruction::LoadConstant(Value::Double(-0.0)),
            Instruction::Other(Opaque::new(RETURN)),
        ]);
        let encoded = encode(&method, &mut pool).unwrap();
        assert_eq!(
            encoded.code,
            vec![ICONST_M1, BIPUSH, 100, SIPUSH, 0x03, 0xe8, LDC, 1, FCONST_2, LDC2_W, 0, 2, RETURN]
        );
        assert_eq!(pool.resolve(1), Some(Value::Int(100_000)));
        assert_eq!(pool.resolve(2), Some(Value::Double(-0.0)));
    }

    #[test]
    fn test_local_forms() {
        let int = LocalKind::Numeric(NumericKind::Int);
        let method = MethodCode::new(vec![
            Instruction::LoadLocal { kind: LocalKind::Reference, index: 2 },
            Instruction::StoreLocal { kind: LocalKind::Numeric(NumericKind::Double), index: 7 },
            Instruction::LoadLocal { kind: int, index: 300 },
            Instruction::Increment { index: 1, delta: 200 },
        ]);
        let encoded = encode(&method, &mut LiteralPool::new()).unwrap();
        assert_eq!(
            encoded.code,
            vec![ALOAD_2, DSTORE, 7, WIDE, ILOAD, 0x01, 0x2c, WIDE, IINC, 0, 1, 0, 200]
        );
    }

    #[test]
    fn test_roundtrip_through_decoder() {
        let method = MethodCode::new(vec![
            Instruction::LoadLocal { kind: LocalKind::Numeric(NumericKind::Int), index: 0 },
            Instruction::Switch {
                default: 4,
                table: SwitchTable::Lookup { pairs: vec![(1, 2), (10, 3)] },
            },
            Instruction::Convert { from: NumericKind::Int, to: ConvertTarget::Short },
            Instruction::Branch { condition: Condition::Zero(Relation::Ne), target: 0 },
            Instruction::Other(Opaque::new(RETURN)),
        ])
        .with_handler(ExceptionHandler { start: 0, end: 4, handler: 4, catch_type: 0 });
        let mut pool = LiteralPool::new();
        let encoded = encode(&method, &mut pool).unwrap();
        let decoded = decode(&encoded.code, &encoded.exception_table, &pool).unwrap();
        assert!(decoded.same_body(&method));
    }

    #[test]
    fn test_long_jump_widens() {
        let mut instructions = vec![Instruction::Jump { target: 40_001 }];
        instructions.extend(std::iter::repeat(Instruction::Other(Opaque::new(NOP))).take(40_000));
        instructions.push(Instruction::Other(Opaque::new(RETURN)));
        let method = MethodCode::new(instructions);
        let encoded = encode(&method, &mut LiteralPool::new()).unwrap();
        assert_eq!(encoded.code[0], GOTO_W);
        assert_eq!(&encoded.code[1..5], &(40_005i32).to_be_bytes());
    }

    #[test]
    fn test_long_conditional_branch_fails() {
        let mut instructions = vec![
            Instruction::LoadConstant(Value::Int(0)),
            Instruction::Branch { condition: Condition::Zero(Relation::Eq), target: 40_002 },
        ];
        instructions.extend(std::iter::repeat(Instruction::Other(Opaque::new(NOP))).take(40_000));
        instructions.push(Instruction::Other(Opaque::new(RETURN)));
        let method = MethodCode::new(instructions);
        assert!(matches!(
            encode(&method, &mut LiteralPool::new()),
            Err(EncodeError::BranchOutOfRange { index: 1, .. })
        ));
    }

    #[test]
    fn test_empty_handler_ranges_dropped() {
        let method = MethodCode::new(vec![Instruction::Other(Opaque::new(RETURN))])
            .with_handler(ExceptionHandler { start: 1, end: 1, handler: 0, catch_type: 0 });
        let encoded = encode(&method, &mut LiteralPool::new()).unwrap();
        assert!(encoded.exception_table.is_empty());
    }
}
