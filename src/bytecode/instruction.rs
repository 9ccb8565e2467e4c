//! Typed instruction model
//!
//! Instructions are generic over the representation of branch targets so the
//! same variants serve the decoder (absolute byte offsets), method bodies
//! (indices into the instruction list) and the optimizer's instruction
//! stream (arena node ids).

use std::fmt;

use super::opcodes;

/// Numeric type of a computation, named after the JVM's computational types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericKind {
    Int,
    Long,
    Float,
    Double,
}

impl NumericKind {
    /// Operand stack / local variable slots occupied by a value of this kind
    pub fn slots(self) -> u16 {
        match self {
            NumericKind::Long | NumericKind::Double => 2,
            NumericKind::Int | NumericKind::Float => 1,
        }
    }

    fn prefix(self) -> char {
        match self {
            NumericKind::Int => 'i',
            NumericKind::Long => 'l',
            NumericKind::Float => 'f',
            NumericKind::Double => 'd',
        }
    }
}

/// A compile-time known numeric value, tagged with its JVM type
#[derive(Debug, Clone, Copy)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Value {
    pub fn kind(&self) -> NumericKind {
        match self {
            Value::Int(_) => NumericKind::Int,
            Value::Long(_) => NumericKind::Long,
            Value::Float(_) => NumericKind::Float,
            Value::Double(_) => NumericKind::Double,
        }
    }

    pub fn slots(&self) -> u16 {
        self.kind().slots()
    }

    /// Bit-exact identity: `NaN` is identical to itself, `0.0` and `-0.0` differ.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.identical(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}L", v),
            Value::Float(v) => write!(f, "{:?}f", v),
            Value::Double(v) => write!(f, "{:?}d", v),
        }
    }
}

/// Type of a local variable access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalKind {
    Numeric(NumericKind),
    Reference,
}

impl LocalKind {
    pub fn slots(self) -> u16 {
        match self {
            LocalKind::Numeric(kind) => kind.slots(),
            LocalKind::Reference => 1,
        }
    }

    fn prefix(self) -> char {
        match self {
            LocalKind::Numeric(kind) => kind.prefix(),
            LocalKind::Reference => 'a',
        }
    }

    /// Position of this kind in the `iload`..`aload` opcode families
    pub(crate) fn family_offset(self) -> u8 {
        match self {
            LocalKind::Numeric(NumericKind::Int) => 0,
            LocalKind::Numeric(NumericKind::Long) => 1,
            LocalKind::Numeric(NumericKind::Float) => 2,
            LocalKind::Numeric(NumericKind::Double) => 3,
            LocalKind::Reference => 4,
        }
    }

    pub(crate) fn from_family_offset(offset: u8) -> Option<Self> {
        match offset {
            0 => Some(LocalKind::Numeric(NumericKind::Int)),
            1 => Some(LocalKind::Numeric(NumericKind::Long)),
            2 => Some(LocalKind::Numeric(NumericKind::Float)),
            3 => Some(LocalKind::Numeric(NumericKind::Double)),
            4 => Some(LocalKind::Reference),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

impl ArithOp {
    /// Number of operands consumed from the stack
    pub fn arity(self) -> usize {
        match self {
            ArithOp::Neg => 1,
            _ => 2,
        }
    }

    pub fn is_shift(self) -> bool {
        matches!(self, ArithOp::Shl | ArithOp::Shr | ArithOp::Ushr)
    }

    fn name(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Div => "div",
            ArithOp::Rem => "rem",
            ArithOp::Neg => "neg",
            ArithOp::Shl => "shl",
            ArithOp::Shr => "shr",
            ArithOp::Ushr => "ushr",
            ArithOp::And => "and",
            ArithOp::Or => "or",
            ArithOp::Xor => "xor",
        }
    }
}

/// Relational operator of a conditional branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Relation {
    /// Evaluate `left OP right`
    pub fn holds(self, left: i32, right: i32) -> bool {
        match self {
            Relation::Eq => left == right,
            Relation::Ne => left != right,
            Relation::Lt => left < right,
            Relation::Ge => left >= right,
            Relation::Gt => left > right,
            Relation::Le => left <= right,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Relation::Eq => "eq",
            Relation::Ne => "ne",
            Relation::Lt => "lt",
            Relation::Ge => "ge",
            Relation::Gt => "gt",
            Relation::Le => "le",
        }
    }

    const ORDER: [Relation; 6] = [
        Relation::Eq,
        Relation::Ne,
        Relation::Lt,
        Relation::Ge,
        Relation::Gt,
        Relation::Le,
    ];

    pub(crate) fn from_offset(offset: u8) -> Option<Self> {
        Self::ORDER.get(offset as usize).copied()
    }

    pub(crate) fn offset(self) -> u8 {
        Self::ORDER.iter().position(|r| *r == self).unwrap_or(0) as u8
    }
}

/// Condition tested by a conditional branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    /// `ifeq` .. `ifle`: one int compared against zero
    Zero(Relation),
    /// `if_icmpeq` .. `if_icmple`: two ints
    IntPair(Relation),
    /// `if_acmpeq` (`true`) / `if_acmpne` (`false`)
    RefPair(bool),
    /// `ifnull` (`true`) / `ifnonnull` (`false`)
    Null(bool),
}

impl Condition {
    /// Number of stack operands the branch consumes
    pub fn operands(self) -> usize {
        match self {
            Condition::Zero(_) | Condition::Null(_) => 1,
            Condition::IntPair(_) | Condition::RefPair(_) => 2,
        }
    }

    pub fn opcode(self) -> u8 {
        match self {
            Condition::Zero(rel) => opcodes::IFEQ + rel.offset(),
            Condition::IntPair(rel) => opcodes::IF_ICMPEQ + rel.offset(),
            Condition::RefPair(true) => opcodes::IF_ACMPEQ,
            Condition::RefPair(false) => opcodes::IF_ACMPNE,
            Condition::Null(true) => opcodes::IFNULL,
            Condition::Null(false) => opcodes::IFNONNULL,
        }
    }

    pub fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            opcodes::IFEQ..=opcodes::IFLE => Relation::from_offset(opcode - opcodes::IFEQ).map(Condition::Zero),
            opcodes::IF_ICMPEQ..=opcodes::IF_ICMPLE => {
                Relation::from_offset(opcode - opcodes::IF_ICMPEQ).map(Condition::IntPair)
            }
            opcodes::IF_ACMPEQ => Some(Condition::RefPair(true)),
            opcodes::IF_ACMPNE => Some(Condition::RefPair(false)),
            opcodes::IFNULL => Some(Condition::Null(true)),
            opcodes::IFNONNULL => Some(Condition::Null(false)),
            _ => None,
        }
    }
}

/// Three-way comparisons pushing -1, 0 or 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareKind {
    Long,
    /// `fcmpl`: NaN compares as -1
    FloatL,
    /// `fcmpg`: NaN compares as 1
    FloatG,
    DoubleL,
    DoubleG,
}

impl CompareKind {
    pub fn operand_kind(self) -> NumericKind {
        match self {
            CompareKind::Long => NumericKind::Long,
            CompareKind::FloatL | CompareKind::FloatG => NumericKind::Float,
            CompareKind::DoubleL | CompareKind::DoubleG => NumericKind::Double,
        }
    }

    pub fn opcode(self) -> u8 {
        match self {
            CompareKind::Long => opcodes::LCMP,
            CompareKind::FloatL => opcodes::FCMPL,
            CompareKind::FloatG => opcodes::FCMPG,
            CompareKind::DoubleL => opcodes::DCMPL,
            CompareKind::DoubleG => opcodes::DCMPG,
        }
    }
}

/// Result type of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvertTarget {
    Kind(NumericKind),
    /// `i2b`
    Byte,
    /// `i2c`
    Char,
    /// `i2s`
    Short,
}

impl ConvertTarget {
    pub fn result_kind(self) -> NumericKind {
        match self {
            ConvertTarget::Kind(kind) => kind,
            ConvertTarget::Byte | ConvertTarget::Char | ConvertTarget::Short => NumericKind::Int,
        }
    }
}

/// Targets of a `tableswitch` or `lookupswitch`
#[derive(Debug, Clone, PartialEq)]
pub enum SwitchTable<L> {
    Table { low: i32, high: i32, targets: Vec<L> },
    Lookup { pairs: Vec<(i32, L)> },
}

/// An instruction the optimizer never interprets; re-emitted byte for byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opaque {
    pub opcode: u8,
    pub operands: Vec<u8>,
}

impl Opaque {
    pub fn new(opcode: u8) -> Self {
        Self { opcode, operands: Vec::new() }
    }

    pub fn with_operands(opcode: u8, operands: Vec<u8>) -> Self {
        Self { opcode, operands }
    }

    /// Constant-pool index carried in the first two operand bytes
    pub fn pool_index(&self) -> Option<u16> {
        match self.opcode {
            opcodes::LDC => self.operands.first().map(|b| *b as u16),
            _ => match self.operands.as_slice() {
                [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
                _ => None,
            },
        }
    }

    pub fn ends_flow(&self) -> bool {
        opcodes::ends_flow(self.opcode)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction<L> {
    LoadConstant(Value),
    LoadLocal { kind: LocalKind, index: u16 },
    StoreLocal { kind: LocalKind, index: u16 },
    Increment { index: u16, delta: i16 },
    Arithmetic { op: ArithOp, kind: NumericKind },
    Compare(CompareKind),
    Convert { from: NumericKind, to: ConvertTarget },
    Branch { condition: Condition, target: L },
    Jump { target: L },
    Switch { default: L, table: SwitchTable<L> },
    Other(Opaque),
}

impl<L: Copy> Instruction<L> {
    /// Every branch target this instruction refers to
    pub fn targets(&self) -> Vec<L> {
        match self {
            Instruction::Branch { target, .. } | Instruction::Jump { target } => vec![*target],
            Instruction::Switch { default, table } => {
                let mut targets = vec![*default];
                match table {
                    SwitchTable::Table { targets: cases, .. } => targets.extend(cases.iter().copied()),
                    SwitchTable::Lookup { pairs } => targets.extend(pairs.iter().map(|(_, t)| *t)),
                }
                targets
            }
            _ => Vec::new(),
        }
    }

    /// Rebuild the instruction with every target mapped through `f`
    pub fn try_map_targets<M, E>(&self, mut f: impl FnMut(L) -> Result<M, E>) -> Result<Instruction<M>, E> {
        Ok(match self {
            Instruction::LoadConstant(v) => Instruction::LoadConstant(*v),
            Instruction::LoadLocal { kind, index } => Instruction::LoadLocal { kind: *kind, index: *index },
            Instruction::StoreLocal { kind, index } => Instruction::StoreLocal { kind: *kind, index: *index },
            Instruction::Increment { index, delta } => Instruction::Increment { index: *index, delta: *delta },
            Instruction::Arithmetic { op, kind } => Instruction::Arithmetic { op: *op, kind: *kind },
            Instruction::Compare(kind) => Instruction::Compare(*kind),
            Instruction::Convert { from, to } => Instruction::Convert { from: *from, to: *to },
            Instruction::Branch { condition, target } => Instruction::Branch { condition: *condition, target: f(*target)? },
            Instruction::Jump { target } => Instruction::Jump { target: f(*target)? },
            Instruction::Switch { default, table } => {
                let default = f(*default)?;
                let table = match table {
                    SwitchTable::Table { low, high, targets } => SwitchTable::Table {
                        low: *low,
                        high: *high,
                        targets: targets.iter().map(|t| f(*t)).collect::<Result<_, _>>()?,
                    },
                    SwitchTable::Lookup { pairs } => SwitchTable::Lookup {
                        pairs: pairs.iter().map(|(k, t)| Ok((*k, f(*t)?))).collect::<Result<_, _>>()?,
                    },
                };
                Instruction::Switch { default, table }
            }
            Instruction::Other(opaque) => Instruction::Other(opaque.clone()),
        })
    }

    pub fn map_targets<M>(&self, mut f: impl FnMut(L) -> M) -> Instruction<M> {
        match self.try_map_targets::<M, std::convert::Infallible>(|t| Ok(f(t))) {
            Ok(insn) => insn,
            Err(never) => match never {},
        }
    }

    /// Replace every occurrence of `from` among the targets with `to`
    pub fn retarget(&mut self, from: L, to: L)
    where
        L: PartialEq,
    {
        let swap = |t: &mut L| {
            if *t == from {
                *t = to;
            }
        };
        match self {
            Instruction::Branch { target, .. } | Instruction::Jump { target } => swap(target),
            Instruction::Switch { default, table } => {
                swap(default);
                match table {
                    SwitchTable::Table { targets, .. } => targets.iter_mut().for_each(swap),
                    SwitchTable::Lookup { pairs } => pairs.iter_mut().for_each(|(_, t)| swap(t)),
                }
            }
            _ => {}
        }
    }
}

impl<L> Instruction<L> {
    /// True when control can continue to the next instruction in order
    pub fn falls_through(&self) -> bool {
        match self {
            Instruction::Jump { .. } | Instruction::Switch { .. } => false,
            Instruction::Other(opaque) => !opaque.ends_flow(),
            _ => true,
        }
    }

    /// Constant and local loads: push one value, no other effect
    pub fn is_pure_push(&self) -> bool {
        matches!(self, Instruction::LoadConstant(_) | Instruction::LoadLocal { .. })
    }

    /// Slots pushed by a pure push
    pub fn pushed_slots(&self) -> Option<u16> {
        match self {
            Instruction::LoadConstant(v) => Some(v.slots()),
            Instruction::LoadLocal { kind, .. } => Some(kind.slots()),
            _ => None,
        }
    }
}

impl<L: fmt::Display> fmt::Display for Instruction<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::LoadConstant(v) => write!(f, "{}const {}", v.kind().prefix(), v),
            Instruction::LoadLocal { kind, index } => write!(f, "{}load {}", kind.prefix(), index),
            Instruction::StoreLocal { kind, index } => write!(f, "{}store {}", kind.prefix(), index),
            Instruction::Increment { index, delta } => write!(f, "iinc {} {}", index, delta),
            Instruction::Arithmetic { op, kind } => write!(f, "{}{}", kind.prefix(), op.name()),
            Instruction::Compare(kind) => f.write_str(opcodes::mnemonic(kind.opcode())),
            Instruction::Convert { from, to } => {
                let to = match to {
                    ConvertTarget::Kind(kind) => kind.prefix(),
                    ConvertTarget::Byte => 'b',
                    ConvertTarget::Char => 'c',
                    ConvertTarget::Short => 's',
                };
                write!(f, "{}2{}", from.prefix(), to)
            }
            Instruction::Branch { condition, target } => {
                let name = match condition {
                    Condition::Zero(rel) => format!("if{}", rel.suffix()),
                    Condition::IntPair(rel) => format!("if_icmp{}", rel.suffix()),
                    _ => opcodes::mnemonic(condition.opcode()).to_string(),
                };
                write!(f, "{} -> {}", name, target)
            }
            Instruction::Jump { target } => write!(f, "goto -> {}", target),
            Instruction::Switch { default, table } => {
                match table {
                    SwitchTable::Table { low, high, .. } => write!(f, "tableswitch [{}..{}]", low, high)?,
                    SwitchTable::Lookup { pairs } => write!(f, "lookupswitch ({} cases)", pairs.len())?,
                }
                write!(f, " default -> {}", default)
            }
            Instruction::Other(opaque) => {
                f.write_str(opcodes::mnemonic(opaque.opcode))?;
                for byte in &opaque.operands {
                    write!(f, " {:#04x}", byte)?;
                }
                Ok(())
            }
        }
    }
}
