//! Method bodies as ordered instruction lists

use std::fmt;

use super::instruction::Instruction;

/// Exception table entry as stored in a `Code` attribute (byte offsets)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

impl ExceptionEntry {
    pub fn new(start_pc: u16, end_pc: u16, handler_pc: u16, catch_type: u16) -> Self {
        Self { start_pc, end_pc, handler_pc, catch_type }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8);
        bytes.extend_from_slice(&self.start_pc.to_be_bytes());
        bytes.extend_from_slice(&self.end_pc.to_be_bytes());
        bytes.extend_from_slice(&self.handler_pc.to_be_bytes());
        bytes.extend_from_slice(&self.catch_type.to_be_bytes());
        bytes
    }
}

/// Protected range `[start, end)` with its handler entry, in instruction indices.
///
/// `end` may equal the instruction count, meaning the range runs to the end
/// of the method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start: usize,
    pub end: usize,
    pub handler: usize,
    pub catch_type: u16,
}

/// One decoded method body: instructions with index targets plus sizing
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCode {
    pub instructions: Vec<Instruction<usize>>,
    pub handlers: Vec<ExceptionHandler>,
    /// `max_stack` declared by the method as read
    pub max_stack: u16,
    /// `max_locals` declared by the method as read
    pub max_locals: u16,
    /// Slots taken by `this` and the declared parameters
    pub parameter_slots: u16,
}

impl MethodCode {
    pub fn new(instructions: Vec<Instruction<usize>>) -> Self {
        Self {
            instructions,
            handlers: Vec::new(),
            max_stack: 0,
            max_locals: 0,
            parameter_slots: 0,
        }
    }

    pub fn with_limits(mut self, max_stack: u16, max_locals: u16, parameter_slots: u16) -> Self {
        self.max_stack = max_stack;
        self.max_locals = max_locals;
        self.parameter_slots = parameter_slots;
        self
    }

    pub fn with_handler(mut self, handler: ExceptionHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// True when both bodies hold the same instructions and handlers
    pub fn same_body(&self, other: &MethodCode) -> bool {
        self.instructions == other.instructions && self.handlers == other.handlers
    }
}

impl fmt::Display for MethodCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, insn) in self.instructions.iter().enumerate() {
            writeln!(f, "{:>5}: {}", index, insn)?;
        }
        for handler in &self.handlers {
            writeln!(
                f,
                "  try [{}, {}) -> {} catch #{}",
                handler.start, handler.end, handler.handler, handler.catch_type
            )?;
        }
        Ok(())
    }
}
