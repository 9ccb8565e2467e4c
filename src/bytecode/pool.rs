//! Constant pool access needed by the optimizer
//!
//! The optimizer never sees the pool's binary layout. It resolves the
//! numeric literal behind an `ldc`, interns newly folded literals, and looks
//! up member descriptors to compute stack effects of field and invoke
//! instructions.

use super::error::{PoolError, PoolResult};
use super::instruction::Value;

pub trait ConstantPoolAdapter {
    /// Numeric literal stored at `index`, `None` for any other entry kind
    fn resolve(&self, index: u16) -> Option<Value>;

    /// Index of an entry holding `value`, adding one if none exists yet
    fn intern(&mut self, value: Value) -> PoolResult<u16>;

    /// Descriptor of the field, method or call site referenced by `index`
    fn member_descriptor(&self, index: u16) -> Option<String>;
}

#[derive(Debug, Clone)]
enum Entry {
    Literal(Value),
    Member(String),
    /// Second slot of a long or double
    Unusable,
}

/// Minimal in-memory pool holding literals and member descriptors.
///
/// Indices start at 1 and long/double entries take two slots, matching the
/// class-file numbering so code built against it encodes identically.
#[derive(Debug, Clone, Default)]
pub struct LiteralPool {
    entries: Vec<Entry>,
}

impl LiteralPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, entry: Entry) -> PoolResult<u16> {
        let wide = matches!(entry, Entry::Literal(v) if v.slots() == 2);
        let index = self.entries.len() + 1;
        let needed = if wide { 2 } else { 1 };
        if index + needed > u16::MAX as usize {
            return Err(PoolError::OutOfSpace);
        }
        self.entries.push(entry);
        if wide {
            self.entries.push(Entry::Unusable);
        }
        Ok(index as u16)
    }

    /// Add a member descriptor (e.g. `"(I)V"`) and return its index
    pub fn add_member(&mut self, descriptor: &str) -> PoolResult<u16> {
        self.push(Entry::Member(descriptor.to_string()))
    }

    /// Add a literal without de-duplication
    pub fn add_literal(&mut self, value: Value) -> PoolResult<u16> {
        self.push(Entry::Literal(value))
    }

    /// Number of slots in use, counting both halves of wide entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, index: u16) -> Option<&Entry> {
        (index as usize).checked_sub(1).and_then(|i| self.entries.get(i))
    }
}

impl ConstantPoolAdapter for LiteralPool {
    fn resolve(&self, index: u16) -> Option<Value> {
        match self.entry(index) {
            Some(Entry::Literal(value)) => Some(*value),
            _ => None,
        }
    }

    fn intern(&mut self, value: Value) -> PoolResult<u16> {
        let existing = self
            .entries
            .iter()
            .position(|e| matches!(e, Entry::Literal(v) if v.identical(&value)));
        match existing {
            Some(i) => Ok((i + 1) as u16),
            None => self.add_literal(value),
        }
    }

    fn member_descriptor(&self, index: u16) -> Option<String> {
        match self.entry(index) {
            Some(Entry::Member(descriptor)) => Some(descriptor.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_literals_take_two_slots() {
        let mut pool = LiteralPool::new();
        let long = pool.intern(Value::Long(1 << 40)).unwrap();
        let int = pool.intern(Value::Int(100_000)).unwrap();
        assert_eq!(long, 1);
        assert_eq!(int, 3);
        assert_eq!(pool.resolve(2), None);
        assert_eq!(pool.resolve(3), Some(Value::Int(100_000)));
    }

    #[test]
    fn test_intern_deduplicates_by_bits() {
        let mut pool = LiteralPool::new();
        let a = pool.intern(Value::Double(0.5)).unwrap();
        let b = pool.intern(Value::Double(0.5)).unwrap();
        let c = pool.intern(Value::Double(-0.0)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_member_lookup() {
        let mut pool = LiteralPool::new();
        let index = pool.add_member("(I)V").unwrap();
        assert_eq!(pool.member_descriptor(index).as_deref(), Some("(I)V"));
        assert_eq!(pool.resolve(index), None);
        assert_eq!(pool.member_descriptor(0), None);
    }
}
