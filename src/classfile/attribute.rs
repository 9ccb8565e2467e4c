//! Attributes, with the `Code` attribute parsed out

use super::constpool::ConstantPool;
use super::error::{ClassFormatError, ClassFormatResult};
use super::reader::ByteReader;
use crate::bytecode::ExceptionEntry;

/// An attribute kept as its raw payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl AttributeInfo {
    pub fn new(name_index: u16, info: Vec<u8>) -> Self {
        Self { name_index, info }
    }

    pub fn parse(reader: &mut ByteReader<'_>) -> ClassFormatResult<Self> {
        let name_index = reader.u16()?;
        let length = reader.u32()? as usize;
        let info = reader.take(length)?.to_vec();
        Ok(Self { name_index, info })
    }

    pub fn parse_list(reader: &mut ByteReader<'_>) -> ClassFormatResult<Vec<Self>> {
        let count = reader.u16()?;
        (0..count).map(|_| Self::parse(reader)).collect()
    }

    pub fn name<'p>(&self, pool: &'p ConstantPool) -> Option<&'p str> {
        pool.utf8(self.name_index)
    }

    pub fn is_named(&self, pool: &ConstantPool, name: &str) -> bool {
        self.name(pool) == Some(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionEntry>,
    pub attributes: Vec<AttributeInfo>,
}

impl CodeAttribute {
    pub fn new(max_stack: u16, max_locals: u16, code: Vec<u8>) -> Self {
        Self {
            max_stack,
            max_locals,
            code,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Parse the payload of a `Code` attribute
    pub fn parse(info: &[u8]) -> ClassFormatResult<Self> {
        let mut reader = ByteReader::new(info);
        let max_stack = reader.u16()?;
        let max_locals = reader.u16()?;
        let code_length = reader.u32()? as usize;
        if code_length == 0 {
            return Err(ClassFormatError::bad_code("empty code array"));
        }
        let code = reader.take(code_length)?.to_vec();
        let entries = reader.u16()?;
        let mut exception_table = Vec::with_capacity(entries as usize);
        for _ in 0..entries {
            exception_table.push(ExceptionEntry::new(reader.u16()?, reader.u16()?, reader.u16()?, reader.u16()?));
        }
        let attributes = AttributeInfo::parse_list(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(ClassFormatError::bad_code(format!("{} byte(s) past the last attribute", reader.remaining())));
        }
        Ok(Self { max_stack, max_locals, code, exception_table, attributes })
    }

    /// Drop nested attributes whose names appear in `names`
    pub fn strip(&mut self, pool: &ConstantPool, names: &[&str]) -> usize {
        let before = self.attributes.len();
        self.attributes.retain(|a| !a.name(pool).map_or(false, |n| names.contains(&n)));
        before - self.attributes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::writer::ClassfileWritable;

    #[test]
    fn test_code_attribute_roundtrip() {
        let mut code = CodeAttribute::new(2, 3, vec![0x04, 0x3C, 0xB1]);
        code.exception_table.push(ExceptionEntry::new(0, 2, 2, 0));
        code.attributes.push(AttributeInfo::new(9, vec![0, 0]));
        let bytes = code.to_classfile_bytes();
        assert_eq!(CodeAttribute::parse(&bytes), Ok(code));
    }

    #[test]
    fn test_strip_by_name() {
        let mut pool = ConstantPool::new();
        let lines = pool.add_utf8("LineNumberTable").unwrap();
        let other = pool.add_utf8("Custom").unwrap();
        let mut code = CodeAttribute::new(0, 0, vec![0xB1]);
        code.attributes.push(AttributeInfo::new(lines, vec![0, 0]));
        code.attributes.push(AttributeInfo::new(other, vec![]));
        assert_eq!(code.strip(&pool, &["LineNumberTable"]), 1);
        assert_eq!(code.attributes, vec![AttributeInfo::new(other, vec![])]);
    }

    #[test]
    fn test_empty_code_rejected() {
        let bytes = CodeAttribute::new(0, 0, Vec::new()).to_classfile_bytes();
        assert!(matches!(CodeAttribute::parse(&bytes), Err(ClassFormatError::BadCode { .. })));
    }
}
