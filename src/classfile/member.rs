//! Fields and methods

use super::attribute::AttributeInfo;
use super::constpool::ConstantPool;
use super::defs::access::{ACC_ABSTRACT, ACC_NATIVE, ACC_STATIC};
use super::defs::attribute_names::CODE;
use super::reader::ByteReader;
use super::error::ClassFormatResult;

/// A `field_info` or `method_info` structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

impl MemberInfo {
    pub fn new(access_flags: u16, name_index: u16, descriptor_index: u16) -> Self {
        Self { access_flags, name_index, descriptor_index, attributes: Vec::new() }
    }

    pub fn parse(reader: &mut ByteReader<'_>) -> ClassFormatResult<Self> {
        Ok(Self {
            access_flags: reader.u16()?,
            name_index: reader.u16()?,
            descriptor_index: reader.u16()?,
            attributes: AttributeInfo::parse_list(reader)?,
        })
    }

    pub fn parse_list(reader: &mut ByteReader<'_>) -> ClassFormatResult<Vec<Self>> {
        let count = reader.u16()?;
        (0..count).map(|_| Self::parse(reader)).collect()
    }

    pub fn name<'p>(&self, pool: &'p ConstantPool) -> Option<&'p str> {
        pool.utf8(self.name_index)
    }

    pub fn descriptor<'p>(&self, pool: &'p ConstantPool) -> Option<&'p str> {
        pool.utf8(self.descriptor_index)
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    /// Abstract and native methods carry no bytecode
    pub fn has_body(&self) -> bool {
        self.access_flags & (ACC_ABSTRACT | ACC_NATIVE) == 0
    }

    /// Position of the `Code` attribute among this member's attributes
    pub fn code_index(&self, pool: &ConstantPool) -> Option<usize> {
        self.attributes.iter().position(|a| a.is_named(pool, CODE))
    }
}

pub type FieldInfo = MemberInfo;
pub type MethodInfo = MemberInfo;
