//! Constant pool of a parsed class file

use super::error::{ClassFormatError, ClassFormatResult};
use super::reader::ByteReader;
use crate::bytecode::error::{PoolError, PoolResult};
use crate::bytecode::{ConstantPoolAdapter, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    Dynamic(u16, u16),
    InvokeDynamic(u16, u16),
    Module(u16),
    Package(u16),
    /// Slot after a `Long` or `Double`; never written
    Unusable,
}

pub(crate) mod constant_tags {
    pub const CONSTANT_UTF8: u8 = 1;
    pub const CONSTANT_INTEGER: u8 = 3;
    pub const CONSTANT_FLOAT: u8 = 4;
    pub const CONSTANT_LONG: u8 = 5;
    pub const CONSTANT_DOUBLE: u8 = 6;
    pub const CONSTANT_CLASS: u8 = 7;
    pub const CONSTANT_STRING: u8 = 8;
    pub const CONSTANT_FIELDREF: u8 = 9;
    pub const CONSTANT_METHODREF: u8 = 10;
    pub const CONSTANT_INTERFACEMETHODREF: u8 = 11;
    pub const CONSTANT_NAMEANDTYPE: u8 = 12;
    pub const CONSTANT_METHODHANDLE: u8 = 15;
    pub const CONSTANT_METHODTYPE: u8 = 16;
    pub const CONSTANT_DYNAMIC: u8 = 17;
    pub const CONSTANT_INVOKEDYNAMIC: u8 = 18;
    pub const CONSTANT_MODULE: u8 = 19;
    pub const CONSTANT_PACKAGE: u8 = 20;
}

impl Constant {
    /// Long and double constants occupy two pool slots
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }

    /// Equality that compares floating-point literals by bit pattern
    fn same(&self, other: &Constant) -> bool {
        match (self, other) {
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::Double(a), Constant::Double(b)) => a.to_bits() == b.to_bits(),
            (Constant::Unusable, _) | (_, Constant::Unusable) => false,
            _ => self == other,
        }
    }

    fn parse(reader: &mut ByteReader<'_>, index: u16) -> ClassFormatResult<Self> {
        use constant_tags::*;
        let tag = reader.u8()?;
        let constant = match tag {
            CONSTANT_UTF8 => {
                let length = reader.u16()? as usize;
                let bytes = reader.take(length)?;
                Constant::Utf8(decode_modified_utf8(bytes).ok_or(ClassFormatError::BadUtf8 { index })?)
            }
            CONSTANT_INTEGER => Constant::Integer(reader.i32()?),
            CONSTANT_FLOAT => Constant::Float(reader.f32()?),
            CONSTANT_LONG => Constant::Long(reader.i64()?),
            CONSTANT_DOUBLE => Constant::Double(reader.f64()?),
            CONSTANT_CLASS => Constant::Class(reader.u16()?),
            CONSTANT_STRING => Constant::String(reader.u16()?),
            CONSTANT_FIELDREF => Constant::FieldRef(reader.u16()?, reader.u16()?),
            CONSTANT_METHODREF => Constant::MethodRef(reader.u16()?, reader.u16()?),
            CONSTANT_INTERFACEMETHODREF => Constant::InterfaceMethodRef(reader.u16()?, reader.u16()?),
            CONSTANT_NAMEANDTYPE => Constant::NameAndType(reader.u16()?, reader.u16()?),
            CONSTANT_METHODHANDLE => Constant::MethodHandle(reader.u8()?, reader.u16()?),
            CONSTANT_METHODTYPE => Constant::MethodType(reader.u16()?),
            CONSTANT_DYNAMIC => Constant::Dynamic(reader.u16()?, reader.u16()?),
            CONSTANT_INVOKEDYNAMIC => Constant::InvokeDynamic(reader.u16()?, reader.u16()?),
            CONSTANT_MODULE => Constant::Module(reader.u16()?),
            CONSTANT_PACKAGE => Constant::Package(reader.u16()?),
            _ => return Err(ClassFormatError::BadConstantTag { tag, index }),
        };
        Ok(constant)
    }
}

/// Decode the JVM's modified UTF-8 (encoded NUL, surrogate pairs as two
/// three-byte sequences)
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let (unit, width) = match b {
            0x01..=0x7F => (b as u16, 1),
            0xC0..=0xDF => {
                let b1 = *bytes.get(i + 1)?;
                (((b as u16 & 0x1F) << 6) | (b1 as u16 & 0x3F), 2)
            }
            0xE0..=0xEF => {
                let b1 = *bytes.get(i + 1)?;
                let b2 = *bytes.get(i + 2)?;
                (((b as u16 & 0x0F) << 12) | ((b1 as u16 & 0x3F) << 6) | (b2 as u16 & 0x3F), 3)
            }
            _ => return None,
        };
        units.push(unit);
        i += width;
    }
    String::from_utf16(&units).ok()
}

pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => bytes.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                bytes.push(0xC0 | (unit >> 6) as u8);
                bytes.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                bytes.push(0xE0 | (unit >> 12) as u8);
                bytes.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                bytes.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    bytes
}

/// Pool entries in index order; entry `i` of `constants` has index `i + 1`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantPool {
    pub(crate) constants: Vec<Constant>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(reader: &mut ByteReader<'_>) -> ClassFormatResult<Self> {
        let count = reader.u16()?;
        let mut constants = Vec::with_capacity(count as usize);
        let mut index = 1u16;
        while index < count {
            let constant = Constant::parse(reader, index)?;
            let wide = constant.is_wide();
            constants.push(constant);
            index += 1;
            if wide {
                constants.push(Constant::Unusable);
                index += 1;
            }
        }
        Ok(Self { constants })
    }

    /// Value written as `constant_pool_count`
    pub fn count(&self) -> u16 {
        (self.constants.len() + 1) as u16
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        let slot = usize::from(index).checked_sub(1)?;
        self.constants.get(slot).filter(|c| **c != Constant::Unusable)
    }

    pub fn utf8(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            Constant::Utf8(value) => Some(value),
            _ => None,
        }
    }

    pub fn class_name(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            _ => None,
        }
    }

    /// Add a constant, reusing an identical existing entry
    pub fn add(&mut self, constant: Constant) -> PoolResult<u16> {
        if let Some(slot) = self.constants.iter().position(|c| c.same(&constant)) {
            return Ok(slot as u16 + 1);
        }
        let needed = if constant.is_wide() { 2 } else { 1 };
        if self.constants.len() + needed > usize::from(u16::MAX) - 1 {
            return Err(PoolError::OutOfSpace);
        }
        let wide = constant.is_wide();
        self.constants.push(constant);
        let index = self.constants.len() as u16;
        if wide {
            self.constants.push(Constant::Unusable);
        }
        Ok(index)
    }

    pub fn add_utf8(&mut self, value: &str) -> PoolResult<u16> {
        self.add(Constant::Utf8(value.to_string()))
    }

    pub fn add_class(&mut self, name: &str) -> PoolResult<u16> {
        let name_index = self.add_utf8(name)?;
        self.add(Constant::Class(name_index))
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> PoolResult<u16> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.add(Constant::NameAndType(name_index, descriptor_index))
    }

    pub fn add_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> PoolResult<u16> {
        let class_index = self.add_class(class)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::FieldRef(class_index, name_and_type_index))
    }

    pub fn add_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> PoolResult<u16> {
        let class_index = self.add_class(class)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::MethodRef(class_index, name_and_type_index))
    }

    pub fn add_string(&mut self, value: &str) -> PoolResult<u16> {
        let utf8_index = self.add_utf8(value)?;
        self.add(Constant::String(utf8_index))
    }

    /// True when the pool holds constants that require class version 51 or later
    pub fn has_dynamic_constants(&self) -> bool {
        self.constants.iter().any(|c| {
            matches!(
                c,
                Constant::MethodHandle(..) | Constant::MethodType(_) | Constant::Dynamic(..) | Constant::InvokeDynamic(..)
            )
        })
    }

    /// True when the pool names modules or packages (class version 53 or later)
    pub fn has_module_constants(&self) -> bool {
        self.constants.iter().any(|c| matches!(c, Constant::Module(_) | Constant::Package(_)))
    }

    /// True when `index` is an `InterfaceMethodRef`
    pub fn is_interface_method_ref(&self, index: u16) -> bool {
        matches!(self.get(index), Some(Constant::InterfaceMethodRef(..)))
    }
}

impl ConstantPoolAdapter for ConstantPool {
    fn resolve(&self, index: u16) -> Option<Value> {
        match self.get(index)? {
            Constant::Integer(v) => Some(Value::Int(*v)),
            Constant::Float(v) => Some(Value::Float(*v)),
            Constant::Long(v) => Some(Value::Long(*v)),
            Constant::Double(v) => Some(Value::Double(*v)),
            _ => None,
        }
    }

    fn intern(&mut self, value: Value) -> PoolResult<u16> {
        let constant = match value {
            Value::Int(v) => Constant::Integer(v),
            Value::Float(v) => Constant::Float(v),
            Value::Long(v) => Constant::Long(v),
            Value::Double(v) => Constant::Double(v),
        };
        self.add(constant)
    }

    fn member_descriptor(&self, index: u16) -> Option<String> {
        let name_and_type = match self.get(index)? {
            Constant::FieldRef(_, nt)
            | Constant::MethodRef(_, nt)
            | Constant::InterfaceMethodRef(_, nt)
            | Constant::InvokeDynamic(_, nt)
            | Constant::Dynamic(_, nt) => *nt,
            _ => return None,
        };
        match self.get(name_and_type)? {
            Constant::NameAndType(_, descriptor) => self.utf8(*descriptor).map(str::to_string),
            _ => None,
        }
    }
}
