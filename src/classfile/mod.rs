//! Class-file framing
//!
//! Parses a class file far enough to reach each method's `Code` attribute.
//! Everything else (fields, other attributes, unknown constants) is kept as
//! read and written back unchanged.

pub mod attribute;
pub mod constpool;
pub mod defs;
pub mod error;
pub mod member;
pub mod reader;
pub mod rewrite;
pub mod writer;

pub use attribute::{AttributeInfo, CodeAttribute};
pub use constpool::{Constant, ConstantPool};
pub use error::{ClassFormatError, ClassFormatResult};
pub use member::{FieldInfo, MemberInfo, MethodInfo};
pub use reader::ByteReader;
pub use rewrite::{ClassReport, LoweringBlocker};
pub use writer::ClassfileWritable;

use defs::access::ACC_INTERFACE;
use defs::MAGIC;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub magic: u32,
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<AttributeInfo>,
}

impl ClassFile {
    /// An empty class with the given version, for building classes in code
    pub fn new(major_version: u16) -> Self {
        Self {
            magic: MAGIC,
            minor_version: 0,
            major_version,
            constant_pool: ConstantPool::new(),
            access_flags: 0,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn parse(bytes: &[u8]) -> ClassFormatResult<Self> {
        let mut reader = ByteReader::new(bytes);
        let magic = reader.u32()?;
        if magic != MAGIC {
            return Err(ClassFormatError::BadMagic(magic));
        }
        let minor_version = reader.u16()?;
        let major_version = reader.u16()?;
        let constant_pool = ConstantPool::parse(&mut reader)?;
        let access_flags = reader.u16()?;
        let this_class = reader.u16()?;
        let super_class = reader.u16()?;
        let interface_count = reader.u16()?;
        let interfaces = (0..interface_count).map(|_| reader.u16()).collect::<ClassFormatResult<Vec<_>>>()?;
        let fields = MemberInfo::parse_list(&mut reader)?;
        let methods = MemberInfo::parse_list(&mut reader)?;
        let attributes = AttributeInfo::parse_list(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(ClassFormatError::TrailingBytes(reader.remaining()));
        }
        Ok(Self {
            magic,
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_classfile_bytes()
    }

    /// Internal name of this class, e.g. `com/example/Main`
    pub fn name(&self) -> Option<&str> {
        self.constant_pool.class_name(self.this_class)
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }
}
