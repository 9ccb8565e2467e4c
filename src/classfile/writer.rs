//! Trait-based serialization for classfile structures

use std::io::Write;

use super::attribute::{AttributeInfo, CodeAttribute};
use super::constpool::{constant_tags::*, encode_modified_utf8, Constant, ConstantPool};
use super::member::MemberInfo;
use super::ClassFile;

/// An object which can be written into a classfile.
pub trait ClassfileWritable {
    /// Writes the bytes of this object into the given buffer.
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()>;

    /// Writes the bytes of this object into a newly created buffer.
    fn to_classfile_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_to_classfile(&mut buffer);
        buffer
    }
}

fn write_u16<W: Write>(buffer: &mut W, value: u16) -> std::io::Result<()> {
    buffer.write_all(&value.to_be_bytes())
}

fn write_list<W: Write, T: ClassfileWritable>(buffer: &mut W, items: &[T]) -> std::io::Result<()> {
    write_u16(buffer, items.len() as u16)?;
    for item in items {
        item.write_to_classfile(buffer)?;
    }
    Ok(())
}

impl ClassfileWritable for ClassFile {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        buffer.write_all(&self.magic.to_be_bytes())?;
        write_u16(buffer, self.minor_version)?;
        write_u16(buffer, self.major_version)?;
        self.constant_pool.write_to_classfile(buffer)?;
        write_u16(buffer, self.access_flags)?;
        write_u16(buffer, self.this_class)?;
        write_u16(buffer, self.super_class)?;
        write_u16(buffer, self.interfaces.len() as u16)?;
        for interface in &self.interfaces {
            write_u16(buffer, *interface)?;
        }
        write_list(buffer, &self.fields)?;
        write_list(buffer, &self.methods)?;
        write_list(buffer, &self.attributes)
    }
}

impl ClassfileWritable for ConstantPool {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        write_u16(buffer, self.count())?;
        for constant in &self.constants {
            constant.write_to_classfile(buffer)?;
        }
        Ok(())
    }
}

impl ClassfileWritable for Constant {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        use Constant::*;

        let pair = |buffer: &mut W, tag: u8, a: u16, b: u16| -> std::io::Result<()> {
            buffer.write_all(&[tag])?;
            write_u16(buffer, a)?;
            write_u16(buffer, b)
        };
        let single = |buffer: &mut W, tag: u8, a: u16| -> std::io::Result<()> {
            buffer.write_all(&[tag])?;
            write_u16(buffer, a)
        };

        match self {
            Utf8(value) => {
                let bytes = encode_modified_utf8(value);
                buffer.write_all(&[CONSTANT_UTF8])?;
                write_u16(buffer, bytes.len() as u16)?;
                buffer.write_all(&bytes)
            }
            Integer(value) => {
                buffer.write_all(&[CONSTANT_INTEGER])?;
                buffer.write_all(&value.to_be_bytes())
            }
            Float(value) => {
                buffer.write_all(&[CONSTANT_FLOAT])?;
                buffer.write_all(&value.to_bits().to_be_bytes())
            }
            Long(value) => {
                buffer.write_all(&[CONSTANT_LONG])?;
                buffer.write_all(&value.to_be_bytes())
            }
            Double(value) => {
                buffer.write_all(&[CONSTANT_DOUBLE])?;
                buffer.write_all(&value.to_bits().to_be_bytes())
            }
            Class(name_index) => single(buffer, CONSTANT_CLASS, *name_index),
            String(string_index) => single(buffer, CONSTANT_STRING, *string_index),
            FieldRef(class, nt) => pair(buffer, CONSTANT_FIELDREF, *class, *nt),
            MethodRef(class, nt) => pair(buffer, CONSTANT_METHODREF, *class, *nt),
            InterfaceMethodRef(class, nt) => pair(buffer, CONSTANT_INTERFACEMETHODREF, *class, *nt),
            NameAndType(name, descriptor) => pair(buffer, CONSTANT_NAMEANDTYPE, *name, *descriptor),
            MethodHandle(reference_kind, reference_index) => {
                buffer.write_all(&[CONSTANT_METHODHANDLE, *reference_kind])?;
                write_u16(buffer, *reference_index)
            }
            MethodType(descriptor_index) => single(buffer, CONSTANT_METHODTYPE, *descriptor_index),
            Dynamic(bootstrap, nt) => pair(buffer, CONSTANT_DYNAMIC, *bootstrap, *nt),
            InvokeDynamic(bootstrap, nt) => pair(buffer, CONSTANT_INVOKEDYNAMIC, *bootstrap, *nt),
            Module(name_index) => single(buffer, CONSTANT_MODULE, *name_index),
            Package(name_index) => single(buffer, CONSTANT_PACKAGE, *name_index),
            Unusable => Ok(()),
        }
    }
}

impl ClassfileWritable for MemberInfo {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        write_u16(buffer, self.access_flags)?;
        write_u16(buffer, self.name_index)?;
        write_u16(buffer, self.descriptor_index)?;
        write_list(buffer, &self.attributes)
    }
}

impl ClassfileWritable for AttributeInfo {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        write_u16(buffer, self.name_index)?;
        buffer.write_all(&(self.info.len() as u32).to_be_bytes())?;
        buffer.write_all(&self.info)
    }
}

/// Writes the `Code` payload, without the enclosing name and length
impl ClassfileWritable for CodeAttribute {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        write_u16(buffer, self.max_stack)?;
        write_u16(buffer, self.max_locals)?;
        buffer.write_all(&(self.code.len() as u32).to_be_bytes())?;
        buffer.write_all(&self.code)?;
        write_u16(buffer, self.exception_table.len() as u16)?;
        for entry in &self.exception_table {
            buffer.write_all(&entry.to_bytes())?;
        }
        write_list(buffer, &self.attributes)
    }
}
