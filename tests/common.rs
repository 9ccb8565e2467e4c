// Common test utilities: instruction builders, a small reference
// interpreter and class-file builders.
#![allow(dead_code)]

use classfold::bytecode::opcodes::*;
use classfold::bytecode::{
    ArithOp, Condition, Instruction, LocalKind, MethodCode, NumericKind, Opaque, Relation, Value,
};
use classfold::classfile::defs::access::ACC_STATIC;
use classfold::classfile::{AttributeInfo, ClassFile, ClassfileWritable, CodeAttribute, Constant, MemberInfo};

pub const INT: LocalKind = LocalKind::Numeric(NumericKind::Int);

pub fn int(v: i32) -> Instruction<usize> {
    Instruction::LoadConstant(Value::Int(v))
}

pub fn load(index: u16) -> Instruction<usize> {
    Instruction::LoadLocal { kind: INT, index }
}

pub fn store(index: u16) -> Instruction<usize> {
    Instruction::StoreLocal { kind: INT, index }
}

pub fn iinc(index: u16, delta: i16) -> Instruction<usize> {
    Instruction::Increment { index, delta }
}

pub fn arith(op: ArithOp) -> Instruction<usize> {
    Instruction::Arithmetic { op, kind: NumericKind::Int }
}

pub fn if_zero(relation: Relation, target: usize) -> Instruction<usize> {
    Instruction::Branch { condition: Condition::Zero(relation), target }
}

pub fn if_icmp(relation: Relation, target: usize) -> Instruction<usize> {
    Instruction::Branch { condition: Condition::IntPair(relation), target }
}

pub fn goto(target: usize) -> Instruction<usize> {
    Instruction::Jump { target }
}

pub fn other(opcode: u8) -> Instruction<usize> {
    Instruction::Other(Opaque::new(opcode))
}

/// `getstatic #1` standing in for `System.out`
pub fn get_out() -> Instruction<usize> {
    Instruction::Other(Opaque::with_operands(GETSTATIC, vec![0, 1]))
}

/// `invokevirtual #2` standing in for `PrintStream.println(int)`
pub fn println() -> Instruction<usize> {
    Instruction::Other(Opaque::with_operands(INVOKEVIRTUAL, vec![0, 2]))
}

/// Pool matching [`get_out`] and [`println`]
pub fn print_pool() -> classfold::bytecode::LiteralPool {
    let mut pool = classfold::bytecode::LiteralPool::new();
    pool.add_member("Ljava/io/PrintStream;").unwrap();
    pool.add_member("(I)V").unwrap();
    pool
}

/// Observable behaviour of one execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Returned { value: Option<i32>, printed: Vec<i32> },
    Trapped { reason: &'static str, printed: Vec<i32> },
}

const STEP_LIMIT: usize = 100_000;

/// Execute an int-only method body with `args` in the first locals.
///
/// Understands the instruction subset used by the integration tests;
/// `getstatic` pushes a dummy receiver and `invokevirtual` prints one int.
pub fn execute(code: &MethodCode, args: &[i32]) -> Outcome {
    let mut locals = vec![0i32; 16];
    locals[..args.len()].copy_from_slice(args);
    let mut stack: Vec<i32> = Vec::new();
    let mut printed = Vec::new();
    let mut pc = 0usize;

    for _ in 0..STEP_LIMIT {
        let insn = &code.instructions[pc];
        pc += 1;
        match insn {
            Instruction::LoadConstant(Value::Int(v)) => stack.push(*v),
            Instruction::LoadLocal { index, .. } => stack.push(locals[*index as usize]),
            Instruction::StoreLocal { index, .. } => locals[*index as usize] = stack.pop().unwrap(),
            Instruction::Increment { index, delta } => {
                let slot = &mut locals[*index as usize];
                *slot = slot.wrapping_add(*delta as i32);
            }
            Instruction::Arithmetic { op, .. } => {
                if *op == ArithOp::Neg {
                    let a = stack.pop().unwrap();
                    stack.push(a.wrapping_neg());
                    continue;
                }
                let b = stack.pop().unwrap();
                let a = stack.pop().unwrap();
                let result = match op {
                    ArithOp::Add => a.wrapping_add(b),
                    ArithOp::Sub => a.wrapping_sub(b),
                    ArithOp::Mul => a.wrapping_mul(b),
                    ArithOp::Div | ArithOp::Rem if b == 0 => {
                        return Outcome::Trapped { reason: "/ by zero", printed };
                    }
                    ArithOp::Div => a.wrapping_div(b),
                    ArithOp::Rem => a.wrapping_rem(b),
                    ArithOp::Shl => a.wrapping_shl(b as u32),
                    ArithOp::Shr => a.wrapping_shr(b as u32),
                    ArithOp::Ushr => ((a as u32).wrapping_shr(b as u32)) as i32,
                    ArithOp::And => a & b,
                    ArithOp::Or => a | b,
                    ArithOp::Xor => a ^ b,
                    ArithOp::Neg => unreachable!(),
                };
                stack.push(result);
            }
            Instruction::Branch { condition, target } => {
                let taken = match condition {
                    Condition::Zero(relation) => relation.holds(stack.pop().unwrap(), 0),
                    Condition::IntPair(relation) => {
                        let b = stack.pop().unwrap();
                        let a = stack.pop().unwrap();
                        relation.holds(a, b)
                    }
                    other => panic!("unsupported condition {:?}", other),
                };
                if taken {
                    pc = *target;
                }
            }
            Instruction::Jump { target } => pc = *target,
            Instruction::Other(opaque) => match opaque.opcode {
                NOP => {}
                POP => {
                    stack.pop().unwrap();
                }
                GETSTATIC => stack.push(0),
                INVOKEVIRTUAL => {
                    printed.push(stack.pop().unwrap());
                    stack.pop().unwrap();
                }
                IRETURN => return Outcome::Returned { value: stack.pop(), printed },
                RETURN => return Outcome::Returned { value: None, printed },
                opcode => panic!("unsupported opcode {:#04x}", opcode),
            },
            other => panic!("unsupported instruction {:?}", other),
        }
    }
    panic!("step limit exceeded");
}

/// One method to place in a generated class
pub struct MethodDef<'a> {
    pub name: &'a str,
    pub descriptor: &'a str,
    pub access_flags: u16,
    pub code: Vec<u8>,
    pub max_stack: u16,
    pub max_locals: u16,
}

impl<'a> MethodDef<'a> {
    pub fn new(name: &'a str, descriptor: &'a str, code: Vec<u8>) -> Self {
        Self { name, descriptor, access_flags: ACC_STATIC, code, max_stack: 4, max_locals: 4 }
    }
}

/// Builds small class files through the library's own structures
pub struct ClassBuilder {
    pub class: ClassFile,
}

impl ClassBuilder {
    pub fn new(name: &str, major_version: u16) -> Self {
        let mut class = ClassFile::new(major_version);
        class.this_class = class.constant_pool.add_class(name).unwrap();
        class.super_class = class.constant_pool.add_class("java/lang/Object").unwrap();
        Self { class }
    }

    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> [u8; 2] {
        self.class.constant_pool.add_field_ref(class, name, descriptor).unwrap().to_be_bytes()
    }

    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> [u8; 2] {
        self.class.constant_pool.add_method_ref(class, name, descriptor).unwrap().to_be_bytes()
    }

    pub fn interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> [u8; 2] {
        let pool = &mut self.class.constant_pool;
        let owner = pool.add_class(class).unwrap();
        let name_and_type = pool.add_name_and_type(name, descriptor).unwrap();
        pool.add(Constant::InterfaceMethodRef(owner, name_and_type)).unwrap().to_be_bytes()
    }

    /// Class-level attribute with a raw body
    pub fn attribute(mut self, name: &str, info: Vec<u8>) -> Self {
        let name_index = self.class.constant_pool.add_utf8(name).unwrap();
        self.class.attributes.push(AttributeInfo::new(name_index, info));
        self
    }

    /// Pool indices for `System.out` and `PrintStream.println(I)V`
    pub fn print_refs(&mut self) -> ([u8; 2], [u8; 2]) {
        let out = self.field_ref("java/lang/System", "out", "Ljava/io/PrintStream;");
        let println = self.method_ref("java/io/PrintStream", "println", "(I)V");
        (out, println)
    }

    pub fn method(mut self, def: MethodDef<'_>) -> Self {
        let pool = &mut self.class.constant_pool;
        let name = pool.add_utf8(def.name).unwrap();
        let descriptor = pool.add_utf8(def.descriptor).unwrap();
        let code_name = pool.add_utf8("Code").unwrap();
        let table_name = pool.add_utf8("LineNumberTable").unwrap();

        let mut code = CodeAttribute::new(def.max_stack, def.max_locals, def.code);
        code.attributes.push(AttributeInfo::new(table_name, vec![0, 1, 0, 0, 0, 1]));
        let mut method = MemberInfo::new(def.access_flags, name, descriptor);
        method.attributes.push(AttributeInfo::new(code_name, code.to_classfile_bytes()));
        self.class.methods.push(method);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.class.to_bytes()
    }
}

/// Code attribute of the named method in a serialized class
pub fn method_code(bytes: &[u8], name: &str) -> CodeAttribute {
    let class = ClassFile::parse(bytes).unwrap();
    let method = class
        .methods
        .iter()
        .find(|m| m.name(&class.constant_pool) == Some(name))
        .unwrap();
    let index = method.code_index(&class.constant_pool).unwrap();
    CodeAttribute::parse(&method.attributes[index].info).unwrap()
}
