//! Optimizing every method of a parsed class

use log::{debug, info, warn};
use thiserror::Error;

use super::attribute::CodeAttribute;
use super::constpool::ConstantPool;
use super::defs::attribute_names::{OFFSET_DEPENDENT, VERSION_BOUND};
use super::defs::STATIC_INITIALIZER_METHOD_NAME;
use super::error::ClassFormatError;
use super::member::MethodInfo;
use super::writer::ClassfileWritable;
use super::ClassFile;
use crate::bytecode::descriptor::method_shape;
use crate::bytecode::opcodes::{INVOKESPECIAL, INVOKESTATIC};
use crate::bytecode::{decode, encode, Instruction};
use crate::config::{Config, MAX_TARGET_MAJOR_VERSION};
use crate::error::Result;
use crate::optimizer::{optimize_or_original, OptimizeStats};

/// What happened to one class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassReport {
    /// Methods with a `Code` attribute
    pub methods: usize,
    pub methods_changed: usize,
    /// Methods left as read because they could not be decoded or re-encoded
    pub methods_skipped: usize,
    /// Original major version when it was lowered
    pub lowered_from: Option<u16>,
    /// The class was left untouched because its version cannot be lowered
    pub passed_through: bool,
}

impl ClassReport {
    pub fn changed(&self) -> bool {
        self.methods_changed > 0
    }
}

/// Why a class cannot be rewritten at the configured target version
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoweringBlocker {
    #[error("version {0} needs stack map frames, which rewritten methods do not carry")]
    StackMapsRequired(u16),
    #[error("the constant pool holds method handles or dynamic constants")]
    DynamicConstants,
    #[error("the constant pool names modules or packages")]
    ModuleConstants,
    #[error("the {0} attribute has no meaning at the target version")]
    ClassAttribute(String),
    #[error("interface methods have bodies")]
    InterfaceBodies,
    #[error("an interface method is called with invokestatic or invokespecial")]
    InterfaceMethodCall,
    #[error("a method body could not be decoded")]
    UndecodableMethod,
}

impl ClassFile {
    /// The first reason this class would be invalid once rewritten at `target`.
    ///
    /// Rewritten methods carry no stack map frames, so the resulting version
    /// must be one the JVM verifies by type inference. Classes newer than
    /// `target` must also use nothing their version introduced.
    pub fn lowering_blocker(&self, target: u16) -> Option<LoweringBlocker> {
        let resulting = self.major_version.min(target);
        if resulting > MAX_TARGET_MAJOR_VERSION {
            return Some(LoweringBlocker::StackMapsRequired(resulting));
        }
        if self.major_version <= target {
            return None;
        }

        let pool = &self.constant_pool;
        if pool.has_dynamic_constants() {
            return Some(LoweringBlocker::DynamicConstants);
        }
        if pool.has_module_constants() {
            return Some(LoweringBlocker::ModuleConstants);
        }
        if let Some(name) = self
            .attributes
            .iter()
            .filter_map(|a| a.name(pool))
            .find(|name| VERSION_BOUND.contains(name))
        {
            return Some(LoweringBlocker::ClassAttribute(name.to_string()));
        }
        if self.is_interface()
            && self
                .methods
                .iter()
                .any(|m| m.has_body() && m.name(pool) != Some(STATIC_INITIALIZER_METHOD_NAME))
        {
            return Some(LoweringBlocker::InterfaceBodies);
        }

        for method in &self.methods {
            let Some(index) = method.code_index(pool) else {
                continue;
            };
            let body = CodeAttribute::parse(&method.attributes[index].info)
                .ok()
                .and_then(|code| decode(&code.code, &code.exception_table, pool).ok());
            let Some(body) = body else {
                return Some(LoweringBlocker::UndecodableMethod);
            };
            if body.instructions.iter().any(|insn| calls_interface_method(insn, pool)) {
                return Some(LoweringBlocker::InterfaceMethodCall);
            }
        }
        None
    }

    /// Whether this class stays valid when rewritten at `target`
    pub fn can_lower_version(&self, target: u16) -> bool {
        self.lowering_blocker(target).is_none()
    }

    /// Optimize every method body in place.
    ///
    /// Methods that fail are kept as read. When anything changed, offset
    /// dependent `Code` attributes of the rewritten methods are dropped and
    /// the class version is lowered to `config.target_major_version`.
    pub fn optimize(&mut self, config: &Config) -> ClassReport {
        let class_name = self.name().unwrap_or("<unnamed>").to_string();
        let mut report = ClassReport::default();
        if let Some(blocker) = self.lowering_blocker(config.target_major_version) {
            warn!(
                "{}: version {} cannot be rewritten at {}: {}, class left unchanged",
                class_name, self.major_version, config.target_major_version, blocker
            );
            report.passed_through = true;
            return report;
        }

        for method in &mut self.methods {
            let Some(code_index) = method.code_index(&self.constant_pool) else {
                continue;
            };
            report.methods += 1;
            let method_name = format!(
                "{}.{}{}",
                class_name,
                method.name(&self.constant_pool).unwrap_or("?"),
                method.descriptor(&self.constant_pool).unwrap_or("")
            );
            match optimize_method(&mut self.constant_pool, method, code_index, config) {
                Ok(Some(stats)) => {
                    report.methods_changed += 1;
                    info!(
                        "{}: folded {}, propagated {}, pruned {} branch(es), removed {} store(s)",
                        method_name,
                        stats.fold.folded,
                        stats.fold.propagated,
                        stats.fold.branches_pruned,
                        stats.dead_stores.stores_removed + stats.dead_stores.stores_popped
                    );
                }
                Ok(None) => debug!("{}: unchanged", method_name),
                Err(err) => {
                    report.methods_skipped += 1;
                    warn!("{}: left unoptimized: {}", method_name, err);
                }
            }
        }

        if report.changed() && self.major_version > config.target_major_version {
            report.lowered_from = Some(self.major_version);
            self.major_version = config.target_major_version;
            self.minor_version = 0;
        }
        report
    }
}

/// `invokestatic` and `invokespecial` may only name an `InterfaceMethodRef` from version 52
fn calls_interface_method<L>(insn: &Instruction<L>, pool: &ConstantPool) -> bool {
    match insn {
        Instruction::Other(opaque) if matches!(opaque.opcode, INVOKESTATIC | INVOKESPECIAL) => {
            opaque.pool_index().is_some_and(|index| pool.is_interface_method_ref(index))
        }
        _ => false,
    }
}

/// Rewrite one method's `Code` attribute. Returns `None` when the body is unchanged.
fn optimize_method(
    pool: &mut ConstantPool,
    method: &mut MethodInfo,
    code_index: usize,
    config: &Config,
) -> Result<Option<OptimizeStats>> {
    let attribute = &method.attributes[code_index];
    let mut code = CodeAttribute::parse(&attribute.info)?;
    let descriptor = method
        .descriptor(pool)
        .ok_or(ClassFormatError::BadConstantIndex(method.descriptor_index))?;
    let shape = method_shape(descriptor).ok_or(ClassFormatError::BadConstantIndex(method.descriptor_index))?;
    let receiver = if method.is_static() { 0 } else { 1 };

    let body = decode(&code.code, &code.exception_table, &*pool)?.with_limits(
        code.max_stack,
        code.max_locals,
        shape.parameter_slots + receiver,
    );
    let optimized = optimize_or_original(&body, &*pool, config);
    if !optimized.changed {
        return Ok(None);
    }

    let encoded = encode(&optimized.code, &mut *pool)?;
    code.max_stack = optimized.code.max_stack;
    code.max_locals = optimized.code.max_locals;
    code.code = encoded.code;
    code.exception_table = encoded.exception_table;
    code.strip(pool, &OFFSET_DEPENDENT);

    method.attributes[code_index].info = code.to_classfile_bytes();
    Ok(Some(optimized.stats))
}
