//! Abstract interpreter: constant folding, propagation and branch pruning
//!
//! One forward walk over the stream in position order. The simulated operand
//! stack holds one [`Slot`] per value, each remembering the node that pushed
//! it (its pending load site) so a fold can delete the producers and rewrite
//! the consuming instruction into a single constant load.
//!
//! Control-flow merges are handled conservatively:
//!
//! - at a join point the local table is the intersection of the fall-through
//!   state and every forward-edge state recorded when the branches to it were
//!   visited, and the stack is reset to an unknown floor
//! - a loop head additionally forgets every local the loop writes
//! - an exception handler entry forgets all locals
//! - opaque instructions reset the stack to the unknown floor

use std::collections::HashMap;

use log::{debug, warn};

use super::error::{OptimizeError, OptimizeResult};
use super::eval::{self, EvalError};
use super::list::{InstructionList, NodeId};
use super::loops::LoopBounds;
use crate::bytecode::opcodes::{JSR, JSR_W, RET};
use crate::bytecode::{
    ArithOp, CompareKind, Condition, ConvertTarget, Instruction, LocalKind, NumericKind, Opaque, Value,
};

/// One simulated stack value
#[derive(Debug, Clone, Copy, PartialEq)]
struct Slot {
    /// Compile-time value, `None` when unknown
    value: Option<Value>,
    /// Node that pushed the value and may be deleted when it is condensed
    site: Option<NodeId>,
}

impl Slot {
    const UNKNOWN: Slot = Slot { value: None, site: None };
}

type Locals = HashMap<u16, Value>;

/// Per-method interpreter state, created fresh for every method
#[derive(Debug, Default)]
pub struct MethodContext {
    stack: Vec<Slot>,
    /// Values below the tracked stack exist but are unknown
    floor: bool,
    locals: Locals,
    /// The next arithmetic, comparison, conversion or branch must not fold
    blocked: bool,
    /// Jumps that skip an else arm whose condition folded to fall-through
    pending_else: Vec<NodeId>,
    /// Local tables recorded on forward edges, keyed by target
    snapshots: HashMap<NodeId, Vec<Locals>>,
    /// Control can fall through into the next node
    reachable: bool,
}

impl MethodContext {
    pub fn new() -> Self {
        Self { reachable: true, ..Self::default() }
    }

    fn push(&mut self, slot: Slot) {
        self.stack.push(slot);
    }

    fn pop(&mut self, node: NodeId) -> OptimizeResult<Slot> {
        match self.stack.pop() {
            Some(slot) => Ok(slot),
            None if self.floor => Ok(Slot::UNKNOWN),
            None => Err(OptimizeError::InconsistentStackState { node }),
        }
    }

    /// Pop `count` values, returned deepest first
    fn pop_many(&mut self, node: NodeId, count: usize) -> OptimizeResult<Vec<Slot>> {
        let mut slots = (0..count).map(|_| self.pop(node)).collect::<OptimizeResult<Vec<_>>>()?;
        slots.reverse();
        Ok(slots)
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.floor = true;
    }

    fn take_blocked(&mut self) -> bool {
        std::mem::replace(&mut self.blocked, false)
    }

    /// Forget local `index` and any wide value overlapping it
    fn invalidate(&mut self, index: u16, width: u16) {
        self.locals.remove(&index);
        if width == 2 {
            self.locals.remove(&(index + 1));
        }
        if let Some(below) = index.checked_sub(1) {
            if self.locals.get(&below).map_or(false, |v| v.slots() == 2) {
                self.locals.remove(&below);
            }
        }
    }
}

/// Counters reported by one folding pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FoldStats {
    /// Arithmetic, comparison and conversion instructions condensed to constants
    pub folded: usize,
    /// Local loads rewritten to constant loads
    pub propagated: usize,
    pub branches_pruned: usize,
    pub nodes_deleted: usize,
    /// Folds or deletions skipped to keep the method correct
    pub skipped: usize,
}

/// Run the folding pass over `list`. `loops` must describe the list as it is now.
pub fn fold_method(list: &mut InstructionList, loops: &LoopBounds) -> OptimizeResult<FoldStats> {
    let mut folder = Folder { list, loops, ctx: MethodContext::new(), stats: FoldStats::default() };
    folder.run()?;
    folder.list.renumber();
    Ok(folder.stats)
}

struct Folder<'a> {
    list: &'a mut InstructionList,
    loops: &'a LoopBounds,
    ctx: MethodContext,
    stats: FoldStats,
}

impl<'a> Folder<'a> {
    fn run(&mut self) -> OptimizeResult<()> {
        for id in self.list.ids() {
            if !self.list.is_live(id) {
                continue;
            }
            self.enter(id);
            self.visit(id)?;
        }
        Ok(())
    }

    /// Merge incoming states when `id` can be reached other than by falling through
    fn enter(&mut self, id: NodeId) {
        let handler = self.list.is_handler_entry(id);
        let join = handler || self.list.is_targeted(id);
        if !join && self.ctx.reachable {
            return;
        }

        let mut states = Vec::new();
        if self.ctx.reachable {
            states.push(std::mem::take(&mut self.ctx.locals));
        }
        states.extend(self.ctx.snapshots.remove(&id).unwrap_or_default());

        let mut locals = if handler { Locals::new() } else { intersect(states) };
        if self.loops.is_loop_head(id) {
            for index in self.loops.changed_at_head(self.list, id) {
                locals.remove(&index);
                if let Some(below) = index.checked_sub(1) {
                    if locals.get(&below).map_or(false, |v| v.slots() == 2) {
                        locals.remove(&below);
                    }
                }
            }
        }

        self.ctx.locals = locals;
        self.ctx.reset_stack();
        self.ctx.blocked = false;
        self.ctx.reachable = true;
    }

    fn visit(&mut self, id: NodeId) -> OptimizeResult<()> {
        let insn = self.list.instruction(id).clone();
        match insn {
            Instruction::LoadConstant(value) => {
                self.ctx.push(Slot { value: Some(value), site: Some(id) });
                return Ok(());
            }
            Instruction::LoadLocal { kind, index } => {
                self.load_local(id, kind, index);
                return Ok(());
            }
            Instruction::StoreLocal { kind, index } => self.store_local(id, kind, index)?,
            Instruction::Increment { index, delta } => match self.ctx.locals.get(&index) {
                Some(Value::Int(v)) => {
                    let updated = v.wrapping_add(delta as i32);
                    self.ctx.locals.insert(index, Value::Int(updated));
                }
                _ => self.ctx.invalidate(index, 1),
            },
            Instruction::Arithmetic { op, kind } => self.fold_arithmetic(id, op, kind)?,
            Instruction::Compare(kind) => self.fold_compare(id, kind)?,
            Instruction::Convert { from, to } => self.fold_convert(id, from, to)?,
            Instruction::Branch { condition, target } => self.fold_branch(id, condition, target)?,
            Instruction::Jump { target } => self.visit_jump(id, target)?,
            Instruction::Switch { .. } => {
                self.ctx.pop(id)?;
                for target in insn.targets() {
                    self.record_edge(id, target);
                }
                self.ctx.reachable = false;
            }
            Instruction::Other(ref opaque) => self.visit_opaque(id, opaque)?,
        }
        self.ctx.blocked = false;
        Ok(())
    }

    fn load_local(&mut self, id: NodeId, kind: LocalKind, index: u16) {
        let known = match (kind, self.ctx.locals.get(&index)) {
            (LocalKind::Numeric(expected), Some(value)) if value.kind() == expected => Some(*value),
            _ => None,
        };
        let Some(value) = known else {
            self.ctx.push(Slot { value: None, site: Some(id) });
            return;
        };

        if self.loops.variable_changes_in_loop(self.list, id, index) {
            debug!("load of local {} at {} blocked: reassigned inside enclosing loop", index, id);
            self.ctx.blocked = true;
        } else {
            debug!("propagating local {} = {} into {}", index, value, id);
            self.list.replace(id, Instruction::LoadConstant(value));
            self.stats.propagated += 1;
        }
        self.ctx.push(Slot { value: Some(value), site: Some(id) });
    }

    fn store_local(&mut self, id: NodeId, kind: LocalKind, index: u16) -> OptimizeResult<()> {
        let slot = self.ctx.pop(id)?;
        self.ctx.invalidate(index, kind.slots());
        if let (LocalKind::Numeric(expected), Some(value)) = (kind, slot.value) {
            if value.kind() == expected {
                self.ctx.locals.insert(index, value);
            }
        }
        Ok(())
    }

    /// Delete the producers of a folded value and turn `id` into its constant load
    fn condense(&mut self, id: NodeId, sites: &[NodeId], result: Value) -> OptimizeResult<()> {
        for site in sites {
            self.list.delete_one(*site)?;
            self.stats.nodes_deleted += 1;
        }
        self.list.replace(id, Instruction::LoadConstant(result));
        self.stats.folded += 1;
        self.ctx.push(Slot { value: Some(result), site: Some(id) });
        Ok(())
    }

    /// Values and sites of `slots` when every one of them is known
    fn known(slots: &[Slot]) -> Option<(Vec<Value>, Vec<NodeId>)> {
        let values = slots.iter().map(|s| s.value).collect::<Option<Vec<_>>>()?;
        let sites = slots.iter().map(|s| s.site).collect::<Option<Vec<_>>>()?;
        Some((values, sites))
    }

    /// Push the outcome of an evaluation, condensing on success
    fn settle(
        &mut self,
        id: NodeId,
        sites: &[NodeId],
        outcome: Result<Value, EvalError>,
        describe: impl FnOnce() -> String,
    ) -> OptimizeResult<()> {
        match outcome {
            Ok(result) => {
                debug!("folded {} at {} to {}", describe(), id, result);
                self.condense(id, sites, result)
            }
            Err(EvalError::DivisionByZero(what)) => {
                let skipped = OptimizeError::runtime_arithmetic(describe(), format!("{} by zero", what));
                warn!("{} at {}", skipped, id);
                self.stats.skipped += 1;
                self.ctx.push(Slot::UNKNOWN);
                Ok(())
            }
            Err(EvalError::TypeMismatch) => Err(OptimizeError::InconsistentStackState { node: id }),
        }
    }

    fn fold_arithmetic(&mut self, id: NodeId, op: ArithOp, kind: NumericKind) -> OptimizeResult<()> {
        let operands = self.ctx.pop_many(id, op.arity())?;
        let blocked = self.ctx.take_blocked();
        match Self::known(&operands) {
            Some((values, sites)) if !blocked => {
                let outcome = eval::arithmetic(op, kind, &values);
                let describe = || format!("{:?} {:?}", kind, op);
                self.settle(id, &sites, outcome, describe)
            }
            _ => {
                self.ctx.push(Slot::UNKNOWN);
                Ok(())
            }
        }
    }

    fn fold_compare(&mut self, id: NodeId, kind: CompareKind) -> OptimizeResult<()> {
        let operands = self.ctx.pop_many(id, 2)?;
        let blocked = self.ctx.take_blocked();
        match Self::known(&operands) {
            Some((values, sites)) if !blocked => {
                let outcome = eval::compare(kind, values[0], values[1]);
                self.settle(id, &sites, outcome, || format!("{:?} compare", kind))
            }
            _ => {
                self.ctx.push(Slot::UNKNOWN);
                Ok(())
            }
        }
    }

    fn fold_convert(&mut self, id: NodeId, from: NumericKind, to: ConvertTarget) -> OptimizeResult<()> {
        let operand = self.ctx.pop_many(id, 1)?;
        let blocked = self.ctx.take_blocked();
        match Self::known(&operand) {
            Some((values, sites)) if !blocked => {
                let outcome = eval::convert(from, to, values[0]);
                self.settle(id, &sites, outcome, || format!("{:?} to {:?}", from, to))
            }
            _ => {
                self.ctx.push(Slot::UNKNOWN);
                Ok(())
            }
        }
    }

    fn is_forward(&self, from: NodeId, to: NodeId) -> bool {
        self.list.position(to) > self.list.position(from)
    }

    fn record_edge(&mut self, from: NodeId, to: NodeId) {
        if self.is_forward(from, to) {
            self.ctx.snapshots.entry(to).or_default().push(self.ctx.locals.clone());
        }
    }

    fn fold_branch(&mut self, id: NodeId, condition: Condition, target: NodeId) -> OptimizeResult<()> {
        let operands = self.ctx.pop_many(id, condition.operands())?;
        let blocked = self.ctx.take_blocked();
        let foldable = !blocked
            && self.is_forward(id, target)
            && !self.loops.is_inside_loop(self.list, id)
            && !self.loops.is_inside_loop(self.list, target);

        if let (true, Some((values, sites))) = (foldable, Self::known(&operands)) {
            let taken = match eval::branch_taken(condition, &values) {
                Ok(taken) => taken,
                Err(_) => return Err(OptimizeError::InconsistentStackState { node: id }),
            };
            match taken {
                Some(false) => return self.prune_not_taken(id, target, &sites),
                Some(true) => {
                    if self.prune_taken(id, target, &sites)? {
                        return Ok(());
                    }
                }
                None => {}
            }
        }

        self.record_edge(id, target);
        // Values left on the stack are shared with the taken path, so their
        // producers can no longer be deleted.
        for slot in &mut self.ctx.stack {
            slot.site = None;
        }
        Ok(())
    }

    /// The condition always falls through: drop the branch, keep the then-body
    /// and arm deletion of the jump that skips the else arm.
    fn prune_not_taken(&mut self, id: NodeId, target: NodeId, sites: &[NodeId]) -> OptimizeResult<()> {
        let else_jump = self.list.prev(target).filter(|prev| {
            *prev != id && matches!(self.list.instruction(*prev), Instruction::Jump { target: t } if self.is_forward(*prev, *t))
        });
        for site in sites {
            self.list.delete_one(*site)?;
        }
        self.list.delete_one(id)?;
        self.stats.nodes_deleted += sites.len() + 1;
        self.stats.branches_pruned += 1;
        if let Some(jump) = else_jump {
            self.ctx.pending_else.push(jump);
        }
        debug!("branch {} never taken, removed", id);
        Ok(())
    }

    /// The condition always jumps: delete the branch through the end of the
    /// then-body. Returns `false` when the range is still referenced.
    fn prune_taken(&mut self, id: NodeId, target: NodeId, sites: &[NodeId]) -> OptimizeResult<bool> {
        let Some(last) = self.list.prev(target) else {
            return Ok(false);
        };
        match self.list.delete_range(id, last) {
            Ok(removed) => {
                for site in sites {
                    self.list.delete_one(*site)?;
                }
                self.stats.nodes_deleted += removed + sites.len();
                self.stats.branches_pruned += 1;
                debug!("branch {} always taken, removed {} node(s)", id, removed);
                Ok(true)
            }
            Err(err @ OptimizeError::DanglingTarget { .. }) => {
                warn!("keeping always-taken branch {}: {}", id, err);
                self.stats.skipped += 1;
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    fn visit_jump(&mut self, id: NodeId, target: NodeId) -> OptimizeResult<()> {
        if let Some(at) = self.ctx.pending_else.iter().position(|j| *j == id) {
            self.ctx.pending_else.swap_remove(at);
            if let Some(last) = self.list.prev(target) {
                match self.list.delete_range(id, last) {
                    Ok(removed) => {
                        self.stats.nodes_deleted += removed;
                        debug!("removed else arm of {} node(s) at {}", removed, id);
                        return Ok(());
                    }
                    Err(err @ OptimizeError::DanglingTarget { .. }) => {
                        warn!("keeping else arm at {}: {}", id, err);
                        self.stats.skipped += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        self.record_edge(id, target);
        self.ctx.reachable = false;
        Ok(())
    }

    fn visit_opaque(&mut self, id: NodeId, opaque: &Opaque) -> OptimizeResult<()> {
        if matches!(opaque.opcode, JSR | JSR_W | RET) {
            return Err(OptimizeError::UnsupportedInstruction {
                opcode: opaque.opcode,
                offset: self.list.position(id),
            });
        }
        self.ctx.reset_stack();
        if opaque.ends_flow() {
            self.ctx.reachable = false;
        }
        Ok(())
    }
}

/// Entries present with bit-identical values in every state
fn intersect(mut states: Vec<Locals>) -> Locals {
    let Some(mut merged) = states.pop() else {
        return Locals::new();
    };
    merged.retain(|index, value| states.iter().all(|s| s.get(index).map_or(false, |v| v.identical(value))));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::opcodes::{GETSTATIC, INVOKEVIRTUAL, IRETURN, RETURN};
    use crate::bytecode::{MethodCode, Relation};

    const INT: LocalKind = LocalKind::Numeric(NumericKind::Int);

    fn int(v: i32) -> Instruction<usize> {
        Instruction::LoadConstant(Value::Int(v))
    }

    fn op(op: ArithOp) -> Instruction<usize> {
        Instruction::Arithmetic { op, kind: NumericKind::Int }
    }

    fn other(opcode: u8) -> Instruction<usize> {
        Instruction::Other(Opaque::new(opcode))
    }

    fn fold(instructions: Vec<Instruction<usize>>) -> (Vec<Instruction<usize>>, FoldStats) {
        let code = MethodCode::new(instructions);
        let mut list = InstructionList::from_method_code(&code).unwrap();
        let loops = LoopBounds::analyze(&list);
        let stats = fold_method(&mut list, &loops).unwrap();
        (list.to_method_code(&code).unwrap().instructions, stats)
    }

    #[test]
    fn test_folds_nested_expression() {
        // 7 + 3 * 2
        let (out, stats) = fold(vec![int(7), int(3), int(2), op(ArithOp::Mul), op(ArithOp::Add), other(IRETURN)]);
        assert_eq!(out, vec![int(13), other(IRETURN)]);
        assert_eq!(stats.folded, 2);
    }

    #[test]
    fn test_division_by_zero_left_alone() {
        // 10 / (5 - 5)
        let (out, stats) = fold(vec![int(10), int(5), int(5), op(ArithOp::Sub), op(ArithOp::Div), other(IRETURN)]);
        assert_eq!(out, vec![int(10), int(0), op(ArithOp::Div), other(IRETURN)]);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_propagates_stored_constant() {
        let (out, stats) = fold(vec![
            int(5),
            Instruction::StoreLocal { kind: INT, index: 0 },
            Instruction::LoadLocal { kind: INT, index: 0 },
            other(IRETURN),
        ]);
        assert_eq!(out, vec![int(5), Instruction::StoreLocal { kind: INT, index: 0 }, int(5), other(IRETURN)]);
        assert_eq!(stats.propagated, 1);
    }

    #[test]
    fn test_fall_through_branch_drops_else_arm() {
        // if (2 > 1) return 1 else return 2, lowered as if_icmple -> else
        let (out, stats) = fold(vec![
            int(2),
            int(1),
            Instruction::Branch { condition: Condition::IntPair(Relation::Le), target: 6 },
            int(1),
            Instruction::StoreLocal { kind: INT, index: 1 },
            Instruction::Jump { target: 8 },
            int(2),
            Instruction::StoreLocal { kind: INT, index: 1 },
            Instruction::LoadLocal { kind: INT, index: 1 },
            other(IRETURN),
        ]);
        assert_eq!(
            out,
            vec![int(1), Instruction::StoreLocal { kind: INT, index: 1 }, int(1), other(IRETURN)]
        );
        assert_eq!(stats.branches_pruned, 1);
    }

    #[test]
    fn test_taken_branch_drops_then_body() {
        // if (1 > 2) x = 1; return 0, lowered as if_icmple -> after
        let (out, _) = fold(vec![
            int(1),
            int(2),
            Instruction::Branch { condition: Condition::IntPair(Relation::Le), target: 5 },
            int(1),
            Instruction::StoreLocal { kind: INT, index: 1 },
            int(0),
            other(IRETURN),
        ]);
        assert_eq!(out, vec![int(0), other(IRETURN)]);
    }

    #[test]
    fn test_join_forgets_disagreeing_locals() {
        // x = 1; if (p == 0) x = 2; return x
        let (out, _) = fold(vec![
            int(1),
            Instruction::StoreLocal { kind: INT, index: 1 },
            Instruction::LoadLocal { kind: INT, index: 0 },
            Instruction::Branch { condition: Condition::Zero(Relation::Ne), target: 6 },
            int(2),
            Instruction::StoreLocal { kind: INT, index: 1 },
            Instruction::LoadLocal { kind: INT, index: 1 },
            other(IRETURN),
        ]);
        assert_eq!(out[6], Instruction::LoadLocal { kind: INT, index: 1 });
    }

    #[test]
    fn test_loop_changed_local_not_folded() {
        // x = 0; loop: x = x + 1; if (x != 0) goto loop; return x
        let (out, _) = fold(vec![
            int(0),
            Instruction::StoreLocal { kind: INT, index: 1 },
            Instruction::LoadLocal { kind: INT, index: 1 },
            int(1),
            op(ArithOp::Add),
            Instruction::StoreLocal { kind: INT, index: 1 },
            Instruction::LoadLocal { kind: INT, index: 1 },
            Instruction::Branch { condition: Condition::Zero(Relation::Ne), target: 2 },
            Instruction::LoadLocal { kind: INT, index: 1 },
            other(IRETURN),
        ]);
        assert_eq!(out[2], Instruction::LoadLocal { kind: INT, index: 1 });
        assert_eq!(out[4], op(ArithOp::Add));
        assert_eq!(out[8], Instruction::LoadLocal { kind: INT, index: 1 });
    }

    #[test]
    fn test_opaque_instruction_resets_stack() {
        let (out, _) = fold(vec![
            Instruction::Other(Opaque::with_operands(GETSTATIC, vec![0, 1])),
            int(4),
            int(5),
            op(ArithOp::Mul),
            Instruction::Other(Opaque::with_operands(INVOKEVIRTUAL, vec![0, 2])),
            other(RETURN),
        ]);
        assert_eq!(out[1], int(20));
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_underflow_is_inconsistent() {
        let code = MethodCode::new(vec![op(ArithOp::Add), other(IRETURN)]);
        let mut list = InstructionList::from_method_code(&code).unwrap();
        let loops = LoopBounds::analyze(&list);
        assert!(matches!(
            fold_method(&mut list, &loops),
            Err(OptimizeError::InconsistentStackState { .. })
        ));
    }

    #[test]
    fn test_values_shared_across_branch_not_condensed() {
        // 5 stays on the stack across the branch; both paths add to it
        let (out, _) = fold(vec![
            int(5),
            Instruction::LoadLocal { kind: INT, index: 0 },
            Instruction::Branch { condition: Condition::Zero(Relation::Eq), target: 5 },
            int(1),
            op(ArithOp::Add),
            other(IRETURN),
        ]);
        assert_eq!(out[0], int(5));
        assert_eq!(out[4], op(ArithOp::Add));
    }
}
