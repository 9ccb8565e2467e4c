//! Loop-safety analysis
//!
//! A loop is any backward control transfer. Its extent runs from the target
//! (inclusive) to the transferring instruction (exclusive), in stream
//! positions. Extents may nest or overlap, so lookups always consider every
//! recorded extent rather than relying on scan order.

use std::collections::BTreeSet;

use log::trace;

use super::list::{InstructionList, NodeId};
use crate::bytecode::Instruction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopExtent {
    /// Target of the backward transfer
    pub start: NodeId,
    /// The backward branch, jump or switch itself
    pub end: NodeId,
    start_position: usize,
    end_position: usize,
}

impl LoopExtent {
    pub fn contains_position(&self, position: usize) -> bool {
        self.start_position <= position && position < self.end_position
    }

    pub fn span(&self) -> usize {
        self.end_position - self.start_position
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoopBounds {
    loops: Vec<LoopExtent>,
}

impl LoopBounds {
    /// Record every backward transfer. Positions must be current, so
    /// callers renumber the list first.
    pub fn analyze(list: &InstructionList) -> Self {
        let mut loops = Vec::new();
        for (id, insn) in list.iter() {
            let here = list.position(id);
            let mut seen = BTreeSet::new();
            for target in insn.targets() {
                let there = list.position(target);
                if there <= here && seen.insert(target) {
                    loops.push(LoopExtent { start: target, end: id, start_position: there, end_position: here });
                }
            }
        }
        trace!("found {} loop extent(s)", loops.len());
        Self { loops }
    }

    pub fn loops(&self) -> &[LoopExtent] {
        &self.loops
    }

    /// Every extent containing `node`, innermost (smallest span) first
    pub fn enclosing(&self, list: &InstructionList, node: NodeId) -> Vec<&LoopExtent> {
        let position = list.position(node);
        let mut found: Vec<&LoopExtent> = self.loops.iter().filter(|l| l.contains_position(position)).collect();
        found.sort_by_key(|l| (l.span(), std::cmp::Reverse(l.start_position)));
        found
    }

    /// The innermost extent containing `node`
    pub fn innermost(&self, list: &InstructionList, node: NodeId) -> Option<&LoopExtent> {
        self.enclosing(list, node).into_iter().next()
    }

    pub fn is_inside_loop(&self, list: &InstructionList, node: NodeId) -> bool {
        let position = list.position(node);
        self.loops.iter().any(|l| l.contains_position(position))
    }

    /// True when some backward transfer targets `node`
    pub fn is_loop_head(&self, node: NodeId) -> bool {
        self.loops.iter().any(|l| l.start == node)
    }

    /// Local slots written by a store or `iinc` anywhere in `extent`
    pub fn changed_locals(&self, list: &InstructionList, extent: &LoopExtent) -> BTreeSet<u16> {
        let mut changed = BTreeSet::new();
        let mut cursor = Some(extent.start);
        while let Some(id) = cursor {
            if id == extent.end || list.position(id) >= extent.end_position {
                break;
            }
            match list.instruction(id) {
                Instruction::StoreLocal { kind, index } => {
                    changed.insert(*index);
                    if kind.slots() == 2 {
                        changed.insert(index + 1);
                    }
                }
                Instruction::Increment { index, .. } => {
                    changed.insert(*index);
                }
                _ => {}
            }
            cursor = list.next(id);
        }
        changed
    }

    /// Locals written inside any loop whose head is `node`
    pub fn changed_at_head(&self, list: &InstructionList, node: NodeId) -> BTreeSet<u16> {
        self.loops
            .iter()
            .filter(|l| l.start == node)
            .flat_map(|l| self.changed_locals(list, l))
            .collect()
    }

    /// Whether local `index` may be reassigned by a later iteration of a
    /// loop enclosing `node`.
    ///
    /// The innermost extent is checked first; enclosing extents are checked
    /// too, since an outer loop re-entering the inner one may have changed
    /// the local in between.
    pub fn variable_changes_in_loop(&self, list: &InstructionList, node: NodeId, index: u16) -> bool {
        self.enclosing(list, node)
            .into_iter()
            .any(|extent| self.changed_locals(list, extent).contains(&index))
    }
}
