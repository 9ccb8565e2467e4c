//! Mutable instruction stream
//!
//! Nodes live in an arena and are linked in both directions; branch targets
//! and exception ranges refer to nodes by [`NodeId`]. Deleted nodes stay in
//! the arena marked dead, so ids held by a pass remain valid to query.
//! Every removal goes through [`InstructionList::delete_one`] or
//! [`InstructionList::delete_range`], which keep all targets pointing at live
//! nodes.

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::error::{OptimizeError, OptimizeResult};
use crate::bytecode::{ExceptionHandler, Instruction, MethodCode};

/// Stable identity of an instruction node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Node {
    insn: Instruction<NodeId>,
    prev: Option<NodeId>,
    next: Option<NodeId>,
    /// Ordering key assigned by `renumber`; stays monotonic across deletions
    position: usize,
    live: bool,
}

/// Exception-protected range `[start, end)`, `end == None` meaning the end of the method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerRange {
    pub start: NodeId,
    pub end: Option<NodeId>,
    pub handler: NodeId,
    pub catch_type: u16,
}

#[derive(Debug, Clone, Default)]
pub struct InstructionList {
    nodes: Vec<Node>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    handlers: Vec<HandlerRange>,
    origins: HashMap<usize, NodeId>,
    len: usize,
}

impl InstructionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the stream from a decoded method body, resolving index targets
    /// to node ids.
    pub fn from_method_code(code: &MethodCode) -> OptimizeResult<Self> {
        let mut list = Self::new();
        let mut ids = Vec::with_capacity(code.instructions.len());
        for (origin, insn) in code.instructions.iter().enumerate() {
            // Targets are resolved once every node exists.
            let placeholder = insn.map_targets(|_| NodeId(usize::MAX));
            ids.push(list.push_node(placeholder, origin));
        }
        for (id, insn) in ids.iter().zip(&code.instructions) {
            let resolved = insn.try_map_targets(|target| {
                list.find_by_origin(target).ok_or(OptimizeError::DanglingTarget { node: *id })
            })?;
            list.nodes[id.0].insn = resolved;
        }
        for handler in &code.handlers {
            let missing = OptimizeError::DanglingTarget { node: NodeId(handler.handler) };
            let start = list.find_by_origin(handler.start).ok_or(missing.clone())?;
            let handler_node = list.find_by_origin(handler.handler).ok_or(missing.clone())?;
            let end = if handler.end >= code.instructions.len() {
                None
            } else {
                Some(list.find_by_origin(handler.end).ok_or(missing)?)
            };
            list.handlers.push(HandlerRange { start, end, handler: handler_node, catch_type: handler.catch_type });
        }
        list.renumber();
        Ok(list)
    }

    fn push_node(&mut self, insn: Instruction<NodeId>, origin: usize) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            insn,
            prev: self.tail,
            next: None,
            position: self.len,
            live: true,
        });
        match self.tail {
            Some(tail) => self.nodes[tail.0].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
        self.origins.insert(origin, id);
        id
    }

    pub fn handlers(&self) -> &[HandlerRange] {
        &self.handlers
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].next
    }

    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].prev
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        self.nodes[id.0].live
    }

    pub fn instruction(&self, id: NodeId) -> &Instruction<NodeId> {
        &self.nodes[id.0].insn
    }

    pub fn position(&self, id: NodeId) -> usize {
        self.nodes[id.0].position
    }

    /// Rewrite a node in place; its identity, position and incoming targets are kept
    pub fn replace(&mut self, id: NodeId, insn: Instruction<NodeId>) {
        self.nodes[id.0].insn = insn;
    }

    /// Live node ids in stream order
    pub fn ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(id) = cursor {
            ids.push(id);
            cursor = self.nodes[id.0].next;
        }
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Instruction<NodeId>)> + '_ {
        self.ids().into_iter().map(move |id| (id, &self.nodes[id.0].insn))
    }

    /// Assign increasing positions in stream order
    pub fn renumber(&mut self) {
        let mut cursor = self.head;
        let mut position = 0;
        while let Some(id) = cursor {
            self.nodes[id.0].position = position;
            position += 1;
            cursor = self.nodes[id.0].next;
        }
    }

    /// Live node built from index `origin` of the source method body
    pub fn find_by_origin(&self, origin: usize) -> Option<NodeId> {
        self.origins.get(&origin).copied().filter(|id| self.is_live(*id))
    }

    /// Live branch, jump and switch nodes that name `id` as a target
    pub fn targeters(&self, id: NodeId) -> Vec<NodeId> {
        self.iter()
            .filter(|(other, insn)| *other != id && insn.targets().contains(&id))
            .map(|(other, _)| other)
            .collect()
    }

    pub fn is_handler_entry(&self, id: NodeId) -> bool {
        self.handlers.iter().any(|h| h.handler == id)
    }

    /// True when control may arrive at `id` other than by falling through
    pub fn is_targeted(&self, id: NodeId) -> bool {
        self.is_handler_entry(id) || !self.targeters(id).is_empty()
    }

    fn unlink(&mut self, id: NodeId) {
        let (prev, next) = (self.nodes[id.0].prev, self.nodes[id.0].next);
        match prev {
            Some(p) => self.nodes[p.0].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n.0].prev = prev,
            None => self.tail = prev,
        }
        let node = &mut self.nodes[id.0];
        node.live = false;
        node.prev = None;
        node.next = None;
        self.len -= 1;
    }

    fn drop_empty_handlers(&mut self) {
        self.handlers.retain(|h| h.end != Some(h.start));
    }

    /// Remove one node, redirecting every reference to it onto its successor.
    ///
    /// Fails with `DanglingTarget` when the node is referenced but is the
    /// last node of the method; nothing is changed in that case.
    pub fn delete_one(&mut self, id: NodeId) -> OptimizeResult<()> {
        if !self.is_live(id) {
            return Ok(());
        }
        let successor = self.next(id);
        let targeters = self.targeters(id);
        let Some(successor) = successor else {
            if !targeters.is_empty() || self.is_handler_entry(id) {
                return Err(OptimizeError::DanglingTarget { node: id });
            }
            self.handlers.retain(|h| h.start != id);
            for handler in &mut self.handlers {
                if handler.end == Some(id) {
                    handler.end = None;
                }
            }
            self.unlink(id);
            return Ok(());
        };

        for targeter in targeters {
            self.nodes[targeter.0].insn.retarget(id, successor);
        }
        for handler in &mut self.handlers {
            if handler.start == id {
                handler.start = successor;
            }
            if handler.end == Some(id) {
                handler.end = Some(successor);
            }
            if handler.handler == id {
                handler.handler = successor;
            }
        }
        self.drop_empty_handlers();
        self.unlink(id);
        Ok(())
    }

    /// Remove the contiguous run `from..=to`.
    ///
    /// Fails with `DanglingTarget`, leaving the stream untouched, when a node
    /// outside the run branches into it, when an exception handler starts
    /// inside it, or when `to` does not follow `from`. Protected ranges that
    /// begin or end inside the run are moved to the node after it.
    pub fn delete_range(&mut self, from: NodeId, to: NodeId) -> OptimizeResult<usize> {
        let mut run = Vec::new();
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            if !self.is_live(id) {
                break;
            }
            run.push(id);
            if id == to {
                break;
            }
            cursor = self.next(id);
        }
        if run.last() != Some(&to) {
            return Err(OptimizeError::DanglingTarget { node: from });
        }

        let members: HashSet<NodeId> = run.iter().copied().collect();
        for (other, insn) in self.iter() {
            if members.contains(&other) {
                continue;
            }
            if let Some(target) = insn.targets().into_iter().find(|t| members.contains(t)) {
                return Err(OptimizeError::DanglingTarget { node: target });
            }
        }
        if let Some(h) = self.handlers.iter().find(|h| members.contains(&h.handler)) {
            return Err(OptimizeError::DanglingTarget { node: h.handler });
        }

        let after = self.next(to);
        let mut kept = Vec::with_capacity(self.handlers.len());
        for mut handler in self.handlers.drain(..) {
            if members.contains(&handler.start) {
                match after {
                    Some(after) => handler.start = after,
                    None => continue,
                }
            }
            if handler.end.map_or(false, |end| members.contains(&end)) {
                handler.end = after;
            }
            kept.push(handler);
        }
        self.handlers = kept;
        self.drop_empty_handlers();

        for id in &run {
            self.unlink(*id);
        }
        Ok(run.len())
    }

    /// Flatten back to an indexed method body; limits are copied from `template`
    pub fn to_method_code(&self, template: &MethodCode) -> OptimizeResult<MethodCode> {
        let ids = self.ids();
        let index_of: HashMap<NodeId, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let lookup = |id: NodeId| index_of.get(&id).copied().ok_or(OptimizeError::DanglingTarget { node: id });

        let mut instructions = Vec::with_capacity(ids.len());
        for id in &ids {
            instructions.push(self.instruction(*id).try_map_targets(lookup)?);
        }
        let mut handlers = Vec::with_capacity(self.handlers.len());
        for h in &self.handlers {
            let start = lookup(h.start)?;
            let end = match h.end {
                Some(end) => lookup(end)?,
                None => ids.len(),
            };
            if start < end {
                handlers.push(ExceptionHandler { start, end, handler: lookup(h.handler)?, catch_type: h.catch_type });
            }
        }
        Ok(MethodCode {
            instructions,
            handlers,
            ..template.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::opcodes::{NOP, RETURN};
    use crate::bytecode::{Condition, Opaque, Relation, Value};

    fn other(opcode: u8) -> Instruction<usize> {
        Instruction::Other(Opaque::new(opcode))
    }

    fn sample() -> MethodCode {
        // 0: iconst_1  1: ifeq -> 3  2: nop  3: nop  4: return
        MethodCode::new(vec![
            Instruction::LoadConstant(Value::Int(1)),
            Instruction::Branch { condition: Condition::Zero(Relation::Eq), target: 3 },
            other(NOP),
            other(NOP),
            other(RETURN),
        ])
    }

    #[test]
    fn test_build_and_flatten() {
        let code = sample();
        let list = InstructionList::from_method_code(&code).unwrap();
        assert_eq!(list.len(), 5);
        assert_eq!(list.to_method_code(&code).unwrap(), code);
    }

    #[test]
    fn test_delete_one_retargets() {
        let code = sample();
        let mut list = InstructionList::from_method_code(&code).unwrap();
        let target = list.find_by_origin(3).unwrap();
        assert!(list.is_targeted(target));
        list.delete_one(target).unwrap();
        let flat = list.to_method_code(&code).unwrap();
        assert_eq!(flat.instructions[1], Instruction::Branch { condition: Condition::Zero(Relation::Eq), target: 3 });
        assert_eq!(flat.instructions[3], other(RETURN));
        assert!(list.find_by_origin(3).is_none());
    }

    #[test]
    fn test_delete_last_targeted_node_fails() {
        let code = MethodCode::new(vec![Instruction::Jump { target: 1 }, other(RETURN)]);
        let mut list = InstructionList::from_method_code(&code).unwrap();
        let last = list.find_by_origin(1).unwrap();
        assert_eq!(list.delete_one(last), Err(OptimizeError::DanglingTarget { node: last }));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_delete_range_guards_external_targets() {
        let code = sample();
        let mut list = InstructionList::from_method_code(&code).unwrap();
        let (two, three) = (list.find_by_origin(2).unwrap(), list.find_by_origin(3).unwrap());
        assert!(matches!(list.delete_range(two, three), Err(OptimizeError::DanglingTarget { .. })));
        assert_eq!(list.len(), 5);

        let branch = list.find_by_origin(1).unwrap();
        let nop = list.find_by_origin(2).unwrap();
        assert_eq!(list.delete_range(branch, nop).unwrap(), 2);
        let flat = list.to_method_code(&code).unwrap();
        assert_eq!(flat.instructions, vec![Instruction::LoadConstant(Value::Int(1)), other(NOP), other(RETURN)]);
    }

    #[test]
    fn test_handler_boundaries_follow_deletions() {
        let code = MethodCode::new(vec![other(NOP), other(NOP), other(RETURN), other(RETURN)])
            .with_handler(ExceptionHandler { start: 0, end: 2, handler: 3, catch_type: 0 });
        let mut list = InstructionList::from_method_code(&code).unwrap();
        let first = list.find_by_origin(0).unwrap();
        list.delete_one(first).unwrap();
        let flat = list.to_method_code(&code).unwrap();
        assert_eq!(flat.handlers, vec![ExceptionHandler { start: 0, end: 1, handler: 2, catch_type: 0 }]);

        let second = list.find_by_origin(1).unwrap();
        list.delete_one(second).unwrap();
        assert!(list.handlers().is_empty());

        let entry = list.find_by_origin(3).unwrap();
        assert!(!list.is_handler_entry(entry));
    }

    #[test]
    fn test_renumber_after_deletion() {
        let code = sample();
        let mut list = InstructionList::from_method_code(&code).unwrap();
        let nop = list.find_by_origin(2).unwrap();
        list.delete_one(nop).unwrap();
        list.renumber();
        let positions: Vec<usize> = list.ids().into_iter().map(|id| list.position(id)).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
    }
}
