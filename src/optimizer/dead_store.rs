//! Iterated dead-store elimination
//!
//! A store is dead when no load or `iinc` of the same local follows it in
//! stream order and control cannot return to an earlier read through a
//! backward branch or an exception handler. Each round removes the last
//! store of every unread local; removing a store can orphan the load that
//! fed it, so rounds repeat until nothing changes.

use std::collections::HashMap;

use log::debug;

use super::error::OptimizeResult;
use super::list::{InstructionList, NodeId};
use super::loops::LoopBounds;
use crate::bytecode::opcodes::{POP, POP2};
use crate::bytecode::{Instruction, Opaque};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeadStoreStats {
    pub rounds: usize,
    /// Stores removed together with the push that fed them
    pub stores_removed: usize,
    /// Stores whose value had to be discarded with `pop`/`pop2` instead
    pub stores_popped: usize,
    /// Push and pop pairs removed afterwards
    pub pairs_removed: usize,
}

impl DeadStoreStats {
    pub fn changed(&self) -> bool {
        self.removals() > 0
    }

    fn removals(&self) -> usize {
        self.stores_removed + self.stores_popped + self.pairs_removed
    }
}

/// Last store of one local seen during a scan
#[derive(Debug, Clone, Copy)]
struct LastStore {
    store: NodeId,
    /// Adjacent pure push feeding the store
    producer: Option<NodeId>,
}

/// Repeat elimination rounds until a fixed point or `max_rounds`
pub fn eliminate_dead_stores(list: &mut InstructionList, max_rounds: usize) -> OptimizeResult<DeadStoreStats> {
    let mut stats = DeadStoreStats::default();
    while stats.rounds < max_rounds {
        stats.rounds += 1;
        list.renumber();
        let loops = LoopBounds::analyze(list);
        let before = stats.removals();
        sweep(list, &loops, &mut stats)?;
        drop_discarded_pushes(list, &mut stats)?;
        if stats.removals() == before {
            break;
        }
    }
    if stats.rounds == max_rounds {
        debug!("dead-store elimination stopped after {} round(s)", max_rounds);
    }
    list.renumber();
    Ok(stats)
}

fn sweep(list: &mut InstructionList, loops: &LoopBounds, stats: &mut DeadStoreStats) -> OptimizeResult<()> {
    let mut read_since: HashMap<u16, bool> = HashMap::new();
    let mut reads: HashMap<u16, Vec<usize>> = HashMap::new();
    let mut last: HashMap<u16, LastStore> = HashMap::new();

    for (id, insn) in list.iter() {
        let position = list.position(id);
        match insn {
            Instruction::LoadLocal { kind, index } => {
                for slot in *index..*index + kind.slots() {
                    read_since.insert(slot, true);
                    reads.entry(slot).or_default().push(position);
                }
            }
            Instruction::Increment { index, .. } => {
                read_since.insert(*index, true);
                reads.entry(*index).or_default().push(position);
            }
            Instruction::StoreLocal { index, .. } => {
                read_since.insert(*index, false);
                let producer = list.prev(id).filter(|p| list.instruction(*p).is_pure_push());
                last.insert(*index, LastStore { store: id, producer });
            }
            _ => {}
        }
    }

    let mut dead: Vec<(u16, LastStore)> = last
        .into_iter()
        .filter(|(index, _)| read_since.get(index) == Some(&false))
        .collect();
    dead.sort_by_key(|(index, _)| *index);

    for (index, candidate) in dead {
        let at = list.position(candidate.store);
        let back = reentry(list, loops, at);
        if reads.get(&index).map_or(false, |r| r.iter().any(|p| (back..at).contains(p))) {
            continue;
        }
        remove_store(list, index, candidate, stats)?;
    }
    Ok(())
}

/// Lowest position control can come back to after reaching `position`,
/// through backward branches or exception handlers placed earlier.
fn reentry(list: &InstructionList, loops: &LoopBounds, position: usize) -> usize {
    let mut lowest = position;
    loop {
        let mut next = lowest;
        for extent in loops.loops() {
            if list.position(extent.end) >= lowest {
                next = next.min(list.position(extent.start));
            }
        }
        for range in list.handlers() {
            let end = range.end.map_or(usize::MAX, |e| list.position(e));
            if end > lowest {
                next = next.min(list.position(range.handler));
            }
        }
        if next == lowest {
            return lowest;
        }
        lowest = next;
    }
}

fn remove_store(
    list: &mut InstructionList,
    index: u16,
    candidate: LastStore,
    stats: &mut DeadStoreStats,
) -> OptimizeResult<()> {
    let LastStore { store, producer } = candidate;
    let slots = match list.instruction(store) {
        Instruction::StoreLocal { kind, .. } => kind.slots(),
        _ => return Ok(()),
    };

    match producer {
        Some(producer) if !list.is_targeted(store) => {
            debug!("removing dead store to local {} at {}", index, store);
            list.delete_one(producer)?;
            list.delete_one(store)?;
            stats.stores_removed += 1;
        }
        _ => {
            debug!("discarding value of dead store to local {} at {}", index, store);
            list.replace(store, discard(slots));
            stats.stores_popped += 1;
        }
    }
    Ok(())
}

fn discard(slots: u16) -> Instruction<NodeId> {
    Instruction::Other(Opaque::new(if slots == 2 { POP2 } else { POP }))
}

/// Delete a pure push immediately discarded by a matching `pop`/`pop2`
fn drop_discarded_pushes(list: &mut InstructionList, stats: &mut DeadStoreStats) -> OptimizeResult<()> {
    let pairs: Vec<(NodeId, NodeId)> = list
        .iter()
        .filter_map(|(id, insn)| {
            let slots = match insn {
                Instruction::Other(opaque) if opaque.opcode == POP => 1,
                Instruction::Other(opaque) if opaque.opcode == POP2 => 2,
                _ => return None,
            };
            let push = list.prev(id)?;
            let fits = list.instruction(push).pushed_slots() == Some(slots);
            (fits && !list.is_targeted(id)).then_some((push, id))
        })
        .collect();

    for (push, pop) in pairs {
        if !list.is_live(push) || !list.is_live(pop) {
            continue;
        }
        list.delete_one(push)?;
        list.delete_one(pop)?;
        stats.pairs_removed += 1;
    }
    Ok(())
}
