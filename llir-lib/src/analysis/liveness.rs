use core::fmt::Write;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use analysis::{
    AnalysisError,
    cfg::{CfgBlock, ControlFlowGraph, OpPos},
    domains::{BitSet, BitSetTop, JoinSemiLattice, Lattice},
    solvers::{Approximation, Direction, SolveWorklist, Worklist, WorklistProblem},
};
use log::debug;

use crate::{
    ir::{Function, InstrKind, Instruction, Operand, Unit},
    slots::SlotIndex,
};

/// The unit of work of the liveness solvers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Granularity {
    /// A single backward sweep over the blocks in reverse layout order.
    Block,
    /// Blocks are iterated to a fixed point along the control flow edges.
    Branch,
    /// Every instruction is a separate node of the worklist.
    Instruction,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LivenessAnalysis {
    pub granularity: Granularity,
    pub approximation: Approximation,
    /// Approximate number of visits per node, zero means no limit.
    pub node_limit: usize,
}

impl Default for LivenessAnalysis {
    fn default() -> Self {
        Self {
            granularity: Granularity::Instruction,
            approximation: Approximation::May,
            node_limit: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LivenessResult {
    pub function: usize,
    /// The stack variables of the function.
    pub slots: SlotIndex,
    /// The variables live before the loads and stores of each source line.
    pub lines: BTreeMap<u32, BitSet>,
    /// The variables live before each visited instruction.
    pub facts: HashMap<OpPos, BitSet>,
    /// Number of nodes processed by the solver.
    pub processed: usize,
}

/// Loads read the variable and define the temporary, stores define the
/// variable and read the stored value. Only tracked variables are kept.
fn kill_gen(instr: &Instruction, slots: &SlotIndex) -> Option<(BitSet, BitSet)> {
    match &instr.kind {
        InstrKind::Load { result, ptr } => Some((slots.bitset(&[*result]), slots.bitset(&[*ptr]))),
        InstrKind::Store { value, ptr } => {
            let gens = match value {
                Operand::Var(v) => slots.bitset(&[*v]),
                Operand::Const(_) => slots.bitset(&[]),
            };
            Some((slots.bitset(&[*ptr]), gens))
        }
        _ => None,
    }
}

fn transfer(instr: &Instruction, slots: &SlotIndex, live_after: &BitSet) -> BitSet {
    match kill_gen(instr, slots) {
        Some((kill, gens)) => live_after.kill_gen(&kill, &gens),
        None => live_after.clone(),
    }
}

/// Applies the instructions of `block` backwards starting from the live
/// set at its end. Records the fact before each instruction and returns
/// the live set at the start of the block.
fn transfer_block(
    func: &Function,
    slots: &SlotIndex,
    block_id: usize,
    live_out: BitSet,
    facts: &mut HashMap<OpPos, BitSet>,
) -> BitSet {
    let mut live = live_out;
    for (op_id, instr) in func.blocks()[block_id].operations().iter().enumerate().rev() {
        if instr.is_alloca() {
            continue;
        }
        live = transfer(instr, slots, &live);
        facts.insert(OpPos { block_id, op_id }, live.clone());
    }
    live
}

fn merge(approximation: Approximation, lhs: &BitSet, rhs: &BitSet, ctx: &BitSetTop) -> BitSet {
    match approximation {
        Approximation::May => lhs.join(rhs, ctx),
        Approximation::Must => lhs.meet(rhs, ctx),
    }
}

/// Blocks waiting for their live sets to be recomputed, together with the
/// live sets flowing into their ends from the successors.
pub struct BasicBlockWorkList {
    queue: VecDeque<usize>,
    calculated: Vec<bool>,
    tails: Vec<Option<BitSet>>,
    approximation: Approximation,
}

impl BasicBlockWorkList {
    /// Queues the exit blocks with an empty live set at their ends.
    pub fn new(func: &Function, ctx: &BitSetTop, approximation: Approximation) -> Self {
        let block_num = func.blocks().len();
        let mut result = Self {
            queue: VecDeque::new(),
            calculated: vec![false; block_num],
            tails: vec![None; block_num],
            approximation,
        };
        for exit in func.exit_blocks() {
            result.tails[exit] = Some(BitSet::bottom(ctx));
            result.push(exit);
        }
        result
    }

    pub fn push(&mut self, block: usize) -> bool {
        if self.queue.contains(&block) {
            return false;
        }
        self.queue.push_back(block);
        true
    }

    pub fn pop(&mut self) -> Option<usize> {
        self.queue.pop_front()
    }

    pub fn is_calculated(&self, block: usize) -> bool {
        self.calculated[block]
    }

    pub fn set_calculated(&mut self, block: usize) {
        self.calculated[block] = true;
    }

    /// The merged live set of the successors, if any was computed.
    pub fn tail(&self, block: usize) -> Option<&BitSet> {
        self.tails[block].as_ref()
    }

    /// Merges the live set at the start of a successor into the tail of
    /// `block`. Returns whether the tail changed.
    pub fn merge_tail(&mut self, block: usize, head: &BitSet, ctx: &BitSetTop) -> bool {
        let merged = match &self.tails[block] {
            Some(tail) => merge(self.approximation, tail, head, ctx),
            None => head.clone(),
        };
        let changed = self.tails[block].as_ref() != Some(&merged);
        self.tails[block] = Some(merged);
        changed
    }
}

/// Every instruction is a node, dependencies run from an instruction to
/// the instructions executed right before it.
struct InstructionLiveness<'a> {
    func: &'a Function,
    slots: &'a SlotIndex,
}

impl InstructionLiveness<'_> {
    /// The non-alloca instructions that can execute right before `pos`.
    fn previous(&self, pos: OpPos) -> Vec<OpPos> {
        let blocks = self.func.blocks();
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        // Blocks to search with the number of leading instructions to look at.
        let mut pending = vec![(pos.block_id, pos.op_id)];
        while let Some((block_id, end)) = pending.pop() {
            let ops = blocks[block_id].operations();
            if let Some(op_id) = (0..end).rev().find(|&i| !ops[i].is_alloca()) {
                let prev = OpPos { block_id, op_id };
                if !result.contains(&prev) {
                    result.push(prev);
                }
                continue;
            }
            for &pred in blocks[block_id].predecessors() {
                if visited.insert(pred) {
                    pending.push((pred, blocks[pred].operations().len()));
                }
            }
        }
        result
    }
}

impl WorklistProblem<BitSet> for InstructionLiveness<'_> {
    type Node = OpPos;

    fn dependents(&self, node: OpPos) -> Vec<OpPos> {
        self.previous(node)
    }

    fn transfer(&mut self, node: OpPos, _ctx: &BitSetTop, input: &BitSet) -> BitSet {
        transfer(self.func.instruction(node), self.slots, input)
    }
}

impl LivenessAnalysis {
    pub fn new(granularity: Granularity, approximation: Approximation, node_limit: usize) -> Self {
        Self {
            granularity,
            approximation,
            node_limit,
        }
    }

    pub fn run(&self, unit: &Unit, func_id: usize) -> Result<LivenessResult, AnalysisError> {
        let func = &unit.functions[func_id];
        let slots = SlotIndex::allocas(func);
        let (facts, processed) = match self.granularity {
            Granularity::Block => self.solve_blocks(func, &slots),
            Granularity::Branch => self.solve_branches(func, &slots)?,
            Granularity::Instruction => self.solve_instructions(func, &slots)?,
        };
        debug!(
            "liveness of @{} at {:?} granularity: {processed} steps",
            unit.name(func.name),
            self.granularity
        );

        let mut lines = BTreeMap::new();
        for (pos, fact) in &facts {
            let instr = func.instruction(*pos);
            if !matches!(instr.kind, InstrKind::Load { .. } | InstrKind::Store { .. }) {
                continue;
            }
            lines
                .entry(instr.line)
                .and_modify(|prev: &mut BitSet| prev.union_with(fact))
                .or_insert_with(|| fact.clone());
        }

        Ok(LivenessResult {
            function: func_id,
            slots,
            lines,
            facts,
            processed,
        })
    }

    /// Ignores the control flow, every block sees the live set of the
    /// block after it in the layout.
    fn solve_blocks(&self, func: &Function, slots: &SlotIndex) -> (HashMap<OpPos, BitSet>, usize) {
        let mut facts = HashMap::new();
        let mut live = BitSet::bottom(&slots.bitset_ctx());
        for block_id in (0..func.blocks().len()).rev() {
            live = transfer_block(func, slots, block_id, live, &mut facts);
        }
        (facts, func.blocks().len())
    }

    fn solve_branches(
        &self,
        func: &Function,
        slots: &SlotIndex,
    ) -> Result<(HashMap<OpPos, BitSet>, usize), AnalysisError> {
        let ctx = slots.bitset_ctx();
        let mut worklist = BasicBlockWorkList::new(func, &ctx, self.approximation);
        let mut facts = HashMap::new();
        let limit = self.node_limit * func.blocks().len();
        let mut processed = 0_usize;
        while let Some(block_id) = worklist.pop() {
            if limit > 0 && processed >= limit {
                return Err(AnalysisError::Divergence { processed });
            }
            processed += 1;

            let tail = worklist
                .tail(block_id)
                .cloned()
                .unwrap_or_else(|| BitSet::bottom(&ctx));
            let head = transfer_block(func, slots, block_id, tail, &mut facts);
            worklist.set_calculated(block_id);
            for &pred in func.blocks()[block_id].predecessors() {
                if worklist.merge_tail(pred, &head, &ctx) || !worklist.is_calculated(pred) {
                    worklist.push(pred);
                }
            }
        }
        Ok((facts, processed))
    }

    fn solve_instructions(
        &self,
        func: &Function,
        slots: &SlotIndex,
    ) -> Result<(HashMap<OpPos, BitSet>, usize), AnalysisError> {
        let ctx = slots.bitset_ctx();
        let seeds: Vec<OpPos> = func
            .exit_blocks()
            .into_iter()
            .filter_map(|block_id| {
                let len = func.blocks()[block_id].operations().len();
                (len > 0).then(|| OpPos {
                    block_id,
                    op_id: len - 1,
                })
            })
            .collect();
        let node_num = func.instructions().count();
        let mut worklist = Worklist::new(&seeds, &ctx, Direction::Backward, self.approximation);
        let mut problem = InstructionLiveness { func, slots };
        let processed = SolveWorklist {
            node_limit: self.node_limit,
        }
        .solve(&mut problem, &mut worklist, &ctx, node_num)?;
        let (pre_facts, _) = worklist.into_facts();
        Ok((pre_facts, processed))
    }
}

impl LivenessResult {
    /// One line per source line with loads or stores, e.g.,
    /// `line 4: {a b }`.
    pub fn render_lines(&self, unit: &Unit) -> String {
        let mut result = String::new();
        for (line, live) in &self.lines {
            let names: String = self
                .slots
                .names(live, unit)
                .into_iter()
                .map(|name| format!("{name} "))
                .collect();
            writeln!(result, "line {line}: {{{names}}}").unwrap();
        }
        result
    }
}
