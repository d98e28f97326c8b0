use std::collections::HashSet;

use analysis::{
    AnalysisError,
    cfg::{CfgBlock, ControlFlowGraph, OpPos},
    domains::{
        BOOL_RANGE, FALSE_RANGE, Interval, JoinSemiLatticeNoContext, LatticeNoContext, Map, MapCtx,
        TRUE_RANGE,
    },
    solvers::{SolveChaotic, TransferFunction},
};
use log::debug;

use crate::{
    ir::{Annotations, BinaryOp, CmpPredicate, Function, InstrKind, Instruction, Operand, Unit},
    lexer::Identifier,
    slots::defined_values,
};

use super::TransferLogger;

pub type IntervalEnv = Map<Identifier, Interval>;
type IntervalCtx = MapCtx<Identifier, Interval>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct IntervalAnalysis {
    pub solver: SolveChaotic,
}

#[derive(Debug, Clone)]
pub struct IntervalResult {
    pub function: usize,
    /// The state at the end of each block.
    pub exits: Vec<IntervalEnv>,
    pub annotations: Annotations,
}

/// Whether the predicate holds for every pair, for no pair, or for some of
/// the pairs of values of the two ranges.
fn compare(pred: CmpPredicate, lhs: Interval, rhs: Interval) -> Interval {
    if lhs.is_bottom() || rhs.is_bottom() {
        return Interval::bottom_();
    }
    let disjoint = lhs.max < rhs.min || lhs.min > rhs.max;
    let same_constant = lhs.min == lhs.max && lhs == rhs;
    let (always, never) = match pred {
        CmpPredicate::Eq => (same_constant, disjoint),
        CmpPredicate::Ne => (disjoint, same_constant),
        CmpPredicate::Slt => (lhs.max < rhs.min, lhs.min >= rhs.max),
        CmpPredicate::Sle => (lhs.max <= rhs.min, lhs.min > rhs.max),
        CmpPredicate::Sgt => (lhs.min > rhs.max, lhs.max <= rhs.min),
        CmpPredicate::Sge => (lhs.min >= rhs.max, lhs.max < rhs.min),
    };
    if always {
        TRUE_RANGE
    } else if never {
        FALSE_RANGE
    } else {
        BOOL_RANGE
    }
}

/// The values of `lhs` for which `lhs pred rhs` can hold.
fn refine(pred: CmpPredicate, lhs: Interval, rhs: Interval) -> Interval {
    match pred {
        CmpPredicate::Eq => lhs.refine_eq(rhs),
        CmpPredicate::Ne => lhs.refine_ne(rhs),
        CmpPredicate::Slt => lhs.refine_lt(rhs),
        CmpPredicate::Sle => lhs.refine_le(rhs),
        CmpPredicate::Sgt => lhs.refine_gt(rhs),
        CmpPredicate::Sge => lhs.refine_ge(rhs),
    }
}

/// Whether `ptr` is overwritten after `pos` in the same block.
fn stored_after(func: &Function, pos: OpPos, ptr: Identifier) -> bool {
    func.blocks()[pos.block_id].operations()[pos.op_id + 1..]
        .iter()
        .any(|instr| matches!(instr.kind, InstrKind::Store { ptr: p, .. } if p == ptr))
}

struct IntervalTransfer {
    defined: HashSet<Identifier>,
}

impl IntervalTransfer {
    fn value(&self, op: &Operand, state: &IntervalEnv) -> Interval {
        match op {
            Operand::Const(c) => Interval::from(*c),
            Operand::Var(id) if self.defined.contains(id) => {
                state.get(id).copied().unwrap_or_else(Interval::bottom_)
            }
            Operand::Var(_) => Interval::top_(),
        }
    }

    /// Narrows `var` on an edge leaving `block`. If `var` was loaded in the
    /// same block and the variable was not overwritten since, the variable
    /// is narrowed too. Returns `None` when the edge is infeasible.
    fn narrow(
        &self,
        state: &mut IntervalEnv,
        func: &Function,
        block: usize,
        var: Identifier,
        refined: Interval,
    ) -> Option<()> {
        if refined.is_bottom() {
            return None;
        }
        state.insert(var, refined);
        let Some((
            pos,
            Instruction {
                kind: InstrKind::Load { ptr, .. },
                ..
            },
        )) = func.definition(var)
        else {
            return Some(());
        };
        if pos.block_id != block || stored_after(func, pos, *ptr) {
            return Some(());
        }
        let narrowed = self
            .value(&Operand::Var(*ptr), state)
            .meet_(&refined);
        if narrowed.is_bottom() {
            return None;
        }
        state.insert(*ptr, narrowed);
        Some(())
    }
}

impl TransferFunction<Function, IntervalEnv> for IntervalTransfer {
    fn operation(
        &mut self,
        _pos: OpPos,
        op: &Instruction,
        _cfg: &Function,
        _ctx: &IntervalCtx,
        pre_state: &IntervalEnv,
    ) -> IntervalEnv {
        let mut post_state = pre_state.clone();
        match &op.kind {
            InstrKind::Alloca { result } => {
                post_state.insert(*result, Interval::top_());
            }
            InstrKind::Load { result, ptr } => {
                post_state.insert(*result, self.value(&Operand::Var(*ptr), pre_state));
            }
            InstrKind::Store { value, ptr } => {
                post_state.insert(*ptr, self.value(value, pre_state));
            }
            InstrKind::Binary {
                op,
                result,
                lhs,
                rhs,
            } => {
                let lhs = self.value(lhs, pre_state);
                let rhs = self.value(rhs, pre_state);
                let range = match op {
                    BinaryOp::Add => lhs + rhs,
                    BinaryOp::Sub => lhs - rhs,
                };
                post_state.insert(*result, range);
            }
            InstrKind::Icmp {
                pred,
                result,
                lhs,
                rhs,
            } => {
                let range = compare(*pred, self.value(lhs, pre_state), self.value(rhs, pre_state));
                post_state.insert(*result, range);
            }
            InstrKind::Call {
                result: Some(result),
                ..
            } => {
                post_state.insert(*result, Interval::top_());
            }
            InstrKind::Call { result: None, .. }
            | InstrKind::Branch { .. }
            | InstrKind::Jump(_)
            | InstrKind::Ret(_)
            | InstrKind::Nop => {}
        }
        post_state
    }

    fn edge(
        &mut self,
        from: usize,
        to: usize,
        cfg: &Function,
        _ctx: &IntervalCtx,
        pre_state: &IntervalEnv,
    ) -> Option<IntervalEnv> {
        let Some(Instruction {
            kind: InstrKind::Branch { cond, then, els },
            ..
        }) = cfg.blocks()[from].terminator()
        else {
            return Some(pre_state.clone());
        };
        if then == els {
            return Some(pre_state.clone());
        }
        let Some((
            _,
            Instruction {
                kind: InstrKind::Icmp { pred, lhs, rhs, .. },
                ..
            },
        )) = cfg.definition(*cond)
        else {
            return Some(pre_state.clone());
        };
        let pred = if to == *then { *pred } else { pred.negate() };
        let lhs_range = self.value(lhs, pre_state);
        let rhs_range = self.value(rhs, pre_state);
        let mut post_state = pre_state.clone();
        if let Operand::Var(var) = lhs {
            let refined = refine(pred, lhs_range, rhs_range);
            self.narrow(&mut post_state, cfg, from, *var, refined)?;
        }
        if let Operand::Var(var) = rhs {
            let refined = refine(pred.swap(), rhs_range, lhs_range);
            self.narrow(&mut post_state, cfg, from, *var, refined)?;
        }
        Some(post_state)
    }
}

impl IntervalAnalysis {
    pub fn new(solver: SolveChaotic) -> Self {
        Self { solver }
    }

    /// Parameters start out unknown.
    pub fn run(&self, unit: &Unit, func_id: usize) -> Result<IntervalResult, AnalysisError> {
        let func = &unit.functions[func_id];
        debug!("interval analysis of @{}", unit.name(func.name));
        let mut seed = IntervalEnv::default();
        for param in &func.params {
            seed.insert(*param, Interval::top_());
        }
        let transfer = IntervalTransfer {
            defined: defined_values(func),
        };
        let mut logger = TransferLogger::new(unit, transfer);
        let exits = self.solver.clone().solve(
            func,
            seed,
            &IntervalCtx::for_join_semi_lattice(),
            &mut logger,
        )?;
        Ok(IntervalResult {
            function: func_id,
            exits,
            annotations: logger.get_annotations(),
        })
    }
}
