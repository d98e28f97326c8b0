use core::fmt::Write;
use std::collections::{HashMap, HashSet, VecDeque};

use analysis::{
    AnalysisError,
    cfg::{CfgBlock, ControlFlowGraph, OpPos},
    domains::{JoinSemiLattice, JoinSemiLatticeNoContext, Map, MapCtx, Sign},
    solvers::{SolveMonotone, TransferFunction},
};
use itertools::Itertools;
use log::{debug, info};

use crate::{
    call_graph::CallGraph,
    ir::{
        AnnotationMap, BinaryOp, CmpPredicate, Function, InstrKind, Instruction,
        Operand, Unit,
    },
    lexer::Identifier,
    slots::{SlotIndex, defined_values},
};

use super::TransferLogger;

pub type SignEnv = Map<Identifier, Sign>;
type SignCtx = MapCtx<Identifier, Sign>;

/// How the arguments of a call reach the callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallMode {
    /// One summary per function. The arguments of all the call sites are
    /// joined into the entry state of the callee, and every call site sees
    /// the same return value.
    #[default]
    Insensitive,
    /// The callee is analyzed for each distinct list of argument signs, the
    /// results are cached. Recursion yields Top.
    Sensitive,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignAnalysis {
    pub solver: SolveMonotone,
    pub mode: CallMode,
}

/// What is known about a function after the analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSigns {
    /// The signs of the parameters.
    pub entry: Vec<Sign>,
    /// The state at the end of each block.
    pub exits: Vec<SignEnv>,
    pub ret: Sign,
    pub analyzed: bool,
}

impl FunctionSigns {
    fn new(func: &Function) -> Self {
        Self {
            entry: vec![Sign::Bottom; func.params.len()],
            exits: vec![SignEnv::default(); func.blocks().len()],
            ret: Sign::Bottom,
            analyzed: false,
        }
    }

    fn seed(&self, func: &Function) -> SignEnv {
        let mut seed = SignEnv::default();
        for (param, sign) in func.params.iter().zip(&self.entry) {
            seed.insert(*param, *sign);
        }
        seed
    }
}

#[derive(Debug, Clone)]
pub struct SignResult {
    /// Indexed by function index, declarations are never analyzed.
    pub functions: Vec<FunctionSigns>,
    pub annotations: AnnotationMap,
    /// Number of blocks processed over all the solver runs.
    pub processed: usize,
    /// Number of solver runs.
    pub runs: usize,
}

/// Missing arguments are Top, extra ones are dropped.
fn fit_arguments(args: &[Sign], arity: usize) -> Vec<Sign> {
    (0..arity)
        .map(|i| args.get(i).copied().unwrap_or(Sign::Top))
        .collect()
}

fn compare(pred: CmpPredicate, lhs: Sign, rhs: Sign) -> Sign {
    use core::cmp::Ordering::*;

    if lhs == Sign::Bottom || rhs == Sign::Bottom {
        return Sign::Bottom;
    }
    let Some(ord) = lhs.strict_cmp(rhs) else {
        return Sign::Top;
    };
    let holds = match pred {
        CmpPredicate::Eq => ord == Equal,
        CmpPredicate::Ne => ord != Equal,
        CmpPredicate::Slt => ord == Less,
        CmpPredicate::Sle => ord != Greater,
        CmpPredicate::Sgt => ord == Greater,
        CmpPredicate::Sge => ord != Less,
    };
    if holds { Sign::Positive } else { Sign::Zero }
}

/// Decides the value of the calls during the analysis of a function.
trait CallSemantics {
    fn call(&mut self, callee: usize, args: Vec<Sign>) -> Sign;
}

struct SignTransfer<'unit, C: CallSemantics> {
    unit: &'unit Unit,
    defined: HashSet<Identifier>,
    calls: C,
}

impl<'unit, C: CallSemantics> SignTransfer<'unit, C> {
    fn new(unit: &'unit Unit, func: &Function, calls: C) -> Self {
        Self {
            unit,
            defined: defined_values(func),
            calls,
        }
    }

    /// Constants have a known sign. Values without a definition are
    /// unknown, defined values without a computed sign are not reached yet.
    fn value(&self, op: &Operand, state: &SignEnv) -> Sign {
        match op {
            Operand::Const(c) => Sign::from(*c),
            Operand::Var(id) if self.defined.contains(id) => {
                state.get(id).copied().unwrap_or(Sign::Bottom)
            }
            Operand::Var(_) => Sign::Top,
        }
    }
}

impl<C: CallSemantics> TransferFunction<Function, SignEnv> for SignTransfer<'_, C> {
    fn operation(
        &mut self,
        _pos: OpPos,
        op: &Instruction,
        _cfg: &Function,
        _ctx: &SignCtx,
        pre_state: &SignEnv,
    ) -> SignEnv {
        let mut post_state = pre_state.clone();
        match &op.kind {
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
                let sign = match op {
                    BinaryOp::Add => lhs + rhs,
                    BinaryOp::Sub => lhs - rhs,
                };
                post_state.insert(*result, sign);
            }
            InstrKind::Icmp {
                pred,
                result,
                lhs,
                rhs,
            } => {
                let sign = compare(*pred, self.value(lhs, pre_state), self.value(rhs, pre_state));
                post_state.insert(*result, sign);
            }
            InstrKind::Call {
                result,
                callee,
                args,
            } => {
                let args = args.iter().map(|a| self.value(a, pre_state)).collect();
                let ret = match self.unit.resolve_callee(*callee) {
                    Some(callee) => self.calls.call(callee, args),
                    None => Sign::Top,
                };
                if let Some(result) = result {
                    post_state.insert(*result, ret);
                }
            }
            InstrKind::Alloca { .. }
            | InstrKind::Branch { .. }
            | InstrKind::Jump(_)
            | InstrKind::Ret(_)
            | InstrKind::Nop => {}
        }
        post_state
    }

    /// `br (icmp sgt %x, _)` makes `%x` and the variable it was loaded
    /// from Positive on the true edge, and Top on the false edge.
    fn edge(
        &mut self,
        from: usize,
        to: usize,
        cfg: &Function,
        _ctx: &SignCtx,
        pre_state: &SignEnv,
    ) -> Option<SignEnv> {
        if pre_state.is_empty() {
            return Some(pre_state.clone());
        }
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
                kind:
                    InstrKind::Icmp {
                        pred: CmpPredicate::Sgt,
                        lhs: Operand::Var(lhs),
                        ..
                    },
                ..
            },
        )) = cfg.definition(*cond)
        else {
            return Some(pre_state.clone());
        };
        let refined = if to == *then {
            Sign::Positive
        } else {
            Sign::Top
        };
        let mut post_state = pre_state.clone();
        post_state.insert(*lhs, refined);
        if let Some((
            _,
            Instruction {
                kind: InstrKind::Load { ptr, .. },
                ..
            },
        )) = cfg.definition(*lhs)
        {
            post_state.insert(*ptr, refined);
        }
        Some(post_state)
    }
}

/// The join of the returned values over the reachable `ret` instructions.
fn return_sign(
    func: &Function,
    exits: &[SignEnv],
    reached: &[bool],
    defined: &HashSet<Identifier>,
) -> Sign {
    let mut ret = Sign::Bottom;
    for ((block, exit), _) in func
        .blocks()
        .iter()
        .zip(exits)
        .zip(reached)
        .filter(|(_, reached)| **reached)
    {
        let Some(Instruction {
            kind: InstrKind::Ret(Some(value)),
            ..
        }) = block.terminator()
        else {
            continue;
        };
        let sign = match value {
            Operand::Const(c) => Sign::from(*c),
            Operand::Var(id) if defined.contains(id) => {
                exit.get(id).copied().unwrap_or(Sign::Bottom)
            }
            Operand::Var(_) => Sign::Top,
        };
        ret = ret.join_(&sign);
    }
    ret
}

/// Records the arguments of the calls, every call site sees the current
/// summary of the callee.
struct QueuedCalls<'a> {
    summaries: &'a [FunctionSigns],
    requests: HashMap<usize, Vec<Sign>>,
}

impl CallSemantics for QueuedCalls<'_> {
    fn call(&mut self, callee: usize, args: Vec<Sign>) -> Sign {
        let summary = &self.summaries[callee];
        let args = fit_arguments(&args, summary.entry.len());
        self.requests
            .entry(callee)
            .and_modify(|prev| {
                for (p, a) in prev.iter_mut().zip(&args) {
                    *p = p.join_(a);
                }
            })
            .or_insert(args);
        if summary.analyzed {
            summary.ret
        } else {
            Sign::Top
        }
    }
}

/// Analyzes the callee right away for the given arguments.
struct EagerCalls<'s, 'unit> {
    state: &'s mut SensitiveState<'unit>,
    error: Option<AnalysisError>,
}

impl CallSemantics for EagerCalls<'_, '_> {
    fn call(&mut self, callee: usize, args: Vec<Sign>) -> Sign {
        let args = fit_arguments(&args, self.state.unit.functions[callee].params.len());
        if let Some(ret) = self.state.cache.get(&(callee, args.clone())) {
            return *ret;
        }
        if self.state.in_progress.contains(&callee) {
            debug!("recursive call to function {callee}, assuming Top");
            return Sign::Top;
        }
        match self.state.analyze(callee, args.clone()) {
            Ok(ret) => {
                self.state.cache.insert((callee, args), ret);
                ret
            }
            Err(err) => {
                self.error.get_or_insert(err);
                Sign::Top
            }
        }
    }
}

struct SensitiveState<'unit> {
    unit: &'unit Unit,
    solver: SolveMonotone,
    cache: HashMap<(usize, Vec<Sign>), Sign>,
    in_progress: HashSet<usize>,
    functions: Vec<FunctionSigns>,
    annotations: AnnotationMap,
    processed: usize,
    runs: usize,
}

impl SensitiveState<'_> {
    /// Analyzes `func_id` in a single context. The summary of the function
    /// is the join over all of its contexts.
    fn analyze(&mut self, func_id: usize, entry: Vec<Sign>) -> Result<Sign, AnalysisError> {
        let unit = self.unit;
        let func = &unit.functions[func_id];
        let solver = self.solver.clone();
        let mut seed = SignEnv::default();
        for (param, sign) in func.params.iter().zip(&entry) {
            seed.insert(*param, *sign);
        }

        self.in_progress.insert(func_id);
        let calls = EagerCalls {
            state: self,
            error: None,
        };
        let mut transfer = TransferLogger::new(unit, SignTransfer::new(unit, func, calls));
        let mut exits = vec![SignEnv::default(); func.blocks().len()];
        let solved = solver.solve_in_place(
            func,
            &seed,
            &SignCtx::for_join_semi_lattice(),
            &mut exits,
            &mut transfer,
        );
        let (anns, inner) = transfer.into_parts();
        let error = inner.calls.error;
        let defined = inner.defined;
        self.in_progress.remove(&func_id);

        let solved = solved?;
        if let Some(err) = error {
            return Err(err);
        }
        self.processed += solved.processed;
        self.runs += 1;

        let ret = return_sign(func, &exits, &solved.reached, &defined);
        let summary = &mut self.functions[func_id];
        if summary.analyzed {
            summary.entry = summary.entry.iter().zip(&entry).map(|(a, b)| a.join_(b)).collect();
            summary.exits = summary
                .exits
                .iter()
                .zip(&exits)
                .map(|(a, b)| a.join(b, &SignCtx::for_join_semi_lattice()))
                .collect();
            summary.ret = summary.ret.join_(&ret);
        } else {
            *summary = FunctionSigns {
                entry,
                exits,
                ret,
                analyzed: true,
            };
        }
        self.annotations.insert(func_id, anns);
        Ok(ret)
    }
}

impl SignAnalysis {
    pub fn new(solver: SolveMonotone, mode: CallMode) -> Self {
        Self { solver, mode }
    }

    /// Analyzes every defined function of the unit. Functions nobody calls
    /// get Top parameters.
    pub fn run(&self, unit: &Unit, call_graph: &CallGraph) -> Result<SignResult, AnalysisError> {
        let result = match self.mode {
            CallMode::Insensitive => self.run_insensitive(unit, call_graph),
            CallMode::Sensitive => self.run_sensitive(unit, call_graph),
        }?;
        info!(
            "sign analysis: {} solver runs, {} blocks processed",
            result.runs, result.processed
        );
        Ok(result)
    }

    fn run_insensitive(
        &self,
        unit: &Unit,
        call_graph: &CallGraph,
    ) -> Result<SignResult, AnalysisError> {
        let ctx = SignCtx::for_join_semi_lattice();
        let mut functions: Vec<_> = unit.functions.iter().map(FunctionSigns::new).collect();
        let mut annotations = AnnotationMap::new();
        let mut queue = VecDeque::new();
        for &func_id in &call_graph.entry_functions {
            functions[func_id].entry = vec![Sign::Top; unit.functions[func_id].params.len()];
            queue.push_back(func_id);
        }

        let defined_num = unit.defined_functions().count();
        let limit = self.solver.node_limit * defined_num;
        let mut processed = 0;
        let mut runs = 0;
        loop {
            while let Some(func_id) = queue.pop_front() {
                if limit > 0 && runs >= limit {
                    return Err(AnalysisError::Divergence { processed: runs });
                }
                runs += 1;
                let func = &unit.functions[func_id];
                debug!("analyzing @{}", unit.name(func.name));

                let seed = functions[func_id].seed(func);
                let mut exits = vec![SignEnv::default(); func.blocks().len()];
                let calls = QueuedCalls {
                    summaries: &functions,
                    requests: HashMap::new(),
                };
                let mut transfer = TransferLogger::new(unit, SignTransfer::new(unit, func, calls));
                let solved = self
                    .solver
                    .clone()
                    .solve_in_place(func, &seed, &ctx, &mut exits, &mut transfer)?;
                processed += solved.processed;
                let (anns, inner) = transfer.into_parts();
                let requests = inner.calls.requests;
                let ret = return_sign(func, &exits, &solved.reached, &inner.defined);
                annotations.insert(func_id, anns);

                let summary = &mut functions[func_id];
                let changed = !summary.analyzed || summary.exits != exits || summary.ret != ret;
                summary.exits = exits;
                summary.ret = ret;
                summary.analyzed = true;
                if changed {
                    for &caller in &call_graph.callers[func_id] {
                        if !queue.contains(&caller) {
                            queue.push_back(caller);
                        }
                    }
                }

                for (callee, args) in requests.into_iter().sorted_by_key(|(callee, _)| *callee) {
                    let summary = &mut functions[callee];
                    let entry: Vec<_> =
                        summary.entry.iter().zip(&args).map(|(a, b)| a.join_(b)).collect();
                    if entry != summary.entry || !summary.analyzed {
                        summary.entry = entry;
                        if !queue.contains(&callee) {
                            queue.push_back(callee);
                        }
                    }
                }
            }

            // Not reachable from any entry function, e.g., mutual recursion
            // without outside callers.
            let Some((func_id, func)) = unit
                .defined_functions()
                .find(|(id, _)| !functions[*id].analyzed)
            else {
                break;
            };
            functions[func_id].entry = vec![Sign::Top; func.params.len()];
            queue.push_back(func_id);
        }

        Ok(SignResult {
            functions,
            annotations,
            processed,
            runs,
        })
    }

    fn run_sensitive(
        &self,
        unit: &Unit,
        call_graph: &CallGraph,
    ) -> Result<SignResult, AnalysisError> {
        let mut state = SensitiveState {
            unit,
            solver: self.solver.clone(),
            cache: HashMap::new(),
            in_progress: HashSet::new(),
            functions: unit.functions.iter().map(FunctionSigns::new).collect(),
            annotations: AnnotationMap::new(),
            processed: 0,
            runs: 0,
        };
        let roots = call_graph
            .entry_functions
            .iter()
            .copied()
            .chain(unit.defined_functions().map(|(id, _)| id));
        for func_id in roots {
            if state.functions[func_id].analyzed {
                continue;
            }
            let entry = vec![Sign::Top; unit.functions[func_id].params.len()];
            state.analyze(func_id, entry)?;
        }
        Ok(SignResult {
            functions: state.functions,
            annotations: state.annotations,
            processed: state.processed,
            runs: state.runs,
        })
    }
}

impl SignResult {
    /// The signature with the parameter and return signs, followed by the
    /// signs of the parameters and stack variables at the end of each block.
    pub fn render_summary(&self, unit: &Unit, func_id: usize) -> String {
        let func = &unit.functions[func_id];
        let summary = &self.functions[func_id];
        let params = func
            .params
            .iter()
            .zip(&summary.entry)
            .map(|(p, s)| format!("%{}: {s}", unit.name(*p)))
            .join(", ");
        let mut result = format!("@{}({params}) -> {}\n", unit.name(func.name), summary.ret);
        let allocas = SlotIndex::allocas(func);
        let vars = SlotIndex::new(func.params.iter().chain(allocas.variables()).copied());
        if vars.is_empty() {
            return result;
        }
        for (block, exit) in func.blocks().iter().zip(&summary.exits) {
            let values = vars
                .variables()
                .iter()
                .map(|v| {
                    let sign = exit.get(v).copied().unwrap_or(Sign::Bottom);
                    format!("%{} {sign}", unit.name(*v))
                })
                .join(", ");
            writeln!(result, "  {}: {values}", unit.name(block.label)).unwrap();
        }
        result
    }
}
