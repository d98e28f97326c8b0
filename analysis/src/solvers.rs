use core::marker::PhantomData;
use std::collections::HashSet;

use log::debug;

use super::cfg::{CfgBlock, ControlFlowGraph, OpPos, RPOWorklist, get_back_edges};
use super::domains::JoinSemiLattice;
use super::errors::AnalysisError;

/// Transfer functions need to implement this trait and define either
/// [`TransferFunction::block`] or [`TransferFunction::operation`].
/// For the most common cases creating [`OpTransfer`] or [`BlockTransfer`]
/// from a closure should be sufficient.
pub trait TransferFunction<Cfg, D>
where
    Cfg: ControlFlowGraph,
    D: JoinSemiLattice,
{
    /// Optional function to apply the effects of traversing an edge. The most common
    /// use case is to implement conditional jumps. Returning `None` marks the
    /// edge infeasible.
    fn edge(
        &mut self,
        _from: usize,
        _to: usize,
        _cfg: &Cfg,
        _ctx: &D::LatticeContext,
        pre_state: &D,
    ) -> Option<D> {
        Some(pre_state.clone())
    }

    /// Apply the effects of a block to the analysis state. In case [`TransferFunction::operation`]
    /// is implemented, the default implementation should be sufficient.
    fn block(&mut self, block_id: usize, cfg: &Cfg, ctx: &D::LatticeContext, pre_state: &D) -> D {
        let mut post_state = pre_state.clone();
        for (op_id, op) in cfg.blocks()[block_id].operations().iter().enumerate() {
            post_state = self.operation(OpPos { block_id, op_id }, op, cfg, ctx, &post_state);
        }
        post_state
    }

    /// Apply the effects of an operation to the analysis state. In case [`TransferFunction::block`]
    /// is implemented, the default implementation should be sufficient.
    fn operation(
        &mut self,
        _pos: OpPos,
        _op: &<<Cfg as ControlFlowGraph>::Block as CfgBlock>::Operation,
        _cfg: &Cfg,
        _ctx: &D::LatticeContext,
        pre_state: &D,
    ) -> D {
        pre_state.clone()
    }
}

/// Small utility so users do not need to create a new struct for every
/// transfer function for operations.
pub struct OpTransfer<F, Cfg, D>
where
    Cfg: ControlFlowGraph,
    D: JoinSemiLattice,
    F: FnMut(
        OpPos,
        &<<Cfg as ControlFlowGraph>::Block as CfgBlock>::Operation,
        &Cfg,
        &D::LatticeContext,
        &D,
    ) -> D,
{
    func: F,
    phantom: PhantomData<(Cfg, D)>,
}

impl<F, Cfg, D> TransferFunction<Cfg, D> for OpTransfer<F, Cfg, D>
where
    Cfg: ControlFlowGraph,
    D: JoinSemiLattice,
    F: FnMut(
        OpPos,
        &<<Cfg as ControlFlowGraph>::Block as CfgBlock>::Operation,
        &Cfg,
        &D::LatticeContext,
        &D,
    ) -> D,
{
    fn operation(
        &mut self,
        pos: OpPos,
        op: &<<Cfg as ControlFlowGraph>::Block as CfgBlock>::Operation,
        cfg: &Cfg,
        ctx: &<D as JoinSemiLattice>::LatticeContext,
        pre_state: &D,
    ) -> D {
        (self.func)(pos, op, cfg, ctx, pre_state)
    }
}

impl<F, Cfg, D> OpTransfer<F, Cfg, D>
where
    Cfg: ControlFlowGraph,
    D: JoinSemiLattice,
    F: FnMut(
        OpPos,
        &<<Cfg as ControlFlowGraph>::Block as CfgBlock>::Operation,
        &Cfg,
        &D::LatticeContext,
        &D,
    ) -> D,
{
    /// Create a new transfer function for operations from a closure or function.
    pub fn new(func: F) -> Self {
        Self {
            func,
            phantom: PhantomData,
        }
    }
}

/// Small utility so users do not need to create a new struct for every
/// transfer function for blocks.
pub struct BlockTransfer<F, Cfg, D>
where
    Cfg: ControlFlowGraph,
    D: JoinSemiLattice,
    F: FnMut(usize, &Cfg, &D::LatticeContext, &D) -> D,
{
    func: F,
    phantom: PhantomData<(Cfg, D)>,
}

impl<F, Cfg, D> TransferFunction<Cfg, D> for BlockTransfer<F, Cfg, D>
where
    Cfg: ControlFlowGraph,
    D: JoinSemiLattice,
    F: FnMut(usize, &Cfg, &D::LatticeContext, &D) -> D,
{
    fn block(
        &mut self,
        block_id: usize,
        cfg: &Cfg,
        ctx: &<D as JoinSemiLattice>::LatticeContext,
        pre_state: &D,
    ) -> D {
        (self.func)(block_id, cfg, ctx, pre_state)
    }
}

impl<F, Cfg, D> BlockTransfer<F, Cfg, D>
where
    Cfg: ControlFlowGraph,
    D: JoinSemiLattice,
    F: FnMut(usize, &Cfg, &D::LatticeContext, &D) -> D,
{
    /// Create a new transfer function for blocks from a closure or function.
    pub fn new(func: F) -> Self {
        Self {
            func,
            phantom: PhantomData,
        }
    }
}

fn loop_heads<Cfg: ControlFlowGraph>(cfg: &Cfg) -> HashSet<usize> {
    get_back_edges(cfg)
        .iter()
        .map(|&(_, target)| target)
        .collect()
}

/// Join of the feasible edges coming from reached predecessors. The entry
/// block also receives the seed. Returns `None` when nothing flows into the
/// block.
fn merge_predecessors<Cfg, D, F>(
    block: usize,
    cfg: &Cfg,
    seed: &D,
    lat_ctx: &D::LatticeContext,
    post_states: &[D],
    reached: &[bool],
    transfer: &mut F,
) -> Option<D>
where
    Cfg: ControlFlowGraph,
    D: JoinSemiLattice,
    F: TransferFunction<Cfg, D>,
{
    let mut pre_state = (block == 0).then(|| seed.clone());
    for &pred in cfg.blocks()[block].predecessors() {
        if !reached[pred] {
            continue;
        }
        if let Some(transferred) = transfer.edge(pred, block, cfg, lat_ctx, &post_states[pred]) {
            pre_state = Some(match pre_state {
                Some(state) => state.join(&transferred, lat_ctx),
                None => transferred,
            });
        }
    }
    pre_state
}

/// Bookkeeping of a finished [`SolveMonotone`] run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolverRun {
    /// Number of blocks processed.
    pub processed: usize,
    /// Whether any state flowed into a block. The post state of a block
    /// that was not reached stays bottom.
    pub reached: Vec<bool>,
}

/// A basic solver for monotonic transfer functions. It is also doing
/// widening on loop heads. The solver is using a worklist that visits
/// the queued nodes in reverse post-order.
///
/// Requirements:
/// * All the back edges must target the loop head (node dominating every
///   node within the loop.)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SolveMonotone {
    /// Set the approximate iteration limit per node. If the limit is reached
    /// (the analysis did not converge in the permitted number of steps),
    /// the solver gives up with [`AnalysisError::Divergence`]. Zero means
    /// no limit.
    pub node_limit: usize,
}

impl Default for SolveMonotone {
    fn default() -> Self {
        Self { node_limit: 20 }
    }
}

impl SolveMonotone {
    /// Run the solver on a CFG mutating the analysis states in place.
    ///
    /// # Arguments
    ///
    /// * `seed` - The state flowing into the entry block.
    /// * `post_states` - The analysis state after each CFG block.
    /// * `transfer` - Function to apply the effects of blocks, edges, operations.
    pub fn solve_in_place<Cfg, D, F>(
        self,
        cfg: &Cfg,
        seed: &D,
        lat_ctx: &D::LatticeContext,
        post_states: &mut [D],
        transfer: &mut F,
    ) -> Result<SolverRun, AnalysisError>
    where
        Cfg: ControlFlowGraph,
        D: JoinSemiLattice,
        F: TransferFunction<Cfg, D>,
    {
        let node_num = cfg.blocks().len();
        if node_num == 0 {
            return Ok(SolverRun {
                processed: 0,
                reached: Vec::new(),
            });
        }
        let loop_heads = loop_heads(cfg);

        let mut visited = vec![false; node_num];
        let mut worklist = RPOWorklist::new(cfg);
        worklist.push(0);

        let limit = self.node_limit * node_num;
        let mut processed_nodes = 0_usize;
        while let Some(current) = worklist.pop() {
            if limit > 0 && processed_nodes >= limit {
                return Err(AnalysisError::Divergence {
                    processed: processed_nodes,
                });
            }

            let Some(pre_state) =
                merge_predecessors(current, cfg, seed, lat_ctx, post_states, &visited, transfer)
            else {
                processed_nodes += 1;
                continue;
            };
            let mut post_state = transfer.block(current, cfg, lat_ctx, &pre_state);

            if loop_heads.contains(&current) {
                post_state =
                    post_state.widen(&post_states[current], lat_ctx, processed_nodes / node_num);
            }

            processed_nodes += 1;
            if visited[current] && post_states[current] == post_state {
                continue;
            }

            visited[current] = true;
            post_states[current] = post_state;
            worklist.push_successors(current, cfg);
        }
        debug!("monotone solver converged after {processed_nodes} steps");
        Ok(SolverRun {
            processed: processed_nodes,
            reached: visited,
        })
    }

    /// Run the solver on a CFG returning the analysis states at the end of
    /// each basic block.
    ///
    /// # Arguments
    ///
    /// * `seed` - The initial program state for the start node. This often has
    ///   the initial abstract values for the formal parameters of a function.
    /// * `transfer` - Function to apply the effects of blocks, edges, operations.
    pub fn solve<Cfg, D, F>(
        self,
        cfg: &Cfg,
        seed: D,
        lat_ctx: &D::LatticeContext,
        transfer: &mut F,
    ) -> Result<Vec<D>, AnalysisError>
    where
        Cfg: ControlFlowGraph,
        D: JoinSemiLattice,
        F: TransferFunction<Cfg, D>,
    {
        let mut post_states = vec![D::bottom(lat_ctx); cfg.blocks().len()];
        self.solve_in_place(cfg, &seed, lat_ctx, &mut post_states, transfer)?;
        Ok(post_states)
    }
}

/// Chaotic iteration: sweeps over every block in layout order until a
/// whole sweep leaves all the block entry states unchanged. Blocks nothing
/// flows into are skipped and keep a bottom state. Loop heads are
/// widened on every sweep. Cheaper bookkeeping than [`SolveMonotone`] at
/// the cost of revisiting blocks whose inputs did not change.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SolveChaotic {
    /// Maximum number of sweeps, zero means no limit.
    pub sweep_limit: usize,
}

impl Default for SolveChaotic {
    fn default() -> Self {
        Self { sweep_limit: 20 }
    }
}

impl SolveChaotic {
    /// Returns the states at the end of each block.
    pub fn solve<Cfg, D, F>(
        self,
        cfg: &Cfg,
        seed: D,
        lat_ctx: &D::LatticeContext,
        transfer: &mut F,
    ) -> Result<Vec<D>, AnalysisError>
    where
        Cfg: ControlFlowGraph,
        D: JoinSemiLattice,
        F: TransferFunction<Cfg, D>,
    {
        let node_num = cfg.blocks().len();
        let loop_heads = loop_heads(cfg);
        let mut pre_states = vec![D::bottom(lat_ctx); node_num];
        let mut post_states = vec![D::bottom(lat_ctx); node_num];
        let mut reached = vec![false; node_num];
        let mut sweep = 0;
        loop {
            if self.sweep_limit > 0 && sweep >= self.sweep_limit {
                return Err(AnalysisError::Divergence {
                    processed: sweep * node_num,
                });
            }

            let mut changed = false;
            for block in 0..node_num {
                let Some(mut pre_state) = merge_predecessors(
                    block,
                    cfg,
                    &seed,
                    lat_ctx,
                    &post_states,
                    &reached,
                    transfer,
                ) else {
                    continue;
                };
                if !reached[block] {
                    reached[block] = true;
                    changed = true;
                }
                if loop_heads.contains(&block) {
                    let previous = &pre_states[block];
                    pre_state = pre_state
                        .join(previous, lat_ctx)
                        .widen(previous, lat_ctx, sweep);
                }
                if pre_state != pre_states[block] {
                    changed = true;
                    pre_states[block] = pre_state;
                }
                post_states[block] = transfer.block(block, cfg, lat_ctx, &pre_states[block]);
            }
            sweep += 1;

            if !changed {
                debug!("chaotic iteration stabilized after {sweep} sweeps");
                return Ok(post_states);
            }
        }
    }
}

mod worklist;
pub use worklist::*;
