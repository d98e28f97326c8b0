use core::fmt::Debug;
use core::hash::Hash;
use std::collections::{HashMap, VecDeque};

use log::debug;

use crate::domains::Lattice;
use crate::errors::AnalysisError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

/// How facts flowing into the same node are combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Approximation {
    /// A fact holds if it holds on some path, facts are joined.
    May,
    /// A fact holds if it holds on every path, facts are met.
    Must,
}

/// The dependency graph and the semantics of a node level analysis, e.g.,
/// an analysis over single instructions instead of basic blocks.
pub trait WorklistProblem<D: Lattice> {
    type Node: Copy + Eq + Hash + Debug;

    /// Nodes reading the fact computed for `node`. Successors for forward
    /// analyses, predecessors for backward ones.
    fn dependents(&self, node: Self::Node) -> Vec<Self::Node>;

    /// Computes the output fact of `node` from its input fact.
    fn transfer(&mut self, node: Self::Node, ctx: &D::LatticeContext, input: &D) -> D;
}

/// Pending nodes and the facts computed so far. The queue never holds the
/// same node twice. For forward analyses the input of a node is its pre-fact
/// and the output is its post-fact, backward analyses swap the two.
pub struct Worklist<N, D> {
    queue: VecDeque<N>,
    pre_facts: HashMap<N, D>,
    post_facts: HashMap<N, D>,
    direction: Direction,
    approximation: Approximation,
}

impl<N, D> Worklist<N, D>
where
    N: Copy + Eq + Hash + Debug,
    D: Lattice,
{
    /// Queues the seeds with bottom as their input fact.
    pub fn new(
        seeds: &[N],
        ctx: &D::LatticeContext,
        direction: Direction,
        approximation: Approximation,
    ) -> Self {
        let mut result = Self {
            queue: VecDeque::new(),
            pre_facts: HashMap::new(),
            post_facts: HashMap::new(),
            direction,
            approximation,
        };
        for &seed in seeds {
            result.input_facts_mut().insert(seed, D::bottom(ctx));
            result.push(seed);
        }
        result
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn approximation(&self) -> Approximation {
        self.approximation
    }

    pub fn head(&self) -> Option<N> {
        self.queue.front().copied()
    }

    pub fn advance(&mut self) {
        self.queue.pop_front();
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_pending(&self, node: N) -> bool {
        self.queue.contains(&node)
    }

    /// Returns false if the node was already pending.
    pub fn push(&mut self, node: N) -> bool {
        if self.is_pending(node) {
            return false;
        }
        self.queue.push_back(node);
        true
    }

    pub fn pre_fact(&self, node: N) -> Option<&D> {
        self.pre_facts.get(&node)
    }

    pub fn post_fact(&self, node: N) -> Option<&D> {
        self.post_facts.get(&node)
    }

    pub fn input_fact(&self, node: N) -> Option<&D> {
        match self.direction {
            Direction::Forward => self.pre_facts.get(&node),
            Direction::Backward => self.post_facts.get(&node),
        }
    }

    pub fn output_fact(&self, node: N) -> Option<&D> {
        match self.direction {
            Direction::Forward => self.post_facts.get(&node),
            Direction::Backward => self.pre_facts.get(&node),
        }
    }

    fn input_facts_mut(&mut self) -> &mut HashMap<N, D> {
        match self.direction {
            Direction::Forward => &mut self.pre_facts,
            Direction::Backward => &mut self.post_facts,
        }
    }

    fn output_facts_mut(&mut self) -> &mut HashMap<N, D> {
        match self.direction {
            Direction::Forward => &mut self.post_facts,
            Direction::Backward => &mut self.pre_facts,
        }
    }

    /// Join for may analyses, meet for must analyses.
    pub fn merge(&self, lhs: &D, rhs: &D, ctx: &D::LatticeContext) -> D {
        match self.approximation {
            Approximation::May => lhs.join(rhs, ctx),
            Approximation::Must => lhs.meet(rhs, ctx),
        }
    }

    /// True if merging `candidate` into the stored output of `node` would not
    /// change it. A node without a stored output is never at a fixed point.
    pub fn is_fixed_point(&self, node: N, candidate: &D, ctx: &D::LatticeContext) -> bool {
        self.output_fact(node)
            .is_some_and(|stored| self.merge(stored, candidate, ctx) == *stored)
    }

    /// Merges `fact` into the stored output of `node`.
    pub fn record(&mut self, node: N, fact: D, ctx: &D::LatticeContext) {
        let merged = match self.output_fact(node) {
            Some(stored) => self.merge(stored, &fact, ctx),
            None => fact,
        };
        self.output_facts_mut().insert(node, merged);
    }

    /// Merges the output of `from` into the input of `to` and queues `to`.
    pub fn propagate(&mut self, from: N, to: N, ctx: &D::LatticeContext) {
        let Some(fact) = self.output_fact(from).cloned() else {
            return;
        };
        let merged = match self.input_fact(to) {
            Some(stored) => self.merge(stored, &fact, ctx),
            None => fact,
        };
        self.input_facts_mut().insert(to, merged);
        self.push(to);
    }

    /// The pre-facts and the post-facts of every visited node.
    pub fn into_facts(self) -> (HashMap<N, D>, HashMap<N, D>) {
        (self.pre_facts, self.post_facts)
    }
}

/// Drives a [`Worklist`] to a fixed point: the head of the queue is
/// transferred, and when its output changed the dependents are updated and
/// queued.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SolveWorklist {
    /// Approximate number of visits allowed per node, zero means no limit.
    pub node_limit: usize,
}

impl Default for SolveWorklist {
    fn default() -> Self {
        Self { node_limit: 20 }
    }
}

impl SolveWorklist {
    /// Returns the number of processed nodes.
    ///
    /// # Arguments
    ///
    /// * `node_num` - Number of nodes in the dependency graph, used to scale
    ///   the iteration limit.
    pub fn solve<P, D>(
        self,
        problem: &mut P,
        worklist: &mut Worklist<P::Node, D>,
        ctx: &D::LatticeContext,
        node_num: usize,
    ) -> Result<usize, AnalysisError>
    where
        P: WorklistProblem<D>,
        D: Lattice,
    {
        let limit = self.node_limit * node_num;
        let mut processed = 0_usize;
        while let Some(node) = worklist.head() {
            if limit > 0 && processed >= limit {
                return Err(AnalysisError::Divergence { processed });
            }
            processed += 1;

            let input = worklist
                .input_fact(node)
                .cloned()
                .unwrap_or_else(|| D::bottom(ctx));
            let output = problem.transfer(node, ctx, &input);
            let changed = !worklist.is_fixed_point(node, &output, ctx);
            // Dequeued before the propagation, so a node depending on
            // itself is queued again.
            worklist.advance();
            if changed {
                debug!("worklist: {node:?} -> {output:?}");
                worklist.record(node, output, ctx);
                for dependent in problem.dependents(node) {
                    worklist.propagate(node, dependent, ctx);
                }
            }
        }
        debug!("worklist converged after {processed} steps");
        Ok(processed)
    }
}
