use super::cfg::{CfgBlock, ControlFlowGraph, OpPos};
use super::cfg_tests::TestCfg;
use super::domains::*;
use super::errors::AnalysisError;
use super::solvers::*;

/// Adds the constant of every operation to the single tracked variable.
fn counter_transfer() -> impl TransferFunction<TestCfg, Interval> {
    OpTransfer::<_, TestCfg, Interval>::new(
        |_pos: OpPos, op: &i64, _cfg: &TestCfg, _ctx: &(), pre: &Interval| {
            *pre + Interval::from(*op)
        },
    )
}

/// Like [`counter_transfer`] but the loop exits once the variable
/// reaches 10: the edge from block 1 to block 2 is the `x < 10` branch.
struct BoundedCounter;

impl TransferFunction<TestCfg, Interval> for BoundedCounter {
    fn edge(
        &mut self,
        from: usize,
        to: usize,
        _cfg: &TestCfg,
        _ctx: &(),
        pre_state: &Interval,
    ) -> Option<Interval> {
        let refined = match (from, to) {
            (1, 2) => pre_state.refine_lt(Interval::from(10)),
            (1, 3) => pre_state.refine_ge(Interval::from(10)),
            _ => *pre_state,
        };
        (!refined.is_bottom()).then_some(refined)
    }

    fn operation(
        &mut self,
        _pos: OpPos,
        op: &i64,
        _cfg: &TestCfg,
        _ctx: &(),
        pre_state: &Interval,
    ) -> Interval {
        *pre_state + Interval::from(*op)
    }
}

// 0 -> 1 -> 3
//      ^ \
//      |  2
//      |--|
fn counter_loop() -> TestCfg {
    let mut cfg = TestCfg::new(4);
    cfg.add_edge(0, 1)
        .add_edge(1, 2)
        .add_edge(1, 3)
        .add_edge(2, 1)
        .add_ops(2, &[1]);
    cfg
}

#[test]
fn monotone_straight_line() {
    let mut cfg = TestCfg::new(3);
    cfg.add_edge(0, 1)
        .add_edge(1, 2)
        .add_ops(0, &[2, 3])
        .add_ops(1, &[-10]);

    let states = SolveMonotone::default()
        .solve(&cfg, Interval::from(0), &(), &mut counter_transfer())
        .unwrap();
    assert_eq!(states, vec![Interval::from(5), Interval::from(-5), Interval::from(-5)]);
}

#[test]
fn monotone_widens_unbounded_counter() {
    let cfg = counter_loop();
    let states = SolveMonotone::default()
        .solve(&cfg, Interval::from(0), &(), &mut counter_transfer())
        .unwrap();
    assert_eq!(states[1], Interval::new(0, INF));
    assert_eq!(states[3], Interval::new(0, INF));
}

#[test]
fn monotone_bounded_counter() {
    let cfg = counter_loop();
    let states = SolveMonotone::default()
        .solve(&cfg, Interval::from(0), &(), &mut BoundedCounter)
        .unwrap();
    assert_eq!(states[2], Interval::new(1, 10));
    assert_eq!(states[3], Interval::from(10));
}

#[test]
fn monotone_divergence_is_reported() {
    let cfg = counter_loop();
    let solver = SolveMonotone { node_limit: 1 };
    let result = solver.solve(&cfg, Interval::from(0), &(), &mut counter_transfer());
    assert!(matches!(result, Err(AnalysisError::Divergence { .. })));
}

#[test]
fn monotone_block_transfer() {
    // Counts the blocks along the paths reaching each block.
    let mut cfg = TestCfg::new(3);
    cfg.add_edge(0, 1).add_edge(0, 2).add_edge(1, 2);
    let count = |_id: usize, _cfg: &TestCfg, _ctx: &(), pre: &Interval| *pre + Interval::from(1);
    let mut transfer = BlockTransfer::<_, TestCfg, Interval>::new(count);
    let states = SolveMonotone::default()
        .solve(&cfg, Interval::from(0), &(), &mut transfer)
        .unwrap();
    assert_eq!(states[2], Interval::new(2, 3));
}

#[test]
fn chaotic_widens_unbounded_counter() {
    let cfg = counter_loop();
    let states = SolveChaotic::default()
        .solve(&cfg, Interval::from(0), &(), &mut counter_transfer())
        .unwrap();
    assert_eq!(states[1], Interval::new(0, INF));
    assert_eq!(states[3], Interval::new(0, INF));
}

#[test]
fn chaotic_bounded_counter() {
    let cfg = counter_loop();
    let states = SolveChaotic::default()
        .solve(&cfg, Interval::from(0), &(), &mut BoundedCounter)
        .unwrap();
    assert_eq!(states[2], Interval::new(1, 10));
    assert_eq!(states[3], Interval::new(10, INF));
}

/// Assigns the constant of the operation, the edge from block 0 to block 2
/// is never taken.
struct DeadBranch;

impl TransferFunction<TestCfg, Interval> for DeadBranch {
    fn edge(
        &mut self,
        from: usize,
        to: usize,
        _cfg: &TestCfg,
        _ctx: &(),
        pre_state: &Interval,
    ) -> Option<Interval> {
        ((from, to) != (0, 2)).then_some(*pre_state)
    }

    fn operation(
        &mut self,
        _pos: OpPos,
        op: &i64,
        _cfg: &TestCfg,
        _ctx: &(),
        _pre_state: &Interval,
    ) -> Interval {
        Interval::from(*op)
    }
}

//     0
//    / \
//   1   2
//    \ /
//     3
fn dead_branch_cfg() -> TestCfg {
    let mut cfg = TestCfg::new(4);
    cfg.add_edge(0, 1)
        .add_edge(0, 2)
        .add_edge(1, 3)
        .add_edge(2, 3)
        .add_ops(1, &[1])
        .add_ops(2, &[100]);
    cfg
}

#[test]
fn unreached_blocks_stay_bottom() {
    let cfg = dead_branch_cfg();
    let expected = vec![
        Interval::from(0),
        Interval::from(1),
        Interval::bottom_(),
        Interval::from(1),
    ];

    let states = SolveChaotic::default()
        .solve(&cfg, Interval::from(0), &(), &mut DeadBranch)
        .unwrap();
    assert_eq!(states, expected);

    let mut states = vec![Interval::bottom_(); 4];
    let run = SolveMonotone::default()
        .solve_in_place(&cfg, &Interval::from(0), &(), &mut states, &mut DeadBranch)
        .unwrap();
    assert_eq!(states, expected);
    assert_eq!(run.reached, vec![true, true, false, true]);
}

#[test]
fn chaotic_sweep_limit() {
    let cfg = counter_loop();
    let solver = SolveChaotic { sweep_limit: 1 };
    let result = solver.solve(&cfg, Interval::from(0), &(), &mut counter_transfer());
    assert_eq!(result, Err(AnalysisError::Divergence { processed: 4 }));
}

/// Nodes are numbered, kill and gen sets are given per node.
struct GenKillProblem<'a> {
    cfg: &'a TestCfg,
    direction: Direction,
    kill: Vec<BitSet>,
    gens: Vec<BitSet>,
}

impl WorklistProblem<BitSet> for GenKillProblem<'_> {
    type Node = usize;

    fn dependents(&self, node: usize) -> Vec<usize> {
        let block = &self.cfg.blocks()[node];
        match self.direction {
            Direction::Forward => block.successors().to_vec(),
            Direction::Backward => block.predecessors().to_vec(),
        }
    }

    fn transfer(&mut self, node: usize, _ctx: &BitSetTop, input: &BitSet) -> BitSet {
        input.kill_gen(&self.kill[node], &self.gens[node])
    }
}

// 0: a = ..., 1: b = a, 2: use b, 3: exit
// 0 -> 1 -> 2 -> 3
//      ^    |
//      |----|
fn liveness_problem(cfg: &TestCfg) -> GenKillProblem<'_> {
    let ctx = BitSetTop(2);
    GenKillProblem {
        cfg,
        direction: Direction::Backward,
        kill: vec![
            BitSet::from(&ctx, &[0]),
            BitSet::from(&ctx, &[1]),
            BitSet::from(&ctx, &[]),
            BitSet::from(&ctx, &[]),
        ],
        gens: vec![
            BitSet::from(&ctx, &[]),
            BitSet::from(&ctx, &[0]),
            BitSet::from(&ctx, &[1]),
            BitSet::from(&ctx, &[]),
        ],
    }
}

fn liveness_cfg() -> TestCfg {
    let mut cfg = TestCfg::new(4);
    cfg.add_edge(0, 1)
        .add_edge(1, 2)
        .add_edge(2, 1)
        .add_edge(2, 3);
    cfg
}

#[test]
fn worklist_backward_may() {
    let cfg = liveness_cfg();
    let ctx = BitSetTop(2);
    let mut problem = liveness_problem(&cfg);
    let mut worklist = Worklist::new(&[3], &ctx, Direction::Backward, Approximation::May);
    let processed = SolveWorklist::default()
        .solve(&mut problem, &mut worklist, &ctx, 4)
        .unwrap();
    assert_eq!(processed, 6);
    assert!(worklist.is_empty());

    assert_eq!(worklist.pre_fact(0), Some(&BitSet::from(&ctx, &[])));
    assert_eq!(worklist.post_fact(0), Some(&BitSet::from(&ctx, &[0])));
    assert_eq!(worklist.pre_fact(1), Some(&BitSet::from(&ctx, &[0])));
    assert_eq!(worklist.pre_fact(2), Some(&BitSet::from(&ctx, &[0, 1])));
    assert_eq!(worklist.post_fact(2), Some(&BitSet::from(&ctx, &[0])));
    assert_eq!(worklist.pre_fact(3), Some(&BitSet::from(&ctx, &[])));
}

#[test]
fn worklist_forward_must() {
    //     0
    //    / \
    //   1   2
    //    \ /
    //     3
    let mut cfg = TestCfg::new(4);
    cfg.add_edge(0, 1)
        .add_edge(0, 2)
        .add_edge(1, 3)
        .add_edge(2, 3);
    let ctx = BitSetTop(2);
    let mut problem = GenKillProblem {
        cfg: &cfg,
        direction: Direction::Forward,
        kill: vec![BitSet::bottom(&ctx); 4],
        gens: vec![
            BitSet::from(&ctx, &[]),
            BitSet::from(&ctx, &[0]),
            BitSet::from(&ctx, &[0, 1]),
            BitSet::from(&ctx, &[]),
        ],
    };
    let mut worklist = Worklist::new(&[0], &ctx, Direction::Forward, Approximation::Must);
    SolveWorklist::default()
        .solve(&mut problem, &mut worklist, &ctx, 4)
        .unwrap();
    assert_eq!(worklist.pre_fact(3), Some(&BitSet::from(&ctx, &[0])));
    assert_eq!(worklist.post_fact(2), Some(&BitSet::from(&ctx, &[0, 1])));

    let (pre, post) = worklist.into_facts();
    assert_eq!(pre.len(), 4);
    assert_eq!(post.len(), 4);
}

#[test]
fn worklist_divergence() {
    let cfg = liveness_cfg();
    let ctx = BitSetTop(2);
    let mut problem = liveness_problem(&cfg);
    let mut worklist = Worklist::new(&[3], &ctx, Direction::Backward, Approximation::May);
    let result = SolveWorklist { node_limit: 1 }.solve(&mut problem, &mut worklist, &ctx, 4);
    assert_eq!(result, Err(AnalysisError::Divergence { processed: 4 }));
}

#[test]
fn worklist_queue_operations() {
    let ctx = BitSetTop(1);
    let mut worklist: Worklist<usize, BitSet> =
        Worklist::new(&[0, 1], &ctx, Direction::Forward, Approximation::May);
    assert_eq!(worklist.direction(), Direction::Forward);
    assert_eq!(worklist.approximation(), Approximation::May);
    assert!(!worklist.push(1));
    assert!(worklist.push(2));
    assert_eq!(worklist.head(), Some(0));
    worklist.advance();
    assert_eq!(worklist.head(), Some(1));
    assert!(worklist.is_pending(2));
    assert!(!worklist.is_pending(0));

    // Seeds start from bottom, nothing is computed yet.
    assert_eq!(worklist.input_fact(0), Some(&BitSet::bottom(&ctx)));
    assert_eq!(worklist.output_fact(0), None);
    assert!(!worklist.is_fixed_point(0, &BitSet::bottom(&ctx), &ctx));

    worklist.record(0, BitSet::from(&ctx, &[0]), &ctx);
    assert!(worklist.is_fixed_point(0, &BitSet::bottom(&ctx), &ctx));
    assert!(worklist.is_fixed_point(0, &BitSet::from(&ctx, &[0]), &ctx));

    worklist.propagate(0, 3, &ctx);
    assert_eq!(worklist.input_fact(3), Some(&BitSet::from(&ctx, &[0])));
    assert!(worklist.is_pending(3));
}
