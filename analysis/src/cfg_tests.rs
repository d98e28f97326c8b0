use super::cfg::*;
use super::errors::AnalysisError;

/// Every operation adds a constant to the single variable of the program.
#[derive(Default, Clone)]
pub(crate) struct TestBasicBlock {
    ops: Vec<i64>,
    succs: Vec<usize>,
    preds: Vec<usize>,
}

impl CfgBlock for TestBasicBlock {
    type Operation = i64;

    fn operations(&self) -> &[Self::Operation] {
        &self.ops
    }

    fn predecessors(&self) -> &[usize] {
        &self.preds
    }

    fn successors(&self) -> &[usize] {
        &self.succs
    }
}

pub(crate) struct TestCfg {
    basic_blocks: Vec<TestBasicBlock>,
}

impl ControlFlowGraph for TestCfg {
    type Block = TestBasicBlock;

    fn blocks(&self) -> &[Self::Block] {
        &self.basic_blocks
    }
}

impl TestCfg {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            basic_blocks: vec![TestBasicBlock::default(); size],
        }
    }

    pub(crate) fn add_edge(&mut self, from: usize, to: usize) -> &mut Self {
        self.basic_blocks[from].succs.push(to);
        self.basic_blocks[to].preds.push(from);
        self
    }

    pub(crate) fn add_ops(&mut self, block: usize, ops: &[i64]) -> &mut Self {
        self.basic_blocks[block].ops.extend_from_slice(ops);
        self
    }
}

#[test]
fn test_cfg_print() {
    //     0
    //    / \
    //   1   2
    //   |   |
    //   |   3
    //    \ /
    //     4
    let mut cfg = TestCfg::new(5);
    cfg.add_edge(0, 1)
        .add_edge(0, 2)
        .add_edge(1, 4)
        .add_edge(2, 3)
        .add_edge(3, 4)
        .add_ops(0, &[1, -2]);

    let printed = print(None, &cfg, |op| format!("add {op}"));
    let expected = r#"digraph CFG {
  Node_0[label="add 1\nadd -2"]
  Node_1[label=""]
  Node_2[label=""]
  Node_3[label=""]
  Node_4[label=""]

  Node_0 -> Node_1
  Node_0 -> Node_2
  Node_1 -> Node_4
  Node_2 -> Node_3
  Node_3 -> Node_4
}
"#;
    assert_eq!(printed, expected);

    let printed = print(Some("\"@f\""), &TestCfg::new(1), |_| String::new());
    assert!(printed.starts_with("digraph \"@f\" {\n"));
}

#[test]
fn test_rpo_order() {
    //     0
    //    / \
    //   1   2
    //   |   |
    //   |   3
    //    \ /
    //     4
    let mut cfg = TestCfg::new(5);
    cfg.add_edge(0, 1)
        .add_edge(0, 2)
        .add_edge(1, 4)
        .add_edge(2, 3)
        .add_edge(3, 4);

    let worklist = RPOWorklist::new(&cfg);
    assert_eq!(worklist.get_rpo_order(0), 0);
    assert_eq!(worklist.get_rpo_order(1), 1);
    assert_eq!(worklist.get_rpo_order(2), 2);
    assert_eq!(worklist.get_rpo_order(3), 3);
    assert_eq!(worklist.get_rpo_order(4), 4);
}

#[test]
fn test_rpo_order_mirrored() {
    //     0
    //    / \
    //   2   1
    //   |   |
    //   3   |
    //    \ /
    //     4
    let mut cfg = TestCfg::new(5);
    cfg.add_edge(0, 2)
        .add_edge(0, 1)
        .add_edge(1, 4)
        .add_edge(2, 3)
        .add_edge(3, 4);

    let worklist = RPOWorklist::new(&cfg);
    assert_eq!(worklist.get_rpo_order(0), 0);
    assert_eq!(worklist.get_rpo_order(2), 1);
    assert_eq!(worklist.get_rpo_order(3), 2);
    assert_eq!(worklist.get_rpo_order(1), 3);
    assert_eq!(worklist.get_rpo_order(4), 4);
}

#[test]
fn test_rpo_worklist_pops_in_order() {
    let mut cfg = TestCfg::new(5);
    cfg.add_edge(0, 1)
        .add_edge(0, 2)
        .add_edge(1, 4)
        .add_edge(2, 3)
        .add_edge(3, 4);

    let mut worklist = RPOWorklist::new(&cfg);
    worklist.push(4);
    worklist.push(2);
    worklist.push_successors(0, &cfg);
    assert_eq!(worklist.pop(), Some(1));
    assert_eq!(worklist.pop(), Some(2));
    assert_eq!(worklist.pop(), Some(4));
    assert!(worklist.is_empty());
}

#[test]
fn test_rpo_order_unreachable_last() {
    //   0 -> 1    2 -> 1
    let mut cfg = TestCfg::new(3);
    cfg.add_edge(0, 1).add_edge(2, 1);

    let worklist = RPOWorklist::new(&cfg);
    assert_eq!(worklist.get_rpo_order(0), 0);
    assert_eq!(worklist.get_rpo_order(1), 1);
    assert_eq!(worklist.get_rpo_order(2), 2);
}

#[test]
fn test_rpo_order_with_back_edges() {
    //      0  <----
    //     / \   | |
    //    1   2--| |
    //    |   |    |
    //    |   3----|
    //     \ /
    //      4
    let mut cfg = TestCfg::new(5);
    cfg.add_edge(0, 1)
        .add_edge(0, 2)
        .add_edge(1, 4)
        .add_edge(2, 3)
        .add_edge(2, 0)
        .add_edge(3, 4)
        .add_edge(3, 0);

    let worklist = RPOWorklist::new(&cfg);
    assert_eq!(worklist.get_rpo_order(0), 0);
    assert_eq!(worklist.get_rpo_order(1), 1);
    assert_eq!(worklist.get_rpo_order(2), 2);
    assert_eq!(worklist.get_rpo_order(3), 3);
    assert_eq!(worklist.get_rpo_order(4), 4);
}

#[test]
fn test_get_back_edges() {
    //      0  <----
    //     / \   | |
    // -->1   2--| |
    // |  |   |    |
    // |  |   3----|
    // |   \ /
    // |----4
    let mut cfg = TestCfg::new(5);
    cfg.add_edge(0, 1)
        .add_edge(0, 2)
        .add_edge(1, 4)
        .add_edge(2, 3)
        .add_edge(2, 0)
        .add_edge(3, 4)
        .add_edge(3, 0)
        .add_edge(4, 1);

    let edges = get_back_edges(&cfg);
    assert_eq!(edges.len(), 3);
    assert!(edges.contains(&(2usize, 0usize)));
    assert!(edges.contains(&(3usize, 0usize)));
    // Depending on the traversal order (4, 1) would also be a back edge.
    assert!(edges.contains(&(1usize, 4usize)));
}

#[test]
fn test_enumerate_paths() {
    //     0
    //    / \
    //   1   2
    //   |   |
    //   |   3
    //    \ /
    //     4
    let mut cfg = TestCfg::new(5);
    cfg.add_edge(0, 1)
        .add_edge(0, 2)
        .add_edge(1, 4)
        .add_edge(2, 3)
        .add_edge(3, 4);

    let paths = enumerate_paths(&cfg).unwrap();
    assert_eq!(paths, vec![vec![0, 1, 4], vec![0, 2, 3, 4]]);

    let single = enumerate_paths(&TestCfg::new(1)).unwrap();
    assert_eq!(single, vec![vec![0]]);
    assert!(enumerate_paths(&TestCfg::new(0)).unwrap().is_empty());
}

#[test]
fn test_enumerate_paths_rejects_loops() {
    // 0 -> 1 -> 2
    //      ^    |
    //      |----|
    let mut cfg = TestCfg::new(4);
    cfg.add_edge(0, 1)
        .add_edge(1, 2)
        .add_edge(2, 1)
        .add_edge(2, 3);

    assert_eq!(enumerate_paths(&cfg), Err(AnalysisError::CyclicCfg(1)));
}

#[test]
fn test_loop_blocks() {
    // 0 -> 1 -> 2 -> 3 -> 5
    //      ^    |    |
    //      |    4 <--|
    //      |----|
    let mut cfg = TestCfg::new(6);
    cfg.add_edge(0, 1)
        .add_edge(1, 2)
        .add_edge(2, 3)
        .add_edge(2, 4)
        .add_edge(3, 4)
        .add_edge(3, 5)
        .add_edge(4, 1);

    assert_eq!(get_loop_blocks(&cfg), vec![1, 2, 3, 4]);

    let mut self_loop = TestCfg::new(2);
    self_loop.add_edge(0, 0).add_edge(0, 1);
    assert_eq!(get_loop_blocks(&self_loop), vec![0]);
}
