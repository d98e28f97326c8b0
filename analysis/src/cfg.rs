use core::cmp::Reverse;
use core::fmt::Write;

use priority_queue::PriorityQueue;

use crate::errors::AnalysisError;

pub trait CfgBlock {
    type Operation;

    fn operations(&self) -> &[Self::Operation];
    fn successors(&self) -> &[usize];
    fn predecessors(&self) -> &[usize];
}

/// Blocks are stored in an arena and refer to each other by index. The
/// block at index 0 is the entry of the graph.
pub trait ControlFlowGraph {
    type Block: CfgBlock;
    fn blocks(&self) -> &[Self::Block];
}

/// Identifies an operation within a control flow graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpPos {
    pub block_id: usize,
    pub op_id: usize,
}

/// Depth first traversal from the entry block. Successors are visited in
/// reverse order, so the first successor ends up first in reverse post-order.
/// Returns the post-order and the edges pointing to a node on the stack.
fn depth_first<Cfg: ControlFlowGraph>(cfg: &Cfg) -> (Vec<usize>, Vec<(usize, usize)>) {
    let blocks = cfg.blocks();
    let mut post_order = Vec::with_capacity(blocks.len());
    let mut back_edges = Vec::new();
    if blocks.is_empty() {
        return (post_order, back_edges);
    }

    let mut visited = vec![false; blocks.len()];
    let mut on_stack = vec![false; blocks.len()];
    // Node and the number of successors already explored.
    let mut stack = vec![(0_usize, 0_usize)];
    visited[0] = true;
    on_stack[0] = true;
    while let Some(top) = stack.last_mut() {
        let node = top.0;
        let succs = blocks[node].successors();
        if top.1 == succs.len() {
            stack.pop();
            on_stack[node] = false;
            post_order.push(node);
            continue;
        }
        let next = succs[succs.len() - 1 - top.1];
        top.1 += 1;
        if on_stack[next] {
            back_edges.push((node, next));
        } else if !visited[next] {
            visited[next] = true;
            on_stack[next] = true;
            stack.push((next, 0));
        }
    }
    (post_order, back_edges)
}

/// Edges whose target is an ancestor of the source in the depth first
/// traversal tree. For reducible graphs these are the edges closing the loops.
pub fn get_back_edges<Cfg: ControlFlowGraph>(cfg: &Cfg) -> Vec<(usize, usize)> {
    depth_first(cfg).1
}

/// A worklist that always yields the queued block with the smallest
/// reverse post-order number. Visiting nodes in this order makes forward
/// analyses converge faster, since most of the predecessors of a node
/// are processed before the node itself.
pub struct RPOWorklist {
    queue: PriorityQueue<usize, Reverse<usize>>,
    rpo_order: Vec<usize>,
}

impl RPOWorklist {
    pub fn new<Cfg: ControlFlowGraph>(cfg: &Cfg) -> Self {
        let node_num = cfg.blocks().len();
        let (post_order, _) = depth_first(cfg);
        // Unreachable nodes are ordered after every reachable one.
        let mut rpo_order = vec![usize::MAX; node_num];
        for (order, &node) in post_order.iter().rev().enumerate() {
            rpo_order[node] = order;
        }
        let mut next = post_order.len();
        for order in &mut rpo_order {
            if *order == usize::MAX {
                *order = next;
                next += 1;
            }
        }
        Self {
            queue: PriorityQueue::new(),
            rpo_order,
        }
    }

    pub fn push(&mut self, node: usize) {
        self.queue.push(node, Reverse(self.rpo_order[node]));
    }

    pub fn push_successors<Cfg: ControlFlowGraph>(&mut self, node: usize, cfg: &Cfg) {
        for &succ in cfg.blocks()[node].successors() {
            self.push(succ);
        }
    }

    pub fn pop(&mut self) -> Option<usize> {
        self.queue.pop().map(|(node, _)| node)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn get_rpo_order(&self, node: usize) -> usize {
        self.rpo_order[node]
    }
}

/// Every path from the entry block to a block without successors. Only
/// defined for acyclic graphs, a back edge is reported as an error.
pub fn enumerate_paths<Cfg: ControlFlowGraph>(cfg: &Cfg) -> Result<Vec<Vec<usize>>, AnalysisError> {
    if let Some(&(_, head)) = get_back_edges(cfg).first() {
        return Err(AnalysisError::CyclicCfg(head));
    }
    let mut paths = Vec::new();
    if cfg.blocks().is_empty() {
        return Ok(paths);
    }

    let mut pending = vec![vec![0_usize]];
    while let Some(path) = pending.pop() {
        let Some(&last) = path.last() else {
            continue;
        };
        let succs = cfg.blocks()[last].successors();
        if succs.is_empty() {
            paths.push(path);
            continue;
        }
        // Reversed so the first successor is explored first.
        for &succ in succs.iter().rev() {
            let mut extended = path.clone();
            extended.push(succ);
            pending.push(extended);
        }
    }
    Ok(paths)
}

/// Blocks that are part of at least one natural loop. The body of the loop
/// closed by a back edge `(tail, head)` is every node that reaches `tail`
/// without going through `head`.
pub fn get_loop_blocks<Cfg: ControlFlowGraph>(cfg: &Cfg) -> Vec<usize> {
    let node_num = cfg.blocks().len();
    let mut in_loop = vec![false; node_num];
    for (tail, head) in get_back_edges(cfg) {
        let mut body = vec![false; node_num];
        body[head] = true;
        let mut stack = vec![tail];
        while let Some(node) = stack.pop() {
            if body[node] {
                continue;
            }
            body[node] = true;
            stack.extend_from_slice(cfg.blocks()[node].predecessors());
        }
        for (member, in_body) in in_loop.iter_mut().zip(body) {
            *member |= in_body;
        }
    }
    in_loop
        .iter()
        .enumerate()
        .filter_map(|(node, &member)| member.then_some(node))
        .collect()
}

/// Render the graph in graphviz format.
pub fn print<Cfg, OpPrinter>(name: Option<&str>, cfg: &Cfg, printer: OpPrinter) -> String
where
    Cfg: ControlFlowGraph,
    OpPrinter: Fn(&<<Cfg as ControlFlowGraph>::Block as CfgBlock>::Operation) -> String,
{
    let mut output = format!("digraph {} {{\n", name.unwrap_or("CFG"));
    for (counter, block) in cfg.blocks().iter().enumerate() {
        write!(output, "  Node_{counter}[label=\"").unwrap();
        let text: Vec<_> = block.operations().iter().map(&printer).collect();
        output.push_str(&text.join("\\n"));
        output.push_str("\"]\n");
    }
    output.push('\n');
    for (counter, block) in cfg.blocks().iter().enumerate() {
        for next in block.successors() {
            writeln!(output, "  Node_{counter} -> Node_{next}").unwrap();
        }
    }
    output.push_str("}\n");
    output
}
