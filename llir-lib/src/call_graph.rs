use analysis::cfg::{CfgBlock, ControlFlowGraph};

use crate::ir::{InstrKind, Unit};

/// Call edges between the defined functions of a unit, indexed by function
/// index. Calls to declarations and unknown names are not part of the graph.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallGraph {
    pub callees: Vec<Vec<usize>>,
    pub callers: Vec<Vec<usize>>,
    /// Defined functions nobody else calls, in layout order.
    pub entry_functions: Vec<usize>,
}

impl CallGraph {
    pub fn new(unit: &Unit) -> Self {
        let num = unit.functions.len();
        let mut callees = vec![Vec::new(); num];
        let mut callers = vec![Vec::new(); num];
        for (caller, func) in unit.defined_functions() {
            for block in func.blocks() {
                for instr in block.operations() {
                    let InstrKind::Call { callee, .. } = instr.kind else {
                        continue;
                    };
                    let Some(callee) = unit.resolve_callee(callee) else {
                        continue;
                    };
                    if !callees[caller].contains(&callee) {
                        callees[caller].push(callee);
                        callers[callee].push(caller);
                    }
                }
            }
        }
        let entry_functions = unit
            .defined_functions()
            .filter(|&(id, _)| callers[id].iter().all(|&caller| caller == id))
            .map(|(id, _)| id)
            .collect();
        Self {
            callees,
            callers,
            entry_functions,
        }
    }
}
