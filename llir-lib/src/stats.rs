use core::fmt::Write;
use std::collections::BTreeMap;

use analysis::cfg::{CfgBlock, ControlFlowGraph, get_loop_blocks};
use itertools::Itertools;

use crate::{
    ir::{Function, Unit},
    slots::SlotIndex,
};

/// Size and shape of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionStats {
    pub name: String,
    pub params: usize,
    pub blocks: usize,
    /// Blocks that are part of at least one loop.
    pub loop_blocks: usize,
    pub variables: Vec<String>,
    /// Number of instructions per opcode.
    pub opcodes: BTreeMap<&'static str, usize>,
}

impl FunctionStats {
    pub fn new(func: &Function, unit: &Unit) -> Self {
        let mut opcodes = BTreeMap::new();
        for block in func.blocks() {
            for instr in block.operations() {
                *opcodes.entry(instr.opcode()).or_insert(0) += 1;
            }
        }
        let variables = SlotIndex::allocas(func)
            .variables()
            .iter()
            .map(|v| unit.name(*v).to_owned())
            .collect();
        Self {
            name: unit.name(func.name).to_owned(),
            params: func.params.len(),
            blocks: func.blocks().len(),
            loop_blocks: get_loop_blocks(func).len(),
            variables,
            opcodes,
        }
    }

    pub fn render(&self) -> String {
        let mut result = String::new();
        writeln!(result, "@{}", self.name).unwrap();
        writeln!(result, "  parameters: {}", self.params).unwrap();
        writeln!(
            result,
            "  blocks: {} ({} in loops)",
            self.blocks, self.loop_blocks
        )
        .unwrap();
        writeln!(result, "  variables: {}", self.variables.join(", ")).unwrap();
        let opcodes = self
            .opcodes
            .iter()
            .map(|(opcode, count)| format!("{opcode} {count}"))
            .join(", ");
        writeln!(result, "  opcodes: {opcodes}").unwrap();
        result
    }
}
