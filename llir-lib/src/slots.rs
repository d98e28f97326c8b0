use std::collections::{HashMap, HashSet};

use analysis::domains::{BitSet, BitSetTop};

use crate::ir::{Function, InstrKind, Unit};
use crate::lexer::Identifier;

/// A bijection between the tracked variables of a function and `[0, N)`.
/// Built once before the analysis, never changes afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlotIndex {
    vars: Vec<Identifier>,
    index: HashMap<Identifier, usize>,
}

impl SlotIndex {
    /// Duplicates keep their first slot.
    pub fn new(vars: impl IntoIterator<Item = Identifier>) -> Self {
        let mut result = Self::default();
        for var in vars {
            if !result.index.contains_key(&var) {
                result.index.insert(var, result.vars.len());
                result.vars.push(var);
            }
        }
        result
    }

    /// The stack variables of the function, in declaration order.
    pub fn allocas(func: &Function) -> Self {
        Self::new(func.instructions().filter_map(|(_, instr)| match instr.kind {
            InstrKind::Alloca { result } => Some(result),
            _ => None,
        }))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn slot(&self, var: Identifier) -> Option<usize> {
        self.index.get(&var).copied()
    }

    pub fn contains(&self, var: Identifier) -> bool {
        self.index.contains_key(&var)
    }

    pub fn variable(&self, slot: usize) -> Identifier {
        self.vars[slot]
    }

    pub fn variables(&self) -> &[Identifier] {
        &self.vars
    }

    pub fn bitset_ctx(&self) -> BitSetTop {
        BitSetTop(self.vars.len())
    }

    /// The set of the tracked members of `vars`, others are ignored.
    pub fn bitset(&self, vars: &[Identifier]) -> BitSet {
        let slots: Vec<usize> = vars.iter().filter_map(|v| self.slot(*v)).collect();
        BitSet::from(&self.bitset_ctx(), &slots)
    }

    pub fn names<'u>(&self, set: &BitSet, unit: &'u Unit) -> Vec<&'u str> {
        set.ones().map(|slot| unit.name(self.vars[slot])).collect()
    }
}

/// Every value with a definition in the function: parameters and instruction
/// results. Uses of anything else are malformed input.
pub fn defined_values(func: &Function) -> HashSet<Identifier> {
    func.params
        .iter()
        .copied()
        .chain(func.instructions().filter_map(|(_, instr)| instr.result()))
        .collect()
}
