use core::fmt::Write;
use std::collections::HashMap;

use analysis::cfg::*;
use itertools::Itertools;

use crate::lexer::{Identifier, IdentifierTable};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    Var(Identifier),
    Const(i64),
}

impl Operand {
    pub fn as_var(&self) -> Option<Identifier> {
        match self {
            Operand::Var(id) => Some(*id),
            Operand::Const(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmpPredicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl CmpPredicate {
    /// The predicate that holds exactly when `self` does not.
    pub fn negate(self) -> Self {
        use CmpPredicate::*;
        match self {
            Eq => Ne,
            Ne => Eq,
            Slt => Sge,
            Sle => Sgt,
            Sgt => Sle,
            Sge => Slt,
        }
    }

    /// The predicate with the operands swapped: `a < b` is `b > a`.
    pub fn swap(self) -> Self {
        use CmpPredicate::*;
        match self {
            Eq => Eq,
            Ne => Ne,
            Slt => Sgt,
            Sle => Sge,
            Sgt => Slt,
            Sge => Sle,
        }
    }

    pub fn name(self) -> &'static str {
        use CmpPredicate::*;
        match self {
            Eq => "eq",
            Ne => "ne",
            Slt => "slt",
            Sle => "sle",
            Sgt => "sgt",
            Sge => "sge",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstrKind {
    /// Reserves a memory slot, the result is the address of a variable.
    Alloca {
        result: Identifier,
    },
    Load {
        result: Identifier,
        ptr: Identifier,
    },
    Store {
        value: Operand,
        ptr: Identifier,
    },
    Binary {
        op: BinaryOp,
        result: Identifier,
        lhs: Operand,
        rhs: Operand,
    },
    Icmp {
        pred: CmpPredicate,
        result: Identifier,
        lhs: Operand,
        rhs: Operand,
    },
    Call {
        result: Option<Identifier>,
        callee: Identifier,
        args: Vec<Operand>,
    },
    /// Conditional branch, the targets are block indices.
    Branch {
        cond: Identifier,
        then: usize,
        els: usize,
    },
    Jump(usize),
    Ret(Option<Operand>),
    Nop,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub kind: InstrKind,
    /// Source line, either from a `!N` marker or the line of the text.
    pub line: u32,
}

impl Instruction {
    pub fn result(&self) -> Option<Identifier> {
        match &self.kind {
            InstrKind::Alloca { result }
            | InstrKind::Load { result, .. }
            | InstrKind::Binary { result, .. }
            | InstrKind::Icmp { result, .. } => Some(*result),
            InstrKind::Call { result, .. } => *result,
            InstrKind::Store { .. }
            | InstrKind::Branch { .. }
            | InstrKind::Jump(_)
            | InstrKind::Ret(_)
            | InstrKind::Nop => None,
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            InstrKind::Branch { .. } | InstrKind::Jump(_) | InstrKind::Ret(_)
        )
    }

    pub fn is_alloca(&self) -> bool {
        matches!(self.kind, InstrKind::Alloca { .. })
    }

    pub fn opcode(&self) -> &'static str {
        match self.kind {
            InstrKind::Alloca { .. } => "alloca",
            InstrKind::Load { .. } => "load",
            InstrKind::Store { .. } => "store",
            InstrKind::Binary {
                op: BinaryOp::Add, ..
            } => "add",
            InstrKind::Binary {
                op: BinaryOp::Sub, ..
            } => "sub",
            InstrKind::Icmp { .. } => "icmp",
            InstrKind::Call { .. } => "call",
            InstrKind::Branch { .. } | InstrKind::Jump(_) => "br",
            InstrKind::Ret(_) => "ret",
            InstrKind::Nop => "nop",
        }
    }
}

/// The last instruction is a terminator:
/// * br (conditional or unconditional)
/// * ret
#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub label: Identifier,
    instructions: Vec<Instruction>,
    succs: Vec<usize>,
    preds: Vec<usize>,
}

impl BasicBlock {
    pub fn new(label: Identifier) -> Self {
        Self {
            label,
            instructions: Vec::new(),
            succs: Vec::new(),
            preds: Vec::new(),
        }
    }

    pub fn push(&mut self, instr: Instruction) {
        self.instructions.push(instr);
    }

    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    pub(crate) fn terminator_mut(&mut self) -> Option<&mut Instruction> {
        self.instructions.last_mut()
    }
}

impl CfgBlock for BasicBlock {
    type Operation = Instruction;

    fn operations(&self) -> &[Self::Operation] {
        &self.instructions
    }

    fn predecessors(&self) -> &[usize] {
        &self.preds
    }

    fn successors(&self) -> &[usize] {
        &self.succs
    }
}

/// A defined function or an external declaration. Declarations have no
/// blocks.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: Identifier,
    pub params: Vec<Identifier>,
    pub line: u32,
    basic_blocks: Vec<BasicBlock>,
    external: bool,
}

impl ControlFlowGraph for Function {
    type Block = BasicBlock;

    fn blocks(&self) -> &[Self::Block] {
        &self.basic_blocks
    }
}

impl Function {
    pub fn new(name: Identifier, params: Vec<Identifier>, line: u32) -> Self {
        Self {
            name,
            params,
            line,
            basic_blocks: Vec::new(),
            external: false,
        }
    }

    pub fn declaration(name: Identifier, params: Vec<Identifier>, line: u32) -> Self {
        Self {
            external: true,
            ..Self::new(name, params, line)
        }
    }

    pub fn is_external(&self) -> bool {
        self.external
    }

    pub fn new_block(&mut self, label: Identifier) -> usize {
        self.basic_blocks.push(BasicBlock::new(label));
        self.basic_blocks.len() - 1
    }

    pub(crate) fn block_mut(&mut self, block: usize) -> &mut BasicBlock {
        &mut self.basic_blocks[block]
    }

    pub fn add_edge(&mut self, from: usize, to: usize) -> &mut Self {
        self.basic_blocks[from].succs.push(to);
        self.basic_blocks[to].preds.push(from);
        self
    }

    pub fn instruction(&self, pos: OpPos) -> &Instruction {
        &self.basic_blocks[pos.block_id].operations()[pos.op_id]
    }

    /// Every instruction with its position, in layout order.
    pub fn instructions(&self) -> impl Iterator<Item = (OpPos, &Instruction)> {
        self.basic_blocks
            .iter()
            .enumerate()
            .flat_map(|(block_id, block)| {
                block
                    .operations()
                    .iter()
                    .enumerate()
                    .map(move |(op_id, instr)| (OpPos { block_id, op_id }, instr))
            })
    }

    /// The instruction producing `id`, if any. Values are defined once in
    /// well formed input, the first definition wins otherwise.
    pub fn definition(&self, id: Identifier) -> Option<(OpPos, &Instruction)> {
        self.instructions()
            .find(|(_, instr)| instr.result() == Some(id))
    }

    /// Blocks without successors.
    pub fn exit_blocks(&self) -> Vec<usize> {
        self.basic_blocks
            .iter()
            .enumerate()
            .filter_map(|(id, block)| block.successors().is_empty().then_some(id))
            .collect()
    }

    pub fn block_by_label(&self, label: Identifier) -> Option<usize> {
        self.basic_blocks.iter().position(|b| b.label == label)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Unit {
    pub functions: Vec<Function>,
    pub identifiers: IdentifierTable,
}

impl Unit {
    pub fn function_index(&self, name: &str) -> Option<usize> {
        let id = self.identifiers.lookup(name)?;
        self.functions.iter().position(|f| f.name == id)
    }

    /// The defined function called as `callee`. Declared and unknown names
    /// are not resolved.
    pub fn resolve_callee(&self, callee: Identifier) -> Option<usize> {
        self.functions
            .iter()
            .position(|f| f.name == callee && !f.is_external())
    }

    pub fn name(&self, id: Identifier) -> &str {
        self.identifiers.get_name(id)
    }

    pub fn defined_functions(&self) -> impl Iterator<Item = (usize, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_external())
    }
}

/// Comments attached to instructions when printing the IR.
#[derive(Clone, Debug, Default)]
pub struct Annotations {
    pub post: HashMap<OpPos, Vec<String>>,
}

/// Annotations per function index.
pub type AnnotationMap = HashMap<usize, Annotations>;

fn print_operand(op: &Operand, unit: &Unit) -> String {
    match op {
        Operand::Var(id) => format!("%{}", unit.name(*id)),
        Operand::Const(c) => c.to_string(),
    }
}

pub fn print_instruction(instr: &Instruction, func: &Function, unit: &Unit) -> String {
    let local = |id: &Identifier| format!("%{}", unit.name(*id));
    let label = |block: &usize| unit.name(func.blocks()[*block].label).to_owned();
    match &instr.kind {
        InstrKind::Alloca { result } => format!("{} = alloca", local(result)),
        InstrKind::Load { result, ptr } => format!("{} = load {}", local(result), local(ptr)),
        InstrKind::Store { value, ptr } => {
            format!("store {}, {}", print_operand(value, unit), local(ptr))
        }
        InstrKind::Binary {
            result, lhs, rhs, ..
        } => format!(
            "{} = {} {}, {}",
            local(result),
            instr.opcode(),
            print_operand(lhs, unit),
            print_operand(rhs, unit)
        ),
        InstrKind::Icmp {
            pred,
            result,
            lhs,
            rhs,
        } => format!(
            "{} = icmp {} {}, {}",
            local(result),
            pred.name(),
            print_operand(lhs, unit),
            print_operand(rhs, unit)
        ),
        InstrKind::Call {
            result,
            callee,
            args,
        } => {
            let call = format!(
                "call @{}({})",
                unit.name(*callee),
                args.iter().map(|a| print_operand(a, unit)).join(", ")
            );
            match result {
                Some(result) => format!("{} = {call}", local(result)),
                None => call,
            }
        }
        InstrKind::Branch { cond, then, els } => {
            format!("br {}, {}, {}", local(cond), label(then), label(els))
        }
        InstrKind::Jump(target) => format!("br {}", label(target)),
        InstrKind::Ret(Some(value)) => format!("ret {}", print_operand(value, unit)),
        InstrKind::Ret(None) => "ret".to_owned(),
        InstrKind::Nop => "nop".to_owned(),
    }
}

fn print_signature(func: &Function, unit: &Unit) -> String {
    let params = func
        .params
        .iter()
        .map(|p| format!("%{}", unit.name(*p)))
        .join(", ");
    format!("@{}({params})", unit.name(func.name))
}

pub fn print_function(func: &Function, unit: &Unit, anns: Option<&Annotations>) -> String {
    if func.is_external() {
        return format!("declare {}\n", print_signature(func, unit));
    }
    let mut result = format!("define {} {{\n", print_signature(func, unit));
    for (block_id, block) in func.blocks().iter().enumerate() {
        if block_id > 0 {
            result.push('\n');
        }
        writeln!(result, "{}:", unit.name(block.label)).unwrap();
        for (op_id, instr) in block.operations().iter().enumerate() {
            write!(result, "  {}", print_instruction(instr, func, unit)).unwrap();
            let comment = anns.and_then(|a| a.post.get(&OpPos { block_id, op_id }));
            if let Some(comment) = comment {
                write!(result, " /* {} */", comment.join(", ")).unwrap();
            }
            result.push('\n');
        }
    }
    result.push_str("}\n");
    result
}

/// Pretty prints the unit. Annotations are attached to the end of the
/// instructions as comments.
pub fn print(unit: &Unit, anns: &AnnotationMap) -> String {
    unit.functions
        .iter()
        .enumerate()
        .map(|(id, func)| print_function(func, unit, anns.get(&id)))
        .join("\n")
}

pub fn print_cfg(func: &Function, unit: &Unit) -> String {
    let name = format!("\"@{}\"", unit.name(func.name));
    analysis::cfg::print(Some(&name), func, |instr| {
        print_instruction(instr, func, unit)
    })
}

/// Graphviz rendering of every defined function.
pub fn print_dot(unit: &Unit) -> String {
    unit.defined_functions()
        .map(|(_, func)| print_cfg(func, unit))
        .join("\n")
}
