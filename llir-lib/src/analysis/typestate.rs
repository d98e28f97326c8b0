use core::cmp::Ordering;
use core::fmt::{Display, Write};
use std::collections::{HashMap, HashSet};

use analysis::{
    AnalysisError,
    cfg::{CfgBlock, ControlFlowGraph, enumerate_paths},
    domains::{JoinSemiLattice, Lattice, Map, MapCtx},
};
use itertools::Itertools;
use log::debug;

use crate::{
    ir::{Function, InstrKind, Operand, Unit},
    lexer::Identifier,
};

/// The state of a file handle. Errors are sticky. `Bottom` is the state of
/// a handle no path reaches, it is not a state of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileState {
    Bottom,
    Init,
    Open,
    Close,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileEvent {
    Open,
    Close,
    Use,
}

impl FileState {
    pub fn transition(self, event: FileEvent) -> Self {
        match (self, event) {
            (FileState::Bottom, _) => FileState::Bottom,
            (FileState::Error, _) => FileState::Error,
            (FileState::Init | FileState::Close, FileEvent::Open) => FileState::Open,
            (FileState::Open, FileEvent::Close) => FileState::Close,
            (FileState::Open, FileEvent::Use) => FileState::Open,
            _ => FileState::Error,
        }
    }
}

impl Display for FileState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            FileState::Bottom => "BOTTOM",
            FileState::Init => "INIT",
            FileState::Open => "OPEN",
            FileState::Close => "CLOSE",
            FileState::Error => "ERROR",
        };
        write!(f, "{name}")
    }
}

/// Init, Open and Close are pairwise incomparable, they are between Bottom
/// and Error.
impl PartialOrd for FileState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        match (self, other) {
            (FileState::Bottom, _) | (_, FileState::Error) => Some(Ordering::Less),
            (_, FileState::Bottom) | (FileState::Error, _) => Some(Ordering::Greater),
            _ => None,
        }
    }
}

impl JoinSemiLattice for FileState {
    type LatticeContext = ();

    fn bottom(_: &Self::LatticeContext) -> Self {
        FileState::Bottom
    }

    fn join(&self, other: &Self, _: &Self::LatticeContext) -> Self {
        match self.partial_cmp(other) {
            Some(Ordering::Less | Ordering::Equal) => *other,
            Some(Ordering::Greater) => *self,
            None => FileState::Error,
        }
    }
}

impl Lattice for FileState {
    fn top(_: &Self::LatticeContext) -> Self {
        FileState::Error
    }

    fn meet(&self, other: &Self, _: &Self::LatticeContext) -> Self {
        match self.partial_cmp(other) {
            Some(Ordering::Less | Ordering::Equal) => *self,
            Some(Ordering::Greater) => *other,
            None => FileState::Bottom,
        }
    }
}

/// The names of the functions acting on file handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileProtocol {
    /// Return a fresh open handle.
    pub open: Vec<String>,
    /// Close the handles passed to them.
    pub close: Vec<String>,
    /// Require the handles passed to them to be open.
    pub uses: Vec<String>,
}

impl Default for FileProtocol {
    fn default() -> Self {
        let names = |names: &[&str]| -> Vec<String> {
            names.iter().map(|&n| n.to_owned()).collect()
        };
        Self {
            open: names(&["fopen"]),
            close: names(&["fclose"]),
            uses: names(&[
                "fread", "fwrite", "fgets", "fputs", "fprintf", "fscanf", "fgetc", "fputc",
                "fflush", "fseek",
            ]),
        }
    }
}

impl FileProtocol {
    pub fn event(&self, function: &str) -> Option<FileEvent> {
        let contains = |names: &[String]| names.iter().any(|n| n == function);
        if contains(&self.open) {
            Some(FileEvent::Open)
        } else if contains(&self.close) {
            Some(FileEvent::Close)
        } else if contains(&self.uses) {
            Some(FileEvent::Use)
        } else {
            None
        }
    }
}

pub type HandleStates = Map<Identifier, FileState>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStates {
    /// Block ids from the entry to an exit.
    pub blocks: Vec<usize>,
    /// The state of each stack variable at the end of the path.
    pub states: HandleStates,
}

#[derive(Debug, Clone)]
pub struct TypestateResult {
    pub function: usize,
    pub paths: Vec<PathStates>,
    /// The join of the states over all the paths.
    pub summary: HandleStates,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypestateAnalysis {
    pub protocol: FileProtocol,
}

/// The stack variable an argument refers to, either directly or through a
/// loaded temporary.
fn resolve_handle(
    states: &HandleStates,
    aliases: &HashMap<Identifier, Identifier>,
    arg: &Operand,
) -> Option<Identifier> {
    let var = arg.as_var()?;
    aliases
        .get(&var)
        .copied()
        .or_else(|| states.contains_key(&var).then_some(var))
}

/// Follows the handles along one path. Every stack variable is tracked, a
/// variable becomes a file handle when the result of an open call is
/// stored into it.
fn simulate(
    func: &Function,
    unit: &Unit,
    protocol: &FileProtocol,
    path: &[usize],
) -> HandleStates {
    let mut states = HandleStates::default();
    // Temporaries loaded from a tracked variable.
    let mut aliases: HashMap<Identifier, Identifier> = HashMap::new();
    // Temporaries holding the result of an open call.
    let mut opened: HashSet<Identifier> = HashSet::new();
    let apply = |states: &mut HandleStates, handle: Identifier, event: FileEvent| {
        if let Some(state) = states.get_mut(&handle) {
            *state = state.transition(event);
        }
    };

    for &block in path {
        for instr in func.blocks()[block].operations() {
            match &instr.kind {
                InstrKind::Alloca { result } => {
                    states.insert(*result, FileState::Init);
                }
                InstrKind::Load { result, ptr } if states.contains_key(ptr) => {
                    aliases.insert(*result, *ptr);
                }
                InstrKind::Store {
                    value: Operand::Var(value),
                    ptr,
                } if opened.contains(value) => {
                    apply(&mut states, *ptr, FileEvent::Open);
                }
                InstrKind::Call {
                    result,
                    callee,
                    args,
                } => match protocol.event(unit.name(*callee)) {
                    Some(FileEvent::Open) => {
                        if let Some(result) = result {
                            opened.insert(*result);
                        }
                    }
                    Some(event) => {
                        for arg in args {
                            if let Some(handle) = resolve_handle(&states, &aliases, arg) {
                                apply(&mut states, handle, event);
                            }
                        }
                    }
                    None => {}
                },
                _ => {}
            }
        }
    }
    states
}

impl TypestateAnalysis {
    pub fn new(protocol: FileProtocol) -> Self {
        Self { protocol }
    }

    /// Fails on functions with loops, their paths cannot be enumerated.
    pub fn run(&self, unit: &Unit, func_id: usize) -> Result<TypestateResult, AnalysisError> {
        let func = &unit.functions[func_id];
        let ctx = MapCtx::for_join_semi_lattice();
        let mut summary = HandleStates::bottom(&ctx);
        let mut paths = Vec::new();
        for blocks in enumerate_paths(func)? {
            let states = simulate(func, unit, &self.protocol, &blocks);
            summary = summary.join(&states, &ctx);
            paths.push(PathStates { blocks, states });
        }
        debug!(
            "typestate of @{}: {} paths",
            unit.name(func.name),
            paths.len()
        );
        Ok(TypestateResult {
            function: func_id,
            paths,
            summary,
        })
    }
}

/// Variables never touched by a file operation are left out.
fn render_states(result: &mut String, states: &HandleStates, unit: &Unit) {
    for (handle, state) in states
        .iter()
        .filter(|(_, state)| **state != FileState::Init)
        .sorted_by_key(|(handle, _)| unit.name(**handle))
    {
        writeln!(result, "  %{} {state}", unit.name(*handle)).unwrap();
    }
}

impl TypestateResult {
    /// The blocks of every path followed by the final states of the
    /// handles, then the summary over all paths.
    pub fn render(&self, unit: &Unit) -> String {
        let func = &unit.functions[self.function];
        let mut result = String::new();
        for path in &self.paths {
            let labels = path
                .blocks
                .iter()
                .map(|b| unit.name(func.blocks()[*b].label))
                .join(" ");
            writeln!(result, "path: {labels}").unwrap();
            render_states(&mut result, &path.states, unit);
        }
        result.push_str("summary:\n");
        render_states(&mut result, &self.summary, unit);
        result
    }
}
