use core::fmt::Display;
use std::marker::PhantomData;

use analysis::{
    cfg::OpPos,
    domains::{JoinSemiLattice, Map, MapCtx},
    solvers::TransferFunction,
};

use crate::{
    ir::{Annotations, Function, Instruction, Unit},
    lexer::Identifier,
};

pub mod interval_analysis;
pub mod liveness;
pub mod sign_analysis;
pub mod typestate;

use liveness::Granularity;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Analyses {
    Sign,
    Interval,
    Liveness(Granularity),
    Typestate,
}

/// Wraps a transfer function and records the values an instruction changed
/// as annotations for the printer.
pub struct TransferLogger<'unit, D, Transfer>
where
    D: JoinSemiLattice + Display,
    Transfer: TransferFunction<Function, Map<Identifier, D>>,
{
    unit: &'unit Unit,
    anns: Annotations,
    transfer: Transfer,
    d: PhantomData<D>,
}

impl<D, Transfer> TransferFunction<Function, Map<Identifier, D>> for TransferLogger<'_, D, Transfer>
where
    D: JoinSemiLattice + Display,
    Transfer: TransferFunction<Function, Map<Identifier, D>>,
{
    fn operation(
        &mut self,
        pos: OpPos,
        op: &Instruction,
        cfg: &Function,
        ctx: &MapCtx<Identifier, D>,
        pre_state: &Map<Identifier, D>,
    ) -> Map<Identifier, D> {
        let post_state = self.transfer.operation(pos, op, cfg, ctx, pre_state);
        let mut changed_values = post_state.changed_values(pre_state);
        if let Some(result) = op.result() {
            if let Some(val) = post_state.get(&result) {
                changed_values.insert(result, val.clone());
            }
        }
        // A later visit might see no change, the stale entry has to go.
        if changed_values.is_empty() {
            self.anns.post.remove(&pos);
            return post_state;
        }
        let mut named: Vec<_> = changed_values
            .iter()
            .map(|(id, val)| (self.unit.name(*id), val))
            .collect();
        named.sort_by_key(|(name, _)| *name);
        let printed = named
            .into_iter()
            .map(|(name, val)| format!("{name}: {val}"))
            .collect();
        self.anns.post.insert(pos, printed);
        post_state
    }

    fn edge(
        &mut self,
        from: usize,
        to: usize,
        cfg: &Function,
        ctx: &MapCtx<Identifier, D>,
        pre_state: &Map<Identifier, D>,
    ) -> Option<Map<Identifier, D>> {
        self.transfer.edge(from, to, cfg, ctx, pre_state)
    }
}

impl<'unit, D, Transfer> TransferLogger<'unit, D, Transfer>
where
    D: JoinSemiLattice + Display,
    Transfer: TransferFunction<Function, Map<Identifier, D>>,
{
    pub fn new(unit: &'unit Unit, transfer: Transfer) -> Self {
        Self {
            unit,
            anns: Annotations::default(),
            transfer,
            d: PhantomData,
        }
    }

    pub fn get_annotations(self) -> Annotations {
        self.anns
    }

    /// The annotations and the wrapped transfer function, for transfer
    /// functions that collect information on the side.
    pub fn into_parts(self) -> (Annotations, Transfer) {
        (self.anns, self.transfer)
    }
}



#[cfg(test)]
mod liveness_tests;

#[cfg(test)]
mod typestate_tests;

#[cfg(test)]
mod test_utils {
    use super::Analyses;
    use crate::{
        ir::{AnnotationMap, print},
        parser_tests::parse_string,
        session::{AnalysisSession, SessionConfig},
    };

    /// Compares the annotated IR with the expected output.
    pub fn check_annotated(analysis: Analyses, source: &str, expected: &str) {
        check_annotated_with(analysis, SessionConfig::default(), source, expected);
    }

    pub fn check_annotated_with(
        analysis: Analyses,
        config: SessionConfig,
        source: &str,
        expected: &str,
    ) {
        let unit = parse_string(source).unwrap();
        let session = AnalysisSession::new(&unit, config);
        let anns: AnnotationMap = session.annotations(analysis).unwrap();
        assert_eq!(expected, print(&unit, &anns));
    }

    /// Compares the textual report of an analysis with the expected output.
    pub fn check_report(analysis: Analyses, source: &str, expected: &str) {
        let unit = parse_string(source).unwrap();
        let session = AnalysisSession::new(&unit, SessionConfig::default());
        assert_eq!(expected, session.report(analysis).unwrap());
    }
}
