use core::fmt::Write;

use analysis::{
    AnalysisError,
    solvers::{Approximation, SolveChaotic, SolveMonotone},
};
use itertools::Itertools;
use log::info;

use crate::{
    analysis::{
        Analyses,
        interval_analysis::{IntervalAnalysis, IntervalResult},
        liveness::{Granularity, LivenessAnalysis, LivenessResult},
        sign_analysis::{CallMode, SignAnalysis, SignResult},
        typestate::{FileProtocol, TypestateAnalysis, TypestateResult},
    },
    call_graph::CallGraph,
    ir::{AnnotationMap, Unit, print_function},
    stats::FunctionStats,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Approximate number of visits per node before an analysis gives up,
    /// zero means no limit.
    pub node_limit: usize,
    pub context_sensitive: bool,
    pub liveness_approximation: Approximation,
    /// Only this function is analyzed and reported when set.
    pub function: Option<String>,
    pub protocol: FileProtocol,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            node_limit: 20,
            context_sensitive: false,
            liveness_approximation: Approximation::May,
            function: None,
            protocol: FileProtocol::default(),
        }
    }
}

/// Runs the analyses over a parsed unit.
pub struct AnalysisSession<'unit> {
    unit: &'unit Unit,
    config: SessionConfig,
    call_graph: CallGraph,
}

impl<'unit> AnalysisSession<'unit> {
    pub fn new(unit: &'unit Unit, config: SessionConfig) -> Self {
        Self {
            unit,
            config,
            call_graph: CallGraph::new(unit),
        }
    }

    pub fn unit(&self) -> &'unit Unit {
        self.unit
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn call_graph(&self) -> &CallGraph {
        &self.call_graph
    }

    /// Every function of the unit, or the one selected in the config.
    pub fn selected_functions(&self) -> Result<Vec<usize>, AnalysisError> {
        match &self.config.function {
            Some(name) => {
                let name = name.strip_prefix('@').unwrap_or(name);
                let id = self
                    .unit
                    .function_index(name)
                    .ok_or_else(|| AnalysisError::UnknownFunction(name.to_owned()))?;
                Ok(vec![id])
            }
            None => Ok((0..self.unit.functions.len()).collect()),
        }
    }

    /// The selected functions that have a body.
    fn selected_definitions(&self) -> Result<Vec<usize>, AnalysisError> {
        Ok(self
            .selected_functions()?
            .into_iter()
            .filter(|id| !self.unit.functions[*id].is_external())
            .collect())
    }

    /// Signs are computed for the whole unit, callees need to be analyzed
    /// even if they were not selected.
    pub fn signs(&self) -> Result<SignResult, AnalysisError> {
        let mode = if self.config.context_sensitive {
            CallMode::Sensitive
        } else {
            CallMode::Insensitive
        };
        let solver = SolveMonotone {
            node_limit: self.config.node_limit,
        };
        SignAnalysis::new(solver, mode).run(self.unit, &self.call_graph)
    }

    pub fn intervals(&self) -> Result<Vec<IntervalResult>, AnalysisError> {
        let analysis = IntervalAnalysis::new(SolveChaotic {
            sweep_limit: self.config.node_limit,
        });
        let results: Vec<_> = self
            .selected_definitions()?
            .into_iter()
            .map(|id| analysis.run(self.unit, id))
            .collect::<Result<_, _>>()?;
        info!("interval analysis: {} functions", results.len());
        Ok(results)
    }

    pub fn liveness(&self, granularity: Granularity) -> Result<Vec<LivenessResult>, AnalysisError> {
        let analysis = LivenessAnalysis::new(
            granularity,
            self.config.liveness_approximation,
            self.config.node_limit,
        );
        let results: Vec<LivenessResult> = self
            .selected_definitions()?
            .into_iter()
            .map(|id| analysis.run(self.unit, id))
            .collect::<Result<_, _>>()?;
        info!(
            "liveness at {granularity:?} granularity: {} steps",
            results.iter().map(|r| r.processed).sum::<usize>()
        );
        Ok(results)
    }

    pub fn typestate(&self) -> Result<Vec<TypestateResult>, AnalysisError> {
        let analysis = TypestateAnalysis::new(self.config.protocol.clone());
        let results: Vec<TypestateResult> = self
            .selected_definitions()?
            .into_iter()
            .map(|id| analysis.run(self.unit, id))
            .collect::<Result<_, _>>()?;
        info!(
            "typestate: {} paths",
            results.iter().map(|r| r.paths.len()).sum::<usize>()
        );
        Ok(results)
    }

    pub fn stats(&self) -> Result<Vec<FunctionStats>, AnalysisError> {
        Ok(self
            .selected_definitions()?
            .into_iter()
            .map(|id| FunctionStats::new(&self.unit.functions[id], self.unit))
            .collect())
    }

    /// Annotations for the analyses reporting facts per instruction. The
    /// other analyses have no annotations.
    pub fn annotations(&self, analysis: Analyses) -> Result<AnnotationMap, AnalysisError> {
        let selected = self.selected_functions()?;
        let mut anns = match analysis {
            Analyses::Sign => self.signs()?.annotations,
            Analyses::Interval => self
                .intervals()?
                .into_iter()
                .map(|r| (r.function, r.annotations))
                .collect(),
            Analyses::Liveness(_) | Analyses::Typestate => AnnotationMap::new(),
        };
        anns.retain(|id, _| selected.contains(id));
        Ok(anns)
    }

    /// The selected functions printed with the annotations of the analysis.
    fn annotated_functions(&self, anns: &AnnotationMap) -> Result<String, AnalysisError> {
        Ok(self
            .selected_functions()?
            .into_iter()
            .map(|id| print_function(&self.unit.functions[id], self.unit, anns.get(&id)))
            .join("\n"))
    }

    /// The textual output of an analysis for the selected functions.
    /// The number of steps and the live variables of each line, per function.
    pub fn liveness_report(&self, results: &[LivenessResult]) -> String {
        let unit = self.unit;
        let mut result = String::new();
        for liveness in results {
            let func = &unit.functions[liveness.function];
            writeln!(
                result,
                "@{}: {} steps",
                unit.name(func.name),
                liveness.processed
            )
            .unwrap();
            result.push_str(&liveness.render_lines(unit));
        }
        result
    }

    pub fn report(&self, analysis: Analyses) -> Result<String, AnalysisError> {
        let unit = self.unit;
        let mut result = String::new();
        match analysis {
            Analyses::Sign => {
                let signs = self.signs()?;
                let selected = self.selected_functions()?;
                result.push_str(&self.annotated_functions(&signs.annotations)?);
                result.push('\n');
                for (id, _) in unit.defined_functions().filter(|(id, _)| selected.contains(id)) {
                    result.push_str(&signs.render_summary(unit, id));
                }
            }
            Analyses::Interval => {
                let anns = self.annotations(analysis)?;
                result.push_str(&self.annotated_functions(&anns)?);
            }
            Analyses::Liveness(granularity) => {
                result.push_str(&self.liveness_report(&self.liveness(granularity)?));
            }
            Analyses::Typestate => {
                for typestate in self.typestate()? {
                    let func = &unit.functions[typestate.function];
                    writeln!(result, "@{}", unit.name(func.name)).unwrap();
                    result.push_str(&typestate.render(unit));
                }
            }
        }
        Ok(result)
    }
}
