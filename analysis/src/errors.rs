use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// The iteration ceiling of a solver was reached before a fixed point.
    #[error("Analysis did not converge after processing {processed} nodes")]
    Divergence { processed: usize },

    #[error("Control flow graph has a loop with head block {0}, paths cannot be enumerated")]
    CyclicCfg(usize),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),
}
