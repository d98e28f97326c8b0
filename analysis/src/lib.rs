//! Building blocks for monotone dataflow analyses in the style of
//! [abstract interpretation](https://en.wikipedia.org/wiki/Abstract_interpretation).
//! The crate provides traits for
//! [control flow graphs](https://en.wikipedia.org/wiki/Control-flow_graph),
//! [lattice](https://en.wikipedia.org/wiki/Lattice_(order)) domains and
//! transfer functions, together with fixed-point solvers working at block
//! or at node granularity. There are also a set of concrete lattice
//! implementations like the bit set lattice, the map lattice, the sign
//! lattice and the interval lattice.
//!
//! Look at the llir-lib crate for an example how to define analyses using
//! the helpers in this crate.
//!
//! Some resources to learn more about dataflow analysis:
//! * [Static Program Analysis, Anders Møller and Michael I. Schwartzbach](https://cs.au.dk/~amoeller/spa/)
//! * [Data Flow Analysis: Theory and Practice](https://www.amazon.com/Data-Flow-Analysis-Theory-Practice/dp/0849328802)
//! * [Data flow analysis: an informal introduction](https://clang.llvm.org/docs/DataFlowAnalysisIntro.html)
//! * [Typestate: A programming language concept](https://doi.org/10.1109/TSE.1986.6312929)

/// Trait for defining a control flow graph, and some algorithms and data
/// structures to make it easier to work with them.
pub mod cfg;

/// A curated collection of semi-lattices and lattices, including some
/// transformers to help building larger lattices from smaller ones.
pub mod domains;

/// Errors reported by the solvers and graph algorithms.
pub mod errors;

/// Implementations of fixed-point iteration algorithms using worklists.
pub mod solvers;

pub use errors::AnalysisError;

#[cfg(test)]
mod cfg_tests;

#[cfg(test)]
mod solvers_tests;
