pub mod analysis;
pub mod call_graph;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod session;
pub mod slots;
pub mod stats;
