//! Command line surface: the clap derive struct and the hand parsers
//! for the option sub-grammars (sizes, clamps, lint types, timestamps,
//! output pairs).

pub mod args;
pub mod parse;

pub use args::Cli;
pub use parse::build_cfg;
