//! A byte-level regex-to-DFA compiler with action/precondition
//! annotations, aimed at generating scanner code for a host language
//! rather than running matches itself.
//!
//! Pipeline: [`regex::parse::parse`] a pattern (or build a [`regex::Regex`]
//! by hand) → annotate with [`onenter`]/[`onexit`]/[`onfinal`]/[`onall`]/
//! [`precond`] → [`desugar::desugar`] to the primitive algebra → [`compile`]
//! through NFA and DFA construction → [`codegen::generate_code`] or
//! [`generate_buffer_validator`] to emit source text.

pub mod byteset;
pub mod codegen;
pub mod desugar;
pub mod dfa;
pub mod error;
pub mod nfa;
pub mod regex;


pub use codegen::{
    compile, compile_regex, generate_buffer_validator, generate_buffer_validator_from_pattern,
    generate_code, generate_exec_code, generate_init_code, generate_input_error_code, ActionMap,
    CodeGenContext, CodeGenError, Generator, Machine,
};
pub use error::Error;
pub use regex::parse::{parse, RegexParseError};
pub use regex::{onall, onenter, onexit, onfinal, precond, Polarity, PrecondWhen, Regex, Symbol};

pub type Result<T> = std::result::Result<T, Error>;
