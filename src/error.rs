//! Crate-level error aggregation. Each phase keeps its own `thiserror` enum
//! (see `regex::parse::RegexParseError`, `nfa::build::ActionError`,
//! `dfa::build::DfaBuildError`, `codegen::CodeGenError`); this type composes
//! them into one parse-error enum per automaton kind rather than a single
//! flat error.

use crate::codegen::CodeGenError;
use crate::dfa::build::DfaBuildError;
use crate::nfa::build::ActionError;
use crate::regex::parse::RegexParseError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] RegexParseError),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error(transparent)]
    DfaBuild(#[from] DfaBuildError),
    #[error(transparent)]
    CodeGen(#[from] CodeGenError),
}
