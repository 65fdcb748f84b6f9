//! The DFA: BFS-numbered states from 1, each transition carrying an
//! ordered action list and a precondition map, each state carrying the
//! ordered EOF action list the NFA would traverse on completion in that
//! state. See [`build::build`] for subset construction and [`minimize`]
//! for merging indistinguishable states.

pub mod build;
pub mod minimize;

use crate::nfa::PrecondMap;
use crate::regex::Symbol;

#[derive(Debug, Clone)]
pub struct DfaEdge {
    pub lo: u8,
    pub hi: u8,
    pub target: usize,
    pub actions: Vec<Symbol>,
    pub preconds: PrecondMap,
}

#[derive(Debug, Clone)]
pub struct DfaState {
    /// 1-based, assigned in BFS discovery order.
    pub id: usize,
    pub accepting: bool,
    pub eof_actions: Vec<Symbol>,
    pub transitions: Vec<DfaEdge>,
}

#[derive(Debug, Clone)]
pub struct Dfa {
    pub states: Vec<DfaState>,
    pub start: usize,
}

impl Dfa {
    /// Does any transition in this DFA carry a precondition? The table
    /// generator cannot emit branching code, so it rejects any DFA where
    /// this is true.
    pub fn has_preconditions(&self) -> bool {
        self.states
            .iter()
            .any(|s| s.transitions.iter().any(|t| !t.preconds.is_empty()))
    }
}
