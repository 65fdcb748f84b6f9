//! Subset construction over the action/precondition-bearing NFA.
//!
//! A DFA state is keyed by its epsilon closure *and* the pending
//! action/precondition burden each member node carries in from the
//! transition that produced it (actions sitting on an epsilon edge are
//! pushed forward onto the first concrete transition reachable from it,
//! per [`crate::nfa::build`]) — two closures over the same node set but
//! reached with different pending actions are genuinely different states.

use crate::byteset::{self, ByteSet};
use crate::dfa::{Dfa, DfaEdge, DfaState};
use crate::nfa::{merge_precond, Nfa, NodeId, PrecondMap};
use crate::regex::{Polarity, Symbol};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum DfaBuildError {
    #[error("unresolved nondeterminism: multiple transitions for byte {byte:#04x} are not distinguished by any mutually exclusive precondition")]
    UnresolvedNondeterminism { byte: u8 },
    #[error("precondition `{0}` is guarded with contradictory polarity on the same transition")]
    ContradictoryPrecondition(String),
    #[error("multiple epsilon paths reach the accepting state with different end-of-input action lists")]
    AmbiguousEofAccept,
}

type Pending = BTreeMap<NodeId, (Vec<Symbol>, PrecondMap)>;

/// Computes the epsilon closure of `start_nodes` along with the pending
/// action/precondition burden each newly-discovered node inherits from the
/// epsilon edge that first reaches it. When two distinct epsilon paths reach
/// the shared NFA accept node carrying different EOF action lists, which one
/// "wins" is observable at end-of-input, so that case is rejected outright
/// rather than resolved by discovery order.
fn eps_closure_info(nfa: &Nfa, start_nodes: &BTreeSet<NodeId>) -> Result<Pending, DfaBuildError> {
    let mut info: Pending = BTreeMap::new();
    let mut queue: VecDeque<NodeId> = VecDeque::new();
    for &n in start_nodes {
        info.insert(n, (Vec::new(), PrecondMap::new()));
        queue.push_back(n);
    }
    while let Some(n) = queue.pop_front() {
        let (acts, preconds) = info[&n].clone();
        for &eid in &nfa.nodes[n].out_edges {
            let e = &nfa.edges[eid];
            if e.byte_set.is_none() {
                let mut new_acts = acts.clone();
                new_acts.extend(e.actions.iter().cloned());
                if let Some((existing_acts, _)) = info.get(&e.target) {
                    if e.target == nfa.accept && *existing_acts != new_acts {
                        return Err(DfaBuildError::AmbiguousEofAccept);
                    }
                    continue;
                }
                let mut new_preconds = preconds.clone();
                for (k, v) in &e.preconds {
                    merge_precond(&mut new_preconds, k.clone(), *v);
                }
                info.insert(e.target, (new_acts, new_preconds));
                queue.push_back(e.target);
            }
        }
    }
    Ok(info)
}

fn mutually_exclusive(a: &PrecondMap, b: &PrecondMap) -> bool {
    a.iter().any(|(k, &pa)| {
        matches!(pa, Polarity::True | Polarity::False)
            && b.get(k)
                .map(|&pb| {
                    (pa == Polarity::True && pb == Polarity::False)
                        || (pa == Polarity::False && pb == Polarity::True)
                })
                .unwrap_or(false)
    })
}

struct Candidate {
    bs: ByteSet,
    actions: Vec<Symbol>,
    preconds: PrecondMap,
    target: NodeId,
}

#[tracing::instrument(level = "debug", skip(nfa))]
pub fn build(nfa: &Nfa) -> Result<Dfa, DfaBuildError> {
    let initial = eps_closure_info(nfa, &BTreeSet::from([nfa.start]))?;
    let mut state_table: HashMap<Pending, usize> = HashMap::new();
    let mut pendings: Vec<Pending> = Vec::new();
    let mut transitions: Vec<Vec<DfaEdge>> = Vec::new();
    state_table.insert(initial.clone(), 0);
    pendings.push(initial);
    transitions.push(Vec::new());

    let mut queue: VecDeque<usize> = VecDeque::new();
    queue.push_back(0);

    while let Some(si) = queue.pop_front() {
        let pending = pendings[si].clone();
        let mut candidates: Vec<Candidate> = Vec::new();
        for (&n, (acts_n, preconds_n)) in &pending {
            for &eid in &nfa.nodes[n].out_edges {
                let e = &nfa.edges[eid];
                if let Some(bs) = e.byte_set {
                    let mut actions = acts_n.clone();
                    actions.extend(e.actions.iter().cloned());
                    let mut preconds = preconds_n.clone();
                    for (k, v) in &e.preconds {
                        if !merge_precond(&mut preconds, k.clone(), *v) {
                            return Err(DfaBuildError::ContradictoryPrecondition(k.to_string()));
                        }
                    }
                    candidates.push(Candidate {
                        bs,
                        actions,
                        preconds,
                        target: e.target,
                    });
                }
            }
        }

        let sets: Vec<ByteSet> = candidates.iter().map(|c| c.bs).collect();
        for (lo, hi) in byteset::partition(&sets) {
            let rep = lo;
            let active: Vec<&Candidate> = candidates.iter().filter(|c| c.bs.contains(rep)).collect();
            if active.is_empty() {
                continue;
            }
            for i in 0..active.len() {
                for j in (i + 1)..active.len() {
                    if !mutually_exclusive(&active[i].preconds, &active[j].preconds) {
                        return Err(DfaBuildError::UnresolvedNondeterminism { byte: rep });
                    }
                }
            }
            for cand in &active {
                let raw = BTreeSet::from([cand.target]);
                let target_pending = eps_closure_info(nfa, &raw)?;
                let ti = *state_table.entry(target_pending.clone()).or_insert_with(|| {
                    pendings.push(target_pending);
                    transitions.push(Vec::new());
                    let idx = pendings.len() - 1;
                    queue.push_back(idx);
                    idx
                });
                transitions[si].push(DfaEdge {
                    lo,
                    hi,
                    target: ti,
                    actions: cand.actions.clone(),
                    preconds: cand.preconds.clone(),
                });
            }
        }
    }

    let states = pendings
        .into_iter()
        .zip(transitions.into_iter())
        .enumerate()
        .map(|(idx, (pending, transitions))| {
            let accept_entry = pending.get(&nfa.accept);
            DfaState {
                id: idx + 1,
                accepting: accept_entry.is_some(),
                eof_actions: accept_entry.map(|(a, _)| a.clone()).unwrap_or_default(),
                transitions,
            }
        })
        .collect();

    tracing::debug!(states = states.len(), "subset construction produced DFA");
    Ok(Dfa { states, start: 0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desugar::desugar;
    use crate::nfa;
    use crate::regex::parse::parse;
    use crate::regex::{Regex, Symbol};

    fn compile(pattern: &str) -> Dfa {
        let re = desugar(parse(pattern).unwrap());
        let n = nfa::build::build(&re).unwrap();
        build(&n).unwrap()
    }

    fn run(dfa: &Dfa, input: &[u8]) -> bool {
        let mut state = dfa.start;
        for &b in input {
            match dfa.states[state]
                .transitions
                .iter()
                .find(|t| t.lo <= b && b <= t.hi)
            {
                Some(t) => state = t.target,
                None => return false,
            }
        }
        dfa.states[state].accepting
    }

    #[test]
    fn literal_matches_exactly() {
        let dfa = compile("ab");
        assert!(run(&dfa, b"ab"));
        assert!(!run(&dfa, b"a"));
        assert!(!run(&dfa, b"abc"));
    }

    #[test]
    fn star_matches_zero_or_more() {
        let dfa = compile("a*");
        assert!(run(&dfa, b""));
        assert!(run(&dfa, b"aaaa"));
        assert!(!run(&dfa, b"aaab"));
    }

    #[test]
    fn alternation_matches_either_branch() {
        let dfa = compile("cat|dog");
        assert!(run(&dfa, b"cat"));
        assert!(run(&dfa, b"dog"));
        assert!(!run(&dfa, b"cow"));
    }

    #[test]
    fn states_numbered_from_one_in_bfs_order() {
        let dfa = compile("ab|ac");
        for (i, s) in dfa.states.iter().enumerate() {
            assert_eq!(s.id, i + 1);
        }
    }

    #[test]
    fn class_and_negated_class_match() {
        let dfa = compile("[0-9]+");
        assert!(run(&dfa, b"123"));
        assert!(!run(&dfa, b"12a"));
        let dfa = compile("[^0-9]+");
        assert!(run(&dfa, b"abc"));
        assert!(!run(&dfa, b"a1"));
    }

    #[test]
    fn ambiguous_eof_actions_are_rejected() {
        let re = desugar(Regex::alt(vec![
            Regex::epsilon().onexit(vec![Symbol::from("A")]),
            Regex::epsilon().onexit(vec![Symbol::from("B")]),
        ]));
        let n = nfa::build::build(&re).unwrap();
        assert_eq!(build(&n), Err(DfaBuildError::AmbiguousEofAccept));
    }

    #[test]
    fn isec_and_diff_are_decidable() {
        let a = desugar(parse("[a-z]+").unwrap());
        let b = desugar(parse("[a-m]+").unwrap());
        let re: Regex = a.isec(b);
        let n = nfa::build::build(&re).unwrap();
        let dfa = build(&n).unwrap();
        assert!(run(&dfa, b"abc"));
        assert!(!run(&dfa, b"xyz"));
    }
}
