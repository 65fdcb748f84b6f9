//! Partition-refinement minimization. States are only merged when they are
//! indistinguishable including their action lists, preconditions and EOF
//! actions — two states that accept the same continuations but fire
//! different actions are kept distinct, since collapsing them would change
//! the compiled code's observable behavior.

use crate::dfa::{Dfa, DfaEdge, DfaState};
use std::collections::HashMap;

type Signature = (
    bool,
    Vec<crate::regex::Symbol>,
    Vec<(u8, u8, usize, Vec<crate::regex::Symbol>, Vec<(crate::regex::Symbol, crate::regex::Polarity)>)>,
);

#[tracing::instrument(level = "debug", skip(dfa))]
pub fn minimize(dfa: &Dfa) -> Dfa {
    let n = dfa.states.len();
    if n == 0 {
        return dfa.clone();
    }
    let mut class: Vec<usize> = dfa
        .states
        .iter()
        .map(|s| if s.accepting { 1 } else { 0 })
        .collect();

    loop {
        let mut signatures: Vec<Signature> = Vec::with_capacity(n);
        for s in &dfa.states {
            let mut trans: Vec<_> = s
                .transitions
                .iter()
                .map(|t| {
                    let preconds: Vec<_> = t.preconds.iter().map(|(k, v)| (k.clone(), *v)).collect();
                    (t.lo, t.hi, class[t.target], t.actions.clone(), preconds)
                })
                .collect();
            trans.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
            signatures.push((s.accepting, s.eof_actions.clone(), trans));
        }

        let mut sig_to_class: HashMap<Signature, usize> = HashMap::new();
        let mut new_class = vec![0usize; n];
        for (i, sig) in signatures.into_iter().enumerate() {
            let next_id = sig_to_class.len();
            let id = *sig_to_class.entry(sig).or_insert(next_id);
            new_class[i] = id;
        }

        let stable = sig_to_class.len() == class_count(&class);
        class = new_class;
        if stable {
            break;
        }
    }

    let result = rebuild(dfa, &class);
    tracing::debug!(
        before = n,
        after = result.states.len(),
        merged = n - result.states.len(),
        "minimization merged equivalent states"
    );
    result
}

fn class_count(class: &[usize]) -> usize {
    class.iter().copied().collect::<std::collections::HashSet<_>>().len()
}

fn rebuild(dfa: &Dfa, class: &[usize]) -> Dfa {
    let num_classes = class_count(class);
    // representative (lowest original index) per class
    let mut representative = vec![usize::MAX; num_classes];
    for (i, &c) in class.iter().enumerate() {
        if representative[c] == usize::MAX {
            representative[c] = i;
        }
    }

    // BFS renumber starting from the start state's class
    let start_class = class[dfa.start];
    let mut order: Vec<usize> = Vec::new();
    let mut seen = vec![false; num_classes];
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(start_class);
    seen[start_class] = true;
    while let Some(c) = queue.pop_front() {
        order.push(c);
        let rep = representative[c];
        for t in &dfa.states[rep].transitions {
            let tc = class[t.target];
            if !seen[tc] {
                seen[tc] = true;
                queue.push_back(tc);
            }
        }
    }
    // any classes unreachable from start (shouldn't normally occur) appended for completeness
    for c in 0..num_classes {
        if !seen[c] {
            order.push(c);
        }
    }

    let mut class_to_new_idx = vec![0usize; num_classes];
    for (new_idx, &c) in order.iter().enumerate() {
        class_to_new_idx[c] = new_idx;
    }

    let states = order
        .iter()
        .enumerate()
        .map(|(new_idx, &c)| {
            let rep = representative[c];
            let old = &dfa.states[rep];
            let transitions: Vec<DfaEdge> = old
                .transitions
                .iter()
                .map(|t| DfaEdge {
                    lo: t.lo,
                    hi: t.hi,
                    target: class_to_new_idx[class[t.target]],
                    actions: t.actions.clone(),
                    preconds: t.preconds.clone(),
                })
                .collect();
            DfaState {
                id: new_idx + 1,
                accepting: old.accepting,
                eof_actions: old.eof_actions.clone(),
                transitions,
            }
        })
        .collect();

    Dfa {
        states,
        start: class_to_new_idx[start_class],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desugar::desugar;
    use crate::dfa::build::build;
    use crate::nfa;
    use crate::regex::parse::parse;

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
    fn minimize_preserves_language() {
        let dfa = compile("(a|b)*abb");
        let min = minimize(&dfa);
        assert!(min.states.len() <= dfa.states.len());
        for s in ["abb", "aababb", "bbbabb", "ab", "abbb"] {
            assert_eq!(run(&dfa, s.as_bytes()), run(&min, s.as_bytes()), "{s}");
        }
    }

    #[test]
    fn states_renumbered_from_one() {
        let dfa = compile("a+b+");
        let min = minimize(&dfa);
        for (i, s) in min.states.iter().enumerate() {
            assert_eq!(s.id, i + 1);
        }
    }
}
