//! Thompson construction over the desugared primitive algebra
//! `{set, cat, alt, rep, isec, diff}`, decorating edges with actions and
//! preconditions as annotated regex nodes are folded in.
//!
//! `enter`/`exit`/`final`/`all` are resolved structurally rather than by
//! threading pending state through the recursion:
//! - `enter` decorates the fragment's own outgoing edges from `start`
//!   (always already present once the fragment's content is built).
//! - `exit` splices a fresh epsilon edge after `accept` carrying the exit
//!   actions, so composition (cat/alt/rep) or final epsilon elimination
//!   picks it up like any other edge.
//! - `final` decorates edges whose target is in the fragment-local
//!   backward epsilon closure of `accept` (the "last-byte" edges); it is
//!   an error if no such edge exists.
//! - `all` decorates every edge whose source belongs to the fragment.
//!
//! `isec`/`diff` are resolved by determinizing each operand locally (via
//! subset construction, dropping the operands' own actions — these are
//! boolean operations over languages, not action-preserving embeddings)
//! and then product-constructing the combined automaton, which is lifted
//! back into fresh NFA nodes.

use crate::byteset::{self, ByteSet};
use crate::nfa::{merge_precond, Edge, Nfa, Node, NodeId, PrecondMap};
use crate::regex::{Event, Regex, RegexKind};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ActionError {
    #[error("`final` annotation on a regex whose language has no definite last byte")]
    NoDefiniteLastByte,
    #[error("precondition `{0}` is guarded with contradictory polarity on the same edge")]
    ContradictoryPrecondition(String),
}

#[derive(Debug, Clone)]
struct Frag {
    start: NodeId,
    accept: NodeId,
    nodes: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProductOp {
    Isec,
    Diff,
}

pub struct NfaBuilder {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl NfaBuilder {
    fn new() -> Self {
        NfaBuilder {
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    fn new_node(&mut self) -> NodeId {
        self.nodes.push(Node::default());
        self.nodes.len() - 1
    }

    fn add_edge(&mut self, source: NodeId, target: NodeId, byte_set: Option<ByteSet>) -> usize {
        let id = self.edges.len();
        self.edges.push(Edge {
            source,
            target,
            byte_set,
            actions: Vec::new(),
            preconds: PrecondMap::new(),
        });
        self.nodes[source].out_edges.push(id);
        id
    }

    fn build(&mut self, re: &Regex) -> Result<Frag, ActionError> {
        let mut frag = self.build_content(re)?;
        self.apply_final(re, &frag)?;
        self.apply_all(re, &frag)?;
        self.apply_enter(re, &frag)?;
        self.apply_exit(re, &mut frag);
        Ok(frag)
    }

    fn build_content(&mut self, re: &Regex) -> Result<Frag, ActionError> {
        match &re.kind {
            RegexKind::Set(set) => {
                let s = self.new_node();
                let a = self.new_node();
                self.add_edge(s, a, Some(*set));
                Ok(Frag {
                    start: s,
                    accept: a,
                    nodes: vec![s, a],
                })
            }
            RegexKind::Cat => {
                if re.children.is_empty() {
                    let n = self.new_node();
                    return Ok(Frag {
                        start: n,
                        accept: n,
                        nodes: vec![n],
                    });
                }
                let mut children = re.children.iter();
                let mut acc = self.build(children.next().unwrap())?;
                for child in children {
                    let next = self.build(child)?;
                    self.add_edge(acc.accept, next.start, None);
                    acc.nodes.extend(next.nodes.iter().copied());
                    acc.accept = next.accept;
                }
                Ok(acc)
            }
            RegexKind::Alt => {
                let s = self.new_node();
                let a = self.new_node();
                let mut nodes = vec![s, a];
                for child in &re.children {
                    let f = self.build(child)?;
                    self.add_edge(s, f.start, None);
                    self.add_edge(f.accept, a, None);
                    nodes.extend(f.nodes.iter().copied());
                }
                Ok(Frag {
                    start: s,
                    accept: a,
                    nodes,
                })
            }
            RegexKind::Rep => {
                let x = self.build(&re.children[0])?;
                let s = self.new_node();
                let a = self.new_node();
                self.add_edge(s, x.start, None);
                self.add_edge(s, a, None);
                self.add_edge(x.accept, x.start, None);
                self.add_edge(x.accept, a, None);
                let mut nodes = vec![s, a];
                nodes.extend(x.nodes.iter().copied());
                Ok(Frag {
                    start: s,
                    accept: a,
                    nodes,
                })
            }
            RegexKind::Isec => self.build_product(&re.children[0], &re.children[1], ProductOp::Isec),
            RegexKind::Diff => self.build_product(&re.children[0], &re.children[1], ProductOp::Diff),
            other => unreachable!(
                "non-primitive regex kind {:?} reached the NFA builder; desugar first",
                other
            ),
        }
    }

    fn backward_eps_closure(&self, accept: NodeId, scope: &[NodeId]) -> HashSet<NodeId> {
        let mut closure = HashSet::new();
        closure.insert(accept);
        let mut changed = true;
        while changed {
            changed = false;
            for &n in scope {
                if closure.contains(&n) {
                    continue;
                }
                for &eid in &self.nodes[n].out_edges {
                    let e = &self.edges[eid];
                    if e.byte_set.is_none() && closure.contains(&e.target) {
                        closure.insert(n);
                        changed = true;
                        break;
                    }
                }
            }
        }
        closure
    }

    fn last_byte_edges(&self, frag: &Frag) -> Vec<usize> {
        let closure = self.backward_eps_closure(frag.accept, &frag.nodes);
        let mut result = Vec::new();
        for &n in &frag.nodes {
            for &eid in &self.nodes[n].out_edges {
                let e = &self.edges[eid];
                if e.byte_set.is_some() && closure.contains(&e.target) {
                    result.push(eid);
                }
            }
        }
        result
    }

    fn apply_final(&mut self, re: &Regex, frag: &Frag) -> Result<(), ActionError> {
        if let Some(actions) = re.annotations.actions.get(&Event::Final) {
            let edges = self.last_byte_edges(frag);
            if edges.is_empty() {
                return Err(ActionError::NoDefiniteLastByte);
            }
            for eid in edges {
                self.edges[eid].actions.extend(actions.iter().cloned());
            }
        }
        Ok(())
    }

    fn apply_all(&mut self, re: &Regex, frag: &Frag) -> Result<(), ActionError> {
        let all_actions = re.annotations.actions.get(&Event::All);
        let precond_all = &re.annotations.precond_all;
        if all_actions.is_none() && precond_all.is_none() {
            return Ok(());
        }
        for &n in &frag.nodes {
            let edge_ids = self.nodes[n].out_edges.clone();
            for eid in edge_ids {
                if let Some(actions) = all_actions {
                    let mut combined = actions.clone();
                    combined.append(&mut self.edges[eid].actions);
                    self.edges[eid].actions = combined;
                }
                if let Some((name, pol)) = precond_all {
                    if !merge_precond(&mut self.edges[eid].preconds, name.clone(), *pol) {
                        return Err(ActionError::ContradictoryPrecondition(name.to_string()));
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_enter(&mut self, re: &Regex, frag: &Frag) -> Result<(), ActionError> {
        let enter_actions = re.annotations.actions.get(&Event::Enter);
        let precond_enter = &re.annotations.precond_enter;
        if enter_actions.is_none() && precond_enter.is_none() {
            return Ok(());
        }
        let edge_ids = self.nodes[frag.start].out_edges.clone();
        for eid in edge_ids {
            if let Some(actions) = enter_actions {
                self.edges[eid].actions.extend(actions.iter().cloned());
            }
            if let Some((name, pol)) = precond_enter {
                if !merge_precond(&mut self.edges[eid].preconds, name.clone(), *pol) {
                    return Err(ActionError::ContradictoryPrecondition(name.to_string()));
                }
            }
        }
        Ok(())
    }

    fn apply_exit(&mut self, re: &Regex, frag: &mut Frag) {
        let exit_actions = match re.annotations.actions.get(&Event::Exit) {
            Some(a) if !a.is_empty() => a.clone(),
            _ => return,
        };
        let new_accept = self.new_node();
        let eid = self.add_edge(frag.accept, new_accept, None);
        self.edges[eid].actions = exit_actions;
        if let Some((name, pol)) = &re.annotations.precond_all {
            merge_precond(&mut self.edges[eid].preconds, name.clone(), *pol);
        }
        frag.nodes.push(new_accept);
        frag.accept = new_accept;
    }

    // --- isec / diff: local determinize + product construction ---

    fn eps_closure(&self, set: &BTreeSet<NodeId>) -> BTreeSet<NodeId> {
        let mut closure = set.clone();
        let mut stack: Vec<NodeId> = set.iter().copied().collect();
        while let Some(n) = stack.pop() {
            for &eid in &self.nodes[n].out_edges {
                let e = &self.edges[eid];
                if e.byte_set.is_none() && closure.insert(e.target) {
                    stack.push(e.target);
                }
            }
        }
        closure
    }

    fn local_determinize(&self, start: NodeId, accept: NodeId) -> LocalDfa {
        let s0 = self.eps_closure(&BTreeSet::from([start]));
        let mut states = vec![s0.clone()];
        let mut index = HashMap::new();
        index.insert(s0, 0usize);
        let mut trans: Vec<Vec<(u8, u8, usize)>> = vec![Vec::new()];
        let mut queue = vec![0usize];
        while let Some(si) = queue.pop() {
            let state = states[si].clone();
            let mut sets = Vec::new();
            for &n in &state {
                for &eid in &self.nodes[n].out_edges {
                    if let Some(bs) = self.edges[eid].byte_set {
                        sets.push(bs);
                    }
                }
            }
            for (lo, hi) in byteset::partition(&sets) {
                let rep = lo;
                let mut target = BTreeSet::new();
                for &n in &state {
                    for &eid in &self.nodes[n].out_edges {
                        let e = &self.edges[eid];
                        if let Some(bs) = e.byte_set {
                            if bs.contains(rep) {
                                target.insert(e.target);
                            }
                        }
                    }
                }
                if target.is_empty() {
                    continue;
                }
                let target = self.eps_closure(&target);
                let ti = *index.entry(target.clone()).or_insert_with(|| {
                    states.push(target);
                    trans.push(Vec::new());
                    queue.push(states.len() - 1);
                    states.len() - 1
                });
                trans[si].push((lo, hi, ti));
            }
        }
        let accepting = states.iter().map(|s| s.contains(&accept)).collect();
        LocalDfa { trans, accepting }
    }

    fn build_product(
        &mut self,
        a: &Regex,
        b: &Regex,
        op: ProductOp,
    ) -> Result<Frag, ActionError> {
        let fa = self.build(a)?;
        let fb = self.build(b)?;
        let da = self.local_determinize(fa.start, fa.accept);
        let db = self.local_determinize(fb.start, fb.accept);

        type Half = Option<usize>;
        let step = |dfa: &LocalDfa, s: Half, byte: u8| -> Half {
            s.and_then(|s| {
                dfa.trans[s]
                    .iter()
                    .find(|&&(l, h, _)| l <= byte && byte <= h)
                    .map(|&(_, _, t)| t)
            })
        };
        let accept_half = |dfa: &LocalDfa, s: Half| -> bool { s.map_or(false, |s| dfa.accepting[s]) };
        let combine = |op: ProductOp, a: bool, b: bool| match op {
            ProductOp::Isec => a && b,
            ProductOp::Diff => a && !b,
        };

        let start_pair: (Half, Half) = (Some(0), Some(0));
        let mut pair_index: HashMap<(Half, Half), usize> = HashMap::new();
        let mut pairs = vec![start_pair];
        pair_index.insert(start_pair, 0);
        let mut queue = vec![0usize];
        let mut product_trans: Vec<Vec<(u8, u8, usize)>> = vec![Vec::new()];
        let mut product_accept: Vec<bool> =
            vec![combine(op, accept_half(&da, start_pair.0), accept_half(&db, start_pair.1))];

        while let Some(pi) = queue.pop() {
            let (ia, ib) = pairs[pi];
            let mut sets = Vec::new();
            if let Some(ia) = ia {
                for &(lo, hi, _) in &da.trans[ia] {
                    sets.push(ByteSet::from_range(lo, hi));
                }
            }
            if let Some(ib) = ib {
                for &(lo, hi, _) in &db.trans[ib] {
                    sets.push(ByteSet::from_range(lo, hi));
                }
            }
            for (lo, hi) in byteset::partition(&sets) {
                let rep = lo;
                let ta = step(&da, ia, rep);
                let tb = step(&db, ib, rep);
                if ta.is_none() && tb.is_none() {
                    continue;
                }
                let key = (ta, tb);
                let ti = *pair_index.entry(key).or_insert_with(|| {
                    pairs.push(key);
                    product_trans.push(Vec::new());
                    product_accept.push(combine(op, accept_half(&da, ta), accept_half(&db, tb)));
                    queue.push(pairs.len() - 1);
                    pairs.len() - 1
                });
                product_trans[pi].push((lo, hi, ti));
            }
        }

        let node_ids: Vec<NodeId> = (0..pairs.len()).map(|_| self.new_node()).collect();
        let final_accept = self.new_node();
        let mut nodes = node_ids.clone();
        nodes.push(final_accept);
        for (pi, &node) in node_ids.iter().enumerate() {
            for &(lo, hi, ti) in &product_trans[pi] {
                self.add_edge(node, node_ids[ti], Some(ByteSet::from_range(lo, hi)));
            }
            if product_accept[pi] {
                self.add_edge(node, final_accept, None);
            }
        }
        Ok(Frag {
            start: node_ids[0],
            accept: final_accept,
            nodes,
        })
    }
}

struct LocalDfa {
    trans: Vec<Vec<(u8, u8, usize)>>,
    accepting: Vec<bool>,
}

/// Builds the NFA for an already-desugared regex tree.
#[tracing::instrument(level = "debug", skip(re))]
pub fn build(re: &Regex) -> Result<Nfa, ActionError> {
    let mut builder = NfaBuilder::new();
    let frag = builder.build(re)?;
    let nfa = Nfa {
        nodes: builder.nodes,
        edges: builder.edges,
        start: frag.start,
        accept: frag.accept,
    };
    tracing::debug!(nodes = nfa.nodes.len(), edges = nfa.edges.len(), "built NFA");
    Ok(nfa)
}
