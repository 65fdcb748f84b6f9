//! Labeled-block code generator (§4.7). Unlike the table generator this
//! one can express preconditions directly as guard conjunctions, since
//! each edge gets its own `if` rather than a precomputed matrix cell.

use super::ir::{Expr, Program, Stmt};
use super::pseudomacro::MacroScope;
use super::{rewrite_action, ActionMap, CodeGenContext, CodeGenError};
use crate::dfa::{Dfa, DfaEdge};
use crate::regex::Polarity;

fn byte_in_range(ctx: &CodeGenContext, lo: u8, hi: u8) -> Expr {
    Expr::InRange(Box::new(Expr::var(&ctx.byte)), lo, hi)
}

fn precond_expr(edge: &DfaEdge) -> Option<Expr> {
    if edge.preconds.is_empty() {
        return None;
    }
    let mut parts = Vec::new();
    for (name, polarity) in &edge.preconds {
        let guard = Expr::Raw(format!("guard({name})"));
        parts.push(match polarity {
            Polarity::True => guard,
            Polarity::False => Expr::not(guard),
            Polarity::Both => continue,
        });
    }
    if parts.is_empty() {
        None
    } else if parts.len() == 1 {
        Some(parts.into_iter().next().unwrap())
    } else {
        Some(Expr::And(parts))
    }
}

fn edge_label_size(edge: &DfaEdge) -> u32 {
    edge.hi as u32 - edge.lo as u32 + 1
}

pub fn generate(
    ctx: &CodeGenContext,
    dfa: &Dfa,
    actions: &ActionMap,
) -> Result<Program, CodeGenError> {
    let mut program = Program::new();

    // Entry dispatch.
    let mut entry_chain = Vec::new();
    for state in &dfa.states {
        entry_chain.push(Stmt::If(
            Expr::eq(Expr::var(&ctx.cs), Expr::int(state.id as i64)),
            vec![Stmt::Goto(format!("state_case_{}", state.id))],
            vec![],
        ));
    }
    entry_chain.push(Stmt::Goto("exit".to_string()));
    program.push(Stmt::Block(entry_chain));

    // Action prologues are indexed by a (destination state, action list)
    // pair — spec.md §4.7 groups them by "state N, distinct action-list L
    // on an incoming edge", and an edge's incoming state is its *target*,
    // not its source. Two different source states feeding the same target
    // with the same action list share one label, and — the part that
    // actually matters — the prologue's final jump lands on the state the
    // edge transitions to, not back on whichever source state happened to
    // reach it.
    let mut action_label_of: std::collections::HashMap<(usize, Vec<crate::regex::Symbol>), usize> =
        std::collections::HashMap::new();
    let mut next_action_idx: std::collections::HashMap<usize, usize> =
        std::collections::HashMap::new();

    for state in &dfa.states {
        program.push(Stmt::Label(format!("state_case_{}", state.id)));
        program.push(Stmt::Assign(
            ctx.byte.clone(),
            Expr::Index(ctx.data.clone(), Box::new(Expr::var(&ctx.p))),
        ));

        let mut edges: Vec<&DfaEdge> = state.transitions.iter().collect();
        edges.sort_by(|a, b| edge_label_size(b).cmp(&edge_label_size(a)));

        let mut state_body = Vec::new();
        for edge in &edges {
            let mut cond_parts = vec![byte_in_range(ctx, edge.lo, edge.hi)];
            if let Some(p) = precond_expr(edge) {
                cond_parts.push(p);
            }
            let cond = if cond_parts.len() == 1 {
                cond_parts.into_iter().next().unwrap()
            } else {
                Expr::And(cond_parts)
            };

            let target_id = state_to_id(dfa, edge.target);
            let target_label = if edge.actions.is_empty() {
                format!("state_{target_id}")
            } else {
                let idx_counter = next_action_idx.entry(target_id).or_insert(1);
                let idx = *action_label_of
                    .entry((edge.target, edge.actions.clone()))
                    .or_insert_with(|| {
                        let idx = *idx_counter;
                        *idx_counter += 1;
                        idx
                    });
                format!("state_{target_id}_action_{idx}")
            };
            state_body.push(Stmt::If(cond, vec![Stmt::Goto(target_label)], vec![]));
        }
        state_body.push(Stmt::Assign(ctx.cs.clone(), Expr::int(-(state.id as i64))));
        state_body.push(Stmt::Goto("exit".to_string()));
        program.push(Stmt::Block(state_body));

        // State advance block.
        program.push(Stmt::Label(format!("state_{}", state.id)));
        program.push(Stmt::Assign(
            ctx.p.clone(),
            Expr::add(Expr::var(&ctx.p), Expr::int(1)),
        ));
        program.push(Stmt::If(
            Expr::Gt(Box::new(Expr::var(&ctx.p)), Box::new(Expr::var(&ctx.p_end))),
            vec![
                Stmt::Assign(ctx.cs.clone(), Expr::int(state.id as i64)),
                Stmt::Goto("exit".to_string()),
            ],
            vec![],
        ));
        // Falls through to the next state's dispatch block when input
        // remains; code after this in BFS order is the next `state_case_N`.
        program.push(Stmt::Goto(format!("state_case_{}", state.id)));
    }

    // Action prologues, one per distinct (destination state, action list)
    // pair, each jumping into that destination's own advance block once run.
    let mut by_idx: Vec<(usize, Vec<crate::regex::Symbol>, usize)> = action_label_of
        .into_iter()
        .map(|((target, list), idx)| (target, list, idx))
        .collect();
    by_idx.sort_by_key(|(target, _, idx)| (state_to_id(dfa, *target), *idx));
    for (target, list, idx) in by_idx {
        let target_id = state_to_id(dfa, target);
        program.push(Stmt::Label(format!("state_{target_id}_action_{idx}")));
        let mut action_code = String::new();
        for name in &list {
            let raw = actions.get(name).map(|s| s.as_str()).unwrap_or("");
            action_code.push_str(&rewrite_action(raw, ctx, target_id, MacroScope::MainAction)?);
            action_code.push('\n');
        }
        program.push(Stmt::Raw(action_code));
        program.push(Stmt::Goto(format!("state_{target_id}")));
    }

    // Exit label with EOF handling.
    program.push(Stmt::Label("exit".to_string()));
    let mut eof_chain = Vec::new();
    for state in &dfa.states {
        if !state.accepting {
            continue;
        }
        let mut action_code = String::new();
        for name in &state.eof_actions {
            let raw = actions.get(name).map(|s| s.as_str()).unwrap_or("");
            action_code.push_str(&rewrite_action(raw, ctx, state.id, MacroScope::EofAction)?);
            action_code.push('\n');
        }
        eof_chain.push(Stmt::If(
            Expr::eq(Expr::var(&ctx.cs), Expr::int(state.id as i64)),
            vec![
                Stmt::Raw(action_code),
                Stmt::Assign(ctx.cs.clone(), Expr::int(0)),
            ],
            vec![],
        ));
    }
    program.push(Stmt::If(
        Expr::Raw(ctx.is_eof.clone()),
        eof_chain,
        vec![],
    ));

    Ok(program)
}

fn state_to_id(dfa: &Dfa, index: usize) -> usize {
    dfa.states[index].id
}

/// Stripped-down variant for [`crate::codegen::generate_buffer_validator`]:
/// drops action prologue labels, only keeps the state machine's control
/// flow and its three possible outcomes.
pub fn generate_validator_body(ctx: &CodeGenContext, dfa: &Dfa) -> Program {
    let mut program = Program::new();

    let mut entry_chain = Vec::new();
    for state in &dfa.states {
        entry_chain.push(Stmt::If(
            Expr::eq(Expr::var(&ctx.cs), Expr::int(state.id as i64)),
            vec![Stmt::Goto(format!("state_case_{}", state.id))],
            vec![],
        ));
    }
    entry_chain.push(Stmt::Goto("exit".to_string()));
    program.push(Stmt::Block(entry_chain));

    for state in &dfa.states {
        program.push(Stmt::Label(format!("state_case_{}", state.id)));
        program.push(Stmt::Assign(
            ctx.byte.clone(),
            Expr::Index(ctx.data.clone(), Box::new(Expr::var(&ctx.p))),
        ));
        let mut edges: Vec<&DfaEdge> = state.transitions.iter().collect();
        edges.sort_by(|a, b| edge_label_size(b).cmp(&edge_label_size(a)));
        let mut state_body = Vec::new();
        for edge in &edges {
            let cond = byte_in_range(ctx, edge.lo, edge.hi);
            state_body.push(Stmt::If(
                cond,
                vec![Stmt::Goto(format!("state_{}", state_to_id(dfa, edge.target)))],
                vec![],
            ));
        }
        state_body.push(Stmt::Raw(format!("return {};\n", ctx.p)));
        program.push(Stmt::Block(state_body));

        program.push(Stmt::Label(format!("state_{}", state.id)));
        program.push(Stmt::Assign(
            ctx.p.clone(),
            Expr::add(Expr::var(&ctx.p), Expr::int(1)),
        ));
        program.push(Stmt::If(
            Expr::Gt(Box::new(Expr::var(&ctx.p)), Box::new(Expr::var(&ctx.p_end))),
            vec![
                Stmt::Assign(ctx.cs.clone(), Expr::int(state.id as i64)),
                Stmt::Goto("exit".to_string()),
            ],
            vec![],
        ));
        program.push(Stmt::Goto(format!("state_case_{}", state.id)));
    }

    program.push(Stmt::Label("exit".to_string()));
    let mut accept_chain = Vec::new();
    for state in &dfa.states {
        if state.accepting {
            accept_chain.push(Stmt::If(
                Expr::eq(Expr::var(&ctx.cs), Expr::int(state.id as i64)),
                vec![Stmt::Raw("return none;\n".to_string())],
                vec![],
            ));
        }
    }
    accept_chain.push(Stmt::Raw("return 0;\n".to_string()));
    program.push(Stmt::Block(accept_chain));

    program
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{compile_regex, render::render_program, ActionMap};

    #[test]
    fn generates_labeled_blocks() {
        let m = compile_regex("ab+").unwrap();
        let ctx = CodeGenContext {
            generator: crate::codegen::Generator::Goto,
            ..CodeGenContext::default()
        };
        let program = generate(&ctx, &m.dfa, &ActionMap::new()).unwrap();
        let text = render_program(&program);
        assert!(text.contains("state_case_1"));
        assert!(text.contains("exit:"));
    }

    #[test]
    fn preconditions_compile_to_guard_conjunctions() {
        let re = crate::regex::precond(
            crate::regex::Regex::byte(b'a'),
            crate::regex::Symbol::from("g"),
            crate::regex::PrecondWhen::All,
            crate::regex::Polarity::True,
        );
        let m = crate::codegen::compile(re).unwrap();
        let ctx = CodeGenContext {
            generator: crate::codegen::Generator::Goto,
            ..CodeGenContext::default()
        };
        let program = generate(&ctx, &m.dfa, &ActionMap::new()).unwrap();
        let text = render_program(&program);
        assert!(text.contains("guard(g)"));
    }
}
