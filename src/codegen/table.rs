//! Dense-matrix code generator (§4.6). Two `(state, byte)` matrices — a
//! transition table and an action-list-id table — plus a fixed five-step
//! execution skeleton. Cannot express preconditions; [`crate::codegen::generate_exec_code`]
//! rejects any DFA carrying them before reaching this module.

use super::ir::{Expr, IntWidth, Program, Stmt};
use super::pseudomacro::MacroScope;
use super::{rewrite_action, ActionMap, CodeGenContext, CodeGenError};
use crate::dfa::Dfa;
use crate::regex::Symbol;

/// Assigns a compact id to each distinct ordered action list seen on an
/// edge or EOF list: `0` for the empty list, `1..K` for the rest, in
/// first-seen order (§9 design notes).
struct ActionLists {
    ids: std::collections::HashMap<Vec<Symbol>, usize>,
    ordered: Vec<Vec<Symbol>>,
}

impl ActionLists {
    fn new() -> Self {
        ActionLists {
            ids: std::collections::HashMap::new(),
            ordered: Vec::new(),
        }
    }

    fn id_for(&mut self, list: &[Symbol]) -> usize {
        if list.is_empty() {
            return 0;
        }
        if let Some(&id) = self.ids.get(list) {
            return id;
        }
        self.ordered.push(list.to_vec());
        let id = self.ordered.len();
        self.ids.insert(list.to_vec(), id);
        id
    }
}

/// Dense `(state, byte)` matrix, 1-based on the state axis (`rows[0]` is
/// an unused placeholder so `rows[state_id]` indexes directly).
struct Matrix {
    rows: Vec<[i64; 256]>,
}

impl Matrix {
    fn new(num_states: usize) -> Self {
        Matrix {
            rows: vec![[0i64; 256]; num_states + 1],
        }
    }

    /// Largest absolute value stored anywhere in the matrix, used to pick
    /// the narrowest signed width that can hold every cell (spec.md §4.6).
    fn max_abs(&self) -> i64 {
        self.rows
            .iter()
            .flat_map(|r| r.iter())
            .map(|&v| v.unsigned_abs())
            .max()
            .map(|v| v as i64)
            .unwrap_or(0)
    }

    fn to_stmt(&self, name: &str) -> Stmt {
        Stmt::Matrix {
            name: name.to_string(),
            rows: self.rows.iter().map(|r| r.to_vec()).collect(),
            width: IntWidth::smallest_for(self.max_abs()),
        }
    }
}

fn build_matrices(dfa: &Dfa, action_lists: &mut ActionLists) -> (Matrix, Matrix) {
    let num_states = dfa.states.len();
    let mut t = Matrix::new(num_states);
    let mut a = Matrix::new(num_states);
    for state in &dfa.states {
        for byte in 0..=255u8 {
            t.rows[state.id][byte as usize] = -(state.id as i64);
        }
        for edge in &state.transitions {
            let action_id = action_lists.id_for(&edge.actions) as i64;
            for byte in edge.lo..=edge.hi {
                t.rows[state.id][byte as usize] = edge.target as i64 + 1;
                a.rows[state.id][byte as usize] = action_id;
            }
        }
    }
    (t, a)
}

pub fn generate(
    ctx: &CodeGenContext,
    dfa: &Dfa,
    actions: &ActionMap,
) -> Result<Program, CodeGenError> {
    let mut action_lists = ActionLists::new();
    let (t, a) = build_matrices(dfa, &mut action_lists);

    let mut program = Program::new();
    program.push(t.to_stmt("T"));
    program.push(a.to_stmt("A"));

    let getbyte_expr = match &ctx.getbyte {
        Some(custom) => Expr::Raw(custom.clone()),
        None => Expr::Index(ctx.data.clone(), Box::new(Expr::var(&ctx.p))),
    };

    let loop_cond = Expr::And(vec![
        Expr::Le(
            Box::new(Expr::var(&ctx.p)),
            Box::new(Expr::var(&ctx.p_end)),
        ),
        Expr::Gt(Box::new(Expr::var(&ctx.cs)), Box::new(Expr::int(0))),
    ]);

    let mut body = Vec::new();
    body.push(Stmt::Assign(ctx.byte.clone(), getbyte_expr));
    body.push(Stmt::Assign(
        "act".to_string(),
        Expr::Index2(
            "A".to_string(),
            Box::new(Expr::var(&ctx.cs)),
            Box::new(Expr::var(&ctx.byte)),
        ),
    ));
    body.push(Stmt::Assign(
        ctx.cs.clone(),
        Expr::Index2(
            "T".to_string(),
            Box::new(Expr::var(&ctx.cs)),
            Box::new(Expr::var(&ctx.byte)),
        ),
    ));

    for (list, id) in action_lists.ordered.iter().zip(1..) {
        let mut action_code = String::new();
        for name in list {
            let raw = actions.get(name).map(|s| s.as_str()).unwrap_or("");
            action_code.push_str(&rewrite_action(raw, ctx, 0, MacroScope::MainAction)?);
            action_code.push('\n');
        }
        body.push(Stmt::If(
            Expr::eq(Expr::var("act"), Expr::int(id)),
            vec![Stmt::Raw(action_code)],
            vec![],
        ));
    }
    body.push(Stmt::Assign(
        ctx.p.clone(),
        Expr::add(Expr::var(&ctx.p), Expr::int(1)),
    ));
    program.push(Stmt::While(loop_cond, body));

    // Step 3/5: EOF handling against each accept state's action list.
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
    let eof_block = Stmt::If(
        Expr::And(vec![
            Expr::Gt(Box::new(Expr::var(&ctx.p)), Box::new(Expr::var(&ctx.p_end))),
            Expr::Gt(Box::new(Expr::var(&ctx.cs)), Box::new(Expr::int(0))),
        ]),
        eof_chain,
        vec![Stmt::If(
            Expr::Lt(Box::new(Expr::var(&ctx.cs)), Box::new(Expr::int(0))),
            vec![Stmt::Assign(
                ctx.p.clone(),
                Expr::sub(Expr::var(&ctx.p), Expr::int(1)),
            )],
            vec![],
        )],
    );
    program.push(eof_block);

    Ok(program)
}

/// Stripped-down variant for [`crate::codegen::generate_buffer_validator`]:
/// no host action dispatch, only the structural match/EOF/error outcomes.
pub fn generate_validator_body(
    ctx: &CodeGenContext,
    dfa: &Dfa,
) -> Result<Program, CodeGenError> {
    let mut action_lists = ActionLists::new();
    let (t, _a) = build_matrices(dfa, &mut action_lists);

    let mut program = Program::new();
    program.push(t.to_stmt("T"));

    let loop_cond = Expr::And(vec![
        Expr::Le(
            Box::new(Expr::var(&ctx.p)),
            Box::new(Expr::var(&ctx.p_end)),
        ),
        Expr::Gt(Box::new(Expr::var(&ctx.cs)), Box::new(Expr::int(0))),
    ]);
    let body = vec![
        Stmt::Assign(
            ctx.byte.clone(),
            Expr::Index(ctx.data.clone(), Box::new(Expr::var(&ctx.p))),
        ),
        Stmt::Assign(
            ctx.cs.clone(),
            Expr::Index2(
                "T".to_string(),
                Box::new(Expr::var(&ctx.cs)),
                Box::new(Expr::var(&ctx.byte)),
            ),
        ),
        Stmt::If(
            Expr::Lt(Box::new(Expr::var(&ctx.cs)), Box::new(Expr::int(0))),
            vec![Stmt::Raw(format!("return {};\n", ctx.p))],
            vec![],
        ),
        Stmt::Assign(ctx.p.clone(), Expr::add(Expr::var(&ctx.p), Expr::int(1))),
    ];
    program.push(Stmt::While(loop_cond, body));

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
    program.push(Stmt::If(
        Expr::Gt(Box::new(Expr::var(&ctx.p)), Box::new(Expr::var(&ctx.p_end))),
        accept_chain,
        vec![],
    ));

    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{compile_regex, render::render_program, ActionMap};

    #[test]
    fn generates_matrices_and_loop() {
        let m = compile_regex("ab+").unwrap();
        let ctx = CodeGenContext::default();
        let program = generate(&ctx, &m.dfa, &ActionMap::new()).unwrap();
        let text = render_program(&program);
        assert!(text.contains("static T"));
        assert!(text.contains("static A"));
        assert!(text.contains("while"));
    }

    #[test]
    fn small_machine_narrows_matrices_below_i64() {
        // A handful of states and no actions: both T's sentinels/targets and
        // A's all-zero action ids fit in i8, so neither matrix should be
        // emitted at the full i64 width.
        let m = compile_regex("ab+").unwrap();
        let ctx = CodeGenContext::default();
        let program = generate(&ctx, &m.dfa, &ActionMap::new()).unwrap();
        let text = render_program(&program);
        assert!(text.contains("static T: [[i8; 256]"));
        assert!(text.contains("static A: [[i8; 256]"));
    }

    #[test]
    fn action_table_widens_past_i8_with_enough_distinct_action_lists() {
        use crate::regex::{onfinal, Regex, Symbol};

        // 200 branches sharing the prefix byte 'a' but each ending on its
        // own distinct second byte with its own `final` action: enough
        // distinct action-list ids to push the action table past i8's
        // 127-value range, while the state count (and so T) stays small.
        let branches: Vec<Regex> = (0..200u32)
            .map(|i| {
                let snippet = Regex::cat(vec![Regex::byte(b'a'), Regex::byte(i as u8)]);
                onfinal(snippet, vec![Symbol::from(format!("A{i}"))])
            })
            .collect();
        let re = Regex::alt(branches);
        let machine = crate::codegen::compile(re).unwrap();
        let ctx = CodeGenContext::default();
        let mut actions = ActionMap::new();
        for i in 0..200 {
            actions.insert(Symbol::from(format!("A{i}")), "noop();".to_string());
        }
        let program = generate(&ctx, &machine.dfa, &actions).unwrap();
        let text = render_program(&program);
        assert!(text.contains("static A: [[i16; 256]"));
    }

    #[test]
    fn validator_body_has_no_action_dispatch() {
        let m = compile_regex("a+b").unwrap();
        let ctx = CodeGenContext::default();
        let program = generate_validator_body(&ctx, &m.dfa).unwrap();
        let text = render_program(&program);
        assert!(text.contains("return none"));
        assert!(!text.contains("static A"));
    }
}
