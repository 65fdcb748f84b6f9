//! A tiny interpreter over this crate's own [`super::ir`] `Program`s, used
//! only by tests to check that the table and goto generators agree on the
//! action trace they produce for the same input (spec.md §8, testable
//! property 2: "generator equivalence").
//!
//! It walks the structural IR the generators build — not the rendered
//! text — treating each action's own code as opaque: the test's
//! [`super::ActionMap`] supplies a `TRACE:<name>;` marker in place of real
//! host code, and this interpreter records a name each time it executes a
//! `Raw` block containing one. Matrix lookups, arithmetic, and
//! control-flow (`if`/`while`/`goto`/`label`) are all interpreted
//! structurally off the IR's own node types.

use super::ir::{Expr, Program, Stmt};
use super::{ActionMap, CodeGenContext};
use crate::dfa::Dfa;
use std::collections::HashMap;

/// Builds an [`ActionMap`] where every action referenced by `dfa` expands
/// to a `TRACE:<name>;` marker instead of real host code, for use with
/// [`action_trace`] — see the module docs.
pub(crate) fn trace_action_map(dfa: &Dfa) -> ActionMap {
    let mut actions = ActionMap::new();
    for name in super::referenced_actions(dfa) {
        actions.insert(name.clone(), format!("TRACE:{name};"));
    }
    actions
}

/// A flattened, jump-addressable instruction. `Stmt::If`/`Stmt::While` have
/// no direct counterpart here — they're expanded into conditional jumps
/// over synthetic labels during [`flatten`], since a `goto` can jump out of
/// what was a nested `if`/`while` in the source tree.
#[derive(Debug, Clone)]
enum Flat {
    Assign(String, Expr),
    Raw(String),
    GotoIfFalse(Expr, String),
    Goto(String),
    Label(String),
}

fn flatten(
    stmts: &[Stmt],
    matrices: &mut HashMap<String, Vec<Vec<i64>>>,
    ctr: &mut usize,
    out: &mut Vec<Flat>,
) {
    for stmt in stmts {
        flatten_one(stmt, matrices, ctr, out);
    }
}

fn fresh(ctr: &mut usize, tag: &str) -> String {
    *ctr += 1;
    format!("__{tag}_{ctr}")
}

fn flatten_one(
    stmt: &Stmt,
    matrices: &mut HashMap<String, Vec<Vec<i64>>>,
    ctr: &mut usize,
    out: &mut Vec<Flat>,
) {
    match stmt {
        Stmt::Assign(name, expr) => out.push(Flat::Assign(name.clone(), expr.clone())),
        Stmt::Raw(text) => out.push(Flat::Raw(text.clone())),
        Stmt::Label(name) => out.push(Flat::Label(name.clone())),
        Stmt::Goto(name) => out.push(Flat::Goto(name.clone())),
        Stmt::Break => panic!("interp: `break` outside a generator-emitted loop is unsupported"),
        Stmt::Block(stmts) => flatten(stmts, matrices, ctr, out),
        Stmt::Matrix { name, rows, .. } => {
            matrices.insert(name.clone(), rows.clone());
        }
        Stmt::If(cond, then, els) => {
            if els.is_empty() {
                let end = fresh(ctr, "if_end");
                out.push(Flat::GotoIfFalse(cond.clone(), end.clone()));
                flatten(then, matrices, ctr, out);
                out.push(Flat::Label(end));
            } else {
                let else_label = fresh(ctr, "if_else");
                let end = fresh(ctr, "if_end");
                out.push(Flat::GotoIfFalse(cond.clone(), else_label.clone()));
                flatten(then, matrices, ctr, out);
                out.push(Flat::Goto(end.clone()));
                out.push(Flat::Label(else_label));
                flatten(els, matrices, ctr, out);
                out.push(Flat::Label(end));
            }
        }
        Stmt::While(cond, body) => {
            let start = fresh(ctr, "while_start");
            let end = fresh(ctr, "while_end");
            out.push(Flat::Label(start.clone()));
            out.push(Flat::GotoIfFalse(cond.clone(), end.clone()));
            flatten(body, matrices, ctr, out);
            out.push(Flat::Goto(start));
            out.push(Flat::Label(end));
        }
    }
}

struct EvalCtx<'a> {
    vars: &'a HashMap<String, i64>,
    matrices: &'a HashMap<String, Vec<Vec<i64>>>,
    data: &'a [u8],
    ctx: &'a CodeGenContext,
}

fn eval(expr: &Expr, e: &EvalCtx) -> i64 {
    match expr {
        Expr::Var(name) => *e.vars.get(name).unwrap_or(&0),
        Expr::Int(v) => *v,
        Expr::Eq(a, b) => (eval(a, e) == eval(b, e)) as i64,
        Expr::Lt(a, b) => (eval(a, e) < eval(b, e)) as i64,
        Expr::Gt(a, b) => (eval(a, e) > eval(b, e)) as i64,
        Expr::Le(a, b) => (eval(a, e) <= eval(b, e)) as i64,
        Expr::Ge(a, b) => (eval(a, e) >= eval(b, e)) as i64,
        Expr::And(parts) => parts.iter().all(|p| eval(p, e) != 0) as i64,
        Expr::Or(parts) => parts.iter().any(|p| eval(p, e) != 0) as i64,
        Expr::Not(a) => (eval(a, e) == 0) as i64,
        Expr::InRange(inner, lo, hi) => {
            let v = eval(inner, e);
            (v >= *lo as i64 && v <= *hi as i64) as i64
        }
        Expr::Add(a, b) => eval(a, e) + eval(b, e),
        Expr::Sub(a, b) => eval(a, e) - eval(b, e),
        Expr::Index(name, idx) => {
            if name == &e.ctx.data {
                let i = eval(idx, e);
                if i >= 1 && (i as usize) <= e.data.len() {
                    e.data[(i - 1) as usize] as i64
                } else {
                    0
                }
            } else {
                0
            }
        }
        Expr::Index2(name, i, j) => {
            let iv = eval(i, e);
            let jv = eval(j, e);
            e.matrices
                .get(name)
                .and_then(|m| m.get(iv.max(0) as usize))
                .and_then(|row| row.get(jv.max(0) as usize))
                .copied()
                .unwrap_or(0)
        }
        Expr::Raw(text) => {
            if *text == e.ctx.is_eof {
                let p = *e.vars.get(&e.ctx.p).unwrap_or(&0);
                let p_end = *e.vars.get(&e.ctx.p_end).unwrap_or(&0);
                (p > p_end) as i64
            } else {
                0
            }
        }
    }
}

fn scan_trace(text: &str, trace: &mut Vec<String>) {
    for part in text.split(';') {
        if let Some(name) = part.trim().strip_prefix("TRACE:") {
            trace.push(name.trim().to_string());
        }
    }
}

/// Runs an emitted exec `Program` against `input`, returning the ordered
/// action trace. Only supports what the table/goto generators actually
/// emit for the default byte accessor and no preconditions — a `guard(...)`
/// condition (goto preconditions) or a custom `getbyte` accessor evaluate
/// to a constant `0`/unknown, so callers comparing generators should only
/// do so for precondition-free machines (table generation rejects
/// preconditions anyway).
pub(crate) fn action_trace(program: &Program, ctx: &CodeGenContext, input: &[u8]) -> Vec<String> {
    let mut matrices = HashMap::new();
    let mut ctr = 0usize;
    let mut flat = Vec::new();
    flatten(program, &mut matrices, &mut ctr, &mut flat);

    let mut labels = HashMap::new();
    for (i, instr) in flat.iter().enumerate() {
        if let Flat::Label(name) = instr {
            labels.insert(name.clone(), i);
        }
    }

    let mut vars = HashMap::new();
    vars.insert(ctx.p.clone(), 1i64);
    vars.insert(ctx.p_end.clone(), input.len() as i64);
    vars.insert(ctx.cs.clone(), 1i64);
    vars.insert(ctx.byte.clone(), 0i64);
    vars.insert("act".to_string(), 0i64);

    let mut trace = Vec::new();
    let mut pc = 0usize;
    let mut steps = 0u64;
    while pc < flat.len() {
        steps += 1;
        assert!(steps < 10_000_000, "interp: program did not halt");
        match &flat[pc] {
            Flat::Assign(name, expr) => {
                let e = EvalCtx {
                    vars: &vars,
                    matrices: &matrices,
                    data: input,
                    ctx,
                };
                let v = eval(expr, &e);
                vars.insert(name.clone(), v);
                pc += 1;
            }
            Flat::Raw(text) => {
                scan_trace(text, &mut trace);
                pc += 1;
            }
            Flat::GotoIfFalse(cond, label) => {
                let e = EvalCtx {
                    vars: &vars,
                    matrices: &matrices,
                    data: input,
                    ctx,
                };
                if eval(cond, &e) == 0 {
                    pc = *labels
                        .get(label)
                        .unwrap_or_else(|| panic!("interp: unknown label {label}"));
                } else {
                    pc += 1;
                }
            }
            Flat::Goto(label) => {
                pc = *labels
                    .get(label)
                    .unwrap_or_else(|| panic!("interp: unknown label {label}"));
            }
            Flat::Label(_) => pc += 1,
        }
    }
    trace
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::Generator;

    fn traced_actions(machine: &crate::codegen::Machine) -> ActionMap {
        trace_action_map(&machine.dfa)
    }

    #[test]
    fn table_and_goto_traces_agree_on_a_simple_pattern() {
        use crate::regex::{onenter, onexit, Regex, Symbol};

        let re = onexit(
            onenter(Regex::str("ab"), vec![Symbol::from("Enter")]),
            vec![Symbol::from("Exit")],
        );
        let machine = crate::codegen::compile(re).unwrap();
        let actions = traced_actions(&machine);

        let table_ctx = CodeGenContext::default();
        let goto_ctx = CodeGenContext {
            generator: Generator::Goto,
            ..CodeGenContext::default()
        };

        let table_prog = super::super::table::generate(&table_ctx, &machine.dfa, &actions).unwrap();
        let goto_prog = super::super::goto::generate(&goto_ctx, &machine.dfa, &actions).unwrap();

        let table_trace = action_trace(&table_prog, &table_ctx, b"ab");
        let goto_trace = action_trace(&goto_prog, &goto_ctx, b"ab");
        assert_eq!(table_trace, goto_trace);
        assert_eq!(table_trace, vec!["Enter".to_string(), "Exit".to_string()]);
    }

    #[test]
    fn table_and_goto_traces_agree_when_two_action_edges_lead_to_different_targets() {
        // Regression test: the goto generator's action prologues used to
        // jump back to the *source* state's advance block instead of the
        // edge's actual target, which a state with two distinct
        // action-bearing outgoing edges (here, on disjoint first bytes)
        // exercises directly.
        use crate::regex::{onenter, Regex, Symbol};

        let branch_a = onenter(Regex::str("ax"), vec![Symbol::from("A")]);
        let branch_b = onenter(Regex::str("by"), vec![Symbol::from("B")]);
        let re = Regex::alt(vec![branch_a, branch_b]);
        let machine = crate::codegen::compile(re).unwrap();
        let actions = traced_actions(&machine);

        let table_ctx = CodeGenContext::default();
        let goto_ctx = CodeGenContext {
            generator: Generator::Goto,
            ..CodeGenContext::default()
        };
        let table_prog = super::super::table::generate(&table_ctx, &machine.dfa, &actions).unwrap();
        let goto_prog = super::super::goto::generate(&goto_ctx, &machine.dfa, &actions).unwrap();

        for input in [b"ax".as_slice(), b"by".as_slice()] {
            let table_trace = action_trace(&table_prog, &table_ctx, input);
            let goto_trace = action_trace(&goto_prog, &goto_ctx, input);
            assert_eq!(table_trace, goto_trace, "input {input:?}");
            assert_eq!(table_trace, vec![if input == b"ax" { "A" } else { "B" }]);
        }
    }
}
