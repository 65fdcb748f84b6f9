//! Renders [`crate::codegen::ir`] into text. This is the only place a
//! concrete syntax is chosen — the target language itself is explicitly
//! out of scope, so the rendering is a fixed, arbitrary pseudocode surface
//! (C-like control flow, no particular host language's grammar).

use super::ir::{Expr, Program, Stmt};

pub fn render_program(program: &Program) -> String {
    let mut out = String::new();
    for stmt in program {
        render_stmt(stmt, 0, &mut out);
    }
    out
}

fn indent(level: usize, out: &mut String) {
    for _ in 0..level {
        out.push_str("    ");
    }
}

fn render_stmt(stmt: &Stmt, level: usize, out: &mut String) {
    match stmt {
        Stmt::Assign(name, expr) => {
            indent(level, out);
            out.push_str(name);
            out.push_str(" = ");
            out.push_str(&render_expr(expr));
            out.push_str(";\n");
        }
        Stmt::If(cond, then, els) => {
            indent(level, out);
            out.push_str("if (");
            out.push_str(&render_expr(cond));
            out.push_str(") {\n");
            for s in then {
                render_stmt(s, level + 1, out);
            }
            if !els.is_empty() {
                indent(level, out);
                out.push_str("} else {\n");
                for s in els {
                    render_stmt(s, level + 1, out);
                }
            }
            indent(level, out);
            out.push_str("}\n");
        }
        Stmt::While(cond, body) => {
            indent(level, out);
            out.push_str("while (");
            out.push_str(&render_expr(cond));
            out.push_str(") {\n");
            for s in body {
                render_stmt(s, level + 1, out);
            }
            indent(level, out);
            out.push_str("}\n");
        }
        Stmt::Label(name) => {
            out.push_str(name);
            out.push_str(":\n");
        }
        Stmt::Goto(name) => {
            indent(level, out);
            out.push_str("goto ");
            out.push_str(name);
            out.push_str(";\n");
        }
        Stmt::Break => {
            indent(level, out);
            out.push_str("break;\n");
        }
        Stmt::Raw(text) => {
            for line in text.lines() {
                indent(level, out);
                out.push_str(line);
                out.push('\n');
            }
        }
        Stmt::Block(stmts) => {
            for s in stmts {
                render_stmt(s, level, out);
            }
        }
        Stmt::Matrix { name, rows, width } => {
            indent(level, out);
            let ty = width.type_name();
            out.push_str(&format!(
                "static {name}: [[{ty}; 256]; {}] = [\n",
                rows.len()
            ));
            for row in rows {
                indent(level, out);
                out.push_str("    [");
                out.push_str(
                    &row.iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(", "),
                );
                out.push_str("],\n");
            }
            indent(level, out);
            out.push_str("];\n");
        }
    }
}

fn render_expr(expr: &Expr) -> String {
    match expr {
        Expr::Var(name) => name.clone(),
        Expr::Int(v) => v.to_string(),
        Expr::Eq(a, b) => format!("{} == {}", render_expr(a), render_expr(b)),
        Expr::Lt(a, b) => format!("{} < {}", render_expr(a), render_expr(b)),
        Expr::Gt(a, b) => format!("{} > {}", render_expr(a), render_expr(b)),
        Expr::Le(a, b) => format!("{} <= {}", render_expr(a), render_expr(b)),
        Expr::Ge(a, b) => format!("{} >= {}", render_expr(a), render_expr(b)),
        Expr::And(parts) => parts
            .iter()
            .map(render_expr)
            .collect::<Vec<_>>()
            .join(" && "),
        Expr::Or(parts) => parts
            .iter()
            .map(render_expr)
            .collect::<Vec<_>>()
            .join(" || "),
        Expr::Not(a) => format!("!({})", render_expr(a)),
        Expr::InRange(e, lo, hi) => {
            if lo == hi {
                format!("{} == {}", render_expr(e), lo)
            } else {
                format!("{} >= {} && {} <= {}", render_expr(e), lo, render_expr(e), hi)
            }
        }
        Expr::Add(a, b) => format!("{} + {}", render_expr(a), render_expr(b)),
        Expr::Sub(a, b) => format!("{} - {}", render_expr(a), render_expr(b)),
        Expr::Index(name, idx) => format!("{name}[{}]", render_expr(idx)),
        Expr::Index2(name, i, j) => format!("{name}[{}][{}]", render_expr(i), render_expr(j)),
        Expr::Raw(text) => text.clone(),
    }
}
