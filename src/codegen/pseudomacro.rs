//! Rewrites the closed set of pseudomacro placeholders that may appear
//! inside action fragments into concrete expressions over the
//! [`crate::codegen::CodeGenContext`] variable names, per spec §4.8.
//!
//! `escape`, `mark`, `unmark`, `markpos`, `bufferpos`, `setbuffer` take no
//! arguments; `relpos`/`abspos` take exactly one, and that argument is
//! itself recursively rewritten so nested macro calls work.

use crate::codegen::{CodeGenContext, CodeGenError, Generator};

/// Where a fragment being rewritten is allowed to use `escape`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroScope {
    /// Inside a per-transition action, in the generator's main scan loop.
    MainAction,
    /// Inside an EOF action — `escape` expands to nothing here.
    EofAction,
    /// Init code, error code, or anywhere else outside an action — using
    /// `escape` here is a compile error.
    NonAction,
}

const NULLARY: &[&str] = &[
    "escape",
    "mark",
    "unmark",
    "markpos",
    "bufferpos",
    "setbuffer",
];
const UNARY: &[&str] = &["relpos", "abspos"];

pub fn rewrite(
    code: &str,
    ctx: &CodeGenContext,
    generator: Generator,
    state: usize,
    scope: MacroScope,
) -> Result<String, CodeGenError> {
    let mut out = String::new();
    let bytes = code.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if is_ident_start(bytes[i]) {
            let start = i;
            while i < bytes.len() && is_ident_continue(bytes[i]) {
                i += 1;
            }
            let name = &code[start..i];
            if NULLARY.contains(&name) || UNARY.contains(&name) {
                // Zero-arg placeholders are written bare in spec.md's §4.8
                // table (`mark`, not `mark()`); `relpos(x)`/`abspos(x)` are
                // shown with parens since they take an argument. Recognize
                // the call form when parens follow, and the bare form
                // otherwise — a bare `relpos`/`abspos` still reaches
                // `expand` with no argument, so it surfaces the documented
                // arity-mismatch error instead of passing through as inert
                // text.
                let (arg, after) = if i < bytes.len() && bytes[i] == b'(' {
                    extract_args(code, i)?
                } else {
                    (None, i)
                };
                let expansion = expand(name, arg.as_deref(), ctx, generator, state, scope)?;
                out.push_str(&expansion);
                i = after;
            } else {
                out.push_str(name);
            }
        } else {
            out.push(bytes[i] as char);
            i += 1;
        }
    }
    Ok(out)
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}
fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// `paren_open` points at the `(` following a macro name. Returns the raw
/// argument text (`None` if the parens are empty) and the index just past
/// the matching `)`.
fn extract_args(code: &str, paren_open: usize) -> Result<(Option<String>, usize), CodeGenError> {
    let bytes = code.as_bytes();
    let mut depth = 0i32;
    let mut i = paren_open;
    let start = paren_open + 1;
    loop {
        if i >= bytes.len() {
            return Err(CodeGenError::UnbalancedMacroArgs);
        }
        match bytes[i] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    let inner = code[start..i].trim();
                    let arg = if inner.is_empty() {
                        None
                    } else {
                        Some(inner.to_string())
                    };
                    return Ok((arg, i + 1));
                }
            }
            _ => {}
        }
        i += 1;
    }
}

#[allow(clippy::too_many_arguments)]
fn expand(
    name: &str,
    arg: Option<&str>,
    ctx: &CodeGenContext,
    generator: Generator,
    state: usize,
    scope: MacroScope,
) -> Result<String, CodeGenError> {
    let arity_ok = match name {
        "relpos" | "abspos" => arg.is_some(),
        _ => arg.is_none(),
    };
    if !arity_ok {
        let expected = if UNARY.contains(&name) { 1 } else { 0 };
        return Err(CodeGenError::MacroArityMismatch {
            name: name.to_string(),
            expected,
        });
    }

    let mark_field = format!("{}.mark", ctx.buffer);
    match name {
        "escape" => match scope {
            MacroScope::NonAction => Err(CodeGenError::EscapeOutsideAction),
            MacroScope::EofAction => Ok(String::new()),
            MacroScope::MainAction => Ok(match generator {
                Generator::Table => format!("{} += 1; break", ctx.p),
                Generator::Goto => format!("{} = {}; {} += 1; goto exit", ctx.cs, state, ctx.p),
            }),
        },
        "mark" => Ok(format!("{} = {}", mark_field, ctx.p)),
        "unmark" => Ok(format!("{} = 0", mark_field)),
        "markpos" => Ok(mark_field),
        "bufferpos" => Ok(format!("{}.pos", ctx.buffer)),
        "setbuffer" => Ok(format!("{}.pos = {}", ctx.buffer, ctx.p)),
        "relpos" => {
            let inner = rewrite(arg.unwrap(), ctx, generator, state, scope)?;
            Ok(format!("({}) - {} + 1", inner, mark_field))
        }
        "abspos" => {
            let inner = rewrite(arg.unwrap(), ctx, generator, state, scope)?;
            Ok(format!("({}) + {} - 1", inner, mark_field))
        }
        _ => unreachable!("unrecognized macro name {name} reached expand()"),
    }
}
