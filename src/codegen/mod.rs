//! Code generation: turns a compiled [`Dfa`] plus a caller-supplied action
//! map into emitted source text. Two backends share the same
//! [`CodeGenContext`]/[`ActionMap`] inputs and the same [`ir`]/[`render`]
//! machinery — [`table`] (dense matrices, no preconditions) and [`goto`]
//! (labeled blocks, preconditions allowed).

pub mod goto;
pub mod ir;
#[cfg(test)]
pub(crate) mod interp;
pub mod pseudomacro;
pub mod render;
pub mod table;

use crate::dfa::{build::build as build_dfa, minimize::minimize, Dfa};
use crate::desugar::desugar;
use crate::nfa::build::build as build_nfa;
use crate::regex::{parse::parse, Regex, Symbol};
use pseudomacro::MacroScope;
use std::collections::BTreeMap;
use thiserror::Error;

/// The result of [`compile`]: a minimized DFA ready for code generation.
#[derive(Debug, Clone)]
pub struct Machine {
    pub dfa: Dfa,
}

/// Full pipeline from an annotated regex AST through DFA construction.
pub fn compile(re: Regex) -> Result<Machine, crate::error::Error> {
    let desugared = desugar(re);
    let nfa = build_nfa(&desugared)?;
    let dfa = build_dfa(&nfa)?;
    Ok(Machine {
        dfa: minimize(&dfa),
    })
}

/// Convenience: parse then compile in one step.
pub fn compile_regex(pattern: &str) -> Result<Machine, crate::error::Error> {
    let re = parse(pattern)?;
    compile(re)
}

/// `name -> emitted code text` for each action referenced by the machine's
/// transitions and EOF action lists. The code text may itself contain
/// pseudomacro placeholders, rewritten at emission time.
pub type ActionMap = BTreeMap<Symbol, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generator {
    Table,
    Goto,
}

/// Variable-name and behavior configuration for a code generation call.
/// Field defaults match spec'd identifiers; construct with [`Default`] and
/// override only what differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeGenContext {
    pub p: String,
    pub p_end: String,
    pub is_eof: String,
    pub cs: String,
    pub data: String,
    pub mem: String,
    pub byte: String,
    pub buffer: String,
    pub generator: Generator,
    /// Custom `(mem, p) -> byte` accessor name for the table generator.
    /// `None` means the default direct-indexing accessor. The goto
    /// generator requires the default accessor.
    pub getbyte: Option<String>,
    /// Strip source-position metadata (comments) from emitted code.
    pub clean: bool,
}

impl Default for CodeGenContext {
    fn default() -> Self {
        CodeGenContext {
            p: "p".to_string(),
            p_end: "p_end".to_string(),
            is_eof: "is_eof".to_string(),
            cs: "cs".to_string(),
            data: "data".to_string(),
            mem: "mem".to_string(),
            byte: "byte".to_string(),
            buffer: "buffer".to_string(),
            generator: Generator::Table,
            getbyte: None,
            clean: false,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CodeGenError {
    #[error("table generator cannot emit preconditions; use the goto generator")]
    PreconditionsWithTableGenerator,
    #[error("goto generator requires the default byte accessor")]
    CustomAccessorWithGoto,
    #[error("macro `{name}` expects {expected} argument(s)")]
    MacroArityMismatch { name: String, expected: usize },
    #[error("`escape` used outside action scope")]
    EscapeOutsideAction,
    #[error("unbalanced parentheses in macro arguments")]
    UnbalancedMacroArgs,
    #[error("action map is missing action(s): {0:?}")]
    MissingActions(Vec<Symbol>),
    #[error("action map has unreferenced action(s): {0:?}")]
    ExtraActions(Vec<Symbol>),
}

/// All action names referenced anywhere in `dfa`, in the order first seen
/// by a BFS over its states (stable, not load-bearing beyond determinism).
fn referenced_actions(dfa: &Dfa) -> Vec<Symbol> {
    let mut seen = std::collections::BTreeSet::new();
    let mut out = Vec::new();
    for state in &dfa.states {
        for t in &state.transitions {
            for a in &t.actions {
                if seen.insert(a.clone()) {
                    out.push(a.clone());
                }
            }
        }
        for a in &state.eof_actions {
            if seen.insert(a.clone()) {
                out.push(a.clone());
            }
        }
    }
    out
}

fn validate_actions(dfa: &Dfa, actions: &ActionMap) -> Result<(), CodeGenError> {
    let referenced = referenced_actions(dfa);
    let missing: Vec<Symbol> = referenced
        .iter()
        .filter(|a| !actions.contains_key(*a))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(CodeGenError::MissingActions(missing));
    }
    let referenced_set: std::collections::BTreeSet<_> = referenced.into_iter().collect();
    let extra: Vec<Symbol> = actions
        .keys()
        .filter(|a| !referenced_set.contains(*a))
        .cloned()
        .collect();
    if !extra.is_empty() {
        return Err(CodeGenError::ExtraActions(extra));
    }
    Ok(())
}

/// Initialization code: step 1 of the table generator's execution skeleton
/// (§4.6), shared verbatim by the goto generator's entry block.
pub fn generate_init_code(ctx: &CodeGenContext) -> String {
    let mut out = String::new();
    if !ctx.clean {
        out.push_str("// initialize scan position and start state\n");
    }
    out.push_str(&format!("{} = 1;\n", ctx.p));
    out.push_str(&format!("{} = len({});\n", ctx.p_end, ctx.data));
    out.push_str(&format!("{} = 1;\n", ctx.cs));
    out
}

/// Error-reporting code: invokes the host reporter with the machine
/// descriptor, last-valid state, offending byte (or none on EOF), the
/// buffer, and the current position.
pub fn generate_input_error_code(ctx: &CodeGenContext) -> String {
    let mut out = String::new();
    if !ctx.clean {
        out.push_str("// report invalid input to the host reporter and halt\n");
    }
    out.push_str(&format!(
        "if ({cs} != 0) {{ report_error(machine, {cs}, {byte}, {mem}, {p}); }}\n",
        cs = ctx.cs,
        byte = ctx.byte,
        mem = ctx.mem,
        p = ctx.p,
    ));
    out
}

/// Execution code: the scan loop itself, dispatched to the configured
/// generator backend.
pub fn generate_exec_code(
    ctx: &CodeGenContext,
    machine: &Machine,
    actions: &ActionMap,
) -> Result<String, CodeGenError> {
    validate_actions(&machine.dfa, actions)?;
    if ctx.generator == Generator::Goto && ctx.getbyte.is_some() {
        return Err(CodeGenError::CustomAccessorWithGoto);
    }
    let program = match ctx.generator {
        Generator::Table => {
            if machine.dfa.has_preconditions() {
                return Err(CodeGenError::PreconditionsWithTableGenerator);
            }
            table::generate(ctx, &machine.dfa, actions)?
        }
        Generator::Goto => goto::generate(ctx, &machine.dfa, actions)?,
    };
    Ok(render::render_program(&program))
}

/// Full emitted unit: init + exec + error code, in source order.
pub fn generate_code(
    ctx: &CodeGenContext,
    machine: &Machine,
    actions: &ActionMap,
) -> Result<String, CodeGenError> {
    let mut out = generate_init_code(ctx);
    out.push_str(&generate_exec_code(ctx, machine, actions)?);
    out.push_str(&generate_input_error_code(ctx));
    Ok(out)
}

/// Emits a whole, self-contained validator function for `pattern`: no host
/// action map is involved, since the only observable outcomes are `none`
/// (full match), `0` (unexpected EOF in a non-accept state), or the
/// 1-based position of the first invalid byte.
///
/// Convenience wrapper around [`generate_buffer_validator`] for callers
/// with a plain pattern string rather than an already-built [`Regex`] —
/// the string grammar can't express `isec`/`diff`/`neg`/`precond`, so a
/// caller needing those still has to go through `generate_buffer_validator`
/// directly.
pub fn generate_buffer_validator_from_pattern(
    name: &str,
    pattern: &str,
    goto: bool,
) -> Result<String, crate::error::Error> {
    generate_buffer_validator(name, parse(pattern)?, goto)
}

/// Emits a whole, self-contained validator function for `regex`: no host
/// action map is involved, since the only observable outcomes are `none`
/// (full match), `0` (unexpected EOF in a non-accept state), or the
/// 1-based position of the first invalid byte. Takes a [`Regex`] rather
/// than a pattern string, for symmetry with [`compile`] and so callers can
/// validate against patterns built with `isec`/`diff`/`neg`/`precond`,
/// which the string grammar can't express.
pub fn generate_buffer_validator(
    name: &str,
    regex: Regex,
    goto: bool,
) -> Result<String, crate::error::Error> {
    let machine = compile(regex)?;
    let mut ctx = CodeGenContext::default();
    ctx.generator = if goto { Generator::Goto } else { Generator::Table };
    if ctx.generator == Generator::Table && machine.dfa.has_preconditions() {
        return Err(CodeGenError::PreconditionsWithTableGenerator.into());
    }

    let body = if goto {
        goto::generate_validator_body(&ctx, &machine.dfa)
    } else {
        table::generate_validator_body(&ctx, &machine.dfa)?
    };

    let mut out = String::new();
    out.push_str(&format!("fn {name}({}: bytes) -> validator_result {{\n", ctx.data));
    out.push_str(&generate_init_code(&ctx));
    out.push_str(&render::render_program(&body));
    out.push_str("}\n");
    Ok(out)
}

/// Helper for both generators: rewrite an action's source text for a given
/// state/scope.
pub(crate) fn rewrite_action(
    code: &str,
    ctx: &CodeGenContext,
    state: usize,
    scope: MacroScope,
) -> Result<String, CodeGenError> {
    pseudomacro::rewrite(code, ctx, ctx.generator, state, scope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_produces_a_machine_with_states() {
        let m = compile_regex("ab+c").unwrap();
        assert!(!m.dfa.states.is_empty());
    }

    #[test]
    fn missing_action_is_rejected() {
        let m = compile_regex("a").unwrap();
        let re = crate::regex::Regex::byte(b'a').onfinal(vec![Symbol::from("A")]);
        let m2 = compile(re).unwrap();
        let _ = m;
        let ctx = CodeGenContext::default();
        let actions = ActionMap::new();
        let err = generate_exec_code(&ctx, &m2, &actions).unwrap_err();
        assert!(matches!(err, CodeGenError::MissingActions(_)));
    }

    #[test]
    fn extra_action_is_rejected() {
        let m = compile_regex("a").unwrap();
        let ctx = CodeGenContext::default();
        let mut actions = ActionMap::new();
        actions.insert(Symbol::from("Unused"), "noop();".to_string());
        let err = generate_exec_code(&ctx, &m, &actions).unwrap_err();
        assert!(matches!(err, CodeGenError::ExtraActions(_)));
    }

    #[test]
    fn table_generator_rejects_preconditions() {
        let re = crate::regex::precond(
            crate::regex::Regex::byte(b'a'),
            Symbol::from("guard"),
            crate::regex::PrecondWhen::All,
            crate::regex::Polarity::True,
        );
        let m = compile(re).unwrap();
        let ctx = CodeGenContext::default();
        let actions = ActionMap::new();
        let err = generate_exec_code(&ctx, &m, &actions).unwrap_err();
        assert_eq!(err, CodeGenError::PreconditionsWithTableGenerator);
    }

    #[test]
    fn validator_emits_a_named_function() {
        let src = generate_buffer_validator_from_pattern("validate_ab", "ab+", false).unwrap();
        assert!(src.contains("fn validate_ab("));
    }
}
