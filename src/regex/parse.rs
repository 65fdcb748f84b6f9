//! Recursive-descent string parser for the regex surface syntax.
//!
//! Grammar, lowest to highest precedence:
//! `alternation := sequence ('|' sequence)*`
//! `sequence := postfix+`
//! `postfix := atom ('*' | '+' | '?')?`
//! `atom := '(' alternation ')' | class | cclass | '.' | escape | byte`
//!
//! Built with `nom` combinators in the same recursive-descent style as the
//! rest of this crate's parsing (see [`crate::regex::parse`]'s siblings).

use crate::regex::{ClassItem, Regex};
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{char as nchar, none_of, one_of};
use nom::combinator::{all_consuming, cut, map, opt, value, verify};
use nom::error::{context, ContextError, ParseError};
use nom::multi::{many1, separated_list1};
use nom::sequence::{delimited, pair, preceded};
use nom::Finish;
use nom::IResult;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum RegexParseError {
    #[error("unbalanced parentheses in pattern")]
    UnbalancedParens,
    #[error("unclosed character class")]
    UnclosedClass,
    #[error("empty character class")]
    EmptyClass,
    #[error("pattern ends with a trailing operator")]
    TrailingOperator,
    #[error("invalid escape sequence: \\{0}")]
    BadEscape(char),
    #[error("unicode escapes (\\u, \\U) are not supported; this is a byte-level regex")]
    UnicodeEscapeUnsupported,
    #[error("could not parse pattern: {0}")]
    Malformed(String),
    #[error("trailing input after pattern: {0}")]
    TrailingInput(String),
}

type PResult<'a, O> = IResult<&'a str, O, ErrCtx<'a>>;

/// Lightweight nom error carrier; converted to [`RegexParseError`] at the
/// top-level [`parse`] entry point rather than threaded through every
/// combinator.
#[derive(Debug)]
struct ErrCtx<'a> {
    inner: nom::error::Error<&'a str>,
}

impl<'a> ParseError<&'a str> for ErrCtx<'a> {
    fn from_error_kind(input: &'a str, kind: nom::error::ErrorKind) -> Self {
        ErrCtx {
            inner: nom::error::Error::from_error_kind(input, kind),
        }
    }
    fn append(input: &'a str, kind: nom::error::ErrorKind, other: Self) -> Self {
        ErrCtx {
            inner: nom::error::Error::append(input, kind, other.inner),
        }
    }
}

impl<'a> ContextError<&'a str> for ErrCtx<'a> {}

#[tracing::instrument(level = "debug", skip(input), fields(len = input.len()))]
pub fn parse(input: &str) -> Result<Regex, RegexParseError> {
    match all_consuming(alternation)(input).finish() {
        Ok((_, re)) => {
            tracing::trace!("parsed pattern into regex tree");
            Ok(re)
        }
        Err(e) => {
            let err = classify_error(input, format!("{:?}", e.inner));
            tracing::debug!(%err, "pattern failed to parse");
            Err(err)
        }
    }
}

/// `nom`'s combinator errors don't preserve which specific grammar rule
/// failed once generalized through [`ErrCtx`]; re-scan the whole pattern
/// for the handful of malformed-input shapes spec.md names explicitly so
/// callers get a diagnosis more useful than "could not parse".
fn classify_error(input: &str, raw: String) -> RegexParseError {
    let mut depth = 0i32;
    for c in input.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return RegexParseError::UnbalancedParens;
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return RegexParseError::UnbalancedParens;
    }

    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            continue;
        }
        match chars.next() {
            Some('u') | Some('U') => return RegexParseError::UnicodeEscapeUnsupported,
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                if hex.len() != 2 || u8::from_str_radix(&hex, 16).is_err() {
                    return RegexParseError::BadEscape('x');
                }
            }
            Some(e) if "abtnvfr0.*+?()[]|\\-^".contains(e) => {}
            Some(e) => return RegexParseError::BadEscape(e),
            None => return RegexParseError::BadEscape('\0'),
        }
    }

    if let Some(start) = input.find('[') {
        let rest = &input[start..];
        let body_start = if rest.starts_with("[^") { 2 } else { 1 };
        match rest[body_start..].find(']') {
            None => return RegexParseError::UnclosedClass,
            Some(0) => return RegexParseError::EmptyClass,
            _ => {}
        }
    }

    if let Some(last) = input.chars().last() {
        if matches!(last, '*' | '+' | '?' | '|') {
            return RegexParseError::TrailingOperator;
        }
    }

    RegexParseError::Malformed(raw)
}

fn is_reserved(c: char) -> bool {
    matches!(c, '(' | ')' | '[' | ']' | '|' | '*' | '+' | '?' | '.' | '\\')
}

fn alternation(input: &str) -> PResult<Regex> {
    map(separated_list1(nchar('|'), sequence), |mut parts| {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Regex::alt(parts)
        }
    })(input)
}

fn sequence(input: &str) -> PResult<Regex> {
    map(many1(postfix), |mut parts| {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Regex::cat(parts)
        }
    })(input)
}

fn postfix(input: &str) -> PResult<Regex> {
    let (input, a) = atom(input)?;
    let (input, op) = opt(one_of("*+?"))(input)?;
    let re = match op {
        Some('*') => a.rep(),
        Some('+') => a.rep1(),
        Some('?') => a.opt(),
        _ => a,
    };
    Ok((input, re))
}

fn atom(input: &str) -> PResult<Regex> {
    context(
        "atom",
        alt((group, cclass, class, dot, escape_atom, plain_byte)),
    )(input)
}

fn group(input: &str) -> PResult<Regex> {
    delimited(nchar('('), cut(alternation), cut(nchar(')')))(input)
}

fn dot(input: &str) -> PResult<Regex> {
    value(Regex::any(), nchar('.'))(input)
}

fn plain_byte(input: &str) -> PResult<Regex> {
    map(verify(none_of(""), |&c| !is_reserved(c)), Regex::char)(input)
}

fn escape_atom(input: &str) -> PResult<Regex> {
    map(escape_char, Regex::byte)(input)
}

/// Parses one escape sequence (after the leading `\`) and returns the
/// decoded value as a raw byte, not a UTF-8 scalar — `\xHH` especially
/// must match exactly the one byte it names (0x80..=0xFF included),
/// never the multi-byte UTF-8 encoding of that codepoint.
fn escape_char(input: &str) -> PResult<u8> {
    let (input, _) = nchar('\\')(input)?;
    let (input, c) = cut(none_of(""))(input)?;
    match c {
        'a' => Ok((input, 0x07)),
        'b' => Ok((input, 0x08)),
        't' => Ok((input, b'\t')),
        'n' => Ok((input, b'\n')),
        'v' => Ok((input, 0x0B)),
        'f' => Ok((input, 0x0C)),
        'r' => Ok((input, b'\r')),
        '0' => Ok((input, 0)),
        'x' => {
            let (input, hex) = cut(nom::bytes::complete::take(2usize))(input)?;
            let byte = u8::from_str_radix(hex, 16).map_err(|_| {
                nom::Err::Failure(ErrCtx {
                    inner: nom::error::Error::from_error_kind(
                        input,
                        nom::error::ErrorKind::HexDigit,
                    ),
                })
            })?;
            Ok((input, byte))
        }
        c if is_reserved(c) => Ok((input, c as u8)),
        '-' | '^' => Ok((input, c as u8)),
        _ => Err(nom::Err::Failure(ErrCtx {
            inner: nom::error::Error::from_error_kind(input, nom::error::ErrorKind::Char),
        })),
    }
}

fn class_item(input: &str) -> PResult<ClassItem> {
    let (input, lo) = class_char(input)?;
    let (input, hi) = opt(preceded(nchar('-'), class_char))(input)?;
    match hi {
        Some(hi) => Ok((input, ClassItem::Range(lo, hi))),
        None => Ok((input, ClassItem::Byte(lo))),
    }
}

fn class_char(input: &str) -> PResult<u8> {
    alt((
        escape_char,
        map(
            verify(none_of(""), |&c| c != ']' && c != '-' && c.is_ascii()),
            |c| c as u8,
        ),
    ))(input)
}

fn class(input: &str) -> PResult<Regex> {
    map(
        delimited(
            pair(nchar('['), verify(opt(nchar('^')), |o| o.is_none())),
            cut(many1(class_item)),
            cut(nchar(']')),
        ),
        |items| Regex::class(items),
    )(input)
}

fn cclass(input: &str) -> PResult<Regex> {
    map(
        delimited(tag("[^"), cut(many1(class_item)), cut(nchar(']'))),
        |items| Regex::cclass(items),
    )(input)
}
