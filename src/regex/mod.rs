//! Annotated regex AST: the surface a caller builds by hand (via the
//! combinator constructors below) or gets back from [`parse`](parse::parse).
//!
//! Desugaring to the primitive `{set, cat, alt, rep, isec, diff}` algebra
//! happens in [`crate::desugar`]; this module only owns the tree shape and
//! the action/precondition annotations hung off each node.

pub mod parse;

use crate::byteset::ByteSet;
use std::collections::BTreeMap;
use std::rc::Rc;

pub type Symbol = Rc<str>;

/// The four points in a regex's lifetime an action can be pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Event {
    Enter,
    Exit,
    Final,
    All,
}

/// Which side of a named precondition a guard requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Polarity {
    True,
    False,
    Both,
}

/// A single-character class item: either one byte or an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassItem {
    Byte(u8),
    Range(u8, u8),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    pub actions: BTreeMap<Event, Vec<Symbol>>,
    pub precond_enter: Option<(Symbol, Polarity)>,
    pub precond_all: Option<(Symbol, Polarity)>,
}

impl Annotations {
    fn push_action(&mut self, event: Event, names: impl IntoIterator<Item = Symbol>) {
        self.actions.entry(event).or_default().extend(names);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegexKind {
    /// A single literal byte.
    Byte(u8),
    /// An inclusive byte range.
    Range(u8, u8),
    /// A single Unicode scalar value, matched as its UTF-8 encoding.
    Char(char),
    /// A literal UTF-8 string.
    Str(Rc<str>),
    /// A literal byte string.
    Bytes(Rc<[u8]>),
    /// An already-built byte set, matched as a single byte.
    Set(ByteSet),
    /// `[...]`: union of class items.
    Class(Rc<[ClassItem]>),
    /// `[^...]`: complement of the union of class items.
    CClass(Rc<[ClassItem]>),
    /// Concatenation of `children`, in order. Zero children is epsilon.
    Cat,
    /// Alternation (union) of `children`.
    Alt,
    /// Kleene star (zero or more) of the single child.
    Rep,
    /// One or more of the single child (`rep1(x) = cat(x, rep(x))`).
    Rep1,
    /// Zero or one of the single child (`opt(x) = alt(x, cat())`).
    Opt,
    /// Intersection of two children's languages.
    Isec,
    /// Difference (first minus second) of two children's languages.
    Diff,
    /// Complement of the single child's language (`neg(x) = diff(rep(.), x)`).
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Regex {
    pub kind: RegexKind,
    pub children: Vec<Regex>,
    pub annotations: Annotations,
}

impl Regex {
    fn leaf(kind: RegexKind) -> Self {
        Regex {
            kind,
            children: Vec::new(),
            annotations: Annotations::default(),
        }
    }

    fn node(kind: RegexKind, children: Vec<Regex>) -> Self {
        Regex {
            kind,
            children,
            annotations: Annotations::default(),
        }
    }

    pub fn byte(b: u8) -> Self {
        Self::leaf(RegexKind::Byte(b))
    }

    pub fn range(lo: u8, hi: u8) -> Self {
        Self::leaf(RegexKind::Range(lo, hi))
    }

    pub fn char(c: char) -> Self {
        Self::leaf(RegexKind::Char(c))
    }

    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Self::leaf(RegexKind::Str(s.into()))
    }

    pub fn bytes(bs: impl Into<Rc<[u8]>>) -> Self {
        Self::leaf(RegexKind::Bytes(bs.into()))
    }

    pub fn set(set: ByteSet) -> Self {
        Self::leaf(RegexKind::Set(set))
    }

    /// Matches any single byte (`.`).
    pub fn any() -> Self {
        Self::set(ByteSet::full())
    }

    pub fn class(items: impl Into<Rc<[ClassItem]>>) -> Self {
        Self::leaf(RegexKind::Class(items.into()))
    }

    pub fn cclass(items: impl Into<Rc<[ClassItem]>>) -> Self {
        Self::leaf(RegexKind::CClass(items.into()))
    }

    /// Epsilon: matches only the empty string.
    pub fn epsilon() -> Self {
        Self::node(RegexKind::Cat, Vec::new())
    }

    pub fn cat(parts: impl IntoIterator<Item = Regex>) -> Self {
        Self::node(RegexKind::Cat, parts.into_iter().collect())
    }

    pub fn alt(parts: impl IntoIterator<Item = Regex>) -> Self {
        Self::node(RegexKind::Alt, parts.into_iter().collect())
    }

    pub fn rep(self) -> Self {
        Self::node(RegexKind::Rep, vec![self])
    }

    pub fn rep1(self) -> Self {
        Self::node(RegexKind::Rep1, vec![self])
    }

    pub fn opt(self) -> Self {
        Self::node(RegexKind::Opt, vec![self])
    }

    pub fn isec(self, other: Regex) -> Self {
        Self::node(RegexKind::Isec, vec![self, other])
    }

    pub fn diff(self, other: Regex) -> Self {
        Self::node(RegexKind::Diff, vec![self, other])
    }

    pub fn neg(self) -> Self {
        Self::node(RegexKind::Neg, vec![self])
    }

    pub fn onenter(mut self, actions: impl IntoIterator<Item = Symbol>) -> Self {
        self.annotations.push_action(Event::Enter, actions);
        self
    }

    pub fn onexit(mut self, actions: impl IntoIterator<Item = Symbol>) -> Self {
        self.annotations.push_action(Event::Exit, actions);
        self
    }

    pub fn onfinal(mut self, actions: impl IntoIterator<Item = Symbol>) -> Self {
        self.annotations.push_action(Event::Final, actions);
        self
    }

    pub fn onall(mut self, actions: impl IntoIterator<Item = Symbol>) -> Self {
        self.annotations.push_action(Event::All, actions);
        self
    }

    pub fn precond_enter(mut self, name: Symbol, polarity: Polarity) -> Self {
        self.annotations.precond_enter = Some((name, polarity));
        self
    }

    pub fn precond_all(mut self, name: Symbol, polarity: Polarity) -> Self {
        self.annotations.precond_all = Some((name, polarity));
        self
    }
}

/// `onenter(re, actions)` — free-function form matching the external API.
pub fn onenter(re: Regex, actions: impl IntoIterator<Item = Symbol>) -> Regex {
    re.onenter(actions)
}

pub fn onexit(re: Regex, actions: impl IntoIterator<Item = Symbol>) -> Regex {
    re.onexit(actions)
}

pub fn onfinal(re: Regex, actions: impl IntoIterator<Item = Symbol>) -> Regex {
    re.onfinal(actions)
}

pub fn onall(re: Regex, actions: impl IntoIterator<Item = Symbol>) -> Regex {
    re.onall(actions)
}

/// Which set of transitions a [`precond`] call guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecondWhen {
    /// Only `re`'s entry edges.
    Enter,
    /// Every transition within `re`.
    All,
}

/// `precond(re, name, when, polarity)` — guards `re`'s entry edges
/// (`when == Enter`) or every transition within `re` (`when == All`).
pub fn precond(re: Regex, name: Symbol, when: PrecondWhen, polarity: Polarity) -> Regex {
    match when {
        PrecondWhen::Enter => re.precond_enter(name, polarity),
        PrecondWhen::All => re.precond_all(name, polarity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotations_are_in_place() {
        let re = Regex::str("ab").onenter(vec![Symbol::from("A")]);
        assert_eq!(
            re.annotations.actions.get(&Event::Enter),
            Some(&vec![Symbol::from("A")])
        );
    }

    #[test]
    fn multiple_calls_accumulate_in_order() {
        let re = Regex::byte(b'x')
            .onenter(vec![Symbol::from("A")])
            .onenter(vec![Symbol::from("B")]);
        assert_eq!(
            re.annotations.actions.get(&Event::Enter),
            Some(&vec![Symbol::from("A"), Symbol::from("B")])
        );
    }
}
