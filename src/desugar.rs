//! Bottom-up rewrite from the full annotated regex surface to the
//! primitive algebra the NFA builder consumes: `{set, cat, alt, rep, isec,
//! diff}`. Annotations on a rewritten node survive on the new root that
//! replaces it; nodes introduced purely by the rewrite (e.g. the `cat`
//! wrapper `rep1` expands into) start with no annotations of their own.

use crate::regex::{Annotations, ClassItem, Regex, RegexKind};

pub fn desugar(re: Regex) -> Regex {
    let Regex {
        kind,
        children,
        annotations,
    } = re;
    let children: Vec<Regex> = children.into_iter().map(desugar).collect();

    let mut rewritten = match kind {
        RegexKind::Set(_) | RegexKind::Cat | RegexKind::Alt | RegexKind::Rep | RegexKind::Isec
        | RegexKind::Diff => Regex {
            kind,
            children,
            annotations: Annotations::default(),
        },
        RegexKind::Byte(b) => Regex::set(crate::byteset::ByteSet::from_byte(b)),
        RegexKind::Range(lo, hi) => Regex::set(crate::byteset::ByteSet::from_range(lo, hi)),
        RegexKind::Class(items) => Regex::set(class_set(&items)),
        RegexKind::CClass(items) => Regex::set(class_set(&items).complement()),
        RegexKind::Char(c) => {
            let mut buf = [0u8; 4];
            let bytes = c.encode_utf8(&mut buf).as_bytes();
            byte_cat(bytes)
        }
        RegexKind::Str(s) => byte_cat(s.as_bytes()),
        RegexKind::Bytes(bs) => byte_cat(&bs),
        RegexKind::Rep1 => {
            let x = children.into_iter().next().expect("rep1 has one child");
            Regex::cat(vec![x.clone(), x.rep()])
        }
        RegexKind::Opt => {
            let x = children.into_iter().next().expect("opt has one child");
            Regex::alt(vec![x, Regex::epsilon()])
        }
        RegexKind::Neg => {
            let x = children.into_iter().next().expect("neg has one child");
            Regex::any().rep().diff(x)
        }
    };
    rewritten.annotations = annotations;
    rewritten
}

fn class_set(items: &[ClassItem]) -> crate::byteset::ByteSet {
    let mut set = crate::byteset::ByteSet::empty();
    for item in items {
        set = set.union(&match *item {
            ClassItem::Byte(b) => crate::byteset::ByteSet::from_byte(b),
            ClassItem::Range(lo, hi) => crate::byteset::ByteSet::from_range(lo, hi),
        });
    }
    set
}

fn byte_cat(bytes: &[u8]) -> Regex {
    let parts: Vec<Regex> = bytes
        .iter()
        .map(|&b| Regex::set(crate::byteset::ByteSet::from_byte(b)))
        .collect();
    Regex::cat(parts)
}
