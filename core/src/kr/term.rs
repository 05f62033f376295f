//! First-order terms used by actions, conditions and the reference mental state.

use super::Substitution;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A first-order term.
///
/// Variables start with an uppercase letter or `_`; everything else is an atom,
/// an integer, a quoted string or a compound `functor(arg, ...)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Term {
    Var(String),
    Atom(String),
    Int(i64),
    Str(String),
    Compound { functor: String, args: Vec<Term> },
}

impl Term {
    pub fn var(name: &str) -> Self {
        Term::Var(name.to_string())
    }

    pub fn atom(name: &str) -> Self {
        Term::Atom(name.to_string())
    }

    /// Build a compound; a compound without arguments collapses to an atom.
    pub fn compound(functor: &str, args: Vec<Term>) -> Self {
        if args.is_empty() {
            Term::Atom(functor.to_string())
        } else {
            Term::Compound {
                functor: functor.to_string(),
                args,
            }
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }

    /// Name and arity, for atoms and compounds.
    pub fn signature(&self) -> Option<(&str, usize)> {
        match self {
            Term::Atom(name) => Some((name, 0)),
            Term::Compound { functor, args } => Some((functor, args.len())),
            _ => None,
        }
    }

    pub fn args(&self) -> &[Term] {
        match self {
            Term::Compound { args, .. } => args,
            _ => &[],
        }
    }

    pub fn is_ground(&self) -> bool {
        match self {
            Term::Var(_) => false,
            Term::Compound { args, .. } => args.iter().all(Term::is_ground),
            _ => true,
        }
    }

    /// Free variables in order of first occurrence.
    pub fn free_vars(&self) -> Vec<String> {
        let mut vars = Vec::new();
        self.collect_vars(&mut vars);
        vars
    }

    pub(crate) fn collect_vars(&self, out: &mut Vec<String>) {
        match self {
            Term::Var(name) => {
                if !out.iter().any(|v| v == name) {
                    out.push(name.clone());
                }
            }
            Term::Compound { args, .. } => {
                for arg in args {
                    arg.collect_vars(out);
                }
            }
            _ => {}
        }
    }

    pub fn contains_var(&self, name: &str) -> bool {
        match self {
            Term::Var(v) => v == name,
            Term::Compound { args, .. } => args.iter().any(|a| a.contains_var(name)),
            _ => false,
        }
    }

    /// Apply a substitution, resolving chains of bindings.
    pub fn apply(&self, subst: &Substitution) -> Term {
        match self {
            Term::Var(name) => match subst.get(name) {
                Some(bound) if bound != self => bound.apply(subst),
                _ => self.clone(),
            },
            Term::Compound { functor, args } => Term::Compound {
                functor: functor.clone(),
                args: args.iter().map(|a| a.apply(subst)).collect(),
            },
            _ => self.clone(),
        }
    }
}

fn is_bare_atom(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub(crate) fn escape_quoted(text: &str, quote: char) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

fn write_functor(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if is_bare_atom(name) {
        write!(f, "{}", name)
    } else {
        write!(f, "'{}'", escape_quoted(name, '\''))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(name) => write!(f, "{}", name),
            Term::Atom(name) => write_functor(f, name),
            Term::Int(n) => write!(f, "{}", n),
            Term::Str(s) => write!(f, "\"{}\"", escape_quoted(s, '"')),
            Term::Compound { functor, args } => {
                write_functor(f, functor)?;
                write!(f, "(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(args: Vec<Term>) -> Term {
        Term::compound("p", args)
    }

    #[test]
    fn test_free_vars_in_first_occurrence_order() {
        let t = p(vec![Term::var("Y"), Term::compound("q", vec![Term::var("X"), Term::var("Y")])]);
        assert_eq!(t.free_vars(), vec!["Y".to_string(), "X".to_string()]);
        assert!(!t.is_ground());
    }

    #[test]
    fn test_compound_without_args_is_atom() {
        assert_eq!(Term::compound("done", vec![]), Term::atom("done"));
        assert_eq!(Term::atom("done").signature(), Some(("done", 0)));
    }

    #[test]
    fn test_display_quotes_non_identifier_atoms() {
        let t = p(vec![Term::atom("Hello world"), Term::Int(-3), Term::Str("a\"b".into())]);
        assert_eq!(t.to_string(), "p('Hello world', -3, \"a\\\"b\")");
    }

    #[test]
    fn test_apply_resolves_chains() {
        let mut s = Substitution::new();
        s.bind("X", Term::var("Y"));
        s.bind("Y", Term::Int(1));
        assert_eq!(p(vec![Term::var("X")]).apply(&s), p(vec![Term::Int(1)]));
    }
}
