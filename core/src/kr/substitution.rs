//! Substitutions and syntactic unification.

use super::Term;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A finite partial map from variable names to terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    bindings: BTreeMap<String, Term>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(var: &str, term: Term) -> Self {
        let mut s = Self::new();
        s.bind(var, term);
        s
    }

    pub fn bind(&mut self, var: &str, term: Term) {
        self.bindings.insert(var.to_string(), term);
    }

    pub fn get(&self, var: &str) -> Option<&Term> {
        self.bindings.get(var)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Term)> {
        self.bindings.iter()
    }

    pub fn domain(&self) -> Vec<String> {
        self.bindings.keys().cloned().collect()
    }

    /// Merge two substitutions; `None` when they disagree on a shared variable.
    pub fn combine(&self, other: &Substitution) -> Option<Substitution> {
        let mut combined = self.clone();
        for (var, term) in &other.bindings {
            match combined.bindings.get(var) {
                Some(existing) if existing.apply(self) != term.apply(other) => return None,
                Some(_) => {}
                None => {
                    combined.bindings.insert(var.clone(), term.clone());
                }
            }
        }
        combined.normalize();
        Some(combined)
    }

    /// Keep only bindings for the given variables.
    pub fn restrict(&self, vars: &[String]) -> Substitution {
        Substitution {
            bindings: self
                .bindings
                .iter()
                .filter(|(k, _)| vars.contains(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Resolve every binding fully so that applying once is enough.
    fn normalize(&mut self) {
        let snapshot = self.clone();
        for term in self.bindings.values_mut() {
            *term = term.apply(&snapshot);
        }
        self.bindings.retain(|k, v| !matches!(v, Term::Var(name) if name == k));
    }
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (var, term)) in self.bindings.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}/{}", var, term)?;
        }
        write!(f, "]")
    }
}

/// Most general unifier of two terms, `None` if they do not unify.
pub fn unify(left: &Term, right: &Term) -> Option<Substitution> {
    let mut subst = Substitution::new();
    if unify_into(left, right, &mut subst) {
        subst.normalize();
        Some(subst)
    } else {
        None
    }
}

/// Unify under an existing substitution, extending it in place.
pub(crate) fn unify_into(left: &Term, right: &Term, subst: &mut Substitution) -> bool {
    let left = left.apply(subst);
    let right = right.apply(subst);
    match (&left, &right) {
        (l, r) if l == r => true,
        (Term::Var(name), other) | (other, Term::Var(name)) => {
            // Occurs check
            if other.contains_var(name) {
                return false;
            }
            subst.bind(name, other.clone());
            true
        }
        (
            Term::Compound { functor: f1, args: a1 },
            Term::Compound { functor: f2, args: a2 },
        ) => {
            if f1 != f2 || a1.len() != a2.len() {
                return false;
            }
            a1.iter().zip(a2.iter()).all(|(l, r)| unify_into(l, r, subst))
        }
        _ => false,
    }
}

/// Unify pairwise, short-circuiting on the first failing pair.
pub fn unify_all(left: &[Term], right: &[Term]) -> Option<Substitution> {
    if left.len() != right.len() {
        return None;
    }
    let mut subst = Substitution::new();
    for (l, r) in left.iter().zip(right) {
        if !unify_into(l, r, &mut subst) {
            return None;
        }
    }
    subst.normalize();
    Some(subst)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(args: Vec<Term>) -> Term {
        Term::compound("p", args)
    }

    #[test]
    fn test_unify_binds_variables_both_ways() {
        let s = unify(&p(vec![Term::var("X"), Term::Int(2)]), &p(vec![Term::Int(1), Term::var("Y")]))
            .unwrap();
        assert_eq!(s.get("X"), Some(&Term::Int(1)));
        assert_eq!(s.get("Y"), Some(&Term::Int(2)));
    }

    #[test]
    fn test_unify_fails_on_functor_clash() {
        assert!(unify(&p(vec![Term::Int(1)]), &Term::compound("q", vec![Term::Int(1)])).is_none());
        assert!(unify(&p(vec![Term::Int(1)]), &p(vec![Term::Int(2)])).is_none());
    }

    #[test]
    fn test_occurs_check() {
        let x = Term::var("X");
        assert!(unify(&x, &p(vec![x.clone()])).is_none());
    }

    #[test]
    fn test_unify_result_is_idempotent() {
        let s = unify(
            &p(vec![Term::var("X"), Term::var("Y")]),
            &p(vec![Term::var("Y"), Term::atom("a")]),
        )
        .unwrap();
        assert_eq!(Term::var("X").apply(&s), Term::atom("a"));
        assert_eq!(s.get("Y"), Some(&Term::atom("a")));
    }

    #[test]
    fn test_combine_agreeing_and_disagreeing() {
        let a = Substitution::singleton("X", Term::Int(1));
        let b = Substitution::singleton("Y", Term::Int(2));
        let c = Substitution::singleton("X", Term::Int(3));

        let ab = a.combine(&b).unwrap();
        assert_eq!(ab.len(), 2);
        assert!(a.combine(&c).is_none());
        assert_eq!(a.combine(&a), Some(a.clone()));
    }

    #[test]
    fn test_display() {
        let mut s = Substitution::new();
        s.bind("X", Term::Int(1));
        s.bind("Y", Term::atom("a"));
        assert_eq!(s.to_string(), "[X/1, Y/a]");
        assert_eq!(Substitution::new().to_string(), "[]");
    }

    #[test]
    fn test_restrict() {
        let mut s = Substitution::new();
        s.bind("X", Term::Int(1));
        s.bind("Y", Term::Int(2));
        let r = s.restrict(&["Y".to_string()]);
        assert_eq!(r.domain(), vec!["Y".to_string()]);
    }
}
