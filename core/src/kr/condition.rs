//! Mental-state conditions (preconditions, queries) and updates (postconditions).

use super::{parse_terms, Substitution, Term};
use crate::errors::{ParseError, ParseResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which base a mental literal consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LiteralKind {
    /// `bel(φ)`: φ follows from the beliefs.
    Bel,
    /// `goal(φ)`: φ is a goal.
    Goal,
    /// `a-goal(φ)`: φ is a goal that is not yet believed.
    AGoal,
    /// `goal-a(φ)`: φ is a goal that is already believed.
    GoalA,
    /// `percept(φ)`: φ was perceived this cycle.
    Percept,
}

impl LiteralKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            LiteralKind::Bel => "bel",
            LiteralKind::Goal => "goal",
            LiteralKind::AGoal => "a-goal",
            LiteralKind::GoalA => "goal-a",
            LiteralKind::Percept => "percept",
        }
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "bel" => Some(LiteralKind::Bel),
            "goal" => Some(LiteralKind::Goal),
            "a-goal" => Some(LiteralKind::AGoal),
            "goal-a" => Some(LiteralKind::GoalA),
            "percept" => Some(LiteralKind::Percept),
            _ => None,
        }
    }
}

/// One conjunct of a mental-state condition, possibly negated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentalLiteral {
    pub kind: LiteralKind,
    pub positive: bool,
    pub formula: Term,
}

impl MentalLiteral {
    pub fn new(kind: LiteralKind, formula: Term) -> Self {
        Self {
            kind,
            positive: true,
            formula,
        }
    }

    pub fn negated(mut self) -> Self {
        self.positive = !self.positive;
        self
    }

    /// Read `bel(φ)`, `not(goal(φ))`, ...
    pub fn from_term(term: &Term) -> ParseResult<Self> {
        if let Some(("not", 1)) = term.signature() {
            return Self::from_term(&term.args()[0]).map(Self::negated);
        }
        match term.signature() {
            Some((keyword, 1)) => LiteralKind::from_keyword(keyword)
                .map(|kind| Self::new(kind, term.args()[0].clone()))
                .ok_or_else(|| invalid("mental literal", term)),
            _ => Err(invalid("mental literal", term)),
        }
    }

    pub fn apply(&self, subst: &Substitution) -> Self {
        Self {
            kind: self.kind,
            positive: self.positive,
            formula: self.formula.apply(subst),
        }
    }
}

impl fmt::Display for MentalLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.positive {
            write!(f, "{}({})", self.kind.keyword(), self.formula)
        } else {
            write!(f, "not({}({}))", self.kind.keyword(), self.formula)
        }
    }
}

/// A conjunction of mental literals; the empty conjunction is `true`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentalStateCondition {
    pub literals: Vec<MentalLiteral>,
}

impl MentalStateCondition {
    pub fn always_true() -> Self {
        Self::default()
    }

    pub fn new(literals: Vec<MentalLiteral>) -> Self {
        Self { literals }
    }

    pub fn is_true(&self) -> bool {
        self.literals.is_empty()
    }

    pub fn parse(text: &str) -> ParseResult<Self> {
        let terms = parse_terms(text)?;
        if let [Term::Atom(a)] = terms.as_slice() {
            if a == "true" {
                return Ok(Self::always_true());
            }
        }
        let literals = terms
            .iter()
            .map(MentalLiteral::from_term)
            .collect::<ParseResult<Vec<_>>>()?;
        Ok(Self { literals })
    }

    pub fn free_vars(&self) -> Vec<String> {
        let mut vars = Vec::new();
        for literal in &self.literals {
            literal.formula.collect_vars(&mut vars);
        }
        vars
    }

    pub fn apply(&self, subst: &Substitution) -> Self {
        Self {
            literals: self.literals.iter().map(|l| l.apply(subst)).collect(),
        }
    }
}

impl fmt::Display for MentalStateCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.literals.is_empty() {
            return write!(f, "true");
        }
        for (i, literal) in self.literals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", literal)?;
        }
        Ok(())
    }
}

/// An update: terms to add and terms to remove.
///
/// Written as a conjunction where `not(φ)` marks a removal, so `insert(p, not(q))`
/// adds `p` and removes `q`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub add: Vec<Term>,
    pub remove: Vec<Term>,
}

impl Update {
    pub fn from_terms(terms: &[Term]) -> Self {
        let mut update = Update::default();
        for term in terms {
            match term.signature() {
                Some(("not", 1)) => update.remove.push(term.args()[0].clone()),
                _ => update.add.push(term.clone()),
            }
        }
        update
    }

    pub fn parse(text: &str) -> ParseResult<Self> {
        Ok(Self::from_terms(&parse_terms(text)?))
    }

    /// Swap additions and removals, as `delete(φ)` does.
    pub fn inverted(&self) -> Self {
        Self {
            add: self.remove.clone(),
            remove: self.add.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    pub fn apply(&self, subst: &Substitution) -> Self {
        Self {
            add: self.add.iter().map(|t| t.apply(subst)).collect(),
            remove: self.remove.iter().map(|t| t.apply(subst)).collect(),
        }
    }

    pub fn free_vars(&self) -> Vec<String> {
        let mut vars = Vec::new();
        for term in self.add.iter().chain(&self.remove) {
            term.collect_vars(&mut vars);
        }
        vars
    }

    pub fn to_terms(&self) -> Vec<Term> {
        self.add
            .iter()
            .cloned()
            .chain(self.remove.iter().map(|t| Term::compound("not", vec![t.clone()])))
            .collect()
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms = self.to_terms();
        if terms.is_empty() {
            return write!(f, "true");
        }
        for (i, t) in terms.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", t)?;
        }
        Ok(())
    }
}

fn invalid(what: &str, term: &Term) -> ParseError {
    ParseError::Invalid {
        what: what.to_string(),
        term: term.to_string(),
    }
}
