//! Mental-state boundary and its in-memory implementation.
//!
//! Beliefs, goals, percepts and mails are ordered sets of ground terms. Queries
//! are answered by matching literals against the bases left to right, with
//! negation as failure for negated literals.

use crate::errors::{MentalStateError, MentalStateResult};
use crate::kr::{unify, LiteralKind, MentalLiteral, MentalStateCondition, Substitution, Term, Update};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Base {
    Beliefs,
    Goals,
    Percepts,
    Mails,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    Added,
    Removed,
    /// A goal removed because it came to be believed
    Achieved,
}

/// One change to one base, reported to the debugger after an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub base: Base,
    pub change: Change,
    pub term: Term,
}

impl Delta {
    fn new(base: Base, change: Change, term: Term) -> Self {
        Self { base, change, term }
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:?} {}", self.base, self.change, self.term)
    }
}

/// Serializable view of all bases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MentalStateSnapshot {
    pub beliefs: Vec<String>,
    pub goals: Vec<String>,
    pub percepts: Vec<String>,
    pub mails: Vec<String>,
}

/// What the execution pipeline needs from an agent's mental state.
///
/// Updates return the deltas they caused; callers report them to the debugger.
pub trait MentalState: Send {
    /// All answers of `condition`, restricted to its free variables.
    fn query(&self, condition: &MentalStateCondition) -> MentalStateResult<Vec<Substitution>>;

    fn insert(&mut self, update: &Update) -> MentalStateResult<Vec<Delta>>;

    fn delete(&mut self, update: &Update) -> MentalStateResult<Vec<Delta>> {
        self.insert(&update.inverted())
    }

    fn adopt(&mut self, goal: &Term) -> MentalStateResult<Vec<Delta>>;

    /// Drop every goal that unifies with `goal`.
    fn drop_goal(&mut self, goal: &Term) -> MentalStateResult<Vec<Delta>>;

    /// Remove goals that are now believed and report them as achieved.
    fn update_goal_state(&mut self) -> Vec<Delta>;

    /// Replace the percept base with this cycle's percepts.
    fn set_percepts(&mut self, percepts: Vec<Term>) -> MentalStateResult<Vec<Delta>>;

    fn add_mail(&mut self, mail: Term) -> MentalStateResult<Vec<Delta>>;

    fn snapshot(&self) -> MentalStateSnapshot;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryMentalState {
    beliefs: Vec<Term>,
    goals: Vec<Term>,
    percepts: Vec<Term>,
    mails: Vec<Term>,
}

impl InMemoryMentalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial state; every term must be ground.
    pub fn with_contents(beliefs: Vec<Term>, goals: Vec<Term>) -> MentalStateResult<Self> {
        let mut state = Self::new();
        for belief in beliefs {
            ensure_ground(&belief)?;
            push_unique(&mut state.beliefs, belief);
        }
        for goal in goals {
            ensure_ground(&goal)?;
            push_unique(&mut state.goals, goal);
        }
        Ok(state)
    }

    pub fn beliefs(&self) -> &[Term] {
        &self.beliefs
    }

    pub fn goals(&self) -> &[Term] {
        &self.goals
    }

    pub fn percepts(&self) -> &[Term] {
        &self.percepts
    }

    pub fn mails(&self) -> &[Term] {
        &self.mails
    }

    pub fn believes(&self, term: &Term) -> bool {
        self.beliefs.iter().any(|b| unify(term, b).is_some())
    }

    fn matches(&self, kind: LiteralKind, formula: &Term) -> Vec<Substitution> {
        match kind {
            LiteralKind::Bel => match_in(&self.beliefs, formula),
            LiteralKind::Percept => match_in(&self.percepts, formula),
            LiteralKind::Goal => match_in(&self.goals, formula),
            LiteralKind::AGoal => match_in(&self.goals, formula)
                .into_iter()
                .filter(|s| !self.believes(&formula.apply(s)))
                .collect(),
            LiteralKind::GoalA => match_in(&self.goals, formula)
                .into_iter()
                .filter(|s| self.believes(&formula.apply(s)))
                .collect(),
        }
    }

    fn solve(
        &self,
        literals: &[MentalLiteral],
        subst: Substitution,
        out: &mut Vec<Substitution>,
    ) -> MentalStateResult<()> {
        let Some((first, rest)) = literals.split_first() else {
            out.push(subst);
            return Ok(());
        };
        let formula = first.formula.apply(&subst);
        if formula.is_var() {
            return Err(MentalStateError::Unbound(first.to_string()));
        }
        let matches = self.matches(first.kind, &formula);
        if first.positive {
            for m in matches {
                if let Some(combined) = subst.combine(&m) {
                    self.solve(rest, combined, out)?;
                }
            }
        } else if matches.is_empty() {
            self.solve(rest, subst, out)?;
        }
        Ok(())
    }
}

impl MentalState for InMemoryMentalState {
    fn query(&self, condition: &MentalStateCondition) -> MentalStateResult<Vec<Substitution>> {
        let mut raw = Vec::new();
        self.solve(&condition.literals, Substitution::new(), &mut raw)?;
        let vars = condition.free_vars();
        let mut answers: Vec<Substitution> = Vec::with_capacity(raw.len());
        for answer in raw {
            let answer = answer.restrict(&vars);
            if !answers.contains(&answer) {
                answers.push(answer);
            }
        }
        Ok(answers)
    }

    fn insert(&mut self, update: &Update) -> MentalStateResult<Vec<Delta>> {
        for term in update.add.iter().chain(&update.remove) {
            ensure_ground(term)?;
        }
        let mut deltas = Vec::new();
        for term in &update.remove {
            if remove_exact(&mut self.beliefs, term) {
                deltas.push(Delta::new(Base::Beliefs, Change::Removed, term.clone()));
            }
        }
        for term in &update.add {
            if push_unique(&mut self.beliefs, term.clone()) {
                deltas.push(Delta::new(Base::Beliefs, Change::Added, term.clone()));
            }
        }
        Ok(deltas)
    }

    fn adopt(&mut self, goal: &Term) -> MentalStateResult<Vec<Delta>> {
        ensure_ground(goal)?;
        if self.goals.contains(goal) || self.believes(goal) {
            debug!("Not adopting {}: already a goal or believed", goal);
            return Ok(Vec::new());
        }
        self.goals.push(goal.clone());
        Ok(vec![Delta::new(Base::Goals, Change::Added, goal.clone())])
    }

    fn drop_goal(&mut self, goal: &Term) -> MentalStateResult<Vec<Delta>> {
        let mut deltas = Vec::new();
        self.goals.retain(|g| {
            if unify(goal, g).is_some() {
                deltas.push(Delta::new(Base::Goals, Change::Removed, g.clone()));
                false
            } else {
                true
            }
        });
        Ok(deltas)
    }

    fn update_goal_state(&mut self) -> Vec<Delta> {
        let (achieved, open): (Vec<Term>, Vec<Term>) = std::mem::take(&mut self.goals)
            .into_iter()
            .partition(|g| self.beliefs.contains(g));
        self.goals = open;
        achieved
            .into_iter()
            .map(|g| Delta::new(Base::Goals, Change::Achieved, g))
            .collect()
    }

    fn set_percepts(&mut self, percepts: Vec<Term>) -> MentalStateResult<Vec<Delta>> {
        for p in &percepts {
            ensure_ground(p)?;
        }
        let mut deltas: Vec<Delta> = self
            .percepts
            .iter()
            .filter(|old| !percepts.contains(old))
            .map(|old| Delta::new(Base::Percepts, Change::Removed, old.clone()))
            .collect();
        let mut next = Vec::with_capacity(percepts.len());
        for p in percepts {
            if !self.percepts.contains(&p) && !next.contains(&p) {
                deltas.push(Delta::new(Base::Percepts, Change::Added, p.clone()));
            }
            push_unique(&mut next, p);
        }
        self.percepts = next;
        Ok(deltas)
    }

    fn add_mail(&mut self, mail: Term) -> MentalStateResult<Vec<Delta>> {
        ensure_ground(&mail)?;
        if push_unique(&mut self.mails, mail.clone()) {
            Ok(vec![Delta::new(Base::Mails, Change::Added, mail)])
        } else {
            Ok(Vec::new())
        }
    }

    fn snapshot(&self) -> MentalStateSnapshot {
        let render = |terms: &[Term]| terms.iter().map(Term::to_string).collect();
        MentalStateSnapshot {
            beliefs: render(&self.beliefs),
            goals: render(&self.goals),
            percepts: render(&self.percepts),
            mails: render(&self.mails),
        }
    }
}

fn match_in(base: &[Term], formula: &Term) -> Vec<Substitution> {
    base.iter().filter_map(|t| unify(formula, t)).collect()
}

fn ensure_ground(term: &Term) -> MentalStateResult<()> {
    if term.is_ground() {
        Ok(())
    } else {
        Err(MentalStateError::NotGround(term.to_string()))
    }
}

fn push_unique(base: &mut Vec<Term>, term: Term) -> bool {
    if base.contains(&term) {
        false
    } else {
        base.push(term);
        true
    }
}

fn remove_exact(base: &mut Vec<Term>, term: &Term) -> bool {
    match base.iter().position(|t| t == term) {
        Some(idx) => {
            base.remove(idx);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kr::parse_term;

    fn t(s: &str) -> Term {
        parse_term(s).unwrap()
    }

    fn state(beliefs: &[&str], goals: &[&str]) -> InMemoryMentalState {
        InMemoryMentalState::with_contents(
            beliefs.iter().map(|s| t(s)).collect(),
            goals.iter().map(|s| t(s)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_insert_then_delete_restores_beliefs() {
        let mut ms = state(&["q"], &[]);
        let before = ms.beliefs().to_vec();
        let update = Update::parse("p(1)").unwrap();
        let added = ms.insert(&update).unwrap();
        assert_eq!(added, vec![Delta::new(Base::Beliefs, Change::Added, t("p(1)"))]);
        let removed = ms.delete(&update).unwrap();
        assert_eq!(removed[0].change, Change::Removed);
        assert_eq!(ms.beliefs(), before.as_slice());
    }

    #[test]
    fn test_query_joins_literals() {
        let ms = state(&["on(a, b)", "on(b, table)", "clear(a)"], &[]);
        let cond = MentalStateCondition::parse("bel(on(X, Y)), bel(clear(X))").unwrap();
        let answers = ms.query(&cond).unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].get("Y"), Some(&t("b")));
    }

    #[test]
    fn test_negation_as_failure() {
        let ms = state(&["on(a, b)", "on(b, table)"], &[]);
        let cond = MentalStateCondition::parse("bel(on(X, Y)), not(bel(on(Z, X)))").unwrap();
        let answers = ms.query(&cond).unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].get("X"), Some(&t("a")));
        assert!(answers[0].get("Z").is_none());
    }

    #[test]
    fn test_goal_literals() {
        let ms = state(&["done(a)"], &["done(a)", "done(b)"]);
        let agoal = MentalStateCondition::parse("a-goal(done(X))").unwrap();
        assert_eq!(ms.query(&agoal).unwrap()[0].get("X"), Some(&t("b")));
        let goala = MentalStateCondition::parse("goal-a(done(X))").unwrap();
        assert_eq!(ms.query(&goala).unwrap()[0].get("X"), Some(&t("a")));
    }

    #[test]
    fn test_unbound_formula_is_an_error() {
        let ms = state(&[], &[]);
        let cond = MentalStateCondition::parse("bel(X)").unwrap();
        assert!(matches!(ms.query(&cond), Err(MentalStateError::Unbound(_))));
    }

    #[test]
    fn test_adopt_refused_when_believed() {
        let mut ms = state(&["p"], &[]);
        assert!(ms.adopt(&t("p")).unwrap().is_empty());
        assert_eq!(ms.adopt(&t("q")).unwrap().len(), 1);
        assert!(ms.adopt(&t("q")).unwrap().is_empty());
        assert!(ms.adopt(&t("r(X)")).is_err());
    }

    #[test]
    fn test_drop_removes_all_unifying_goals() {
        let mut ms = state(&[], &["at(1)", "at(2)", "home"]);
        let dropped = ms.drop_goal(&t("at(X)")).unwrap();
        assert_eq!(dropped.len(), 2);
        assert_eq!(ms.goals(), &[t("home")]);
    }

    #[test]
    fn test_goal_achievement() {
        let mut ms = state(&[], &["home", "rich"]);
        ms.insert(&Update::parse("home").unwrap()).unwrap();
        let achieved = ms.update_goal_state();
        assert_eq!(achieved, vec![Delta::new(Base::Goals, Change::Achieved, t("home"))]);
        assert_eq!(ms.goals(), &[t("rich")]);
    }

    #[test]
    fn test_percept_deltas() {
        let mut ms = state(&[], &[]);
        ms.set_percepts(vec![t("see(a)"), t("see(b)")]).unwrap();
        let deltas = ms.set_percepts(vec![t("see(b)"), t("see(c)")]).unwrap();
        assert_eq!(
            deltas,
            vec![
                Delta::new(Base::Percepts, Change::Removed, t("see(a)")),
                Delta::new(Base::Percepts, Change::Added, t("see(c)")),
            ]
        );
    }
}
