//! Action execution pipeline.
//!
//! An [`ActionExecutor`] pairs an action with the substitution it was selected
//! under. `evaluate_precondition` picks an answer without touching the mental
//! state; `perform` checks closedness, runs the kind-specific step and reports
//! the executed action.

mod builtin;
mod user_spec;

use crate::action::{Action, ActionKind, Mood};
use crate::errors::{ActionError, ActionResult};
use crate::kr::{MentalStateCondition, Substitution};
use crate::run_state::{ExecutionEvent, RunState};
use tracing::{trace, warn};

/// What `perform` hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// The instantiated action
    pub action: Action,
    pub source: Substitution,
    /// Binding scope of a user-specified action's own variables
    pub target: Substitution,
    /// False when a user-specified action turned out not to be enabled
    pub performed: bool,
}

impl ExecutionResult {
    fn performed(action: Action, source: &Substitution) -> Self {
        Self {
            action,
            source: source.clone(),
            target: Substitution::new(),
            performed: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActionExecutor {
    action: Action,
    source: Substitution,
}

impl ActionExecutor {
    pub fn new(action: Action, source: Substitution) -> Self {
        Self { action, source }
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn source(&self) -> &Substitution {
        &self.source
    }

    /// The action with the source substitution applied.
    pub fn instantiated(&self) -> Action {
        self.action.apply(&self.source)
    }

    /// Ground actions are executable; anonymous module calls and questions may stay open.
    pub fn can_be_executed(&self) -> bool {
        let action = self.instantiated();
        match action.kind() {
            ActionKind::ModuleCall { anonymous: true } => true,
            ActionKind::Send => {
                action.is_closed()
                    || action
                        .params()
                        .get(1)
                        .map_or(false, |c| Mood::of(c).0 == Mood::Interrogative)
            }
            _ => action.is_closed(),
        }
    }

    /// First answer of the precondition, or `None` if it does not hold.
    ///
    /// For a user-specified action that the answer closes, the specification's
    /// precondition must hold as well; it is queried in its own variable scope.
    pub fn evaluate_precondition(
        &self,
        state: &mut dyn RunState,
    ) -> ActionResult<Option<Substitution>> {
        let action = self.instantiated();
        let condition = action.precondition();
        let mut keep = condition.free_vars();
        for var in action.free_vars() {
            if !keep.contains(var) {
                keep.push(var.clone());
            }
        }

        let answers = query(state, condition, &action)?;
        if answers.len() > 1 {
            warn!(
                "Precondition of {} has {} answers, using the first",
                action,
                answers.len()
            );
        }
        let mut answer = answers.into_iter().next().map(|a| a.restrict(&keep));
        if let (Some(bindings), ActionKind::UserSpec(spec)) = (answer.clone(), action.kind()) {
            let bound = action.apply(&bindings);
            if bound.is_closed() && !user_spec::is_enabled(state, spec, &bound)? {
                answer = None;
            }
        }
        state.report(ExecutionEvent::PreconditionEvaluated {
            action: action.clone(),
            holds: answer.is_some(),
        })?;
        trace!("{} enabled: {}", action, answer.is_some());
        Ok(answer)
    }

    pub fn perform(&self, state: &mut dyn RunState) -> ActionResult<ExecutionResult> {
        let action = self.instantiated();
        if !self.can_be_executed() {
            return Err(ActionError::NotClosed {
                action: action.to_string(),
                free: action.free_vars().to_vec(),
            });
        }

        let result = match action.kind() {
            ActionKind::Insert => {
                builtin::insert(state, &action)?;
                ExecutionResult::performed(action, &self.source)
            }
            ActionKind::Delete => {
                builtin::delete(state, &action)?;
                ExecutionResult::performed(action, &self.source)
            }
            ActionKind::Adopt => {
                builtin::adopt(state, &action)?;
                ExecutionResult::performed(action, &self.source)
            }
            ActionKind::Drop => {
                builtin::drop_goal(state, &action)?;
                ExecutionResult::performed(action, &self.source)
            }
            ActionKind::Send => {
                builtin::send(state, &action)?;
                ExecutionResult::performed(action, &self.source)
            }
            ActionKind::Print => {
                builtin::print(state, &action)?;
                ExecutionResult::performed(action, &self.source)
            }
            ActionKind::Log => {
                builtin::log(state, &action);
                ExecutionResult::performed(action, &self.source)
            }
            ActionKind::ExitModule => ExecutionResult::performed(action, &self.source),
            ActionKind::ModuleCall { .. } => {
                return Err(ActionError::ModuleCallNotExecutable(action.to_string()))
            }
            ActionKind::UserSpec(spec) => {
                let spec = spec.clone();
                user_spec::execute(state, action, &spec, &self.source)?
            }
        };

        if result.performed {
            state.report(ExecutionEvent::ActionExecuted {
                action: result.action.clone(),
            })?;
        }
        Ok(result)
    }
}

pub(crate) fn query(
    state: &dyn RunState,
    condition: &MentalStateCondition,
    action: &Action,
) -> ActionResult<Vec<Substitution>> {
    state
        .mental_state()
        .query(condition)
        .map_err(|e| ActionError::PreconditionFailed {
            action: action.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kr::{parse_term, Term, Update};
    use crate::mental_state::InMemoryMentalState;
    use crate::run_state::AgentRunState;

    fn t(s: &str) -> Term {
        parse_term(s).unwrap()
    }

    fn agent(beliefs: &[&str], goals: &[&str]) -> AgentRunState {
        let mental = InMemoryMentalState::with_contents(
            beliefs.iter().map(|s| t(s)).collect(),
            goals.iter().map(|s| t(s)).collect(),
        )
        .unwrap();
        AgentRunState::new("a1", mental)
    }

    #[test]
    fn test_open_action_is_not_closed() {
        let mut state = agent(&[], &[]);
        let exec = ActionExecutor::new(Action::insert(&Update::parse("p(X)").unwrap()), Substitution::new());
        assert!(!exec.can_be_executed());
        match exec.perform(&mut state) {
            Err(ActionError::NotClosed { free, .. }) => assert_eq!(free, vec!["X".to_string()]),
            other => panic!("expected NotClosed, got {:?}", other),
        }
        assert!(state.mental().beliefs().is_empty());
    }

    #[test]
    fn test_source_substitution_closes_action() {
        let mut state = agent(&[], &[]);
        let exec = ActionExecutor::new(
            Action::insert(&Update::parse("p(X)").unwrap()),
            Substitution::singleton("X", Term::Int(1)),
        );
        let result = exec.perform(&mut state).unwrap();
        assert_eq!(result.action.to_string(), "insert(p(1))");
        assert_eq!(state.mental().beliefs(), &[t("p(1)")]);
    }

    #[test]
    fn test_precondition_picks_first_answer() {
        let mut state = agent(&["p(1)", "p(2)"], &[]);
        let action = Action::print(t("X"))
            .with_precondition(MentalStateCondition::parse("bel(p(X))").unwrap());
        let exec = ActionExecutor::new(action, Substitution::new());
        let answer = exec.evaluate_precondition(&mut state).unwrap().unwrap();
        assert_eq!(answer.get("X"), Some(&Term::Int(1)));
        // evaluation alone leaves the beliefs untouched
        assert_eq!(state.mental().beliefs().len(), 2);
    }

    #[test]
    fn test_module_call_never_executes() {
        let mut state = agent(&[], &[]);
        let exec = ActionExecutor::new(Action::module_call("build", vec![t("tower")]), Substitution::new());
        assert!(exec.can_be_executed());
        assert!(matches!(
            exec.perform(&mut state),
            Err(ActionError::ModuleCallNotExecutable(_))
        ));
        assert!(ActionExecutor::new(Action::anonymous_module("block"), Substitution::new())
            .can_be_executed());
    }

    #[test]
    fn test_interrogative_send_may_stay_open() {
        let exec = ActionExecutor::new(
            Action::send(t("bob"), t("interrogative(price(X))")),
            Substitution::new(),
        );
        assert!(exec.can_be_executed());
        let open = ActionExecutor::new(Action::send(t("bob"), t("price(X)")), Substitution::new());
        assert!(!open.can_be_executed());
    }
}
