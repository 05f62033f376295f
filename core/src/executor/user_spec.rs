//! User-specified actions: own variable scope, external forwarding,
//! delete-then-insert postconditions.

use super::builtin::{report_all, update_goals};
use super::{query, ExecutionResult};
use crate::action::{Action, ActionSpecification};
use crate::errors::{ActionError, ActionResult};
use crate::kr::{unify_all, Substitution, Update};
use crate::run_state::{ExecutionEvent, RunState};
use tracing::debug;

/// Bind the specification's formal parameters to the call's actual parameters.
pub(super) fn target_substitution(
    spec: &ActionSpecification,
    action: &Action,
) -> Option<Substitution> {
    unify_all(&spec.params, action.params())
}

/// Whether the specification's own precondition holds for a closed call.
///
/// The precondition is queried in the target scope only, so its variables
/// never meet the caller's.
pub(super) fn is_enabled(
    state: &dyn RunState,
    spec: &ActionSpecification,
    action: &Action,
) -> ActionResult<bool> {
    let Some(target) = target_substitution(spec, action) else {
        return Ok(false);
    };
    let precondition = spec.precondition.apply(&target);
    Ok(!query(state, &precondition, action)?.is_empty())
}

pub(super) fn execute(
    state: &mut dyn RunState,
    action: Action,
    spec: &ActionSpecification,
    source: &Substitution,
) -> ActionResult<ExecutionResult> {
    let target =
        target_substitution(spec, &action).ok_or_else(|| ActionError::PreconditionFailed {
            action: action.to_string(),
            reason: format!("parameters do not match {}/{}", spec.name, spec.params.len()),
        })?;

    let precondition = spec.precondition.apply(&target);
    let Some(answer) = query(state, &precondition, &action)?.into_iter().next() else {
        debug!("{} not enabled: {} does not hold", action, precondition);
        state.report(ExecutionEvent::PreconditionEvaluated {
            action: action.clone(),
            holds: false,
        })?;
        return Ok(ExecutionResult {
            action,
            source: source.clone(),
            target,
            performed: false,
        });
    };

    if spec.external {
        state
            .perform_external(&action)
            .map_err(|reason| ActionError::ExternalFailed {
                action: action.to_string(),
                reason,
            })?;
    }

    let scope = target
        .combine(&answer)
        .ok_or_else(|| ActionError::PostconditionFailed {
            action: action.to_string(),
            reason: "precondition answer conflicts with parameters".to_string(),
        })?;
    let post = spec.postcondition.apply(&scope);
    let unbound = post.free_vars();
    if !unbound.is_empty() {
        return Err(ActionError::PostconditionFailed {
            action: action.to_string(),
            reason: format!("unbound variables {}", unbound.join(", ")),
        });
    }

    // Deletions first, so old and new beliefs never coexist.
    let removals = Update {
        add: Vec::new(),
        remove: post.remove,
    };
    let deltas = state.mental_state_mut().insert(&removals)?;
    report_all(state, deltas)?;
    update_goals(state)?;

    let additions = Update {
        add: post.add,
        remove: Vec::new(),
    };
    let deltas = state.mental_state_mut().insert(&additions)?;
    report_all(state, deltas)?;
    update_goals(state)?;

    Ok(ExecutionResult {
        action,
        source: source.clone(),
        target: scope,
        performed: true,
    })
}
