//! Built-in action kinds.

use crate::action::{Action, Mood};
use crate::errors::{ActionError, ActionResult, DebuggerResult};
use crate::kr::Term;
use crate::mental_state::Delta;
use crate::run_state::{ExecutionEvent, Message, RunState};
use tracing::info;

pub(super) fn report_all(state: &mut dyn RunState, deltas: Vec<Delta>) -> DebuggerResult<()> {
    for delta in deltas {
        state.report(ExecutionEvent::StateChanged(delta))?;
    }
    Ok(())
}

/// Re-evaluate goals after a belief change and report the achieved ones.
pub(super) fn update_goals(state: &mut dyn RunState) -> DebuggerResult<()> {
    let achieved = state.mental_state_mut().update_goal_state();
    report_all(state, achieved)
}

pub(super) fn insert(state: &mut dyn RunState, action: &Action) -> ActionResult<()> {
    let deltas = state.mental_state_mut().insert(&action.update())?;
    report_all(state, deltas)?;
    update_goals(state)?;
    Ok(())
}

pub(super) fn delete(state: &mut dyn RunState, action: &Action) -> ActionResult<()> {
    let deltas = state.mental_state_mut().delete(&action.update())?;
    report_all(state, deltas)?;
    update_goals(state)?;
    Ok(())
}

pub(super) fn adopt(state: &mut dyn RunState, action: &Action) -> ActionResult<()> {
    let deltas = state.mental_state_mut().adopt(&action.params()[0])?;
    report_all(state, deltas)?;
    Ok(())
}

pub(super) fn drop_goal(state: &mut dyn RunState, action: &Action) -> ActionResult<()> {
    let deltas = state.mental_state_mut().drop_goal(&action.params()[0])?;
    report_all(state, deltas)?;
    Ok(())
}

pub(super) fn send(state: &mut dyn RunState, action: &Action) -> ActionResult<()> {
    let recipient = match &action.params()[0] {
        Term::Atom(name) | Term::Str(name) => name.clone(),
        other => {
            return Err(ActionError::ExternalFailed {
                action: action.to_string(),
                reason: format!("{} is not an agent name", other),
            })
        }
    };
    let content = action.params()[1].clone();
    let message = Message {
        sender: state.agent_name().to_string(),
        recipient,
        mood: Mood::of(&content).0,
        content,
    };
    let sent = message.sent_term();
    state
        .send_message(message)
        .map_err(|reason| ActionError::ExternalFailed {
            action: action.to_string(),
            reason,
        })?;
    // open questions are sent but not recorded
    if sent.is_ground() {
        let deltas = state.mental_state_mut().add_mail(sent)?;
        report_all(state, deltas)?;
    }
    Ok(())
}

pub(super) fn print(state: &mut dyn RunState, action: &Action) -> ActionResult<()> {
    let text = match &action.params()[0] {
        Term::Str(s) => s.clone(),
        other => other.to_string(),
    };
    state.report(ExecutionEvent::Printed(text))?;
    Ok(())
}

pub(super) fn log(state: &dyn RunState, action: &Action) {
    info!(target: "goalrt::agent_log", agent = %state.agent_name(), "{}", action.params()[0]);
}
