//! Debugger scenarios with a real agent thread.
//!
//! Test Organization:
//! - Stepping, pausing and running
//! - Kill handling
//! - Observers
//! - Session directory

use goalrt_core::debugger::*;
use goalrt_core::directory::{DebugSession, EntityKind};
use goalrt_core::errors::DebuggerError;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn checkpoint(channel: Channel) -> Checkpoint {
    Checkpoint::new(channel, DebugObject::None, "checkpoint on %s").arg(channel)
}

/// Poll until `pred` holds, at most two seconds.
fn wait_until(mut pred: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    pred()
}

/// Agent thread hitting an update checkpoint then an action checkpoint, `cycles` times.
fn spawn_agent(
    debugger: Arc<ObservableDebugger>,
    cycles: usize,
) -> thread::JoinHandle<Result<usize, DebuggerError>> {
    thread::spawn(move || {
        let mut passed = 0;
        for _ in 0..cycles {
            debugger.breakpoint(&checkpoint(Channel::ReasoningCycleSeparator), &mut NoQueries)?;
            debugger.breakpoint(&checkpoint(Channel::BbUpdates), &mut NoQueries)?;
            debugger.breakpoint(&checkpoint(Channel::ActionExecutedBuiltin), &mut NoQueries)?;
            passed += 1;
        }
        Ok(passed)
    })
}

// ============================================================================
// STEPPING
// ============================================================================

#[test]
fn test_step_pause_run_scenario() {
    let debugger = Arc::new(ObservableDebugger::new("a1"));
    debugger.set_pause_channels([Channel::ActionExecutedBuiltin]);
    debugger.step();

    let agent = spawn_agent(debugger.clone(), 3);

    // BB_UPDATES is not in the pause set, so the agent stops at the action
    assert!(wait_until(|| debugger.run_mode() == RunMode::Paused));

    debugger.step();
    assert!(wait_until(|| debugger.run_mode() == RunMode::Paused));

    debugger.run();
    assert_eq!(agent.join().unwrap().unwrap(), 3);
    assert_eq!(debugger.run_mode(), RunMode::Running);
}

#[test]
fn test_finestep_stops_at_every_visible_checkpoint() {
    let debugger = Arc::new(ObservableDebugger::new("a1"));
    let recorder = Arc::new(EventRecorder::new());
    debugger.subscribe(recorder.clone(), Channel::RunMode);
    debugger.finestep();

    let agent = spawn_agent(debugger.clone(), 1);
    for _ in 0..2 {
        assert!(wait_until(|| debugger.run_mode() == RunMode::Paused));
        debugger.finestep();
    }
    assert_eq!(agent.join().unwrap().unwrap(), 1);
    let paused = recorder
        .run_mode_changes()
        .into_iter()
        .filter(|m| *m == RunMode::Paused)
        .count();
    assert_eq!(paused, 2);
}

#[test]
fn test_query_answered_while_paused() {
    struct Fixed;
    impl QueryTarget for Fixed {
        fn answer(&mut self, query: &DebugQuery) -> Result<String, String> {
            Ok(format!("answer to {}", query))
        }
    }

    let debugger = Arc::new(ObservableDebugger::new("a1"));
    debugger.pause();
    let agent = {
        let debugger = debugger.clone();
        thread::spawn(move || debugger.breakpoint(&checkpoint(Channel::GbUpdates), &mut Fixed))
    };
    assert!(wait_until(|| debugger.run_mode() == RunMode::Paused));

    let reply = debugger.query(DebugQuery::HistoryState).unwrap();
    let answer = reply.blocking_recv().unwrap();
    assert!(answer.starts_with("answer to"));
    assert!(debugger.run_mode().is_paused());

    debugger.run();
    assert!(agent.join().unwrap().is_ok());
}

// ============================================================================
// KILL HANDLING
// ============================================================================

#[test]
fn test_kill_releases_paused_agent_and_is_absorbing() {
    let debugger = Arc::new(ObservableDebugger::new("a1"));
    debugger.pause();
    let agent = spawn_agent(debugger.clone(), 5);
    assert!(wait_until(|| debugger.run_mode() == RunMode::Paused));

    debugger.kill();
    assert!(matches!(agent.join().unwrap(), Err(DebuggerError::Killed(_))));

    debugger.run();
    debugger.step();
    assert_eq!(debugger.run_mode(), RunMode::Killed);
    assert!(debugger.query(DebugQuery::HistoryState).is_err());

    debugger.reset();
    assert_eq!(debugger.run_mode(), RunMode::Running);
}

// ============================================================================
// OBSERVERS
// ============================================================================

#[test]
fn test_any_veto_skips_pausing_but_all_observers_are_notified() {
    let debugger = Arc::new(ObservableDebugger::new("a1"));
    let first = Arc::new(EventRecorder::vetoing());
    let second = Arc::new(EventRecorder::new());
    debugger.subscribe(first.clone(), Channel::ActionExecutedBuiltin);
    debugger.subscribe(second.clone(), Channel::ActionExecutedBuiltin);
    debugger.pause();

    // would block if the veto were ignored
    debugger
        .breakpoint(&checkpoint(Channel::ActionExecutedBuiltin), &mut NoQueries)
        .unwrap();
    assert_eq!(first.events().len(), 1);
    assert_eq!(second.events().len(), 1);
}

// ============================================================================
// SESSION DIRECTORY
// ============================================================================

#[test]
fn test_duplicate_registration_keeps_first() {
    let session = DebugSession::new();
    let first = session.create_debugger("a1");
    let second = session.create_debugger("a1");
    session.register("a1", EntityKind::Agent, first.clone(), None);
    let entry = session.register("a1", EntityKind::Agent, second, None);

    assert!(Arc::ptr_eq(&entry.debugger, &first));
    assert_eq!(session.len(), 1);
}

#[test]
fn test_global_breakpoint_reaches_every_agent() {
    let session = DebugSession::with_pause_channels(vec![Channel::ActionExecutedBuiltin]);
    let controller = session.main_controller("ui").unwrap();
    assert!(session.main_controller("other").is_err());

    let mut agents = Vec::new();
    for name in ["a1", "a2"] {
        let debugger = session.create_debugger(name);
        session.register(name, EntityKind::Agent, debugger.clone(), None);
        agents.push((debugger.clone(), spawn_agent(debugger, 1_000_000)));
    }

    assert_eq!(controller.global_breakpoint(), 2);
    for (debugger, _) in &agents {
        assert!(wait_until(|| debugger.run_mode() == RunMode::Paused));
    }

    assert!(session.close());
    assert!(!session.close());
    for (_, agent) in agents {
        assert!(matches!(agent.join().unwrap(), Err(DebuggerError::Killed(_))));
    }
}
