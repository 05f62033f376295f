//! The run-mode state machine that suspends an agent thread at checkpoints.
//!
//! Exactly one agent thread calls [`SteppingDebugger::breakpoint`]; any number
//! of controller threads change the mode or post queries. While paused, the
//! agent thread blocks on a per-debugger signal channel that carries both
//! wake-ups and queries, so queries are answered on the agent thread itself.

use super::query::PendingQuery;
use super::{
    Breakpoint, BreakpointKind, BreakpointLocation, Channel, Checkpoint, DebugQuery,
    QueryReceiver, QueryTarget, RunMode,
};
use crate::errors::{DebuggerError, DebuggerResult};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

/// Called with `(old, new)` before a run-mode change takes effect.
pub type ModeChangeHook = Box<dyn Fn(RunMode, RunMode) + Send + Sync>;

enum Signal {
    Wake,
    Query(PendingQuery),
}

pub struct SteppingDebugger {
    name: String,
    mode: Mutex<RunMode>,
    /// Serializes mode transitions, reentrant so hooks may read or change the mode
    transition: ReentrantMutex<()>,
    pause_channels: RwLock<HashSet<Channel>>,
    breakpoints: RwLock<HashMap<BreakpointLocation, BreakpointKind>>,
    hit_this_cycle: Mutex<HashSet<BreakpointLocation>>,
    global_break: AtomicBool,
    /// Set while a wake-up sits unconsumed in the signal channel
    wake_pending: AtomicBool,
    signal_tx: mpsc::UnboundedSender<Signal>,
    signal_rx: Mutex<mpsc::UnboundedReceiver<Signal>>,
    on_mode_change: Option<ModeChangeHook>,
}

impl SteppingDebugger {
    pub fn new(name: &str) -> Self {
        Self::build(name, None)
    }

    pub fn with_mode_hook<F>(name: &str, hook: F) -> Self
    where
        F: Fn(RunMode, RunMode) + Send + Sync + 'static,
    {
        Self::build(name, Some(Box::new(hook)))
    }

    fn build(name: &str, on_mode_change: Option<ModeChangeHook>) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            name: name.to_string(),
            mode: Mutex::new(RunMode::Running),
            transition: ReentrantMutex::new(()),
            pause_channels: RwLock::new(HashSet::new()),
            breakpoints: RwLock::new(HashMap::new()),
            hit_this_cycle: Mutex::new(HashSet::new()),
            global_break: AtomicBool::new(false),
            wake_pending: AtomicBool::new(false),
            signal_tx,
            signal_rx: Mutex::new(signal_rx),
            on_mode_change,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run_mode(&self) -> RunMode {
        *self.mode.lock()
    }

    pub fn is_killed(&self) -> bool {
        self.run_mode() == RunMode::Killed
    }

    // ========================================================================
    // CONTROL
    // ========================================================================

    pub fn run(&self) {
        self.set_run_mode(RunMode::Running);
    }

    pub fn step(&self) {
        self.set_run_mode(RunMode::Stepping);
    }

    pub fn finestep(&self) {
        self.set_run_mode(RunMode::FineStepping);
    }

    pub fn pause(&self) {
        self.set_run_mode(RunMode::Paused);
    }

    pub fn kill(&self) {
        self.set_run_mode(RunMode::Killed);
    }

    /// Request a mode change from a controller thread. Ignored once killed.
    pub fn set_run_mode(&self, mode: RunMode) -> bool {
        self.change_mode(mode, true, false)
    }

    /// Leave any mode, `Killed` included, and start over in `Running`.
    pub fn reset(&self) {
        let _guard = self.transition.lock();
        self.hit_this_cycle.lock().clear();
        self.global_break.store(false, Ordering::SeqCst);
        self.change_mode(RunMode::Running, true, true);
    }

    fn change_mode(&self, mode: RunMode, wake: bool, force: bool) -> bool {
        let _guard = self.transition.lock();
        let old = self.run_mode();
        if old == mode {
            return false;
        }
        if old == RunMode::Killed && !force {
            debug!("{}: ignoring {} request, debugger was killed", self.name, mode);
            return false;
        }
        if let Some(hook) = &self.on_mode_change {
            hook(old, mode);
        }
        *self.mode.lock() = mode;
        debug!("{}: run mode {} -> {}", self.name, old, mode);
        if wake {
            self.wake();
        }
        true
    }

    fn wake(&self) {
        if !self.wake_pending.swap(true, Ordering::SeqCst) {
            // The receiver lives as long as self, so sending cannot fail here.
            let _ = self.signal_tx.send(Signal::Wake);
        }
    }

    // ========================================================================
    // PAUSE CHANNELS AND BREAKPOINTS
    // ========================================================================

    /// Add a channel to the stepping pause set. Hidden channels are refused.
    pub fn add_pause_channel(&self, channel: Channel) -> bool {
        if channel.is_hidden() {
            return false;
        }
        self.pause_channels.write().insert(channel)
    }

    pub fn remove_pause_channel(&self, channel: Channel) -> bool {
        self.pause_channels.write().remove(&channel)
    }

    pub fn set_pause_channels<I: IntoIterator<Item = Channel>>(&self, channels: I) {
        let mut set = self.pause_channels.write();
        set.clear();
        set.extend(channels.into_iter().filter(|c| !c.is_hidden()));
    }

    pub fn is_pause_channel(&self, channel: Channel) -> bool {
        self.pause_channels.read().contains(&channel)
    }

    pub fn pause_channels(&self) -> Vec<Channel> {
        let mut channels: Vec<_> = self.pause_channels.read().iter().copied().collect();
        channels.sort();
        channels
    }

    /// Replace the breakpoint set.
    pub fn set_breakpoints(&self, breakpoints: Vec<Breakpoint>) {
        let mut map = self.breakpoints.write();
        map.clear();
        for bp in breakpoints {
            map.insert(bp.location, bp.kind);
        }
        self.hit_this_cycle.lock().clear();
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.breakpoints
            .read()
            .iter()
            .map(|(location, kind)| Breakpoint {
                location: location.clone(),
                kind: *kind,
            })
            .collect()
    }

    /// Make the next visible checkpoint switch this debugger to stepping.
    pub fn request_global_breakpoint(&self) {
        self.global_break.store(true, Ordering::SeqCst);
    }

    fn hits_breakpoint(&self, checkpoint: &Checkpoint) -> bool {
        let Some(source) = &checkpoint.source else {
            return false;
        };
        let location = source.location();
        match self.breakpoints.read().get(&location) {
            Some(kind) if kind.matches(checkpoint.channel) => {
                self.hit_this_cycle.lock().insert(location)
            }
            _ => false,
        }
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Post a query for the agent thread. It is answered at the next checkpoint,
    /// or immediately if the agent is paused.
    pub fn query(&self, query: DebugQuery) -> DebuggerResult<QueryReceiver> {
        if self.is_killed() {
            return Err(self.killed());
        }
        let (reply, rx) = oneshot::channel();
        self.signal_tx
            .send(Signal::Query(PendingQuery { query, reply }))
            .map_err(|_| DebuggerError::SessionClosed)?;
        Ok(QueryReceiver::new(&self.name, rx))
    }

    // ========================================================================
    // CHECKPOINTS
    // ========================================================================

    /// Called by the agent thread at every checkpoint. Returns once the agent
    /// may continue, or `Err(Killed)` if it must stop.
    pub fn breakpoint(
        &self,
        checkpoint: &Checkpoint,
        target: &mut dyn QueryTarget,
    ) -> DebuggerResult<()> {
        self.drain_signals(target);
        if self.is_killed() {
            return Err(self.refuse_queued());
        }

        let channel = checkpoint.channel;
        if channel == Channel::ReasoningCycleSeparator {
            self.hit_this_cycle.lock().clear();
            return Ok(());
        }
        if channel.is_hidden() {
            return Ok(());
        }

        if self.global_break.swap(false, Ordering::SeqCst) {
            self.change_mode(RunMode::Stepping, false, false);
        } else if channel.always_breaks() || self.hits_breakpoint(checkpoint) {
            self.change_mode(RunMode::Paused, false, false);
        }

        trace!("{}: checkpoint {} in {}", self.name, channel, self.run_mode());
        match self.run_mode() {
            RunMode::Killed => Err(self.refuse_queued()),
            RunMode::Running | RunMode::Unknown | RunMode::RemoteProcess => Ok(()),
            RunMode::Stepping if !self.is_pause_channel(channel) => Ok(()),
            RunMode::Stepping | RunMode::FineStepping => {
                self.change_mode(RunMode::Paused, false, false);
                self.wait_while_paused(target)
            }
            RunMode::Paused | RunMode::Querying => self.wait_while_paused(target),
        }
    }

    fn wait_while_paused(&self, target: &mut dyn QueryTarget) -> DebuggerResult<()> {
        loop {
            match self.run_mode() {
                RunMode::Killed => return Err(self.refuse_queued()),
                RunMode::Paused | RunMode::Querying => {}
                _ => return Ok(()),
            }
            let signal = self.signal_rx.lock().blocking_recv();
            match signal {
                Some(Signal::Wake) => self.wake_pending.store(false, Ordering::SeqCst),
                Some(Signal::Query(pending)) => self.answer_while_paused(pending, target),
                None => return Err(DebuggerError::SessionClosed),
            }
        }
    }

    fn answer_while_paused(&self, pending: PendingQuery, target: &mut dyn QueryTarget) {
        self.change_mode(RunMode::Querying, false, false);
        pending.answer(target, &self.name);
        let _guard = self.transition.lock();
        if self.run_mode() == RunMode::Querying {
            self.change_mode(RunMode::Paused, false, false);
        }
    }

    fn drain_signals(&self, target: &mut dyn QueryTarget) {
        let mut rx = self.signal_rx.lock();
        while let Ok(signal) = rx.try_recv() {
            match signal {
                Signal::Wake => self.wake_pending.store(false, Ordering::SeqCst),
                Signal::Query(pending) => pending.answer(target, &self.name),
            }
        }
    }

    /// Refuse queries that arrived after the kill; the agent thread is leaving.
    fn refuse_queued(&self) -> DebuggerError {
        let mut rx = self.signal_rx.lock();
        while let Ok(signal) = rx.try_recv() {
            if let Signal::Query(pending) = signal {
                pending.refuse(self.killed());
            }
        }
        self.killed()
    }

    fn killed(&self) -> DebuggerError {
        DebuggerError::Killed(self.name.clone())
    }
}

impl std::fmt::Debug for SteppingDebugger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SteppingDebugger")
            .field("name", &self.name)
            .field("mode", &self.run_mode())
            .field("pause_channels", &self.pause_channels())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::{DebugObject, NoQueries, SourceInfo};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn checkpoint(channel: Channel) -> Checkpoint {
        Checkpoint::new(channel, DebugObject::None, "test")
    }

    #[test]
    fn test_running_never_blocks() {
        let dbg = SteppingDebugger::new("a1");
        dbg.add_pause_channel(Channel::BbUpdates);
        for channel in Channel::ALL.iter().filter(|c| !c.always_breaks()) {
            dbg.breakpoint(&checkpoint(*channel), &mut NoQueries).unwrap();
        }
        assert_eq!(dbg.run_mode(), RunMode::Running);
    }

    #[test]
    fn test_queries_left_after_kill_are_refused() {
        let dbg = SteppingDebugger::new("a1");
        let reply = dbg.query(DebugQuery::HistoryState).unwrap();
        dbg.kill();

        assert!(dbg.refuse_queued().is_killed());
        assert!(matches!(reply.blocking_recv(), Err(DebuggerError::Killed(_))));
    }

    #[test]
    fn test_killed_is_absorbing() {
        let dbg = SteppingDebugger::new("a1");
        dbg.kill();
        for mode in RunMode::ALL {
            dbg.set_run_mode(mode);
            assert_eq!(dbg.run_mode(), RunMode::Killed);
        }
        let err = dbg
            .breakpoint(&checkpoint(Channel::Print), &mut NoQueries)
            .unwrap_err();
        assert!(err.is_killed());
        assert!(dbg.query(DebugQuery::HistoryState).is_err());
        dbg.reset();
        assert_eq!(dbg.run_mode(), RunMode::Running);
    }

    #[test]
    fn test_hidden_channels_ignored_while_stepping() {
        let dbg = SteppingDebugger::new("a1");
        assert!(!dbg.add_pause_channel(Channel::RunMode));
        dbg.finestep();
        dbg.breakpoint(&checkpoint(Channel::ReasoningCycleSeparator), &mut NoQueries)
            .unwrap();
        dbg.breakpoint(&checkpoint(Channel::HiddenRuleCondition), &mut NoQueries)
            .unwrap();
        assert_eq!(dbg.run_mode(), RunMode::FineStepping);
    }

    #[test]
    fn test_stepping_skips_channels_outside_pause_set() {
        let dbg = SteppingDebugger::new("a1");
        dbg.add_pause_channel(Channel::ActionExecutedUserspec);
        dbg.step();
        dbg.breakpoint(&checkpoint(Channel::BbUpdates), &mut NoQueries)
            .unwrap();
        assert_eq!(dbg.run_mode(), RunMode::Stepping);
    }

    #[test]
    fn test_mode_hook_sees_change_before_it_applies() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let dbg = Arc::new(SteppingDebugger::with_mode_hook("a1", move |old, new| {
            log.lock().push((old, new));
        }));
        dbg.pause();
        dbg.pause();
        dbg.run();
        assert_eq!(
            *seen.lock(),
            vec![
                (RunMode::Running, RunMode::Paused),
                (RunMode::Paused, RunMode::Running)
            ]
        );
    }

    #[test]
    fn test_breakpoint_fires_once_per_cycle() {
        let dbg = Arc::new(SteppingDebugger::new("a1"));
        dbg.set_breakpoints(vec![Breakpoint::new("a.toml", 4, BreakpointKind::Always)]);
        let at_line_4 =
            checkpoint(Channel::ActionPrecondEvaluation).at(Some(SourceInfo::new("a.toml", 4)));

        let agent = {
            let dbg = dbg.clone();
            let cp = at_line_4.clone();
            thread::spawn(move || {
                dbg.breakpoint(&cp, &mut NoQueries).unwrap();
                // same location, same cycle: no second pause
                dbg.breakpoint(&cp, &mut NoQueries).unwrap();
            })
        };

        while dbg.run_mode() != RunMode::Paused {
            thread::sleep(Duration::from_millis(5));
        }
        dbg.run();
        agent.join().unwrap();
        assert_eq!(dbg.run_mode(), RunMode::Running);
    }

    #[test]
    fn test_query_answered_while_paused() {
        struct Echo;
        impl QueryTarget for Echo {
            fn answer(&mut self, query: &DebugQuery) -> Result<String, String> {
                Ok(format!("answered {}", query))
            }
        }

        let dbg = Arc::new(SteppingDebugger::new("a1"));
        dbg.pause();
        let agent = {
            let dbg = dbg.clone();
            thread::spawn(move || dbg.breakpoint(&checkpoint(Channel::Print), &mut Echo))
        };

        let reply = dbg.query(DebugQuery::HistoryState).unwrap().blocking_recv();
        assert_eq!(reply.unwrap(), "answered history state");
        assert!(dbg.run_mode().is_paused());

        dbg.kill();
        assert!(agent.join().unwrap().unwrap_err().is_killed());
    }
}
