//! Observer fan-out on top of the stepping debugger.

use super::{
    Channel, Checkpoint, DebugEvent, DebugObject, QueryTarget, RunMode, SteppingDebugger,
};
use crate::errors::{DebuggerError, DebuggerResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use tracing::trace;

/// Receives events of the channels it subscribed to.
pub trait DebugObserver: Send + Sync {
    fn name(&self) -> String;

    /// Return `false` to veto the pause decision for this checkpoint.
    fn notify_breakpoint_hit(&self, event: &DebugEvent) -> bool;
}

#[derive(Default)]
struct ObserverTable {
    by_channel: RwLock<HashMap<Channel, Vec<Arc<dyn DebugObserver>>>>,
}

impl ObserverTable {
    fn observers(&self, channel: Channel) -> Vec<Arc<dyn DebugObserver>> {
        self.by_channel
            .read()
            .get(&channel)
            .cloned()
            .unwrap_or_default()
    }

    /// Deliver to every subscriber in registration order; the result is the AND of all answers.
    fn notify(&self, event: &DebugEvent) -> bool {
        let observers = self.observers(event.channel);
        let mut proceed = true;
        for observer in observers {
            let answer = observer.notify_breakpoint_hit(event);
            if !answer {
                trace!("{} vetoed {} from {}", observer.name(), event.channel, event.source);
            }
            proceed &= answer;
        }
        proceed
    }
}

/// A stepping debugger whose checkpoints and run-mode changes are also
/// delivered to subscribed observers.
pub struct ObservableDebugger {
    inner: SteppingDebugger,
    observers: Arc<ObserverTable>,
}

impl ObservableDebugger {
    pub fn new(name: &str) -> Self {
        let observers = Arc::new(ObserverTable::default());
        let table = observers.clone();
        let source = name.to_string();
        let inner = SteppingDebugger::with_mode_hook(name, move |old, new| {
            let checkpoint = Checkpoint::new(
                Channel::RunMode,
                DebugObject::RunMode { from: old, to: new },
                "run mode changed from %s to %s",
            )
            .arg(old)
            .arg(new);
            table.notify(&DebugEvent::from_checkpoint(old, &source, &checkpoint));
        });
        Self { inner, observers }
    }

    /// Subscribe `observer` to `channel`. Subscribing twice has no effect.
    pub fn subscribe(&self, observer: Arc<dyn DebugObserver>, channel: Channel) {
        let mut table = self.observers.by_channel.write();
        let list = table.entry(channel).or_default();
        if !list.iter().any(|o| Arc::ptr_eq(o, &observer)) {
            list.push(observer);
        }
    }

    pub fn subscribe_all(&self, observer: Arc<dyn DebugObserver>) {
        for channel in Channel::ALL {
            self.subscribe(observer.clone(), channel);
        }
    }

    pub fn unsubscribe(&self, observer: &Arc<dyn DebugObserver>, channel: Channel) {
        if let Some(list) = self.observers.by_channel.write().get_mut(&channel) {
            list.retain(|o| !Arc::ptr_eq(o, observer));
        }
    }

    pub fn unsubscribe_all(&self, observer: &Arc<dyn DebugObserver>) {
        for list in self.observers.by_channel.write().values_mut() {
            list.retain(|o| !Arc::ptr_eq(o, observer));
        }
    }

    pub fn observer_count(&self, channel: Channel) -> usize {
        self.observers
            .by_channel
            .read()
            .get(&channel)
            .map_or(0, Vec::len)
    }

    /// Notify observers of the checkpoint, then let the stepping debugger decide
    /// whether to pause unless some observer vetoed.
    pub fn breakpoint(
        &self,
        checkpoint: &Checkpoint,
        target: &mut dyn QueryTarget,
    ) -> DebuggerResult<()> {
        if self.inner.is_killed() {
            return Err(DebuggerError::Killed(self.inner.name().to_string()));
        }
        if self.observer_count(checkpoint.channel) > 0 {
            let event =
                DebugEvent::from_checkpoint(self.inner.run_mode(), self.inner.name(), checkpoint);
            if !self.observers.notify(&event) {
                return Ok(());
            }
        }
        self.inner.breakpoint(checkpoint, target)
    }

    pub fn stepping(&self) -> &SteppingDebugger {
        &self.inner
    }
}

impl Deref for ObservableDebugger {
    type Target = SteppingDebugger;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl std::fmt::Debug for ObservableDebugger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableDebugger")
            .field("inner", &self.inner)
            .finish()
    }
}

/// Observer that records every event it sees. Handy for tests and the batch runner.
#[derive(Default)]
pub struct EventRecorder {
    events: parking_lot::Mutex<Vec<DebugEvent>>,
    veto: bool,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder that vetoes every pause decision.
    pub fn vetoing() -> Self {
        Self {
            events: Default::default(),
            veto: true,
        }
    }

    pub fn events(&self) -> Vec<DebugEvent> {
        self.events.lock().clone()
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.events.lock().iter().map(|e| e.channel).collect()
    }

    pub fn run_mode_changes(&self) -> Vec<RunMode> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e.object {
                DebugObject::RunMode { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }
}

impl DebugObserver for EventRecorder {
    fn name(&self) -> String {
        "recorder".to_string()
    }

    fn notify_breakpoint_hit(&self, event: &DebugEvent) -> bool {
        self.events.lock().push(event.clone());
        !self.veto
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::NoQueries;

    #[test]
    fn test_run_mode_events_precede_change() {
        let dbg = ObservableDebugger::new("a1");
        let recorder = Arc::new(EventRecorder::new());
        dbg.subscribe(recorder.clone(), Channel::RunMode);
        dbg.step();
        dbg.kill();
        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].run_mode, RunMode::Running);
        assert_eq!(recorder.run_mode_changes(), vec![RunMode::Stepping, RunMode::Killed]);
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let dbg = ObservableDebugger::new("a1");
        let recorder: Arc<dyn DebugObserver> = Arc::new(EventRecorder::new());
        dbg.subscribe(recorder.clone(), Channel::Print);
        dbg.subscribe(recorder.clone(), Channel::Print);
        assert_eq!(dbg.observer_count(Channel::Print), 1);
        dbg.unsubscribe_all(&recorder);
        assert_eq!(dbg.observer_count(Channel::Print), 0);
    }

    #[test]
    fn test_veto_skips_pause() {
        let dbg = ObservableDebugger::new("a1");
        let agreeing = Arc::new(EventRecorder::new());
        let vetoing = Arc::new(EventRecorder::vetoing());
        dbg.subscribe(agreeing.clone(), Channel::Testfailure);
        dbg.subscribe(vetoing.clone(), Channel::Testfailure);

        let cp = Checkpoint::new(Channel::Testfailure, DebugObject::None, "failed");
        // would pause forever without the veto
        dbg.breakpoint(&cp, &mut NoQueries).unwrap();
        assert_eq!(dbg.run_mode(), RunMode::Running);
        assert_eq!(agreeing.events().len(), 1);
        assert_eq!(vetoing.events().len(), 1);
    }
}
