//! Session directory: which debugger belongs to which agent or environment.
//!
//! A [`DebugSession`] is an explicit object shared through `Arc`; there is no
//! process-wide registry. Registration is first-wins, waiting for a
//! registration is a one-shot notification with a bounded timeout, and
//! closing the session happens exactly once.

use crate::debugger::{Breakpoint, Channel, DebugQuery, ObservableDebugger, QueryReceiver, RunMode};
use crate::errors::{DebuggerError, DebuggerResult};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Agent,
    Environment,
}

#[derive(Debug)]
pub struct DirectoryEntry {
    pub id: String,
    pub kind: EntityKind,
    pub debugger: Arc<ObservableDebugger>,
    /// Thread executing the agent, when it runs in this process
    pub thread: Option<ThreadId>,
    pub registered_at: DateTime<Utc>,
}

/// Serializable summary of an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub id: String,
    pub kind: EntityKind,
    pub run_mode: RunMode,
}

pub struct DebugSession {
    id: Uuid,
    entries: DashMap<String, Arc<DirectoryEntry>>,
    waiters: DashMap<String, Vec<oneshot::Sender<Arc<DirectoryEntry>>>>,
    main: Mutex<Option<String>>,
    pause_channels: Vec<Channel>,
    closed: AtomicBool,
}

impl DebugSession {
    pub fn new() -> Arc<Self> {
        Self::with_pause_channels(Vec::new())
    }

    /// Debuggers created by this session start with `channels` as their pause set.
    pub fn with_pause_channels(channels: Vec<Channel>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            entries: DashMap::new(),
            waiters: DashMap::new(),
            main: Mutex::new(None),
            pause_channels: channels,
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn create_debugger(&self, name: &str) -> Arc<ObservableDebugger> {
        let debugger = ObservableDebugger::new(name);
        debugger.set_pause_channels(self.pause_channels.iter().copied());
        Arc::new(debugger)
    }

    // ========================================================================
    // REGISTRATION
    // ========================================================================

    /// Register a debugger under `id`. The first registration wins; later ones
    /// return the existing entry unchanged.
    pub fn register(
        &self,
        id: &str,
        kind: EntityKind,
        debugger: Arc<ObservableDebugger>,
        thread: Option<ThreadId>,
    ) -> Arc<DirectoryEntry> {
        let entry = match self.entries.entry(id.to_string()) {
            Entry::Occupied(existing) => {
                debug!("{} already registered, keeping the first registration", id);
                return existing.get().clone();
            }
            Entry::Vacant(slot) => {
                let entry = Arc::new(DirectoryEntry {
                    id: id.to_string(),
                    kind,
                    debugger,
                    thread,
                    registered_at: Utc::now(),
                });
                slot.insert(entry.clone());
                entry
            }
        };
        info!("Registered {:?} {} in session {}", kind, id, self.id);
        if let Some((_, waiters)) = self.waiters.remove(id) {
            for waiter in waiters {
                let _ = waiter.send(entry.clone());
            }
        }
        entry
    }

    /// Wait until `id` is registered, at most `timeout`.
    pub async fn wait_for_registration(
        &self,
        id: &str,
        timeout: Duration,
    ) -> DebuggerResult<Arc<DirectoryEntry>> {
        if let Some(entry) = self.get(id) {
            return Ok(entry);
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.entry(id.to_string()).or_default().push(tx);
        // registration may have happened between the lookup and queueing the waiter
        if let Some(entry) = self.get(id) {
            return Ok(entry);
        }
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(entry)) => Ok(entry),
            Ok(Err(_)) => Err(DebuggerError::SessionClosed),
            Err(_) => {
                self.prune_waiters(id);
                Err(DebuggerError::Timeout(format!("registration of {}", id)))
            }
        }
    }

    /// Forget waiters for `id` whose receiving side has given up.
    fn prune_waiters(&self, id: &str) {
        if let Some(mut waiters) = self.waiters.get_mut(id) {
            waiters.retain(|waiter| !waiter.is_closed());
        }
        self.waiters.remove_if(id, |_, waiters| waiters.is_empty());
    }

    pub fn get(&self, id: &str) -> Option<Arc<DirectoryEntry>> {
        self.entries.get(id).map(|e| Arc::clone(&e))
    }

    pub fn debugger(&self, id: &str) -> DebuggerResult<Arc<ObservableDebugger>> {
        self.get(id)
            .map(|e| e.debugger.clone())
            .ok_or_else(|| DebuggerError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn remove(&self, id: &str) -> Option<Arc<DirectoryEntry>> {
        self.entries.remove(id).map(|(_, e)| e)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn agents(&self) -> Vec<Arc<DirectoryEntry>> {
        let mut agents: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.kind == EntityKind::Agent)
            .map(|e| e.value().clone())
            .collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    pub fn entity_state(&self, id: &str) -> Option<EntityState> {
        self.get(id).map(|e| EntityState {
            id: e.id.clone(),
            kind: e.kind,
            run_mode: e.debugger.run_mode(),
        })
    }

    /// Merged run mode over all registered debuggers.
    pub fn overall_run_mode(&self) -> RunMode {
        self.entries
            .iter()
            .map(|e| e.debugger.run_mode())
            .fold(RunMode::Unknown, RunMode::merge)
    }

    // ========================================================================
    // CONTROL
    // ========================================================================

    /// Claim the main controller role. The first claimant wins; asking again
    /// under the same name returns another handle.
    pub fn main_controller(self: &Arc<Self>, name: &str) -> DebuggerResult<SessionController> {
        let mut main = self.main.lock();
        match main.as_deref() {
            Some(current) if current != name => {
                Err(DebuggerError::NotMainDebugger(name.to_string()))
            }
            Some(_) => Ok(SessionController::new(name, self.clone())),
            None => {
                *main = Some(name.to_string());
                Ok(SessionController::new(name, self.clone()))
            }
        }
    }

    pub fn kill_all(&self) {
        for entry in self.entries.iter() {
            entry.debugger.kill();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Kill every debugger and empty the directory. Returns `true` only for
    /// the call that actually closed the session.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.kill_all();
        self.entries.clear();
        self.waiters.clear();
        info!("Debug session {} closed", self.id);
        true
    }
}

/// Handle of the session's main controller.
#[derive(Clone)]
pub struct SessionController {
    name: String,
    session: Arc<DebugSession>,
}

impl SessionController {
    fn new(name: &str, session: Arc<DebugSession>) -> Self {
        Self {
            name: name.to_string(),
            session,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session(&self) -> &Arc<DebugSession> {
        &self.session
    }

    pub fn run(&self, id: &str) -> DebuggerResult<()> {
        self.session.debugger(id)?.run();
        Ok(())
    }

    pub fn pause(&self, id: &str) -> DebuggerResult<()> {
        self.session.debugger(id)?.pause();
        Ok(())
    }

    pub fn step(&self, id: &str) -> DebuggerResult<()> {
        self.session.debugger(id)?.step();
        Ok(())
    }

    pub fn finestep(&self, id: &str) -> DebuggerResult<()> {
        self.session.debugger(id)?.finestep();
        Ok(())
    }

    pub fn kill(&self, id: &str) -> DebuggerResult<()> {
        self.session.debugger(id)?.kill();
        Ok(())
    }

    pub fn set_breakpoints(&self, id: &str, breakpoints: Vec<Breakpoint>) -> DebuggerResult<()> {
        self.session.debugger(id)?.set_breakpoints(breakpoints);
        Ok(())
    }

    pub fn query(&self, id: &str, query: DebugQuery) -> DebuggerResult<QueryReceiver> {
        self.session.debugger(id)?.query(query)
    }

    /// Ask every agent to stop at its next visible checkpoint. Does not wait.
    pub fn global_breakpoint(&self) -> usize {
        let agents = self.session.agents();
        for agent in &agents {
            agent.debugger.request_global_breakpoint();
        }
        agents.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_registration_wins() {
        let session = DebugSession::new();
        let first = session.create_debugger("a1");
        let second = session.create_debugger("a1");
        session.register("a1", EntityKind::Agent, first.clone(), None);
        let entry = session.register("a1", EntityKind::Environment, second, None);
        assert!(Arc::ptr_eq(&entry.debugger, &first));
        assert_eq!(entry.kind, EntityKind::Agent);
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_single_main_controller() {
        let session = DebugSession::new();
        assert!(session.main_controller("ide").is_ok());
        assert!(session.main_controller("ide").is_ok());
        assert!(matches!(
            session.main_controller("other"),
            Err(DebuggerError::NotMainDebugger(_))
        ));
    }

    #[test]
    fn test_close_happens_once() {
        let session = DebugSession::new();
        let dbg = session.create_debugger("a1");
        session.register("a1", EntityKind::Agent, dbg.clone(), None);
        assert!(session.close());
        assert!(!session.close());
        assert!(dbg.is_killed());
        assert!(session.is_empty());
    }

    #[test]
    fn test_overall_run_mode_merges() {
        let session = DebugSession::new();
        let a = session.create_debugger("a");
        let b = session.create_debugger("b");
        session.register("a", EntityKind::Agent, a, None);
        session.register("b", EntityKind::Agent, b.clone(), None);
        assert_eq!(session.overall_run_mode(), RunMode::Running);
        b.pause();
        assert_eq!(session.overall_run_mode(), RunMode::Paused);
    }

    #[test]
    fn test_created_debuggers_get_pause_channels() {
        let session = DebugSession::with_pause_channels(vec![Channel::Print, Channel::RunMode]);
        let dbg = session.create_debugger("a");
        assert_eq!(dbg.pause_channels(), vec![Channel::Print]);
    }

    #[tokio::test]
    async fn test_wait_for_registration() {
        let session = DebugSession::new();
        let waiting = {
            let session = session.clone();
            tokio::spawn(async move {
                session
                    .wait_for_registration("env", Duration::from_secs(5))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let dbg = session.create_debugger("env");
        session.register("env", EntityKind::Environment, dbg, None);
        let entry = waiting.await.unwrap().unwrap();
        assert_eq!(entry.kind, EntityKind::Environment);

        let missing = session
            .wait_for_registration("nobody", Duration::from_millis(20))
            .await;
        assert!(matches!(missing, Err(DebuggerError::Timeout(_))));
        assert!(session.waiters.is_empty());
    }

    #[tokio::test]
    async fn test_timed_out_waiter_leaves_others_waiting() {
        let session = DebugSession::new();
        let patient = {
            let session = session.clone();
            tokio::spawn(async move {
                session
                    .wait_for_registration("late", Duration::from_secs(5))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let impatient = session
            .wait_for_registration("late", Duration::from_millis(10))
            .await;
        assert!(impatient.is_err());
        assert_eq!(session.waiters.get("late").map(|w| w.len()), Some(1));

        let dbg = session.create_debugger("late");
        session.register("late", EntityKind::Agent, dbg, None);
        assert!(patient.await.unwrap().is_ok());
        assert!(session.waiters.is_empty());
    }
}
