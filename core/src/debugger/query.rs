use crate::errors::{DebuggerError, DebuggerResult};
use crate::kr::{MentalStateCondition, Term};
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;

/// A question a controller asks about an agent's state.
#[derive(Debug, Clone, PartialEq)]
pub enum DebugQuery {
    /// All answers of a mental-state condition
    Evaluate(MentalStateCondition),
    /// Serialized snapshot of the mental state and recent history
    HistoryState,
    /// Why was this action executed
    WhyAction(Term),
    /// Why was this action not executed
    WhyNotAction(Term),
}

impl fmt::Display for DebugQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebugQuery::Evaluate(c) => write!(f, "evaluate {}", c),
            DebugQuery::HistoryState => write!(f, "history state"),
            DebugQuery::WhyAction(a) => write!(f, "why {}", a),
            DebugQuery::WhyNotAction(a) => write!(f, "why not {}", a),
        }
    }
}

/// Whatever can answer queries on the agent thread, typically the run state.
pub trait QueryTarget {
    fn answer(&mut self, query: &DebugQuery) -> Result<String, String>;
}

/// Target for checkpoints raised where no agent state is at hand.
pub struct NoQueries;

impl QueryTarget for NoQueries {
    fn answer(&mut self, query: &DebugQuery) -> Result<String, String> {
        Err(format!("cannot answer {} here", query))
    }
}

pub(crate) type QueryReply = Result<String, DebuggerError>;

pub(crate) struct PendingQuery {
    pub query: DebugQuery,
    pub reply: oneshot::Sender<QueryReply>,
}

impl PendingQuery {
    pub fn answer(self, target: &mut dyn QueryTarget, agent: &str) {
        let reply = target
            .answer(&self.query)
            .map_err(DebuggerError::QueryFailed);
        if self.reply.send(reply).is_err() {
            tracing::debug!("Query requester for {} went away before the answer", agent);
        }
    }

    pub fn refuse(self, error: DebuggerError) {
        let _ = self.reply.send(Err(error));
    }
}

/// One-shot handle on a query answer.
pub struct QueryReceiver {
    agent: String,
    rx: oneshot::Receiver<QueryReply>,
}

impl QueryReceiver {
    pub(crate) fn new(agent: &str, rx: oneshot::Receiver<QueryReply>) -> Self {
        Self {
            agent: agent.to_string(),
            rx,
        }
    }

    /// Wait for the answer, giving up after `timeout`.
    pub async fn recv(self, timeout: Duration) -> DebuggerResult<String> {
        let agent = self.agent;
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(DebuggerError::QueryFailed(format!(
                "{} stopped before answering",
                agent
            ))),
            Err(_) => Err(DebuggerError::Timeout(format!("query answer from {}", agent))),
        }
    }

    /// Block the calling thread until the answer arrives. Not for use inside a runtime.
    pub fn blocking_recv(self) -> DebuggerResult<String> {
        let agent = self.agent;
        self.rx.blocking_recv().unwrap_or_else(|_| {
            Err(DebuggerError::QueryFailed(format!(
                "{} stopped before answering",
                agent
            )))
        })
    }
}
