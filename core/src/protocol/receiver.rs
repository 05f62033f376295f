//! Correlation of solicited replies with the requests waiting for them.
//!
//! At most one request per `(kind, agent)` is outstanding. A reply fulfils
//! that request exactly once; a reply nobody waits for is an error.

use crate::errors::{ProtocolError, ProtocolResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyKind {
    Eval,
    HistoryState,
    /// Answers to both WHY_ACTION and WHY_NOT_ACTION
    Explanation,
}

impl fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplyKind::Eval => "EVAL",
            ReplyKind::HistoryState => "HISTORY_STATE",
            ReplyKind::Explanation => "WHY",
        };
        write!(f, "{}", name)
    }
}

/// Handle of one outstanding request.
pub struct ReplyReceiver {
    kind: ReplyKind,
    agent: String,
    rx: oneshot::Receiver<String>,
}

impl ReplyReceiver {
    pub fn kind(&self) -> ReplyKind {
        self.kind
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub async fn recv(self, timeout: Duration) -> ProtocolResult<String> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(ProtocolError::ReplyDropped),
            Err(_) => Err(ProtocolError::Timeout),
        }
    }
}

#[derive(Default)]
pub struct PendingReplies {
    slots: Mutex<HashMap<(ReplyKind, String), oneshot::Sender<String>>>,
}

impl PendingReplies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the slot for a request. Fails while a live request of the same kind
    /// for the same agent is still waiting.
    pub fn expect(&self, kind: ReplyKind, agent: &str) -> ProtocolResult<ReplyReceiver> {
        let mut slots = self.slots.lock();
        let key = (kind, agent.to_string());
        if let Some(existing) = slots.get(&key) {
            if !existing.is_closed() {
                return Err(ProtocolError::DuplicateRequest {
                    kind: kind.to_string(),
                    agent: agent.to_string(),
                });
            }
        }
        let (tx, rx) = oneshot::channel();
        slots.insert(key, tx);
        Ok(ReplyReceiver {
            kind,
            agent: agent.to_string(),
            rx,
        })
    }

    /// Deliver a reply. Rejected if nothing is outstanding, which includes a
    /// second reply to an already fulfilled request.
    pub fn fulfill(&self, kind: ReplyKind, agent: &str, value: String) -> ProtocolResult<()> {
        let sender = self.slots.lock().remove(&(kind, agent.to_string()));
        let unmatched = || ProtocolError::UnmatchedReply {
            kind: kind.to_string(),
            agent: agent.to_string(),
        };
        match sender {
            Some(tx) => tx.send(value).map_err(|_| unmatched()),
            None => Err(unmatched()),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.slots.lock().values().filter(|tx| !tx.is_closed()).count()
    }

    /// Drop every outstanding request; waiters see `ReplyDropped`.
    pub fn cancel_all(&self) {
        self.slots.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fulfil_once() {
        let pending = PendingReplies::new();
        let rx = pending.expect(ReplyKind::Eval, "a1").unwrap();
        pending.fulfill(ReplyKind::Eval, "a1", "true".into()).unwrap();
        assert_eq!(rx.recv(Duration::from_secs(1)).await.unwrap(), "true");
        assert!(matches!(
            pending.fulfill(ReplyKind::Eval, "a1", "again".into()),
            Err(ProtocolError::UnmatchedReply { .. })
        ));
    }

    #[test]
    fn test_unsolicited_reply_rejected() {
        let pending = PendingReplies::new();
        assert!(pending
            .fulfill(ReplyKind::HistoryState, "a1", "{}".into())
            .is_err());
    }

    #[test]
    fn test_duplicate_request_rejected_until_abandoned() {
        let pending = PendingReplies::new();
        let first = pending.expect(ReplyKind::Explanation, "a1").unwrap();
        assert!(matches!(
            pending.expect(ReplyKind::Explanation, "a1"),
            Err(ProtocolError::DuplicateRequest { .. })
        ));
        // another agent or kind is independent
        assert!(pending.expect(ReplyKind::Explanation, "a2").is_ok());
        assert!(pending.expect(ReplyKind::Eval, "a1").is_ok());
        drop(first);
        assert!(pending.expect(ReplyKind::Explanation, "a1").is_ok());
    }

    #[tokio::test]
    async fn test_cancel_all_wakes_waiters() {
        let pending = PendingReplies::new();
        let rx = pending.expect(ReplyKind::Eval, "a1").unwrap();
        pending.cancel_all();
        assert!(matches!(
            rx.recv(Duration::from_secs(1)).await,
            Err(ProtocolError::ReplyDropped)
        ));
    }
}
