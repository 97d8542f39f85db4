//! Pending call table
//!
//! Correlates agent replies with the calls that are waiting for them. Each
//! entry is removed exactly once: either [`PendingCalls::resolve`] takes it
//! and fulfils the call, or the waiting side takes it back on timeout. The
//! loser of that race finds nothing to remove and does nothing.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Terminal state of a call
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// The agent replied
    Completed(Value),
    /// The deadline elapsed first
    TimedOut,
    /// The table was cleared because the link was closed
    Abandoned,
}

/// Maps call id to the one-shot slot of the waiting caller
#[derive(Clone, Default)]
pub struct PendingCalls {
    calls: Arc<Mutex<HashMap<String, oneshot::Sender<Value>>>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<Value>>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a call before its request is transmitted
    pub fn register(&self, call_id: &str) -> PendingCall {
        let (tx, rx) = oneshot::channel();
        self.table().insert(call_id.to_string(), tx);
        trace!(call_id, "registered pending call");

        PendingCall {
            call_id: call_id.to_string(),
            reply: rx,
            table: self.clone(),
        }
    }

    /// Deliver a reply. Returns false for unknown or already settled ids.
    pub fn resolve(&self, call_id: &str, reply: Value) -> bool {
        // Fulfilled under the lock so a timed-out waiter that loses the
        // removal race is guaranteed to find the value already sent.
        let mut table = self.table();
        match table.remove(call_id) {
            Some(tx) => {
                if tx.send(reply).is_err() {
                    debug!(call_id, "caller went away before reply was delivered");
                    return false;
                }
                true
            }
            None => false,
        }
    }

    /// Remove a call without fulfilling it. Returns false if it was already gone.
    pub fn expire(&self, call_id: &str) -> bool {
        self.table().remove(call_id).is_some()
    }

    /// Drop every entry; their callers observe [`CallOutcome::Abandoned`].
    pub fn clear(&self) -> usize {
        let mut table = self.table();
        let released = table.len();
        table.clear();
        released
    }

    pub fn contains(&self, call_id: &str) -> bool {
        self.table().contains_key(call_id)
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The waiting side of one registered call.
///
/// Dropping it without waiting removes the entry, so cancelled callers never
/// leave stale rows behind.
pub struct PendingCall {
    call_id: String,
    reply: oneshot::Receiver<Value>,
    table: PendingCalls,
}

impl PendingCall {
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Wait for the reply or the deadline, whichever settles the call first
    pub async fn wait(mut self, deadline: Duration) -> CallOutcome {
        match tokio::time::timeout(deadline, &mut self.reply).await {
            Ok(Ok(reply)) => CallOutcome::Completed(reply),
            Ok(Err(_)) => CallOutcome::Abandoned,
            Err(_) => {
                if self.table.expire(&self.call_id) {
                    return CallOutcome::TimedOut;
                }
                // The deliverer removed the entry first; its value is already in the slot.
                match self.reply.try_recv() {
                    Ok(reply) => CallOutcome::Completed(reply),
                    Err(_) => CallOutcome::Abandoned,
                }
            }
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.table.expire(&self.call_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_resolve() {
        let calls = PendingCalls::new();
        let call = calls.register("a");
        assert_eq!(calls.len(), 1);

        assert!(calls.resolve("a", json!({"id": "a", "code": 0})));
        assert!(calls.is_empty());

        let outcome = call.wait(Duration::from_secs(1)).await;
        assert_eq!(outcome, CallOutcome::Completed(json!({"id": "a", "code": 0})));
    }

    #[tokio::test]
    async fn test_timeout_removes_entry() {
        let calls = PendingCalls::new();
        let call = calls.register("slow");

        let outcome = call.wait(Duration::from_millis(20)).await;
        assert_eq!(outcome, CallOutcome::TimedOut);
        assert!(!calls.contains("slow"));
    }

    #[tokio::test]
    async fn test_late_reply_is_noop() {
        let calls = PendingCalls::new();
        let call = calls.register("late");
        assert_eq!(call.wait(Duration::from_millis(10)).await, CallOutcome::TimedOut);

        assert!(!calls.resolve("late", json!({"id": "late"})));
        assert!(calls.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_id_dropped() {
        let calls = PendingCalls::new();
        assert!(!calls.resolve("nobody", json!({"id": "nobody"})));
    }

    #[tokio::test]
    async fn test_double_resolve() {
        let calls = PendingCalls::new();
        let call = calls.register("x");

        assert!(calls.resolve("x", json!(1)));
        assert!(!calls.resolve("x", json!(2)));
        assert_eq!(
            call.wait(Duration::from_secs(1)).await,
            CallOutcome::Completed(json!(1))
        );
    }

    #[tokio::test]
    async fn test_deliverer_wins_after_deadline() {
        let calls = PendingCalls::new();
        let mut call = calls.register("race");

        // Reply lands, but the waiter only checks after its deadline.
        assert!(calls.resolve("race", json!("won")));
        assert!(!calls.expire("race"));
        assert_eq!(call.reply.try_recv().unwrap(), json!("won"));
    }

    #[tokio::test]
    async fn test_clear_abandons_callers() {
        let calls = PendingCalls::new();
        let first = calls.register("1");
        let second = calls.register("2");

        assert_eq!(calls.clear(), 2);
        assert_eq!(
            first.wait(Duration::from_secs(1)).await,
            CallOutcome::Abandoned
        );
        assert_eq!(
            second.wait(Duration::from_secs(1)).await,
            CallOutcome::Abandoned
        );
    }

    #[tokio::test]
    async fn test_dropping_call_cleans_up() {
        let calls = PendingCalls::new();
        {
            let _call = calls.register("dropped");
            assert_eq!(calls.len(), 1);
        }
        assert!(calls.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_register_and_resolve() {
        let calls = PendingCalls::new();
        let mut handles = vec![];

        for i in 0..20 {
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("call-{}", i);
                let call = calls.register(&id);
                let resolver = calls.clone();
                let reply_id = id.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    resolver.resolve(&reply_id, json!({ "id": reply_id }));
                });
                call.wait(Duration::from_secs(5)).await
            }));
        }

        for (i, handle) in handles.into_iter().enumerate() {
            let outcome = handle.await.unwrap();
            assert_eq!(
                outcome,
                CallOutcome::Completed(json!({ "id": format!("call-{}", i) }))
            );
        }
        assert!(calls.is_empty());
    }
}
