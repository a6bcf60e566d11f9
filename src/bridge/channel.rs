//! Outbound channel to the background script context.
//!
//! Payloads submitted before the background signals `ready` are held in a
//! FIFO queue and flushed, in order, exactly once on the transition. The
//! transition is one-way.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;

use crate::host::BackgroundEngine;

/// Readiness of the background context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Readiness {
    #[default]
    NotReady,
    Ready,
}

/// What happened to a payload handed to [`BackgroundChannel::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    Sent,
    /// The payload could not be serialized and was dropped.
    Dropped,
}

pub struct BackgroundChannel {
    engine: Arc<dyn BackgroundEngine>,
    entry_point: String,
    readiness: Readiness,
    pending: VecDeque<String>,
}

impl BackgroundChannel {
    pub fn new(engine: Arc<dyn BackgroundEngine>, entry_point: impl Into<String>) -> Self {
        Self {
            engine,
            entry_point: entry_point.into(),
            readiness: Readiness::NotReady,
            pending: VecDeque::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.readiness == Readiness::Ready
    }

    /// Number of payloads waiting for readiness.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Serialize `payload` and send it, or queue it until ready.
    pub fn send<T: Serialize + ?Sized>(&mut self, payload: &T) -> SendOutcome {
        let json = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Dropping outbound payload that failed to serialize: {}", e);
                return SendOutcome::Dropped;
            }
        };

        match self.readiness {
            Readiness::NotReady => {
                self.pending.push_back(json);
                SendOutcome::Queued
            }
            Readiness::Ready => {
                self.transmit(json);
                SendOutcome::Sent
            }
        }
    }

    /// Mark the background ready and flush the queue. Returns the number of
    /// payloads flushed; zero if already ready.
    pub fn on_ready(&mut self) -> usize {
        if self.readiness == Readiness::Ready {
            return 0;
        }
        self.readiness = Readiness::Ready;

        let pending = std::mem::take(&mut self.pending);
        let flushed = pending.len();
        for json in pending {
            self.transmit(json);
        }

        tracing::info!("Background ready, flushed {} queued message(s)", flushed);
        flushed
    }

    /// Evaluate `json` through the entry point. Completion is only logged.
    fn transmit(&self, json: String) {
        let script = format!("{}({});", self.entry_point, json);
        self.engine.execute(
            script,
            Box::new(|outcome| match outcome {
                Ok(result) => tracing::trace!("Background dispatch completed: {}", result),
                Err(e) => tracing::warn!("Background dispatch failed: {}", e),
            }),
        );
    }
}

impl std::fmt::Debug for BackgroundChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundChannel")
            .field("entry_point", &self.entry_point)
            .field("readiness", &self.readiness)
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RecordingHost;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn channel() -> (Arc<RecordingHost>, BackgroundChannel) {
        let host = Arc::new(RecordingHost::new());
        let channel = BackgroundChannel::new(host.clone(), "dispatch");
        (host, channel)
    }

    #[test]
    fn test_queues_until_ready_then_flushes_in_order() {
        let (host, mut channel) = channel();

        assert_eq!(channel.send(&json!({"m": 1})), SendOutcome::Queued);
        assert_eq!(channel.send(&json!({"m": 2})), SendOutcome::Queued);
        assert_eq!(channel.send(&json!({"m": 3})), SendOutcome::Queued);
        assert!(host.scripts().is_empty());
        assert_eq!(channel.pending_len(), 3);

        assert_eq!(channel.on_ready(), 3);
        assert_eq!(
            host.scripts(),
            vec![
                r#"dispatch({"m":1});"#,
                r#"dispatch({"m":2});"#,
                r#"dispatch({"m":3});"#,
            ]
        );
        assert_eq!(channel.pending_len(), 0);
    }

    #[test]
    fn test_ready_is_idempotent() {
        let (host, mut channel) = channel();
        channel.send(&json!({"m": 1}));

        assert_eq!(channel.on_ready(), 1);
        assert_eq!(channel.on_ready(), 0);
        assert_eq!(host.scripts().len(), 1);
        assert!(channel.is_ready());
    }

    #[test]
    fn test_sends_immediately_once_ready() {
        let (host, mut channel) = channel();
        channel.on_ready();

        assert_eq!(channel.send(&json!({"m": 4})), SendOutcome::Sent);
        assert_eq!(host.scripts(), vec![r#"dispatch({"m":4});"#]);
        assert_eq!(channel.pending_len(), 0);
    }

    #[test]
    fn test_engine_failure_does_not_change_state() {
        let (host, mut channel) = channel();
        host.fail_scripts(true);
        channel.on_ready();

        assert_eq!(channel.send(&json!({"m": 5})), SendOutcome::Sent);
        assert_eq!(channel.send(&json!({"m": 6})), SendOutcome::Sent);
        assert!(channel.is_ready());
        assert_eq!(host.scripts().len(), 2);
    }

    #[test]
    fn test_unserializable_payload_is_dropped() {
        let (host, mut channel) = channel();
        // Non-string map keys cannot become JSON object keys.
        let mut bad = BTreeMap::new();
        bad.insert(vec![1u8], 1);

        assert_eq!(channel.send(&bad), SendOutcome::Dropped);
        assert_eq!(channel.pending_len(), 0);

        channel.on_ready();
        assert!(host.scripts().is_empty());
    }
}
