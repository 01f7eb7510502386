//! Notifier: uncorrelated, topic-tagged pushes to the host
//!
//! A second producer on the outbound queue. Pushes bypass the inbound queue and
//! the registry, and never wait on the egress loop.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{DispatchError, Result};
use crate::execution::codec::decode_payload;
use crate::execution::command::{CommandResult, Payload};

/// Cloneable handle for pushing notifications from inside handlers
#[derive(Debug, Clone)]
pub struct Notifier {
    outbound: mpsc::UnboundedSender<CommandResult>,
}

impl Notifier {
    pub(crate) fn new(outbound: mpsc::UnboundedSender<CommandResult>) -> Self {
        Self { outbound }
    }

    /// Decode `message` and push it under `topic` with a fresh id
    ///
    /// Undecodable messages are dropped and reported as [`DispatchError::Decode`].
    pub fn notify(&self, topic: &str, message: &[u8]) -> Result<()> {
        let payload = decode_payload(message).map_err(|e| {
            warn!(topic = %topic, error = %e, "Dropping undecodable notification");
            e
        })?;

        self.notify_payload(topic, payload)
    }

    /// Push an already-decoded payload under `topic`
    pub fn notify_payload(&self, topic: &str, payload: Payload) -> Result<()> {
        let notification = CommandResult::notification(topic, payload);
        debug!(topic = %topic, id = %notification.id, "Pushing notification");

        self.outbound
            .send(notification)
            .map_err(|_| DispatchError::ChannelClosed("outbound"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_notify_enqueues_topic_result() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = Notifier::new(tx);

        notifier
            .notify("didexchange_states", br#"{"state":"completed"}"#)
            .unwrap();

        let pushed = rx.recv().await.unwrap();
        assert_eq!(pushed.topic, "didexchange_states");
        assert!(!pushed.id.is_empty());
        assert!(!pushed.is_error);
        assert_eq!(pushed.payload.get("state"), Some(&json!("completed")));
    }

    #[tokio::test]
    async fn test_notify_drops_undecodable_message() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = Notifier::new(tx);

        let err = notifier.notify("topic", b"not json").unwrap_err();
        assert!(matches!(err, DispatchError::Decode(_)));

        drop(notifier);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_notify_after_egress_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let err = Notifier::new(tx).notify("topic", b"{}").unwrap_err();
        assert_eq!(err, DispatchError::ChannelClosed("outbound"));
    }
}
