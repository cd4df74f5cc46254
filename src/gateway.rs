// FILE: src/gateway.rs
//! Gateway: fans index mutations out to connected clients.
//!
//! Built on a bounded broadcast channel. Publishing never waits on a
//! subscriber; a subscriber that falls more than `capacity` messages behind
//! is dropped instead of slowing the store down.

use crate::identity::FileId;
use crate::record::FileRecord;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

pub const DEFAULT_CAPACITY: usize = 1024;

/// Messages pushed to clients over the streaming channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Connected {
        #[serde(rename = "totalFiles")]
        total_files: usize,
    },
    FileAdded {
        file: FileRecord,
    },
    FileRemoved {
        id: FileId,
    },
    ScanComplete {
        #[serde(rename = "totalFiles")]
        total_files: usize,
    },
}

impl ClientMessage {
    pub fn to_json(&self) -> String {
        // Every variant is plain data; serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct Gateway {
    sender: broadcast::Sender<ClientMessage>,
}

impl Gateway {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription { receiver: self.sender.subscribe() }
    }

    /// Returns how many subscribers were handed the message.
    pub fn publish(&self, message: ClientMessage) -> usize {
        // An error only means nobody is listening right now
        self.sender.send(message).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

pub struct Subscription {
    receiver: broadcast::Receiver<ClientMessage>,
}

impl Subscription {
    /// Next message, or `None` once this subscriber has been dropped from the
    /// fan-out (it lagged behind) or the gateway is gone.
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        match self.receiver.recv().await {
            Ok(message) => Some(message),
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!("[Gateway] Subscriber lagged by {} messages, dropping it", missed);
                None
            }
            Err(RecvError::Closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_record;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_publish_and_receive_message() {
        let gateway = Gateway::new(8);
        let mut sub = gateway.subscribe();

        assert_eq!(gateway.publish(ClientMessage::FileRemoved { id: "abc".into() }), 1);

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("recv");
        assert_eq!(received, ClientMessage::FileRemoved { id: "abc".into() });
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_message() {
        let gateway = Gateway::new(8);
        let mut sub1 = gateway.subscribe();
        let mut sub2 = gateway.subscribe();
        assert_eq!(gateway.subscriber_count(), 2);

        gateway.publish(ClientMessage::ScanComplete { total_files: 3 });

        assert_eq!(sub1.recv().await, Some(ClientMessage::ScanComplete { total_files: 3 }));
        assert_eq!(sub2.recv().await, Some(ClientMessage::ScanComplete { total_files: 3 }));
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let gateway = Gateway::new(8);
        assert_eq!(gateway.publish(ClientMessage::Connected { total_files: 0 }), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_is_dropped() {
        let gateway = Gateway::new(2);
        let mut slow = gateway.subscribe();
        for n in 0..5 {
            gateway.publish(ClientMessage::ScanComplete { total_files: n });
        }
        assert_eq!(slow.recv().await, None);
    }

    #[test]
    fn test_message_wire_shapes() {
        let connected = serde_json::to_value(ClientMessage::Connected { total_files: 7 }).unwrap();
        assert_eq!(connected, serde_json::json!({ "type": "connected", "totalFiles": 7 }));

        let removed = serde_json::to_value(ClientMessage::FileRemoved { id: "0123".into() }).unwrap();
        assert_eq!(removed, serde_json::json!({ "type": "file-removed", "id": "0123" }));

        let done = serde_json::to_value(ClientMessage::ScanComplete { total_files: 2 }).unwrap();
        assert_eq!(done, serde_json::json!({ "type": "scan-complete", "totalFiles": 2 }));

        let added = ClientMessage::FileAdded { file: test_record("/x/a.txt", 500) };
        let json = serde_json::to_value(&added).unwrap();
        assert_eq!(json["type"], "file-added");
        assert_eq!(json["file"]["name"], "a.txt");
        assert_eq!(json["file"]["type"], "text");
    }
}
