//! In-process message bus with topic-scoped publish/subscribe.
//!
//! Each vehicle gets one topic; the payload is the decoded [`Message`],
//! which serializes to a self-describing record, so consumers never touch
//! the binary layout. Delivery is in order per publisher; a subscriber that
//! falls behind observes a gap rather than stalling the receive loop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::protocol::Message;

/// Per-topic channel depth. A slow subscriber past this many messages lags
/// and skips ahead.
const TOPIC_DEPTH: usize = 256;

/// Topic-keyed fan-out of decoded messages.
#[derive(Debug, Default)]
pub struct LocalBus {
    topics: Mutex<HashMap<String, broadcast::Sender<Arc<Message>>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical topic name for a vehicle identity.
    pub fn topic_for(vehicle: Uuid) -> String {
        format!("vehicles/{vehicle}")
    }

    /// Get (or create) the publisher handle for a topic.
    pub fn bind(&self, topic: &str) -> broadcast::Sender<Arc<Message>> {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_DEPTH).0)
            .clone()
    }

    /// Publish an existing channel under an additional topic name,
    /// replacing whatever channel the name pointed at before.
    ///
    /// Used to alias a link-scoped topic to its vehicle topic once the
    /// vehicle identity is known. Receivers taken from the replaced
    /// channel stay on that channel; only new subscriptions see the
    /// attached one, so alias topics should be attached before anyone
    /// subscribes to them.
    pub fn attach(&self, topic: &str, sender: broadcast::Sender<Arc<Message>>) {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        topics.insert(topic.to_string(), sender);
    }

    /// Subscribe to a topic as a stream of decoded messages.
    ///
    /// Subscribing to a topic nobody has bound yet is allowed; messages
    /// start flowing once a publisher binds the same name.
    pub fn subscribe(&self, topic: &str) -> BroadcastStream<Arc<Message>> {
        BroadcastStream::new(self.bind(topic).subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Heartbeat, MessagePayload};
    use crate::types::MessageId;
    use futures::StreamExt;

    fn message(sequence: u8) -> Arc<Message> {
        Arc::new(Message {
            id: MessageId::HEARTBEAT,
            sequence,
            system_id: 1,
            component_id: 1,
            payload: MessagePayload::Heartbeat(Heartbeat::ground_station()),
        })
    }

    #[tokio::test]
    async fn per_topic_ordering_is_preserved() {
        let bus = LocalBus::new();
        let publisher = bus.bind("vehicles/a");
        let mut stream = bus.subscribe("vehicles/a");

        for seq in 0..5 {
            publisher.send(message(seq)).unwrap();
        }
        for seq in 0..5 {
            let got = stream.next().await.unwrap().unwrap();
            assert_eq!(got.sequence, seq);
        }
    }

    #[tokio::test]
    async fn attach_aliases_the_same_channel() {
        let bus = LocalBus::new();
        let publisher = bus.bind("links/mem0");
        bus.attach("vehicles/a", publisher.clone());

        let mut stream = bus.subscribe("vehicles/a");
        publisher.send(message(7)).unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().sequence, 7);
    }

    #[tokio::test]
    async fn topics_are_independent() {
        let bus = LocalBus::new();
        let a = bus.bind("vehicles/a");
        let mut b_stream = bus.subscribe("vehicles/b");

        a.send(message(1)).unwrap();
        // Nothing published on b; the stream must stay pending.
        let pending =
            tokio::time::timeout(std::time::Duration::from_millis(10), b_stream.next()).await;
        assert!(pending.is_err());
    }
}
