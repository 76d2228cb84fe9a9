//! Append-only log of accepted greetings.
//!
//! Consumers either pull with [`EventLog::events_since`] or hold a
//! [`Subscription`] for push delivery. Dropping a subscription unsubscribes.

use chrono::{DateTime, Utc};
use greeter_crypto::{Accepted, FieldElement, Signal};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// A greeting as broadcast to the public.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetingEvent {
    /// Position in acceptance order, starting at 0.
    pub sequence: u64,
    /// Display text, with invalid UTF-8 replaced.
    pub message: String,
    /// The greeting exactly as signed.
    #[serde(with = "greeter_crypto::signal::message_hex")]
    pub payload: Vec<u8>,
    pub nullifier_hash: FieldElement,
    pub root: FieldElement,
    pub accepted_at: DateTime<Utc>,
}

pub struct EventLog {
    events: RwLock<Vec<GreetingEvent>>,
    sender: broadcast::Sender<GreetingEvent>,
}

impl EventLog {
    /// `buffer` bounds how far a live subscriber may fall behind.
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self {
            events: RwLock::new(Vec::new()),
            sender,
        }
    }

    /// Record an accepted signal and notify subscribers.
    pub fn append(&self, signal: &Signal, accepted: &Accepted) -> GreetingEvent {
        let mut events = self.events.write();
        let event = GreetingEvent {
            sequence: events.len() as u64,
            message: signal.message_text(),
            payload: signal.message.clone(),
            nullifier_hash: accepted.nullifier_hash,
            root: accepted.root,
            accepted_at: Utc::now(),
        };
        events.push(event.clone());
        // Sent under the lock so live order matches sequence order.
        let receivers = self.sender.send(event.clone()).unwrap_or(0);
        debug!(sequence = event.sequence, receivers, "Broadcast greeting");
        event
    }

    /// Events with `sequence >= from`, oldest first.
    pub fn events_since(&self, from: u64) -> Vec<GreetingEvent> {
        let events = self.events.read();
        let start = usize::try_from(from).unwrap_or(usize::MAX).min(events.len());
        events[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn subscribe(&self) -> Subscription {
        debug!("New greeting subscriber");
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Live feed of greetings accepted after the subscription was taken.
pub struct Subscription {
    receiver: broadcast::Receiver<GreetingEvent>,
}

impl Subscription {
    /// Wait for the next greeting. `None` once the relay is gone.
    ///
    /// A subscriber that falls more than the buffer behind skips the
    /// overwritten events; [`EventLog::events_since`] still has them.
    pub async fn recv(&mut self) -> Option<GreetingEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Greeting subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next greeting if one is already queued.
    pub fn try_recv(&mut self) -> Option<GreetingEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Greeting subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!("Greeting subscriber dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greeter_crypto::ProofBytes;

    fn accepted_signal(message: &str, n: u64) -> (Signal, Accepted) {
        let signal = Signal {
            message: message.as_bytes().to_vec(),
            root: FieldElement::from(1u64),
            nullifier_hash: FieldElement::from(n),
            proof: ProofBytes::from_vec(Vec::new()),
        };
        let accepted = Accepted {
            nullifier_hash: signal.nullifier_hash,
            external_nullifier: FieldElement::from(2u64),
            root: signal.root,
        };
        (signal, accepted)
    }

    #[test]
    fn test_sequence_and_pull() {
        let log = EventLog::new(8);
        for (i, text) in ["a", "b", "c"].iter().enumerate() {
            let (signal, accepted) = accepted_signal(text, i as u64);
            assert_eq!(log.append(&signal, &accepted).sequence, i as u64);
        }

        assert_eq!(log.len(), 3);
        let tail = log.events_since(1);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].message, "b");
        assert!(log.events_since(10).is_empty());
    }

    #[test]
    fn test_non_utf8_payload_preserved() {
        let log = EventLog::new(8);
        let (mut signal, accepted) = accepted_signal("", 0);
        signal.message = vec![0x68, 0x69, 0xff];
        let event = log.append(&signal, &accepted);

        assert_eq!(event.message, "hi\u{fffd}");
        assert_eq!(event.payload, vec![0x68, 0x69, 0xff]);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"], "0x6869ff");
        let back: GreetingEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[tokio::test]
    async fn test_subscribe_receives_in_order() {
        let log = EventLog::new(8);
        let mut sub = log.subscribe();
        assert_eq!(log.subscriber_count(), 1);

        for i in 0..3u64 {
            let (signal, accepted) = accepted_signal("hi", i);
            log.append(&signal, &accepted);
        }

        for i in 0..3u64 {
            let event = sub.recv().await.unwrap();
            assert_eq!(event.sequence, i);
        }
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let log = EventLog::new(8);
        let sub = log.subscribe();
        let other = log.subscribe();
        assert_eq!(log.subscriber_count(), 2);
        drop(sub);
        assert_eq!(log.subscriber_count(), 1);
        drop(other);
        assert_eq!(log.subscriber_count(), 0);

        // Appending without subscribers still records the event.
        let (signal, accepted) = accepted_signal("x", 0);
        log.append(&signal, &accepted);
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips() {
        let log = EventLog::new(2);
        let mut sub = log.subscribe();
        for i in 0..5u64 {
            let (signal, accepted) = accepted_signal("m", i);
            log.append(&signal, &accepted);
        }
        let event = sub.recv().await.unwrap();
        assert_eq!(event.sequence, 3);
        assert_eq!(log.events_since(0).len(), 5);
    }
}
