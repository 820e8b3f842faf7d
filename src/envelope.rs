// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Envelopes and Stamps
//!
//! An `Envelope` is the message handed around by the owning framework: an opaque
//! payload plus an ordered list of stamps. The transport only reads and writes the
//! stamp kinds declared here and never looks into the payload.

use crate::client::PubSubMessage;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Discriminant of a `Stamp`, used for typed lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StampKind {
    OrderingKey,
    Attributes,
    Redelivery,
    Received,
    SenderOptions,
}

/// Metadata attached to an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Stamp {
    /// Same-key messages are delivered in publish order.
    OrderingKey(String),
    /// Pub/Sub message attributes, set on publish and filled on receive.
    Attributes(HashMap<String, String>),
    /// Added by the framework when it retries a failed message.
    Redelivery { retry_count: u32 },
    /// Reference to the pulled message, required by ack/reject/keepalive.
    Received(ReceivedMessage),
    /// Ad-hoc options forwarded to the publish call.
    SenderOptions(Map<String, Value>),
}

impl Stamp {
    pub fn kind(&self) -> StampKind {
        match self {
            Stamp::OrderingKey(_) => StampKind::OrderingKey,
            Stamp::Attributes(_) => StampKind::Attributes,
            Stamp::Redelivery { .. } => StampKind::Redelivery,
            Stamp::Received(_) => StampKind::Received,
            Stamp::SenderOptions(_) => StampKind::SenderOptions,
        }
    }
}

/// A pulled Pub/Sub message together with the dead-letter policy of the
/// subscription it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub message: PubSubMessage,
    pub max_delivery_attempts: Option<i64>,
    pub dead_letter_topic: Option<String>,
}

impl ReceivedMessage {
    /// Reads `deadLetterPolicy.{maxDeliveryAttempts,deadLetterTopic}` out of the
    /// subscription options.
    pub fn new(message: PubSubMessage, subscription_options: &Map<String, Value>) -> Self {
        let policy = subscription_options
            .get("deadLetterPolicy")
            .and_then(Value::as_object);

        ReceivedMessage {
            message,
            max_delivery_attempts: policy
                .and_then(|p| p.get("maxDeliveryAttempts"))
                .and_then(Value::as_i64),
            dead_letter_topic: policy
                .and_then(|p| p.get("deadLetterTopic"))
                .and_then(Value::as_str)
                .map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    message: Value,
    stamps: Vec<Stamp>,
}

impl Envelope {
    pub fn new(message: Value) -> Envelope {
        Envelope {
            message,
            stamps: vec![],
        }
    }

    /// Returns a copy of the envelope with `stamp` appended.
    pub fn with(mut self, stamp: Stamp) -> Self {
        self.stamps.push(stamp);
        self
    }

    pub fn message(&self) -> &Value {
        &self.message
    }

    pub fn stamps(&self) -> &[Stamp] {
        &self.stamps
    }

    /// Last stamp of the given kind.
    pub fn last(&self, kind: StampKind) -> Option<&Stamp> {
        self.stamps.iter().rev().find(|s| s.kind() == kind)
    }

    pub fn all(&self, kind: StampKind) -> impl Iterator<Item = &Stamp> {
        self.stamps.iter().filter(move |s| s.kind() == kind)
    }

    pub fn ordering_key(&self) -> Option<&str> {
        match self.last(StampKind::OrderingKey) {
            Some(Stamp::OrderingKey(key)) => Some(key),
            _ => None,
        }
    }

    pub fn attributes(&self) -> Option<&HashMap<String, String>> {
        match self.last(StampKind::Attributes) {
            Some(Stamp::Attributes(attributes)) => Some(attributes),
            _ => None,
        }
    }

    pub fn is_redelivered(&self) -> bool {
        self.last(StampKind::Redelivery).is_some()
    }

    pub fn received(&self) -> Option<&ReceivedMessage> {
        match self.last(StampKind::Received) {
            Some(Stamp::Received(received)) => Some(received),
            _ => None,
        }
    }

    pub fn sender_options(&self) -> Option<&Map<String, Value>> {
        match self.last(StampKind::SenderOptions) {
            Some(Stamp::SenderOptions(options)) => Some(options),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn last_returns_most_recent_stamp_of_kind() {
        let envelope = Envelope::new(json!({"id": 1}))
            .with(Stamp::OrderingKey("first".to_owned()))
            .with(Stamp::Redelivery { retry_count: 1 })
            .with(Stamp::OrderingKey("second".to_owned()));

        assert_eq!(envelope.ordering_key(), Some("second"));
        assert_eq!(envelope.all(StampKind::OrderingKey).count(), 2);
        assert!(envelope.is_redelivered());
        assert!(envelope.received().is_none());
        assert!(envelope.attributes().is_none());
    }

    #[test]
    fn received_message_reads_dead_letter_policy() {
        let options = json!({
            "deadLetterPolicy": {
                "deadLetterTopic": "projects/p/topics/dead",
                "maxDeliveryAttempts": 5
            }
        });

        let received =
            ReceivedMessage::new(PubSubMessage::default(), options.as_object().unwrap());

        assert_eq!(received.max_delivery_attempts, Some(5));
        assert_eq!(
            received.dead_letter_topic.as_deref(),
            Some("projects/p/topics/dead")
        );

        let received = ReceivedMessage::new(PubSubMessage::default(), &Map::new());
        assert_eq!(received.max_delivery_attempts, None);
        assert_eq!(received.dead_letter_topic, None);
    }
}
