// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Messenger Abstractions
//!
//! Interfaces the owning message bus uses to talk to a transport: sending,
//! receiving, acknowledging and provisioning. The Pub/Sub sender, receiver and
//! transport implement these traits; the serializer is provided by the bus.

use crate::{envelope::Envelope, errors::GpsError};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Serialized form of an envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedEnvelope {
    pub body: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

/// Converts envelopes to and from their serialized form.
pub trait Serializer: Send + Sync {
    fn encode(&self, envelope: &Envelope) -> Result<EncodedEnvelope, GpsError>;

    fn decode(&self, encoded: EncodedEnvelope) -> Result<Envelope, GpsError>;
}

/// Serializer storing the message value as a JSON body, without headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn encode(&self, envelope: &Envelope) -> Result<EncodedEnvelope, GpsError> {
        Ok(EncodedEnvelope {
            body: envelope.message().to_string(),
            headers: HashMap::default(),
        })
    }

    fn decode(&self, encoded: EncodedEnvelope) -> Result<Envelope, GpsError> {
        serde_json::from_str(&encoded.body)
            .map(Envelope::new)
            .map_err(|err| GpsError::DecodingError(err.to_string()))
    }
}

#[async_trait]
pub trait Sender: Send + Sync {
    /// Sends the envelope, returning it unchanged.
    async fn send(&self, envelope: Envelope) -> Result<Envelope, GpsError>;
}

#[async_trait]
pub trait Receiver: Send + Sync {
    /// Lazily pulls one batch of messages.
    ///
    /// Nothing is requested from the service until the stream is polled.
    fn get(&self) -> BoxStream<'_, Result<Envelope, GpsError>>;

    async fn ack(&self, envelope: &Envelope) -> Result<(), GpsError>;

    async fn reject(&self, envelope: &Envelope) -> Result<(), GpsError>;
}

#[async_trait]
pub trait KeepaliveReceiver: Receiver {
    /// Extends the acknowledgement deadline of a message still being handled.
    async fn keepalive(&self, envelope: &Envelope, seconds: Option<u32>) -> Result<(), GpsError>;
}

#[async_trait]
pub trait SetupableTransport: Send + Sync {
    async fn setup(&self) -> Result<(), GpsError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_serializer_round_trips_message() {
        let envelope = Envelope::new(json!({"name": "order", "qty": 2}));

        let encoded = JsonSerializer.encode(&envelope).unwrap();
        assert!(encoded.headers.is_empty());

        let decoded = JsonSerializer.decode(encoded).unwrap();
        assert_eq!(decoded.message(), envelope.message());
    }

    #[test]
    fn json_serializer_rejects_invalid_body() {
        let err = JsonSerializer
            .decode(EncodedEnvelope {
                body: "{not json".to_owned(),
                headers: HashMap::default(),
            })
            .unwrap_err();

        assert!(matches!(err, GpsError::DecodingError(_)));
    }

    #[test]
    fn encoded_envelope_omits_empty_headers() {
        let encoded = EncodedEnvelope {
            body: "{}".to_owned(),
            headers: HashMap::default(),
        };

        assert_eq!(serde_json::to_string(&encoded).unwrap(), r#"{"body":"{}"}"#);
    }
}
