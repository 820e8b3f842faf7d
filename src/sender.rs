// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Pub/Sub Message Sender
//!
//! This module publishes envelopes to the configured topic. It implements the
//! `Sender` trait and propagates the OpenTelemetry context through message
//! attributes.

use crate::{
    client::{OutgoingMessage, PubSubClient},
    configuration::GpsConfiguration,
    encoding::EncodingStrategy,
    envelope::Envelope,
    errors::GpsError,
    messenger::{Sender, Serializer},
    otel,
};
use async_trait::async_trait;
use opentelemetry::Context;
use serde_json::Map;
use std::sync::Arc;
use tracing::{debug, error};

/// Pub/Sub implementation of the Sender trait.
pub struct GpsSender {
    client: Arc<dyn PubSubClient>,
    configuration: Arc<GpsConfiguration>,
    serializer: Arc<dyn Serializer>,
    encoding: EncodingStrategy,
}

impl GpsSender {
    /// Creates a new sender publishing to the configured topic.
    ///
    /// # Parameters
    /// * `client` - Client to the Pub/Sub service
    /// * `configuration` - Resolved transport configuration
    /// * `serializer` - Converts envelopes to and from their serialized form
    /// * `encoding` - How the serialized envelope maps onto message data and attributes
    ///
    /// # Returns
    /// A GpsSender instance
    pub fn new(
        client: Arc<dyn PubSubClient>,
        configuration: Arc<GpsConfiguration>,
        serializer: Arc<dyn Serializer>,
        encoding: EncodingStrategy,
    ) -> GpsSender {
        GpsSender {
            client,
            configuration,
            serializer,
            encoding,
        }
    }
}

#[async_trait]
impl Sender for GpsSender {
    /// Publishes the envelope to the configured topic.
    ///
    /// A redelivered envelope is not published again unless the message bus
    /// handles retries itself: the original message was never acknowledged, so
    /// Pub/Sub redelivers it according to the subscription retry policy.
    ///
    /// # Returns
    /// The envelope, unchanged
    async fn send(&self, envelope: Envelope) -> Result<Envelope, GpsError> {
        let encoded = self.serializer.encode(&envelope)?;
        let encoded = self.encoding.encode(&encoded)?;

        if !self.configuration.should_use_messenger_retry() && envelope.is_redelivered() {
            debug!(
                topic = self.configuration.topic_name(),
                "skipping publish of redelivered message"
            );
            return Ok(envelope);
        }

        let mut message = OutgoingMessage::new(encoded.data)
            .with_attributes(&otel::context_attributes(&Context::current()))
            .with_attributes(&encoded.attributes);

        if let Some(key) = envelope.ordering_key() {
            message = message.with_ordering_key(key);
        }

        if let Some(attributes) = envelope.attributes() {
            message = message.with_attributes(attributes);
        }

        let empty = Map::new();
        let options = envelope.sender_options().unwrap_or(&empty);

        match self
            .client
            .publish(self.configuration.topic_name(), message, options)
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    topic = self.configuration.topic_name(),
                    "error publishing message"
                );
                Err(GpsError::TransportError(err))
            }
            _ => Ok(envelope),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::MockPubSubClient, envelope::Stamp, errors::BackendError,
        messenger::JsonSerializer,
    };
    use serde_json::json;
    use std::collections::HashMap;

    fn sender(client: MockPubSubClient, cfg: GpsConfiguration) -> GpsSender {
        GpsSender::new(
            Arc::new(client),
            Arc::new(cfg),
            Arc::new(JsonSerializer),
            EncodingStrategy::Wrapped,
        )
    }

    #[tokio::test]
    async fn publishes_wrapped_body_to_topic() {
        let mut client = MockPubSubClient::new();
        client
            .expect_publish()
            .withf(|topic, message, options| {
                let data: serde_json::Value = serde_json::from_slice(&message.data).unwrap();
                topic == "orders"
                    && data == json!({"body": "{\"id\":1}"})
                    && message.ordering_key.is_none()
                    && message.attributes.is_empty()
                    && options.is_empty()
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let envelope = Envelope::new(json!({"id": 1}));
        let sent = sender(client, GpsConfiguration::new("orders"))
            .send(envelope.clone())
            .await
            .unwrap();

        assert_eq!(sent, envelope);
    }

    #[tokio::test]
    async fn applies_ordering_key_attributes_and_options() {
        let mut attributes = HashMap::new();
        attributes.insert("tenant".to_owned(), "acme".to_owned());
        let expected_attributes = attributes.clone();

        let mut client = MockPubSubClient::new();
        client
            .expect_publish()
            .withf(move |_, message, options| {
                message.ordering_key.as_deref() == Some("customer-1")
                    && message.attributes == expected_attributes
                    && options.get("timeout") == Some(&json!(3))
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let envelope = Envelope::new(json!({"id": 1}))
            .with(Stamp::OrderingKey("customer-1".to_owned()))
            .with(Stamp::Attributes(attributes))
            .with(Stamp::SenderOptions(
                json!({"timeout": 3}).as_object().cloned().unwrap(),
            ));

        sender(client, GpsConfiguration::new("orders"))
            .send(envelope)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn redelivered_envelope_is_not_published() {
        let mut client = MockPubSubClient::new();
        client.expect_publish().never();

        let envelope = Envelope::new(json!({"id": 1})).with(Stamp::Redelivery { retry_count: 1 });
        let sent = sender(client, GpsConfiguration::new("orders"))
            .send(envelope.clone())
            .await
            .unwrap();

        assert_eq!(sent, envelope);
    }

    #[tokio::test]
    async fn redelivered_envelope_is_published_with_messenger_retry() {
        let mut client = MockPubSubClient::new();
        client
            .expect_publish()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let envelope = Envelope::new(json!({"id": 1})).with(Stamp::Redelivery { retry_count: 1 });
        sender(
            client,
            GpsConfiguration::new("orders").use_messenger_retry(true),
        )
        .send(envelope)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn flat_encoding_sends_headers_as_attributes() {
        struct TypedSerializer;

        impl Serializer for TypedSerializer {
            fn encode(
                &self,
                envelope: &Envelope,
            ) -> Result<crate::messenger::EncodedEnvelope, GpsError> {
                let mut encoded = JsonSerializer.encode(envelope)?;
                encoded
                    .headers
                    .insert("type".to_owned(), "OrderPlaced".to_owned());
                Ok(encoded)
            }

            fn decode(
                &self,
                encoded: crate::messenger::EncodedEnvelope,
            ) -> Result<Envelope, GpsError> {
                JsonSerializer.decode(encoded)
            }
        }

        let mut client = MockPubSubClient::new();
        client
            .expect_publish()
            .withf(|_, message, _| {
                message.data == br#"{"id":1}"#.to_vec()
                    && message.attributes.get("type").map(String::as_str) == Some("OrderPlaced")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let sender = GpsSender::new(
            Arc::new(client),
            Arc::new(GpsConfiguration::new("orders")),
            Arc::new(TypedSerializer),
            EncodingStrategy::Flat,
        );

        sender.send(Envelope::new(json!({"id": 1}))).await.unwrap();
    }

    #[tokio::test]
    async fn publish_failure_is_a_transport_error() {
        let mut client = MockPubSubClient::new();
        client
            .expect_publish()
            .returning(|_, _, _| Err(BackendError::new("quota exceeded")));

        let err = sender(client, GpsConfiguration::new("orders"))
            .send(Envelope::new(json!({"id": 1})))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            GpsError::TransportError(BackendError::new("quota exceeded"))
        );
        assert!(err.to_string().contains("quota exceeded"));
    }
}
