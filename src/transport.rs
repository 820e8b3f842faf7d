// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Pub/Sub Transport
//!
//! `GpsTransport` puts a sender and a receiver behind a single interface and
//! provisions the topic and subscription on `setup`.

use crate::{
    client::{PubSubClient, PROJECT_RESOURCE_PREFIX},
    configuration::GpsConfiguration,
    encoding::EncodingStrategy,
    envelope::Envelope,
    errors::GpsError,
    messenger::{KeepaliveReceiver, Receiver, Sender, Serializer, SetupableTransport},
    receiver::GpsReceiver,
    sender::GpsSender,
};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::{Map, Value};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error};

pub struct GpsTransport {
    client: Arc<dyn PubSubClient>,
    configuration: Arc<GpsConfiguration>,
    serializer: Arc<dyn Serializer>,
    encoding: EncodingStrategy,
    sender: OnceLock<GpsSender>,
    receiver: OnceLock<GpsReceiver>,
}

impl GpsTransport {
    /// Creates a new transport. The sender and receiver are built on first use.
    ///
    /// # Parameters
    /// * `client` - Client to the Pub/Sub service, shared by sender and receiver
    /// * `configuration` - Resolved transport configuration
    /// * `serializer` - Converts envelopes to and from their serialized form
    /// * `encoding` - How the serialized envelope maps onto message data and attributes
    ///
    /// # Returns
    /// A GpsTransport instance
    pub fn new(
        client: Arc<dyn PubSubClient>,
        configuration: GpsConfiguration,
        serializer: Arc<dyn Serializer>,
        encoding: EncodingStrategy,
    ) -> GpsTransport {
        GpsTransport {
            client,
            configuration: Arc::new(configuration),
            serializer,
            encoding,
            sender: OnceLock::new(),
            receiver: OnceLock::new(),
        }
    }

    pub fn configuration(&self) -> &GpsConfiguration {
        &self.configuration
    }

    /// The receiver, built on first access.
    pub fn receiver(&self) -> &GpsReceiver {
        self.receiver.get_or_init(|| {
            GpsReceiver::new(
                self.client.clone(),
                self.configuration.clone(),
                self.serializer.clone(),
                self.encoding,
            )
        })
    }

    /// The sender, built on first access.
    pub fn sender(&self) -> &GpsSender {
        self.sender.get_or_init(|| {
            GpsSender::new(
                self.client.clone(),
                self.configuration.clone(),
                self.serializer.clone(),
                self.encoding,
            )
        })
    }
}

#[async_trait]
impl Sender for GpsTransport {
    async fn send(&self, envelope: Envelope) -> Result<Envelope, GpsError> {
        self.sender().send(envelope).await
    }
}

#[async_trait]
impl Receiver for GpsTransport {
    fn get(&self) -> BoxStream<'_, Result<Envelope, GpsError>> {
        self.receiver().get()
    }

    async fn ack(&self, envelope: &Envelope) -> Result<(), GpsError> {
        self.receiver().ack(envelope).await
    }

    async fn reject(&self, envelope: &Envelope) -> Result<(), GpsError> {
        self.receiver().reject(envelope).await
    }
}

#[async_trait]
impl KeepaliveReceiver for GpsTransport {
    async fn keepalive(&self, envelope: &Envelope, seconds: Option<u32>) -> Result<(), GpsError> {
        self.receiver().keepalive(envelope, seconds).await
    }
}

#[async_trait]
impl SetupableTransport for GpsTransport {
    /// Creates the topic and then the subscription when they are missing and
    /// their creation is enabled. Running it again is a no-op.
    async fn setup(&self) -> Result<(), GpsError> {
        let cfg = &self.configuration;
        let topic = cfg.topic_name();
        let subscription = cfg.subscription_name();

        if cfg.is_topic_creation_enabled() && !self.topic_exists(topic).await? {
            debug!("creating topic: {}", topic);

            if let Err(err) = self.client.create_topic(topic, cfg.get_topic_options()).await {
                error!(error = err.to_string(), topic, "error to create the topic");
                return Err(GpsError::TransportError(err));
            }

            debug!("topic: {} was created", topic);
        }

        if cfg.is_subscription_creation_enabled()
            && !self.subscription_exists(subscription).await?
        {
            debug!("creating subscription: {} on topic: {}", subscription, topic);

            let options = self.normalize_subscription_options();
            if let Err(err) = self.client.subscribe(topic, subscription, &options).await {
                error!(
                    error = err.to_string(),
                    subscription, "error to create the subscription"
                );
                return Err(GpsError::TransportError(err));
            }

            debug!("subscription: {} was created", subscription);
        }

        Ok(())
    }
}

impl GpsTransport {
    async fn topic_exists(&self, topic: &str) -> Result<bool, GpsError> {
        self.client.topic_exists(topic).await.map_err(|err| {
            error!(error = err.to_string(), topic, "error checking the topic");
            GpsError::TransportError(err)
        })
    }

    async fn subscription_exists(&self, subscription: &str) -> Result<bool, GpsError> {
        self.client
            .subscription_exists(subscription)
            .await
            .map_err(|err| {
                error!(
                    error = err.to_string(),
                    subscription, "error checking the subscription"
                );
                GpsError::TransportError(err)
            })
    }

    /// A bare `deadLetterPolicy.deadLetterTopic` is expanded to its fully
    /// qualified name, values starting with `projects/` are kept.
    fn normalize_subscription_options(&self) -> Map<String, Value> {
        let mut options = self.configuration.get_subscription_options().clone();

        if let Some(Value::Object(policy)) = options.get_mut("deadLetterPolicy") {
            let qualified = match policy.get("deadLetterTopic") {
                Some(Value::String(topic)) if !topic.starts_with(PROJECT_RESOURCE_PREFIX) => {
                    Some(self.client.topic_path(topic))
                }
                _ => None,
            };

            if let Some(qualified) = qualified {
                policy.insert("deadLetterTopic".to_owned(), Value::String(qualified));
            }
        }

        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::MockPubSubClient,
        envelope::{ReceivedMessage, Stamp},
        errors::BackendError,
        messenger::JsonSerializer,
    };
    use mockall::Sequence;
    use serde_json::json;
    use tracing_test::traced_test;

    fn transport(client: MockPubSubClient, cfg: GpsConfiguration) -> GpsTransport {
        GpsTransport::new(
            Arc::new(client),
            cfg,
            Arc::new(JsonSerializer),
            EncodingStrategy::default(),
        )
    }

    #[tokio::test]
    async fn setup_creates_topic_before_subscription() {
        let mut seq = Sequence::new();
        let mut client = MockPubSubClient::new();

        client
            .expect_topic_exists()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(false));
        client
            .expect_create_topic()
            .withf(|topic, options| topic == "orders" && options.get("labels").is_some())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        client
            .expect_subscription_exists()
            .withf(|subscription| subscription == "orders-sub")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(false));
        client
            .expect_subscribe()
            .withf(|topic, subscription, _| topic == "orders" && subscription == "orders-sub")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));

        let cfg = GpsConfiguration::new("orders")
            .subscription("orders-sub")
            .topic_options(json!({"labels": {"team": "a"}}).as_object().cloned().unwrap());

        transport(client, cfg).setup().await.unwrap();
    }

    #[tokio::test]
    async fn setup_skips_existing_resources() {
        let mut client = MockPubSubClient::new();
        client.expect_topic_exists().returning(|_| Ok(true));
        client.expect_subscription_exists().returning(|_| Ok(true));
        client.expect_create_topic().never();
        client.expect_subscribe().never();

        transport(client, GpsConfiguration::new("orders"))
            .setup()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn setup_honors_disabled_creation() {
        let mut client = MockPubSubClient::new();
        client.expect_topic_exists().never();
        client.expect_subscription_exists().never();
        client.expect_create_topic().never();
        client.expect_subscribe().never();

        let cfg = GpsConfiguration::new("orders")
            .topic_creation(false)
            .subscription_creation(false);

        transport(client, cfg).setup().await.unwrap();
    }

    #[tokio::test]
    async fn setup_qualifies_bare_dead_letter_topic() {
        let mut client = MockPubSubClient::new();
        client.expect_topic_exists().returning(|_| Ok(true));
        client.expect_subscription_exists().returning(|_| Ok(false));
        client
            .expect_topic_path()
            .withf(|topic| topic == "orders-dead")
            .returning(|topic| format!("projects/acme/topics/{}", topic));
        client
            .expect_subscribe()
            .withf(|_, _, options| {
                options["deadLetterPolicy"]["deadLetterTopic"] == json!("projects/acme/topics/orders-dead")
                    && options["deadLetterPolicy"]["maxDeliveryAttempts"] == json!(5)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let cfg = GpsConfiguration::new("orders").subscription_options(
            json!({"deadLetterPolicy": {"deadLetterTopic": "orders-dead", "maxDeliveryAttempts": 5}})
                .as_object()
                .cloned()
                .unwrap(),
        );

        transport(client, cfg).setup().await.unwrap();
    }

    #[tokio::test]
    async fn setup_keeps_qualified_dead_letter_topic() {
        let mut client = MockPubSubClient::new();
        client.expect_topic_exists().returning(|_| Ok(true));
        client.expect_subscription_exists().returning(|_| Ok(false));
        client.expect_topic_path().never();
        client
            .expect_subscribe()
            .withf(|_, _, options| {
                options["deadLetterPolicy"]["deadLetterTopic"] == json!("projects/other/topics/dead")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let cfg = GpsConfiguration::new("orders").subscription_options(
            json!({"deadLetterPolicy": {"deadLetterTopic": "projects/other/topics/dead"}})
                .as_object()
                .cloned()
                .unwrap(),
        );

        transport(client, cfg).setup().await.unwrap();
    }

    #[tokio::test]
    #[traced_test]
    async fn subscription_check_failure_is_logged() {
        let mut client = MockPubSubClient::new();
        client.expect_topic_exists().returning(|_| Ok(true));
        client
            .expect_subscription_exists()
            .returning(|_| Err(BackendError::new("not authorized")));
        client.expect_subscribe().never();

        let err = transport(client, GpsConfiguration::new("orders"))
            .setup()
            .await
            .unwrap_err();

        assert_eq!(
            err,
            GpsError::TransportError(BackendError::new("not authorized"))
        );
        assert!(logs_contain("error checking the subscription"));
        assert!(logs_contain("not authorized"));
    }

    #[tokio::test]
    #[traced_test]
    async fn setup_failure_is_a_transport_error() {
        let mut client = MockPubSubClient::new();
        client
            .expect_topic_exists()
            .returning(|_| Err(BackendError::new("permission denied")));

        let err = transport(client, GpsConfiguration::new("orders"))
            .setup()
            .await
            .unwrap_err();

        assert_eq!(
            err,
            GpsError::TransportError(BackendError::new("permission denied"))
        );
        assert!(logs_contain("error checking the topic"));
    }

    #[test]
    fn sender_and_receiver_are_built_once() {
        let transport = transport(MockPubSubClient::new(), GpsConfiguration::new("orders"));

        assert!(std::ptr::eq(transport.sender(), transport.sender()));
        assert!(std::ptr::eq(transport.receiver(), transport.receiver()));
    }

    #[tokio::test]
    async fn delegates_to_sender_and_receiver() {
        let mut client = MockPubSubClient::new();
        client
            .expect_publish()
            .times(1)
            .returning(|_, _, _| Ok(()));
        client
            .expect_acknowledge()
            .times(1)
            .returning(|_, _| Ok(()));
        client
            .expect_modify_ack_deadline()
            .withf(|_, _, seconds| *seconds == 0)
            .times(1)
            .returning(|_, _, _| Ok(()));
        client
            .expect_modify_ack_deadline()
            .withf(|_, _, seconds| *seconds == 30)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let transport = transport(client, GpsConfiguration::new("orders"));
        let envelope = Envelope::new(json!({"id": 1}));
        let received = envelope.clone().with(Stamp::Received(ReceivedMessage {
            message: Default::default(),
            max_delivery_attempts: None,
            dead_letter_topic: None,
        }));

        assert_eq!(transport.send(envelope.clone()).await.unwrap(), envelope);
        transport.ack(&received).await.unwrap();
        transport.reject(&received).await.unwrap();
        transport.keepalive(&received, Some(30)).await.unwrap();
    }
}
