// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Pub/Sub Message Receiver
//!
//! This module pulls messages from the configured subscription and turns them
//! into envelopes. Every envelope carries a `Stamp::Received` referencing the
//! pulled message, which is what ack, reject and keepalive act upon.
//!
//! Rejection depends on who owns retries:
//! - Pub/Sub (default): the ack deadline is set to zero so the subscription
//!   retry policy redelivers the message right away
//! - the message bus (`use_messenger_retry`): the message is acknowledged and
//!   the bus republishes it with a redelivery stamp

use crate::{
    client::{PubSubClient, PubSubMessage},
    configuration::GpsConfiguration,
    encoding::EncodingStrategy,
    envelope::{Envelope, ReceivedMessage, Stamp},
    errors::GpsError,
    messenger::{KeepaliveReceiver, Receiver, Serializer},
    otel,
};
use async_trait::async_trait;
use futures_util::{
    stream::{self, BoxStream},
    StreamExt,
};
use opentelemetry::{
    global,
    trace::{Span, Status},
};
use std::{borrow::Cow, sync::Arc};
use tracing::{debug, error};

/// Deadline extension applied by `keepalive` when no duration is given
pub const DEFAULT_KEEPALIVE_SECONDS: u32 = 5;

/// Pub/Sub implementation of the Receiver traits.
pub struct GpsReceiver {
    client: Arc<dyn PubSubClient>,
    configuration: Arc<GpsConfiguration>,
    serializer: Arc<dyn Serializer>,
    encoding: EncodingStrategy,
}

impl GpsReceiver {
    /// Creates a new receiver pulling from the configured subscription.
    ///
    /// # Parameters
    /// * `client` - Client to the Pub/Sub service
    /// * `configuration` - Resolved transport configuration
    /// * `serializer` - Converts envelopes to and from their serialized form
    /// * `encoding` - How the serialized envelope maps onto message data and attributes
    ///
    /// # Returns
    /// A GpsReceiver instance
    pub fn new(
        client: Arc<dyn PubSubClient>,
        configuration: Arc<GpsConfiguration>,
        serializer: Arc<dyn Serializer>,
        encoding: EncodingStrategy,
    ) -> GpsReceiver {
        GpsReceiver {
            client,
            configuration,
            serializer,
            encoding,
        }
    }
}

#[async_trait]
impl Receiver for GpsReceiver {
    fn get(&self) -> BoxStream<'_, Result<Envelope, GpsError>> {
        stream::once(self.pull())
            .flat_map(move |pulled| match pulled {
                Ok(messages) => stream::iter(messages)
                    .map(move |message| self.decode(message))
                    .left_stream(),
                Err(err) => stream::iter(vec![Err(err)]).right_stream(),
            })
            .boxed()
    }

    /// Acknowledges the message the envelope was decoded from.
    ///
    /// # Errors
    /// `LogicError` when the envelope carries no received-message stamp
    async fn ack(&self, envelope: &Envelope) -> Result<(), GpsError> {
        let received = received_message(envelope)?;

        match self
            .client
            .acknowledge(self.configuration.subscription_name(), &received.message)
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error whiling ack msg");
                Err(GpsError::TransportError(err))
            }
            _ => Ok(()),
        }
    }

    /// Warns Pub/Sub not to wait for the ack of a message whose handling failed.
    async fn reject(&self, envelope: &Envelope) -> Result<(), GpsError> {
        let received = received_message(envelope)?;
        let subscription = self.configuration.subscription_name();

        let result = if self.configuration.should_use_messenger_retry() {
            self.client.acknowledge(subscription, &received.message).await
        } else {
            self.client
                .modify_ack_deadline(subscription, &received.message, 0)
                .await
        };

        result.map_err(|err| {
            error!(error = err.to_string(), "error whiling reject msg");
            GpsError::TransportError(err)
        })
    }
}

#[async_trait]
impl KeepaliveReceiver for GpsReceiver {
    async fn keepalive(&self, envelope: &Envelope, seconds: Option<u32>) -> Result<(), GpsError> {
        let received = received_message(envelope)?;

        match self
            .client
            .modify_ack_deadline(
                self.configuration.subscription_name(),
                &received.message,
                seconds.unwrap_or(DEFAULT_KEEPALIVE_SECONDS),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error whiling extending ack deadline");
                Err(GpsError::TransportError(err))
            }
            _ => Ok(()),
        }
    }
}

impl GpsReceiver {
    async fn pull(&self) -> Result<Vec<PubSubMessage>, GpsError> {
        let subscription = self.configuration.subscription_name();

        match self
            .client
            .pull(
                subscription,
                self.configuration.get_subscription_pull_options(),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    subscription, "error pulling messages"
                );
                Err(GpsError::TransportError(err))
            }
            Ok(messages) => {
                debug!(subscription, count = messages.len(), "messages pulled");
                Ok(messages)
            }
        }
    }

    /// Creates an envelope from a pulled message, stamped with the reference
    /// needed to ack it and with its attributes, if any.
    fn decode(&self, message: PubSubMessage) -> Result<Envelope, GpsError> {
        let tracer = global::tracer("gps receiver");
        let (_, mut span) = otel::new_span(
            &message.attributes,
            &tracer,
            self.configuration.subscription_name(),
        );

        let decoded = self
            .encoding
            .decode(&message)
            .and_then(|encoded| self.serializer.decode(encoded))
            .map_err(|err| match err {
                GpsError::DecodingError(_) => err,
                other => GpsError::DecodingError(other.to_string()),
            });

        let envelope = match decoded {
            Ok(envelope) => envelope,
            Err(err) => {
                error!(
                    error = err.to_string(),
                    message_id = %message.message_id,
                    "error decoding message"
                );
                span.record_error(&err);
                span.set_status(Status::Error {
                    description: Cow::from("error decoding message"),
                });
                span.end();
                return Err(err);
            }
        };

        let attributes = message.attributes.clone();
        let mut envelope = envelope.with(Stamp::Received(ReceivedMessage::new(
            message,
            self.configuration.get_subscription_options(),
        )));

        if !attributes.is_empty() {
            envelope = envelope.with(Stamp::Attributes(attributes));
        }

        span.set_status(Status::Ok);
        span.end();

        Ok(envelope)
    }
}

fn received_message(envelope: &Envelope) -> Result<&ReceivedMessage, GpsError> {
    envelope
        .received()
        .ok_or_else(GpsError::missing_received_stamp)
}
