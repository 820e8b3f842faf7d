// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Pub/Sub Client Boundary
//!
//! This module defines the contract between the transport and the network client
//! that talks to Google Pub/Sub. The transport never opens connections itself: it
//! resolves a `ClientConfig`, hands it to a `PubSubClientBuilder` and from then on
//! only calls the `PubSubClient` trait.

use crate::{configuration::SubscriptionPullOptions, errors::BackendError};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::HashMap, fmt, sync::Arc};

/// Prefix of every fully qualified Pub/Sub resource name.
pub const PROJECT_RESOURCE_PREFIX: &str = "projects/";

/// A message as delivered by a subscription pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PubSubMessage {
    pub ack_id: String,
    pub message_id: String,
    pub data: Vec<u8>,
    pub attributes: HashMap<String, String>,
    pub ordering_key: Option<String>,
    pub delivery_attempt: Option<i32>,
}

/// A message about to be published to a topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub data: Vec<u8>,
    pub attributes: HashMap<String, String>,
    pub ordering_key: Option<String>,
}

impl OutgoingMessage {
    /// Creates a message with the given data, no attributes and no ordering key.
    pub fn new(data: Vec<u8>) -> OutgoingMessage {
        OutgoingMessage {
            data,
            ..Default::default()
        }
    }

    pub fn with_ordering_key(mut self, key: &str) -> Self {
        self.ordering_key = Some(key.to_owned());
        self
    }

    /// Sets the attributes, keys already present are overwritten.
    pub fn with_attributes(mut self, attributes: &HashMap<String, String>) -> Self {
        for (key, value) in attributes {
            self.attributes.insert(key.clone(), value.clone());
        }
        self
    }
}

/// Operations the transport needs from a Pub/Sub client.
///
/// Implementations wrap the real gRPC/REST client. Every call is awaited
/// sequentially by a single transport, so implementations only need to be
/// safe for that pattern.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PubSubClient: Send + Sync {
    /// Fully qualified name of a topic, `projects/<project>/topics/<name>`.
    fn topic_path(&self, topic: &str) -> String;

    async fn topic_exists(&self, topic: &str) -> Result<bool, BackendError>;

    async fn create_topic(&self, topic: &str, options: &Map<String, Value>)
        -> Result<(), BackendError>;

    async fn subscription_exists(&self, subscription: &str) -> Result<bool, BackendError>;

    /// Creates `subscription` bound to `topic`.
    async fn subscribe(
        &self,
        topic: &str,
        subscription: &str,
        options: &Map<String, Value>,
    ) -> Result<(), BackendError>;

    /// Pulls at most `options.max_messages` messages from the subscription.
    ///
    /// # Parameters
    /// * `subscription` - Short name of the subscription
    /// * `options` - Pull settings
    ///
    /// # Returns
    /// The pulled messages, possibly none
    async fn pull(
        &self,
        subscription: &str,
        options: &SubscriptionPullOptions,
    ) -> Result<Vec<PubSubMessage>, BackendError>;

    async fn acknowledge(
        &self,
        subscription: &str,
        message: &PubSubMessage,
    ) -> Result<(), BackendError>;

    /// Sets the ack deadline of a pulled message, counted from now. Zero makes
    /// the message available for redelivery right away.
    async fn modify_ack_deadline(
        &self,
        subscription: &str,
        message: &PubSubMessage,
        seconds: u32,
    ) -> Result<(), BackendError>;

    /// Publishes a message to the topic.
    ///
    /// # Parameters
    /// * `topic` - Short name of the topic
    /// * `message` - Data, attributes and ordering key of the message
    /// * `options` - Per-call publish options from the envelope's stamp
    async fn publish(
        &self,
        topic: &str,
        message: OutgoingMessage,
        options: &Map<String, Value>,
    ) -> Result<(), BackendError>;
}

/// Storage for access tokens shared between clients.
pub trait AuthCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String);
}

/// Process-local `AuthCache`.
#[derive(Debug, Default)]
pub struct InMemoryAuthCache {
    entries: DashMap<String, String>,
}

impl InMemoryAuthCache {
    pub fn new() -> Arc<InMemoryAuthCache> {
        Arc::new(InMemoryAuthCache::default())
    }
}

impl AuthCache for InMemoryAuthCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: &str, value: String) {
        self.entries.insert(key.to_owned(), value);
    }
}

/// Wire protocol the client must use regardless of its own defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForcedTransport {
    Grpc,
    Rest,
}

/// Everything needed to build a `PubSubClient`.
#[derive(Clone, Default)]
pub struct ClientConfig {
    /// The `client_config` option, forwarded verbatim.
    pub options: Map<String, Value>,
    pub auth_cache: Option<Arc<dyn AuthCache>>,
    pub transport: Option<ForcedTransport>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("options", &self.options)
            .field("auth_cache", &self.auth_cache.is_some())
            .field("transport", &self.transport)
            .finish()
    }
}

/// Builds a `PubSubClient` out of a resolved `ClientConfig`.
pub trait PubSubClientBuilder: Send + Sync {
    fn build(&self, config: ClientConfig) -> Result<Arc<dyn PubSubClient>, BackendError>;
}

impl<F> PubSubClientBuilder for F
where
    F: Fn(ClientConfig) -> Result<Arc<dyn PubSubClient>, BackendError> + Send + Sync,
{
    fn build(&self, config: ClientConfig) -> Result<Arc<dyn PubSubClient>, BackendError> {
        self(config)
    }
}
