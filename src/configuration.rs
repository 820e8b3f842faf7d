// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Transport Configuration
//!
//! This module provides the resolved, immutable configuration of one Pub/Sub
//! transport: which topic and subscription to use, whether they may be created,
//! the options forwarded to the client and to the topic/subscription creation
//! calls, and the pull options used on every receive.

use crate::dsn::{self, GPS_SCHEME, PLACEHOLDER_HOST};
use serde::Serialize;
use serde_json::{Map, Value};

/// Topic used when neither the DSN nor the options name one
pub const DEFAULT_TOPIC_NAME: &str = "messages";
/// Maximum messages returned by one pull when not configured
pub const DEFAULT_MAX_MESSAGES_PULL: u32 = 10;

/// Options sent with every subscription pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPullOptions {
    pub max_messages: u32,
    pub return_immediately: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_millis: Option<u64>,
}

impl Default for SubscriptionPullOptions {
    fn default() -> Self {
        SubscriptionPullOptions {
            max_messages: DEFAULT_MAX_MESSAGES_PULL,
            return_immediately: false,
            timeout_millis: None,
        }
    }
}

/// Resolved configuration of a Pub/Sub transport.
///
/// This struct implements the builder pattern. Start from
/// `GpsConfiguration::new(topic)`, the subscription defaults to the topic name
/// and both resources are created when missing.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsConfiguration {
    pub(crate) topic_name: String,
    pub(crate) topic_creation_enabled: bool,
    pub(crate) subscription_name: String,
    pub(crate) subscription_creation_enabled: bool,
    pub(crate) use_messenger_retry: bool,
    pub(crate) client_config: Map<String, Value>,
    pub(crate) topic_options: Map<String, Value>,
    pub(crate) subscription_options: Map<String, Value>,
    pub(crate) subscription_pull_options: SubscriptionPullOptions,
}

impl Default for GpsConfiguration {
    fn default() -> Self {
        GpsConfiguration::new(DEFAULT_TOPIC_NAME)
    }
}

impl GpsConfiguration {
    /// Creates a configuration for the given topic.
    ///
    /// The subscription shares the topic name, both are created when missing
    /// and retries are left to Pub/Sub.
    ///
    /// # Parameters
    /// * `topic` - Short name of the topic
    ///
    /// # Returns
    /// A new configuration with default settings
    pub fn new(topic: &str) -> GpsConfiguration {
        GpsConfiguration {
            topic_name: topic.to_owned(),
            topic_creation_enabled: true,
            subscription_name: topic.to_owned(),
            subscription_creation_enabled: true,
            use_messenger_retry: false,
            client_config: Map::new(),
            topic_options: Map::new(),
            subscription_options: Map::new(),
            subscription_pull_options: SubscriptionPullOptions::default(),
        }
    }

    /// Sets the subscription messages are pulled from.
    ///
    /// # Parameters
    /// * `name` - Short name of the subscription
    ///
    /// # Returns
    /// Self for method chaining
    pub fn subscription(mut self, name: &str) -> Self {
        self.subscription_name = name.to_owned();
        self
    }

    /// Enables or disables the creation of a missing topic on setup.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn topic_creation(mut self, enabled: bool) -> Self {
        self.topic_creation_enabled = enabled;
        self
    }

    /// Enables or disables the creation of a missing subscription on setup.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn subscription_creation(mut self, enabled: bool) -> Self {
        self.subscription_creation_enabled = enabled;
        self
    }

    /// Rejected messages are acknowledged and retried by the message bus
    /// instead of being redelivered by Pub/Sub.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn use_messenger_retry(mut self, enabled: bool) -> Self {
        self.use_messenger_retry = enabled;
        self
    }

    /// Sets the options handed verbatim to the client builder.
    ///
    /// # Parameters
    /// * `config` - Backend client options (endpoint, project, credentials...)
    ///
    /// # Returns
    /// Self for method chaining
    pub fn client_config(mut self, config: Map<String, Value>) -> Self {
        self.client_config = config;
        self
    }

    /// Sets the options used when the topic is created.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn topic_options(mut self, options: Map<String, Value>) -> Self {
        self.topic_options = options;
        self
    }

    /// Sets the options used when the subscription is created.
    ///
    /// A `deadLetterPolicy` here also tells the receiver how many delivery
    /// attempts a message has before it is dead-lettered.
    ///
    /// # Parameters
    /// * `options` - Subscription settings such as `ackDeadlineSeconds`
    ///
    /// # Returns
    /// Self for method chaining
    pub fn subscription_options(mut self, options: Map<String, Value>) -> Self {
        self.subscription_options = options;
        self
    }

    /// Sets the options sent with every pull.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn pull_options(mut self, options: SubscriptionPullOptions) -> Self {
        self.subscription_pull_options = options;
        self
    }

    /// Short name of the topic messages are published to.
    pub fn topic_name(&self) -> &str {
        &self.topic_name
    }

    pub fn is_topic_creation_enabled(&self) -> bool {
        self.topic_creation_enabled
    }

    /// Short name of the subscription messages are pulled from.
    pub fn subscription_name(&self) -> &str {
        &self.subscription_name
    }

    pub fn is_subscription_creation_enabled(&self) -> bool {
        self.subscription_creation_enabled
    }

    pub fn should_use_messenger_retry(&self) -> bool {
        self.use_messenger_retry
    }

    /// Options forwarded to the client builder.
    pub fn get_client_config(&self) -> &Map<String, Value> {
        &self.client_config
    }

    pub fn get_topic_options(&self) -> &Map<String, Value> {
        &self.topic_options
    }

    /// Subscription options, with DSN strings already coerced.
    pub fn get_subscription_options(&self) -> &Map<String, Value> {
        &self.subscription_options
    }

    pub fn get_subscription_pull_options(&self) -> &SubscriptionPullOptions {
        &self.subscription_pull_options
    }

    /// Renders the configuration as a `gps://` DSN. Values equal to their
    /// default are left out.
    pub fn to_dsn(&self) -> String {
        let mut query = Map::new();
        let mut topic = Map::new();
        let mut subscription = Map::new();

        if !self.topic_creation_enabled {
            topic.insert("createIfNotExist".to_owned(), Value::Bool(false));
        }
        if !self.topic_options.is_empty() {
            topic.insert("options".to_owned(), Value::Object(self.topic_options.clone()));
        }

        if self.subscription_name != self.topic_name {
            subscription.insert(
                "name".to_owned(),
                Value::String(self.subscription_name.clone()),
            );
        }
        if !self.subscription_creation_enabled {
            subscription.insert("createIfNotExist".to_owned(), Value::Bool(false));
        }
        if !self.subscription_options.is_empty() {
            subscription.insert(
                "options".to_owned(),
                Value::Object(self.subscription_options.clone()),
            );
        }
        if self.subscription_pull_options != SubscriptionPullOptions::default() {
            if let Ok(Value::Object(pull)) = serde_json::to_value(&self.subscription_pull_options)
            {
                subscription.insert("pull".to_owned(), Value::Object(pull));
            }
        }

        if !self.client_config.is_empty() {
            query.insert(
                "client_config".to_owned(),
                Value::Object(self.client_config.clone()),
            );
        }
        if self.use_messenger_retry {
            query.insert("use_messenger_retry".to_owned(), Value::Bool(true));
        }
        if !topic.is_empty() {
            query.insert("topic".to_owned(), Value::Object(topic));
        }
        if !subscription.is_empty() {
            query.insert("subscription".to_owned(), Value::Object(subscription));
        }

        let base = format!("{}://{}/{}", GPS_SCHEME, PLACEHOLDER_HOST, self.topic_name);
        if query.is_empty() {
            base
        } else {
            format!("{}?{}", base, dsn::to_query(&query))
        }
    }
}
