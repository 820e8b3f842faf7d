// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Transport Factory
//!
//! Builds `GpsTransport`s from a `gps://` DSN and options: the configuration is
//! resolved, a client is built from its `client_config` and the transport is
//! wired around both.

use crate::{
    client::{AuthCache, ClientConfig, ForcedTransport, PubSubClientBuilder},
    dsn::GPS_SCHEME,
    encoding::EncodingStrategy,
    errors::GpsError,
    messenger::Serializer,
    resolver::{ConfigurationResolver, GpsConfigurationResolver},
    settings::GpsMessengerSettings,
    transport::GpsTransport,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Creates Pub/Sub transports for `gps://` DSNs.
///
/// This struct implements the builder pattern: every transport it creates
/// shares the configured auth cache, forced transport and encoding strategy.
pub struct GpsTransportFactory {
    resolver: Arc<dyn ConfigurationResolver>,
    client_builder: Arc<dyn PubSubClientBuilder>,
    auth_cache: Option<Arc<dyn AuthCache>>,
    forced_transport: Option<ForcedTransport>,
    encoding: EncodingStrategy,
}

impl GpsTransportFactory {
    /// Creates a factory using the default resolver.
    ///
    /// # Parameters
    /// * `client_builder` - Builds a client out of each resolved `client_config`
    ///
    /// # Returns
    /// A new factory with no auth cache, no forced transport and the default encoding
    pub fn new(client_builder: Arc<dyn PubSubClientBuilder>) -> GpsTransportFactory {
        GpsTransportFactory {
            resolver: Arc::new(GpsConfigurationResolver),
            client_builder,
            auth_cache: None,
            forced_transport: None,
            encoding: EncodingStrategy::default(),
        }
    }

    /// Creates a factory from the application wide settings.
    ///
    /// Selecting the `wrapped` encoding logs a deprecation notice.
    ///
    /// # Parameters
    /// * `settings` - Forced transport and encoding strategy
    /// * `client_builder` - Builds a client out of each resolved `client_config`
    ///
    /// # Returns
    /// A new factory configured from the settings
    pub fn from_settings(
        settings: &GpsMessengerSettings,
        client_builder: Arc<dyn PubSubClientBuilder>,
    ) -> GpsTransportFactory {
        if settings.encoding_strategy == EncodingStrategy::Wrapped {
            warn!(
                "the `wrapped` encoding strategy is deprecated, use `hybrid` for running systems or `flat` for new ones"
            );
        }

        let mut factory = GpsTransportFactory::new(client_builder)
            .encoding_strategy(settings.encoding_strategy);
        if let Some(transport) = settings.forced_transport {
            factory = factory.forced_transport(transport);
        }
        factory
    }

    pub fn resolver(mut self, resolver: Arc<dyn ConfigurationResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Token cache handed to every client whose `client_config` does not set
    /// `credentialsConfig.authCache` itself.
    pub fn auth_cache(mut self, cache: Arc<dyn AuthCache>) -> Self {
        self.auth_cache = Some(cache);
        self
    }

    /// Forces the wire protocol of every client, whatever `client_config` says.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn forced_transport(mut self, transport: ForcedTransport) -> Self {
        self.forced_transport = Some(transport);
        self
    }

    pub fn encoding_strategy(mut self, encoding: EncodingStrategy) -> Self {
        self.encoding = encoding;
        self
    }

    /// Whether the DSN targets this transport.
    pub fn supports(&self, dsn: &str) -> bool {
        dsn.starts_with(&format!("{}://", GPS_SCHEME))
    }

    /// Creates a transport from a DSN and explicit options.
    ///
    /// Nothing is created on the Pub/Sub side until `setup` is called.
    ///
    /// # Parameters
    /// * `dsn` - A `gps://` DSN
    /// * `options` - Explicit options, taking precedence over the DSN
    /// * `serializer` - Serializer used by the transport's sender and receiver
    ///
    /// # Returns
    /// The transport, a `ValidationError` for invalid options or a
    /// `TransportError` when the client cannot be built
    pub fn create_transport(
        &self,
        dsn: &str,
        options: &Map<String, Value>,
        serializer: Arc<dyn Serializer>,
    ) -> Result<GpsTransport, GpsError> {
        let configuration = self.resolver.resolve(dsn, options)?;
        let client_config = self.client_config(configuration.get_client_config());

        let client = match self.client_builder.build(client_config) {
            Ok(client) => client,
            Err(err) => {
                error!(error = err.to_string(), "failure to build the pubsub client");
                return Err(GpsError::TransportError(err));
            }
        };

        debug!(
            topic = configuration.topic_name(),
            subscription = configuration.subscription_name(),
            "gps transport created"
        );

        Ok(GpsTransport::new(
            client,
            configuration,
            serializer,
            self.encoding,
        ))
    }

    fn client_config(&self, options: &Map<String, Value>) -> ClientConfig {
        let has_auth_cache = options
            .get("credentialsConfig")
            .and_then(Value::as_object)
            .is_some_and(|credentials| credentials.contains_key("authCache"));

        ClientConfig {
            options: options.clone(),
            auth_cache: if has_auth_cache {
                None
            } else {
                self.auth_cache.clone()
            },
            transport: self.forced_transport,
        }
    }
}
