// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Transport Settings
//!
//! Settings shared by every Pub/Sub transport of an application, as opposed to
//! the per-transport DSN options. They are read with the `config` crate, by
//! default from `GPS_MESSENGER_*` environment variables:
//! - `GPS_MESSENGER_FORCED_TRANSPORT`: `grpc` or `rest`
//! - `GPS_MESSENGER_ENCODING_STRATEGY`: `wrapped`, `hybrid` or `flat`

use crate::{client::ForcedTransport, encoding::EncodingStrategy, errors::GpsError};
use config::{Config, Environment, Source};
use serde::Deserialize;
use tracing::error;

/// Prefix of the environment variables read by `GpsMessengerSettings::load`
pub const ENV_PREFIX: &str = "GPS_MESSENGER";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GpsMessengerSettings {
    pub forced_transport: Option<ForcedTransport>,
    pub encoding_strategy: EncodingStrategy,
}

impl GpsMessengerSettings {
    /// Reads the settings from the environment.
    pub fn load() -> Result<GpsMessengerSettings, GpsError> {
        GpsMessengerSettings::from_source(Environment::with_prefix(ENV_PREFIX))
    }

    pub fn from_source<S>(source: S) -> Result<GpsMessengerSettings, GpsError>
    where
        S: Source + Send + Sync + 'static,
    {
        Config::builder()
            .add_source(source)
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .map_err(|err| {
                error!(error = err.to_string(), "failure to load gps messenger settings");
                GpsError::ValidationError(err.to_string())
            })
    }
}
