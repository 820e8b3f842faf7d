// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Configuration Resolver
//!
//! This module merges a DSN and an explicit options map into a `GpsConfiguration`.
//!
//! Precedence, highest first: explicit options, DSN query, DSN path, defaults.
//! Explicit options override DSN values at every nesting level. Values coming
//! from a DSN are always strings, so boolean and numeric options are coerced:
//! - booleans accept `1/0`, `true/false`, `on/off`, `yes/no`; anything else
//!   falls back to the default without failing
//! - integers are read after stripping every non-digit character; nothing left
//!   means the option is unset
//!
//! The deprecated `queue` (for `subscription`) and `max_messages_pull` (for
//! `subscription.pull.maxMessages`) options are still honored and log a
//! deprecation notice.

use crate::{
    configuration::{
        GpsConfiguration, SubscriptionPullOptions, DEFAULT_MAX_MESSAGES_PULL, DEFAULT_TOPIC_NAME,
    },
    dsn,
    errors::GpsError,
};
use serde::{de, Deserialize, Deserializer};
use serde_json::{Map, Number, Value};
use tracing::{debug, warn};

/// Options injected by the message bus that mean nothing to the transport
pub const TRANSPORT_INTERNAL_OPTIONS: [&str; 2] = ["transport_name", "serializer"];

const INT_SUBSCRIPTION_OPTIONS: [&str; 2] = ["ackDeadlineSeconds", "maxDeliveryAttempts"];
const BOOL_SUBSCRIPTION_OPTIONS: [&str; 3] = [
    "enableMessageOrdering",
    "retainAckedMessages",
    "enableExactlyOnceDelivery",
];

/// Resolves a DSN plus options into a transport configuration.
pub trait ConfigurationResolver: Send + Sync {
    fn resolve(&self, dsn: &str, options: &Map<String, Value>)
        -> Result<GpsConfiguration, GpsError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GpsConfigurationResolver;

impl ConfigurationResolver for GpsConfigurationResolver {
    fn resolve(
        &self,
        dsn: &str,
        options: &Map<String, Value>,
    ) -> Result<GpsConfiguration, GpsError> {
        let mut merged = dsn::parse(dsn)?;
        dsn::deep_merge(&mut merged, options.clone());

        for key in TRANSPORT_INTERNAL_OPTIONS {
            merged.remove(key);
        }

        apply_deprecated_aliases(&mut merged);

        let raw: RawOptions = serde_json::from_value(Value::Object(merged))
            .map_err(|err| GpsError::ValidationError(err.to_string()))?;

        let cfg = build(raw)?;

        debug!(
            topic = cfg.topic_name(),
            subscription = cfg.subscription_name(),
            "gps configuration resolved"
        );

        Ok(cfg)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOptions {
    #[serde(default)]
    client_config: Option<Map<String, Value>>,
    #[serde(default, deserialize_with = "flexible_bool")]
    use_messenger_retry: Option<bool>,
    #[serde(default)]
    topic: Option<RawTopic>,
    #[serde(default)]
    subscription: Option<RawSubscription>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RawTopic {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    create_if_not_exist: Option<bool>,
    #[serde(default)]
    options: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RawSubscription {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    create_if_not_exist: Option<bool>,
    #[serde(default)]
    options: Option<Map<String, Value>>,
    #[serde(default)]
    pull: Option<RawPull>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RawPull {
    #[serde(default, deserialize_with = "flexible_int")]
    max_messages: Option<u64>,
    #[serde(default, deserialize_with = "flexible_bool")]
    return_immediately: Option<bool>,
    #[serde(default, deserialize_with = "flexible_int")]
    timeout_millis: Option<u64>,
}

fn build(raw: RawOptions) -> Result<GpsConfiguration, GpsError> {
    let topic = raw.topic.unwrap_or_default();
    let subscription = raw.subscription.unwrap_or_default();
    let pull = subscription.pull.unwrap_or_default();

    let topic_name = topic
        .name
        .unwrap_or_else(|| DEFAULT_TOPIC_NAME.to_owned());
    if topic_name.is_empty() {
        return Err(GpsError::ValidationError(
            "topic.name must not be empty".to_owned(),
        ));
    }

    let subscription_name = subscription.name.unwrap_or_else(|| topic_name.clone());
    if subscription_name.is_empty() {
        return Err(GpsError::ValidationError(
            "subscription.name must not be empty".to_owned(),
        ));
    }

    let max_messages = match pull.max_messages {
        None => DEFAULT_MAX_MESSAGES_PULL,
        Some(value) => u32::try_from(value)
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| {
                GpsError::ValidationError(format!(
                    "subscription.pull.maxMessages must be a positive integer, got {}",
                    value
                ))
            })?,
    };

    let pull_options = SubscriptionPullOptions {
        max_messages,
        return_immediately: pull.return_immediately.unwrap_or(false),
        timeout_millis: pull.timeout_millis,
    };

    Ok(GpsConfiguration::new(&topic_name)
        .subscription(&subscription_name)
        .topic_creation(topic.create_if_not_exist.unwrap_or(true))
        .subscription_creation(subscription.create_if_not_exist.unwrap_or(true))
        .use_messenger_retry(raw.use_messenger_retry.unwrap_or(false))
        .client_config(raw.client_config.unwrap_or_default())
        .topic_options(topic.options.unwrap_or_default())
        .subscription_options(normalize_subscription_options(
            subscription.options.unwrap_or_default(),
        ))
        .pull_options(pull_options))
}

/// Maps the deprecated `queue` and `max_messages_pull` options onto the current
/// schema. Values given through the current schema take precedence.
fn apply_deprecated_aliases(options: &mut Map<String, Value>) {
    if let Some(queue) = options.remove("queue") {
        warn!("the `queue` option is deprecated, use `subscription` instead");

        match options.get_mut("subscription") {
            Some(Value::Object(subscription)) => {
                if let Value::Object(mut legacy) = queue {
                    dsn::deep_merge(&mut legacy, std::mem::take(subscription));
                    *subscription = legacy;
                }
            }
            Some(_) => {}
            None => {
                options.insert("subscription".to_owned(), queue);
            }
        }
    }

    if let Some(max_messages) = options.remove("max_messages_pull") {
        warn!(
            "the `max_messages_pull` option is deprecated, use `subscription.pull.maxMessages` instead"
        );

        let subscription = options
            .entry("subscription")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(subscription) = subscription {
            let pull = subscription
                .entry("pull")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(pull) = pull {
                pull.entry("maxMessages").or_insert(max_messages);
            }
        }
    }
}

fn normalize_subscription_options(mut options: Map<String, Value>) -> Map<String, Value> {
    for key in INT_SUBSCRIPTION_OPTIONS {
        coerce_int_entry(&mut options, key);
    }
    for key in BOOL_SUBSCRIPTION_OPTIONS {
        coerce_bool_entry(&mut options, key);
    }

    if let Some(Value::Object(policy)) = options.get_mut("deadLetterPolicy") {
        coerce_int_entry(policy, "maxDeliveryAttempts");
    }

    options
}

fn coerce_int_entry(options: &mut Map<String, Value>, key: &str) {
    let Some(Value::String(raw)) = options.get(key) else {
        return;
    };

    match sanitize_int(raw).and_then(|digits| digits.parse::<u64>().ok()) {
        Some(value) => {
            options.insert(key.to_owned(), Value::Number(Number::from(value)));
        }
        None => {
            options.remove(key);
        }
    }
}

fn coerce_bool_entry(options: &mut Map<String, Value>, key: &str) {
    let coerced = match options.get(key) {
        Some(Value::String(raw)) => parse_bool(raw),
        Some(Value::Number(n)) => n.as_i64().and_then(int_to_bool),
        _ => return,
    };

    match coerced {
        Some(value) => {
            options.insert(key.to_owned(), Value::Bool(value));
        }
        None => {
            options.remove(key);
        }
    }
}

/// Permissive boolean parsing, `None` when the value is not boolean-like.
pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" | "" => Some(false),
        _ => None,
    }
}

/// Keeps only the digits of `raw`, `None` when none are left.
pub(crate) fn sanitize_int(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

fn int_to_bool(value: i64) -> Option<bool> {
    match value {
        0 => Some(false),
        1 => Some(true),
        _ => None,
    }
}

fn flexible_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Bool(value) => Ok(Some(value)),
        Value::String(raw) => Ok(parse_bool(&raw)),
        Value::Number(n) => Ok(n.as_i64().and_then(int_to_bool)),
        other => Err(de::Error::custom(format!(
            "invalid type: {}, expected a boolean",
            other
        ))),
    }
}

fn flexible_int<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_u64().map(Some).ok_or_else(|| {
            de::Error::custom(format!("invalid value: {}, expected a positive integer", n))
        }),
        Value::String(raw) => match sanitize_int(&raw) {
            None => Ok(None),
            Some(digits) => digits.parse::<u64>().map(Some).map_err(|_| {
                de::Error::custom(format!("invalid value: `{}`, expected an integer", raw))
            }),
        },
        other => Err(de::Error::custom(format!(
            "invalid type: {}, expected an integer",
            other
        ))),
    }
}
