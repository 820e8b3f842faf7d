// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Google Pub/Sub Transport
//!
//! This module provides the error types for the Pub/Sub transport. The `GpsError`
//! enum represents every failure the transport reports to the owning framework,
//! while `BackendError` is what a `PubSubClient` implementation returns when a
//! call to the service fails.

use thiserror::Error;

/// Message of the `LogicError` raised when ack/reject/keepalive is called with
/// an envelope that was not produced by the receiver.
pub const MISSING_RECEIVED_STAMP: &str = "No received-message reference found on the envelope";

/// Failure reported by the backend client (network, auth, quota, not found...).
///
/// The original message of the service is always preserved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> BackendError {
        BackendError {
            message: message.into(),
        }
    }
}

/// Represents errors that can occur during Pub/Sub transport operations.
///
/// Configuration problems are fatal to transport construction, decoding
/// problems are reported per message, logic errors flag API misuse and
/// transport errors wrap any failure talking to the service.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GpsError {
    /// Malformed, mistyped or unknown configuration option
    #[error("invalid configuration: {0}")]
    ValidationError(String),

    /// Malformed message body or serializer decode failure
    #[error("failure to decode message: {0}")]
    DecodingError(String),

    /// Programmer misuse, e.g. acknowledging an envelope that was never received
    #[error("{0}")]
    LogicError(String),

    /// Any failure communicating with the Pub/Sub service
    #[error("transport failure: {0}")]
    TransportError(#[from] BackendError),
}

impl GpsError {
    pub(crate) fn missing_received_stamp() -> GpsError {
        GpsError::LogicError(MISSING_RECEIVED_STAMP.to_owned())
    }

    pub(crate) fn transport(message: impl Into<String>) -> GpsError {
        GpsError::TransportError(BackendError::new(message))
    }
}
