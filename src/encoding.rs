// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Encoding Strategies
//!
//! How a serialized envelope is laid out in a Pub/Sub message:
//! - `Wrapped`: the data is the JSON document `{"body": ..., "headers": {...}}`
//! - `Flat`: the data is the body itself, headers travel as message attributes
//! - `Hybrid`: encodes like `Flat` but decodes both layouts, for migrations

use crate::{client::PubSubMessage, errors::GpsError, messenger::EncodedEnvelope};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingStrategy {
    #[default]
    Wrapped,
    Hybrid,
    Flat,
}

/// Data and attributes of an outgoing message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedMessage {
    pub data: Vec<u8>,
    pub attributes: HashMap<String, String>,
}

impl EncodingStrategy {
    /// Lays out `encoded` as message data and attributes.
    ///
    /// Fails with a `TransportError` when the body cannot be JSON encoded.
    pub fn encode(&self, encoded: &EncodedEnvelope) -> Result<EncodedMessage, GpsError> {
        match self {
            EncodingStrategy::Wrapped => {
                let data = serde_json::to_vec(encoded)
                    .map_err(|err| GpsError::transport(err.to_string()))?;
                Ok(EncodedMessage {
                    data,
                    attributes: HashMap::default(),
                })
            }
            EncodingStrategy::Hybrid | EncodingStrategy::Flat => Ok(EncodedMessage {
                data: encoded.body.clone().into_bytes(),
                attributes: encoded.headers.clone(),
            }),
        }
    }

    /// Reads a pulled message back into its serialized envelope form.
    pub fn decode(&self, message: &PubSubMessage) -> Result<EncodedEnvelope, GpsError> {
        match self {
            EncodingStrategy::Wrapped => serde_json::from_slice(&message.data)
                .map_err(|err| GpsError::DecodingError(err.to_string())),
            EncodingStrategy::Flat => decode_flat(message),
            EncodingStrategy::Hybrid => match serde_json::from_slice::<EncodedEnvelope>(&message.data)
            {
                Ok(wrapped) => Ok(wrapped),
                Err(_) => decode_flat(message),
            },
        }
    }
}

fn decode_flat(message: &PubSubMessage) -> Result<EncodedEnvelope, GpsError> {
    let body = String::from_utf8(message.data.clone())
        .map_err(|err| GpsError::DecodingError(err.to_string()))?;

    Ok(EncodedEnvelope {
        body,
        headers: message.attributes.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded() -> EncodedEnvelope {
        let mut headers = HashMap::new();
        headers.insert("type".to_owned(), "OrderPlaced".to_owned());
        EncodedEnvelope {
            body: r#"{"id":1}"#.to_owned(),
            headers,
        }
    }

    fn pulled(data: &[u8], attributes: HashMap<String, String>) -> PubSubMessage {
        PubSubMessage {
            data: data.to_vec(),
            attributes,
            ..Default::default()
        }
    }

    #[test]
    fn wrapped_embeds_headers_in_data() {
        let msg = EncodingStrategy::Wrapped.encode(&encoded()).unwrap();

        assert!(msg.attributes.is_empty());
        let value: serde_json::Value = serde_json::from_slice(&msg.data).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"body": "{\"id\":1}", "headers": {"type": "OrderPlaced"}})
        );

        let decoded = EncodingStrategy::Wrapped
            .decode(&pulled(&msg.data, HashMap::default()))
            .unwrap();
        assert_eq!(decoded, encoded());
    }

    #[test]
    fn flat_moves_headers_to_attributes() {
        let msg = EncodingStrategy::Flat.encode(&encoded()).unwrap();

        assert_eq!(msg.data, br#"{"id":1}"#.to_vec());
        assert_eq!(msg.attributes, encoded().headers);

        let decoded = EncodingStrategy::Flat
            .decode(&pulled(&msg.data, msg.attributes.clone()))
            .unwrap();
        assert_eq!(decoded, encoded());
    }

    #[test]
    fn wrapped_decode_rejects_malformed_json() {
        let err = EncodingStrategy::Wrapped
            .decode(&pulled(b"{oops", HashMap::default()))
            .unwrap_err();

        assert!(matches!(err, GpsError::DecodingError(_)));
    }

    #[test]
    fn hybrid_decodes_both_layouts() {
        let wrapped = EncodingStrategy::Wrapped.encode(&encoded()).unwrap();
        let decoded = EncodingStrategy::Hybrid
            .decode(&pulled(&wrapped.data, HashMap::default()))
            .unwrap();
        assert_eq!(decoded, encoded());

        let decoded = EncodingStrategy::Hybrid
            .decode(&pulled(br#"{"id":1}"#, encoded().headers))
            .unwrap();
        assert_eq!(decoded, encoded());
    }

    #[test]
    fn flat_decode_rejects_non_utf8_data() {
        let err = EncodingStrategy::Flat
            .decode(&pulled(&[0xff, 0xfe], HashMap::default()))
            .unwrap_err();

        assert!(matches!(err, GpsError::DecodingError(_)));
    }
}
