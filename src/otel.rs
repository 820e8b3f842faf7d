// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Integration for Pub/Sub
//!
//! Trace context travels in Pub/Sub message attributes: the sender injects the
//! current context before publishing and the receiver extracts it to open a
//! consumer span for every decoded message.

use opentelemetry::{
    global::{self, BoxedSpan, BoxedTracer},
    propagation::{Extractor, Injector},
    trace::{SpanKind, Tracer},
    Context,
};
use std::{borrow::Cow, collections::HashMap};

/// Writes trace context into outgoing message attributes.
pub(crate) struct AttributesInjector<'a> {
    attributes: &'a mut HashMap<String, String>,
}

impl<'a> AttributesInjector<'a> {
    pub(crate) fn new(attributes: &'a mut HashMap<String, String>) -> Self {
        Self { attributes }
    }
}

impl Injector for AttributesInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.attributes.insert(key.to_lowercase(), value);
    }
}

/// Reads trace context from received message attributes.
pub(crate) struct AttributesExtractor<'a> {
    attributes: &'a HashMap<String, String>,
}

impl<'a> AttributesExtractor<'a> {
    pub(crate) fn new(attributes: &'a HashMap<String, String>) -> Self {
        Self { attributes }
    }
}

impl Extractor for AttributesExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.attributes.keys().map(String::as_str).collect()
    }
}

/// Trace context attributes for `ctx`, empty when no propagator is installed.
pub(crate) fn context_attributes(ctx: &Context) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(ctx, &mut AttributesInjector::new(&mut attributes))
    });
    attributes
}

/// Starts a consumer span whose parent is the context carried by `attributes`.
pub(crate) fn new_span(
    attributes: &HashMap<String, String>,
    tracer: &BoxedTracer,
    name: &str,
) -> (Context, BoxedSpan) {
    let ctx = global::get_text_map_propagator(|propagator| {
        propagator.extract(&AttributesExtractor::new(attributes))
    });

    let span = tracer
        .span_builder(Cow::from(name.to_owned()))
        .with_kind(SpanKind::Consumer)
        .start_with_context(tracer, &ctx);

    (ctx, span)
}
