// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod otel;

pub mod client;
pub mod configuration;
pub mod dsn;
pub mod encoding;
pub mod envelope;
pub mod errors;
pub mod factory;
pub mod messenger;
pub mod receiver;
pub mod resolver;
pub mod sender;
pub mod settings;
pub mod transport;
