// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

pub mod broker;
pub mod channel;
pub mod close;
pub mod config;
pub mod connection;
pub mod errors;
pub mod factory;
pub mod observability;
pub mod otel;
pub mod tls;
