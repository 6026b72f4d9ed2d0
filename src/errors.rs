// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the RabbitMQ Connection Core
//!
//! Every failure raised while building a TLS context, opening, closing or using
//! a broker connection is translated at the boundary into one of the values
//! below, carrying the underlying message.

use std::fmt;
use thiserror::Error;

/// Represents errors that can occur while managing a RabbitMQ connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RabbitMqError {
    /// Caller supplied values that cannot be applied (port range, timeouts, etc.)
    #[error("invalid connection configuration: {0}")]
    InvalidConfiguration(String),

    /// Failure while building the TLS context for a secure connection
    #[error("error occurred while setting up the secure connection: {0}")]
    SecureConnectionError(#[from] SecureConnectionError),

    /// Error establishing a connection to the RabbitMQ server
    #[error("error occurred while setting up the connection: {0}")]
    ConnectionError(String),

    /// Error raised by a graceful close
    #[error("error occurred while closing the connection: {0}")]
    ConnectionCloseError(String),

    /// Error creating a channel from an established connection
    #[error("failure to create a channel: {0}")]
    ChannelError(String),
}

/// Identifies which certificate store a TLS failure relates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    KeyStore,
    TrustStore,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::KeyStore => write!(f, "keystore"),
            StoreKind::TrustStore => write!(f, "truststore"),
        }
    }
}

/// Classified reason for a TLS context construction failure.
///
/// None of these are retried; they are terminal for the connection attempt
/// that triggered them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecureConnectionError {
    #[error("path for the {0} is not found")]
    MissingPath(StoreKind),

    #[error("{store} file not found: {detail}")]
    FileNotFound { store: StoreKind, detail: String },

    #[error("I/O error occurred while reading the {store}: {detail}")]
    Io { store: StoreKind, detail: String },

    #[error("certification error occurred: {0}")]
    Certificate(String),

    #[error("a key in the keystore cannot be recovered: {0}")]
    KeyUnrecoverable(String),

    #[error("the requested cryptographic protocol is not available: {0}")]
    AlgorithmUnavailable(String),

    #[error("unsupported keystore type: {0}")]
    KeystoreType(String),

    #[error("error occurred in an operation with key management: {0}")]
    KeyManagement(String),
}
