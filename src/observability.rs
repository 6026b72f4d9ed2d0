// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Observability Hooks
//!
//! Events fired synchronously by the connection factory and the lifecycle
//! controller. The default sink is the OpenTelemetry [`MetricsObserver`];
//! callers can plug their own implementation.
//!
//! [`MetricsObserver`]: crate::otel::MetricsObserver

use std::fmt;

#[cfg(test)]
use mockall::automock;

/// Category of a reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Connection,
    ConnectionClose,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Connection => "connection",
            ErrorType::ConnectionClose => "connection_close",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a connection as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub name: String,
    pub host: String,
    pub port: u16,
}

/// Sink for connection lifecycle events.
#[cfg_attr(test, automock)]
pub trait ConnectionObserver: Send + Sync {
    /// A connection was opened successfully.
    fn connection_opened(&self, connection: &ConnectionInfo);

    /// A connection was closed or aborted.
    fn connection_closed(&self, connection: &ConnectionInfo);

    /// An operation failed.
    fn error(&self, error_type: ErrorType);
}
