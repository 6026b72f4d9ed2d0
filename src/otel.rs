// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Integration for RabbitMQ Connections
//!
//! This module records connection lifecycle events as OpenTelemetry metrics
//! through the globally installed meter provider. When no provider has been
//! installed the instruments are no-ops.

use crate::observability::{ConnectionInfo, ConnectionObserver, ErrorType};
use opentelemetry::{
    global,
    metrics::{Counter, Meter, UpDownCounter},
    KeyValue,
};
use tracing::debug;

/// Name of the meter used by this crate
pub const METER_NAME: &str = "rabbitmq";

/// Metric counting opened connections
pub const CONNECTIONS_OPENED: &str = "rabbitmq.connections.opened";
/// Metric counting closed or aborted connections
pub const CONNECTIONS_CLOSED: &str = "rabbitmq.connections.closed";
/// Metric tracking the number of live connections
pub const CONNECTIONS_ACTIVE: &str = "rabbitmq.connections.active";
/// Metric counting failures, tagged with `error_type`
pub const ERRORS: &str = "rabbitmq.errors";

/// Observer reporting connection events as OpenTelemetry metrics.
#[derive(Clone)]
pub struct MetricsObserver {
    opened: Counter<u64>,
    closed: Counter<u64>,
    active: UpDownCounter<i64>,
    errors: Counter<u64>,
}

impl MetricsObserver {
    /// Creates the observer using the global meter provider.
    pub fn new() -> MetricsObserver {
        MetricsObserver::with_meter(&global::meter(METER_NAME))
    }

    /// Creates the observer with instruments taken from the given meter.
    pub fn with_meter(meter: &Meter) -> MetricsObserver {
        MetricsObserver {
            opened: meter
                .u64_counter(CONNECTIONS_OPENED)
                .with_description("Number of connections opened")
                .build(),
            closed: meter
                .u64_counter(CONNECTIONS_CLOSED)
                .with_description("Number of connections closed or aborted")
                .build(),
            active: meter
                .i64_up_down_counter(CONNECTIONS_ACTIVE)
                .with_description("Number of connections currently open")
                .build(),
            errors: meter
                .u64_counter(ERRORS)
                .with_description("Number of connection failures")
                .build(),
        }
    }
}

impl Default for MetricsObserver {
    fn default() -> Self {
        MetricsObserver::new()
    }
}

fn attributes(connection: &ConnectionInfo) -> [KeyValue; 3] {
    [
        KeyValue::new("connection.name", connection.name.clone()),
        KeyValue::new("server.address", connection.host.clone()),
        KeyValue::new("server.port", i64::from(connection.port)),
    ]
}

impl ConnectionObserver for MetricsObserver {
    fn connection_opened(&self, connection: &ConnectionInfo) {
        debug!(name = connection.name.as_str(), "reporting opened connection");
        let attrs = attributes(connection);
        self.opened.add(1, &attrs);
        self.active.add(1, &attrs);
    }

    fn connection_closed(&self, connection: &ConnectionInfo) {
        debug!(name = connection.name.as_str(), "reporting closed connection");
        let attrs = attributes(connection);
        self.closed.add(1, &attrs);
        self.active.add(-1, &attrs);
    }

    fn error(&self, error_type: ErrorType) {
        self.errors
            .add(1, &[KeyValue::new("error_type", error_type.as_str())]);
    }
}
