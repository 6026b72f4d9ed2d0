// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Client Seam
//!
//! The connection core talks to the underlying AMQP client only through the
//! two traits in this module. [`LapinConnector`] and the `BrokerConnection`
//! impl for [`lapin::Connection`] are the production implementations.

use crate::tls::SecureContext;
use async_trait::async_trait;
use lapin::{types::LongString, uri::AMQPUri, Channel, Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

/// Everything needed to open one broker connection.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub uri: AMQPUri,
    pub connection_name: String,
    pub tls: Option<SecureContext>,
}

/// A live connection as provided by the AMQP client library.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Whether the client reports the connection as open.
    fn is_open(&self) -> bool;

    /// Starts the closing handshake and waits for the broker to confirm it.
    async fn close(&self, reply_code: u16, reply_text: &str) -> Result<(), lapin::Error>;

    async fn create_channel(&self) -> Result<Channel, lapin::Error>;
}

/// Opens broker connections.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        params: &ConnectParams,
    ) -> Result<Arc<dyn BrokerConnection>, lapin::Error>;
}

#[async_trait]
impl BrokerConnection for Connection {
    fn is_open(&self) -> bool {
        self.status().connected()
    }

    async fn close(&self, reply_code: u16, reply_text: &str) -> Result<(), lapin::Error> {
        Connection::close(self, reply_code, reply_text).await
    }

    async fn create_channel(&self) -> Result<Channel, lapin::Error> {
        Connection::create_channel(self).await
    }
}

/// Connector backed by lapin.
#[derive(Debug, Clone, Copy, Default)]
pub struct LapinConnector;

#[async_trait]
impl Connector for LapinConnector {
    async fn connect(
        &self,
        params: &ConnectParams,
    ) -> Result<Arc<dyn BrokerConnection>, lapin::Error> {
        let options = ConnectionProperties::default()
            .with_connection_name(LongString::from(params.connection_name.clone()));

        let conn = match &params.tls {
            Some(ctx) => {
                if !ctx.verify_host_name() {
                    warn!("host name verification cannot be disabled, the broker host is always verified");
                }
                debug!(protocol = ctx.protocol().to_string(), "connecting over tls");
                Connection::connect_uri_with_config(params.uri.clone(), options, ctx.to_tls_config())
                    .await?
            }
            None => Connection::connect_uri(params.uri.clone(), options).await?,
        };

        Ok(Arc::new(conn))
    }
}
