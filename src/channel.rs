// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Management
//!
//! This module creates communication channels on established connections.
//! Publishing and consuming happen on channels and are driven by lapin itself.

use crate::{
    close::CloseSpec, config::ConnectionConfiguration, connection::RabbitMqConnection,
    errors::RabbitMqError, factory::ConnectionFactory,
};
use lapin::Channel;
use std::sync::Arc;
use tracing::{debug, error};

/// Creates a new channel on an open connection.
///
/// # Parameters
/// * `conn` - The connection the channel is multiplexed on
///
/// # Returns
/// The channel wrapped in Arc for thread-safe sharing, or `ChannelError` when
/// the connection is closed or the broker refuses the channel.
pub async fn create_channel(conn: &RabbitMqConnection) -> Result<Arc<Channel>, RabbitMqError> {
    if conn.is_closed() {
        error!(name = conn.info().name.as_str(), "connection is closed");
        return Err(RabbitMqError::ChannelError("connection is closed".to_owned()));
    }

    debug!("creating amqp channel...");
    match conn.broker().create_channel().await {
        Ok(c) => {
            debug!("channel created");
            Ok(Arc::new(c))
        }
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            Err(RabbitMqError::ChannelError(err.to_string()))
        }
    }
}

/// Opens a connection and a channel on it.
///
/// When the channel cannot be created the freshly opened connection is aborted,
/// so callers either get both or neither.
///
/// # Example
/// ```no_run
/// # use rabbitmq_connection::{channel::new_amqp_channel, config::ConnectionConfiguration, factory::ConnectionFactory};
/// # async fn run() -> Result<(), rabbitmq_connection::errors::RabbitMqError> {
/// let factory = ConnectionFactory::new();
/// let (conn, channel) = new_amqp_channel(&factory, "localhost", 5672, &ConnectionConfiguration::new()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn new_amqp_channel(
    factory: &ConnectionFactory,
    host: &str,
    port: i64,
    cfg: &ConnectionConfiguration,
) -> Result<(Arc<RabbitMqConnection>, Arc<Channel>), RabbitMqError> {
    let conn = factory.new_connection(host, port, cfg).await?;

    match create_channel(&conn).await {
        Ok(channel) => Ok((Arc::new(conn), channel)),
        Err(err) => {
            conn.abort(CloseSpec::Default).await;
            Err(err)
        }
    }
}
