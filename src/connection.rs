// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Lifecycle
//!
//! A [`RabbitMqConnection`] starts open and ends closed, through either a
//! graceful [`close`](RabbitMqConnection::close) or a forced
//! [`abort`](RabbitMqConnection::abort). A closed connection is never reopened;
//! a new one has to be created through the factory.

use crate::{
    broker::BrokerConnection,
    close::CloseSpec,
    errors::RabbitMqError,
    observability::{ConnectionInfo, ConnectionObserver, ErrorType},
};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{debug, error, warn};

/// An open connection to the broker.
pub struct RabbitMqConnection {
    inner: Arc<dyn BrokerConnection>,
    info: ConnectionInfo,
    observer: Arc<dyn ConnectionObserver>,
    shutdown_timeout: Option<Duration>,
    closed: AtomicBool,
}

/// Whether the connection is absent or no longer open.
pub fn is_closed(connection: Option<&RabbitMqConnection>) -> bool {
    connection.map_or(true, |conn| conn.is_closed())
}

impl RabbitMqConnection {
    pub(crate) fn new(
        inner: Arc<dyn BrokerConnection>,
        info: ConnectionInfo,
        observer: Arc<dyn ConnectionObserver>,
        shutdown_timeout: Option<Duration>,
    ) -> RabbitMqConnection {
        RabbitMqConnection {
            inner,
            info,
            observer,
            shutdown_timeout,
            closed: AtomicBool::new(false),
        }
    }

    /// Name and endpoint the connection was opened with.
    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// Bound applied to close and abort when the caller gives none.
    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout
    }

    /// Whether the connection was closed through this handle or the client
    /// library reports it is no longer connected.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || !self.inner.is_open()
    }

    pub(crate) fn broker(&self) -> &Arc<dyn BrokerConnection> {
        &self.inner
    }

    /// Gracefully closes the connection.
    ///
    /// Closing a connection that was already closed is left to the client
    /// library; lapin answers with an invalid state error, surfaced as
    /// `ConnectionCloseError`.
    ///
    /// # Parameters
    /// * `spec` - Reply code, reply text and bound to wait for the broker
    ///
    /// # Returns
    /// `ConnectionCloseError` when the broker rejects the close or does not
    /// confirm it within the bound. The connection is then whatever the client
    /// left it in, check [`is_closed`](RabbitMqConnection::is_closed) or
    /// [`abort`](RabbitMqConnection::abort) it.
    pub async fn close(&self, spec: CloseSpec) -> Result<(), RabbitMqError> {
        debug!(name = self.info.name.as_str(), "closing amqp connection...");

        match self.shutdown(&spec).await {
            Ok(()) => {
                self.mark_closed();
                debug!("amqp connection closed");
                Ok(())
            }
            Err(err) => {
                error!(error = err.to_string(), "failure to close the connection");
                self.observer.error(ErrorType::ConnectionClose);
                Err(err)
            }
        }
    }

    /// Closes the connection from raw optional values.
    ///
    /// Values that cannot be represented fail the close before anything is
    /// sent to the broker.
    pub async fn close_with(
        &self,
        code: Option<i64>,
        message: Option<&str>,
        timeout: Option<i64>,
    ) -> Result<(), RabbitMqError> {
        match CloseSpec::try_from_parts(code, message, timeout) {
            Ok(spec) => self.close(spec).await,
            Err(err) => {
                error!(error = err.to_string(), "invalid close parameters");
                self.observer.error(ErrorType::ConnectionClose);
                Err(err)
            }
        }
    }

    /// Forces the connection closed. Failures and elapsed bounds are discarded;
    /// the connection is always reported closed afterward.
    pub async fn abort(&self, spec: CloseSpec) {
        debug!(name = self.info.name.as_str(), "aborting amqp connection...");

        if let Err(err) = self.shutdown(&spec).await {
            debug!(error = err.to_string(), "ignoring failure while aborting");
        }

        self.mark_closed();
    }

    /// Aborts the connection from raw optional values. Values that cannot be
    /// represented are dropped rather than failing the abort.
    ///
    /// # Parameters
    /// * `code` - Reply code, only used together with `message`
    /// * `message` - Reply text, only used together with `code`
    /// * `timeout` - Bound in milliseconds, zero or negative for none
    pub async fn abort_with(&self, code: Option<i64>, message: Option<&str>, timeout: Option<i64>) {
        self.abort(CloseSpec::from_parts_lossy(code, message, timeout))
            .await
    }

    async fn shutdown(&self, spec: &CloseSpec) -> Result<(), RabbitMqError> {
        let close = self.inner.close(spec.reply_code(), spec.reply_text());

        let res = match spec.timeout_or(self.shutdown_timeout) {
            Some(bound) => match tokio::time::timeout(bound, close).await {
                Ok(res) => res,
                Err(_) => {
                    warn!(
                        timeout_ms = bound.as_millis() as u64,
                        "broker did not confirm the close in time"
                    );
                    return Err(RabbitMqError::ConnectionCloseError(format!(
                        "close was not confirmed within {} ms",
                        bound.as_millis()
                    )));
                }
            },
            None => close.await,
        };

        res.map_err(|err| RabbitMqError::ConnectionCloseError(err.to_string()))
    }

    /// Reports the connection closed the first time only.
    fn mark_closed(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.observer.connection_closed(&self.info);
        }
    }
}

impl fmt::Debug for RabbitMqConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RabbitMqConnection")
            .field("info", &self.info)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}
