// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Factory
//!
//! Applies a [`ConnectionConfiguration`] onto an AMQP URI and opens a broker
//! connection. The operation is all-or-nothing: either an open
//! [`RabbitMqConnection`] is returned, or a classified error and nothing else.

use crate::{
    broker::{ConnectParams, Connector, LapinConnector},
    close::CloseSpec,
    config::{ConnectionConfiguration, Credentials},
    connection::RabbitMqConnection,
    errors::RabbitMqError,
    observability::{ConnectionInfo, ConnectionObserver, ErrorType},
    otel::MetricsObserver,
    tls::build_secure_context,
};
use lapin::uri::{AMQPScheme, AMQPUri};
use std::{future::Future, sync::Arc};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Supplies the username and password used to authenticate with the broker.
pub trait CredentialsProvider: Send + Sync {
    fn username(&self) -> String;
    fn password(&self) -> String;
}

impl CredentialsProvider for Credentials {
    fn username(&self) -> String {
        self.username.clone()
    }

    fn password(&self) -> String {
        self.password.clone()
    }
}

/// Opens broker connections from a host, a port and a configuration.
pub struct ConnectionFactory {
    connector: Arc<dyn Connector>,
    observer: Arc<dyn ConnectionObserver>,
    credentials_provider: Option<Arc<dyn CredentialsProvider>>,
}

impl Default for ConnectionFactory {
    fn default() -> Self {
        ConnectionFactory::new()
    }
}

impl ConnectionFactory {
    /// Creates a factory connecting through lapin and reporting OpenTelemetry metrics.
    pub fn new() -> ConnectionFactory {
        ConnectionFactory {
            connector: Arc::new(LapinConnector),
            observer: Arc::new(MetricsObserver::new()),
            credentials_provider: None,
        }
    }

    /// Replaces the connector used to reach the broker.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Replaces the sink receiving connection events.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn observer(mut self, observer: Arc<dyn ConnectionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Installs a credentials provider used when a configuration carries no
    /// `credentials` of its own.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn credentials_provider(mut self, provider: Arc<dyn CredentialsProvider>) -> Self {
        self.credentials_provider = Some(provider);
        self
    }

    /// Opens a new connection.
    ///
    /// Steps, in order:
    /// 1. Builds the TLS context when a secure socket is configured
    /// 2. Validates the port
    /// 3. Applies username, password, timeouts, heartbeat and credentials
    /// 4. Connects, bounded by the handshake timeout when one is set
    ///
    /// # Parameters
    /// * `host` - Broker host name or address
    /// * `port` - Broker port, within 1..=65535
    /// * `cfg` - Optional connection settings
    ///
    /// # Returns
    /// The open connection, or the first failure. No connection attempt is
    /// made when the TLS context or the configuration cannot be built.
    ///
    /// When the handshake timeout elapses the pending connect is dropped. The
    /// connector's own resources go with it, but a transport the client library
    /// already handed to a background task is left to that task's teardown.
    pub async fn new_connection(
        &self,
        host: &str,
        port: i64,
        cfg: &ConnectionConfiguration,
    ) -> Result<RabbitMqConnection, RabbitMqError> {
        debug!("creating amqp connection...");

        let tls = match &cfg.secure_socket {
            Some(socket) => match build_secure_context(socket) {
                Ok(ctx) => Some(ctx),
                Err(err) => {
                    error!(error = err.to_string(), "failure to build the tls context");
                    self.observer.error(ErrorType::Connection);
                    return Err(err.into());
                }
            },
            None => None,
        };

        let port = validate_port(port)?;
        let uri = self.amqp_uri(host, port, tls.is_some(), cfg)?;

        let info = ConnectionInfo {
            name: cfg
                .connection_name
                .clone()
                .unwrap_or_else(|| format!("rabbitmq-{}", Uuid::new_v4())),
            host: host.to_owned(),
            port,
        };

        let params = ConnectParams {
            uri,
            connection_name: info.name.clone(),
            tls,
        };

        let connect = self.connector.connect(&params);
        let handshake_timeout = cfg.handshake_timeout.and_then(|t| t.as_timeout());

        let res = match handshake_timeout {
            Some(bound) => match tokio::time::timeout(bound, connect).await {
                Ok(res) => res.map_err(|err| err.to_string()),
                Err(_) => Err(format!(
                    "handshake did not complete within {} ms",
                    bound.as_millis()
                )),
            },
            None => connect.await.map_err(|err| err.to_string()),
        };

        let broker = match res {
            Ok(conn) => conn,
            Err(msg) => {
                error!(error = msg.as_str(), "failure to connect");
                self.observer.error(ErrorType::Connection);
                return Err(RabbitMqError::ConnectionError(msg));
            }
        };

        if params.tls.is_some() {
            info!("TLS enabled for the connection");
        }
        debug!(name = info.name.as_str(), "amqp connected");

        self.observer.connection_opened(&info);

        let shutdown_timeout = cfg.shutdown_timeout.and_then(|t| t.as_timeout());
        Ok(RabbitMqConnection::new(
            broker,
            info,
            self.observer.clone(),
            shutdown_timeout,
        ))
    }

    /// Opens a connection, runs `f` with it and releases it afterward.
    ///
    /// The connection is closed when `f` succeeds and aborted when it fails, so
    /// it never outlives the call.
    pub async fn scoped<F, Fut, T>(
        &self,
        host: &str,
        port: i64,
        cfg: &ConnectionConfiguration,
        f: F,
    ) -> Result<T, RabbitMqError>
    where
        F: FnOnce(Arc<RabbitMqConnection>) -> Fut,
        Fut: Future<Output = Result<T, RabbitMqError>>,
    {
        let conn = Arc::new(self.new_connection(host, port, cfg).await?);

        match f(conn.clone()).await {
            Ok(value) => {
                if !conn.is_closed() {
                    if let Err(err) = conn.close(CloseSpec::Default).await {
                        conn.abort(CloseSpec::Default).await;
                        return Err(err);
                    }
                }
                Ok(value)
            }
            Err(err) => {
                conn.abort(CloseSpec::Default).await;
                Err(err)
            }
        }
    }

    fn amqp_uri(
        &self,
        host: &str,
        port: u16,
        secure: bool,
        cfg: &ConnectionConfiguration,
    ) -> Result<AMQPUri, RabbitMqError> {
        let mut uri = AMQPUri::default();

        uri.scheme = if secure {
            AMQPScheme::AMQPS
        } else {
            AMQPScheme::AMQP
        };
        uri.authority.host = host.to_owned();
        uri.authority.port = port;

        if let Some(username) = &cfg.username {
            uri.authority.userinfo.username = username.clone();
        }
        if let Some(password) = &cfg.password {
            uri.authority.userinfo.password = password.clone();
        }

        if let Some(vhost) = &cfg.virtual_host {
            uri.vhost = vhost.clone();
        }

        if let Some(timeout) = cfg.connection_timeout {
            uri.query.connection_timeout = timeout.as_timeout().map(|t| t.as_millis() as u64);
        }

        if let Some(heartbeat) = cfg.heartbeat {
            let secs = u16::try_from(heartbeat.whole_seconds()).map_err(|_| {
                RabbitMqError::InvalidConfiguration(format!(
                    "heartbeat of {} seconds is out of range",
                    heartbeat.whole_seconds()
                ))
            })?;
            uri.query.heartbeat = Some(secs);
        }

        let provider: Option<&dyn CredentialsProvider> = match &cfg.credentials {
            Some(credentials) => Some(credentials as &dyn CredentialsProvider),
            None => self.credentials_provider.as_deref(),
        };
        if let Some(provider) = provider {
            uri.authority.userinfo.username = provider.username();
            uri.authority.userinfo.password = provider.password();
        }

        Ok(uri)
    }
}

fn validate_port(port: i64) -> Result<u16, RabbitMqError> {
    match u16::try_from(port) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(RabbitMqError::InvalidConfiguration(format!(
            "port `{}` is outside 1..=65535",
            port
        ))),
    }
}
