// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Configuration
//!
//! Types describing how a broker connection should be established: credentials,
//! timeouts, heartbeat and TLS material. All of them can be deserialized with
//! serde, which is how the binding layer hands configuration to this crate.

use crate::errors::RabbitMqError;
use serde::{de, Deserialize, Deserializer};
use std::{path::PathBuf, str::FromStr, time::Duration};

const MILLIS_PER_SECOND: u64 = 1000;

/// A non-negative duration expressed in (possibly fractional) seconds.
///
/// The value is held as whole milliseconds, obtained by multiplying the decimal
/// number of seconds by 1000 and truncating toward zero. Parsing goes through
/// the decimal text, so `2.5` is exactly 2500 ms and `1.005` is 1005 ms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Seconds {
    millis: u64,
}

impl Seconds {
    pub fn from_millis(millis: u64) -> Seconds {
        Seconds { millis }
    }

    /// Builds a value from whole seconds.
    ///
    /// # Returns
    /// An error when the value does not fit in milliseconds
    pub fn from_secs(secs: u64) -> Result<Seconds, RabbitMqError> {
        secs.checked_mul(MILLIS_PER_SECOND)
            .map(Seconds::from_millis)
            .ok_or_else(|| {
                RabbitMqError::InvalidConfiguration(format!("{} seconds is out of range", secs))
            })
    }

    pub fn as_millis(&self) -> u64 {
        self.millis
    }

    /// Whole seconds, truncated.
    pub fn whole_seconds(&self) -> u64 {
        self.millis / MILLIS_PER_SECOND
    }

    pub fn is_zero(&self) -> bool {
        self.millis == 0
    }

    /// The bound this value represents, where zero means "no bound".
    pub fn as_timeout(&self) -> Option<Duration> {
        if self.is_zero() {
            None
        } else {
            Some(Duration::from_millis(self.millis))
        }
    }
}

impl FromStr for Seconds {
    type Err = RabbitMqError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid =
            || RabbitMqError::InvalidConfiguration(format!("`{}` is not a valid duration", raw));

        let text = raw.trim();
        let text = text.strip_prefix('+').unwrap_or(text);

        let (int_part, frac_part) = match text.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (text, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole = if int_part.is_empty() {
            0
        } else {
            int_part.parse::<u64>().map_err(|_| invalid())?
        };

        // only the first three fractional digits survive the truncation
        let mut fraction = 0u64;
        for (idx, digit) in frac_part.bytes().chain(std::iter::repeat(b'0')).take(3).enumerate() {
            fraction += u64::from(digit - b'0') * 10u64.pow(2 - idx as u32);
        }

        whole
            .checked_mul(MILLIS_PER_SECOND)
            .and_then(|ms| ms.checked_add(fraction))
            .map(Seconds::from_millis)
            .ok_or_else(|| {
                RabbitMqError::InvalidConfiguration(format!("`{}` seconds is out of range", raw))
            })
    }
}

impl TryFrom<f64> for Seconds {
    type Error = RabbitMqError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() || (value.is_sign_negative() && value != 0.0) {
            return Err(RabbitMqError::InvalidConfiguration(format!(
                "{} is not a non-negative duration",
                value
            )));
        }

        // Display never uses exponent notation and yields the shortest decimal
        // that round-trips, which is the literal the caller wrote.
        format!("{}", value.abs()).parse()
    }
}

impl<'de> Deserialize<'de> for Seconds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Whole(u64),
            Fractional(f64),
            Text(String),
        }

        let parsed = match Raw::deserialize(deserializer)? {
            Raw::Whole(secs) => Seconds::from_secs(secs),
            Raw::Fractional(secs) => Seconds::try_from(secs),
            Raw::Text(text) => text.parse(),
        };

        parsed.map_err(de::Error::custom)
    }
}

/// Location and passphrase of a PKCS#12 keystore holding the client identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct KeyStoreConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub password: String,
}

impl KeyStoreConfig {
    pub fn new(path: impl Into<PathBuf>, password: &str) -> KeyStoreConfig {
        KeyStoreConfig {
            path: Some(path.into()),
            password: password.to_owned(),
        }
    }
}

/// Location and passphrase of the store with the certificates used to verify
/// the broker. PEM bundles ignore the passphrase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TrustStoreConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub password: String,
}

impl TrustStoreConfig {
    pub fn new(path: impl Into<PathBuf>, password: &str) -> TrustStoreConfig {
        TrustStoreConfig {
            path: Some(path.into()),
            password: password.to_owned(),
        }
    }
}

fn default_verify_host_name() -> bool {
    true
}

/// TLS settings for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SecureSocket {
    #[serde(default)]
    pub key_store: Option<KeyStoreConfig>,
    pub trust_store: TrustStoreConfig,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default = "default_verify_host_name")]
    pub verify_host_name: bool,
}

impl SecureSocket {
    /// Creates TLS settings verifying the broker against `trust_store`.
    pub fn new(trust_store: TrustStoreConfig) -> SecureSocket {
        SecureSocket {
            key_store: None,
            trust_store,
            protocol: None,
            verify_host_name: true,
        }
    }

    /// Sets the keystore holding the client identity.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn key_store(mut self, key_store: KeyStoreConfig) -> Self {
        self.key_store = Some(key_store);
        self
    }

    /// Sets the TLS protocol name: `TLS`, `TLSv1.2` or `TLSv1.3`.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn protocol(mut self, name: &str) -> Self {
        self.protocol = Some(name.to_owned());
        self
    }

    /// Enables or disables verification of the broker host name.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn verify_host_name(mut self, verify: bool) -> Self {
        self.verify_host_name = verify;
        self
    }
}

/// Username and password handed to the broker through a credentials provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Credentials {
        Credentials {
            username: username.to_owned(),
            password: password.to_owned(),
        }
    }
}

/// Optional settings applied by the connection factory when it opens a
/// connection. Host and port are supplied separately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfiguration {
    pub username: Option<String>,
    pub password: Option<String>,
    pub connection_timeout: Option<Seconds>,
    pub handshake_timeout: Option<Seconds>,
    pub shutdown_timeout: Option<Seconds>,
    pub heartbeat: Option<Seconds>,
    pub secure_socket: Option<SecureSocket>,
    pub credentials: Option<Credentials>,
    pub virtual_host: Option<String>,
    pub connection_name: Option<String>,
}

impl ConnectionConfiguration {
    /// Creates an empty configuration; every setting keeps the client default.
    pub fn new() -> ConnectionConfiguration {
        ConnectionConfiguration::default()
    }

    /// Parses a configuration from its JSON representation.
    ///
    /// # Example
    /// ```
    /// use rabbitmq_connection::config::ConnectionConfiguration;
    ///
    /// let cfg = ConnectionConfiguration::from_json(r#"{"connection_timeout": 2.5}"#).unwrap();
    /// assert_eq!(cfg.connection_timeout.unwrap().as_millis(), 2500);
    /// ```
    pub fn from_json(raw: &str) -> Result<ConnectionConfiguration, RabbitMqError> {
        serde_json::from_str(raw)
            .map_err(|err| RabbitMqError::InvalidConfiguration(err.to_string()))
    }

    /// Sets the username used when no credentials are configured.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn username(mut self, username: &str) -> Self {
        self.username = Some(username.to_owned());
        self
    }

    /// Sets the password used when no credentials are configured.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_owned());
        self
    }

    /// Sets the TCP connection timeout, sent to the client in milliseconds.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn connection_timeout(mut self, timeout: Seconds) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Sets the bound on the whole AMQP handshake.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn handshake_timeout(mut self, timeout: Seconds) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// Sets the default bound on close and abort.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn shutdown_timeout(mut self, timeout: Seconds) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Sets the requested heartbeat, truncated to whole seconds.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn heartbeat(mut self, interval: Seconds) -> Self {
        self.heartbeat = Some(interval);
        self
    }

    /// Enables TLS with the given keystore and truststore settings.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn secure_socket(mut self, secure_socket: SecureSocket) -> Self {
        self.secure_socket = Some(secure_socket);
        self
    }

    /// Sets credentials taking precedence over username and password.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the virtual host to open.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn virtual_host(mut self, vhost: &str) -> Self {
        self.virtual_host = Some(vhost.to_owned());
        self
    }

    /// Sets the client-provided connection name shown by the broker.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn connection_name(mut self, name: &str) -> Self {
        self.connection_name = Some(name.to_owned());
        self
    }
}
