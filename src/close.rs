// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Close Parameters
//!
//! Graceful close and abort accept an optional close code, close message and
//! timeout. They are turned into a [`CloseSpec`] once, at the boundary, and the
//! lifecycle operations dispatch on the variant.

use crate::errors::RabbitMqError;
use std::time::Duration;

/// Reply code sent when the caller does not provide one
pub const DEFAULT_CLOSE_CODE: u16 = 200;
/// Reply text sent when the caller does not provide one
pub const DEFAULT_CLOSE_MESSAGE: &str = "OK";

/// How a connection should be closed.
///
/// A close code and a close message only count as a pair: one without the
/// other is ignored. Timeouts are milliseconds, zero meaning "no bound"; a
/// negative raw timeout is normalized to zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CloseSpec {
    /// Default code and message, bounded by the connection's shutdown timeout
    #[default]
    Default,
    WithTimeout(u32),
    WithCodeAndMessage(u16, String),
    Full(u16, String, u32),
}

impl CloseSpec {
    /// Builds a close spec from raw optional values, failing on values that cannot
    /// be represented (codes outside `0..=65535`, timeouts above `u32::MAX`).
    /// A negative timeout waits indefinitely.
    ///
    /// Precedence: code, message and timeout all present wins over timeout
    /// alone, which wins over the code and message pair.
    pub fn try_from_parts(
        code: Option<i64>,
        message: Option<&str>,
        timeout: Option<i64>,
    ) -> Result<CloseSpec, RabbitMqError> {
        let timeout = timeout
            .map(|ms| {
                timeout_millis(ms).ok_or_else(|| {
                    RabbitMqError::ConnectionCloseError(format!("invalid close timeout `{}`", ms))
                })
            })
            .transpose()?;

        let pair = match (code, message) {
            (Some(code), Some(message)) => {
                let code = u16::try_from(code).map_err(|_| {
                    RabbitMqError::ConnectionCloseError(format!("invalid close code `{}`", code))
                })?;
                Some((code, message.to_owned()))
            }
            _ => None,
        };

        Ok(CloseSpec::dispatch(pair, timeout))
    }

    /// Builds a close spec from raw optional values, dropping the ones that cannot
    /// be represented. Used by abort, which never fails.
    pub fn from_parts_lossy(
        code: Option<i64>,
        message: Option<&str>,
        timeout: Option<i64>,
    ) -> CloseSpec {
        let timeout = timeout.and_then(timeout_millis);
        let pair = match (code.and_then(|c| u16::try_from(c).ok()), message) {
            (Some(code), Some(message)) => Some((code, message.to_owned())),
            _ => None,
        };

        CloseSpec::dispatch(pair, timeout)
    }

    fn dispatch(pair: Option<(u16, String)>, timeout: Option<u32>) -> CloseSpec {
        match (pair, timeout) {
            (Some((code, message)), Some(ms)) => CloseSpec::Full(code, message, ms),
            (None, Some(ms)) => CloseSpec::WithTimeout(ms),
            (Some((code, message)), None) => CloseSpec::WithCodeAndMessage(code, message),
            (None, None) => CloseSpec::Default,
        }
    }

    /// Reply code sent to the broker, [`DEFAULT_CLOSE_CODE`] unless one was given.
    pub fn reply_code(&self) -> u16 {
        match self {
            CloseSpec::WithCodeAndMessage(code, _) | CloseSpec::Full(code, _, _) => *code,
            _ => DEFAULT_CLOSE_CODE,
        }
    }

    /// Reply text sent to the broker, [`DEFAULT_CLOSE_MESSAGE`] unless one was given.
    pub fn reply_text(&self) -> &str {
        match self {
            CloseSpec::WithCodeAndMessage(_, message) | CloseSpec::Full(_, message, _) => {
                message.as_str()
            }
            _ => DEFAULT_CLOSE_MESSAGE,
        }
    }

    /// The bound to wait for the broker, falling back to `default` when it
    /// carries no timeout.
    pub fn timeout_or(&self, default: Option<Duration>) -> Option<Duration> {
        match self {
            CloseSpec::WithTimeout(0) | CloseSpec::Full(_, _, 0) => None,
            CloseSpec::WithTimeout(ms) | CloseSpec::Full(_, _, ms) => {
                Some(Duration::from_millis(u64::from(*ms)))
            }
            _ => default,
        }
    }
}

/// Negative timeouts mean "no bound", like zero.
fn timeout_millis(ms: i64) -> Option<u32> {
    if ms < 0 {
        Some(0)
    } else {
        u32::try_from(ms).ok()
    }
}
